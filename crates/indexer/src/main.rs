use {clap::Parser, indexer::arguments::Arguments};

#[tokio::main]
async fn main() {
    let args = Arguments::parse();
    observe::tracing_setup::initialize(&args.log_filter, args.log_json);

    if let Err(err) = indexer::run(args).await {
        tracing::error!(error = ?err, "indexer exited with an error");
        std::process::exit(1);
    }
}
