//! A `/metrics` (Prometheus) and `/healthz` HTTP endpoint, hosted alongside
//! each component that wants to expose its liveness to an orchestrator.

use {
    axum::{extract::State, routing::get, Router},
    prometheus::{Encoder, TextEncoder},
    std::{net::SocketAddr, sync::Arc},
};

#[async_trait::async_trait]
pub trait LivenessChecking: Send + Sync {
    async fn is_alive(&self) -> bool;
}

async fn metrics_handler() -> String {
    let metric_families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .expect("encoding prometheus metrics never fails");
    String::from_utf8(buffer).expect("prometheus text output is always valid utf8")
}

async fn healthz_handler(State(liveness): State<Arc<dyn LivenessChecking>>) -> &'static str {
    if liveness.is_alive().await {
        "OK"
    } else {
        "UNHEALTHY"
    }
}

pub async fn serve_metrics(liveness: Arc<dyn LivenessChecking>, address: SocketAddr) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(liveness);
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAlive;
    #[async_trait::async_trait]
    impl LivenessChecking for AlwaysAlive {
        async fn is_alive(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn healthz_reports_alive() {
        let liveness: Arc<dyn LivenessChecking> = Arc::new(AlwaysAlive);
        assert_eq!(healthz_handler(State(liveness)).await, "OK");
    }
}
