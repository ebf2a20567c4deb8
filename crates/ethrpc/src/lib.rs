//! Uniform request interface over either direct RPC or a remote indexer's
//! GraphQL API, plus a paid-method hook (§4.6). Every sync engine depends on
//! `Arc<dyn RpcTransport>` and is indifferent to which of these backs it.

pub mod direct;
pub mod error;
pub mod graphql;
pub mod paid;
pub mod remote;
pub mod retry;
pub mod transport;
pub mod types;

pub use {
    direct::DirectTransport,
    error::RpcError,
    paid::{PaidTransport, PaymentVoucherProvider},
    remote::RemoteIndexerTransport,
    transport::{EthRpc, RpcTransport},
};

#[cfg(any(test, feature = "test-util"))]
pub use {paid::MockPaymentVoucherProvider, transport::MockRpcTransport};
