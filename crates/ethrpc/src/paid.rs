//! Paid transport (§4.6, §9 "Paid-RPC side-effect"): for a configured set of
//! methods (default `{eth_getLogs, eth_getBlockByNumber, eth_getBlockByHash}`)
//! obtains a payment voucher from an external collaborator and attaches it
//! as an HTTP header before delegating to an inner transport. The voucher
//! negotiation lifecycle itself is out of scope (§9); only the hook is
//! specified here.

use {
    crate::{error::RpcError, transport::RpcTransport},
    std::{collections::HashSet, sync::Arc},
};

/// Header the voucher is forwarded under, down to whichever transport
/// actually owns the HTTP connection (`DirectTransport`).
pub const PAYMENT_VOUCHER_HEADER: &str = "x-payment-voucher";

/// `request(method, params)` may suspend on payment acquisition; failure to
/// acquire payment surfaces as [`RpcError::Payment`].
#[async_trait::async_trait]
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
pub trait PaymentVoucherProvider: Send + Sync {
    async fn acquire_voucher(&self, method: &str) -> Result<String, String>;
}

pub struct PaidTransport {
    inner: Arc<dyn RpcTransport>,
    payments: Arc<dyn PaymentVoucherProvider>,
    paid_methods: HashSet<String>,
}

impl PaidTransport {
    pub fn new(
        inner: Arc<dyn RpcTransport>,
        payments: Arc<dyn PaymentVoucherProvider>,
        paid_methods: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            inner,
            payments,
            paid_methods: paid_methods.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl RpcTransport for PaidTransport {
    async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        if self.paid_methods.contains(method) {
            let voucher = self
                .payments
                .acquire_voucher(method)
                .await
                .map_err(RpcError::Payment)?;
            tracing::debug!(method, voucher_len = voucher.len(), "attached payment voucher");
            return self
                .inner
                .request_with_headers(method, params, vec![(PAYMENT_VOUCHER_HEADER.to_string(), voucher)])
                .await;
        }
        self.inner.request(method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockRpcTransport;

    #[tokio::test]
    async fn acquires_voucher_only_for_configured_methods() {
        let mut inner = MockRpcTransport::new();
        inner
            .expect_request_with_headers()
            .withf(|method, _, headers| {
                method == "eth_getLogs" && headers == &[(PAYMENT_VOUCHER_HEADER.to_string(), "voucher".to_string())]
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(serde_json::Value::Null) }));
        inner
            .expect_request()
            .withf(|method, _| method == "eth_chainId")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(serde_json::Value::Null) }));

        let mut payments = MockPaymentVoucherProvider::new();
        payments
            .expect_acquire_voucher()
            .times(1)
            .returning(|_| Box::pin(async { Ok("voucher".to_string()) }));

        let transport = PaidTransport::new(
            Arc::new(inner),
            Arc::new(payments),
            ["eth_getLogs".to_string()],
        );

        transport
            .request("eth_getLogs", serde_json::Value::Null)
            .await
            .unwrap();
        transport
            .request("eth_chainId", serde_json::Value::Null)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn payment_failure_surfaces_as_rpc_error() {
        let inner = MockRpcTransport::new();
        let mut payments = MockPaymentVoucherProvider::new();
        payments
            .expect_acquire_voucher()
            .returning(|_| Box::pin(async { Err("insufficient balance".to_string()) }));

        let transport =
            PaidTransport::new(Arc::new(inner), Arc::new(payments), ["eth_getLogs".to_string()]);

        let err = transport
            .request("eth_getLogs", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Payment(_)));
    }
}
