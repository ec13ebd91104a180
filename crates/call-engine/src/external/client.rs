use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::transport::{HttpMethod, HttpTransport, ServiceRequest, ServiceResponse};
use crate::error::{CallFlowError, Result};

/// Outbound service calls with an enforced timeout
///
/// Every call is single-attempt. A transport that ignores its timeout is
/// still cut off here, so a stalled dependency cannot hold a live call.
#[derive(Clone)]
pub struct ExternalServiceClient {
    transport: Arc<dyn HttpTransport>,
    default_timeout: Duration,
}

impl ExternalServiceClient {
    pub fn new(transport: Arc<dyn HttpTransport>, default_timeout: Duration) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Build a request using the client's default timeout
    pub fn request(&self, method: HttpMethod, url: impl Into<String>) -> ServiceRequest {
        ServiceRequest::new(method, url, self.default_timeout)
    }

    /// Issue a request; non-2xx statuses are network errors.
    pub async fn call(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        let timeout = request.timeout;
        let response = match tokio::time::timeout(timeout, self.transport.send(&request)).await {
            Ok(result) => result?,
            Err(_) => return Err(CallFlowError::ExternalTimeout(timeout)),
        };

        if !response.is_success() {
            warn!(method = %request.method, url = %request.url, status = response.status, "external service error status");
            return Err(CallFlowError::ExternalNetwork(format!(
                "{} {} returned HTTP {}",
                request.method, request.url, response.status
            )));
        }
        Ok(response)
    }

    /// Like [`call`](Self::call), abandoned as soon as `hangup` fires.
    pub async fn call_until_hangup(
        &self,
        request: ServiceRequest,
        hangup: &CancellationToken,
        session: &str,
    ) -> Result<ServiceResponse> {
        if hangup.is_cancelled() {
            return Err(CallFlowError::session_gone(session));
        }
        tokio::select! {
            _ = hangup.cancelled() => Err(CallFlowError::session_gone(session)),
            result = self.call(request) => result,
        }
    }

    /// Issue a request and parse the body as JSON
    pub async fn call_json(&self, request: ServiceRequest) -> Result<serde_json::Value> {
        let response = self.call(request).await?;
        serde_json::from_str(&response.body).map_err(|e| CallFlowError::ExternalParse(e.to_string()))
    }
}

impl std::fmt::Debug for ExternalServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalServiceClient")
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Transport that never answers
    struct Stalled;

    #[async_trait]
    impl HttpTransport for Stalled {
        async fn send(&self, _request: &ServiceRequest) -> Result<ServiceResponse> {
            std::future::pending().await
        }
    }

    struct Fixed(u16, &'static str);

    #[async_trait]
    impl HttpTransport for Fixed {
        async fn send(&self, _request: &ServiceRequest) -> Result<ServiceResponse> {
            Ok(ServiceResponse {
                status: self.0,
                body: self.1.to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_transport_times_out() {
        let client = ExternalServiceClient::new(Arc::new(Stalled), Duration::from_secs(5));
        let err = client
            .call(client.request(HttpMethod::Get, "http://lookup.invalid/"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallFlowError::ExternalTimeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let client = ExternalServiceClient::new(Arc::new(Fixed(503, "busy")), Duration::from_secs(5));
        let err = client
            .call(client.request(HttpMethod::Get, "http://lookup.invalid/"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallFlowError::ExternalNetwork(_)));
    }

    #[tokio::test]
    async fn bad_json_is_parse_error() {
        let client = ExternalServiceClient::new(Arc::new(Fixed(200, "<html>")), Duration::from_secs(5));
        let err = client
            .call_json(client.request(HttpMethod::Get, "http://lookup.invalid/"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallFlowError::ExternalParse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn hangup_abandons_the_request() {
        let client = ExternalServiceClient::new(Arc::new(Stalled), Duration::from_secs(5));
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let err = client
            .call_until_hangup(client.request(HttpMethod::Get, "http://x.invalid/"), &token, "call-1")
            .await
            .unwrap_err();
        assert!(err.is_session_gone());
    }
}
