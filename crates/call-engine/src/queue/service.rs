use async_trait::async_trait;

use super::poller::QueueMembership;
use super::status::{DisconnectReason, QueueStatusCode};
use crate::error::{CallFlowError, Result};
use crate::external::{ExternalServiceClient, HttpMethod};
use crate::session::SessionId;

/// External queue service, owned outside the engine
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Register the call as waiting in `membership.group`
    async fn join(&self, membership: &QueueMembership) -> Result<()>;

    async fn status(&self, call_id: &SessionId) -> Result<QueueStatusCode>;

    /// Report that the call left the queue
    async fn leave(&self, call_id: &SessionId, reason: DisconnectReason) -> Result<()>;
}

/// Queue service over HTTP
///
/// * `POST {base}/join`   form: `call_id`, `caller`, `landing`, `group`
/// * `GET  {base}/status` query: `call_id`; body is the code, bare or as `{"status": n}`
/// * `POST {base}/leave`  form: `call_id`, `reason`
#[derive(Debug, Clone)]
pub struct HttpQueueService {
    client: ExternalServiceClient,
    base_url: String,
}

impl HttpQueueService {
    pub fn new(client: ExternalServiceClient, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl QueueService for HttpQueueService {
    async fn join(&self, membership: &QueueMembership) -> Result<()> {
        let request = self
            .client
            .request(HttpMethod::Post, self.url("join"))
            .param("call_id", membership.call_id.as_str())
            .param("caller", membership.caller.as_str())
            .param("landing", membership.landing.as_str())
            .param("group", membership.group.as_str());
        self.client.call(request).await.map(|_| ())
    }

    async fn status(&self, call_id: &SessionId) -> Result<QueueStatusCode> {
        let request = self
            .client
            .request(HttpMethod::Get, self.url("status"))
            .param("call_id", call_id.as_str());
        let response = self.client.call(request).await?;
        parse_status(&response.body)
    }

    async fn leave(&self, call_id: &SessionId, reason: DisconnectReason) -> Result<()> {
        let request = self
            .client
            .request(HttpMethod::Post, self.url("leave"))
            .param("call_id", call_id.as_str())
            .param("reason", reason.as_str());
        self.client.call(request).await.map(|_| ())
    }
}

fn parse_status(body: &str) -> Result<QueueStatusCode> {
    let body = body.trim();
    if let Ok(code) = body.parse::<u8>() {
        return Ok(QueueStatusCode(code));
    }
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| CallFlowError::ExternalParse(e.to_string()))?;
    json.get("status")
        .and_then(|status| match status {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .and_then(|code| u8::try_from(code).ok())
        .map(QueueStatusCode)
        .ok_or_else(|| CallFlowError::ExternalParse(format!("no status code in '{}'", body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ReqwestTransport;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(base: &str) -> HttpQueueService {
        let transport = Arc::new(ReqwestTransport::new("callflow-test").unwrap());
        HttpQueueService::new(ExternalServiceClient::new(transport, Duration::from_secs(2)), base)
    }

    #[test]
    fn parses_bare_and_json_codes() {
        assert_eq!(parse_status(" 5\n").unwrap(), QueueStatusCode(5));
        assert_eq!(parse_status(r#"{"status": 4}"#).unwrap(), QueueStatusCode(4));
        assert_eq!(parse_status(r#"{"status": "0"}"#).unwrap(), QueueStatusCode(0));
        assert!(matches!(parse_status("busy"), Err(CallFlowError::ExternalParse(_))));
        assert!(parse_status(r#"{"state": 1}"#).is_err());
    }

    #[tokio::test]
    async fn join_status_leave_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/queue/join"))
            .and(body_string_contains("group=support"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/queue/status"))
            .and(query_param("call_id", "call-7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":2}"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/queue/leave"))
            .and(body_string_contains("reason=callAbandoned"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&format!("{}/queue/", server.uri()));
        let membership = QueueMembership {
            call_id: SessionId("call-7".into()),
            caller: "+46851758284".into(),
            landing: "7000".into(),
            group: "support".into(),
            joined_at: Utc::now(),
            status: None,
            disconnect_reason: None,
            polls: 0,
        };
        service.join(&membership).await.unwrap();
        assert_eq!(service.status(&membership.call_id).await.unwrap(), QueueStatusCode(2));
        service
            .leave(&membership.call_id, DisconnectReason::CallAbandoned)
            .await
            .unwrap();
    }
}
