use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::client::ExternalServiceClient;
use super::transport::ServiceRequest;
use crate::error::{CallFlowError, Result};

/// Result of a blocking lookup
#[derive(Debug)]
pub enum LookupOutcome {
    Found(String),
    /// Empty body, a no-data sentinel, or a missing/empty result field
    NoData,
    /// Timeout, network or parse failure; the caller applies its fallback
    Failed(CallFlowError),
}

impl LookupOutcome {
    pub fn found(&self) -> Option<&str> {
        match self {
            LookupOutcome::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Synchronous lookups that feed routing decisions
///
/// Kept apart from queue polling even though both share the same client.
#[derive(Debug, Clone)]
pub struct LookupClient {
    client: ExternalServiceClient,
    no_data_sentinels: Vec<String>,
}

impl LookupClient {
    pub fn new(client: ExternalServiceClient, no_data_sentinels: Vec<String>) -> Self {
        Self {
            client,
            no_data_sentinels: no_data_sentinels
                .into_iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn client(&self) -> &ExternalServiceClient {
        &self.client
    }

    /// Resolve one value.
    ///
    /// Only a hangup is returned as an error; every service failure is
    /// folded into [`LookupOutcome::Failed`] so the caller can fail open.
    pub async fn resolve(
        &self,
        request: ServiceRequest,
        result_field: Option<&str>,
        hangup: &CancellationToken,
        session: &str,
    ) -> Result<LookupOutcome> {
        let url = request.url.clone();
        let response = match self.client.call_until_hangup(request, hangup, session).await {
            Ok(response) => response,
            Err(e) if e.is_session_gone() => return Err(e),
            Err(e) => {
                warn!(session_id = session, url = %url, error = %e, "lookup failed");
                return Ok(LookupOutcome::Failed(e));
            }
        };

        let outcome = self.interpret(&response.body, result_field);
        if let LookupOutcome::Failed(e) = &outcome {
            warn!(session_id = session, url = %url, error = %e, "lookup response unusable");
        } else {
            info!(session_id = session, url = %url, found = outcome.found().unwrap_or("<no data>"), "lookup done");
        }
        Ok(outcome)
    }

    fn interpret(&self, body: &str, result_field: Option<&str>) -> LookupOutcome {
        let body = body.trim();
        if self.is_no_data(body) {
            return LookupOutcome::NoData;
        }

        let Some(field) = result_field else {
            return LookupOutcome::Found(body.to_string());
        };

        let json: serde_json::Value = match serde_json::from_str(body) {
            Ok(json) => json,
            Err(e) => return LookupOutcome::Failed(CallFlowError::ExternalParse(e.to_string())),
        };

        match json.get(field) {
            None | Some(serde_json::Value::Null) => LookupOutcome::NoData,
            Some(serde_json::Value::String(s)) if self.is_no_data(s.trim()) => LookupOutcome::NoData,
            Some(serde_json::Value::String(s)) => LookupOutcome::Found(s.trim().to_string()),
            Some(serde_json::Value::Number(n)) => LookupOutcome::Found(n.to_string()),
            Some(other) => LookupOutcome::Failed(CallFlowError::ExternalParse(format!(
                "field '{}' is not a scalar: {}",
                field, other
            ))),
        }
    }

    fn is_no_data(&self, value: &str) -> bool {
        value.is_empty() || self.no_data_sentinels.iter().any(|s| value.eq_ignore_ascii_case(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{HttpMethod, ReqwestTransport};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lookup() -> LookupClient {
        let transport = Arc::new(ReqwestTransport::new("callflow-test").unwrap());
        let client = ExternalServiceClient::new(transport, Duration::from_secs(2));
        LookupClient::new(client, vec!["no data".into(), "NULL".into()])
    }

    #[test]
    fn interprets_bodies() {
        let lookup = lookup();
        assert!(matches!(lookup.interpret("  1001\n", None), LookupOutcome::Found(v) if v == "1001"));
        assert!(matches!(lookup.interpret("No Data", None), LookupOutcome::NoData));
        assert!(matches!(lookup.interpret("", None), LookupOutcome::NoData));
        assert!(matches!(
            lookup.interpret(r#"{"target":"user/1001@pbx"}"#, Some("target")),
            LookupOutcome::Found(v) if v == "user/1001@pbx"
        ));
        assert!(matches!(lookup.interpret(r#"{"target":null}"#, Some("target")), LookupOutcome::NoData));
        assert!(matches!(lookup.interpret(r#"{"other":1}"#, Some("target")), LookupOutcome::NoData));
        assert!(matches!(
            lookup.interpret("not json", Some("target")),
            LookupOutcome::Failed(CallFlowError::ExternalParse(_))
        ));
    }

    #[tokio::test]
    async fn server_error_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/did"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let lookup = lookup();
        let request = lookup
            .client()
            .request(HttpMethod::Get, format!("{}/did", server.uri()));
        let outcome = lookup
            .resolve(request, None, &CancellationToken::new(), "call-1")
            .await
            .unwrap();
        assert!(matches!(outcome, LookupOutcome::Failed(CallFlowError::ExternalNetwork(_))));
    }
}
