use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{CallFlowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// One outbound request
///
/// GET sends `params` as the query string, POST as a form body.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ServiceRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            timeout,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: String,
}

impl ServiceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP primitive the external service client is built on
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Must give up after `request.timeout`.
    async fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| CallFlowError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url).query(&request.params),
            HttpMethod::Post => self.client.post(&request.url).form(&request.params),
        };

        let response = builder
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify(e, request.timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify(e, request.timeout))?;
        debug!(method = %request.method, url = %request.url, status, "external response");

        Ok(ServiceResponse { status, body })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> CallFlowError {
    if err.is_timeout() {
        CallFlowError::ExternalTimeout(timeout)
    } else {
        CallFlowError::ExternalNetwork(format!("HTTP request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_sends_query_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup"))
            .and(query_param("number", "+46851758284"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1001"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("callflow-test").unwrap();
        let request = ServiceRequest::new(
            HttpMethod::Get,
            format!("{}/lookup", server.uri()),
            Duration::from_secs(2),
        )
        .param("number", "+46851758284");

        let response = transport.send(&request).await.unwrap();
        assert_eq!(response, ServiceResponse { status: 200, body: "1001".into() });
    }

    #[tokio::test]
    async fn post_sends_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/join"))
            .and(body_string_contains("call_id=call-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("callflow-test").unwrap();
        let request = ServiceRequest::new(
            HttpMethod::Post,
            format!("{}/join", server.uri()),
            Duration::from_secs(2),
        )
        .param("call_id", "call-1");

        assert!(transport.send(&request).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("callflow-test").unwrap();
        let request = ServiceRequest::new(HttpMethod::Get, server.uri(), Duration::from_millis(50));
        let err = transport.send(&request).await.unwrap_err();
        assert!(matches!(err, CallFlowError::ExternalTimeout(_)));
    }
}
