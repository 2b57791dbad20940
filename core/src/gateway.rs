//! Executes built requests against the CRM.
//!
//! # Design
//! `Transport` is the only place that performs network I/O. The `Gateway`
//! wraps it with the concerns every call shares: the access-token
//! precondition, auth and content headers, a fixed timeout and tracing.
//! No retries are performed here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{CrmError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes a single HTTP round-trip. Non-2xx statuses are returned as
/// `Ok(HttpResponse)`; only failures to complete the exchange are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.path);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse { status, headers, body })
    }
}

/// Sends requests with auth attached and a timeout applied.
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    access_token: Option<String>,
    timeout: Duration,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, access_token: Option<String>, timeout: Duration) -> Self {
        Self {
            transport,
            access_token: access_token.filter(|t| !t.is_empty()),
            timeout,
        }
    }

    /// Execute `request`. Fails with `Configuration` before any I/O when no
    /// access token is configured, and with `Timeout` when the transport
    /// does not answer within the configured window.
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, CrmError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| CrmError::Configuration("HubSpot access token not configured".to_string()))?;

        request.set_header("authorization", format!("Bearer {token}"));
        request.set_header("content-type", "application/json");

        let span = tracing::debug_span!(
            "crm_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );

        async {
            tracing::debug!("sending request");
            match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
                Ok(Ok(response)) => {
                    tracing::debug!(status = response.status, "response received");
                    Ok(response)
                }
                Ok(Err(err)) => {
                    tracing::debug!(error = %err, "transport failed");
                    Err(CrmError::Transport(err))
                }
                Err(_) => {
                    tracing::debug!(timeout = ?self.timeout, "request timed out");
                    Err(CrmError::Timeout(self.timeout))
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("has_token", &self.access_token.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// In-process transport used by unit tests: records every request and
/// answers from a queue of canned responses matched by method and path
/// suffix.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use parking_lot::Mutex;

    type Route = (HttpMethod, String, Result<HttpResponse, TransportError>);

    #[derive(Default)]
    pub struct FakeTransport {
        routes: Mutex<Vec<Route>>,
        pub requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Answer the next matching request. Routes are consumed in order;
        /// the last matching route is reused once the others are spent.
        pub fn on(&self, method: HttpMethod, path_suffix: &str, status: u16, body: &str) {
            self.routes
                .lock()
                .push((method, path_suffix.to_string(), Ok(HttpResponse::new(status, body))));
        }

        pub fn fail(&self, method: HttpMethod, path_suffix: &str, err: TransportError) {
            self.routes.lock().push((method, path_suffix.to_string(), Err(err)));
        }

        pub fn recorded(&self) -> Vec<HttpRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().push(request.clone());
            let mut routes = self.routes.lock();
            let matching: Vec<usize> = routes
                .iter()
                .enumerate()
                .filter(|(_, (m, suffix, _))| *m == request.method && request.path.ends_with(suffix.as_str()))
                .map(|(i, _)| i)
                .collect();
            match matching.as_slice() {
                [] => Ok(HttpResponse::new(404, r#"{"message":"no route"}"#)),
                [only] => routes[*only].2.clone(),
                [first, ..] => routes.remove(*first).2,
            }
        }
    }
}
