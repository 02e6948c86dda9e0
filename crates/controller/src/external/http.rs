//! # Service HTTP Client
//!
//! Thin reqwest wrapper shared by every external resource. Responses are
//! classified into the `ExternalError` taxonomy:
//!
//! - `404` - `NotFound`
//! - `408`, `429`, `5xx`, connection failures - `Transient`
//! - other `4xx` - `Rejected` with the response text verbatim

use crate::external::ExternalError;
use reqwest::{Certificate, Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, Instrument};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// How requests authenticate against the service
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    /// Encoded API key sent as `Authorization: ApiKey <key>`
    ApiKey(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::ApiKey(_) => f.write_str("ApiKey(..)"),
        }
    }
}

/// HTTP verbs used by the REST schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Post => Method::POST,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Client bound to one service instance
#[derive(Clone)]
pub struct ServiceClient {
    http_client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    /// Build a client for `base_url`, trusting `ca_certificate` (PEM) when given
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        ca_certificate: Option<&[u8]>,
    ) -> Result<Self, ExternalError> {
        if base_url.is_empty() {
            return Err(ExternalError::Configuration(
                "instance URL is empty".to_string(),
            ));
        }
        let mut builder = Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        if let Some(pem) = ca_certificate {
            let certificate = Certificate::from_pem(pem).map_err(|e| {
                ExternalError::Configuration(format!("invalid CA certificate: {e}"))
            })?;
            builder = builder.add_root_certificate(certificate);
        }
        let http_client = builder
            .build()
            .map_err(|e| {
                ExternalError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and classify the response
    ///
    /// Returns the decoded JSON body (`null` for empty bodies) on success.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ExternalError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let span = tracing::debug_span!("external.request", http.method = ?method, http.url = %url);

        async move {
            let mut request = self
                .http_client
                .request(method.as_reqwest(), &url)
                .header("Content-Type", "application/json")
                .header("kbn-xsrf", "true");
            request = match &self.credentials {
                Some(Credentials::Basic { username, password }) => {
                    request.basic_auth(username, Some(password))
                }
                Some(Credentials::ApiKey(key)) => {
                    request.header("Authorization", format!("ApiKey {key}"))
                }
                None => request,
            };
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ExternalError::Transient(format!("request to {url} failed: {e}")))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| ExternalError::Transient(format!("failed to read response: {e}")))?;
            debug!("{:?} {} -> {}", method, url, status.as_u16());
            classify(status, &text)
        }
        .instrument(span)
        .await
    }
}

/// Map a response onto the error taxonomy
fn classify(status: StatusCode, text: &str) -> Result<Value, ExternalError> {
    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())));
    }
    match status.as_u16() {
        404 => Err(ExternalError::NotFound(text.to_string())),
        408 | 429 => Err(ExternalError::Transient(format!("{status}: {text}"))),
        code if status.is_server_error() => {
            Err(ExternalError::Transient(format!("{code}: {text}")))
        }
        code => Err(ExternalError::Rejected {
            status: code,
            message: text.to_string(),
        }),
    }
}
