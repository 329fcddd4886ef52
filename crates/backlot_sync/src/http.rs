//! HTTP transport seam and implementations.
//!
//! The engine talks to the remote API through the [`HttpClient`] trait so
//! different transports can be swapped in: the shipped [`ReqwestClient`]
//! for production, [`MockClient`] for tests, or anything else that can
//! carry a JSON request.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::error::{SyncError, SyncResult};
use backlot_protocol::HttpMethod;

/// A single outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method on the wire.
    pub method: HttpMethod,
    /// Fully qualified target URL.
    pub url: String,
    /// Bearer credential, when the session is authenticated.
    pub bearer: Option<String>,
    /// Optional JSON payload.
    pub body: Option<Value>,
}

/// Status and decoded body of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body, when the response carried one.
    pub body: Option<Value>,
}

impl HttpResponse {
    /// Returns true for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport. Errors are plain
/// strings at this seam: a transport cannot tell what the engine
/// considers retryable, so it just reports what went wrong; a returned
/// response, whatever its status, is not an error.
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a request and returns the response.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, String>> + Send;
}

/// A reqwest-backed [`HttpClient`].
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SyncError::transport_fatal(error.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mut builder = match request.method {
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| error.to_string())?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.ok();
        Ok(HttpResponse { status, body })
    }
}

/// A scripted [`HttpClient`] for tests.
///
/// Responses are keyed by exact URL; unscripted URLs answer with the
/// default status (200 unless overridden). Scripting status `0` simulates
/// a transport-level failure instead of a response. Every request is
/// recorded for assertions.
#[derive(Debug)]
pub struct MockClient {
    default_status: AtomicU16,
    scripted: Mutex<HashMap<String, u16>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockClient {
    /// Creates a mock answering 200 to everything.
    pub fn new() -> Self {
        Self {
            default_status: AtomicU16::new(200),
            scripted: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the status returned for unscripted URLs.
    pub fn set_default_status(&self, status: u16) {
        self.default_status.store(status, Ordering::SeqCst);
    }

    /// Scripts the status for one URL. Status `0` means "transport
    /// failure".
    pub fn script(&self, url: impl Into<String>, status: u16) {
        self.scripted.lock().insert(url.into(), status);
    }

    /// Returns every request seen so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for MockClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let status = self
            .scripted
            .lock()
            .get(&request.url)
            .copied()
            .unwrap_or_else(|| self.default_status.load(Ordering::SeqCst));
        self.requests.lock().push(request);

        if status == 0 {
            return Err("connection refused".to_string());
        }
        Ok(HttpResponse { status, body: None })
    }
}
