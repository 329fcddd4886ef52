//! Recorded write operations awaiting replay.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum replay attempts before a queued mutation is abandoned.
pub const MAX_RETRIES: u32 = 3;

/// HTTP method of a recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Create a resource.
    Post,
    /// Replace a resource.
    Put,
    /// Delete a resource.
    Delete,
}

impl HttpMethod {
    /// Returns the method as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded HTTP write that failed or was made while offline.
///
/// Rows live in the mutation queue until a replay succeeds or the retry
/// counter reaches the configured maximum; the counter never decreases
/// while the row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Generated identifier, assigned at enqueue time.
    pub id: Uuid,
    /// Method to replay.
    pub method: HttpMethod,
    /// Fully qualified target resource path.
    pub url: String,
    /// Optional request payload.
    pub body: Option<Value>,
    /// Enqueue time, UTC epoch milliseconds.
    pub timestamp: i64,
    /// Failed replay attempts so far.
    pub retries: u32,
}

impl QueuedMutation {
    /// Creates a fresh queue row with a generated id and zero retries.
    pub fn new(method: HttpMethod, url: impl Into<String>, body: Option<Value>, timestamp: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url: url.into(),
            body,
            timestamp,
            retries: 0,
        }
    }

    /// Returns true once the row has used up its replay budget.
    pub fn exhausted(&self, max_retries: u32) -> bool {
        self.retries >= max_retries
    }
}
