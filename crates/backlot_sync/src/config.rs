//! Configuration for the sync engine and autosave scheduler.

use std::time::Duration;

use backlot_protocol::{EntityKind, MAX_RETRIES};

/// Bearer credential attached to outgoing requests.
///
/// `Debug` output is redacted so tokens do not leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wraps a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for header construction.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_tuple("BearerToken").field(&"[REDACTED]").finish()
    }
}

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the REST API, stored without a trailing slash.
    pub base_url: String,
    /// Bearer credential, when the session is authenticated.
    pub token: Option<BearerToken>,
    /// Period of the automatic background pass.
    pub sync_interval: Duration,
    /// Replay attempts before a queued mutation is abandoned.
    pub max_retries: u32,
}

impl SyncConfig {
    /// Creates a configuration with the documented defaults: a 30 second
    /// background pass and the standard retry budget.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            sync_interval: Duration::from_secs(30),
            max_retries: MAX_RETRIES,
        }
    }

    /// Sets the bearer credential.
    pub fn with_token(mut self, token: BearerToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Sets the background pass period.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the replay budget for queued mutations.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Resolves the push endpoint for an entity snapshot.
    pub fn entity_url(&self, kind: EntityKind, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.resource_path(), id)
    }
}

/// Configuration for the autosave scheduler.
#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    /// Quiet time after the last edit before a save fires.
    pub debounce: Duration,
    /// Fallback flush period while edits stay buffered.
    pub interval: Duration,
    /// When false the timers are inert and only explicit saves flush.
    pub enabled: bool,
}

impl AutosaveConfig {
    /// Creates a configuration with the documented defaults: 2 second
    /// debounce, 30 second fallback flush, enabled.
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            interval: Duration::from_millis(30_000),
            enabled: true,
        }
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the fallback flush period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Disables the timers; `save_now` still flushes.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self::new()
    }
}
