//! Debounced autosave scheduling.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::AutosaveConfig;
use crate::http::{HttpClient, HttpRequest};
use backlot_protocol::{EntityKind, HttpMethod};
use backlot_store::OfflineStore;

/// Errors produced by a save effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    /// The transport failed before a response arrived.
    #[error("save transport error: {0}")]
    Transport(String),

    /// The remote rejected the save.
    #[error("save rejected with status {0}")]
    Rejected(u16),

    /// The local store failed underneath the save.
    #[error("save store error: {0}")]
    Store(String),
}

/// Destination of autosaved data.
pub trait SaveTarget: Send + Sync + 'static {
    /// Persists the buffered data.
    fn save(&self, data: Value) -> impl Future<Output = Result<(), SaveError>> + Send;

    /// Called when a save fails. The buffered data is retained and will be
    /// retried on the next debounce or interval; this hook only surfaces
    /// the failure. The default logs a warning.
    fn on_error(&self, error: &SaveError) {
        warn!(%error, "autosave failed; changes kept for retry");
    }

    /// Best-effort teardown flush for data still buffered when the
    /// scheduler stops. Implementations must not block on the outcome:
    /// the scheduler guarantees the attempt, never the delivery.
    fn flush_fire_and_forget(&self, data: Value);
}

enum Command {
    Schedule(Value),
    SaveNow(Option<Value>),
    Shutdown,
}

#[derive(Debug, Default)]
struct SharedState {
    saving: AtomicBool,
    pending: AtomicBool,
    last_save: RwLock<Option<i64>>,
}

/// Debounces rapid edits into single save calls.
///
/// `schedule` buffers the latest data and re-arms the debounce timer;
/// the save effect fires on debounce expiry, on the periodic fallback
/// interval while data is buffered, or on [`Autosave::save_now`]. At most
/// one save is in flight at a time; edits scheduled during a save simply
/// replace the buffer and ride the next trigger. A failed save keeps the
/// buffer so nothing is lost between retries.
pub struct Autosave {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<SharedState>,
    task: JoinHandle<()>,
}

impl Autosave {
    /// Spawns the scheduler. Must be called within a tokio runtime.
    ///
    /// `config.interval` must be non-zero.
    pub fn spawn<T: SaveTarget>(config: AutosaveConfig, target: T) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::default());
        let task = tokio::spawn(run(config, target, receiver, Arc::clone(&shared)));
        Self {
            commands,
            shared,
            task,
        }
    }

    /// Buffers `data`, replacing anything already buffered, and re-arms
    /// the debounce timer. The latest write wins; successive buffers are
    /// never merged.
    pub fn schedule(&self, data: Value) {
        self.shared.pending.store(true, Ordering::SeqCst);
        let _ = self.commands.send(Command::Schedule(data));
    }

    /// Saves immediately, bypassing the debounce. `Some(data)` replaces
    /// the buffer first; `None` saves whatever is buffered (a no-op when
    /// the buffer is empty).
    pub fn save_now(&self, data: Option<Value>) {
        if data.is_some() {
            self.shared.pending.store(true, Ordering::SeqCst);
        }
        let _ = self.commands.send(Command::SaveNow(data));
    }

    /// True while a save effect is in flight.
    pub fn is_saving(&self) -> bool {
        self.shared.saving.load(Ordering::SeqCst)
    }

    /// True while edits are buffered and not yet persisted.
    pub fn has_pending_changes(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Completion time of the last successful save, UTC epoch
    /// milliseconds.
    pub fn last_save(&self) -> Option<i64> {
        *self.shared.last_save.read()
    }

    /// Stops the scheduler. Data still buffered is handed to the target's
    /// fire-and-forget flush (an attempt, not a delivery guarantee) and a
    /// warning is logged because those changes may be lost.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let _ = self.task.await;
    }
}

async fn run<T: SaveTarget>(
    config: AutosaveConfig,
    target: T,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<SharedState>,
) {
    let mut buffered: Option<Value> = None;
    let mut deadline: Option<Instant> = None;
    let mut ticker = tokio::time::interval(config.interval);
    ticker.tick().await;

    loop {
        let debounce_at = deadline;
        let debounce = async move {
            match debounce_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Schedule(data)) => {
                    buffered = Some(data);
                    if config.enabled {
                        deadline = Some(Instant::now() + config.debounce);
                    }
                }
                Some(Command::SaveNow(data)) => {
                    if data.is_some() {
                        buffered = data;
                    }
                    deadline = None;
                    save(&target, &mut buffered, &shared).await;
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = debounce => {
                deadline = None;
                save(&target, &mut buffered, &shared).await;
            }
            _ = ticker.tick(), if config.enabled => {
                if buffered.is_some() {
                    deadline = None;
                    save(&target, &mut buffered, &shared).await;
                }
            }
        }
    }

    if let Some(data) = buffered.take() {
        warn!("autosave stopping with unsaved changes; attempting best-effort flush");
        target.flush_fire_and_forget(data);
    }
}

async fn save<T: SaveTarget>(target: &T, buffered: &mut Option<Value>, shared: &SharedState) {
    let Some(data) = buffered.take() else {
        return;
    };

    shared.saving.store(true, Ordering::SeqCst);
    match target.save(data.clone()).await {
        Ok(()) => {
            shared.pending.store(false, Ordering::SeqCst);
            *shared.last_save.write() = Some(Utc::now().timestamp_millis());
            debug!("autosave completed");
        }
        Err(error) => {
            *buffered = Some(data);
            target.on_error(&error);
        }
    }
    shared.saving.store(false, Ordering::SeqCst);
}

/// Writes the buffered payload to the local store as an unsynced snapshot
/// for one `(kind, id)`: the standard editor wiring. Edits land locally
/// and the sync engine uploads them on its next pass.
pub struct SnapshotSaveTarget<S: OfflineStore> {
    store: Arc<S>,
    kind: EntityKind,
    id: String,
}

impl<S: OfflineStore> SnapshotSaveTarget<S> {
    /// Creates a target writing snapshots for one entity.
    pub fn new(store: Arc<S>, kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            store,
            kind,
            id: id.into(),
        }
    }
}

impl<S: OfflineStore + 'static> SaveTarget for SnapshotSaveTarget<S> {
    async fn save(&self, data: Value) -> Result<(), SaveError> {
        self.store
            .put_pending(self.kind, &self.id, data, Utc::now().timestamp_millis())
            .map_err(|error| SaveError::Store(error.to_string()))
    }

    fn flush_fire_and_forget(&self, data: Value) {
        if let Err(error) =
            self.store
                .put_pending(self.kind, &self.id, data, Utc::now().timestamp_millis())
        {
            warn!(%error, "teardown flush failed");
        }
    }
}

/// Saves over HTTP: a PUT to the primary endpoint, and at teardown a
/// fire-and-forget POST to a fallback endpoint.
pub struct HttpSaveTarget<C: HttpClient> {
    client: Arc<C>,
    url: String,
    fallback_url: String,
    bearer: Option<String>,
}

impl<C: HttpClient> HttpSaveTarget<C> {
    /// Creates a target saving to `url`, with teardown flushes going to
    /// `fallback_url`.
    pub fn new(client: Arc<C>, url: impl Into<String>, fallback_url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            fallback_url: fallback_url.into(),
            bearer: None,
        }
    }

    /// Attaches a bearer credential to every save.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

impl<C: HttpClient> SaveTarget for HttpSaveTarget<C> {
    async fn save(&self, data: Value) -> Result<(), SaveError> {
        let request = HttpRequest {
            method: HttpMethod::Put,
            url: self.url.clone(),
            bearer: self.bearer.clone(),
            body: Some(data),
        };
        let response = self.client.send(request).await.map_err(SaveError::Transport)?;
        if response.is_success() {
            Ok(())
        } else {
            Err(SaveError::Rejected(response.status))
        }
    }

    fn flush_fire_and_forget(&self, data: Value) {
        let client = Arc::clone(&self.client);
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.fallback_url.clone(),
            bearer: self.bearer.clone(),
            body: Some(data),
        };
        tokio::spawn(async move {
            // Outcome intentionally unobserved.
            let _ = client.send(request).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTarget {
        saves: Mutex<Vec<Value>>,
        flushes: Mutex<Vec<Value>>,
        fail: AtomicBool,
        errors: AtomicUsize,
    }

    impl SaveTarget for Arc<RecordingTarget> {
        async fn save(&self, data: Value) -> Result<(), SaveError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SaveError::Rejected(503));
            }
            self.saves.lock().push(data);
            Ok(())
        }

        fn on_error(&self, _error: &SaveError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn flush_fire_and_forget(&self, data: Value) {
            self.flushes.lock().push(data);
        }
    }

    fn fast_config() -> AutosaveConfig {
        AutosaveConfig::new()
            .with_debounce(Duration::from_millis(25))
            .with_interval(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn rapid_schedules_collapse_to_one_save_with_latest_data() {
        let target = Arc::new(RecordingTarget::default());
        let autosave = Autosave::spawn(fast_config(), Arc::clone(&target));

        autosave.schedule(json!({"title": "draft 1"}));
        autosave.schedule(json!({"title": "draft 2"}));
        tokio::time::sleep(Duration::from_millis(150)).await;

        let saves = target.saves.lock().clone();
        assert_eq!(saves, vec![json!({"title": "draft 2"})]);
        assert!(!autosave.has_pending_changes());
        assert!(autosave.last_save().is_some());
        autosave.shutdown().await;
    }

    #[tokio::test]
    async fn failed_save_keeps_the_buffer_and_invokes_the_hook() {
        let target = Arc::new(RecordingTarget::default());
        target.fail.store(true, Ordering::SeqCst);
        let autosave = Autosave::spawn(fast_config(), Arc::clone(&target));

        autosave.schedule(json!({"title": "draft"}));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(target.errors.load(Ordering::SeqCst), 1);
        assert!(autosave.has_pending_changes());
        assert!(autosave.last_save().is_none());

        // The retained buffer flushes once the target recovers.
        target.fail.store(false, Ordering::SeqCst);
        autosave.save_now(None);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(target.saves.lock().clone(), vec![json!({"title": "draft"})]);
        assert!(!autosave.has_pending_changes());
        autosave.shutdown().await;
    }

    #[tokio::test]
    async fn interval_flushes_buffered_data_before_the_debounce() {
        let target = Arc::new(RecordingTarget::default());
        let config = AutosaveConfig::new()
            .with_debounce(Duration::from_secs(3600))
            .with_interval(Duration::from_millis(40));
        let autosave = Autosave::spawn(config, Arc::clone(&target));

        autosave.schedule(json!({"take": 1}));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(target.saves.lock().clone(), vec![json!({"take": 1})]);
        autosave.shutdown().await;
    }

    #[tokio::test]
    async fn save_now_bypasses_the_debounce() {
        let target = Arc::new(RecordingTarget::default());
        let config = AutosaveConfig::new()
            .with_debounce(Duration::from_secs(3600))
            .with_interval(Duration::from_secs(3600));
        let autosave = Autosave::spawn(config, Arc::clone(&target));

        autosave.save_now(Some(json!({"take": 2})));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(target.saves.lock().clone(), vec![json!({"take": 2})]);
        autosave.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_with_dirty_buffer_attempts_the_teardown_flush() {
        let target = Arc::new(RecordingTarget::default());
        let config = AutosaveConfig::new()
            .with_debounce(Duration::from_secs(3600))
            .with_interval(Duration::from_secs(3600));
        let autosave = Autosave::spawn(config, Arc::clone(&target));

        autosave.schedule(json!({"title": "about to close"}));
        autosave.shutdown().await;

        assert!(target.saves.lock().is_empty());
        assert_eq!(
            target.flushes.lock().clone(),
            vec![json!({"title": "about to close"})]
        );
    }

    #[tokio::test]
    async fn disabled_scheduler_only_saves_explicitly() {
        let target = Arc::new(RecordingTarget::default());
        let config = AutosaveConfig::new()
            .with_debounce(Duration::from_millis(20))
            .with_interval(Duration::from_millis(20))
            .disabled();
        let autosave = Autosave::spawn(config, Arc::clone(&target));

        autosave.schedule(json!({"take": 3}));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(target.saves.lock().is_empty());

        autosave.save_now(None);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(target.saves.lock().clone(), vec![json!({"take": 3})]);
        autosave.shutdown().await;
    }

    #[tokio::test]
    async fn snapshot_target_writes_unsynced_rows() {
        use backlot_store::{MemoryStore, OfflineStore};

        let store = Arc::new(MemoryStore::new());
        let target = SnapshotSaveTarget::new(Arc::clone(&store), EntityKind::Scene, "s1");
        let autosave = Autosave::spawn(fast_config(), target);

        autosave.schedule(json!({"title": "Dawn"}));
        tokio::time::sleep(Duration::from_millis(120)).await;

        let pending = store.get_pending(EntityKind::Scene, "s1").unwrap().unwrap();
        assert!(!pending.synced);
        assert_eq!(pending.payload, json!({"title": "Dawn"}));
        autosave.shutdown().await;
    }

    #[tokio::test]
    async fn http_target_rejects_non_2xx() {
        use crate::http::MockClient;

        let client = Arc::new(MockClient::new());
        client.script("https://api.backlot.test/drafts/s1", 503);
        let target = HttpSaveTarget::new(
            Arc::clone(&client),
            "https://api.backlot.test/drafts/s1",
            "https://api.backlot.test/drafts/s1/beacon",
        );

        let result = target.save(json!({"title": "Dawn"})).await;
        assert_eq!(result, Err(SaveError::Rejected(503)));
    }

    #[tokio::test]
    async fn http_target_teardown_posts_to_the_fallback_endpoint() {
        use crate::http::MockClient;

        let client = Arc::new(MockClient::new());
        let target = HttpSaveTarget::new(
            Arc::clone(&client),
            "https://api.backlot.test/drafts/s1",
            "https://api.backlot.test/drafts/s1/beacon",
        )
        .with_bearer("session-token");
        let config = AutosaveConfig::new()
            .with_debounce(Duration::from_secs(3600))
            .with_interval(Duration::from_secs(3600));
        let autosave = Autosave::spawn(config, target);

        autosave.schedule(json!({"title": "closing"}));
        autosave.shutdown().await;
        // The flush is spawned, not awaited; give it a beat to land.
        tokio::time::sleep(Duration::from_millis(80)).await;

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "https://api.backlot.test/drafts/s1/beacon");
        assert_eq!(requests[0].bearer.as_deref(), Some("session-token"));
    }
}
