//! Sync engine: queue replay and snapshot push.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::http::{HttpClient, HttpRequest};
use backlot_protocol::{EntityKind, HttpMethod, QueuedMutation};
use backlot_store::OfflineStore;

/// Counters accumulated across sync passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed passes; offline skips are not counted.
    pub passes_completed: u64,
    /// Queued mutations replayed successfully.
    pub mutations_replayed: u64,
    /// Queued mutations abandoned after exhausting their retries.
    pub mutations_dropped: u64,
    /// Snapshots pushed successfully.
    pub snapshots_pushed: u64,
    /// Per-item failures (failed replays plus failed pushes).
    pub item_failures: u64,
    /// End of the last completed pass, UTC epoch milliseconds.
    pub last_pass_at: Option<i64>,
    /// Message of the most recent per-item failure.
    pub last_error: Option<String>,
}

/// Outcome of a single sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// True when the pass was skipped because the engine was offline.
    pub skipped_offline: bool,
    /// Mutations replayed successfully.
    pub replayed: u64,
    /// Mutations abandoned after retry exhaustion.
    pub dropped: u64,
    /// Snapshots pushed successfully.
    pub pushed: u64,
    /// Per-item failures left for the next pass.
    pub failed: u64,
}

/// Aggregate status for UI indicators.
///
/// Failures surface here only in aggregate; a queued mutation never
/// produces a per-item user-facing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Mirror of network connectivity.
    pub online: bool,
    /// Number of passes currently in flight.
    pub passes_in_flight: u32,
    /// Queued mutations awaiting replay.
    pub queued_mutations: usize,
    /// Snapshots awaiting push.
    pub unsynced_entities: usize,
    /// Mutations abandoned since the engine was created.
    pub dead_lettered: usize,
}

/// The sync engine replays the mutation queue and pushes unsynced
/// snapshots against the remote API.
///
/// # Failure semantics
///
/// Per-item network failures and non-2xx responses both mean "not yet
/// synced": the item is left for a later pass (snapshots) or its retry
/// counter is bumped (mutations), and the pass continues. Only store-layer
/// errors escape [`SyncEngine::sync_now`].
///
/// # Overlap safety
///
/// Passes may overlap; a manual trigger during a periodic tick is fine.
/// Every store mutation is idempotent at the row level (delete-if-exists,
/// increment-if-exists, mark-if-exists), so double-processing a row is a
/// no-op and no pass-level lock is taken.
pub struct SyncEngine<C: HttpClient, S: OfflineStore> {
    config: SyncConfig,
    client: Arc<C>,
    store: Arc<S>,
    online: AtomicBool,
    passes_in_flight: AtomicU32,
    stats: RwLock<SyncStats>,
    dead_letters: RwLock<Vec<QueuedMutation>>,
}

impl<C: HttpClient, S: OfflineStore> SyncEngine<C, S> {
    /// Creates an engine that starts online.
    pub fn new(config: SyncConfig, client: C, store: Arc<S>) -> Self {
        Self {
            config,
            client: Arc::new(client),
            store,
            online: AtomicBool::new(true),
            passes_in_flight: AtomicU32::new(0),
            stats: RwLock::new(SyncStats::default()),
            dead_letters: RwLock::new(Vec::new()),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The shared store the engine reads and writes.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The transport the engine sends through.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Returns the connectivity mirror.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Updates the connectivity mirror.
    ///
    /// Returns true on an offline-to-online transition, the moment a
    /// caller should trigger a pass.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        online && !was_online
    }

    /// Returns a snapshot of the accumulated counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the mutations abandoned after retry exhaustion, in drop
    /// order.
    ///
    /// The queue contract is unchanged (exhausted rows are removed
    /// without surfacing an error) but the drops stay observable here
    /// for diagnostics instead of vanishing without a trace.
    pub fn dead_letters(&self) -> Vec<QueuedMutation> {
        self.dead_letters.read().clone()
    }

    /// Returns the aggregate status for UI indicators.
    pub fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            online: self.is_online(),
            passes_in_flight: self.passes_in_flight.load(Ordering::SeqCst),
            queued_mutations: self.store.list_queue()?.len(),
            unsynced_entities: self.store.list_unsynced()?.len(),
            dead_lettered: self.dead_letters.read().len(),
        })
    }

    /// Stores a resolved conflict as a fresh unsynced snapshot.
    ///
    /// A resolution is itself a pending change: it re-syncs on the next
    /// pass like any other local edit.
    pub fn accept_resolution(&self, kind: EntityKind, id: &str, payload: Value) -> SyncResult<()> {
        self.store
            .put_pending(kind, id, payload, Utc::now().timestamp_millis())?;
        Ok(())
    }

    /// Runs one pass: replay the queue in insertion order, then push every
    /// unsynced snapshot.
    ///
    /// Skipped entirely while offline. See the type-level docs for failure
    /// semantics and overlap safety.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        if !self.is_online() {
            debug!("sync pass skipped: offline");
            return Ok(SyncReport {
                skipped_offline: true,
                ..SyncReport::default()
            });
        }

        self.passes_in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.run_pass().await;
        self.passes_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn run_pass(&self) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        self.replay_queue(&mut report).await?;
        self.push_snapshots(&mut report).await?;

        let mut stats = self.stats.write();
        stats.passes_completed += 1;
        stats.mutations_replayed += report.replayed;
        stats.mutations_dropped += report.dropped;
        stats.snapshots_pushed += report.pushed;
        stats.item_failures += report.failed;
        stats.last_pass_at = Some(Utc::now().timestamp_millis());
        drop(stats);

        Ok(report)
    }

    async fn replay_queue(&self, report: &mut SyncReport) -> SyncResult<()> {
        for mutation in self.store.list_queue()? {
            if mutation.exhausted(self.config.max_retries) {
                warn!(
                    url = %mutation.url,
                    retries = mutation.retries,
                    "abandoning mutation after retry exhaustion"
                );
                self.store.remove_from_queue(mutation.id)?;
                self.dead_letters.write().push(mutation);
                report.dropped += 1;
                continue;
            }

            let request = HttpRequest {
                method: mutation.method,
                url: mutation.url.clone(),
                bearer: self.bearer(),
                body: mutation.body.clone(),
            };
            match self.client.send(request).await {
                Ok(response) if response.is_success() => {
                    self.store.remove_from_queue(mutation.id)?;
                    report.replayed += 1;
                }
                Ok(response) => {
                    debug!(url = %mutation.url, status = response.status, "mutation replay rejected");
                    self.note_failure(format!(
                        "{} {} -> {}",
                        mutation.method, mutation.url, response.status
                    ));
                    self.store.increment_retries(mutation.id)?;
                    report.failed += 1;
                }
                Err(error) => {
                    debug!(url = %mutation.url, %error, "mutation replay failed");
                    self.note_failure(error);
                    self.store.increment_retries(mutation.id)?;
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn push_snapshots(&self, report: &mut SyncReport) -> SyncResult<()> {
        for entity in self.store.list_unsynced()? {
            let request = HttpRequest {
                method: HttpMethod::Put,
                url: self.config.entity_url(entity.kind, &entity.id),
                bearer: self.bearer(),
                body: Some(entity.payload.clone()),
            };
            match self.client.send(request).await {
                Ok(response) if response.is_success() => {
                    self.store.mark_synced(entity.kind, &entity.id)?;
                    report.pushed += 1;
                }
                Ok(response) => {
                    warn!(
                        kind = %entity.kind,
                        id = %entity.id,
                        status = response.status,
                        "snapshot push rejected; retrying next pass"
                    );
                    self.note_failure(format!(
                        "PUT {}/{} -> {}",
                        entity.kind.resource_path(),
                        entity.id,
                        response.status
                    ));
                    report.failed += 1;
                }
                Err(error) => {
                    warn!(
                        kind = %entity.kind,
                        id = %entity.id,
                        %error,
                        "snapshot push failed; retrying next pass"
                    );
                    self.note_failure(error);
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    fn bearer(&self) -> Option<String> {
        self.config
            .token
            .as_ref()
            .map(|token| token.expose().to_string())
    }

    fn note_failure(&self, message: String) {
        self.stats.write().last_error = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BearerToken;
    use crate::http::MockClient;
    use backlot_store::MemoryStore;
    use serde_json::json;

    fn engine_with(
        client: MockClient,
    ) -> (SyncEngine<MockClient, MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = SyncConfig::new("https://api.backlot.test");
        let engine = SyncEngine::new(config, client, Arc::clone(&store));
        (engine, store)
    }

    #[tokio::test]
    async fn offline_pass_is_skipped_without_traffic() {
        let (engine, store) = engine_with(MockClient::new());
        store
            .enqueue_mutation(HttpMethod::Post, "https://api.backlot.test/comments", None)
            .unwrap();
        engine.set_online(false);

        let report = engine.sync_now().await.unwrap();
        assert!(report.skipped_offline);
        assert_eq!(engine.client.requests().len(), 0);
        assert_eq!(store.queue_len(), 1);
        assert_eq!(engine.stats().passes_completed, 0);
    }

    #[tokio::test]
    async fn successful_replay_drains_the_queue_in_order() {
        let (engine, store) = engine_with(MockClient::new());
        store
            .enqueue_mutation(HttpMethod::Post, "https://api.backlot.test/comments", Some(json!({"body": "hi"})))
            .unwrap();
        store
            .enqueue_mutation(HttpMethod::Delete, "https://api.backlot.test/scenes/9", None)
            .unwrap();

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(store.queue_len(), 0);

        let requests = engine.client.requests();
        assert_eq!(requests[0].url, "https://api.backlot.test/comments");
        assert_eq!(requests[1].url, "https://api.backlot.test/scenes/9");
    }

    #[tokio::test]
    async fn one_failing_item_does_not_stop_the_pass() {
        let client = MockClient::new();
        client.script("https://api.backlot.test/comments", 500);
        let (engine, store) = engine_with(client);
        let failing = store
            .enqueue_mutation(HttpMethod::Post, "https://api.backlot.test/comments", None)
            .unwrap();
        store
            .enqueue_mutation(HttpMethod::Delete, "https://api.backlot.test/scenes/9", None)
            .unwrap();

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.replayed, 1);

        let queue = store.list_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, failing);
        assert_eq!(queue[0].retries, 1);
        assert!(engine.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn transport_failure_counts_like_a_rejection() {
        let client = MockClient::new();
        client.script("https://api.backlot.test/comments", 0);
        let (engine, store) = engine_with(client);
        store
            .enqueue_mutation(HttpMethod::Post, "https://api.backlot.test/comments", None)
            .unwrap();

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(store.list_queue().unwrap()[0].retries, 1);
    }

    #[tokio::test]
    async fn exhausted_mutation_is_dropped_without_a_network_attempt() {
        let client = MockClient::new();
        client.script("https://api.backlot.test/comments", 500);
        let (engine, store) = engine_with(client);
        let id = store
            .enqueue_mutation(HttpMethod::Post, "https://api.backlot.test/comments", None)
            .unwrap();
        store.increment_retries(id).unwrap();
        store.increment_retries(id).unwrap();

        // retries = 2: one more live attempt, still rejected.
        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(store.list_queue().unwrap()[0].retries, 3);
        assert_eq!(engine.client.request_count(), 1);

        // retries = 3: removed without touching the network.
        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(store.queue_len(), 0);
        assert_eq!(engine.client.request_count(), 1);

        let dead = engine.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
    }

    #[tokio::test]
    async fn unsynced_snapshots_are_pushed_and_marked() {
        let (engine, store) = engine_with(MockClient::new());
        store
            .put_pending(EntityKind::Scene, "s1", json!({"title": "Dawn"}), 100)
            .unwrap();
        store
            .put_pending(EntityKind::Scene, "s2", json!({"title": "Dusk"}), 200)
            .unwrap();

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.pushed, 2);
        assert!(store.list_unsynced().unwrap().is_empty());
        // Pushing snapshots must not enqueue mutations.
        assert_eq!(store.queue_len(), 0);

        let urls: Vec<String> = engine.client.requests().iter().map(|r| r.url.clone()).collect();
        assert!(urls.contains(&"https://api.backlot.test/scenes/s1".to_string()));
        assert!(urls.contains(&"https://api.backlot.test/scenes/s2".to_string()));
    }

    #[tokio::test]
    async fn failed_push_leaves_the_snapshot_unsynced() {
        let client = MockClient::new();
        client.script("https://api.backlot.test/scenes/s1", 502);
        let (engine, store) = engine_with(client);
        store
            .put_pending(EntityKind::Scene, "s1", json!({}), 0)
            .unwrap();
        store
            .put_pending(EntityKind::Comment, "c1", json!({}), 0)
            .unwrap();

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.failed, 1);

        let unsynced = store.list_unsynced().unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, "s1");
    }

    #[tokio::test]
    async fn bearer_credential_is_attached_when_configured() {
        let store = Arc::new(MemoryStore::new());
        let config = SyncConfig::new("https://api.backlot.test")
            .with_token(BearerToken::new("session-token"));
        let engine = SyncEngine::new(config, MockClient::new(), Arc::clone(&store));
        store
            .put_pending(EntityKind::Project, "p1", json!({}), 0)
            .unwrap();

        engine.sync_now().await.unwrap();
        let requests = engine.client.requests();
        assert_eq!(requests[0].bearer.as_deref(), Some("session-token"));
    }

    #[tokio::test]
    async fn accepted_resolution_becomes_an_unsynced_snapshot() {
        let (engine, store) = engine_with(MockClient::new());
        engine
            .accept_resolution(EntityKind::Scene, "s1", json!({"title": "A+B"}))
            .unwrap();

        let pending = store.get_pending(EntityKind::Scene, "s1").unwrap().unwrap();
        assert!(!pending.synced);
        assert_eq!(pending.payload, json!({"title": "A+B"}));
    }

    #[tokio::test]
    async fn status_aggregates_counts() {
        let (engine, store) = engine_with(MockClient::new());
        store
            .enqueue_mutation(HttpMethod::Post, "https://api.backlot.test/comments", None)
            .unwrap();
        store
            .put_pending(EntityKind::Scene, "s1", json!({}), 0)
            .unwrap();

        let status = engine.status().unwrap();
        assert!(status.online);
        assert_eq!(status.passes_in_flight, 0);
        assert_eq!(status.queued_mutations, 1);
        assert_eq!(status.unsynced_entities, 1);
        assert_eq!(status.dead_lettered, 0);
    }
}
