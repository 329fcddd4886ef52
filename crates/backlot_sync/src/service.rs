//! Caller-owned background sync service.

use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::SyncEngine;
use crate::http::HttpClient;
use backlot_store::OfflineStore;

/// Runs a [`SyncEngine`] in the background.
///
/// The service owns a tokio task that runs a pass on each of: the periodic
/// interval tick, [`SyncService::request_sync`], an offline-to-online
/// transition, and [`SyncService::notify_visible`] while online. Ticks
/// that land while offline are absorbed by the engine's offline skip.
///
/// The service is an owned value, not a process-wide singleton: create one
/// per session and call [`SyncService::shutdown`] when the session ends.
/// Shutdown cancels the timer and the triggers; a pass already in flight
/// completes rather than being aborted.
pub struct SyncService<C: HttpClient, S: OfflineStore + 'static> {
    engine: Arc<SyncEngine<C, S>>,
    wake: Arc<Notify>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<C: HttpClient, S: OfflineStore + 'static> SyncService<C, S> {
    /// Spawns the background task. Must be called within a tokio runtime.
    pub fn spawn(engine: SyncEngine<C, S>) -> Self {
        let engine = Arc::new(engine);
        let wake = Arc::new(Notify::new());
        let (stop, mut stopped) = watch::channel(false);

        let task = {
            let engine = Arc::clone(&engine);
            let wake = Arc::clone(&wake);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(engine.config().sync_interval);
                // The first tick completes immediately; swallow it so
                // spawning does not imply an instant pass.
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = stopped.changed() => break,
                        _ = ticker.tick() => {}
                        _ = wake.notified() => {}
                    }
                    // Run the pass outside the select so shutdown never
                    // cancels it mid-flight.
                    if let Err(error) = engine.sync_now().await {
                        warn!(%error, "sync pass aborted by store failure");
                    }
                }
                debug!("sync service stopped");
            })
        };

        Self {
            engine,
            wake,
            stop,
            task,
        }
    }

    /// The engine driven by this service.
    pub fn engine(&self) -> &Arc<SyncEngine<C, S>> {
        &self.engine
    }

    /// Requests an immediate pass.
    pub fn request_sync(&self) {
        self.wake.notify_one();
    }

    /// Mirrors network connectivity; coming back online triggers a pass.
    pub fn set_online(&self, online: bool) {
        if self.engine.set_online(online) {
            self.wake.notify_one();
        }
    }

    /// Signals that the app regained focus; triggers a pass while online.
    pub fn notify_visible(&self) {
        if self.engine.is_online() {
            self.wake.notify_one();
        }
    }

    /// Stops the timer and triggers, then waits for the background task to
    /// finish its current pass and exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}
