//! Background poller that turns commits by other processes on a shared
//! SQLite file into Change Bus events.

use crate::bus::ChangeBus;
use crate::storage::SqliteStorage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default interval between `data_version` checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Handle to a running watcher thread. Dropping it stops the thread.
pub struct ChangeWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Poll `storage` every `interval` and publish what changed on `bus`.
    pub fn spawn(storage: Arc<SqliteStorage>, bus: ChangeBus, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("farm-ledger-watcher".to_string())
            .spawn(move || {
                tracing::info!(interval_ms = interval.as_millis() as u64, "change watcher started");
                while !flag.load(Ordering::Acquire) {
                    poll_once(&storage, &bus);
                    thread::sleep(interval);
                }
                tracing::info!("change watcher stopped");
            })?;

        Ok(ChangeWatcher {
            stop,
            thread: Some(thread),
        })
    }

    /// Stop polling and wait for the thread to exit
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("change watcher thread panicked");
            }
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// One poll; returns the number of events published.
pub fn poll_once(storage: &SqliteStorage, bus: &ChangeBus) -> usize {
    match storage.poll_changes() {
        Ok(events) => {
            for event in &events {
                bus.publish(event);
            }
            events.len()
        }
        Err(e) => {
            tracing::warn!(error = %e, "polling for external changes failed");
            0
        }
    }
}
