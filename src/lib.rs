// Farm Ledger - Core Library
// Local-first state store for livestock farm records, shared by the CLI,
// the API server and the tests.

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod insights;
pub mod logging;
pub mod model;
pub mod persistence;
pub mod query;
pub mod storage;
pub mod store;
pub mod watcher;

// Re-export commonly used types
pub use bus::{ChangeBus, ContextId, StorageEvent, Subscription};
pub use command::{reduce, Command};
pub use config::{load_config, LedgerConfig, LoggingConfig, StorageConfig};
pub use error::{InsightError, StorageError};
pub use insights::{financial_insights, InsightGenerator, InsightRequest, NO_DATA_MESSAGE};
pub use logging::init_logging;
pub use model::{
    is_valid_amount, AppState, Enterprise, FarmTask, Settings, SettingsPatch, TaskScope,
    TaskStatus, Transaction, TransactionKind,
};
pub use persistence::{PersistenceAdapter, SaveOutcome};
pub use storage::{KeyValueStore, MemoryStorage, SqliteStorage};
pub use store::{Dispatched, Durability, Store, DEFAULT_STORAGE_KEY};
pub use watcher::ChangeWatcher;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Open a SQLite-backed store and keep it following writes from other
/// processes on the same file.
///
/// The returned [`Subscription`] and [`ChangeWatcher`] must be kept alive for
/// as long as external changes should be picked up.
pub fn open_shared_store(
    config: &StorageConfig,
) -> anyhow::Result<(Store<std::sync::Arc<SqliteStorage>>, Subscription, ChangeWatcher)> {
    use anyhow::Context;
    use std::sync::Arc;

    let storage = Arc::new(
        SqliteStorage::open(&config.database_path)
            .with_context(|| format!("Failed to open ledger database: {}", config.database_path.display()))?,
    );
    let bus = ChangeBus::new();
    let store = Store::open(
        PersistenceAdapter::new(Arc::clone(&storage)),
        config.key.clone(),
        AppState::default(),
    );
    let subscription = store.subscribe(&bus);
    let watcher = ChangeWatcher::spawn(storage, bus, config.poll_interval())
        .context("Failed to start change watcher")?;

    Ok((store, subscription, watcher))
}
