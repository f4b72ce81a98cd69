// 🏛️ State Store - the single authoritative AppState for one context
//
// dispatch → reduce → commit → save, all under the state lock, so an
// external replacement can never slip between a commit and its save.
// External changes arrive through the Change Bus, wait in an inbox while a
// local commit is in flight, and are applied once the lock frees up.

use crate::bus::{ChangeBus, ContextId, Subscription};
use crate::command::{reduce, Command};
use crate::model::{AppState, Enterprise, Transaction};
use crate::persistence::{decode_state, PersistenceAdapter, SaveOutcome};
use crate::query;
use crate::storage::KeyValueStore;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Storage key used by the original application
pub const DEFAULT_STORAGE_KEY: &str = "agri-finance-pro-data";

/// Whether the last save reached storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Persisted,
    /// The last save failed; state lives in memory until a save succeeds
    MemoryOnly,
}

/// What a single [`Store::dispatch`] committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub revision: u64,
    pub durability: Durability,
}

impl Dispatched {
    pub fn is_persisted(&self) -> bool {
        self.durability == Durability::Persisted
    }
}

struct Committed {
    state: AppState,
    revision: u64,
}

struct Inner<S> {
    key: String,
    adapter: PersistenceAdapter<S>,
    committed: RwLock<Committed>,
    inbox: Mutex<VecDeque<String>>,
    memory_only: AtomicBool,
}

/// Handle to a context's store.
///
/// `Clone` is cheap: clones share the same state. Build one per context with
/// [`Store::open`] and hand it to whatever needs it.
pub struct Store<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Store {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("key", &self.inner.key).finish()
    }
}

impl<S: KeyValueStore + 'static> Store<S> {
    /// Load the state persisted under `key` (or `default`) and take
    /// ownership of it.
    pub fn open(adapter: PersistenceAdapter<S>, key: impl Into<String>, default: AppState) -> Self {
        let key = key.into();
        let state = adapter.load(&key, &default);

        tracing::debug!(
            key = %key,
            context = adapter.storage().context().as_u64(),
            transactions = state.transactions.len(),
            "store opened"
        );

        Store {
            inner: Arc::new(Inner {
                key,
                adapter,
                committed: RwLock::new(Committed { state, revision: 0 }),
                inbox: Mutex::new(VecDeque::new()),
                memory_only: AtomicBool::new(false),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn context(&self) -> ContextId {
        self.inner.adapter.storage().context()
    }

    /// Apply a command and persist the result. Never fails: a save error
    /// only moves the store to [`Durability::MemoryOnly`].
    ///
    /// The returned revision and durability describe this commit, before
    /// any external change queued behind it is applied.
    pub fn dispatch(&self, command: Command) -> Dispatched {
        let name = command.name();
        let dispatched = {
            let mut committed = self.inner.committed.write();
            committed.state = reduce(&committed.state, command);
            committed.revision += 1;

            let outcome = self.inner.adapter.save(&self.inner.key, &committed.state);
            self.inner.record_save(outcome);

            tracing::debug!(
                command = name,
                revision = committed.revision,
                saved = outcome.is_saved(),
                "command committed"
            );
            Dispatched {
                revision: committed.revision,
                durability: if outcome.is_saved() {
                    Durability::Persisted
                } else {
                    Durability::MemoryOnly
                },
            }
        };
        self.inner.drain_inbox();
        dispatched
    }

    /// Latest committed state
    pub fn state(&self) -> AppState {
        self.with_state(AppState::clone)
    }

    /// Read the latest committed state without cloning it
    pub fn with_state<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        self.inner.drain_inbox();
        let out = {
            let committed = self.inner.committed.read();
            f(&committed.state)
        };
        self.inner.drain_inbox();
        out
    }

    /// Number of commits (local or external) since the store was opened
    pub fn revision(&self) -> u64 {
        self.inner.drain_inbox();
        self.inner.committed.read().revision
    }

    pub fn durability(&self) -> Durability {
        if self.inner.memory_only.load(Ordering::Acquire) {
            Durability::MemoryOnly
        } else {
            Durability::Persisted
        }
    }

    /// Transactions of one enterprise, in insertion order
    pub fn records_for(&self, enterprise: Enterprise) -> Vec<Transaction> {
        self.with_state(|state| query::records_for(state, enterprise))
    }

    /// Follow writes that other contexts make to this store's key.
    ///
    /// Each change replaces the whole in-memory state. Delivery stops when
    /// the returned handle is dropped.
    pub fn subscribe(&self, bus: &ChangeBus) -> Subscription {
        let weak = Arc::downgrade(&self.inner);
        bus.subscribe(self.context(), self.inner.key.clone(), move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match &event.new_value {
                Some(raw) => inner.receive_external(raw.clone()),
                None => {
                    tracing::debug!(key = %event.key, "stored state removed externally, keeping memory copy");
                }
            }
        })
    }
}

impl<S: KeyValueStore> Inner<S> {
    fn record_save(&self, outcome: SaveOutcome) {
        let failed = !outcome.is_saved();
        let was_memory_only = self.memory_only.swap(failed, Ordering::AcqRel);

        if failed && !was_memory_only {
            tracing::warn!(key = %self.key, "store is memory-only until the next successful save");
        } else if !failed && was_memory_only {
            tracing::info!(key = %self.key, "storage recovered, state persisted again");
        }
    }

    fn receive_external(&self, raw: String) {
        self.inbox.lock().push_back(raw);
        self.drain_inbox();
    }

    /// Apply queued external changes if nobody holds the state lock.
    ///
    /// Whoever holds the lock drains after releasing it, so a queued change
    /// is never stranded.
    fn drain_inbox(&self) {
        loop {
            {
                let Some(mut committed) = self.committed.try_write() else {
                    return;
                };
                let pending: Vec<String> = self.inbox.lock().drain(..).collect();
                for raw in pending {
                    self.apply_external(&mut committed, &raw);
                }
            }
            if self.inbox.lock().is_empty() {
                return;
            }
        }
    }

    fn apply_external(&self, committed: &mut Committed, raw: &str) {
        // A payload that no longer matches storage was overtaken by a later
        // write (possibly our own); applying it would leave memory and
        // storage disagreeing.
        match self.adapter.storage().get(&self.key) {
            Ok(Some(current)) if current != raw => {
                tracing::debug!(key = %self.key, "discarding stale external change");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "cannot verify external change, applying it");
            }
        }

        let Some(incoming) = decode_state(raw) else {
            tracing::warn!(key = %self.key, "ignoring unreadable external change");
            return;
        };

        if incoming == committed.state {
            return;
        }

        committed.state = reduce(&committed.state, Command::ReplaceState(incoming));
        committed.revision += 1;
        tracing::debug!(
            key = %self.key,
            revision = committed.revision,
            "state replaced by external change"
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
