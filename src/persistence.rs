// 💾 Persistence Adapter - JSON (de)serialization of AppState over a
// KeyValueStore, with every failure absorbed here.

use crate::model::AppState;
use crate::storage::KeyValueStore;

/// Result of a save. Failures have already been logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { bytes: usize },
    Failed,
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

/// Parse a stored document. `None` if it is not an `AppState`.
///
/// Missing fields are filled with their defaults rather than rejected.
pub fn decode_state(raw: &str) -> Option<AppState> {
    match serde_json::from_str::<AppState>(raw) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(error = %e, "stored state is not valid JSON for AppState");
            None
        }
    }
}

pub struct PersistenceAdapter<S> {
    storage: S,
}

impl<S: KeyValueStore> PersistenceAdapter<S> {
    pub fn new(storage: S) -> Self {
        PersistenceAdapter { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read the state under `key`, or `default` if it is absent, unreadable
    /// or the storage itself fails. Never errors.
    pub fn load(&self, key: &str, default: &AppState) -> AppState {
        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %key, "no stored state, using default");
                return default.clone();
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "storage unavailable, using default state");
                return default.clone();
            }
        };

        match decode_state(&raw) {
            Some(state) => {
                tracing::debug!(
                    key = %key,
                    transactions = state.transactions.len(),
                    tasks = state.tasks.len(),
                    "loaded stored state"
                );
                state
            }
            None => default.clone(),
        }
    }

    /// Serialize the complete state and replace the stored value.
    ///
    /// A state holding a NaN or infinite amount is refused: JSON would store
    /// it as `null` and the document could never be loaded again.
    pub fn save(&self, key: &str, state: &AppState) -> SaveOutcome {
        if let Some(id) = state.non_finite_amount() {
            tracing::warn!(key = %key, transaction = %id, "refusing to save non-finite amount");
            return SaveOutcome::Failed;
        }

        let json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to serialize state");
                return SaveOutcome::Failed;
            }
        };

        match self.storage.set(key, &json) {
            Ok(()) => SaveOutcome::Saved { bytes: json.len() },
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to save state, keeping it in memory only");
                SaveOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ChangeBus, ContextId};
    use crate::error::StorageError;
    use crate::model::{Enterprise, Settings, Transaction, TransactionKind};
    use crate::storage::MemoryStorage;
    use proptest::prelude::*;

    const KEY: &str = "agri-finance-pro-data";

    struct Unreachable {
        context: ContextId,
    }

    impl KeyValueStore for Unreachable {
        fn context(&self) -> ContextId {
            self.context
        }

        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("private browsing".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("private browsing".to_string()))
        }
    }

    fn sample_state() -> AppState {
        AppState {
            transactions: vec![Transaction {
                id: "t1".to_string(),
                date: "2024-01-01T00:00:00.000Z".to_string(),
                enterprise: Enterprise::Dairy,
                kind: TransactionKind::Income,
                category: "Milk Sales".to_string(),
                amount: 120.0,
                description: "morning delivery".to_string(),
            }],
            settings: Settings {
                farm_name: "Hilltop".to_string(),
                ..Settings::default()
            },
            tasks: Vec::new(),
        }
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let adapter = PersistenceAdapter::new(MemoryStorage::new(ChangeBus::new()));
        let state = sample_state();

        assert!(adapter.save(KEY, &state).is_saved());
        assert_eq!(adapter.load(KEY, &AppState::default()), state);
    }

    #[test]
    fn test_save_refuses_non_finite_amount() {
        let storage = MemoryStorage::new(ChangeBus::new());
        let reader = storage.attach();
        let adapter = PersistenceAdapter::new(storage);

        let good = sample_state();
        assert!(adapter.save(KEY, &good).is_saved());

        let mut bad = good.clone();
        bad.transactions.push(Transaction {
            id: "t2".to_string(),
            amount: f64::NAN,
            ..good.transactions[0].clone()
        });
        assert_eq!(adapter.save(KEY, &bad), SaveOutcome::Failed);

        // The last readable document is left in place
        let kept = PersistenceAdapter::new(reader).load(KEY, &AppState::default());
        assert_eq!(kept, good);
    }

    proptest! {
        #[test]
        fn prop_amounts_survive_save_and_load(amount in 0.0f64..1e12, cents in 0u64..100_000_000) {
            let adapter = PersistenceAdapter::new(MemoryStorage::new(ChangeBus::new()));
            let mut state = sample_state();
            let template = state.transactions[0].clone();
            state.transactions = vec![
                Transaction { amount, ..template.clone() },
                Transaction { id: "t2".to_string(), amount: cents as f64 * 0.01, ..template },
            ];

            prop_assert!(adapter.save(KEY, &state).is_saved());
            prop_assert_eq!(adapter.load(KEY, &AppState::default()), state);
        }
    }

    #[test]
    fn test_load_absent_key_returns_default() {
        let adapter = PersistenceAdapter::new(MemoryStorage::new(ChangeBus::new()));
        assert_eq!(adapter.load(KEY, &AppState::default()), AppState::default());
    }

    #[test]
    fn test_load_not_json_returns_default() {
        let storage = MemoryStorage::new(ChangeBus::new());
        storage.write_raw(KEY, "not json");
        let adapter = PersistenceAdapter::new(storage);

        assert_eq!(adapter.load(KEY, &AppState::default()), AppState::default());
    }

    #[test]
    fn test_load_unavailable_storage_returns_caller_default() {
        let adapter = PersistenceAdapter::new(Unreachable {
            context: ContextId::next(),
        });
        let fallback = sample_state();
        assert_eq!(adapter.load(KEY, &fallback), fallback);
    }

    #[test]
    fn test_save_failure_is_reported_not_raised() {
        let adapter = PersistenceAdapter::new(Unreachable {
            context: ContextId::next(),
        });
        assert_eq!(adapter.save(KEY, &sample_state()), SaveOutcome::Failed);
    }

    #[test]
    fn test_load_document_from_original_app() {
        let storage = MemoryStorage::new(ChangeBus::new());
        storage.write_raw(
            KEY,
            r#"{"transactions":[{"id":"2024-01-01T00:00:00.000Z0.42","date":"2024-01-01T00:00:00.000Z","livestockType":"poultry","transactionType":"expense","category":"Feed","amount":35,"description":""}],"settings":{"farmName":"My Farm","managerName":"Farm Manager","location":"Green Valley","currency":"USD"}}"#,
        );
        let adapter = PersistenceAdapter::new(storage);

        let state = adapter.load(KEY, &AppState::default());
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(state.transactions[0].enterprise, Enterprise::Poultry);
        assert_eq!(state.transactions[0].amount, 35.0);
        assert!(state.tasks.is_empty());
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        assert!(decode_state(r#"{"transactions": 5}"#).is_none());
        assert!(decode_state("null").is_none());
    }
}
