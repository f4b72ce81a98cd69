// 🔁 Commands & Reducer
// Every mutation of AppState is a Command; `reduce` is the only place that
// computes a next state.

use crate::model::{AppState, FarmTask, SettingsPatch, Transaction};
use serde::{Deserialize, Serialize};

// ============================================================================
// COMMAND
// ============================================================================

/// Closed set of state mutations.
///
/// Serialized as `{ "type": "ADD_TRANSACTION", "payload": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Append; ignored if the id is already taken
    AddTransaction(Transaction),

    /// Whole-record replace; ignored if the id is unknown
    UpdateTransaction(Transaction),

    DeleteTransaction(String),

    DeleteTransactions(Vec<String>),

    UpdateSettings(SettingsPatch),

    AddTask(FarmTask),

    UpdateTask(FarmTask),

    DeleteTask(String),

    /// Discard everything and adopt the given state
    ReplaceState(AppState),
}

impl Command {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddTransaction(_) => "ADD_TRANSACTION",
            Command::UpdateTransaction(_) => "UPDATE_TRANSACTION",
            Command::DeleteTransaction(_) => "DELETE_TRANSACTION",
            Command::DeleteTransactions(_) => "DELETE_TRANSACTIONS",
            Command::UpdateSettings(_) => "UPDATE_SETTINGS",
            Command::AddTask(_) => "ADD_TASK",
            Command::UpdateTask(_) => "UPDATE_TASK",
            Command::DeleteTask(_) => "DELETE_TASK",
            Command::ReplaceState(_) => "REPLACE_STATE",
        }
    }
}

// ============================================================================
// REDUCER
// ============================================================================

/// Compute the next state. Pure: no I/O, no mutation of `state`.
///
/// Precondition violations (duplicate add, update of an unknown id) leave the
/// state unchanged.
pub fn reduce(state: &AppState, command: Command) -> AppState {
    match command {
        Command::AddTransaction(tx) => {
            if state.contains_transaction(&tx.id) {
                return state.clone();
            }
            let mut next = state.clone();
            next.transactions.push(tx);
            next
        }
        Command::UpdateTransaction(tx) => AppState {
            transactions: state
                .transactions
                .iter()
                .map(|existing| if existing.id == tx.id { tx.clone() } else { existing.clone() })
                .collect(),
            ..state.clone()
        },
        Command::DeleteTransaction(id) => AppState {
            transactions: state
                .transactions
                .iter()
                .filter(|t| t.id != id)
                .cloned()
                .collect(),
            ..state.clone()
        },
        Command::DeleteTransactions(ids) => AppState {
            transactions: state
                .transactions
                .iter()
                .filter(|t| !ids.contains(&t.id))
                .cloned()
                .collect(),
            ..state.clone()
        },
        Command::UpdateSettings(patch) => AppState {
            settings: state.settings.merged(&patch),
            ..state.clone()
        },
        Command::AddTask(task) => {
            if state.contains_task(&task.id) {
                return state.clone();
            }
            let mut next = state.clone();
            next.tasks.push(task);
            next
        }
        Command::UpdateTask(task) => AppState {
            tasks: state
                .tasks
                .iter()
                .map(|existing| if existing.id == task.id { task.clone() } else { existing.clone() })
                .collect(),
            ..state.clone()
        },
        Command::DeleteTask(id) => AppState {
            tasks: state.tasks.iter().filter(|t| t.id != id).cloned().collect(),
            ..state.clone()
        },
        Command::ReplaceState(full) => full,
    }
}

// ============================================================================
// TESTS
// ============================================================================
