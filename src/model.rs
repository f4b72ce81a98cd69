// 🐄 Data Model - transactions, tasks, settings and the persisted aggregate
// Everything the store owns lives in AppState; nothing is persisted on its own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENUMS
// ============================================================================

/// Livestock line of business a transaction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enterprise {
    Dairy,
    Poultry,
}

impl Enterprise {
    pub const ALL: [Enterprise; 2] = [Enterprise::Dairy, Enterprise::Poultry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Enterprise::Dairy => "dairy",
            Enterprise::Poultry => "poultry",
        }
    }
}

impl fmt::Display for Enterprise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Enterprise {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dairy" => Ok(Enterprise::Dairy),
            "poultry" => Ok(Enterprise::Poultry),
            other => Err(format!("unknown enterprise '{}' (expected dairy or poultry)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(format!("unknown transaction type '{}' (expected income or expense)", other)),
        }
    }
}

/// Which line of business a task is attached to. Tasks may also be farm-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskScope {
    Dairy,
    Poultry,
    General,
}

impl From<Enterprise> for TaskScope {
    fn from(enterprise: Enterprise) -> Self {
        match enterprise {
            Enterprise::Dairy => TaskScope::Dairy,
            Enterprise::Poultry => TaskScope::Poultry,
        }
    }
}

impl FromStr for TaskScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dairy" => Ok(TaskScope::Dairy),
            "poultry" => Ok(TaskScope::Poultry),
            "general" => Ok(TaskScope::General),
            other => Err(format!("unknown task scope '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// A single financial record.
///
/// Wire names match the persisted document and the insights collaborator
/// (`livestockType`, `transactionType`). `enterprise` / `kind` are accepted
/// when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller-generated identity, never reassigned
    pub id: String,

    /// ISO 8601 calendar timestamp
    pub date: String,

    #[serde(rename = "livestockType", alias = "enterprise")]
    pub enterprise: Enterprise,

    #[serde(rename = "transactionType", alias = "kind")]
    pub kind: TransactionKind,

    /// Free-form; not checked against any vocabulary
    pub category: String,

    pub amount: f64,

    #[serde(default)]
    pub description: String,
}

impl Transaction {
    /// Build a transaction with a fresh UUID v4 identity.
    ///
    /// Id generation is a caller concern: the reducer never assigns ids.
    pub fn new(
        date: impl Into<String>,
        enterprise: Enterprise,
        kind: TransactionKind,
        category: impl Into<String>,
        amount: f64,
        description: impl Into<String>,
    ) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            date: date.into(),
            enterprise,
            kind,
            category: category.into(),
            amount,
            description: description.into(),
        }
    }

    pub fn is_income(&self) -> bool {
        self.kind == TransactionKind::Income
    }
}

/// Amounts a user may enter: finite and not negative
pub fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0
}

// ============================================================================
// FARM TASK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmTask {
    pub id: String,
    pub date: String,
    pub title: String,

    #[serde(rename = "livestockType", alias = "scope", default = "default_task_scope")]
    pub scope: TaskScope,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: TaskStatus,
}

fn default_task_scope() -> TaskScope {
    TaskScope::General
}

impl FarmTask {
    pub fn new(date: impl Into<String>, title: impl Into<String>, scope: TaskScope) -> Self {
        FarmTask {
            id: uuid::Uuid::new_v4().to_string(),
            date: date.into(),
            title: title.into(),
            scope,
            description: String::new(),
            status: TaskStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

pub const DEFAULT_FARM_NAME: &str = "My Farm";
pub const DEFAULT_MANAGER_NAME: &str = "Farm Manager";
pub const DEFAULT_LOCATION: &str = "Green Valley";
pub const DEFAULT_CURRENCY: &str = "USD";

/// Farm-wide settings. Each absent field falls back to its own default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub farm_name: String,
    pub manager_name: String,
    pub location: String,
    pub currency: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            farm_name: DEFAULT_FARM_NAME.to_string(),
            manager_name: DEFAULT_MANAGER_NAME.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl Settings {
    /// Shallow merge: supplied fields win, omitted fields are kept
    pub fn merged(&self, patch: &SettingsPatch) -> Settings {
        Settings {
            farm_name: patch.farm_name.clone().unwrap_or_else(|| self.farm_name.clone()),
            manager_name: patch
                .manager_name
                .clone()
                .unwrap_or_else(|| self.manager_name.clone()),
            location: patch.location.clone().unwrap_or_else(|| self.location.clone()),
            currency: patch.currency.clone().unwrap_or_else(|| self.currency.clone()),
        }
    }
}

/// Partial settings update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.farm_name.is_none()
            && self.manager_name.is_none()
            && self.location.is_none()
            && self.currency.is_none()
    }
}

// ============================================================================
// APP STATE
// ============================================================================

/// The aggregate root: the only unit ever persisted or restored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub transactions: Vec<Transaction>,
    pub settings: Settings,
    pub tasks: Vec<FarmTask>,
}

impl AppState {
    pub fn contains_transaction(&self, id: &str) -> bool {
        self.transactions.iter().any(|t| t.id == id)
    }

    pub fn contains_task(&self, id: &str) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }

    /// Id of the first transaction whose amount JSON cannot represent
    pub fn non_finite_amount(&self) -> Option<&str> {
        self.transactions
            .iter()
            .find(|t| !t.amount.is_finite())
            .map(|t| t.id.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================
