use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use farm_ledger::query::{self, calendar_date};
use farm_ledger::{
    init_logging, is_valid_amount, load_config, open_shared_store, AppState, Command, Dispatched,
    Enterprise, FarmTask, KeyValueStore, SettingsPatch, Store, TaskScope, TaskStatus, Transaction,
    TransactionKind,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "farm-ledger: local-first records for dairy and poultry farms", long_about = None)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, default_value = "farm-ledger.toml")]
    config: PathBuf,

    /// Ledger database file, overrides the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a new transaction
    Add {
        #[arg(long)]
        enterprise: Enterprise,
        #[arg(long)]
        kind: TransactionKind,
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount: f64,
        /// Defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Replace fields of an existing transaction
    Update {
        id: String,
        #[arg(long)]
        enterprise: Option<Enterprise>,
        #[arg(long)]
        kind: Option<TransactionKind>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete one or more transactions
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List transactions
    List {
        #[arg(long)]
        enterprise: Option<Enterprise>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Show or change farm settings
    Settings {
        #[arg(long)]
        farm_name: Option<String>,
        #[arg(long)]
        manager_name: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        currency: Option<String>,
    },
    /// Farm tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Print the whole state as JSON
    Export,
    /// Replace the whole state with a JSON document
    Import { file: PathBuf },
    /// Follow changes made by other processes
    Watch,
}

#[derive(Subcommand, Debug)]
enum TaskAction {
    Add {
        title: String,
        /// dairy, poultry or general
        #[arg(long, default_value = "general")]
        scope: TaskScope,
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Pending tasks from today on
    List {
        #[arg(long)]
        all: bool,
    },
    Done { id: String },
    Delete { id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(database) = cli.database.clone() {
        config.storage.database_path = database;
    }
    init_logging(&config.logging, cli.verbose);

    let (store, _subscription, _watcher) = open_shared_store(&config.storage)?;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Add {
            enterprise,
            kind,
            category,
            amount,
            date,
            description,
        } => {
            check_amount(amount)?;
            let date = date.unwrap_or_else(|| today.to_string());
            let tx = Transaction::new(date, enterprise, kind, category, amount, description);
            let summary = format!("{} {} {} ({})", tx.enterprise, tx.kind, tx.amount, tx.id);
            commit(&store, Command::AddTransaction(tx))?;
            println!("✓ Added {}", summary);
        }
        Commands::Update {
            id,
            enterprise,
            kind,
            category,
            amount,
            date,
            description,
        } => {
            let Some(mut tx) = store.with_state(|s| query::find_transaction(s, &id).cloned()) else {
                bail!("no transaction with id {}", id);
            };
            if let Some(v) = enterprise {
                tx.enterprise = v;
            }
            if let Some(v) = kind {
                tx.kind = v;
            }
            if let Some(v) = category {
                tx.category = v;
            }
            if let Some(v) = amount {
                check_amount(v)?;
                tx.amount = v;
            }
            if let Some(v) = date {
                tx.date = v;
            }
            if let Some(v) = description {
                tx.description = v;
            }
            commit(&store, Command::UpdateTransaction(tx))?;
            println!("✓ Updated {}", id);
        }
        Commands::Delete { mut ids } => {
            let count = ids.len();
            if count == 1 {
                commit(&store, Command::DeleteTransaction(ids.remove(0)))?;
            } else {
                commit(&store, Command::DeleteTransactions(ids))?;
            }
            println!("✓ Deleted {} transaction(s)", count);
        }
        Commands::List {
            enterprise,
            from,
            to,
        } => {
            let state = store.state();
            print_transactions(&state, enterprise, from, to);
        }
        Commands::Settings {
            farm_name,
            manager_name,
            location,
            currency,
        } => {
            let patch = SettingsPatch {
                farm_name,
                manager_name,
                location,
                currency,
            };
            if !patch.is_empty() {
                commit(&store, Command::UpdateSettings(patch))?;
            }
            let settings = store.state().settings;
            println!("Farm:     {}", settings.farm_name);
            println!("Manager:  {}", settings.manager_name);
            println!("Location: {}", settings.location);
            println!("Currency: {}", settings.currency);
        }
        Commands::Task { action } => run_task(&store, action, today)?,
        Commands::Export => {
            let json = serde_json::to_string_pretty(&store.state())?;
            println!("{}", json);
        }
        Commands::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let state: AppState = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a ledger export", file.display()))?;
            let count = state.transactions.len();
            commit(&store, Command::ReplaceState(state))?;
            println!("✓ Imported {} transactions", count);
        }
        Commands::Watch => watch(&store),
    }

    Ok(())
}

/// Dispatch and fail if the change did not reach storage: a one-shot run
/// would otherwise exit with it held only in memory.
fn commit<S>(store: &Store<S>, command: Command) -> Result<Dispatched>
where
    S: KeyValueStore + 'static,
{
    let dispatched = store.dispatch(command);
    if !dispatched.is_persisted() {
        bail!("could not save the ledger under '{}', change discarded", store.key());
    }
    Ok(dispatched)
}

fn check_amount(amount: f64) -> Result<()> {
    if !is_valid_amount(amount) {
        bail!("amount must be a finite number, zero or more (got {})", amount);
    }
    Ok(())
}

fn run_task<S>(store: &Store<S>, action: TaskAction, today: NaiveDate) -> Result<()>
where
    S: KeyValueStore + 'static,
{
    match action {
        TaskAction::Add {
            title,
            scope,
            date,
            description,
        } => {
            let mut task = FarmTask::new(date.unwrap_or_else(|| today.to_string()), title, scope);
            task.description = description;
            let id = task.id.clone();
            commit(store, Command::AddTask(task))?;
            println!("✓ Added task {}", id);
        }
        TaskAction::List { all } => {
            let tasks = if all {
                store.state().tasks
            } else {
                store.with_state(|s| query::upcoming_tasks(s, today))
            };
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                let mark = if task.is_pending() { " " } else { "x" };
                println!("[{}] {}  {}  {}", mark, task.date, task.title, task.id);
            }
        }
        TaskAction::Done { id } => {
            let Some(mut task) = store.with_state(|s| s.tasks.iter().find(|t| t.id == id).cloned()) else {
                bail!("no task with id {}", id);
            };
            task.status = TaskStatus::Completed;
            commit(store, Command::UpdateTask(task))?;
            println!("✓ Completed {}", id);
        }
        TaskAction::Delete { id } => {
            commit(store, Command::DeleteTask(id.clone()))?;
            println!("✓ Deleted task {}", id);
        }
    }
    Ok(())
}

fn print_transactions(
    state: &AppState,
    enterprise: Option<Enterprise>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) {
    let mut records = match enterprise {
        Some(e) => query::records_for(state, e),
        None => state.transactions.clone(),
    };
    if from.is_some() || to.is_some() {
        let from = from.unwrap_or(NaiveDate::MIN);
        let to = to.unwrap_or(NaiveDate::MAX);
        records.retain(|t| calendar_date(&t.date).is_some_and(|d| d >= from && d <= to));
    }

    if records.is_empty() {
        println!("No transactions.");
        return;
    }
    for tx in &records {
        println!(
            "{:<12} {:<8} {:<8} {:<20} {:>10.2} {}  {}",
            tx.date.get(..10).unwrap_or(tx.date.as_str()),
            tx.enterprise,
            tx.kind,
            tx.category,
            tx.amount,
            state.settings.currency,
            tx.id
        );
    }
    println!("{} transaction(s)", records.len());
}

fn watch<S>(store: &Store<S>)
where
    S: KeyValueStore + 'static,
{
    println!("👀 Watching {} (Ctrl-C to stop)", store.key());
    let mut seen = store.revision();
    loop {
        std::thread::sleep(Duration::from_millis(250));
        let revision = store.revision();
        if revision != seen {
            seen = revision;
            let state = store.state();
            println!(
                "↻ revision {}: {} transactions, {} tasks",
                revision,
                state.transactions.len(),
                state.tasks.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farm_ledger::{ChangeBus, MemoryStorage, PersistenceAdapter, DEFAULT_STORAGE_KEY};

    fn open(storage: MemoryStorage) -> Store<MemoryStorage> {
        Store::open(PersistenceAdapter::new(storage), DEFAULT_STORAGE_KEY, AppState::default())
    }

    #[test]
    fn test_check_amount_rejects_nan_and_infinity() {
        assert!(check_amount(12.5).is_ok());
        assert!(check_amount(0.0).is_ok());
        assert!(check_amount(-1.0).is_err());
        assert!(check_amount(f64::NAN).is_err());
        assert!(check_amount(f64::INFINITY).is_err());
        assert!("NaN".parse::<f64>().map(check_amount).unwrap().is_err());
    }

    #[test]
    fn test_commit_fails_when_save_fails() {
        let store = open(MemoryStorage::new(ChangeBus::new()).with_quota(10));
        let tx = Transaction::new("2024-01-01", Enterprise::Dairy, TransactionKind::Income, "Milk Sales", 5.0, "");

        let err = commit(&store, Command::AddTransaction(tx)).unwrap_err();
        assert!(err.to_string().contains("could not save"));
    }

    #[test]
    fn test_commit_reports_saved_change() {
        let store = open(MemoryStorage::new(ChangeBus::new()));
        let tx = Transaction::new("2024-01-01", Enterprise::Poultry, TransactionKind::Expense, "Feed", 5.0, "");

        let dispatched = commit(&store, Command::AddTransaction(tx)).unwrap();
        assert_eq!(dispatched.revision, 1);
        assert!(dispatched.is_persisted());
    }
}
