// 🔎 View Query Layer - read-only accessors over AppState
// Recomputed on every call; nothing here is cached or mutates state.

use crate::model::{AppState, Enterprise, FarmTask, TaskScope, Transaction};
use chrono::{DateTime, NaiveDate};

/// Calendar date of an ISO 8601 timestamp (`2024-01-01` or RFC 3339).
///
/// The date is taken as written, without converting time zones.
pub fn calendar_date(date: &str) -> Option<NaiveDate> {
    let trimmed = date.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    let day = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Transactions of one enterprise, in their original relative order
pub fn records_for(state: &AppState, enterprise: Enterprise) -> Vec<Transaction> {
    state
        .transactions
        .iter()
        .filter(|t| t.enterprise == enterprise)
        .cloned()
        .collect()
}

/// Transactions dated within `from..=to`. Undated or unparsable records are
/// left out.
pub fn records_between(state: &AppState, from: NaiveDate, to: NaiveDate) -> Vec<Transaction> {
    state
        .transactions
        .iter()
        .filter(|t| calendar_date(&t.date).is_some_and(|d| d >= from && d <= to))
        .cloned()
        .collect()
}

pub fn records_on(state: &AppState, day: NaiveDate) -> Vec<Transaction> {
    records_between(state, day, day)
}

pub fn find_transaction<'a>(state: &'a AppState, id: &str) -> Option<&'a Transaction> {
    state.transactions.iter().find(|t| t.id == id)
}

// ============================================================================
// TASKS
// ============================================================================

pub fn tasks_for(state: &AppState, scope: TaskScope) -> Vec<FarmTask> {
    state
        .tasks
        .iter()
        .filter(|t| t.scope == scope)
        .cloned()
        .collect()
}

/// Pending tasks dated `today` or later, soonest first
pub fn upcoming_tasks(state: &AppState, today: NaiveDate) -> Vec<FarmTask> {
    let mut tasks: Vec<(NaiveDate, FarmTask)> = state
        .tasks
        .iter()
        .filter(|t| t.is_pending())
        .filter_map(|t| calendar_date(&t.date).map(|d| (d, t.clone())))
        .filter(|(d, _)| *d >= today)
        .collect();
    tasks.sort_by_key(|(d, _)| *d);
    tasks.into_iter().map(|(_, t)| t).collect()
}

pub fn tasks_on(state: &AppState, day: NaiveDate) -> Vec<FarmTask> {
    state
        .tasks
        .iter()
        .filter(|t| calendar_date(&t.date) == Some(day))
        .cloned()
        .collect()
}

/// Distinct task dates, newest first
pub fn task_dates(state: &AppState) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = state
        .tasks
        .iter()
        .filter_map(|t| calendar_date(&t.date))
        .collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();
    dates
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TaskStatus, TransactionKind};

    fn tx(id: &str, enterprise: Enterprise, date: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: date.to_string(),
            enterprise,
            kind: TransactionKind::Expense,
            category: "Feed".to_string(),
            amount: 10.0,
            description: String::new(),
        }
    }

    fn task(id: &str, date: &str, status: TaskStatus) -> FarmTask {
        FarmTask {
            id: id.to_string(),
            date: date.to_string(),
            title: format!("task {}", id),
            scope: TaskScope::General,
            description: String::new(),
            status,
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample() -> AppState {
        AppState {
            transactions: vec![
                tx("a", Enterprise::Dairy, "2024-01-05"),
                tx("b", Enterprise::Poultry, "2024-01-06T08:30:00.000Z"),
                tx("c", Enterprise::Dairy, "2024-02-01T00:00:00Z"),
                tx("d", Enterprise::Dairy, "sometime"),
            ],
            ..AppState::default()
        }
    }

    #[test]
    fn test_records_for_preserves_order() {
        let ids: Vec<String> = records_for(&sample(), Enterprise::Dairy)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_records_for_empty_enterprise() {
        let state = AppState {
            transactions: vec![tx("a", Enterprise::Dairy, "2024-01-05")],
            ..AppState::default()
        };
        assert!(records_for(&state, Enterprise::Poultry).is_empty());
    }

    #[test]
    fn test_records_between_is_inclusive() {
        let ids: Vec<String> = records_between(&sample(), day("2024-01-05"), day("2024-01-06"))
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_unparsable_date_never_matches() {
        let all = records_between(&sample(), NaiveDate::MIN, NaiveDate::MAX);
        assert!(all.iter().all(|t| t.id != "d"));
    }

    #[test]
    fn test_records_on_single_day() {
        let found = records_on(&sample(), day("2024-02-01"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c");
    }

    #[test]
    fn test_find_transaction() {
        let state = sample();
        assert_eq!(find_transaction(&state, "b").map(|t| t.enterprise), Some(Enterprise::Poultry));
        assert!(find_transaction(&state, "zzz").is_none());
    }

    #[test]
    fn test_upcoming_tasks_sorted_and_pending_only() {
        let state = AppState {
            tasks: vec![
                task("late", "2024-03-10", TaskStatus::Pending),
                task("past", "2024-02-01", TaskStatus::Pending),
                task("done", "2024-03-02", TaskStatus::Completed),
                task("soon", "2024-03-01T09:00:00Z", TaskStatus::Pending),
            ],
            ..AppState::default()
        };

        let ids: Vec<String> = upcoming_tasks(&state, day("2024-03-01"))
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["soon", "late"]);
    }

    #[test]
    fn test_task_dates_distinct_newest_first() {
        let state = AppState {
            tasks: vec![
                task("a", "2024-03-01", TaskStatus::Pending),
                task("b", "2024-03-05", TaskStatus::Pending),
                task("c", "2024-03-01T10:00:00Z", TaskStatus::Completed),
            ],
            ..AppState::default()
        };
        assert_eq!(task_dates(&state), vec![day("2024-03-05"), day("2024-03-01")]);
        assert_eq!(tasks_on(&state, day("2024-03-01")).len(), 2);
    }

    #[test]
    fn test_calendar_date_formats() {
        assert_eq!(calendar_date("2024-01-01"), Some(day("2024-01-01")));
        assert_eq!(calendar_date("2024-01-01T23:59:59.999Z"), Some(day("2024-01-01")));
        assert_eq!(calendar_date("not a date"), None);
    }
}
