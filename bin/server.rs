// Farm Ledger - Web Server
// JSON API over the local-first store: reads via the query layer, writes as
// Commands.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use farm_ledger::query;
use farm_ledger::{
    init_logging, load_config, open_shared_store, Command, Enterprise, FarmTask, Settings,
    SqliteStorage, Store, Transaction,
};

type LedgerStore = Store<Arc<SqliteStorage>>;

/// Shared application state
#[derive(Clone)]
struct ServerState {
    store: LedgerStore,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

/// Result of a dispatched command
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchResponse {
    command: &'static str,
    revision: u64,
    persisted: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/state - Whole AppState
async fn get_state(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.store.state()))
}

/// GET /api/settings
async fn get_settings(State(state): State<ServerState>) -> Json<ApiResponse<Settings>> {
    Json(ApiResponse::ok(state.store.with_state(|s| s.settings.clone())))
}

/// GET /api/records/:enterprise - Transactions of one enterprise
async fn get_records(
    State(state): State<ServerState>,
    Path(enterprise): Path<String>,
) -> axum::response::Response {
    match enterprise.parse::<Enterprise>() {
        Ok(enterprise) => {
            let records: Vec<Transaction> = state.store.records_for(enterprise);
            (StatusCode::OK, Json(ApiResponse::ok(records))).into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, Json(ApiResponse::err(e))).into_response(),
    }
}

/// GET /api/tasks/upcoming - Pending tasks from today on
async fn get_upcoming_tasks(State(state): State<ServerState>) -> Json<ApiResponse<Vec<FarmTask>>> {
    let today = Local::now().date_naive();
    Json(ApiResponse::ok(
        state.store.with_state(|s| query::upcoming_tasks(s, today)),
    ))
}

/// POST /api/commands - Dispatch a command (`{"type": ..., "payload": ...}`)
async fn post_command(
    State(state): State<ServerState>,
    Json(command): Json<Command>,
) -> axum::response::Response {
    let name = command.name();
    let store = state.store.clone();

    // dispatch saves to SQLite synchronously
    match tokio::task::spawn_blocking(move || store.dispatch(command)).await {
        Ok(dispatched) => {
            let body = DispatchResponse {
                command: name,
                revision: dispatched.revision,
                persisted: dispatched.is_persisted(),
            };
            (StatusCode::OK, Json(ApiResponse::ok(body))).into_response()
        }
        Err(e) => {
            tracing::error!(command = name, error = %e, "dispatch task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err("dispatch failed")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("FARM_LEDGER_CONFIG").unwrap_or_else(|_| "farm-ledger.toml".to_string());
    let config = load_config(std::path::Path::new(&config_path))?;

    init_logging(&config.logging, false);

    let (store, _subscription, _watcher) = open_shared_store(&config.storage)?;
    tracing::info!(
        database = %config.storage.database_path.display(),
        key = %config.storage.key,
        "ledger opened"
    );

    let state = ServerState { store };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/state", get(get_state))
        .route("/settings", get(get_settings))
        .route("/records/:enterprise", get(get_records))
        .route("/tasks/upcoming", get(get_upcoming_tasks))
        .route("/commands", post(post_command))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("FARM_LEDGER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
