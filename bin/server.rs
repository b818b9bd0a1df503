// Account Indexer - Web Server
// REST API with Axum over one shared indexer.
//
// Ingestion and callback sweeps both go through the same mutex, so the
// ledger / ranking / scheduler triple is never observed mid-update.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use account_indexer::{
    Account, AccountFilter, AccountIndexer, AccountUpdate, FiredCallback, IndexEvent,
    IndexerConfig, IngestOutcome, IngestReport,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    indexer: Arc<Mutex<AccountIndexer>>,
}

/// Error response: status plus a `success: false` body
type ApiError = (StatusCode, Json<ApiResponse<()>>);

impl AppState {
    /// A poisoned lock means a mutation panicked halfway (a tripped invariant
    /// check), so the state is never handed out again
    fn lock(&self) -> Result<MutexGuard<'_, AccountIndexer>, ApiError> {
        self.indexer.lock().map_err(|_| {
            error!("indexer state poisoned by an earlier panic, refusing request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err("indexer state is corrupt")),
            )
        })
    }
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
    fn err(message: &str) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.to_string()),
        }
    }
}

/// Query of GET /api/events
#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

const DEFAULT_EVENTS_LIMIT: usize = 100;

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<IndexEvent>,
    retained: usize,
    dropped: u64,
}

/// Body of POST /api/updates - a single record or an array
#[derive(Deserialize)]
#[serde(untagged)]
enum UpdateBody {
    Many(Vec<AccountUpdate>),
    One(AccountUpdate),
}

/// Per-record outcome (simplified for API)
#[derive(Serialize)]
struct OutcomeResponse {
    id: Option<String>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    superseded: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_version: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

impl OutcomeResponse {
    fn new(update: &AccountUpdate, outcome: IngestOutcome) -> Self {
        let mut response = OutcomeResponse {
            id: update.id.clone(),
            status: "accepted",
            superseded: None,
            current_version: None,
            errors: Vec::new(),
        };
        match outcome {
            IngestOutcome::Accepted { superseded, .. } => response.superseded = superseded,
            IngestOutcome::RejectedStale { current_version, .. } => {
                response.status = "rejected_stale";
                response.current_version = Some(current_version);
            }
            IngestOutcome::RejectedMalformed(errors) => {
                response.status = "rejected_malformed";
                response.errors = errors.iter().map(|e| e.to_string()).collect();
            }
        }
        response
    }
}

#[derive(Serialize)]
struct IngestResponse {
    outcomes: Vec<OutcomeResponse>,
    report: IngestReport,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/updates - Reconcile one or more updates
async fn post_updates(
    State(state): State<AppState>,
    Json(body): Json<UpdateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let updates = match body {
        UpdateBody::Many(updates) => updates,
        UpdateBody::One(update) => vec![update],
    };

    let mut indexer = state.lock()?;
    let mut report = IngestReport::default();
    let mut outcomes = Vec::with_capacity(updates.len());

    for update in &updates {
        let outcome = indexer.process_update(update, Utc::now());
        report.record(&outcome);
        report.fired.extend(indexer.tick(Utc::now()));
        outcomes.push(OutcomeResponse::new(update, outcome));
    }

    Ok((StatusCode::OK, Json(ApiResponse::ok(IngestResponse { outcomes, report }))))
}

/// POST /api/tick - Fire every callback that is due now
async fn post_tick(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let fired: Vec<FiredCallback> = state.lock()?.tick(Utc::now());
    Ok(Json(ApiResponse::ok(fired)))
}

/// GET /api/accounts?account_type=&min_tokens=&max_tokens= - Filter the ledger
async fn get_accounts(
    State(state): State<AppState>,
    Query(filter): Query<AccountFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts: Vec<Account> = state.lock()?.query(&filter);
    Ok(Json(ApiResponse::ok(accounts)))
}

/// GET /api/top/:account_type - Ranked accounts for one type
async fn get_top(
    State(state): State<AppState>,
    Path(account_type): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let top: Vec<Account> = state.lock()?.top_accounts(&account_type).to_vec();
    Ok(Json(ApiResponse::ok(top)))
}

/// GET /api/events?limit=N - Most recent audit events
async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let indexer = state.lock()?;
    let journal = indexer.journal();
    let limit = query.limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
    let response = EventsResponse {
        events: journal.recent(limit).cloned().collect(),
        retained: journal.len(),
        dropped: journal.dropped(),
    };
    Ok(Json(ApiResponse::ok(response)))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("INDEXER_CONFIG") {
        Ok(path) => IndexerConfig::from_file(&path)?,
        Err(_) => IndexerConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_target(false).with_env_filter(filter).init();

    let state = AppState {
        indexer: Arc::new(Mutex::new(AccountIndexer::from_config(&config))),
    };

    // Background sweep so callbacks fire without client traffic
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            let fired = match sweeper.lock() {
                Ok(mut indexer) => indexer.tick(Utc::now()),
                Err(_) => {
                    error!("background sweep stopped");
                    break;
                }
            };
            if !fired.is_empty() {
                info!(count = fired.len(), "background sweep fired callbacks");
            }
        }
    });

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/updates", post(post_updates))
        .route("/tick", post(post_tick))
        .route("/accounts", get(get_accounts))
        .route("/top/:account_type", get(get_top))
        .route("/events", get(get_events))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("INDEXER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "server running");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server stopped");
        return Err(e.into());
    }
    Ok(())
}
