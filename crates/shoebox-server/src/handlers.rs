//! HTTP request handlers.
//!
//! Thin wrappers that parse identifiers, call the engine or scheduler and map
//! errors onto status codes.

use crate::dto::{
    parse_id, DriftBody, ErrorResponse, HealthResponse, LedgerCheckRequest, LedgerCheckResponse,
    PhotoResponse, QuotaLimitRequest, QuotaResponse, RuleSetRequest, RuleSetResponse, RunRequest,
    SweepResponse, UploadRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router as AxumRouter,
};
use shoebox_domain::{AlbumId, LifecycleStore, OwnerId, PhotoId, RuleSetId};
use shoebox_engine::{LifecycleEngine, LifecycleError};
use shoebox_scheduler::{Scheduler, SchedulerError};
use shoebox_store::SqliteStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle engine
    pub engine: Arc<LifecycleEngine<SqliteStore>>,
    /// Scheduler shared with the background worker
    pub scheduler: Arc<Scheduler<SqliteStore>>,
    /// Cancelled on shutdown; stops manual sweeps too
    pub shutdown: CancellationToken,
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Engine error
    Lifecycle(LifecycleError),
    /// Scheduler error
    Scheduler(SchedulerError),
    /// Malformed identifier or payload field
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Lifecycle(e) => match e {
                LifecycleError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LifecycleError::Conflict { .. }
                | LifecycleError::CooldownActive { .. }
                | LifecycleError::AlreadyFrozen(_)
                | LifecycleError::NotFrozen(_)
                | LifecycleError::PhotoDeleted(_)
                | LifecycleError::QuotaExceeded { .. } => StatusCode::CONFLICT,
                LifecycleError::PhotoNotFound(_) | LifecycleError::RuleSetNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                LifecycleError::SizeOutOfRange { .. } => StatusCode::BAD_REQUEST,
                LifecycleError::CollaboratorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                LifecycleError::Integrity(_) | LifecycleError::Config(_) | LifecycleError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Scheduler(SchedulerError::AlreadyRunning) => StatusCode::CONFLICT,
            AppError::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, reasons) = match self {
            AppError::Lifecycle(LifecycleError::Validation(e)) => (
                "Rule set rejected".to_string(),
                e.reasons.iter().map(|r| r.to_string()).collect(),
            ),
            AppError::Lifecycle(e) => (e.to_string(), Vec::new()),
            AppError::Scheduler(e) => (e.to_string(), Vec::new()),
            AppError::BadRequest(msg) => (msg, Vec::new()),
        };

        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, error);
        }

        (status, Json(ErrorResponse { error, reasons })).into_response()
    }
}

impl From<LifecycleError> for AppError {
    fn from(e: LifecycleError) -> Self {
        AppError::Lifecycle(e)
    }
}

impl From<SchedulerError> for AppError {
    fn from(e: SchedulerError) -> Self {
        AppError::Scheduler(e)
    }
}

fn parse_path<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, AppError> {
    parse_id(raw).map_err(AppError::BadRequest)
}

/// POST /rulesets - Validate and store a new rule set
async fn create_rule_set(
    State(state): State<AppState>,
    Json(request): Json<RuleSetRequest>,
) -> Result<(StatusCode, Json<RuleSetResponse>), AppError> {
    let rule_set = request
        .into_rule_set(RuleSetId::new())
        .map_err(AppError::BadRequest)?;
    state.engine.create_rule_set(&rule_set)?;
    Ok((StatusCode::CREATED, Json(RuleSetResponse::from(&rule_set))))
}

/// PUT /rulesets/:id - Validate and replace a rule set
async fn update_rule_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RuleSetRequest>,
) -> Result<Json<RuleSetResponse>, AppError> {
    let id = parse_path::<RuleSetId>(&id)?;
    let rule_set = request.into_rule_set(id).map_err(AppError::BadRequest)?;
    state.engine.update_rule_set(&rule_set)?;
    Ok(Json(RuleSetResponse::from(&rule_set)))
}

/// GET /rulesets/:id
async fn get_rule_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RuleSetResponse>, AppError> {
    let rule_set = state.engine.get_rule_set(parse_path(&id)?)?;
    Ok(Json(RuleSetResponse::from(&rule_set)))
}

/// POST /photos - Register an upload and charge the owner's quota
async fn register_upload(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<(StatusCode, Json<PhotoResponse>), AppError> {
    let owner_id = parse_path::<OwnerId>(&request.owner_id)?;
    let album_ids = request
        .album_ids
        .iter()
        .map(|a| parse_path::<AlbumId>(a))
        .collect::<Result<Vec<_>, _>>()?;

    let photo = state.engine.register_upload(
        owner_id,
        request.original_size,
        request.thumbnail_size,
        album_ids,
    )?;
    Ok((StatusCode::CREATED, Json(PhotoResponse::from(&photo))))
}

/// GET /photos/:id
async fn get_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PhotoResponse>, AppError> {
    let photo = state.engine.get_photo(parse_path(&id)?)?;
    Ok(Json(PhotoResponse::from(&photo)))
}

/// POST /photos/:id/freeze - Returns the owner's updated quota
async fn freeze(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QuotaResponse>, AppError> {
    let snapshot = state.engine.freeze(parse_path::<PhotoId>(&id)?).await?;
    Ok(Json(snapshot.into()))
}

/// POST /photos/:id/unfreeze - Returns the owner's updated quota
async fn unfreeze(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QuotaResponse>, AppError> {
    let snapshot = state.engine.unfreeze(parse_path::<PhotoId>(&id)?).await?;
    Ok(Json(snapshot.into()))
}

/// POST /photos/:id/release - Lift a quarantine
async fn release(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PhotoResponse>, AppError> {
    let photo = state
        .engine
        .release_quarantine(parse_path::<PhotoId>(&id)?)
        .await?;
    Ok(Json(PhotoResponse::from(&photo)))
}

/// GET /owners/:id/quota
async fn get_quota(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QuotaResponse>, AppError> {
    let snapshot = state.engine.quota_snapshot(parse_path(&id)?)?;
    Ok(Json(snapshot.into()))
}

/// PUT /owners/:id/quota
async fn set_quota(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<QuotaLimitRequest>,
) -> Result<Json<QuotaResponse>, AppError> {
    let snapshot = state
        .engine
        .set_quota_limit(parse_path(&id)?, request.quota_limit)?;
    Ok(Json(snapshot.into()))
}

/// POST /lifecycle/run - Run one sweep now
async fn run_lifecycle(
    State(state): State<AppState>,
    request: Option<Json<RunRequest>>,
) -> Result<Json<SweepResponse>, AppError> {
    let dry_run = request.map(|Json(r)| r.dry_run).unwrap_or(false);
    let report = state
        .scheduler
        .sweep_with(dry_run, &state.shutdown)
        .await?;
    Ok(Json(SweepResponse::from(&report)))
}

/// POST /ledger/check - Compare the ledger with a recomputation
async fn check_ledger(
    State(state): State<AppState>,
    request: Option<Json<LedgerCheckRequest>>,
) -> Result<Json<LedgerCheckResponse>, AppError> {
    let repair = request.map(|Json(r)| r.repair).unwrap_or(false);
    let drifted = if repair {
        state.engine.repair_ledger()?
    } else {
        state.engine.check_ledger()?
    };
    Ok(Json(LedgerCheckResponse {
        consistent: drifted.is_empty(),
        drifted: drifted.iter().map(DriftBody::from).collect(),
        repaired: repair && !drifted.is_empty(),
    }))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let sweep_running = state.scheduler.is_running();
    match state.engine.store().owners() {
        Ok(owners) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                owners: owners.len(),
                sweep_running,
            }),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    owners: 0,
                    sweep_running,
                }),
            )
        }
    }
}

/// Create the axum router with all routes
pub fn create_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/rulesets", post(create_rule_set))
        .route("/rulesets/:id", get(get_rule_set).put(update_rule_set))
        .route("/photos", post(register_upload))
        .route("/photos/:id", get(get_photo))
        .route("/photos/:id/freeze", post(freeze))
        .route("/photos/:id/unfreeze", post(unfreeze))
        .route("/photos/:id/release", post(release))
        .route("/owners/:id/quota", get(get_quota).put(set_quota))
        .route("/lifecycle/run", post(run_lifecycle))
        .route("/ledger/check", post(check_ledger))
        .route("/health", get(health_check))
        .with_state(state)
}
