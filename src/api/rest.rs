use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::domain::attributes;
use crate::domain::groups::StatusSnapshot;
use crate::domain::network::NetworkEntry;
use crate::domain::node::{Node, NodeAction};
use crate::domain::reconcile::Batch;
use crate::domain::service::{AttributeValue, BulkResult, Family, FleetService, NodeIndex};
use crate::domain::update::{GroupChange, NodeUpdate};
use crate::error::{ErrorKind, FleetError};

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/nodes", get(index))
        .route("/api/v1/nodes/status", get(status))
        .route("/api/v1/nodes/list", get(list))
        .route("/api/v1/nodes/unallocated", get(unallocated))
        .route("/api/v1/nodes/bulk", post(bulk))
        .route("/api/v1/nodes/bulk/check", post(bulk_check))
        .route("/api/v1/nodes/{name}", get(show).post(update))
        .route("/api/v1/nodes/{name}/attribute", get(attribute_root))
        .route("/api/v1/nodes/{name}/attribute/{*path}", get(attribute))
        .route("/api/v1/nodes/{name}/network", get(network))
        .route("/api/v1/nodes/{name}/group/{group}", post(change_group))
        .route("/api/v1/nodes/{name}/hit/{action}", post(hit))
        .route("/api/v1/families", get(families))
        .with_state(state)
}

/// JSON error body: `{"error": <kind>, "message": <text>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Fleet(FleetError),
    BadRequest(String),
    Internal(String),
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self::Fleet(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidGroupName | ErrorKind::InsufficientRaidDisks => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::DuplicateAlias | ErrorKind::DuplicatePublicName => StatusCode::CONFLICT,
        ErrorKind::InvalidAction | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Persistence | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            Self::Fleet(err) => ErrorBody {
                error: err.kind(),
                message: err.to_string(),
            },
            Self::BadRequest(message) => ErrorBody {
                error: ErrorKind::InvalidRequest,
                message,
            },
            Self::Internal(message) => ErrorBody {
                error: ErrorKind::Internal,
                message,
            },
        };
        (status_for(body.error), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `Json` body extractor whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "rejected request body");
                Err(ApiError::BadRequest(rejection.body_text()))
            }
        }
    }
}

/// Writes touch the inventory file, so they run off the async workers.
async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&FleetService) -> T + Send + 'static,
{
    let fleet = state.fleet.clone();
    tokio::task::spawn_blocking(move || op(fleet.as_ref()))
        .await
        .map_err(|e| {
            error!(error = %e, "blocking fleet task failed");
            ApiError::Internal(e.to_string())
        })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
    pub nodes: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        nodes: state.fleet.list().len(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct IndexParams {
    pub role: Option<String>,
    #[serde(default)]
    pub names_only: bool,
}

async fn index(State(state): State<AppState>, Query(params): Query<IndexParams>) -> Json<NodeIndex> {
    Json(state.fleet.index(params.role.as_deref(), params.names_only))
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.fleet.status_snapshot())
}

async fn list(State(state): State<AppState>) -> Json<BTreeMap<String, Node>> {
    Json(state.fleet.list())
}

async fn unallocated(State(state): State<AppState>) -> Json<BTreeMap<String, Node>> {
    Json(state.fleet.unallocated())
}

async fn families(State(state): State<AppState>) -> Json<BTreeMap<String, Family>> {
    Json(state.fleet.families())
}

#[derive(Debug, Default, Deserialize)]
pub struct ShowParams {
    pub key: Option<String>,
}

async fn show(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ShowParams>,
) -> ApiResult<serde_json::Value> {
    Ok(Json(state.fleet.show(&name, params.key.as_deref())?))
}

async fn attribute_root(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<AttributeValue> {
    let empty: [&str; 0] = [];
    Ok(Json(state.fleet.attribute(&name, &empty)?))
}

async fn attribute(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
) -> ApiResult<AttributeValue> {
    let segments = attributes::split_path(&path);
    Ok(Json(state.fleet.attribute(&name, &segments)?))
}

async fn network(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<NetworkEntry>> {
    Ok(Json(state.fleet.network(&name)?))
}

/// Conflicts and per-node failures are reported in the body; the request
/// itself succeeds.
async fn bulk(
    State(state): State<AppState>,
    ApiJson(batch): ApiJson<Batch>,
) -> ApiResult<BulkResult> {
    let result = blocking(&state, move |fleet| fleet.reconcile_batch(&batch)).await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchCheck {
    pub ok: bool,
    pub entries: usize,
}

async fn bulk_check(
    State(state): State<AppState>,
    ApiJson(batch): ApiJson<Batch>,
) -> ApiResult<BatchCheck> {
    state.fleet.check_batch(&batch)?;
    Ok(Json(BatchCheck {
        ok: true,
        entries: batch.len(),
    }))
}

async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ApiJson(update): ApiJson<NodeUpdate>,
) -> ApiResult<Node> {
    let node = blocking(&state, move |fleet| fleet.update_one(&name, &update)).await??;
    Ok(Json(node))
}

async fn change_group(
    State(state): State<AppState>,
    Path((name, group)): Path<(String, String)>,
) -> ApiResult<GroupChange> {
    let change = blocking(&state, move |fleet| fleet.change_group(&name, &group)).await??;
    Ok(Json(change))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionAccepted {
    pub node: String,
    pub action: NodeAction,
}

async fn hit(
    State(state): State<AppState>,
    Path((name, action)): Path<(String, String)>,
) -> ApiResult<ActionAccepted> {
    let node = name.clone();
    let action = blocking(&state, move |fleet| fleet.hit(&name, &action)).await??;
    Ok(Json(ActionAccepted { node, action }))
}
