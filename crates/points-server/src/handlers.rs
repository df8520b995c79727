//! REST endpoint handlers for the control API.
//!
//! Reads take the collection read lock. Everything that changes state,
//! writes a backup, or restores one goes through
//! [`AppState::mutate`](crate::state::AppState::mutate) and writes the
//! database before responding.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/points` | Snapshot of every point |
//! | `GET` | `/point/{id}` | One point plus free channels |
//! | `GET` | `/server/info` | Uptime and channel usage |
//! | `GET` | `/server/backups` | Backup ids with timestamps |
//! | `PUT` | `/point/{id}/{command}[/{arg}]` | Run an allow-listed command |
//! | `PUT` | `/server/backup` | Write a backup |
//! | `PUT` | `/server/restore/{backup_id}` | Restore a backup |
//! | `POST` | `/points/add` | Add a point |
//! | `DELETE` | `/point/{id}` | Remove a point |

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, Uri};
use chrono::SecondsFormat;
use points_core::{PointCollection, PointError, PointId, PointRecord, Snapshot};
use points_store::BackupId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{self, Command};
use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// A point with its id inlined next to its stored fields.
#[derive(Debug, Serialize)]
pub struct PointView {
    /// The point's id.
    pub id: PointId,
    /// The stored fields.
    #[serde(flatten)]
    pub record: PointRecord,
}

/// Body returned by single-point endpoints.
#[derive(Debug, Serialize)]
pub struct PointResponse {
    /// The affected point.
    pub point: PointView,
    /// Channels still free on the controller.
    pub freeports: Vec<u8>,
}

/// Body of `GET /server/info`.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// Seconds since the collection was created.
    pub uptime: f64,
    /// Number of points.
    pub points: usize,
    /// Channels still free on the controller.
    pub free_channels: Vec<u8>,
}

/// Body of `PUT /server/backup`.
#[derive(Debug, Serialize)]
pub struct BackupResponse {
    /// Name of the new backup.
    pub backup: BackupId,
}

/// Body of `PUT /server/restore/{backup_id}`.
#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    /// The backup that was restored.
    pub restored: String,
    /// The backup holding the state from before the restore.
    pub safety_backup: BackupId,
    /// The collection as restored.
    pub points: Snapshot,
}

/// Query parameters for `POST /points/add`.
#[derive(Debug, Deserialize)]
pub struct AddQuery {
    /// Requested channel; the lowest free one if absent.
    pub channel: Option<String>,
    /// Display name; the default name if absent.
    pub name: Option<String>,
}

fn point_response(points: &PointCollection, id: &PointId) -> Result<PointResponse, ApiError> {
    let point = points.require(id)?;
    Ok(PointResponse {
        point: PointView {
            id: id.clone(),
            record: point.to_record(),
        },
        freeports: points.free_channels().into_iter().collect(),
    })
}

fn parse_id(raw: &str) -> Result<PointId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::NotFound(format!("point not found: {raw} ({e})")))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// `GET /points`: every point in listing order.
pub async fn list_points(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.read().await.to_snapshot())
}

/// `GET /point/{id}`.
pub async fn get_point(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PointResponse>, ApiError> {
    let id = parse_id(&id)?;
    let points = state.read().await;
    point_response(&points, &id).map(Json)
}

/// `GET /server/info`.
pub async fn server_info(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    let points = state.read().await;
    Json(ServerInfo {
        uptime: points.uptime().as_secs_f64(),
        points: points.len(),
        free_channels: points.free_channels().into_iter().collect(),
    })
}

/// `GET /server/backups`: backup id to RFC 3339 timestamp.
pub async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<BackupId, String>>, ApiError> {
    let store = state.store().clone();
    let listed = tokio::task::spawn_blocking(move || store.list_backups())
        .await
        .map_err(|e| ApiError::Internal(format!("backup listing failed: {e}")))??;
    let body = listed
        .into_iter()
        .map(|(id, at)| (id, at.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .collect();
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// Point commands
// ---------------------------------------------------------------------------

/// `PUT /point/{id}/{command}`.
pub async fn run_command(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<PointResponse>, ApiError> {
    dispatch(&state, &id, &name, None, &body).await
}

/// `PUT /point/{id}/{command}/{arg}`.
pub async fn run_command_with_arg(
    State(state): State<Arc<AppState>>,
    Path((id, name, arg)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Json<PointResponse>, ApiError> {
    dispatch(&state, &id, &name, Some(&arg), &body).await
}

async fn dispatch(
    state: &AppState,
    id: &str,
    name: &str,
    arg: Option<&str>,
    body: &[u8],
) -> Result<Json<PointResponse>, ApiError> {
    let point = parse_id(id)?;
    let spec = command::resolve(name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown command: {name}")))?;
    let command = Command::parse(spec, arg, body)?;

    let response = state
        .mutate(move |points, store| {
            command.apply(points, &point)?;
            store.persist(points)?;
            point_response(points, &point)
        })
        .await;
    if let Err(e) = &response {
        warn!(point = %id, command = spec.name, error = %e, "command failed");
    }
    response.map(Json)
}

// ---------------------------------------------------------------------------
// Collection and server mutations
// ---------------------------------------------------------------------------

/// `POST /points/add[?channel=&name=]`.
pub async fn add_point(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AddQuery>,
) -> Result<Json<PointResponse>, ApiError> {
    let channel = query
        .channel
        .as_deref()
        .map(|raw| {
            raw.trim()
                .parse::<u8>()
                .map_err(|e| ApiError::BadRequest(format!("invalid channel '{raw}': {e}")))
        })
        .transpose()?;

    state
        .mutate(move |points, store| {
            let id = points
                .add(channel, query.name.as_deref())
                .map_err(|e| match e {
                    PointError::OutOfRange { .. } | PointError::EmptyName => {
                        ApiError::BadRequest(e.to_string())
                    }
                    other => ApiError::from(other),
                })?
                .id()
                .clone();
            store.persist(points)?;
            point_response(points, &id)
        })
        .await
        .map(Json)
}

/// `DELETE /point/{id}`: the remaining collection.
pub async fn delete_point(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    let id = parse_id(&id)?;
    state
        .mutate(move |points, store| {
            points.remove(&id)?;
            store.persist(points)?;
            Ok(points.to_snapshot())
        })
        .await
        .map(Json)
}

/// `PUT /server/backup`.
pub async fn backup(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BackupResponse>, ApiError> {
    state
        .mutate(|points, store| store.backup(points).map_err(ApiError::from))
        .await
        .map(|backup| Json(BackupResponse { backup }))
}

/// `PUT /server/restore/{backup_id}`.
pub async fn restore(
    State(state): State<Arc<AppState>>,
    Path(backup_id): Path<String>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let response = state
        .mutate(move |points, store| {
            let safety_backup = store.restore(&backup_id, points)?;
            Ok(RestoreResponse {
                restored: backup_id,
                safety_backup,
                points: points.to_snapshot(),
            })
        })
        .await?;
    info!(
        backup = %response.restored,
        safety_backup = %response.safety_backup,
        "restore completed"
    );
    Ok(Json(response))
}

/// Fallback for unknown paths and methods.
pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {method} {uri}"))
}
