use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use navmap_merge::{MergePreview, MergeResult, MergeSubmission, NewDiff};
use navmap_types::{AuditEntry, Diff, DiffId, DiffItem, DiffStatus, Map, ProjectId};
use serde::Deserialize;
use serde_json::json;

use crate::auth::Action;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "navmap-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ServerResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServerError::InvalidArgument(rejection.body_text()))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

pub async fn get_map(
    State(state): State<AppState>,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Json<Map>> {
    let project = ProjectId::new(project)?;
    state
        .authorize(&headers, Action::Read { project: project.to_string() })
        .await?;
    let map = state.blocking(move |engine| engine.current_map(&project)).await?;
    Ok(Json(map))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// A diff status, or `all`. Defaults to `pending`.
    pub status: Option<String>,
}

fn status_filter(query: &ListQuery) -> ServerResult<Option<DiffStatus>> {
    match query.status.as_deref() {
        None => Ok(Some(DiffStatus::Pending)),
        Some("all") => Ok(None),
        Some(s) => Ok(Some(s.parse()?)),
    }
}

pub async fn list_diffs(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> ServerResult<Json<Vec<Diff>>> {
    let project = ProjectId::new(project)?;
    let status = status_filter(&query)?;
    state
        .authorize(&headers, Action::Read { project: project.to_string() })
        .await?;
    let diffs = state
        .blocking(move |engine| engine.diffs(&project, status))
        .await?;
    Ok(Json(diffs))
}

/// Body of a diff submission. The project comes from the path.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    #[serde(default)]
    pub base_version: Option<u64>,
    pub items: Vec<DiffItem>,
}

pub async fn submit_diff(
    State(state): State<AppState>,
    Path(project): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<SubmitBody>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<Diff>)> {
    let project_id = ProjectId::new(project)?;
    let body = json_body(payload)?;
    state
        .authorize(&headers, Action::Submit { project: project_id.to_string() })
        .await?;
    let new = NewDiff {
        project_id,
        base_version: body.base_version,
        items: body.items,
    };
    let diff = state.blocking(move |engine| engine.submit_diff(new)).await?;
    Ok((StatusCode::CREATED, Json(diff)))
}

// ---------------------------------------------------------------------------
// Diffs
// ---------------------------------------------------------------------------

pub async fn get_diff(
    State(state): State<AppState>,
    Path(diff): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Json<Diff>> {
    let diff_id: DiffId = diff.parse()?;
    state
        .authorize(&headers, Action::ReadDiff { diff: diff_id.to_string() })
        .await?;
    let diff = state.blocking(move |engine| engine.diff(&diff_id)).await?;
    Ok(Json(diff))
}

pub async fn merge_diff(
    State(state): State<AppState>,
    Path(diff): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<MergeSubmission>, JsonRejection>,
) -> ServerResult<Json<MergeResult>> {
    let diff_id: DiffId = diff.parse()?;
    let submission = json_body(payload)?;
    let identity = state
        .authorize(&headers, Action::Merge { diff: diff_id.to_string() })
        .await?;
    let request = submission.into_request(diff_id, &identity.name)?;
    let result = state
        .blocking(move |engine| engine.merge_diff_partial(request))
        .await?;
    Ok(Json(result))
}

pub async fn preview_diff(
    State(state): State<AppState>,
    Path(diff): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<MergeSubmission>, JsonRejection>,
) -> ServerResult<Json<MergePreview>> {
    let diff_id: DiffId = diff.parse()?;
    let decisions = json_body(payload)?.to_decisions()?;
    state
        .authorize(&headers, Action::ReadDiff { diff: diff_id.to_string() })
        .await?;
    let preview = state
        .blocking(move |engine| engine.preview(&diff_id, &decisions))
        .await?;
    Ok(Json(preview))
}

pub async fn audit_trail(
    State(state): State<AppState>,
    Path(diff): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Json<Vec<AuditEntry>>> {
    let diff_id: DiffId = diff.parse()?;
    state
        .authorize(&headers, Action::ReadDiff { diff: diff_id.to_string() })
        .await?;
    let entries = state
        .blocking(move |engine| engine.audit_trail(&diff_id))
        .await?;
    Ok(Json(entries))
}
