use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use super::{AppJson, AuthUser};
use crate::database::timetables;
use crate::error::AppResult;
use crate::models::{Timetable, TimetableNameRequest};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedTimetables {
    pub deleted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries_removed: Option<usize>,
}

pub async fn list_timetables(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<Timetable>>> {
    let conn = state.db.lock().await;
    Ok(Json(timetables::list_timetables(&conn, user.id)?))
}

/// Upsert by name: an existing timetable with the same name is returned as is.
pub async fn create_timetable(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<TimetableNameRequest>,
) -> AppResult<Json<Timetable>> {
    let conn = state.db.lock().await;
    let timetable = timetables::create_timetable(&conn, user.id, req.name.as_deref().unwrap_or_default())?;
    Ok(Json(timetable))
}

pub async fn rename_timetable(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(req): AppJson<TimetableNameRequest>,
) -> AppResult<Json<Timetable>> {
    let conn = state.db.lock().await;
    let timetable = timetables::rename_timetable(&conn, user.id, id, req.name.as_deref().unwrap_or_default())?;
    Ok(Json(timetable))
}

pub async fn delete_timetable(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<DeletedTimetables>> {
    let conn = state.db.lock().await;
    let entries_removed = timetables::delete_timetable(&conn, user.id, id)?;
    Ok(Json(DeletedTimetables {
        deleted: 1,
        entries_removed: Some(entries_removed),
    }))
}

pub async fn delete_all_timetables(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DeletedTimetables>> {
    let conn = state.db.lock().await;
    let deleted = timetables::delete_all_timetables(&conn, user.id)?;
    Ok(Json(DeletedTimetables {
        deleted,
        entries_removed: None,
    }))
}
