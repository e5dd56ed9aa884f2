use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{AppJson, AuthUser};
use crate::database::queries;
use crate::error::{AppError, AppResult};
use crate::models::{
    normalize_tags, BulkCreateRequest, CreateEntryRequest, DisplayConfig, Entry, EntryFilter, EntryView,
    GenerateRequest, ReminderRequest, TimeFormat, UpdateEntryRequest,
};
use crate::services::{date_precision, recurrence};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryQuery {
    pub timetable_id: Option<i64>,
    #[serde(alias = "query")]
    pub q: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
    pub time_format: Option<String>,
}

impl EntryQuery {
    fn timetable_id(&self) -> AppResult<i64> {
        self.timetable_id
            .ok_or_else(|| AppError::validation("missing fields: timetableId"))
    }

    fn display(&self, base: &DisplayConfig) -> AppResult<DisplayConfig> {
        match self.time_format.as_deref().filter(|f| !f.trim().is_empty()) {
            Some(raw) => {
                let format: TimeFormat = raw.parse().map_err(AppError::Validation)?;
                Ok(base.with_time_format(format))
            }
            None => Ok(*base),
        }
    }

    fn filter(&self, config: &DisplayConfig) -> AppResult<EntryFilter> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());

        let start = non_empty(&self.start_date)
            .map(|raw| date_precision::parse_range_bound(&raw, false, config))
            .transpose()?;
        let end = non_empty(&self.end_date)
            .map(|raw| date_precision::parse_range_bound(&raw, true, config))
            .transpose()?;
        let tags = self
            .tags
            .as_deref()
            .map(|csv| normalize_tags(csv.split(',').map(str::to_string)))
            .unwrap_or_default();

        Ok(EntryFilter {
            query: self.q.clone().filter(|q| !q.is_empty()),
            start,
            end,
            tags,
        })
    }
}

fn views(entries: Vec<Entry>, config: &DisplayConfig) -> Vec<EntryView> {
    entries.into_iter().map(|e| EntryView::new(e, config)).collect()
}

pub async fn list_entries(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<EntryQuery>,
) -> AppResult<Json<Vec<EntryView>>> {
    let timetable_id = params.timetable_id()?;
    let display = params.display(&state.display)?;

    let conn = state.db.lock().await;
    let entries = queries::list_entries(&conn, user.id, timetable_id)?;
    Ok(Json(views(entries, &display)))
}

pub async fn search_entries(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<EntryQuery>,
) -> AppResult<Json<Vec<EntryView>>> {
    let timetable_id = params.timetable_id()?;
    let display = params.display(&state.display)?;
    let filter = params.filter(&state.display)?;

    let conn = state.db.lock().await;
    let entries = queries::search_entries(&conn, user.id, timetable_id, &filter)?;
    Ok(Json(views(entries, &display)))
}

pub async fn create_entry(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<CreateEntryRequest>,
) -> AppResult<(StatusCode, Json<EntryView>)> {
    let new_entry = req.validate(&state.display)?;

    let conn = state.db.lock().await;
    let entry = queries::create_entry(&conn, user.id, &new_entry)?;
    Ok((StatusCode::CREATED, Json(EntryView::new(entry, &state.display))))
}

/// Rows that fail to decode or validate are dropped; the rest go in as one batch.
pub async fn bulk_create_entries(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<BulkCreateRequest>,
) -> AppResult<(StatusCode, Json<Vec<EntryView>>)> {
    let timetable_id = req
        .timetable_id
        .ok_or_else(|| AppError::validation("missing fields: timetableId"))?;

    let total = req.entries.len();
    let rows: Vec<_> = req
        .entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let row = match serde_json::from_value::<CreateEntryRequest>(raw) {
                Ok(row) => row,
                Err(e) => {
                    log::debug!("Skipping bulk row {}: {}", index, e);
                    return None;
                }
            };
            let row = CreateEntryRequest {
                timetable_id: Some(timetable_id),
                ..row
            };
            match row.validate(&state.display) {
                Ok(valid) => Some(valid),
                Err(e) => {
                    log::debug!("Skipping bulk row {}: {}", index, e);
                    None
                }
            }
        })
        .collect();

    let conn = state.db.lock().await;
    let created = queries::bulk_create_entries(&conn, user.id, timetable_id, &rows)?;
    log::info!(
        "Bulk import into timetable {}: {} created, {} skipped",
        timetable_id,
        created.len(),
        total - rows.len()
    );
    Ok((StatusCode::CREATED, Json(views(created, &state.display))))
}

pub async fn get_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<EntryView>> {
    let conn = state.db.lock().await;
    let entry = queries::get_entry(&conn, user.id, id)?;
    Ok(Json(EntryView::new(entry, &state.display)))
}

pub async fn update_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(req): AppJson<UpdateEntryRequest>,
) -> AppResult<Json<EntryView>> {
    let conn = state.db.lock().await;
    let current = queries::get_entry(&conn, user.id, id)?;
    let changes = req.apply(&current, &state.display)?;
    let entry = queries::update_entry(&conn, user.id, id, &changes)?;
    Ok(Json(EntryView::new(entry, &state.display)))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.lock().await;
    queries::delete_entry(&conn, user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `reminderAt` null or empty clears the reminder.
pub async fn set_reminder(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(req): AppJson<ReminderRequest>,
) -> AppResult<Json<EntryView>> {
    let reminder_at = req
        .reminder_at
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(|r| date_precision::parse_instant(r, &state.display))
        .transpose()?;

    let conn = state.db.lock().await;
    let entry = queries::set_reminder(&conn, user.id, id, reminder_at)?;
    Ok(Json(EntryView::new(entry, &state.display)))
}

pub async fn generate_entries(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(req): AppJson<GenerateRequest>,
) -> AppResult<(StatusCode, Json<Vec<EntryView>>)> {
    let count = req.count.ok_or_else(|| AppError::validation("missing fields: count"))?;

    let conn = state.db.lock().await;
    let base = queries::get_entry(&conn, user.id, id)?;
    let created = recurrence::materialize(&conn, &base, count, &state.display)?;
    Ok((StatusCode::CREATED, Json(views(created, &state.display))))
}
