//! Recurrence engine: successive occurrence dates and their materialization.
//!
//! Steps are taken on the wall clock of the configured timezone, so a monthly
//! chain stays on the same local day and a daily chain keeps its local hour
//! across DST changes.

use chrono::{DateTime, Days, Months, NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::database::queries;
use crate::error::{AppError, AppResult};
use crate::models::{DisplayConfig, Entry, NewEntry, Precision, RecurrenceRule};
use crate::services::date_precision;

pub const MAX_GENERATED: u32 = 500;

/// One calendar step on a local wall-clock time. Monthly steps land on the
/// last day of a shorter month instead of spilling into the following one.
fn step_local(local: NaiveDateTime, rule: RecurrenceRule) -> AppResult<NaiveDateTime> {
    let next = match rule {
        RecurrenceRule::Daily => local.checked_add_days(Days::new(1)),
        RecurrenceRule::Weekly => local.checked_add_days(Days::new(7)),
        RecurrenceRule::Monthly => local.checked_add_months(Months::new(1)),
        RecurrenceRule::None => return Err(AppError::UnsupportedRecurrence(rule.to_string())),
    };
    next.ok_or_else(|| AppError::validation(format!("{} is out of the supported date range", local)))
}

/// Next occurrence after `date`, stepped in `config.timezone`.
pub fn next_date(date: DateTime<Utc>, rule: RecurrenceRule, config: &DisplayConfig) -> AppResult<DateTime<Utc>> {
    let local = date.with_timezone(&config.timezone).naive_local();
    Ok(date_precision::localize(step_local(local, rule)?, config.timezone))
}

/// The first `count` occurrences after `start`.
///
/// The chain is carried on the local wall clock, so a time skipped by a DST
/// jump shifts only that one occurrence.
pub fn occurrences(
    start: DateTime<Utc>,
    rule: RecurrenceRule,
    count: u32,
    config: &DisplayConfig,
) -> AppResult<Vec<DateTime<Utc>>> {
    let mut dates = Vec::with_capacity(count as usize);
    let mut local = start.with_timezone(&config.timezone).naive_local();
    for _ in 0..count {
        local = step_local(local, rule)?;
        dates.push(date_precision::localize(local, config.timezone));
    }
    Ok(dates)
}

/// Builds `count` occurrences of `base` and hands each to `insert` in order.
///
/// Everything that can be checked up front is checked before the first insert.
/// If an insert fails, the entries created so far stay and the error carries
/// their count.
pub fn generate_with<F>(base: &Entry, count: u32, config: &DisplayConfig, mut insert: F) -> AppResult<Vec<Entry>>
where
    F: FnMut(&NewEntry) -> AppResult<Entry>,
{
    if base.recurrence_rule == RecurrenceRule::None {
        return Err(AppError::NoRecurrenceRule(base.id));
    }
    if count == 0 || count > MAX_GENERATED {
        return Err(AppError::validation(format!(
            "count must be between 1 and {}",
            MAX_GENERATED
        )));
    }
    check_rule_fits_precision(base.recurrence_rule, base.precision)?;

    let dates = occurrences(base.date, base.recurrence_rule, count, config)?;
    let mut created = Vec::with_capacity(dates.len());
    for date in dates {
        let occurrence = NewEntry {
            title: base.title.clone(),
            description: base.description.clone(),
            date: date_precision::normalize(date, base.precision, config),
            precision: base.precision,
            tags: base.tags.clone(),
            recurrence_rule: base.recurrence_rule,
            reminder_at: None,
            timetable_id: base.timetable_id,
        };
        match insert(&occurrence) {
            Ok(entry) => created.push(entry),
            Err(e) => {
                log::warn!(
                    "Recurrence generation for entry {} stopped after {} of {}: {}",
                    base.id,
                    created.len(),
                    count,
                    e
                );
                return Err(AppError::GenerationInterrupted {
                    created: created.len(),
                    source: Box::new(e),
                });
            }
        }
    }

    Ok(created)
}

/// Persists occurrences one insert at a time; no rollback on failure.
pub fn materialize(conn: &Connection, base: &Entry, count: u32, config: &DisplayConfig) -> AppResult<Vec<Entry>> {
    let created = generate_with(base, count, config, |new| queries::insert_entry(conn, new))?;
    log::info!(
        "Generated {} {} occurrences of entry {}",
        created.len(),
        base.recurrence_rule,
        base.id
    );
    Ok(created)
}

/// A cadence finer than the precision would produce dates the precision cannot express.
fn check_rule_fits_precision(rule: RecurrenceRule, precision: Precision) -> AppResult<()> {
    let fits = match precision {
        Precision::Year => false,
        Precision::Month => rule == RecurrenceRule::Monthly,
        Precision::Day | Precision::Hour | Precision::Minute => true,
    };
    if fits {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "a {}-precision entry cannot recur {}",
            precision, rule
        )))
    }
}
