//! Authoritative reminder delivery.
//!
//! Every tick scans for due reminders and claims each with a conditional
//! clear. Only the sweep whose clear hit the row emits the signal, so a
//! reminder fires at most once even with several instances sweeping the same
//! database.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::notifier::{ReminderNotifier, ReminderSignal};
use crate::database::{accounts, reminders};
use crate::error::AppResult;
use crate::models::DisplayConfig;
use crate::state::AppState;

const SWEEP_BATCH: usize = 500;

/// One scan-and-clear pass. Returns the reminders this sweep claimed.
pub fn sweep_due(conn: &Connection, now: DateTime<Utc>, config: &DisplayConfig) -> AppResult<Vec<ReminderSignal>> {
    let due = reminders::due_reminders(conn, now, SWEEP_BATCH)?;
    let mut claimed = Vec::with_capacity(due.len());

    for item in due {
        if reminders::claim_reminder(conn, item.entry.id, item.reminder_at)? {
            claimed.push(ReminderSignal::new(&item, now, config));
        } else {
            log::debug!("Reminder for entry {} was already handled", item.entry.id);
        }
    }
    Ok(claimed)
}

/// Runs one tick: claims under the lock, delivers after releasing it.
pub async fn run_sweep(state: &AppState, notifier: &ReminderNotifier) -> AppResult<usize> {
    let signals = {
        let conn = state.db.lock().await;
        let signals = sweep_due(&conn, Utc::now(), &state.display)?;
        let purged = accounts::purge_expired_sessions(&conn)?;
        if purged > 0 {
            log::debug!("Purged {} expired sessions", purged);
        }
        signals
    };

    for signal in &signals {
        // Already claimed; a failed delivery is not retried.
        if let Err(e) = notifier.notify(signal).await {
            log::error!("Failed to deliver reminder for entry {}: {}", signal.entry_id, e);
        }
    }
    Ok(signals.len())
}

pub fn start_reminder_sweep(state: AppState, notifier: ReminderNotifier) -> JoinHandle<()> {
    let interval_secs = state.settings.reminders.sweep_interval_secs.max(1);

    tokio::spawn(async move {
        log::info!("Reminder sweep started (every {}s)", interval_secs);
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // A slow tick pushes the next one back instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match run_sweep(&state, &notifier).await {
                Ok(0) => {}
                Ok(fired) => log::info!("Reminder sweep fired {} reminders", fired),
                Err(e) => log::error!("Reminder sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{queries, test_support};
    use crate::models::{NewEntry, Precision, RecurrenceRule, Settings};
    use chrono::Duration as ChronoDuration;
    use std::collections::BTreeSet;

    fn reminder_entry(timetable_id: i64, title: &str, reminder_at: DateTime<Utc>) -> NewEntry {
        NewEntry {
            title: title.into(),
            description: "check in".into(),
            date: "2024-06-01T09:00:00Z".parse().unwrap(),
            precision: Precision::Hour,
            tags: BTreeSet::new(),
            recurrence_rule: RecurrenceRule::None,
            reminder_at: Some(reminder_at),
            timetable_id,
        }
    }

    #[test]
    fn past_reminder_fires_once_then_is_gone() {
        let (conn, owner, timetable) = test_support::seeded();
        let now = Utc::now();
        let entry = queries::create_entry(
            &conn,
            owner,
            &reminder_entry(timetable, "call", now - ChronoDuration::minutes(1)),
        )
        .unwrap();
        queries::create_entry(&conn, owner, &reminder_entry(timetable, "later", now + ChronoDuration::hours(2)))
            .unwrap();

        let first = sweep_due(&conn, now, &DisplayConfig::default()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].entry_id, entry.id);
        assert_eq!(first[0].display_date, "June 1, 2024 09:00");

        let second = sweep_due(&conn, now, &DisplayConfig::default()).unwrap();
        assert!(second.is_empty());
        assert!(queries::get_entry(&conn, owner, entry.id).unwrap().reminder_at.is_none());
    }

    #[test]
    fn concurrent_sweeps_deliver_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.db");
        let first = crate::database::init_database(&path).unwrap();
        let second = crate::database::init_database(&path).unwrap();

        let owner = accounts::create_user(&first, "ops", "pw").unwrap();
        let timetable = crate::database::timetables::create_timetable(&first, owner.id, "Oncall").unwrap();
        let now = Utc::now();
        for i in 0..5 {
            queries::create_entry(
                &first,
                owner.id,
                &reminder_entry(timetable.id, &format!("page {i}"), now - ChronoDuration::seconds(i)),
            )
            .unwrap();
        }

        // Both instances see the same due rows before either clears them.
        let seen_by_second = reminders::due_reminders(&second, now, SWEEP_BATCH).unwrap();
        assert_eq!(seen_by_second.len(), 5);

        let fired_first = sweep_due(&first, now, &DisplayConfig::default()).unwrap();
        let fired_second: Vec<_> = seen_by_second
            .into_iter()
            .filter(|due| reminders::claim_reminder(&second, due.entry.id, due.reminder_at).unwrap())
            .collect();

        assert_eq!(fired_first.len(), 5);
        assert!(fired_second.is_empty());
    }

    #[tokio::test]
    async fn run_sweep_clears_and_counts() {
        let (conn, owner, timetable) = test_support::seeded();
        queries::create_entry(
            &conn,
            owner,
            &reminder_entry(timetable, "stretch", Utc::now() - ChronoDuration::seconds(30)),
        )
        .unwrap();
        let state = AppState::new(conn, Settings::default()).unwrap();
        let notifier = ReminderNotifier::Log;

        assert_eq!(run_sweep(&state, &notifier).await.unwrap(), 1);
        assert_eq!(run_sweep(&state, &notifier).await.unwrap(), 0);
    }
}
