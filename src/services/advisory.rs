//! Client-side countdown timers for loaded entries.
//!
//! Best effort only: delivery that must not be missed goes through the
//! reminder sweep. Reloading or dropping the scheduler cancels every armed
//! timer without firing it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{DisplayConfig, Entry};
use crate::services::date_precision;

#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryNotice {
    pub entry_id: i64,
    pub title: String,
    pub display_date: String,
    pub reminder_at: DateTime<Utc>,
}

pub struct AdvisoryReminders {
    timers: HashMap<i64, JoinHandle<()>>,
    notices: mpsc::UnboundedSender<AdvisoryNotice>,
    display: DisplayConfig,
}

impl AdvisoryReminders {
    pub fn new(display: DisplayConfig) -> (Self, mpsc::UnboundedReceiver<AdvisoryNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reminders = Self {
            timers: HashMap::new(),
            notices: tx,
            display,
        };
        (reminders, rx)
    }

    /// Replaces the armed set with one timer per future reminder in `entries`.
    pub fn load(&mut self, entries: &[Entry], now: DateTime<Utc>) -> usize {
        self.cancel_all();

        for entry in entries {
            let Some(reminder_at) = entry.reminder_at else {
                continue;
            };
            let Ok(delay) = (reminder_at - now).to_std() else {
                // Already due; the sweep owns it.
                continue;
            };
            if delay.is_zero() {
                continue;
            }

            let notice = AdvisoryNotice {
                entry_id: entry.id,
                title: entry.title.clone(),
                display_date: date_precision::format_entry_date(entry.date, entry.precision, &self.display),
                reminder_at,
            };
            let tx = self.notices.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(notice);
            });
            self.timers.insert(entry.id, handle);
        }

        log::debug!("Armed {} advisory timers", self.timers.len());
        self.timers.len()
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    pub fn armed(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for AdvisoryReminders {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Precision, RecurrenceRule};
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn entry(id: i64, reminder_at: Option<DateTime<Utc>>) -> Entry {
        Entry {
            id,
            title: format!("entry {id}"),
            description: String::new(),
            date: "2024-03-10T00:00:00Z".parse().unwrap(),
            precision: Precision::Day,
            tags: BTreeSet::new(),
            recurrence_rule: RecurrenceRule::None,
            reminder_at,
            timetable_id: 1,
            created_at: Utc::now(),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_future_reminders_only() {
        let now = Utc::now();
        let (mut reminders, mut rx) = AdvisoryReminders::new(DisplayConfig::default());
        let armed = reminders.load(
            &[
                entry(1, Some(now + Duration::seconds(10))),
                entry(2, Some(now - Duration::seconds(5))),
                entry(3, None),
            ],
            now,
        );
        assert_eq!(armed, 1);

        tokio::time::advance(std::time::Duration::from_secs(11)).await;
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.entry_id, 1);
        assert_eq!(notice.display_date, "March 10, 2024");

        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(reminders.armed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_cancels_previous_timers() {
        let now = Utc::now();
        let (mut reminders, mut rx) = AdvisoryReminders::new(DisplayConfig::default());
        reminders.load(&[entry(1, Some(now + Duration::seconds(10)))], now);
        reminders.load(&[entry(2, Some(now + Duration::seconds(30)))], now);

        tokio::time::advance(std::time::Duration::from_secs(15)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(std::time::Duration::from_secs(20)).await;
        assert_eq!(rx.recv().await.unwrap().entry_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_scheduler_cancels_everything() {
        let now = Utc::now();
        let (mut reminders, mut rx) = AdvisoryReminders::new(DisplayConfig::default());
        reminders.load(&[entry(7, Some(now + Duration::seconds(5)))], now);
        drop(reminders);

        tokio::time::advance(std::time::Duration::from_secs(10)).await;
        // Sender and aborted timers are gone, so the channel closes empty.
        assert!(rx.recv().await.is_none());
    }
}
