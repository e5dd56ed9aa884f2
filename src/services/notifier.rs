use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::reminders::DueReminder;
use crate::models::{DisplayConfig, ReminderSettings};
use crate::services::date_precision;

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Payload emitted once per fired reminder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSignal {
    pub entry_id: i64,
    pub owner_id: i64,
    pub timetable_id: i64,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub display_date: String,
    pub reminder_at: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
}

impl ReminderSignal {
    pub fn new(due: &DueReminder, fired_at: DateTime<Utc>, config: &DisplayConfig) -> Self {
        Self {
            entry_id: due.entry.id,
            owner_id: due.owner_id,
            timetable_id: due.entry.timetable_id,
            title: due.entry.title.clone(),
            description: due.entry.description.clone(),
            date: due.entry.date,
            display_date: date_precision::format_entry_date(due.entry.date, due.entry.precision, config),
            reminder_at: due.reminder_at,
            fired_at,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ReminderNotifier {
    Log,
    Webhook { client: reqwest::Client, url: String },
}

impl ReminderNotifier {
    pub fn from_settings(settings: &ReminderSettings) -> anyhow::Result<Self> {
        match settings.webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
                    .build()?;
                Ok(Self::Webhook {
                    client,
                    url: url.to_string(),
                })
            }
            _ => Ok(Self::Log),
        }
    }

    /// Logs the reminder and forwards it to the webhook when one is configured.
    pub async fn notify(&self, signal: &ReminderSignal) -> anyhow::Result<()> {
        log::info!(
            "⏰ Reminder for entry {} '{}' ({}) owned by user {}",
            signal.entry_id,
            signal.title,
            signal.display_date,
            signal.owner_id
        );

        if let Self::Webhook { client, url } = self {
            let response = client.post(url).json(signal).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                anyhow::bail!("webhook returned {}: {}", status, text);
            }
        }
        Ok(())
    }
}
