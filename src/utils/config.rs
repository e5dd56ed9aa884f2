use std::path::Path;

use anyhow::Context;

use crate::models::{Settings, TimeFormat};

const ENV_LISTEN: &str = "TIMETABLES_LISTEN";
const ENV_DB: &str = "TIMETABLES_DB";
const ENV_WEBHOOK_URL: &str = "TIMETABLES_WEBHOOK_URL";
const ENV_TIME_FORMAT: &str = "TIMETABLES_TIME_FORMAT";
const ENV_TIMEZONE: &str = "TIMETABLES_TIMEZONE";
const ENV_SWEEP_SECS: &str = "TIMETABLES_SWEEP_SECS";

pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Reads `settings.json`; a missing file yields defaults.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str::<Settings>(&content)
            .with_context(|| format!("invalid settings in {}", path.display()))?
    } else {
        log::info!("No settings at {}, using defaults", path.display());
        Settings::default()
    };
    apply_env_defaults(&mut settings, env_value);
    Ok(settings)
}

/// Overrides file values with `TIMETABLES_*` variables.
pub fn apply_env_defaults<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(listen) = lookup(ENV_LISTEN) {
        settings.server.listen = listen;
    }
    if let Some(db) = lookup(ENV_DB) {
        settings.server.database_path = db;
    }
    if let Some(url) = lookup(ENV_WEBHOOK_URL) {
        settings.reminders.webhook_url = Some(url);
    }
    if let Some(timezone) = lookup(ENV_TIMEZONE) {
        settings.general.timezone = timezone;
    }
    if let Some(raw) = lookup(ENV_TIME_FORMAT) {
        match raw.parse::<TimeFormat>() {
            Ok(format) => settings.general.time_format = format,
            Err(e) => log::warn!("Ignoring {}: {}", ENV_TIME_FORMAT, e),
        }
    }
    if let Some(raw) = lookup(ENV_SWEEP_SECS) {
        match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => settings.reminders.sweep_interval_secs = secs,
            _ => log::warn!("Ignoring {}: expected a positive number of seconds", ENV_SWEEP_SECS),
        }
    }
}
