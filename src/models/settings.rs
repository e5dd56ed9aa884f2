use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: String,
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub reminders: ReminderSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            general: GeneralSettings::default(),
            server: ServerSettings::default(),
            reminders: ReminderSettings::default(),
            auth: AuthSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub language: String,
    #[serde(default)]
    pub time_format: TimeFormat,
    /// IANA zone used to read naive dates and to render entries.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            time_format: TimeFormat::default(),
            timezone: default_timezone(),
        }
    }
}

impl GeneralSettings {
    pub fn display_config(&self) -> anyhow::Result<DisplayConfig> {
        let timezone = self
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone '{}': {}", self.timezone, e))?;
        Ok(DisplayConfig {
            time_format: self.time_format,
            timezone,
        })
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub listen: String,
    pub database_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3001".to_string(),
            database_path: "./data/timetables.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderSettings {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 60,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub token_ttl_secs: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "12h")]
    TwelveHour,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl FromStr for TimeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "12h" => Ok(TimeFormat::TwelveHour),
            "24h" => Ok(TimeFormat::TwentyFourHour),
            other => Err(format!("unknown time format '{}'", other)),
        }
    }
}

/// Formatting preferences handed explicitly to date parsing and rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayConfig {
    pub time_format: TimeFormat,
    pub timezone: Tz,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::default(),
            timezone: Tz::UTC,
        }
    }
}

impl DisplayConfig {
    pub fn with_time_format(self, time_format: TimeFormat) -> Self {
        Self { time_format, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_file_falls_back_to_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"version":"1.0.0","general":{"language":"de","time_format":"12h"}}"#)
                .unwrap();
        assert_eq!(settings.general.time_format, TimeFormat::TwelveHour);
        assert_eq!(settings.general.timezone, "UTC");
        assert_eq!(settings.reminders.sweep_interval_secs, 60);
        assert_eq!(settings.auth.token_ttl_secs, 3600);
    }

    #[test]
    fn display_config_rejects_unknown_zone() {
        let mut general = GeneralSettings::default();
        general.timezone = "Mars/Olympus".into();
        assert!(general.display_config().is_err());

        general.timezone = "Europe/Berlin".into();
        let config = general.display_config().unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);
    }
}
