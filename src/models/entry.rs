use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::DisplayConfig;
use crate::services::date_precision;

/// Granularity at which an entry's date is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Year => "year",
            Precision::Month => "month",
            Precision::Day => "day",
            Precision::Hour => "hour",
            Precision::Minute => "minute",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "year" => Ok(Precision::Year),
            "month" => Ok(Precision::Month),
            "day" => Ok(Precision::Day),
            "hour" => Ok(Precision::Hour),
            "minute" => Ok(Precision::Minute),
            other => Err(AppError::validation(format!("unknown precision '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceRule {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceRule::None => "none",
            RecurrenceRule::Daily => "daily",
            RecurrenceRule::Weekly => "weekly",
            RecurrenceRule::Monthly => "monthly",
        }
    }

    /// Reads an optional wire value; absent, null and empty all mean `none`.
    pub fn parse_optional(value: Option<&str>) -> AppResult<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(RecurrenceRule::None),
            Some(v) => v.parse(),
        }
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceRule {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "null" => Ok(RecurrenceRule::None),
            "daily" => Ok(RecurrenceRule::Daily),
            "weekly" => Ok(RecurrenceRule::Weekly),
            "monthly" => Ok(RecurrenceRule::Monthly),
            _ => Err(AppError::UnsupportedRecurrence(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub precision: Precision,
    pub tags: BTreeSet<String>,
    pub recurrence_rule: RecurrenceRule,
    pub reminder_at: Option<DateTime<Utc>>,
    pub timetable_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A validated entry ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub precision: Precision,
    pub tags: BTreeSet<String>,
    pub recurrence_rule: RecurrenceRule,
    pub reminder_at: Option<DateTime<Utc>>,
    pub timetable_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub precision: Option<String>,
    pub timetable_id: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub recurrence_rule: Option<String>,
    pub reminder_at: Option<String>,
}

impl CreateEntryRequest {
    /// Checks required fields and parses dates; no storage is touched here.
    pub fn validate(self, config: &DisplayConfig) -> AppResult<NewEntry> {
        let title = self.title.filter(|t| !t.trim().is_empty());
        let date = self.date.filter(|d| !d.trim().is_empty());
        let precision = self.precision.filter(|p| !p.trim().is_empty());

        let mut missing = Vec::new();
        if title.is_none() {
            missing.push("title");
        }
        if date.is_none() {
            missing.push("date");
        }
        if precision.is_none() {
            missing.push("precision");
        }
        if self.timetable_id.is_none() {
            missing.push("timetableId");
        }

        let (Some(title), Some(date), Some(precision), Some(timetable_id)) =
            (title, date, precision, self.timetable_id)
        else {
            return Err(AppError::validation(format!(
                "missing fields: {}",
                missing.join(", ")
            )));
        };

        let precision: Precision = precision.parse()?;
        let date = date_precision::parse_entry_date(&date, precision, config)?;
        let reminder_at = self
            .reminder_at
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(|r| date_precision::parse_instant(r, config))
            .transpose()?;

        Ok(NewEntry {
            title,
            description: self.description.unwrap_or_default(),
            date,
            precision,
            tags: normalize_tags(self.tags.unwrap_or_default()),
            recurrence_rule: RecurrenceRule::parse_optional(self.recurrence_rule.as_deref())?,
            reminder_at,
            timetable_id,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub precision: Option<String>,
    pub tags: Option<Vec<String>>,
    pub recurrence_rule: Option<String>,
}

impl UpdateEntryRequest {
    /// Applies the requested changes on top of `current`.
    pub fn apply(self, current: &Entry, config: &DisplayConfig) -> AppResult<NewEntry> {
        let title = match self.title {
            Some(t) if t.trim().is_empty() => {
                return Err(AppError::validation("title must not be empty"))
            }
            Some(t) => t,
            None => current.title.clone(),
        };
        let precision = match self.precision.as_deref() {
            Some(p) => p.parse()?,
            None => current.precision,
        };
        let date = match self.date.as_deref() {
            Some(raw) => date_precision::parse_entry_date(raw, precision, config)?,
            None => date_precision::normalize(current.date, precision, config),
        };
        let recurrence_rule = match self.recurrence_rule.as_deref() {
            Some(r) => RecurrenceRule::parse_optional(Some(r))?,
            None => current.recurrence_rule,
        };

        Ok(NewEntry {
            title,
            description: self.description.unwrap_or_else(|| current.description.clone()),
            date,
            precision,
            tags: self.tags.map(normalize_tags).unwrap_or_else(|| current.tags.clone()),
            recurrence_rule,
            reminder_at: current.reminder_at,
            timetable_id: current.timetable_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateRequest {
    /// Decoded row by row so one malformed row cannot reject the batch.
    pub entries: Vec<serde_json::Value>,
    pub timetable_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRequest {
    pub reminder_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub count: Option<u32>,
}

/// Search criteria after the raw query string has been parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub query: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &Entry) -> bool {
        if let Some(q) = self.query.as_deref() {
            if !entry.title.contains(q) && !entry.description.contains(q) {
                return false;
            }
        }
        if self.start.is_some_and(|start| entry.date < start) {
            return false;
        }
        if self.end.is_some_and(|end| entry.date > end) {
            return false;
        }
        self.tags.is_subset(&entry.tags)
    }
}

/// Entry as served over the API, with its date rendered for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: Entry,
    pub display_date: String,
}

impl EntryView {
    pub fn new(entry: Entry, config: &DisplayConfig) -> Self {
        let display_date = date_precision::format_entry_date(entry.date, entry.precision, config);
        Self { entry, display_date }
    }
}

pub fn normalize_tags<I>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
