//! Data models for servers, accounts, characters and tracked activity.

use crate::error::{Result, TrackerError};
use crate::status::Status;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feature toggles carried by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerFeatures {
    pub has_dailies: bool,
    pub has_fishing: bool,
    pub has_tombola: bool,
}

impl ServerFeatures {
    pub fn all() -> Self {
        Self {
            has_dailies: true,
            has_fishing: true,
            has_tombola: true,
        }
    }
}

/// Database model for servers table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub features: ServerFeatures,
}

/// Database model for store_accounts table (one email)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreAccount {
    pub id: i64,
    pub email: String,
}

/// Database model for game_accounts table (one game login)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAccount {
    pub id: i64,
    pub store_account_id: i64,
    pub server_id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharType {
    #[default]
    Alchemist,
    Fisherman,
}

impl CharType {
    pub fn as_str(self) -> &'static str {
        match self {
            CharType::Alchemist => "ALCHEMIST",
            CharType::Fisherman => "FISHERMAN",
        }
    }
}

impl fmt::Display for CharType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CharType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALCHEMIST" | "ALQUIMISTA" => Ok(CharType::Alchemist),
            "FISHERMAN" | "PESCADOR" => Ok(CharType::Fisherman),
            other => Err(TrackerError::Parse(format!("Unknown character type '{}'", other))),
        }
    }
}

impl ToSql for CharType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CharType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: TrackerError| FromSqlError::Other(e.to_string().into()))
    }
}

/// Database model for characters table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub game_account_id: i64,
    pub name: String,
    pub char_type: CharType,
    pub slots: i32,
}

/// A time-boxed campaign (alchemy or tombola) tracked day by day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Event {
    /// Number of tracked days, both ends inclusive.
    pub fn days(&self) -> u32 {
        event_days(self.start_date, self.end_date)
    }

    /// 1-based day index of `date`, if it falls inside the event.
    pub fn day_index(&self, date: NaiveDate) -> Option<u32> {
        if date < self.start_date || date > self.end_date {
            return None;
        }
        Some((date - self.start_date).num_days() as u32 + 1)
    }
}

pub(crate) fn event_days(start: NaiveDate, end: NaiveDate) -> u32 {
    ((end - start).num_days() + 1).max(0) as u32
}

pub(crate) fn validate_event_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        return Err(TrackerError::Validation(format!(
            "Event ends ({}) before it starts ({})",
            end, start
        )));
    }
    Ok(())
}

/// Database model for fishing_activity table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FishingActivity {
    pub id: i64,
    pub character_id: i64,
    pub year: i32,
    pub month: u32,
    pub week: u32,
    pub status: Status,
}

/// Named per-event counter (alchemy counters, tombola item counters).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counter {
    pub event_id: i64,
    pub name: String,
    pub count: i64,
}

/// Database model for daily_cor_records table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCorRecord {
    pub event_id: i64,
    pub game_account_id: i64,
    pub day_index: u32,
    pub cords: i64,
}

/// Database model for timer_records table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerRecord {
    pub id: i64,
    pub name: String,
    pub elapsed_seconds: i64,
    pub created_at: DateTime<Utc>,
}

/// Character entry read from an import sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedCharacter {
    pub name: String,
    pub slots: i32,
    pub account_name: String,
}

/// One store email with the characters listed under it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedStore {
    pub email: String,
    pub characters: Vec<ImportedCharacter>,
}

/// Rows touched by a roster import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportSummary {
    pub stores_created: usize,
    pub accounts_created: usize,
    pub characters_created: usize,
    pub characters_updated: usize,
}

impl ImportSummary {
    pub fn merge(&mut self, other: &ImportSummary) {
        self.stores_created += other.stores_created;
        self.accounts_created += other.accounts_created;
        self.characters_created += other.characters_created;
        self.characters_updated += other.characters_updated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_event_days() {
        let event = Event {
            id: 1,
            server_id: 1,
            name: "Octubre".to_string(),
            start_date: date(2025, 10, 1),
            end_date: date(2025, 10, 31),
        };
        assert_eq!(event.days(), 31);
        assert_eq!(event.day_index(date(2025, 10, 1)), Some(1));
        assert_eq!(event.day_index(date(2025, 10, 31)), Some(31));
        assert_eq!(event.day_index(date(2025, 11, 1)), None);
    }

    #[test]
    fn test_validate_event_range() {
        assert!(validate_event_range(date(2025, 1, 2), date(2025, 1, 1)).is_err());
        assert!(validate_event_range(date(2025, 1, 1), date(2025, 1, 1)).is_ok());
    }

    #[test]
    fn test_char_type_parse() {
        assert_eq!("alchemist".parse::<CharType>().unwrap(), CharType::Alchemist);
        assert_eq!("Pescador".parse::<CharType>().unwrap(), CharType::Fisherman);
        assert!("warrior".parse::<CharType>().is_err());
        assert_eq!(serde_json::to_string(&CharType::Fisherman).unwrap(), "\"FISHERMAN\"");
    }
}
