//! Stopwatch log.

use crate::database::Database;
use crate::error::{Result, TrackerError};
use crate::models::TimerRecord;
use chrono::Utc;
use rusqlite::params;

/// `HH:MM:SS`, hours not capped at 24.
pub fn format_elapsed(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.unsigned_abs();
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Accepts `HH:MM:SS`, `MM:SS` or plain seconds.
pub fn parse_elapsed(text: &str) -> Result<i64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(TrackerError::Parse(format!("Invalid duration '{}'", text)));
    }
    let mut total: i64 = 0;
    for (i, part) in parts.iter().enumerate() {
        let value: i64 = part
            .trim()
            .parse()
            .map_err(|_| TrackerError::Parse(format!("Invalid duration '{}'", text)))?;
        if value < 0 || (i > 0 && value >= 60) {
            return Err(TrackerError::Parse(format!("Invalid duration '{}'", text)));
        }
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or_else(|| TrackerError::Parse(format!("Duration '{}' is too large", text)))?;
    }
    Ok(total)
}

impl Database {
    pub fn record_timer(&self, name: &str, elapsed_seconds: i64) -> Result<TimerRecord> {
        if elapsed_seconds < 0 {
            return Err(TrackerError::Validation("Elapsed time is negative".to_string()));
        }
        let created_at = Utc::now();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO timer_records (name, elapsed_seconds, created_at) VALUES (?, ?, ?)",
            params![name, elapsed_seconds, created_at],
        )?;
        tracing::info!("Recorded timer {} ({})", name, format_elapsed(elapsed_seconds));
        Ok(TimerRecord {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            elapsed_seconds,
            created_at,
        })
    }

    /// Most recent first.
    pub fn list_timers(&self, limit: usize) -> Result<Vec<TimerRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, elapsed_seconds, created_at FROM timer_records
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(TimerRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    elapsed_seconds: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn delete_timer(&self, timer_id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM timer_records WHERE id = ?", params![timer_id])?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("timer {}", timer_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(61), "00:01:01");
        assert_eq!(format_elapsed(3600 * 25 + 5), "25:00:05");
    }

    #[test]
    fn test_parse_elapsed() {
        assert_eq!(parse_elapsed("90").unwrap(), 90);
        assert_eq!(parse_elapsed("01:30").unwrap(), 90);
        assert_eq!(parse_elapsed("1:00:00").unwrap(), 3600);
        assert!(parse_elapsed("1:75").is_err());
        assert!(parse_elapsed("a:b").is_err());
        assert!(parse_elapsed("1:2:3:4").is_err());
    }

    #[test]
    fn test_parse_elapsed_overflow() {
        assert!(matches!(parse_elapsed("9223372036854775807:00"), Err(TrackerError::Parse(_))));
        assert!(matches!(parse_elapsed("9223372036854775807:00:00"), Err(TrackerError::Parse(_))));
        assert_eq!(parse_elapsed("9223372036854775807").unwrap(), i64::MAX);
    }

    #[test]
    fn test_record_and_list_timers() {
        let db = Database::in_memory().unwrap();
        db.record_timer("boss", 300).unwrap();
        let second = db.record_timer("pesca", 1200).unwrap();
        let timers = db.list_timers(10).unwrap();
        assert_eq!(timers.len(), 2);
        assert_eq!(timers[0].id, second.id);
        assert_eq!(db.list_timers(1).unwrap().len(), 1);

        db.delete_timer(second.id).unwrap();
        assert_eq!(db.list_timers(10).unwrap().len(), 1);
        assert!(db.delete_timer(second.id).is_err());
        assert!(db.record_timer("neg", -1).is_err());
    }
}
