//! Weekly fishing status per character and calendar month.

use crate::dashboard::{self, Dashboard, Feature};
use crate::database::Database;
use crate::error::{Result, TrackerError};
use crate::models::{CharType, FishingActivity};
use crate::status::{Status, StatusMap};
use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, params};
use std::collections::HashMap;

fn days_in_month(year: i32, month: u32) -> Result<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| TrackerError::Validation(format!("Invalid month {}-{}", year, month)))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| TrackerError::Validation(format!("Invalid month {}-{}", year, month)))?;
    Ok((next - first).num_days() as u32)
}

/// Tracked weeks in a month: `ceil(days / 7)`, so 4 or 5.
pub fn weeks_in_month(year: i32, month: u32) -> Result<u32> {
    Ok(days_in_month(year, month)?.div_ceil(7))
}

/// Week of the month a date falls in, 1-based.
pub fn week_of_month(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7 + 1
}

fn upsert_week(conn: &Connection, character_id: i64, year: i32, month: u32, week: u32, status: Status) -> Result<()> {
    conn.execute(
        "INSERT INTO fishing_activity (character_id, year, month, week, status_code)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(character_id, year, month, week) DO UPDATE SET
            status_code = excluded.status_code",
        params![character_id, year, month, week, status],
    )?;
    Ok(())
}

fn month_map(conn: &Connection, character_id: i64, year: i32, month: u32) -> Result<StatusMap> {
    let weeks = weeks_in_month(year, month)?;
    let mut stmt = conn.prepare(
        "SELECT week, status_code FROM fishing_activity
         WHERE character_id = ? AND year = ? AND month = ?",
    )?;
    let entries = stmt
        .query_map(params![character_id, year, month], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<(u32, Status)>>>()?;
    Ok(StatusMap::from_entries(weeks, entries))
}

impl Database {
    /// Set the status of one week, creating the row if needed.
    pub fn update_fishing_status(
        &self,
        character_id: i64,
        year: i32,
        month: u32,
        week: u32,
        status: Status,
    ) -> Result<()> {
        StatusMap::new(weeks_in_month(year, month)?).check_range(week)?;
        let conn = self.connection()?;
        upsert_week(&conn, character_id, year, month, week, status)
    }

    pub fn get_fishing_status_map(&self, character_id: i64, year: i32, month: u32) -> Result<StatusMap> {
        let conn = self.connection()?;
        month_map(&conn, character_id, year, month)
    }

    pub fn get_next_pending_week(&self, character_id: i64, year: i32, month: u32) -> Result<Option<u32>> {
        Ok(self.get_fishing_status_map(character_id, year, month)?.next_pending())
    }

    pub fn list_fishing_activity(&self, character_id: i64) -> Result<Vec<FishingActivity>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, character_id, year, month, week, status_code FROM fishing_activity
             WHERE character_id = ? ORDER BY year, month, week",
        )?;
        let rows = stmt
            .query_map(params![character_id], |row| {
                Ok(FishingActivity {
                    id: row.get(0)?,
                    character_id: row.get(1)?,
                    year: row.get(2)?,
                    month: row.get(3)?,
                    week: row.get(4)?,
                    status: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Set a week, refusing to settle it while the previous week is pending.
    pub fn mark_fishing_week(
        &self,
        character_id: i64,
        year: i32,
        month: u32,
        week: u32,
        status: Status,
    ) -> Result<Status> {
        self.advance_week(character_id, year, month, week, |_| status)
    }

    /// Advance a week through pending -> done -> failed -> pending.
    pub fn cycle_fishing_week(&self, character_id: i64, year: i32, month: u32, week: u32) -> Result<Status> {
        self.advance_week(character_id, year, month, week, Status::cycle)
    }

    fn advance_week(
        &self,
        character_id: i64,
        year: i32,
        month: u32,
        week: u32,
        next: impl FnOnce(Status) -> Status,
    ) -> Result<Status> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let map = month_map(&tx, character_id, year, month)?;
        let status = next(map.get(week));
        map.check_sequential(week, status)?;
        upsert_week(&tx, character_id, year, month, week, status)?;
        tx.commit()?;
        tracing::debug!(
            "Fishing {}-{:02} week {} of character {} -> {}",
            year,
            month,
            week,
            character_id,
            status
        );
        Ok(status)
    }

    /// Fisherman characters of a server with their week grid for one month.
    pub fn fishing_dashboard(&self, server_id: i64, year: i32, month: u32) -> Result<Dashboard> {
        let weeks = weeks_in_month(year, month)?;
        let conn = self.connection()?;
        let server = dashboard::require_feature(&conn, server_id, Feature::Fishing)?;

        let mut groups = dashboard::load_groups(&conn, server_id, Some(CharType::Fisherman), weeks)?;

        let mut stmt = conn.prepare(
            "SELECT f.character_id, f.week, f.status_code FROM fishing_activity f
             JOIN characters c ON c.id = f.character_id
             JOIN game_accounts g ON g.id = c.game_account_id
             WHERE g.server_id = ? AND f.year = ? AND f.month = ?",
        )?;
        let mut rows = stmt.query(params![server_id, year, month])?;
        let mut statuses: HashMap<i64, Vec<(u32, Status)>> = HashMap::new();
        while let Some(row) = rows.next()? {
            statuses
                .entry(row.get(0)?)
                .or_default()
                .push((row.get(1)?, row.get(2)?));
        }
        dashboard::overlay_statuses(&mut groups, statuses);

        Ok(Dashboard {
            server,
            title: format!("Fishing: {}-{:02}", year, month),
            max_index: weeks,
            groups,
        })
    }
}
