//! Alchemy events: daily cor status per character and day, named counters
//! and per-account cord counts.

use crate::activity::{self, DayTable};
use crate::dashboard::{self, Dashboard, Feature};
use crate::database::Database;
use crate::error::{Result, TrackerError};
use crate::models::{CharType, Counter, DailyCorRecord, Event};
use crate::status::{Status, StatusMap};
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;

const TABLE: DayTable = DayTable::DailyCor;

impl Database {
    pub fn create_alchemy_event(
        &self,
        server_id: i64,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Event> {
        let conn = self.connection()?;
        activity::create_event(&conn, TABLE, server_id, name, start_date, end_date)
    }

    pub fn get_alchemy_event(&self, event_id: i64) -> Result<Event> {
        let conn = self.connection()?;
        activity::load_event(&conn, TABLE, event_id)
    }

    /// Events of a server, newest first.
    pub fn list_alchemy_events(&self, server_id: i64) -> Result<Vec<Event>> {
        let conn = self.connection()?;
        activity::list_events(&conn, TABLE, server_id)
    }

    pub fn delete_alchemy_event(&self, event_id: i64) -> Result<()> {
        let conn = self.connection()?;
        activity::delete_event(&conn, TABLE, event_id)
    }

    /// Set the status of one day, creating the row if needed.
    pub fn update_daily_cor_status(
        &self,
        character_id: i64,
        event_id: i64,
        day_index: u32,
        status: Status,
    ) -> Result<()> {
        let mut conn = self.connection()?;
        activity::set_day(&mut conn, TABLE, character_id, event_id, day_index, status)
    }

    pub fn get_daily_cor_status_map(&self, character_id: i64, event_id: i64) -> Result<StatusMap> {
        let conn = self.connection()?;
        let event = activity::load_event(&conn, TABLE, event_id)?;
        activity::day_status_map(&conn, TABLE, character_id, &event)
    }

    pub fn get_next_pending_day(&self, character_id: i64, event_id: i64) -> Result<Option<u32>> {
        Ok(self.get_daily_cor_status_map(character_id, event_id)?.next_pending())
    }

    /// Like [`Database::update_daily_cor_status`], but refuses to settle a day
    /// while the previous one is still pending.
    pub fn mark_daily_cor_day(
        &self,
        character_id: i64,
        event_id: i64,
        day_index: u32,
        status: Status,
    ) -> Result<Status> {
        let mut conn = self.connection()?;
        activity::advance_day(&mut conn, TABLE, character_id, event_id, day_index, |_| status)
    }

    /// Advance a day through pending -> done -> failed -> pending.
    pub fn cycle_daily_cor_day(&self, character_id: i64, event_id: i64, day_index: u32) -> Result<Status> {
        let mut conn = self.connection()?;
        activity::advance_day(&mut conn, TABLE, character_id, event_id, day_index, Status::cycle)
    }

    /// Add `delta` to a named counter and return the new value.
    pub fn increment_alchemy_counter(&self, event_id: i64, name: &str, delta: i64) -> Result<i64> {
        let conn = self.connection()?;
        activity::add_to_counter(&conn, TABLE, event_id, name, delta)
    }

    pub fn set_alchemy_counter(&self, event_id: i64, name: &str, count: i64) -> Result<()> {
        let conn = self.connection()?;
        activity::set_counter(&conn, TABLE, event_id, name, count)
    }

    pub fn list_alchemy_counters(&self, event_id: i64) -> Result<Vec<Counter>> {
        let conn = self.connection()?;
        activity::list_counters(&conn, TABLE, event_id)
    }

    /// Record the cords an account collected on one day of an event.
    pub fn set_daily_cords(&self, event_id: i64, game_account_id: i64, day_index: u32, cords: i64) -> Result<()> {
        let conn = self.connection()?;
        let event = activity::load_event(&conn, TABLE, event_id)?;
        StatusMap::new(event.days()).check_range(day_index)?;
        let account_server: i64 = conn
            .query_row(
                "SELECT server_id FROM game_accounts WHERE id = ?",
                params![game_account_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| TrackerError::NotFound(format!("game account {}", game_account_id)))?;
        activity::check_event_server(&event, account_server)?;
        conn.execute(
            "INSERT INTO daily_cor_records (event_id, game_account_id, day_index, cords)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(event_id, game_account_id, day_index) DO UPDATE SET
                cords = excluded.cords",
            params![event_id, game_account_id, day_index, cords],
        )?;
        Ok(())
    }

    /// Cords per day for one account, sparse.
    pub fn get_account_cords(&self, event_id: i64, game_account_id: i64) -> Result<BTreeMap<u32, i64>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT day_index, cords FROM daily_cor_records
             WHERE event_id = ? AND game_account_id = ?",
        )?;
        let cords = stmt
            .query_map(params![event_id, game_account_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<u32, i64>>>()?;
        Ok(cords)
    }

    pub fn list_daily_cor_records(&self, event_id: i64) -> Result<Vec<DailyCorRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, game_account_id, day_index, cords FROM daily_cor_records
             WHERE event_id = ? ORDER BY game_account_id, day_index",
        )?;
        let records = stmt
            .query_map(params![event_id], |row| {
                Ok(DailyCorRecord {
                    event_id: row.get(0)?,
                    game_account_id: row.get(1)?,
                    day_index: row.get(2)?,
                    cords: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn total_event_cords(&self, event_id: i64) -> Result<i64> {
        let conn = self.connection()?;
        let total = conn.query_row(
            "SELECT COALESCE(SUM(cords), 0) FROM daily_cor_records WHERE event_id = ?",
            params![event_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Alchemist characters of a server with their day grid for `event_id`.
    pub fn alchemy_dashboard(&self, server_id: i64, event_id: i64) -> Result<Dashboard> {
        let conn = self.connection()?;
        let server = dashboard::require_feature(&conn, server_id, Feature::Dailies)?;
        let event = activity::load_event(&conn, TABLE, event_id)?;
        activity::check_event_server(&event, server_id)?;

        let mut groups = dashboard::load_groups(&conn, server_id, Some(CharType::Alchemist), event.days())?;
        let statuses = activity::event_status_rows(&conn, TABLE, event_id)?;
        dashboard::overlay_statuses(&mut groups, statuses);

        Ok(Dashboard {
            server,
            title: format!("Alchemy: {} ({} - {})", event.name, event.start_date, event.end_date),
            max_index: event.days(),
            groups,
        })
    }
}
