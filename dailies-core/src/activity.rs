//! Shared storage for event-scoped day tracking.
//!
//! Alchemy (daily cor) and tombola keep the same shape: an event table, an
//! activity table keyed by (character, event, day) and a named counter table.
//! The feature modules pick a [`DayTable`] and call into here.

use crate::error::{Result, TrackerError};
use crate::models::{Counter, Event, validate_event_range};
use crate::status::{Status, StatusMap};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DayTable {
    DailyCor,
    Tombola,
}

impl DayTable {
    fn events(self) -> &'static str {
        match self {
            DayTable::DailyCor => "alchemy_events",
            DayTable::Tombola => "tombola_events",
        }
    }

    fn activity(self) -> &'static str {
        match self {
            DayTable::DailyCor => "daily_cor_activity",
            DayTable::Tombola => "tombola_activity",
        }
    }

    /// (table, name column) of the per-event counters.
    fn counters(self) -> (&'static str, &'static str) {
        match self {
            DayTable::DailyCor => ("alchemy_counters", "name"),
            DayTable::Tombola => ("tombola_item_counters", "item_name"),
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            DayTable::DailyCor => "alchemy event",
            DayTable::Tombola => "tombola event",
        }
    }
}

fn event_from_row(row: &Row) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        server_id: row.get(1)?,
        name: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
    })
}

pub(crate) fn create_event(
    conn: &Connection,
    table: DayTable,
    server_id: i64,
    name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Event> {
    validate_event_range(start_date, end_date)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(TrackerError::Validation(format!("{} name is empty", table.label())));
    }
    conn.execute(
        &format!(
            "INSERT INTO {} (server_id, name, start_date, end_date) VALUES (?, ?, ?, ?)",
            table.events()
        ),
        params![server_id, name, start_date, end_date],
    )?;
    let event = Event {
        id: conn.last_insert_rowid(),
        server_id,
        name: name.to_string(),
        start_date,
        end_date,
    };
    tracing::info!(
        "Created {} {} ({} days) on server {}",
        table.label(),
        event.name,
        event.days(),
        server_id
    );
    Ok(event)
}

pub(crate) fn load_event(conn: &Connection, table: DayTable, event_id: i64) -> Result<Event> {
    conn.query_row(
        &format!(
            "SELECT id, server_id, name, start_date, end_date FROM {} WHERE id = ?",
            table.events()
        ),
        params![event_id],
        event_from_row,
    )
    .optional()?
    .ok_or_else(|| TrackerError::NotFound(format!("{} {}", table.label(), event_id)))
}

pub(crate) fn list_events(conn: &Connection, table: DayTable, server_id: i64) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, server_id, name, start_date, end_date FROM {}
         WHERE server_id = ? ORDER BY start_date DESC, id DESC",
        table.events()
    ))?;
    let events = stmt
        .query_map(params![server_id], event_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

pub(crate) fn delete_event(conn: &Connection, table: DayTable, event_id: i64) -> Result<()> {
    let changed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?", table.events()),
        params![event_id],
    )?;
    if changed == 0 {
        return Err(TrackerError::NotFound(format!("{} {}", table.label(), event_id)));
    }
    Ok(())
}

/// Find-or-create the row for (character, event, day) and set its status.
pub(crate) fn upsert_day_status(
    conn: &Connection,
    table: DayTable,
    character_id: i64,
    event_id: i64,
    day_index: u32,
    status: Status,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (character_id, event_id, day_index, status_code) VALUES (?, ?, ?, ?)
             ON CONFLICT(character_id, event_id, day_index) DO UPDATE SET
                status_code = excluded.status_code",
            table.activity()
        ),
        params![character_id, event_id, day_index, status],
    )?;
    Ok(())
}

pub(crate) fn day_status_map(
    conn: &Connection,
    table: DayTable,
    character_id: i64,
    event: &Event,
) -> Result<StatusMap> {
    let mut stmt = conn.prepare(&format!(
        "SELECT day_index, status_code FROM {} WHERE character_id = ? AND event_id = ?",
        table.activity()
    ))?;
    let entries = stmt
        .query_map(params![character_id, event.id], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, Status>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(StatusMap::from_entries(event.days(), entries))
}

/// Every stored day status of an event, keyed by character id.
pub(crate) fn event_status_rows(
    conn: &Connection,
    table: DayTable,
    event_id: i64,
) -> Result<HashMap<i64, Vec<(u32, Status)>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT character_id, day_index, status_code FROM {} WHERE event_id = ?",
        table.activity()
    ))?;
    let mut rows = stmt.query(params![event_id])?;
    let mut by_character: HashMap<i64, Vec<(u32, Status)>> = HashMap::new();
    while let Some(row) = rows.next()? {
        by_character
            .entry(row.get(0)?)
            .or_default()
            .push((row.get(1)?, row.get(2)?));
    }
    Ok(by_character)
}

/// Fail unless the character plays on the event's server.
pub(crate) fn check_character_server(conn: &Connection, character_id: i64, event: &Event) -> Result<()> {
    let server_id: i64 = conn
        .query_row(
            "SELECT g.server_id FROM characters c
             JOIN game_accounts g ON g.id = c.game_account_id
             WHERE c.id = ?",
            params![character_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| TrackerError::NotFound(format!("character {}", character_id)))?;
    if server_id != event.server_id {
        return Err(TrackerError::Validation(format!(
            "Character {} is on server {}, event '{}' on server {}",
            character_id, server_id, event.name, event.server_id
        )));
    }
    Ok(())
}

/// Fail unless the event belongs to `server_id`.
pub(crate) fn check_event_server(event: &Event, server_id: i64) -> Result<()> {
    if event.server_id != server_id {
        return Err(TrackerError::Validation(format!(
            "Event '{}' belongs to server {}, not {}",
            event.name, event.server_id, server_id
        )));
    }
    Ok(())
}

/// Upsert after checking the day is in range.
pub(crate) fn set_day(
    conn: &mut Connection,
    table: DayTable,
    character_id: i64,
    event_id: i64,
    day_index: u32,
    status: Status,
) -> Result<()> {
    let tx = conn.transaction()?;
    let event = load_event(&tx, table, event_id)?;
    StatusMap::new(event.days()).check_range(day_index)?;
    check_character_server(&tx, character_id, &event)?;
    upsert_day_status(&tx, table, character_id, event_id, day_index, status)?;
    tx.commit()?;
    Ok(())
}

/// Upsert after checking the sequential-fill rule against stored rows.
/// `next` maps the current status to the one to write.
pub(crate) fn advance_day(
    conn: &mut Connection,
    table: DayTable,
    character_id: i64,
    event_id: i64,
    day_index: u32,
    next: impl FnOnce(Status) -> Status,
) -> Result<Status> {
    let tx = conn.transaction()?;
    let event = load_event(&tx, table, event_id)?;
    check_character_server(&tx, character_id, &event)?;
    let map = day_status_map(&tx, table, character_id, &event)?;
    let status = next(map.get(day_index));
    map.check_sequential(day_index, status)?;
    upsert_day_status(&tx, table, character_id, event_id, day_index, status)?;
    tx.commit()?;
    tracing::debug!(
        "{} {} day {} of character {} -> {}",
        table.label(),
        event_id,
        day_index,
        character_id,
        status
    );
    Ok(status)
}

fn counter_name(table: DayTable, name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TrackerError::Validation(format!("{} counter name is empty", table.label())));
    }
    Ok(name)
}

pub(crate) fn add_to_counter(
    conn: &Connection,
    table: DayTable,
    event_id: i64,
    name: &str,
    delta: i64,
) -> Result<i64> {
    let name = counter_name(table, name)?;
    let (counters, column) = table.counters();
    let count = conn.query_row(
        &format!(
            "INSERT INTO {counters} (event_id, {column}, count) VALUES (?1, ?2, ?3)
             ON CONFLICT(event_id, {column}) DO UPDATE SET count = count + excluded.count
             RETURNING count"
        ),
        params![event_id, name, delta],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub(crate) fn set_counter(conn: &Connection, table: DayTable, event_id: i64, name: &str, count: i64) -> Result<()> {
    let name = counter_name(table, name)?;
    let (counters, column) = table.counters();
    conn.execute(
        &format!(
            "INSERT INTO {counters} (event_id, {column}, count) VALUES (?1, ?2, ?3)
             ON CONFLICT(event_id, {column}) DO UPDATE SET count = excluded.count"
        ),
        params![event_id, name, count],
    )?;
    Ok(())
}

pub(crate) fn list_counters(conn: &Connection, table: DayTable, event_id: i64) -> Result<Vec<Counter>> {
    let (counters, column) = table.counters();
    let mut stmt = conn.prepare(&format!(
        "SELECT event_id, {column}, count FROM {counters} WHERE event_id = ? ORDER BY {column}"
    ))?;
    let rows = stmt
        .query_map(params![event_id], |row| {
            Ok(Counter {
                event_id: row.get(0)?,
                name: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
