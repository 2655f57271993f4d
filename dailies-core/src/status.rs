//! Tri-state day/week status and the sparse status map it lives in.

use crate::error::{Result, TrackerError};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a single day or week. Stored as `status_code` (0, 1, -1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Status {
    #[default]
    Pending,
    Done,
    Failed,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::Done => 1,
            Status::Failed => -1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Status::Pending),
            1 => Some(Status::Done),
            -1 => Some(Status::Failed),
            _ => None,
        }
    }

    /// Next status in the click cycle: pending -> done -> failed -> pending.
    pub fn cycle(self) -> Self {
        match self {
            Status::Pending => Status::Done,
            Status::Done => Status::Failed,
            Status::Failed => Status::Pending,
        }
    }

    pub fn is_pending(self) -> bool {
        self == Status::Pending
    }

    /// Single-character cell used by the text dashboards.
    pub fn symbol(self) -> char {
        match self {
            Status::Pending => '.',
            Status::Done => 'x',
            Status::Failed => '-',
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Pending => "pending",
            Status::Done => "done",
            Status::Failed => "failed",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for Status {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "pending" | "p" => Ok(Status::Pending),
            "1" | "done" | "d" | "ok" => Ok(Status::Done),
            "-1" | "failed" | "fail" | "f" => Ok(Status::Failed),
            other => Err(TrackerError::Parse(format!("Unknown status '{}'", other))),
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> i32 {
        status.code()
    }
}

impl TryFrom<i32> for Status {
    type Error = TrackerError;

    fn try_from(code: i32) -> Result<Self> {
        Status::from_code(code)
            .ok_or_else(|| TrackerError::Parse(format!("Invalid status code {}", code)))
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i32::column_result(value)?;
        Status::from_code(code).ok_or(FromSqlError::OutOfRange(code as i64))
    }
}

/// Done/failed/pending tallies over a map's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub done: u32,
    pub failed: u32,
    pub pending: u32,
}

/// Sparse `index -> Status` map over `1..=max_index`.
///
/// Indexes without a stored row read as pending. Rows outside the range
/// (for example after an event was shortened) are kept but ignored by scans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMap {
    max_index: u32,
    entries: BTreeMap<u32, Status>,
}

impl StatusMap {
    pub fn new(max_index: u32) -> Self {
        Self {
            max_index,
            entries: BTreeMap::new(),
        }
    }

    pub fn from_entries(max_index: u32, entries: impl IntoIterator<Item = (u32, Status)>) -> Self {
        Self {
            max_index,
            entries: entries.into_iter().collect(),
        }
    }

    pub fn max_index(&self) -> u32 {
        self.max_index
    }

    pub fn get(&self, index: u32) -> Status {
        self.entries.get(&index).copied().unwrap_or_default()
    }

    pub fn set(&mut self, index: u32, status: Status) -> Result<()> {
        self.check_range(index)?;
        self.entries.insert(index, status);
        Ok(())
    }

    /// Dense iteration over `1..=max_index`.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Status)> + '_ {
        (1..=self.max_index).map(move |index| (index, self.get(index)))
    }

    /// Lowest index in range that is pending or has no row.
    pub fn next_pending(&self) -> Option<u32> {
        (1..=self.max_index).find(|&index| self.get(index).is_pending())
    }

    pub fn check_range(&self, index: u32) -> Result<()> {
        if index == 0 || index > self.max_index {
            return Err(TrackerError::Validation(format!(
                "Index {} outside 1..={}",
                index, self.max_index
            )));
        }
        Ok(())
    }

    /// Writes must fill the range in order: `index` may only become
    /// non-pending once `index - 1` is settled.
    pub fn check_sequential(&self, index: u32, new_status: Status) -> Result<()> {
        self.check_range(index)?;
        if new_status.is_pending() || index == 1 {
            return Ok(());
        }
        let previous = index - 1;
        if self.get(previous).is_pending() {
            return Err(TrackerError::SequenceViolation { index, previous });
        }
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        self.iter().fold(Progress::default(), |mut acc, (_, status)| {
            match status {
                Status::Pending => acc.pending += 1,
                Status::Done => acc.done += 1,
                Status::Failed => acc.failed += 1,
            }
            acc
        })
    }

    /// Row of status symbols, one per index.
    pub fn render(&self) -> String {
        self.iter().map(|(_, status)| status.symbol()).collect()
    }
}
