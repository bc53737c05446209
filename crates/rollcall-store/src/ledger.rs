//! Attendance ledger: append a timestamp unless the student was seen recently.

use crate::db::DbError;
use crate::history::{parse_timestamp, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::time::Duration;

/// Default minimum gap between two recorded attendances.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// What happened when a recognized student was presented to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceOutcome {
    /// A new timestamp was appended; `total` includes it.
    Recorded { total: usize },
    /// Last timestamp is within the cooldown window; nothing written.
    AlreadyAttended { total: usize },
    /// Recognized id has no student record.
    StudentNotFound,
}

impl AttendanceOutcome {
    /// Status line shown to the person in front of the camera.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Recorded { .. } => "Attendance Recorded!",
            Self::AlreadyAttended { .. } => "Already Attended",
            Self::StudentNotFound => "Student not found.",
        }
    }

    pub fn total(&self) -> Option<usize> {
        match self {
            Self::Recorded { total } | Self::AlreadyAttended { total } => Some(*total),
            Self::StudentNotFound => None,
        }
    }
}

/// Record attendance for `student_id` at `now`, honouring `cooldown`.
///
/// Read and append run in one IMMEDIATE transaction, so a concurrent
/// writer cannot slip a second record into the cooldown window. The most
/// recently appended row is taken as the latest attendance.
pub fn record_attendance(
    conn: &mut Connection,
    student_id: &str,
    now: NaiveDateTime,
    cooldown: Duration,
) -> Result<AttendanceOutcome, DbError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM students WHERE id = ?1)",
        params![student_id],
        |row| row.get(0),
    )?;
    if !exists {
        tracing::warn!(student_id, "recognized student has no record");
        return Ok(AttendanceOutcome::StudentNotFound);
    }

    let (total, last): (usize, Option<String>) = {
        let total: i64 = tx.query_row(
            "SELECT COUNT(*) FROM attendance WHERE student_id = ?1",
            params![student_id],
            |row| row.get(0),
        )?;
        let last = tx
            .query_row(
                "SELECT recorded_at FROM attendance WHERE student_id = ?1 ORDER BY id DESC LIMIT 1",
                params![student_id],
                |row| row.get(0),
            )
            .optional()?;
        (total as usize, last)
    };

    if let Some(raw) = last {
        match parse_timestamp(&raw) {
            Some(prev) if within_cooldown(prev, now, cooldown) => {
                tracing::debug!(student_id, last = %raw, "within cooldown");
                return Ok(AttendanceOutcome::AlreadyAttended { total });
            }
            Some(_) => {}
            None => tracing::warn!(student_id, value = %raw, "last attendance timestamp unparseable, recording anyway"),
        }
    }

    tx.execute(
        "INSERT INTO attendance (student_id, recorded_at) VALUES (?1, ?2)",
        params![student_id, now.format(TIMESTAMP_FORMAT).to_string()],
    )?;
    tx.commit()?;

    tracing::info!(student_id, total = total + 1, "attendance recorded");
    Ok(AttendanceOutcome::Recorded { total: total + 1 })
}

/// `now - prev < cooldown`; a clock that moved backwards counts as within.
fn within_cooldown(prev: NaiveDateTime, now: NaiveDateTime, cooldown: Duration) -> bool {
    match (now - prev).to_std() {
        Ok(elapsed) => elapsed < cooldown,
        Err(_) => true,
    }
}

/// A ledger bound to a fixed cooldown window.
#[derive(Debug, Clone, Copy)]
pub struct Ledger {
    cooldown: Duration,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl Ledger {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn record(
        &self,
        conn: &mut Connection,
        student_id: &str,
        now: NaiveDateTime,
    ) -> Result<AttendanceOutcome, DbError> {
        record_attendance(conn, student_id, now, self.cooldown)
    }
}
