//! rollcall-store: Student records and attendance persistence.
//!
//! Everything lives in one SQLite database: the `students` table and an
//! append-only `attendance` table whose row order is the per-student
//! recording order.

pub mod db;
pub mod history;
pub mod ledger;
pub mod students;

pub use db::DbError;
pub use history::{history_rows, monthly_counts, HistoryRow, MonthlyCounts};
pub use ledger::{record_attendance, AttendanceOutcome, Ledger};
pub use students::{NewStudent, StudentRecord, StudentUpdate};
