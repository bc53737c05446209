//! Monthly attendance counts.

use crate::students::StudentRecord;
use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;

/// Format used when recording a timestamp; lexicographic order is time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Parse a stored ISO-8601 timestamp.
///
/// Accepts the naive local form written by the ledger, with or without
/// fractional seconds, and RFC 3339 values carrying an offset (the
/// wall-clock time is kept).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
}

/// Per-month counts for one student, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyCounts {
    /// (`YYYY-MM`, count)
    pub months: Vec<(String, usize)>,
    /// Values that could not be parsed and were left out.
    pub skipped: usize,
}

/// Group timestamps by calendar month.
///
/// Malformed values are skipped with a warning rather than aborting.
pub fn monthly_counts<S: AsRef<str>>(timestamps: &[S]) -> MonthlyCounts {
    let mut counts = MonthlyCounts::default();

    for raw in timestamps {
        let raw = raw.as_ref();
        let Some(dt) = parse_timestamp(raw) else {
            tracing::warn!(value = raw, "skipping malformed attendance timestamp");
            counts.skipped += 1;
            continue;
        };

        let month = dt.format("%Y-%m").to_string();
        match counts.months.iter_mut().find(|(m, _)| *m == month) {
            Some((_, n)) => *n += 1,
            None => counts.months.push((month, 1)),
        }
    }
    counts
}

/// One line of the attendance history table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub student_id: String,
    pub name: String,
    pub major: String,
    pub year: String,
    pub month: String,
    pub count: usize,
}

/// Flatten the monthly counts of every student into table rows.
pub fn history_rows(students: &[StudentRecord]) -> Vec<HistoryRow> {
    students
        .iter()
        .flat_map(|s| {
            let counts = monthly_counts(&s.attendance);
            if counts.skipped > 0 {
                tracing::warn!(student_id = %s.id, skipped = counts.skipped, "malformed timestamps left out");
            }
            counts.months.into_iter().map(move |(month, count)| HistoryRow {
                student_id: s.id.clone(),
                name: s.name.clone(),
                major: s.major.clone(),
                year: s.year.clone(),
                month,
                count,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_counts_example() {
        let counts = monthly_counts(&["2024-01-05T10:00:00", "2024-01-20T11:00:00", "2024-02-01T09:00:00"]);
        assert_eq!(counts.months, vec![("2024-01".to_string(), 2), ("2024-02".to_string(), 1)]);
        assert_eq!(counts.skipped, 0);
    }

    #[test]
    fn test_first_seen_order_not_chronological() {
        let counts = monthly_counts(&["2024-03-01T00:00:00", "2024-01-01T00:00:00", "2024-03-02T00:00:00"]);
        assert_eq!(counts.months, vec![("2024-03".to_string(), 2), ("2024-01".to_string(), 1)]);
    }

    #[test]
    fn test_malformed_skipped() {
        let counts = monthly_counts(&["2024-01-05T10:00:00", "yesterday", "", "2024-01-06T10:00:00.123456"]);
        assert_eq!(counts.months, vec![("2024-01".to_string(), 2)]);
        assert_eq!(counts.skipped, 2);
    }

    #[test]
    fn test_parse_variants() {
        assert!(parse_timestamp("2024-01-05T10:00:00").is_some());
        assert!(parse_timestamp("2024-01-05T10:00:00.5").is_some());
        let with_offset = parse_timestamp("2024-01-31T23:30:00+02:00").unwrap();
        assert_eq!(with_offset.format("%Y-%m").to_string(), "2024-01");
        assert!(parse_timestamp("2024-13-05T10:00:00").is_none());
    }

    #[test]
    fn test_recorded_format_roundtrips() {
        let dt = parse_timestamp("2024-05-06T07:08:09.123456").unwrap();
        assert_eq!(dt.format(TIMESTAMP_FORMAT).to_string(), "2024-05-06T07:08:09.123456");
    }

    #[test]
    fn test_history_rows_flattened() {
        let student = |id: &str, attendance: &[&str]| StudentRecord {
            id: id.into(),
            name: format!("N{id}"),
            major: "Math".into(),
            year: "1".into(),
            started: "2024".into(),
            attendance: attendance.iter().map(|s| s.to_string()).collect(),
        };
        let rows = history_rows(&[
            student("1001", &["2024-01-05T10:00:00", "2024-02-01T09:00:00"]),
            student("1002", &[]),
            student("1003", &["2024-01-07T10:00:00"]),
        ]);

        let summary: Vec<(&str, &str, usize)> = rows
            .iter()
            .map(|r| (r.student_id.as_str(), r.month.as_str(), r.count))
            .collect();
        assert_eq!(
            summary,
            vec![("1001", "2024-01", 1), ("1001", "2024-02", 1), ("1003", "2024-01", 1)]
        );
        assert_eq!(rows[0].name, "N1001");
    }
}
