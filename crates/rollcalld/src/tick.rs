//! One recognition tick: match results in, ledger writes and a status line out.

use rollcall_core::MatchResult;
use rollcall_store::students::get_student;
use rollcall_store::{AttendanceOutcome, Ledger, StudentRecord};
use std::fmt;

pub const NO_FACE: &str = "No face detected.";
pub const UNKNOWN_FACE: &str = "Unknown Face Detected";
pub const NO_MATCH: &str = "No matching student found.";

/// What happened to one face in a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceOutcome {
    /// Nearest student was farther than the tolerance.
    Unknown,
    /// The ledger was consulted; `student` is the record after the write.
    Attended {
        outcome: AttendanceOutcome,
        student: Option<StudentRecord>,
    },
    /// The database call failed.
    Failed(String),
}

/// The two status lines of the live view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickStatus {
    pub info: String,
    pub attendance: String,
}

impl Default for TickStatus {
    fn default() -> Self {
        Self {
            info: NO_FACE.to_string(),
            attendance: String::new(),
        }
    }
}

impl TickStatus {
    /// Status for a frame; with several faces the last one wins.
    pub fn from_outcomes(outcomes: &[FaceOutcome]) -> Self {
        outcomes.last().map(Self::for_face).unwrap_or_default()
    }

    fn for_face(outcome: &FaceOutcome) -> Self {
        match outcome {
            FaceOutcome::Unknown => Self {
                info: UNKNOWN_FACE.to_string(),
                attendance: NO_MATCH.to_string(),
            },
            FaceOutcome::Attended { outcome, student } => {
                let info = match (outcome.total(), student) {
                    (Some(total), Some(s)) => format!(
                        "ID: {} | Name: {} | Major: {} | Year: {} | Attendance: {total}",
                        s.id, s.name, s.major, s.year
                    ),
                    _ => "Student data not found.".to_string(),
                };
                Self {
                    info,
                    attendance: outcome.status().to_string(),
                }
            }
            FaceOutcome::Failed(msg) => Self {
                info: "Error fetching student data.".to_string(),
                attendance: format!("Error: {msg}"),
            },
        }
    }
}

impl fmt::Display for TickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attendance.is_empty() {
            f.write_str(&self.info)
        } else {
            write!(f, "{} | {}", self.info, self.attendance)
        }
    }
}

/// Run every face of a frame through the ledger, in detection order.
pub async fn process_faces(
    db: &tokio_rusqlite::Connection,
    ledger: Ledger,
    faces: &[MatchResult],
) -> Vec<FaceOutcome> {
    let mut outcomes = Vec::with_capacity(faces.len());
    for face in faces {
        let (left, top, right, bottom) = face.region.corners();
        tracing::debug!(left, top, right, bottom, distance = face.distance, accepted = face.accepted, "face");

        let outcome = match face.accepted_id() {
            Some(id) => attend(db, ledger, id.to_string()).await,
            None => {
                tracing::debug!(nearest = ?face.student_id, "unknown face");
                FaceOutcome::Unknown
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Record attendance for a recognized student at the current local time.
pub async fn attend(db: &tokio_rusqlite::Connection, ledger: Ledger, student_id: String) -> FaceOutcome {
    let now = chrono::Local::now().naive_local();
    let result = db
        .call(move |conn| {
            let outcome = ledger
                .record(conn, &student_id, now)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            let student = get_student(conn, &student_id).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok((outcome, student))
        })
        .await;

    match result {
        Ok((outcome, student)) => FaceOutcome::Attended { outcome, student },
        Err(e) => {
            tracing::error!(error = %e, "attendance lookup failed");
            FaceOutcome::Failed(e.to_string())
        }
    }
}

/// Counts consecutive failures of one kind and keeps the log quiet while
/// they repeat.
#[derive(Debug, Clone)]
pub struct FailureStreak {
    kind: &'static str,
    count: u32,
    warn_after: u32,
}

impl FailureStreak {
    pub fn new(kind: &'static str, warn_after: u32) -> Self {
        Self {
            kind,
            count: 0,
            warn_after: warn_after.max(1),
        }
    }

    /// Record and log a failure. Logs at warn (and returns true) each time the
    /// streak reaches a multiple of the threshold, at debug otherwise.
    pub fn failure(&mut self, error: &dyn fmt::Display) -> bool {
        self.count = self.count.saturating_add(1);
        let warn = self.count % self.warn_after == 0;
        if warn {
            tracing::warn!(kind = self.kind, failures = self.count, error = %error, "failures keep repeating");
        } else {
            tracing::debug!(kind = self.kind, error = %error, "tick failed, skipping");
        }
        warn
    }

    /// Record a success; returns the length of the streak it ended, if any.
    pub fn success(&mut self) -> Option<u32> {
        let ended = std::mem::take(&mut self.count);
        if ended > 0 {
            tracing::info!(kind = self.kind, failures = ended, "recovered");
        }
        (ended > 0).then_some(ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::FaceRegion;
    use rollcall_store::{db, students, NewStudent};

    fn face(id: &str, accepted: bool) -> MatchResult {
        MatchResult {
            region: FaceRegion {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
                landmarks: None,
            },
            student_id: Some(id.to_string()),
            distance: if accepted { 0.2 } else { 1.5 },
            accepted,
        }
    }

    async fn db_with_student(id: &'static str) -> tokio_rusqlite::Connection {
        let conn = tokio_rusqlite::Connection::open_in_memory().await.unwrap();
        conn.call(move |c| {
            db::prepare(c).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            students::add_student(
                c,
                &NewStudent {
                    id: id.into(),
                    name: "Ada".into(),
                    major: "Maths".into(),
                    year: "3".into(),
                    started: "2022".into(),
                },
            )
            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok(())
        })
        .await
        .unwrap();
        conn
    }

    #[test]
    fn test_status_no_faces() {
        let status = TickStatus::from_outcomes(&[]);
        assert_eq!(status.info, NO_FACE);
        assert_eq!(status.attendance, "");
        assert_eq!(status.to_string(), NO_FACE);
    }

    #[test]
    fn test_status_unknown() {
        let status = TickStatus::from_outcomes(&[FaceOutcome::Unknown]);
        assert_eq!(status.info, UNKNOWN_FACE);
        assert_eq!(status.attendance, NO_MATCH);
    }

    #[test]
    fn test_status_last_face_wins() {
        let status = TickStatus::from_outcomes(&[
            FaceOutcome::Failed("disk I/O error".into()),
            FaceOutcome::Attended {
                outcome: AttendanceOutcome::StudentNotFound,
                student: None,
            },
        ]);
        assert_eq!(status.attendance, "Student not found.");

        let status = TickStatus::from_outcomes(&[FaceOutcome::Unknown, FaceOutcome::Failed("disk I/O error".into())]);
        assert_eq!(status.attendance, "Error: disk I/O error");
    }

    #[test]
    fn test_status_shows_ledger_total() {
        let student = StudentRecord {
            id: "1001".into(),
            name: "Ada".into(),
            major: "Maths".into(),
            year: "3".into(),
            started: "2022".into(),
            attendance: Vec::new(),
        };
        let status = TickStatus::from_outcomes(&[FaceOutcome::Attended {
            outcome: AttendanceOutcome::AlreadyAttended { total: 7 },
            student: Some(student),
        }]);
        assert_eq!(status.info, "ID: 1001 | Name: Ada | Major: Maths | Year: 3 | Attendance: 7");
        assert_eq!(status.attendance, "Already Attended");
    }

    #[tokio::test]
    async fn test_recorded_then_already_attended() {
        let db = db_with_student("1001").await;
        let ledger = Ledger::default();

        let first = process_faces(&db, ledger, &[face("1001", true)]).await;
        let status = TickStatus::from_outcomes(&first);
        assert_eq!(status.attendance, "Attendance Recorded!");
        assert!(status.info.contains("Name: Ada"));
        assert!(status.info.ends_with("Attendance: 1"));

        let second = process_faces(&db, ledger, &[face("1001", true)]).await;
        let status = TickStatus::from_outcomes(&second);
        assert_eq!(status.attendance, "Already Attended");
        assert!(status.info.ends_with("Attendance: 1"));
    }

    #[tokio::test]
    async fn test_rejected_face_never_touches_ledger() {
        let db = db_with_student("1001").await;
        let outcomes = process_faces(&db, Ledger::default(), &[face("1001", false)]).await;
        assert_eq!(outcomes, vec![FaceOutcome::Unknown]);

        let count: i64 = db
            .call(|c| Ok(c.query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_recognized_but_not_enrolled() {
        let db = db_with_student("1001").await;
        let outcome = attend(&db, Ledger::default(), "2002".into()).await;
        assert_eq!(
            outcome,
            FaceOutcome::Attended {
                outcome: AttendanceOutcome::StudentNotFound,
                student: None
            }
        );
        assert_eq!(TickStatus::from_outcomes(&[outcome]).info, "Student data not found.");
    }

    #[test]
    fn test_failure_streak_warns_at_threshold() {
        let mut streak = FailureStreak::new("frame read", 3);
        assert!(!streak.failure(&"timeout"));
        assert!(!streak.failure(&"timeout"));
        assert!(streak.failure(&"timeout"));
        assert!(!streak.failure(&"timeout"));
        assert_eq!(streak.success(), Some(4));
        assert_eq!(streak.success(), None);
        assert!(!streak.failure(&"timeout"));
    }

    #[test]
    fn test_failure_streak_zero_threshold() {
        let mut streak = FailureStreak::new("frame read", 0);
        assert!(streak.failure(&"timeout"));
    }

    #[test]
    fn test_repeated_recognition_error_warns_once_per_threshold() {
        let err = rollcall_core::MatchError::EmptyStore;
        let mut streak = FailureStreak::new("recognition", 10);
        let warnings = (0..30).filter(|_| streak.failure(&err)).count();
        assert_eq!(warnings, 3);
        assert_eq!(streak.success(), Some(30));
    }
}
