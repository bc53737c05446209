//! Student records: create, read, update, delete.

use crate::db::DbError;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;

/// A student with their full attendance history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub major: String,
    pub year: String,
    /// Enrollment start label, free text (e.g. "2022").
    pub started: String,
    /// Recorded instants, oldest first.
    pub attendance: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub id: String,
    pub name: String,
    pub major: String,
    pub year: String,
    pub started: String,
}

/// Field changes for an existing student; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub major: Option<String>,
    pub year: Option<String>,
    pub started: Option<String>,
}

impl StudentUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.major.is_none() && self.year.is_none() && self.started.is_none()
    }
}

fn require(value: &str, field: &'static str) -> Result<(), DbError> {
    if value.trim().is_empty() {
        return Err(DbError::MissingField(field));
    }
    Ok(())
}

/// Insert a new student with an empty attendance history.
pub fn add_student(conn: &Connection, student: &NewStudent) -> Result<(), DbError> {
    require(&student.id, "id")?;
    require(&student.name, "name")?;
    require(&student.major, "major")?;
    require(&student.year, "year")?;
    require(&student.started, "started")?;

    let inserted = conn.execute(
        "INSERT INTO students (id, name, major, year, started) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![student.id, student.name, student.major, student.year, student.started],
    );

    match inserted {
        Ok(_) => {
            tracing::info!(student_id = %student.id, "student added");
            Ok(())
        }
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(DbError::DuplicateStudent(student.id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Apply the non-empty fields of `update`.
pub fn update_student(conn: &Connection, id: &str, update: &StudentUpdate) -> Result<(), DbError> {
    if update.is_empty() {
        return Err(DbError::EmptyUpdate);
    }
    for (value, field) in [
        (&update.name, "name"),
        (&update.major, "major"),
        (&update.year, "year"),
        (&update.started, "started"),
    ] {
        if let Some(v) = value {
            require(v, field)?;
        }
    }

    let changed = conn.execute(
        "UPDATE students SET
            name    = COALESCE(?2, name),
            major   = COALESCE(?3, major),
            year    = COALESCE(?4, year),
            started = COALESCE(?5, started)
         WHERE id = ?1",
        params![id, update.name, update.major, update.year, update.started],
    )?;

    if changed == 0 {
        return Err(DbError::StudentNotFound(id.to_string()));
    }
    tracing::info!(student_id = id, "student updated");
    Ok(())
}

/// Remove a student and their attendance history.
pub fn delete_student(conn: &Connection, id: &str) -> Result<(), DbError> {
    let removed = conn.execute("DELETE FROM students WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(DbError::StudentNotFound(id.to_string()));
    }
    tracing::info!(student_id = id, "student deleted");
    Ok(())
}

fn attendance_of(conn: &Connection, id: &str) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare_cached("SELECT recorded_at FROM attendance WHERE student_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![id], |row| row.get(0))?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn get_student(conn: &Connection, id: &str) -> Result<Option<StudentRecord>, DbError> {
    let found = conn
        .query_row(
            "SELECT id, name, major, year, started FROM students WHERE id = ?1",
            params![id],
            |row| {
                Ok(StudentRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    major: row.get(2)?,
                    year: row.get(3)?,
                    started: row.get(4)?,
                    attendance: Vec::new(),
                })
            },
        )
        .optional()?;

    match found {
        Some(mut student) => {
            student.attendance = attendance_of(conn, id)?;
            Ok(Some(student))
        }
        None => Ok(None),
    }
}

/// All students ordered by id, each with their attendance.
pub fn list_students(conn: &Connection) -> Result<Vec<StudentRecord>, DbError> {
    let mut stmt = conn.prepare("SELECT id, name, major, year, started FROM students ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(StudentRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            major: row.get(2)?,
            year: row.get(3)?,
            started: row.get(4)?,
            attendance: Vec::new(),
        })
    })?;

    let mut students = rows.collect::<Result<Vec<_>, _>>()?;
    for student in &mut students {
        student.attendance = attendance_of(conn, &student.id)?;
    }
    Ok(students)
}
