//! Plain-text tables for the student list and the attendance history.

use rollcall_core::encoding_store::BuildReport;
use rollcall_store::{HistoryRow, StudentRecord};
use std::io::{self, Write};

fn row<W: Write>(out: &mut W, cells: &[&str], widths: &[usize]) -> io::Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(out, "{}", line.trim_end())
}

/// Print `rows` under `header`, each column as wide as its widest cell.
fn table<W: Write>(out: &mut W, header: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for r in rows {
        for (w, cell) in widths.iter_mut().zip(r) {
            *w = (*w).max(cell.chars().count());
        }
    }

    row(out, header, &widths)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    row(out, &rule.iter().map(String::as_str).collect::<Vec<_>>(), &widths)?;
    for r in rows {
        row(out, &r.iter().map(String::as_str).collect::<Vec<_>>(), &widths)?;
    }
    Ok(())
}

pub fn students<W: Write>(out: &mut W, students: &[StudentRecord]) -> io::Result<()> {
    if students.is_empty() {
        return writeln!(out, "No students registered.");
    }
    let rows: Vec<Vec<String>> = students
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.name.clone(),
                s.major.clone(),
                s.year.clone(),
                s.started.clone(),
                s.attendance.len().to_string(),
            ]
        })
        .collect();
    table(out, &["ID", "NAME", "MAJOR", "YEAR", "STARTED", "ATTENDANCE"], &rows)
}

pub fn history<W: Write>(out: &mut W, rows: &[HistoryRow]) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(out, "No attendance recorded.");
    }
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.student_id.clone(),
                r.name.clone(),
                r.major.clone(),
                r.year.clone(),
                r.month.clone(),
                r.count.to_string(),
            ]
        })
        .collect();
    table(out, &["ID", "NAME", "MAJOR", "YEAR", "MONTH", "COUNT"], &rows)
}

pub fn build<W: Write>(out: &mut W, report: &BuildReport) -> io::Result<()> {
    writeln!(out, "Encoded {} student(s).", report.encoded.len())?;
    for skipped in &report.skipped {
        writeln!(out, "  skipped {}: {}", skipped.path.display(), skipped.reason)?;
    }
    Ok(())
}
