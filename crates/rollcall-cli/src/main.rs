use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{EncodingStore, OnnxFaceAnalyzer, Settings};
use rollcall_hw::Camera;
use rollcall_store::{db, history_rows, students, NewStudent, StudentUpdate};
use std::io::Write;
use std::path::PathBuf;

mod report;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face-recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the encoding store from a directory of student photos
    Encode {
        /// Directory of images named `<student id>.<ext>`
        #[arg(long)]
        images: PathBuf,
        /// Output file (default: the configured encodings path)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Manage student records
    Student {
        #[command(subcommand)]
        command: StudentCommand,
    },
    /// Show monthly attendance counts
    History {
        /// Only this student
        #[arg(long)]
        student: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run camera diagnostics
    Test {
        /// Frames to capture
        #[arg(long, default_value_t = 5)]
        frames: usize,
    },
}

#[derive(Subcommand)]
enum StudentCommand {
    /// Register a new student
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        major: String,
        #[arg(long)]
        year: String,
        /// Enrollment start (e.g. "2022")
        #[arg(long)]
        started: String,
    },
    /// Change fields of an existing student
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        started: Option<String>,
    },
    /// Remove a student and their attendance
    Delete { id: String },
    /// List all students
    List {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;
    tracing::debug!(?settings, "settings loaded");
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Encode { images, out } => {
            let out = out.unwrap_or_else(|| settings.encodings_path.clone());
            let mut analyzer = OnnxFaceAnalyzer::load(&settings.model_dir)
                .with_context(|| format!("failed to load face models from {}", settings.model_dir.display()))?;

            let (store, build) = EncodingStore::build_from_dir(&images, &mut analyzer)
                .with_context(|| format!("failed to encode {}", images.display()))?;
            report::build(&mut stdout, &build)?;

            if store.is_empty() {
                bail!("no faces encoded from {}; nothing written", images.display());
            }
            store.save(&out).with_context(|| format!("failed to write {}", out.display()))?;
            writeln!(stdout, "Wrote {} encoding(s) to {}", store.len(), out.display())?;
        }
        Commands::Student { command } => {
            let conn = db::open(&settings.db_path)
                .with_context(|| format!("failed to open database {}", settings.db_path.display()))?;
            run_student(&conn, command, &mut stdout)?;
        }
        Commands::History { student, json } => {
            let conn = db::open(&settings.db_path)
                .with_context(|| format!("failed to open database {}", settings.db_path.display()))?;
            run_history(&conn, student.as_deref(), json, &mut stdout)?;
        }
        Commands::Test { frames } => run_camera_test(&settings, frames, &mut stdout)?,
    }

    Ok(())
}

fn run_student<W: Write>(conn: &rusqlite::Connection, command: StudentCommand, out: &mut W) -> Result<()> {
    match command {
        StudentCommand::Add {
            id,
            name,
            major,
            year,
            started,
        } => {
            students::add_student(
                conn,
                &NewStudent {
                    id: id.clone(),
                    name,
                    major,
                    year,
                    started,
                },
            )?;
            writeln!(out, "Student {id} added.")?;
        }
        StudentCommand::Update {
            id,
            name,
            major,
            year,
            started,
        } => {
            let update = StudentUpdate {
                name,
                major,
                year,
                started,
            };
            students::update_student(conn, &id, &update)?;
            writeln!(out, "Student {id} updated.")?;
        }
        StudentCommand::Delete { id } => {
            students::delete_student(conn, &id)?;
            writeln!(out, "Student {id} deleted.")?;
        }
        StudentCommand::List { json } => {
            let all = students::list_students(conn)?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&all)?)?;
            } else {
                report::students(out, &all)?;
            }
        }
    }
    Ok(())
}

fn run_history<W: Write>(conn: &rusqlite::Connection, student: Option<&str>, json: bool, out: &mut W) -> Result<()> {
    let selected = match student {
        Some(id) => match students::get_student(conn, id)? {
            Some(s) => vec![s],
            None => bail!("student {id} not found"),
        },
        None => students::list_students(conn)?,
    };

    let rows = history_rows(&selected);
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else {
        report::history(out, &rows)?;
    }
    Ok(())
}

fn run_camera_test<W: Write>(settings: &Settings, frames: usize, out: &mut W) -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        writeln!(out, "No V4L2 capture devices found.")?;
    }
    for d in &devices {
        writeln!(out, "{}  {} ({}, {})", d.path, d.name, d.driver, d.bus)?;
    }

    let camera = Camera::open(&settings.camera_device, settings.frame_width, settings.frame_height)
        .with_context(|| format!("failed to open {}", settings.camera_device))?;
    writeln!(
        out,
        "Opened {}: {}x{} {:?}",
        camera.device_path,
        camera.width,
        camera.height,
        camera.pixel_format()
    )?;

    let mut stream = camera.stream()?;
    stream.discard(settings.warmup_frames);

    for i in 0..frames {
        match stream.next_frame() {
            Ok(frame) => writeln!(
                out,
                "frame {i}: seq {} {} bytes, brightness {:.1}",
                frame.sequence,
                frame.data.len(),
                frame.avg_brightness()
            )?,
            Err(e) => writeln!(out, "frame {i}: {e}")?,
        }
    }
    Ok(())
}
