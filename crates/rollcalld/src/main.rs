use anyhow::{Context, Result};
use rollcall_core::{EncodingStore, Settings};
use rollcall_store::{db, Ledger};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

mod engine;
mod tick;

use engine::{spawn_engine, EngineConfig, EngineError};
use tick::{FailureStreak, TickStatus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let settings = Settings::load().context("failed to load settings")?;

    let store = EncodingStore::load(&settings.encodings_path).with_context(|| {
        format!(
            "failed to load encodings from {} (run `rollcall encode` first)",
            settings.encodings_path.display()
        )
    })?;
    tracing::info!(students = store.len(), "encoding store ready");

    if let Some(parent) = settings.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = tokio_rusqlite::Connection::open(&settings.db_path)
        .await
        .with_context(|| format!("failed to open database {}", settings.db_path.display()))?;
    db.call(|conn| {
        let prepared = db::enable_wal(conn).and_then(|_| db::prepare(conn));
        prepared.map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
    })
    .await
    .context("failed to prepare database")?;
    tracing::info!(path = %settings.db_path.display(), "database ready");

    let engine = spawn_engine(EngineConfig::from(&settings), store).context("failed to start engine")?;

    let ledger = Ledger::new(settings.cooldown());
    let mut frame_failures = FailureStreak::new("frame read", settings.frame_failure_warn_after);
    let mut recognize_failures = FailureStreak::new("recognition", settings.frame_failure_warn_after);
    let mut last_status: Option<TickStatus> = None;

    let mut ticker = tokio::time::interval(settings.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(
        interval_ms = settings.tick_interval_ms,
        cooldown_s = ledger.cooldown().as_secs(),
        "rollcalld ready"
    );

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res.context("failed to listen for ctrl-c")?;
                break;
            }
            _ = ticker.tick() => {}
        }

        let frame = match engine.recognize().await {
            Ok(frame) => frame,
            Err(EngineError::FrameRead(e)) => {
                frame_failures.failure(&e);
                continue;
            }
            Err(EngineError::ChannelClosed) => anyhow::bail!("engine thread exited"),
            Err(e) => {
                frame_failures.success();
                recognize_failures.failure(&e);
                continue;
            }
        };

        frame_failures.success();
        recognize_failures.success();

        let outcomes = tick::process_faces(&db, ledger, &frame.faces).await;
        let status = TickStatus::from_outcomes(&outcomes);
        if last_status.as_ref() != Some(&status) {
            tracing::info!(sequence = frame.sequence, faces = frame.faces.len(), "{status}");
            last_status = Some(status);
        }
    }

    tracing::info!("rollcalld shutting down");
    Ok(())
}
