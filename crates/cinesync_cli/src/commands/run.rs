//! Run and once command implementations.

use crate::settings::Settings;
use cinesync_engine::{
    ElasticsearchWriter, PostgresSource, StopSignal, SyncError, SyncResult, SyncScheduler,
};
use cinesync_state::FileStateStore;
use std::sync::Arc;

type Scheduler = SyncScheduler<PostgresSource, ElasticsearchWriter, FileStateStore>;

fn scheduler(settings: &Settings) -> SyncResult<Scheduler> {
    let config = settings.sync_config()?;
    let source = settings.source()?;
    let writer = settings.writer()?;
    let store = settings.state_store()?;
    SyncScheduler::new(config, Arc::new(source), Arc::new(writer), Arc::new(store))
}

/// Raises `stop` on the first Ctrl-C.
fn stop_on_ctrl_c(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing current batch");
            stop.stop();
        }
    });
}

/// Runs the `run` command.
pub async fn run(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = scheduler(settings)?;
    stop_on_ctrl_c(scheduler.stop_signal());
    scheduler.run_forever().await?;
    Ok(())
}

/// Runs the `once` command.
pub async fn once(settings: &Settings, stream: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = scheduler(settings)?;
    if scheduler.coordinator(stream).is_none() {
        let known: Vec<&str> = scheduler
            .config()
            .streams
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        return Err(format!("unknown stream {:?}; known streams: {}", stream, known.join(", ")).into());
    }
    stop_on_ctrl_c(scheduler.stop_signal());

    let exhausted = scheduler.run_once(stream).await?;
    let stats = scheduler
        .coordinator(stream)
        .map(|c| c.stats())
        .ok_or_else(|| SyncError::UnknownStream(stream.to_string()))?;

    println!("Stream:            {}", stream);
    println!("Exhausted:         {}", exhausted);
    println!("Batches:           {}", stats.batches);
    println!("Rows read:         {}", stats.rows_read);
    println!("Documents written: {}", stats.documents_written);
    println!("Retries:           {}", stats.retries);
    if stats.unstamped_rows > 0 {
        println!("NULL timestamps:   {} (not synchronized)", stats.unstamped_rows);
    }
    match stats.last_cursor {
        Some(cursor) => println!("Cursor:            {}", cursor),
        None => println!("Cursor:            (unchanged)"),
    }
    Ok(())
}
