//! Background tasks for the relay server.
//!
//! Includes:
//! - Sweeping stale synthesized replies and orphaned uploads.

use std::path::PathBuf;
use tokio::time::{sleep, Duration};
use voxrelay_voice::sweep_stale_files;

/// Starts the stale-file sweep task.
///
/// Runs indefinitely, removing files older than `max_age` from each of
/// `dirs` every `interval`. Independent of request handling: a reply file
/// lives until the sweep finds it too old, whether or not it was fetched.
pub async fn start_sweep_task(dirs: Vec<PathBuf>, max_age: Duration, interval: Duration) {
    if interval.is_zero() {
        tracing::warn!("sweep task disabled (interval=0)");
        return;
    }

    tracing::info!(
        dirs = dirs.len(),
        max_age_secs = max_age.as_secs(),
        interval_secs = interval.as_secs(),
        "starting stale file sweep task"
    );

    loop {
        sleep(interval).await;

        for dir in &dirs {
            match sweep_stale_files(dir, max_age).await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::info!(dir = %dir.display(), removed, "swept stale files");
                }
                Err(e) => {
                    tracing::error!(dir = %dir.display(), "failed to sweep stale files: {}", e);
                }
            }
        }
    }
}
