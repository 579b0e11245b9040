use crate::error::VoiceError;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Deletes regular files in `dir` whose modification time is older than
/// `max_age`, returning how many were removed.
///
/// A missing directory counts as empty. Files that vanish or cannot be
/// removed mid-sweep are logged and skipped.
pub async fn sweep_stale_files(dir: &Path, max_age: Duration) -> Result<usize, VoiceError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(VoiceError::Io(e)),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "failed to remove stale file");
            }
        }
    }

    Ok(removed)
}
