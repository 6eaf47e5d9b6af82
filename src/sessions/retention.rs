//! Time-based cleanup of stale transcript files.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;

/// Default retention before a transcript is swept.
pub const DEFAULT_RETENTION_DAYS: u32 = 180;

/// Delete regular files in `dir` last modified before `max_age` ago.
///
/// Files that cannot be inspected or removed are skipped. A missing
/// directory sweeps nothing. Returns the number of files removed.
pub async fn sweep_older_than(dir: &Path, max_age: Duration) -> Result<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", dir.display()));
        }
    };

    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::debug!(
                path = %entry.path().display(),
                error = %e,
                "skipping file during retention sweep"
            ),
        }
    }

    if removed > 0 {
        tracing::info!(dir = %dir.display(), removed, "retention sweep removed stale files");
    }
    Ok(removed)
}

/// Days → `Duration`.
pub fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_sweeps_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let removed = sweep_older_than(&tmp.path().join("absent"), days(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn fresh_files_survive() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("chat_historyabc.txt"), "x").unwrap();

        let removed = sweep_older_than(tmp.path(), days(DEFAULT_RETENTION_DAYS))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(tmp.path().join("chat_historyabc.txt").exists());
    }

    #[tokio::test]
    async fn zero_age_removes_files_but_not_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("b.txt"), "y").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let removed = sweep_older_than(tmp.path(), Duration::ZERO).await.unwrap();
        assert_eq!(removed, 2);
        assert!(tmp.path().join("sub").exists());
    }

    #[test]
    fn days_converts_to_seconds() {
        assert_eq!(days(2), Duration::from_secs(172_800));
    }
}
