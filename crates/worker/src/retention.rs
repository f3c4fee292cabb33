//! Periodic cleanup of old export artifacts.
//!
//! Only runs when a maximum export age is configured; otherwise exports are
//! kept until removed by hand.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use v2t_core::retention::ExportRetention;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the export retention loop until `cancel` is triggered.
pub async fn run(exports_dir: PathBuf, policy: ExportRetention, interval: Duration, cancel: CancellationToken) {
    let ExportRetention::MaxAge(max_age) = policy else {
        tracing::info!("Export retention disabled, exports are kept");
        return;
    };

    tracing::info!(
        max_age_hours = max_age.as_secs() / 3600,
        interval_secs = interval.as_secs(),
        dir = %exports_dir.display(),
        "Export retention job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Export retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweep(&exports_dir, policy, SystemTime::now()).await {
                    Ok(0) => tracing::debug!("Export retention: nothing to purge"),
                    Ok(deleted) => tracing::info!(deleted, "Export retention: purged old exports"),
                    Err(e) => tracing::error!(error = %e, "Export retention: sweep failed"),
                }
            }
        }
    }
}

/// Delete regular files in `dir` that `policy` considers expired at `now`.
///
/// A missing directory counts as empty. Returns the number of files removed.
pub async fn sweep(dir: &Path, policy: ExportRetention, now: SystemTime) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut deleted = 0;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        if policy.is_expired(meta.modified()?, now) {
            tokio::fs::remove_file(entry.path()).await?;
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_removes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.json"), b"{}").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"x").await.unwrap();
        tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();

        let policy = ExportRetention::from_hours(Some(1));
        let now = SystemTime::now();
        assert_eq!(sweep(dir.path(), policy, now).await.unwrap(), 0);

        let later = now + Duration::from_secs(2 * 3600);
        assert_eq!(sweep(dir.path(), policy, later).await.unwrap(), 2);
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn keep_forever_never_deletes() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.pdf"), b"%PDF").await.unwrap();
        let far = SystemTime::now() + Duration::from_secs(10 * 365 * 24 * 3600);
        assert_eq!(sweep(dir.path(), ExportRetention::KeepForever, far).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("exports");
        assert_eq!(sweep(&gone, ExportRetention::from_hours(Some(1)), SystemTime::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_policy_returns_immediately() {
        run(PathBuf::from("unused"), ExportRetention::KeepForever, SWEEP_INTERVAL, CancellationToken::new()).await;
    }
}
