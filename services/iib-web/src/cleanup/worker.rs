//! Background retention sweeper (ambient addition): requests themselves are
//! never deleted (SPEC_FULL.md §3 "Lifecycle"), but logs, related-bundles
//! dumps, and idempotency records "may expire independently by age". Grounded
//! in the teacher's interval-loop cleanup worker shape (`tokio::time::interval`
//! plus a `watch::Receiver<bool>` shutdown signal); the per-concern deletions
//! are new, driven by `request_logs_days_to_live` / `request_data_days_to_live`
//! instead of the teacher's workload-log/IPv4-cooldown retention windows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct CleanupWorkerConfig {
    pub interval: Duration,
    pub request_logs_dir: Option<PathBuf>,
    pub request_logs_days_to_live: i64,
    pub request_related_bundles_dir: Option<PathBuf>,
    pub request_recursive_related_bundles_dir: Option<PathBuf>,
    pub request_data_days_to_live: i64,
    pub idempotency_retention_days: i64,
}

impl Default for CleanupWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            request_logs_dir: None,
            request_logs_days_to_live: 7,
            request_related_bundles_dir: None,
            request_recursive_related_bundles_dir: None,
            request_data_days_to_live: 7,
            idempotency_retention_days: 7,
        }
    }
}

pub struct CleanupWorker {
    pool: PgPool,
    config: CleanupWorkerConfig,
}

impl CleanupWorker {
    pub fn new(pool: PgPool, config: CleanupWorkerConfig) -> Self {
        Self { pool, config }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "starting retention sweeper"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_sweep().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("retention sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn run_sweep(&self) {
        if let Some(dir) = &self.config.request_logs_dir {
            let deleted = expire_files(dir, self.config.request_logs_days_to_live).await;
            if deleted > 0 {
                info!(deleted, dir = %dir.display(), "expired old request logs");
            }
        }

        for dir in [
            &self.config.request_related_bundles_dir,
            &self.config.request_recursive_related_bundles_dir,
        ]
        .into_iter()
        .flatten()
        {
            let deleted = expire_files(dir, self.config.request_data_days_to_live).await;
            if deleted > 0 {
                info!(deleted, dir = %dir.display(), "expired old related-bundles data");
            }
        }

        match self.cleanup_idempotency_records().await {
            Ok(count) if count > 0 => info!(deleted = count, "cleaned up expired idempotency records"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to clean up idempotency records"),
        }
    }

    async fn cleanup_idempotency_records(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM idempotency_key
            WHERE created_at < now() - make_interval(days => $1)
            "#,
        )
        .bind(self.config.idempotency_retention_days as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Delete every regular file directly under `dir` whose mtime is older than
/// `days_to_live`. Best-effort: unreadable entries are logged and skipped
/// rather than aborting the whole sweep.
async fn expire_files(dir: &Path, days_to_live: i64) -> u64 {
    let mut deleted = 0u64;
    let cutoff = Utc::now() - chrono::Duration::days(days_to_live);

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "failed to read retention directory");
            return 0;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to iterate retention directory entry");
                break;
            }
        };

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !metadata.is_file() {
            continue;
        }

        let modified = match metadata.modified() {
            Ok(m) => chrono::DateTime::<Utc>::from(m),
            Err(_) => continue,
        };

        if modified < cutoff {
            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                deleted += 1;
            }
        }
    }

    deleted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CleanupWorkerConfig::default();
        assert_eq!(config.request_logs_days_to_live, 7);
        assert_eq!(config.interval.as_secs(), 3600);
    }
}
