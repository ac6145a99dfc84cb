//! Daily maintenance jobs

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::MaintenanceConfig;
use crate::models::{actions, CheckTime, LogLevel};
use crate::store::Repository;

/// A job run once a day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyJob {
    /// Flush the repository cache
    ClearCache,
    /// Remove old audit log rows
    CleanupLogs {
        /// Age limit of kept rows
        retention_days: u32,
    },
}

impl DailyJob {
    fn name(self) -> &'static str {
        match self {
            Self::ClearCache => "cache_clear",
            Self::CleanupLogs { .. } => "log_cleanup",
        }
    }
}

/// Next instant strictly after `now` at which the local time in `tz` is `at`
pub fn next_run_after(now: DateTime<Utc>, at: CheckTime, tz: FixedOffset) -> DateTime<Utc> {
    let local_date = now.with_timezone(&tz).date_naive();
    let mut candidate = local_date.and_time(at.time());
    loop {
        if let Some(run) = tz.from_local_datetime(&candidate).single() {
            let run = run.with_timezone(&Utc);
            if run > now {
                return run;
            }
        }
        candidate += Duration::days(1);
    }
}

/// Run a single job now
pub async fn run_job(repo: &Repository, job: DailyJob) {
    match job {
        DailyJob::ClearCache => {
            repo.clear_cache();
            if let Err(e) = repo
                .add_log(LogLevel::Info, actions::CACHE_CLEAR, "Scheduled cache flush")
                .await
            {
                error!(error = %e, "Failed to write audit log");
            }
        }
        DailyJob::CleanupLogs { retention_days } => match repo.cleanup_logs(retention_days).await {
            Ok(removed) => {
                let message = format!("Removed {removed} rows older than {retention_days} days");
                if let Err(e) = repo.add_log(LogLevel::Info, actions::LOG_CLEANUP, message).await {
                    error!(error = %e, "Failed to write audit log");
                }
            }
            Err(e) => error!(error = %e, "Log cleanup failed"),
        },
    }
}

/// Run `job` every day at `at` (store timezone) until cancelled
pub async fn run_daily(repo: Arc<Repository>, job: DailyJob, at: CheckTime, cancel: CancellationToken) {
    let tz = repo.timezone();
    loop {
        let now = Utc::now();
        let next = next_run_after(now, at, tz);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(job = job.name(), next_run = %next.with_timezone(&tz), "Scheduled daily job");

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }

        info!(job = job.name(), "Running daily job");
        run_job(&repo, job).await;
    }
}

/// Spawn every configured daily job
pub fn spawn_all(
    repo: &Arc<Repository>,
    config: &MaintenanceConfig,
    cancel: &CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let jobs = [
        (DailyJob::ClearCache, config.cache_clear_at),
        (
            DailyJob::CleanupLogs {
                retention_days: config.log_retention_days,
            },
            config.log_cleanup_at,
        ),
    ];

    jobs.into_iter()
        .map(|(job, at)| tokio::spawn(run_daily(Arc::clone(repo), job, at, cancel.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::layout::{self, SHEET_LOGS};
    use crate::store::MemoryStore;

    fn create_test_repository(store: &Arc<MemoryStore>) -> Repository {
        Repository::new(
            Arc::clone(store) as Arc<dyn crate::store::RowStore>,
            msk(),
            3,
            std::time::Duration::from_secs(3600),
        )
    }

    fn logged_actions(store: &MemoryStore) -> Vec<String> {
        store
            .snapshot(SHEET_LOGS)
            .into_iter()
            .skip(1)
            .map(|cells| layout::cell(&cells, layout::logs::ACTION).to_string())
            .collect()
    }

    fn msk() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        // 23:00 UTC on Feb 28 is 02:00 on Mar 1 in UTC+3
        let now = Utc.with_ymd_and_hms(2026, 2, 28, 23, 0, 0).unwrap();
        let next = next_run_after(now, CheckTime::new(3, 5).unwrap(), msk());
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn test_next_run_tomorrow_when_passed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 5, 0).unwrap();
        let next = next_run_after(now, CheckTime::new(3, 5).unwrap(), msk());
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 0, 5, 0).unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_job_logs_its_run() {
        let store = Arc::new(MemoryStore::with_default_sheets());
        store.insert_rows(
            SHEET_LOGS,
            vec![
                vec!["2000-01-01".into(), "10:00:00".into(), "INFO".into(), "OLD".into()],
                vec!["2000-01-02".into(), "10:00:00".into(), "INFO".into(), "OLD".into()],
            ],
        );
        let repo = create_test_repository(&store);

        run_job(&repo, DailyJob::CleanupLogs { retention_days: 30 }).await;

        assert_eq!(logged_actions(&store), vec![actions::LOG_CLEANUP.to_string()]);
        let rows = store.snapshot(SHEET_LOGS);
        assert!(layout::cell(&rows[1], layout::logs::MESSAGE).starts_with("Removed 2 rows"));
    }

    #[tokio::test]
    async fn test_cache_job_logs_its_run() {
        let store = Arc::new(MemoryStore::with_default_sheets());
        let repo = create_test_repository(&store);

        run_job(&repo, DailyJob::ClearCache).await;

        assert_eq!(logged_actions(&store), vec![actions::CACHE_CLEAR.to_string()]);
    }
}
