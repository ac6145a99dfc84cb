//! Balance notification poller

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::notifier::ChatNotifier;
use crate::error::Result;
use crate::models::{actions, format_amount, LogLevel, Notification};
use crate::store::{CheckRecord, Repository};

/// Counts of one check cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    /// Rows compared against their threshold
    pub evaluated: usize,
    /// Rows whose check time has not come yet
    pub not_due: usize,
    /// Alerts delivered
    pub alerted: usize,
    /// Rows that failed (send or store error)
    pub failed: usize,
    /// Rows without a usable balance
    pub skipped: usize,
}

enum Outcome {
    NotDue,
    Skipped,
    Checked(CheckRecord),
}

/// Periodically compares balances with notification thresholds
pub struct NotificationChecker {
    repo: Arc<Repository>,
    notifier: Arc<dyn ChatNotifier>,
    interval: Duration,
    /// Serializes scheduled and manually triggered cycles
    cycle: Mutex<()>,
}

impl NotificationChecker {
    /// Create a checker
    pub fn new(repo: Arc<Repository>, notifier: Arc<dyn ChatNotifier>, interval: Duration) -> Self {
        Self {
            repo,
            notifier,
            interval,
            cycle: Mutex::new(()),
        }
    }

    /// Run check cycles until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval = %humantime::format_duration(self.interval),
            "Starting notification checker"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.check_all().await {
                Ok(summary) if summary.alerted > 0 || summary.failed > 0 => {
                    info!(?summary, "Notification check finished");
                }
                Ok(summary) => debug!(?summary, "Notification check finished"),
                Err(e) => {
                    counter!("billrelay_check_cycle_errors_total").increment(1);
                    error!(error = %e, "Notification check failed");
                }
            }
        }

        info!("Notification checker stopped");
    }

    /// Run one cycle now
    pub async fn check_all(&self) -> Result<CheckSummary> {
        self.check_all_at(Utc::now()).await
    }

    /// Run one cycle as if the current time were `now`.
    ///
    /// Rows are evaluated and alerts sent first; the results are then
    /// written back in one batch.
    pub async fn check_all_at(&self, now: DateTime<Utc>) -> Result<CheckSummary> {
        let _cycle = self.cycle.lock().await;
        counter!("billrelay_check_cycles_total").increment(1);

        let notifications = self.repo.active_notifications().await?;
        debug!(count = notifications.len(), "Checking notifications");

        let mut summary = CheckSummary::default();
        let mut checks = Vec::new();
        for notification in notifications {
            let (id, chat_id) = (notification.id, notification.chat_id);
            match self.check_one(notification, now).await {
                Ok(Outcome::NotDue) => summary.not_due += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Ok(Outcome::Checked(check)) => {
                    summary.evaluated += 1;
                    if check.alerted {
                        summary.alerted += 1;
                    }
                    checks.push(check);
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(id, chat_id, error = %e, "Error checking notification");
                }
            }
        }

        let checked_at = now.with_timezone(&self.repo.timezone()).naive_local();
        self.repo.record_checks(&checks, checked_at).await?;

        for check in checks.iter().filter(|check| check.alerted) {
            let notification = &check.notification;
            let log = format!(
                "Alert sent to chat {}: balance {} <= threshold {}",
                notification.chat_id,
                format_amount(check.balance),
                format_amount(notification.threshold)
            );
            if let Err(e) = self.repo.add_log(LogLevel::Info, actions::NOTIFICATION_SENT, log).await {
                warn!(error = %e, "Failed to write audit log");
            }
        }

        Ok(summary)
    }

    async fn check_one(&self, notification: Notification, now: DateTime<Utc>) -> Result<Outcome> {
        let offset = self.user_offset(&notification).await?;

        if !is_due(&notification, now, offset, self.repo.timezone()) {
            return Ok(Outcome::NotDue);
        }

        let Some(balance) = self.repo.account_balance(&notification.account_login).await? else {
            warn!(account = %notification.account_login, "No balance for account");
            return Ok(Outcome::Skipped);
        };
        let Some(value) = balance.balance_value() else {
            warn!(account = %notification.account_login, balance = %balance.balance, "Unparsable balance");
            return Ok(Outcome::Skipped);
        };

        let alerted = notification.crossed(value);
        if alerted {
            let text = alert_message(value, notification.threshold);
            if let Err(e) = self.notifier.notify(notification.chat_id, &text).await {
                counter!("billrelay_alert_failures_total").increment(1);
                return Err(e);
            }
            counter!("billrelay_alerts_sent_total").increment(1);

            info!(
                id = notification.id,
                chat_id = notification.chat_id,
                balance = value,
                threshold = notification.threshold,
                "Balance alert sent"
            );
        }

        Ok(Outcome::Checked(CheckRecord {
            notification,
            balance: value,
            alerted,
        }))
    }

    async fn user_offset(&self, notification: &Notification) -> Result<FixedOffset> {
        let login = self
            .repo
            .get_user(notification.chat_id)
            .await?
            .map_or_else(|| notification.account_login.clone(), |user| user.user_login);
        let hours = self.repo.user_utc_offset(&login).await?;
        Ok(FixedOffset::east_opt(hours * 3600).unwrap_or(self.repo.timezone()))
    }
}

/// Whether a notification has to be checked at `now`.
///
/// Rows without a check time are always due. Otherwise the row is due once
/// per local day: from its check time on, until a check at or after that
/// instant has been recorded.
pub fn is_due(
    notification: &Notification,
    now: DateTime<Utc>,
    user_offset: FixedOffset,
    store_tz: FixedOffset,
) -> bool {
    let Some(check_time) = notification.check_time else {
        return true;
    };

    let local = now.with_timezone(&user_offset);
    if local.time() < check_time.time() {
        return false;
    }

    let Some(due_at) = user_offset
        .from_local_datetime(&local.date_naive().and_time(check_time.time()))
        .single()
    else {
        return true;
    };

    notification
        .last_checked
        .and_then(|checked| to_utc(checked, store_tz))
        .map_or(true, |checked| checked < due_at.with_timezone(&Utc))
}

fn to_utc(value: NaiveDateTime, tz: FixedOffset) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&value)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Text of a low balance alert
pub fn alert_message(balance: f64, threshold: f64) -> String {
    format!(
        "⚠️ Low balance\n\n\
         Your account balance has dropped below the threshold you set.\n\n\
         Current balance: {}\n\
         Threshold: {}\n\n\
         Please top up your balance.",
        format_amount(balance),
        format_amount(threshold)
    )
}
