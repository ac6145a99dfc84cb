//! Typed access to the sheets used by the bot

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::cache::TtlCache;
use super::layout::{
    self, chats, notifications as notif_col, SHEET_BALANCES, SHEET_CHATS, SHEET_DIRECTORY,
    SHEET_LOGS, SHEET_NOTIFICATIONS,
};
use super::{CellUpdate, RowStore};
use crate::error::Result;
use crate::models::{
    admin_cell, format_amount, send_status_cell, AccountBalance, AuthStatus, CheckTime, DirectoryEntry,
    LogEntry, LogLevel, Notification, NotificationStatus, User,
};

/// Result of evaluating one notification, written back by
/// [`Repository::record_checks`]
#[derive(Debug, Clone)]
pub struct CheckRecord {
    /// The row as it was read when the cycle started
    pub notification: Notification,
    /// Balance the row was compared with
    pub balance: f64,
    /// An alert was delivered for this row
    pub alerted: bool,
}

impl CheckRecord {
    /// Whether writing this result changes the row. Rows without a check
    /// time are evaluated every cycle and only rewritten when the balance
    /// moved or an alert went out.
    fn changes_row(&self) -> bool {
        let notification = &self.notification;
        self.alerted
            || notification.check_time.is_some()
            || notification.last_balance.map(format_amount) != Some(format_amount(self.balance))
    }
}

#[derive(Debug, Clone)]
struct CachedUser {
    row: usize,
    user: User,
}

/// Repository over the spreadsheet.
///
/// Directory entries, balances and users are cached for the configured TTL;
/// notifications are always read fresh. Read-modify-write sequences are
/// serialized through a single lock.
pub struct Repository {
    store: Arc<dyn RowStore>,
    timezone: FixedOffset,
    default_utc_offset: i32,
    directory: TtlCache<(), Arc<HashMap<String, DirectoryEntry>>>,
    balances: TtlCache<(), Arc<HashMap<String, AccountBalance>>>,
    users: TtlCache<i64, CachedUser>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("backend", &self.store.backend_name())
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Create a repository.
    ///
    /// `timezone` is the zone of timestamps written to the sheet and
    /// `default_utc_offset` the user offset assumed when the directory has none.
    pub fn new(
        store: Arc<dyn RowStore>,
        timezone: FixedOffset,
        default_utc_offset: i32,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            timezone,
            default_utc_offset,
            directory: TtlCache::new(cache_ttl),
            balances: TtlCache::new(cache_ttl),
            users: TtlCache::new(cache_ttl),
            write_lock: Mutex::new(()),
        }
    }

    /// Underlying row store
    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    /// Timezone of stored timestamps
    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// Current time in the store timezone
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }

    /// Check that the store answers
    pub async fn ping(&self) -> Result<()> {
        self.store.read_all(SHEET_CHATS).await.map(|_| ())
    }

    /// Drop every cached lookup
    pub fn clear_cache(&self) {
        self.directory.clear();
        self.balances.clear();
        self.users.clear();
        info!("Repository cache cleared");
    }

    // ------------------------------------------------------------------
    // Directory
    // ------------------------------------------------------------------

    async fn directory_index(&self) -> Result<Arc<HashMap<String, DirectoryEntry>>> {
        if let Some(index) = self.directory.get(&()) {
            return Ok(index);
        }

        let rows = self.store.read_all(SHEET_DIRECTORY).await?;
        let mut index = HashMap::new();
        for entry in rows.iter().skip(1).filter_map(|row| DirectoryEntry::from_row(row)) {
            index.entry(entry.user_login.to_lowercase()).or_insert(entry);
        }
        debug!(entries = index.len(), "Loaded directory");

        let index = Arc::new(index);
        self.directory.insert((), Arc::clone(&index));
        Ok(index)
    }

    /// Directory entry of a provider login (case-insensitive)
    pub async fn find_directory_entry(&self, login: &str) -> Result<Option<DirectoryEntry>> {
        let index = self.directory_index().await?;
        Ok(index.get(&login.trim().to_lowercase()).cloned())
    }

    /// UTC offset of a login, falling back to the default offset
    pub async fn user_utc_offset(&self, login: &str) -> Result<i32> {
        Ok(self
            .find_directory_entry(login)
            .await?
            .and_then(|entry| entry.utc_offset_hours)
            .unwrap_or(self.default_utc_offset))
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn find_user_row(&self, chat_id: i64) -> Result<Option<CachedUser>> {
        if let Some(cached) = self.users.get(&chat_id) {
            return Ok(Some(cached));
        }

        let rows = self.store.read_all(SHEET_CHATS).await?;
        let found = rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(row, cells)| User::from_row(cells).map(|user| CachedUser { row, user }))
            .find(|cached| cached.user.chat_id == chat_id);

        if let Some(cached) = &found {
            self.users.insert(chat_id, cached.clone());
        }
        Ok(found)
    }

    /// Registered user of a chat
    pub async fn get_user(&self, chat_id: i64) -> Result<Option<User>> {
        Ok(self.find_user_row(chat_id).await?.map(|cached| cached.user))
    }

    /// Insert or overwrite the row of `user.chat_id`
    #[instrument(skip(self, user), fields(chat_id = user.chat_id))]
    pub async fn register_user(&self, user: User) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.users.invalidate(&user.chat_id);

        let row = match self.find_user_row(user.chat_id).await? {
            Some(existing) => {
                self.store
                    .update_cells(
                        SHEET_CHATS,
                        vec![CellUpdate::whole_row(existing.row, user.to_row())],
                    )
                    .await?;
                existing.row
            }
            None => {
                self.store.append_row(SHEET_CHATS, user.to_row()).await?;
                let rows = self.store.read_all(SHEET_CHATS).await?;
                rows.iter()
                    .rposition(|cells| layout::cell(cells, chats::CHAT_ID) == user.chat_id.to_string())
                    .unwrap_or(rows.len().saturating_sub(1))
            }
        };

        info!(row, "User registered");
        self.users.insert(user.chat_id, CachedUser { row, user });
        Ok(())
    }

    /// Record user activity
    pub async fn touch_activity(&self, chat_id: i64) -> Result<()> {
        let Some(mut cached) = self.find_user_row(chat_id).await? else {
            return Ok(());
        };
        let now = self.now();
        self.store
            .update_cells(
                SHEET_CHATS,
                vec![CellUpdate::single(
                    cached.row,
                    chats::LAST_ACTIVITY,
                    layout::format_timestamp(&now),
                )],
            )
            .await?;
        cached.user.last_activity = Some(now);
        self.users.insert(chat_id, cached);
        Ok(())
    }

    /// Re-read the admin flag of `login` from the directory and store the
    /// result on the chat row. Returns whether the login is still an admin.
    #[instrument(skip(self))]
    pub async fn recheck_admin(&self, chat_id: i64, login: &str) -> Result<bool> {
        self.directory.clear();
        let is_admin = self
            .find_directory_entry(login)
            .await?
            .is_some_and(|entry| entry.is_admin);

        let Some(mut cached) = self.find_user_row(chat_id).await? else {
            return Ok(is_admin);
        };

        cached.user.mark_checked(self.now(), is_admin);
        let user = &cached.user;
        self.store
            .update_cells(
                SHEET_CHATS,
                vec![
                    CellUpdate::single(cached.row, chats::IS_ADMIN, admin_cell(is_admin)),
                    CellUpdate {
                        row: cached.row,
                        column: chats::LAST_CHECK,
                        values: vec![
                            layout::format_optional_timestamp(user.last_check.as_ref()),
                            layout::format_optional_timestamp(user.next_check.as_ref()),
                        ],
                    },
                ],
            )
            .await?;

        debug!(is_admin, "Admin flag rechecked");
        self.users.insert(chat_id, cached);
        Ok(is_admin)
    }

    /// Log a chat out: clear the token, set the logged-out status and delete
    /// every active notification of the chat. Returns the number of
    /// notifications deleted.
    #[instrument(skip(self))]
    pub async fn logout(&self, chat_id: i64) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        if let Some(mut cached) = self.find_user_row(chat_id).await? {
            self.store
                .update_cells(
                    SHEET_CHATS,
                    vec![CellUpdate {
                        row: cached.row,
                        column: chats::TOKEN,
                        values: vec![String::new(), AuthStatus::LoggedOut.as_cell().to_string()],
                    }],
                )
                .await?;
            cached.user.token = None;
            cached.user.auth_status = AuthStatus::LoggedOut;
            self.users.insert(chat_id, cached);
        }

        let updates: Vec<CellUpdate> = self
            .read_notifications()
            .await?
            .into_iter()
            .filter(|n| n.chat_id == chat_id && n.is_active())
            .map(|n| CellUpdate::single(n.row, notif_col::STATUS, NotificationStatus::Deleted.as_cell()))
            .collect();
        let deleted = updates.len();
        self.store.update_cells(SHEET_NOTIFICATIONS, updates).await?;

        info!(deleted, "User logged out");
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------

    /// Latest exported balance of a billing account
    pub async fn account_balance(&self, account: &str) -> Result<Option<AccountBalance>> {
        let index = match self.balances.get(&()) {
            Some(index) => index,
            None => {
                let rows = self.store.read_all(SHEET_BALANCES).await?;
                let mut index = HashMap::new();
                for balance in rows.iter().skip(1).filter_map(|row| AccountBalance::from_row(row)) {
                    index.entry(balance.account_login.clone()).or_insert(balance);
                }
                debug!(accounts = index.len(), "Loaded balances");
                let index = Arc::new(index);
                self.balances.insert((), Arc::clone(&index));
                index
            }
        };
        Ok(index.get(account.trim()).cloned())
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    async fn read_notifications(&self) -> Result<Vec<Notification>> {
        let rows = self.store.read_all(SHEET_NOTIFICATIONS).await?;
        Ok(rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(row, cells)| Notification::from_row(row, cells))
            .collect())
    }

    /// Set the threshold of a chat's notification for `account`.
    ///
    /// An active row for the pair is updated and re-armed; otherwise a new
    /// row is appended.
    #[instrument(skip(self))]
    pub async fn upsert_notification(
        &self,
        chat_id: i64,
        account: &str,
        threshold: f64,
        check_time: Option<CheckTime>,
    ) -> Result<Notification> {
        let _guard = self.write_lock.lock().await;

        let auth_status = self
            .get_user(chat_id)
            .await?
            .map_or(AuthStatus::Passed, |user| user.auth_status);
        let existing = self.read_notifications().await?;

        if let Some(mut notification) = existing
            .iter()
            .find(|n| n.chat_id == chat_id && n.account_login == account && n.is_active())
            .cloned()
        {
            notification.threshold = threshold;
            notification.check_time = check_time;
            notification.sent = false;
            notification.auth_status = auth_status.as_cell().to_string();
            self.store
                .update_cells(
                    SHEET_NOTIFICATIONS,
                    vec![CellUpdate::whole_row(notification.row, notification.to_row())],
                )
                .await?;
            info!(id = notification.id, "Notification updated");
            return Ok(notification);
        }

        let id = existing.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        let mut notification = Notification {
            row: 0,
            id,
            chat_id,
            account_login: account.to_string(),
            auth_status: auth_status.as_cell().to_string(),
            status: NotificationStatus::Active,
            threshold,
            check_time,
            last_balance: None,
            sent: false,
            last_checked: None,
        };
        self.store
            .append_row(SHEET_NOTIFICATIONS, notification.to_row())
            .await?;
        notification.row = self
            .read_notifications()
            .await?
            .into_iter()
            .find(|n| n.id == id)
            .map_or(0, |n| n.row);

        info!(id, "Notification created");
        Ok(notification)
    }

    /// Active notifications of a chat
    pub async fn user_notifications(&self, chat_id: i64) -> Result<Vec<Notification>> {
        Ok(self
            .read_notifications()
            .await?
            .into_iter()
            .filter(|n| n.chat_id == chat_id && n.is_active())
            .collect())
    }

    /// Every active notification
    pub async fn active_notifications(&self) -> Result<Vec<Notification>> {
        Ok(self
            .read_notifications()
            .await?
            .into_iter()
            .filter(Notification::is_active)
            .collect())
    }

    async fn find_owned_notification(&self, chat_id: i64, id: u64) -> Result<Option<Notification>> {
        Ok(self
            .read_notifications()
            .await?
            .into_iter()
            .find(|n| n.id == id && n.chat_id == chat_id && n.is_active()))
    }

    /// Mark a notification of the chat as deleted. Returns `false` when the
    /// chat has no active notification with this id.
    #[instrument(skip(self))]
    pub async fn delete_notification(&self, chat_id: i64, id: u64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(notification) = self.find_owned_notification(chat_id, id).await? else {
            return Ok(false);
        };

        self.store
            .update_cells(
                SHEET_NOTIFICATIONS,
                vec![CellUpdate::single(
                    notification.row,
                    notif_col::STATUS,
                    NotificationStatus::Deleted.as_cell(),
                )],
            )
            .await?;
        info!("Notification deleted");
        Ok(true)
    }

    /// Arm a notification again after an alert was sent
    #[instrument(skip(self))]
    pub async fn rearm_notification(&self, chat_id: i64, id: u64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(notification) = self.find_owned_notification(chat_id, id).await? else {
            return Ok(false);
        };

        self.store
            .update_cells(
                SHEET_NOTIFICATIONS,
                vec![CellUpdate::single(
                    notification.row,
                    notif_col::SEND_STATUS,
                    send_status_cell(false),
                )],
            )
            .await?;
        info!("Notification re-armed");
        Ok(true)
    }

    /// Store the outcome of a single check. Returns whether the row was
    /// written; see [`Repository::record_checks`].
    pub async fn record_check(
        &self,
        notification: &Notification,
        balance: f64,
        alerted: bool,
        checked_at: NaiveDateTime,
    ) -> Result<bool> {
        let check = CheckRecord {
            notification: notification.clone(),
            balance,
            alerted,
        };
        Ok(self.record_checks(&[check], checked_at).await? == 1)
    }

    /// Store the outcomes of a check cycle in one batch.
    ///
    /// Rows are validated against a single fresh read of the sheet: a row
    /// that was deleted, re-armed or given a new threshold or check time
    /// since it was evaluated is left alone. Balance and check time are
    /// written for every other row, the sent flag only when `alerted`.
    /// Results that would not change their row are dropped before the
    /// sheet is read. Returns the number of rows written.
    #[instrument(skip(self, checks), fields(checks = checks.len()))]
    pub async fn record_checks(
        &self,
        checks: &[CheckRecord],
        checked_at: NaiveDateTime,
    ) -> Result<usize> {
        let pending: Vec<&CheckRecord> =
            checks.iter().filter(|check| check.changes_row()).collect();
        if pending.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;

        let rows = self.store.read_all(SHEET_NOTIFICATIONS).await?;
        let checked_cell = layout::format_timestamp(&checked_at);
        let mut updates = Vec::new();
        let mut written = 0;

        for check in pending {
            let evaluated = &check.notification;
            let row = evaluated.row;
            let unchanged = rows
                .get(row)
                .and_then(|cells| Notification::from_row(row, cells))
                .is_some_and(|current| current.same_settings(evaluated));
            if !unchanged {
                warn!(id = evaluated.id, "Notification changed during check, skipping write");
                continue;
            }

            updates.push(CellUpdate::single(
                row,
                notif_col::LAST_BALANCE,
                format_amount(check.balance),
            ));
            updates.push(CellUpdate::single(row, notif_col::LAST_CHECKED, checked_cell.clone()));
            if check.alerted {
                updates.push(CellUpdate::single(
                    row,
                    notif_col::SEND_STATUS,
                    send_status_cell(true),
                ));
            }
            written += 1;
        }

        if !updates.is_empty() {
            self.store.update_cells(SHEET_NOTIFICATIONS, updates).await?;
        }
        debug!(written, "Check results recorded");
        Ok(written)
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// Append an entry to the audit log
    pub async fn add_log(
        &self,
        level: LogLevel,
        action: &str,
        message: impl Into<String>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let entry = LogEntry {
            timestamp: self.now(),
            level,
            action: action.to_string(),
            message: message.into(),
        };
        self.store.append_row(SHEET_LOGS, entry.to_row()).await
    }

    /// Remove log rows older than `retention_days`. Rows with an unreadable
    /// date are kept. Appends wait for the rewrite to finish. Returns the
    /// number of rows removed.
    #[instrument(skip(self))]
    pub async fn cleanup_logs(&self, retention_days: u32) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let cutoff = self.now() - chrono::Duration::days(i64::from(retention_days));
        let rows = self.store.read_all(SHEET_LOGS).await?;
        let total = rows.len();

        let mut kept = Vec::with_capacity(total);
        let mut iter = rows.into_iter();
        if let Some(header) = iter.next() {
            kept.push(header);
        }
        kept.extend(iter.filter(|cells| {
            LogEntry::row_timestamp(cells).map_or(true, |timestamp| timestamp >= cutoff)
        }));

        let removed = total - kept.len();
        if removed > 0 {
            self.store.replace_all(SHEET_LOGS, kept).await?;
        }
        info!(removed, "Old log rows removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::BillingToken;
    use crate::models::ChatProfile;
    use crate::store::MemoryStore;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(ToString::to_string).collect()
    }

    fn create_test_store() -> Arc<MemoryStore> {
        let store = MemoryStore::with_default_sheets();
        store.insert_rows(
            SHEET_DIRECTORY,
            vec![
                row(&["", "", "", "", "", "ivan", "acme", "", "5", "да"]),
                row(&["", "", "", "", "", "petr", "acme", "", "", "нет"]),
            ],
        );
        store.insert_rows(
            SHEET_BALANCES,
            vec![row(&["", "acme", "ACME LLC", "", "", "", "250", "410", "", "12", "4 500,50", "11"])],
        );
        Arc::new(store)
    }

    fn create_test_repository(store: Arc<MemoryStore>) -> Repository {
        Repository::new(
            store,
            FixedOffset::east_opt(3 * 3600).unwrap(),
            3,
            Duration::from_secs(3600),
        )
    }

    fn create_test_user(chat_id: i64) -> User {
        User {
            chat_id,
            profile: ChatProfile {
                user_id: chat_id,
                first_name: "Ivan".to_string(),
                ..ChatProfile::default()
            },
            user_login: "ivan".to_string(),
            account_login: "acme".to_string(),
            is_admin: true,
            email: "ivan@example.com".to_string(),
            token: Some(BillingToken::new("tok")),
            auth_status: AuthStatus::Passed,
            last_check: None,
            next_check: None,
            registered_at: None,
            last_activity: None,
        }
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let repo = create_test_repository(create_test_store());

        let entry = repo.find_directory_entry("IVAN").await.unwrap().unwrap();
        assert!(entry.is_admin);
        assert_eq!(repo.user_utc_offset("ivan").await.unwrap(), 5);
        assert_eq!(repo.user_utc_offset("petr").await.unwrap(), 3);
        assert_eq!(repo.user_utc_offset("nobody").await.unwrap(), 3);
        assert!(repo.find_directory_entry("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_user_upserts_by_chat_id() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));

        repo.register_user(create_test_user(1)).await.unwrap();
        repo.register_user(create_test_user(2)).await.unwrap();

        let mut updated = create_test_user(1);
        updated.email = "new@example.com".to_string();
        repo.register_user(updated).await.unwrap();

        let rows = store.snapshot(SHEET_CHATS);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][chats::EMAIL], "new@example.com");

        repo.clear_cache();
        let user = repo.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.email, "new@example.com");
        assert!(repo.get_user(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recheck_admin_updates_row() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));
        let mut user = create_test_user(1);
        user.user_login = "petr".to_string();
        repo.register_user(user).await.unwrap();

        assert!(!repo.recheck_admin(1, "petr").await.unwrap());

        let rows = store.snapshot(SHEET_CHATS);
        assert_eq!(rows[1][chats::IS_ADMIN], "нет");
        assert!(!rows[1][chats::NEXT_CHECK].is_empty());
        let user = repo.get_user(1).await.unwrap().unwrap();
        assert!(!user.needs_admin_recheck(repo.now()));
    }

    #[tokio::test]
    async fn test_account_balance() {
        let repo = create_test_repository(create_test_store());

        let balance = repo.account_balance("acme").await.unwrap().unwrap();
        assert_eq!(balance.balance_value(), Some(4500.5));
        assert!(repo.account_balance("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_active_row_per_account() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));

        let first = repo.upsert_notification(1, "acme", 1000.0, None).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.row, 1);

        repo.record_check(&first, 900.0, true, repo.now()).await.unwrap();
        let second = repo
            .upsert_notification(1, "acme", 500.0, CheckTime::new(10, 0))
            .await
            .unwrap();
        assert_eq!(second.id, 1);
        assert!(!second.sent);

        let other = repo.upsert_notification(2, "acme", 10.0, None).await.unwrap();
        assert_eq!(other.id, 2);

        let active = repo.active_notifications().await.unwrap();
        assert_eq!(active.len(), 2);
        let mine = repo.user_notifications(1).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!((mine[0].threshold - 500.0).abs() < f64::EPSILON);
        assert_eq!(mine[0].check_time, CheckTime::new(10, 0));
    }

    #[tokio::test]
    async fn test_delete_and_rearm_check_ownership() {
        let repo = create_test_repository(create_test_store());
        let notification = repo.upsert_notification(1, "acme", 1000.0, None).await.unwrap();
        repo.record_check(&notification, 10.0, true, repo.now()).await.unwrap();

        assert!(!repo.rearm_notification(2, notification.id).await.unwrap());
        assert!(repo.rearm_notification(1, notification.id).await.unwrap());
        assert!(!repo.user_notifications(1).await.unwrap()[0].sent);

        assert!(!repo.delete_notification(2, notification.id).await.unwrap());
        assert!(repo.delete_notification(1, notification.id).await.unwrap());
        assert!(repo.user_notifications(1).await.unwrap().is_empty());
        assert!(!repo.delete_notification(1, notification.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_check_skips_deleted_rows() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));
        let notification = repo.upsert_notification(1, "acme", 1000.0, None).await.unwrap();
        repo.delete_notification(1, notification.id).await.unwrap();

        assert!(!repo.record_check(&notification, 10.0, true, repo.now()).await.unwrap());
        let rows = store.snapshot(SHEET_NOTIFICATIONS);
        assert_eq!(layout::cell(&rows[1], notif_col::SEND_STATUS), layout::SEND_STATUS_ARMED);
    }

    #[tokio::test]
    async fn test_record_check_without_alert_keeps_sent_flag() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));
        let notification = repo.upsert_notification(1, "acme", 1000.0, None).await.unwrap();

        repo.record_check(&notification, 10.0, true, repo.now()).await.unwrap();
        let notification = repo.user_notifications(1).await.unwrap().remove(0);
        assert!(repo.record_check(&notification, 5000.0, false, repo.now()).await.unwrap());

        let rows = store.snapshot(SHEET_NOTIFICATIONS);
        assert_eq!(layout::cell(&rows[1], notif_col::SEND_STATUS), layout::SEND_STATUS_SENT);
        assert_eq!(layout::cell(&rows[1], notif_col::LAST_BALANCE), "5000");
    }

    #[tokio::test]
    async fn test_record_check_keeps_new_threshold_set_during_check() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));
        let evaluated = repo.upsert_notification(1, "acme", 1000.0, None).await.unwrap();
        repo.upsert_notification(1, "acme", 500.0, None).await.unwrap();

        assert!(!repo.record_check(&evaluated, 800.0, true, repo.now()).await.unwrap());

        let current = repo.user_notifications(1).await.unwrap().remove(0);
        assert!(!current.sent);
        assert!((current.threshold - 500.0).abs() < f64::EPSILON);
        assert!(current.last_balance.is_none());
    }

    #[tokio::test]
    async fn test_record_check_skips_rearmed_row() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));
        let notification = repo.upsert_notification(1, "acme", 1000.0, None).await.unwrap();
        repo.record_check(&notification, 800.0, true, repo.now()).await.unwrap();
        let evaluated = repo.user_notifications(1).await.unwrap().remove(0);
        assert!(repo.rearm_notification(1, evaluated.id).await.unwrap());

        assert!(!repo.record_check(&evaluated, 700.0, false, repo.now()).await.unwrap());
        let rows = store.snapshot(SHEET_NOTIFICATIONS);
        assert_eq!(layout::cell(&rows[1], notif_col::SEND_STATUS), layout::SEND_STATUS_ARMED);
        assert_eq!(layout::cell(&rows[1], notif_col::LAST_BALANCE), "800");
    }

    #[tokio::test]
    async fn test_record_checks_skips_unchanged_balance() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));
        repo.upsert_notification(1, "acme", 1000.0, None).await.unwrap();
        repo.upsert_notification(2, "acme", 1000.0, CheckTime::new(10, 0))
            .await
            .unwrap();

        let checks = |notifications: Vec<Notification>| -> Vec<CheckRecord> {
            notifications
                .into_iter()
                .map(|notification| CheckRecord {
                    notification,
                    balance: 4500.5,
                    alerted: false,
                })
                .collect()
        };

        let first = checks(repo.active_notifications().await.unwrap());
        assert_eq!(repo.record_checks(&first, repo.now()).await.unwrap(), 2);

        // the row with a check time still gets its check recorded
        let second = checks(repo.active_notifications().await.unwrap());
        assert_eq!(repo.record_checks(&second, repo.now()).await.unwrap(), 1);
        assert_eq!(repo.record_checks(&[], repo.now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_logout_deletes_notifications() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));
        repo.register_user(create_test_user(1)).await.unwrap();
        repo.upsert_notification(1, "acme", 1000.0, None).await.unwrap();
        repo.upsert_notification(1, "other", 1000.0, None).await.unwrap();
        repo.upsert_notification(2, "acme", 1000.0, None).await.unwrap();

        assert_eq!(repo.logout(1).await.unwrap(), 2);

        let user = repo.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.auth_status, AuthStatus::LoggedOut);
        assert!(user.token.is_none());
        let rows = store.snapshot(SHEET_CHATS);
        assert_eq!(rows[1][chats::TOKEN], "");
        assert_eq!(rows[1][chats::AUTH_STATUS], layout::AUTH_STATUS_LOGGED_OUT);
        assert_eq!(repo.active_notifications().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_logs() {
        let store = create_test_store();
        let repo = create_test_repository(Arc::clone(&store));
        store.insert_rows(
            SHEET_LOGS,
            vec![
                row(&["2000-01-01", "10:00:00", "INFO", "OLD", "old"]),
                row(&["not a date", "", "INFO", "ODD", "kept"]),
            ],
        );
        repo.add_log(LogLevel::Info, "NEW", "fresh").await.unwrap();

        assert_eq!(repo.cleanup_logs(30).await.unwrap(), 1);
        let rows = store.snapshot(SHEET_LOGS);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][3], "ODD");
        assert_eq!(rows[2][3], "NEW");

        assert_eq!(repo.cleanup_logs(30).await.unwrap(), 0);
    }

    /// Memory store that parks after reading the log sheet until released
    struct GatedLogStore {
        inner: MemoryStore,
        reading: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl RowStore for GatedLogStore {
        async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
            let rows = self.inner.read_all(sheet).await?;
            if sheet == SHEET_LOGS {
                self.reading.notify_one();
                self.release.notified().await;
            }
            Ok(rows)
        }

        async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<()> {
            self.inner.append_row(sheet, row).await
        }

        async fn update_cells(&self, sheet: &str, updates: Vec<CellUpdate>) -> Result<()> {
            self.inner.update_cells(sheet, updates).await
        }

        async fn replace_all(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()> {
            self.inner.replace_all(sheet, rows).await
        }

        fn backend_name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_log_append_during_cleanup_is_kept() {
        let inner = MemoryStore::with_default_sheets();
        inner.insert_rows(
            SHEET_LOGS,
            vec![row(&["2000-01-01", "10:00:00", "INFO", "OLD", "old"])],
        );
        let store = Arc::new(GatedLogStore {
            inner,
            reading: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let repo = Arc::new(Repository::new(
            Arc::clone(&store) as Arc<dyn RowStore>,
            FixedOffset::east_opt(3 * 3600).unwrap(),
            3,
            Duration::from_secs(3600),
        ));

        let cleanup = tokio::spawn({
            let repo = Arc::clone(&repo);
            async move { repo.cleanup_logs(30).await }
        });
        store.reading.notified().await;

        let append = tokio::spawn({
            let repo = Arc::clone(&repo);
            async move { repo.add_log(LogLevel::Info, "NEW", "during cleanup").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!append.is_finished());

        store.release.notify_one();
        assert_eq!(cleanup.await.unwrap().unwrap(), 1);
        append.await.unwrap().unwrap();

        let rows = store.inner.snapshot(SHEET_LOGS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][3], "NEW");
    }
}
