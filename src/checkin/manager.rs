/// Check-in manager using sqlx runtime queries
use crate::{
    config::ServerConfig,
    db::records::{CheckIn, CheckInStatus, Registration},
    error::{AppError, AppResult},
};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

const SELECT_CHECKIN: &str =
    "SELECT id, name, start_time, duration, created_at, notify, status, confirmed_at FROM checkin";

/// Outcome of an owner edit
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub checkin: CheckIn,
    pub time_changed: bool,
    pub duration_changed: bool,
}

impl EditOutcome {
    /// Human description of what changed, for the push notification
    pub fn change_text(&self) -> Option<String> {
        let mut changes = Vec::new();
        if self.time_changed {
            changes.push("time");
        }
        if self.duration_changed {
            changes.push("duration");
        }
        if changes.is_empty() {
            None
        } else {
            Some(changes.join(" and "))
        }
    }
}

/// Admin listing filter
#[derive(Debug, Clone, Default)]
pub struct CheckInFilter {
    pub name: Option<String>,
    pub status: Option<CheckInStatus>,
    pub date_from: Option<DateTime<FixedOffset>>,
    pub date_to: Option<DateTime<FixedOffset>>,
}

/// Check-in persistence and state transitions
pub struct CheckInManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl CheckInManager {
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    pub fn now_local(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.config.timezone)
    }

    /// Get a check-in by id
    pub async fn get(&self, id: i64) -> AppResult<CheckIn> {
        sqlx::query_as::<_, CheckIn>(&format!("{} WHERE id = ?1", SELECT_CHECKIN))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("Check-in not found".to_string()))
    }

    /// Create a new pending check-in owned by the acting user
    pub async fn create(
        &self,
        acting: &Registration,
        start_time: DateTime<FixedOffset>,
        duration: f64,
        notify: bool,
    ) -> AppResult<CheckIn> {
        let now = self.now_local();

        let id = sqlx::query(
            "INSERT INTO checkin (name, start_time, duration, created_at, notify, status, confirmed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', NULL)",
        )
        .bind(&acting.name)
        .bind(start_time)
        .bind(duration)
        .bind(now)
        .bind(notify)
        .execute(&self.db)
        .await
        .map_err(AppError::Database)?
        .last_insert_rowid();

        Ok(CheckIn {
            id,
            name: acting.name.clone(),
            start_time,
            duration,
            created_at: now,
            notify,
            status: CheckInStatus::Pending,
            confirmed_at: None,
        })
    }

    /// Edit a check-in's slot.
    ///
    /// Owner only. The notify flag is always updated; a change to the start
    /// time or duration forces the status back to pending and clears
    /// `confirmed_at`.
    pub async fn edit(
        &self,
        acting: &Registration,
        id: i64,
        start_time: DateTime<FixedOffset>,
        duration: f64,
        notify: bool,
    ) -> AppResult<EditOutcome> {
        let checkin = self.get(id).await?;
        self.require_owner(acting, &checkin)?;

        let time_changed = checkin.start_time != start_time;
        let duration_changed = checkin.duration != duration;

        let (status, confirmed_at) = if time_changed || duration_changed {
            (CheckInStatus::Pending, None)
        } else {
            (checkin.status, checkin.confirmed_at)
        };

        sqlx::query(
            "UPDATE checkin SET start_time = ?1, duration = ?2, notify = ?3, status = ?4, confirmed_at = ?5
             WHERE id = ?6",
        )
        .bind(start_time)
        .bind(duration)
        .bind(notify)
        .bind(status)
        .bind(confirmed_at)
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(AppError::Database)?;

        Ok(EditOutcome {
            checkin: CheckIn {
                start_time,
                duration,
                notify,
                status,
                confirmed_at,
                ..checkin
            },
            time_changed,
            duration_changed,
        })
    }

    /// Confirm or cancel a pending check-in.
    ///
    /// Owner only. Transitions are only allowed out of pending; confirmation
    /// additionally requires the confirmation window to be open.
    pub async fn set_status(
        &self,
        acting: &Registration,
        id: i64,
        target: CheckInStatus,
    ) -> AppResult<CheckIn> {
        let checkin = self.get(id).await?;
        self.require_owner(acting, &checkin)?;

        if checkin.status != CheckInStatus::Pending {
            return Err(AppError::Validation(
                "Only pending check-ins can be updated".to_string(),
            ));
        }

        let now = self.now_local();
        if target == CheckInStatus::Confirmed && !checkin.needs_confirmation(now) {
            return Err(AppError::Validation(
                "The confirmation window has closed".to_string(),
            ));
        }

        let confirmed_at = match target {
            CheckInStatus::Confirmed => Some(now),
            _ => None,
        };

        sqlx::query("UPDATE checkin SET status = ?1, confirmed_at = ?2 WHERE id = ?3")
            .bind(target)
            .bind(confirmed_at)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        Ok(CheckIn {
            status: target,
            confirmed_at,
            ..checkin
        })
    }

    /// Delete a check-in owned by the acting user
    pub async fn delete_own(&self, acting: &Registration, id: i64) -> AppResult<()> {
        let checkin = self.get(id).await?;
        self.require_owner(acting, &checkin)?;
        self.delete_any(id).await
    }

    /// Delete any check-in (admin path)
    pub async fn delete_any(&self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM checkin WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Admin edit: reassign name and slot without touching the status
    pub async fn admin_edit(
        &self,
        id: i64,
        name: &str,
        start_time: DateTime<FixedOffset>,
        duration: f64,
    ) -> AppResult<CheckIn> {
        let checkin = self.get(id).await?;

        sqlx::query("UPDATE checkin SET name = ?1, start_time = ?2, duration = ?3 WHERE id = ?4")
            .bind(name)
            .bind(start_time)
            .bind(duration)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        Ok(CheckIn {
            name: name.to_string(),
            start_time,
            duration,
            ..checkin
        })
    }

    /// Check-ins from the start of the local day onward, soonest first
    /// (landing page data)
    pub async fn list_upcoming(&self) -> AppResult<Vec<CheckIn>> {
        let today_start = self.start_of_day(self.now_local());

        sqlx::query_as::<_, CheckIn>(&format!(
            "{} WHERE start_time >= ?1 ORDER BY start_time ASC",
            SELECT_CHECKIN
        ))
        .bind(today_start)
        .fetch_all(&self.db)
        .await
        .map_err(AppError::Database)
    }

    /// Most recent check-ins, newest slot first
    pub async fn list_recent(&self, limit: i64) -> AppResult<Vec<CheckIn>> {
        sqlx::query_as::<_, CheckIn>(&format!(
            "{} ORDER BY start_time DESC LIMIT ?1",
            SELECT_CHECKIN
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(AppError::Database)
    }

    /// All check-ins owned by a name, newest slot first (CSV export)
    pub async fn list_for_name(&self, name: &str) -> AppResult<Vec<CheckIn>> {
        sqlx::query_as::<_, CheckIn>(&format!(
            "{} WHERE name = ?1 ORDER BY start_time DESC",
            SELECT_CHECKIN
        ))
        .bind(name)
        .fetch_all(&self.db)
        .await
        .map_err(AppError::Database)
    }

    /// Filtered admin listing, newest slot first, with the total hours over
    /// the matched rows
    pub async fn list_filtered(&self, filter: &CheckInFilter) -> AppResult<(Vec<CheckIn>, f64)> {
        let mut query = sqlx::QueryBuilder::new(SELECT_CHECKIN);
        query.push(" WHERE 1=1");

        if let Some(name) = &filter.name {
            query.push(" AND name LIKE ");
            query.push_bind(format!("%{}%", name));
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ");
            query.push_bind(status);
        }
        if let Some(from) = filter.date_from {
            query.push(" AND start_time >= ");
            query.push_bind(from);
        }
        if let Some(to) = filter.date_to {
            query.push(" AND start_time <= ");
            query.push_bind(to);
        }
        query.push(" ORDER BY start_time DESC");

        let checkins = query
            .build_query_as::<CheckIn>()
            .fetch_all(&self.db)
            .await
            .map_err(AppError::Database)?;

        let total_hours = checkins.iter().map(|c| c.duration).sum();
        Ok((checkins, total_hours))
    }

    /// Per-driver aggregates, optionally restricted to slots starting at or
    /// after `since`
    pub async fn period_stats(
        &self,
        since: Option<DateTime<FixedOffset>>,
    ) -> AppResult<Vec<super::PeriodStats>> {
        let mut query = sqlx::QueryBuilder::new(
            "SELECT name, COUNT(id), SUM(duration), AVG(duration), MAX(start_time) FROM checkin",
        );
        if let Some(since) = since {
            query.push(" WHERE start_time >= ");
            query.push_bind(since);
        }
        query.push(" GROUP BY name");

        let rows: Vec<(String, i64, f64, f64, DateTime<FixedOffset>)> = query
            .build_query_as()
            .fetch_all(&self.db)
            .await
            .map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|(name, count, total, avg, latest)| super::PeriodStats {
                name,
                count,
                total_duration: round2(total),
                avg_duration: round2(avg),
                latest_check_in: Some(latest.format("%Y-%m-%d %H:%M").to_string()),
            })
            .collect())
    }

    /// Top drivers by total duration
    pub async fn top_by_duration(&self, limit: i64) -> AppResult<Vec<super::TopEntry>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT name, SUM(duration) AS total FROM checkin
             GROUP BY name ORDER BY total DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|(name, total)| super::TopEntry {
                name,
                value: round2(total),
            })
            .collect())
    }

    /// Top drivers by check-in count
    pub async fn top_by_frequency(&self, limit: i64) -> AppResult<Vec<super::TopEntry>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT name, COUNT(id) AS freq FROM checkin
             GROUP BY name ORDER BY freq DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|(name, count)| super::TopEntry {
                name,
                value: count as f64,
            })
            .collect())
    }

    /// Hour-of-day activity histogram over the last 30 days, all 24 buckets
    /// present
    pub async fn hourly_activity(&self) -> AppResult<Vec<super::HourlyActivity>> {
        use chrono::Timelike;

        let since = self.now_local() - Duration::days(30);
        let starts: Vec<(DateTime<FixedOffset>,)> =
            sqlx::query_as("SELECT start_time FROM checkin WHERE start_time >= ?1")
                .bind(since)
                .fetch_all(&self.db)
                .await
                .map_err(AppError::Database)?;

        let mut buckets = [0i64; 24];
        for (start,) in starts {
            buckets[start.hour() as usize] += 1;
        }

        Ok(buckets
            .iter()
            .enumerate()
            .map(|(hour, count)| super::HourlyActivity {
                hour: hour as u32,
                count: *count,
            })
            .collect())
    }

    /// Midnight at the start of the given local day
    pub fn start_of_day(&self, at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        at.date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is valid")
            .and_local_timezone(self.config.timezone)
            .single()
            .expect("fixed offsets have no gaps")
    }

    /// Monday of the given local day's week
    pub fn start_of_week(&self, at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        self.start_of_day(at) - Duration::days(at.weekday().num_days_from_monday() as i64)
    }

    /// First day of the given local day's month
    pub fn start_of_month(&self, at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let first = at.date_naive().with_day(1).expect("day 1 is valid");
        first
            .and_hms_opt(0, 0, 0)
            .expect("midnight is valid")
            .and_local_timezone(self.config.timezone)
            .single()
            .expect("fixed offsets have no gaps")
    }

    fn require_owner(&self, acting: &Registration, checkin: &CheckIn) -> AppResult<()> {
        if checkin.name != acting.name {
            return Err(AppError::Authorization(
                "You can only manage your own check-ins".to_string(),
            ));
        }
        Ok(())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::records::RegistrationStatus;

    fn test_config() -> Arc<ServerConfig> {
        std::env::remove_var("TRACKTIME_SMTP_URL");
        std::env::remove_var("TRACKTIME_WEATHER_API_KEY");
        Arc::new(ServerConfig::from_env().expect("config"))
    }

    fn driver(name: &str) -> Registration {
        Registration {
            id: 1,
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.to_string(),
            created_at: Utc::now().with_timezone(&test_config().timezone),
            status: RegistrationStatus::Approved,
            is_admin: false,
        }
    }

    async fn manager() -> CheckInManager {
        CheckInManager::new(db::memory_pool().await, test_config())
    }

    #[tokio::test]
    async fn test_create_starts_pending() {
        let checkins = manager().await;
        let owner = driver("Alice");

        let start = checkins.now_local() + Duration::hours(2);
        let created = checkins.create(&owner, start, 2.5, true).await.unwrap();

        assert_eq!(created.status, CheckInStatus::Pending);
        assert!(created.confirmed_at.is_none());
        assert!(created.notify);

        let loaded = checkins.get(created.id).await.unwrap();
        assert_eq!(loaded.start_time, start);
        assert_eq!(loaded.duration, 2.5);
    }

    #[tokio::test]
    async fn test_confirm_sets_confirmed_at() {
        let checkins = manager().await;
        let owner = driver("Alice");

        // Same local day, so the window is open even before the start
        let start = checkins.now_local() + Duration::minutes(5);
        let created = checkins.create(&owner, start, 1.0, false).await.unwrap();

        let confirmed = checkins
            .set_status(&owner, created.id, CheckInStatus::Confirmed)
            .await;
        // Guard against the test racing midnight
        if start.date_naive() != checkins.now_local().date_naive() {
            return;
        }
        let confirmed = confirmed.unwrap();
        assert_eq!(confirmed.status, CheckInStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_leaves_confirmed_at_null() {
        let checkins = manager().await;
        let owner = driver("Alice");

        let start = checkins.now_local() + Duration::hours(1);
        let created = checkins.create(&owner, start, 1.0, false).await.unwrap();

        let cancelled = checkins
            .set_status(&owner, created.id, CheckInStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, CheckInStatus::Cancelled);
        assert!(cancelled.confirmed_at.is_none());
    }

    #[tokio::test]
    async fn test_terminal_states_reject_further_transitions() {
        let checkins = manager().await;
        let owner = driver("Alice");

        let start = checkins.now_local() + Duration::hours(1);
        let created = checkins.create(&owner, start, 1.0, false).await.unwrap();
        checkins
            .set_status(&owner, created.id, CheckInStatus::Cancelled)
            .await
            .unwrap();

        let err = checkins
            .set_status(&owner, created.id, CheckInStatus::Confirmed)
            .await;
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_confirm_outside_window_rejected() {
        let checkins = manager().await;
        let owner = driver("Alice");

        // Two days ago: neither same-day nor within the 1-hour grace
        let start = checkins.now_local() - Duration::days(2);
        let created = checkins.create(&owner, start, 1.0, false).await.unwrap();

        let err = checkins
            .set_status(&owner, created.id, CheckInStatus::Confirmed)
            .await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        // Cancellation is still allowed while pending
        checkins
            .set_status(&owner, created.id, CheckInStatus::Cancelled)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_edit_resets_confirmed_to_pending() {
        let checkins = manager().await;
        let owner = driver("Alice");

        let start = checkins.now_local() + Duration::minutes(5);
        let created = checkins.create(&owner, start, 1.0, false).await.unwrap();
        // Confirm directly to avoid window coupling
        sqlx::query("UPDATE checkin SET status = 'confirmed', confirmed_at = ?1 WHERE id = ?2")
            .bind(checkins.now_local())
            .bind(created.id)
            .execute(&checkins.db)
            .await
            .unwrap();

        let outcome = checkins
            .edit(&owner, created.id, start + Duration::hours(1), 1.0, false)
            .await
            .unwrap();

        assert!(outcome.time_changed);
        assert!(!outcome.duration_changed);
        assert_eq!(outcome.checkin.status, CheckInStatus::Pending);
        assert!(outcome.checkin.confirmed_at.is_none());
        assert_eq!(outcome.change_text().unwrap(), "time");
    }

    #[tokio::test]
    async fn test_edit_without_changes_keeps_status() {
        let checkins = manager().await;
        let owner = driver("Alice");

        let start = checkins.now_local() + Duration::minutes(5);
        let created = checkins.create(&owner, start, 1.0, false).await.unwrap();
        sqlx::query("UPDATE checkin SET status = 'confirmed', confirmed_at = ?1 WHERE id = ?2")
            .bind(checkins.now_local())
            .bind(created.id)
            .execute(&checkins.db)
            .await
            .unwrap();

        // Only the notify flag changes; status is preserved
        let outcome = checkins
            .edit(&owner, created.id, start, 1.0, true)
            .await
            .unwrap();

        assert!(!outcome.time_changed);
        assert!(!outcome.duration_changed);
        assert!(outcome.change_text().is_none());
        assert_eq!(outcome.checkin.status, CheckInStatus::Confirmed);
        assert!(outcome.checkin.notify);
    }

    #[tokio::test]
    async fn test_ownership_enforced() {
        let checkins = manager().await;
        let owner = driver("Alice");
        let other = driver("Bob");

        let start = checkins.now_local() + Duration::hours(1);
        let created = checkins.create(&owner, start, 1.0, false).await.unwrap();

        assert!(matches!(
            checkins.edit(&other, created.id, start, 2.0, false).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            checkins
                .set_status(&other, created.id, CheckInStatus::Cancelled)
                .await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            checkins.delete_own(&other, created.id).await,
            Err(AppError::Authorization(_))
        ));

        // The admin path bypasses ownership
        checkins.delete_any(created.id).await.unwrap();
        assert!(checkins.get(created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_edit_preserves_status() {
        let checkins = manager().await;
        let owner = driver("Alice");

        let start = checkins.now_local() - Duration::hours(3);
        let created = checkins.create(&owner, start, 1.0, false).await.unwrap();
        sqlx::query("UPDATE checkin SET status = 'confirmed', confirmed_at = ?1 WHERE id = ?2")
            .bind(checkins.now_local())
            .bind(created.id)
            .execute(&checkins.db)
            .await
            .unwrap();

        let edited = checkins
            .admin_edit(created.id, "Bob", start + Duration::hours(1), 2.0)
            .await
            .unwrap();

        assert_eq!(edited.name, "Bob");
        assert_eq!(edited.duration, 2.0);
        let loaded = checkins.get(created.id).await.unwrap();
        assert_eq!(loaded.status, CheckInStatus::Confirmed);
        assert!(loaded.confirmed_at.is_some());
    }

    #[tokio::test]
    async fn test_filtered_listing_and_total_hours() {
        let checkins = manager().await;
        let alice = driver("Alice");
        let bob = driver("Bob");

        let now = checkins.now_local();
        checkins.create(&alice, now, 2.0, false).await.unwrap();
        checkins.create(&alice, now + Duration::hours(3), 1.5, false).await.unwrap();
        checkins.create(&bob, now + Duration::hours(5), 4.0, false).await.unwrap();

        let (all, total) = checkins
            .list_filtered(&CheckInFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(total, 7.5);

        let filter = CheckInFilter {
            name: Some("ali".to_string()),
            ..Default::default()
        };
        let (alices, total) = checkins.list_filtered(&filter).await.unwrap();
        assert_eq!(alices.len(), 2);
        assert_eq!(total, 3.5);

        let filter = CheckInFilter {
            date_from: Some(now + Duration::hours(2)),
            ..Default::default()
        };
        let (later, _) = checkins.list_filtered(&filter).await.unwrap();
        assert_eq!(later.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_aggregation() {
        let checkins = manager().await;
        let alice = driver("Alice");
        let bob = driver("Bob");

        let now = checkins.now_local();
        checkins.create(&alice, now, 2.0, false).await.unwrap();
        checkins.create(&alice, now + Duration::hours(2), 4.0, false).await.unwrap();
        checkins.create(&bob, now + Duration::hours(4), 1.0, false).await.unwrap();

        let stats = checkins.period_stats(None).await.unwrap();
        let alice_stats = stats.iter().find(|s| s.name == "Alice").unwrap();
        assert_eq!(alice_stats.count, 2);
        assert_eq!(alice_stats.total_duration, 6.0);
        assert_eq!(alice_stats.avg_duration, 3.0);

        let top = checkins.top_by_duration(5).await.unwrap();
        assert_eq!(top[0].name, "Alice");
        assert_eq!(top[0].value, 6.0);

        let freq = checkins.top_by_frequency(1).await.unwrap();
        assert_eq!(freq.len(), 1);
        assert_eq!(freq[0].name, "Alice");
        assert_eq!(freq[0].value, 2.0);

        let hourly = checkins.hourly_activity().await.unwrap();
        assert_eq!(hourly.len(), 24);
        assert_eq!(hourly.iter().map(|h| h.count).sum::<i64>(), 3);
    }

    #[tokio::test]
    async fn test_export_listing_is_owner_scoped() {
        let checkins = manager().await;
        let alice = driver("Alice");
        let bob = driver("Bob");

        let now = checkins.now_local();
        checkins.create(&alice, now, 2.0, false).await.unwrap();
        checkins.create(&bob, now + Duration::hours(1), 1.0, false).await.unwrap();

        let rows = checkins.list_for_name("Alice").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Alice");
    }
}
