/// Account manager using sqlx runtime queries
use crate::{
    account::UpdateAccountRequest,
    config::ServerConfig,
    db::records::{Registration, RegistrationStatus, Session},
    error::{AppError, AppResult},
};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Registration and session service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    fn now_local(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.config.timezone)
    }

    /// Get a registration by id
    pub async fn get_registration(&self, id: i64) -> AppResult<Registration> {
        sqlx::query_as::<_, Registration>(
            "SELECT id, email, name, created_at, status, is_admin FROM registration WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound("Registration not found".to_string()))
    }

    /// Find a registration by email and status
    pub async fn find_by_email_status(
        &self,
        email: &str,
        status: RegistrationStatus,
    ) -> AppResult<Option<Registration>> {
        sqlx::query_as::<_, Registration>(
            "SELECT id, email, name, created_at, status, is_admin
             FROM registration WHERE email = ?1 AND status = ?2",
        )
        .bind(email)
        .bind(status)
        .fetch_optional(&self.db)
        .await
        .map_err(AppError::Database)
    }

    /// Count registrations currently holding a capacity slot (approved + pending)
    pub async fn active_count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registration WHERE status IN ('approved', 'pending')",
        )
        .fetch_one(&self.db)
        .await
        .map_err(AppError::Database)?;

        Ok(count)
    }

    /// Reject new registrations once the capacity cap is reached
    pub async fn ensure_capacity(&self) -> AppResult<()> {
        if self.active_count().await? >= self.config.auth.registration_cap {
            return Err(AppError::Capacity(
                "Registration is currently closed as maximum capacity has been reached"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Create a pending registration (registration OTP verified)
    pub async fn create_pending(&self, email: &str, name: &str) -> AppResult<Registration> {
        let now = self.now_local();

        let id = sqlx::query(
            "INSERT INTO registration (email, name, created_at, status, is_admin)
             VALUES (?1, ?2, ?3, 'pending', FALSE)",
        )
        .bind(email)
        .bind(name)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(AppError::Database)?
        .last_insert_rowid();

        Ok(Registration {
            id,
            email: email.to_string(),
            name: name.to_string(),
            created_at: now,
            status: RegistrationStatus::Pending,
            is_admin: false,
        })
    }

    /// All pending registrations
    pub async fn list_pending(&self) -> AppResult<Vec<Registration>> {
        sqlx::query_as::<_, Registration>(
            "SELECT id, email, name, created_at, status, is_admin
             FROM registration WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.db)
        .await
        .map_err(AppError::Database)
    }

    /// All registrations (admin account listing)
    pub async fn list_all(&self) -> AppResult<Vec<Registration>> {
        sqlx::query_as::<_, Registration>(
            "SELECT id, email, name, created_at, status, is_admin
             FROM registration ORDER BY created_at ASC",
        )
        .fetch_all(&self.db)
        .await
        .map_err(AppError::Database)
    }

    /// All approved admins (recipients of new-registration notifications)
    pub async fn list_admins(&self) -> AppResult<Vec<Registration>> {
        sqlx::query_as::<_, Registration>(
            "SELECT id, email, name, created_at, status, is_admin
             FROM registration WHERE status = 'approved' AND is_admin = TRUE",
        )
        .fetch_all(&self.db)
        .await
        .map_err(AppError::Database)
    }

    /// Count approved registrations (stats)
    pub async fn approved_count(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM registration WHERE status = 'approved'")
                .fetch_one(&self.db)
                .await
                .map_err(AppError::Database)?;

        Ok(count)
    }

    /// Set a registration's status (approval workflow)
    pub async fn set_status(
        &self,
        id: i64,
        status: RegistrationStatus,
    ) -> AppResult<Registration> {
        let registration = self.get_registration(id).await?;

        sqlx::query("UPDATE registration SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        tracing::info!(
            "Registration {} ({}) -> {}",
            id,
            registration.email,
            status.as_str()
        );

        Ok(Registration {
            status,
            ..registration
        })
    }

    /// Full-field account update.
    ///
    /// An admin cannot clear the admin flag on the account matching their own
    /// authenticated email.
    pub async fn update_account(
        &self,
        acting: &Registration,
        id: i64,
        update: UpdateAccountRequest,
    ) -> AppResult<Registration> {
        if update.email.trim().is_empty() || update.name.trim().is_empty() {
            return Err(AppError::Validation(
                "Email and name are required".to_string(),
            ));
        }

        let registration = self.get_registration(id).await?;
        let email = update.email.trim().to_lowercase();

        if email == acting.email && !update.is_admin {
            return Err(AppError::Validation(
                "Cannot remove your own admin access".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE registration SET email = ?1, name = ?2, status = ?3, is_admin = ?4
             WHERE id = ?5",
        )
        .bind(&email)
        .bind(update.name.trim())
        .bind(update.status)
        .bind(update.is_admin)
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(AppError::Database)?;

        Ok(Registration {
            email,
            name: update.name.trim().to_string(),
            status: update.status,
            is_admin: update.is_admin,
            ..registration
        })
    }

    /// Delete an account.
    ///
    /// Self-deletion and deletion of any admin account are both refused.
    pub async fn delete_account(&self, acting: &Registration, id: i64) -> AppResult<()> {
        let target = self.get_registration(id).await?;

        if target.email == acting.email {
            return Err(AppError::Authorization(
                "Cannot delete your own account".to_string(),
            ));
        }

        if target.is_admin {
            return Err(AppError::Authorization(
                "Cannot delete admin accounts".to_string(),
            ));
        }

        sqlx::query("DELETE FROM registration WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        tracing::info!("Registration {} ({}) deleted", id, target.email);
        Ok(())
    }

    /// Create a session for an email (login OTP verified)
    pub async fn create_session(&self, email: &str) -> AppResult<Session> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.config.auth.session_hours);

        sqlx::query(
            "INSERT INTO session (id, email, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(email)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(AppError::Database)?;

        Ok(Session {
            id,
            email: email.to_string(),
            created_at: now,
            expires_at,
        })
    }

    /// Validate a bearer token and return the session
    pub async fn validate_token(&self, token: &str) -> AppResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, email, created_at, expires_at FROM session WHERE id = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::Authentication("Invalid or expired session".to_string()))?;

        if Utc::now() > session.expires_at {
            return Err(AppError::Authentication("Session expired".to_string()));
        }

        Ok(session)
    }

    /// Delete a session (logout)
    pub async fn delete_session(&self, session_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM session WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_config() -> Arc<ServerConfig> {
        std::env::remove_var("TRACKTIME_SMTP_URL");
        std::env::remove_var("TRACKTIME_WEATHER_API_KEY");
        Arc::new(ServerConfig::from_env().expect("config"))
    }

    async fn manager() -> AccountManager {
        AccountManager::new(db::memory_pool().await, test_config())
    }

    #[tokio::test]
    async fn test_create_and_approve() {
        let accounts = manager().await;

        let reg = accounts
            .create_pending("driver@example.com", "Driver One")
            .await
            .unwrap();
        assert_eq!(reg.status, RegistrationStatus::Pending);

        let pending = accounts.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);

        let approved = accounts
            .set_status(reg.id, RegistrationStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, RegistrationStatus::Approved);

        assert!(accounts
            .find_by_email_status("driver@example.com", RegistrationStatus::Approved)
            .await
            .unwrap()
            .is_some());
        assert!(accounts.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_count_tracks_approved_and_pending() {
        let accounts = manager().await;

        for i in 0..3 {
            accounts
                .create_pending(&format!("d{}@example.com", i), "Driver")
                .await
                .unwrap();
        }
        let first = accounts
            .find_by_email_status("d0@example.com", RegistrationStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        accounts
            .set_status(first.id, RegistrationStatus::Approved)
            .await
            .unwrap();

        assert_eq!(accounts.active_count().await.unwrap(), 3);

        // Rejected registrations release their slot
        let second = accounts
            .find_by_email_status("d1@example.com", RegistrationStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        accounts
            .set_status(second.id, RegistrationStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(accounts.active_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_capacity_cap_blocks_eleventh_registration() {
        let accounts = manager().await;

        for i in 0..10 {
            accounts
                .create_pending(&format!("d{}@example.com", i), "Driver")
                .await
                .unwrap();
        }

        let err = accounts.ensure_capacity().await;
        assert!(matches!(err, Err(AppError::Capacity(_))));

        // A rejection frees the slot and registration reopens
        let first = accounts
            .find_by_email_status("d0@example.com", RegistrationStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        accounts
            .set_status(first.id, RegistrationStatus::Rejected)
            .await
            .unwrap();
        accounts.ensure_capacity().await.unwrap();
    }

    #[tokio::test]
    async fn test_self_demotion_guard() {
        let accounts = manager().await;

        let reg = accounts
            .create_pending("admin@example.com", "Admin")
            .await
            .unwrap();
        let admin = accounts
            .set_status(reg.id, RegistrationStatus::Approved)
            .await
            .unwrap();
        // Promote directly for the test
        sqlx::query("UPDATE registration SET is_admin = TRUE WHERE id = ?1")
            .bind(admin.id)
            .execute(&accounts.db)
            .await
            .unwrap();
        let admin = accounts.get_registration(admin.id).await.unwrap();

        let update = UpdateAccountRequest {
            email: "admin@example.com".to_string(),
            name: "Admin".to_string(),
            status: RegistrationStatus::Approved,
            is_admin: false,
        };
        let err = accounts.update_account(&admin, admin.id, update).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        // Demoting someone else is fine
        let other = accounts
            .create_pending("other@example.com", "Other")
            .await
            .unwrap();
        let update = UpdateAccountRequest {
            email: "other@example.com".to_string(),
            name: "Other".to_string(),
            status: RegistrationStatus::Approved,
            is_admin: false,
        };
        accounts
            .update_account(&admin, other.id, update)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_account_guards() {
        let accounts = manager().await;

        let admin = accounts
            .create_pending("admin@example.com", "Admin")
            .await
            .unwrap();
        sqlx::query("UPDATE registration SET is_admin = TRUE, status = 'approved' WHERE id = ?1")
            .bind(admin.id)
            .execute(&accounts.db)
            .await
            .unwrap();
        let admin = accounts.get_registration(admin.id).await.unwrap();

        let second = accounts
            .create_pending("second@example.com", "Second Admin")
            .await
            .unwrap();
        sqlx::query("UPDATE registration SET is_admin = TRUE, status = 'approved' WHERE id = ?1")
            .bind(second.id)
            .execute(&accounts.db)
            .await
            .unwrap();

        // Self-delete refused
        assert!(accounts.delete_account(&admin, admin.id).await.is_err());
        // Deleting another admin refused too
        assert!(accounts.delete_account(&admin, second.id).await.is_err());

        // Plain accounts can be deleted
        let driver = accounts
            .create_pending("driver@example.com", "Driver")
            .await
            .unwrap();
        accounts.delete_account(&admin, driver.id).await.unwrap();
        assert!(accounts.get_registration(driver.id).await.is_err());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let accounts = manager().await;

        let session = accounts.create_session("driver@example.com").await.unwrap();
        let validated = accounts.validate_token(&session.id).await.unwrap();
        assert_eq!(validated.email, "driver@example.com");

        accounts.delete_session(&session.id).await.unwrap();
        assert!(accounts.validate_token(&session.id).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_session_rejected() {
        let accounts = manager().await;

        let session = accounts.create_session("driver@example.com").await.unwrap();
        sqlx::query("UPDATE session SET expires_at = ?1 WHERE id = ?2")
            .bind(Utc::now() - Duration::hours(1))
            .bind(&session.id)
            .execute(&accounts.db)
            .await
            .unwrap();

        assert!(accounts.validate_token(&session.id).await.is_err());
    }
}
