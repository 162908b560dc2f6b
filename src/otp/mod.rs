/// One-time passcode issuance and verification
///
/// Codes are 6 ASCII digits, valid for a configurable window (10 minutes by
/// default) and single-use. Issuing a new code supersedes any unused codes
/// for the same email. Expired rows are left in place; there is no purge.
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Mutex;

/// OTP issuing and verification service
pub struct OtpAuthenticator {
    db: SqlitePool,
    ttl: Duration,
}

impl OtpAuthenticator {
    /// Create a new authenticator
    pub fn new(db: SqlitePool, ttl_minutes: i64) -> Self {
        Self {
            db,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Issue a fresh code for an email address.
    ///
    /// All previously unused codes for the address are marked used first, so
    /// at most one code is meaningfully valid at a time. Returns the code for
    /// delivery via the mailer.
    pub async fn issue(&self, email: &str) -> AppResult<String> {
        let code = generate_code();
        let now = Utc::now();
        let expires_at = now + self.ttl;

        sqlx::query("UPDATE otp SET is_used = TRUE WHERE email = ?1 AND is_used = FALSE")
            .bind(email)
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        sqlx::query(
            "INSERT INTO otp (email, otp_code, created_at, expires_at, is_used)
             VALUES (?1, ?2, ?3, ?4, FALSE)",
        )
        .bind(email)
        .bind(&code)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(AppError::Database)?;

        tracing::info!("Issued OTP for {}", mask_email(email));
        Ok(code)
    }

    /// Verify a submitted code for an email address.
    ///
    /// The format gate runs before any query: anything other than exactly
    /// 6 decimal digits fails fast. A matching unused, unexpired row is
    /// marked used; everything else fails with no state change.
    pub async fn verify(&self, email: &str, submitted: &str) -> AppResult<()> {
        if !is_valid_format(submitted) {
            tracing::info!("OTP verify failed for {}: bad format", mask_email(email));
            return Err(AppError::Authentication("Invalid code format".to_string()));
        }

        let row = sqlx::query_as::<_, crate::db::records::Otp>(
            "SELECT id, email, otp_code, created_at, expires_at, is_used FROM otp
             WHERE email = ?1 AND otp_code = ?2 AND is_used = FALSE",
        )
        .bind(email)
        .bind(submitted)
        .fetch_optional(&self.db)
        .await
        .map_err(AppError::Database)?;

        let otp = match row {
            Some(otp) => otp,
            None => {
                tracing::info!("OTP verify failed for {}: no match", mask_email(email));
                return Err(AppError::Authentication(
                    "Invalid or expired code".to_string(),
                ));
            }
        };

        if otp.is_expired(Utc::now()) {
            tracing::info!("OTP verify failed for {}: expired", mask_email(email));
            return Err(AppError::Authentication(
                "Invalid or expired code".to_string(),
            ));
        }

        sqlx::query("UPDATE otp SET is_used = TRUE WHERE id = ?1")
            .bind(otp.id)
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        tracing::info!("OTP verified for {}", mask_email(email));
        Ok(())
    }
}

/// Generate a 6-digit code from the OS RNG
fn generate_code() -> String {
    let mut rng = rand::rngs::OsRng;
    (0..6)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Exactly 6 ASCII decimal digits
fn is_valid_format(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Mask an email address for logging: john.doe@example.com -> joh***@example.com
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((user, domain)) => {
            let visible = if user.len() > 3 { &user[..3] } else { user };
            format!("{}***@{}", visible, domain)
        }
        None => "invalid_email".to_string(),
    }
}

/// Registration draft carried between the register and verify steps.
///
/// Drafts live in memory only; the Registration row is not persisted until
/// the OTP verifies.
#[derive(Debug, Clone)]
pub struct RegistrationDraft {
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory store of pending registration drafts, keyed by email
pub struct PendingRegistrations {
    drafts: Mutex<HashMap<String, RegistrationDraft>>,
    ttl: Duration,
}

impl PendingRegistrations {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            drafts: Mutex::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Stash a draft, replacing any previous draft for the same email
    pub fn insert(&self, email: &str, name: &str) {
        let mut drafts = self.drafts.lock().expect("draft store poisoned");
        let now = Utc::now();
        drafts.retain(|_, draft| now - draft.created_at <= self.ttl);
        drafts.insert(
            email.to_string(),
            RegistrationDraft {
                email: email.to_string(),
                name: name.to_string(),
                created_at: now,
            },
        );
    }

    /// Look at the draft for an email without consuming it
    pub fn get(&self, email: &str) -> Option<RegistrationDraft> {
        let drafts = self.drafts.lock().expect("draft store poisoned");
        let draft = drafts.get(email)?;
        if Utc::now() - draft.created_at > self.ttl {
            return None;
        }
        Some(draft.clone())
    }

    /// Remove and return the draft for an email, if still fresh
    pub fn take(&self, email: &str) -> Option<RegistrationDraft> {
        let mut drafts = self.drafts.lock().expect("draft store poisoned");
        let draft = drafts.remove(email)?;
        if Utc::now() - draft.created_at > self.ttl {
            return None;
        }
        Some(draft)
    }
}
