/// Database records and status enums
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Registration lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
        }
    }
}

/// A person allowed to use the system
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<FixedOffset>,
    pub status: RegistrationStatus,
    pub is_admin: bool,
}

/// Check-in lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CheckInStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl CheckInStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(CheckInStatus::Pending),
            "confirmed" => Some(CheckInStatus::Confirmed),
            "cancelled" => Some(CheckInStatus::Cancelled),
            _ => None,
        }
    }
}

/// One driver's reserved time slot
///
/// Ownership is by the denormalized `name` column, matching the
/// registrant's display name at creation time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: i64,
    pub name: String,
    pub start_time: DateTime<FixedOffset>,
    pub duration: f64,
    pub created_at: DateTime<FixedOffset>,
    pub notify: bool,
    pub status: CheckInStatus,
    pub confirmed_at: Option<DateTime<FixedOffset>>,
}

impl CheckIn {
    /// Whether this check-in is currently eligible for confirmation.
    ///
    /// Confirmation is possible while the status is pending, either at any
    /// point on the calendar day of the slot (in the configured timezone) or
    /// up to one hour after the start time. The same-day clause has no lower
    /// bound, so a slot can be confirmed before it starts.
    pub fn needs_confirmation(&self, now: DateTime<FixedOffset>) -> bool {
        if self.status != CheckInStatus::Pending {
            return false;
        }

        let window_end = self.start_time + Duration::hours(1);
        let same_day = now.date_naive() == self.start_time.date_naive();

        same_day || (self.start_time <= now && now <= window_end)
    }
}

/// A short-lived one-time passcode
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Otp {
    pub id: i64,
    pub email: String,
    pub otp_code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
}

impl Otp {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// An authenticated session keyed by an opaque bearer token
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn checkin_at(start: DateTime<FixedOffset>, status: CheckInStatus) -> CheckIn {
        CheckIn {
            id: 1,
            name: "Alice".to_string(),
            start_time: start,
            duration: 2.0,
            created_at: start,
            notify: false,
            status,
            confirmed_at: None,
        }
    }

    fn at(tz: FixedOffset, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        tz.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_confirmation_window() {
        let tz = FixedOffset::east_opt(10 * 3600).unwrap();
        let start = at(tz, 2024, 1, 1, 8, 0);
        let pending = checkin_at(start, CheckInStatus::Pending);

        // Same day, hours before the start: eligible
        assert!(pending.needs_confirmation(at(tz, 2024, 1, 1, 0, 5)));
        // Same day, late evening, long after the grace window: still eligible
        assert!(pending.needs_confirmation(at(tz, 2024, 1, 1, 23, 55)));
        // Inside the one-hour grace window (and same day)
        assert!(pending.needs_confirmation(at(tz, 2024, 1, 1, 8, 45)));
        // Exactly at the window edges
        assert!(pending.needs_confirmation(at(tz, 2024, 1, 1, 8, 0)));
        assert!(pending.needs_confirmation(at(tz, 2024, 1, 1, 9, 0)));
        // Next day, outside the grace window: not eligible
        assert!(!pending.needs_confirmation(at(tz, 2024, 1, 2, 8, 30)));
        // The previous day is not the same day and not yet inside the window
        assert!(!pending.needs_confirmation(at(tz, 2023, 12, 31, 23, 55)));
    }

    #[test]
    fn test_grace_window_spans_midnight() {
        let tz = FixedOffset::east_opt(10 * 3600).unwrap();
        // A slot starting just before midnight stays confirmable into the
        // next day through the grace window
        let start = at(tz, 2024, 1, 1, 23, 30);
        let pending = checkin_at(start, CheckInStatus::Pending);

        assert!(pending.needs_confirmation(at(tz, 2024, 1, 2, 0, 15)));
        assert!(!pending.needs_confirmation(at(tz, 2024, 1, 2, 0, 31)));
    }

    #[test]
    fn test_non_pending_never_eligible() {
        let tz = FixedOffset::east_opt(10 * 3600).unwrap();
        let start = at(tz, 2024, 1, 1, 8, 0);
        let now = at(tz, 2024, 1, 1, 8, 30);

        assert!(!checkin_at(start, CheckInStatus::Confirmed).needs_confirmation(now));
        assert!(!checkin_at(start, CheckInStatus::Cancelled).needs_confirmation(now));
    }
}
