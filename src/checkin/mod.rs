/// Check-in state machine and reporting
///
/// A check-in is created pending, may be edited by its owner (which resets
/// a confirmed slot back to pending), and is confirmed or cancelled inside
/// the confirmation window.

mod manager;

pub use manager::{CheckInFilter, CheckInManager, EditOutcome};

use crate::db::records::{CheckIn, CheckInStatus};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Create / edit request. The duration arrives as a string and is validated
/// server-side; dates are `YYYY-MM-DD` and times `HH:MM` in the configured
/// timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub start_date: String,
    pub start_time: String,
    pub duration: String,
    #[serde(default)]
    pub notify: bool,
}

/// Status update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

/// Admin edit request: may also reassign the owner name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCheckInRequest {
    pub name: String,
    pub start_date: String,
    pub start_time: String,
    pub duration: String,
}

/// A check-in as returned to clients, with the confirmation-window flag
/// evaluated at response time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInView {
    #[serde(flatten)]
    pub checkin: CheckIn,
    pub needs_confirmation: bool,
}

impl CheckInView {
    pub fn at(checkin: CheckIn, now: DateTime<FixedOffset>) -> Self {
        let needs_confirmation = checkin.needs_confirmation(now);
        Self {
            checkin,
            needs_confirmation,
        }
    }
}

/// Per-driver aggregate over a reporting window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodStats {
    pub name: String,
    pub count: i64,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub latest_check_in: Option<String>,
}

/// Leaderboard entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopEntry {
    pub name: String,
    pub value: f64,
}

/// One hour bucket of the activity histogram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyActivity {
    pub hour: u32,
    pub count: i64,
}

/// Full stats payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub overall: Vec<PeriodStats>,
    pub today: Vec<PeriodStats>,
    pub this_week: Vec<PeriodStats>,
    pub this_month: Vec<PeriodStats>,
    pub registered_drivers: i64,
    pub hourly_activity: Vec<HourlyActivity>,
    pub top_duration: Vec<TopEntry>,
    pub top_frequency: Vec<TopEntry>,
}

/// Validate a check-in duration submitted as a string.
///
/// Accepts any numeric value in the open-closed interval (0, 24].
pub fn validate_duration(raw: &str) -> AppResult<f64> {
    let duration: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation("Invalid duration format".to_string()))?;

    if !duration.is_finite() || duration <= 0.0 || duration > 24.0 {
        return Err(AppError::Validation(
            "Duration must be between 0 and 24 hours".to_string(),
        ));
    }

    Ok(duration)
}

/// Parse a date + time pair into a timestamp in the configured timezone
pub fn parse_start_time(
    date: &str,
    time: &str,
    tz: FixedOffset,
) -> AppResult<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(
        &format!("{} {}", date.trim(), time.trim()),
        "%Y-%m-%d %H:%M",
    )
    .map_err(|_| AppError::Validation("Invalid date/time format".to_string()))?;

    naive
        .and_local_timezone(tz)
        .single()
        .ok_or_else(|| AppError::Validation("Invalid date/time format".to_string()))
}

/// Parse the target of a status update. Only the two terminal states are
/// reachable through the API; anything else is a validation error.
pub fn parse_status_target(raw: &str) -> AppResult<CheckInStatus> {
    match CheckInStatus::parse(&raw.trim().to_lowercase()) {
        Some(CheckInStatus::Confirmed) => Ok(CheckInStatus::Confirmed),
        Some(CheckInStatus::Cancelled) => Ok(CheckInStatus::Cancelled),
        _ => Err(AppError::Validation("Invalid status".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_bounds() {
        assert!(validate_duration("0").is_err());
        assert!(validate_duration("-1").is_err());
        assert!(validate_duration("24.01").is_err());
        assert!(validate_duration("abc").is_err());
        assert!(validate_duration("").is_err());
        assert!(validate_duration("NaN").is_err());

        assert_eq!(validate_duration("0.01").unwrap(), 0.01);
        assert_eq!(validate_duration("24").unwrap(), 24.0);
        assert_eq!(validate_duration("2.5").unwrap(), 2.5);
        assert_eq!(validate_duration(" 3 ").unwrap(), 3.0);
    }

    #[test]
    fn test_parse_start_time() {
        let tz = FixedOffset::east_opt(10 * 3600).unwrap();

        let parsed = parse_start_time("2024-01-01", "08:00", tz).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T08:00:00+10:00");

        assert!(parse_start_time("2024-13-01", "08:00", tz).is_err());
        assert!(parse_start_time("2024-01-01", "25:00", tz).is_err());
        assert!(parse_start_time("yesterday", "late", tz).is_err());
    }

    #[test]
    fn test_parse_status_target() {
        assert_eq!(
            parse_status_target("confirmed").unwrap(),
            CheckInStatus::Confirmed
        );
        assert_eq!(
            parse_status_target("CANCELLED").unwrap(),
            CheckInStatus::Cancelled
        );
        assert!(parse_status_target("pending").is_err());
        assert!(parse_status_target("done").is_err());
    }
}
