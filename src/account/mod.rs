/// Registration and session management
///
/// Handles driver registrations, the admin approval workflow, and
/// bearer-token sessions.

mod manager;

pub use manager::AccountManager;

use crate::db::records::{Registration, RegistrationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login request (step one: request a code)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

/// Login verification request (step two: submit the code)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyLoginRequest {
    pub email: String,
    pub code: String,
}

/// Registration request (step one)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
}

/// Registration verification request (step two)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRegistrationRequest {
    pub email: String,
    pub code: String,
}

/// Session token response after successful login verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    pub expires_at: DateTime<Utc>,
}

/// Generic message response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Account update request (admin, full-field)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAccountRequest {
    pub email: String,
    pub name: String,
    pub status: RegistrationStatus,
    pub is_admin: bool,
}

/// Outcome of an approval-workflow action that also attempts an email.
///
/// The state change is committed before the email is attempted; a delivery
/// failure downgrades the outcome to a warning, it never rolls back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub registration: Registration,
    pub notified: bool,
    pub message: String,
}
