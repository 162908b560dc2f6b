/// Authentication extractors and utilities
///
/// The acting user is resolved once at the request boundary and passed
/// explicitly into manager calls.
use crate::{
    context::AppContext,
    db::records::{Registration, RegistrationStatus, Session},
    error::AppError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// The acting user: a valid session plus its approved registration
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub registration: Registration,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let session = state.accounts.validate_token(&token).await?;

        // The registration must still be approved; a revoked account's
        // sessions stop working immediately
        let registration = state
            .accounts
            .find_by_email_status(&session.email, RegistrationStatus::Approved)
            .await?
            .ok_or_else(|| AppError::Authentication("Account is not authorized".to_string()))?;

        Ok(AuthUser {
            registration,
            session,
        })
    }
}

/// An acting user that must also hold the admin flag
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub registration: Registration,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        if !user.registration.is_admin {
            tracing::warn!(
                "Unauthorized admin access attempt by {}",
                user.registration.email
            );
            return Err(AppError::Authorization("Unauthorized access".to_string()));
        }

        Ok(AdminUser {
            registration: user.registration,
            session: user.session,
        })
    }
}
