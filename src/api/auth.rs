/// Authentication and registration endpoints
///
/// Login and registration are both two-step OTP flows: request a code, then
/// submit it. Login verification establishes a 24-hour bearer-token session;
/// registration verification creates the pending Registration row.
use crate::{
    account::{
        LoginRequest, MessageResponse, RegisterRequest, SessionResponse, VerifyLoginRequest,
        VerifyRegistrationRequest,
    },
    auth::AuthUser,
    context::AppContext,
    db::records::RegistrationStatus,
    error::{AppError, AppResult},
    otp::mask_email,
};
use axum::{extract::State, routing::get, routing::post, Json, Router};
use validator::ValidateEmail;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/login/verify", post(verify_login))
        .route("/auth/logout", post(logout))
        .route("/auth/register", post(register))
        .route("/auth/register/verify", post(verify_registration))
        .route("/auth/session", get(session_info))
}

/// Request a login code.
///
/// Only approved registrations can log in; unknown and unapproved emails get
/// the same generic rejection so the endpoint doesn't leak which addresses
/// are registered.
async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = req.email.trim().to_lowercase();

    if !email.validate_email() {
        tracing::info!("Auth event: LOGIN_ATTEMPT FAILED - invalid email format");
        return Err(AppError::Validation("Invalid email format".to_string()));
    }

    let user = ctx
        .accounts
        .find_by_email_status(&email, RegistrationStatus::Approved)
        .await?;

    let user = match user {
        Some(user) => user,
        None => {
            tracing::info!(
                "Auth event: {} LOGIN_ATTEMPT FAILED - not authorized",
                mask_email(&email)
            );
            return Err(AppError::Authentication(
                "Invalid email or not authorized".to_string(),
            ));
        }
    };

    let code = ctx.otp.issue(&email).await?;
    ctx.mailer
        .send_otp_email(&email, &code, Some(&user.name))
        .await?;

    tracing::info!(
        "Auth event: {} LOGIN_ATTEMPT SUCCESS - code sent",
        mask_email(&email)
    );
    Ok(Json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

/// Submit a login code and receive a session token
async fn verify_login(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyLoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    let email = req.email.trim().to_lowercase();

    ctx.otp.verify(&email, req.code.trim()).await?;

    // The registration must still be approved at verification time
    let user = ctx
        .accounts
        .find_by_email_status(&email, RegistrationStatus::Approved)
        .await?
        .ok_or_else(|| {
            AppError::Authentication("Invalid email or not authorized".to_string())
        })?;

    let session = ctx.accounts.create_session(&email).await?;

    tracing::info!("Auth event: {} OTP_VERIFY SUCCESS - logged in", mask_email(&email));
    Ok(Json(SessionResponse {
        token: session.id,
        email: user.email,
        name: user.name,
        is_admin: user.is_admin,
        expires_at: session.expires_at,
    }))
}

/// End the current session
async fn logout(
    State(ctx): State<AppContext>,
    user: AuthUser,
) -> AppResult<Json<MessageResponse>> {
    ctx.accounts.delete_session(&user.session.id).await?;

    tracing::info!(
        "Auth event: {} LOGOUT SUCCESS",
        mask_email(&user.registration.email)
    );
    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// Current session details
async fn session_info(user: AuthUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        token: user.session.id,
        email: user.registration.email,
        name: user.registration.name,
        is_admin: user.registration.is_admin,
        expires_at: user.session.expires_at,
    })
}

/// Start a registration.
///
/// Subject to the open-registration capacity cap; the {email, name} draft is
/// held in memory until the code verifies, no row is written yet.
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = req.email.trim().to_lowercase();
    let name = req.name.trim().to_string();

    if email.is_empty() || name.is_empty() {
        return Err(AppError::Validation(
            "Please provide both email and name".to_string(),
        ));
    }
    if !email.validate_email() {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }

    // No OTP is issued once capacity is reached
    ctx.accounts.ensure_capacity().await?;

    if ctx
        .accounts
        .find_by_email_status(&email, RegistrationStatus::Approved)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }
    if ctx
        .accounts
        .find_by_email_status(&email, RegistrationStatus::Pending)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "Your registration is already pending approval".to_string(),
        ));
    }

    let code = ctx.otp.issue(&email).await?;
    ctx.pending_registrations.insert(&email, &name);
    ctx.mailer.send_otp_email(&email, &code, Some(&name)).await?;

    tracing::info!("Auth event: {} REGISTER - code sent", mask_email(&email));
    Ok(Json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

/// Submit a registration code; creates the pending registration row.
///
/// The received/awaiting-approval emails are sent after the row is
/// committed; delivery failure downgrades the response to a warning.
async fn verify_registration(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyRegistrationRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = req.email.trim().to_lowercase();

    // The draft must still be live, but is only consumed once the code
    // verifies, so a mistyped code can be retried
    if ctx.pending_registrations.get(&email).is_none() {
        return Err(AppError::Validation(
            "No registration in progress for this email".to_string(),
        ));
    }

    ctx.otp.verify(&email, req.code.trim()).await?;

    let draft = ctx.pending_registrations.take(&email).ok_or_else(|| {
        AppError::Validation("No registration in progress for this email".to_string())
    })?;

    let registration = ctx.accounts.create_pending(&draft.email, &draft.name).await?;

    let mut notified = true;
    if let Err(e) = ctx.mailer.send_registration_received(&registration).await {
        tracing::warn!("Failed to send registration confirmation: {}", e);
        notified = false;
    }

    let review_url = format!("{}/admin/registrations", ctx.service_url());
    for admin in ctx.accounts.list_admins().await? {
        if let Err(e) = ctx
            .mailer
            .send_admin_pending(&admin.email, &registration, &review_url)
            .await
        {
            tracing::warn!(
                "Failed to notify admin {}: {}",
                mask_email(&admin.email),
                e
            );
        }
    }

    let message = if notified {
        "Email verified! Your registration is pending approval".to_string()
    } else {
        "Email verified! Your registration is pending approval (confirmation email could not be sent)"
            .to_string()
    };

    Ok(Json(MessageResponse { message }))
}
