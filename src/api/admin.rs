/// Admin endpoints: registration approval, account management, and
/// check-in management
use crate::{
    account::{MessageResponse, ProcessOutcome, UpdateAccountRequest},
    auth::AdminUser,
    checkin::{parse_start_time, validate_duration, AdminCheckInRequest, CheckInView},
    context::AppContext,
    db::records::{CheckInStatus, Registration, RegistrationStatus},
    error::{AppError, AppResult},
    otp::mask_email,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/registrations", get(list_pending_registrations))
        .route("/admin/registrations/:id/approve", post(approve_registration))
        .route("/admin/registrations/:id/reject", post(reject_registration))
        .route("/admin/accounts", get(list_accounts))
        .route(
            "/admin/accounts/:id",
            put(update_account).delete(delete_account),
        )
        .route("/admin/checkins", get(list_all_checkins))
        .route(
            "/admin/checkins/:id",
            put(admin_edit_checkin).delete(admin_delete_checkin),
        )
}

async fn list_pending_registrations(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<Registration>>> {
    Ok(Json(ctx.accounts.list_pending().await?))
}

async fn approve_registration(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ProcessOutcome>> {
    process_registration(&ctx, &admin, id, RegistrationStatus::Approved).await
}

async fn reject_registration(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ProcessOutcome>> {
    process_registration(&ctx, &admin, id, RegistrationStatus::Rejected).await
}

/// Shared approval-workflow sequencing: persist the status change first,
/// then attempt the email, then report the combined outcome. A failed email
/// never rolls the change back.
async fn process_registration(
    ctx: &AppContext,
    admin: &AdminUser,
    id: i64,
    status: RegistrationStatus,
) -> AppResult<Json<ProcessOutcome>> {
    let registration = ctx.accounts.set_status(id, status).await?;

    let mailed = match status {
        RegistrationStatus::Approved => {
            ctx.mailer
                .send_approval(&registration, &ctx.service_url())
                .await
        }
        _ => ctx.mailer.send_rejection(&registration).await,
    };

    let notified = match mailed {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                "Failed to send {} notification to {}: {}",
                status.as_str(),
                mask_email(&registration.email),
                e
            );
            false
        }
    };

    tracing::info!(
        "Registration {} {} by {}",
        id,
        status.as_str(),
        mask_email(&admin.registration.email)
    );

    let message = if notified {
        format!(
            "Registration {} and notification sent to {}",
            status.as_str(),
            registration.email
        )
    } else {
        format!(
            "Registration {} but failed to send notification to {}",
            status.as_str(),
            registration.email
        )
    };

    Ok(Json(ProcessOutcome {
        registration,
        notified,
        message,
    }))
}

async fn list_accounts(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<Registration>>> {
    Ok(Json(ctx.accounts.list_all().await?))
}

async fn update_account(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAccountRequest>,
) -> AppResult<Json<Registration>> {
    let updated = ctx
        .accounts
        .update_account(&admin.registration, id, req)
        .await?;
    Ok(Json(updated))
}

async fn delete_account(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    ctx.accounts.delete_account(&admin.registration, id).await?;
    Ok(Json(MessageResponse {
        message: "Account deleted successfully".to_string(),
    }))
}

/// Admin check-in listing filters
#[derive(Debug, Deserialize)]
struct CheckInQuery {
    name: Option<String>,
    status: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
}

/// Filtered listing plus the total hours over the matched rows
#[derive(Debug, Serialize)]
struct AdminCheckInListResponse {
    checkins: Vec<CheckInView>,
    total_hours: f64,
}

async fn list_all_checkins(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Query(query): Query<CheckInQuery>,
) -> AppResult<Json<AdminCheckInListResponse>> {
    let mut filter = crate::checkin::CheckInFilter::default();

    if let Some(name) = query.name.filter(|n| !n.trim().is_empty()) {
        filter.name = Some(name.trim().to_string());
    }
    if let Some(status) = query.status.filter(|s| !s.trim().is_empty()) {
        filter.status = Some(
            CheckInStatus::parse(&status.trim().to_lowercase())
                .ok_or_else(|| AppError::Validation("Invalid status filter".to_string()))?,
        );
    }
    if let Some(date_from) = query.date_from.filter(|d| !d.trim().is_empty()) {
        filter.date_from = Some(parse_start_time(&date_from, "00:00", ctx.config.timezone)
            .map_err(|_| AppError::Validation("Invalid from date format".to_string()))?);
    }
    if let Some(date_to) = query.date_to.filter(|d| !d.trim().is_empty()) {
        filter.date_to = Some(parse_start_time(&date_to, "00:00", ctx.config.timezone)
            .map_err(|_| AppError::Validation("Invalid to date format".to_string()))?);
    }

    let (checkins, total_hours) = ctx.checkins.list_filtered(&filter).await?;

    let now = ctx.checkins.now_local();
    Ok(Json(AdminCheckInListResponse {
        checkins: checkins
            .into_iter()
            .map(|c| CheckInView::at(c, now))
            .collect(),
        total_hours,
    }))
}

/// Admin edit reassigns the slot (and possibly the owner name) without
/// touching the status
async fn admin_edit_checkin(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<AdminCheckInRequest>,
) -> AppResult<Json<CheckInView>> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let start_time = parse_start_time(&req.start_date, &req.start_time, ctx.config.timezone)?;
    let duration = validate_duration(&req.duration)?;

    let checkin = ctx
        .checkins
        .admin_edit(id, req.name.trim(), start_time, duration)
        .await?;

    let now = ctx.checkins.now_local();
    Ok(Json(CheckInView::at(checkin, now)))
}

async fn admin_delete_checkin(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    // Unknown ids surface as 404
    ctx.checkins.get(id).await?;
    ctx.checkins.delete_any(id).await?;

    Ok(Json(MessageResponse {
        message: "Check-in deleted successfully".to_string(),
    }))
}
