/// Check-in endpoints: landing data, CRUD, status updates, CSV export, stats
use crate::{
    auth::AuthUser,
    checkin::{
        parse_start_time, parse_status_target, validate_duration, CheckInRequest, CheckInView,
        SetStatusRequest, StatsResponse,
    },
    context::AppContext,
    db::records::CheckInStatus,
    error::AppResult,
    weather::WeatherReport,
};
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Build check-in routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/overview", get(overview))
        .route("/checkins", get(list_checkins).post(create_checkin))
        .route(
            "/checkins/:id",
            put(edit_checkin).delete(delete_checkin),
        )
        .route("/checkins/:id/status", put(set_checkin_status))
        .route("/checkins/export", get(export_checkins))
        .route("/stats", get(stats))
}

/// Landing page data: weather plus today's (and upcoming) check-ins
#[derive(Debug, Serialize)]
struct OverviewResponse {
    weather: Option<WeatherReport>,
    checkins: Vec<CheckInView>,
    now: DateTime<FixedOffset>,
}

async fn overview(State(ctx): State<AppContext>, _user: AuthUser) -> AppResult<Json<OverviewResponse>> {
    let now = ctx.checkins.now_local();
    let weather = ctx.weather.get().await;
    let checkins = ctx
        .checkins
        .list_upcoming()
        .await?
        .into_iter()
        .map(|c| CheckInView::at(c, now))
        .collect();

    Ok(Json(OverviewResponse {
        weather,
        checkins,
        now,
    }))
}

/// Recent check-ins plus the acting user's name for ownership display
#[derive(Debug, Serialize)]
struct CheckInListResponse {
    checkins: Vec<CheckInView>,
    user_name: String,
    now: DateTime<FixedOffset>,
}

async fn list_checkins(
    State(ctx): State<AppContext>,
    user: AuthUser,
) -> AppResult<Json<CheckInListResponse>> {
    let now = ctx.checkins.now_local();
    let checkins = ctx
        .checkins
        .list_recent(25)
        .await?
        .into_iter()
        .map(|c| CheckInView::at(c, now))
        .collect();

    Ok(Json(CheckInListResponse {
        checkins,
        user_name: user.registration.name,
        now,
    }))
}

async fn create_checkin(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(req): Json<CheckInRequest>,
) -> AppResult<Json<CheckInView>> {
    let start_time = parse_start_time(&req.start_date, &req.start_time, ctx.config.timezone)?;
    let duration = validate_duration(&req.duration)?;

    let checkin = ctx
        .checkins
        .create(&user.registration, start_time, duration, req.notify)
        .await?;

    if checkin.notify {
        ctx.notifier
            .notify(&format!(
                "A driver has checked in on {} {} for {} hours",
                start_time.format("%Y-%m-%d"),
                start_time.format("%I:%M %p"),
                duration
            ))
            .await;
    }

    let now = ctx.checkins.now_local();
    Ok(Json(CheckInView::at(checkin, now)))
}

async fn edit_checkin(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<CheckInRequest>,
) -> AppResult<Json<CheckInView>> {
    let start_time = parse_start_time(&req.start_date, &req.start_time, ctx.config.timezone)?;
    let duration = validate_duration(&req.duration)?;

    let outcome = ctx
        .checkins
        .edit(&user.registration, id, start_time, duration, req.notify)
        .await?;

    if outcome.checkin.notify {
        if let Some(change_text) = outcome.change_text() {
            ctx.notifier
                .notify(&format!(
                    "Check-in {} updated for {} {}",
                    change_text,
                    start_time.format("%Y-%m-%d"),
                    start_time.format("%I:%M %p"),
                ))
                .await;
        }
    }

    let now = ctx.checkins.now_local();
    Ok(Json(CheckInView::at(outcome.checkin, now)))
}

async fn set_checkin_status(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<SetStatusRequest>,
) -> AppResult<Json<CheckInView>> {
    let target = parse_status_target(&req.status)?;

    let checkin = ctx
        .checkins
        .set_status(&user.registration, id, target)
        .await?;

    if checkin.notify {
        let slot = format!(
            "{} {}",
            checkin.start_time.format("%Y-%m-%d"),
            checkin.start_time.format("%I:%M %p"),
        );
        let message = match target {
            CheckInStatus::Confirmed => {
                format!("Driver has confirmed arrival for {} check-in", slot)
            }
            _ => format!("Driver has cancelled their {} check-in", slot),
        };
        ctx.notifier.notify(&message).await;
    }

    let now = ctx.checkins.now_local();
    Ok(Json(CheckInView::at(checkin, now)))
}

async fn delete_checkin(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.checkins.delete_own(&user.registration, id).await?;
    Ok(Json(serde_json::json!({})))
}

/// CSV export of the acting user's own check-ins
async fn export_checkins(
    State(ctx): State<AppContext>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let checkins = ctx.checkins.list_for_name(&user.registration.name).await?;

    let mut output = String::from("Date,Start Time,Duration (hours)\n");
    for checkin in &checkins {
        output.push_str(&format!(
            "{},{},{}\n",
            checkin.start_time.format("%Y-%m-%d"),
            checkin.start_time.format("%I:%M %p"),
            checkin.duration,
        ));
    }

    let filename = format!(
        "checkins_{}_{}.csv",
        user.registration.name.replace(' ', "_"),
        ctx.checkins.now_local().format("%Y%m%d"),
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        output,
    ))
}

/// Query parameters are not used; the stats payload always covers every
/// window
async fn stats(State(ctx): State<AppContext>, _user: AuthUser) -> AppResult<Json<StatsResponse>> {
    let now = ctx.checkins.now_local();

    let overall = ctx.checkins.period_stats(None).await?;
    let today = ctx
        .checkins
        .period_stats(Some(ctx.checkins.start_of_day(now)))
        .await?;
    let this_week = ctx
        .checkins
        .period_stats(Some(ctx.checkins.start_of_week(now)))
        .await?;
    let this_month = ctx
        .checkins
        .period_stats(Some(ctx.checkins.start_of_month(now)))
        .await?;

    Ok(Json(StatsResponse {
        overall,
        today,
        this_week,
        this_month,
        registered_drivers: ctx.accounts.approved_count().await?,
        hourly_activity: ctx.checkins.hourly_activity().await?,
        top_duration: ctx.checkins.top_by_duration(5).await?,
        top_frequency: ctx.checkins.top_by_frequency(5).await?,
    }))
}
