use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate;
use crate::error::AppError;
use crate::models::{AttendanceStatus, Lecture, LowAttendanceAlert, NewLecture};
use crate::report::{self, WeeklyReport};
use crate::schedule;
use crate::store::AttendanceStore;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AttendanceStore>,
    pub clock: fn() -> NaiveDateTime,
}

impl AppState {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self {
            store,
            clock: local_now,
        }
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Caller identity, set by the upstream identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Identity(v.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/api/generate-weekly-report", get(weekly_report_handler))
        .route("/api/home", get(home_handler))
        .route(
            "/api/lectures",
            get(list_lectures_handler).post(create_lecture_handler),
        )
        .route("/api/active-lecture", get(active_lecture_handler))
        .route("/api/attendance", post(record_attendance_handler))
        .with_state(state)
}

pub async fn serve(state: AppState, listener: TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "attendance tracker listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn weekly_report_handler(
    State(state): State<AppState>,
    Identity(user_id): Identity,
) -> Result<Json<serde_json::Value>, AppError> {
    let since = report::weekly_window_start();
    let records = state.store.attendance_since(&user_id, since).await?;
    let report = WeeklyReport::from_records(&records);
    let groups = match &report {
        WeeklyReport::NoData => 0,
        WeeklyReport::Summaries(summaries) => summaries.len(),
    };
    info!(
        user_id = %user_id,
        since = %since,
        records = records.len(),
        groups,
        "weekly report generated"
    );
    Ok(Json(report.to_json()))
}

#[derive(Debug, Serialize)]
pub struct HomeView {
    pub lectures: Vec<Lecture>,
    pub alerts: Vec<LowAttendanceAlert>,
    pub error: Option<String>,
}

/// Fetch failures are shown inline instead of failing the request.
async fn home_handler(
    State(state): State<AppState>,
    Identity(user_id): Identity,
) -> Json<HomeView> {
    let fetched = async {
        let lectures = state.store.lectures(&user_id).await?;
        let marks = state.store.attendance_marks(&user_id).await?;
        Ok::<_, AppError>((lectures, marks))
    }
    .await;

    match fetched {
        Ok((lectures, marks)) => {
            let alerts = aggregate::low_attendance_alerts(&lectures, &marks);
            Json(HomeView {
                lectures,
                alerts,
                error: None,
            })
        }
        Err(err) => {
            warn!(user_id = %user_id, error = %err, "home view fetch failed");
            Json(HomeView {
                lectures: Vec::new(),
                alerts: Vec::new(),
                error: Some(err.to_string()),
            })
        }
    }
}

async fn list_lectures_handler(
    State(state): State<AppState>,
    Identity(user_id): Identity,
) -> Result<Json<Vec<Lecture>>, AppError> {
    Ok(Json(state.store.lectures(&user_id).await?))
}

async fn create_lecture_handler(
    State(state): State<AppState>,
    Identity(user_id): Identity,
    Json(new_lecture): Json<NewLecture>,
) -> Result<(StatusCode, Json<Lecture>), AppError> {
    let valid = schedule::validate(&new_lecture)?;
    let lecture = state.store.insert_lecture(&user_id, &valid).await?;
    info!(
        user_id = %user_id,
        lecture_id = %lecture.id,
        subject = %lecture.subject,
        "lecture scheduled"
    );
    Ok((StatusCode::CREATED, Json(lecture)))
}

async fn active_lecture_handler(
    State(state): State<AppState>,
    Identity(user_id): Identity,
) -> Result<Json<Option<Lecture>>, AppError> {
    let lectures = state.store.lectures(&user_id).await?;
    let now = (state.clock)();
    Ok(Json(schedule::active_lecture_at(&lectures, now).cloned()))
}

#[derive(Debug, Deserialize)]
pub struct MarkRequest {
    pub lecture_id: Uuid,
    pub status: AttendanceStatus,
    pub date: Option<NaiveDate>,
}

async fn record_attendance_handler(
    State(state): State<AppState>,
    Identity(user_id): Identity,
    Json(mark): Json<MarkRequest>,
) -> Result<StatusCode, AppError> {
    let date = mark.date.unwrap_or_else(|| Utc::now().date_naive());
    state
        .store
        .record_attendance(&user_id, mark.lecture_id, date, mark.status)
        .await?;
    info!(
        user_id = %user_id,
        lecture_id = %mark.lecture_id,
        %date,
        status = %mark.status,
        "attendance recorded"
    );
    Ok(StatusCode::NO_CONTENT)
}
