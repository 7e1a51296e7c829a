use crate::aggregate::build_snapshot;
use crate::errors::AppError;
use crate::gate::{Credentials, GateOutcome, LockReason};
use crate::models::{AuthQuery, LoginForm, Snapshot};
use crate::resolver::resolve;
use crate::state::AppState;
use crate::ui::{DashboardView, render_dashboard, render_login};
use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use tracing::info;

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
) -> Result<Response, AppError> {
    if !is_unlocked(&state, query.auth_token.as_deref()).await? {
        return Ok(Html(render_login(None)).into_response());
    }

    let now = local_now(&state);
    let snapshot = current_snapshot(&state, now).await;
    let view = DashboardView {
        now,
        partners: &state.partners.partners,
        snapshot: &snapshot,
        month_end_projection: state.partners.month_end_projection,
    };
    Ok(Html(render_dashboard(&view)).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let outcome = state
        .gate
        .check(Credentials {
            token: None,
            secret: Some(form.password.as_str()),
        })
        .await?;

    let response = match outcome {
        GateOutcome::Unlocked {
            issued_token: Some(token),
        } => Redirect::to(&format!("/?auth_token={token}")).into_response(),
        GateOutcome::Unlocked { issued_token: None } => Redirect::to("/").into_response(),
        GateOutcome::Locked(LockReason::Prompt) => Html(render_login(None)).into_response(),
        GateOutcome::Locked(LockReason::IncorrectCredential) => (
            StatusCode::UNAUTHORIZED,
            Html(render_login(Some("Incorrect password"))),
        )
            .into_response(),
        GateOutcome::Locked(LockReason::Throttled) => (
            StatusCode::TOO_MANY_REQUESTS,
            Html(render_login(Some("Too many attempts. Try again shortly."))),
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
) -> Result<Json<Snapshot>, AppError> {
    if !is_unlocked(&state, query.auth_token.as_deref()).await? {
        return Err(AppError::unauthorized());
    }
    let snapshot = current_snapshot(&state, local_now(&state)).await;
    Ok(Json(snapshot))
}

pub async fn healthz() -> &'static str {
    "ok"
}

async fn is_unlocked(state: &AppState, token: Option<&str>) -> Result<bool, AppError> {
    let outcome = state
        .gate
        .check(Credentials {
            token,
            secret: None,
        })
        .await?;
    Ok(matches!(outcome, GateOutcome::Unlocked { .. }))
}

async fn current_snapshot(state: &AppState, now: DateTime<FixedOffset>) -> Snapshot {
    let partners = &state.partners.partners;
    let figures = resolve(partners, Arc::clone(&state.metabase), state.fetch_strategy).await;
    let snapshot = build_snapshot(partners, &figures, now.date_naive());
    info!(
        total_current = snapshot.total_current,
        pacing_target = snapshot.pacing_target,
        "rendered snapshot"
    );
    snapshot
}

fn local_now(state: &AppState) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&state.utc_offset)
}
