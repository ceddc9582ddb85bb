//! API request handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::error;

use crate::error::QuotaError;
use crate::gate::{Gate, GateOutcome, ProfileView};
use crate::host::{Member, MemberRegistry, Notice, NoticeBuffer, UserId};
use crate::quota::{Decision, RoleLimits, VisitStatus};
use crate::settings::{known_roles, settings_fields, Settings, SettingsField, SettingsUpdate};

/// Shared application state
pub struct AppState {
    pub gate: Gate,
    pub registry: Arc<dyn MemberRegistry>,
    pub notices: Arc<NoticeBuffer>,
    /// Bearer token required on /api routes, if set
    pub api_token: Option<String>,
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}

type ApiFailure = (StatusCode, Json<ApiError>);

fn failure(err: QuotaError) -> ApiFailure {
    let status = match &err {
        QuotaError::InvalidSetting(_) => StatusCode::UNPROCESSABLE_ENTITY,
        QuotaError::NotFound(_) => StatusCode::NOT_FOUND,
        QuotaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => {
            error!("API request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(ApiError::new(&err.to_string())))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct GateQuery {
    /// Answer a deny with `303 See Other` instead of JSON
    pub redirect: Option<String>,
}

impl GateQuery {
    /// `?redirect`, `?redirect=1` and `?redirect=true` all ask for a redirect
    pub fn wants_redirect(&self) -> bool {
        matches!(self.redirect.as_deref(), Some("" | "1" | "true" | "yes"))
    }
}

/// Gate result for the host
#[derive(Debug, Serialize, Deserialize)]
pub struct GateResponse {
    pub allowed: bool,
    pub skipped: bool,
    pub decision: Option<Decision>,
    pub redirect: Option<String>,
    pub message: Option<String>,
    /// Notices queued for the viewer, drained by this call
    pub notices: Vec<Notice>,
}

/// POST /api/gate - Run the gate for a profile page view
pub async fn check_gate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GateQuery>,
    Json(view): Json<ProfileView>,
) -> Response {
    let outcome = state.gate.check(view).await;

    let notices = match view.viewer_id {
        Some(viewer) => state.notices.take(viewer).await,
        None => Vec::new(),
    };

    let response = match outcome {
        GateOutcome::Skipped => GateResponse {
            allowed: true,
            skipped: true,
            decision: None,
            redirect: None,
            message: None,
            notices,
        },
        GateOutcome::Allowed { decision } => GateResponse {
            allowed: true,
            skipped: false,
            decision: Some(decision),
            redirect: None,
            message: None,
            notices,
        },
        GateOutcome::Redirect { location, .. } if query.wants_redirect() => {
            return Redirect::to(&location).into_response();
        }
        GateOutcome::Redirect {
            decision,
            location,
            message,
        } => GateResponse {
            allowed: false,
            skipped: false,
            decision: Some(decision),
            redirect: Some(location),
            message,
            notices,
        },
    };

    Json(response).into_response()
}

/// GET /api/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.gate.settings().load().await)
}

/// PUT /api/settings - Partial settings update
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>, ApiFailure> {
    let settings = state.gate.settings().update(update).await.map_err(failure)?;
    Ok(Json(settings))
}

/// GET /api/settings/fields - Field list for the host settings page
pub async fn get_settings_fields(State(state): State<Arc<AppState>>) -> Json<Vec<SettingsField>> {
    let settings = state.gate.settings().load().await;
    Json(settings_fields(known_roles(&settings)))
}

/// GET /api/limits - Effective role limits
pub async fn get_limits(State(state): State<Arc<AppState>>) -> Json<RoleLimits> {
    Json(state.gate.settings().effective_limits().await)
}

/// GET /api/users/:id/visits - Today's usage
pub async fn get_visits(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Json<VisitStatus> {
    let member = state.gate.member(user_id).await;
    let limits = state.gate.settings().effective_limits().await;
    Json(state.gate.ledger().status(&member, &limits).await)
}

/// DELETE /api/users/:id/visits - Forget a user's recorded visits
pub async fn reset_visits(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode, ApiFailure> {
    state.gate.ledger().reset(user_id).await.map_err(failure)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Member sync payload
#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub super_admin: bool,
    pub profile_url: Option<String>,
}

/// PUT /api/users/:id - Create or replace a member
pub async fn put_member(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(req): Json<MemberRequest>,
) -> Result<Json<Member>, ApiFailure> {
    if user_id == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("User id must be positive")),
        ));
    }

    let member = Member {
        id: user_id,
        roles: req.roles,
        super_admin: req.super_admin,
        profile_url: req.profile_url,
    };

    state
        .registry
        .upsert_member(member.clone())
        .await
        .map_err(failure)?;
    Ok(Json(member))
}

/// DELETE /api/users/:id - Remove a member and its visit record
pub async fn delete_member(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode, ApiFailure> {
    let removed = state.registry.remove_member(user_id).await.map_err(failure)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(failure(QuotaError::NotFound(format!("User {}", user_id))))
    }
}
