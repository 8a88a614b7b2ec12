use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::store::{DeleteOutcome, UpdateOutcome};
use crate::auth::{AdminUser, AuthUser};
use crate::error::{AppError, AppResult};
use crate::logging::log_access;
use crate::mjpeg::MjpegStream;
use crate::signaling::OfferRequest;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    expires_in: i64,
}

pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let (ok, is_admin) = match state.credential_store.authenticate(&req.username, &req.password) {
        Ok(result) => result,
        Err(err) => return AppError::Internal(err).into_response(),
    };
    if !ok {
        log_access(&req.username, "login_failed", None, None);
        return AppError::Forbidden.into_response();
    }
    let (token, expires_in) = match state.token_authority.issue(&req.username, is_admin) {
        Ok(v) => v,
        Err(err) => return AppError::Internal(err).into_response(),
    };
    log_access(&req.username, "login", None, None);
    let status = if is_admin { StatusCode::ACCEPTED } else { StatusCode::OK };
    (status, Json(LoginResponse { token, expires_in })).into_response()
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    password: String,
}

pub async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> AppResult<Response> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("username and password are required".into()));
    }
    if state.credential_store.exists(&req.username)? {
        return Err(AppError::Conflict("User exists"));
    }
    state.credential_store.create(&req.username, &req.password, false)?;
    log_access(&req.username, "register", None, None);
    Ok((StatusCode::OK, Json(json!({ "message": "User created" }))).into_response())
}

pub async fn offer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<OfferRequest>,
) -> AppResult<Json<crate::signaling::AnswerResponse>> {
    let answer = state.signaling.handle_offer(user.username.clone(), req).await?;
    log_access(&user.username, "offer", None, None);
    Ok(Json(answer))
}

pub async fn webrtc_close(State(state): State<AppState>, user: AuthUser) -> Json<serde_json::Value> {
    state.signaling.close_peer_for_owner(&user.username).await;
    log_access(&user.username, "webrtc_close", None, None);
    Json(json!({ "success": true }))
}

pub async fn motion(State(state): State<AppState>, _user: AuthUser) -> Json<serde_json::Value> {
    Json(json!({ "motion": state.camera_manager.motion_detected() }))
}

#[derive(Serialize)]
struct UserSummary {
    id: i64,
    username: String,
    is_admin: bool,
}

pub async fn admin_users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Vec<UserSummary>>> {
    let users = state
        .credential_store
        .list_all()?
        .into_iter()
        .map(|u| UserSummary { id: u.id, username: u.username, is_admin: u.is_admin })
        .collect();
    Ok(Json(users))
}

#[derive(Deserialize)]
pub struct AdminDeleteRequest {
    id: i64,
}

pub async fn admin_delete(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<AdminDeleteRequest>,
) -> AppResult<Response> {
    match state.credential_store.delete(req.id)? {
        DeleteOutcome::Deleted => {
            log_access(&admin.0.username, "admin_delete", None, Some(&req.id.to_string()));
            Ok((StatusCode::OK, Json(json!({ "message": "User deleted" }))).into_response())
        }
        DeleteOutcome::NotFound => Err(AppError::NotFound),
        DeleteOutcome::AdminLocked => Err(AppError::AdminLocked),
    }
}

#[derive(Deserialize)]
pub struct AdminUpdateRequest {
    id: i64,
    username: Option<String>,
    password: Option<String>,
}

pub async fn admin_update(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<AdminUpdateRequest>,
) -> AppResult<Response> {
    match state
        .credential_store
        .update(req.id, req.username.as_deref(), req.password.as_deref())?
    {
        UpdateOutcome::Updated => {
            log_access(&admin.0.username, "admin_update", None, Some(&req.id.to_string()));
            Ok((StatusCode::OK, Json(json!({ "message": "User updated" }))).into_response())
        }
        UpdateOutcome::NotFound => Err(AppError::NotFound),
        UpdateOutcome::NameExists => Err(AppError::Conflict("name_exists")),
        UpdateOutcome::AdminLocked => Err(AppError::AdminLocked),
    }
}

pub async fn stream_mjpeg(State(state): State<AppState>, user: AuthUser) -> Response {
    log_access(&user.username, "stream_mjpeg", None, None);
    let subscription = state.camera_manager.primary_relay().subscribe();
    MjpegStream::new(subscription).into_response()
}

pub async fn recording_start(State(state): State<AppState>, admin: AdminUser) -> AppResult<Response> {
    let relay = state.camera_manager.primary_relay();
    let filename = state.recording.start(relay)?;
    log_access(&admin.0.username, "recording_start", None, Some(&filename));
    Ok((StatusCode::OK, Json(json!({ "filename": filename }))).into_response())
}

pub async fn recording_stop(State(state): State<AppState>, admin: AdminUser) -> AppResult<Response> {
    let stats = state.recording.stop().await?;
    log_access(&admin.0.username, "recording_stop", None, Some(&stats.filename));
    Ok((StatusCode::OK, Json(json!({ "stats": stats }))).into_response())
}

pub async fn system_status(State(state): State<AppState>, _user: AuthUser) -> Json<serde_json::Value> {
    let relay_stats = state.camera_manager.primary_relay().stats();
    let storage = state.recording.storage_status();
    let mut body = json!({
        "camera": {
            "frames_published": relay_stats.frames_published,
            "subscribers": relay_stats.subscribers,
            "motion": state.camera_manager.motion_detected(),
            "stereo_sessions": state.camera_manager.stereo_ref_count(),
        },
        "storage": storage,
        "recording": { "active": state.recording.is_active() },
        "peers": state.signaling.active_peer_count(),
    });
    if let Some(position) = state.recording.current_position() {
        body["gps"] = json!(position);
    }
    Json(body)
}
