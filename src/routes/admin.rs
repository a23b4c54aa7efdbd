use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use axum_valid::Valid;
use serde_json::Value;

use crate::{
    dto::{
        admin::{AdminStateResponse, TeamPatchRequest},
        common::TeamSummary,
        ws::CommandAck,
    },
    error::AppError,
    services::admin_service,
    state::SharedState,
};

/// Operator endpoints mirroring the admin WebSocket commands.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/admin/state", get(get_admin_state))
        .route("/admin/command", post(post_command))
        .route("/admin/teams/{id}", put(update_team).delete(kick_team))
}

/// Full debug view of the room.
#[utoipa::path(
    get,
    path = "/admin/state",
    tag = "admin",
    responses((status = 200, description = "Room, scheduler and connection state", body = AdminStateResponse))
)]
pub async fn get_admin_state(State(state): State<SharedState>) -> Json<AdminStateResponse> {
    Json(admin_service::admin_state(&state).await)
}

/// Apply one admin command; the body uses the WebSocket command format.
#[utoipa::path(
    post,
    path = "/admin/command",
    tag = "admin",
    request_body = crate::dto::ws::ClientCommand,
    responses(
        (status = 200, description = "Command acknowledgement", body = CommandAck),
        (status = 400, description = "Body is not a valid command")
    )
)]
pub async fn post_command(
    State(state): State<SharedState>,
    Json(payload): Json<Value>,
) -> Result<Json<CommandAck>, AppError> {
    let ack = admin_service::execute_command(&state, payload).await?;
    Ok(Json(ack))
}

#[utoipa::path(
    put,
    path = "/admin/teams/{id}",
    tag = "admin",
    params(("id" = String, Path, description = "Identifier of the team to update")),
    request_body = TeamPatchRequest,
    responses(
        (status = 200, description = "Team updated", body = TeamSummary),
        (status = 400, description = "Invalid patch"),
        (status = 404, description = "Unknown team")
    )
)]
/// Edit a team's name, avatar or economy.
pub async fn update_team(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<TeamPatchRequest>>,
) -> Result<Json<TeamSummary>, AppError> {
    let summary = admin_service::update_team(&state, &id, payload).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    delete,
    path = "/admin/teams/{id}",
    tag = "admin",
    params(("id" = String, Path, description = "Identifier of the team to remove")),
    responses(
        (status = 204, description = "Team removed"),
        (status = 404, description = "Unknown team")
    )
)]
/// Remove a team from the room.
pub async fn kick_team(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    admin_service::kick_team(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
