use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::common::PublicStateSnapshot, services::public_service, state::SharedState};

/// Public read-only endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/state", get(get_state))
}

#[utoipa::path(
    get,
    path = "/state",
    tag = "public",
    responses((status = 200, description = "Current public room state", body = PublicStateSnapshot))
)]
/// Return the snapshot public screens render from.
pub async fn get_state(State(state): State<SharedState>) -> Json<PublicStateSnapshot> {
    Json(public_service::state_snapshot(&state).await)
}
