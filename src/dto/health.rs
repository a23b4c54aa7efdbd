use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Teams currently registered in the room.
    pub teams: usize,
}

impl HealthResponse {
    /// Create a health response indicating snapshots are being written.
    pub fn ok(teams: usize) -> Self {
        Self {
            status: "ok".to_string(),
            teams,
        }
    }

    /// Create a health response indicating the last snapshot write failed.
    pub fn degraded(teams: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            teams,
        }
    }
}
