use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Potluck Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::public::get_state,
        crate::routes::admin::get_admin_state,
        crate::routes::admin::post_command,
        crate::routes::admin::update_team,
        crate::routes::admin::kick_team,
        crate::routes::sse::public_stream,
        crate::routes::sse::admin_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::PublicStateSnapshot,
            crate::dto::common::AdminStateSnapshot,
            crate::dto::common::TeamSummary,
            crate::dto::admin::AdminStateResponse,
            crate::dto::admin::ConnectedClient,
            crate::dto::admin::TeamPatchRequest,
            crate::dto::ws::IdentificationMessage,
            crate::dto::ws::ClientCommand,
            crate::dto::ws::CommandAck,
            crate::dto::ws::OutboundMessage,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::TeamsUpdateEvent,
            crate::dto::sse::GameResetEvent,
            crate::state::ledger::Announcement,
            crate::state::ledger::CategorySummary,
            crate::state::ledger::UndoSnapshot,
            crate::state::game::ResolutionRecord,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "public", description = "Read-only room state"),
        (name = "admin", description = "Operator commands and team management"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "websocket", description = "Command channel for teams and operators"),
    )
)]
pub struct ApiDoc;
