/// Admin REST operations.
pub mod admin_service;
/// Command dispatch shared by the WebSocket and HTTP channels.
pub mod command_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Public read-only projections.
pub mod public_service;
/// Debounced snapshot persistence.
pub mod snapshotter;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Periodic deadline processing.
pub mod ticker;
/// WebSocket connection and message handling service.
pub mod websocket_service;
