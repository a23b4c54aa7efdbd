//! Library crate for potluck-back, exposing modules for binaries and tests.

/// Configuration file and engine tunables.
pub mod config;
/// Snapshot persistence.
pub mod dao;
/// Wire payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP, SSE and WebSocket routes.
pub mod routes;
/// Orchestration between transports and the room.
pub mod services;
/// The game room and shared application state.
pub mod state;
