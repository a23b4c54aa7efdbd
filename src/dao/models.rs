use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{
    game::{GameState, Team},
    teams::TeamRegistry,
};

/// Version of the on-disk snapshot layout.
///
/// Bump when a field changes meaning; new optional fields do not need a bump
/// because every field defaults on load.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Persisted game state (`state.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateDocument {
    /// Layout version the document was written with.
    pub schema_version: u32,
    /// Instant of the write, epoch milliseconds.
    pub saved_at: u64,
    /// Everything but the team list.
    pub game: GameState,
}

/// Persisted team registry (`teams.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamsDocument {
    /// Layout version the document was written with.
    pub schema_version: u32,
    /// Teams in join order.
    pub teams: Vec<Team>,
}

/// Both documents written and loaded together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDocuments {
    /// Contents of `state.json`.
    pub state: StateDocument,
    /// Contents of `teams.json`.
    pub teams: TeamsDocument,
}

/// Snapshot rejected on load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("snapshot schema version {found} is newer than supported version {supported}")]
pub struct UnsupportedSchema {
    /// Version found on disk.
    pub found: u32,
    /// Newest version this build reads.
    pub supported: u32,
}

impl SnapshotDocuments {
    /// Capture the room's persistent parts.
    pub fn capture(game: &GameState, teams: &TeamRegistry, saved_at: u64) -> Self {
        Self {
            state: StateDocument {
                schema_version: SNAPSHOT_SCHEMA_VERSION,
                saved_at,
                game: game.clone(),
            },
            teams: TeamsDocument {
                schema_version: SNAPSHOT_SCHEMA_VERSION,
                teams: teams.to_vec(),
            },
        }
    }

    /// Refuse documents written by a newer server.
    pub fn validate(&self) -> Result<(), UnsupportedSchema> {
        let found = self.state.schema_version.max(self.teams.schema_version);
        if found > SNAPSHOT_SCHEMA_VERSION {
            return Err(UnsupportedSchema {
                found,
                supported: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Split into the pieces a room is restored from.
    pub fn into_parts(self) -> (GameState, TeamRegistry) {
        (
            self.state.game,
            TeamRegistry::from_teams(self.teams.teams),
        )
    }
}
