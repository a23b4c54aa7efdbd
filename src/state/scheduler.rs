use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

/// Deferred work the room may need to run later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Record the natural expiry of the countdown.
    TimerExpiry,
    /// Release a buzzer lock whose answer window ran out.
    BuzzerAutoUnlock,
}

/// When a task fires and which context created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deadline {
    /// Instant at which the task becomes due.
    pub at: u64,
    /// Context stamp (the buzzer draw number, or 0).
    pub context: u64,
}

/// Deadline queue with at most one pending entry per [`TaskKind`].
///
/// Scheduling a kind again replaces its deadline; tasks are only handed out
/// once they are due, and the room re-validates them before acting.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    deadlines: HashMap<TaskKind, Deadline>,
}

impl Scheduler {
    /// Arm (or re-arm) a task.
    pub fn schedule(&mut self, kind: TaskKind, at: u64, context: u64) {
        self.deadlines.insert(kind, Deadline { at, context });
    }

    /// Drop a pending task, if any.
    pub fn cancel(&mut self, kind: TaskKind) {
        self.deadlines.remove(&kind);
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    /// Remove and return every task due at `now`, earliest first.
    pub fn take_due(&mut self, now: u64) -> Vec<(TaskKind, Deadline)> {
        let mut due: Vec<_> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| deadline.at <= now)
            .map(|(kind, deadline)| (*kind, *deadline))
            .collect();
        for (kind, _) in &due {
            self.deadlines.remove(kind);
        }
        due.sort_by_key(|(_, deadline)| deadline.at);
        due
    }

    /// Pending task for a kind.
    pub fn pending(&self, kind: TaskKind) -> Option<Deadline> {
        self.deadlines.get(&kind).copied()
    }

    /// Every pending task, earliest first.
    pub fn entries(&self) -> Vec<(TaskKind, Deadline)> {
        let mut entries: Vec<_> = self
            .deadlines
            .iter()
            .map(|(kind, deadline)| (*kind, *deadline))
            .collect();
        entries.sort_by_key(|(_, deadline)| deadline.at);
        entries
    }
}
