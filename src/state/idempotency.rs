use std::collections::HashMap;

/// Default deduplication window for client action ids.
pub const DEFAULT_IDEMPOTENCY_WINDOW_MS: u64 = 10_000;

/// Remembers recently seen action ids so retried commands are applied once.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    window_ms: u64,
    seen: HashMap<String, u64>,
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_IDEMPOTENCY_WINDOW_MS)
    }
}

impl IdempotencyGuard {
    /// Create a guard with the given window.
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            seen: HashMap::new(),
        }
    }

    /// Returns `true` if the action should be applied.
    ///
    /// Actions without an id always pass. Ids are scoped per actor.
    pub fn admit(&mut self, actor: &str, action_id: Option<&str>, now: u64) -> bool {
        let Some(action_id) = action_id.filter(|id| !id.is_empty()) else {
            return true;
        };
        self.purge(now);

        let key = format!("{actor}:{action_id}");
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key, now);
        true
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no id is remembered.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn purge(&mut self, now: u64) {
        let window_ms = self.window_ms;
        self.seen
            .retain(|_, first_seen| now.saturating_sub(*first_seen) < window_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_within_window_is_refused() {
        let mut guard = IdempotencyGuard::new(10_000);
        assert!(guard.admit("team:a", Some("42"), 0));
        assert!(!guard.admit("team:a", Some("42"), 9_999));
    }

    #[test]
    fn ids_expire_after_window() {
        let mut guard = IdempotencyGuard::new(10_000);
        assert!(guard.admit("team:a", Some("42"), 0));
        assert!(guard.admit("team:a", Some("42"), 10_000));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn missing_or_empty_id_always_passes() {
        let mut guard = IdempotencyGuard::default();
        assert!(guard.admit("admin", None, 0));
        assert!(guard.admit("admin", None, 0));
        assert!(guard.admit("admin", Some(""), 0));
        assert!(guard.is_empty());
    }

    #[test]
    fn ids_are_scoped_per_actor() {
        let mut guard = IdempotencyGuard::default();
        assert!(guard.admit("team:a", Some("1"), 0));
        assert!(guard.admit("team:b", Some("1"), 0));
    }
}
