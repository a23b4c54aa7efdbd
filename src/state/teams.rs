use indexmap::IndexMap;

use crate::state::game::{Team, TeamId};

/// Longest display name kept, in characters.
pub const MAX_TEAM_NAME_CHARS: usize = 32;

/// Fields an admin may overwrite on a team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamPatch {
    /// New display name.
    pub display_name: Option<String>,
    /// New avatar reference.
    pub avatar_ref: Option<String>,
    /// New token balance.
    pub token_balance: Option<u32>,
    /// New joker count.
    pub joker_count: Option<u32>,
}

/// Registry of teams in join order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamRegistry {
    teams: IndexMap<TeamId, Team>,
}

impl TeamRegistry {
    /// Rebuild a registry from a persisted team list.
    pub fn from_teams(teams: impl IntoIterator<Item = Team>) -> Self {
        Self {
            teams: teams
                .into_iter()
                .map(|team| (team.id.clone(), team))
                .collect(),
        }
    }

    /// Register a new team or refresh the identity of a returning one.
    ///
    /// Returns the team and whether it was newly created. Returning teams keep
    /// their balance and jokers.
    pub fn join(
        &mut self,
        team_id: &str,
        name: &str,
        avatar_ref: Option<String>,
        starting_tokens: u32,
        starting_jokers: u32,
        now: u64,
    ) -> (Team, bool) {
        let fallback = self
            .teams
            .get_index_of(team_id)
            .unwrap_or(self.teams.len())
            + 1;
        let display_name = sanitize_name(name, fallback);

        if let Some(team) = self.teams.get_mut(team_id) {
            team.display_name = display_name;
            if avatar_ref.is_some() {
                team.avatar_ref = avatar_ref;
            }
            return (team.clone(), false);
        }

        let team = Team {
            id: team_id.to_owned(),
            display_name,
            avatar_ref,
            token_balance: starting_tokens,
            joker_count: starting_jokers,
            joined_at: now,
        };
        self.teams.insert(team.id.clone(), team.clone());
        (team, true)
    }

    /// Apply an admin patch.
    pub fn update(&mut self, team_id: &str, patch: TeamPatch) -> Option<Team> {
        let position = self.teams.get_index_of(team_id)? + 1;
        let team = self.teams.get_mut(team_id)?;
        if let Some(name) = patch.display_name {
            team.display_name = sanitize_name(&name, position);
        }
        if let Some(avatar_ref) = patch.avatar_ref {
            team.avatar_ref = Some(avatar_ref).filter(|avatar| !avatar.is_empty());
        }
        if let Some(balance) = patch.token_balance {
            team.token_balance = balance;
        }
        if let Some(jokers) = patch.joker_count {
            team.joker_count = jokers;
        }
        Some(team.clone())
    }

    /// Remove a team, keeping the join order of the others.
    pub fn remove(&mut self, team_id: &str) -> Option<Team> {
        self.teams.shift_remove(team_id)
    }

    /// Look up a team.
    pub fn get(&self, team_id: &str) -> Option<&Team> {
        self.teams.get(team_id)
    }

    /// Look up a team for mutation.
    pub fn get_mut(&mut self, team_id: &str) -> Option<&mut Team> {
        self.teams.get_mut(team_id)
    }

    /// Whether the team is registered.
    pub fn contains(&self, team_id: &str) -> bool {
        self.teams.contains_key(team_id)
    }

    /// Add tokens to a team.
    pub fn credit(&mut self, team_id: &str, amount: u32) {
        if let Some(team) = self.teams.get_mut(team_id) {
            team.token_balance = team.token_balance.saturating_add(amount);
        }
    }

    /// Remove tokens from a team, flooring at zero.
    pub fn debit(&mut self, team_id: &str, amount: u32) {
        if let Some(team) = self.teams.get_mut(team_id) {
            team.token_balance = team.token_balance.saturating_sub(amount);
        }
    }

    /// Number of teams.
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    /// Whether no team joined yet.
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Teams in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    /// Owned copy of the team list in join order.
    pub fn to_vec(&self) -> Vec<Team> {
        self.teams.values().cloned().collect()
    }

    /// Drop every team.
    pub fn clear(&mut self) {
        self.teams.clear();
    }
}

/// Trim and bound a display name; blank names become `Team N`.
pub fn sanitize_name(raw: &str, position: usize) -> String {
    let name: String = raw.trim().chars().take(MAX_TEAM_NAME_CHARS).collect();
    let name = name.trim_end().to_owned();
    if name.is_empty() {
        format!("Team {position}")
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejoin_keeps_economy() {
        let mut registry = TeamRegistry::default();
        let (team, created) = registry.join("t1", "Owls", None, 20, 1, 100);
        assert!(created);
        assert_eq!(team.token_balance, 20);

        registry.debit("t1", 6);
        let (team, created) = registry.join("t1", " Night Owls ", Some("owl".into()), 20, 1, 500);
        assert!(!created);
        assert_eq!(team.display_name, "Night Owls");
        assert_eq!(team.token_balance, 14);
        assert_eq!(team.joined_at, 100);
        assert_eq!(team.avatar_ref.as_deref(), Some("owl"));
    }

    #[test]
    fn blank_names_get_positional_fallback() {
        let mut registry = TeamRegistry::default();
        registry.join("a", "Alpha", None, 20, 1, 0);
        let (team, _) = registry.join("b", "   ", None, 20, 1, 0);
        assert_eq!(team.display_name, "Team 2");
        assert_eq!(sanitize_name(&"x".repeat(40), 1).len(), MAX_TEAM_NAME_CHARS);
    }

    #[test]
    fn debit_floors_at_zero() {
        let mut registry = TeamRegistry::default();
        registry.join("a", "Alpha", None, 4, 0, 0);
        registry.debit("a", 9);
        assert_eq!(registry.get("a").map(|team| team.token_balance), Some(0));
    }

    #[test]
    fn patch_and_remove() {
        let mut registry = TeamRegistry::default();
        registry.join("a", "Alpha", None, 20, 1, 0);
        registry.join("b", "Beta", None, 20, 1, 0);

        let patched = registry
            .update(
                "a",
                TeamPatch {
                    token_balance: Some(50),
                    joker_count: Some(0),
                    ..TeamPatch::default()
                },
            )
            .unwrap();
        assert_eq!(patched.token_balance, 50);
        assert_eq!(patched.joker_count, 0);
        assert!(registry.update("zzz", TeamPatch::default()).is_none());

        assert!(registry.remove("a").is_some());
        assert_eq!(registry.iter().map(|team| team.id.as_str()).collect::<Vec<_>>(), ["b"]);
    }
}
