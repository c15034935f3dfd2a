//! Conversation keys for the chat transport.
//!
//! A key is `<player>-<level>-<millis>-<suffix>`: the first eight
//! characters of the player key, the level id, a millisecond timestamp and
//! a short random suffix. Only URL-safe characters survive, and the level
//! part is shortened so the whole key fits the transport's length limit.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest key the chat transport accepts.
pub const MAX_SESSION_ID_LEN: usize = 100;

const PLAYER_PREFIX_LEN: usize = 8;
const SUFFIX_LEN: usize = 6;
const SEPARATOR: char = '-';

/// An opaque conversation key, regenerated on every level entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh key for `player_key` entering `level_id`.
    pub fn generate(player_key: &str, level_id: &str) -> Self {
        Self::generate_with_rng(player_key, level_id, Utc::now(), &mut rand::thread_rng())
    }

    /// Generate with an explicit clock reading and random source.
    pub fn generate_with_rng<R: Rng>(
        player_key: &str,
        level_id: &str,
        at: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        let player: String = sanitize(player_key).take(PLAYER_PREFIX_LEN).collect();
        let player = if player.is_empty() { "anon".to_string() } else { player };

        let timestamp = at.timestamp_millis().max(0).to_string();
        let suffix: String = rng
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();

        // Three separators join four parts.
        let fixed = player.len() + timestamp.len() + suffix.len() + 3;
        let level_budget = MAX_SESSION_ID_LEN.saturating_sub(fixed).max(1);
        let level: String = sanitize(level_id).take(level_budget).collect();
        let level = if level.is_empty() { "level".to_string() } else { level };

        Self(format!(
            "{player}{SEPARATOR}{level}{SEPARATOR}{timestamp}{SEPARATOR}{suffix}"
        ))
    }

    /// Key for an admin's test conversation: `admin-test-<millis>`.
    pub fn admin_test(at: DateTime<Utc>) -> Self {
        Self(format!("admin-test-{}", at.timestamp_millis().max(0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize(raw: &str) -> impl Iterator<Item = char> + '_ {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_time() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_layout() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = SessionId::generate_with_rng("alice1234", "level1", fixed_time(), &mut rng);

        let parts: Vec<&str> = id.as_str().split(SEPARATOR).collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "alice123");
        assert_eq!(parts[1], "level1");
        assert_eq!(parts[2], "1700000000000");
        assert_eq!(parts[3].len(), SUFFIX_LEN);
    }

    #[test]
    fn test_length_bounded_for_long_inputs() {
        let long_player = "p".repeat(10_000);
        let long_level = "L".repeat(10_000);
        for _ in 0..20 {
            let id = SessionId::generate(&long_player, &long_level);
            assert!(id.as_str().len() <= MAX_SESSION_ID_LEN);
        }
    }

    #[test]
    fn test_unsafe_characters_dropped() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = SessionId::generate_with_rng("ál/ice ?x", "lvl/../1", fixed_time(), &mut rng);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == SEPARATOR));
        assert!(id.as_str().starts_with("licex-"));
    }

    #[test]
    fn test_empty_inputs_get_placeholders() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = SessionId::generate_with_rng("", "", fixed_time(), &mut rng);
        assert!(id.as_str().starts_with("anon-level-"));
    }

    #[test]
    fn test_regenerated_per_entry() {
        let first = SessionId::generate("alice1234", "level1");
        let second = SessionId::generate("alice1234", "level1");
        assert_ne!(first, second);
    }

    #[test]
    fn test_admin_test_key() {
        assert_eq!(
            SessionId::admin_test(fixed_time()).as_str(),
            "admin-test-1700000000000"
        );
    }
}
