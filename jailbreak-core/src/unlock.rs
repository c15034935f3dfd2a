//! The monotonic per-player unlock set.
//!
//! Unlocks only ever grow. The persisted list is merged by union on every
//! write, so duplicate or retried merges converge to the same state.

use crate::id::LevelId;
use crate::storage::{KeyValueStore, StorageError};
use jailbreak_api::WireId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

const UNLOCKED_PREFIX: &str = "jailbreak_unlocked_levels";
const CURRENT_PREFIX: &str = "jailbreak_current_level";

/// Storage key of a player's unlocked-level list.
pub fn unlocked_key(player_key: &str) -> String {
    format!("{UNLOCKED_PREFIX}:{player_key}")
}

/// Storage key of a player's current level.
pub fn current_key(player_key: &str) -> String {
    format!("{CURRENT_PREFIX}:{player_key}")
}

/// Levels a player may access, plus the one being attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockState {
    unlocked: BTreeSet<LevelId>,
    current: LevelId,
}

impl UnlockState {
    /// Fresh state: only the root is unlocked and current.
    pub fn new(root: LevelId) -> Self {
        let mut unlocked = BTreeSet::new();
        unlocked.insert(root.clone());
        Self {
            unlocked,
            current: root,
        }
    }

    pub fn is_unlocked(&self, id: &LevelId) -> bool {
        self.unlocked.contains(id)
    }

    pub fn unlocked(&self) -> &BTreeSet<LevelId> {
        &self.unlocked
    }

    pub fn current(&self) -> &LevelId {
        &self.current
    }

    /// Union one id in. Returns true if it was not already unlocked.
    pub fn unlock(&mut self, id: LevelId) -> bool {
        self.unlocked.insert(id)
    }

    /// Union many ids in.
    pub fn unlock_all<I: IntoIterator<Item = LevelId>>(&mut self, ids: I) {
        self.unlocked.extend(ids);
    }

    /// Move the current pointer. Refuses locked levels.
    pub fn set_current(&mut self, id: LevelId) -> bool {
        if !self.unlocked.contains(&id) {
            return false;
        }
        self.current = id;
        true
    }
}

/// Loads and merges unlock state over an injected store.
pub struct UnlockStateStore<S> {
    store: S,
}

impl<S: KeyValueStore> UnlockStateStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read a player's state. Never fails.
    ///
    /// The root is unioned in unconditionally. If the store cannot be
    /// read the state degrades to root-only and a warning is logged.
    pub async fn load(&self, player_key: &str, root: &LevelId) -> UnlockState {
        let mut state = UnlockState::new(root.clone());

        match self.read_unlocked(player_key).await {
            Ok(ids) => state.unlock_all(ids),
            Err(e) => {
                warn!(player = player_key, error = %e, "unlock storage unavailable, starting from root");
                return state;
            }
        }

        match self.store.get(&current_key(player_key)).await {
            Ok(Some(current)) => {
                let current = LevelId::new(current);
                if !state.set_current(current.clone()) {
                    warn!(player = player_key, level = %current, "stored current level is locked, using root");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(player = player_key, error = %e, "failed to read current level"),
        }

        state
    }

    /// Union `new_ids` into the persisted set and return the result.
    ///
    /// The read, union and write run as one store update, so concurrent
    /// merges for the same player never drop each other's ids. If the
    /// previous set cannot be read, nothing is written and the error is
    /// returned.
    pub async fn merge<I>(&self, player_key: &str, new_ids: I) -> Result<BTreeSet<LevelId>, StorageError>
    where
        I: IntoIterator<Item = LevelId>,
    {
        let new_ids: Vec<LevelId> = new_ids.into_iter().collect();
        let mut merged = BTreeSet::new();

        self.store
            .update(&unlocked_key(player_key), &mut |raw| {
                merged = parse_unlocked(player_key, raw);
                let before = merged.len();
                merged.extend(new_ids.iter().cloned());

                if merged.len() != before || raw.is_none() {
                    Ok(Some(serde_json::to_string(&merged)?))
                } else {
                    Ok(None)
                }
            })
            .await?;

        Ok(merged)
    }

    /// Remember which level the player is on.
    pub async fn save_current(&self, player_key: &str, level: &LevelId) -> Result<(), StorageError> {
        self.store
            .set(&current_key(player_key), level.as_str())
            .await
    }

    async fn read_unlocked(&self, player_key: &str) -> Result<BTreeSet<LevelId>, StorageError> {
        let raw = self.store.get(&unlocked_key(player_key)).await?;
        Ok(parse_unlocked(player_key, raw.as_deref()))
    }
}

fn parse_unlocked(player_key: &str, raw: Option<&str>) -> BTreeSet<LevelId> {
    let Some(raw) = raw else {
        return BTreeSet::new();
    };

    // Older clients wrote numeric ids; accept any scalar shape and skip junk.
    let entries: Vec<WireId> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(player = player_key, error = %e, "unlock list is corrupt, treating as empty");
            return BTreeSet::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| LevelId::from_wire(entry).ok())
        .collect()
}
