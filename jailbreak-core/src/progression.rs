//! Deciding which level unlocks after a solved password.
//!
//! Explicit `next` edges win. A level without usable edges falls back to
//! the nearest higher difficulty tier that has a level. Every decision is
//! a single lookup step, so malformed or cyclic data can never make it loop.

use crate::backend::GameBackend;
use crate::graph::LevelGraph;
use crate::id::LevelId;
use crate::level::Level;
use crate::unlock::UnlockState;
use crate::Error;

/// How a progression target was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// First existing id in the level's `next` list.
    Explicit,
    /// Nearest higher difficulty tier.
    DifficultyFallback,
}

/// Result of advancing past a solved level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next {
        target: LevelId,
        route: Route,
        /// Ids that were newly added to the unlock set.
        unlocked: Vec<LevelId>,
    },
    /// No further levels exist.
    Completed,
}

impl Advance {
    pub fn target(&self) -> Option<&LevelId> {
        match self {
            Advance::Next { target, .. } => Some(target),
            Advance::Completed => None,
        }
    }
}

/// Interpreted answer from the authority's password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationResult {
    pub correct: bool,
}

/// Ask the authority whether `candidate` is the password for `level_id`.
///
/// The secret never reaches the client; only the verdict does.
pub async fn validate<B: GameBackend + ?Sized>(
    backend: &B,
    level_id: &LevelId,
    candidate: &str,
) -> Result<ValidationResult, Error> {
    let correct = backend.validate_password(level_id, candidate).await?;
    Ok(ValidationResult { correct })
}

/// Pick the level that follows `level`, without touching any state.
///
/// Never returns `level.id` itself.
pub fn next_target(graph: &LevelGraph, level: &Level) -> Option<(LevelId, Route)> {
    let explicit = level
        .next
        .iter()
        .find(|id| **id != level.id && graph.contains(id));
    if let Some(id) = explicit {
        return Some((id.clone(), Route::Explicit));
    }

    level.difficulty.tiers_after().find_map(|tier| {
        graph
            .levels()
            .iter()
            .find(|candidate| candidate.difficulty == tier && candidate.id != level.id)
            .map(|candidate| (candidate.id.clone(), Route::DifficultyFallback))
    })
}

/// Advance past a solved `level`, unioning the unlocked ids into `state`
/// and moving its current pointer to the chosen target.
///
/// On an explicit route every existing id in `level.next` is unlocked, not
/// just the target. Re-applying the same advance is a no-op on the set.
pub fn advance(graph: &LevelGraph, level: &Level, state: &mut UnlockState) -> Advance {
    let Some((target, route)) = next_target(graph, level) else {
        return Advance::Completed;
    };

    let mut candidates = vec![target.clone()];
    if route == Route::Explicit {
        candidates.extend(
            level
                .next
                .iter()
                .filter(|id| **id != level.id && graph.contains(id))
                .cloned(),
        );
    }

    let mut unlocked = Vec::new();
    for id in candidates {
        if state.unlock(id.clone()) {
            unlocked.push(id);
        }
    }
    state.set_current(target.clone());

    Advance::Next {
        target,
        route,
        unlocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Difficulty;

    fn tiered_graph() -> LevelGraph {
        LevelGraph::from_levels(vec![
            Level::new("1", "One", Difficulty::Low),
            Level::new("2", "Two", Difficulty::Medium),
            Level::new("3", "Three", Difficulty::High),
        ])
        .unwrap()
    }

    fn level(graph: &LevelGraph, id: &str) -> Level {
        graph.by_id(&LevelId::new(id)).unwrap().clone()
    }

    #[test]
    fn test_fallback_low_to_medium() {
        let graph = tiered_graph();
        let mut state = UnlockState::new(LevelId::new("1"));

        let result = advance(&graph, &level(&graph, "1"), &mut state);
        assert_eq!(
            result,
            Advance::Next {
                target: LevelId::new("2"),
                route: Route::DifficultyFallback,
                unlocked: vec![LevelId::new("2")],
            }
        );
        assert_eq!(state.current(), &LevelId::new("2"));
    }

    #[test]
    fn test_highest_tier_completes() {
        let graph = tiered_graph();
        let mut state = UnlockState::new(LevelId::new("1"));
        let before = state.clone();

        assert_eq!(advance(&graph, &level(&graph, "3"), &mut state), Advance::Completed);
        assert_eq!(state, before);
    }

    #[test]
    fn test_fallback_skips_missing_tier() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low),
            Level::new("c", "C", Difficulty::High),
        ])
        .unwrap();
        let target = next_target(&graph, &level(&graph, "a"));
        assert_eq!(target, Some((LevelId::new("c"), Route::DifficultyFallback)));
    }

    #[test]
    fn test_fallback_tie_break_is_load_order() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low),
            Level::new("m2", "M2", Difficulty::Medium),
            Level::new("m1", "M1", Difficulty::Medium),
        ])
        .unwrap();
        let (target, _) = next_target(&graph, &level(&graph, "a")).unwrap();
        assert_eq!(target, LevelId::new("m2"));
    }

    #[test]
    fn test_same_tier_is_not_a_fallback_target() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Medium),
            Level::new("b", "B", Difficulty::Medium),
        ])
        .unwrap();
        assert_eq!(next_target(&graph, &level(&graph, "a")), None);
    }

    #[test]
    fn test_explicit_edges_win_and_all_unlock() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).with_next(["ghost", "c", "b"]),
            Level::new("b", "B", Difficulty::Medium),
            Level::new("c", "C", Difficulty::High),
        ])
        .unwrap();
        let mut state = UnlockState::new(LevelId::new("a"));

        let result = advance(&graph, &level(&graph, "a"), &mut state);
        assert_eq!(result.target(), Some(&LevelId::new("c")));
        assert!(state.is_unlocked(&LevelId::new("b")));
        assert!(state.is_unlocked(&LevelId::new("c")));
        assert!(!state.is_unlocked(&LevelId::new("ghost")));
    }

    #[test]
    fn test_unknown_next_falls_back_to_difficulty() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).with_next(["ghost"]),
            Level::new("b", "B", Difficulty::Medium),
        ])
        .unwrap();
        let target = next_target(&graph, &level(&graph, "a"));
        assert_eq!(target, Some((LevelId::new("b"), Route::DifficultyFallback)));
    }

    #[test]
    fn test_never_targets_source() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).with_next(["a"]),
            Level::new("b", "B", Difficulty::Low).with_next(["a"]),
        ])
        .unwrap();

        for source in graph.levels() {
            if let Some((target, _)) = next_target(&graph, source) {
                assert_ne!(target, source.id);
            }
        }
        assert_eq!(next_target(&graph, &level(&graph, "a")), None);
    }

    #[test]
    fn test_cyclic_graph_terminates() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).with_next(["b"]),
            Level::new("b", "B", Difficulty::Low).with_next(["a"]),
        ])
        .unwrap();
        let mut state = UnlockState::new(LevelId::new("a"));

        // Walk the loop a few times; each step is a single lookup.
        let mut current = LevelId::new("a");
        for _ in 0..5 {
            let source = level(&graph, current.as_str());
            current = advance(&graph, &source, &mut state).target().unwrap().clone();
        }
        assert_eq!(state.unlocked().len(), 2);
    }

    #[test]
    fn test_advance_is_idempotent() {
        let graph = tiered_graph();
        let mut state = UnlockState::new(LevelId::new("1"));
        let source = level(&graph, "1");

        advance(&graph, &source, &mut state);
        let snapshot = state.unlocked().clone();
        let again = advance(&graph, &source, &mut state);

        assert_eq!(state.unlocked(), &snapshot);
        assert!(matches!(again, Advance::Next { ref unlocked, .. } if unlocked.is_empty()));
    }
}
