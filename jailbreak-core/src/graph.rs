//! The level graph: every level plus the directed `next` edges between them.
//!
//! Levels keep the order the authority returned them in; that order is
//! the tie-breaker for the difficulty fallback in progression.

use crate::backend::GameBackend;
use crate::id::{LevelId, MalformedId};
use crate::level::Level;
use crate::Error;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from building or querying the level graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("No levels available")]
    Empty,

    #[error("Level not found: {0}")]
    LevelNotFound(LevelId),

    #[error("Duplicate level id: {0}")]
    DuplicateLevel(LevelId),

    #[error("Unknown difficulty: {0}")]
    UnknownDifficulty(String),

    #[error("{0}")]
    MalformedId(#[from] MalformedId),

    #[error("Level {from} points at unknown level {to}")]
    DanglingEdge { from: LevelId, to: LevelId },

    #[error("Level {0} points at itself")]
    SelfEdge(LevelId),

    #[error("Edges form a cycle: {}", join_ids(.0, " -> "))]
    Cycle(Vec<LevelId>),

    #[error("More than one root level: {}", join_ids(.0, ", "))]
    MultipleRoots(Vec<LevelId>),
}

fn join_ids(ids: &[LevelId], separator: &str) -> String {
    ids.iter()
        .map(LevelId::as_str)
        .collect::<Vec<_>>()
        .join(separator)
}

/// A structural problem found in data loaded from the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    NoRoot,
    MultipleRoots(Vec<LevelId>),
    DanglingEdge { from: LevelId, to: LevelId },
    SelfEdge(LevelId),
    Cycle(Vec<LevelId>),
}

/// All levels, in load order, with an id index.
#[derive(Debug, Clone, Default)]
pub struct LevelGraph {
    levels: Vec<Level>,
    index: HashMap<LevelId, usize>,
}

impl LevelGraph {
    /// Build a graph from levels in load order. An empty list is allowed
    /// here; it is only fatal when a game is started.
    pub fn from_levels(levels: Vec<Level>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(levels.len());
        for (position, level) in levels.iter().enumerate() {
            if index.insert(level.id.clone(), position).is_some() {
                return Err(GraphError::DuplicateLevel(level.id.clone()));
            }
        }
        Ok(Self { levels, index })
    }

    /// Load the player-facing graph from the authority.
    ///
    /// Fails with [`GraphError::Empty`] when the authority returns no levels.
    pub async fn load<B: GameBackend + ?Sized>(backend: &B) -> Result<Self, Error> {
        let levels = backend.levels().await?;
        if levels.is_empty() {
            return Err(GraphError::Empty.into());
        }
        Ok(Self::from_levels(levels)?)
    }

    /// The level marked root, or the first level when none is marked.
    pub fn root(&self) -> Result<&Level, GraphError> {
        self.levels
            .iter()
            .find(|level| level.is_root)
            .or_else(|| self.levels.first())
            .ok_or(GraphError::Empty)
    }

    pub fn by_id(&self, id: &LevelId) -> Result<&Level, GraphError> {
        self.get(id)
            .ok_or_else(|| GraphError::LevelNotFound(id.clone()))
    }

    pub fn get(&self, id: &LevelId) -> Option<&Level> {
        self.index.get(id).map(|&position| &self.levels[position])
    }

    pub fn get_mut(&mut self, id: &LevelId) -> Option<&mut Level> {
        match self.index.get(id) {
            Some(&position) => self.levels.get_mut(position),
            None => None,
        }
    }

    pub fn contains(&self, id: &LevelId) -> bool {
        self.index.contains_key(id)
    }

    /// Levels in load order.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Mutable access for edits that leave ids alone.
    pub(crate) fn levels_mut(&mut self) -> impl Iterator<Item = &mut Level> {
        self.levels.iter_mut()
    }

    pub fn into_levels(self) -> Vec<Level> {
        self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Report structural problems without rejecting anything.
    pub fn diagnostics(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();

        let roots = self.root_ids();
        match roots.len() {
            0 if !self.levels.is_empty() => issues.push(GraphIssue::NoRoot),
            0 | 1 => {}
            _ => issues.push(GraphIssue::MultipleRoots(roots)),
        }

        for level in &self.levels {
            for target in &level.next {
                if *target == level.id {
                    issues.push(GraphIssue::SelfEdge(level.id.clone()));
                } else if !self.contains(target) {
                    issues.push(GraphIssue::DanglingEdge {
                        from: level.id.clone(),
                        to: target.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            issues.push(GraphIssue::Cycle(cycle));
        }

        issues
    }

    /// Enforce the write-time invariants: at most one root, no self or
    /// dangling edges, no cycles.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        let roots = self.root_ids();
        if roots.len() > 1 {
            return Err(GraphError::MultipleRoots(roots));
        }

        for level in &self.levels {
            for target in &level.next {
                if *target == level.id {
                    return Err(GraphError::SelfEdge(level.id.clone()));
                }
                if !self.contains(target) {
                    return Err(GraphError::DanglingEdge {
                        from: level.id.clone(),
                        to: target.clone(),
                    });
                }
            }
        }

        match self.find_cycle() {
            Some(cycle) => Err(GraphError::Cycle(cycle)),
            None => Ok(()),
        }
    }

    /// Find any cycle of length two or more among existing levels.
    ///
    /// Self edges are reported separately and skipped here. Returns the
    /// cycle as a path whose first and last entries are the same level.
    pub fn find_cycle(&self) -> Option<Vec<LevelId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.levels.len()];

        for start in 0..self.levels.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            // (node, index of the next edge to explore)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::OnStack;

            while let Some(top) = stack.last_mut() {
                let (node, edge) = *top;
                top.1 += 1;

                let Some(target) = self.levels[node].next.get(edge) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };

                let Some(&child) = self.index.get(target) else {
                    continue;
                };
                if child == node {
                    continue;
                }

                match marks[child] {
                    Mark::Unvisited => {
                        marks[child] = Mark::OnStack;
                        stack.push((child, 0));
                    }
                    Mark::OnStack => {
                        let from = stack
                            .iter()
                            .position(|&(n, _)| n == child)
                            .unwrap_or_default();
                        let mut cycle: Vec<LevelId> = stack[from..]
                            .iter()
                            .map(|&(n, _)| self.levels[n].id.clone())
                            .collect();
                        cycle.push(self.levels[child].id.clone());
                        return Some(cycle);
                    }
                    Mark::Done => {}
                }
            }
        }

        None
    }

    /// Whether `to` can be reached from `from` by following `next` edges.
    pub fn reaches(&self, from: &LevelId, to: &LevelId) -> bool {
        let mut seen = vec![false; self.levels.len()];
        let mut queue: Vec<&LevelId> = vec![from];

        while let Some(id) = queue.pop() {
            if id == to {
                return true;
            }
            let Some(&position) = self.index.get(id) else {
                continue;
            };
            if std::mem::replace(&mut seen[position], true) {
                continue;
            }
            queue.extend(self.levels[position].next.iter());
        }

        false
    }

    fn root_ids(&self) -> Vec<LevelId> {
        self.levels
            .iter()
            .filter(|level| level.is_root)
            .map(|level| level.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Difficulty;

    fn chain_graph() -> LevelGraph {
        LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).with_next(["b"]),
            Level::new("b", "B", Difficulty::Medium).with_next(["c"]),
            Level::new("c", "C", Difficulty::High),
        ])
        .unwrap()
    }

    #[test]
    fn test_root_falls_back_to_first() {
        let graph = chain_graph();
        assert_eq!(graph.root().unwrap().id, LevelId::new("a"));
    }

    #[test]
    fn test_root_prefers_marked_level() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low),
            Level::new("b", "B", Difficulty::Low).as_root(),
        ])
        .unwrap();
        assert_eq!(graph.root().unwrap().id, LevelId::new("b"));
    }

    #[test]
    fn test_empty_graph_has_no_root() {
        let graph = LevelGraph::from_levels(Vec::new()).unwrap();
        assert!(matches!(graph.root(), Err(GraphError::Empty)));
    }

    #[test]
    fn test_by_id() {
        let graph = chain_graph();
        assert_eq!(graph.by_id(&LevelId::new("b")).unwrap().name, "B");
        assert!(matches!(
            graph.by_id(&LevelId::new("zzz")),
            Err(GraphError::LevelNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low),
            Level::new("a", "Again", Difficulty::High),
        ]);
        assert!(matches!(result, Err(GraphError::DuplicateLevel(_))));
    }

    #[test]
    fn test_acyclic_graph_passes() {
        let graph = chain_graph();
        assert!(graph.find_cycle().is_none());
        assert!(graph.check_invariants().is_ok());
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn test_cycle_found() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).with_next(["b"]),
            Level::new("b", "B", Difficulty::Low).with_next(["c"]),
            Level::new("c", "C", Difficulty::Low).with_next(["a"]),
        ])
        .unwrap();

        let cycle = graph.find_cycle().expect("cycle expected");
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
        assert!(matches!(graph.check_invariants(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).with_next(["b", "c"]),
            Level::new("b", "B", Difficulty::Medium).with_next(["d"]),
            Level::new("c", "C", Difficulty::Medium).with_next(["d"]),
            Level::new("d", "D", Difficulty::High),
        ])
        .unwrap();
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_diagnostics_report_everything() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).as_root().with_next(["a", "ghost"]),
            Level::new("b", "B", Difficulty::Low).as_root(),
        ])
        .unwrap();

        let issues = graph.diagnostics();
        assert!(issues.contains(&GraphIssue::SelfEdge(LevelId::new("a"))));
        assert!(issues.contains(&GraphIssue::DanglingEdge {
            from: LevelId::new("a"),
            to: LevelId::new("ghost"),
        }));
        assert!(issues
            .iter()
            .any(|issue| matches!(issue, GraphIssue::MultipleRoots(ids) if ids.len() == 2)));
    }

    #[test]
    fn test_reaches() {
        let graph = chain_graph();
        assert!(graph.reaches(&LevelId::new("a"), &LevelId::new("c")));
        assert!(!graph.reaches(&LevelId::new("c"), &LevelId::new("a")));
        assert!(graph.reaches(&LevelId::new("b"), &LevelId::new("b")));
    }

    #[test]
    fn test_check_invariants_rejects_dangling_edge() {
        let graph = LevelGraph::from_levels(vec![
            Level::new("a", "A", Difficulty::Low).with_next(["nowhere"]),
        ])
        .unwrap();
        assert!(matches!(
            graph.check_invariants(),
            Err(GraphError::DanglingEdge { .. })
        ));
    }
}
