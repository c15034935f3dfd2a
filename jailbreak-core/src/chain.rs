//! Prompt components and the per-level chains built from them.
//!
//! Components live in one arena keyed by id, with a separate library
//! order for the admin list. A level's chain is just its ordered
//! `component_ids`; predecessor-based insertion is resolved to a position
//! in that list at call time.

use crate::id::{ComponentId, LevelId};
use crate::level::Level;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

pub use jailbreak_api::MoveDirection as Direction;

/// Token replaced with the player's username.
pub const USER_SUB: &str = "USER_SUB";
/// Token replaced with the level's display name.
pub const LEVEL_NAME: &str = "LEVEL_NAME";
/// Token for the level secret. Only the authority resolves it.
pub const LEVEL_PASSWORD: &str = "LEVEL_PASSWORD";

/// Separator placed between component texts when rendering.
const JOIN: &str = " ";

/// Errors from editing prompt chains.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Component {predecessor} is not in the chain of level {level}")]
    PredecessorNotFound {
        level: LevelId,
        predecessor: ComponentId,
    },

    #[error("Component not found: {0}")]
    ComponentNotFound(ComponentId),

    #[error("Component {component} is not in the chain of level {level}")]
    NotInChain {
        level: LevelId,
        component: ComponentId,
    },

    #[error("Component {component} is already in the chain of level {level}")]
    AlreadyInChain {
        level: LevelId,
        component: ComponentId,
    },
}

/// A reusable prompt fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptComponent {
    pub id: ComponentId,
    pub text: String,
}

impl PromptComponent {
    pub fn new(id: impl Into<ComponentId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Token values for [`PromptChain::render`], keyed by bare token name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitutions {
    values: HashMap<String, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(token.into(), value.into());
        self
    }

    /// Values safe to render on the client: username and level name.
    ///
    /// `LEVEL_PASSWORD` is never included, even when the level carries its
    /// secret, so the token reaches the authority verbatim.
    pub fn for_level(level: &Level, username: &str) -> Self {
        Self::new()
            .with(USER_SUB, username)
            .with(LEVEL_NAME, level.name.as_str())
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(String::as_str)
    }
}

/// Replace every `{{TOKEN}}` that has a value; leave the rest verbatim.
///
/// Replacement happens in a single pass, so substituted values are never
/// scanned for further tokens.
pub fn render_template(text: &str, substitutions: &Substitutions) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };

        match substitutions.get(&after_open[..close]) {
            Some(value) => {
                out.push_str(value);
                rest = &after_open[close + 2..];
            }
            None => {
                // Not a token: keep the braces and rescan right after them.
                out.push_str("{{");
                rest = after_open;
            }
        }
    }

    out.push_str(rest);
    out
}

/// The component arena and library order.
#[derive(Debug, Clone, Default)]
pub struct PromptChain {
    components: HashMap<ComponentId, PromptComponent>,
    library: Vec<ComponentId>,
    next_id: u64,
}

impl PromptChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from components in library order. Later duplicates replace
    /// the text of earlier ones but keep the first position.
    pub fn from_components(components: impl IntoIterator<Item = PromptComponent>) -> Self {
        let mut chain = Self::new();
        for component in components {
            chain.add(component);
        }
        chain
    }

    /// Add or replace a component in the arena, appending new ids to the
    /// library.
    pub fn add(&mut self, component: PromptComponent) {
        if let Ok(n) = component.id.as_str().parse::<u64>() {
            self.next_id = self.next_id.max(n.saturating_add(1));
        }
        if !self.components.contains_key(&component.id) {
            self.library.push(component.id.clone());
        }
        self.components.insert(component.id.clone(), component);
    }

    pub fn get(&self, id: &ComponentId) -> Option<&PromptComponent> {
        self.components.get(id)
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.components.contains_key(id)
    }

    /// Components in library order.
    pub fn components(&self) -> impl Iterator<Item = &PromptComponent> {
        self.library.iter().filter_map(|id| self.components.get(id))
    }

    pub fn len(&self) -> usize {
        self.library.len()
    }

    pub fn is_empty(&self) -> bool {
        self.library.is_empty()
    }

    /// Create a component with a locally assigned id and splice it into
    /// `level` right after `predecessor` (at the head when `None`).
    ///
    /// Nothing is created if the predecessor is not in the level's chain.
    pub fn insert_after(
        &mut self,
        level: &mut Level,
        predecessor: Option<&ComponentId>,
        text: impl Into<String>,
    ) -> Result<ComponentId, ChainError> {
        let position = insert_position(level, predecessor)?;

        let id = ComponentId::from(self.next_id);
        self.add(PromptComponent::new(id.clone(), text));
        level.component_ids.insert(position, id.clone());
        Ok(id)
    }

    /// Splice an existing component into `level` after `predecessor`.
    pub fn insert_existing_after(
        &self,
        level: &mut Level,
        predecessor: Option<&ComponentId>,
        component: &ComponentId,
    ) -> Result<(), ChainError> {
        if !self.contains(component) {
            return Err(ChainError::ComponentNotFound(component.clone()));
        }
        if level.component_ids.contains(component) {
            return Err(ChainError::AlreadyInChain {
                level: level.id.clone(),
                component: component.clone(),
            });
        }
        let position = insert_position(level, predecessor)?;
        level.component_ids.insert(position, component.clone());
        Ok(())
    }

    /// Swap with the previous entry. Returns false at the head.
    pub fn move_up(&self, level: &mut Level, component: &ComponentId) -> Result<bool, ChainError> {
        move_in(level, component, Direction::Up)
    }

    /// Swap with the following entry. Returns false at the tail.
    pub fn move_down(&self, level: &mut Level, component: &ComponentId) -> Result<bool, ChainError> {
        move_in(level, component, Direction::Down)
    }

    /// Swap with the neighbour in `direction`. Returns false at the boundary.
    pub fn move_in_chain(
        &self,
        level: &mut Level,
        component: &ComponentId,
        direction: Direction,
    ) -> Result<bool, ChainError> {
        move_in(level, component, direction)
    }

    /// Detach from one level's chain. The component stays in the arena.
    pub fn remove(&self, level: &mut Level, component: &ComponentId) -> Result<(), ChainError> {
        let position = chain_position(level, component)?;
        level.component_ids.remove(position);
        Ok(())
    }

    /// Drop a component from the arena and from every level's chain.
    pub fn delete<'a>(
        &mut self,
        component: &ComponentId,
        levels: impl IntoIterator<Item = &'a mut Level>,
    ) -> Result<PromptComponent, ChainError> {
        let removed = self
            .components
            .remove(component)
            .ok_or_else(|| ChainError::ComponentNotFound(component.clone()))?;
        self.library.retain(|id| id != component);
        for level in levels {
            level.component_ids.retain(|id| id != component);
        }
        Ok(removed)
    }

    pub fn update_text(
        &mut self,
        component: &ComponentId,
        text: impl Into<String>,
    ) -> Result<(), ChainError> {
        let entry = self
            .components
            .get_mut(component)
            .ok_or_else(|| ChainError::ComponentNotFound(component.clone()))?;
        entry.text = text.into();
        Ok(())
    }

    /// Move a component one step in the library order. Returns false at
    /// the boundary.
    pub fn move_in_library(
        &mut self,
        component: &ComponentId,
        direction: Direction,
    ) -> Result<bool, ChainError> {
        let position = self
            .library
            .iter()
            .position(|id| id == component)
            .ok_or_else(|| ChainError::ComponentNotFound(component.clone()))?;
        Ok(swap_neighbor(&mut self.library, position, direction))
    }

    /// Assemble the level's prompt: component texts in chain order, joined
    /// by a single space, with known tokens substituted.
    pub fn render(&self, level: &Level, substitutions: &Substitutions) -> String {
        level
            .component_ids
            .iter()
            .filter_map(|id| {
                let component = self.components.get(id);
                if component.is_none() {
                    debug!(level = %level.id, component = %id, "skipping missing prompt component");
                }
                component
            })
            .map(|component| render_template(&component.text, substitutions))
            .collect::<Vec<_>>()
            .join(JOIN)
    }
}

pub(crate) fn insert_position(level: &Level, predecessor: Option<&ComponentId>) -> Result<usize, ChainError> {
    match predecessor {
        None => Ok(0),
        Some(predecessor) => level
            .component_ids
            .iter()
            .position(|id| id == predecessor)
            .map(|index| index + 1)
            .ok_or_else(|| ChainError::PredecessorNotFound {
                level: level.id.clone(),
                predecessor: predecessor.clone(),
            }),
    }
}

fn chain_position(level: &Level, component: &ComponentId) -> Result<usize, ChainError> {
    level
        .component_ids
        .iter()
        .position(|id| id == component)
        .ok_or_else(|| ChainError::NotInChain {
            level: level.id.clone(),
            component: component.clone(),
        })
}

fn move_in(level: &mut Level, component: &ComponentId, direction: Direction) -> Result<bool, ChainError> {
    let position = chain_position(level, component)?;
    Ok(swap_neighbor(&mut level.component_ids, position, direction))
}

fn swap_neighbor<T>(items: &mut [T], position: usize, direction: Direction) -> bool {
    let neighbor = match direction {
        Direction::Up => position.checked_sub(1),
        Direction::Down => Some(position + 1).filter(|&n| n < items.len()),
    };
    match neighbor {
        Some(neighbor) => {
            items.swap(position, neighbor);
            true
        }
        None => false,
    }
}
