//! Levels and the partial edits the admin surface applies to them.

use crate::graph::GraphError;
use crate::id::{normalize_ids, ComponentId, LevelId};
use jailbreak_api::{AdminLevel, LevelPatchBody, PublicLevel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Difficulty tier of a level, in progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Low,
    Medium,
    High,
}

impl Difficulty {
    /// All tiers in the fixed order `[Low, Medium, High]`.
    pub const ALL: [Difficulty; 3] = [Difficulty::Low, Difficulty::Medium, Difficulty::High];

    pub fn name(&self) -> &'static str {
        match self {
            Difficulty::Low => "Low",
            Difficulty::Medium => "Medium",
            Difficulty::High => "High",
        }
    }

    /// Tiers strictly after this one, nearest first.
    pub fn tiers_after(self) -> impl Iterator<Item = Difficulty> {
        Self::ALL.into_iter().filter(move |tier| *tier > self)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Difficulty {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Difficulty::Low),
            "medium" => Ok(Difficulty::Medium),
            "high" => Ok(Difficulty::High),
            _ => Err(GraphError::UnknownDifficulty(s.to_string())),
        }
    }
}

/// A node in the progression graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub id: LevelId,
    pub name: String,
    /// The secret. Only present on levels loaded through the admin path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub is_root: bool,
    /// Levels reachable immediately after solving this one.
    #[serde(default)]
    pub next: Vec<LevelId>,
    /// Ordered prompt chain of this level. No duplicates.
    #[serde(default)]
    pub component_ids: Vec<ComponentId>,
}

impl Level {
    pub fn new(id: impl Into<LevelId>, name: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            password: None,
            difficulty,
            is_root: false,
            next: Vec::new(),
            component_ids: Vec::new(),
        }
    }

    pub fn as_root(mut self) -> Self {
        self.is_root = true;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_next<I, T>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<LevelId>,
    {
        self.next = next.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_components<I, T>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ComponentId>,
    {
        self.component_ids = components.into_iter().map(Into::into).collect();
        self
    }

    /// Build a level from the player listing. Carries no secret and no chain.
    pub fn from_public(raw: PublicLevel) -> Result<Self, GraphError> {
        Ok(Self {
            id: LevelId::from_wire(raw.id)?,
            name: raw.name,
            password: None,
            difficulty: raw.difficulty.parse()?,
            is_root: raw.is_root,
            next: normalize_ids(raw.next, LevelId::from_wire)?,
            component_ids: Vec::new(),
        })
    }

    /// Build a level from the admin listing.
    pub fn from_admin(raw: AdminLevel) -> Result<Self, GraphError> {
        Ok(Self {
            id: LevelId::from_wire(raw.level_id)?,
            name: raw.name,
            password: Some(raw.password),
            difficulty: raw.difficulty.parse()?,
            is_root: raw.is_root,
            next: normalize_ids(raw.next, LevelId::from_wire)?,
            component_ids: normalize_ids(raw.prompt_components, ComponentId::from_wire)?,
        })
    }

    /// Apply every field the patch sets.
    pub fn apply(&mut self, patch: &LevelPatch) {
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(ref password) = patch.password {
            self.password = Some(password.clone());
        }
        if let Some(difficulty) = patch.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(is_root) = patch.is_root {
            self.is_root = is_root;
        }
        if let Some(ref next) = patch.next {
            self.next = next.clone();
        }
        if let Some(ref components) = patch.component_ids {
            self.component_ids = components.clone();
        }
    }
}

/// A partial level update. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelPatch {
    pub name: Option<String>,
    pub password: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub is_root: Option<bool>,
    pub next: Option<Vec<LevelId>>,
    pub component_ids: Option<Vec<ComponentId>>,
}

impl LevelPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn root(mut self, is_root: bool) -> Self {
        self.is_root = Some(is_root);
        self
    }

    pub fn next<I, T>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<LevelId>,
    {
        self.next = Some(next.into_iter().map(Into::into).collect());
        self
    }

    pub fn components<I, T>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ComponentId>,
    {
        self.component_ids = Some(components.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layer `later` on top of this patch; fields set in `later` win.
    pub fn merge(&mut self, later: LevelPatch) {
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.password.is_some() {
            self.password = later.password;
        }
        if later.difficulty.is_some() {
            self.difficulty = later.difficulty;
        }
        if later.is_root.is_some() {
            self.is_root = later.is_root;
        }
        if later.next.is_some() {
            self.next = later.next;
        }
        if later.component_ids.is_some() {
            self.component_ids = later.component_ids;
        }
    }

    /// Convert to the PATCH request body.
    pub fn to_body(&self) -> LevelPatchBody {
        LevelPatchBody {
            name: self.name.clone(),
            password: self.password.clone(),
            difficulty: self.difficulty.map(|d| d.name().to_string()),
            prompt_components: self
                .component_ids
                .as_ref()
                .map(|ids| ids.iter().map(ComponentId::to_wire).collect()),
            is_root: self.is_root,
            next: self
                .next
                .as_ref()
                .map(|ids| ids.iter().map(LevelId::to_wire).collect()),
        }
    }
}
