//! Player game session management.
//!
//! A `GameSession` ties the level graph, the player's unlock state and the
//! chat transport together. Password attempts are split into a ticket and
//! a resolution so a verdict that arrives after the player switched levels
//! is dropped instead of applied.

use crate::backend::GameBackend;
use crate::error::ErrorKind;
use crate::graph::{GraphError, LevelGraph};
use crate::id::LevelId;
use crate::level::{Difficulty, Level};
use crate::progression::{self, Advance, Route, ValidationResult};
use crate::session_id::SessionId;
use crate::storage::KeyValueStore;
use crate::unlock::{UnlockState, UnlockStateStore};
use crate::Error;
use jailbreak_api::ChatRequest;
use tracing::{debug, info, warn};

/// In-character text shown when the chat transport fails.
pub const MALFUNCTION_TEXT: &str =
    "SYSTEM MALFUNCTION. CONNECTION TO GATEKEEPER LOST. RETRY TRANSMISSION.";

/// Configuration for starting a game session.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Key the unlock state is stored under.
    pub player_key: String,

    /// Name sent to the gatekeeper. Defaults to the player key.
    pub username: Option<String>,

    /// Level to resume on, if unlocked.
    pub start_level: Option<LevelId>,
}

impl GameConfig {
    pub fn new(player_key: impl Into<String>) -> Self {
        Self {
            player_key: player_key.into(),
            username: None,
            start_level: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_start_level(mut self, level: impl Into<LevelId>) -> Self {
        self.start_level = Some(level.into());
        self
    }

    fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.player_key)
    }
}

/// One row of the level selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelEntry {
    pub id: LevelId,
    pub name: String,
    pub difficulty: Difficulty,
    pub unlocked: bool,
    pub current: bool,
}

/// Proof of which level an attempt was made against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTicket {
    level: LevelId,
    generation: u64,
}

impl AttemptTicket {
    pub fn level(&self) -> &LevelId {
        &self.level
    }
}

/// What a password attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Wrong password. Nothing changed; the player may retry.
    Denied { level: LevelId },
    /// Correct password; the player moved on.
    Advanced {
        from: LevelId,
        to: LevelId,
        route: Route,
        unlocked: Vec<LevelId>,
    },
    /// Correct password on a level with nothing after it.
    Completed { level: LevelId },
    /// The player changed level before the verdict arrived.
    Stale { level: LevelId },
}

impl AttemptOutcome {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            AttemptOutcome::Denied { .. } => Some(ErrorKind::ValidationFailed),
            _ => None,
        }
    }
}

/// A gatekeeper reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    /// True when the transport failed and `text` is the stand-in message.
    pub malfunction: bool,
}

/// A player's game.
pub struct GameSession<B, S> {
    backend: B,
    unlocks: UnlockStateStore<S>,
    graph: LevelGraph,
    state: UnlockState,
    config: GameConfig,
    session_id: SessionId,
    generation: u64,
}

impl<B: GameBackend, S: KeyValueStore> GameSession<B, S> {
    /// Load the graph and the player's progress.
    ///
    /// Fails with `GraphEmpty` when the authority has no levels. Storage
    /// problems only degrade progress to the root level.
    pub async fn start(backend: B, store: S, config: GameConfig) -> Result<Self, Error> {
        let graph = LevelGraph::load(&backend).await?;
        for issue in graph.diagnostics() {
            warn!(?issue, "level graph issue");
        }

        let root = graph.root()?.id.clone();
        let unlocks = UnlockStateStore::new(store);
        let mut state = unlocks.load(&config.player_key, &root).await;

        if !graph.contains(state.current()) {
            warn!(level = %state.current(), "stored level no longer exists, using root");
            state.set_current(root.clone());
        }
        if let Some(ref start) = config.start_level {
            if !graph.contains(start) || !state.set_current(start.clone()) {
                warn!(level = %start, "requested start level is unavailable");
            }
        }

        let session_id = SessionId::generate(&config.player_key, state.current().as_str());
        info!(player = %config.player_key, level = %state.current(), "game started");

        Ok(Self {
            backend,
            unlocks,
            graph,
            state,
            config,
            session_id,
            generation: 0,
        })
    }

    pub fn graph(&self) -> &LevelGraph {
        &self.graph
    }

    pub fn state(&self) -> &UnlockState {
        &self.state
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn current_level(&self) -> Result<&Level, GraphError> {
        self.graph.by_id(self.state.current())
    }

    pub fn is_unlocked(&self, id: &LevelId) -> bool {
        self.state.is_unlocked(id)
    }

    /// Every level in load order with its gate state.
    pub fn level_selector(&self) -> Vec<LevelEntry> {
        self.graph
            .levels()
            .iter()
            .map(|level| LevelEntry {
                id: level.id.clone(),
                name: level.name.clone(),
                difficulty: level.difficulty,
                unlocked: self.state.is_unlocked(&level.id),
                current: *self.state.current() == level.id,
            })
            .collect()
    }

    /// Switch to an unlocked level. Starts a new conversation.
    pub async fn enter_level(&mut self, id: &LevelId) -> Result<(), Error> {
        self.graph.by_id(id)?;
        if !self.state.set_current(id.clone()) {
            return Err(Error::LevelLocked(id.clone()));
        }
        self.on_level_changed().await;
        Ok(())
    }

    /// Capture the level an attempt is being made against.
    pub fn begin_attempt(&self) -> AttemptTicket {
        AttemptTicket {
            level: self.state.current().clone(),
            generation: self.generation,
        }
    }

    /// Apply a verdict, unless the level changed since `ticket` was taken.
    pub async fn resolve_attempt(
        &mut self,
        ticket: AttemptTicket,
        result: ValidationResult,
    ) -> AttemptOutcome {
        if ticket.generation != self.generation || ticket.level != *self.state.current() {
            warn!(level = %ticket.level, "discarding stale validation response");
            return AttemptOutcome::Stale {
                level: ticket.level,
            };
        }

        if !result.correct {
            debug!(level = %ticket.level, "password denied");
            return AttemptOutcome::Denied {
                level: ticket.level,
            };
        }

        let Some(level) = self.graph.get(&ticket.level).cloned() else {
            return AttemptOutcome::Stale {
                level: ticket.level,
            };
        };

        match progression::advance(&self.graph, &level, &mut self.state) {
            Advance::Next {
                target,
                route,
                unlocked,
            } => {
                // Merge the whole set so earlier failed writes catch up.
                if let Err(e) = self
                    .unlocks
                    .merge(&self.config.player_key, self.state.unlocked().iter().cloned())
                    .await
                {
                    warn!(error = %e, "failed to persist unlocks, progress kept for this session");
                }
                self.on_level_changed().await;
                info!(from = %level.id, to = %target, ?route, "level unlocked");

                AttemptOutcome::Advanced {
                    from: level.id,
                    to: target,
                    route,
                    unlocked,
                }
            }
            Advance::Completed => AttemptOutcome::Completed { level: level.id },
        }
    }

    /// Validate `candidate` against the current level and apply the result.
    pub async fn submit_password(&mut self, candidate: &str) -> Result<AttemptOutcome, Error> {
        if candidate.trim().is_empty() {
            return Err(Error::Invalid("password is empty".into()));
        }
        let ticket = self.begin_attempt();
        let result = progression::validate(&self.backend, &ticket.level, candidate).await?;
        Ok(self.resolve_attempt(ticket, result).await)
    }

    /// Send a message to the current level's gatekeeper.
    ///
    /// Transport failures come back as an in-character malfunction reply.
    pub async fn chat(&self, message: &str) -> ChatReply {
        let request = ChatRequest::new(message, self.config.username());
        match self
            .backend
            .chat(self.state.current(), &self.session_id, &request)
            .await
        {
            Ok(text) => ChatReply {
                text,
                malfunction: false,
            },
            Err(e) => {
                warn!(error = %e, level = %self.state.current(), "chat transport failed");
                ChatReply {
                    text: MALFUNCTION_TEXT.to_string(),
                    malfunction: true,
                }
            }
        }
    }

    async fn on_level_changed(&mut self) {
        self.generation += 1;
        self.session_id =
            SessionId::generate(&self.config.player_key, self.state.current().as_str());
        if let Err(e) = self
            .unlocks
            .save_current(&self.config.player_key, self.state.current())
            .await
        {
            warn!(error = %e, "failed to persist current level");
        }
    }
}
