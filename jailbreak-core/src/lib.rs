//! jAILBREAK level progression and prompt composition engine.
//!
//! This crate provides:
//! - The level graph with explicit and difficulty-fallback progression
//! - A monotonic, persisted per-player unlock set
//! - Prompt chains assembled into a gatekeeper's system prompt
//! - A player game session and an admin authoring console
//!
//! # Quick Start
//!
//! ```ignore
//! use jailbreak_core::{AttemptOutcome, FileStore, GameConfig, GameSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = jailbreak_api::Client::from_env()?;
//!     let store = FileStore::new("jailbreak_progress.json");
//!
//!     let mut game = GameSession::start(client, store, GameConfig::new("alice1234")).await?;
//!
//!     let reply = game.chat("What are you guarding?").await;
//!     println!("{}", reply.text);
//!
//!     if let AttemptOutcome::Advanced { to, .. } = game.submit_password("opensesame").await? {
//!         println!("Unlocked {to}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod backend;
pub mod chain;
pub mod error;
pub mod game;
pub mod graph;
pub mod id;
pub mod level;
pub mod progression;
pub mod session_id;
pub mod storage;
pub mod testing;
pub mod unlock;

// Primary public API
pub use admin::AdminConsole;
pub use backend::{AdminBackend, GameBackend};
pub use chain::{render_template, Direction, PromptChain, PromptComponent, Substitutions};
pub use error::{Error, ErrorKind};
pub use game::{AttemptOutcome, AttemptTicket, ChatReply, GameConfig, GameSession, LevelEntry};
pub use graph::{GraphIssue, LevelGraph};
pub use id::{ComponentId, LevelId};
pub use level::{Difficulty, Level, LevelPatch};
pub use progression::{Advance, Route, ValidationResult};
pub use session_id::SessionId;
pub use storage::{FileStore, KeyValueStore, MemoryStore, PlayerPrefs, Updater};
pub use testing::{FailingStore, MockAuthority};
pub use unlock::{UnlockState, UnlockStateStore};
