//! QA tests for the player flow against an in-memory authority.
//!
//! These tests walk a player through the level graph:
//! - Wrong and correct password submissions
//! - Explicit edges and the difficulty fallback
//! - Level selector gating and re-entry
//!
//! Run with: `cargo test -p jailbreak-core --test qa_player_flow`

use jailbreak_core::testing::{assert_locked, assert_unlocked};
use jailbreak_core::{
    AttemptOutcome, Difficulty, ErrorKind, GameConfig, GameSession, Level, LevelId, MemoryStore,
    MockAuthority, Route,
};
use std::sync::Arc;

fn tiered_authority() -> MockAuthority {
    MockAuthority::new()
        .with_level(Level::new("1", "Low", Difficulty::Low).with_password("alpha"))
        .with_level(Level::new("2", "Medium", Difficulty::Medium).with_password("beta"))
        .with_level(Level::new("3", "High", Difficulty::High).with_password("gamma"))
}

// =============================================================================
// SCENARIO: alice1234 on level1
// =============================================================================

#[tokio::test]
async fn test_alice_wrong_then_correct_password() {
    let authority = Arc::new(MockAuthority::sample());
    let mut game = GameSession::start(
        authority.clone(),
        MemoryStore::new(),
        GameConfig::new("alice1234"),
    )
    .await
    .expect("game should start");

    assert_eq!(game.state().current(), &LevelId::new("level1"));

    // Wrong password: nothing moves.
    let before = game.state().clone();
    let outcome = game.submit_password("guess").await.unwrap();
    assert!(matches!(outcome, AttemptOutcome::Denied { .. }));
    assert_eq!(outcome.error_kind(), Some(ErrorKind::ValidationFailed));
    assert_eq!(game.state(), &before);

    // Retrying is always allowed.
    for attempt in ["nope", "still nope", "1234"] {
        let outcome = game.submit_password(attempt).await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Denied { .. }));
    }

    // Correct password: level1.next is unlocked and becomes current.
    let outcome = game.submit_password("opensesame").await.unwrap();
    match outcome {
        AttemptOutcome::Advanced {
            from,
            to,
            route,
            unlocked,
        } => {
            assert_eq!(from, LevelId::new("level1"));
            assert_eq!(to, LevelId::new("level2"));
            assert_eq!(route, Route::Explicit);
            assert_eq!(unlocked, vec![LevelId::new("level2")]);
        }
        other => panic!("expected an advance, got {other:?}"),
    }
    assert_eq!(game.state().current(), &LevelId::new("level2"));
    assert_unlocked(game.state(), &["level1", "level2"]);
    assert_locked(game.state(), &["level3"]);

    assert_eq!(authority.validations().await.len(), 5);
}

// =============================================================================
// DIFFICULTY FALLBACK
// =============================================================================

#[tokio::test]
async fn test_fallback_walks_tiers_to_completion() {
    let mut game = GameSession::start(tiered_authority(), MemoryStore::new(), GameConfig::new("bob"))
        .await
        .unwrap();

    let outcome = game.submit_password("alpha").await.unwrap();
    assert!(matches!(
        outcome,
        AttemptOutcome::Advanced { ref to, route: Route::DifficultyFallback, .. } if *to == LevelId::new("2")
    ));

    let outcome = game.submit_password("beta").await.unwrap();
    assert!(matches!(outcome, AttemptOutcome::Advanced { ref to, .. } if *to == LevelId::new("3")));

    let before = game.state().clone();
    let outcome = game.submit_password("gamma").await.unwrap();
    assert_eq!(
        outcome,
        AttemptOutcome::Completed {
            level: LevelId::new("3")
        }
    );
    assert_eq!(game.state(), &before);
}

#[tokio::test]
async fn test_duplicate_submission_is_idempotent() {
    let mut game = GameSession::start(tiered_authority(), MemoryStore::new(), GameConfig::new("bob"))
        .await
        .unwrap();

    game.submit_password("alpha").await.unwrap();
    game.enter_level(&LevelId::new("1")).await.unwrap();
    let snapshot = game.state().unlocked().clone();

    let outcome = game.submit_password("alpha").await.unwrap();
    assert!(matches!(outcome, AttemptOutcome::Advanced { ref unlocked, .. } if unlocked.is_empty()));
    assert_eq!(game.state().unlocked(), &snapshot);
}

// =============================================================================
// LEVEL SELECTOR
// =============================================================================

#[tokio::test]
async fn test_selector_gates_levels() {
    let mut game = GameSession::start(
        MockAuthority::sample(),
        MemoryStore::new(),
        GameConfig::new("carol"),
    )
    .await
    .unwrap();

    let unlocked: Vec<bool> = game.level_selector().iter().map(|e| e.unlocked).collect();
    assert_eq!(unlocked, vec![true, false, false]);

    let err = game.enter_level(&LevelId::new("level2")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    game.submit_password("opensesame").await.unwrap();
    let first_entry = game.session_id().clone();
    game.enter_level(&LevelId::new("level1")).await.unwrap();
    assert_ne!(game.session_id(), &first_entry);

    let current: Vec<bool> = game.level_selector().iter().map(|e| e.current).collect();
    assert_eq!(current, vec![true, false, false]);
}

#[tokio::test]
async fn test_transport_failure_on_validate_is_recoverable() {
    let authority = Arc::new(MockAuthority::sample());
    let mut game = GameSession::start(authority.clone(), MemoryStore::new(), GameConfig::new("dave"))
        .await
        .unwrap();

    authority.set_offline(true).await;
    let err = game.submit_password("opensesame").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportError);
    assert!(err.is_recoverable());
    assert_locked(game.state(), &["level2"]);

    authority.set_offline(false).await;
    let outcome = game.submit_password("opensesame").await.unwrap();
    assert!(matches!(outcome, AttemptOutcome::Advanced { .. }));
}
