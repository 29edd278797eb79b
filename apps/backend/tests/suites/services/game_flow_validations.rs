// Integration tests for submission and lifecycle validation.
//
// Every rejection must leave the session and its aggregates untouched.

use mafia_backend::domain::{Phase, Player, RoleOptions, SubmissionKind};
use mafia_backend::{AppError, ErrorCode};

use crate::support::game_setup::{setup_game, setup_game_in, GameSetupOptions};

// ============================================================================
// Submission rules
// ============================================================================

#[tokio::test]
async fn test_vote_outside_voting_is_phase_mismatch() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    let err = setup
        .manager
        .submit_vote(&setup.game_id, setup.player(0), setup.player(1))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PhaseMismatch);
    assert!(err.is_validation());
    assert!(!err.is_retryable());
    assert!(setup
        .manager
        .submissions(&setup.game_id, SubmissionKind::Vote)
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_night_action_by_citizen_is_ineligible() -> Result<(), AppError> {
    let setup = setup_game_in(Phase::NightAction).await?;
    let err = setup
        .manager
        .submit_night_action(&setup.game_id, setup.player(3), setup.player(0))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::IneligibleRole);
    assert!(setup
        .manager
        .submissions(&setup.game_id, SubmissionKind::NightAction)
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_dead_players_cannot_act_or_be_targeted() -> Result<(), AppError> {
    let setup = setup_game_in(Phase::NightAction).await?;
    setup
        .manager
        .submit_night_action(&setup.game_id, setup.player(0), setup.player(5))
        .await?;
    setup.advance_to(Phase::DayVoting).await?;
    assert!(!setup.session().await?.is_alive(setup.player(5)));

    let err = setup
        .manager
        .submit_vote(&setup.game_id, setup.player(5), setup.player(0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ActorDead);

    let err = setup
        .manager
        .submit_vote(&setup.game_id, setup.player(1), setup.player(5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTarget);
    Ok(())
}

#[tokio::test]
async fn test_defendant_cannot_cast_a_final_vote() -> Result<(), AppError> {
    let setup = setup_game_in(Phase::DayVoting).await?;
    for voter in [0, 1, 2, 4] {
        setup
            .manager
            .submit_vote(&setup.game_id, setup.player(voter), setup.player(3))
            .await?;
    }
    setup.advance_to(Phase::DayFinalVoting).await?;

    let err = setup
        .manager
        .submit_final_vote(&setup.game_id, setup.player(3), "DISAGREE")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DefendantCannotVote);

    let err = setup
        .manager
        .submit_final_vote(&setup.game_id, setup.player(0), "maybe")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidChoice);
    Ok(())
}

#[tokio::test]
async fn test_unknown_game_and_player() -> Result<(), AppError> {
    let setup = setup_game_in(Phase::DayVoting).await?;

    let err = setup
        .manager
        .submit_vote("no-such-game", setup.player(0), setup.player(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GameNotFound);

    let err = setup
        .manager
        .submit_vote(&setup.game_id, "stranger", setup.player(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PlayerNotFound);
    Ok(())
}

// ============================================================================
// Lifecycle rules
// ============================================================================

#[tokio::test]
async fn test_start_game_only_from_waiting() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    let err = setup
        .manager
        .start_game(&setup.game_id, &RoleOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidStatus);
    Ok(())
}

#[tokio::test]
async fn test_create_session_rejects_bad_rosters() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;

    let few = (0..3).map(|i| Player::new(format!("p{i}"), "x")).collect();
    let err = setup
        .manager
        .create_session("small-table", "room", few)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidPlayers);

    let dupes = ["a", "b", "c", "a"]
        .iter()
        .map(|id| Player::new(*id, "x"))
        .collect();
    let err = setup
        .manager
        .create_session("dupes", "room", dupes)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidPlayers);

    let again = (0..4).map(|i| Player::new(format!("p{i}"), "x")).collect();
    let err = setup
        .manager
        .create_session(&setup.game_id, "room", again)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GameExists);
    Ok(())
}

#[tokio::test]
async fn test_extension_is_once_per_player_per_day() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    let before = setup.session().await?.phase_ends_at.expect("deadline");

    let extended = setup
        .manager
        .extend_discussion(&setup.game_id, setup.player(2))
        .await?;
    assert_eq!(extended - before, time::Duration::seconds(15));

    let err = setup
        .manager
        .extend_discussion(&setup.game_id, setup.player(2))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ExtensionUsed);

    // someone else still may
    setup
        .manager
        .extend_discussion(&setup.game_id, setup.player(3))
        .await?;
    assert_eq!(setup.broadcaster.room_events_of("discussion_extended").len(), 2);

    setup.advance().await?;
    let err = setup
        .manager
        .extend_discussion(&setup.game_id, setup.player(4))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PhaseMismatch);
    Ok(())
}

#[tokio::test]
async fn test_extension_usage_resets_next_day() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    setup
        .manager
        .extend_discussion(&setup.game_id, setup.player(2))
        .await?;

    setup.advance_to(Phase::NightAction).await?;
    setup.advance_to(Phase::DayDiscussion).await?;
    let session = setup.session().await?;
    assert_eq!(session.day, 2);
    assert!(session.extensions_used.is_empty());

    setup
        .manager
        .extend_discussion(&setup.game_id, setup.player(2))
        .await?;
    Ok(())
}
