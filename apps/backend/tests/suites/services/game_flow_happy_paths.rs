// Integration tests for complete game days driven through force-advance.

use mafia_backend::broadcast::GameEvent;
use mafia_backend::domain::{Phase, Role, Status, SubmissionKind, Team};
use mafia_backend::{AdvanceOutcome, AppError, ErrorCode};

use crate::support::game_setup::{setup_game, setup_game_in, GameSetup, GameSetupOptions};

/// Every alive player except `target` votes for `target`, then the session
/// moves on to the final defense.
async fn put_on_trial(setup: &GameSetup, target: usize) -> Result<(), AppError> {
    setup.advance_to(Phase::DayVoting).await?;
    let session = setup.session().await?;
    let target_id = setup.player(target).to_string();
    for player in session.alive_players().filter(|p| p.id != target_id) {
        setup
            .manager
            .submit_vote(&setup.game_id, &player.id, &target_id)
            .await?;
    }
    let outcome = setup.advance().await?;
    assert!(matches!(
        outcome,
        AdvanceOutcome::Advanced { to, .. } if to.phase == Phase::DayFinalDefense
    ));
    Ok(())
}

/// Everyone but the defendant casts `choice`; returns the exit outcome.
async fn final_vote_all(setup: &GameSetup, choice: &str) -> Result<AdvanceOutcome, AppError> {
    setup.advance_to(Phase::DayFinalVoting).await?;
    let session = setup.session().await?;
    let defendant = session.defendant.clone();
    for player in session
        .alive_players()
        .filter(|p| Some(&p.id) != defendant.as_ref())
    {
        setup
            .manager
            .submit_final_vote(&setup.game_id, &player.id, choice)
            .await?;
    }
    setup.advance().await
}

#[tokio::test]
async fn test_start_game_opens_day_one_discussion() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    let session = setup.session().await?;

    assert_eq!(session.status, Status::InProgress);
    assert_eq!(session.phase, Phase::DayDiscussion);
    assert_eq!(session.day, 1);
    assert!(session.phase_ends_at.is_some());
    assert!(session.players.iter().all(|p| p.role.is_some() && p.alive));
    assert_eq!(
        setup.manager.pending_timer(&setup.game_id),
        Some(session.ticket())
    );

    let phase_changes = setup.broadcaster.room_events_of("phase_changed");
    assert_eq!(phase_changes.len(), 1);
    assert!(matches!(
        &phase_changes[0],
        GameEvent::PhaseChanged { day: 1, phase: Phase::DayDiscussion, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_full_day_eliminates_and_kills() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;

    put_on_trial(&setup, 3).await?;
    assert_eq!(
        setup.session().await?.defendant.as_deref(),
        Some(setup.player(3))
    );

    let outcome = final_vote_all(&setup, "AGREE").await?;
    assert!(matches!(
        outcome,
        AdvanceOutcome::Advanced { to, .. } if to.phase == Phase::NightAction
    ));
    let session = setup.session().await?;
    assert!(!session.is_alive(setup.player(3)));
    assert_eq!(session.defendant, None);

    // mafia (seat 0) goes for seat 4, doctor (seat 1) guards seat 5
    setup
        .manager
        .submit_night_action(&setup.game_id, setup.player(0), setup.player(4))
        .await?;
    setup
        .manager
        .submit_night_action(&setup.game_id, setup.player(1), setup.player(5))
        .await?;
    let outcome = setup.advance().await?;
    assert!(matches!(
        outcome,
        AdvanceOutcome::Advanced { to, .. } if to.phase == Phase::DayDiscussion && to.day == 2
    ));

    let session = setup.session().await?;
    assert!(!session.is_alive(setup.player(4)));
    assert!(session.is_alive(setup.player(5)));
    assert_eq!(session.status, Status::InProgress);

    let night = setup.broadcaster.room_events_of("night_result");
    assert_eq!(
        night,
        vec![GameEvent::NightResult {
            game_id: setup.game_id.clone(),
            day: 1,
            killed: Some(setup.player(4).to_string()),
        }]
    );
    Ok(())
}

#[tokio::test]
async fn test_doctor_protection_negates_the_kill() -> Result<(), AppError> {
    let setup = setup_game_in(Phase::NightAction).await?;
    setup
        .manager
        .submit_night_action(&setup.game_id, setup.player(0), setup.player(3))
        .await?;
    setup
        .manager
        .submit_night_action(&setup.game_id, setup.player(1), setup.player(3))
        .await?;
    setup.advance().await?;

    let session = setup.session().await?;
    assert!(session.is_alive(setup.player(3)));
    assert!(setup
        .broadcaster
        .room_events_of("night_result")
        .iter()
        .all(|e| matches!(e, GameEvent::NightResult { killed: None, .. })));
    Ok(())
}

#[tokio::test]
async fn test_police_result_is_private_and_immediate() -> Result<(), AppError> {
    let setup = setup_game_in(Phase::NightAction).await?;
    let police = setup.player(2);

    setup
        .manager
        .submit_night_action(&setup.game_id, police, setup.player(0))
        .await?;

    let private = setup.broadcaster.user_events(police);
    assert_eq!(private.len(), 1);
    match &private[0] {
        GameEvent::PoliceInvestigation {
            target_id,
            is_mafia,
            ..
        } => {
            assert_eq!(target_id, setup.player(0));
            assert!(is_mafia);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(setup
        .broadcaster
        .room_events_of("police_investigation")
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_tied_day_vote_goes_straight_to_night() -> Result<(), AppError> {
    let setup = setup_game_in(Phase::DayVoting).await?;
    let (a, b) = (setup.player(3).to_string(), setup.player(4).to_string());
    for (voter, target) in [(0, &a), (1, &a), (2, &b), (5, &b)] {
        setup
            .manager
            .submit_vote(&setup.game_id, setup.player(voter), target)
            .await?;
    }

    let outcome = setup.advance().await?;
    assert!(matches!(
        outcome,
        AdvanceOutcome::Advanced { to, .. } if to.phase == Phase::NightAction && to.day == 1
    ));
    let results = setup.broadcaster.room_events_of("vote_result");
    match &results[0] {
        GameEvent::VoteResult {
            counts, defendant, ..
        } => {
            assert_eq!(counts.get(&a), Some(&2));
            assert_eq!(counts.get(&b), Some(&2));
            assert_eq!(defendant, &None);
        }
        other => panic!("unexpected event {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_tied_final_vote_spares_the_defendant() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    put_on_trial(&setup, 3).await?;
    setup.advance_to(Phase::DayFinalVoting).await?;

    for (voter, choice) in [(0, "agree"), (1, "AGREE"), (2, "disagree"), (4, "Disagree")] {
        setup
            .manager
            .submit_final_vote(&setup.game_id, setup.player(voter), choice)
            .await?;
    }
    setup.advance().await?;

    assert!(setup.session().await?.is_alive(setup.player(3)));
    assert!(matches!(
        setup.broadcaster.room_events_of("final_vote_result").as_slice(),
        [GameEvent::FinalVoteResult { agree: 2, disagree: 2, eliminated: false, .. }]
    ));
    Ok(())
}

#[tokio::test]
async fn test_no_final_votes_means_no_elimination() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    put_on_trial(&setup, 3).await?;
    setup.advance_to(Phase::DayFinalVoting).await?;
    setup.advance().await?;

    let session = setup.session().await?;
    assert!(session.is_alive(setup.player(3)));
    assert_eq!(session.phase, Phase::NightAction);
    Ok(())
}

#[tokio::test]
async fn test_voting_out_the_mafia_ends_the_game() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    put_on_trial(&setup, 0).await?;

    let outcome = final_vote_all(&setup, "AGREE").await?;
    assert!(matches!(outcome, AdvanceOutcome::Ended { .. }));

    let session = setup.session().await?;
    assert_eq!(session.status, Status::Ended);
    assert_eq!(session.winner, Some(Team::Citizen));
    assert_eq!(session.phase_ends_at, None);
    assert_eq!(setup.manager.pending_timer(&setup.game_id), None);
    assert_eq!(
        setup.broadcaster.room_events().last(),
        Some(&GameEvent::GameEnded {
            game_id: setup.game_id.clone(),
            winner: Some(Team::Citizen),
        })
    );

    // terminal: no more submissions, no more transitions
    let err = setup
        .manager
        .submit_vote(&setup.game_id, setup.player(1), setup.player(2))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GameEnded);
    assert_eq!(
        setup
            .manager
            .force_advance(&setup.game_id, session.ticket())
            .await?,
        AdvanceOutcome::Stale
    );
    Ok(())
}

#[tokio::test]
async fn test_mafia_wins_at_parity() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default().with_roles(&[
        Role::Mafia,
        Role::Doctor,
        Role::Police,
        Role::Citizen,
    ]))
    .await?;

    put_on_trial(&setup, 3).await?;
    final_vote_all(&setup, "AGREE").await?;
    assert!(!setup.session().await?.is_alive(setup.player(3)));

    // one mafia against doctor + police; the doctor guards the wrong seat
    setup
        .manager
        .submit_night_action(&setup.game_id, setup.player(0), setup.player(1))
        .await?;
    setup
        .manager
        .submit_night_action(&setup.game_id, setup.player(1), setup.player(2))
        .await?;
    let outcome = setup.advance().await?;

    assert!(matches!(outcome, AdvanceOutcome::Ended { .. }));
    let session = setup.session().await?;
    assert_eq!(session.winner, Some(Team::Mafia));
    for kind in SubmissionKind::ALL {
        assert!(setup
            .manager
            .submissions(&setup.game_id, kind)
            .await?
            .is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_repeated_vote_overwrites() -> Result<(), AppError> {
    let setup = setup_game_in(Phase::DayVoting).await?;
    let voter = setup.player(5);
    setup
        .manager
        .submit_vote(&setup.game_id, voter, setup.player(3))
        .await?;
    setup
        .manager
        .submit_vote(&setup.game_id, voter, setup.player(4))
        .await?;

    let votes = setup
        .manager
        .submissions(&setup.game_id, SubmissionKind::Vote)
        .await?;
    assert_eq!(votes.len(), 1);
    assert_eq!(votes.get(voter).map(String::as_str), Some(setup.player(4)));
    Ok(())
}

#[tokio::test]
async fn test_vote_tally_records_last_vote() -> Result<(), AppError> {
    let setup = setup_game(GameSetupOptions::default()).await?;
    put_on_trial(&setup, 4).await?;

    let session = setup.session().await?;
    let voter = session.player(setup.player(0)).expect("seated");
    assert_eq!(voter.last_vote.as_deref(), Some(setup.player(4)));
    Ok(())
}
