//! Submission eligibility rules.

use crate::domain::phase::{Phase, SubmissionKind};
use crate::domain::roles::Role;
use crate::domain::session::{Player, Session, Status};
use crate::domain::tally::FinalChoice;
use crate::errors::domain::{DomainError, NotFoundKind, ValidationKind};

fn require_phase(session: &Session, kind: SubmissionKind) -> Result<(), DomainError> {
    match session.status {
        Status::Ended => {
            return Err(DomainError::validation(
                ValidationKind::GameEnded,
                format!("game {} has ended", session.game_id),
            ))
        }
        Status::Waiting => {
            return Err(DomainError::validation(
                ValidationKind::InvalidStatus,
                format!("game {} has not started", session.game_id),
            ))
        }
        Status::InProgress => {}
    }
    let expected = kind.phase();
    if session.phase != expected {
        return Err(DomainError::validation(
            ValidationKind::PhaseMismatch,
            format!(
                "{} requires {} but game is in {}",
                kind.as_str(),
                expected.as_str(),
                session.phase.as_str()
            ),
        ));
    }
    Ok(())
}

fn require_alive_actor<'a>(
    session: &'a Session,
    actor_id: &str,
) -> Result<&'a Player, DomainError> {
    let actor = session.player(actor_id).ok_or_else(|| {
        DomainError::not_found(
            NotFoundKind::Player,
            format!("player {actor_id} is not in game {}", session.game_id),
        )
    })?;
    if !actor.alive {
        return Err(DomainError::validation(
            ValidationKind::ActorDead,
            format!("player {actor_id} is dead"),
        ));
    }
    Ok(actor)
}

fn require_alive_target(session: &Session, target_id: &str) -> Result<(), DomainError> {
    if session.is_alive(target_id) {
        Ok(())
    } else {
        Err(DomainError::validation(
            ValidationKind::InvalidTarget,
            format!("{target_id} is not an alive player of game {}", session.game_id),
        ))
    }
}

/// Day vote. Self-votes are allowed.
pub fn validate_vote(
    session: &Session,
    voter_id: &str,
    target_id: &str,
) -> Result<(), DomainError> {
    require_phase(session, SubmissionKind::Vote)?;
    require_alive_actor(session, voter_id)?;
    require_alive_target(session, target_id)
}

/// Final vote on the defendant; the defendant has no say.
pub fn validate_final_vote(
    session: &Session,
    voter_id: &str,
    choice: &str,
) -> Result<FinalChoice, DomainError> {
    require_phase(session, SubmissionKind::FinalVote)?;
    require_alive_actor(session, voter_id)?;
    if session.defendant.as_deref() == Some(voter_id) {
        return Err(DomainError::validation(
            ValidationKind::DefendantCannotVote,
            format!("{voter_id} is on trial"),
        ));
    }
    choice.parse()
}

/// Night action; returns the actor's role.
pub fn validate_night_action(
    session: &Session,
    actor_id: &str,
    target_id: &str,
) -> Result<Role, DomainError> {
    require_phase(session, SubmissionKind::NightAction)?;
    let actor = require_alive_actor(session, actor_id)?;
    let role = actor
        .role
        .filter(|role| role.acts_at_night())
        .ok_or_else(|| {
            DomainError::validation(
                ValidationKind::IneligibleRole,
                format!("{actor_id} has no night action"),
            )
        })?;
    require_alive_target(session, target_id)?;
    Ok(role)
}

/// Discussion extension: alive players, once per day, during discussion.
pub fn validate_extension(session: &Session, player_id: &str) -> Result<(), DomainError> {
    if session.status != Status::InProgress || session.phase != Phase::DayDiscussion {
        return Err(DomainError::validation(
            ValidationKind::PhaseMismatch,
            "discussion can only be extended during DAY_DISCUSSION",
        ));
    }
    require_alive_actor(session, player_id)?;
    if session.extensions_used.contains(player_id) {
        return Err(DomainError::validation(
            ValidationKind::ExtensionUsed,
            format!("{player_id} already extended today's discussion"),
        ));
    }
    Ok(())
}
