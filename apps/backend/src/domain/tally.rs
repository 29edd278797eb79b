//! Tallies, night resolution and the win check.
//!
//! Everything here is pure: the resolver feeds in the drained submission
//! aggregates and a random source, and applies the returned outcome.

use std::collections::BTreeMap;
use std::str::FromStr;

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::roles::{Role, Team};
use crate::domain::session::Session;
use crate::errors::domain::{DomainError, ValidationKind};

/// One submission set: actor id -> target id (or final-vote choice).
pub type Aggregate = BTreeMap<String, String>;

/// Count how many times each target was named.
pub fn count_targets<'a, I>(targets: I) -> BTreeMap<&'a str, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = BTreeMap::new();
    for target in targets {
        *counts.entry(target).or_insert(0) += 1;
    }
    counts
}

/// All targets sharing the highest count, in key order.
pub fn top_candidates<'a>(counts: &BTreeMap<&'a str, usize>) -> Vec<&'a str> {
    let Some(max) = counts.values().copied().max() else {
        return Vec::new();
    };
    counts
        .iter()
        .filter(|(_, n)| **n == max)
        .map(|(target, _)| *target)
        .collect()
}

/// The top target only if no other target ties it.
pub fn unique_top(counts: &BTreeMap<&str, usize>) -> Option<String> {
    match top_candidates(counts).as_slice() {
        [only] => Some((*only).to_string()),
        _ => None,
    }
}

/// The top target, ties broken uniformly at random among the tied.
pub fn pick_top<R: Rng + ?Sized>(counts: &BTreeMap<&str, usize>, rng: &mut R) -> Option<String> {
    top_candidates(counts)
        .choose(rng)
        .map(|target| (*target).to_string())
}

/// A final-vote ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalChoice {
    Agree,
    Disagree,
}

impl FinalChoice {
    pub const fn as_str(self) -> &'static str {
        match self {
            FinalChoice::Agree => "AGREE",
            FinalChoice::Disagree => "DISAGREE",
        }
    }
}

impl FromStr for FinalChoice {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AGREE" => Ok(FinalChoice::Agree),
            "DISAGREE" => Ok(FinalChoice::Disagree),
            _ => Err(DomainError::validation(
                ValidationKind::InvalidChoice,
                format!("final vote must be AGREE or DISAGREE, got '{s}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalTally {
    pub agree: usize,
    pub disagree: usize,
}

impl FinalTally {
    /// Strict majority of cast ballots. No ballots, or a tie, spares the defendant.
    pub fn eliminates(&self) -> bool {
        self.agree > self.disagree
    }
}

pub fn tally_final_votes(ballots: &Aggregate) -> FinalTally {
    ballots
        .values()
        .filter_map(|raw| raw.parse::<FinalChoice>().ok())
        .fold(FinalTally::default(), |mut tally, choice| {
            match choice {
                FinalChoice::Agree => tally.agree += 1,
                FinalChoice::Disagree => tally.disagree += 1,
            }
            tally
        })
}

/// What the night did, before it is applied to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightOutcome {
    pub mafia_target: Option<String>,
    pub protected: Option<String>,
    pub killed: Option<String>,
}

/// Resolve the night's actions against the session as it stands.
///
/// Only actions from alive actors still holding the acting role count, and
/// only alive targets. A kill on the protected player is negated.
pub fn resolve_night<R: Rng + ?Sized>(
    session: &Session,
    actions: &Aggregate,
    rng: &mut R,
) -> NightOutcome {
    let valid = |actor: &str, target: &str, role: Role| {
        session
            .player(actor)
            .is_some_and(|p| p.alive && p.has_role(role))
            && session.is_alive(target)
    };

    let mafia_votes = count_targets(
        actions
            .iter()
            .filter(|(actor, target)| valid(actor, target, Role::Mafia))
            .map(|(_, target)| target.as_str()),
    );
    let mafia_target = pick_top(&mafia_votes, rng);

    // at most one doctor is seated; the first valid action wins if more are
    let protected = actions
        .iter()
        .find(|(actor, target)| valid(actor, target, Role::Doctor))
        .map(|(_, target)| target.clone());

    let killed = match (&mafia_target, &protected) {
        (Some(target), Some(saved)) if target == saved => None,
        (target, _) => target.clone(),
    };

    NightOutcome {
        mafia_target,
        protected,
        killed,
    }
}

/// `Some(team)` once one side has won.
pub fn check_winner(session: &Session) -> Option<Team> {
    let (mafia, citizens) = session.alive_counts();
    if mafia == 0 {
        Some(Team::Citizen)
    } else if mafia >= citizens {
        Some(Team::Mafia)
    } else {
        None
    }
}
