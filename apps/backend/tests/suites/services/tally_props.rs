//! Property tests for tallies and the win check (pure domain, no stores).
//!
//! Properties tested:
//! - A day vote names a defendant only when one target leads outright
//! - The mafia pick is always among the leaders, and exists iff any vote does
//! - Final votes eliminate only on a strict AGREE majority
//! - The win check matches the alive head count

use std::collections::BTreeMap;

use mafia_backend::domain::tally::{
    check_winner, count_targets, pick_top, tally_final_votes, unique_top,
};
use mafia_backend::domain::{Aggregate, Phase, Player, Role, Session, Status, Team};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::common::proptest_prelude::proptest_prelude_config;

fn target_names(indices: &[u8]) -> Vec<String> {
    indices.iter().map(|i| format!("t{i}")).collect()
}

fn leaders(counts: &BTreeMap<&str, usize>) -> Vec<String> {
    let max = counts.values().copied().max().unwrap_or(0);
    counts
        .iter()
        .filter(|(_, n)| **n == max)
        .map(|(t, _)| t.to_string())
        .collect()
}

fn table(mafia: usize, citizens: usize, dead: usize) -> Session {
    let mut players = Vec::new();
    for i in 0..mafia {
        let mut p = Player::new(format!("m{i}"), "mafia");
        p.role = Some(Role::Mafia);
        players.push(p);
    }
    for i in 0..citizens + dead {
        let mut p = Player::new(format!("c{i}"), "citizen");
        p.role = Some(if i == 0 { Role::Doctor } else { Role::Citizen });
        p.alive = i >= dead;
        players.push(p);
    }
    let mut session = Session::new("g", "r", players);
    session.status = Status::InProgress;
    session.phase = Phase::NightAction;
    session.day = 1;
    session
}

proptest! {
    #![proptest_config(proptest_prelude_config())]

    /// Property: a defendant exists iff exactly one target has the top count
    #[test]
    fn prop_unique_top_requires_an_outright_leader(
        indices in prop::collection::vec(0u8..5, 0..12),
    ) {
        let names = target_names(&indices);
        let counts = count_targets(names.iter().map(String::as_str));
        let top = leaders(&counts);

        match unique_top(&counts) {
            Some(defendant) => {
                prop_assert_eq!(top.len(), 1);
                prop_assert_eq!(&defendant, &top[0]);
            }
            None => prop_assert!(top.len() != 1, "lone leader {:?} not chosen", top),
        }
    }

    /// Property: the mafia pick is a leader, and exists iff any vote was cast
    #[test]
    fn prop_pick_top_chooses_among_leaders(
        indices in prop::collection::vec(0u8..5, 0..12),
        seed in any::<u64>(),
    ) {
        let names = target_names(&indices);
        let counts = count_targets(names.iter().map(String::as_str));
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        match pick_top(&counts, &mut rng) {
            Some(pick) => prop_assert!(leaders(&counts).contains(&pick)),
            None => prop_assert!(indices.is_empty()),
        }
    }

    /// Property: only AGREE/DISAGREE ballots count; strict majority eliminates
    #[test]
    fn prop_final_tally_counts_valid_ballots(
        ballots in prop::collection::vec(
            prop::sample::select(vec!["AGREE", "agree", "DISAGREE", "Disagree", "abstain", ""]),
            0..10,
        ),
    ) {
        let aggregate: Aggregate = ballots
            .iter()
            .enumerate()
            .map(|(i, b)| (format!("v{i}"), b.to_string()))
            .collect();
        let tally = tally_final_votes(&aggregate);

        let agree = ballots.iter().filter(|b| b.eq_ignore_ascii_case("agree")).count();
        let disagree = ballots.iter().filter(|b| b.eq_ignore_ascii_case("disagree")).count();
        prop_assert_eq!(tally.agree, agree);
        prop_assert_eq!(tally.disagree, disagree);
        prop_assert_eq!(tally.eliminates(), agree > disagree);
    }

    /// Property: citizens win with no mafia left, mafia at parity, else ongoing
    #[test]
    fn prop_win_check_follows_alive_counts(
        mafia in 0usize..4,
        citizens in 0usize..8,
        dead in 0usize..3,
    ) {
        let session = table(mafia, citizens, dead);
        let expected = if mafia == 0 {
            Some(Team::Citizen)
        } else if mafia >= citizens {
            Some(Team::Mafia)
        } else {
            None
        };
        prop_assert_eq!(check_winner(&session), expected);
    }
}

#[test]
fn test_mafia_tie_break_is_uniform_between_leaders() {
    let counts = count_targets(["A", "A", "B", "B", "C"]);
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut picks: BTreeMap<String, usize> = BTreeMap::new();
    for _ in 0..4000 {
        let pick = pick_top(&counts, &mut rng).expect("votes were cast");
        *picks.entry(pick).or_insert(0) += 1;
    }

    assert_eq!(picks.get("C"), None);
    let a = picks.get("A").copied().unwrap_or(0);
    let b = picks.get("B").copied().unwrap_or(0);
    assert_eq!(a + b, 4000);
    assert!((1700..=2300).contains(&a), "A picked {a} times");
}

#[test]
fn test_day_vote_tie_is_void() {
    let counts = count_targets(["A", "A", "B", "B", "C"]);
    assert_eq!(unique_top(&counts), None);
}
