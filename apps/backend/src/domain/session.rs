//! The authoritative session document.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::phase::Phase;
use crate::domain::roles::{Role, Team};

pub type GameId = String;
pub type PlayerId = String;

pub const MIN_PLAYERS: usize = 4;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Created, roles not yet assigned.
    Waiting,
    /// Roles assigned; exactly one phase timer is pending.
    InProgress,
    /// A team has won. Terminal.
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Assigned once at game start, never changed afterwards.
    pub role: Option<Role>,
    pub alive: bool,
    /// Target of this player's most recent day vote.
    pub last_vote: Option<PlayerId>,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
            alive: true,
            last_vote: None,
        }
    }

    pub fn team(&self) -> Option<Team> {
        self.role.map(Role::team)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }
}

/// Identifies one phase occurrence. Each phase happens at most once per day,
/// so `(day, phase)` is unique over a session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseTicket {
    pub day: u32,
    pub phase: Phase,
}

impl std::fmt::Display for PhaseTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "day {} {}", self.day, self.phase.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub game_id: GameId,
    pub room_id: String,
    pub status: Status,
    pub phase: Phase,
    /// Day counter; 0 while waiting, incremented on every night -> day edge.
    pub day: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub phase_ends_at: Option<OffsetDateTime>,
    pub winner: Option<Team>,
    pub players: Vec<Player>,
    /// Top-voted player of the current day, set on voting exit.
    pub defendant: Option<PlayerId>,
    /// Players who already extended today's discussion.
    pub extensions_used: BTreeSet<PlayerId>,
}

impl Session {
    pub fn new(
        game_id: impl Into<GameId>,
        room_id: impl Into<String>,
        players: Vec<Player>,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            room_id: room_id.into(),
            status: Status::Waiting,
            phase: Phase::DayDiscussion,
            day: 0,
            phase_ends_at: None,
            winner: None,
            players,
            defendant: None,
            extensions_used: BTreeSet::new(),
        }
    }

    pub fn ticket(&self) -> PhaseTicket {
        PhaseTicket {
            day: self.day,
            phase: self.phase,
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.player(id).is_some_and(|p| p.alive)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.alive)
    }

    /// (alive mafia, alive citizens)
    pub fn alive_counts(&self) -> (usize, usize) {
        self.alive_players()
            .fold((0, 0), |(mafia, citizens), p| match p.team() {
                Some(Team::Mafia) => (mafia + 1, citizens),
                Some(Team::Citizen) => (mafia, citizens + 1),
                None => (mafia, citizens),
            })
    }

    pub fn is_ended(&self) -> bool {
        self.status == Status::Ended
    }

    /// Whether `player_id` may speak right now.
    ///
    /// Alive players talk freely by day except during the final defense,
    /// which belongs to the defendant. At night only mafia may talk.
    pub fn can_player_chat(&self, player_id: &str) -> bool {
        let Some(player) = self.player(player_id) else {
            return false;
        };
        match self.status {
            Status::Waiting | Status::Ended => return true,
            Status::InProgress => {}
        }
        if !player.alive {
            return false;
        }
        match self.phase {
            Phase::DayDiscussion | Phase::DayVoting | Phase::DayFinalVoting => true,
            Phase::DayFinalDefense => self.defendant.as_deref() == Some(player_id),
            Phase::NightAction => player.has_role(Role::Mafia),
        }
    }
}
