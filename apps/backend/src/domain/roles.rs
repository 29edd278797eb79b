//! Roles, teams and the role-assignment source.

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::errors::domain::{DomainError, ValidationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Mafia,
    Doctor,
    Police,
    Citizen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Team {
    Mafia,
    Citizen,
}

impl Role {
    pub const fn team(self) -> Team {
        match self {
            Role::Mafia => Team::Mafia,
            Role::Doctor | Role::Police | Role::Citizen => Team::Citizen,
        }
    }

    /// Roles that submit a night action.
    pub const fn acts_at_night(self) -> bool {
        !matches!(self, Role::Citizen)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Mafia => "MAFIA",
            Role::Doctor => "DOCTOR",
            Role::Police => "POLICE",
            Role::Citizen => "CITIZEN",
        }
    }
}

/// Which special roles take part, and how many mafia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOptions {
    pub doctor: bool,
    pub police: bool,
    /// `None` means `max(1, players / 4)`
    pub mafia_count: Option<usize>,
}

impl Default for RoleOptions {
    fn default() -> Self {
        Self {
            doctor: true,
            police: true,
            mafia_count: None,
        }
    }
}

/// Unshuffled role list for `player_count` players.
///
/// Mafia first, then doctor and police when enabled, citizens fill the rest.
pub fn role_deck(player_count: usize, options: &RoleOptions) -> Result<Vec<Role>, DomainError> {
    let mafia = options.mafia_count.unwrap_or((player_count / 4).max(1));
    if mafia == 0 {
        return Err(DomainError::validation(
            ValidationKind::InvalidPlayers,
            "at least one mafia is required",
        ));
    }
    let specials = mafia + usize::from(options.doctor) + usize::from(options.police);
    // mafia must start strictly outnumbered or the game is over before it begins
    if specials > player_count || mafia * 2 >= player_count {
        return Err(DomainError::validation(
            ValidationKind::InvalidPlayers,
            format!("{player_count} players cannot seat {mafia} mafia with the requested roles"),
        ));
    }

    let mut roles = Vec::with_capacity(player_count);
    roles.extend(std::iter::repeat_n(Role::Mafia, mafia));
    if options.doctor {
        roles.push(Role::Doctor);
    }
    if options.police {
        roles.push(Role::Police);
    }
    roles.resize(player_count, Role::Citizen);
    Ok(roles)
}

/// Supplies the role list at session start, index-aligned with the player list.
pub trait RoleAssigner: Send + Sync {
    fn assign(&self, player_count: usize, options: &RoleOptions) -> Result<Vec<Role>, DomainError>;
}

/// Uniform random permutation of [`role_deck`].
pub struct ShuffledRoleAssigner {
    rng: Mutex<ChaCha8Rng>,
}

impl ShuffledRoleAssigner {
    pub fn from_os_rng() -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::from_os_rng()),
        }
    }

    /// Reproducible assignment for tests and the bench.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl Default for ShuffledRoleAssigner {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

impl RoleAssigner for ShuffledRoleAssigner {
    fn assign(&self, player_count: usize, options: &RoleOptions) -> Result<Vec<Role>, DomainError> {
        let mut roles = role_deck(player_count, options)?;
        roles.shuffle(&mut *self.rng.lock());
        Ok(roles)
    }
}

/// Assigns a caller-chosen list verbatim.
#[derive(Debug, Clone)]
pub struct FixedRoleAssigner(pub Vec<Role>);

impl RoleAssigner for FixedRoleAssigner {
    fn assign(
        &self,
        player_count: usize,
        _options: &RoleOptions,
    ) -> Result<Vec<Role>, DomainError> {
        if self.0.len() != player_count {
            return Err(DomainError::validation(
                ValidationKind::InvalidPlayers,
                format!(
                    "fixed role list has {} entries for {player_count} players",
                    self.0.len()
                ),
            ));
        }
        Ok(self.0.clone())
    }
}
