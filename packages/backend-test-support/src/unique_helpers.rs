//! Test helpers for generating unique test data
//!
//! Game, room and player ids built from ULIDs so that suites sharing a
//! Redis instance never collide between runs.

use ulid::Ulid;

/// Generate a unique string with the given prefix
///
/// # Examples
/// ```
/// use backend_test_support::unique_helpers::unique_str;
///
/// let id1 = unique_str("game");
/// let id2 = unique_str("game");
/// assert_ne!(id1, id2);
/// assert!(id1.starts_with("game-"));
/// ```
pub fn unique_str(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}

/// Generate a unique game id.
pub fn unique_game_id() -> String {
    unique_str("game")
}

/// Generate `count` unique player ids sharing one ULID suffix.
///
/// ```
/// use backend_test_support::unique_helpers::unique_player_ids;
///
/// let ids = unique_player_ids(3);
/// assert_eq!(ids.len(), 3);
/// assert!(ids[0].ends_with("-p0"));
/// ```
pub fn unique_player_ids(count: usize) -> Vec<String> {
    let base = Ulid::new();
    (0..count).map(|i| format!("player-{base}-p{i}")).collect()
}
