//! Backend test support utilities
//!
//! Shared helpers for the mafia backend test suites: unified logging
//! initialization and unique id generation for test isolation.

pub mod logging;
pub mod unique_helpers;
