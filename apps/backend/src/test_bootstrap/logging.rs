#![cfg(test)]

//! Unit-test logging hook; the subscriber itself lives in
//! `backend-test-support` so unit and integration tests log the same way.

/// Install the shared test subscriber once. Safe to call repeatedly.
pub fn init() {
    backend_test_support::logging::init();
}
