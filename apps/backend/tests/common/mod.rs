#![allow(dead_code)]

// tests/common/mod.rs


// Logging is auto-installed for every test binary
#[ctor::ctor]
fn init_logging() {
    backend_test_support::logging::init();
}

/// Redis URL for the optional Redis-backed suites; `None` skips them.
pub fn redis_url() -> Option<String> {
    std::env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty())
}
