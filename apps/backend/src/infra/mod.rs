//! Infrastructure layer: Redis connections and shared retry policy.

pub mod redis;
