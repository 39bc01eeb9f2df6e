//! Feed retrieval and outbound request pacing.

pub mod fetcher;
pub mod rate_limiter;
