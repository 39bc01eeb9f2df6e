//! Storage, shared types and process-wide plumbing.

pub mod error;
pub mod logger;
pub mod store;
pub mod time;
pub mod types;
