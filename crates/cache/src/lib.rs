#![warn(clippy::unwrap_used)]

pub mod client;
pub mod local;
pub mod ranked;

pub use client::RedisRankedStore;
pub use local::TtlCache;
pub use ranked::MemoryRankedStore;
