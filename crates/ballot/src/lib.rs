#![warn(clippy::unwrap_used)]

pub mod allocator;
pub mod dedup;
pub mod store;
pub mod tabulator;

pub use allocator::BallotAllocator;
pub use store::MemoryContestStore;
pub use tabulator::ScoreTabulator;
