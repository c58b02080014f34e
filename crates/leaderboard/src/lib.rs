#![warn(clippy::unwrap_used)]

pub mod categories;
pub mod resolver;
pub mod synchronizer;

pub use categories::CategoryDirectory;
pub use resolver::DirectoryResolver;
pub use synchronizer::LeaderboardSynchronizer;
