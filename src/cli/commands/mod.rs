//! CLI command implementations.

pub mod bundle;
pub mod init;
pub mod jobs;
pub mod recording;
pub mod scores;
pub mod token;
pub mod worker;
