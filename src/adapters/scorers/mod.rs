//! Scorer adapters.

pub mod command;
pub mod mock;
pub mod registry;

pub use command::CommandScorer;
pub use mock::{MockScore, MockScorer};
pub use registry::ScorerRegistry;
