//! Scorer port - external audio-to-score routines.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::models::TaskFamily;

/// One scorer invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRequest {
    /// Family being scored
    pub family: TaskFamily,
    /// Group label for partitioned families (e.g. `PTK`)
    pub label: Option<String>,
    /// Input audio files, in question-number order
    pub paths: Vec<PathBuf>,
    /// Position of the input within the family, for families that need it
    pub ordinal: Option<usize>,
}

impl ScoreRequest {
    /// Create a new request over `paths`.
    pub fn new(family: TaskFamily, paths: Vec<PathBuf>) -> Self {
        Self {
            family,
            label: None,
            paths,
            ordinal: None,
        }
    }

    /// Set the group label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the ordinal.
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }
}

/// What a scorer returns.
#[derive(Debug, Clone, PartialEq)]
pub enum ScorerOutput {
    /// One score for the whole call
    Single(f64),
    /// One score per input path, in input order
    Many(Vec<f64>),
}

/// Scorer failures. Opaque to the worker beyond their message.
#[derive(Debug, Error)]
pub enum ScorerError {
    /// No scorer is registered for the family
    #[error("no scorer configured for {0}")]
    NotConfigured(TaskFamily),

    /// The routine reported failure
    #[error("scorer failed: {0}")]
    Failed(String),

    /// The routine's output could not be parsed
    #[error("invalid scorer output: {0}")]
    InvalidOutput(String),
}

/// An external scoring routine.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Score the request's audio files.
    async fn score(&self, request: ScoreRequest) -> Result<ScorerOutput, ScorerError>;
}
