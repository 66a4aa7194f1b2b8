//! Mock scorer for testing and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::models::TaskFamily;
use crate::domain::ports::{ScoreRequest, Scorer, ScorerError, ScorerOutput};

/// Scripted response.
#[derive(Debug, Clone)]
pub enum MockScore {
    /// Answer `Single(score)`
    Single(f64),
    /// Answer `Many(scores)`
    Many(Vec<f64>),
    /// Fail with the message
    Fail(String),
    /// Never answer; exercises scorer timeouts
    Hang,
    /// Answer `Single(score)` after `after`
    Slow {
        /// Delay before answering
        after: Duration,
        /// Score to answer with
        score: f64,
    },
}

impl MockScore {
    /// A scorer failure with `error` as its message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

/// Mock scorer.
///
/// A request is answered by the first rule that matches: a path-suffix rule
/// for the request's first path, then a family rule, then the default.
pub struct MockScorer {
    default: MockScore,
    by_path: Vec<(PathBuf, MockScore)>,
    by_family: HashMap<TaskFamily, MockScore>,
    calls: Arc<Mutex<Vec<ScoreRequest>>>,
}

impl MockScorer {
    /// A scorer answering `Single(0.0)` to everything.
    pub fn new() -> Self {
        Self::with_default(MockScore::Single(0.0))
    }

    /// A scorer answering `default` unless a rule matches.
    pub fn with_default(default: MockScore) -> Self {
        Self {
            default,
            by_path: Vec::new(),
            by_family: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer requests whose first path ends with `suffix` (compared by
    /// path components, e.g. `GUESS_END/2_0.wav`).
    pub fn on_path(mut self, suffix: impl Into<PathBuf>, score: MockScore) -> Self {
        self.by_path.push((suffix.into(), score));
        self
    }

    /// Answer every request for `family` with `score`.
    pub fn on_family(mut self, family: TaskFamily, score: MockScore) -> Self {
        self.by_family.insert(family, score);
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<ScoreRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn lookup(&self, request: &ScoreRequest) -> MockScore {
        let first = request.paths.first();
        self.by_path
            .iter()
            .find(|(suffix, _)| first.is_some_and(|p| p.ends_with(suffix)))
            .map(|(_, score)| score)
            .or_else(|| self.by_family.get(&request.family))
            .unwrap_or(&self.default)
            .clone()
    }
}

impl Default for MockScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scorer for MockScorer {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn score(&self, request: ScoreRequest) -> Result<ScorerOutput, ScorerError> {
        let scripted = self.lookup(&request);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request);
        }

        match scripted {
            MockScore::Single(v) => Ok(ScorerOutput::Single(v)),
            MockScore::Many(vs) => Ok(ScorerOutput::Many(vs)),
            MockScore::Fail(msg) => Err(ScorerError::Failed(msg)),
            MockScore::Hang => std::future::pending().await,
            MockScore::Slow { after, score } => {
                tokio::time::sleep(after).await;
                Ok(ScorerOutput::Single(score))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_apply_in_order() {
        let scorer = MockScorer::with_default(MockScore::Single(1.0))
            .on_family(TaskFamily::SayAnimal, MockScore::Single(2.0))
            .on_path("SAY_ANI/0_0.wav", MockScore::Single(3.0));

        let by_path = ScoreRequest::new(TaskFamily::SayAnimal, vec![PathBuf::from("/tmp/CLAP-A/SAY_ANI/0_0.wav")]);
        let by_family = ScoreRequest::new(TaskFamily::SayAnimal, vec![PathBuf::from("/tmp/other.wav")]);
        let fallback = ScoreRequest::new(TaskFamily::TalkPicture, vec![]);

        assert_eq!(scorer.score(by_path).await.unwrap(), ScorerOutput::Single(3.0));
        assert_eq!(scorer.score(by_family).await.unwrap(), ScorerOutput::Single(2.0));
        assert_eq!(scorer.score(fallback).await.unwrap(), ScorerOutput::Single(1.0));
        assert_eq!(scorer.calls().len(), 3);
    }
}
