//! Score aggregator and writer.
//!
//! Calls each routed family's scorer, maps the outputs back onto recording
//! keys, and writes every family's subset back independently.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::scorers::ScorerRegistry;
use crate::domain::models::{FamilyRule, ScoreRecord, TaskFamily, WriteOutcome};
use crate::domain::ports::{RecordingRepository, ScoreRequest, ScorerError, ScorerOutput};
use crate::services::task_router::{FamilyPlan, RoutedAttempt};

/// A family that contributed nothing this cycle.
#[derive(Debug, Error)]
pub enum FamilyError {
    /// The scorer returned an error or unusable output
    #[error("{family}: {source}")]
    Scoring {
        /// Family that failed
        family: TaskFamily,
        /// Scorer's error
        #[source]
        source: ScorerError,
    },

    /// The scorer did not answer in time
    #[error("{family}: scorer timed out after {after:?}")]
    Timeout {
        /// Family that failed
        family: TaskFamily,
        /// The scorer timeout
        after: Duration,
    },

    /// The family's scores could not be written
    #[error("{family}: write-back failed: {message}")]
    Persistence {
        /// Family that failed
        family: TaskFamily,
        /// Store error message
        message: String,
    },
}

impl FamilyError {
    /// The family that failed.
    pub fn family(&self) -> TaskFamily {
        match self {
            Self::Scoring { family, .. }
            | Self::Timeout { family, .. }
            | Self::Persistence { family, .. } => *family,
        }
    }
}

/// Scores produced for one family of one attempt.
#[derive(Debug, Clone)]
pub struct FamilyScores {
    /// Family scored
    pub family: TaskFamily,
    /// One value per scorer invocation, after rounding
    pub values: Vec<f64>,
    /// Family-level score: the sum for per-recording families, the single
    /// value for one-call families, `None` for partitioned families
    pub total: Option<f64>,
    /// Write-back rows: scored anchors plus settled inputs and unused recordings
    pub records: Vec<ScoreRecord>,
}

/// Everything scored for one attempt, before write-back.
#[derive(Debug, Default)]
pub struct AttemptScoring {
    /// Families with scores ready to write
    pub scored: Vec<FamilyScores>,
    /// Families that produced nothing
    pub failed: Vec<FamilyError>,
    /// Recordings to settle without a score: skipped families and unknown codes
    pub settled: Vec<ScoreRecord>,
}

/// Runs each routed family's scorer and writes the results back.
pub struct ScoreAggregator {
    scorers: Arc<ScorerRegistry>,
    store: Arc<dyn RecordingRepository>,
    scorer_timeout: Duration,
}

impl ScoreAggregator {
    /// Create a new aggregator.
    pub fn new(
        scorers: Arc<ScorerRegistry>,
        store: Arc<dyn RecordingRepository>,
        scorer_timeout: Duration,
    ) -> Self {
        Self {
            scorers,
            store,
            scorer_timeout,
        }
    }

    /// Score every routed family. A failing family does not stop the others.
    pub async fn score_attempt(&self, routed: &RoutedAttempt) -> AttemptScoring {
        let mut result = AttemptScoring::default();

        for plan in routed.plans.values() {
            match self.score_plan(plan).await {
                Ok(scores) => {
                    debug!(family = %plan.family, values = ?scores.values, "Family scored");
                    result.scored.push(scores);
                }
                Err(err) => {
                    warn!(family = %plan.family, error = %err, "Family scoring failed");
                    result.failed.push(err);
                }
            }
        }

        for skipped in &routed.skipped {
            result.settled.extend(
                skipped
                    .recordings
                    .iter()
                    .map(|r| ScoreRecord::settled(r.key().clone(), Some(skipped.family))),
            );
        }
        result.settled.extend(
            routed
                .unrouted
                .iter()
                .map(|r| ScoreRecord::settled(r.key().clone(), None)),
        );

        result
    }

    /// Run one family's invocations and map outputs back onto its keys.
    pub async fn score_plan(&self, plan: &FamilyPlan) -> Result<FamilyScores, FamilyError> {
        let family = plan.family;
        let scorer = self.scorers.get(family).ok_or(FamilyError::Scoring {
            family,
            source: ScorerError::NotConfigured(family),
        })?;
        let precision = family.precision();

        let mut values = Vec::with_capacity(plan.invocations.len());
        let mut records = Vec::with_capacity(plan.recordings.len());

        for invocation in &plan.invocations {
            let inputs: Vec<_> = invocation.inputs.iter().map(|&i| &plan.recordings[i]).collect();
            let Some((anchor, rest)) = inputs.split_first() else {
                continue;
            };

            let mut request =
                ScoreRequest::new(family, inputs.iter().map(|r| r.path.clone()).collect());
            if let Some(label) = invocation.label {
                request = request.with_label(label);
            }
            if let Some(ordinal) = invocation.ordinal {
                request = request.with_ordinal(ordinal);
            }

            let output = tokio::time::timeout(self.scorer_timeout, scorer.score(request))
                .await
                .map_err(|_| FamilyError::Timeout {
                    family,
                    after: self.scorer_timeout,
                })?
                .map_err(|source| FamilyError::Scoring { family, source })?;

            let value = combine(family.rule(), output, inputs.len())
                .map_err(|source| FamilyError::Scoring { family, source })?;
            let value = precision.apply(value);

            values.push(value);
            records.push(ScoreRecord::scored(anchor.key().clone(), family, value));
            records.extend(
                rest.iter()
                    .map(|r| ScoreRecord::settled(r.key().clone(), Some(family))),
            );
        }

        records.extend(
            plan.unused()
                .map(|r| ScoreRecord::settled(r.key().clone(), Some(family))),
        );

        let total = match family.rule() {
            FamilyRule::EachSum { .. } => Some(values.iter().sum()),
            FamilyRule::Partition { .. } => None,
            _ => values.first().copied(),
        };

        Ok(FamilyScores {
            family,
            values,
            total,
            records,
        })
    }

    /// Write one subset of an attempt's scores.
    pub async fn write_back(
        &self,
        patient_id: &str,
        attempt: i64,
        family: Option<TaskFamily>,
        records: &[ScoreRecord],
    ) -> Result<WriteOutcome, String> {
        if records.is_empty() {
            return Ok(WriteOutcome::default());
        }
        let outcome = self
            .store
            .write_scores(patient_id, attempt, records)
            .await
            .map_err(|e| e.to_string())?;
        info!(
            patient_id,
            attempt,
            family = family.map(|f| f.code()).unwrap_or("-"),
            upserted = outcome.upserted,
            completed = outcome.completed,
            "Scores written"
        );
        Ok(outcome)
    }

    /// Write each family's scores, then the settled remainder, independently.
    ///
    /// A family whose write fails is moved to `scoring.failed`; its
    /// recordings stay pending. Failing to settle the remainder is an error
    /// for the whole attempt.
    pub async fn write_attempt(
        &self,
        patient_id: &str,
        attempt: i64,
        scoring: &mut AttemptScoring,
    ) -> Result<WriteOutcome, String> {
        let mut total = WriteOutcome::default();
        let mut written = Vec::with_capacity(scoring.scored.len());

        for scores in scoring.scored.drain(..) {
            match self
                .write_back(patient_id, attempt, Some(scores.family), &scores.records)
                .await
            {
                Ok(outcome) => {
                    total.upserted += outcome.upserted;
                    total.completed += outcome.completed;
                    written.push(scores);
                }
                Err(message) => {
                    warn!(patient_id, attempt, family = %scores.family, error = %message, "Family write-back failed");
                    scoring.failed.push(FamilyError::Persistence {
                        family: scores.family,
                        message,
                    });
                }
            }
        }
        scoring.scored = written;

        let settled = self
            .write_back(patient_id, attempt, None, &scoring.settled)
            .await?;
        total.upserted += settled.upserted;
        total.completed += settled.completed;

        Ok(total)
    }
}

/// Reduce a scorer output for an invocation of `inputs` recordings to one value.
fn combine(rule: FamilyRule, output: ScorerOutput, inputs: usize) -> Result<f64, ScorerError> {
    let value = match output {
        ScorerOutput::Single(v) => v,
        ScorerOutput::Many(vs) => {
            if vs.len() != inputs {
                return Err(ScorerError::InvalidOutput(format!(
                    "expected {inputs} scores, got {}",
                    vs.len()
                )));
            }
            if vs.iter().any(|v| !v.is_finite()) {
                return Err(ScorerError::InvalidOutput("non-finite score".to_string()));
            }
            match rule {
                FamilyRule::Partition { .. } => vs.into_iter().fold(f64::NEG_INFINITY, f64::max),
                _ => vs.into_iter().sum(),
            }
        }
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScorerError::InvalidOutput(format!("non-finite score {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_partition_takes_max() {
        let rule = TaskFamily::Diadochokinesis.rule();
        let v = combine(rule, ScorerOutput::Many(vec![1.5, 3.25, 2.0]), 3).unwrap();
        assert!((v - 3.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_combine_rejects_misaligned_output() {
        let rule = TaskFamily::ListenRepeat.rule();
        let err = combine(rule, ScorerOutput::Many(vec![1.0]), 2).unwrap_err();
        assert!(matches!(err, ScorerError::InvalidOutput(_)));
    }

    #[test]
    fn test_combine_rejects_nan() {
        let rule = TaskFamily::SayAnimal.rule();
        assert!(combine(rule, ScorerOutput::Single(f64::NAN), 1).is_err());
    }
}
