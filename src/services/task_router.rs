//! Task router: classifies canonical recordings into task families and
//! shapes them into scorer invocations.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::domain::models::{FamilyRule, LocalRecording, TaskFamily};

/// One scorer call within a family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Group label passed to the scorer (partitioned families)
    pub label: Option<&'static str>,
    /// Ordinal index passed to the scorer (per-recording families)
    pub ordinal: Option<usize>,
    /// Indices into the family's ordered recordings
    pub inputs: Vec<usize>,
}

/// A family's routed recordings and the calls to make on them.
#[derive(Debug, Clone)]
pub struct FamilyPlan {
    /// Family being scored
    pub family: TaskFamily,
    /// Every canonical recording of the family, in question-number order
    pub recordings: Vec<LocalRecording>,
    /// Scorer calls, in order
    pub invocations: Vec<Invocation>,
}

impl FamilyPlan {
    /// Recordings routed to the family that no invocation uses
    pub fn unused(&self) -> impl Iterator<Item = &LocalRecording> {
        let used: Vec<usize> = self
            .invocations
            .iter()
            .flat_map(|inv| inv.inputs.iter().copied())
            .collect();
        self.recordings
            .iter()
            .enumerate()
            .filter(move |(i, _)| !used.contains(i))
            .map(|(_, rec)| rec)
    }
}

/// A family that could not be scored because too few recordings arrived.
#[derive(Debug, Clone)]
pub struct SkippedFamily {
    /// Family left unscored
    pub family: TaskFamily,
    /// Canonical recordings present
    pub have: usize,
    /// Recordings the family requires
    pub need: usize,
    /// The recordings that arrived
    pub recordings: Vec<LocalRecording>,
}

/// Routing result for one attempt.
#[derive(Debug, Clone, Default)]
pub struct RoutedAttempt {
    /// Families with enough recordings to score
    pub plans: BTreeMap<TaskFamily, FamilyPlan>,
    /// Families short of recordings
    pub skipped: Vec<SkippedFamily>,
    /// Recordings whose question code maps to no known family
    pub unrouted: Vec<LocalRecording>,
}

/// Route canonical recordings of one attempt.
///
/// Never fails: unknown codes are set aside and families short of their
/// arity are skipped.
pub fn route(canonical: Vec<LocalRecording>) -> RoutedAttempt {
    let mut by_family: BTreeMap<TaskFamily, Vec<LocalRecording>> = BTreeMap::new();
    let mut routed = RoutedAttempt::default();

    for rec in canonical {
        let key = rec.key();
        match TaskFamily::lookup(key.task_type, &key.question_code) {
            Some(family) => by_family.entry(family).or_default().push(rec),
            None => {
                warn!(
                    patient_id = %key.patient_id,
                    attempt = key.attempt,
                    task_type = %key.task_type,
                    question_code = %key.question_code,
                    "Ignoring recording with unknown question code"
                );
                routed.unrouted.push(rec);
            }
        }
    }

    for (family, mut recordings) in by_family {
        recordings.sort_by_key(|r| r.key().question_no);
        let rule = family.rule();
        match plan_invocations(rule, recordings.len()) {
            Some(invocations) => {
                debug!(%family, recordings = recordings.len(), calls = invocations.len(), "Routed family");
                routed.plans.insert(
                    family,
                    FamilyPlan {
                        family,
                        recordings,
                        invocations,
                    },
                );
            }
            None => {
                debug!(
                    %family,
                    have = recordings.len(),
                    need = rule.required_len(),
                    "Skipping family below required arity"
                );
                routed.skipped.push(SkippedFamily {
                    family,
                    have: recordings.len(),
                    need: rule.required_len(),
                    recordings,
                });
            }
        }
    }

    routed
}

/// Positional shaping of `len` question-number-ordered recordings under
/// `rule`. Returns `None` when the rule's arity is not met.
///
/// This is the single place where position in the ordered list is given
/// meaning.
pub fn plan_invocations(rule: FamilyRule, len: usize) -> Option<Vec<Invocation>> {
    if len == 0 || len < rule.required_len() {
        return None;
    }

    let plan = match rule {
        FamilyRule::Batch { .. } => vec![Invocation {
            label: None,
            ordinal: None,
            inputs: (0..len).collect(),
        }],
        FamilyRule::EachSum { .. } => (0..len)
            .map(|i| Invocation {
                label: None,
                ordinal: Some(i),
                inputs: vec![i],
            })
            .collect(),
        FamilyRule::Positions { positions, .. } => vec![Invocation {
            label: None,
            ordinal: None,
            inputs: positions.to_vec(),
        }],
        FamilyRule::First => vec![Invocation {
            label: None,
            ordinal: None,
            inputs: vec![0],
        }],
        FamilyRule::Partition { group_size, labels } => labels
            .iter()
            .enumerate()
            .map(|(g, label)| Invocation {
                label: Some(*label),
                ordinal: None,
                inputs: (g * group_size..(g + 1) * group_size).collect(),
            })
            .collect(),
    };
    Some(plan)
}
