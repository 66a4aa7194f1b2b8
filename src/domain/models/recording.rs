//! Recording domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::task_family::TaskFamily;

/// The two task categories of the assessment battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskType {
    /// Language tasks (`CLAP-A`)
    #[serde(rename = "CLAP-A")]
    Language,
    /// Speech-motor tasks (`CLAP-D`)
    #[serde(rename = "CLAP-D")]
    Speech,
}

impl TaskType {
    /// Canonical code, e.g. `CLAP-A`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "CLAP-A",
            Self::Speech => "CLAP-D",
        }
    }

    /// Parse a task code, accepting lowercase and `_` for `-`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('_', "-").as_str() {
            "CLAP-A" => Some(Self::Language),
            "CLAP-D" => Some(Self::Speech),
            _ => None,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one captured recording.
///
/// Upstream capture does not guarantee uniqueness of the first five fields;
/// repeated takes of the same question differ only in `sub_attempt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordingKey {
    /// Patient ID
    pub patient_id: String,
    /// Assessment attempt number
    pub attempt: i64,
    /// Task category
    pub task_type: TaskType,
    /// Question code, e.g. `SAY_OBJ`
    pub question_code: String,
    /// Question number within the code
    pub question_no: i64,
    /// Take number; higher is later
    pub sub_attempt: i64,
}

impl RecordingKey {
    /// Create a new key.
    pub fn new(
        patient_id: impl Into<String>,
        attempt: i64,
        task_type: TaskType,
        question_code: impl Into<String>,
        question_no: i64,
        sub_attempt: i64,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            attempt,
            task_type,
            question_code: question_code.into(),
            question_no,
            sub_attempt,
        }
    }

    /// The (patient, attempt, task, question, question-number) group this
    /// recording competes in during deduplication.
    pub fn group(&self) -> (&str, i64, TaskType, &str, i64) {
        (
            &self.patient_id,
            self.attempt,
            self.task_type,
            &self.question_code,
            self.question_no,
        )
    }
}

impl fmt::Display for RecordingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            self.patient_id,
            self.attempt,
            self.task_type,
            self.question_code,
            self.question_no,
            self.sub_attempt
        )
    }
}

/// Metadata describing a recording, as listed in a bundle manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingMeta {
    /// Identity of the recording
    pub key: RecordingKey,
    /// Duration in seconds
    pub duration: f64,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Capture time, when known
    pub created_at: Option<DateTime<Utc>>,
}

/// A recording as held by the record store.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Key and capture metadata
    pub meta: RecordingMeta,
    /// Raw audio bytes
    pub audio: Vec<u8>,
    /// Score column of the recording row
    pub score: Option<f64>,
    /// Whether the recording still awaits scoring
    pub pending: bool,
    /// When the recording was stored
    pub created_at: DateTime<Utc>,
    /// When the recording left the pending set
    pub completed_at: Option<DateTime<Utc>>,
}

impl Recording {
    /// A freshly captured recording, pending scoring.
    pub fn captured(meta: RecordingMeta, audio: Vec<u8>) -> Self {
        let created_at = meta.created_at.unwrap_or_else(Utc::now);
        Self {
            meta: RecordingMeta {
                created_at: Some(created_at),
                ..meta
            },
            audio,
            score: None,
            pending: true,
            created_at,
            completed_at: None,
        }
    }

    /// The recording's key.
    pub fn key(&self) -> &RecordingKey {
        &self.meta.key
    }
}

/// A fetched recording materialized as a local file for the duration of a job.
#[derive(Debug, Clone)]
pub struct LocalRecording {
    /// Key and capture metadata
    pub meta: RecordingMeta,
    /// Audio file inside the job workspace
    pub path: PathBuf,
}

impl LocalRecording {
    /// The recording's key.
    pub fn key(&self) -> &RecordingKey {
        &self.meta.key
    }
}

/// Anything that carries a recording key can be deduplicated.
pub trait Keyed {
    /// Key used for grouping.
    fn recording_key(&self) -> &RecordingKey;

    /// Capture time used to break sub-attempt ties.
    fn created_at(&self) -> Option<DateTime<Utc>>;
}

impl Keyed for RecordingMeta {
    fn recording_key(&self) -> &RecordingKey {
        &self.key
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl Keyed for Recording {
    fn recording_key(&self) -> &RecordingKey {
        &self.meta.key
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Keyed for LocalRecording {
    fn recording_key(&self) -> &RecordingKey {
        &self.meta.key
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.meta.created_at
    }
}

/// One score write for one recording.
///
/// `score == None` settles the recording: it is flipped to complete without
/// carrying a score of its own (e.g. the unused positions of a positional
/// family).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Recording being written
    pub key: RecordingKey,
    /// Family the score belongs to
    pub family: Option<TaskFamily>,
    /// Score to store; `None` settles without a score
    pub score: Option<f64>,
}

impl ScoreRecord {
    /// A scored write for `family`.
    pub fn scored(key: RecordingKey, family: TaskFamily, score: f64) -> Self {
        Self {
            key,
            family: Some(family),
            score: Some(score),
        }
    }

    /// A write that completes the recording without scoring it.
    pub fn settled(key: RecordingKey, family: Option<TaskFamily>) -> Self {
        Self {
            key,
            family,
            score: None,
        }
    }
}

/// Result of one write-back call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    /// Score rows inserted or changed
    pub upserted: u64,
    /// Recordings that transitioned pending -> complete in this call
    pub completed: u64,
}

/// A stored score row joined back to its key.
#[derive(Debug, Clone, Serialize)]
pub struct StoredScore {
    /// Recording the score belongs to
    pub key: RecordingKey,
    /// Family that produced it
    pub family: Option<TaskFamily>,
    /// Stored score, if any
    pub score: Option<f64>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_round_trip_codes() {
        assert_eq!(TaskType::from_str("CLAP-A"), Some(TaskType::Language));
        assert_eq!(TaskType::from_str("clap_d"), Some(TaskType::Speech));
        assert_eq!(TaskType::from_str("CLAP-X"), None);
        assert_eq!(TaskType::Speech.as_str(), "CLAP-D");
    }

    #[test]
    fn test_key_display() {
        let key = RecordingKey::new("1001", 2, TaskType::Language, "SAY_OBJ", 5, 1);
        assert_eq!(key.to_string(), "1001/2/CLAP-A/SAY_OBJ/5/1");
    }

    #[test]
    fn test_group_ignores_sub_attempt() {
        let a = RecordingKey::new("p", 1, TaskType::Speech, "AH_SOUND", 0, 0);
        let b = RecordingKey { sub_attempt: 3, ..a.clone() };
        assert_eq!(a.group(), b.group());
        assert_ne!(a, b);
    }
}
