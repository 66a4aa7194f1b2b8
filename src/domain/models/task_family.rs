//! Task families: the fixed table mapping question codes to scoring rules.
//!
//! Each family carries its calling convention and combination rule as data,
//! so the aggregator never branches on question-code strings.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::recording::TaskType;

/// Scoring strategy family, keyed by question code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskFamily {
    /// Listen and repeat
    #[serde(rename = "LTN_RPT")]
    ListenRepeat,
    /// Guess the sentence ending
    #[serde(rename = "GUESS_END")]
    GuessEnding,
    /// Name the pictured object
    #[serde(rename = "SAY_OBJ")]
    SayObject,
    /// Name as many animals as possible
    #[serde(rename = "SAY_ANI")]
    SayAnimal,
    /// Describe a picture
    #[serde(rename = "TALK_PIC")]
    TalkPicture,
    /// Sustained "ah" phonation
    #[serde(rename = "AH_SOUND")]
    SustainedVowel,
    /// Diadochokinesis: repeated "pa", "ta", "ka" and "pataka"
    #[serde(rename = "PTK_SOUND")]
    Diadochokinesis,
    /// Speech intelligibility over read passages
    #[serde(rename = "TALK_CLEAN")]
    TalkClean,
}

/// How a family's scorer output is rounded before write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Truncate toward zero
    Integer,
    /// Round half away from zero to two decimals
    Hundredths,
}

impl Precision {
    /// Round `value` to this precision.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Integer => value.trunc(),
            Self::Hundredths => (value * 100.0).round() / 100.0,
        }
    }
}

/// Arity and combination rule for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyRule {
    /// All recordings go to one scorer call which returns a single score.
    Batch {
        /// Fewest recordings worth a call
        min: usize,
    },
    /// Each recording is scored independently with its ordinal index; the
    /// family total is the sum.
    EachSum {
        /// Fewest recordings worth scoring
        min: usize,
    },
    /// Only the recordings at `positions` (0-based, question-number order)
    /// are scored, together, in one call. Requires `required` recordings.
    Positions {
        /// Recordings the family must have
        required: usize,
        /// Indices sent to the scorer
        positions: &'static [usize],
    },
    /// Only the first recording is scored.
    First,
    /// Consecutive groups of `group_size`, one scorer call and one score per
    /// group. Group `i` is labelled `labels[i]`.
    Partition {
        /// Recordings per group
        group_size: usize,
        /// One label per group
        labels: &'static [&'static str],
    },
}

impl FamilyRule {
    /// Minimum number of canonical recordings needed to score the family.
    pub fn required_len(&self) -> usize {
        match self {
            Self::Batch { min } | Self::EachSum { min } => *min,
            Self::Positions { required, .. } => *required,
            Self::First => 1,
            Self::Partition { group_size, labels } => group_size * labels.len(),
        }
    }
}

const SAY_OBJECT_POSITIONS: &[usize] = &[5, 8];
const PTK_LABELS: &[&str] = &["P", "T", "K", "PTK"];

impl TaskFamily {
    /// Every family, in routing order.
    pub const ALL: [TaskFamily; 8] = [
        Self::ListenRepeat,
        Self::GuessEnding,
        Self::SayObject,
        Self::SayAnimal,
        Self::TalkPicture,
        Self::SustainedVowel,
        Self::Diadochokinesis,
        Self::TalkClean,
    ];

    /// Question code, e.g. `SAY_OBJ`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ListenRepeat => "LTN_RPT",
            Self::GuessEnding => "GUESS_END",
            Self::SayObject => "SAY_OBJ",
            Self::SayAnimal => "SAY_ANI",
            Self::TalkPicture => "TALK_PIC",
            Self::SustainedVowel => "AH_SOUND",
            Self::Diadochokinesis => "PTK_SOUND",
            Self::TalkClean => "TALK_CLEAN",
        }
    }

    /// Task category the family belongs to.
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::ListenRepeat
            | Self::GuessEnding
            | Self::SayObject
            | Self::SayAnimal
            | Self::TalkPicture => TaskType::Language,
            Self::SustainedVowel | Self::Diadochokinesis | Self::TalkClean => TaskType::Speech,
        }
    }

    /// How recordings of this family are scored.
    pub fn rule(&self) -> FamilyRule {
        match self {
            Self::ListenRepeat | Self::TalkClean => FamilyRule::Batch { min: 1 },
            Self::GuessEnding => FamilyRule::EachSum { min: 1 },
            Self::SayObject => FamilyRule::Positions {
                required: 9,
                positions: SAY_OBJECT_POSITIONS,
            },
            Self::SayAnimal | Self::TalkPicture | Self::SustainedVowel => FamilyRule::First,
            Self::Diadochokinesis => FamilyRule::Partition {
                group_size: 3,
                labels: PTK_LABELS,
            },
        }
    }

    /// Rounding applied to this family's scores.
    pub fn precision(&self) -> Precision {
        match self {
            Self::SustainedVowel | Self::Diadochokinesis => Precision::Hundredths,
            _ => Precision::Integer,
        }
    }

    /// Look up a family by question code alone.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.code() == code)
    }

    /// Look up a family by question code, requiring the task type to match
    /// the table.
    pub fn lookup(task_type: TaskType, code: &str) -> Option<Self> {
        Self::from_code(code).filter(|f| f.task_type() == task_type)
    }
}

impl fmt::Display for TaskFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique_and_resolvable() {
        for family in TaskFamily::ALL {
            assert_eq!(TaskFamily::from_code(family.code()), Some(family));
        }
    }

    #[test]
    fn test_lookup_rejects_mismatched_task_type() {
        assert_eq!(
            TaskFamily::lookup(TaskType::Language, "SAY_OBJ"),
            Some(TaskFamily::SayObject)
        );
        assert_eq!(TaskFamily::lookup(TaskType::Speech, "SAY_OBJ"), None);
        assert_eq!(TaskFamily::lookup(TaskType::Speech, "NOPE"), None);
    }

    #[test]
    fn test_required_len() {
        assert_eq!(TaskFamily::SayObject.rule().required_len(), 9);
        assert_eq!(TaskFamily::Diadochokinesis.rule().required_len(), 12);
        assert_eq!(TaskFamily::SayAnimal.rule().required_len(), 1);
    }

    #[test]
    fn test_precision() {
        assert!((Precision::Integer.apply(3.9) - 3.0).abs() < f64::EPSILON);
        assert!((Precision::Hundredths.apply(1.23456) - 1.23).abs() < 1e-9);
        assert!((Precision::Hundredths.apply(2.005_1) - 2.01).abs() < 1e-9);
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&TaskFamily::Diadochokinesis).unwrap();
        assert_eq!(json, "\"PTK_SOUND\"");
    }
}
