//! Dedup resolver: picks one canonical recording per question.

use std::cmp::Ordering;

use crate::domain::models::Keyed;

/// Reduce `recordings` to one canonical member per
/// (patient, attempt, task, question, question-number) group.
///
/// The member with the highest sub-attempt wins; ties go to the latest
/// creation time, and remaining ties to the earliest input position. The
/// output is ordered by group, so it is deterministic for a given input.
pub fn resolve<T: Keyed>(recordings: Vec<T>) -> Vec<T> {
    let mut indexed: Vec<(usize, T)> = recordings.into_iter().enumerate().collect();

    // Group-major, best candidate first within a group. Sort is stable and the
    // input position is the final tie-break.
    indexed.sort_by(|(ia, a), (ib, b)| {
        let (ka, kb) = (a.recording_key(), b.recording_key());
        ka.group()
            .cmp(&kb.group())
            .then_with(|| kb.sub_attempt.cmp(&ka.sub_attempt))
            .then_with(|| newer_first(a, b))
            .then_with(|| ia.cmp(ib))
    });

    let mut canonical: Vec<T> = Vec::with_capacity(indexed.len());
    for (_, rec) in indexed {
        let same_group = canonical
            .last()
            .is_some_and(|prev| prev.recording_key().group() == rec.recording_key().group());
        if !same_group {
            canonical.push(rec);
        }
    }
    canonical
}

fn newer_first<T: Keyed>(a: &T, b: &T) -> Ordering {
    match (a.created_at(), b.created_at()) {
        (Some(ta), Some(tb)) => tb.cmp(&ta),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{RecordingKey, RecordingMeta, TaskType};
    use chrono::{Duration, TimeZone, Utc};

    fn meta(code: &str, qno: i64, sub: i64) -> RecordingMeta {
        RecordingMeta {
            key: RecordingKey::new("1001", 1, TaskType::Language, code, qno, sub),
            duration: 1.0,
            sample_rate: 16_000,
            created_at: None,
        }
    }

    #[test]
    fn test_single_member_group_passes_through() {
        let out = resolve(vec![meta("SAY_ANI", 0, 0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key.sub_attempt, 0);
    }

    #[test]
    fn test_highest_sub_attempt_wins() {
        let out = resolve(vec![
            meta("SAY_OBJ", 3, 0),
            meta("SAY_OBJ", 3, 2),
            meta("SAY_OBJ", 3, 1),
            meta("SAY_OBJ", 4, 0),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key.question_no, 3);
        assert_eq!(out[0].key.sub_attempt, 2);
        assert_eq!(out[1].key.question_no, 4);
    }

    #[test]
    fn test_tie_broken_by_latest_creation_time() {
        let base = Utc.with_ymd_and_hms(2025, 8, 1, 9, 0, 0).unwrap();
        let mut older = meta("LTN_RPT", 1, 1);
        older.created_at = Some(base);
        older.duration = 1.0;
        let mut newer = meta("LTN_RPT", 1, 1);
        newer.created_at = Some(base + Duration::seconds(30));
        newer.duration = 2.0;

        let out = resolve(vec![older, newer]);
        assert_eq!(out.len(), 1);
        assert!((out[0].duration - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tie_without_times_keeps_first_input() {
        let mut first = meta("LTN_RPT", 1, 1);
        first.duration = 7.0;
        let second = meta("LTN_RPT", 1, 1);

        let out = resolve(vec![first, second]);
        assert_eq!(out.len(), 1);
        assert!((out[0].duration - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_task_type_separates_groups() {
        let a = meta("X", 0, 0);
        let mut b = meta("X", 0, 1);
        b.key.task_type = TaskType::Speech;
        assert_eq!(resolve(vec![a, b]).len(), 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        proptest! {
            #[test]
            fn one_member_per_group_with_max_sub_attempt(
                items in prop::collection::vec((0i64..3, 0i64..4, 0i64..5), 0..40)
            ) {
                let input: Vec<RecordingMeta> = items
                    .iter()
                    .map(|(code, qno, sub)| meta(["A", "B", "C"][*code as usize], *qno, *sub))
                    .collect();

                let mut expected: HashMap<(String, i64), i64> = HashMap::new();
                for m in &input {
                    let entry = expected
                        .entry((m.key.question_code.clone(), m.key.question_no))
                        .or_insert(m.key.sub_attempt);
                    *entry = (*entry).max(m.key.sub_attempt);
                }

                let out = resolve(input);
                prop_assert_eq!(out.len(), expected.len());
                for m in &out {
                    let max = expected[&(m.key.question_code.clone(), m.key.question_no)];
                    prop_assert_eq!(m.key.sub_attempt, max);
                }
            }
        }
    }
}
