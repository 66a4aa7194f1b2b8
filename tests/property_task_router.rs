use proptest::prelude::*;
use std::collections::HashSet;

use speechscore::domain::models::TaskFamily;
use speechscore::services::task_router::plan_invocations;

fn family_strategy() -> impl Strategy<Value = TaskFamily> {
    prop::sample::select(TaskFamily::ALL.to_vec())
}

proptest! {
    /// Property: a plan exists exactly when the family's arity is met
    #[test]
    fn prop_plan_exists_iff_arity_met(family in family_strategy(), len in 0usize..30) {
        let rule = family.rule();
        let plan = plan_invocations(rule, len);
        prop_assert_eq!(plan.is_some(), len > 0 && len >= rule.required_len());
    }

    /// Property: invocations only reference routed recordings, and no
    /// recording feeds two invocations
    #[test]
    fn prop_inputs_in_range_and_disjoint(family in family_strategy(), len in 1usize..30) {
        if let Some(plan) = plan_invocations(family.rule(), len) {
            let mut seen = HashSet::new();
            for invocation in &plan {
                prop_assert!(!invocation.inputs.is_empty());
                for &i in &invocation.inputs {
                    prop_assert!(i < len, "input {} out of range for {} recordings", i, len);
                    prop_assert!(seen.insert(i), "input {} used twice", i);
                }
            }
        }
    }

    /// Property: ordinals and labels appear only where the family uses them
    #[test]
    fn prop_ordinals_and_labels_follow_family(family in family_strategy(), len in 1usize..30) {
        if let Some(plan) = plan_invocations(family.rule(), len) {
            let ordinals = plan.iter().filter(|i| i.ordinal.is_some()).count();
            let labels = plan.iter().filter(|i| i.label.is_some()).count();

            match family {
                TaskFamily::GuessEnding => {
                    prop_assert_eq!(ordinals, len);
                    prop_assert_eq!(labels, 0);
                }
                TaskFamily::Diadochokinesis => {
                    prop_assert_eq!(labels, 4);
                    prop_assert_eq!(ordinals, 0);
                }
                _ => {
                    prop_assert_eq!(plan.len(), 1);
                    prop_assert_eq!(ordinals + labels, 0);
                }
            }
        }
    }
}
