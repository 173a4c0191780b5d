//! Property-based tests for job planning and the settings store.
//!
//! Three property families are verified:
//!
//! 1. **Cross-product coverage**: for any non-empty bits-per-head set B and
//!    bit-width set W, the planner yields exactly |B|×|W| jobs, each a
//!    distinct (b, w) pair, with bits-per-head as the outer loop.
//!
//! 2. **Naming**: output directory names follow
//!    `{author_}{model}_EXL2_{bpw}bpw_H{bph}` and never collide with the
//!    job's temp directory.
//!
//! 3. **Settings round-trip**: saving then reloading reproduces every field,
//!    and the comma-joined selections split back into the same sets.

use autoquant::{plan, restore_selection, JobContext, OptionSet, Settings, BPW_PRESETS};
use proptest::prelude::*;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Shared strategies
// ---------------------------------------------------------------------------

/// A decimal with at most one fractional digit, like the form's values.
fn numeric_value() -> impl Strategy<Value = String> {
    (1_u32..=16, 0_u32..=9).prop_map(|(int, frac)| {
        if frac == 0 { int.to_string() } else { format!("{int}.{frac}") }
    })
}

/// A non-empty list of distinct numeric values.
fn value_set() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set(numeric_value(), 1..=6).prop_map(|s| s.into_iter().collect())
}

fn model_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9.-]{0,15}"
}

fn author() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[A-Za-z][A-Za-z0-9]{0,7}")
}

// ---------------------------------------------------------------------------
// Property 1: Cross-product coverage
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_plan_covers_cross_product(heads in value_set(), widths in value_set()) {
        let b = OptionSet::parse(&heads.join(",")).unwrap();
        let w = OptionSet::parse(&widths.join(",")).unwrap();
        let jobs = plan(&b, &w, JobContext::new("M", "/w")).unwrap();

        prop_assert_eq!(jobs.len(), heads.len() * widths.len());

        let pairs: HashSet<(String, String)> = jobs
            .iter()
            .map(|j| (j.bits_per_head.clone(), j.bpw.clone()))
            .collect();
        prop_assert_eq!(pairs.len(), jobs.len(), "pairs must be distinct");

        for head in &heads {
            for width in &widths {
                prop_assert!(pairs.contains(&(head.clone(), width.clone())));
            }
        }
    }

    #[test]
    fn prop_plan_outer_loop_is_bits_per_head(heads in value_set(), widths in value_set()) {
        let b = OptionSet::parse(&heads.join(",")).unwrap();
        let w = OptionSet::parse(&widths.join(",")).unwrap();
        let jobs = plan(&b, &w, JobContext::new("M", "/w")).unwrap();

        for (idx, job) in jobs.iter().enumerate() {
            prop_assert_eq!(&job.bits_per_head, &heads[idx / widths.len()]);
            prop_assert_eq!(&job.bpw, &widths[idx % widths.len()]);
        }
    }

    #[test]
    fn prop_plan_empty_set_is_input_error(heads in value_set()) {
        let b = OptionSet::parse(&heads.join(",")).unwrap();
        let empty = OptionSet::default();
        prop_assert!(plan(&b, &empty, JobContext::new("M", "/w")).unwrap_err().is_input());
        prop_assert!(plan(&empty, &b, JobContext::new("M", "/w")).unwrap_err().is_input());
    }
}

// ---------------------------------------------------------------------------
// Property 2: Naming
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_output_dir_name_format(
        model in model_name(),
        author in author(),
        head in numeric_value(),
        width in numeric_value(),
    ) {
        let b = OptionSet::parse(&head).unwrap();
        let w = OptionSet::parse(&width).unwrap();
        let context = JobContext::new(model.clone(), "/w").with_author(author.as_deref());
        let jobs = plan(&b, &w, context).unwrap();
        prop_assert_eq!(jobs.len(), 1);

        let expected = match &author {
            Some(a) => format!("{a}_{model}_EXL2_{width}bpw_H{head}"),
            None => format!("{model}_EXL2_{width}bpw_H{head}"),
        };
        prop_assert_eq!(jobs[0].output_dir_name(), expected);
        prop_assert_eq!(jobs[0].temp_dir_name(), format!("temp_{model}_{width}bpw_H{head}"));
        prop_assert_ne!(jobs[0].output_dir_name(), jobs[0].temp_dir_name());
    }
}

// ---------------------------------------------------------------------------
// Property 3: Settings round-trip
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_settings_toml_roundtrip(
        model in model_name(),
        author in "[A-Za-z ]{0,10}",
        heads in value_set(),
        widths in value_set(),
    ) {
        let saved = Settings {
            model_name: model,
            author_name: author,
            bits_per_head: heads.join(","),
            bpw_values: widths.join(","),
            ..Default::default()
        };

        let loaded = Settings::from_toml(&saved.to_toml().unwrap()).unwrap();
        prop_assert_eq!(&loaded, &saved);

        let restored: HashSet<String> = OptionSet::parse(&loaded.bpw_values).unwrap().values().iter().cloned().collect();
        let original: HashSet<String> = widths.into_iter().collect();
        prop_assert_eq!(restored, original);
    }

    #[test]
    fn prop_restore_selection_recovers_set(widths in value_set()) {
        let saved = OptionSet::parse(&widths.join(",")).unwrap();
        let selection = restore_selection(BPW_PRESETS, &saved.joined());

        for preset in &selection.checked {
            prop_assert!(BPW_PRESETS.contains(&preset.as_str()));
        }

        let restored = OptionSet::merge(&selection.checked[..], &selection.custom).unwrap();
        let a: HashSet<&str> = restored.iter().collect();
        let b: HashSet<&str> = saved.iter().collect();
        prop_assert_eq!(a, b);
    }
}
