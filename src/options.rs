//! Option sets: the bits-per-head and bit-width selections a run expands.
//!
//! A selection is made of checked presets plus a free-form comma-separated
//! list of custom values. [`OptionSet::merge`] combines both into one ordered
//! list of distinct values; [`restore_selection`] goes the other way when a
//! saved selection is loaded back.

use crate::errors::{AutoquantError, Result};
use std::fmt;

/// Preset bits-per-head choices offered as checkboxes.
pub const BITS_PER_HEAD_PRESETS: &[&str] = &["6", "8"];

/// Preset bit-width (bpw) choices offered as checkboxes.
pub const BPW_PRESETS: &[&str] = &[
    "1.5", "2", "2.5", "3", "3.5", "4", "4.5", "5", "5.5", "6", "6.5", "7", "7.5", "8",
];

/// Ordered set of distinct, string-encoded numeric values.
///
/// The original text of each value is kept (after trimming) because it ends
/// up verbatim in directory names and on the tool's command line: `4` and
/// `4.0` are different directories even though they are the same number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    values: Vec<String>,
}

impl OptionSet {
    /// Merge checked presets with a comma-separated custom entry.
    ///
    /// Presets come first in the order given, custom values after them in
    /// entry order. Blank entries are skipped and repeated values keep only
    /// their first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`AutoquantError::Input`] if any value is not a finite
    /// positive number.
    pub fn merge<S: AsRef<str>>(checked: &[S], custom: &str) -> Result<Self> {
        let mut set = OptionSet::default();
        let presets = checked.iter().map(|s| s.as_ref());
        for value in presets.chain(split_list(custom)) {
            set.push(value)?;
        }
        Ok(set)
    }

    /// Parse a comma-joined list as stored in the settings file.
    pub fn parse(list: &str) -> Result<Self> {
        Self::merge::<&str>(&[], list)
    }

    fn push(&mut self, raw: &str) -> Result<()> {
        let value = raw.trim();
        if value.is_empty() || self.contains(value) {
            return Ok(());
        }
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => {
                self.values.push(value.to_string());
                Ok(())
            }
            _ => Err(AutoquantError::input(format!("'{value}' is not a valid positive number"))),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Comma-joined form used by the settings store.
    pub fn joined(&self) -> String {
        self.values.join(",")
    }
}

impl fmt::Display for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values.join(", "))
    }
}

/// A saved selection split back into checkbox state and custom entry text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Presets that were part of the saved list, in catalogue order.
    pub checked: Vec<String>,
    /// Saved values that are not presets, comma-joined in saved order.
    pub custom: String,
}

/// Split a saved comma-joined list into the presets it checks and the
/// leftover custom values.
///
/// Presets are matched by their label, so a previously checked preset comes
/// back checked.
pub fn restore_selection(presets: &[&str], saved: &str) -> Selection {
    let saved: Vec<&str> = split_list(saved).filter(|s| !s.is_empty()).collect();

    let checked = presets
        .iter()
        .filter(|p| saved.contains(*p))
        .map(|p| p.to_string())
        .collect();

    let mut custom: Vec<&str> = Vec::new();
    for value in saved {
        if !presets.contains(&value) && !custom.contains(&value) {
            custom.push(value);
        }
    }

    Selection { checked, custom: custom.join(",") }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_presets_then_custom() {
        let set = OptionSet::merge(&["4", "6"], " 3.7, 5.25 ").unwrap();
        assert_eq!(set.values(), &["4", "6", "3.7", "5.25"]);
        assert_eq!(set.joined(), "4,6,3.7,5.25");
    }

    #[test]
    fn test_merge_drops_blank_and_duplicates() {
        let set = OptionSet::merge(&["4"], ",4, ,,4.5,4.5,").unwrap();
        assert_eq!(set.values(), &["4", "4.5"]);
    }

    #[test]
    fn test_merge_empty_is_empty() {
        let set = OptionSet::merge::<&str>(&[], "  ").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_merge_rejects_non_numeric() {
        let err = OptionSet::merge(&["4"], "4.5,abc").unwrap_err();
        assert!(err.is_input());
        assert!(OptionSet::parse("0").is_err());
        assert!(OptionSet::parse("-2").is_err());
        assert!(OptionSet::parse("inf").is_err());
    }

    #[test]
    fn test_restore_selection_matches_by_label() {
        let sel = restore_selection(BPW_PRESETS, "4,6.5,3.7,5.25");
        assert_eq!(sel.checked, vec!["4".to_string(), "6.5".to_string()]);
        assert_eq!(sel.custom, "3.7,5.25");
    }

    #[test]
    fn test_restore_selection_roundtrips_through_merge() {
        let original = OptionSet::merge(&["2.5", "8"], "3.14").unwrap();
        let sel = restore_selection(BPW_PRESETS, &original.joined());
        let restored = OptionSet::merge(&sel.checked[..], &sel.custom).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_restore_selection_empty() {
        let sel = restore_selection(BITS_PER_HEAD_PRESETS, "");
        assert!(sel.checked.is_empty());
        assert!(sel.custom.is_empty());
    }
}
