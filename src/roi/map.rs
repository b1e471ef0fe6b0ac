//! The original-label to new-label mapping.
//!
//! Built once per invocation from a [`GroupSpec`] and immutable afterwards.
//! When a label is claimed by more than one group the first claim wins;
//! later claims are dropped, warned about, and recorded so callers can
//! inspect conflicts instead of scraping a warning stream.

use crate::error::{Error, Result};
use crate::roi::groups::GroupSpec;
use std::collections::HashMap;

/// A dropped claim on an already-mapped original label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelConflict {
    /// The original label claimed twice.
    pub label: i32,
    /// The new label it stays mapped to (first claim).
    pub kept: i32,
    /// The new label the dropped claim wanted.
    pub dropped: i32,
}

/// Finite mapping from original labels to new ROI labels.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    map: HashMap<i32, i32>,
    conflicts: Vec<LabelConflict>,
}

impl LabelMap {
    /// Build the mapping from a grouping.
    ///
    /// For the ordered-groups form, the group at index `i` is assigned
    /// `start_label + i`. For the mapping form, keys are used verbatim and
    /// iterated in ascending order, elements in listed order; this fixes
    /// which claim is "first" when groups overlap.
    pub fn from_spec(spec: &GroupSpec, start_label: i32) -> Result<Self> {
        let mut built = Self::default();

        match spec {
            GroupSpec::Groups(groups) => {
                for (idx, group) in groups.iter().enumerate() {
                    let new_label = checked_label(i64::from(start_label) + idx as i64)?;
                    for &label in group {
                        built.claim(checked_label(label)?, new_label);
                    }
                }
            }
            GroupSpec::Map(entries) => {
                for (&new_label, originals) in entries {
                    let new_label = checked_label(new_label)?;
                    for &label in originals {
                        built.claim(checked_label(label)?, new_label);
                    }
                }
            }
        }

        tracing::debug!(
            labels = built.map.len(),
            conflicts = built.conflicts.len(),
            "built label mapping"
        );
        Ok(built)
    }

    fn claim(&mut self, label: i32, new_label: i32) {
        if let Some(&kept) = self.map.get(&label) {
            tracing::warn!(
                "original label {label} already mapped to {kept}; keeping first mapping"
            );
            self.conflicts.push(LabelConflict {
                label,
                kept,
                dropped: new_label,
            });
        } else {
            self.map.insert(label, new_label);
        }
    }

    /// New label for an original label, if mapped.
    pub fn get(&self, label: i32) -> Option<i32> {
        self.map.get(&label).copied()
    }

    /// True when the original label has a mapping entry.
    pub fn contains(&self, label: i32) -> bool {
        self.map.contains_key(&label)
    }

    /// Number of mapped original labels.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no labels are mapped.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Largest new label, or 0 for an empty mapping.
    pub fn max_new_label(&self) -> i32 {
        self.map.values().copied().max().unwrap_or(0)
    }

    /// Claims dropped by the first-wins rule, in the order they were seen.
    pub fn conflicts(&self) -> &[LabelConflict] {
        &self.conflicts
    }

    /// Iterate over `(original, new)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.map.iter().map(|(&k, &v)| (k, v))
    }
}

fn checked_label(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::LabelOutOfRange(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn sequence_groups_assign_from_start_label() {
        let spec = GroupSpec::Groups(vec![vec![10, 11], vec![20], vec![30, 31]]);
        let map = LabelMap::from_spec(&spec, 5).unwrap();

        assert_eq!(map.get(10), Some(5));
        assert_eq!(map.get(11), Some(5));
        assert_eq!(map.get(20), Some(6));
        assert_eq!(map.get(31), Some(7));
        assert_eq!(map.max_new_label(), 7);
        assert!(map.conflicts().is_empty());
    }

    #[test]
    fn first_wins_within_sequence() {
        // Label 2 is claimed by both groups; the first claim holds.
        let spec = GroupSpec::Groups(vec![vec![1, 2], vec![2, 3]]);
        let map = LabelMap::from_spec(&spec, 1).unwrap();

        assert_eq!(map.get(2), Some(1));
        assert_eq!(map.get(3), Some(2));
        assert_eq!(
            map.conflicts(),
            &[LabelConflict {
                label: 2,
                kept: 1,
                dropped: 2
            }]
        );
    }

    #[test]
    fn mapping_form_uses_keys_verbatim() {
        let spec = GroupSpec::Map(BTreeMap::from([(7, vec![1, 2]), (100, vec![3])]));
        let map = LabelMap::from_spec(&spec, 1).unwrap();

        assert_eq!(map.get(1), Some(7));
        assert_eq!(map.get(3), Some(100));
        assert_eq!(map.max_new_label(), 100);
    }

    #[test]
    fn mapping_form_conflicts_resolve_in_key_order() {
        // Label 5 is claimed under keys 2 and 9; ascending key order makes
        // the key-2 claim first.
        let spec = GroupSpec::Map(BTreeMap::from([(9, vec![5]), (2, vec![5])]));
        let map = LabelMap::from_spec(&spec, 1).unwrap();

        assert_eq!(map.get(5), Some(2));
        assert_eq!(
            map.conflicts(),
            &[LabelConflict {
                label: 5,
                kept: 2,
                dropped: 9
            }]
        );
    }

    #[test]
    fn duplicate_label_within_one_group_conflicts_once() {
        let spec = GroupSpec::Groups(vec![vec![1, 1]]);
        let map = LabelMap::from_spec(&spec, 1).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.conflicts().len(), 1);
    }

    #[test]
    fn empty_spec_yields_empty_map() {
        let map = LabelMap::from_spec(&GroupSpec::Groups(vec![]), 1).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.max_new_label(), 0);
    }

    #[test]
    fn labels_outside_i32_are_rejected() {
        let spec = GroupSpec::Groups(vec![vec![i64::from(i32::MAX) + 1]]);
        assert!(matches!(
            LabelMap::from_spec(&spec, 1),
            Err(Error::LabelOutOfRange(_))
        ));
    }

    #[test]
    fn start_label_overflow_is_rejected() {
        let spec = GroupSpec::Groups(vec![vec![1], vec![2]]);
        assert!(LabelMap::from_spec(&spec, i32::MAX).is_err());
    }
}
