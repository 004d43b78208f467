#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Diffing between the rendered annotation set and a new visible set.
//!
//! Removing and re-adding every marker on each recomputation makes the map
//! flicker. [`AnnotationReconciler`] works out which markers actually
//! changed, falling back to a full replace when the sets differ so much
//! that a fine-grained diff would not save anything.
//!
//! Markers are matched by [`Annotation::same_marker`]: same kind (and
//! current bin), same source ID, same position at the configured
//! coordinate precision. Identical markers are matched one for one, so
//! the diff always accounts for every copy on the surface.

use std::collections::HashMap;
use std::sync::Arc;

use chart_map_annotation_models::{Annotation, AnnotationKey};
use chart_map_config::MapConfig;

/// Thresholds controlling when the reconciler gives up on a fine-grained
/// diff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePolicy {
    /// Replace everything when the set sizes differ by more than this.
    pub full_replace_delta: usize,
    /// Replace everything when the next set is larger than this.
    pub full_replace_max: usize,
    /// Coordinate precision (degrees) for marker identity.
    pub coordinate_precision: f64,
}

impl ReconcilePolicy {
    /// Reads the reconciliation thresholds from `config`.
    #[must_use]
    pub const fn from_config(config: &MapConfig) -> Self {
        Self {
            full_replace_delta: config.full_replace_delta,
            full_replace_max: config.full_replace_max,
            coordinate_precision: config.coordinate_precision,
        }
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::from_config(&MapConfig::default())
    }
}

/// Markers to add and remove to turn the rendered set into the next set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationDiff {
    /// Markers to add, in next-set order.
    pub to_add: Vec<Arc<Annotation>>,
    /// Markers to remove, in rendered-set order.
    pub to_remove: Vec<Arc<Annotation>>,
    /// Whether this is a full replace rather than a fine-grained diff.
    pub full_replace: bool,
}

/// One chunk of a diff to apply in a single render update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiffBatch<'a> {
    /// Markers to remove.
    Remove(&'a [Arc<Annotation>]),
    /// Markers to add.
    Add(&'a [Arc<Annotation>]),
}

impl AnnotationDiff {
    /// Whether there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of add and remove operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    /// Splits the diff into batches of at most `chunk_size` markers:
    /// removals first, then additions.
    ///
    /// Applying one batch per render update keeps any single UI update
    /// small. A `chunk_size` of zero is treated as one.
    pub fn batches(&self, chunk_size: usize) -> impl Iterator<Item = DiffBatch<'_>> {
        let size = chunk_size.max(1);
        self.to_remove
            .chunks(size)
            .map(DiffBatch::Remove)
            .chain(self.to_add.chunks(size).map(DiffBatch::Add))
    }
}

/// Computes add/remove diffs between annotation sets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnnotationReconciler {
    policy: ReconcilePolicy,
}

impl AnnotationReconciler {
    /// Creates a reconciler with `policy`.
    #[must_use]
    pub const fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    /// The thresholds in use.
    #[must_use]
    pub const fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Diffs the rendered set `current` against the newly computed `next`.
    ///
    /// 1. Same length and the same markers in the same order: empty diff.
    /// 2. Sizes differ by more than `full_replace_delta`, or `next` is
    ///    larger than `full_replace_max`: remove all of `current`, add all
    ///    of `next`.
    /// 3. Otherwise add the markers only in `next` and remove the markers
    ///    only in `current`, counting repeated markers individually.
    #[must_use]
    pub fn reconcile(
        &self,
        current: &[Arc<Annotation>],
        next: &[Arc<Annotation>],
    ) -> AnnotationDiff {
        let precision = self.policy.coordinate_precision;

        if current.len() == next.len()
            && current
                .iter()
                .zip(next)
                .all(|(a, b)| a.same_marker(b, precision))
        {
            return AnnotationDiff::default();
        }

        if current.len().abs_diff(next.len()) > self.policy.full_replace_delta
            || next.len() > self.policy.full_replace_max
        {
            log::debug!(
                "Full annotation replace: {} -> {} markers",
                current.len(),
                next.len()
            );
            return AnnotationDiff {
                to_add: next.to_vec(),
                to_remove: current.to_vec(),
                full_replace: true,
            };
        }

        let current_keys: Vec<AnnotationKey> = current.iter().map(|a| a.key(precision)).collect();
        let next_keys: Vec<AnnotationKey> = next.iter().map(|a| a.key(precision)).collect();

        // Keys are matched by count: a key shown twice but wanted once
        // leaves one copy to remove.
        let to_add = unmatched(next, &next_keys, &current_keys);
        let to_remove = unmatched(current, &current_keys, &next_keys);

        log::trace!("Annotation diff: +{} -{}", to_add.len(), to_remove.len());

        AnnotationDiff {
            to_add,
            to_remove,
            full_replace: false,
        }
    }
}

/// The annotations of `side` left over after pairing each of its keys
/// with one occurrence of the same key in `other`, in `side` order.
fn unmatched(
    side: &[Arc<Annotation>],
    side_keys: &[AnnotationKey],
    other_keys: &[AnnotationKey],
) -> Vec<Arc<Annotation>> {
    let mut available: HashMap<&AnnotationKey, usize> = HashMap::new();
    for key in other_keys {
        *available.entry(key).or_default() += 1;
    }

    side.iter()
        .zip(side_keys)
        .filter(|(_, key)| match available.get_mut(key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .map(|(annotation, _)| Arc::clone(annotation))
        .collect()
}
