//! Ordered reconcile plans.

use std::collections::BTreeSet;

use crate::children::{ChildDescriptor, ChildKey};

/// Rendered children of one object, ordered by dependency tier.
///
/// The reconcile loop walks the steps front to back and acts on the first
/// one that needs work, so the order here is the order of creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<ChildDescriptor>,
}

impl Plan {
    /// Build a plan; render order is kept within a tier.
    pub fn new(mut steps: Vec<ChildDescriptor>) -> Self {
        steps.sort_by_key(|d| d.kind().tier());
        Self { steps }
    }

    pub fn steps(&self) -> &[ChildDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Keys of claimed children the plan wants to exist.
    pub fn claimed(&self) -> BTreeSet<&ChildKey> {
        self.steps
            .iter()
            .filter(|d| d.claimed_by.is_some() && d.is_present())
            .map(|d| &d.key)
            .collect()
    }

    /// Member ids that have per-member children in this plan.
    pub fn members(&self) -> BTreeSet<String> {
        self.steps
            .iter()
            .filter(|d| d.is_present())
            .filter_map(ChildDescriptor::member)
            .map(ToString::to_string)
            .collect()
    }
}

impl IntoIterator for Plan {
    type Item = ChildDescriptor;
    type IntoIter = std::vec::IntoIter<ChildDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}
