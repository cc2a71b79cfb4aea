//! Dirty-field bookkeeping.

use std::collections::BTreeSet;

/// Indices of fields written since construction (or since the last
/// [`take`](Self::take)). A set, so repeated writes mark a field once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DirtyFields {
    marks: BTreeSet<usize>,
}

impl DirtyFields {
    /// Returns true if the field was not yet marked.
    pub(crate) fn mark(&mut self, idx: usize) -> bool {
        self.marks.insert(idx)
    }

    pub(crate) fn contains(&self, idx: usize) -> bool {
        self.marks.contains(&idx)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Marked indices in ascending (declaration) order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.marks.iter().copied()
    }

    pub(crate) fn clear(&mut self) {
        self.marks.clear();
    }

    pub(crate) fn take(&mut self) -> BTreeSet<usize> {
        std::mem::take(&mut self.marks)
    }
}
