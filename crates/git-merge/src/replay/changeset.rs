//! An ordered, preimage-path-searchable index over one side's filepairs.

use bstr::BStr;
use git_diff::DiffResult;

use super::filepair::Filepair;

/// Filepairs from one `base` vs. one side diff, sorted by preimage path
/// and deduplicated on it so that lookup can binary search.
///
/// The historical C source treats duplicate preimage paths in the input
/// queue as undefined behavior reserved to the diff producer. A safe Rust
/// binary search needs a well-ordered, unique-keyed slice to behave
/// predictably, so construction here defines the tie-break instead:
/// the first filepair encountered for a given preimage path wins and
/// later duplicates are dropped.
#[derive(Debug, Default)]
pub struct ChangeIndex {
    pairs: Vec<Filepair>,
}

impl ChangeIndex {
    /// Build the index from a tree-diff producer's result.
    pub fn from_diff(result: &DiffResult) -> Self {
        let mut pairs: Vec<Filepair> = result.files.iter().map(Filepair::from_file_diff).collect();
        pairs.sort_by(|a, b| a.preimage_path().cmp(b.preimage_path()));
        pairs.dedup_by(|a, b| a.preimage_path() == b.preimage_path());
        Self { pairs }
    }

    /// Look up the filepair whose preimage path matches `path`.
    ///
    /// Returns `None` when this side left the ancestor path untouched;
    /// callers treat that as a no-op filepair.
    pub fn find(&self, path: &BStr) -> Option<&Filepair> {
        self.pairs
            .binary_search_by(|pair| pair.preimage_path().as_slice().cmp(path.as_ref()))
            .ok()
            .map(|idx| &self.pairs[idx])
    }

    /// Iterate filepairs in preimage-path order.
    pub fn iter(&self) -> impl Iterator<Item = &Filepair> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
