//! Before/after filespec pairs, built from a tree-diff producer's output.

use git_diff::{FileDiff, FileStatus};

use super::filespec::Filespec;

/// A single change observed between two trees: `one` is the preimage
/// (ancestor side), `two` is the postimage. Either side may be absent.
/// `is_rename` reflects the diff producer's own judgment (exact or fuzzy
/// rename/copy match) — the engine never re-derives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filepair {
    pub one: Filespec,
    pub two: Filespec,
    pub is_rename: bool,
}

impl Filepair {
    /// Build a filepair from a single [`FileDiff`] entry produced by
    /// `git_diff::tree::diff_trees` (after rename detection has run).
    pub fn from_file_diff(fd: &FileDiff) -> Self {
        let one = match (&fd.old_path, fd.old_mode, fd.old_oid) {
            (Some(path), Some(mode), Some(oid)) => Filespec::present(path.clone(), mode, oid),
            (Some(path), _, _) => Filespec::absent(path.clone()),
            (None, _, _) => Filespec::absent(fd.path().clone()),
        };

        let two = match (&fd.new_path, fd.new_mode, fd.new_oid) {
            (Some(path), Some(mode), Some(oid)) => Filespec::present(path.clone(), mode, oid),
            (Some(path), _, _) => Filespec::absent(path.clone()),
            (None, _, _) => Filespec::absent(fd.path().clone()),
        };

        Self {
            one,
            two,
            is_rename: matches!(fd.status, FileStatus::Renamed | FileStatus::Copied),
        }
    }

    /// The preimage path used to key this filepair in a [`super::changeset::ChangeIndex`].
    pub fn preimage_path(&self) -> &bstr::BString {
        &self.one.path
    }
}
