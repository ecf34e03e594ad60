//! Per-path structural and content classification.

use bstr::BString;

use super::filepair::Filepair;
use super::filespec::Filespec;
use super::plan::PlanEntry;

/// Structural (path) verdict: which of `ours`/`theirs` wins the path the
/// merged content should occupy, and whether that's itself a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureResult {
    Ours,
    Theirs,
    ConflictOurs,
    ConflictTheirs,
}

/// Content verdict: how the blob contents at the winning path should be
/// resolved, independent of the structural outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentResult {
    Ours,
    Theirs,
    Add,
    Delete,
    Merge,
    DeleteModify,
    ModifyDelete,
    AddAdd,
}

impl ContentResult {
    /// Whether this verdict alone makes the entry a conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::DeleteModify | Self::ModifyDelete | Self::AddAdd
        )
    }
}

impl StructureResult {
    /// Whether this verdict alone makes the entry a conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictOurs | Self::ConflictTheirs)
    }
}

/// Classify one `theirs` change against the matching (possibly absent)
/// `ours` change, producing one plan entry, or two when the two sides
/// renamed the ancestor path to different destinations.
///
/// `their_pair` is always a real change; `our_pair` is `None` when `ours`
/// left the ancestor path untouched since `base`.
pub fn classify(our_pair: Option<&Filepair>, their_pair: &Filepair) -> Vec<PlanEntry> {
    let base = their_pair.one.clone();
    let ours = our_pair
        .map(|p| p.two.clone())
        .unwrap_or_else(|| their_pair.one.clone());
    let theirs = their_pair.two.clone();

    let content = classify_content(&base, &ours, &theirs);

    let their_renamed = their_pair.is_rename;
    let our_renamed = our_pair.map_or(false, |p| p.is_rename);

    let our_path = ours.path.clone();

    let first = if !their_renamed {
        PlanEntry {
            our_path: our_path.clone(),
            result_path: ours.path.clone(),
            base: base.clone(),
            ours: ours.clone(),
            theirs: theirs.clone(),
            structure: StructureResult::Ours,
            content,
        }
    } else if !our_renamed {
        PlanEntry {
            our_path: our_path.clone(),
            result_path: theirs.path.clone(),
            base: base.clone(),
            ours: ours.clone(),
            theirs: theirs.clone(),
            structure: StructureResult::Theirs,
            content,
        }
    } else if ours.path == theirs.path {
        PlanEntry {
            our_path: our_path.clone(),
            result_path: ours.path.clone(),
            base: base.clone(),
            ours: ours.clone(),
            theirs: theirs.clone(),
            structure: StructureResult::Ours,
            content,
        }
    } else {
        PlanEntry {
            our_path: our_path.clone(),
            result_path: ours.path.clone(),
            base: base.clone(),
            ours: ours.clone(),
            theirs: theirs.clone(),
            structure: StructureResult::ConflictOurs,
            content,
        }
    };

    if first.structure != StructureResult::ConflictOurs {
        return vec![first];
    }

    // Record the "other half" of a rename conflict: both candidate
    // destinations, so the plan sink can realize both forks.
    let second = PlanEntry {
        our_path: theirs.path.clone(),
        result_path: theirs.path.clone(),
        base,
        ours,
        theirs,
        structure: StructureResult::ConflictTheirs,
        content,
    };

    vec![first, second]
}

fn classify_content(base: &Filespec, ours: &Filespec, theirs: &Filespec) -> ContentResult {
    if !theirs.is_present() {
        return if !ours.is_present() {
            ContentResult::Ours
        } else if Filespec::same(base, ours) {
            ContentResult::Delete
        } else {
            ContentResult::ModifyDelete
        };
    }

    if !base.is_present() {
        return if !ours.is_present() {
            ContentResult::Add
        } else if Filespec::same(theirs, ours) {
            ContentResult::Ours
        } else {
            ContentResult::AddAdd
        };
    }

    if Filespec::same(theirs, ours) {
        return ContentResult::Ours;
    }
    if !ours.is_present() {
        return ContentResult::DeleteModify;
    }
    if Filespec::same(base, ours) {
        return ContentResult::Theirs;
    }
    ContentResult::Merge
}

/// Used only by tests below; real callers go through [`classify`].
#[allow(dead_code)]
fn path(s: &str) -> BString {
    BString::from(s)
}
