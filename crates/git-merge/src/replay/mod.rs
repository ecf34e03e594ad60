//! The structural three-way tree merge engine.
//!
//! Diffs `base` against `ours` and against `theirs` with rename detection,
//! then classifies every resulting change pair-by-pair into a merge
//! [`plan::Plan`] — a pure decision with no object-database writes of its
//! own. Strategies and porcelain commands realize the plan into a tree or
//! into conflict-stage index entries.

pub mod assemble;
pub mod changeset;
pub mod classify;
pub mod filepair;
pub mod filespec;
pub mod plan;

pub use assemble::{assemble, replay_trees, report_plan};
pub use changeset::ChangeIndex;
pub use classify::{classify, ContentResult, StructureResult};
pub use filepair::Filepair;
pub use filespec::Filespec;
pub use plan::{MergeStatus, Plan, PlanEntry};
