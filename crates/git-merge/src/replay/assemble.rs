//! Plan assembly: combine two change indexes into one merge plan, and the
//! `replay_trees` entry point that drives the tree-diff producer.

use git_diff::rename::detect_renames;
use git_diff::tree::diff_trees;
use git_diff::DiffOptions;
use git_hash::ObjectId;
use git_repository::Repository;

use super::changeset::ChangeIndex;
use super::classify::classify;
use super::plan::{MergeStatus, Plan, PlanEntry};
use crate::{MergeError, MergeOptions};

/// Combine `ours`' and `theirs`' change indexes (both diffed against the
/// same `base`) into a merge plan.
///
/// Every filepair on `theirs`' side is classified against the matching (or
/// absent) filepair on `ours`' side. Paths `ours` touched but `theirs` left
/// alone never reach [`super::classify::classify`] — there is nothing to
/// decide, they stay exactly as `ours` already has them, so the plan has no
/// entry for them at all; realizing a plan means starting from `ours`, not
/// `base`.
pub fn assemble(ours: &ChangeIndex, theirs: &ChangeIndex) -> Plan {
    let mut plan = Plan::new();

    for their_pair in theirs.iter() {
        let our_pair = ours.find(their_pair.one.path.as_ref());
        for entry in classify(our_pair, their_pair) {
            plan.push(entry);
        }
    }

    plan
}

/// Diff `base` against `ours` and `theirs`, classify every change, and
/// return the resulting plan together with its overall status.
///
/// This is the external entry point the ORT strategy and `git merge-tree`
/// both drive; it only produces a decision, it never writes a tree or
/// touches the index — realizing the plan is the caller's job. `ours_label`
/// and `theirs_label` are purely informational: the engine never inspects
/// them, it only accepts them so callers can forward the same strings on to
/// [`report_plan`] and to `content::merge_content`'s conflict-marker labels
/// without needing a second channel to carry them.
pub fn replay_trees(
    repo: &mut Repository,
    base: &ObjectId,
    ours: &ObjectId,
    _ours_label: &str,
    theirs: &ObjectId,
    _theirs_label: &str,
    options: &MergeOptions,
) -> Result<(Plan, MergeStatus), MergeError> {
    let odb = repo.odb();

    let diff_opts = DiffOptions {
        detect_renames: true,
        rename_threshold: options.rename_threshold,
        ..DiffOptions::default()
    };

    let mut base_ours = diff_trees(odb, Some(base), Some(ours), &diff_opts)?;
    detect_renames(odb, &mut base_ours, diff_opts.rename_threshold)?;

    let mut base_theirs = diff_trees(odb, Some(base), Some(theirs), &diff_opts)?;
    detect_renames(odb, &mut base_theirs, diff_opts.rename_threshold)?;

    let ours_idx = ChangeIndex::from_diff(&base_ours);
    let theirs_idx = ChangeIndex::from_diff(&base_theirs);

    let plan = assemble(&ours_idx, &theirs_idx);
    let status = plan.status();
    Ok((plan, status))
}

/// Render a plan's conflicts as `CONFLICT (<type>): <path>` lines, in the
/// style of `git merge-tree`'s porcelain, and return the plan's real
/// status.
///
/// The historical C reporter (`show_merge_nu`) printed these lines but
/// returned a hardcoded failure status regardless of what it actually
/// found; this reporter's returned status always reflects the plan.
/// `ours_label`/`theirs_label` name the two sides being compared, e.g. the
/// branch names or revisions the caller resolved `ours`/`theirs` from.
pub fn report_plan<W: std::io::Write>(
    writer: &mut W,
    plan: &Plan,
    ours_label: &str,
    theirs_label: &str,
) -> std::io::Result<MergeStatus> {
    for entry in plan.iter() {
        if !entry.is_conflict() {
            continue;
        }
        writeln!(
            writer,
            "CONFLICT ({}): {} ({} vs. {})",
            conflict_label(entry),
            entry.result_path,
            ours_label,
            theirs_label
        )?;
    }
    Ok(plan.status())
}

fn conflict_label(entry: &PlanEntry) -> &'static str {
    use super::classify::{ContentResult, StructureResult};

    if matches!(
        entry.structure,
        StructureResult::ConflictOurs | StructureResult::ConflictTheirs
    ) {
        return "rename/rename";
    }
    match entry.content {
        ContentResult::AddAdd => "add/add",
        ContentResult::ModifyDelete => "modify/delete",
        ContentResult::DeleteModify => "delete/modify",
        _ => "content",
    }
}
