use std::io::{self, Write};

use anyhow::{bail, Result};
use bstr::{BString, ByteSlice};
use clap::Args;
use git_hash::ObjectId;
use git_merge::replay::{self, ContentResult, MergeStatus, Plan, StructureResult};
use git_merge::MergeOptions;
use git_object::{FileMode, Object, Tree, TreeEntry};
use git_revwalk::resolve_revision;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct MergeTreeArgs {
    /// Write the resulting tree object to the object database
    #[arg(long)]
    pub write_tree: bool,

    /// Show only conflicting file names
    #[arg(long)]
    pub name_only: bool,

    /// Use NUL as line terminator
    #[arg(short = 'z')]
    pub nul_terminated: bool,

    /// Base tree-ish (common ancestor)
    pub base: String,

    /// First branch tree-ish
    pub branch1: String,

    /// Second branch tree-ish
    pub branch2: String,
}

pub fn run(args: &MergeTreeArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let base_tree = resolve_to_tree(&repo, &args.base)?;
    let ours_tree = resolve_to_tree(&repo, &args.branch1)?;
    let theirs_tree = resolve_to_tree(&repo, &args.branch2)?;

    let options = MergeOptions::default();
    let (plan, status) = replay::replay_trees(
        &mut repo,
        &base_tree,
        &ours_tree,
        &args.branch1,
        &theirs_tree,
        &args.branch2,
        &options,
    )?;

    let line_end = if args.nul_terminated { "\0" } else { "\n" };
    let has_conflicts = status == MergeStatus::Conflicted;

    if args.name_only {
        for path in conflicted_paths(&plan) {
            write!(out, "{}{}", path.to_str_lossy(), line_end)?;
        }
    } else {
        report_conflicts(&mut out, &plan, line_end, &args.branch1, &args.branch2)?;
    }

    if args.write_tree {
        if has_conflicts {
            let stderr = io::stderr();
            let mut err = stderr.lock();
            writeln!(err, "error: merge has conflicts, cannot write tree")?;
        } else {
            let tree_oid = build_result_tree(&mut repo, &ours_tree, &plan)?;
            writeln!(out, "{}", tree_oid.to_hex())?;
        }
    }

    Ok(if has_conflicts { 1 } else { 0 })
}

/// Every `result_path` carried by a conflicted plan entry, deduplicated and
/// in plan order (so a rename/rename pair's two forks both appear).
fn conflicted_paths(plan: &Plan) -> Vec<&BString> {
    let mut seen = std::collections::HashSet::new();
    plan.iter()
        .filter(|e| e.is_conflict())
        .filter(|e| seen.insert(&e.result_path))
        .map(|e| &e.result_path)
        .collect()
}

/// Render `CONFLICT (<type>): <path>` lines, matching `git merge-tree`'s
/// porcelain, followed by the three sides' oid/mode/path for each conflict.
/// `ours_label`/`theirs_label` are the user's actual `--base`/branch1/branch2
/// tree-ishes, so the reported sides name what was really compared.
fn report_conflicts<W: Write>(
    out: &mut W,
    plan: &Plan,
    line_end: &str,
    ours_label: &str,
    theirs_label: &str,
) -> Result<()> {
    for entry in plan.iter() {
        if !entry.is_conflict() {
            continue;
        }
        let label = conflict_label(entry);
        write!(
            out,
            "CONFLICT ({}): Merge conflict in {}{}",
            label,
            entry.result_path.to_str_lossy(),
            line_end
        )?;
        if entry.base.is_present() {
            write!(
                out,
                "  base:    {} {}{}",
                entry.base.oid.to_hex(),
                entry.base.path.to_str_lossy(),
                line_end
            )?;
        }
        if entry.ours.is_present() {
            write!(
                out,
                "  {}: {} {:o} {}{}",
                ours_label,
                entry.ours.oid.to_hex(),
                entry.ours.mode.unwrap().raw(),
                entry.result_path.to_str_lossy(),
                line_end
            )?;
        }
        if entry.theirs.is_present() {
            write!(
                out,
                "  {}: {} {:o} {}{}",
                theirs_label,
                entry.theirs.oid.to_hex(),
                entry.theirs.mode.unwrap().raw(),
                entry.result_path.to_str_lossy(),
                line_end
            )?;
        }
    }
    Ok(())
}

fn conflict_label(entry: &git_merge::replay::PlanEntry) -> &'static str {
    if matches!(
        entry.structure,
        StructureResult::ConflictOurs | StructureResult::ConflictTheirs
    ) {
        return "rename/rename";
    }
    match entry.content {
        ContentResult::AddAdd => "add/add",
        ContentResult::ModifyDelete | ContentResult::DeleteModify => "modify/delete",
        _ => "content",
    }
}

/// Realize a clean plan into a result tree, starting from the `ours` tree
/// (paths `theirs` never touched are already right) and applying every
/// entry's chosen content at its result path.
fn build_result_tree(
    repo: &mut git_repository::Repository,
    ours_tree: &ObjectId,
    plan: &Plan,
) -> Result<ObjectId> {
    let mut map = flatten_tree(repo.odb(), ours_tree, &BString::from(""))?;

    for entry in plan.iter() {
        if entry.our_path != entry.result_path {
            map.remove(&entry.our_path);
        }

        let resolved = match entry.content {
            ContentResult::Ours => entry.ours.is_present().then(|| (entry.ours.oid, entry.ours.mode.unwrap())),
            ContentResult::Theirs | ContentResult::Add => entry
                .theirs
                .is_present()
                .then(|| (entry.theirs.oid, entry.theirs.mode.unwrap())),
            ContentResult::Delete => None,
            ContentResult::Merge => bail!(
                "{}: textual three-way merge not performed by merge-tree",
                entry.result_path.to_str_lossy()
            ),
            ContentResult::ModifyDelete | ContentResult::DeleteModify | ContentResult::AddAdd => {
                unreachable!("conflicted content never reaches a clean-plan realization")
            }
        };

        match resolved {
            Some((oid, mode)) => {
                map.insert(entry.result_path.clone(), (oid, mode));
            }
            None => {
                map.remove(&entry.result_path);
            }
        }
    }

    build_merged_tree(
        repo,
        &map.into_iter()
            .map(|(path, (oid, mode))| (path, oid, mode))
            .collect::<Vec<_>>(),
    )
}

/// Resolve a revision string to a tree OID (handles commits and trees).
fn resolve_to_tree(repo: &git_repository::Repository, spec: &str) -> Result<ObjectId> {
    let oid = resolve_revision(repo, spec)?;
    let obj = repo
        .odb()
        .read(&oid)?
        .ok_or_else(|| anyhow::anyhow!("object {} not found", oid.to_hex()))?;

    match obj {
        Object::Commit(c) => Ok(c.tree),
        Object::Tree(_) => Ok(oid),
        _ => bail!("{} is not a tree-ish", spec),
    }
}

/// Flatten a tree recursively into a map of path -> (oid, mode).
fn flatten_tree(
    odb: &git_odb::ObjectDatabase,
    tree_oid: &ObjectId,
    prefix: &BString,
) -> Result<std::collections::BTreeMap<BString, (ObjectId, FileMode)>> {
    let mut map = std::collections::BTreeMap::new();

    let obj = odb
        .read(tree_oid)?
        .ok_or_else(|| anyhow::anyhow!("tree {} not found", tree_oid.to_hex()))?;

    let tree = match obj {
        Object::Tree(t) => t,
        _ => bail!("expected tree, got {}", obj.object_type()),
    };

    for entry in &tree.entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            let mut p = prefix.clone();
            p.extend_from_slice(b"/");
            p.extend_from_slice(&entry.name);
            p
        };

        if entry.mode.is_tree() {
            let sub = flatten_tree(odb, &entry.oid, &path)?;
            map.extend(sub);
        } else {
            map.insert(path, (entry.oid, entry.mode));
        }
    }

    Ok(map)
}

/// Build a tree object from merged entries and write it to the ODB.
fn build_merged_tree(
    repo: &mut git_repository::Repository,
    entries: &[(BString, ObjectId, FileMode)],
) -> Result<ObjectId> {
    // Group by top-level directory
    let mut top_blobs: Vec<TreeEntry> = Vec::new();
    let mut subdirs: std::collections::BTreeMap<BString, Vec<(BString, ObjectId, FileMode)>> =
        std::collections::BTreeMap::new();

    for (path, oid, mode) in entries {
        let path_str = path.to_str_lossy();
        if let Some(slash) = path_str.find('/') {
            let dir = BString::from(&path_str[..slash]);
            let rest = BString::from(&path_str[slash + 1..]);
            subdirs
                .entry(dir)
                .or_default()
                .push((rest, *oid, *mode));
        } else {
            top_blobs.push(TreeEntry {
                mode: *mode,
                name: path.clone(),
                oid: *oid,
            });
        }
    }

    let mut tree_entries = top_blobs;

    for (dir_name, sub_entries) in &subdirs {
        let sub_tree_oid = build_merged_tree(repo, sub_entries)?;
        tree_entries.push(TreeEntry {
            mode: FileMode::Tree,
            name: dir_name.clone(),
            oid: sub_tree_oid,
        });
    }

    tree_entries.sort_by(TreeEntry::cmp_entries);

    let tree = Tree {
        entries: tree_entries,
    };
    let oid = repo.odb().write(&Object::Tree(tree))?;
    Ok(oid)
}
