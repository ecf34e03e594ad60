//! ORT (Ostensibly Recursive's Twin) merge strategy.
//!
//! This is the default merge strategy since git 2.34. It performs a
//! three-way tree merge with rename detection, handling all conflict types.
//! The structural and content decisions are made by [`crate::replay`]; this
//! module realizes its plan into a result tree or into conflict-stage index
//! entries.

use std::collections::BTreeMap;

use bstr::BString;
use git_hash::ObjectId;
use git_object::{Blob, FileMode, Object, Tree, TreeEntry};
use git_odb::ObjectDatabase;
use git_repository::Repository;

use crate::conflict::record_conflict_in_index;
use crate::content::{merge_content, MergeLabels};
use crate::replay::{self, ContentResult, MergeStatus, Plan, PlanEntry, StructureResult};
use crate::strategy::MergeStrategy;
use crate::{ConflictEntry, ConflictSide, ConflictType, MergeError, MergeOptions, MergeResult};

/// The ORT merge strategy.
pub struct OrtStrategy;

impl MergeStrategy for OrtStrategy {
    fn merge(
        &self,
        repo: &mut Repository,
        ours_commit: &ObjectId,
        theirs_commit: &ObjectId,
        base_commit: &ObjectId,
        options: &MergeOptions,
    ) -> Result<MergeResult, MergeError> {
        let odb = repo.odb();

        let base_tree_id = read_commit_tree(odb, base_commit)?;
        let ours_tree_id = read_commit_tree(odb, ours_commit)?;
        let theirs_tree_id = read_commit_tree(odb, theirs_commit)?;

        if ours_tree_id == theirs_tree_id {
            return Ok(MergeResult::clean(ours_tree_id));
        }
        if base_tree_id == ours_tree_id {
            return Ok(MergeResult::clean(theirs_tree_id));
        }
        if base_tree_id == theirs_tree_id {
            return Ok(MergeResult::clean(ours_tree_id));
        }

        let ours_label = "HEAD";
        let theirs_label = "merge";

        let (plan, status) = replay::replay_trees(
            repo,
            &base_tree_id,
            &ours_tree_id,
            ours_label,
            &theirs_tree_id,
            theirs_label,
            options,
        )?;

        let odb = repo.odb();
        let labels = MergeLabels {
            base: "base",
            ours: ours_label,
            theirs: theirs_label,
        };

        let conflicts = realize_plan(odb, &base_tree_id, &plan, options, &labels)?;

        if status == MergeStatus::Clean {
            debug_assert!(conflicts.is_empty());
            let ours_tree = read_tree(odb, &ours_tree_id)?;
            let mut result_entries = tree_to_flat_map(odb, &ours_tree, &BString::from(""))?;
            apply_clean_plan(odb, &mut result_entries, &plan, options, &labels)?;
            let tree_oid = write_flat_map_as_tree(odb, &result_entries)?;
            Ok(MergeResult::clean(tree_oid))
        } else {
            let index = repo.index_mut()?;
            for conflict in &conflicts {
                record_conflict_in_index(index, conflict);
            }
            Ok(MergeResult::conflicted(conflicts))
        }
    }
}

/// Walk the plan once to find which entries are conflicts, pairing up the
/// two forks of a rename/rename conflict (classify emits them back to back)
/// into a single [`ConflictEntry`], matching the index representation the
/// rest of this crate already uses.
fn realize_plan(
    odb: &ObjectDatabase,
    _base_tree: &ObjectId,
    plan: &Plan,
    options: &MergeOptions,
    labels: &MergeLabels<'_>,
) -> Result<Vec<ConflictEntry>, MergeError> {
    let mut conflicts = Vec::new();
    let ordered: Vec<&PlanEntry> = plan.iter().collect();
    let mut entries = ordered.into_iter().peekable();

    while let Some(entry) = entries.next() {
        match entry.structure {
            StructureResult::ConflictOurs => {
                let their_fork = entries.next_if(|e| {
                    e.structure == StructureResult::ConflictTheirs && e.base.path == entry.base.path
                });
                let theirs_side = their_fork.map(|e| ConflictSide {
                    oid: e.theirs.oid,
                    mode: e.theirs.mode.unwrap_or(FileMode::Regular),
                    path: e.result_path.clone(),
                });
                conflicts.push(ConflictEntry {
                    path: entry.base.path.clone(),
                    conflict_type: ConflictType::RenameRename,
                    base: entry.base.is_present().then(|| ConflictSide {
                        oid: entry.base.oid,
                        mode: entry.base.mode.unwrap_or(FileMode::Regular),
                        path: entry.base.path.clone(),
                    }),
                    ours: Some(ConflictSide {
                        oid: entry.ours.oid,
                        mode: entry.ours.mode.unwrap_or(FileMode::Regular),
                        path: entry.result_path.clone(),
                    }),
                    theirs: theirs_side,
                });
            }
            StructureResult::ConflictTheirs => {
                // Only reached if its ConflictOurs sibling wasn't adjacent
                // (shouldn't happen given how classify emits pairs, but
                // surface it as its own conflict rather than losing it).
                conflicts.push(ConflictEntry {
                    path: entry.result_path.clone(),
                    conflict_type: ConflictType::RenameRename,
                    base: entry.base.is_present().then(|| ConflictSide {
                        oid: entry.base.oid,
                        mode: entry.base.mode.unwrap_or(FileMode::Regular),
                        path: entry.base.path.clone(),
                    }),
                    ours: None,
                    theirs: Some(ConflictSide {
                        oid: entry.theirs.oid,
                        mode: entry.theirs.mode.unwrap_or(FileMode::Regular),
                        path: entry.result_path.clone(),
                    }),
                });
            }
            StructureResult::Ours | StructureResult::Theirs => {
                if let Some(conflict) = content_conflict(entry, odb, options, labels)? {
                    conflicts.push(conflict);
                }
            }
        }
    }

    Ok(conflicts)
}

/// Produce a [`ConflictEntry`] for a structurally-clean entry whose content
/// verdict is itself a conflict (modify/delete, delete/modify, add/add, or
/// an unresolved three-way text merge).
fn content_conflict(
    entry: &PlanEntry,
    odb: &ObjectDatabase,
    options: &MergeOptions,
    labels: &MergeLabels<'_>,
) -> Result<Option<ConflictEntry>, MergeError> {
    let mode = entry
        .ours
        .mode
        .or(entry.theirs.mode)
        .or(entry.base.mode)
        .unwrap_or(FileMode::Regular);

    let base_side = entry.base.is_present().then(|| ConflictSide {
        oid: entry.base.oid,
        mode,
        path: entry.base.path.clone(),
    });
    let ours_side = entry.ours.is_present().then(|| ConflictSide {
        oid: entry.ours.oid,
        mode,
        path: entry.result_path.clone(),
    });
    let theirs_side = entry.theirs.is_present().then(|| ConflictSide {
        oid: entry.theirs.oid,
        mode,
        path: entry.result_path.clone(),
    });

    match entry.content {
        ContentResult::ModifyDelete => Ok(Some(ConflictEntry {
            path: entry.result_path.clone(),
            conflict_type: ConflictType::ModifyDelete,
            base: base_side,
            ours: ours_side,
            theirs: theirs_side,
        })),
        ContentResult::DeleteModify => Ok(Some(ConflictEntry {
            path: entry.result_path.clone(),
            conflict_type: ConflictType::ModifyDelete,
            base: base_side,
            ours: ours_side,
            theirs: theirs_side,
        })),
        ContentResult::AddAdd => Ok(Some(ConflictEntry {
            path: entry.result_path.clone(),
            conflict_type: ConflictType::AddAdd,
            base: base_side,
            ours: ours_side,
            theirs: theirs_side,
        })),
        ContentResult::Merge => {
            let base_data = read_blob_data(odb, &entry.base.oid)?;
            let ours_data = read_blob_data(odb, &entry.ours.oid)?;
            let theirs_data = read_blob_data(odb, &entry.theirs.oid)?;
            let result = merge_content(&base_data, &ours_data, &theirs_data, options, labels);
            if result.is_clean() {
                Ok(None)
            } else {
                Ok(Some(ConflictEntry {
                    path: entry.result_path.clone(),
                    conflict_type: ConflictType::Content,
                    base: base_side,
                    ours: ours_side,
                    theirs: theirs_side,
                }))
            }
        }
        ContentResult::Ours | ContentResult::Theirs | ContentResult::Add | ContentResult::Delete => {
            Ok(None)
        }
    }
}

/// Apply every structurally-clean, content-clean plan entry to the result
/// tree's flat map. Only called once the whole plan is known to be clean.
fn apply_clean_plan(
    odb: &ObjectDatabase,
    map: &mut BTreeMap<BString, FlatEntry>,
    plan: &Plan,
    options: &MergeOptions,
    labels: &MergeLabels<'_>,
) -> Result<(), MergeError> {
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
            ContentResult::Merge => {
                let base_data = read_blob_data(odb, &entry.base.oid)?;
                let ours_data = read_blob_data(odb, &entry.ours.oid)?;
                let theirs_data = read_blob_data(odb, &entry.theirs.oid)?;
                let result = merge_content(&base_data, &ours_data, &theirs_data, options, labels);
                debug_assert!(result.is_clean());
                let blob = Object::Blob(Blob::new(result.content().to_vec()));
                let oid = odb.write(&blob)?;
                let mode = entry.ours.mode.or(entry.theirs.mode).unwrap_or(FileMode::Regular);
                Some((oid, mode))
            }
            ContentResult::ModifyDelete | ContentResult::DeleteModify | ContentResult::AddAdd => {
                unreachable!("conflicted content never reaches a clean-plan realization")
            }
        };

        match resolved {
            Some((oid, mode)) => {
                map.insert(entry.result_path.clone(), FlatEntry { oid, mode });
            }
            None => {
                map.remove(&entry.result_path);
            }
        }
    }
    Ok(())
}

/// Read the tree OID from a commit.
fn read_commit_tree(odb: &ObjectDatabase, commit_oid: &ObjectId) -> Result<ObjectId, MergeError> {
    let obj = odb
        .read(commit_oid)?
        .ok_or(MergeError::ObjectNotFound(*commit_oid))?;

    match obj {
        Object::Commit(c) => Ok(c.tree),
        other => Err(MergeError::UnexpectedObjectType {
            oid: *commit_oid,
            expected: "commit",
            actual: other.object_type().to_string(),
        }),
    }
}

/// Read a tree from ODB.
fn read_tree(odb: &ObjectDatabase, tree_oid: &ObjectId) -> Result<Tree, MergeError> {
    let obj = odb
        .read(tree_oid)?
        .ok_or(MergeError::ObjectNotFound(*tree_oid))?;

    match obj {
        Object::Tree(t) => Ok(t),
        other => Err(MergeError::UnexpectedObjectType {
            oid: *tree_oid,
            expected: "tree",
            actual: other.object_type().to_string(),
        }),
    }
}

/// Read blob data from ODB. Returns empty for null OID.
fn read_blob_data(odb: &ObjectDatabase, oid: &ObjectId) -> Result<Vec<u8>, MergeError> {
    if oid.is_null() {
        return Ok(Vec::new());
    }

    let obj = odb
        .read(oid)?
        .ok_or(MergeError::ObjectNotFound(*oid))?;

    match obj {
        Object::Blob(b) => Ok(b.data),
        other => Err(MergeError::UnexpectedObjectType {
            oid: *oid,
            expected: "blob",
            actual: other.object_type().to_string(),
        }),
    }
}

/// Flat entry: OID + mode for a single file.
#[derive(Debug, Clone)]
struct FlatEntry {
    oid: ObjectId,
    mode: FileMode,
}

/// Flatten a tree into a BTreeMap of path → FlatEntry (recursive).
fn tree_to_flat_map(
    odb: &ObjectDatabase,
    tree: &Tree,
    prefix: &BString,
) -> Result<BTreeMap<BString, FlatEntry>, MergeError> {
    let mut map = BTreeMap::new();
    for entry in &tree.entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            let mut p = prefix.clone();
            p.push(b'/');
            p.extend_from_slice(&entry.name);
            p
        };

        if entry.mode.is_tree() {
            let sub = read_tree(odb, &entry.oid)?;
            let sub_map = tree_to_flat_map(odb, &sub, &path)?;
            map.extend(sub_map);
        } else {
            map.insert(
                path,
                FlatEntry {
                    oid: entry.oid,
                    mode: entry.mode,
                },
            );
        }
    }
    Ok(map)
}

/// Write a flat map of paths back as a nested tree structure to ODB.
fn write_flat_map_as_tree(
    odb: &ObjectDatabase,
    map: &BTreeMap<BString, FlatEntry>,
) -> Result<ObjectId, MergeError> {
    let mut top_entries: BTreeMap<BString, Vec<(BString, &FlatEntry)>> = BTreeMap::new();
    let mut direct_entries: Vec<TreeEntry> = Vec::new();

    for (path, entry) in map {
        if let Some(slash_pos) = path.iter().position(|&b| b == b'/') {
            let dir = BString::from(&path[..slash_pos]);
            let rest = BString::from(&path[slash_pos + 1..]);
            top_entries.entry(dir).or_default().push((rest, entry));
        } else {
            direct_entries.push(TreeEntry {
                mode: entry.mode,
                name: path.clone(),
                oid: entry.oid,
            });
        }
    }

    for (dir_name, sub_entries) in &top_entries {
        let sub_map: BTreeMap<BString, FlatEntry> = sub_entries
            .iter()
            .map(|(p, e)| (p.clone(), (*e).clone()))
            .collect();
        let sub_tree_oid = write_flat_map_as_tree(odb, &sub_map)?;
        direct_entries.push(TreeEntry {
            mode: FileMode::Tree,
            name: dir_name.clone(),
            oid: sub_tree_oid,
        });
    }

    direct_entries.sort_by(TreeEntry::cmp_entries);

    let tree = Tree {
        entries: direct_entries,
    };
    let obj = Object::Tree(tree);
    let oid = odb.write(&obj)?;
    Ok(oid)
}
