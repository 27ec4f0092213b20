//! `status(filepath) → label`: the (HEAD, workdir, index) combinatoric
//! table used by `git status --short`.

use std::fmt;
use std::path::Path;

use bstr::{BStr, ByteSlice};
use git_hash::ObjectId;
use git_index::{Index, Stage};
use git_object::Object;
use git_odb::ObjectDatabase;

use crate::WorktreeError;

/// One of the twelve status labels a path can carry, derived from
/// whether HEAD, the index, and the working tree each have the path and
/// whether their blob OIDs agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Absent,
    StarAbsent,
    Added,
    StarAdded,
    Deleted,
    StarDeleted,
    StarUndeleted,
    StarUndeletemodified,
    Unmodified,
    StarUnmodified,
    Modified,
    StarModified,
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::StarAbsent => "*absent",
            Self::Added => "added",
            Self::StarAdded => "*added",
            Self::Deleted => "deleted",
            Self::StarDeleted => "*deleted",
            Self::StarUndeleted => "*undeleted",
            Self::StarUndeletemodified => "*undeletemodified",
            Self::Unmodified => "unmodified",
            Self::StarUnmodified => "*unmodified",
            Self::Modified => "modified",
            Self::StarModified => "*modified",
        })
    }
}

/// Derive the status label from the raw (HEAD, workdir, index) triple.
/// `head`/`index` are the blob OIDs recorded in the HEAD tree and the
/// index respectively; `workdir` is the hash of the file currently on
/// disk. Any of the three may be absent.
fn label_for(head: Option<ObjectId>, workdir: Option<ObjectId>, index: Option<ObjectId>) -> StatusLabel {
    match (head, workdir, index) {
        (None, None, None) => StatusLabel::Absent,
        (None, None, Some(_)) => StatusLabel::StarAbsent,
        (None, Some(_), None) => StatusLabel::StarAdded,
        (None, Some(w), Some(i)) => {
            if w == i {
                StatusLabel::Added
            } else {
                StatusLabel::StarAdded
            }
        }
        (Some(_), None, None) => StatusLabel::Deleted,
        (Some(_), None, Some(_)) => StatusLabel::StarDeleted,
        (Some(h), Some(w), None) => {
            if h == w {
                StatusLabel::StarUndeleted
            } else {
                StatusLabel::StarUndeletemodified
            }
        }
        (Some(h), Some(w), Some(i)) => {
            if h == w && w == i {
                StatusLabel::Unmodified
            } else if h == i && i != w {
                StatusLabel::StarModified
            } else if w == i && i != h {
                StatusLabel::Modified
            } else if h == w && w != i {
                StatusLabel::StarUnmodified
            } else {
                StatusLabel::StarModified
            }
        }
    }
}

/// Compute the status label for a single path given the HEAD tree (if
/// any — an unborn branch has none), the current index, and the working
/// tree root.
pub fn status(
    odb: &ObjectDatabase,
    index: &Index,
    head_tree: Option<ObjectId>,
    work_tree: &Path,
    path: &BStr,
) -> Result<StatusLabel, WorktreeError> {
    let head = match head_tree {
        Some(tree) => lookup_path(odb, tree, path)?,
        None => None,
    };
    let index_oid = index
        .get(path, Stage::Normal)
        .map(|e| e.oid);
    let workdir = workdir_blob_oid(work_tree, path, odb.hash_algo())?;

    Ok(label_for(head, workdir, index_oid))
}

fn lookup_path(
    odb: &ObjectDatabase,
    tree_oid: ObjectId,
    path: &BStr,
) -> Result<Option<ObjectId>, WorktreeError> {
    let mut current = tree_oid;
    let components: Vec<&[u8]> = path.split(|&b| b == b'/').collect();

    for (i, component) in components.iter().enumerate() {
        let object = odb.read(&current)?.ok_or(WorktreeError::MissingObject(current))?;
        let tree = match object {
            Object::Tree(tree) => tree,
            _ => return Ok(None),
        };
        let Some(entry) = tree.find(BStr::new(component)) else {
            return Ok(None);
        };
        if i + 1 == components.len() {
            return Ok(Some(entry.oid));
        }
        if !entry.mode.is_tree() {
            return Ok(None);
        }
        current = entry.oid;
    }
    Ok(None)
}

fn workdir_blob_oid(
    work_tree: &Path,
    path: &BStr,
    hash_algo: git_hash::HashAlgorithm,
) -> Result<Option<ObjectId>, WorktreeError> {
    let full = work_tree.join(path.to_str_lossy().as_ref());
    let bytes = match std::fs::read(&full) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(git_hash::hasher::Hasher::hash_object(
        hash_algo, "blob", &bytes,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_when_nowhere() {
        assert_eq!(label_for(None, None, None), StatusLabel::Absent);
    }

    #[test]
    fn unmodified_when_all_agree() {
        let oid = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();
        assert_eq!(label_for(Some(oid), Some(oid), Some(oid)), StatusLabel::Unmodified);
    }

    #[test]
    fn modified_when_workdir_and_index_agree_but_differ_from_head() {
        let head = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();
        let other = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        assert_eq!(
            label_for(Some(head), Some(other), Some(other)),
            StatusLabel::Modified
        );
    }

    #[test]
    fn star_modified_when_workdir_edited_past_staged_change() {
        let head = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();
        let staged = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let workdir = ObjectId::from_hex("1111111111111111111111111111111111111111").unwrap();
        assert_eq!(
            label_for(Some(head), Some(workdir), Some(staged)),
            StatusLabel::StarModified
        );
    }

    #[test]
    fn added_when_new_and_staged_matches_workdir() {
        let oid = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();
        assert_eq!(label_for(None, Some(oid), Some(oid)), StatusLabel::Added);
    }

    #[test]
    fn deleted_when_only_head_has_it() {
        let oid = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();
        assert_eq!(label_for(Some(oid), None, None), StatusLabel::Deleted);
    }
}
