//! Tree/index/workdir reconciliation: `status`, two-phase `checkout`,
//! sparse-checkout filtering, LFS smudge/clean plumbing, and `abortMerge`.

mod status;
mod tree_build;
mod tree_walk;

pub use status::{status, StatusLabel};
pub use tree_build::build_tree_from_paths;
pub use tree_walk::walk_tree;

use std::collections::BTreeMap;
use std::path::Path;

use bstr::{BString, ByteSlice};
use git_hash::ObjectId;
use git_index::{Index, IndexEntry, Stage, StatData, SparseCheckout, attributes::AttributeStack};
use git_object::{FileMode, Object};
use git_odb::ObjectDatabase;

/// Errors from working-directory synchronization.
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("checkout would overwrite local modifications in {0} paths")]
    CheckoutConflict(usize),

    #[error("object {0} is not a tree")]
    NotATree(ObjectId),

    #[error("object {0} missing from database")]
    MissingObject(ObjectId),

    #[error("LFS object size mismatch for {path}")]
    LfsSizeMismatch { path: String },

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Index(#[from] git_index::IndexError),

    #[error(transparent)]
    State(#[from] git_state::StateError),

    #[error(transparent)]
    Lfs(#[from] git_lfs::LfsError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The decided action for a single path during checkout's analyze phase.
/// A path dropped from the target tree (or excluded by the sparse
/// filter) is `Delete`: its workdir file is unlinked and, since the
/// rebuilt index only gains entries from `Update`/`Keep`, it is dropped
/// from the index for free — there is no separate "delete-index" step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckoutAction {
    Update,
    Keep,
    Delete,
    Conflict,
}

/// Options controlling `checkout`/`abort_merge` in addition to the target
/// tree: sparse-checkout filter, `.gitattributes` for LFS detection, and
/// an optional LFS object store to smudge pointer blobs against.
pub struct CheckoutContext<'a> {
    pub sparse: &'a SparseCheckout,
    pub attrs: &'a AttributeStack,
    pub lfs: Option<&'a git_lfs::LfsStore>,
}

/// Materialize `target_tree` into `work_tree`, reconciling against the
/// current `index`. See module docs for the two-phase analyze/execute
/// algorithm. On success `index` has been replaced in place with the
/// post-checkout contents; callers persist it via `Index::write_to`.
pub fn checkout(
    odb: &ObjectDatabase,
    index: &mut Index,
    work_tree: &Path,
    target_tree: ObjectId,
    force: bool,
    ctx: &CheckoutContext,
) -> Result<(), WorktreeError> {
    let target_entries = walk_tree(odb, target_tree)?;

    let mut paths: BTreeMap<BString, ()> = BTreeMap::new();
    for path in target_entries.keys() {
        paths.insert(path.clone(), ());
    }
    for entry in index.iter() {
        if entry.stage == Stage::Normal {
            paths.insert(entry.path.clone(), ());
        }
    }

    let mut decisions = Vec::with_capacity(paths.len());
    for path in paths.keys() {
        let target = target_entries.get(path);
        let index_entry = index.get(path.as_bstr(), Stage::Normal);
        let included = ctx.sparse.is_included(path.as_bstr());
        let workdir_oid = workdir_blob_oid(work_tree, path, odb.hash_algo())?;

        let action = if target.is_some() && included {
            let (_, target_oid) = target.unwrap();
            match (workdir_oid, index_entry) {
                (None, _) => CheckoutAction::Update,
                (Some(w), Some(ie)) if ie.oid == *target_oid && w == *target_oid => {
                    CheckoutAction::Keep
                }
                (Some(w), Some(ie)) if w != *target_oid && w != ie.oid => {
                    if force {
                        CheckoutAction::Update
                    } else {
                        CheckoutAction::Conflict
                    }
                }
                _ => CheckoutAction::Update,
            }
        } else {
            CheckoutAction::Delete
        };
        decisions.push((path.clone(), action));
    }

    let conflicts = decisions
        .iter()
        .filter(|(_, action)| *action == CheckoutAction::Conflict)
        .count();
    if conflicts > 0 && !force {
        return Err(WorktreeError::CheckoutConflict(conflicts));
    }

    let mut new_index = Index::new();
    for (path, action) in decisions {
        match action {
            CheckoutAction::Update | CheckoutAction::Conflict => {
                let (mode, oid) = target_entries.get(&path).expect("update implies target entry");
                write_entry(odb, work_tree, &path, *mode, *oid, ctx)?;
                let stat = stat_for(work_tree, &path)?;
                new_index.add(IndexEntry {
                    path: path.clone(),
                    oid: *oid,
                    mode: *mode,
                    stage: Stage::Normal,
                    stat,
                    flags: Default::default(),
                });
            }
            CheckoutAction::Keep => {
                let entry = index
                    .get(path.as_bstr(), Stage::Normal)
                    .expect("keep implies an index entry")
                    .clone();
                let stat = stat_for(work_tree, &path).unwrap_or(entry.stat);
                new_index.add(IndexEntry { stat, ..entry });
            }
            CheckoutAction::Delete => {
                let full = work_tree.join(path.to_str_lossy().as_ref());
                match std::fs::remove_file(&full) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    *index = new_index;
    Ok(())
}

/// Restore the working tree and index to a clean pre-merge state against
/// `restore_to` (normally HEAD), then clear the merge-in-progress state
/// files. Considers every path in `restore_to` or the index, at any stage —
/// unlike `checkout`, conflict-stage-only paths (no stage-0 entry) are not
/// skipped. For each such path:
///
/// - If the path has a conflict-stage entry, its stage-0 OID differs from
///   (or is absent relative to) `restore_to`, or the working tree file is
///   missing: restore the blob from `restore_to`.
/// - Else (stage-0 OID already matches `restore_to`): leave the working
///   tree file untouched — it holds an unstaged edit, not merge fallout —
///   and just re-point the index entry at `restore_to`.
/// - If the path is in the index (at any stage) but not in `restore_to`:
///   delete both the working tree file and the index entry.
///
/// A working-tree file that was never staged during the merge (no index
/// entry at any stage) is never visited and is left alone.
pub fn abort_merge(
    odb: &ObjectDatabase,
    index: &mut Index,
    work_tree: &Path,
    git_dir: &Path,
    restore_to: ObjectId,
    ctx: &CheckoutContext,
) -> Result<(), WorktreeError> {
    let head_entries = walk_tree(odb, restore_to)?;

    let mut paths: BTreeMap<BString, ()> = BTreeMap::new();
    for path in head_entries.keys() {
        paths.insert(path.clone(), ());
    }
    for entry in index.iter() {
        paths.insert(entry.path.clone(), ());
    }

    let mut new_index = Index::new();

    for path in paths.keys() {
        let head = head_entries.get(path);
        let stage0 = index.get(path.as_bstr(), Stage::Normal);

        match head {
            Some((mode, head_oid)) => {
                let workdir_oid = workdir_blob_oid(work_tree, path, odb.hash_algo())?;
                let needs_restore = index.has_conflicts(path.as_bstr())
                    || stage0.map_or(true, |ie| ie.oid != *head_oid)
                    || workdir_oid.is_none();

                if needs_restore {
                    write_entry(odb, work_tree, path, *mode, *head_oid, ctx)?;
                    let stat = stat_for(work_tree, path)?;
                    new_index.add(IndexEntry {
                        path: path.clone(),
                        oid: *head_oid,
                        mode: *mode,
                        stage: Stage::Normal,
                        stat,
                        flags: Default::default(),
                    });
                } else {
                    let entry = stage0.expect("needs_restore false implies a stage-0 entry").clone();
                    let stat = stat_for(work_tree, path).unwrap_or(entry.stat);
                    new_index.add(IndexEntry {
                        oid: *head_oid,
                        mode: *mode,
                        stat,
                        ..entry
                    });
                }
            }
            None => {
                let full = work_tree.join(path.to_str_lossy().as_ref());
                match std::fs::remove_file(&full) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    *index = new_index;
    git_state::clear_merge_state(git_dir)?;
    Ok(())
}

fn write_entry(
    odb: &ObjectDatabase,
    work_tree: &Path,
    path: &BString,
    mode: FileMode,
    oid: ObjectId,
    ctx: &CheckoutContext,
) -> Result<(), WorktreeError> {
    let full = work_tree.join(path.to_str_lossy().as_ref());
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if mode.is_gitlink() {
        std::fs::create_dir_all(&full)?;
        return Ok(());
    }

    let object = odb
        .read(&oid)?
        .ok_or(WorktreeError::MissingObject(oid))?;
    let bytes = match object {
        Object::Blob(blob) => blob.data,
        _ => return Err(WorktreeError::NotATree(oid)),
    };

    let bytes = maybe_smudge(path, &bytes, ctx)?;

    if mode.is_symlink() {
        let target = std::path::PathBuf::from(bytes.to_str_lossy().into_owned());
        let _ = std::fs::remove_file(&full);
        symlink(&target, &full)?;
        return Ok(());
    }

    std::fs::write(&full, &bytes)?;
    set_mode(&full, mode)?;
    Ok(())
}

fn maybe_smudge(
    path: &BString,
    bytes: &[u8],
    ctx: &CheckoutContext,
) -> Result<Vec<u8>, WorktreeError> {
    let Some(store) = ctx.lfs else {
        return Ok(bytes.to_vec());
    };
    let Some(filter) = ctx.attrs.filter_for(path.as_bstr()) else {
        return Ok(bytes.to_vec());
    };
    if !git_lfs::is_lfs_filter(&filter.to_string()) {
        return Ok(bytes.to_vec());
    }
    if !git_lfs::Pointer::looks_like_pointer(bytes) {
        return Ok(bytes.to_vec());
    }
    let pointer = git_lfs::Pointer::parse(bytes)?;
    Ok(store.read(&pointer)?)
}

#[cfg(unix)]
fn symlink(target: &std::path::Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(target: &std::path::Path, link: &Path) -> std::io::Result<()> {
    std::fs::write(link, target.to_string_lossy().as_bytes())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perm = match mode {
        FileMode::Executable => 0o755,
        _ => 0o644,
    };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(perm))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: FileMode) -> std::io::Result<()> {
    Ok(())
}

fn stat_for(work_tree: &Path, path: &BString) -> std::io::Result<StatData> {
    let full = work_tree.join(path.to_str_lossy().as_ref());
    let meta = std::fs::symlink_metadata(&full)?;
    Ok(StatData::from_metadata(&meta))
}

/// Hash the workdir file at `path` as a blob, the way the index would
/// store it. Returns `None` if the path is absent.
fn workdir_blob_oid(
    work_tree: &Path,
    path: &BString,
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
    use git_hash::HashAlgorithm;
    use git_index::attributes::AttributeStack;
    use git_object::{Blob, Tree, TreeEntry};

    fn odb(dir: &Path) -> ObjectDatabase {
        ObjectDatabase::open_with_algo(dir.join("objects"), HashAlgorithm::Sha1).unwrap()
    }

    fn ctx<'a>(sparse: &'a SparseCheckout, attrs: &'a AttributeStack) -> CheckoutContext<'a> {
        CheckoutContext {
            sparse,
            attrs,
            lfs: None,
        }
    }

    fn single_file_tree(odb: &ObjectDatabase, name: &str, content: &[u8]) -> ObjectId {
        let blob = odb.write(&Object::Blob(Blob::new(content.to_vec()))).unwrap();
        let tree = Tree {
            entries: vec![TreeEntry {
                mode: FileMode::Regular,
                name: name.into(),
                oid: blob,
            }],
        };
        odb.write(&Object::Tree(tree)).unwrap()
    }

    #[test]
    fn checkout_writes_new_files() {
        let tmp = tempfile::tempdir().unwrap();
        let odb = odb(tmp.path());
        let tree = single_file_tree(&odb, "a.txt", b"hello");

        let mut index = Index::new();
        let sparse = SparseCheckout::new();
        let attrs = AttributeStack::new();
        checkout(&odb, &mut index, tmp.path(), tree, false, &ctx(&sparse, &attrs)).unwrap();

        let contents = std::fs::read(tmp.path().join("a.txt")).unwrap();
        assert_eq!(contents, b"hello");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn checkout_keeps_unmodified_files() {
        let tmp = tempfile::tempdir().unwrap();
        let odb = odb(tmp.path());
        let tree = single_file_tree(&odb, "a.txt", b"hello");

        let mut index = Index::new();
        let sparse = SparseCheckout::new();
        let attrs = AttributeStack::new();
        checkout(&odb, &mut index, tmp.path(), tree, false, &ctx(&sparse, &attrs)).unwrap();

        // Check out the same tree again; should not error and should keep
        // the file as-is rather than treating it as conflicting.
        checkout(&odb, &mut index, tmp.path(), tree, false, &ctx(&sparse, &attrs)).unwrap();
        let contents = std::fs::read(tmp.path().join("a.txt")).unwrap();
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn checkout_deletes_files_removed_from_target() {
        let tmp = tempfile::tempdir().unwrap();
        let odb = odb(tmp.path());
        let tree_with_file = single_file_tree(&odb, "a.txt", b"hello");
        let empty_tree = odb.write(&Object::Tree(Tree { entries: vec![] })).unwrap();

        let mut index = Index::new();
        let sparse = SparseCheckout::new();
        let attrs = AttributeStack::new();
        checkout(
            &odb,
            &mut index,
            tmp.path(),
            tree_with_file,
            false,
            &ctx(&sparse, &attrs),
        )
        .unwrap();
        assert!(tmp.path().join("a.txt").exists());

        checkout(
            &odb,
            &mut index,
            tmp.path(),
            empty_tree,
            false,
            &ctx(&sparse, &attrs),
        )
        .unwrap();
        assert!(!tmp.path().join("a.txt").exists());
        assert!(index.is_empty());
    }

    #[test]
    fn checkout_reports_conflict_on_dirty_workdir_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let odb = odb(tmp.path());
        let tree = single_file_tree(&odb, "a.txt", b"hello");

        let mut index = Index::new();
        let sparse = SparseCheckout::new();
        let attrs = AttributeStack::new();
        checkout(&odb, &mut index, tmp.path(), tree, false, &ctx(&sparse, &attrs)).unwrap();

        // Diverge the working tree from both HEAD and what's staged.
        std::fs::write(tmp.path().join("a.txt"), b"local edit").unwrap();

        let updated_tree = single_file_tree(&odb, "a.txt", b"upstream edit");
        let err = checkout(
            &odb,
            &mut index,
            tmp.path(),
            updated_tree,
            false,
            &ctx(&sparse, &attrs),
        )
        .unwrap_err();
        assert!(matches!(err, WorktreeError::CheckoutConflict(1)));

        // With force, the upstream version wins.
        checkout(
            &odb,
            &mut index,
            tmp.path(),
            updated_tree,
            true,
            &ctx(&sparse, &attrs),
        )
        .unwrap();
        assert_eq!(
            std::fs::read(tmp.path().join("a.txt")).unwrap(),
            b"upstream edit"
        );
    }

    #[test]
    fn sparse_checkout_excludes_paths_outside_cone() {
        let tmp = tempfile::tempdir().unwrap();
        let odb = odb(tmp.path());

        let blob_a = odb.write(&Object::Blob(Blob::new(b"a".to_vec()))).unwrap();
        let blob_b = odb.write(&Object::Blob(Blob::new(b"b".to_vec()))).unwrap();
        let inner = Tree {
            entries: vec![TreeEntry {
                mode: FileMode::Regular,
                name: "keep.txt".into(),
                oid: blob_b,
            }],
        };
        let inner_oid = odb.write(&Object::Tree(inner)).unwrap();
        let root = Tree {
            entries: vec![
                TreeEntry {
                    mode: FileMode::Regular,
                    name: "root.txt".into(),
                    oid: blob_a,
                },
                TreeEntry {
                    mode: FileMode::Tree,
                    name: "included".into(),
                    oid: inner_oid,
                },
            ],
        };
        let tree = odb.write(&Object::Tree(root)).unwrap();

        let mut sparse = SparseCheckout::new();
        sparse.enabled = true;
        sparse.cone_mode = true;
        sparse.include_patterns = vec![BString::from("included")];

        let mut index = Index::new();
        let attrs = AttributeStack::new();
        checkout(&odb, &mut index, tmp.path(), tree, false, &ctx(&sparse, &attrs)).unwrap();

        assert!(tmp.path().join("included/keep.txt").exists());
        assert!(!tmp.path().join("root.txt").exists());
    }

    #[test]
    fn abort_merge_restores_head_and_clears_state() {
        let tmp = tempfile::tempdir().unwrap();
        let odb = odb(tmp.path());
        let tree = single_file_tree(&odb, "a.txt", b"hello");

        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        git_state::write_merge_head(&git_dir, &tree).unwrap();

        let mut index = Index::new();
        let sparse = SparseCheckout::new();
        let attrs = AttributeStack::new();
        abort_merge(
            &odb,
            &mut index,
            tmp.path(),
            &git_dir,
            tree,
            &ctx(&sparse, &attrs),
        )
        .unwrap();

        assert!(tmp.path().join("a.txt").exists());
        assert!(git_state::read_merge_head(&git_dir).unwrap().is_none());
    }
}
