//! State-machine files for long-running repository operations.
//!
//! `MERGE_HEAD`, `CHERRY_PICK_HEAD`, `ORIG_HEAD` and friends are small
//! files living directly in the gitdir that record the in-progress state
//! of a merge, cherry-pick, or rebase. They have no format beyond "one
//! value, optionally trailing a newline" and are created when the
//! operation begins, deleted on abort or completion.

pub mod rebase;

use std::path::Path;

use git_hash::ObjectId;

pub use rebase::{RebaseSequencer, RebaseTodoLine};

/// Errors reading or writing state files.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid OID in {file}")]
    InvalidOid { file: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lock(#[from] git_utils::UtilError),
}

const MERGE_HEAD: &str = "MERGE_HEAD";
const MERGE_MODE: &str = "MERGE_MODE";
const MERGE_MSG: &str = "MERGE_MSG";
const CHERRY_PICK_HEAD: &str = "CHERRY_PICK_HEAD";
const ORIG_HEAD: &str = "ORIG_HEAD";

/// Read a state file holding a single OID. Returns `None` if absent.
pub fn read_oid(git_dir: &Path, file: &'static str) -> Result<Option<ObjectId>, StateError> {
    match read_text(git_dir, file)? {
        Some(content) => ObjectId::from_hex(content.trim())
            .map(Some)
            .map_err(|_| StateError::InvalidOid { file }),
        None => Ok(None),
    }
}

/// Write a state file holding a single OID.
pub fn write_oid(git_dir: &Path, file: &'static str, oid: &ObjectId) -> Result<(), StateError> {
    write_text(git_dir, file, &format!("{}\n", oid))
}

/// Read a freeform text state file. Returns `None` if absent.
pub fn read_text(git_dir: &Path, file: &'static str) -> Result<Option<String>, StateError> {
    let path = git_dir.join(file);
    match std::fs::read_to_string(&path) {
        Ok(c) => Ok(Some(c)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a freeform text state file, creating the gitdir if necessary.
pub fn write_text(git_dir: &Path, file: &'static str, content: &str) -> Result<(), StateError> {
    std::fs::create_dir_all(git_dir)?;
    let path = git_dir.join(file);
    let mut lock = git_utils::lockfile::LockFile::acquire(&path)?;
    use std::io::Write;
    lock.write_all(content.as_bytes())?;
    lock.commit()?;
    Ok(())
}

/// Delete a state file. Tolerates absence.
pub fn delete(git_dir: &Path, file: &'static str) -> Result<(), StateError> {
    let path = git_dir.join(file);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether any of `MERGE_HEAD`/`CHERRY_PICK_HEAD` is present — a cheap
/// "is something in progress" probe.
pub fn merge_in_progress(git_dir: &Path) -> bool {
    git_dir.join(MERGE_HEAD).is_file()
}

pub fn cherry_pick_in_progress(git_dir: &Path) -> bool {
    git_dir.join(CHERRY_PICK_HEAD).is_file()
}

/// Read `MERGE_HEAD` (the commit being merged in, "theirs").
pub fn read_merge_head(git_dir: &Path) -> Result<Option<ObjectId>, StateError> {
    read_oid(git_dir, MERGE_HEAD)
}

/// Write `MERGE_HEAD`.
pub fn write_merge_head(git_dir: &Path, oid: &ObjectId) -> Result<(), StateError> {
    write_oid(git_dir, MERGE_HEAD, oid)
}

/// Read the `MERGE_MODE` flags line (e.g. `no-ff`).
pub fn read_merge_mode(git_dir: &Path) -> Result<Option<String>, StateError> {
    read_text(git_dir, MERGE_MODE)
}

/// Write the `MERGE_MODE` flags line.
pub fn write_merge_mode(git_dir: &Path, mode: &str) -> Result<(), StateError> {
    write_text(git_dir, MERGE_MODE, &format!("{}\n", mode))
}

/// Read the prepared `MERGE_MSG` commit message.
pub fn read_merge_msg(git_dir: &Path) -> Result<Option<String>, StateError> {
    read_text(git_dir, MERGE_MSG)
}

/// Write the prepared `MERGE_MSG` commit message.
pub fn write_merge_msg(git_dir: &Path, msg: &str) -> Result<(), StateError> {
    write_text(git_dir, MERGE_MSG, msg)
}

/// Read `CHERRY_PICK_HEAD`.
pub fn read_cherry_pick_head(git_dir: &Path) -> Result<Option<ObjectId>, StateError> {
    read_oid(git_dir, CHERRY_PICK_HEAD)
}

/// Write `CHERRY_PICK_HEAD`.
pub fn write_cherry_pick_head(git_dir: &Path, oid: &ObjectId) -> Result<(), StateError> {
    write_oid(git_dir, CHERRY_PICK_HEAD, oid)
}

/// Read `ORIG_HEAD` (the OID prior to the current reset/merge/rebase).
pub fn read_orig_head(git_dir: &Path) -> Result<Option<ObjectId>, StateError> {
    read_oid(git_dir, ORIG_HEAD)
}

/// Write `ORIG_HEAD`.
pub fn write_orig_head(git_dir: &Path, oid: &ObjectId) -> Result<(), StateError> {
    write_oid(git_dir, ORIG_HEAD, oid)
}

/// Remove every merge-related state file (`MERGE_HEAD`, `MERGE_MODE`,
/// `MERGE_MSG`), as done after `abortMerge` or a successful merge commit.
pub fn clear_merge_state(git_dir: &Path) -> Result<(), StateError> {
    delete(git_dir, MERGE_HEAD)?;
    delete(git_dir, MERGE_MODE)?;
    delete(git_dir, MERGE_MSG)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_head_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let oid = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();

        assert!(read_merge_head(dir.path()).unwrap().is_none());
        write_merge_head(dir.path(), &oid).unwrap();
        assert_eq!(read_merge_head(dir.path()).unwrap(), Some(oid));
        assert!(merge_in_progress(dir.path()));
    }

    #[test]
    fn clear_merge_state_removes_all_three() {
        let dir = tempfile::tempdir().unwrap();
        let oid = ObjectId::from_hex("95d09f2b10159347eece71399a7e2e907ea3df4f").unwrap();

        write_merge_head(dir.path(), &oid).unwrap();
        write_merge_mode(dir.path(), "no-ff").unwrap();
        write_merge_msg(dir.path(), "Merge branch 'x'\n").unwrap();

        clear_merge_state(dir.path()).unwrap();

        assert!(read_merge_head(dir.path()).unwrap().is_none());
        assert!(read_merge_mode(dir.path()).unwrap().is_none());
        assert!(read_merge_msg(dir.path()).unwrap().is_none());
    }

    #[test]
    fn delete_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        delete(dir.path(), MERGE_HEAD).unwrap();
    }

    #[test]
    fn invalid_oid_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_text(dir.path(), MERGE_HEAD, "not an oid\n").unwrap();
        assert!(matches!(
            read_merge_head(dir.path()),
            Err(StateError::InvalidOid { file: MERGE_HEAD })
        ));
    }
}
