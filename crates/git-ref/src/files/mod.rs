pub(crate) mod loose;
pub mod packed;
pub(crate) mod transaction;

use std::path::{Path, PathBuf};

use git_hash::ObjectId;
use git_utils::date::Signature;

use crate::error::RefError;
use crate::name::RefName;
use crate::reflog::{self, ReflogEntry};
use crate::store::{RefStore, RefTransaction};
use crate::Reference;

use self::packed::PackedRefs;

/// Maximum depth for following symbolic ref chains.
const MAX_SYMREF_DEPTH: usize = 10;

/// Is this ref name resolved against the worktree-private gitdir rather
/// than the shared/main one? Per-worktree: `HEAD` and `refs/HEAD`. Every
/// other ref (including `refs/heads/*`, `refs/tags/*`, `refs/remotes/*`)
/// lives in the main gitdir and is shared across all worktrees.
fn is_worktree_private(name: &RefName) -> bool {
    matches!(name.as_str(), "HEAD" | "refs/HEAD")
}

/// Pick the directory a given ref name resolves against: `head_dir` for
/// `HEAD`/`refs/HEAD`, `common_dir` for everything else. Exposed for the
/// transaction module, which juggles both directories per-update.
pub(crate) fn ref_dir_for<'a>(name: &RefName, head_dir: &'a Path, common_dir: &'a Path) -> &'a Path {
    if is_worktree_private(name) {
        head_dir
    } else {
        common_dir
    }
}

/// Files-backend ref store (loose refs + packed-refs).
///
/// This is the default ref backend matching C git's files backend:
/// - Loose refs stored as individual files under `.git/refs/`
/// - Packed refs in `.git/packed-refs` for efficiency
/// - Loose refs take precedence over packed refs
/// - Lock files for atomic updates
///
/// `HEAD` is resolved against `head_dir`; everything else against
/// `common_dir`. For a non-worktree repository the two are the same path.
pub struct FilesRefStore {
    head_dir: PathBuf,
    common_dir: PathBuf,
    committer: Option<Signature>,
    log_all_ref_updates: bool,
}

impl FilesRefStore {
    /// Create a new files-based ref store rooted at a single gitdir.
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        let git_dir = git_dir.as_ref().to_path_buf();
        Self {
            head_dir: git_dir.clone(),
            common_dir: git_dir,
            committer: None,
            log_all_ref_updates: true,
        }
    }

    /// Create a files-based ref store for a linked worktree, where `HEAD`
    /// lives under `head_dir` (the worktree's private gitdir) and every
    /// other ref lives under `common_dir` (the main gitdir).
    pub fn new_with_worktree(head_dir: impl AsRef<Path>, common_dir: impl AsRef<Path>) -> Self {
        Self {
            head_dir: head_dir.as_ref().to_path_buf(),
            common_dir: common_dir.as_ref().to_path_buf(),
            committer: None,
            log_all_ref_updates: true,
        }
    }

    /// Set the committer identity used for reflog entries.
    pub fn set_committer(&mut self, sig: Signature) {
        self.committer = Some(sig);
    }

    /// Set whether ref updates append reflog entries (`core.logAllRefUpdates`).
    /// A no-op update (old == new) never logs, regardless of this setting.
    pub fn set_log_all_ref_updates(&mut self, enabled: bool) {
        self.log_all_ref_updates = enabled;
    }

    /// Get the (shared) git directory path.
    pub fn git_dir(&self) -> &Path {
        &self.common_dir
    }

    /// Resolve the directory a given ref name should be read/written through.
    fn dir_for(&self, name: &RefName) -> &Path {
        ref_dir_for(name, &self.head_dir, &self.common_dir)
    }

    /// Resolve a ref name, following symbolic ref chains up to MAX_SYMREF_DEPTH.
    fn resolve_inner(
        &self,
        name: &RefName,
        depth: usize,
    ) -> Result<Option<ObjectId>, RefError> {
        if depth > MAX_SYMREF_DEPTH {
            return Err(RefError::SymrefLoop(name.to_string()));
        }

        // Check loose ref first
        match loose::read_loose_ref(self.dir_for(name), name)? {
            Some(Reference::Direct { target, .. }) => Ok(Some(target)),
            Some(Reference::Symbolic { target, .. }) => {
                self.resolve_inner(&target, depth + 1)
            }
            None => {
                // Fall back to packed refs (always shared)
                let packed = PackedRefs::load(&self.common_dir)?;
                Ok(packed.find(name).map(|pr| pr.oid))
            }
        }
    }

    /// Write a single ref directly (non-transactional).
    pub fn write_ref(&self, name: &RefName, oid: &ObjectId) -> Result<(), RefError> {
        loose::write_loose_ref(self.dir_for(name), name, oid)
    }

    /// Write a symbolic ref directly (non-transactional).
    pub fn write_symbolic_ref(&self, name: &RefName, target: &RefName) -> Result<(), RefError> {
        loose::write_symbolic_ref(self.dir_for(name), name, target)
    }

    /// Delete a ref directly (non-transactional).
    pub fn delete_ref(&self, name: &RefName) -> Result<(), RefError> {
        loose::delete_loose_ref(self.dir_for(name), name)
    }

    /// Commit a transaction atomically.
    pub fn commit_transaction(&self, transaction: RefTransaction) -> Result<(), RefError> {
        transaction::commit_transaction(
            &self.head_dir,
            &self.common_dir,
            transaction,
            self.committer.as_ref(),
            self.log_all_ref_updates,
        )
    }

    /// Load the packed-refs file.
    pub fn packed_refs(&self) -> Result<PackedRefs, RefError> {
        PackedRefs::load(&self.common_dir)
    }

    /// Pack a loose ref into packed-refs and remove the loose file.
    pub fn pack_ref(&self, name: &RefName) -> Result<(), RefError> {
        // Read the current loose ref value
        let oid = match loose::read_loose_ref(self.dir_for(name), name)? {
            Some(Reference::Direct { target, .. }) => target,
            Some(Reference::Symbolic { .. }) => {
                return Err(RefError::PackedRefs(
                    "cannot pack symbolic ref".into(),
                ));
            }
            None => return Err(RefError::NotFound(name.to_string())),
        };

        // Add to packed-refs
        let mut packed = PackedRefs::load(&self.common_dir)?;
        packed.upsert(name.clone(), oid, None);
        packed.write(&self.common_dir)?;

        // Remove the loose file
        loose::delete_loose_ref(self.dir_for(name), name)?;

        Ok(())
    }
}

impl RefStore for FilesRefStore {
    fn resolve(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        // Check loose ref first
        match loose::read_loose_ref(self.dir_for(name), name)? {
            Some(r) => Ok(Some(r)),
            None => {
                // Fall back to packed refs (always shared)
                let packed = PackedRefs::load(&self.common_dir)?;
                Ok(packed.find(name).map(|pr| Reference::Direct {
                    name: pr.name.clone(),
                    target: pr.oid,
                }))
            }
        }
    }

    fn resolve_to_oid(&self, name: &RefName) -> Result<Option<ObjectId>, RefError> {
        self.resolve_inner(name, 0)
    }

    fn iter(
        &self,
        prefix: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<Reference, RefError>> + '_>, RefError> {
        // Collect all loose refs (HEAD is not under refs/ and is never listed here)
        let loose_refs = loose::enumerate_loose_refs(&self.common_dir, prefix)?;
        let mut loose_names: std::collections::HashSet<String> = std::collections::HashSet::new();

        let mut all_refs: Vec<Result<Reference, RefError>> = Vec::new();

        for (name, _path) in &loose_refs {
            loose_names.insert(name.as_str().to_string());
            match loose::read_loose_ref(&self.common_dir, name) {
                Ok(Some(r)) => all_refs.push(Ok(r)),
                Ok(None) => {} // File may have been deleted between enumerate and read
                Err(e) => all_refs.push(Err(e)),
            }
        }

        // Add packed refs that aren't overridden by loose refs
        let packed = PackedRefs::load(&self.common_dir)?;
        for pr in packed.refs() {
            if loose_names.contains(pr.name.as_str()) {
                continue; // Loose ref takes precedence
            }
            if let Some(p) = prefix {
                if !pr.name.as_str().starts_with(p) {
                    continue;
                }
            }
            all_refs.push(Ok(Reference::Direct {
                name: pr.name.clone(),
                target: pr.oid,
            }));
        }

        // Sort by ref name
        all_refs.sort_by(|a, b| {
            let name_a = match a {
                Ok(r) => r.name().clone(),
                Err(_) => RefName::new_unchecked(""),
            };
            let name_b = match b {
                Ok(r) => r.name().clone(),
                Err(_) => RefName::new_unchecked(""),
            };
            name_a.cmp(&name_b)
        });

        Ok(Box::new(all_refs.into_iter()))
    }

    fn reflog(&self, name: &RefName) -> Result<Vec<ReflogEntry>, RefError> {
        reflog::read_reflog(self.dir_for(name), name)
    }

    fn append_reflog(&self, name: &RefName, entry: &ReflogEntry) -> Result<(), RefError> {
        reflog::append_reflog_entry(self.dir_for(name), name, entry)
    }

    fn commit_transaction(&self, transaction: RefTransaction) -> Result<(), RefError> {
        self.commit_transaction(transaction)
    }
}
