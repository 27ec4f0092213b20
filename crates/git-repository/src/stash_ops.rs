//! `stash push`/`stash pop`: snapshot the index and working tree into a
//! pair of commits reachable only from `refs/stash`, and restore from one
//! later.
//!
//! `stash pop` restores the combined staged+unstaged snapshot in one
//! `checkout` against the stash commit's tree: the staged/unstaged split
//! that C git preserves across a pop is flattened here. See DESIGN.md.

use std::collections::BTreeMap;

use bstr::BString;
use git_hash::ObjectId;
use git_index::attributes::AttributeStack;
use git_index::{SparseCheckout, Stage};
use git_object::{Blob, Commit, Object};
use git_ref::{reflog, RefName, RefStore, RefTransaction};
use git_worktree_sync::{build_tree_from_paths, checkout, CheckoutContext};

use crate::mutation::Mutation;
use crate::{RepoError, Repository};

impl Repository {
    /// Snapshot the index and working tree onto `refs/stash` and leave
    /// `HEAD` untouched. The working tree itself is not reset by this
    /// operation; pair with `checkout`/`reset --hard` to clear it.
    pub fn stash_push(&mut self, message: Option<String>) -> Result<ObjectId, RepoError> {
        let head_oid = self.head_oid()?.ok_or(RepoError::NothingToStash)?;
        let work_tree = self.work_tree().ok_or(RepoError::BareNoWorkTree)?.to_path_buf();

        self.index()?;
        let index_tree = self
            .index
            .as_ref()
            .expect("loaded above")
            .write_tree(&self.odb)?;
        let signature = self.signature_now()?;

        let index_commit = Commit {
            tree: index_tree,
            parents: vec![head_oid],
            author: signature.clone(),
            committer: signature.clone(),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: BString::from("index on stash"),
        };
        let index_commit_oid = self.odb().write(&Object::Commit(index_commit))?;

        let mut paths: BTreeMap<BString, (git_object::FileMode, ObjectId)> = BTreeMap::new();
        for entry in self.index.as_ref().expect("loaded above").iter() {
            if entry.stage != Stage::Normal {
                continue;
            }
            let full = work_tree.join(entry.path.to_str_lossy().as_ref());
            let oid = match std::fs::read(&full) {
                Ok(data) => self.odb.write(&Object::Blob(Blob::new(data)))?,
                Err(_) => entry.oid,
            };
            paths.insert(entry.path.clone(), (entry.mode, oid));
        }
        let worktree_tree = build_tree_from_paths(&self.odb, &paths)?;

        let summary = message.unwrap_or_else(|| "WIP on stash".to_string());
        let stash_commit = Commit {
            tree: worktree_tree,
            parents: vec![head_oid, index_commit_oid],
            author: signature.clone(),
            committer: signature,
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: BString::from(summary.clone()),
        };
        let stash_oid = self.odb().write(&Object::Commit(stash_commit))?;
        self.mutation_sink.publish(Mutation::ObjectWritten { oid: stash_oid });

        let stash_ref = RefName::new("refs/stash")?;
        let old = self.refs.resolve_to_oid(&stash_ref)?;
        let reflog_message = format!("stash: {summary}");

        self.lock_registry.with_lock("refs/stash", || -> Result<(), RepoError> {
            let mut tx = RefTransaction::new();
            match old {
                Some(old_oid) => tx.update(stash_ref.clone(), old_oid, stash_oid, reflog_message),
                None => tx.create(stash_ref.clone(), stash_oid, reflog_message),
            }
            self.refs.commit_transaction(tx)?;
            Ok(())
        })?;

        self.mutation_sink.publish(Mutation::RefUpdated {
            name: "refs/stash".to_string(),
            old: old.unwrap_or_else(|| self.hash_algo.null_oid()),
            new: stash_oid,
        });

        Ok(stash_oid)
    }

    /// Restore the `n`th stash entry (`0` = most recent) into the index and
    /// working tree, then drop it from `refs/stash`'s reflog. Fails with
    /// [`RepoError::StashEmpty`] if there is no such entry.
    pub fn stash_pop(&mut self, n: usize) -> Result<(), RepoError> {
        let stash_ref = RefName::new("refs/stash")?;
        let stash_oid = reflog::resolve_at_n(&self.common_dir, &stash_ref, n)?
            .ok_or(RepoError::StashEmpty)?;

        let stash_commit = match self.odb.read(&stash_oid)? {
            Some(Object::Commit(commit)) => commit,
            _ => return Err(RepoError::StashEmpty),
        };

        let work_tree = self.work_tree().ok_or(RepoError::BareNoWorkTree)?.to_path_buf();

        self.index_mut()?;
        let mut index = self.index.take().expect("loaded above");
        let sparse = SparseCheckout::default();
        let attrs = AttributeStack::new();
        let ctx = CheckoutContext {
            sparse: &sparse,
            attrs: &attrs,
            lfs: None,
        };
        let result = checkout(&self.odb, &mut index, &work_tree, stash_commit.tree, false, &ctx);
        self.index = Some(index);
        result?;
        self.write_index()?;
        self.mutation_sink.publish(Mutation::CheckoutCompleted {
            tree: stash_commit.tree,
        });

        reflog::delete_reflog_entry(&self.common_dir, &stash_ref, n)?;

        match reflog::resolve_at_n(&self.common_dir, &stash_ref, 0)? {
            Some(new_top) => self.refs.write_ref(&stash_ref, &new_top)?,
            None => self.refs.delete_ref(&stash_ref)?,
        }

        Ok(())
    }
}
