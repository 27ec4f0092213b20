//! `reset --soft|--mixed|--hard`: move the current ref and, depending on
//! mode, rebuild the index and/or the working tree to match.

use git_hash::ObjectId;
use git_index::attributes::AttributeStack;
use git_index::{Index, IndexEntry, SparseCheckout, Stage, StatData};
use git_object::Object;
use git_ref::{RefName, RefTransaction};
use git_worktree_sync::{walk_tree, CheckoutContext};

use crate::mutation::Mutation;
use crate::{RepoError, Repository};

/// How far `reset` reaches: just the ref (`Soft`), the ref and index
/// (`Mixed`), or the ref, index, and working tree (`Hard`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    Soft,
    Mixed,
    Hard,
}

impl Repository {
    /// Reset the current branch (or detached `HEAD`) to `target`, a
    /// revision expression resolved via the revparse grammar.
    pub fn reset(&mut self, target: &str, mode: ResetMode) -> Result<ObjectId, RepoError> {
        let new_oid = git_revparse::resolve(target, &self.refs, &self.odb)?;
        let old_oid = self.head_oid()?;

        let target_ref = match self.current_branch_ref()? {
            Some(branch_ref) => branch_ref,
            None => RefName::new("HEAD")?,
        };
        let refname = target_ref.as_str().to_string();
        let message = format!("reset: moving to {target}");

        self.lock_registry.with_lock(&refname, || -> Result<(), RepoError> {
            let mut tx = RefTransaction::new();
            match old_oid {
                Some(old) => tx.update(target_ref.clone(), old, new_oid, message),
                None => tx.create(target_ref.clone(), new_oid, message),
            }
            self.refs.commit_transaction(tx)?;
            Ok(())
        })?;
        self.mutation_sink.publish(Mutation::RefUpdated {
            name: refname,
            old: old_oid.unwrap_or_else(|| self.hash_algo.null_oid()),
            new: new_oid,
        });

        if mode == ResetMode::Soft {
            return Ok(new_oid);
        }

        let target_tree = match self.odb.read(&new_oid)? {
            Some(Object::Commit(commit)) => commit.tree,
            Some(Object::Tree(_)) => new_oid,
            _ => return Err(RepoError::InvalidHead(target.to_string())),
        };

        match mode {
            ResetMode::Mixed => {
                let flat = walk_tree(&self.odb, target_tree)?;
                let mut index = Index::new();
                for (path, (file_mode, oid)) in flat {
                    index.add(IndexEntry {
                        path,
                        oid,
                        mode: file_mode,
                        stage: Stage::Normal,
                        stat: StatData::default(),
                        flags: Default::default(),
                    });
                }
                self.set_index(index);
                self.write_index()?;
                self.mutation_sink.publish(Mutation::IndexWritten);
            }
            ResetMode::Hard => {
                let work_tree = self
                    .work_tree()
                    .ok_or(RepoError::BareNoWorkTree)?
                    .to_path_buf();
                self.index_mut()?;
                let mut index = self.index.take().expect("loaded above");

                let sparse = SparseCheckout::default();
                let attrs = AttributeStack::new();
                let ctx = CheckoutContext {
                    sparse: &sparse,
                    attrs: &attrs,
                    lfs: None,
                };
                let result =
                    git_worktree_sync::checkout(&self.odb, &mut index, &work_tree, target_tree, true, &ctx);
                self.index = Some(index);
                result?;
                self.write_index()?;
                self.mutation_sink.publish(Mutation::CheckoutCompleted { tree: target_tree });
            }
            ResetMode::Soft => unreachable!(),
        }

        Ok(new_oid)
    }
}
