//! Working-tree synchronization: `checkout`, `status`, and `abortMerge`,
//! thin delegations onto `git-worktree-sync`'s free functions.

use std::io::{Read, Write};
use std::path::Path;

use bstr::BStr;
use git_index::attributes::AttributeStack;
use git_index::SparseCheckout;
use git_object::Object;
use git_protocol::receive_pack::{receive_pack, ReceivePackReport};
use git_worktree_sync::{self, CheckoutContext, StatusLabel};

use crate::hooks::{HookContext, HookRunner, ReceivePackHookAdapter};
use crate::mutation::Mutation;
use crate::{RepoError, Repository};

impl Repository {
    /// Materialize `target_tree` into the working tree, reconciling
    /// against the current index. See [`git_worktree_sync::checkout`].
    pub fn checkout(&mut self, target_tree: git_hash::ObjectId, force: bool) -> Result<(), RepoError> {
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
        let result = git_worktree_sync::checkout(&self.odb, &mut index, &work_tree, target_tree, force, &ctx);
        self.index = Some(index);
        result?;
        self.write_index()?;
        self.mutation_sink.publish(Mutation::CheckoutCompleted { tree: target_tree });
        Ok(())
    }

    /// Compute the status label for a single working-tree path, per the
    /// (HEAD, index, workdir) combinatoric table.
    pub fn status(&mut self, path: &BStr) -> Result<StatusLabel, RepoError> {
        let work_tree = self.work_tree().ok_or(RepoError::BareNoWorkTree)?.to_path_buf();
        let head_tree = match self.head_oid()? {
            Some(oid) => match self.odb.read(&oid)? {
                Some(Object::Commit(commit)) => Some(commit.tree),
                _ => None,
            },
            None => None,
        };
        self.index()?;
        let index = self.index.as_ref().expect("loaded above");
        Ok(git_worktree_sync::status(&self.odb, index, head_tree, &work_tree, path)?)
    }

    /// Abort an in-progress merge: restore the working tree and index to
    /// `restore_to` (normally `HEAD`) and clear merge state.
    pub fn abort_merge(&mut self, restore_to: git_hash::ObjectId) -> Result<(), RepoError> {
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
        let result = git_worktree_sync::abort_merge(&self.odb, &mut index, &work_tree, &self.common_dir, restore_to, &ctx);
        self.index = Some(index);
        result?;
        self.write_index()?;
        self.mutation_sink.publish(Mutation::MergeAborted);
        Ok(())
    }

    /// Drive a server-side receive-pack exchange over `input`/`output`,
    /// running pre-receive/update/post-receive through this repository's
    /// hook scripts.
    pub fn receive_pack<R: Read, W: Write>(&self, input: R, output: W) -> Result<ReceivePackReport, RepoError> {
        let runner = HookRunner::new(self);
        let ctx = HookContext {
            git_dir: Some(self.git_dir().to_path_buf()),
            work_tree: self.work_tree().map(Path::to_path_buf),
            ..Default::default()
        };
        let adapter = ReceivePackHookAdapter::new(&runner, ctx);
        Ok(receive_pack(input, output, &self.odb, &self.refs, &adapter)?)
    }
}
