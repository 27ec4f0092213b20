//! Commit creation, branch and tag management.

use bstr::{BString, ByteSlice};
use git_hash::ObjectId;
use git_object::{Commit, Object, Tag};
use git_ref::{RefName, RefStore, RefTransaction};

use crate::mutation::Mutation;
use crate::{RepoError, Repository};

impl Repository {
    /// Snapshot the index into a tree and create a commit on top of it,
    /// moving the current branch (or `HEAD` itself, if detached) to point
    /// at the new commit. Errors with [`RepoError::MissingName`] if
    /// `user.name`/`user.email` are unset.
    pub fn commit(&mut self, message: impl Into<BString>) -> Result<ObjectId, RepoError> {
        let message = message.into();
        let parent = self.head_oid()?;
        self.index()?;
        let tree = self.index.as_ref().expect("loaded above").write_tree(&self.odb)?;

        if let Some(parent_oid) = parent {
            if let Some(Object::Commit(parent_commit)) = self.odb().read(&parent_oid)? {
                if parent_commit.tree == tree {
                    return Err(RepoError::NothingToCommit);
                }
            }
        }

        let signature = self.signature_now()?;
        let commit = Commit {
            tree,
            parents: parent.into_iter().collect(),
            author: signature.clone(),
            committer: signature,
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: message.clone(),
        };
        let oid = self.odb().write(&Object::Commit(commit))?;
        self.mutation_sink.publish(Mutation::ObjectWritten { oid });

        let summary = message.lines().next().unwrap_or_default().as_bstr();
        let action = if parent.is_none() {
            format!("commit (initial): {summary}")
        } else {
            format!("commit: {summary}")
        };
        self.move_head(oid, parent, &action)?;
        Ok(oid)
    }

    /// Move the current branch (or detached `HEAD`) to `new`, recording
    /// `reflog_message` as the reflog entry. `old` is the compare-and-swap
    /// baseline; `None` means the ref is being created (unborn branch).
    fn move_head(
        &mut self,
        new: ObjectId,
        old: Option<ObjectId>,
        reflog_message: &str,
    ) -> Result<(), RepoError> {
        let target_ref = match self.current_branch_ref()? {
            Some(branch_ref) => branch_ref,
            None => RefName::new("HEAD")?,
        };
        let refname = target_ref.as_str().to_string();
        let message = reflog_message.to_string();

        self.lock_registry.with_lock(&refname, || -> Result<(), RepoError> {
            let mut tx = RefTransaction::new();
            match old {
                Some(old_oid) => tx.update(target_ref.clone(), old_oid, new, message),
                None => tx.create(target_ref.clone(), new, message),
            }
            self.refs.commit_transaction(tx)?;
            Ok(())
        })?;

        self.mutation_sink.publish(Mutation::RefUpdated {
            name: refname,
            old: old.unwrap_or_else(|| self.hash_algo.null_oid()),
            new,
        });
        Ok(())
    }

    /// Create a branch named `name` pointing at the resolved `start_point`
    /// (a revision expression, per the revparse grammar).
    pub fn branch_create(&mut self, name: &str, start_point: &str) -> Result<ObjectId, RepoError> {
        let target = git_revparse::resolve(start_point, &self.refs, &self.odb)?;
        let refname = RefName::new(format!("refs/heads/{name}"))?;

        if self.refs.resolve_to_oid(&refname)?.is_some() {
            return Err(RepoError::AlreadyExists {
                what: "branch",
                name: name.to_string(),
            });
        }

        let full = refname.as_str().to_string();
        self.lock_registry.with_lock(&full, || -> Result<(), RepoError> {
            let mut tx = RefTransaction::new();
            tx.create(refname, target, format!("branch: Created from {start_point}"));
            self.refs.commit_transaction(tx)?;
            Ok(())
        })?;

        self.mutation_sink.publish(Mutation::RefUpdated {
            name: full,
            old: self.hash_algo.null_oid(),
            new: target,
        });
        Ok(target)
    }

    /// Delete the branch named `name`.
    pub fn branch_delete(&mut self, name: &str) -> Result<(), RepoError> {
        let refname = RefName::new(format!("refs/heads/{name}"))?;
        let old = self
            .refs
            .resolve_to_oid(&refname)?
            .ok_or_else(|| RepoError::InvalidHead(format!("refs/heads/{name}")))?;

        let full = refname.as_str().to_string();
        self.lock_registry.with_lock(&full, || -> Result<(), RepoError> {
            let mut tx = RefTransaction::new();
            tx.delete(refname, old, format!("branch: Deleted {name}"));
            self.refs.commit_transaction(tx)?;
            Ok(())
        })?;

        self.mutation_sink.publish(Mutation::RefDeleted { name: full });
        Ok(())
    }

    /// Create a tag. With `tag_message` set, creates an annotated tag
    /// object; otherwise a lightweight tag (a direct ref to `target`).
    pub fn tag_create(
        &mut self,
        name: &str,
        target: &str,
        tag_message: Option<BString>,
    ) -> Result<ObjectId, RepoError> {
        let target_oid = git_revparse::resolve(target, &self.refs, &self.odb)?;
        let refname = RefName::new(format!("refs/tags/{name}"))?;

        if self.refs.resolve_to_oid(&refname)?.is_some() {
            return Err(RepoError::AlreadyExists {
                what: "tag",
                name: name.to_string(),
            });
        }

        let target_type = match self.odb.read(&target_oid)? {
            Some(Object::Blob(_)) => git_object::ObjectType::Blob,
            Some(Object::Tree(_)) => git_object::ObjectType::Tree,
            Some(Object::Commit(_)) => git_object::ObjectType::Commit,
            Some(Object::Tag(_)) => git_object::ObjectType::Tag,
            None => return Err(RepoError::Odb(git_odb::OdbError::NotFound(target_oid))),
        };

        let ref_oid = if let Some(message) = tag_message {
            let signature = self.signature_now()?;
            let tag = Tag {
                target: target_oid,
                target_type,
                tag_name: BString::from(name),
                tagger: Some(signature),
                message,
                gpgsig: None,
            };
            self.odb.write(&Object::Tag(tag))?
        } else {
            target_oid
        };

        let full = refname.as_str().to_string();
        self.lock_registry.with_lock(&full, || -> Result<(), RepoError> {
            let mut tx = RefTransaction::new();
            tx.create(refname, ref_oid, format!("tag: Created tag {name}"));
            self.refs.commit_transaction(tx)?;
            Ok(())
        })?;

        self.mutation_sink.publish(Mutation::RefUpdated {
            name: full,
            old: self.hash_algo.null_oid(),
            new: ref_oid,
        });
        Ok(ref_oid)
    }

    /// Delete the tag named `name`.
    pub fn tag_delete(&mut self, name: &str) -> Result<(), RepoError> {
        let refname = RefName::new(format!("refs/tags/{name}"))?;
        let old = self
            .refs
            .resolve_to_oid(&refname)?
            .ok_or_else(|| RepoError::InvalidHead(format!("refs/tags/{name}")))?;

        let full = refname.as_str().to_string();
        self.lock_registry.with_lock(&full, || -> Result<(), RepoError> {
            let mut tx = RefTransaction::new();
            tx.delete(refname, old, format!("tag: Deleted {name}"));
            self.refs.commit_transaction(tx)?;
            Ok(())
        })?;

        self.mutation_sink.publish(Mutation::RefDeleted { name: full });
        Ok(())
    }
}
