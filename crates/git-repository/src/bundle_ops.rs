//! Bundle creation: walk the objects reachable from a set of refs and pack
//! them into a `.bundle` file via [`git_protocol::bundle`].

use std::collections::HashSet;
use std::path::Path;

use git_hash::ObjectId;
use git_object::Object;
use git_protocol::bundle::{self, Bundle, BundleVerification, UnbundleResult};
use git_ref::RefStore;

use crate::{RepoError, Repository};

impl Repository {
    /// Write a bundle containing every ref in `refnames` and all objects
    /// reachable from them, to `path`.
    pub fn bundle_create(&self, path: &Path, refnames: &[&str]) -> Result<(), RepoError> {
        let mut refs = Vec::with_capacity(refnames.len());
        let mut tips = Vec::with_capacity(refnames.len());
        for refname in refnames {
            let name = git_ref::RefName::new(*refname)?;
            let oid = self
                .refs
                .resolve_to_oid(&name)?
                .ok_or_else(|| RepoError::InvalidHead(refname.to_string()))?;
            refs.push((oid, *refname));
            tips.push(oid);
        }

        let objects = self.collect_reachable(&tips)?;
        let mut pack_data = Vec::new();
        git_pack::generate::generate_pack(&objects, &mut pack_data)?;

        let mut file = std::fs::File::create(path)?;
        bundle::write_bundle(&mut file, &refs, &[], &pack_data)?;
        Ok(())
    }

    /// Walk every commit/tree/blob/tag reachable from `tips`, returning
    /// each as `(oid, type, content)` ready for [`git_pack::generate::generate_pack`].
    fn collect_reachable(
        &self,
        tips: &[ObjectId],
    ) -> Result<Vec<(ObjectId, git_object::ObjectType, Vec<u8>)>, RepoError> {
        let mut seen = HashSet::new();
        let mut queue: Vec<ObjectId> = tips.to_vec();
        let mut objects = Vec::new();

        while let Some(oid) = queue.pop() {
            if !seen.insert(oid) {
                continue;
            }
            let Some(object) = self.odb.read(&oid)? else {
                continue;
            };

            match &object {
                Object::Commit(commit) => {
                    queue.push(commit.tree);
                    queue.extend(&commit.parents);
                }
                Object::Tag(tag) => {
                    queue.push(tag.target);
                }
                Object::Tree(tree) => {
                    for entry in tree.iter() {
                        queue.push(entry.oid);
                    }
                }
                Object::Blob(_) => {}
            }

            let obj_type = object.object_type();
            let content = object.serialize_content();
            objects.push((oid, obj_type, content));
        }

        Ok(objects)
    }

    /// Verify a bundle file's structural integrity without touching this
    /// repository's object database.
    pub fn bundle_verify(&self, path: &Path) -> Result<BundleVerification, RepoError> {
        Ok(bundle::verify_bundle(path)?)
    }

    /// Read a bundle file without importing it.
    pub fn bundle_read(&self, path: &Path) -> Result<Bundle, RepoError> {
        Ok(bundle::read_bundle(path)?)
    }

    /// Import a bundle's objects and fast-forward its refs into this
    /// repository.
    pub fn unbundle(&self, path: &Path) -> Result<UnbundleResult, RepoError> {
        Ok(bundle::unbundle(path, &self.odb, &self.refs)?)
    }
}
