//! The inverse of [`crate::tree_walk::walk_tree`]: turn a flat path →
//! (mode, oid) map back into nested tree objects, written to the object
//! database bottom-up.

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use git_hash::ObjectId;
use git_object::{FileMode, Object, Tree, TreeEntry};
use git_odb::ObjectDatabase;

use crate::WorktreeError;

/// A directory being assembled: subdirectories keyed by their own name,
/// built recursively; files recorded directly as their final tree entry.
#[derive(Default)]
struct DirNode {
    files: Vec<(BString, FileMode, ObjectId)>,
    dirs: BTreeMap<BString, DirNode>,
}

impl DirNode {
    fn child(&mut self, name: &[u8]) -> &mut DirNode {
        self.dirs.entry(BString::from(name)).or_default()
    }

    fn write(self, odb: &ObjectDatabase) -> Result<ObjectId, WorktreeError> {
        let mut entries = Vec::with_capacity(self.files.len() + self.dirs.len());
        for (name, mode, oid) in self.files {
            entries.push(TreeEntry { mode, name, oid });
        }
        for (name, node) in self.dirs {
            let oid = node.write(odb)?;
            entries.push(TreeEntry {
                mode: FileMode::Tree,
                name,
                oid,
            });
        }
        let mut tree = Tree { entries };
        tree.sort();
        Ok(odb.write(&Object::Tree(tree))?)
    }
}

/// Build a tree hierarchy from a flat set of `/`-joined paths, writing every
/// directory's tree object to `odb` as it is assembled, and return the OID
/// of the root. An empty `paths` produces an empty root tree.
pub fn build_tree_from_paths(
    odb: &ObjectDatabase,
    paths: &BTreeMap<BString, (FileMode, ObjectId)>,
) -> Result<ObjectId, WorktreeError> {
    let mut root = DirNode::default();

    for (path, (mode, oid)) in paths {
        let mut components: Vec<&[u8]> = path.split(|&b| b == b'/').collect();
        let file_name = components.pop().expect("path has at least one component");

        let mut node = &mut root;
        for dir_name in components {
            node = node.child(dir_name);
        }
        node.files.push((BString::from(file_name), *mode, *oid));
    }

    root.write(odb)
}
