//! Recursive tree flattening: turn a tree OID into a flat path → (mode, oid)
//! map, the shape `checkout`/`status` need.

use std::collections::BTreeMap;

use bstr::BString;
use git_hash::ObjectId;
use git_object::{FileMode, Object};
use git_odb::ObjectDatabase;

use crate::WorktreeError;

/// Recursively flatten a tree into every blob/symlink/gitlink path it
/// contains, keyed by full path (`/`-joined) from the tree root.
/// Subdirectories (`FileMode::Tree`) are expanded away, never appear in
/// the result themselves.
pub fn walk_tree(
    odb: &ObjectDatabase,
    tree_oid: ObjectId,
) -> Result<BTreeMap<BString, (FileMode, ObjectId)>, WorktreeError> {
    let mut out = BTreeMap::new();
    walk_into(odb, tree_oid, &mut BString::from(Vec::new()), &mut out)?;
    Ok(out)
}

fn walk_into(
    odb: &ObjectDatabase,
    tree_oid: ObjectId,
    prefix: &mut BString,
    out: &mut BTreeMap<BString, (FileMode, ObjectId)>,
) -> Result<(), WorktreeError> {
    let object = odb
        .read(&tree_oid)?
        .ok_or(WorktreeError::MissingObject(tree_oid))?;
    let tree = match object {
        Object::Tree(tree) => tree,
        _ => return Err(WorktreeError::NotATree(tree_oid)),
    };

    let prefix_len = prefix.len();
    for entry in tree.iter() {
        if prefix_len > 0 {
            prefix.push(b'/');
        }
        prefix.extend_from_slice(&entry.name);

        if entry.mode.is_tree() {
            walk_into(odb, entry.oid, prefix, out)?;
        } else {
            out.insert(prefix.clone(), (entry.mode, entry.oid));
        }

        prefix.truncate(prefix_len);
    }
    Ok(())
}
