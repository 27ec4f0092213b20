//! Bundle file format support.
//!
//! Git bundles are files that contain a pack plus a list of references.
//! They enable offline transfer of objects.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use git_hash::ObjectId;
use git_odb::ObjectDatabase;
use git_ref::{RefName, RefStore, RefTransaction};

use crate::ProtocolError;

/// Bundle file header signature.
const BUNDLE_V2_SIGNATURE: &str = "# v2 git bundle";
const BUNDLE_V3_SIGNATURE: &str = "# v3 git bundle";

/// Parsed bundle file.
#[derive(Debug)]
pub struct Bundle {
    /// Bundle version (2 or 3).
    pub version: u32,
    /// Prerequisites (OIDs the receiver must already have).
    pub prerequisites: Vec<(ObjectId, Option<String>)>,
    /// References included in the bundle.
    pub refs: Vec<(ObjectId, String)>,
    /// Pack data (everything after the header).
    pub pack_data: Vec<u8>,
}

/// Read a bundle file.
pub fn read_bundle(path: &Path) -> Result<Bundle, ProtocolError> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    parse_bundle(&mut reader)
}

/// Parse a bundle from a reader.
pub fn parse_bundle<R: Read>(reader: &mut BufReader<R>) -> Result<Bundle, ProtocolError> {
    let mut line = String::new();

    // Read signature line
    reader.read_line(&mut line)?;
    let line = line.trim_end();

    let version = if line == BUNDLE_V2_SIGNATURE {
        2
    } else if line == BUNDLE_V3_SIGNATURE {
        3
    } else {
        return Err(ProtocolError::Protocol(format!(
            "invalid bundle signature: {}",
            line
        )));
    };

    let mut prerequisites = Vec::new();
    let mut refs = Vec::new();

    // Read prerequisite and ref lines until blank line
    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }

        let line = line.trim_end();
        if line.is_empty() {
            break;
        }

        if let Some(rest) = line.strip_prefix('-') {
            // Prerequisite: -<oid> [<comment>]
            let parts: Vec<&str> = rest.splitn(2, ' ').collect();
            let oid = ObjectId::from_hex(parts[0]).map_err(|e| {
                ProtocolError::Protocol(format!("invalid OID in bundle prerequisite: {}", e))
            })?;
            let comment = parts.get(1).map(|s| s.to_string());
            prerequisites.push((oid, comment));
        } else {
            // Reference: <oid> <refname>
            let parts: Vec<&str> = line.splitn(2, ' ').collect();
            if parts.len() != 2 {
                return Err(ProtocolError::Protocol(format!(
                    "invalid bundle ref line: {}",
                    line
                )));
            }
            let oid = ObjectId::from_hex(parts[0]).map_err(|e| {
                ProtocolError::Protocol(format!("invalid OID in bundle ref: {}", e))
            })?;
            refs.push((oid, parts[1].to_string()));
        }
    }

    // Rest is pack data
    let mut pack_data = Vec::new();
    reader.read_to_end(&mut pack_data)?;

    Ok(Bundle {
        version,
        prerequisites,
        refs,
        pack_data,
    })
}

/// Write a bundle file.
pub fn write_bundle<W: Write>(
    writer: &mut W,
    refs: &[(ObjectId, &str)],
    prerequisites: &[(ObjectId, Option<&str>)],
    pack_data: &[u8],
) -> Result<(), ProtocolError> {
    // Write v2 header
    writeln!(writer, "{}", BUNDLE_V2_SIGNATURE)?;

    // Write prerequisites
    for (oid, comment) in prerequisites {
        if let Some(c) = comment {
            writeln!(writer, "-{} {}", oid, c)?;
        } else {
            writeln!(writer, "-{}", oid)?;
        }
    }

    // Write refs
    for (oid, refname) in refs {
        writeln!(writer, "{} {}", oid, refname)?;
    }

    // Blank line separates header from pack data
    writeln!(writer)?;

    // Write pack data
    writer.write_all(pack_data)?;

    Ok(())
}

/// Outcome of `verify_bundle`.
#[derive(Debug)]
pub struct BundleVerification {
    pub valid: bool,
    pub refs: Vec<(ObjectId, String)>,
    pub reason: Option<String>,
}

/// Re-parse a bundle and confirm the packfile magic and minimum length.
/// Does not touch any object database.
pub fn verify_bundle(path: &Path) -> Result<BundleVerification, ProtocolError> {
    let bundle = match read_bundle(path) {
        Ok(b) => b,
        Err(e) => {
            return Ok(BundleVerification {
                valid: false,
                refs: Vec::new(),
                reason: Some(e.to_string()),
            })
        }
    };

    if bundle.pack_data.len() < git_pack::PACK_HEADER_SIZE || &bundle.pack_data[0..4] != b"PACK" {
        return Ok(BundleVerification {
            valid: false,
            refs: bundle.refs,
            reason: Some("pack data missing PACK magic or too short".into()),
        });
    }

    Ok(BundleVerification {
        valid: true,
        refs: bundle.refs,
        reason: None,
    })
}

/// Outcome of `unbundle`.
#[derive(Debug, Default)]
pub struct UnbundleResult {
    /// Refs that were created or fast-forwarded, with their new OID.
    pub imported: Vec<(String, ObjectId)>,
    /// Refs that were rejected, with the reason (typically non-fast-forward).
    pub rejected: Vec<(String, String)>,
}

/// Unpack a bundle's pack data into `objects/pack/` and fast-forward-only
/// write the refs it lists. Refs that would not fast-forward are rejected
/// rather than failing the whole operation.
pub fn unbundle(
    bundle_path: &Path,
    odb: &ObjectDatabase,
    refs: &dyn RefStore,
) -> Result<UnbundleResult, ProtocolError> {
    let bundle = read_bundle(bundle_path)?;
    let hash_algo = odb.hash_algo();

    let pack_dir = odb.objects_dir().join("pack");
    std::fs::create_dir_all(&pack_dir)?;

    // Name the pack by a hash of its own bytes so repeated unbundles of the
    // same content land on the same pack file.
    let mut namer = git_hash::hasher::Hasher::new(hash_algo);
    namer.update(&bundle.pack_data);
    let pack_name = namer.finalize()?;
    let pack_path = pack_dir.join(format!("pack-{}.pack", pack_name.to_hex()));
    std::fs::write(&pack_path, &bundle.pack_data)?;

    git_pack::index_pack::index_pack(&pack_path, hash_algo)?;
    odb.refresh()?;

    let mut result = UnbundleResult::default();
    for (oid, refname) in &bundle.refs {
        let name = match RefName::new(refname.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                result.rejected.push((refname.clone(), e.to_string()));
                continue;
            }
        };

        let current = refs.resolve_to_oid(&name)?;
        let fast_forward = match current {
            None => true,
            Some(cur) if cur == *oid => true,
            Some(cur) => is_ancestor(odb, &cur, oid).unwrap_or(false),
        };

        if !fast_forward {
            result
                .rejected
                .push((refname.clone(), "non-fast-forward".into()));
            continue;
        }

        let mut txn = RefTransaction::new();
        match current {
            Some(cur) => txn.update(name, cur, *oid, format!("unbundle: fast-forward {refname}")),
            None => txn.create(name, *oid, format!("unbundle: new ref {refname}")),
        }
        refs.commit_transaction(txn)?;
        result.imported.push((refname.clone(), *oid));
    }

    Ok(result)
}

/// Walk `candidate`'s first-parent-and-all-parents ancestry looking for `target`.
fn is_ancestor(
    odb: &ObjectDatabase,
    target: &ObjectId,
    candidate: &ObjectId,
) -> Result<bool, ProtocolError> {
    use std::collections::HashSet;

    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut queue = vec![*candidate];

    while let Some(oid) = queue.pop() {
        if oid == *target {
            return Ok(true);
        }
        if !seen.insert(oid) {
            continue;
        }
        if let Some(git_object::Object::Commit(commit)) = odb.read(&oid)? {
            queue.extend(commit.parents);
        }
    }

    Ok(false)
}
