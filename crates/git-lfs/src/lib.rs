//! LFS pointer files and content-addressed large-object storage.
//!
//! A pointer file is the small text stub git stores in the object
//! database in place of a large file's actual bytes; the bytes
//! themselves live in the LFS storage directory, addressed by hash.

use std::io::Write;
use std::path::PathBuf;

use git_hash::{HashAlgorithm, ObjectId};

/// Errors from pointer parsing/serialization or LFS object storage.
#[derive(Debug, thiserror::Error)]
pub enum LfsError {
    #[error("not an LFS pointer")]
    NotAPointer,

    #[error("malformed LFS pointer: {0}")]
    MalformedPointer(String),

    #[error("LFS object {oid} not found in storage")]
    ObjectNotFound { oid: String },

    #[error("LFS object {oid} size mismatch: pointer says {expected}, storage has {actual}")]
    SizeMismatch {
        oid: String,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lock(#[from] git_utils::UtilError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),
}

const SPEC_VERSION: &str = "https://git-lfs.github.com/spec/v1";

/// A parsed LFS pointer: the algorithm/hash of the real content and its
/// byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub algo: HashAlgorithm,
    pub oid_hex: String,
    pub size: u64,
}

impl Pointer {
    pub fn new(algo: HashAlgorithm, oid_hex: impl Into<String>, size: u64) -> Self {
        Self {
            algo,
            oid_hex: oid_hex.into(),
            size,
        }
    }

    /// Serialize to the canonical three-line pointer text. Line order
    /// (version, oid, size) is part of the format.
    pub fn render(&self) -> String {
        format!(
            "version {}\noid {}:{}\nsize {}\n",
            SPEC_VERSION,
            self.algo.name(),
            self.oid_hex,
            self.size
        )
    }

    /// Parse pointer text. Fails with [`LfsError::NotAPointer`] if the
    /// first line isn't the expected version string, and
    /// [`LfsError::MalformedPointer`] for any other structural problem.
    pub fn parse(content: &[u8]) -> Result<Self, LfsError> {
        let text = std::str::from_utf8(content).map_err(|_| LfsError::NotAPointer)?;
        let mut lines = text.lines();

        let version = lines.next().ok_or(LfsError::NotAPointer)?;
        if version != format!("version {SPEC_VERSION}") {
            return Err(LfsError::NotAPointer);
        }

        let oid_line = lines
            .next()
            .ok_or_else(|| LfsError::MalformedPointer("missing oid line".into()))?;
        let oid_field = oid_line
            .strip_prefix("oid ")
            .ok_or_else(|| LfsError::MalformedPointer("expected 'oid ' line".into()))?;
        let (algo_name, oid_hex) = oid_field
            .split_once(':')
            .ok_or_else(|| LfsError::MalformedPointer("oid missing ':' separator".into()))?;
        let algo = HashAlgorithm::from_name(algo_name)
            .ok_or_else(|| LfsError::MalformedPointer(format!("unknown algo '{algo_name}'")))?;

        let size_line = lines
            .next()
            .ok_or_else(|| LfsError::MalformedPointer("missing size line".into()))?;
        let size_field = size_line
            .strip_prefix("size ")
            .ok_or_else(|| LfsError::MalformedPointer("expected 'size ' line".into()))?;
        let size: u64 = size_field
            .parse()
            .map_err(|_| LfsError::MalformedPointer(format!("invalid size '{size_field}'")))?;

        Ok(Self {
            algo,
            oid_hex: oid_hex.to_string(),
            size,
        })
    }

    /// Quick structural check, for callers that only need to know
    /// "is this blob an LFS pointer" without the full parse.
    pub fn looks_like_pointer(content: &[u8]) -> bool {
        content.starts_with(format!("version {SPEC_VERSION}\n").as_bytes())
    }
}

/// Content-addressed storage for the large objects LFS pointers refer to.
///
/// Objects live at `<root>/<hh>/<hh>/<hex>`, mirroring the loose object
/// store's fan-out layout but keyed on the LFS oid rather than a git OID.
pub struct LfsStore {
    root: PathBuf,
}

impl LfsStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, oid_hex: &str) -> PathBuf {
        if oid_hex.len() >= 4 {
            self.root
                .join(&oid_hex[0..2])
                .join(&oid_hex[2..4])
                .join(oid_hex)
        } else {
            self.root.join(oid_hex)
        }
    }

    /// Whether an object with this hex id is present.
    pub fn contains(&self, oid_hex: &str) -> bool {
        self.object_path(oid_hex).is_file()
    }

    /// Read an LFS object's bytes, verifying against the pointer's
    /// declared size.
    pub fn read(&self, pointer: &Pointer) -> Result<Vec<u8>, LfsError> {
        let path = self.object_path(&pointer.oid_hex);
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LfsError::ObjectNotFound {
                    oid: pointer.oid_hex.clone(),
                }
            } else {
                LfsError::Io(e)
            }
        })?;
        if bytes.len() as u64 != pointer.size {
            return Err(LfsError::SizeMismatch {
                oid: pointer.oid_hex.clone(),
                expected: pointer.size,
                actual: bytes.len() as u64,
            });
        }
        Ok(bytes)
    }

    /// Store bytes under the given algorithm, returning the pointer that
    /// refers to them.
    pub fn write(&self, algo: HashAlgorithm, bytes: &[u8]) -> Result<Pointer, LfsError> {
        let mut hasher = git_hash::hasher::Hasher::new(algo);
        hasher.update(bytes);
        let oid: ObjectId = hasher.finalize()?;
        let oid_hex = oid.to_hex();

        let path = self.object_path(&oid_hex);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut lock = git_utils::lockfile::LockFile::acquire(&path)?;
        lock.write_all(bytes)?;
        lock.commit()?;

        Ok(Pointer::new(algo, oid_hex, bytes.len() as u64))
    }
}

/// Smudge: resolve a pointer's bytes from storage, for substitution into
/// the working tree during checkout.
pub fn smudge(store: &LfsStore, pointer: &Pointer) -> Result<Vec<u8>, LfsError> {
    store.read(pointer)
}

/// Clean: store working-tree bytes for an LFS-tracked path and return the
/// pointer text to write into the object database in its place.
pub fn clean(store: &LfsStore, algo: HashAlgorithm, bytes: &[u8]) -> Result<String, LfsError> {
    let pointer = store.write(algo, bytes)?;
    Ok(pointer.render())
}

/// Whether a `.gitattributes`-resolved attribute value marks a path as
/// LFS-tracked (`filter=lfs`).
pub fn is_lfs_filter(value: &str) -> bool {
    value == "lfs"
}
