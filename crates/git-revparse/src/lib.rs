//! Revision grammar: `ref~n^m@{k}` resolution.
//!
//! Parses a single revision expression against a ref store and object
//! database and resolves it down to an [`ObjectId`]. Grammar is applied
//! left-to-right, greedily, against three forms in order: reflog
//! selection (`@{n}`), relative parent walk (`~`/`^`), and finally a
//! plain ref/OID lookup.

use git_hash::ObjectId;
use git_object::Object;
use git_odb::ObjectDatabase;
use git_ref::{RefName, RefStore};

/// Errors resolving a revision expression.
#[derive(Debug, thiserror::Error)]
pub enum RevParseError {
    #[error("revision not found: {0}")]
    NotFound(String),

    #[error("{0} is not supported")]
    Unsupported(String),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),
}

/// Resolve a single revision expression to an object id.
///
/// `input` is matched against, in order:
///   1. `<ref>@{<n>}` — the object the ref pointed to `n` reflog entries
///      ago (`0` = current). A time-based selector (`@{1.day.ago}`) is
///      parsed but rejected with [`RevParseError::Unsupported`].
///   2. `<ref>` followed by one or more `~`/`^` characters, optionally
///      followed by a decimal count — walk that many first-parent steps.
///      `~` and `^` are equivalent here; `^<n>` (n-th parent) is not part
///      of this grammar.
///   3. Otherwise, a plain ref name or (possibly abbreviated) object id.
pub fn resolve(
    input: &str,
    refs: &dyn RefStore,
    odb: &ObjectDatabase,
) -> Result<ObjectId, RevParseError> {
    if let Some((base, selector)) = split_reflog_selector(input) {
        return resolve_reflog_selector(base, selector, refs);
    }

    if let Some((base, steps)) = split_parent_walk(input) {
        let mut oid = resolve_ref_or_oid(base, refs, odb)?;
        for _ in 0..steps {
            oid = first_parent(&oid, odb)?;
        }
        return Ok(oid);
    }

    resolve_ref_or_oid(input, refs, odb)
}

/// Resolve many revision expressions, preserving input order.
pub fn resolve_many(
    inputs: &[&str],
    refs: &dyn RefStore,
    odb: &ObjectDatabase,
) -> Vec<Result<ObjectId, RevParseError>> {
    use rayon::prelude::*;
    inputs
        .par_iter()
        .map(|input| resolve(input, refs, odb))
        .collect()
}

/// Split `<ref>@{<selector>}` into `(ref, selector)`. The selector text is
/// returned unparsed; it may be a decimal count or a time expression.
fn split_reflog_selector(input: &str) -> Option<(&str, &str)> {
    let at = input.find("@{")?;
    if !input.ends_with('}') {
        return None;
    }
    let base = &input[..at];
    let selector = &input[at + 2..input.len() - 1];
    Some((base, selector))
}

fn resolve_reflog_selector(
    base: &str,
    selector: &str,
    refs: &dyn RefStore,
) -> Result<ObjectId, RevParseError> {
    let name = resolve_ref_name(base, refs)?
        .ok_or_else(|| RevParseError::NotFound(base.to_string()))?;

    let n: usize = match selector.parse() {
        Ok(n) => n,
        Err(_) => return Err(RevParseError::Unsupported(format!("@{{{selector}}}"))),
    };

    let entries = refs.reflog(&name)?;
    entries
        .get(n)
        .map(|e| e.new_oid)
        .ok_or_else(|| RevParseError::NotFound(format!("{base}@{{{n}}}")))
}

/// Split a trailing run of `~`/`^` characters (optionally followed by a
/// decimal count) off of `input`. Returns `(base, total_steps)`.
fn split_parent_walk(input: &str) -> Option<(&str, usize)> {
    let trailing_start = input.rfind(|c: char| c != '~' && c != '^' && !c.is_ascii_digit())?;
    let (base, rest) = input.split_at(trailing_start + 1);
    if rest.is_empty() || !rest.starts_with(['~', '^']) {
        return None;
    }

    let mut steps = 0usize;
    let mut chars = rest.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c == '~' || c == '^' {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let count: usize = if digits.is_empty() {
                1
            } else {
                digits.parse().ok()?
            };
            steps += count;
        } else {
            return None;
        }
    }
    Some((base, steps))
}

fn first_parent(oid: &ObjectId, odb: &ObjectDatabase) -> Result<ObjectId, RevParseError> {
    match odb.read(oid)? {
        Some(Object::Commit(commit)) => commit
            .parents
            .first()
            .copied()
            .ok_or_else(|| RevParseError::NotFound(format!("{oid}^"))),
        Some(Object::Tag(tag)) => first_parent(&tag.target, odb),
        Some(_) => Err(RevParseError::NotFound(format!(
            "{oid} is not a commit or tag"
        ))),
        None => Err(RevParseError::NotFound(oid.to_string())),
    }
}

/// Resolve a bare ref name (no walk/selector suffix) to the `RefName` it
/// names, expanding the usual shorthand forms: full name, `refs/<name>`,
/// `refs/tags/<name>`, `refs/heads/<name>`, `refs/remotes/<name>`.
fn resolve_ref_name(input: &str, refs: &dyn RefStore) -> Result<Option<RefName>, RevParseError> {
    let candidates: [String; 5] = [
        input.to_string(),
        format!("refs/{input}"),
        format!("refs/tags/{input}"),
        format!("refs/heads/{input}"),
        format!("refs/remotes/{input}"),
    ];
    for candidate in candidates {
        let Ok(name) = RefName::new(candidate) else {
            continue;
        };
        if refs.resolve(&name)?.is_some() {
            return Ok(Some(name));
        }
    }
    Ok(None)
}

/// Resolve a bare ref name or (possibly abbreviated) object id, peeling
/// annotated tags down to the commit/object they point to.
fn resolve_ref_or_oid(
    input: &str,
    refs: &dyn RefStore,
    odb: &ObjectDatabase,
) -> Result<ObjectId, RevParseError> {
    if let Some(name) = resolve_ref_name(input, refs)? {
        let oid = refs
            .resolve_to_oid(&name)?
            .ok_or_else(|| RevParseError::NotFound(input.to_string()))?;
        return Ok(oid);
    }

    if looks_like_oid(input) {
        return Ok(odb.resolve_prefix(input)?);
    }

    Err(RevParseError::NotFound(input.to_string()))
}

fn looks_like_oid(input: &str) -> bool {
    !input.is_empty() && input.len() <= 64 && input.chars().all(|c| c.is_ascii_hexdigit())
}

/// Resolve just a bare ref/OID without reflog or parent-walk handling,
/// used by callers that already know `input` has no such suffix (e.g.
/// the `onto` side of a rebase).
pub fn resolve_simple(
    input: &str,
    refs: &dyn RefStore,
    odb: &ObjectDatabase,
) -> Result<ObjectId, RevParseError> {
    resolve_ref_or_oid(input, refs, odb)
}

/// Whether `name` currently resolves to anything.
pub fn exists(name: &str, refs: &dyn RefStore) -> Result<bool, RevParseError> {
    Ok(resolve_ref_name(name, refs)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_hash::HashAlgorithm;
    use git_object::{Commit, Object};
    use git_ref::{FilesRefStore, RefTransaction};
    use git_utils::date::{GitDate, Signature};

    fn write_commit(
        odb: &ObjectDatabase,
        parents: Vec<ObjectId>,
        message: &str,
    ) -> ObjectId {
        let sig = Signature {
            name: "Test".into(),
            email: "test@example.com".into(),
            date: GitDate::new(1_700_000_000, 0),
        };
        let commit = Commit {
            tree: odb.hash_algo().null_oid(),
            parents,
            author: sig.clone(),
            committer: sig,
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: message.into(),
        };
        odb.write(&Object::Commit(commit)).unwrap()
    }

    fn setup() -> (tempfile::TempDir, ObjectDatabase, FilesRefStore) {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open_with_algo(dir.path().join("objects"), HashAlgorithm::Sha1)
            .unwrap();
        let refs = FilesRefStore::new(dir.path());
        (dir, odb, refs)
    }

    #[test]
    fn resolves_plain_branch() {
        let (_dir, odb, refs) = setup();
        let c1 = write_commit(&odb, vec![], "first");
        let name = RefName::new("refs/heads/main").unwrap();
        let mut txn = RefTransaction::new();
        txn.create(name, c1, "branch: created");
        refs.commit_transaction(txn).unwrap();

        let resolved = resolve("main", &refs, &odb).unwrap();
        assert_eq!(resolved, c1);
    }

    #[test]
    fn walks_first_parent() {
        let (_dir, odb, refs) = setup();
        let c1 = write_commit(&odb, vec![], "first");
        let c2 = write_commit(&odb, vec![c1], "second");
        let name = RefName::new("refs/heads/main").unwrap();
        let mut txn = RefTransaction::new();
        txn.create(name, c2, "branch: created");
        refs.commit_transaction(txn).unwrap();

        assert_eq!(resolve("main~1", &refs, &odb).unwrap(), c1);
        assert_eq!(resolve("main^", &refs, &odb).unwrap(), c1);
        assert_eq!(resolve("main^^", &refs, &odb).unwrap(), c1);
    }

    #[test]
    fn reflog_selector_reads_history() {
        let (_dir, odb, refs) = setup();
        let c1 = write_commit(&odb, vec![], "first");
        let c2 = write_commit(&odb, vec![c1], "second");
        let name = RefName::new("refs/heads/main").unwrap();

        let mut txn = RefTransaction::new();
        txn.create(name.clone(), c1, "branch: created");
        refs.commit_transaction(txn).unwrap();

        let mut txn = RefTransaction::new();
        txn.update(name, c1, c2, "commit: second");
        refs.commit_transaction(txn).unwrap();

        assert_eq!(resolve("main@{0}", &refs, &odb).unwrap(), c2);
        assert_eq!(resolve("main@{1}", &refs, &odb).unwrap(), c1);
    }

    #[test]
    fn time_based_reflog_selector_is_unsupported() {
        let (_dir, odb, refs) = setup();
        let c1 = write_commit(&odb, vec![], "first");
        let name = RefName::new("refs/heads/main").unwrap();
        let mut txn = RefTransaction::new();
        txn.create(name, c1, "branch: created");
        refs.commit_transaction(txn).unwrap();

        let err = resolve("main@{1.day.ago}", &refs, &odb).unwrap_err();
        assert!(matches!(err, RevParseError::Unsupported(_)));
    }

    #[test]
    fn missing_parent_is_not_found() {
        let (_dir, odb, refs) = setup();
        let c1 = write_commit(&odb, vec![], "first");
        let name = RefName::new("refs/heads/main").unwrap();
        let mut txn = RefTransaction::new();
        txn.create(name, c1, "branch: created");
        refs.commit_transaction(txn).unwrap();

        assert!(matches!(
            resolve("main^", &refs, &odb),
            Err(RevParseError::NotFound(_))
        ));
    }
}
