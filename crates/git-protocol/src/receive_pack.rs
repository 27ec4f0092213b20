//! Server-side receive-pack.
//!
//! Parses the pkt-line framed ref-update request, indexes the pack that
//! follows it, and drives the pre-receive/update/post-receive hook
//! lifecycle before writing refs. Hook invocation is abstracted behind
//! [`ReceivePackHooks`] so this crate never depends on the repository
//! façade that owns the actual hook runner and working directory.

use std::io::{Read, Write};

use git_hash::ObjectId;
use git_odb::ObjectDatabase;
use git_ref::{RefName, RefStore, RefTransaction};

use crate::pktline::{PktLineReader, PktLineWriter};
use crate::ProtocolError;

/// A single `<old-oid> <new-oid> <ref>` triplet parsed off the wire.
/// Capabilities (after the first line's NUL) are recorded but otherwise
/// unused — this crate negotiates no optional capabilities.
#[derive(Debug, Clone)]
pub struct RefUpdateRequest {
    pub old: ObjectId,
    pub new: ObjectId,
    pub refname: String,
}

/// Hook lifecycle the caller wires up to its own hook runner.
///
/// All three hooks are optional from this crate's point of view: an
/// implementation that has no hook script installed should return exit
/// code 0 with empty output, which is exactly "hook did not object".
pub trait ReceivePackHooks {
    /// Run `pre-receive` with the update triplets on stdin.
    fn pre_receive(&self, stdin: &[u8]) -> std::io::Result<i32>;

    /// Run `update <ref> <old> <new>` for a single ref.
    fn update(&self, refname: &str, old: &ObjectId, new: &ObjectId) -> std::io::Result<i32>;

    /// Run `post-receive` with the accepted triplets on stdin.
    /// Errors are swallowed by the caller of this trait — post-receive
    /// never fails the push.
    fn post_receive(&self, stdin: &[u8]) -> std::io::Result<i32>;
}

/// A hook runner that always accepts: every hook is treated as absent.
pub struct NullHooks;

impl ReceivePackHooks for NullHooks {
    fn pre_receive(&self, _stdin: &[u8]) -> std::io::Result<i32> {
        Ok(0)
    }

    fn update(&self, _refname: &str, _old: &ObjectId, _new: &ObjectId) -> std::io::Result<i32> {
        Ok(0)
    }

    fn post_receive(&self, _stdin: &[u8]) -> std::io::Result<i32> {
        Ok(0)
    }
}

/// Per-ref outcome of a receive-pack run.
#[derive(Debug, Clone)]
pub enum RefReceiveStatus {
    Ok,
    Rejected(String),
}

/// Full outcome of a receive-pack run, independent of the wire response
/// written alongside it.
#[derive(Debug, Clone)]
pub struct ReceivePackReport {
    pub unpack_ok: bool,
    pub unpack_error: Option<String>,
    pub results: Vec<(String, RefReceiveStatus)>,
}

fn render_triplets(updates: &[RefUpdateRequest]) -> Vec<u8> {
    let mut buf = Vec::new();
    for u in updates {
        let _ = writeln!(buf, "{} {} {}", u.old, u.new, u.refname);
    }
    buf
}

/// Drive a full receive-pack exchange: read the request from `input`,
/// apply it against `odb`/`refs`, dispatching to `hooks` along the way,
/// and write the pkt-line framed response to `output`.
pub fn receive_pack<R: Read, W: Write>(
    input: R,
    output: W,
    odb: &ObjectDatabase,
    refs: &dyn RefStore,
    hooks: &dyn ReceivePackHooks,
) -> Result<ReceivePackReport, ProtocolError> {
    let mut reader = PktLineReader::new(input);
    let lines = reader.read_until_flush()?;

    let mut updates = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(update) = parse_update_line(&line) {
            updates.push(update);
        }
        // malformed lines are silently dropped
    }

    let mut pack_data = Vec::new();
    reader.inner_mut().read_to_end(&mut pack_data)?;

    let mut report = ReceivePackReport {
        unpack_ok: false,
        unpack_error: None,
        results: Vec::new(),
    };

    let hash_algo = odb.hash_algo();
    let unpack_result = (|| -> Result<(), ProtocolError> {
        if pack_data.len() < git_pack::PACK_HEADER_SIZE || &pack_data[0..4] != b"PACK" {
            return Err(ProtocolError::Protocol("pack data missing PACK magic".into()));
        }
        let pack_dir = odb.objects_dir().join("pack");
        std::fs::create_dir_all(&pack_dir)?;
        let mut namer = git_hash::hasher::Hasher::new(hash_algo);
        namer.update(&pack_data);
        let pack_name = namer.finalize()?;
        let pack_path = pack_dir.join(format!("pack-{}.pack", pack_name.to_hex()));
        std::fs::write(&pack_path, &pack_data)?;
        git_pack::index_pack::index_pack(&pack_path, hash_algo)?;
        odb.refresh()?;
        Ok(())
    })();

    if let Err(e) = unpack_result {
        report.unpack_error = Some(e.to_string());
        for update in &updates {
            report.results.push((
                update.refname.clone(),
                RefReceiveStatus::Rejected("unpacker error".into()),
            ));
        }
        write_response(output, &report)?;
        return Ok(report);
    }

    let stdin = render_triplets(&updates);
    let pre_receive_exit = hooks.pre_receive(&stdin)?;
    if pre_receive_exit != 0 {
        report.unpack_error = Some("pre-receive hook declined".into());
        for update in &updates {
            report.results.push((
                update.refname.clone(),
                RefReceiveStatus::Rejected("pre-receive hook declined".into()),
            ));
        }
        write_response(output, &report)?;
        return Ok(report);
    }

    report.unpack_ok = true;

    let mut accepted = Vec::new();
    for update in &updates {
        match apply_one_update(odb, refs, hooks, update) {
            Ok(()) => {
                report
                    .results
                    .push((update.refname.clone(), RefReceiveStatus::Ok));
                accepted.push(update.clone());
            }
            Err(reason) => {
                report
                    .results
                    .push((update.refname.clone(), RefReceiveStatus::Rejected(reason)));
            }
        }
    }

    // Fire-and-forget: post-receive never fails the push.
    let _ = hooks.post_receive(&render_triplets(&accepted));

    write_response(output, &report)?;
    Ok(report)
}

fn apply_one_update(
    odb: &ObjectDatabase,
    refs: &dyn RefStore,
    hooks: &dyn ReceivePackHooks,
    update: &RefUpdateRequest,
) -> Result<(), String> {
    let name = RefName::new(update.refname.as_bytes()).map_err(|e| e.to_string())?;
    let null_oid = odb.hash_algo().null_oid();

    let current = refs
        .resolve_to_oid(&name)
        .map_err(|e| e.to_string())?
        .unwrap_or(null_oid);

    let is_new_ref = update.old == null_oid;
    if !is_new_ref && current != update.old {
        return Err(format!(
            "remote ref {} is not at expected old value",
            update.refname
        ));
    }

    let update_exit = hooks
        .update(&update.refname, &update.old, &update.new)
        .map_err(|e| e.to_string())?;
    if update_exit != 0 {
        return Err("update hook declined".into());
    }

    let mut txn = RefTransaction::new();
    if update.new == null_oid {
        txn.delete(name, current, format!("receive-pack: delete {}", update.refname));
    } else if is_new_ref {
        txn.create(name, update.new, format!("receive-pack: new ref {}", update.refname));
    } else {
        txn.update(
            name,
            current,
            update.new,
            format!("receive-pack: update {}", update.refname),
        );
    }
    refs.commit_transaction(txn).map_err(|e| e.to_string())?;

    Ok(())
}

fn parse_update_line(line: &[u8]) -> Option<RefUpdateRequest> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    // Drop capabilities after the first NUL, if present.
    let line = match line.iter().position(|&b| b == 0) {
        Some(nul) => &line[..nul],
        None => line,
    };
    let text = std::str::from_utf8(line).ok()?;
    let mut parts = text.splitn(3, ' ');
    let old = parts.next()?;
    let new = parts.next()?;
    let refname = parts.next()?;
    if refname.is_empty() {
        return None;
    }
    Some(RefUpdateRequest {
        old: ObjectId::from_hex(old).ok()?,
        new: ObjectId::from_hex(new).ok()?,
        refname: refname.to_string(),
    })
}

fn write_response<W: Write>(output: W, report: &ReceivePackReport) -> Result<(), ProtocolError> {
    let mut writer = PktLineWriter::new(output);
    match &report.unpack_error {
        Some(reason) => writer.write_text(&format!("unpack {}", reason))?,
        None => writer.write_text("unpack ok")?,
    }
    for (refname, status) in &report.results {
        match status {
            RefReceiveStatus::Ok => writer.write_text(&format!("ok {}", refname))?,
            RefReceiveStatus::Rejected(reason) => {
                writer.write_text(&format!("ng {} {}", refname, reason))?
            }
        }
    }
    writer.write_flush()?;
    writer.flush()?;
    Ok(())
}
