//! Build a `.idx` for a `.pack` file that has no index yet.
//!
//! Packs arriving over `unbundle` or receive-pack carry no side-car index;
//! every object's OID has to be derived by walking the pack and resolving
//! delta chains. This is a from-scratch (non-thin) equivalent of `git
//! index-pack`.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;
use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};
use git_object::ObjectType;
use memmap2::Mmap;

use crate::entry::parse_entry_header;
use crate::write::build_pack_index;
use crate::{PackEntryType, PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

struct ScannedEntry {
    offset: u64,
    crc32: u32,
    entry_type: PackEntryType,
    decompressed: Vec<u8>,
}

/// Scan `pack_path`, resolve every object's OID, and write the matching
/// `.idx` alongside it. Returns the `.idx` path and the pack's trailing
/// checksum.
///
/// Every object must be fully self-contained in the pack: REF_DELTA entries
/// whose base is not present here (a "thin" pack) are rejected, since
/// unbundle/receive-pack never produce those.
pub fn index_pack(
    pack_path: &Path,
    hash_algo: HashAlgorithm,
) -> Result<(PathBuf, ObjectId), PackError> {
    let file = std::fs::File::open(pack_path)?;
    let data = unsafe { Mmap::map(&file)? };

    if data.len() < PACK_HEADER_SIZE + hash_algo.digest_len() {
        return Err(PackError::InvalidHeader("file too small".into()));
    }
    if &data[0..4] != PACK_SIGNATURE {
        return Err(PackError::InvalidHeader("bad PACK signature".into()));
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != PACK_VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;

    let trailer_start = data.len() - hash_algo.digest_len();
    let pack_checksum = ObjectId::from_bytes(&data[trailer_start..], hash_algo)?;

    let mut entries: Vec<ScannedEntry> = Vec::with_capacity(num_objects);
    let mut by_offset: HashMap<u64, usize> = HashMap::with_capacity(num_objects);
    let mut pos = PACK_HEADER_SIZE as u64;

    for _ in 0..num_objects {
        let header = parse_entry_header(&data[pos as usize..], pos)?;
        let compressed = &data[header.data_offset as usize..trailer_start];
        let mut decoder = ZlibDecoder::new(compressed);
        let mut decompressed = Vec::with_capacity(header.uncompressed_size);
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|_| PackError::CorruptEntry(pos))?;
        let consumed = decoder.total_in();

        let mut crc = crc32fast::Hasher::new();
        crc.update(&data[pos as usize..header.data_offset as usize]);
        crc.update(&compressed[..consumed as usize]);
        let crc32 = crc.finalize();

        by_offset.insert(pos, entries.len());
        entries.push(ScannedEntry {
            offset: pos,
            crc32,
            entry_type: header.entry_type,
            decompressed,
        });

        pos = header.data_offset + consumed;
    }

    let mut resolved: HashMap<u64, (ObjectType, Vec<u8>)> = HashMap::with_capacity(num_objects);
    let mut oid_entries: Vec<(ObjectId, u64, u32)> = Vec::with_capacity(num_objects);

    for idx in 0..entries.len() {
        let (obj_type, bytes) = resolve_entry(idx, &entries, &by_offset, &mut resolved)?;
        let type_str = std::str::from_utf8(obj_type.as_bytes()).expect("ascii object type");
        let oid = Hasher::hash_object(hash_algo, type_str, &bytes)?;
        oid_entries.push((oid, entries[idx].offset, entries[idx].crc32));
    }

    let idx_path = pack_path.with_extension("idx");
    build_pack_index(&idx_path, &mut oid_entries, &pack_checksum)?;
    Ok((idx_path, pack_checksum))
}

fn resolve_entry(
    idx: usize,
    entries: &[ScannedEntry],
    by_offset: &HashMap<u64, usize>,
    resolved: &mut HashMap<u64, (ObjectType, Vec<u8>)>,
) -> Result<(ObjectType, Vec<u8>), PackError> {
    let offset = entries[idx].offset;
    if let Some(cached) = resolved.get(&offset) {
        return Ok(cached.clone());
    }

    let result = match entries[idx].entry_type {
        PackEntryType::Commit | PackEntryType::Tree | PackEntryType::Blob | PackEntryType::Tag => {
            let obj_type = entries[idx]
                .entry_type
                .to_object_type()
                .expect("non-delta type");
            (obj_type, entries[idx].decompressed.clone())
        }
        PackEntryType::OfsDelta { base_offset } => {
            let base_idx = *by_offset
                .get(&base_offset)
                .ok_or(PackError::CorruptEntry(base_offset))?;
            let (obj_type, base_bytes) = resolve_entry(base_idx, entries, by_offset, resolved)?;
            let applied = crate::delta::apply::apply_delta(&base_bytes, &entries[idx].decompressed)?;
            (obj_type, applied)
        }
        PackEntryType::RefDelta { base_oid } => {
            return Err(PackError::MissingBase(base_oid));
        }
    };

    resolved.insert(offset, result.clone());
    Ok(result)
}
