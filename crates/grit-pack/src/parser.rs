//! Streaming pack parser and indexer.
//!
//! Consumes a pack byte stream, inflates each entry while hashing it,
//! resolves delta chains against the bytes already written, verifies the
//! trailing checksum, and publishes the pack with its v2 index as an
//! atomic pair. Nothing is visible at the target paths until the whole
//! stream has been validated.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::rc::Rc;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use grit_hash::{Hasher, ObjectId};
use grit_object::ObjectType;
use grit_odb::ObjectReader;
use grit_utils::progress::Progress;
use grit_utils::tempfile::TempFile;
use lru::LruCache;
use sha1::{Digest, Sha1};

use crate::delta::{apply_delta, read_delta_sizes};
use crate::entry::encode_entry_header;
use crate::index::write_index;
use crate::input::PackInput;
use crate::{
    PackError, DELTA_BASE_CACHE_ENTRIES, MAX_DELTA_CHAIN_DEPTH, OFS_DELTA, PACK_HEADER_SIZE,
    PACK_SIGNATURE, REF_DELTA,
};

const BUFFER_SIZE: usize = 8192;
const INFLATE_CHUNK: usize = 16384;

/// Parser tunables.
#[derive(Debug, Clone, Default)]
pub struct PackConfig {
    /// Permit REF_DELTA bases absent from the pack; fetch them from the
    /// store and append completion objects so the written pack is
    /// self-contained.
    pub allow_thin: bool,
    /// Require end-of-stream exactly after the 20-byte trailer.
    pub check_eof_after_footer: bool,
    /// Leave unread bytes after the footer in the caller's stream. The
    /// input must support rewind.
    pub expect_data_after_footer: bool,
    /// Upper bound on declared and reconstructed object sizes.
    pub max_object_size: Option<u64>,
    /// Re-verify written object ids against SHA-1 after the pack is
    /// complete.
    pub check_objects: bool,
}

/// One object contained in the parsed pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedObjectInfo {
    pub oid: ObjectId,
    pub offset: u64,
    pub crc32: u32,
    pub kind: ObjectType,
}

/// Result of a successful parse.
#[derive(Debug)]
pub struct ParsedPack {
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    /// The pack's trailing checksum (after thin completion, if any).
    pub id: ObjectId,
    /// Every contained object, duplicates included.
    pub objects: Vec<PackedObjectInfo>,
}

#[derive(Debug, Clone)]
enum Record {
    Whole { kind: ObjectType, oid: ObjectId },
    Ofs { base_offset: u64 },
    Ref { base: ObjectId },
}

#[derive(Debug, Clone)]
struct EntryRecord {
    offset: u64,
    data_offset: u64,
    inflated_size: u64,
    crc32: u32,
    record: Record,
}

/// Streaming pack parser. Borrows the caller's input for the duration of
/// the parse; on success the input is positioned per the EOF policy.
pub struct PackParser<'a> {
    config: PackConfig,
    input: &'a mut dyn PackInput,
    reader: Option<&'a dyn ObjectReader>,
    pack_path: PathBuf,
    index_path: PathBuf,

    buf: Vec<u8>,
    buf_pos: usize,
    buf_len: usize,
    /// Absolute offset of the next unconsumed byte; equals the number of
    /// bytes copied to the output file.
    consumed: u64,
    pack_hash: Sha1,
    crc: Option<crc32fast::Hasher>,
    out: TempFile,
}

impl<'a> PackParser<'a> {
    /// Create a parser writing to `pack_path` (the index lands beside it
    /// with the `.idx` extension). The output is staged in a temp file in
    /// the same directory and only renamed into place on success.
    pub fn new(
        config: PackConfig,
        input: &'a mut dyn PackInput,
        pack_path: impl Into<PathBuf>,
    ) -> Result<Self, PackError> {
        let pack_path = pack_path.into();
        let index_path = pack_path.with_extension("idx");
        let out = TempFile::new_for(&pack_path)?;
        Ok(Self {
            config,
            input,
            reader: None,
            pack_path,
            index_path,
            buf: vec![0u8; BUFFER_SIZE],
            buf_pos: 0,
            buf_len: 0,
            consumed: 0,
            pack_hash: Sha1::new(),
            crc: None,
            out,
        })
    }

    /// Attach a store reader, used to fetch thin-pack bases.
    pub fn with_reader(mut self, reader: &'a dyn ObjectReader) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Parse the stream to completion.
    pub fn parse(mut self, progress: &mut dyn Progress) -> Result<ParsedPack, PackError> {
        if self.config.expect_data_after_footer && !self.input.can_rewind() {
            return Err(PackError::RewindUnsupported);
        }

        let count = self.read_pack_header()?;

        let mut entries: Vec<EntryRecord> = Vec::with_capacity(count as usize);
        let mut objects: Vec<PackedObjectInfo> = Vec::with_capacity(count as usize);

        progress.begin_task("Receiving objects", Some(count as u64));
        for i in 0..count {
            let entry = self.read_entry()?;
            if let Record::Whole { kind, oid } = entry.record {
                objects.push(PackedObjectInfo {
                    oid,
                    offset: entry.offset,
                    crc32: entry.crc32,
                    kind,
                });
            }
            entries.push(entry);
            progress.update(i as u64 + 1);
        }
        progress.end_task();

        // The trailer is the hash of everything before it.
        let expected = ObjectId::from(<[u8; 20]>::from(self.pack_hash.clone().finalize()));
        let mut trailer = [0u8; 20];
        self.read_exact_into(&mut trailer)?;
        let actual = ObjectId::from(trailer);
        if actual != expected {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }

        self.enforce_eof_policy()?;

        let thin_bases = self.resolve_deltas(&entries, &mut objects, progress)?;
        let pack_id = if thin_bases.is_empty() {
            expected
        } else {
            self.append_thin_bases(count, thin_bases, &mut objects)?
        };

        if self.config.check_objects {
            self.verify_whole_objects(&entries)?;
        }

        self.finish(pack_id, objects)
    }

    // --- pass 1: streaming ---

    fn read_pack_header(&mut self) -> Result<u32, PackError> {
        let mut header = [0u8; PACK_HEADER_SIZE];
        self.read_exact_into(&mut header)?;
        if &header[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != 2 && version != 3 {
            return Err(PackError::UnsupportedVersion(version));
        }
        Ok(u32::from_be_bytes([
            header[8], header[9], header[10], header[11],
        ]))
    }

    /// Read one entry: header, base reference, compressed payload.
    fn read_entry(&mut self) -> Result<EntryRecord, PackError> {
        let offset = self.consumed;
        self.crc = Some(crc32fast::Hasher::new());

        let mut byte = self.read_byte()?;
        let type_code = (byte >> 4) & 0x07;
        let mut size: u64 = (byte & 0x0f) as u64;
        let mut shift = 4;
        while byte & 0x80 != 0 {
            byte = self.read_byte()?;
            size |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }

        let record = match type_code {
            1..=4 => {
                let kind = ObjectType::from_pack_type(type_code)?;
                self.check_size_limit(size)?;

                let data_offset = self.consumed;
                let mut hasher = Hasher::for_object(kind.as_str(), size);
                let produced = self.inflate(offset, |chunk| hasher.update(chunk))?;
                if produced != size {
                    return Err(PackError::CorruptEntry {
                        offset,
                        reason: format!("inflated to {produced} bytes, header says {size}"),
                    });
                }
                let oid = hasher.finalize()?;
                return Ok(EntryRecord {
                    offset,
                    data_offset,
                    inflated_size: size,
                    crc32: self.end_crc(),
                    record: Record::Whole { kind, oid },
                });
            }
            OFS_DELTA => {
                let mut c = self.read_byte()?;
                let mut back = (c & 0x7f) as u64;
                while c & 0x80 != 0 {
                    back += 1;
                    c = self.read_byte()?;
                    back = (back << 7) + (c & 0x7f) as u64;
                }
                if back == 0 || back > offset {
                    return Err(PackError::CorruptEntry {
                        offset,
                        reason: "ofs-delta base offset out of range".into(),
                    });
                }
                Record::Ofs {
                    base_offset: offset - back,
                }
            }
            REF_DELTA => {
                let mut base = [0u8; 20];
                self.read_exact_into(&mut base)?;
                Record::Ref {
                    base: ObjectId::from(base),
                }
            }
            other => {
                return Err(PackError::CorruptEntry {
                    offset,
                    reason: format!("unknown object type code {other}"),
                })
            }
        };

        // Delta payload: inflate to validate the stream and find its end;
        // the instructions are replayed from the written file during
        // resolution.
        let data_offset = self.consumed;
        let produced = self.inflate(offset, |_| {})?;
        if produced != size {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("delta inflated to {produced} bytes, header says {size}"),
            });
        }

        Ok(EntryRecord {
            offset,
            data_offset,
            inflated_size: size,
            crc32: self.end_crc(),
            record,
        })
    }

    fn check_size_limit(&self, size: u64) -> Result<(), PackError> {
        match self.config.max_object_size {
            Some(limit) if size > limit => Err(PackError::ExceedsSizeLimit { size, limit }),
            _ => Ok(()),
        }
    }

    /// Inflate one zlib stream from the input, feeding `sink` with the
    /// output. Consumes exactly the compressed bytes, no read-ahead leaks.
    fn inflate(&mut self, entry_offset: u64, mut sink: impl FnMut(&[u8])) -> Result<u64, PackError> {
        let mut z = Decompress::new(true);
        let mut chunk = vec![0u8; INFLATE_CHUNK];
        loop {
            if self.fill()? == 0 {
                return Err(PackError::UnexpectedEof(self.consumed));
            }
            let before_in = z.total_in();
            let before_out = z.total_out();
            let status = z
                .decompress(
                    &self.buf[self.buf_pos..self.buf_len],
                    &mut chunk,
                    FlushDecompress::None,
                )
                .map_err(|e| PackError::CorruptEntry {
                    offset: entry_offset,
                    reason: format!("zlib inflate failed: {e}"),
                })?;
            let eaten = (z.total_in() - before_in) as usize;
            let produced = (z.total_out() - before_out) as usize;
            sink(&chunk[..produced]);
            self.consume(eaten)?;

            match status {
                Status::StreamEnd => return Ok(z.total_out()),
                Status::Ok | Status::BufError => {
                    if eaten == 0 && produced == 0 {
                        return Err(PackError::CorruptEntry {
                            offset: entry_offset,
                            reason: "zlib stream stalled".into(),
                        });
                    }
                }
            }
        }
    }

    fn enforce_eof_policy(&mut self) -> Result<(), PackError> {
        if self.config.check_eof_after_footer {
            if self.fill()? > 0 {
                return Err(PackError::TrailingData {
                    byte: self.buf[self.buf_pos],
                });
            }
        } else if self.config.expect_data_after_footer {
            let leftover = (self.buf_len - self.buf_pos) as u64;
            if leftover > 0 {
                self.input.rewind(leftover)?;
                self.buf_pos = self.buf_len;
            }
        }
        Ok(())
    }

    // --- buffered window ---

    /// Ensure the buffer holds unconsumed bytes; returns how many are
    /// available (0 at EOF).
    fn fill(&mut self) -> Result<usize, PackError> {
        if self.buf_pos == self.buf_len {
            self.buf_pos = 0;
            self.buf_len = 0;
            let n = self.input.read(&mut self.buf)?;
            self.buf_len = n;
        }
        Ok(self.buf_len - self.buf_pos)
    }

    /// Consume `n` buffered bytes: hash them, CRC them, copy them to the
    /// output file.
    fn consume(&mut self, n: usize) -> Result<(), PackError> {
        let chunk = &self.buf[self.buf_pos..self.buf_pos + n];
        self.pack_hash.update(chunk);
        if let Some(crc) = &mut self.crc {
            crc.update(chunk);
        }
        self.out.write_all(chunk)?;
        self.buf_pos += n;
        self.consumed += n as u64;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, PackError> {
        if self.fill()? == 0 {
            return Err(PackError::UnexpectedEof(self.consumed));
        }
        let b = self.buf[self.buf_pos];
        self.consume(1)?;
        Ok(b)
    }

    fn read_exact_into(&mut self, dst: &mut [u8]) -> Result<(), PackError> {
        let mut filled = 0;
        while filled < dst.len() {
            let avail = self.fill()?;
            if avail == 0 {
                return Err(PackError::UnexpectedEof(self.consumed));
            }
            let n = avail.min(dst.len() - filled);
            dst[filled..filled + n].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + n]);
            self.consume(n)?;
            filled += n;
        }
        Ok(())
    }

    fn end_crc(&mut self) -> u32 {
        self.crc.take().map(|c| c.finalize()).unwrap_or(0)
    }

    // --- pass 2: delta resolution ---

    fn resolve_deltas(
        &mut self,
        entries: &[EntryRecord],
        objects: &mut Vec<PackedObjectInfo>,
        progress: &mut dyn Progress,
    ) -> Result<Vec<(ObjectId, ObjectType, Vec<u8>)>, PackError> {
        let delta_count = entries
            .iter()
            .filter(|e| !matches!(e.record, Record::Whole { .. }))
            .count();
        if delta_count == 0 {
            return Ok(Vec::new());
        }

        self.out.flush()?;

        let mut by_offset: HashMap<u64, usize> = HashMap::with_capacity(entries.len());
        let mut oid_to_offset: HashMap<ObjectId, u64> = HashMap::new();
        for (ix, e) in entries.iter().enumerate() {
            by_offset.insert(e.offset, ix);
            if let Record::Whole { oid, .. } = e.record {
                oid_to_offset.entry(oid).or_insert(e.offset);
            }
        }

        let mut resolver = Resolver {
            file: self.out.file_mut(),
            entries,
            by_offset: &by_offset,
            oid_to_offset: &oid_to_offset,
            cache: LruCache::new(
                NonZeroUsize::new(DELTA_BASE_CACHE_ENTRIES).expect("cache size is nonzero"),
            ),
            max_object_size: self.config.max_object_size,
            allow_thin: self.config.allow_thin,
            reader: self.reader,
            thin_seen: HashMap::new(),
            thin_order: Vec::new(),
        };

        progress.begin_task("Resolving deltas", Some(delta_count as u64));
        let mut done = 0u64;
        for e in entries {
            if matches!(e.record, Record::Whole { .. }) {
                continue;
            }
            let obj = resolver.object_at(e.offset, 0)?;
            objects.push(PackedObjectInfo {
                oid: obj.oid,
                offset: e.offset,
                crc32: e.crc32,
                kind: obj.kind,
            });
            done += 1;
            progress.update(done);
        }
        progress.end_task();

        let thin_order = resolver.thin_order;
        let mut thin_seen = resolver.thin_seen;
        let bases = thin_order
            .into_iter()
            .map(|oid| {
                let rc = thin_seen.remove(&oid).expect("recorded thin base");
                let obj = Rc::try_unwrap(rc).unwrap_or_else(|rc| (*rc).clone());
                (oid, obj.kind, obj.data)
            })
            .collect();
        Ok(bases)
    }

    // --- thin completion ---

    /// Append externally fetched bases as whole objects so the stored
    /// pack is self-contained, then patch the object count and recompute
    /// the trailer over the rewritten file.
    fn append_thin_bases(
        &mut self,
        original_count: u32,
        bases: Vec<(ObjectId, ObjectType, Vec<u8>)>,
        objects: &mut Vec<PackedObjectInfo>,
    ) -> Result<ObjectId, PackError> {
        let file = self.out.file_mut();

        // Strip the old trailer.
        let len = file.metadata()?.len() - 20;
        file.set_len(len)?;

        // Patch the object count in the 12-byte header.
        let new_count = original_count + bases.len() as u32;
        file.seek(SeekFrom::Start(8))?;
        file.write_all(&new_count.to_be_bytes())?;

        // Append each base as a whole entry.
        file.seek(SeekFrom::Start(len))?;
        let mut pos = len;
        for (oid, kind, data) in bases {
            let header = encode_entry_header(kind.pack_type(), data.len() as u64);
            let mut compressed = Vec::new();
            {
                let mut enc = ZlibEncoder::new(&mut compressed, Compression::default());
                enc.write_all(&data)?;
                enc.finish()?;
            }

            let mut crc = crc32fast::Hasher::new();
            crc.update(&header);
            crc.update(&compressed);

            file.write_all(&header)?;
            file.write_all(&compressed)?;

            objects.push(PackedObjectInfo {
                oid,
                offset: pos,
                crc32: crc.finalize(),
                kind,
            });
            pos += (header.len() + compressed.len()) as u64;
        }
        file.flush()?;

        // Recompute the trailer over the rewritten file.
        file.seek(SeekFrom::Start(0))?;
        let mut hash = Sha1::new();
        let mut chunk = vec![0u8; BUFFER_SIZE];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            hash.update(&chunk[..n]);
        }
        let pack_id = ObjectId::from(<[u8; 20]>::from(hash.finalize()));

        file.seek(SeekFrom::End(0))?;
        file.write_all(pack_id.as_bytes())?;
        file.flush()?;
        Ok(pack_id)
    }

    // --- verification ---

    /// Re-read whole objects from the written file — header parsed
    /// independently, payload re-inflated, identity re-hashed — and
    /// compare against the ids recorded during streaming. Delta objects
    /// were identity-hashed from their reconstructed bytes during
    /// resolution.
    fn verify_whole_objects(&mut self, entries: &[EntryRecord]) -> Result<(), PackError> {
        self.out.flush()?;
        let file = self.out.file_mut();
        let mut header = [0u8; 16];
        for e in entries {
            let Record::Whole { kind, oid } = &e.record else {
                continue;
            };
            // The 20-byte trailer guarantees these bytes exist past even
            // the smallest final entry.
            file.seek(SeekFrom::Start(e.offset))?;
            file.read_exact(&mut header)?;
            let parsed = crate::entry::parse_entry_header(&header, e.offset)?;
            if parsed.inflated_size != e.inflated_size {
                return Err(PackError::ObjectMismatch {
                    oid: *oid,
                    offset: e.offset,
                });
            }

            let data = inflate_from_file(
                file,
                e.offset + parsed.header_len as u64,
                e.inflated_size,
            )?;
            let rehashed = Hasher::hash_object(kind.as_str(), &data)?;
            if rehashed != *oid {
                return Err(PackError::ObjectMismatch {
                    oid: *oid,
                    offset: e.offset,
                });
            }
        }
        Ok(())
    }

    // --- publish ---

    fn finish(
        mut self,
        pack_id: ObjectId,
        objects: Vec<PackedObjectInfo>,
    ) -> Result<ParsedPack, PackError> {
        self.out.flush()?;

        let mut index_entries: Vec<(ObjectId, u64, u32)> = objects
            .iter()
            .map(|o| (o.oid, o.offset, o.crc32))
            .collect();

        self.out.persist(&self.pack_path)?;
        if let Err(e) = write_index(&self.index_path, &mut index_entries, &pack_id) {
            // Never leave a pack visible without its index.
            let _ = std::fs::remove_file(&self.pack_path);
            return Err(e);
        }

        Ok(ParsedPack {
            pack_path: self.pack_path,
            index_path: self.index_path,
            id: pack_id,
            objects,
        })
    }
}

/// A fully reconstructed object during resolution.
#[derive(Debug, Clone)]
struct ResolvedObject {
    kind: ObjectType,
    oid: ObjectId,
    data: Vec<u8>,
}

/// Resolves delta chains by replaying compressed spans out of the written
/// pack file. Recently inflated bases are kept in an LRU window so
/// sibling deltas against a shared base do not re-inflate it.
struct Resolver<'a> {
    file: &'a mut std::fs::File,
    entries: &'a [EntryRecord],
    by_offset: &'a HashMap<u64, usize>,
    oid_to_offset: &'a HashMap<ObjectId, u64>,
    cache: LruCache<u64, Rc<ResolvedObject>>,
    max_object_size: Option<u64>,
    allow_thin: bool,
    reader: Option<&'a dyn ObjectReader>,
    thin_seen: HashMap<ObjectId, Rc<ResolvedObject>>,
    thin_order: Vec<ObjectId>,
}

impl Resolver<'_> {
    fn object_at(&mut self, offset: u64, depth: usize) -> Result<Rc<ResolvedObject>, PackError> {
        if depth > MAX_DELTA_CHAIN_DEPTH {
            return Err(PackError::DeltaChainTooDeep {
                offset,
                max_depth: MAX_DELTA_CHAIN_DEPTH,
            });
        }
        if let Some(hit) = self.cache.get(&offset) {
            return Ok(hit.clone());
        }

        let ix = *self
            .by_offset
            .get(&offset)
            .ok_or_else(|| PackError::CorruptEntry {
                offset,
                reason: "delta base offset does not start an entry".into(),
            })?;
        let e = self.entries[ix].clone();

        let resolved = match &e.record {
            Record::Whole { kind, oid } => {
                let data = inflate_from_file(self.file, e.data_offset, e.inflated_size)?;
                Rc::new(ResolvedObject {
                    kind: *kind,
                    oid: *oid,
                    data,
                })
            }
            Record::Ofs { base_offset } => {
                let base = self.object_at(*base_offset, depth + 1)?;
                self.apply(&e, &base)?
            }
            Record::Ref { base } => {
                let base = if let Some(&base_offset) = self.oid_to_offset.get(base) {
                    self.object_at(base_offset, depth + 1)?
                } else {
                    self.thin_base(base)?
                };
                self.apply(&e, &base)?
            }
        };

        self.cache.put(offset, resolved.clone());
        Ok(resolved)
    }

    fn apply(
        &mut self,
        e: &EntryRecord,
        base: &Rc<ResolvedObject>,
    ) -> Result<Rc<ResolvedObject>, PackError> {
        let delta = inflate_from_file(self.file, e.data_offset, e.inflated_size)?;

        // The declared result size gates the limit before any bytes are
        // reconstructed.
        let (_, result_size, _) = read_delta_sizes(&delta, e.offset)?;
        if let Some(limit) = self.max_object_size {
            if result_size > limit {
                return Err(PackError::ExceedsSizeLimit {
                    size: result_size,
                    limit,
                });
            }
        }

        let (data, oid) = apply_delta(base.kind.as_str(), &base.data, &delta, e.offset)?;
        Ok(Rc::new(ResolvedObject {
            kind: base.kind,
            oid,
            data,
        }))
    }

    /// Fetch a REF_DELTA base the pack does not contain.
    fn thin_base(&mut self, base: &ObjectId) -> Result<Rc<ResolvedObject>, PackError> {
        if !self.allow_thin {
            return Err(PackError::MissingBase(*base));
        }
        if let Some(hit) = self.thin_seen.get(base) {
            return Ok(hit.clone());
        }
        let reader = self.reader.ok_or(PackError::MissingBase(*base))?;
        let obj = reader.open(base, None)?;
        let rc = Rc::new(ResolvedObject {
            kind: obj.kind,
            oid: *base,
            data: obj.data,
        });
        self.thin_seen.insert(*base, rc.clone());
        self.thin_order.push(*base);
        Ok(rc)
    }
}

/// Inflate one zlib span out of `file` starting at `data_offset`,
/// expecting exactly `size` output bytes.
fn inflate_from_file(
    file: &mut std::fs::File,
    data_offset: u64,
    size: u64,
) -> Result<Vec<u8>, PackError> {
    file.seek(SeekFrom::Start(data_offset))?;
    let mut decoder = flate2::read::ZlibDecoder::new(&mut *file);
    let mut data = vec![0u8; size as usize];
    decoder
        .read_exact(&mut data)
        .map_err(|e| PackError::CorruptEntry {
            offset: data_offset,
            reason: format!("re-inflation failed: {e}"),
        })?;
    Ok(data)
}
