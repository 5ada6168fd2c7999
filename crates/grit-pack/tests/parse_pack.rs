//! End-to-end pack parsing scenarios over synthetic pack streams.

use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use grit_hash::{Hasher, ObjectId};
use grit_object::ObjectType;
use grit_odb::{MemoryStore, ObjectInserter};
use grit_pack::delta::{encode_copy, encode_insert, write_varint};
use grit_pack::entry::{encode_entry_header, encode_ofs_delta_offset};
use grit_pack::index::PackIndex;
use grit_pack::input::{SeekableInput, StreamInput};
use grit_pack::parser::{PackConfig, PackParser, ParsedPack};
use grit_pack::PackError;
use grit_utils::progress::{CountingProgress, NoProgress};
use sha1::{Digest, Sha1};

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut enc = ZlibEncoder::new(&mut out, Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap();
    out
}

/// Assembles a raw pack stream entry by entry.
struct PackFixture {
    body: Vec<u8>,
}

impl PackFixture {
    fn new(count: u32) -> Self {
        let mut body = b"PACK".to_vec();
        body.extend_from_slice(&2u32.to_be_bytes());
        body.extend_from_slice(&count.to_be_bytes());
        Self { body }
    }

    fn with_version(count: u32, version: u32) -> Self {
        let mut body = b"PACK".to_vec();
        body.extend_from_slice(&version.to_be_bytes());
        body.extend_from_slice(&count.to_be_bytes());
        Self { body }
    }

    fn add_whole(&mut self, kind: ObjectType, data: &[u8]) -> u64 {
        let offset = self.body.len() as u64;
        self.body
            .extend_from_slice(&encode_entry_header(kind.pack_type(), data.len() as u64));
        self.body.extend_from_slice(&zlib(data));
        offset
    }

    fn add_ref_delta(&mut self, base: &ObjectId, delta: &[u8]) -> u64 {
        let offset = self.body.len() as u64;
        self.body
            .extend_from_slice(&encode_entry_header(7, delta.len() as u64));
        self.body.extend_from_slice(base.as_bytes());
        self.body.extend_from_slice(&zlib(delta));
        offset
    }

    fn add_ofs_delta(&mut self, base_offset: u64, delta: &[u8]) -> u64 {
        let offset = self.body.len() as u64;
        self.body
            .extend_from_slice(&encode_entry_header(6, delta.len() as u64));
        self.body
            .extend_from_slice(&encode_ofs_delta_offset(offset - base_offset));
        self.body.extend_from_slice(&zlib(delta));
        offset
    }

    /// Append the trailing SHA-1 and return the complete stream.
    fn finish(self) -> Vec<u8> {
        let mut body = self.body;
        let trailer: [u8; 20] = Sha1::digest(&body).into();
        body.extend_from_slice(&trailer);
        body
    }
}

fn delta_of(source_size: u64, target_size: u64, instructions: &[u8]) -> Vec<u8> {
    let mut d = Vec::new();
    d.extend_from_slice(&write_varint(source_size));
    d.extend_from_slice(&write_varint(target_size));
    d.extend_from_slice(instructions);
    d
}

/// Parse `stream` into a temp directory; the dir handle keeps the output
/// files alive for the assertions.
fn parse(
    stream: Vec<u8>,
    config: PackConfig,
) -> (tempfile::TempDir, Result<ParsedPack, PackError>) {
    let dir = tempfile::tempdir().unwrap();
    let mut input = SeekableInput(Cursor::new(stream));
    let parser = PackParser::new(config, &mut input, dir.path().join("test.pack")).unwrap();
    let result = parser.parse(&mut NoProgress);
    (dir, result)
}

fn parse_with_store(
    stream: Vec<u8>,
    config: PackConfig,
    store: &MemoryStore,
) -> (tempfile::TempDir, Result<ParsedPack, PackError>) {
    let dir = tempfile::tempdir().unwrap();
    let mut input = SeekableInput(Cursor::new(stream));
    let parser = PackParser::new(config, &mut input, dir.path().join("test.pack"))
        .unwrap()
        .with_reader(store);
    let result = parser.parse(&mut NoProgress);
    (dir, result)
}

#[test]
fn single_blob_pack() {
    let content = b"Hello, packed world!";
    let mut fx = PackFixture::new(1);
    let offset = fx.add_whole(ObjectType::Blob, content);
    let (_dir, result) = parse(fx.finish(), PackConfig::default());

    let pack = result.unwrap();
    let expected = Hasher::hash_object("blob", content).unwrap();
    assert_eq!(pack.objects.len(), 1);
    assert_eq!(pack.objects[0].oid, expected);
    assert_eq!(pack.objects[0].offset, offset);
    assert_eq!(pack.objects[0].kind, ObjectType::Blob);
}

#[test]
fn written_pack_trailer_matches_recomputed_hash() {
    let mut fx = PackFixture::new(2);
    fx.add_whole(ObjectType::Blob, b"first");
    fx.add_whole(ObjectType::Blob, b"second");
    let (_dir, result) = parse(fx.finish(), PackConfig::default());
    let pack = result.unwrap();

    let raw = std::fs::read(&pack.pack_path).unwrap();
    let recomputed: [u8; 20] = Sha1::digest(&raw[..raw.len() - 20]).into();
    assert_eq!(&raw[raw.len() - 20..], recomputed);
    assert_eq!(pack.id, ObjectId::from(recomputed));
}

#[test]
fn written_index_is_valid_and_complete() {
    let mut fx = PackFixture::new(3);
    fx.add_whole(ObjectType::Blob, b"one");
    fx.add_whole(ObjectType::Blob, b"two");
    fx.add_whole(ObjectType::Commit, b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\nauthor A <a@e> 0 +0000\ncommitter C <c@e> 0 +0000\n\nx\n");
    let (_dir, result) = parse(fx.finish(), PackConfig::default());
    let pack = result.unwrap();

    // Opening validates the fan-out monotonicity; entry 255 is N.
    let idx = PackIndex::open(&pack.index_path).unwrap();
    assert_eq!(idx.num_objects(), 3);
    assert_eq!(idx.pack_checksum(), pack.id);

    for obj in &pack.objects {
        assert_eq!(idx.lookup(&obj.oid), Some(obj.offset));
    }
    // Sorted, strictly increasing ids.
    let ids: Vec<ObjectId> = idx.iter().map(|(oid, _)| oid).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn s1_thin_delta_acceptance() {
    let store = MemoryStore::new();
    let base = store.insert(ObjectType::Blob, b"a").unwrap();
    store.flush().unwrap();

    // Source size 1, result size 1, insert one byte 'b'.
    let mut fx = PackFixture::new(1);
    fx.add_ref_delta(&base, &[0x01, 0x01, 0x01, b'b']);

    let (_dir, result) = parse_with_store(
        fx.finish(),
        PackConfig {
            allow_thin: true,
            ..Default::default()
        },
        &store,
    );
    let pack = result.unwrap();

    let target = ObjectId::from_hex("63d8dbd40c23542e740659a7168a0ce3138ea748").unwrap();
    assert_eq!(
        Hasher::hash_object("blob", b"b").unwrap(),
        target,
        "SHA-1(\"blob 1\\0b\")"
    );
    assert!(pack.objects.iter().any(|o| o.oid == target));

    // The fetched base was appended, so the stored pack is
    // self-contained: two entries, reparseable without the store.
    assert!(pack.objects.iter().any(|o| o.oid == base));
    let stored = std::fs::read(&pack.pack_path).unwrap();
    assert_eq!(u32::from_be_bytes(stored[8..12].try_into().unwrap()), 2);

    let (_dir2, reparse) = parse(stored, PackConfig::default());
    let reparsed = reparse.unwrap();
    let mut first: Vec<ObjectId> = pack.objects.iter().map(|o| o.oid).collect();
    let mut second: Vec<ObjectId> = reparsed.objects.iter().map(|o| o.oid).collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
}

#[test]
fn thin_delta_without_allow_thin_is_rejected() {
    let store = MemoryStore::new();
    let base = store.insert(ObjectType::Blob, b"a").unwrap();
    store.flush().unwrap();

    let mut fx = PackFixture::new(1);
    fx.add_ref_delta(&base, &[0x01, 0x01, 0x01, b'b']);

    let (_dir, result) = parse_with_store(fx.finish(), PackConfig::default(), &store);
    assert!(matches!(result.unwrap_err(), PackError::MissingBase(oid) if oid == base));
}

#[test]
fn thin_base_absent_from_store_fails() {
    let store = MemoryStore::new(); // empty
    let ghost = ObjectId::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();

    let mut fx = PackFixture::new(1);
    fx.add_ref_delta(&ghost, &[0x01, 0x01, 0x01, b'b']);

    let (_dir, result) = parse_with_store(
        fx.finish(),
        PackConfig {
            allow_thin: true,
            ..Default::default()
        },
        &store,
    );
    assert!(matches!(
        result.unwrap_err(),
        PackError::Odb(grit_odb::OdbError::Missing(_))
    ));
}

#[test]
fn s2_trailing_garbage_rejection() {
    let mut fx = PackFixture::new(1);
    fx.add_whole(ObjectType::Blob, b"data");
    let mut stream = fx.finish();
    stream.push(0x7e);

    let (_dir, result) = parse(
        stream,
        PackConfig {
            check_eof_after_footer: true,
            ..Default::default()
        },
    );
    let err = result.unwrap_err();
    assert!(matches!(err, PackError::TrailingData { byte: 0x7e }));
    assert!(err.to_string().contains("7e"), "message: {err}");
}

#[test]
fn trailing_bytes_tolerated_by_default() {
    let mut fx = PackFixture::new(1);
    fx.add_whole(ObjectType::Blob, b"data");
    let mut stream = fx.finish();
    stream.extend_from_slice(b"anything after");

    let (_dir, result) = parse(stream, PackConfig::default());
    assert!(result.is_ok());
}

#[test]
fn expect_data_after_footer_leaves_bytes_in_stream() {
    let mut fx = PackFixture::new(1);
    fx.add_whole(ObjectType::Blob, b"data");
    let mut stream = fx.finish();
    let pack_len = stream.len() as u64;
    stream.extend_from_slice(b"HELLO-AFTER");

    let dir = tempfile::tempdir().unwrap();
    let mut input = SeekableInput(Cursor::new(stream));
    let parser = PackParser::new(
        PackConfig {
            expect_data_after_footer: true,
            ..Default::default()
        },
        &mut input,
        dir.path().join("test.pack"),
    )
    .unwrap();
    parser.parse(&mut NoProgress).unwrap();

    // The cursor sits exactly after the trailer.
    let mut cursor = input.into_inner();
    assert_eq!(cursor.position(), pack_len);
    let mut rest = Vec::new();
    cursor.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, b"HELLO-AFTER");
}

#[test]
fn expect_data_after_footer_demands_rewindable_input() {
    let mut fx = PackFixture::new(0);
    fx.add_whole(ObjectType::Blob, b"");
    let stream = fx.finish();

    let dir = tempfile::tempdir().unwrap();
    let mut input = StreamInput(&stream[..]);
    let parser = PackParser::new(
        PackConfig {
            expect_data_after_footer: true,
            ..Default::default()
        },
        &mut input,
        dir.path().join("test.pack"),
    )
    .unwrap();
    assert!(matches!(
        parser.parse(&mut NoProgress).unwrap_err(),
        PackError::RewindUnsupported
    ));
}

#[test]
fn s3_max_object_size() {
    let content = b"0123456789"; // declared size 10
    let make = || {
        let mut fx = PackFixture::new(1);
        fx.add_whole(ObjectType::Blob, content);
        fx.finish()
    };

    let (_dir, result) = parse(
        make(),
        PackConfig {
            max_object_size: Some(9),
            ..Default::default()
        },
    );
    let err = result.unwrap_err();
    assert!(matches!(err, PackError::ExceedsSizeLimit { size: 10, limit: 9 }));
    let msg = err.to_string();
    assert!(msg.contains("10") && msg.contains('9'), "message: {msg}");

    let (_dir, result) = parse(
        make(),
        PackConfig {
            max_object_size: Some(10),
            ..Default::default()
        },
    );
    assert!(result.is_ok());
}

#[test]
fn max_object_size_applies_to_delta_result() {
    let base_content = b"a";
    let target: Vec<u8> = vec![b'z'; 100];
    let mut instructions = Vec::new();
    instructions.extend_from_slice(&encode_insert(&target));
    let delta = delta_of(1, 100, &instructions);

    let make = || {
        let mut fx = PackFixture::new(2);
        let base_at = fx.add_whole(ObjectType::Blob, base_content);
        fx.add_ofs_delta(base_at, &delta);
        fx.finish()
    };

    let (_dir, result) = parse(
        make(),
        PackConfig {
            max_object_size: Some(9),
            ..Default::default()
        },
    );
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        PackError::ExceedsSizeLimit {
            size: 100,
            limit: 9
        }
    ));

    let (_dir, result) = parse(make(), PackConfig::default());
    let pack = result.unwrap();
    let expected = Hasher::hash_object("blob", &target).unwrap();
    assert!(pack.objects.iter().any(|o| o.oid == expected));
}

#[test]
fn ofs_delta_chain_resolves_depth_first() {
    let base = b"The quick brown fox jumps over the lazy dog";
    let mid: &[u8] = b"The quick brown cat jumps over the lazy dog";
    let tip: &[u8] = b"The quick brown cat naps";

    // base -> mid: copy 16, insert "cat", copy the tail after "fox".
    let mut ins1 = Vec::new();
    ins1.extend_from_slice(&encode_copy(0, 16));
    ins1.extend_from_slice(&encode_insert(b"cat"));
    ins1.extend_from_slice(&encode_copy(19, 24));
    let d1 = delta_of(base.len() as u64, mid.len() as u64, &ins1);

    // mid -> tip: copy "The quick brown cat", insert " naps".
    let mut ins2 = Vec::new();
    ins2.extend_from_slice(&encode_copy(0, 19));
    ins2.extend_from_slice(&encode_insert(b" naps"));
    let d2 = delta_of(mid.len() as u64, tip.len() as u64, &ins2);

    let mut fx = PackFixture::new(3);
    let base_at = fx.add_whole(ObjectType::Blob, base);
    let mid_at = fx.add_ofs_delta(base_at, &d1);
    fx.add_ofs_delta(mid_at, &d2);

    let (_dir, result) = parse(fx.finish(), PackConfig::default());
    let pack = result.unwrap();

    for content in [&base[..], mid, tip] {
        let oid = Hasher::hash_object("blob", content).unwrap();
        assert!(
            pack.objects.iter().any(|o| o.oid == oid),
            "missing reconstruction of {:?}",
            String::from_utf8_lossy(content)
        );
    }
}

#[test]
fn ref_delta_base_later_in_pack() {
    let base = b"shared base content for the delta";
    let target = b"shared base content for the delta, extended";
    let base_oid = Hasher::hash_object("blob", base).unwrap();

    let mut ins = Vec::new();
    ins.extend_from_slice(&encode_copy(0, base.len()));
    ins.extend_from_slice(&encode_insert(b", extended"));
    let delta = delta_of(base.len() as u64, target.len() as u64, &ins);

    // Delta first, its base second.
    let mut fx = PackFixture::new(2);
    fx.add_ref_delta(&base_oid, &delta);
    fx.add_whole(ObjectType::Blob, base);

    let (_dir, result) = parse(fx.finish(), PackConfig::default());
    let pack = result.unwrap();
    let target_oid = Hasher::hash_object("blob", target).unwrap();
    assert!(pack.objects.iter().any(|o| o.oid == target_oid));
}

#[test]
fn duplicate_objects_within_pack_are_permitted() {
    let mut fx = PackFixture::new(2);
    fx.add_whole(ObjectType::Blob, b"twice");
    fx.add_whole(ObjectType::Blob, b"twice");

    let (_dir, result) = parse(fx.finish(), PackConfig::default());
    let pack = result.unwrap();
    assert_eq!(pack.objects.len(), 2);
    assert_eq!(pack.objects[0].oid, pack.objects[1].oid);

    let idx = PackIndex::open(&pack.index_path).unwrap();
    assert_eq!(idx.num_objects(), 2);
}

#[test]
fn corrupt_trailer_leaves_no_output_files() {
    let mut fx = PackFixture::new(1);
    fx.add_whole(ObjectType::Blob, b"payload");
    let mut stream = fx.finish();
    let len = stream.len();
    stream[len - 1] ^= 0xff;

    let dir = tempfile::tempdir().unwrap();
    let pack_path = dir.path().join("broken.pack");
    let idx_path = pack_path.with_extension("idx");

    let mut input = SeekableInput(Cursor::new(stream));
    let parser =
        PackParser::new(PackConfig::default(), &mut input, &pack_path).unwrap();
    assert!(matches!(
        parser.parse(&mut NoProgress).unwrap_err(),
        PackError::ChecksumMismatch { .. }
    ));

    assert!(!pack_path.exists());
    assert!(!idx_path.exists());
    // The staged temp file is cleaned up too.
    let leftovers: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
}

#[test]
fn truncated_stream_fails_with_eof() {
    let mut fx = PackFixture::new(2);
    fx.add_whole(ObjectType::Blob, b"present");
    let stream = fx.body; // second object and trailer missing

    let (_dir, result) = parse(stream, PackConfig::default());
    assert!(matches!(result.unwrap_err(), PackError::UnexpectedEof(_)));
}

#[test]
fn check_objects_verifies_written_pack() {
    let mut ins = Vec::new();
    ins.extend_from_slice(&encode_copy(0, 10));
    let d = delta_of(11, 10, &ins);

    let mut fx = PackFixture::new(3);
    fx.add_whole(ObjectType::Blob, b"checked");
    let base_at = fx.add_whole(ObjectType::Blob, b"delta base!");
    fx.add_ofs_delta(base_at, &d);

    let (_dir, result) = parse(
        fx.finish(),
        PackConfig {
            check_objects: true,
            ..Default::default()
        },
    );
    assert!(result.is_ok());
}

#[test]
fn empty_pack_is_valid() {
    let fx = PackFixture::new(0);
    let (_dir, result) = parse(fx.finish(), PackConfig::default());
    let pack = result.unwrap();
    assert!(pack.objects.is_empty());

    let idx = PackIndex::open(&pack.index_path).unwrap();
    assert_eq!(idx.num_objects(), 0);
}

#[test]
fn version_3_accepted() {
    let mut fx = PackFixture::with_version(1, 3);
    fx.add_whole(ObjectType::Blob, b"v3 stream");
    let (_dir, result) = parse(fx.finish(), PackConfig::default());
    assert!(result.is_ok());
}

#[test]
fn reparse_of_written_pack_yields_identical_objects() {
    let mut fx = PackFixture::new(3);
    let base_at = fx.add_whole(ObjectType::Blob, b"base bytes here");
    fx.add_whole(ObjectType::Tag, b"object e69de29bb2d1d6434b8b29ae775ad8c2e48c5391\ntype blob\ntag v1\ntagger T <t@e> 0 +0000\n\nmsg\n");
    let mut ins = Vec::new();
    ins.extend_from_slice(&encode_copy(0, 4));
    ins.extend_from_slice(&encode_insert(b"-tail"));
    fx.add_ofs_delta(base_at, &delta_of(15, 9, &ins));

    let (_dir, result) = parse(fx.finish(), PackConfig::default());
    let pack = result.unwrap();

    let written = std::fs::read(&pack.pack_path).unwrap();
    let (_dir2, reparse) = parse(written, PackConfig::default());
    let reparsed = reparse.unwrap();

    let mut a: Vec<(ObjectId, ObjectType)> =
        pack.objects.iter().map(|o| (o.oid, o.kind)).collect();
    let mut b: Vec<(ObjectId, ObjectType)> =
        reparsed.objects.iter().map(|o| (o.oid, o.kind)).collect();
    a.sort();
    b.sort();
    assert_eq!(a, b);
    assert_eq!(pack.id, reparsed.id);
}

#[test]
fn progress_reports_both_phases() {
    let mut fx = PackFixture::new(2);
    let base_at = fx.add_whole(ObjectType::Blob, b"0123456789");
    let mut ins = Vec::new();
    ins.extend_from_slice(&encode_copy(0, 5));
    fx.add_ofs_delta(base_at, &delta_of(10, 5, &ins));

    let dir = tempfile::tempdir().unwrap();
    let mut input = SeekableInput(Cursor::new(fx.finish()));
    let parser = PackParser::new(
        PackConfig::default(),
        &mut input,
        dir.path().join("test.pack"),
    )
    .unwrap();

    let mut progress = CountingProgress::default();
    parser.parse(&mut progress).unwrap();

    let titles: Vec<&str> = progress.tasks.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(titles, vec!["Receiving objects", "Resolving deltas"]);
    assert_eq!(progress.tasks[0].1, Some(2));
    assert_eq!(progress.tasks[1].1, Some(1));
    assert_eq!(progress.ended, 2);
}
