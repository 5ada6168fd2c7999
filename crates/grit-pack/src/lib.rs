//! Pack stream parsing and indexing.
//!
//! This crate consumes a pack byte stream, reconstructs delta chains,
//! verifies the trailing checksum, and writes the pack with its v2 index
//! as an atomic pair. The written index is readable by any compliant git
//! implementation.

pub mod delta;
pub mod entry;
pub mod index;
pub mod input;
pub mod parser;

use grit_hash::ObjectId;

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("delta chain too deep (>{max_depth} levels) at offset {offset}")]
    DeltaChainTooDeep { offset: u64, max_depth: usize },

    #[error("pack checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: ObjectId, actual: ObjectId },

    #[error("object {oid} at offset {offset} does not hash to its recorded id")]
    ObjectMismatch { oid: ObjectId, offset: u64 },

    #[error("object exceeds size limit: {size} > {limit}")]
    ExceedsSizeLimit { size: u64, limit: u64 },

    #[error("expected EOF after pack footer, found trailing byte 0x{byte:02x}")]
    TrailingData { byte: u8 },

    #[error("unexpected end of pack stream at offset {0}")]
    UnexpectedEof(u64),

    #[error("input stream does not support rewind, required when data may follow the footer")]
    RewindUnsupported,

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Util(#[from] grit_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Pack format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;

/// Pack index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Pack entry type codes for the two delta forms.
pub const OFS_DELTA: u8 = 6;
pub const REF_DELTA: u8 = 7;

/// Maximum delta chain depth before we bail out.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 512;

/// Number of inflated delta bases kept around during resolution.
pub const DELTA_BASE_CACHE_ENTRIES: usize = 64;
