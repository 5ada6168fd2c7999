//! Object identity for the grit git core.
//!
//! Provides the `ObjectId` type (20-byte SHA-1), streaming identity
//! hashing with collision detection, the hex codec, and the fan-out
//! table shared by pack indexes.

mod error;
pub mod fanout;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use fanout::FanoutTable;
pub use hasher::Hasher;
pub use oid::{ObjectId, HEX_LEN, RAW_LEN};
