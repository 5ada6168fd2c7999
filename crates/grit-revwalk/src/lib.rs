//! Commit graph traversal.
//!
//! Commits live in an arena owned by `RevWalk`, keyed by object id, with
//! parents stored as arena indices — flag manipulation is O(1) and the
//! parent DAG needs no shared ownership. Traversal state is a per-commit
//! flag word: a few named bits plus a pool of free bits that generators
//! borrow for the duration of a walk.

pub mod merge_base;
pub mod walk;

pub use merge_base::{merge_bases, MergeBaseGenerator};
pub use walk::{CommitIx, CommitNode, RevFlags, RevWalk};

use grit_hash::ObjectId;

/// Errors produced by commit traversal.
#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("duplicate starting commit: {0}")]
    DuplicateStart(ObjectId),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),
}
