//! Multi-source tree walking.
//!
//! A `TreeWalk` merges N sorted tree sources in lock-step by git path
//! order. Sources implement the `TreeIterator` protocol; two built-ins
//! exist — `CanonicalTreeIter` over `tree` objects and `DirCacheIter`
//! projecting the flat dir-cache into a virtual tree.

mod canonical;
mod dircache_iter;
pub mod filter;
mod iter;
mod walk;

pub use canonical::CanonicalTreeIter;
pub use dircache_iter::DirCacheIter;
pub use filter::{AllFilter, AndFilter, OrFilter, PathFilter, TreeFilter};
pub use iter::{EmptyIter, TreeIterator};
pub use walk::TreeWalk;

/// Errors produced by tree walking.
#[derive(Debug, thiserror::Error)]
pub enum TreeWalkError {
    #[error("current entry is not a subtree")]
    NotASubtree,

    #[error("cannot step back {n} entries from the current position")]
    BackOutOfRange { n: usize },

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),
}
