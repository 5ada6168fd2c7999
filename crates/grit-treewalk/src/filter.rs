//! Walk position filters.

use bstr::{BStr, BString, ByteSlice};

use crate::walk::TreeWalk;
use crate::TreeWalkError;

/// A predicate on the walker's current position.
pub trait TreeFilter {
    /// Include the current entry in the walk output?
    fn include(&self, walk: &TreeWalk) -> Result<bool, TreeWalkError>;

    /// Does this filter require descending into subtrees even when the
    /// walk itself is not recursive? Path filters answer true exactly
    /// when their target crosses a subtree boundary.
    fn should_be_recursive(&self) -> bool;
}

/// Includes everything.
#[derive(Debug, Default)]
pub struct AllFilter;

impl TreeFilter for AllFilter {
    fn include(&self, _walk: &TreeWalk) -> Result<bool, TreeWalkError> {
        Ok(true)
    }

    fn should_be_recursive(&self) -> bool {
        false
    }
}

/// Matches entries on or under one path prefix.
///
/// Includes an entry when the walk path equals the target, lies under it,
/// or is an ancestor directory of it (so the walker can reach it).
pub struct PathFilter {
    path: BString,
}

impl PathFilter {
    /// Create a filter for the given `/`-separated path. Trailing slashes
    /// are stripped.
    pub fn create(path: impl Into<BString>) -> Self {
        let mut path = path.into();
        while path.last() == Some(&b'/') {
            path.pop();
        }
        Self { path }
    }
}

/// Is `prefix` a path-component prefix of `full`?
fn is_path_prefix(prefix: &BStr, full: &BStr) -> bool {
    full.starts_with(prefix)
        && (full.len() == prefix.len() || full[prefix.len()] == b'/')
}

impl TreeFilter for PathFilter {
    fn include(&self, walk: &TreeWalk) -> Result<bool, TreeWalkError> {
        let current = walk.path();
        Ok(is_path_prefix(self.path.as_ref(), current)
            || is_path_prefix(current, self.path.as_ref()))
    }

    fn should_be_recursive(&self) -> bool {
        self.path.contains_str(b"/")
    }
}

/// Logical AND with short-circuit evaluation.
pub struct AndFilter(pub Vec<Box<dyn TreeFilter>>);

impl TreeFilter for AndFilter {
    fn include(&self, walk: &TreeWalk) -> Result<bool, TreeWalkError> {
        for f in &self.0 {
            if !f.include(walk)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn should_be_recursive(&self) -> bool {
        self.0.iter().any(|f| f.should_be_recursive())
    }
}

/// Logical OR with short-circuit evaluation.
pub struct OrFilter(pub Vec<Box<dyn TreeFilter>>);

impl TreeFilter for OrFilter {
    fn include(&self, walk: &TreeWalk) -> Result<bool, TreeWalkError> {
        for f in &self.0 {
            if f.include(walk)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn should_be_recursive(&self) -> bool {
        self.0.iter().any(|f| f.should_be_recursive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_prefix_matching() {
        assert!(is_path_prefix(BStr::new("a"), BStr::new("a")));
        assert!(is_path_prefix(BStr::new("a"), BStr::new("a/b")));
        assert!(!is_path_prefix(BStr::new("a"), BStr::new("ab")));
        assert!(!is_path_prefix(BStr::new("a/b"), BStr::new("a")));
    }

    #[test]
    fn recursion_requirement_tracks_boundary() {
        assert!(!PathFilter::create("file").should_be_recursive());
        assert!(PathFilter::create("dir/file").should_be_recursive());
        assert!(!PathFilter::create("dir/").should_be_recursive());
    }

    #[test]
    fn trailing_slash_stripped() {
        let f = PathFilter::create("dir/sub/");
        assert_eq!(f.path, "dir/sub");
    }
}
