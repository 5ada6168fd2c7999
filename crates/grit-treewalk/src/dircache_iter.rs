use std::rc::Rc;

use bstr::{BStr, BString, ByteSlice};
use grit_dircache::DirCache;
use grit_hash::ObjectId;
use grit_object::FileMode;
use grit_odb::ObjectReader;

use crate::iter::TreeIterator;
use crate::TreeWalkError;

/// Projects the flat dir-cache into one depth of a virtual tree.
///
/// The iterator owns a flat range `[begin, end)` of entries sharing a
/// directory prefix. A file entry maps to itself; a `/` past the prefix
/// synthesizes a subtree entry spanning every flat entry under that
/// directory. Sibling start positions are recorded as the cursor moves
/// forward, so `back` replays them and backward traversal is exactly the
/// reverse of forward traversal.
pub struct DirCacheIter {
    cache: Rc<DirCache>,
    /// Flat range at this depth.
    begin: usize,
    end: usize,
    /// Directory prefix including the trailing `/` (empty at the root).
    prefix: BString,
    /// Flat position of the current sibling.
    ptr: usize,
    /// Flat start positions of siblings already stepped past.
    visited: Vec<usize>,
    current: Option<Entry>,
}

struct Entry {
    path: BString,
    mode: FileMode,
    oid: ObjectId,
    /// Flat position just past this sibling (for subtrees, past every
    /// contained entry).
    span_end: usize,
}

impl DirCacheIter {
    /// Iterate the root level of the dir-cache.
    pub fn new(cache: Rc<DirCache>) -> Self {
        let end = cache.len();
        Self::new_range(cache, 0, end, BString::default())
    }

    fn new_range(cache: Rc<DirCache>, begin: usize, end: usize, prefix: BString) -> Self {
        let mut it = Self {
            cache,
            begin,
            end,
            prefix,
            ptr: begin,
            visited: Vec::new(),
            current: None,
        };
        it.load();
        it
    }

    /// Compute the entry at `self.ptr`, synthesizing a subtree when the
    /// path continues past a `/`.
    fn load(&mut self) {
        if self.ptr >= self.end {
            self.current = None;
            return;
        }

        let flat = self.cache.entry(self.ptr);
        let rest = &flat.path[self.prefix.len()..];

        self.current = Some(match rest.find_byte(b'/') {
            Some(slash) => {
                let mut dir_prefix = self.prefix.clone();
                dir_prefix.extend_from_slice(&rest[..slash]);
                dir_prefix.push(b'/');

                let mut span_end = self.ptr + 1;
                while span_end < self.end
                    && self.cache.entry(span_end).path.starts_with(&dir_prefix)
                {
                    span_end += 1;
                }

                let mut path = dir_prefix;
                let new_len = path.len() - 1;
                path.truncate(new_len); // drop the trailing '/'
                Entry {
                    path,
                    mode: FileMode::Tree,
                    oid: ObjectId::ZERO,
                    span_end,
                }
            }
            None => Entry {
                path: flat.path.clone(),
                mode: flat.mode,
                oid: flat.oid,
                span_end: self.ptr + 1,
            },
        });
    }
}

impl TreeIterator for DirCacheIter {
    fn eof(&self) -> bool {
        self.current.is_none()
    }

    fn path(&self) -> &BStr {
        self.current
            .as_ref()
            .map(|e| e.path.as_ref())
            .unwrap_or_else(|| BStr::new(b""))
    }

    fn mode(&self) -> FileMode {
        self.current
            .as_ref()
            .map(|e| e.mode)
            .unwrap_or(FileMode::Missing)
    }

    fn oid(&self) -> ObjectId {
        self.current
            .as_ref()
            .map(|e| e.oid)
            .unwrap_or(ObjectId::ZERO)
    }

    fn advance(&mut self) -> Result<(), TreeWalkError> {
        if let Some(entry) = &self.current {
            self.visited.push(self.ptr);
            self.ptr = entry.span_end;
            self.load();
        }
        Ok(())
    }

    fn back(&mut self, n: usize) -> Result<(), TreeWalkError> {
        if n > self.visited.len() {
            return Err(TreeWalkError::BackOutOfRange { n });
        }
        for _ in 0..n {
            self.ptr = self.visited.pop().expect("length checked");
        }
        self.load();
        Ok(())
    }

    fn reset(&mut self) {
        self.ptr = self.begin;
        self.visited.clear();
        self.load();
    }

    fn create_subtree_iterator(
        &self,
        _reader: &dyn ObjectReader,
    ) -> Result<Box<dyn TreeIterator>, TreeWalkError> {
        let entry = self.current.as_ref().ok_or(TreeWalkError::NotASubtree)?;
        if !entry.mode.is_tree() {
            return Err(TreeWalkError::NotASubtree);
        }
        let mut prefix = entry.path.clone();
        prefix.push(b'/');
        Ok(Box::new(Self::new_range(
            self.cache.clone(),
            self.ptr,
            entry.span_end,
            prefix,
        )))
    }
}
