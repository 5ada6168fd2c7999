use std::cmp::Ordering;
use std::rc::Rc;

use bstr::BStr;
use grit_dircache::DirCache;
use grit_hash::ObjectId;
use grit_object::{base_name_compare, FileMode};
use grit_odb::ObjectReader;

use crate::canonical::CanonicalTreeIter;
use crate::dircache_iter::DirCacheIter;
use crate::filter::TreeFilter;
use crate::iter::{EmptyIter, TreeIterator};
use crate::TreeWalkError;

/// Walks N sorted tree sources in lock-step by git path order.
///
/// At each step the minimum path across sources is selected; every source
/// positioned at that path "matches" and the rest report an absent entry
/// (`FileMode::Missing`, zero id). Subtrees compare as if their name
/// ended in `/`.
pub struct TreeWalk<'r> {
    reader: &'r dyn ObjectReader,
    /// One frame per depth; frame 0 holds the added root sources.
    stack: Vec<Frame>,
    recursive: bool,
    post_order: bool,
    filter: Option<Box<dyn TreeFilter>>,
    /// The last yielded entry still needs stepping past on the next call.
    advance_pending: bool,
    /// The last yielded entry was a subtree pre-visit in post-order mode;
    /// the next call descends instead of advancing.
    enter_pending: bool,
    post_children: bool,
    current: Option<Current>,
}

struct Frame {
    iters: Vec<Box<dyn TreeIterator>>,
}

struct Current {
    /// Index of the iterator whose entry is the minimum.
    head: usize,
    /// Which sources sit at the minimum path.
    matches: Vec<bool>,
}

fn cmp_iters(a: &dyn TreeIterator, b: &dyn TreeIterator) -> Ordering {
    base_name_compare(
        a.path().as_ref(),
        a.mode().is_tree(),
        b.path().as_ref(),
        b.mode().is_tree(),
    )
}

impl<'r> TreeWalk<'r> {
    pub fn new(reader: &'r dyn ObjectReader) -> Self {
        Self {
            reader,
            stack: vec![Frame { iters: Vec::new() }],
            recursive: false,
            post_order: false,
            filter: None,
            advance_pending: false,
            enter_pending: false,
            post_children: false,
            current: None,
        }
    }

    /// Add any tree source; returns its source index.
    pub fn add_source(&mut self, iter: Box<dyn TreeIterator>) -> usize {
        self.stack[0].iters.push(iter);
        self.stack[0].iters.len() - 1
    }

    /// Add a canonical tree object as a source.
    pub fn add_tree(&mut self, tree: &ObjectId) -> Result<usize, TreeWalkError> {
        let it = CanonicalTreeIter::new(self.reader, tree)?;
        Ok(self.add_source(Box::new(it)))
    }

    /// Add the dir-cache as a source.
    pub fn add_dircache(&mut self, cache: Rc<DirCache>) -> usize {
        self.add_source(Box::new(DirCacheIter::new(cache)))
    }

    pub fn source_count(&self) -> usize {
        self.stack[0].iters.len()
    }

    /// In recursive mode subtrees are entered automatically and only
    /// leaves are yielded.
    pub fn set_recursive(&mut self, recursive: bool) {
        self.recursive = recursive;
    }

    /// Re-yield each subtree after its children, flagged with
    /// [`post_children`](Self::post_children). Survives `reset`.
    pub fn set_post_order(&mut self, post_order: bool) {
        self.post_order = post_order;
    }

    pub fn set_filter(&mut self, filter: Box<dyn TreeFilter>) {
        self.filter = Some(filter);
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    /// Step to the next entry. Returns `false` when the walk is done.
    pub fn next(&mut self) -> Result<bool, TreeWalkError> {
        if self.enter_pending {
            self.enter_pending = false;
            self.post_children = false;
            self.enter_subtree()?;
        } else if self.advance_pending {
            self.advance_pending = false;
            self.post_children = false;
            self.advance_matches()?;
        }

        loop {
            match self.compute_min() {
                None => {
                    // Everything at this depth is exhausted.
                    if self.stack.len() == 1 {
                        self.current = None;
                        return Ok(false);
                    }
                    self.stack.pop();
                    // Parent iterators still sit on the subtree entry we
                    // descended into.
                    let (head, matches) =
                        self.compute_min().expect("parent frame has an entry");
                    self.current = Some(Current { head, matches });
                    if self.post_order {
                        self.post_children = true;
                        self.advance_pending = true;
                        return Ok(true);
                    }
                    self.advance_matches()?;
                }
                Some((head, matches)) => {
                    self.current = Some(Current { head, matches });
                    self.post_children = false;

                    let include = match self.filter.take() {
                        Some(f) => {
                            let r = f.include(self);
                            self.filter = Some(f);
                            r?
                        }
                        None => true,
                    };
                    if !include {
                        self.advance_matches()?;
                        continue;
                    }

                    let descend = self.is_subtree()
                        && (self.recursive
                            || self
                                .filter
                                .as_ref()
                                .is_some_and(|f| f.should_be_recursive()));
                    if descend {
                        if self.post_order {
                            // Pre-visit: the subtree is yielded once here
                            // and revisited after its children.
                            self.enter_pending = true;
                            return Ok(true);
                        }
                        self.enter_subtree()?;
                        continue;
                    }

                    self.advance_pending = true;
                    return Ok(true);
                }
            }
        }
    }

    /// Descend into the current subtree; the next `next` yields its first
    /// child. Sources without the subtree contribute no children.
    pub fn enter_subtree(&mut self) -> Result<(), TreeWalkError> {
        if !self.is_subtree() {
            return Err(TreeWalkError::NotASubtree);
        }
        let cur = self.current.take().expect("is_subtree checked");
        let frame = self.stack.last().expect("at least the root frame");

        let mut subs: Vec<Box<dyn TreeIterator>> = Vec::with_capacity(frame.iters.len());
        for (i, it) in frame.iters.iter().enumerate() {
            if cur.matches[i] && it.mode().is_tree() {
                subs.push(it.create_subtree_iterator(self.reader)?);
            } else {
                subs.push(Box::new(EmptyIter));
            }
        }
        self.stack.push(Frame { iters: subs });
        self.advance_pending = false;
        self.enter_pending = false;
        self.post_children = false;
        Ok(())
    }

    /// Return to the first entry at the root. Mode toggles (recursive,
    /// post-order) and the filter are preserved.
    pub fn reset(&mut self) {
        self.stack.truncate(1);
        for it in &mut self.stack[0].iters {
            it.reset();
        }
        self.advance_pending = false;
        self.enter_pending = false;
        self.post_children = false;
        self.current = None;
    }

    /// Full path bytes of the current entry.
    pub fn path(&self) -> &BStr {
        self.head_iter()
            .map(|it| it.path())
            .unwrap_or_else(|| BStr::new(b""))
    }

    /// Mode the given source reports at the current path
    /// (`FileMode::Missing` when the source lacks the path).
    pub fn mode(&self, source: usize) -> FileMode {
        match &self.current {
            Some(c) if c.matches[source] => {
                self.stack.last().expect("frame").iters[source].mode()
            }
            _ => FileMode::Missing,
        }
    }

    /// Object id the given source reports at the current path (zero when
    /// the source lacks the path).
    pub fn oid(&self, source: usize) -> ObjectId {
        match &self.current {
            Some(c) if c.matches[source] => {
                self.stack.last().expect("frame").iters[source].oid()
            }
            _ => ObjectId::ZERO,
        }
    }

    /// Is the current entry a subtree in the source that defined the
    /// minimum path?
    pub fn is_subtree(&self) -> bool {
        self.head_iter().is_some_and(|it| it.mode().is_tree())
    }

    /// Set only on the second visit of a subtree in post-order mode.
    pub fn post_children(&self) -> bool {
        self.post_children
    }

    /// Current subtree nesting depth (0 at the root).
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    fn head_iter(&self) -> Option<&dyn TreeIterator> {
        let cur = self.current.as_ref()?;
        Some(self.stack.last()?.iters[cur.head].as_ref())
    }

    fn compute_min(&self) -> Option<(usize, Vec<bool>)> {
        let frame = self.stack.last()?;
        let mut head: Option<usize> = None;
        for (i, it) in frame.iters.iter().enumerate() {
            if it.eof() {
                continue;
            }
            head = match head {
                None => Some(i),
                Some(h) => {
                    if cmp_iters(it.as_ref(), frame.iters[h].as_ref()) == Ordering::Less {
                        Some(i)
                    } else {
                        Some(h)
                    }
                }
            };
        }
        let h = head?;
        let head_it = frame.iters[h].as_ref();
        let matches = frame
            .iters
            .iter()
            .map(|it| !it.eof() && cmp_iters(it.as_ref(), head_it) == Ordering::Equal)
            .collect();
        Some((h, matches))
    }

    fn advance_matches(&mut self) -> Result<(), TreeWalkError> {
        if let Some(cur) = self.current.take() {
            let frame = self.stack.last_mut().expect("at least the root frame");
            for (i, matched) in cur.matches.iter().enumerate() {
                if *matched {
                    frame.iters[i].advance()?;
                }
            }
        }
        Ok(())
    }
}
