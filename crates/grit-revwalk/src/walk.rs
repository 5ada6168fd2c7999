//! The commit arena and its flag pool.

use std::collections::HashMap;

use bitflags::bitflags;
use grit_hash::ObjectId;
use grit_object::{Commit, ObjectType};
use grit_odb::ObjectReader;

use crate::RevWalkError;

bitflags! {
    /// Per-commit traversal state.
    ///
    /// The named low bits have fixed meaning; every bit above them
    /// belongs to the walk's free pool and is allocated to generators on
    /// demand.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RevFlags: u32 {
        /// Header fields (tree, parents, time) have been loaded.
        const PARSED = 1 << 0;
        /// Commit has been added to a generator's queue.
        const IN_QUEUE = 1 << 1;
        /// Commit has been popped from the queue.
        const POPPED = 1 << 2;
        /// Commit is a merge base, or the ancestor of one.
        const MERGE_BASE = 1 << 3;
        // Pool bits are unnamed; keep them all representable.
        const _ = !0;
    }
}

/// Lowest bit position available to the free pool.
pub const FIRST_FREE_BIT: u32 = 4;

/// Index of a commit in the walk's arena.
pub type CommitIx = usize;

/// A commit node: parsed header fields plus the traversal flag word.
#[derive(Debug, Clone)]
pub struct CommitNode {
    pub oid: ObjectId,
    pub tree: ObjectId,
    /// Parents as arena indices; empty until parsed (or for a root).
    pub parents: Vec<CommitIx>,
    /// Committer timestamp, seconds since the epoch.
    pub commit_time: i64,
    pub flags: RevFlags,
}

/// Owns the commit arena and the pool of free flag bits.
pub struct RevWalk<'r> {
    reader: &'r dyn ObjectReader,
    nodes: Vec<CommitNode>,
    by_oid: HashMap<ObjectId, CommitIx>,
    /// Bitmask of pool bits currently available.
    free_flags: u32,
}

impl<'r> RevWalk<'r> {
    pub fn new(reader: &'r dyn ObjectReader) -> Self {
        Self {
            reader,
            nodes: Vec::new(),
            by_oid: HashMap::new(),
            free_flags: !0u32 << FIRST_FREE_BIT,
        }
    }

    /// Arena index for the given id, creating an unparsed node on first
    /// sight.
    pub fn lookup(&mut self, oid: ObjectId) -> CommitIx {
        if let Some(&ix) = self.by_oid.get(&oid) {
            return ix;
        }
        let ix = self.nodes.len();
        self.nodes.push(CommitNode {
            oid,
            tree: ObjectId::ZERO,
            parents: Vec::new(),
            commit_time: 0,
            flags: RevFlags::empty(),
        });
        self.by_oid.insert(oid, ix);
        ix
    }

    /// Load the commit's header fields if not already loaded. Missing or
    /// wrong-type objects surface as read errors.
    pub fn parse(&mut self, ix: CommitIx) -> Result<(), RevWalkError> {
        if self.nodes[ix].flags.contains(RevFlags::PARSED) {
            return Ok(());
        }
        let oid = self.nodes[ix].oid;
        let obj = self.reader.open(&oid, Some(ObjectType::Commit))?;
        let commit = Commit::parse(&obj.data)?;

        let parents: Vec<CommitIx> = commit
            .parents
            .iter()
            .map(|p| self.lookup(*p))
            .collect();

        let node = &mut self.nodes[ix];
        node.tree = commit.tree;
        node.parents = parents;
        node.commit_time = commit.committer_time;
        node.flags |= RevFlags::PARSED;
        Ok(())
    }

    pub fn node(&self, ix: CommitIx) -> &CommitNode {
        &self.nodes[ix]
    }

    pub fn flags(&self, ix: CommitIx) -> RevFlags {
        self.nodes[ix].flags
    }

    pub fn add_flags(&mut self, ix: CommitIx, flags: RevFlags) {
        self.nodes[ix].flags |= flags;
    }

    pub fn has_flags(&self, ix: CommitIx, flags: RevFlags) -> bool {
        self.nodes[ix].flags.contains(flags)
    }

    /// Number of pool bits currently free.
    pub fn free_flag_count(&self) -> u32 {
        self.free_flags.count_ones()
    }

    /// Borrow one flag bit from the pool.
    ///
    /// # Panics
    ///
    /// Panics when the pool is exhausted: the caller admitted more
    /// starting commits (or concurrent generators) than there are free
    /// bits, which is a programming error.
    pub fn alloc_flag(&mut self) -> RevFlags {
        assert!(
            self.free_flags != 0,
            "flag pool exhausted: too many starting commits or concurrent generators"
        );
        let bit = 1u32 << self.free_flags.trailing_zeros();
        self.free_flags &= !bit;
        RevFlags::from_bits_retain(bit)
    }

    /// Return a flag bit to the pool. The bit keeps its meaning in
    /// commits already marked; reuse is only safe after `reset`.
    pub fn release_flag(&mut self, flag: RevFlags) {
        let bit = flag.bits();
        debug_assert_eq!(bit.count_ones(), 1, "release of a non-pool flag word");
        debug_assert_eq!(self.free_flags & bit, 0, "flag released twice");
        self.free_flags |= bit;
    }

    /// Clear every commit's traversal flags (parse state included) and
    /// restore the full flag pool.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            let parsed = node.flags.contains(RevFlags::PARSED);
            node.flags = if parsed {
                RevFlags::PARSED
            } else {
                RevFlags::empty()
            };
        }
        self.free_flags = !0u32 << FIRST_FREE_BIT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_odb::{MemoryStore, ObjectInserter};

    fn put_commit(store: &MemoryStore, parents: &[ObjectId], time: i64) -> ObjectId {
        let mut raw = String::from("tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        for p in parents {
            raw.push_str(&format!("parent {p}\n"));
        }
        raw.push_str(&format!("author A <a@e> {time} +0000\n"));
        raw.push_str(&format!("committer C <c@e> {time} +0000\n\nmsg\n"));
        let oid = store
            .insert(ObjectType::Commit, raw.as_bytes())
            .unwrap();
        store.flush().unwrap();
        oid
    }

    #[test]
    fn parse_fills_header_fields() {
        let store = MemoryStore::new();
        let a = put_commit(&store, &[], 100);
        let b = put_commit(&store, &[a], 200);

        let mut walk = RevWalk::new(&store);
        let ib = walk.lookup(b);
        walk.parse(ib).unwrap();

        let node = walk.node(ib);
        assert_eq!(node.commit_time, 200);
        assert_eq!(node.parents.len(), 1);
        assert_eq!(walk.node(node.parents[0]).oid, a);
        assert!(walk.has_flags(ib, RevFlags::PARSED));
    }

    #[test]
    fn lookup_is_idempotent() {
        let store = MemoryStore::new();
        let mut walk = RevWalk::new(&store);
        let a = walk.lookup(ObjectId::ZERO);
        let b = walk.lookup(ObjectId::ZERO);
        assert_eq!(a, b);
    }

    #[test]
    fn parse_missing_commit_fails() {
        let store = MemoryStore::new();
        let mut walk = RevWalk::new(&store);
        let ix = walk.lookup(ObjectId::ZERO);
        assert!(walk.parse(ix).is_err());
    }

    #[test]
    fn parse_non_commit_fails() {
        let store = MemoryStore::new();
        let blob = store.insert(ObjectType::Blob, b"data").unwrap();
        store.flush().unwrap();

        let mut walk = RevWalk::new(&store);
        let ix = walk.lookup(blob);
        assert!(matches!(
            walk.parse(ix),
            Err(RevWalkError::Odb(grit_odb::OdbError::IncorrectType { .. }))
        ));
    }

    #[test]
    fn flag_pool_alloc_release() {
        let store = MemoryStore::new();
        let mut walk = RevWalk::new(&store);
        let total = walk.free_flag_count();

        let a = walk.alloc_flag();
        let b = walk.alloc_flag();
        assert_ne!(a, b);
        assert_eq!(walk.free_flag_count(), total - 2);

        walk.release_flag(a);
        walk.release_flag(b);
        assert_eq!(walk.free_flag_count(), total);
    }

    #[test]
    fn pool_bits_do_not_overlap_named_bits() {
        let store = MemoryStore::new();
        let mut walk = RevWalk::new(&store);
        for _ in 0..walk.free_flag_count() {
            let f = walk.alloc_flag();
            assert!(!f.intersects(
                RevFlags::PARSED | RevFlags::IN_QUEUE | RevFlags::POPPED | RevFlags::MERGE_BASE
            ));
        }
        assert_eq!(walk.free_flag_count(), 0);
    }

    #[test]
    #[should_panic(expected = "flag pool exhausted")]
    fn pool_exhaustion_panics() {
        let store = MemoryStore::new();
        let mut walk = RevWalk::new(&store);
        for _ in 0..=32 {
            let _ = walk.alloc_flag();
        }
    }

    #[test]
    fn reset_restores_pool_and_clears_flags() {
        let store = MemoryStore::new();
        let a = put_commit(&store, &[], 1);

        let mut walk = RevWalk::new(&store);
        let ix = walk.lookup(a);
        walk.parse(ix).unwrap();
        let flag = walk.alloc_flag();
        walk.add_flags(ix, flag | RevFlags::POPPED);

        let total_before = walk.free_flag_count();
        walk.reset();
        assert_eq!(walk.free_flag_count(), total_before + 1);
        assert_eq!(walk.flags(ix), RevFlags::PARSED);
    }
}
