//! Merge-base computation by flag carry.
//!
//! Each starting commit gets one pool bit; the bits flow down ancestors
//! through a newest-first date queue. A commit holding every starting bit
//! is reachable from all inputs; the `MERGE_BASE` bit painted onto its
//! ancestry keeps strict ancestors of a reported base from ever being
//! reported themselves, which is exactly the minimality requirement.

use grit_hash::ObjectId;
use grit_odb::ObjectReader;
use grit_utils::collections::PriorityQueue;

use crate::walk::{CommitIx, RevFlags, RevWalk};
use crate::RevWalkError;

/// Lazy generator of the minimal common ancestors of K starting commits.
pub struct MergeBaseGenerator<'w, 'r> {
    walk: &'w mut RevWalk<'r>,
    /// Newest committer time first; insertion order breaks ties.
    pending: PriorityQueue<(i64, CommitIx)>,
    branch_mask: RevFlags,
    /// With fewer than two inputs there is nothing to intersect; the
    /// inputs themselves are the answer.
    trivial: Option<Vec<CommitIx>>,
}

impl<'w, 'r> std::fmt::Debug for MergeBaseGenerator<'w, 'r> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeBaseGenerator").finish_non_exhaustive()
    }
}

impl<'w, 'r> MergeBaseGenerator<'w, 'r> {
    /// Prepare a generator over the given starting commits.
    ///
    /// One pool bit per start is allocated, marked, and released back to
    /// the pool before this returns; the bits keep their meaning for the
    /// duration of this generator. Admitting the same commit twice is
    /// state corruption and fails.
    pub fn new(
        walk: &'w mut RevWalk<'r>,
        starts: &[ObjectId],
    ) -> Result<Self, RevWalkError> {
        let mut pending = PriorityQueue::new(|a: &(i64, CommitIx), b: &(i64, CommitIx)| {
            b.0.cmp(&a.0)
        });

        if starts.len() < 2 {
            let trivial = starts.iter().map(|&oid| walk.lookup(oid)).collect();
            return Ok(Self {
                walk,
                pending,
                branch_mask: RevFlags::empty(),
                trivial: Some(trivial),
            });
        }

        let mut branch_mask = RevFlags::empty();
        let mut allocated = Vec::with_capacity(starts.len());
        for &oid in starts {
            let ix = walk.lookup(oid);
            if walk.flags(ix).intersects(branch_mask) {
                return Err(RevWalkError::DuplicateStart(oid));
            }
            walk.parse(ix)?;
            let bit = walk.alloc_flag();
            allocated.push(bit);
            branch_mask |= bit;
            walk.add_flags(ix, bit | RevFlags::IN_QUEUE);
            pending.put((walk.node(ix).commit_time, ix));
        }
        // The bits stay meaningful within this generator; the pool may
        // hand them out again only after the walk resets.
        for bit in allocated {
            walk.release_flag(bit);
        }

        Ok(Self {
            walk,
            pending,
            branch_mask,
            trivial: None,
        })
    }

    /// Produce the next merge base, or `None` when there are no more.
    pub fn next(&mut self) -> Result<Option<ObjectId>, RevWalkError> {
        if let Some(trivial) = &mut self.trivial {
            return Ok(trivial.pop().map(|ix| self.walk.node(ix).oid));
        }

        loop {
            let Some((_, c)) = self.pending.get() else {
                return Ok(None);
            };

            // Admit parents to the queue before any carry, so the carry
            // below always lands on parsed nodes.
            let parents = self.walk.node(c).parents.clone();
            for p in parents {
                if self.walk.has_flags(p, RevFlags::IN_QUEUE) {
                    continue;
                }
                self.walk.parse(p)?;
                self.walk.add_flags(p, RevFlags::IN_QUEUE);
                self.pending.put((self.walk.node(p).commit_time, p));
            }

            let carry = self.walk.flags(c) & self.branch_mask;
            let is_base = carry == self.branch_mask;
            let carried = if is_base {
                carry | RevFlags::MERGE_BASE
            } else {
                carry
            };
            self.carry_onto_history(c, carried)?;

            if self.walk.has_flags(c, RevFlags::MERGE_BASE) {
                // A previous propagation marked this commit: it is a
                // strict ancestor of an already-reported base. When every
                // queued commit is in the same position, nothing further
                // can be a base.
                let walk = &self.walk;
                if self
                    .pending
                    .iter()
                    .all(|&(_, ix)| walk.has_flags(ix, RevFlags::MERGE_BASE))
                {
                    return Ok(None);
                }
                continue;
            }

            self.walk.add_flags(c, RevFlags::POPPED);
            if is_base {
                self.walk.add_flags(c, RevFlags::MERGE_BASE);
                return Ok(Some(self.walk.node(c).oid));
            }
        }
    }

    /// Propagate `carry` down the parsed ancestry of `from`, stopping
    /// wherever a commit already holds all the carried bits.
    fn carry_onto_history(
        &mut self,
        from: CommitIx,
        carry: RevFlags,
    ) -> Result<(), RevWalkError> {
        if carry.is_empty() {
            return Ok(());
        }
        let mut stack = vec![from];
        while let Some(ix) = stack.pop() {
            let parents = self.walk.node(ix).parents.clone();
            for p in parents {
                let old = self.walk.flags(p);
                if old.contains(carry) {
                    continue;
                }
                self.walk.add_flags(p, carry);

                // Recarry: a commit popped before it had the full mask
                // just became a base. Re-inject it (its timestamp puts it
                // at the head of the queue) and paint its own history so
                // its ancestors can never be reported.
                let new = old | carry;
                if old.contains(RevFlags::POPPED)
                    && !old.contains(RevFlags::MERGE_BASE)
                    && !carry.contains(RevFlags::MERGE_BASE)
                    && (new & self.branch_mask) == self.branch_mask
                {
                    self.pending.put((self.walk.node(p).commit_time, p));
                    self.carry_onto_history(p, self.branch_mask | RevFlags::MERGE_BASE)?;
                }

                stack.push(p);
            }
        }
        Ok(())
    }
}

/// Compute all merge bases of the given commits through a fresh walk.
pub fn merge_bases(
    reader: &dyn ObjectReader,
    starts: &[ObjectId],
) -> Result<Vec<ObjectId>, RevWalkError> {
    let mut walk = RevWalk::new(reader);
    let mut generator = MergeBaseGenerator::new(&mut walk, starts)?;
    let mut bases = Vec::new();
    while let Some(oid) = generator.next()? {
        bases.push(oid);
    }
    Ok(bases)
}
