use std::cmp::Ordering;

type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering>;

/// An entry in the priority queue, tracking insertion order for stability.
#[derive(Debug)]
struct QueueEntry<T> {
    ctr: u64,
    data: T,
}

/// A stable binary-heap priority queue.
///
/// Mirrors C git's `prio_queue`: items that compare as `Less` are extracted
/// first, and items that compare equal come out in insertion order. Commit
/// traversal relies on the stability to keep sibling order deterministic.
pub struct PriorityQueue<T> {
    array: Vec<QueueEntry<T>>,
    compare: Comparator<T>,
    insertion_ctr: u64,
}

impl<T> PriorityQueue<T> {
    /// Create a queue with a comparison function. Items that compare as
    /// `Less` are extracted first.
    pub fn new(compare: impl Fn(&T, &T) -> Ordering + 'static) -> Self {
        Self {
            array: Vec::new(),
            compare: Box::new(compare),
            insertion_ctr: 0,
        }
    }

    /// Compare two entries, falling back to insertion order on ties.
    fn compare_entries(&self, i: usize, j: usize) -> Ordering {
        let result = (self.compare)(&self.array[i].data, &self.array[j].data);
        if result != Ordering::Equal {
            return result;
        }
        self.array[i].ctr.cmp(&self.array[j].ctr)
    }

    /// Add an item to the queue.
    pub fn put(&mut self, thing: T) {
        let ctr = self.insertion_ctr;
        self.insertion_ctr += 1;
        self.array.push(QueueEntry { ctr, data: thing });

        // Bubble up
        let mut ix = self.array.len() - 1;
        while ix > 0 {
            let parent = (ix - 1) / 2;
            if self.compare_entries(parent, ix) != Ordering::Greater {
                break;
            }
            self.array.swap(parent, ix);
            ix = parent;
        }
    }

    /// Extract the highest-priority item (smallest per comparator).
    pub fn get(&mut self) -> Option<T> {
        let len = self.array.len();
        if len == 0 {
            return None;
        }
        if len == 1 {
            return Some(self.array.pop().unwrap().data);
        }

        self.array.swap(0, len - 1);
        let result = self.array.pop().unwrap().data;
        self.sift_down_root();
        Some(result)
    }

    /// Peek at the highest-priority item without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.array.first().map(|e| &e.data)
    }

    /// Visit every queued item in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.array.iter().map(|e| &e.data)
    }

    fn sift_down_root(&mut self) {
        let mut ix = 0;
        loop {
            let left = ix * 2 + 1;
            if left >= self.array.len() {
                break;
            }
            let right = left + 1;
            let child = if right < self.array.len()
                && self.compare_entries(left, right) != Ordering::Less
            {
                right
            } else {
                left
            };

            if self.compare_entries(ix, child) != Ordering::Greater {
                break;
            }

            self.array.swap(child, ix);
            ix = child;
        }
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Remove all items.
    pub fn clear(&mut self) {
        self.array.clear();
        self.insertion_ctr = 0;
    }
}
