use std::collections::HashMap;
use std::rc::Rc;

/// Edge length of the square DEM blocks kept in the cache
pub const CACHE_BLOCK_SIZE: usize = 64;

/// Number of blocks kept by an [`ElevationSource`](super::ElevationSource)
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Pack block coordinates into a cache key
pub fn block_key(block_row: usize, block_col: usize) -> u64 {
    ((block_row as u64) << 32) | (block_col as u64 & 0xffff_ffff)
}

struct Slot {
    key: u64,
    block: Rc<[f64]>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity least-recently-used cache of DEM blocks.
///
/// Entries live in an arena of slots linked into a recency list (head is the
/// most recent); eviction reuses the tail slot in place.
pub struct BlockCache {
    capacity: usize,
    index: HashMap<u64, usize>,
    slots: Vec<Slot>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: u64) -> bool {
        self.index.contains_key(&key)
    }

    /// Look up a block and mark it most recently used
    pub fn get(&mut self, key: u64) -> Option<Rc<[f64]>> {
        let idx = *self.index.get(&key)?;
        self.unlink(idx);
        self.push_front(idx);
        Some(Rc::clone(&self.slots[idx].block))
    }

    /// Insert a block, evicting the least recently used one when full
    pub fn insert(&mut self, key: u64, block: Rc<[f64]>) {
        if let Some(&idx) = self.index.get(&key) {
            self.slots[idx].block = block;
            self.unlink(idx);
            self.push_front(idx);
            return;
        }

        let idx = if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                key,
                block,
                prev: None,
                next: None,
            });
            self.slots.len() - 1
        } else {
            let Some(idx) = self.tail else {
                return;
            };
            self.unlink(idx);
            let slot = &mut self.slots[idx];
            self.index.remove(&slot.key);
            slot.key = key;
            slot.block = block;
            idx
        };

        self.index.insert(key, idx);
        self.push_front(idx);
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.head = None;
        self.tail = None;
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);

        match prev {
            Some(p) => self.slots[p].next = next,
            None if self.head == Some(idx) => self.head = next,
            None => {}
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None if self.tail == Some(idx) => self.tail = prev,
            None => {}
        }

        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;
        if let Some(h) = self.head {
            self.slots[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}
