use std::collections::{BTreeMap, BTreeSet};

/// Vacated single-element indices. The lowest free index is reused first.
#[derive(Debug, Default, Clone)]
pub struct FreeSlots {
    free: BTreeSet<u32>,
}

impl FreeSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&mut self) -> Option<u32> {
        self.free.pop_first()
    }

    /// Returns false if the index was already free.
    pub fn push(&mut self, index: u32) -> bool {
        self.free.insert(index)
    }

    pub fn truncate(&mut self, len: u32) {
        self.free.split_off(&len);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn contains(&self, index: u32) -> bool {
        self.free.contains(&index)
    }
}

/// A contiguous run of free elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub first: u32,
    pub size: u32,
}

impl FreeBlock {
    pub fn end(&self) -> u32 {
        self.first + self.size
    }
}

/// Free regions of a multi-element arena, keyed by their first element.
///
/// Blocks never overlap and never touch: a release merges with both
/// neighbours, and a block reaching the filled end is handed back to the
/// unfilled tail instead of being tracked.
#[derive(Debug, Default, Clone)]
pub struct FreeBlocks {
    blocks: BTreeMap<u32, u32>,
}

impl FreeBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best fit: an exact match wins, otherwise the smallest block that is
    /// large enough, split so the remainder stays free.
    pub fn allocate(&mut self, size: u32) -> Option<u32> {
        if size == 0 {
            return None;
        }

        let mut best: Option<(u32, u32)> = None;
        for (&first, &block_size) in &self.blocks {
            if block_size == size {
                best = Some((first, block_size));
                break;
            }
            if block_size > size && best.map_or(true, |(_, s)| block_size < s) {
                best = Some((first, block_size));
            }
        }

        let (first, block_size) = best?;
        self.blocks.remove(&first);
        if block_size > size {
            self.blocks.insert(first + size, block_size - size);
        }
        Some(first)
    }

    /// Frees `[first, first + size)` and coalesces it with adjacent free
    /// blocks. `filled` shrinks when the merged block ends at it.
    ///
    /// Returns false, leaving everything untouched, if the range overlaps a
    /// free block or lies past `filled`.
    pub fn release(&mut self, first: u32, size: u32, filled: &mut u32) -> bool {
        if size == 0 {
            return true;
        }
        let end = first + size;
        if end > *filled {
            return false;
        }

        let prev = self
            .blocks
            .range(..=first)
            .next_back()
            .map(|(&f, &s)| FreeBlock { first: f, size: s });
        let next = self
            .blocks
            .range(first..)
            .next()
            .map(|(&f, &s)| FreeBlock { first: f, size: s });

        if prev.is_some_and(|p| p.end() > first) || next.is_some_and(|n| n.first < end) {
            return false;
        }

        let mut merged = FreeBlock { first, size };
        if let Some(p) = prev.filter(|p| p.end() == first) {
            self.blocks.remove(&p.first);
            merged = FreeBlock {
                first: p.first,
                size: p.size + merged.size,
            };
        }
        if let Some(n) = next.filter(|n| n.first == end) {
            self.blocks.remove(&n.first);
            merged.size += n.size;
        }

        if merged.end() == *filled {
            *filled = merged.first;
        } else {
            self.blocks.insert(merged.first, merged.size);
        }
        true
    }

    /// Drops free space at or past `len` and returns the filled length
    /// after folding a trailing free block into the tail.
    pub fn truncate(&mut self, len: u32) -> u32 {
        self.blocks.split_off(&len);
        match self.blocks.iter().next_back().map(|(&f, &s)| (f, s)) {
            Some((first, size)) if first + size >= len => {
                self.blocks.remove(&first);
                first
            }
            _ => len,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = FreeBlock> + '_ {
        self.blocks
            .iter()
            .map(|(&first, &size)| FreeBlock { first, size })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
