//! Bucket priority queue over node ids `0..n` with small non-negative integer gains.

/// Every operation is O(1) except `pop_max`, which walks down from the highest gain seen.
///
/// Inside a bucket the most recently pushed item pops first.
#[derive(Debug, Clone, Default)]
pub struct BucketQueue {
    buckets: Vec<Vec<usize>>,
    gain: Vec<Option<usize>>,
    slot: Vec<usize>,
    top: usize,
    len: usize,
}

impl BucketQueue {
    pub fn new(n: usize) -> Self {
        Self {
            buckets: Vec::new(),
            gain: vec![None; n],
            slot: vec![0; n],
            top: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, item: usize) -> bool {
        self.gain[item].is_some()
    }

    pub fn gain(&self, item: usize) -> Option<usize> {
        self.gain[item]
    }

    /// Inserts `item`, replacing its gain if it is already queued.
    pub fn push(&mut self, item: usize, gain: usize) {
        self.remove(item);
        if self.buckets.len() <= gain {
            self.buckets.resize_with(gain + 1, Vec::new);
        }
        self.slot[item] = self.buckets[gain].len();
        self.buckets[gain].push(item);
        self.gain[item] = Some(gain);
        self.top = self.top.max(gain);
        self.len += 1;
    }

    /// Removes `item` and returns its gain.
    pub fn remove(&mut self, item: usize) -> Option<usize> {
        let gain = self.gain[item].take()?;
        let bucket = &mut self.buckets[gain];
        let slot = self.slot[item];
        bucket.swap_remove(slot);
        if let Some(&moved) = bucket.get(slot) {
            self.slot[moved] = slot;
        }
        self.len -= 1;
        Some(gain)
    }

    /// Adds `delta` to the gain of a queued item.
    pub fn increase(&mut self, item: usize, delta: usize) {
        if let Some(g) = self.gain[item] {
            self.push(item, g + delta);
        }
    }

    /// Removes and returns an item with the largest gain.
    pub fn pop_max(&mut self) -> Option<(usize, usize)> {
        if self.len == 0 {
            return None;
        }
        while self.buckets[self.top].is_empty() {
            self.top -= 1;
        }
        let gain = self.top;
        let item = *self.buckets[gain].last()?;
        self.remove(item);
        Some((item, gain))
    }
}
