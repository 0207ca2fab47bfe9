/// Prefix sums over row heights (binary indexed tree).
///
/// Supports point updates and "which row contains this offset" queries in O(log n), which keeps
/// measured-height windows usable for very large row counts.
#[derive(Clone, Debug, Default)]
pub(crate) struct HeightTree {
    tree: Vec<u64>, // 1-indexed
    total: u64,
    top_bit: usize,
}

impl HeightTree {
    pub(crate) fn from_heights(heights: &[u32]) -> Self {
        let n = heights.len();
        let mut tree = vec![0u64; n + 1];
        let mut total = 0u64;
        for i in 1..=n {
            let h = heights[i - 1] as u64;
            total = total.saturating_add(h);
            tree[i] = tree[i].saturating_add(h);
            let parent = i + low_bit(i);
            if parent <= n {
                tree[parent] = tree[parent].saturating_add(tree[i]);
            }
        }
        Self {
            tree,
            total,
            top_bit: top_bit(n),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tree.len().saturating_sub(1)
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    /// Adds `delta` to the height of row `index`.
    pub(crate) fn add(&mut self, index: usize, delta: i64) {
        if delta == 0 || index >= self.len() {
            return;
        }
        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] = apply_delta(self.tree[i], delta);
            i += low_bit(i);
        }
        self.total = apply_delta(self.total, delta);
    }

    /// Sum of the heights of rows `0..index`.
    pub(crate) fn prefix(&self, index: usize) -> u64 {
        let mut i = index.min(self.len());
        let mut sum = 0u64;
        while i > 0 {
            sum = sum.saturating_add(self.tree[i]);
            i -= low_bit(i);
        }
        sum
    }

    /// Number of leading rows whose cumulative height is `<= offset`.
    ///
    /// For an offset inside the list this is the index of the row containing it.
    pub(crate) fn rows_within(&self, offset: u64) -> usize {
        let n = self.len();
        let mut pos = 0usize;
        let mut remaining = offset;
        let mut step = self.top_bit;
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= remaining {
                remaining -= self.tree[next];
                pos = next;
            }
            step >>= 1;
        }
        pos
    }
}

fn low_bit(i: usize) -> usize {
    i & i.wrapping_neg()
}

fn top_bit(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1usize << (usize::BITS - 1 - n.leading_zeros())
    }
}

fn apply_delta(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}
