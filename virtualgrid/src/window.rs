use crate::heights::HeightTree;
use crate::{Align, VisibleRange};

/// Computes the rows to render for a list of uniformly sized rows.
///
/// The result covers every row intersecting `[scroll_offset, scroll_offset + viewport_height)`,
/// widened by `overscan` rows on each side and clamped to `[0, row_count)`. The scroll offset is
/// clamped to the scrollable extent first, so an offset past the end still yields the last
/// screenful. Zero rows, a zero-height viewport or zero-height rows yield an empty range.
pub fn compute_visible_range(
    scroll_offset: u64,
    viewport_height: u32,
    row_height: u32,
    row_count: usize,
    overscan: usize,
) -> VisibleRange {
    if row_count == 0 || viewport_height == 0 || row_height == 0 {
        return VisibleRange::EMPTY;
    }

    let row_height = row_height as u64;
    let view = viewport_height as u64;
    let total = row_height.saturating_mul(row_count as u64);
    let offset = scroll_offset.min(total.saturating_sub(view));

    let first = ((offset / row_height) as usize).min(row_count - 1);
    let last = ((offset.saturating_add(view - 1) / row_height) as usize).min(row_count - 1);

    widen(first, last + 1, overscan, row_count)
}

fn widen(start: usize, end: usize, overscan: usize, row_count: usize) -> VisibleRange {
    VisibleRange {
        start_index: start.saturating_sub(overscan),
        end_index: end.saturating_add(overscan).min(row_count),
    }
}

/// Configuration for [`RowWindow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowOptions {
    /// Estimated row height, used for every row that has not been measured.
    pub row_height: u32,
    /// Extra rows rendered above and below the viewport.
    pub overscan: usize,
    pub viewport_height: u32,
}

impl WindowOptions {
    pub fn new(row_height: u32) -> Self {
        Self {
            row_height,
            overscan: 5,
            viewport_height: 0,
        }
    }

    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    pub fn with_viewport_height(mut self, viewport_height: u32) -> Self {
        self.viewport_height = viewport_height;
        self
    }
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self::new(32)
    }
}

/// Scroll state of the row viewport.
///
/// Rows start at the estimated height. Once any row is measured, the window switches to a
/// prefix-sum index over per-row heights; measurements are dropped whenever the row count is
/// reset, since a new derivation may put different rows at the same indexes.
#[derive(Clone, Debug)]
pub struct RowWindow {
    options: WindowOptions,
    row_count: usize,
    scroll_offset: u64,
    heights: Vec<u32>,
    measured: Vec<bool>,
    tree: Option<HeightTree>,
}

impl RowWindow {
    pub fn new(options: WindowOptions) -> Self {
        Self {
            options,
            row_count: 0,
            scroll_offset: 0,
            heights: Vec::new(),
            measured: Vec::new(),
            tree: None,
        }
    }

    pub fn options(&self) -> &WindowOptions {
        &self.options
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Resets the window to `row_count` rows, dropping measurements and clamping the scroll
    /// offset to the new extent.
    pub fn set_row_count(&mut self, row_count: usize) {
        gtrace!(row_count, "RowWindow::set_row_count");
        self.row_count = row_count;
        self.drop_measurements();
        self.scroll_offset = self.clamp_scroll_offset(self.scroll_offset);
    }

    pub fn set_row_height(&mut self, row_height: u32) {
        if self.options.row_height == row_height {
            return;
        }
        self.options.row_height = row_height;
        self.drop_measurements();
    }

    pub fn set_overscan(&mut self, overscan: usize) {
        self.options.overscan = overscan;
    }

    pub fn viewport_height(&self) -> u32 {
        self.options.viewport_height
    }

    pub fn set_viewport_height(&mut self, viewport_height: u32) {
        self.options.viewport_height = viewport_height;
    }

    pub fn scroll_offset(&self) -> u64 {
        self.scroll_offset
    }

    pub fn set_scroll_offset(&mut self, offset: u64) {
        self.scroll_offset = offset;
    }

    pub fn set_scroll_offset_clamped(&mut self, offset: u64) {
        self.scroll_offset = self.clamp_scroll_offset(offset);
    }

    /// Applies a scroll event from the UI layer: viewport size and offset together.
    pub fn apply_scroll(&mut self, offset: u64, viewport_height: u32) {
        self.options.viewport_height = viewport_height;
        self.set_scroll_offset_clamped(offset);
    }

    /// Records the rendered height of a row. Returns the change against the previous height.
    pub fn measure(&mut self, index: usize, height: u32) -> i64 {
        if index >= self.row_count {
            return 0;
        }
        if self.tree.is_none() {
            self.heights = vec![self.options.row_height; self.row_count];
            self.measured = vec![false; self.row_count];
            self.tree = Some(HeightTree::from_heights(&self.heights));
        }
        let prev = self.heights[index];
        self.measured[index] = true;
        if prev == height {
            return 0;
        }
        self.heights[index] = height;
        let delta = height as i64 - prev as i64;
        if let Some(tree) = self.tree.as_mut() {
            tree.add(index, delta);
        }
        delta
    }

    pub fn is_measured(&self, index: usize) -> bool {
        self.measured.get(index).copied().unwrap_or(false)
    }

    pub fn reset_measurements(&mut self) {
        self.drop_measurements();
        self.scroll_offset = self.clamp_scroll_offset(self.scroll_offset);
    }

    fn drop_measurements(&mut self) {
        self.heights.clear();
        self.measured.clear();
        self.tree = None;
    }

    pub fn row_height_at(&self, index: usize) -> Option<u32> {
        if index >= self.row_count {
            return None;
        }
        Some(
            self.heights
                .get(index)
                .copied()
                .unwrap_or(self.options.row_height),
        )
    }

    pub fn row_start(&self, index: usize) -> Option<u64> {
        (index < self.row_count).then(|| self.start_of(index))
    }

    pub fn row_end(&self, index: usize) -> Option<u64> {
        let start = self.row_start(index)?;
        Some(start.saturating_add(self.row_height_at(index)? as u64))
    }

    pub fn total_height(&self) -> u64 {
        match &self.tree {
            Some(tree) => tree.total(),
            None => (self.options.row_height as u64).saturating_mul(self.row_count as u64),
        }
    }

    pub fn max_scroll_offset(&self) -> u64 {
        self.total_height()
            .saturating_sub(self.options.viewport_height as u64)
    }

    pub fn clamp_scroll_offset(&self, offset: u64) -> u64 {
        offset.min(self.max_scroll_offset())
    }

    /// Index of the row containing `offset`, clamped to the last row.
    pub fn index_at_offset(&self, offset: u64) -> Option<usize> {
        if self.row_count == 0 {
            return None;
        }
        let index = match &self.tree {
            Some(tree) => tree.rows_within(offset),
            None if self.options.row_height == 0 => 0,
            None => (offset / self.options.row_height as u64) as usize,
        };
        Some(index.min(self.row_count - 1))
    }

    /// Rows intersecting the viewport (no overscan).
    pub fn visible_range(&self) -> VisibleRange {
        self.range_with(0)
    }

    /// Rows to render: the visible rows widened by the overscan.
    pub fn rendered_range(&self) -> VisibleRange {
        self.range_with(self.options.overscan)
    }

    fn range_with(&self, overscan: usize) -> VisibleRange {
        let view = self.options.viewport_height;
        if self.tree.is_none() {
            return compute_visible_range(
                self.scroll_offset,
                view,
                self.options.row_height,
                self.row_count,
                overscan,
            );
        }
        if self.row_count == 0 || view == 0 {
            return VisibleRange::EMPTY;
        }

        let offset = self.clamp_scroll_offset(self.scroll_offset);
        let last_px = offset.saturating_add(view as u64 - 1);
        let (Some(first), Some(last)) = (self.index_at_offset(offset), self.index_at_offset(last_px))
        else {
            return VisibleRange::EMPTY;
        };
        widen(first, last + 1, overscan, self.row_count)
    }

    /// Computes the scroll offset that brings row `index` into view with the given alignment.
    ///
    /// `Align::Auto` keeps the current offset when the row is already fully visible and
    /// otherwise scrolls the minimum distance.
    pub fn scroll_to_row_offset(&self, index: usize, align: Align) -> u64 {
        if self.row_count == 0 {
            return 0;
        }
        let index = index.min(self.row_count - 1);
        let start = self.start_of(index);
        let size = self.row_height_at(index).unwrap_or(0) as u64;
        let end = start.saturating_add(size);
        let view = self.options.viewport_height as u64;

        let target = match align {
            Align::Start => start,
            Align::End => end.saturating_sub(view),
            Align::Center => start.saturating_add(size / 2).saturating_sub(view / 2),
            Align::Auto => {
                let cur = self.scroll_offset;
                if start >= cur && end <= cur.saturating_add(view) {
                    cur
                } else if start < cur {
                    start
                } else {
                    end.saturating_sub(view)
                }
            }
        };
        self.clamp_scroll_offset(target)
    }

    /// Scrolls so that row `index` is in view. Returns the applied offset.
    pub fn scroll_to_row(&mut self, index: usize, align: Align) -> u64 {
        let offset = self.scroll_to_row_offset(index, align);
        self.scroll_offset = offset;
        offset
    }

    fn start_of(&self, index: usize) -> u64 {
        match &self.tree {
            Some(tree) => tree.prefix(index),
            None => (self.options.row_height as u64).saturating_mul(index as u64),
        }
    }
}
