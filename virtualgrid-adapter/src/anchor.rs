use core::fmt;

/// A focus anchor that keeps the focused row (by id) in place across a re-derivation.
///
/// Typical use cases:
/// - a re-sort that moves the focused row to another position on the page
/// - a reload that inserts or removes rows above the focused one
#[derive(Clone, PartialEq, Eq)]
pub struct FocusAnchor<K> {
    pub row_id: K,
    pub col: usize,
    /// The distance from the viewport's scroll offset to the anchor row's start.
    pub offset_in_viewport: u64,
}

impl<K: fmt::Debug> fmt::Debug for FocusAnchor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FocusAnchor")
            .field("row_id", &self.row_id)
            .field("col", &self.col)
            .field("offset_in_viewport", &self.offset_in_viewport)
            .finish()
    }
}

impl<K> FocusAnchor<K>
where
    K: core::hash::Hash + Eq + Clone,
{
    /// Captures the focused row of the current page.
    ///
    /// Returns `None` when nothing is focused (empty page or no visible columns).
    pub fn capture<R, F>(grid: &virtualgrid::GridStateController<R, K, F>) -> Option<Self>
    where
        F: Clone + PartialEq,
    {
        let position = grid.focus().position();
        let row_id = grid.focused_row_id()?;
        if grid.focus().bounds().col_count == 0 {
            return None;
        }
        let start = grid.window().row_start(position.row)?;
        Some(Self {
            row_id,
            col: position.col,
            offset_in_viewport: start.saturating_sub(grid.window().scroll_offset()),
        })
    }

    /// Re-focuses the anchored row wherever it now sits on the page and restores its distance
    /// from the top of the viewport.
    ///
    /// Returns `false` when the row is no longer on the current page.
    pub fn apply<R, F>(&self, grid: &mut virtualgrid::GridStateController<R, K, F>) -> bool
    where
        F: Clone + PartialEq,
    {
        let Some(index) = grid.page_row_ids().iter().position(|id| *id == self.row_id) else {
            return false;
        };
        let Some(start) = grid.window().row_start(index) else {
            return false;
        };
        grid.set_focus(index, self.col);
        let viewport = grid.window().viewport_height();
        grid.on_scroll(start.saturating_sub(self.offset_in_viewport), viewport);
        true
    }
}
