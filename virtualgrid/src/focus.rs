use crate::FocusPosition;

/// Keyboard navigation inputs understood by [`GridFocusController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NavKey {
    Left,
    Right,
    Up,
    Down,
    /// First cell of the current row.
    Home,
    /// Last cell of the current row.
    End,
    PageUp,
    PageDown,
    /// First cell of the first loaded row (`Ctrl+Home`).
    GridStart,
    /// Last cell of the last loaded row (`Ctrl+End`).
    GridEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PageDirection {
    Previous,
    Next,
}

/// What a navigation input did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavOutcome {
    Moved(FocusPosition),
    /// The input had no effect (e.g. `Left` in the first column).
    Unchanged,
    /// Focus would leave the loaded rows. The caller decides whether to load the adjacent page
    /// and then calls [`GridFocusController::reseed_after_crossing`].
    BoundaryCrossed {
        direction: PageDirection,
        col: usize,
    },
    /// `PageUp`/`PageDown`: the caller replaces the current page and then calls
    /// [`GridFocusController::reseed`] with `row_offset`.
    PageRequested {
        direction: PageDirection,
        row_offset: usize,
        col: usize,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridBounds {
    pub row_count: usize,
    pub col_count: usize,
}

/// Roving-tabindex cursor over the loaded rows and visible columns.
///
/// Exactly one cell is focusable at a time. The position is always clamped to the current
/// bounds; with zero rows or columns it rests at `0`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridFocusController {
    position: FocusPosition,
    bounds: GridBounds,
}

impl GridFocusController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(row_count: usize, col_count: usize) -> Self {
        let mut focus = Self::new();
        focus.set_bounds(row_count, col_count);
        focus
    }

    pub fn position(&self) -> FocusPosition {
        self.position
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    /// `true` only for the focused cell (the one carrying `tabindex=0`).
    pub fn is_focusable(&self, row: usize, col: usize) -> bool {
        !self.is_empty() && self.position == FocusPosition::new(row, col)
    }

    fn is_empty(&self) -> bool {
        self.bounds.row_count == 0 || self.bounds.col_count == 0
    }

    pub fn set_bounds(&mut self, row_count: usize, col_count: usize) {
        self.bounds = GridBounds {
            row_count,
            col_count,
        };
        self.position = self.clamp(self.position.row, self.position.col);
    }

    /// Moves focus to `(row, col)`, clamped silently into bounds.
    pub fn set_position(&mut self, row: usize, col: usize) {
        let clamped = self.clamp(row, col);
        if clamped != FocusPosition::new(row, col) {
            gtrace!(row, col, "focus position clamped");
        }
        self.position = clamped;
    }

    /// Re-places focus at `row_offset` within freshly loaded rows, keeping the column.
    pub fn reseed(&mut self, row_offset: usize) {
        self.set_position(row_offset, self.position.col);
    }

    /// Re-places focus after a boundary crossing was resolved by loading the adjacent page:
    /// the last row when moving back, the first row when moving forward.
    pub fn reseed_after_crossing(&mut self, direction: PageDirection) {
        let row = match direction {
            PageDirection::Previous => self.bounds.row_count.saturating_sub(1),
            PageDirection::Next => 0,
        };
        self.set_position(row, self.position.col);
    }

    pub fn navigate(&mut self, key: NavKey) -> NavOutcome {
        if self.is_empty() {
            return NavOutcome::Unchanged;
        }
        let FocusPosition { row, col } = self.position;
        let last_row = self.bounds.row_count - 1;
        let last_col = self.bounds.col_count - 1;

        match key {
            NavKey::Left if col == 0 => NavOutcome::Unchanged,
            NavKey::Left => self.move_to(row, col - 1),
            NavKey::Right if col >= last_col => NavOutcome::Unchanged,
            NavKey::Right => self.move_to(row, col + 1),
            NavKey::Up if row == 0 => NavOutcome::BoundaryCrossed {
                direction: PageDirection::Previous,
                col,
            },
            NavKey::Up => self.move_to(row - 1, col),
            NavKey::Down if row >= last_row => NavOutcome::BoundaryCrossed {
                direction: PageDirection::Next,
                col,
            },
            NavKey::Down => self.move_to(row + 1, col),
            NavKey::Home => self.move_to(row, 0),
            NavKey::End => self.move_to(row, last_col),
            NavKey::GridStart => self.move_to(0, 0),
            NavKey::GridEnd => self.move_to(last_row, last_col),
            NavKey::PageUp => NavOutcome::PageRequested {
                direction: PageDirection::Previous,
                row_offset: row,
                col,
            },
            NavKey::PageDown => NavOutcome::PageRequested {
                direction: PageDirection::Next,
                row_offset: row,
                col,
            },
        }
    }

    fn move_to(&mut self, row: usize, col: usize) -> NavOutcome {
        let next = FocusPosition::new(row, col);
        if next == self.position {
            return NavOutcome::Unchanged;
        }
        self.position = next;
        NavOutcome::Moved(next)
    }

    fn clamp(&self, row: usize, col: usize) -> FocusPosition {
        FocusPosition {
            row: row.min(self.bounds.row_count.saturating_sub(1)),
            col: col.min(self.bounds.col_count.saturating_sub(1)),
        }
    }
}
