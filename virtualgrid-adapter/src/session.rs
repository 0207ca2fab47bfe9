use std::hash::Hash;

use virtualgrid::{
    FetchApply, FocusSeed, GridStateController, NavOutcome, PageDirection, SelectAllOutcome,
    SelectAllScope,
};

use crate::{FocusAnchor, GridCommand, KeyInput, KeyMap};

/// A framework-neutral session that wraps a [`GridStateController`] and provides common
/// adapter workflows (key handling, page turns, focus anchoring, fetch driving).
///
/// This type does not hold any UI objects. Adapters drive it by calling:
/// - `handle_key` / `apply` for user input, `on_scroll` for scroll events
/// - `tick(now_ms)` each frame/timer tick (debounced filter fetches, preference saves)
/// - `drive().await` after any call that may have issued a remote request
pub struct GridSession<R, K, F> {
    grid: GridStateController<R, K, F>,
    keymap: KeyMap,
    anchor: Option<FocusAnchor<K>>,
}

impl<R, K, F> GridSession<R, K, F>
where
    K: Hash + Eq + Clone,
    F: Clone + PartialEq,
{
    pub fn new(grid: GridStateController<R, K, F>) -> Self {
        Self {
            grid,
            keymap: KeyMap::default(),
            anchor: None,
        }
    }

    pub fn with_keymap(mut self, keymap: KeyMap) -> Self {
        self.keymap = keymap;
        self
    }

    pub fn grid(&self) -> &GridStateController<R, K, F> {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut GridStateController<R, K, F> {
        &mut self.grid
    }

    pub fn into_grid(self) -> GridStateController<R, K, F> {
        self.grid
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn keymap_mut(&mut self) -> &mut KeyMap {
        &mut self.keymap
    }

    /// Resolves a key press through the key map and applies it.
    ///
    /// Returns `true` when the key was bound and changed something.
    pub fn handle_key(&mut self, input: KeyInput, now_ms: u64) -> bool {
        match self.keymap.resolve(input) {
            Some(command) => self.apply(command, now_ms),
            None => false,
        }
    }

    /// Applies a command. Boundary crossings and page keys turn the page, with focus landing
    /// on the adjacent row (crossing) or the same row offset (page keys).
    pub fn apply(&mut self, command: GridCommand, now_ms: u64) -> bool {
        match command {
            GridCommand::Navigate(key) => match self.grid.navigate(key) {
                NavOutcome::Moved(_) => true,
                NavOutcome::Unchanged => false,
                NavOutcome::BoundaryCrossed { direction, .. } => {
                    self.turn_page(direction, FocusSeed::AfterCrossing(direction), now_ms)
                }
                NavOutcome::PageRequested {
                    direction,
                    row_offset,
                    ..
                } => self.turn_page(direction, FocusSeed::Row(row_offset), now_ms),
            },
            GridCommand::ToggleRowSelection => match self.grid.focused_row_id() {
                Some(id) => self.grid.toggle_row(id),
                None => false,
            },
            GridCommand::ExtendSelection => match self.grid.focused_row_id() {
                Some(id) => self.grid.extend_selection(id),
                None => false,
            },
            GridCommand::SelectPage => matches!(
                self.grid.select_all(SelectAllScope::Page),
                SelectAllOutcome::Applied(n) if n > 0
            ),
            GridCommand::ClearSelection => self.grid.clear_selection(),
        }
    }

    /// Moves one page in `direction`. Returns `false` at the first or last page.
    pub fn turn_page(&mut self, direction: PageDirection, seed: FocusSeed, now_ms: u64) -> bool {
        let current = self.grid.pagination().page_index;
        let target = match direction {
            PageDirection::Previous => current.checked_sub(1),
            PageDirection::Next => Some(current + 1).filter(|&p| p < self.grid.page_count()),
        };
        let Some(target) = target else {
            atrace!(current, ?direction, "no page to turn to");
            return false;
        };
        self.grid.go_to_page(target, seed, now_ms)
    }

    /// Scroll event from the host. Focus that scrolled out of the viewport moves to the
    /// nearest visible row. Returns whether focus moved.
    pub fn on_scroll(&mut self, scroll_offset: u64, viewport_height: u32) -> bool {
        self.grid.on_scroll(scroll_offset, viewport_height);
        let visible = self.grid.window().visible_range();
        if visible.is_empty() {
            return false;
        }
        let pos = self.grid.focus().position();
        let row = pos.row.clamp(visible.start_index, visible.end_index - 1);
        if row == pos.row {
            return false;
        }
        atrace!(from = pos.row, to = row, "focus follows scroll");
        self.grid.set_focus(row, pos.col);
        true
    }

    /// Runs `f` while keeping focus on the same row id.
    ///
    /// In local mode the anchor is re-applied right away. In remote mode it is held until
    /// [`Self::drive`] applies the next page.
    pub fn keep_focus<T>(&mut self, f: impl FnOnce(&mut GridStateController<R, K, F>) -> T) -> T {
        let anchor = FocusAnchor::capture(&self.grid);
        let out = f(&mut self.grid);
        match anchor {
            Some(anchor) if self.grid.has_fetch_job() => self.anchor = Some(anchor),
            Some(anchor) => {
                if !anchor.apply(&mut self.grid) {
                    atrace!("anchored row left the page");
                }
            }
            None => {}
        }
        out
    }

    /// Header click that keeps the focused row focused after re-sorting.
    pub fn toggle_sort(&mut self, column_id: &str, multi: bool, now_ms: u64) -> bool {
        self.keep_focus(|grid| grid.toggle_sort(column_id, multi, now_ms))
    }

    /// Advances debounced work. Returns whether anything happened.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        self.grid.tick(now_ms)
    }

    /// Awaits every fetch job the grid has handed out, applying each completion. Returns the
    /// outcome of the last one, or `None` when there was nothing to do.
    pub async fn drive(&mut self) -> Option<FetchApply> {
        let mut last = None;
        while let Some(job) = self.grid.take_fetch_job() {
            let completion = job.run().await;
            let applied = self.grid.complete_fetch(completion);
            match applied {
                FetchApply::Applied => {
                    if let Some(anchor) = self.anchor.take() {
                        anchor.apply(&mut self.grid);
                    }
                }
                FetchApply::Failed => {
                    awarn!("remote page failed to load");
                }
                FetchApply::Stale | FetchApply::Cancelled => {}
            }
            last = Some(applied);
        }
        last
    }

    /// Tears the session down, cancelling any in-flight request.
    pub fn dispose(&mut self) {
        self.anchor = None;
        self.grid.dispose();
    }
}

impl<R, K, F> core::fmt::Debug for GridSession<R, K, F>
where
    K: core::fmt::Debug,
    F: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GridSession")
            .field("grid", &self.grid)
            .field("keymap", &self.keymap.len())
            .field("anchor", &self.anchor)
            .finish()
    }
}
