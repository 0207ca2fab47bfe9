use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use crate::columns::{ColumnDescriptor, ColumnLayoutManager, ColumnLayoutState, LayoutChange};
use crate::events::{GridEvent, OnEventCallback, PaginationChangeCause, SelectionChangeReason};
use crate::fetch::{
    DataSource, FetchApply, FetchCompletion, FetchCoordinator, FetchErrorState, FetchJob,
    FetchParams, FetchRequest, FetchStatus, FetchTrigger,
};
use crate::focus::{GridBounds, GridFocusController, NavKey, NavOutcome, PageDirection};
use crate::options::{ControlledState, GridOptions, RowIdFn};
use crate::pipeline::{DerivedRowPipeline, DerivedRows};
use crate::selection::{
    PageSelection, SelectAllOutcome, SelectAllScope, SelectionManager, SelectionState,
};
use crate::window::RowWindow;
use crate::{Align, ColumnId, FilterState, FocusPosition, PaginationState, SortState, VisibleRange};

/// Where rows come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GridMode {
    /// Every row is held; filter, sort and paginate run synchronously.
    Local,
    /// Only the current page is held; changes go through the data source.
    Remote,
}

/// Where focus lands once a requested page is available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FocusSeed {
    /// Leave the focus position alone (clamped to the new bounds).
    #[default]
    Keep,
    /// Focus this row offset within the new page, keeping the column.
    Row(usize),
    /// The page was loaded to resolve a boundary crossing in `direction`.
    AfterCrossing(PageDirection),
}

/// Read-only view of everything a presentation layer renders.
#[derive(Clone, Debug)]
pub struct GridSnapshot<K, F> {
    pub mode: GridMode,
    pub sort: SortState,
    pub filters: FilterState<F>,
    pub pagination: PaginationState,
    pub page_count: usize,
    pub total_row_count: usize,
    pub page_row_ids: Vec<K>,
    pub selection: SelectionState<K>,
    pub page_selection: PageSelection,
    pub select_all_prompt: bool,
    pub column_layout: ColumnLayoutState,
    pub visible_columns: Vec<ColumnId>,
    pub focus: FocusPosition,
    pub bounds: GridBounds,
    pub visible_range: VisibleRange,
    pub rendered_range: VisibleRange,
    pub total_height: u64,
    pub fetch_status: FetchStatus,
    pub fetch_error: Option<FetchErrorState>,
}

/// The single owner of a grid's state.
///
/// Presentation code reads snapshots and calls intent methods (`toggle_sort`, `navigate`,
/// `resize_column`, ...). Every change funnels through here, and after each one the controller
/// re-derives rows (local mode) or issues a request (remote mode), then pushes the new row and
/// column counts to the focus controller and the row window.
///
/// Remote requests are not awaited by the controller. After an intent, take the pending job
/// with [`Self::take_fetch_job`], await [`FetchJob::run`] and hand the completion back to
/// [`Self::complete_fetch`]. Debounced work (filter fetches, preference saves) advances in
/// [`Self::tick`].
pub struct GridStateController<R, K, F> {
    get_row_id: RowIdFn<R, K>,
    pipeline: DerivedRowPipeline<R, F>,
    data_source: Option<Arc<dyn DataSource<R, F>>>,
    preserve_selection_on_filter: bool,
    controlled: ControlledState,
    on_event: Option<OnEventCallback<K, F>>,

    sort: SortState,
    filters: FilterState<F>,
    pagination: PaginationState,
    selection: SelectionManager<K>,
    columns: ColumnLayoutManager,
    focus: GridFocusController,
    window: RowWindow,

    rows: Vec<R>,
    derived: DerivedRows,
    fetch: Option<FetchCoordinator<R, F>>,
    job: Option<FetchJob<R>>,
    pending_seed: Option<FocusSeed>,

    batch_depth: usize,
    deferred: Option<(FetchTrigger, u64)>,
    disposed: bool,
}

impl<R, K, F> GridStateController<R, K, F>
where
    K: Hash + Eq + Clone,
    F: Clone + PartialEq,
{
    /// Builds the controller. In remote mode the initial request is issued right away and is
    /// available from [`Self::take_fetch_job`].
    pub fn new(options: GridOptions<R, K, F>) -> Self {
        let GridOptions {
            columns,
            get_row_id,
            pipeline,
            page_size,
            initial_sort,
            initial_filters,
            preserve_selection_on_filter,
            selection_mode,
            filter_debounce_ms,
            preferences_debounce_ms,
            preferences_key,
            preference_store,
            data_source,
            controlled,
            window,
            auto_fit_padding,
            on_event,
        } = options;

        let mut layout = ColumnLayoutManager::new(columns)
            .with_debounce_ms(preferences_debounce_ms)
            .with_auto_fit_padding(auto_fit_padding);
        if let (Some(store), Some(key)) = (preference_store, preferences_key) {
            layout = layout.with_store(store, key);
        }
        let fetch = data_source
            .as_ref()
            .map(|_| FetchCoordinator::new(filter_debounce_ms));

        gdebug!(
            remote = fetch.is_some(),
            columns = layout.columns().len(),
            page_size,
            "grid controller created"
        );

        let mut grid = Self {
            get_row_id,
            pipeline,
            data_source,
            preserve_selection_on_filter,
            controlled,
            on_event,
            sort: initial_sort,
            filters: initial_filters,
            pagination: PaginationState::new(page_size),
            selection: SelectionManager::new(selection_mode),
            columns: layout,
            focus: GridFocusController::new(),
            window: RowWindow::new(window),
            rows: Vec::new(),
            derived: DerivedRows::default(),
            fetch,
            job: None,
            pending_seed: None,
            batch_depth: 0,
            deferred: None,
            disposed: false,
        };
        grid.refresh(FetchTrigger::Initial, 0);
        grid
    }

    /// Local mode: starts with `rows`.
    pub fn with_rows(mut self, rows: Vec<R>) -> Self {
        self.set_rows(rows, 0);
        self
    }

    pub fn mode(&self) -> GridMode {
        if self.fetch.is_some() {
            GridMode::Remote
        } else {
            GridMode::Local
        }
    }

    pub fn is_remote(&self) -> bool {
        self.fetch.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn controlled(&self) -> ControlledState {
        self.controlled
    }

    pub fn sort(&self) -> &SortState {
        &self.sort
    }

    pub fn filters(&self) -> &FilterState<F> {
        &self.filters
    }

    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    pub fn selection(&self) -> &SelectionState<K> {
        self.selection.state()
    }

    pub fn columns(&self) -> &ColumnLayoutManager {
        &self.columns
    }

    pub fn focus(&self) -> &GridFocusController {
        &self.focus
    }

    pub fn window(&self) -> &RowWindow {
        &self.window
    }

    /// The remote-mode coordinator.
    pub fn fetch(&self) -> Option<&FetchCoordinator<R, F>> {
        self.fetch.as_ref()
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.fetch.as_ref().map_or(FetchStatus::Idle, |f| f.status())
    }

    pub fn fetch_error(&self) -> Option<&FetchErrorState> {
        self.fetch.as_ref().and_then(|f| f.error())
    }

    /// Raw local rows, in insertion order. Empty in remote mode.
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn row_id(&self, row: &R) -> K {
        (self.get_row_id)(row)
    }

    pub fn page_count(&self) -> usize {
        match &self.fetch {
            Some(fetch) => self.pagination.page_count.unwrap_or(fetch.page_count()).max(1),
            None => self.derived.page_count(),
        }
    }

    /// Rows matching the filters, across all pages.
    pub fn total_row_count(&self) -> usize {
        match &self.fetch {
            Some(fetch) => self
                .pagination
                .total_row_count
                .unwrap_or(fetch.total_row_count()),
            None => self.derived.filtered_count(),
        }
    }

    pub fn page_row_count(&self) -> usize {
        match &self.fetch {
            Some(fetch) => fetch.rows().len(),
            None => self.derived.page().len(),
        }
    }

    /// The row at `page_row` within the current page.
    pub fn row(&self, page_row: usize) -> Option<&R> {
        match &self.fetch {
            Some(fetch) => fetch.rows().get(page_row),
            None => self
                .derived
                .page()
                .get(page_row)
                .and_then(|&i| self.rows.get(i)),
        }
    }

    /// Rows of the current page, in display order.
    pub fn page_rows(&self) -> Vec<&R> {
        match &self.fetch {
            Some(fetch) => fetch.rows().iter().collect(),
            None => self
                .derived
                .page()
                .iter()
                .filter_map(|&i| self.rows.get(i))
                .collect(),
        }
    }

    pub fn page_row_ids(&self) -> Vec<K> {
        self.page_rows().into_iter().map(|r| self.row_id(r)).collect()
    }

    /// Ids in display order across every page that is materialized: the full filtered order in
    /// local mode, the current page in remote mode.
    pub fn row_order_ids(&self) -> Vec<K> {
        match &self.fetch {
            Some(_) => self.page_row_ids(),
            None => self
                .derived
                .order()
                .iter()
                .filter_map(|&i| self.rows.get(i))
                .map(|r| self.row_id(r))
                .collect(),
        }
    }

    /// Rows inside the window's rendered range, with their page-row index.
    pub fn rendered_rows(&self) -> Vec<(usize, &R)> {
        self.window
            .rendered_range()
            .indexes()
            .filter_map(|i| self.row(i).map(|r| (i, r)))
            .collect()
    }

    pub fn visible_column_ids(&self) -> Vec<ColumnId> {
        self.columns
            .visible_columns()
            .into_iter()
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn focused_row_id(&self) -> Option<K> {
        self.row(self.focus.position().row).map(|r| self.row_id(r))
    }

    pub fn focused_column(&self) -> Option<&ColumnDescriptor> {
        self.columns
            .visible_columns()
            .get(self.focus.position().col)
            .copied()
    }

    pub fn page_selection(&self) -> PageSelection {
        self.selection.page_status(&self.page_row_ids())
    }

    /// Whether to offer selecting every row of the dataset.
    pub fn select_all_prompt(&self) -> bool {
        self.selection
            .select_all_prompt(&self.page_row_ids(), self.total_row_count())
    }

    pub fn snapshot(&self) -> GridSnapshot<K, F> {
        let page_row_ids = self.page_row_ids();
        GridSnapshot {
            mode: self.mode(),
            sort: self.sort.clone(),
            filters: self.filters.clone(),
            pagination: self.pagination,
            page_count: self.page_count(),
            total_row_count: self.total_row_count(),
            page_selection: self.selection.page_status(&page_row_ids),
            select_all_prompt: self
                .selection
                .select_all_prompt(&page_row_ids, self.total_row_count()),
            page_row_ids,
            selection: self.selection.state().clone(),
            column_layout: self.columns.state().clone(),
            visible_columns: self.visible_column_ids(),
            focus: self.focus.position(),
            bounds: self.focus.bounds(),
            visible_range: self.window.visible_range(),
            rendered_range: self.window.rendered_range(),
            total_height: self.window.total_height(),
            fetch_status: self.fetch_status(),
            fetch_error: self.fetch_error().cloned(),
        }
    }

    // Sorting.

    /// Header click: cycles the column through ascending, descending and unsorted. With
    /// `multi` the column is added to (or updated in) the sort list instead of replacing it.
    /// Unknown and non-sortable columns are ignored.
    pub fn toggle_sort(&mut self, column_id: &str, multi: bool, now_ms: u64) -> bool {
        if !self.columns.column(column_id).is_some_and(|c| c.sortable) {
            gtrace!(column_id, "sort toggle on a non-sortable column ignored");
            return false;
        }
        let next = self.sort.toggled(column_id, multi);
        self.commit_sort(next, Some(column_id.to_owned()), now_ms)
    }

    /// Host commit of the sort. Emits nothing.
    pub fn set_sort(&mut self, sort: SortState, now_ms: u64) {
        if sort != self.sort {
            self.apply_sort(sort, now_ms);
        }
    }

    fn commit_sort(&mut self, next: SortState, column_id: Option<ColumnId>, now_ms: u64) -> bool {
        if next == self.sort {
            return false;
        }
        self.emit(GridEvent::SortChange {
            sort: next.clone(),
            column_id,
        });
        if !self.controlled.sort {
            self.apply_sort(next, now_ms);
        }
        true
    }

    fn apply_sort(&mut self, sort: SortState, now_ms: u64) {
        self.sort = sort;
        self.request_refresh(FetchTrigger::Sort, now_ms);
    }

    // Filtering.

    /// Sets (`Some`) or clears (`None`) a column filter. Ignored for unknown and non-filterable
    /// columns.
    pub fn set_column_filter(&mut self, column_id: &str, value: Option<F>, now_ms: u64) -> bool {
        if !self.columns.column(column_id).is_some_and(|c| c.filterable) {
            gtrace!(column_id, "filter on a non-filterable column ignored");
            return false;
        }
        let mut next = self.filters.clone();
        next.set(column_id, value);
        self.commit_filters(next, Some(column_id.to_owned()), now_ms)
    }

    pub fn set_global_filter(&mut self, text: impl Into<String>, now_ms: u64) -> bool {
        let mut next = self.filters.clone();
        next.set_global(text);
        self.commit_filters(next, None, now_ms)
    }

    pub fn clear_filters(&mut self, now_ms: u64) -> bool {
        self.commit_filters(FilterState::new(), None, now_ms)
    }

    /// Host commit of the filters. Emits nothing for the filters themselves, but the page
    /// reset and selection clear that follow a filter change are reported as usual.
    pub fn set_filters(&mut self, filters: FilterState<F>, now_ms: u64) {
        if filters != self.filters {
            self.apply_filters(filters, now_ms);
        }
    }

    fn commit_filters(
        &mut self,
        next: FilterState<F>,
        column_id: Option<ColumnId>,
        now_ms: u64,
    ) -> bool {
        if next == self.filters {
            return false;
        }
        self.emit(GridEvent::FilterChange {
            filters: next.clone(),
            column_id,
        });
        if !self.controlled.filters {
            self.apply_filters(next, now_ms);
        }
        true
    }

    fn apply_filters(&mut self, filters: FilterState<F>, now_ms: u64) {
        self.batch_update(move |grid| {
            grid.filters = filters;
            let first_page = grid.pagination.with_page_index(0);
            grid.commit_pagination(first_page, PaginationChangeCause::FilterReset, None, now_ms);
            if !grid.preserve_selection_on_filter {
                grid.commit_selection(SelectionState::new(), SelectionChangeReason::FilterChanged);
            }
            grid.request_refresh(FetchTrigger::Filter, now_ms);
        });
    }

    // Pagination.

    /// Moves to `page_index` (clamped to the known page count). `seed` says where focus lands
    /// once the page is available.
    pub fn go_to_page(&mut self, page_index: usize, seed: FocusSeed, now_ms: u64) -> bool {
        let page_index = page_index.min(self.page_count() - 1);
        let next = self.pagination.with_page_index(page_index);
        self.commit_pagination(next, PaginationChangeCause::User, Some(seed), now_ms)
    }

    pub fn next_page(&mut self, now_ms: u64) -> bool {
        let next = self.pagination.page_index.saturating_add(1);
        self.go_to_page(next, FocusSeed::Keep, now_ms)
    }

    pub fn previous_page(&mut self, now_ms: u64) -> bool {
        let prev = self.pagination.page_index.saturating_sub(1);
        self.go_to_page(prev, FocusSeed::Keep, now_ms)
    }

    /// Changes the page size, keeping the first row of the current page on screen.
    pub fn set_page_size(&mut self, page_size: usize, now_ms: u64) -> bool {
        let page_size = page_size.max(1);
        let next = PaginationState {
            page_index: self.pagination.first_row_index() / page_size,
            page_size,
            ..self.pagination
        };
        self.commit_pagination(next, PaginationChangeCause::PageSizeChanged, None, now_ms)
    }

    /// Host commit of the pagination. Emits nothing.
    pub fn set_pagination(&mut self, pagination: PaginationState, now_ms: u64) {
        let pagination = PaginationState {
            page_size: pagination.page_size.max(1),
            ..pagination
        };
        if pagination != self.pagination {
            self.apply_pagination(pagination, FetchTrigger::Pagination, now_ms);
        }
    }

    fn commit_pagination(
        &mut self,
        next: PaginationState,
        cause: PaginationChangeCause,
        seed: Option<FocusSeed>,
        now_ms: u64,
    ) -> bool {
        if next == self.pagination {
            return false;
        }
        self.emit(GridEvent::PaginationChange {
            pagination: next,
            cause,
        });
        if seed.is_some() {
            self.pending_seed = seed;
        }
        if !self.controlled.pagination {
            let trigger = match cause {
                PaginationChangeCause::FilterReset => FetchTrigger::Filter,
                _ => FetchTrigger::Pagination,
            };
            self.apply_pagination(next, trigger, now_ms);
        }
        true
    }

    fn apply_pagination(&mut self, pagination: PaginationState, trigger: FetchTrigger, now_ms: u64) {
        self.pagination = pagination;
        self.request_refresh(trigger, now_ms);
    }

    // Selection.

    pub fn toggle_row(&mut self, id: K) -> bool {
        self.update_selection(SelectionChangeReason::User, |sel| sel.toggle(id))
    }

    pub fn set_row_selected(&mut self, id: K, selected: bool) -> bool {
        self.update_selection(SelectionChangeReason::User, |sel| {
            sel.set_selected(id, selected)
        })
    }

    /// Shift-click: applies the anchor's state to every row between `anchor` and `id` in the
    /// current display order.
    pub fn range_select(&mut self, id: K, anchor: &K) -> bool {
        let order = self.row_order_ids();
        self.update_selection(SelectionChangeReason::User, |sel| {
            sel.range_select(id, anchor, &order)
        })
    }

    /// Range-selects from the last anchor (toggles when there is none).
    pub fn extend_selection(&mut self, id: K) -> bool {
        let order = self.row_order_ids();
        self.update_selection(SelectionChangeReason::User, |sel| sel.extend_to(id, &order))
    }

    /// Selects the current page or the whole dataset. A dataset-wide request in remote mode
    /// cannot be resolved locally: it emits [`GridEvent::SelectAllRequested`] instead.
    pub fn select_all(&mut self, scope: SelectAllScope) -> SelectAllOutcome {
        let ids = match (scope, self.is_remote()) {
            (SelectAllScope::Dataset, true) => {
                gdebug!("dataset select-all requested");
                self.emit(GridEvent::SelectAllRequested {
                    page_row_ids: self.page_row_ids(),
                });
                return SelectAllOutcome::Requested;
            }
            (SelectAllScope::Dataset, false) => self.row_order_ids(),
            (SelectAllScope::Page, _) => self.page_row_ids(),
        };
        let mut added = 0;
        self.update_selection(SelectionChangeReason::SelectAll, |sel| {
            added = sel.select_all_on_page(ids);
            added > 0
        });
        SelectAllOutcome::Applied(added)
    }

    /// Header checkbox: clears the page when fully selected, otherwise selects it.
    pub fn toggle_page_selection(&mut self) -> bool {
        let ids = self.page_row_ids();
        self.update_selection(SelectionChangeReason::SelectAll, |sel| sel.toggle_page(&ids))
    }

    pub fn clear_selection(&mut self) -> bool {
        self.update_selection(SelectionChangeReason::User, SelectionManager::clear)
    }

    /// Host commit of the selection. Emits nothing.
    pub fn set_selection(&mut self, selection: SelectionState<K>) {
        self.selection.replace(selection);
    }

    /// Runs a selection intent. Uncontrolled selection is changed in place; controlled
    /// selection is changed on a copy that is only reported.
    fn update_selection(
        &mut self,
        reason: SelectionChangeReason,
        f: impl FnOnce(&mut SelectionManager<K>) -> bool,
    ) -> bool {
        if self.controlled.selection {
            let mut next = self.selection.clone();
            if !f(&mut next) {
                return false;
            }
            self.emit(GridEvent::SelectionChange {
                selection: next.state().clone(),
                reason,
            });
            return true;
        }
        if !f(&mut self.selection) {
            return false;
        }
        if self.on_event.is_some() {
            self.emit(GridEvent::SelectionChange {
                selection: self.selection.state().clone(),
                reason,
            });
        }
        true
    }

    fn commit_selection(&mut self, next: SelectionState<K>, reason: SelectionChangeReason) -> bool {
        if &next == self.selection.state() {
            return false;
        }
        self.emit(GridEvent::SelectionChange {
            selection: next.clone(),
            reason,
        });
        if !self.controlled.selection {
            self.selection.replace(next);
        }
        true
    }

    // Column layout.

    pub fn resize_column(&mut self, column_id: &str, delta_px: i64, now_ms: u64) -> bool {
        let mut next = self.columns.state().clone();
        if !next.resize(self.columns.columns(), column_id, delta_px) {
            return false;
        }
        self.commit_layout(next, Some(column_id), now_ms)
    }

    /// Sizes a column to its widest measured cell plus the configured padding.
    pub fn auto_fit_column(&mut self, column_id: &str, measured_widths: &[u32], now_ms: u64) -> bool {
        let mut next = self.columns.state().clone();
        let padding = self.columns.auto_fit_padding();
        if !next.auto_fit(self.columns.columns(), column_id, measured_widths, padding) {
            return false;
        }
        self.commit_layout(next, Some(column_id), now_ms)
    }

    /// Drag-and-drop: moves `dragged` to the position `target` occupies.
    pub fn reorder_column(&mut self, dragged: &str, target: &str, now_ms: u64) -> bool {
        let mut next = self.columns.state().clone();
        if !next.reorder(dragged, target) {
            return false;
        }
        self.commit_layout(next, Some(dragged), now_ms)
    }

    pub fn set_column_visibility(&mut self, column_id: &str, visible: bool, now_ms: u64) -> bool {
        let mut next = self.columns.state().clone();
        if !next.set_visibility(self.columns.columns(), column_id, visible) {
            return false;
        }
        self.commit_layout(next, Some(column_id), now_ms)
    }

    /// Restores default widths, declaration order and full visibility.
    pub fn reset_column_layout(&mut self, now_ms: u64) -> bool {
        let next = ColumnLayoutState::initial(self.columns.columns());
        self.commit_layout(next, None, now_ms)
    }

    /// Host commit of the column layout. Emits nothing.
    pub fn set_column_layout(&mut self, layout: ColumnLayoutState, now_ms: u64) {
        self.apply_layout(layout, now_ms);
    }

    /// Replaces the column descriptors, keeping whatever layout still applies.
    pub fn set_columns(&mut self, columns: Vec<ColumnDescriptor>) {
        self.columns.set_columns(columns);
        self.sync_bounds();
    }

    /// Writes a pending preference save now instead of waiting for the debounce.
    pub fn flush_preferences(&mut self) -> bool {
        match self.columns.flush() {
            Some(preferences) => {
                self.emit(GridEvent::ColumnPreferencesChange { preferences });
                true
            }
            None => false,
        }
    }

    fn commit_layout(&mut self, next: ColumnLayoutState, column_id: Option<&str>, now_ms: u64) -> bool {
        let current = self.columns.state();
        let mut applied = current.clone();
        let mut events = Vec::new();
        let column_id = column_id.map(str::to_owned);

        if next.column_sizing != current.column_sizing {
            events.push(GridEvent::ColumnSizingChange {
                sizing: next.column_sizing.clone(),
                column_id: column_id.clone(),
            });
            if !self.controlled.column_sizing {
                applied.column_sizing = next.column_sizing.clone();
            }
        }
        if next.column_order != current.column_order {
            events.push(GridEvent::ColumnOrderChange {
                order: next.column_order.clone(),
                column_id: column_id.clone(),
            });
            if !self.controlled.column_order {
                applied.column_order = next.column_order.clone();
            }
        }
        if next.column_visibility != current.column_visibility {
            events.push(GridEvent::ColumnVisibilityChange {
                visibility: next.column_visibility.clone(),
                column_id,
            });
            if !self.controlled.column_visibility {
                applied.column_visibility = next.column_visibility;
            }
        }

        if events.is_empty() {
            return false;
        }
        for event in &events {
            self.emit_ref(event);
        }
        self.apply_layout(applied, now_ms);
        true
    }

    fn apply_layout(&mut self, layout: ColumnLayoutState, now_ms: u64) {
        let changes = self.columns.replace_state(layout, now_ms);
        if changes.contains(&LayoutChange::Visibility) {
            self.sync_bounds();
        }
    }

    // Focus and scrolling.

    /// Moves focus. A move scrolls the focused row into view; boundary crossings and page
    /// requests are returned for the caller to resolve with [`Self::go_to_page`].
    pub fn navigate(&mut self, key: NavKey) -> NavOutcome {
        let outcome = self.focus.navigate(key);
        if let NavOutcome::Moved(position) = outcome {
            self.window.scroll_to_row(position.row, Align::Auto);
        }
        outcome
    }

    /// Focuses a cell directly (e.g. on click), clamped into bounds.
    pub fn set_focus(&mut self, row: usize, col: usize) {
        self.focus.set_position(row, col);
        self.scroll_focus_into_view();
    }

    /// Scroll event from the presentation layer.
    pub fn on_scroll(&mut self, scroll_offset: u64, viewport_height: u32) {
        self.window.apply_scroll(scroll_offset, viewport_height);
    }

    pub fn set_viewport_height(&mut self, viewport_height: u32) {
        self.window.set_viewport_height(viewport_height);
    }

    /// Records a rendered row height. Returns how much the total height changed.
    pub fn measure_row(&mut self, page_row: usize, height: u32) -> i64 {
        self.window.measure(page_row, height)
    }

    pub fn scroll_to_row(&mut self, page_row: usize, align: Align) -> u64 {
        self.window.scroll_to_row(page_row, align)
    }

    fn scroll_focus_into_view(&mut self) {
        if self.page_row_count() > 0 {
            self.window
                .scroll_to_row(self.focus.position().row, Align::Auto);
        }
    }

    // Data.

    /// Replaces the local rows. Unless selection is preserved across data changes, selected
    /// ids with no row left are dropped. Ignored in remote mode.
    pub fn set_rows(&mut self, rows: Vec<R>, now_ms: u64) {
        if self.fetch.is_some() {
            gwarn!("set_rows ignored in remote mode");
            return;
        }
        self.rows = rows;
        if !self.preserve_selection_on_filter {
            let known: HashSet<K> = self.rows.iter().map(|r| self.row_id(r)).collect();
            self.update_selection(SelectionChangeReason::RowsReplaced, |sel| {
                sel.retain(|id| known.contains(id))
            });
        }
        self.request_refresh(FetchTrigger::Refresh, now_ms);
    }

    /// Re-derives (local) or re-fetches (remote) with the current state.
    pub fn reload(&mut self, now_ms: u64) {
        self.request_refresh(FetchTrigger::Refresh, now_ms);
    }

    /// Groups several changes into one re-derivation (and at most one request).
    pub fn batch_update<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.batch_depth += 1;
        let out = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            if let Some((trigger, now_ms)) = self.deferred.take() {
                self.refresh(trigger, now_ms);
            }
        }
        out
    }

    /// Advances debounced work: issues a pending filter request and flushes a pending
    /// preference save. Returns whether anything happened. A no-op after [`Self::dispose`].
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if self.disposed {
            return false;
        }
        let before = self.fetch_status_key();
        let request = self.fetch.as_mut().and_then(|f| f.tick(now_ms));
        let mut progressed = request.is_some();
        self.start_job(request);
        self.emit_fetch_status_if_changed(before);

        if let Some(preferences) = self.columns.tick(now_ms) {
            gtrace!(now_ms, "column preferences flushed");
            self.emit(GridEvent::ColumnPreferencesChange { preferences });
            progressed = true;
        }
        progressed
    }

    pub fn has_fetch_job(&self) -> bool {
        self.job.is_some()
    }

    /// The request issued by the most recent change, ready to be awaited.
    pub fn take_fetch_job(&mut self) -> Option<FetchJob<R>> {
        self.job.take()
    }

    /// Applies a finished request. Superseded requests come back as [`FetchApply::Stale`] and
    /// change nothing.
    pub fn complete_fetch(&mut self, completion: FetchCompletion<R>) -> FetchApply {
        if self.disposed {
            return FetchApply::Stale;
        }
        let before = self.fetch_status_key();
        let Some(fetch) = self.fetch.as_mut() else {
            return FetchApply::Stale;
        };
        let applied = fetch.complete(completion);
        if applied == FetchApply::Applied {
            self.window.set_row_count(self.page_row_count());
            self.sync_bounds();
            self.apply_pending_seed();
        }
        self.emit_fetch_status_if_changed(before);
        applied
    }

    /// Re-issues the last request (remote mode).
    pub fn retry(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let before = self.fetch_status_key();
        let request = self.fetch.as_mut().and_then(|f| f.retry());
        let issued = request.is_some();
        self.start_job(request);
        self.emit_fetch_status_if_changed(before);
        issued
    }

    /// Tears the grid down: cancels any request in flight and drops pending debounced work.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(fetch) = self.fetch.as_mut() {
            fetch.dispose();
        }
        self.job = None;
        self.columns.dispose();
        self.deferred = None;
        self.disposed = true;
        gdebug!("grid controller disposed");
    }

    fn request_refresh(&mut self, trigger: FetchTrigger, now_ms: u64) {
        if self.batch_depth > 0 {
            // An immediate trigger outranks a debounced filter trigger.
            let trigger = match self.deferred {
                Some((prev, _)) if prev != FetchTrigger::Filter => prev,
                _ => trigger,
            };
            self.deferred = Some((trigger, now_ms));
            return;
        }
        self.refresh(trigger, now_ms);
    }

    fn refresh(&mut self, trigger: FetchTrigger, now_ms: u64) {
        if self.disposed {
            return;
        }
        if self.fetch.is_none() {
            self.derive_local(now_ms);
            return;
        }
        let params = FetchParams {
            page_index: self.pagination.page_index,
            page_size: self.pagination.page_size,
            sort: self.sort.clone(),
            filters: self.filters.clone(),
        };
        let before = self.fetch_status_key();
        let request = self
            .fetch
            .as_mut()
            .and_then(|f| f.request(params, trigger, now_ms));
        self.start_job(request);
        self.emit_fetch_status_if_changed(before);
    }

    fn derive_local(&mut self, now_ms: u64) {
        self.derived = self
            .pipeline
            .run(&self.rows, &self.sort, &self.filters, &self.pagination);

        let page_count = self.derived.page_count();
        if self.pagination.page_index >= page_count {
            let clamped = self.pagination.with_page_index(page_count - 1);
            gtrace!(
                page_index = self.pagination.page_index,
                page_count,
                "page index clamped"
            );
            self.commit_pagination(clamped, PaginationChangeCause::Clamped, None, now_ms);
            if self.pagination == clamped {
                // Re-derived (or deferred) by the commit.
                return;
            }
        }

        self.window.set_row_count(self.derived.page().len());
        self.sync_bounds();
        self.apply_pending_seed();
    }

    fn start_job(&mut self, request: Option<FetchRequest<F>>) {
        match (request, &self.data_source) {
            (Some(request), Some(source)) => {
                self.job = Some(FetchJob::new(&request, &**source));
            }
            _ => {
                if self.job.as_ref().is_some_and(FetchJob::is_cancelled) {
                    self.job = None;
                }
            }
        }
    }

    fn sync_bounds(&mut self) {
        let rows = self.page_row_count();
        let cols = self.columns.visible_count();
        self.focus.set_bounds(rows, cols);
    }

    fn apply_pending_seed(&mut self) {
        let Some(seed) = self.pending_seed.take() else {
            return;
        };
        match seed {
            FocusSeed::Keep => return,
            FocusSeed::Row(offset) => self.focus.reseed(offset),
            FocusSeed::AfterCrossing(direction) => self.focus.reseed_after_crossing(direction),
        }
        self.scroll_focus_into_view();
    }

    fn fetch_status_key(&self) -> (FetchStatus, Option<FetchErrorState>) {
        (self.fetch_status(), self.fetch_error().cloned())
    }

    fn emit_fetch_status_if_changed(&self, before: (FetchStatus, Option<FetchErrorState>)) {
        let (status, error) = self.fetch_status_key();
        if (status, &error) != (before.0, &before.1) {
            self.emit(GridEvent::FetchStatusChange { status, error });
        }
    }

    fn emit(&self, event: GridEvent<K, F>) {
        self.emit_ref(&event);
    }

    fn emit_ref(&self, event: &GridEvent<K, F>) {
        gtrace!(kind = event.kind(), "grid event");
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }
}

impl<R, K, F> core::fmt::Debug for GridStateController<R, K, F>
where
    K: core::fmt::Debug,
    F: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GridStateController")
            .field("remote", &self.fetch.is_some())
            .field("sort", &self.sort)
            .field("filters", &self.filters)
            .field("pagination", &self.pagination)
            .field("selection", &self.selection)
            .field("columns", &self.columns)
            .field("focus", &self.focus)
            .field("rows", &self.rows.len())
            .field("fetch", &self.fetch)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}
