use std::sync::Arc;

use crate::columns::{ColumnDescriptor, PreferenceStore};
use crate::events::OnEventCallback;
use crate::fetch::DataSource;
use crate::pipeline::{DerivedRowPipeline, RowModel};
use crate::selection::SelectionMode;
use crate::window::WindowOptions;
use crate::{FilterState, SortState};

/// Extracts the stable identity of a row.
pub type RowIdFn<R, K> = Arc<dyn Fn(&R) -> K + Send + Sync>;

/// Which state dimensions the host owns.
///
/// For a controlled dimension, an internal intent (a sort click, a resize drag, ...) only emits
/// its change event carrying the proposed state. Nothing is committed until the host calls the
/// matching setter on [`crate::GridStateController`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlledState {
    pub sort: bool,
    pub filters: bool,
    pub pagination: bool,
    pub selection: bool,
    pub column_order: bool,
    pub column_visibility: bool,
    pub column_sizing: bool,
}

impl ControlledState {
    /// Every dimension controlled by the host.
    pub fn all() -> Self {
        Self {
            sort: true,
            filters: true,
            pagination: true,
            selection: true,
            column_order: true,
            column_visibility: true,
            column_sizing: true,
        }
    }
}

/// Configuration for [`crate::GridStateController`].
///
/// Closures and collaborators are held in `Arc`s, so cloning is cheap.
pub struct GridOptions<R, K, F> {
    pub columns: Vec<ColumnDescriptor>,
    pub get_row_id: RowIdFn<R, K>,
    /// Local-mode derivation. Ignored in remote mode.
    pub pipeline: DerivedRowPipeline<R, F>,

    pub page_size: usize,
    pub initial_sort: SortState,
    pub initial_filters: FilterState<F>,

    /// Keep the selection when filters change instead of clearing it.
    pub preserve_selection_on_filter: bool,
    pub selection_mode: SelectionMode,

    /// Delay before a filter change reaches the data source (remote mode).
    pub filter_debounce_ms: u64,
    /// Delay before column layout changes are persisted.
    pub preferences_debounce_ms: u64,
    pub preferences_key: Option<String>,
    pub preference_store: Option<Arc<dyn PreferenceStore>>,

    /// When set, the grid runs in remote mode: only the current page is held and every sort,
    /// filter or pagination change goes through this source.
    pub data_source: Option<Arc<dyn DataSource<R, F>>>,

    pub controlled: ControlledState,
    pub window: WindowOptions,
    /// Extra width added to the widest measured cell by auto-fit.
    pub auto_fit_padding: u32,
    pub on_event: Option<OnEventCallback<K, F>>,
}

impl<R, K, F> Clone for GridOptions<R, K, F>
where
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            get_row_id: Arc::clone(&self.get_row_id),
            pipeline: self.pipeline.clone(),
            page_size: self.page_size,
            initial_sort: self.initial_sort.clone(),
            initial_filters: self.initial_filters.clone(),
            preserve_selection_on_filter: self.preserve_selection_on_filter,
            selection_mode: self.selection_mode,
            filter_debounce_ms: self.filter_debounce_ms,
            preferences_debounce_ms: self.preferences_debounce_ms,
            preferences_key: self.preferences_key.clone(),
            preference_store: self.preference_store.clone(),
            data_source: self.data_source.clone(),
            controlled: self.controlled,
            window: self.window,
            auto_fit_padding: self.auto_fit_padding,
            on_event: self.on_event.clone(),
        }
    }
}

impl<R, K, F> GridOptions<R, K, F> {
    /// Creates local-mode options with defaults: pages of 50, multi-select, 300 ms debounces.
    pub fn new(
        columns: Vec<ColumnDescriptor>,
        get_row_id: impl Fn(&R) -> K + Send + Sync + 'static,
    ) -> Self {
        Self {
            columns,
            get_row_id: Arc::new(get_row_id),
            pipeline: DerivedRowPipeline::new(RowModel::new()),
            page_size: 50,
            initial_sort: SortState::new(),
            initial_filters: FilterState::new(),
            preserve_selection_on_filter: false,
            selection_mode: SelectionMode::Multi,
            filter_debounce_ms: 300,
            preferences_debounce_ms: 300,
            preferences_key: None,
            preference_store: None,
            data_source: None,
            controlled: ControlledState::default(),
            window: WindowOptions::default(),
            auto_fit_padding: 16,
            on_event: None,
        }
    }

    pub fn with_row_model(mut self, model: RowModel<R, F>) -> Self {
        self.pipeline = DerivedRowPipeline::new(model);
        self
    }

    pub fn with_pipeline(mut self, pipeline: DerivedRowPipeline<R, F>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_initial_sort(mut self, sort: SortState) -> Self {
        self.initial_sort = sort;
        self
    }

    pub fn with_initial_filters(mut self, filters: FilterState<F>) -> Self {
        self.initial_filters = filters;
        self
    }

    pub fn with_preserve_selection_on_filter(mut self, preserve: bool) -> Self {
        self.preserve_selection_on_filter = preserve;
        self
    }

    pub fn with_selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }

    pub fn with_filter_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.filter_debounce_ms = debounce_ms;
        self
    }

    pub fn with_preferences_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.preferences_debounce_ms = debounce_ms;
        self
    }

    /// Persists column layout under `key` and restores it at construction.
    pub fn with_preference_store(
        mut self,
        store: Arc<dyn PreferenceStore>,
        key: impl Into<String>,
    ) -> Self {
        self.preference_store = Some(store);
        self.preferences_key = Some(key.into());
        self
    }

    /// Switches the grid to remote mode.
    pub fn with_data_source(mut self, source: impl DataSource<R, F> + 'static) -> Self {
        self.data_source = Some(Arc::new(source));
        self
    }

    pub fn with_controlled(mut self, controlled: ControlledState) -> Self {
        self.controlled = controlled;
        self
    }

    pub fn with_window(mut self, window: WindowOptions) -> Self {
        self.window = window;
        self
    }

    pub fn with_auto_fit_padding(mut self, padding: u32) -> Self {
        self.auto_fit_padding = padding;
        self
    }

    pub fn with_on_event(
        mut self,
        on_event: impl Fn(&crate::GridEvent<K, F>) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Arc::new(on_event));
        self
    }

    pub fn is_remote(&self) -> bool {
        self.data_source.is_some()
    }
}

impl<R, K, F> core::fmt::Debug for GridOptions<R, K, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GridOptions")
            .field("columns", &self.columns)
            .field("pipeline", &self.pipeline)
            .field("page_size", &self.page_size)
            .field("initial_sort", &self.initial_sort)
            .field("preserve_selection_on_filter", &self.preserve_selection_on_filter)
            .field("selection_mode", &self.selection_mode)
            .field("filter_debounce_ms", &self.filter_debounce_ms)
            .field("preferences_debounce_ms", &self.preferences_debounce_ms)
            .field("preferences_key", &self.preferences_key)
            .field("remote", &self.data_source.is_some())
            .field("controlled", &self.controlled)
            .field("window", &self.window)
            .field("auto_fit_padding", &self.auto_fit_padding)
            .finish_non_exhaustive()
    }
}
