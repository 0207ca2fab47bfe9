//! A headless engine for large interactive data grids.
//!
//! For adapter-level utilities (key mapping, a session that drives fetches, preference stores),
//! see the `virtualgrid-adapter` crate.
//!
//! The engine owns the state of a grid and the algorithms around it:
//! - a row window that renders only the rows intersecting the viewport (plus overscan)
//! - roving keyboard focus over the loaded rows and visible columns
//! - column sizing, ordering and visibility, persisted with a debounce
//! - row selection with shift-range and select-all
//! - a local filter → sort → paginate pipeline, or a remote fetch coordinator with
//!   cancellation and stale-response detection
//!
//! It is UI-agnostic and owns no timers. A host is expected to provide:
//! - viewport height, scroll offset and (optionally) measured row heights
//! - user intents (key presses, clicks, drags)
//! - a monotonic `now_ms` and periodic calls to `tick(now_ms)`
//! - in remote mode, an async runtime to await the fetch jobs the controller hands out
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod columns;
mod controller;
mod debounce;
mod error;
mod events;
mod fetch;
mod focus;
mod heights;
mod options;
mod pipeline;
mod selection;
mod types;
mod window;

#[cfg(test)]
mod tests;

pub use columns::{
    ColumnDescriptor, ColumnLayoutManager, ColumnLayoutState, ColumnPreferences, LayoutChange,
    PreferenceStore, PreferencesCallback,
};
pub use controller::{FocusSeed, GridMode, GridSnapshot, GridStateController};
pub use debounce::Debouncer;
pub use error::{FetchError, PreferenceError};
pub use events::{GridEvent, OnEventCallback, PaginationChangeCause, SelectionChangeReason};
pub use fetch::{
    DataSource, FetchApply, FetchCompletion, FetchCoordinator, FetchErrorState, FetchJob,
    FetchParams, FetchRequest, FetchResponse, FetchStatus, FetchTrigger,
};
pub use focus::{GridBounds, GridFocusController, NavKey, NavOutcome, PageDirection};
pub use options::{ControlledState, GridOptions, RowIdFn};
pub use pipeline::{
    Comparator, DerivedRowPipeline, DerivedRows, FilterPredicate, FilterStage, GlobalFilter,
    RowModel, SortStage, filter_rows, paginate, sort_rows,
};
pub use selection::{
    PageSelection, SelectAllOutcome, SelectAllScope, SelectionManager, SelectionMode,
    SelectionState,
};
pub use types::{
    Align, ColumnId, FilterState, FocusPosition, PaginationState, SortDirection, SortEntry,
    SortState, VisibleRange, page_count_for,
};
pub use window::{RowWindow, WindowOptions, compute_visible_range};

pub use tokio_util::sync::CancellationToken;
