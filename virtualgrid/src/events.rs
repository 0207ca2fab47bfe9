use std::collections::BTreeMap;
use std::sync::Arc;

use crate::columns::ColumnPreferences;
use crate::fetch::{FetchErrorState, FetchStatus};
use crate::selection::SelectionState;
use crate::{ColumnId, FilterState, PaginationState, SortState};

/// Callback receiving every change notification of a grid.
pub type OnEventCallback<K, F> = Arc<dyn Fn(&GridEvent<K, F>) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionChangeReason {
    /// A click, key press or programmatic selection gesture.
    User,
    /// Cleared because the filters changed.
    FilterChanged,
    SelectAll,
    /// Pruned after the local rows were replaced.
    RowsReplaced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PaginationChangeCause {
    User,
    /// Reset to the first page because the filters changed.
    FilterReset,
    PageSizeChanged,
    /// Pulled back to the last page after the data shrank.
    Clamped,
}

/// A change notification.
///
/// Every event carries the full new state of its dimension. For a dimension the host
/// controls, this is the *proposed* state; it only takes effect once the host commits it.
#[derive(Clone, Debug)]
pub enum GridEvent<K, F> {
    SortChange {
        sort: SortState,
        /// The column whose header was toggled, if any.
        column_id: Option<ColumnId>,
    },
    SelectionChange {
        selection: SelectionState<K>,
        reason: SelectionChangeReason,
    },
    PaginationChange {
        pagination: PaginationState,
        cause: PaginationChangeCause,
    },
    FilterChange {
        filters: FilterState<F>,
        /// The column whose filter changed; `None` for the global filter or a bulk replace.
        column_id: Option<ColumnId>,
    },
    ColumnVisibilityChange {
        visibility: BTreeMap<ColumnId, bool>,
        column_id: Option<ColumnId>,
    },
    ColumnOrderChange {
        order: Vec<ColumnId>,
        /// The dragged column, for drag-and-drop reorders.
        column_id: Option<ColumnId>,
    },
    ColumnSizingChange {
        sizing: BTreeMap<ColumnId, u32>,
        column_id: Option<ColumnId>,
    },
    /// The debounced column layout was flushed to the preference store.
    ColumnPreferencesChange { preferences: ColumnPreferences },
    /// Dataset-wide select-all in remote mode; the host resolves it out of band.
    SelectAllRequested { page_row_ids: Vec<K> },
    FetchStatusChange {
        status: FetchStatus,
        error: Option<FetchErrorState>,
    },
}

impl<K, F> GridEvent<K, F> {
    /// Short name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SortChange { .. } => "sort-change",
            Self::SelectionChange { .. } => "selection-change",
            Self::PaginationChange { .. } => "pagination-change",
            Self::FilterChange { .. } => "filter-change",
            Self::ColumnVisibilityChange { .. } => "column-visibility-change",
            Self::ColumnOrderChange { .. } => "column-order-change",
            Self::ColumnSizingChange { .. } => "column-sizing-change",
            Self::ColumnPreferencesChange { .. } => "column-preferences-change",
            Self::SelectAllRequested { .. } => "select-all-requested",
            Self::FetchStatusChange { .. } => "fetch-status-change",
        }
    }
}
