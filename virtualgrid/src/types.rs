use std::collections::BTreeMap;

/// Stable identifier of a column.
pub type ColumnId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SortEntry {
    pub column_id: ColumnId,
    pub direction: SortDirection,
}

impl SortEntry {
    pub fn new(column_id: impl Into<ColumnId>, direction: SortDirection) -> Self {
        Self {
            column_id: column_id.into(),
            direction,
        }
    }

    pub fn ascending(column_id: impl Into<ColumnId>) -> Self {
        Self::new(column_id, SortDirection::Ascending)
    }

    pub fn descending(column_id: impl Into<ColumnId>) -> Self {
        Self::new(column_id, SortDirection::Descending)
    }
}

/// Ordered sort specification. The first entry is the primary sort.
///
/// A column appears at most once; every constructor and mutator keeps it that way.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(from = "Vec<SortEntry>", into = "Vec<SortEntry>")
)]
pub struct SortState {
    entries: Vec<SortEntry>,
}

impl SortState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a sort state, keeping the first occurrence of a repeated column.
    pub fn from_entries(entries: impl IntoIterator<Item = SortEntry>) -> Self {
        let mut out = Self::new();
        for entry in entries {
            if out.position_of(&entry.column_id).is_none() {
                out.entries.push(entry);
            }
        }
        out
    }

    pub fn single(column_id: impl Into<ColumnId>, direction: SortDirection) -> Self {
        Self {
            entries: vec![SortEntry::new(column_id, direction)],
        }
    }

    pub fn entries(&self) -> &[SortEntry] {
        &self.entries
    }

    pub fn primary(&self) -> Option<&SortEntry> {
        self.entries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn position_of(&self, column_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.column_id == column_id)
    }

    pub fn direction_of(&self, column_id: &str) -> Option<SortDirection> {
        self.entries
            .iter()
            .find(|e| e.column_id == column_id)
            .map(|e| e.direction)
    }

    /// Sets the direction of `column_id`, keeping its priority if already present.
    pub fn set(&mut self, column_id: impl Into<ColumnId>, direction: SortDirection) {
        let column_id = column_id.into();
        match self.position_of(&column_id) {
            Some(i) => self.entries[i].direction = direction,
            None => self.entries.push(SortEntry::new(column_id, direction)),
        }
    }

    pub fn remove(&mut self, column_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.column_id != column_id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the state after a header click on `column_id`.
    ///
    /// The column cycles none → ascending → descending → none. With `multi`, other sort entries
    /// are kept (the column is appended or updated in place); otherwise the column becomes the
    /// only sort.
    pub fn toggled(&self, column_id: &str, multi: bool) -> Self {
        let next = match self.direction_of(column_id) {
            None => Some(SortDirection::Ascending),
            Some(SortDirection::Ascending) => Some(SortDirection::Descending),
            Some(SortDirection::Descending) => None,
        };

        let mut out = if multi {
            self.clone()
        } else {
            let mut only = Self::new();
            if let Some(dir) = self.direction_of(column_id) {
                only.set(column_id, dir);
            }
            only
        };

        match next {
            Some(dir) => out.set(column_id, dir),
            None => {
                out.remove(column_id);
            }
        }
        out
    }
}

impl From<Vec<SortEntry>> for SortState {
    fn from(entries: Vec<SortEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<SortState> for Vec<SortEntry> {
    fn from(state: SortState) -> Self {
        state.entries
    }
}

/// Per-column filter values plus one global free-text filter.
///
/// A column without an entry is unfiltered. The filter value type `F` is opaque to the engine;
/// only the caller's predicates interpret it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterState<F> {
    columns: BTreeMap<ColumnId, F>,
    global: String,
}

impl<F> Default for FilterState<F> {
    fn default() -> Self {
        Self {
            columns: BTreeMap::new(),
            global: String::new(),
        }
    }
}

impl<F> FilterState<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column_id: &str) -> Option<&F> {
        self.columns.get(column_id)
    }

    /// Sets (`Some`) or clears (`None`) the filter of a column.
    pub fn set(&mut self, column_id: impl Into<ColumnId>, value: Option<F>) {
        let column_id = column_id.into();
        match value {
            Some(v) => {
                self.columns.insert(column_id, v);
            }
            None => {
                self.columns.remove(&column_id);
            }
        }
    }

    pub fn with_column(mut self, column_id: impl Into<ColumnId>, value: F) -> Self {
        self.columns.insert(column_id.into(), value);
        self
    }

    pub fn with_global(mut self, global: impl Into<String>) -> Self {
        self.global = global.into();
        self
    }

    pub fn global(&self) -> &str {
        &self.global
    }

    pub fn set_global(&mut self, global: impl Into<String>) {
        self.global = global.into();
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &F)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// `true` when no column filter is set and the global filter is blank.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.global.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.columns.clear();
        self.global.clear();
    }
}

/// Current page plus, for remote mode, counts the engine cannot compute itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaginationState {
    /// 0-based.
    pub page_index: usize,
    pub page_size: usize,
    /// Caller-supplied page count. Overrides any count reported by a fetch.
    pub page_count: Option<usize>,
    /// Caller-supplied total row count. Overrides any count reported by a fetch.
    pub total_row_count: Option<usize>,
}

impl PaginationState {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size: page_size.max(1),
            page_count: None,
            total_row_count: None,
        }
    }

    pub fn with_page_index(mut self, page_index: usize) -> Self {
        self.page_index = page_index;
        self
    }

    /// Index of the first row of the current page within the full (filtered, sorted) order.
    pub fn first_row_index(&self) -> usize {
        self.page_index.saturating_mul(self.page_size)
    }
}

impl Default for PaginationState {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Number of pages needed for `total_rows`. Always at least 1, so an empty dataset still has a
/// (blank) first page.
pub fn page_count_for(total_rows: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    total_rows.div_ceil(page_size).max(1)
}

/// Position of the single focusable cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FocusPosition {
    pub row: usize,
    pub col: usize,
}

impl FocusPosition {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Align {
    Start,
    Center,
    End,
    Auto,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisibleRange {
    pub start_index: usize,
    pub end_index: usize, // exclusive
}

impl VisibleRange {
    pub const EMPTY: Self = Self {
        start_index: 0,
        end_index: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.start_index >= self.end_index
    }

    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index < self.end_index
    }

    pub fn indexes(&self) -> core::ops::Range<usize> {
        self.start_index..self.end_index.max(self.start_index)
    }
}
