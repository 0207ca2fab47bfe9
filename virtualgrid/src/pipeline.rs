use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{ColumnId, FilterState, PaginationState, SortDirection, SortState, page_count_for};

pub type Comparator<R> = Arc<dyn Fn(&R, &R) -> Ordering + Send + Sync>;
pub type FilterPredicate<R, F> = Arc<dyn Fn(&R, &F) -> bool + Send + Sync>;
pub type GlobalFilter<R> = Arc<dyn Fn(&R, &str) -> bool + Send + Sync>;

/// Replaces the whole filter stage. Must return indexes into `rows`, in ascending order.
pub type FilterStage<R, F> = Arc<dyn Fn(&[R], &FilterState<F>) -> Vec<usize> + Send + Sync>;
/// Replaces the whole sort stage. Must permute `indexes` in place.
pub type SortStage<R> = Arc<dyn Fn(&mut [usize], &[R], &SortState) + Send + Sync>;

/// Caller-supplied accessors: how to compare rows per column and how to test a row against a
/// filter value.
///
/// A column without a comparator cannot be sorted (its sort entries are skipped); a column
/// without a predicate ignores filter values.
pub struct RowModel<R, F> {
    comparators: HashMap<ColumnId, Comparator<R>>,
    predicates: HashMap<ColumnId, FilterPredicate<R, F>>,
    global_filter: Option<GlobalFilter<R>>,
}

impl<R, F> Default for RowModel<R, F> {
    fn default() -> Self {
        Self {
            comparators: HashMap::new(),
            predicates: HashMap::new(),
            global_filter: None,
        }
    }
}

impl<R, F> Clone for RowModel<R, F> {
    fn clone(&self) -> Self {
        Self {
            comparators: self.comparators.clone(),
            predicates: self.predicates.clone(),
            global_filter: self.global_filter.clone(),
        }
    }
}

impl<R, F> RowModel<R, F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comparator(
        mut self,
        column_id: impl Into<ColumnId>,
        cmp: impl Fn(&R, &R) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.comparators.insert(column_id.into(), Arc::new(cmp));
        self
    }

    /// Sorts the column by an `Ord` key extracted from each row.
    pub fn with_sort_key<T: Ord>(
        self,
        column_id: impl Into<ColumnId>,
        key: impl Fn(&R) -> T + Send + Sync + 'static,
    ) -> Self {
        self.with_comparator(column_id, move |a, b| key(a).cmp(&key(b)))
    }

    pub fn with_filter(
        mut self,
        column_id: impl Into<ColumnId>,
        predicate: impl Fn(&R, &F) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicates.insert(column_id.into(), Arc::new(predicate));
        self
    }

    pub fn with_global_filter(
        mut self,
        predicate: impl Fn(&R, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.global_filter = Some(Arc::new(predicate));
        self
    }

    pub fn comparator(&self, column_id: &str) -> Option<&Comparator<R>> {
        self.comparators.get(column_id)
    }

    pub fn predicate(&self, column_id: &str) -> Option<&FilterPredicate<R, F>> {
        self.predicates.get(column_id)
    }

    pub fn global_filter(&self) -> Option<&GlobalFilter<R>> {
        self.global_filter.as_ref()
    }
}

impl<R, F> core::fmt::Debug for RowModel<R, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut sortable: Vec<&str> = self.comparators.keys().map(String::as_str).collect();
        sortable.sort_unstable();
        let mut filterable: Vec<&str> = self.predicates.keys().map(String::as_str).collect();
        filterable.sort_unstable();
        f.debug_struct("RowModel")
            .field("sortable", &sortable)
            .field("filterable", &filterable)
            .field("global_filter", &self.global_filter.is_some())
            .finish()
    }
}

/// Indexes of the rows passing every active column filter and the global filter.
pub fn filter_rows<R, F>(rows: &[R], filters: &FilterState<F>, model: &RowModel<R, F>) -> Vec<usize> {
    let active: Vec<(&FilterPredicate<R, F>, &F)> = filters
        .columns()
        .filter_map(|(id, value)| model.predicate(id).map(|p| (p, value)))
        .collect();
    let global = filters.global().trim();
    let global = model
        .global_filter()
        .filter(|_| !global.is_empty())
        .map(|g| (g, global));

    rows.iter()
        .enumerate()
        .filter(|(_, row)| active.iter().all(|(pred, value)| pred(row, value)))
        .filter(|(_, row)| global.is_none_or(|(g, text)| g(row, text)))
        .map(|(i, _)| i)
        .collect()
}

/// Stable multi-column sort of `indexes` (which point into `rows`).
///
/// Comparators run in priority order and the first non-equal result wins. Rows equal under
/// every active comparator keep their incoming relative order.
pub fn sort_rows<R, F>(indexes: &mut [usize], rows: &[R], sort: &SortState, model: &RowModel<R, F>) {
    let active: Vec<(&Comparator<R>, SortDirection)> = sort
        .entries()
        .iter()
        .filter_map(|e| model.comparator(&e.column_id).map(|c| (c, e.direction)))
        .collect();
    if active.is_empty() {
        return;
    }

    indexes.sort_by(|&a, &b| {
        for (cmp, direction) in &active {
            let ord = cmp(&rows[a], &rows[b]);
            let ord = match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// The slice of `indexes` on the current page. Empty when the page is out of range.
pub fn paginate<'a>(indexes: &'a [usize], pagination: &PaginationState) -> &'a [usize] {
    let start = pagination.first_row_index();
    if start >= indexes.len() {
        return &[];
    }
    let end = start
        .saturating_add(pagination.page_size.max(1))
        .min(indexes.len());
    &indexes[start..end]
}

/// Output of a local derivation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DerivedRows {
    order: Vec<usize>,
    page_start: usize,
    page_end: usize,
    page_count: usize,
}

impl DerivedRows {
    /// Filtered and sorted indexes into the raw rows, across all pages.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Indexes into the raw rows for the current page, in display order.
    pub fn page(&self) -> &[usize] {
        &self.order[self.page_start..self.page_end]
    }

    pub fn filtered_count(&self) -> usize {
        self.order.len()
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }
}

/// Local-mode row derivation: filter → sort → paginate.
///
/// Pure and synchronous: the same inputs always produce the same output.
pub struct DerivedRowPipeline<R, F> {
    model: RowModel<R, F>,
    filter_stage: Option<FilterStage<R, F>>,
    sort_stage: Option<SortStage<R>>,
}

impl<R, F> Clone for DerivedRowPipeline<R, F> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            filter_stage: self.filter_stage.clone(),
            sort_stage: self.sort_stage.clone(),
        }
    }
}

impl<R, F> DerivedRowPipeline<R, F> {
    pub fn new(model: RowModel<R, F>) -> Self {
        Self {
            model,
            filter_stage: None,
            sort_stage: None,
        }
    }

    pub fn model(&self) -> &RowModel<R, F> {
        &self.model
    }

    pub fn with_filter_stage(
        mut self,
        stage: impl Fn(&[R], &FilterState<F>) -> Vec<usize> + Send + Sync + 'static,
    ) -> Self {
        self.filter_stage = Some(Arc::new(stage));
        self
    }

    pub fn with_sort_stage(
        mut self,
        stage: impl Fn(&mut [usize], &[R], &SortState) + Send + Sync + 'static,
    ) -> Self {
        self.sort_stage = Some(Arc::new(stage));
        self
    }

    pub fn filter(&self, rows: &[R], filters: &FilterState<F>) -> Vec<usize> {
        match &self.filter_stage {
            Some(stage) => stage(rows, filters),
            None => filter_rows(rows, filters, &self.model),
        }
    }

    pub fn sort(&self, indexes: &mut [usize], rows: &[R], sort: &SortState) {
        match &self.sort_stage {
            Some(stage) => stage(indexes, rows, sort),
            None => sort_rows(indexes, rows, sort, &self.model),
        }
    }

    pub fn run(
        &self,
        rows: &[R],
        sort: &SortState,
        filters: &FilterState<F>,
        pagination: &PaginationState,
    ) -> DerivedRows {
        let mut order = self.filter(rows, filters);
        self.sort(&mut order, rows, sort);

        let page_start = pagination.first_row_index().min(order.len());
        let page_end = page_start + paginate(&order, pagination).len();
        let page_count = page_count_for(order.len(), pagination.page_size);
        gtrace!(
            rows = rows.len(),
            filtered = order.len(),
            page_start,
            page_end,
            "derived rows"
        );
        DerivedRows {
            order,
            page_start,
            page_end,
            page_count,
        }
    }
}

impl<R, F> core::fmt::Debug for DerivedRowPipeline<R, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DerivedRowPipeline")
            .field("model", &self.model)
            .field("custom_filter_stage", &self.filter_stage.is_some())
            .field("custom_sort_stage", &self.sort_stage.is_some())
            .finish()
    }
}
