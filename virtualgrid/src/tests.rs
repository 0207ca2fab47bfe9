use crate::*;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::oneshot;

#[derive(Clone, Copy, Debug)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        // Deterministic, dependency-free PRNG for tests.
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    fn gen_range_u64(&mut self, start: u64, end_exclusive: u64) -> u64 {
        debug_assert!(start < end_exclusive);
        let span = end_exclusive - start;
        start + (self.next_u64() % span)
    }

    fn gen_range_usize(&mut self, start: usize, end_exclusive: usize) -> usize {
        self.gen_range_u64(start as u64, end_exclusive as u64) as usize
    }

    fn gen_range_u32(&mut self, start: u32, end_exclusive: u32) -> u32 {
        self.gen_range_u64(start as u64, end_exclusive as u64) as u32
    }

    fn gen_bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Person {
    id: u32,
    name: String,
    group: u32,
}

fn person(id: u32) -> Person {
    Person {
        id,
        name: format!("person-{id:04}"),
        group: id % 7,
    }
}

fn people(n: u32) -> Vec<Person> {
    (0..n).map(person).collect()
}

fn columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("id"),
        ColumnDescriptor::new("name"),
        ColumnDescriptor::new("group").with_filterable(false),
    ]
}

fn row_model() -> RowModel<Person, String> {
    RowModel::new()
        .with_sort_key("id", |p: &Person| p.id)
        .with_sort_key("name", |p: &Person| p.name.clone())
        .with_sort_key("group", |p: &Person| p.group)
        .with_filter("name", |p: &Person, v: &String| p.name.contains(v.as_str()))
        .with_global_filter(|p: &Person, text: &str| p.name.contains(text))
}

type Events = Arc<Mutex<Vec<GridEvent<u32, String>>>>;

fn local_options(events: &Events) -> GridOptions<Person, u32, String> {
    let sink = Arc::clone(events);
    GridOptions::new(columns(), |p: &Person| p.id)
        .with_row_model(row_model())
        .with_page_size(10)
        .with_window(WindowOptions::new(20).with_viewport_height(100))
        .with_on_event(move |e| sink.lock().unwrap().push(e.clone()))
}

fn ids(range: std::ops::Range<u32>) -> Vec<u32> {
    range.collect()
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<HashMap<String, ColumnPreferences>>,
    saves: AtomicUsize,
}

impl PreferenceStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<ColumnPreferences>, PreferenceError> {
        Ok(self.saved.lock().unwrap().get(key).cloned())
    }

    fn save(&self, key: &str, preferences: &ColumnPreferences) -> Result<(), PreferenceError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.saved
            .lock()
            .unwrap()
            .insert(key.to_owned(), preferences.clone());
        Ok(())
    }
}

struct FailingStore;

impl PreferenceStore for FailingStore {
    fn load(&self, _key: &str) -> Result<Option<ColumnPreferences>, PreferenceError> {
        Err(PreferenceError::Backend("offline".into()))
    }

    fn save(&self, _key: &str, _preferences: &ColumnPreferences) -> Result<(), PreferenceError> {
        Err(PreferenceError::Backend("offline".into()))
    }
}

// Remote data source whose responses are released by the test.
struct PendingFetch {
    params: FetchParams<String>,
    cancel: CancellationToken,
    tx: oneshot::Sender<Result<FetchResponse<Person>, FetchError>>,
}

#[derive(Clone, Default)]
struct ManualSource {
    pending: Arc<Mutex<Vec<PendingFetch>>>,
}

impl ManualSource {
    fn take(&self) -> Vec<PendingFetch> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    fn take_one(&self) -> PendingFetch {
        let mut all = self.take();
        assert_eq!(all.len(), 1, "expected exactly one request");
        all.remove(0)
    }
}

impl DataSource<Person, String> for ManualSource {
    fn fetch(
        &self,
        params: FetchParams<String>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<FetchResponse<Person>, FetchError>> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .push(PendingFetch { params, cancel, tx });
        Box::pin(async move { rx.await.unwrap_or(Err(FetchError::Cancelled)) })
    }
}

fn page_response(params: &FetchParams<String>, total: u32) -> FetchResponse<Person> {
    let start = (params.page_index * params.page_size) as u32;
    let end = (start + params.page_size as u32).min(total);
    FetchResponse::new((start..end).map(person).collect(), total as usize)
}

fn remote_grid(source: &ManualSource, events: &Events) -> GridStateController<Person, u32, String> {
    let sink = Arc::clone(events);
    GridStateController::new(
        GridOptions::new(columns(), |p: &Person| p.id)
            .with_data_source(source.clone())
            .with_window(WindowOptions::new(20).with_viewport_height(100))
            .with_on_event(move |e| sink.lock().unwrap().push(e.clone())),
    )
}

async fn load_initial(grid: &mut GridStateController<Person, u32, String>, source: &ManualSource) {
    let job = grid.take_fetch_job().expect("initial job");
    let req = source.take_one();
    req.tx.send(Ok(page_response(&req.params, 500))).unwrap();
    assert_eq!(grid.complete_fetch(job.run().await), FetchApply::Applied);
}

fn params(page_index: usize, page_size: usize) -> FetchParams<String> {
    FetchParams {
        page_index,
        page_size,
        sort: SortState::new(),
        filters: FilterState::new(),
    }
}

// Row window.

#[test]
fn visible_range_around_row_500_with_overscan() {
    let r = compute_visible_range(10_000, 1_000, 20, 1_000, 5);
    assert_eq!(r.start_index, 495);
    assert_eq!(r.end_index, 555);

    let mut w = RowWindow::new(WindowOptions::new(20).with_overscan(5));
    w.set_row_count(1_000);
    w.apply_scroll(10_000, 1_000);
    assert_eq!(w.rendered_range(), r);
    assert_eq!(w.visible_range().indexes(), 500..550);
}

#[test]
fn visible_range_is_empty_without_rows_or_viewport() {
    assert!(compute_visible_range(0, 500, 20, 0, 5).is_empty());
    assert!(compute_visible_range(0, 0, 20, 100, 5).is_empty());
    assert!(compute_visible_range(0, 500, 0, 100, 5).is_empty());
}

#[test]
fn visible_range_clamps_overscrolled_offsets() {
    // 100 rows of 10px, 50px viewport: the last screenful is rows 95..100.
    let r = compute_visible_range(1_000_000, 50, 10, 100, 2);
    assert_eq!(r.start_index, 93);
    assert_eq!(r.end_index, 100);
}

#[test]
fn property_visible_range_stays_in_bounds() {
    let mut rng = Lcg::new(0x5eed);
    for _ in 0..2_000 {
        let rows = rng.gen_range_usize(0, 3_000);
        let row_height = rng.gen_range_u32(0, 60);
        let view = rng.gen_range_u32(0, 2_000);
        let offset = rng.gen_range_u64(0, 300_000);
        let overscan = rng.gen_range_usize(0, 12);

        let r = compute_visible_range(offset, view, row_height, rows, overscan);
        assert!(r.start_index <= r.end_index);
        assert!(r.end_index <= rows);
        if rows == 0 {
            assert!(r.is_empty());
        }
        if rows > 0 && view > 0 && row_height > 0 {
            assert!(!r.is_empty());
        }
    }
}

#[test]
fn measured_rows_shift_offsets_and_lookups() {
    let mut w = RowWindow::new(WindowOptions::new(10).with_overscan(0));
    w.set_row_count(5);
    w.set_viewport_height(25);
    assert_eq!(w.total_height(), 50);

    assert_eq!(w.measure(1, 30), 20);
    assert!(w.is_measured(1));
    assert_eq!(w.total_height(), 70);
    assert_eq!(w.row_start(2), Some(40));
    assert_eq!(w.index_at_offset(39), Some(1));
    assert_eq!(w.index_at_offset(40), Some(2));

    assert_eq!(w.scroll_to_row(4, Align::End), 45);
    assert_eq!(w.visible_range().indexes(), 2..5);

    // A new derivation invalidates measurements.
    w.set_row_count(5);
    assert!(!w.is_measured(1));
    assert_eq!(w.total_height(), 50);
}

#[test]
fn property_measured_positions_match_prefix_sums() {
    let mut rng = Lcg::new(42);
    for _ in 0..50 {
        let rows = rng.gen_range_usize(1, 200);
        let mut w = RowWindow::new(WindowOptions::new(rng.gen_range_u32(1, 40)));
        w.set_row_count(rows);

        let mut heights: Vec<u32> = (0..rows).map(|_| w.options().row_height).collect();
        for _ in 0..rng.gen_range_usize(1, 60) {
            let i = rng.gen_range_usize(0, rows);
            let h = rng.gen_range_u32(1, 80);
            w.measure(i, h);
            heights[i] = h;
        }

        let mut start = 0u64;
        for (i, &h) in heights.iter().enumerate() {
            assert_eq!(w.row_start(i), Some(start));
            assert_eq!(w.index_at_offset(start), Some(i));
            start += h as u64;
        }
        assert_eq!(w.total_height(), start);
    }
}

#[test]
fn align_auto_keeps_fully_visible_rows() {
    let mut w = RowWindow::new(WindowOptions::new(20).with_viewport_height(100));
    w.set_row_count(50);
    w.set_scroll_offset(200);
    assert_eq!(w.scroll_to_row_offset(12, Align::Auto), 200);
    assert_eq!(w.scroll_to_row_offset(5, Align::Auto), 100);
    assert_eq!(w.scroll_to_row_offset(20, Align::Auto), 320);
    assert_eq!(w.scroll_to_row_offset(20, Align::Center), 360);
}

// Column layout.

#[test]
fn resize_clamps_to_max_width() {
    let cols = vec![
        ColumnDescriptor::new("a")
            .with_width_bounds(50, 500)
            .with_default_width(200),
    ];
    let mut layout = ColumnLayoutManager::new(cols);
    assert_eq!(layout.width_of("a"), Some(200));

    assert_eq!(layout.resize("a", 1_000, 0), Some(LayoutChange::Sizing));
    assert_eq!(layout.width_of("a"), Some(500));

    assert_eq!(layout.resize("a", 1_000, 0), None);
    layout.resize("a", -10_000, 0);
    assert_eq!(layout.width_of("a"), Some(50));
    assert_eq!(layout.resize("missing", 10, 0), None);
}

#[test]
fn auto_fit_uses_widest_measurement_plus_padding() {
    let cols = vec![ColumnDescriptor::new("a").with_width_bounds(40, 300)];
    let mut layout = ColumnLayoutManager::new(cols).with_auto_fit_padding(16);

    layout.auto_fit("a", &[80, 120, 95], 0);
    assert_eq!(layout.width_of("a"), Some(136));

    layout.auto_fit("a", &[1_000], 0);
    assert_eq!(layout.width_of("a"), Some(300));

    // Nothing rendered: padding alone, clamped to the minimum.
    layout.auto_fit("a", &[], 0);
    assert_eq!(layout.width_of("a"), Some(40));
}

#[test]
fn reorder_moves_column_into_target_slot() {
    let mut layout = ColumnLayoutManager::new(vec![
        ColumnDescriptor::new("a"),
        ColumnDescriptor::new("b"),
        ColumnDescriptor::new("c"),
        ColumnDescriptor::new("d"),
    ]);
    layout.reorder("d", "a", 0);
    assert_eq!(layout.state().column_order, ["d", "a", "b", "c"]);
    layout.reorder("d", "b", 0);
    assert_eq!(layout.state().column_order, ["a", "b", "d", "c"]);
    assert_eq!(layout.reorder("a", "a", 0), None);
    assert_eq!(layout.reorder("a", "zzz", 0), None);
}

#[test]
fn reset_order_restores_declaration_order() {
    let mut layout = ColumnLayoutManager::new(columns());
    layout.reorder("group", "id", 0);
    layout.resize("name", 30, 0);
    assert_eq!(layout.state().column_order, ["group", "id", "name"]);

    assert_eq!(layout.reset_order(0), Some(LayoutChange::Order));
    assert_eq!(layout.state().column_order, ["id", "name", "group"]);
    // Widths are left alone.
    assert_eq!(layout.width_of("name"), Some(180));
    assert_eq!(layout.reset_order(0), None);
}

#[test]
fn hidden_columns_leave_visible_order_and_total_width() {
    let mut layout = ColumnLayoutManager::new(columns());
    assert_eq!(layout.total_width(), 450);
    assert_eq!(layout.set_visibility("name", false, 0), Some(LayoutChange::Visibility));
    assert_eq!(layout.set_visibility("name", false, 0), None);
    let visible: Vec<&str> = layout.visible_columns().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(visible, ["id", "group"]);
    assert_eq!(layout.total_width(), 300);

    assert_eq!(layout.reset_all(0), vec![LayoutChange::Visibility]);
    assert_eq!(layout.visible_count(), 3);
}

#[test]
fn saved_preferences_are_normalized_on_load() {
    let store = Arc::new(MemoryStore::default());
    store.saved.lock().unwrap().insert(
        "grid".into(),
        ColumnPreferences {
            column_sizing: [("name".to_owned(), 10_000), ("gone".to_owned(), 90)].into(),
            column_order: vec!["group".into(), "gone".into(), "id".into()],
            column_visibility: [("id".to_owned(), false)].into(),
        },
    );
    let layout = ColumnLayoutManager::new(vec![
        ColumnDescriptor::new("id"),
        ColumnDescriptor::new("name").with_width_bounds(20, 400),
        ColumnDescriptor::new("group"),
    ])
    .with_store(store, "grid");

    assert_eq!(layout.width_of("name"), Some(400));
    assert_eq!(layout.state().column_order, ["group", "id", "name"]);
    assert!(!layout.state().column_sizing.contains_key("gone"));
    assert!(!layout.is_visible("id"));
}

#[test]
fn preference_saves_are_debounced_and_dropped_on_dispose() {
    let store = Arc::new(MemoryStore::default());
    let saved = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&saved);
    let on_save: PreferencesCallback = Arc::new(move |_: &ColumnPreferences| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut layout = ColumnLayoutManager::new(columns())
        .with_debounce_ms(300)
        .with_store(store.clone(), "grid")
        .with_on_save(Some(on_save));

    layout.resize("id", 10, 0);
    layout.resize("id", 10, 100);
    assert!(layout.tick(399).is_none());
    let prefs = layout.tick(400).expect("flushed");
    assert_eq!(prefs.column_sizing.get("id"), Some(&170));
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    assert_eq!(saved.load(Ordering::SeqCst), 1);
    assert!(layout.tick(10_000).is_none());

    layout.resize("id", 10, 1_000);
    layout.dispose();
    assert!(layout.tick(5_000).is_none());
    assert!(layout.flush().is_none());
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_preference_store_is_swallowed() {
    let mut layout = ColumnLayoutManager::new(columns())
        .with_debounce_ms(0)
        .with_store(Arc::new(FailingStore), "grid");
    layout.resize("id", 5, 0);
    assert!(layout.tick(0).is_some());
    assert_eq!(layout.width_of("id"), Some(155));
}

// Selection.

#[test]
fn range_select_mirrors_selected_anchor() {
    let order = ["A", "B", "C", "D", "E"];
    let mut sel = SelectionManager::new(SelectionMode::Multi);
    sel.toggle("C");
    sel.range_select("E", &"C", &order);

    let mut selected = sel.selected_ids();
    selected.sort_unstable();
    assert_eq!(selected, ["C", "D", "E"]);
    assert!(!sel.is_selected(&"A"));
    assert!(!sel.is_selected(&"B"));
    assert_eq!(sel.state().last_anchor(), Some(&"C"));
}

#[test]
fn range_select_mirrors_deselected_anchor() {
    let order = [1, 2, 3, 4, 5, 6];
    let mut sel = SelectionManager::new(SelectionMode::Multi);
    sel.select_all_on_page(order);
    sel.toggle(5);
    sel.range_select(2, &5, &order);
    let mut selected = sel.selected_ids();
    selected.sort_unstable();
    assert_eq!(selected, [1, 6]);
}

#[test]
fn range_select_without_anchor_in_order_toggles() {
    let mut sel = SelectionManager::new(SelectionMode::Multi);
    sel.range_select(3, &99, &[1, 2, 3]);
    assert_eq!(sel.selected_ids(), [3]);
    sel.extend_to(1, &[1, 2, 3]);
    let mut selected = sel.selected_ids();
    selected.sort_unstable();
    assert_eq!(selected, [1, 2, 3]);
}

#[test]
fn single_mode_keeps_at_most_one_row() {
    let mut sel = SelectionManager::new(SelectionMode::Single);
    sel.toggle(1);
    sel.toggle(2);
    assert_eq!(sel.selected_ids(), [2]);
    sel.range_select(4, &2, &[1, 2, 3, 4]);
    assert_eq!(sel.selected_ids(), [4]);
    assert_eq!(sel.select_all_on_page([1, 2, 3]), 0);
    sel.replace(SelectionState::from_ids([7, 8]));
    assert!(sel.len() <= 1);
}

#[test]
fn select_all_prompt_needs_full_page_of_larger_dataset() {
    let page = [1, 2, 3];
    let mut sel = SelectionManager::new(SelectionMode::Multi);
    sel.toggle(1);
    assert_eq!(sel.page_status(&page), PageSelection::Partial);
    assert!(!sel.select_all_prompt(&page, 10));

    sel.select_all_on_page(page);
    assert_eq!(sel.page_status(&page), PageSelection::All);
    assert!(sel.select_all_prompt(&page, 10));
    assert!(!sel.select_all_prompt(&page, 3));

    assert!(sel.toggle_page(&page));
    assert_eq!(sel.page_status(&page), PageSelection::None);
}

#[test]
fn property_selection_holds_only_selected_ids() {
    let mut rng = Lcg::new(7);
    let order: Vec<u32> = (0..20).collect();
    let mut sel = SelectionManager::new(SelectionMode::Multi);
    for _ in 0..2_000 {
        let id = rng.gen_range_u32(0, 24);
        match rng.gen_range_u32(0, 5) {
            0 => {
                sel.toggle(id);
            }
            1 => {
                let anchor = rng.gen_range_u32(0, 24);
                sel.range_select(id, &anchor, &order);
            }
            2 => {
                sel.set_selected(id, rng.gen_bool());
            }
            3 => {
                sel.extend_to(id, &order);
            }
            _ => {
                sel.retain(|k| *k != id);
            }
        }
        let state = sel.state();
        assert_eq!(state.iter().count(), state.len());
        assert!(state.iter().all(|k| state.is_selected(k)));
    }
}

// Derived rows.

#[test]
fn sort_toggle_cycles_and_multi_keeps_priority() {
    let s = SortState::new().toggled("a", false);
    assert_eq!(s.direction_of("a"), Some(SortDirection::Ascending));
    let s = s.toggled("a", false);
    assert_eq!(s.direction_of("a"), Some(SortDirection::Descending));
    assert!(s.toggled("a", false).is_empty());

    let s = SortState::single("a", SortDirection::Ascending).toggled("b", true);
    assert_eq!(s.entries(), [SortEntry::ascending("a"), SortEntry::ascending("b")]);
    let s = s.toggled("a", true);
    assert_eq!(s.entries(), [SortEntry::descending("a"), SortEntry::ascending("b")]);
    let s = s.toggled("b", false);
    assert_eq!(s.entries(), [SortEntry::descending("b")]);
}

#[test]
fn property_sort_is_stable_in_both_directions() {
    let mut rng = Lcg::new(99);
    let model = row_model();
    for _ in 0..50 {
        let rows: Vec<Person> = (0..rng.gen_range_u32(1, 300))
            .map(|id| Person {
                group: rng.gen_range_u32(0, 5),
                ..person(id)
            })
            .collect();
        for direction in [SortDirection::Ascending, SortDirection::Descending] {
            let sort = SortState::single("group", direction);
            let mut order: Vec<usize> = (0..rows.len()).collect();
            sort_rows(&mut order, &rows, &sort, &model);
            for pair in order.windows(2) {
                let (a, b) = (&rows[pair[0]], &rows[pair[1]]);
                if a.group == b.group {
                    assert!(a.id < b.id, "equal rows must keep their relative order");
                } else if direction == SortDirection::Ascending {
                    assert!(a.group < b.group);
                } else {
                    assert!(a.group > b.group);
                }
            }
        }
    }
}

#[test]
fn multi_column_sort_breaks_ties_in_priority_order() {
    let rows = vec![
        Person { id: 0, name: "b".into(), group: 1 },
        Person { id: 1, name: "a".into(), group: 2 },
        Person { id: 2, name: "a".into(), group: 1 },
        Person { id: 3, name: "b".into(), group: 2 },
    ];
    let sort = SortState::from_entries([SortEntry::ascending("name"), SortEntry::descending("group")]);
    let mut order: Vec<usize> = (0..rows.len()).collect();
    sort_rows(&mut order, &rows, &sort, &row_model());
    assert_eq!(order, [1, 2, 3, 0]);
}

#[test]
fn property_pipeline_is_idempotent() {
    let mut rng = Lcg::new(2024);
    let pipeline = DerivedRowPipeline::new(row_model());
    let rows = people(500);
    for _ in 0..100 {
        let mut sort = SortState::new();
        for col in ["group", "name", "id"] {
            if rng.gen_bool() {
                sort = sort.toggled(col, true);
            }
        }
        let mut filters = FilterState::new();
        if rng.gen_bool() {
            filters.set("name", Some(format!("{}", rng.gen_range_u32(0, 10))));
        }
        let pagination =
            PaginationState::new(rng.gen_range_usize(1, 80)).with_page_index(rng.gen_range_usize(0, 12));

        let first = pipeline.run(&rows, &sort, &filters, &pagination);
        let second = pipeline.run(&rows, &sort, &filters, &pagination);
        assert_eq!(first, second);
        assert!(first.page().len() <= pagination.page_size);
        assert!(first.page_count() >= 1);
    }
}

#[test]
fn filters_combine_column_and_global_predicates() {
    let rows = people(120);
    let filters = FilterState::new()
        .with_column("name", "-01".to_owned())
        .with_global("  5 ");
    let kept = filter_rows(&rows, &filters, &row_model());
    assert_eq!(kept, [105, 115]);

    // Columns without a predicate ignore their filter value.
    let filters = FilterState::new().with_column("group", "x".to_owned());
    assert_eq!(filter_rows(&rows, &filters, &row_model()).len(), 120);
}

#[test]
fn out_of_range_page_is_empty() {
    let order: Vec<usize> = (0..25).collect();
    assert_eq!(paginate(&order, &PaginationState::new(10).with_page_index(2)), [20, 21, 22, 23, 24]);
    assert!(paginate(&order, &PaginationState::new(10).with_page_index(3)).is_empty());
    assert_eq!(page_count_for(0, 10), 1);
    assert_eq!(page_count_for(25, 10), 3);
}

#[test]
fn custom_stages_replace_defaults() {
    let pipeline = DerivedRowPipeline::new(row_model())
        .with_filter_stage(|rows: &[Person], _: &FilterState<String>| {
            (0..rows.len()).filter(|i| i % 2 == 0).collect()
        })
        .with_sort_stage(|order: &mut [usize], _: &[Person], _: &SortState| order.reverse());
    let derived = pipeline.run(
        &people(10),
        &SortState::new(),
        &FilterState::new(),
        &PaginationState::new(3),
    );
    assert_eq!(derived.page(), [8, 6, 4]);
    assert_eq!(derived.filtered_count(), 5);
    assert_eq!(derived.page_count(), 2);
}

// Focus.

#[test]
fn focus_navigation_reports_boundaries() {
    let mut focus = GridFocusController::with_bounds(3, 4);
    assert!(focus.is_focusable(0, 0));
    assert_eq!(focus.navigate(NavKey::Left), NavOutcome::Unchanged);
    assert_eq!(
        focus.navigate(NavKey::Up),
        NavOutcome::BoundaryCrossed {
            direction: PageDirection::Previous,
            col: 0
        }
    );
    assert_eq!(focus.navigate(NavKey::End), NavOutcome::Moved(FocusPosition::new(0, 3)));
    assert_eq!(focus.navigate(NavKey::Right), NavOutcome::Unchanged);
    assert_eq!(focus.navigate(NavKey::GridEnd), NavOutcome::Moved(FocusPosition::new(2, 3)));
    assert_eq!(
        focus.navigate(NavKey::Down),
        NavOutcome::BoundaryCrossed {
            direction: PageDirection::Next,
            col: 3
        }
    );
    assert_eq!(
        focus.navigate(NavKey::PageUp),
        NavOutcome::PageRequested {
            direction: PageDirection::Previous,
            row_offset: 2,
            col: 3
        }
    );
    assert_eq!(focus.navigate(NavKey::GridStart), NavOutcome::Moved(FocusPosition::new(0, 0)));
}

#[test]
fn focus_is_clamped_when_bounds_shrink() {
    let mut focus = GridFocusController::with_bounds(10, 5);
    focus.set_position(8, 4);
    focus.set_bounds(4, 2);
    assert_eq!(focus.position(), FocusPosition::new(3, 1));

    focus.set_position(100, 100);
    assert_eq!(focus.position(), FocusPosition::new(3, 1));

    focus.set_bounds(0, 2);
    assert_eq!(focus.navigate(NavKey::Down), NavOutcome::Unchanged);
    assert!(!focus.is_focusable(0, 0));
}

// Controller, local mode.

#[test]
fn filter_change_clears_selection_and_resets_page() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(100));
    assert!(grid.go_to_page(3, FocusSeed::Keep, 0));
    assert_eq!(grid.page_row_ids(), ids(30..40));
    grid.toggle_row(35);
    grid.toggle_row(36);
    events.lock().unwrap().clear();

    assert!(grid.set_column_filter("name", Some("person-000".into()), 0));
    assert_eq!(grid.pagination().page_index, 0);
    assert!(grid.selection().is_empty());
    assert_eq!(grid.total_row_count(), 10);
    assert_eq!(grid.page_row_ids(), ids(0..10));

    let events = events.lock().unwrap();
    assert!(matches!(events[0], GridEvent::FilterChange { .. }));
    assert!(events.iter().any(|e| matches!(
        e,
        GridEvent::PaginationChange { pagination, cause: PaginationChangeCause::FilterReset }
            if pagination.page_index == 0
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        GridEvent::SelectionChange { selection, reason: SelectionChangeReason::FilterChanged }
            if selection.is_empty()
    )));
}

#[test]
fn preserved_selection_survives_filter_change() {
    let events = Events::default();
    let options = local_options(&events).with_preserve_selection_on_filter(true);
    let mut grid = GridStateController::new(options).with_rows(people(30));
    grid.toggle_row(3);
    grid.set_global_filter("person-002", 0);
    assert!(grid.selection().is_selected(&3));
    assert_eq!(grid.total_row_count(), 10);
}

#[test]
fn non_filterable_and_unknown_columns_are_ignored() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(30));
    assert!(!grid.set_column_filter("group", Some("1".into()), 0));
    assert!(!grid.set_column_filter("missing", Some("1".into()), 0));
    assert!(!grid.toggle_sort("missing", false, 0));
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn toggled_sort_reorders_page_rows() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(30));
    assert!(grid.toggle_sort("group", false, 0));
    assert_eq!(grid.page_row_ids(), [0, 7, 14, 21, 28, 1, 8, 15, 22, 29]);
    assert!(grid.toggle_sort("group", false, 0));
    assert_eq!(grid.page_row_ids()[..4], [6, 13, 20, 27]);
    assert!(grid.toggle_sort("group", false, 0));
    assert_eq!(grid.page_row_ids(), ids(0..10));
}

#[test]
fn controlled_sort_emits_without_committing() {
    let events = Events::default();
    let options = local_options(&events).with_controlled(ControlledState {
        sort: true,
        ..ControlledState::default()
    });
    let mut grid = GridStateController::new(options).with_rows(people(30));

    assert!(grid.toggle_sort("group", false, 0));
    assert!(grid.sort().is_empty());
    let proposed = match events.lock().unwrap().last() {
        Some(GridEvent::SortChange { sort, column_id }) => {
            assert_eq!(column_id.as_deref(), Some("group"));
            sort.clone()
        }
        other => panic!("unexpected event: {other:?}"),
    };
    assert_eq!(grid.page_row_ids(), ids(0..10));

    grid.set_sort(proposed, 0);
    assert_eq!(grid.page_row_ids()[..3], [0, 7, 14]);
}

#[test]
fn controlled_column_sizing_waits_for_host() {
    let events = Events::default();
    let options = local_options(&events).with_controlled(ControlledState {
        column_sizing: true,
        ..ControlledState::default()
    });
    let mut grid = GridStateController::new(options).with_rows(people(5));

    assert!(grid.resize_column("name", 50, 0));
    assert_eq!(grid.columns().width_of("name"), Some(150));
    let sizing = match events.lock().unwrap().last() {
        Some(GridEvent::ColumnSizingChange { sizing, .. }) => sizing.clone(),
        other => panic!("unexpected event: {other:?}"),
    };
    assert_eq!(sizing.get("name"), Some(&200));

    let mut layout = grid.columns().state().clone();
    layout.column_sizing = sizing;
    grid.set_column_layout(layout, 0);
    assert_eq!(grid.columns().width_of("name"), Some(200));

    // Order is not controlled and commits right away.
    assert!(grid.reorder_column("group", "id", 0));
    assert_eq!(grid.visible_column_ids(), ["group", "id", "name"]);
}

#[test]
fn shrinking_rows_clamps_page_index() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(100));
    grid.go_to_page(9, FocusSeed::Keep, 0);
    events.lock().unwrap().clear();

    grid.set_rows(people(25), 0);
    assert_eq!(grid.pagination().page_index, 2);
    assert_eq!(grid.page_count(), 3);
    assert_eq!(grid.page_row_ids(), ids(20..25));
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        GridEvent::PaginationChange { cause: PaginationChangeCause::Clamped, .. }
    )));
}

#[test]
fn replacing_rows_prunes_vanished_selection() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(30));
    grid.toggle_row(2);
    grid.toggle_row(25);
    grid.set_rows(people(20), 0);
    assert!(grid.selection().is_selected(&2));
    assert!(!grid.selection().is_selected(&25));
}

#[test]
fn go_to_page_past_the_end_is_clamped() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(25));
    assert!(grid.go_to_page(100, FocusSeed::Keep, 0));
    assert_eq!(grid.pagination().page_index, 2);
    assert!(!grid.next_page(0));
    assert!(grid.previous_page(0));
    assert_eq!(grid.pagination().page_index, 1);
}

#[test]
fn page_size_change_keeps_first_row_in_view() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(100));
    grid.go_to_page(4, FocusSeed::Keep, 0);
    assert!(grid.set_page_size(25, 0));
    assert_eq!(grid.pagination().page_index, 1);
    assert_eq!(grid.page_row_ids(), ids(25..50));
}

#[test]
fn focus_crosses_pages_and_follows_scroll() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(25));
    assert_eq!(grid.focus().bounds(), GridBounds { row_count: 10, col_count: 3 });

    assert_eq!(grid.navigate(NavKey::GridEnd), NavOutcome::Moved(FocusPosition::new(9, 2)));
    // 5 rows of 20px fit in the viewport: row 9 ends at 200.
    assert_eq!(grid.window().scroll_offset(), 100);
    assert_eq!(grid.window().visible_range().indexes(), 5..10);

    let NavOutcome::BoundaryCrossed { direction, .. } = grid.navigate(NavKey::Down) else {
        panic!("expected a boundary crossing");
    };
    assert!(grid.go_to_page(1, FocusSeed::AfterCrossing(direction), 0));
    assert_eq!(grid.focus().position(), FocusPosition::new(0, 2));
    assert_eq!(grid.focused_row_id(), Some(10));
    assert_eq!(grid.window().scroll_offset(), 0);

    let NavOutcome::BoundaryCrossed { direction, .. } = grid.navigate(NavKey::Up) else {
        panic!("expected a boundary crossing");
    };
    grid.go_to_page(0, FocusSeed::AfterCrossing(direction), 0);
    assert_eq!(grid.focus().position(), FocusPosition::new(9, 2));

    grid.go_to_page(1, FocusSeed::Keep, 0);
    grid.set_focus(7, 2);
    let NavOutcome::PageRequested { row_offset, .. } = grid.navigate(NavKey::PageDown) else {
        panic!("expected a page request");
    };
    grid.go_to_page(2, FocusSeed::Row(row_offset), 0);
    // The last page has 5 rows.
    assert_eq!(grid.focus().position(), FocusPosition::new(4, 2));
}

#[test]
fn hiding_a_column_reclamps_focus() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(5));
    grid.set_focus(2, 2);
    assert!(grid.set_column_visibility("group", false, 0));
    assert_eq!(grid.focus().bounds().col_count, 2);
    assert_eq!(grid.focus().position(), FocusPosition::new(2, 1));
    assert_eq!(grid.focused_column().map(|c| c.id.as_str()), Some("name"));
}

#[test]
fn select_all_scopes_in_local_mode() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(25));
    assert_eq!(grid.select_all(SelectAllScope::Page), SelectAllOutcome::Applied(10));
    assert_eq!(grid.page_selection(), PageSelection::All);
    assert!(grid.select_all_prompt());

    assert_eq!(grid.select_all(SelectAllScope::Dataset), SelectAllOutcome::Applied(15));
    assert_eq!(grid.selection().len(), 25);
    assert!(!grid.select_all_prompt());

    assert!(grid.clear_selection());
    assert!(grid.selection().is_empty());
}

#[test]
fn header_checkbox_toggles_the_page() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(25));
    grid.toggle_row(2);
    assert_eq!(grid.page_selection(), PageSelection::Partial);

    assert!(grid.toggle_page_selection());
    assert_eq!(grid.page_selection(), PageSelection::All);
    assert_eq!(grid.selection().len(), 10);

    assert!(grid.toggle_page_selection());
    assert_eq!(grid.page_selection(), PageSelection::None);
    assert!(grid.selection().is_empty());
    assert!(matches!(
        events.lock().unwrap().last(),
        Some(GridEvent::SelectionChange { reason: SelectionChangeReason::SelectAll, .. })
    ));
}

#[test]
fn selection_changes_without_a_listener() {
    let options = GridOptions::new(columns(), |p: &Person| p.id)
        .with_row_model(row_model())
        .with_page_size(10);
    let mut grid = GridStateController::new(options).with_rows(people(25));
    assert_eq!(grid.select_all(SelectAllScope::Dataset), SelectAllOutcome::Applied(25));
    assert!(grid.toggle_row(4));
    assert!(!grid.selection().is_selected(&4));
    assert_eq!(grid.selection().len(), 24);
    assert!(grid.extend_selection(6));
    assert!(!grid.selection().is_selected(&5));
    assert!(!grid.selection().is_selected(&6));
}

#[test]
fn controlled_selection_waits_for_host_and_survives_filter_change() {
    let events = Events::default();
    let options = local_options(&events).with_controlled(ControlledState {
        selection: true,
        ..ControlledState::default()
    });
    let mut grid = GridStateController::new(options).with_rows(people(30));

    assert!(grid.toggle_row(3));
    assert!(grid.selection().is_empty());
    let proposed = match events.lock().unwrap().last() {
        Some(GridEvent::SelectionChange { selection, reason: SelectionChangeReason::User }) => {
            selection.clone()
        }
        other => panic!("unexpected event: {other:?}"),
    };
    assert!(proposed.is_selected(&3));

    let emitted = events.lock().unwrap().len();
    grid.set_selection(proposed);
    assert!(grid.selection().is_selected(&3));
    assert_eq!(events.lock().unwrap().len(), emitted);

    // The clear is proposed, not applied.
    assert!(grid.set_global_filter("person-002", 0));
    assert_eq!(grid.total_row_count(), 10);
    assert!(grid.selection().is_selected(&3));
    let events = events.lock().unwrap();
    assert!(events[emitted..].iter().any(|e| matches!(e, GridEvent::FilterChange { .. })));
    assert!(events[emitted..].iter().any(|e| matches!(
        e,
        GridEvent::SelectionChange { selection, reason: SelectionChangeReason::FilterChanged }
            if selection.is_empty()
    )));
}

#[test]
fn controlled_filters_apply_on_host_commit() {
    let events = Events::default();
    let options = local_options(&events).with_controlled(ControlledState {
        filters: true,
        ..ControlledState::default()
    });
    let mut grid = GridStateController::new(options).with_rows(people(100));
    grid.go_to_page(2, FocusSeed::Keep, 0);
    events.lock().unwrap().clear();

    assert!(grid.set_global_filter("person-001", 0));
    assert_eq!(grid.filters().global(), "");
    assert_eq!(grid.pagination().page_index, 2);
    assert_eq!(grid.total_row_count(), 100);
    let proposed = match events.lock().unwrap().as_slice() {
        [GridEvent::FilterChange { filters, column_id: None }] => filters.clone(),
        other => panic!("unexpected events: {other:?}"),
    };
    events.lock().unwrap().clear();

    grid.set_filters(proposed, 0);
    assert_eq!(grid.filters().global(), "person-001");
    assert_eq!(grid.total_row_count(), 10);
    assert_eq!(grid.pagination().page_index, 0);
    assert_eq!(grid.page_row_ids(), ids(10..20));
    let events = events.lock().unwrap();
    assert!(!events.iter().any(|e| matches!(e, GridEvent::FilterChange { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        GridEvent::PaginationChange { cause: PaginationChangeCause::FilterReset, .. }
    )));
}

#[test]
fn controlled_pagination_applies_on_host_commit() {
    let events = Events::default();
    let options = local_options(&events).with_controlled(ControlledState {
        pagination: true,
        ..ControlledState::default()
    });
    let mut grid = GridStateController::new(options).with_rows(people(100));

    assert!(grid.go_to_page(3, FocusSeed::Keep, 0));
    assert_eq!(grid.pagination().page_index, 0);
    assert_eq!(grid.page_row_ids(), ids(0..10));
    let proposed = match events.lock().unwrap().last() {
        Some(GridEvent::PaginationChange { pagination, cause: PaginationChangeCause::User }) => {
            *pagination
        }
        other => panic!("unexpected event: {other:?}"),
    };
    assert_eq!(proposed.page_index, 3);

    let emitted = events.lock().unwrap().len();
    grid.set_pagination(proposed, 0);
    assert_eq!(grid.pagination().page_index, 3);
    assert_eq!(grid.page_row_ids(), ids(30..40));
    assert_eq!(events.lock().unwrap().len(), emitted);
}

#[test]
fn replacing_columns_reclamps_focus() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(5));
    grid.set_focus(2, 2);

    grid.set_columns(vec![ColumnDescriptor::new("id"), ColumnDescriptor::new("name")]);
    assert_eq!(grid.visible_column_ids(), ["id", "name"]);
    assert_eq!(grid.focus().bounds(), GridBounds { row_count: 5, col_count: 2 });
    assert_eq!(grid.focus().position(), FocusPosition::new(2, 1));

    grid.set_columns(vec![
        ColumnDescriptor::new("id"),
        ColumnDescriptor::new("name"),
        ColumnDescriptor::new("email"),
    ]);
    assert_eq!(grid.visible_column_ids(), ["id", "name", "email"]);
    assert_eq!(grid.focus().bounds().col_count, 3);
    assert_eq!(grid.focus().position(), FocusPosition::new(2, 1));
}

#[test]
fn auto_fit_through_controller_uses_padding() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(5));
    assert!(grid.auto_fit_column("name", &[180, 220], 0));
    assert_eq!(grid.columns().width_of("name"), Some(236));
    assert!(matches!(
        events.lock().unwrap().last(),
        Some(GridEvent::ColumnSizingChange { column_id: Some(id), .. }) if id == "name"
    ));
    assert!(!grid.auto_fit_column("name", &[220], 0));
    assert!(!grid.auto_fit_column("missing", &[220], 0));
}

#[test]
fn reset_column_layout_restores_defaults() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(5));
    grid.resize_column("name", 50, 0);
    grid.reorder_column("group", "id", 0);
    grid.set_column_visibility("id", false, 0);
    assert_eq!(grid.visible_column_ids(), ["group", "name"]);
    events.lock().unwrap().clear();

    assert!(grid.reset_column_layout(0));
    assert_eq!(grid.visible_column_ids(), ["id", "name", "group"]);
    assert_eq!(grid.columns().width_of("name"), Some(150));
    assert_eq!(grid.focus().bounds().col_count, 3);
    {
        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, GridEvent::ColumnSizingChange { .. })));
        assert!(events.iter().any(|e| matches!(e, GridEvent::ColumnOrderChange { .. })));
        assert!(events.iter().any(|e| matches!(e, GridEvent::ColumnVisibilityChange { .. })));
    }
    assert!(!grid.reset_column_layout(0));
}

#[test]
fn shift_range_uses_full_display_order() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(30));
    grid.toggle_sort("group", false, 0);
    // Display order starts 0, 7, 14, 21, 28, 1, ...
    grid.toggle_row(7);
    grid.extend_selection(28);
    let mut selected: Vec<u32> = grid.selection().iter().copied().collect();
    selected.sort_unstable();
    assert_eq!(selected, [7, 14, 21, 28]);
}

#[test]
fn batch_update_derives_once() {
    let events = Events::default();
    let mut grid = GridStateController::new(local_options(&events)).with_rows(people(50));
    grid.batch_update(|g| {
        g.toggle_sort("group", false, 0);
        g.set_global_filter("person-00", 0);
        // Still the old derivation inside the batch.
        assert_eq!(g.page_row_ids(), ids(0..10));
    });
    assert_eq!(grid.total_row_count(), 50);
    assert_eq!(grid.page_row_ids()[..3], [0, 7, 14]);
}

#[test]
fn rendered_rows_follow_window() {
    let events = Events::default();
    let options = local_options(&events).with_page_size(50);
    let mut grid = GridStateController::new(options).with_rows(people(50));
    grid.on_scroll(400, 100);
    let rendered: Vec<usize> = grid.rendered_rows().iter().map(|(i, _)| *i).collect();
    // Rows 20..25 are visible, widened by the default overscan of 5.
    assert_eq!(rendered, (15..30).collect::<Vec<_>>());

    let snap = grid.snapshot();
    assert_eq!(snap.mode, GridMode::Local);
    assert_eq!(snap.visible_range.indexes(), 20..25);
    assert_eq!(snap.total_height, 1_000);
    assert_eq!(snap.page_row_ids.len(), 50);
}

#[test]
fn controller_flushes_preferences_on_tick() {
    let events = Events::default();
    let store = Arc::new(MemoryStore::default());
    let options = local_options(&events).with_preference_store(store.clone(), "people");
    let mut grid = GridStateController::new(options).with_rows(people(5));

    grid.resize_column("id", 30, 1_000);
    assert!(!grid.tick(1_200));
    assert!(grid.tick(1_300));
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        GridEvent::ColumnPreferencesChange { preferences }
            if preferences.column_sizing.get("id") == Some(&180)
    )));

    // A second grid restores the saved layout.
    let grid = GridStateController::new(
        local_options(&Events::default()).with_preference_store(store, "people"),
    );
    assert_eq!(grid.columns().width_of("id"), Some(180));
}

#[test]
fn dispose_drops_pending_preference_save() {
    let events = Events::default();
    let store = Arc::new(MemoryStore::default());
    let options = local_options(&events).with_preference_store(store.clone(), "people");
    let mut grid = GridStateController::new(options).with_rows(people(5));
    grid.set_column_visibility("name", false, 0);
    grid.dispose();
    assert!(!grid.tick(10_000));
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
}

// Fetch coordination.

#[test]
fn late_response_of_superseded_request_is_discarded() {
    let mut fetch: FetchCoordinator<u32, String> = FetchCoordinator::new(300);
    let a = fetch.request(params(0, 2), FetchTrigger::Pagination, 0).unwrap();
    let b = fetch.request(params(1, 2), FetchTrigger::Pagination, 0).unwrap();
    assert!(a.cancel.is_cancelled());
    assert!(!b.cancel.is_cancelled());

    // B resolves first, then A's response arrives anyway.
    let applied = fetch.complete(FetchCompletion {
        generation: b.generation,
        result: Ok(FetchResponse::new(vec![10, 11], 12)),
    });
    assert_eq!(applied, FetchApply::Applied);
    let stale = fetch.complete(FetchCompletion {
        generation: a.generation,
        result: Ok(FetchResponse::new(vec![0, 1], 12)),
    });
    assert_eq!(stale, FetchApply::Stale);
    assert_eq!(fetch.rows(), [10, 11]);
    assert_eq!(fetch.page_count(), 6);
}

#[test]
fn failure_keeps_rows_and_retry_reissues_params() {
    let mut fetch: FetchCoordinator<u32, String> = FetchCoordinator::new(0);
    let first = fetch.request(params(0, 2), FetchTrigger::Initial, 0).unwrap();
    assert_eq!(fetch.status(), FetchStatus::Loading);
    fetch.complete(FetchCompletion {
        generation: first.generation,
        result: Ok(FetchResponse::new(vec![1, 2], 4)),
    });
    assert_eq!(fetch.status(), FetchStatus::Idle);
    assert!(fetch.has_loaded());

    let second = fetch.request(params(1, 2), FetchTrigger::Pagination, 0).unwrap();
    assert_eq!(fetch.status(), FetchStatus::Updating);
    let failed = fetch.complete(FetchCompletion {
        generation: second.generation,
        result: Err(FetchError::transient("timed out")),
    });
    assert_eq!(failed, FetchApply::Failed);
    assert_eq!(fetch.rows(), [1, 2]);
    assert_eq!(
        fetch.error(),
        Some(&FetchErrorState {
            message: "timed out".into(),
            can_retry: true
        })
    );
    assert_eq!(fetch.status(), FetchStatus::Idle);

    let retry = fetch.retry().unwrap();
    assert_eq!(retry.trigger, FetchTrigger::Retry);
    assert_eq!(retry.params, second.params);
    fetch.complete(FetchCompletion {
        generation: retry.generation,
        result: Ok(FetchResponse::new(vec![3, 4], 4)),
    });
    assert_eq!(fetch.rows(), [3, 4]);
    assert!(fetch.error().is_none());
}

#[test]
fn cancellation_is_not_an_error() {
    let mut fetch: FetchCoordinator<u32, String> = FetchCoordinator::new(0);
    let req = fetch.request(params(0, 2), FetchTrigger::Initial, 0).unwrap();
    let outcome = fetch.complete(FetchCompletion {
        generation: req.generation,
        result: Err(FetchError::Cancelled),
    });
    assert_eq!(outcome, FetchApply::Cancelled);
    assert!(fetch.error().is_none());
}

#[test]
fn malformed_responses_become_permanent_errors() {
    let mut fetch: FetchCoordinator<u32, String> = FetchCoordinator::new(0);
    let req = fetch.request(params(0, 2), FetchTrigger::Initial, 0).unwrap();
    let outcome = fetch.complete(FetchCompletion {
        generation: req.generation,
        result: Ok(FetchResponse::new(vec![1, 2, 3], 3)),
    });
    assert_eq!(outcome, FetchApply::Failed);
    let error = fetch.error().unwrap();
    assert!(!error.can_retry);
    assert!(error.message.starts_with("malformed response"));

    let req = fetch.request(params(0, 2), FetchTrigger::Refresh, 0).unwrap();
    let outcome = fetch.complete(FetchCompletion {
        generation: req.generation,
        result: Ok(FetchResponse::new(vec![1, 2], 10).with_page_count(2)),
    });
    assert_eq!(outcome, FetchApply::Failed);
    assert!(fetch.rows().is_empty());
}

#[test]
fn filter_requests_are_debounced_and_superseded() {
    let mut fetch: FetchCoordinator<u32, String> = FetchCoordinator::new(300);
    let in_flight = fetch.request(params(0, 2), FetchTrigger::Initial, 0).unwrap();

    assert!(fetch.request(params(0, 2), FetchTrigger::Filter, 1_000).is_none());
    assert!(in_flight.cancel.is_cancelled());
    assert!(fetch.has_pending());
    assert!(fetch.is_busy());
    assert!(fetch.tick(1_299).is_none());
    let issued = fetch.tick(1_300).unwrap();
    assert_eq!(issued.trigger, FetchTrigger::Filter);
    assert!(fetch.tick(5_000).is_none());

    assert!(fetch.request(params(0, 2), FetchTrigger::Filter, 6_000).is_none());
    let sort = fetch.request(params(0, 2), FetchTrigger::Sort, 6_010).unwrap();
    assert_eq!(sort.trigger, FetchTrigger::Sort);
    assert!(!fetch.has_pending());
    assert!(fetch.tick(10_000).is_none());
}

#[test]
fn retry_sends_a_debounced_filter_request_instead_of_the_failed_one() {
    let mut fetch: FetchCoordinator<u32, String> = FetchCoordinator::new(300);
    let first = fetch.request(params(0, 2), FetchTrigger::Initial, 0).unwrap();
    fetch.complete(FetchCompletion {
        generation: first.generation,
        result: Ok(FetchResponse::new(vec![1, 2], 4)),
    });
    let failed = fetch.request(params(1, 2), FetchTrigger::Pagination, 10).unwrap();
    fetch.complete(FetchCompletion {
        generation: failed.generation,
        result: Err(FetchError::transient("timed out")),
    });

    let mut filtered = params(0, 2);
    filtered.filters.set_global("7");
    assert!(fetch.request(filtered.clone(), FetchTrigger::Filter, 100).is_none());

    let retry = fetch.retry().unwrap();
    assert_eq!(retry.trigger, FetchTrigger::Retry);
    assert_eq!(retry.params, filtered);
    assert!(!fetch.has_pending());
    assert!(fetch.tick(10_000).is_none());
}

#[test]
fn dispose_cancels_and_ignores_late_work() {
    let mut fetch: FetchCoordinator<u32, String> = FetchCoordinator::new(300);
    let req = fetch.request(params(0, 2), FetchTrigger::Initial, 0).unwrap();
    fetch.request(params(0, 2), FetchTrigger::Filter, 10);
    fetch.dispose();
    assert!(req.cancel.is_cancelled());
    assert!(fetch.tick(10_000).is_none());
    assert!(fetch.retry().is_none());
    assert!(fetch.request(params(0, 2), FetchTrigger::Sort, 0).is_none());
    let outcome = fetch.complete(FetchCompletion {
        generation: req.generation,
        result: Ok(FetchResponse::new(vec![1], 1)),
    });
    assert_eq!(outcome, FetchApply::Stale);
}

#[tokio::test]
async fn fetch_job_resolves_cancelled_when_superseded() {
    let source = ManualSource::default();
    let mut fetch: FetchCoordinator<Person, String> = FetchCoordinator::new(0);
    let req = fetch.request(params(0, 10), FetchTrigger::Initial, 0).unwrap();
    let job = FetchJob::new(&req, &source);
    fetch.cancel();
    let completion = job.run().await;
    assert_eq!(completion.result, Err(FetchError::Cancelled));
    assert!(source.take_one().cancel.is_cancelled());
}

// Controller, remote mode.

#[tokio::test]
async fn superseded_page_request_is_never_applied() {
    let source = ManualSource::default();
    let events = Events::default();
    let mut grid = remote_grid(&source, &events);
    assert_eq!(grid.fetch_status(), FetchStatus::Loading);
    load_initial(&mut grid, &source).await;
    assert_eq!(grid.page_count(), 10);

    assert!(grid.go_to_page(2, FocusSeed::Keep, 0));
    let page2 = grid.take_fetch_job().unwrap();
    assert!(grid.go_to_page(3, FocusSeed::Keep, 0));
    let page3 = grid.take_fetch_job().unwrap();
    assert_eq!(grid.fetch_status(), FetchStatus::Updating);

    let mut requests = source.take();
    let req3 = requests.pop().unwrap();
    let req2 = requests.pop().unwrap();
    assert_eq!(req2.params.page_index, 2);
    assert_eq!(req3.params.page_index, 3);
    assert!(req2.cancel.is_cancelled());

    req3.tx.send(Ok(page_response(&req3.params, 500))).unwrap();
    let _ = req2.tx.send(Ok(page_response(&req2.params, 500)));
    assert_eq!(grid.complete_fetch(page3.run().await), FetchApply::Applied);
    assert_eq!(grid.complete_fetch(page2.run().await), FetchApply::Stale);

    assert_eq!(grid.pagination().page_index, 3);
    assert_eq!(grid.page_row_ids(), ids(150..200));
    assert_eq!(grid.fetch_status(), FetchStatus::Idle);
}

#[tokio::test]
async fn remote_filter_fetch_waits_for_debounce() {
    let source = ManualSource::default();
    let events = Events::default();
    let mut grid = remote_grid(&source, &events);
    load_initial(&mut grid, &source).await;

    grid.set_global_filter("per", 1_000);
    grid.set_global_filter("person-01", 1_200);
    assert!(!grid.has_fetch_job());
    assert!(!grid.tick(1_499));
    assert!(grid.tick(1_500));

    let job = grid.take_fetch_job().unwrap();
    let req = source.take_one();
    assert_eq!(req.params.filters.global(), "person-01");
    assert_eq!(req.params.page_index, 0);
    req.tx.send(Ok(page_response(&req.params, 100))).unwrap();
    assert_eq!(grid.complete_fetch(job.run().await), FetchApply::Applied);
    assert_eq!(grid.total_row_count(), 100);
    assert_eq!(grid.page_count(), 2);
}

#[tokio::test]
async fn remote_sort_fetches_immediately_and_keeps_rows_while_updating() {
    let source = ManualSource::default();
    let events = Events::default();
    let mut grid = remote_grid(&source, &events);
    load_initial(&mut grid, &source).await;

    events.lock().unwrap().clear();
    assert!(grid.toggle_sort("name", false, 0));
    let job = grid.take_fetch_job().unwrap();
    let req = source.take_one();
    assert_eq!(req.params.sort, SortState::single("name", SortDirection::Ascending));
    assert_eq!(grid.page_row_count(), 50);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        GridEvent::FetchStatusChange { status: FetchStatus::Updating, .. }
    )));

    req.tx.send(Err(FetchError::transient("503"))).unwrap();
    assert_eq!(grid.complete_fetch(job.run().await), FetchApply::Failed);
    assert_eq!(grid.page_row_count(), 50);
    assert!(grid.fetch_error().is_some_and(|e| e.can_retry));

    assert!(grid.retry());
    let job = grid.take_fetch_job().unwrap();
    let req = source.take_one();
    req.tx.send(Ok(page_response(&req.params, 500))).unwrap();
    assert_eq!(grid.complete_fetch(job.run().await), FetchApply::Applied);
    assert!(grid.fetch_error().is_none());
}

#[tokio::test]
async fn retry_after_filter_change_fetches_the_new_filter() {
    let source = ManualSource::default();
    let events = Events::default();
    let mut grid = remote_grid(&source, &events);
    load_initial(&mut grid, &source).await;

    grid.toggle_sort("name", false, 0);
    let job = grid.take_fetch_job().unwrap();
    let req = source.take_one();
    req.tx.send(Err(FetchError::transient("503"))).unwrap();
    assert_eq!(grid.complete_fetch(job.run().await), FetchApply::Failed);

    // Retry clicked before the filter debounce fires.
    grid.set_global_filter("person-01", 100);
    assert!(grid.retry());
    let job = grid.take_fetch_job().unwrap();
    let req = source.take_one();
    assert_eq!(req.params.filters.global(), "person-01");
    assert_eq!(req.params.page_index, 0);
    assert_eq!(req.params.sort, SortState::single("name", SortDirection::Ascending));
    req.tx.send(Ok(page_response(&req.params, 100))).unwrap();
    assert_eq!(grid.complete_fetch(job.run().await), FetchApply::Applied);

    assert!(!grid.tick(10_000));
    assert!(!grid.has_fetch_job());
    assert_eq!(grid.total_row_count(), 100);
    assert_eq!(grid.filters().global(), "person-01");
}

#[tokio::test]
async fn remote_dataset_select_all_is_requested() {
    let source = ManualSource::default();
    let events = Events::default();
    let mut grid = remote_grid(&source, &events);
    load_initial(&mut grid, &source).await;

    assert_eq!(grid.select_all(SelectAllScope::Page), SelectAllOutcome::Applied(50));
    assert!(grid.select_all_prompt());
    assert_eq!(grid.select_all(SelectAllScope::Dataset), SelectAllOutcome::Requested);
    assert_eq!(grid.selection().len(), 50);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        GridEvent::SelectAllRequested { page_row_ids } if page_row_ids.len() == 50
    )));
}

#[tokio::test]
async fn remote_focus_seed_applies_on_completion() {
    let source = ManualSource::default();
    let events = Events::default();
    let mut grid = remote_grid(&source, &events);
    load_initial(&mut grid, &source).await;

    grid.set_focus(0, 1);
    let NavOutcome::BoundaryCrossed { direction, .. } = grid.navigate(NavKey::Up) else {
        panic!("expected a boundary crossing");
    };
    // First page: nothing before it.
    assert!(!grid.go_to_page(0, FocusSeed::AfterCrossing(direction), 0));

    grid.navigate(NavKey::GridEnd);
    let NavOutcome::BoundaryCrossed { direction, .. } = grid.navigate(NavKey::Down) else {
        panic!("expected a boundary crossing");
    };
    assert!(grid.go_to_page(1, FocusSeed::AfterCrossing(direction), 0));
    // Not applied until the page arrives.
    assert_eq!(grid.focus().position(), FocusPosition::new(49, 2));

    let job = grid.take_fetch_job().unwrap();
    let req = source.take_one();
    req.tx.send(Ok(page_response(&req.params, 500))).unwrap();
    grid.complete_fetch(job.run().await);
    assert_eq!(grid.focus().position(), FocusPosition::new(0, 2));
    assert_eq!(grid.focused_row_id(), Some(50));
}

#[tokio::test]
async fn dispose_cancels_in_flight_remote_request() {
    let source = ManualSource::default();
    let events = Events::default();
    let mut grid = remote_grid(&source, &events);
    let job = grid.take_fetch_job().unwrap();
    let req = source.take_one();

    grid.dispose();
    assert!(req.cancel.is_cancelled());
    assert!(grid.is_disposed());
    assert!(!grid.tick(60_000));
    assert_eq!(grid.complete_fetch(job.run().await), FetchApply::Stale);
}

#[test]
fn set_rows_is_ignored_in_remote_mode() {
    let source = ManualSource::default();
    let mut grid = remote_grid(&source, &Events::default());
    grid.set_rows(people(10), 0);
    assert!(grid.rows().is_empty());
    assert_eq!(grid.mode(), GridMode::Remote);
}
