// Example: local rows with sort, filter, paging, selection and windowing.
use virtualgrid::{
    ColumnDescriptor, FocusSeed, GridOptions, GridStateController, RowModel, SelectAllScope,
    WindowOptions,
};

#[derive(Clone, Debug)]
struct City {
    id: u32,
    name: String,
    population: u32,
}

fn main() {
    let rows: Vec<City> = (0..1_000)
        .map(|id| City {
            id,
            name: format!("city-{id:04}"),
            population: (id * 7_919) % 100_000,
        })
        .collect();

    let options = GridOptions::new(
        vec![
            ColumnDescriptor::new("name"),
            ColumnDescriptor::new("population").with_filterable(false),
        ],
        |c: &City| c.id,
    )
    .with_row_model(
        RowModel::new()
            .with_sort_key("name", |c: &City| c.name.clone())
            .with_sort_key("population", |c: &City| c.population)
            .with_filter("name", |c: &City, v: &String| c.name.contains(v.as_str()))
            .with_global_filter(|c: &City, text: &str| c.name.contains(text)),
    )
    .with_page_size(100)
    .with_window(WindowOptions::new(24).with_viewport_height(240))
    .with_on_event(|e| println!("event: {}", e.kind()));

    let mut grid = GridStateController::new(options).with_rows(rows);

    // Header click twice: population descending.
    grid.toggle_sort("population", false, 0);
    grid.toggle_sort("population", false, 0);
    println!("first row: {:?}", grid.row(0));

    grid.set_global_filter("city-01", 0);
    println!(
        "filtered: total={} pages={}",
        grid.total_row_count(),
        grid.page_count()
    );

    grid.set_global_filter("", 0);
    grid.go_to_page(3, FocusSeed::Keep, 0);
    grid.on_scroll(480, 240);
    let rendered: Vec<usize> = grid.rendered_rows().iter().map(|(i, _)| *i).collect();
    println!("page 3 renders rows {:?}..={:?}", rendered.first(), rendered.last());

    grid.select_all(SelectAllScope::Page);
    println!(
        "selected={} offer select-all={}",
        grid.selection().len(),
        grid.select_all_prompt()
    );
}
