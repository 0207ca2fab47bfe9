// Example: a remote data source driven through a GridSession.
use futures::FutureExt;
use futures::future::BoxFuture;
use virtualgrid::{
    CancellationToken, ColumnDescriptor, FetchError, FetchParams, FetchResponse, GridOptions,
    GridStateController,
};
use virtualgrid_adapter::{GridSession, Key, KeyInput};

const TOTAL: usize = 250;

fn fetch_page(
    params: FetchParams<String>,
    _cancel: CancellationToken,
) -> BoxFuture<'static, Result<FetchResponse<u32>, FetchError>> {
    // Stands in for a network call.
    let start = params.page_index * params.page_size;
    let end = (start + params.page_size).min(TOTAL);
    let rows = (start as u32..end as u32).collect();
    futures::future::ready(Ok(FetchResponse::new(rows, TOTAL))).boxed()
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let grid = GridStateController::new(
        GridOptions::new(vec![ColumnDescriptor::new("id")], |id: &u32| *id)
            .with_page_size(25)
            .with_data_source(fetch_page),
    );
    let mut session = GridSession::new(grid);
    session.drive().await;
    println!(
        "loaded {} of {} rows",
        session.grid().page_row_count(),
        session.grid().total_row_count()
    );

    // Arrow down past the last row loads the next page with focus on its first row.
    session.grid_mut().set_focus(24, 0);
    session.handle_key(KeyInput::new(Key::Down), 0);
    session.drive().await;
    println!(
        "page={} focused={:?}",
        session.grid().pagination().page_index,
        session.grid().focused_row_id()
    );

    let key: KeyInput = "ctrl+end".parse().unwrap_or(KeyInput::new(Key::End));
    session.handle_key(key, 0);
    println!("focus={:?}", session.grid().focus().position());

    session.dispose();
}
