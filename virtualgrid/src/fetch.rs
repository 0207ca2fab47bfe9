use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::debounce::Debouncer;
use crate::error::FetchError;
use crate::{FilterState, SortState, page_count_for};

/// Immutable snapshot of everything a remote page depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchParams<F> {
    pub page_index: usize,
    pub page_size: usize,
    pub sort: SortState,
    pub filters: FilterState<F>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse<R> {
    pub rows: Vec<R>,
    pub total_row_count: usize,
    /// Reported page count; derived from `total_row_count` when absent.
    pub page_count: Option<usize>,
}

impl<R> FetchResponse<R> {
    pub fn new(rows: Vec<R>, total_row_count: usize) -> Self {
        Self {
            rows,
            total_row_count,
            page_count: None,
        }
    }

    pub fn with_page_count(mut self, page_count: usize) -> Self {
        self.page_count = Some(page_count);
        self
    }
}

/// Why a request was issued. Filter-triggered requests are debounced; the rest go out at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchTrigger {
    Initial,
    Sort,
    Filter,
    Pagination,
    Refresh,
    Retry,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FetchStatus {
    #[default]
    Idle,
    /// First load: there is no row data yet.
    Loading,
    /// A later load: the previous rows stay displayed meanwhile.
    Updating,
}

/// A failed fetch, displayed in place of row content.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchErrorState {
    pub message: String,
    pub can_retry: bool,
}

/// An issued request. `cancel` is fired when the request is superseded or torn down.
#[derive(Clone, Debug)]
pub struct FetchRequest<F> {
    pub generation: u64,
    pub trigger: FetchTrigger,
    pub params: FetchParams<F>,
    pub cancel: CancellationToken,
}

/// The remote-mode data source.
///
/// Implementations must honor `cancel` promptly and must fail (not hang) on error. Closures of
/// the matching shape implement this trait.
pub trait DataSource<R, F>: Send + Sync {
    fn fetch(
        &self,
        params: FetchParams<F>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<FetchResponse<R>, FetchError>>;
}

impl<R, F, Func> DataSource<R, F> for Func
where
    Func: Fn(FetchParams<F>, CancellationToken) -> BoxFuture<'static, Result<FetchResponse<R>, FetchError>>
        + Send
        + Sync,
{
    fn fetch(
        &self,
        params: FetchParams<F>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<FetchResponse<R>, FetchError>> {
        self(params, cancel)
    }
}

/// The result of running a [`FetchJob`], to be handed back to the coordinator.
#[derive(Debug)]
pub struct FetchCompletion<R> {
    pub generation: u64,
    pub result: Result<FetchResponse<R>, FetchError>,
}

/// One awaited call to the data source for one request.
pub struct FetchJob<R> {
    generation: u64,
    cancel: CancellationToken,
    future: BoxFuture<'static, Result<FetchResponse<R>, FetchError>>,
}

impl<R> FetchJob<R> {
    pub fn new<F: Clone>(request: &FetchRequest<F>, source: &dyn DataSource<R, F>) -> Self {
        Self {
            generation: request.generation,
            cancel: request.cancel.clone(),
            future: source.fetch(request.params.clone(), request.cancel.clone()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the request was superseded before (or while) running.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Awaits the data source, resolving early with [`FetchError::Cancelled`] when the request
    /// is superseded.
    pub async fn run(self) -> FetchCompletion<R> {
        let Self {
            generation,
            cancel,
            future,
        } = self;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = future => result,
        };
        FetchCompletion { generation, result }
    }
}

impl<R> core::fmt::Debug for FetchJob<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FetchJob")
            .field("generation", &self.generation)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// What [`FetchCoordinator::complete`] did with a completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchApply {
    /// Rows replaced.
    Applied,
    /// Rows kept; the error state is set.
    Failed,
    /// A superseded request resolved; discarded.
    Stale,
    /// The current request was cancelled; nothing changed.
    Cancelled,
}

/// Remote-mode request state machine.
///
/// ```text
/// idle ──first request──▶ loading ──▶ idle
/// idle ──later request──▶ updating ──▶ idle (+ error on failure)
/// ```
///
/// At most one request is in flight. Starting a request cancels the previous one, and every
/// request carries a generation number so a late completion of a superseded request is
/// recognized and dropped.
pub struct FetchCoordinator<R, F> {
    status: FetchStatus,
    error: Option<FetchErrorState>,
    rows: Vec<R>,
    total_row_count: usize,
    page_count: usize,
    loaded: bool,
    generation: u64,
    in_flight: Option<FetchRequest<F>>,
    last_params: Option<FetchParams<F>>,
    pending: Option<FetchParams<F>>,
    filter_debounce: Debouncer,
    disposed: bool,
}

impl<R, F: Clone> FetchCoordinator<R, F> {
    pub fn new(filter_debounce_ms: u64) -> Self {
        Self {
            status: FetchStatus::Idle,
            error: None,
            rows: Vec::new(),
            total_row_count: 0,
            page_count: 1,
            loaded: false,
            generation: 0,
            in_flight: None,
            last_params: None,
            pending: None,
            filter_debounce: Debouncer::new(filter_debounce_ms),
            disposed: false,
        }
    }

    pub fn status(&self) -> FetchStatus {
        self.status
    }

    pub fn error(&self) -> Option<&FetchErrorState> {
        self.error.as_ref()
    }

    /// Rows of the last successful fetch.
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn total_row_count(&self) -> usize {
        self.total_row_count
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn has_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_busy(&self) -> bool {
        self.status != FetchStatus::Idle
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn in_flight(&self) -> Option<&FetchRequest<F>> {
        self.in_flight.as_ref()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    pub fn last_params(&self) -> Option<&FetchParams<F>> {
        self.last_params.as_ref()
    }

    pub fn filter_debounce_ms(&self) -> u64 {
        self.filter_debounce.delay_ms()
    }

    /// Asks for data matching `params`.
    ///
    /// Filter-triggered requests are held back until the debounce elapses ([`Self::tick`]
    /// issues them); anything in flight is cancelled right away since its filter is already
    /// out of date. Every other trigger starts immediately and supersedes any pending filter
    /// request.
    pub fn request(
        &mut self,
        params: FetchParams<F>,
        trigger: FetchTrigger,
        now_ms: u64,
    ) -> Option<FetchRequest<F>> {
        if self.disposed {
            return None;
        }
        if trigger == FetchTrigger::Filter && self.filter_debounce.delay_ms() > 0 {
            self.cancel_in_flight();
            self.pending = Some(params);
            self.filter_debounce.trigger(now_ms);
            self.status = self.busy_status();
            gtrace!(now_ms, "filter fetch debounced");
            return None;
        }
        Some(self.start(params, trigger))
    }

    /// Issues the debounced filter request once its delay has passed.
    pub fn tick(&mut self, now_ms: u64) -> Option<FetchRequest<F>> {
        if self.disposed || !self.filter_debounce.poll(now_ms) {
            return None;
        }
        let params = self.pending.take()?;
        Some(self.start(params, FetchTrigger::Filter))
    }

    /// Re-issues the most recent request parameters. A debounced filter request that has not
    /// gone out yet is newer than the failed one, so it is sent instead.
    pub fn retry(&mut self) -> Option<FetchRequest<F>> {
        if self.disposed {
            return None;
        }
        let params = match self.pending.take() {
            Some(pending) => pending,
            None => self.last_params.clone()?,
        };
        Some(self.start(params, FetchTrigger::Retry))
    }

    fn start(&mut self, params: FetchParams<F>, trigger: FetchTrigger) -> FetchRequest<F> {
        self.cancel_in_flight();
        self.pending = None;
        self.filter_debounce.cancel();

        self.generation = self.generation.wrapping_add(1);
        let request = FetchRequest {
            generation: self.generation,
            trigger,
            params: params.clone(),
            cancel: CancellationToken::new(),
        };
        gdebug!(
            generation = request.generation,
            page_index = params.page_index,
            page_size = params.page_size,
            trigger = ?trigger,
            "fetch issued"
        );
        self.last_params = Some(params);
        self.status = self.busy_status();
        self.in_flight = Some(request.clone());
        request
    }

    fn busy_status(&self) -> FetchStatus {
        if self.loaded {
            FetchStatus::Updating
        } else {
            FetchStatus::Loading
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(prev) = self.in_flight.take() {
            gtrace!(generation = prev.generation, "fetch cancelled");
            prev.cancel.cancel();
        }
    }

    /// Applies the outcome of a request, unless it has been superseded.
    pub fn complete(&mut self, completion: FetchCompletion<R>) -> FetchApply {
        let current = self
            .in_flight
            .as_ref()
            .filter(|r| !self.disposed && r.generation == completion.generation);
        let Some(request) = current else {
            gtrace!(
                generation = completion.generation,
                current = self.generation,
                "stale fetch result discarded"
            );
            return FetchApply::Stale;
        };
        let page_size = request.params.page_size;

        let result = completion.result.and_then(|resp| {
            if resp.rows.len() > page_size {
                return Err(FetchError::MalformedResponse(format!(
                    "{} rows returned for a page of {page_size}",
                    resp.rows.len()
                )));
            }
            match resp.page_count {
                Some(pages) if pages.saturating_mul(page_size) < resp.total_row_count => {
                    Err(FetchError::MalformedResponse(format!(
                        "{pages} pages cannot hold {} rows",
                        resp.total_row_count
                    )))
                }
                _ => Ok(resp),
            }
        });

        self.in_flight = None;
        if self.pending.is_none() {
            self.status = FetchStatus::Idle;
        }

        match result {
            Ok(resp) => {
                self.page_count = resp
                    .page_count
                    .unwrap_or_else(|| page_count_for(resp.total_row_count, page_size))
                    .max(1);
                self.total_row_count = resp.total_row_count;
                self.rows = resp.rows;
                self.loaded = true;
                self.error = None;
                gdebug!(
                    generation = completion.generation,
                    rows = self.rows.len(),
                    total = self.total_row_count,
                    "fetch applied"
                );
                FetchApply::Applied
            }
            Err(FetchError::Cancelled) => FetchApply::Cancelled,
            Err(err) => {
                gwarn!(generation = completion.generation, error = %err, "fetch failed");
                self.error = Some(FetchErrorState {
                    message: err.to_string(),
                    can_retry: err.is_retryable(),
                });
                FetchApply::Failed
            }
        }
    }

    /// Cancels the in-flight request and any pending debounced request.
    pub fn cancel(&mut self) {
        self.cancel_in_flight();
        self.pending = None;
        self.filter_debounce.cancel();
        self.status = FetchStatus::Idle;
    }

    /// Tears the coordinator down. Later requests, ticks and completions are ignored.
    pub fn dispose(&mut self) {
        self.cancel();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<R, F> Drop for FetchCoordinator<R, F> {
    fn drop(&mut self) {
        if let Some(request) = self.in_flight.take() {
            request.cancel.cancel();
        }
    }
}

impl<R, F> core::fmt::Debug for FetchCoordinator<R, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("status", &self.status)
            .field("error", &self.error)
            .field("rows", &self.rows.len())
            .field("total_row_count", &self.total_row_count)
            .field("page_count", &self.page_count)
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight.as_ref().map(|r| r.generation))
            .field("pending", &self.pending.is_some())
            .field("disposed", &self.disposed)
            .finish()
    }
}
