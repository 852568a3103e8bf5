use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;

use super::{boxed, Operation};
use crate::api::ApiClient;
use crate::client::ProminisClient;
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::notify::Notifier;
use crate::page::{Page, PageParams, PageQuery, Pagination, DEFAULT_PAGE_SIZE};
use crate::sequence::RequestSequence;

#[derive(Debug, Clone, PartialEq)]
pub struct PageState<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub pagination: Pagination,
}

/// Walks a paginated collection one page at a time.
///
/// Page and size for the next request are read from the committed
/// `pagination` at call time, and the base filters given at construction are
/// merged under any per-call filters.
pub struct Paginator<T> {
    fetch_page: Operation<PageParams, Page<T>>,
    base_filters: BTreeMap<String, String>,
    state: watch::Sender<PageState<T>>,
    sequence: RequestSequence,
    notifier: Arc<dyn Notifier>,
    activated: AtomicBool,
}

impl<T> Paginator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(fetch_page: F, initial: PageQuery, notifier: Arc<dyn Notifier>) -> Self
    where
        F: Fn(PageParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'static,
    {
        let pagination = Pagination {
            page: initial.page.unwrap_or(0),
            size: initial.size.filter(|size| *size > 0).unwrap_or(DEFAULT_PAGE_SIZE),
            ..Pagination::default()
        };
        let (state, _) = watch::channel(PageState {
            items: Vec::new(),
            loading: false,
            error: None,
            pagination,
        });
        Self {
            fetch_page: boxed(fetch_page),
            base_filters: initial.filters,
            state,
            sequence: RequestSequence::new(),
            notifier,
            activated: AtomicBool::new(false),
        }
    }

    /// Paginate a GET endpoint of `api`; `build` turns resolved parameters
    /// into the request, e.g. `ProminisClient::build_list_jobs`.
    pub fn for_endpoint(
        api: Arc<ApiClient>,
        build: fn(&ProminisClient, &PageParams) -> HttpRequest,
        initial: PageQuery,
        notifier: Arc<dyn Notifier>,
    ) -> Self
    where
        T: DeserializeOwned,
    {
        Self::new(
            move |params: PageParams| {
                let api = api.clone();
                async move {
                    let request = build(api.endpoints(), &params);
                    api.send_page(request).await
                }
            },
            initial,
            notifier,
        )
    }

    pub fn state(&self) -> PageState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<T>> {
        self.state.subscribe()
    }

    pub fn pagination(&self) -> Pagination {
        self.state.borrow().pagination
    }

    /// Load the initial page. Only the first call fetches, whatever its
    /// outcome; after a failed initial load, recover with `refetch`.
    pub async fn activate(&self) -> Result<Option<Page<T>>, ApiError> {
        if self.activated.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.refetch(PageQuery::default()).await.map(Some)
    }

    pub async fn refetch(&self, query: PageQuery) -> Result<Page<T>, ApiError> {
        let params = {
            let state = self.state.borrow();
            query.resolve(&self.base_filters, &state.pagination)
        };
        self.load(params).await
    }

    /// `Ok(None)` when already on the last page.
    pub async fn next_page(&self) -> Result<Option<Page<T>>, ApiError> {
        let current = self.pagination();
        if !current.has_next() {
            return Ok(None);
        }
        self.refetch(PageQuery::new().page(current.page + 1)).await.map(Some)
    }

    /// `Ok(None)` when already on the first page.
    pub async fn prev_page(&self) -> Result<Option<Page<T>>, ApiError> {
        let current = self.pagination();
        if !current.has_prev() {
            return Ok(None);
        }
        self.refetch(PageQuery::new().page(current.page - 1)).await.map(Some)
    }

    /// `Ok(None)` when `page` is outside `[0, total_pages)`.
    pub async fn go_to_page(&self, page: u32) -> Result<Option<Page<T>>, ApiError> {
        if !self.pagination().contains(page) {
            return Ok(None);
        }
        self.refetch(PageQuery::new().page(page)).await.map(Some)
    }

    pub fn teardown(&self) {
        self.sequence.cancel_all();
        self.state.send_modify(|state| state.loading = false);
    }

    async fn load(&self, params: PageParams) -> Result<Page<T>, ApiError> {
        let ticket = self.sequence.issue();
        tracing::debug!(page = params.page, size = params.size, "loading page");
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = self.sequence.run(&ticket, (self.fetch_page)(params)).await;

        if ticket.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        if !self.sequence.is_current(&ticket) {
            tracing::debug!(seq = ticket.seq(), "discarding superseded page");
            return result;
        }

        match &result {
            Ok(page) => self.state.send_modify(|state| {
                state.items = page.items.clone();
                state.pagination = page.pagination;
                state.loading = false;
                state.error = None;
            }),
            Err(e) => {
                let message = e.display_message();
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(message.clone());
                });
                self.notifier.error(&message);
            }
        }
        result
    }
}
