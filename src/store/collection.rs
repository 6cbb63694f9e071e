//! Paginated collection store
//!
//! Holds the accumulated items of a cursor-based listing. A reset replaces the items with
//! page 1 of a new query; an append adds the next page. Appends never run while a reset
//! is pending and never run when the last page has been reached.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{
    error::{AppError, AppResult},
    services::{
        with_retry, Commit, FetchGuard, Reconciler, Rejection, ResourceKey, RetryPolicy,
        StateCell, ViewState,
    },
    store::{admit, LoadOutcome},
};

/// A page-addressable listing
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Query: Clone + Send + Sync + 'static;
    type Item: Clone + Send + Sync + 'static;

    fn key(&self, query: &Self::Query) -> ResourceKey;

    /// Bounded queries return a single result set (search); they are never paginated
    fn is_bounded(&self, _query: &Self::Query) -> bool {
        false
    }

    async fn fetch_page(
        &self,
        query: &Self::Query,
        page: u32,
        limit: u32,
    ) -> AppResult<Vec<Self::Item>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPage<T> {
    pub items: Vec<T>,
    /// Next page to request
    pub cursor: u32,
    pub has_more: bool,
}

impl<T> Default for CollectionPage<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            cursor: 1,
            has_more: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot<T> {
    pub state: ViewState,
    pub page: CollectionPage<T>,
    pub error: Option<AppError>,
    pub loading_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Reset,
    Append,
}

struct CollectionInner<Q, T> {
    reconciler: Reconciler,
    query: Option<Q>,
    page: CollectionPage<T>,
    error: Option<AppError>,
    failed: Option<Operation>,
    appending: bool,
}

pub struct PaginatedCollection<S: PageSource> {
    source: S,
    guard: FetchGuard,
    policy: RetryPolicy,
    page_limit: u32,
    bounded_limit: u32,
    inner: Mutex<CollectionInner<S::Query, S::Item>>,
}

impl<S: PageSource> PaginatedCollection<S> {
    pub fn new(
        source: S,
        guard: FetchGuard,
        policy: RetryPolicy,
        page_limit: u32,
        bounded_limit: u32,
    ) -> Self {
        Self {
            source,
            guard,
            policy,
            page_limit,
            bounded_limit,
            inner: Mutex::new(CollectionInner {
                reconciler: Reconciler::new(),
                query: None,
                page: CollectionPage::default(),
                error: None,
                failed: None,
                appending: false,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, CollectionInner<S::Query, S::Item>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> CollectionSnapshot<S::Item> {
        let inner = self.inner();
        CollectionSnapshot {
            state: inner.reconciler.state(),
            page: inner.page.clone(),
            error: inner.error.clone(),
            loading_more: inner.appending,
        }
    }

    pub fn state(&self) -> ViewState {
        self.inner().reconciler.state()
    }

    pub fn items(&self) -> Vec<S::Item> {
        self.inner().page.items.clone()
    }

    pub fn query(&self) -> Option<S::Query> {
        self.inner().query.clone()
    }

    /// Replaces the collection with page 1 of `query`
    pub async fn reset_fetch(&self, query: S::Query) -> LoadOutcome {
        self.reset(query, false).await
    }

    /// Reloads page 1 of the current query
    pub async fn reload(&self) -> LoadOutcome {
        match self.query() {
            Some(query) => self.reset(query, true).await,
            None => LoadOutcome::Unchanged,
        }
    }

    /// Re-runs whichever operation failed last
    pub async fn retry(&self) -> LoadOutcome {
        let failed = {
            let mut inner = self.inner();
            inner.error = None;
            inner.failed.take()
        };
        match failed {
            Some(Operation::Append) => self.append_fetch().await,
            _ => self.reload().await,
        }
    }

    /// [`retry`](Self::retry), but only when a reset or append has failed
    pub async fn retry_if_failed(&self) -> LoadOutcome {
        if self.inner().failed.is_none() {
            return LoadOutcome::Unchanged;
        }
        self.retry().await
    }

    pub fn unmount(&self) {
        self.inner().reconciler.unmount();
    }

    /// Edits the loaded items in place (optimistic removals)
    pub fn mutate<T>(&self, f: impl FnOnce(&mut Vec<S::Item>) -> T) -> T {
        f(&mut self.inner().page.items)
    }

    async fn reset(&self, query: S::Query, force: bool) -> LoadOutcome {
        let key = self.source.key(&query);
        let generation = {
            let mut inner = self.inner();
            match inner.reconciler.request(key.clone(), force) {
                Some(generation) => {
                    inner.query = Some(query.clone());
                    inner.failed = None;
                    inner.appending = false;
                    generation
                }
                None if !inner.reconciler.is_mounted() => return LoadOutcome::Unmounted,
                None => return LoadOutcome::Unchanged,
            }
        };

        let permit = match admit(&self.guard, &key).await {
            Ok(permit) => permit,
            Err(outcome) => return outcome,
        };

        {
            let mut inner = self.inner();
            if !inner.reconciler.begin(generation) {
                return LoadOutcome::discarded(inner.reconciler.is_mounted());
            }
        }

        let bounded = self.source.is_bounded(&query);
        let limit = if bounded {
            self.bounded_limit
        } else {
            self.page_limit
        };
        tracing::debug!(key = %key, limit, "Fetching first page");
        let result = with_retry(&self.policy, || self.source.fetch_page(&query, 1, limit)).await;
        drop(permit);

        let mut inner = self.inner();
        match result {
            Ok(items) => match inner.reconciler.resolve(generation) {
                Commit::Accepted => {
                    let has_more = !bounded && items.len() as u32 == limit;
                    inner.page = CollectionPage {
                        items,
                        cursor: 2,
                        has_more,
                    };
                    inner.error = None;
                    LoadOutcome::Committed
                }
                Commit::Discarded => LoadOutcome::discarded(inner.reconciler.is_mounted()),
            },
            Err(e) => match inner.reconciler.fail(generation, &e) {
                Commit::Accepted => {
                    tracing::warn!(key = %key, error = %e, "First page failed");
                    inner.page = CollectionPage::default();
                    if !e.is_auth() {
                        inner.error = Some(e.clone());
                        inner.failed = Some(Operation::Reset);
                    }
                    LoadOutcome::Failed(e)
                }
                Commit::Discarded => LoadOutcome::discarded(inner.reconciler.is_mounted()),
            },
        }
    }

    /// Appends the next page; a no-op unless the collection is ready and has more pages
    pub async fn append_fetch(&self) -> LoadOutcome {
        let (generation, query, cursor) = {
            let mut inner = self.inner();
            if !inner.reconciler.is_mounted() {
                return LoadOutcome::Unmounted;
            }
            if inner.reconciler.state() != ViewState::Ready
                || !inner.page.has_more
                || inner.appending
            {
                return LoadOutcome::Unchanged;
            }
            let Some(query) = inner.query.clone() else {
                return LoadOutcome::Unchanged;
            };
            inner.appending = true;
            (inner.reconciler.generation(), query, inner.page.cursor)
        };

        let key = self.source.key(&query);
        let permit = match self.guard.admit(&key) {
            Ok(permit) => permit,
            Err(rejection) => {
                self.inner().appending = false;
                return match rejection {
                    Rejection::InFlight => LoadOutcome::Unchanged,
                    Rejection::AuthPending | Rejection::NoUser => LoadOutcome::AwaitingAuth,
                };
            }
        };

        tracing::debug!(key = %key, page = cursor, "Fetching next page");
        let result = with_retry(&self.policy, || {
            self.source.fetch_page(&query, cursor, self.page_limit)
        })
        .await;
        drop(permit);

        let mut inner = self.inner();
        if !inner.reconciler.is_current(generation) {
            return LoadOutcome::discarded(inner.reconciler.is_mounted());
        }
        inner.appending = false;

        match result {
            Ok(items) => {
                inner.page.has_more = items.len() as u32 == self.page_limit;
                inner.page.items.extend(items);
                inner.page.cursor += 1;
                inner.error = None;
                LoadOutcome::Committed
            }
            Err(e) => {
                tracing::warn!(key = %key, page = cursor, error = %e, "Next page failed");
                if e.is_auth() {
                    inner.reconciler.auth_lost();
                } else {
                    inner.error = Some(e.clone());
                    inner.failed = Some(Operation::Append);
                }
                LoadOutcome::Failed(e)
            }
        }
    }
}

impl<S: PageSource> StateCell<Vec<S::Item>> for PaginatedCollection<S> {
    fn with_mut<T>(&self, f: impl FnOnce(&mut Vec<S::Item>) -> T) -> T {
        self.mutate(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::services::Endpoint;
    use crate::session::Session;
    use crate::test_support::{fast_policy, user, Gate};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const LIMIT: u32 = 3;

    /// Serves numbered items; queries starting with '?' are searches
    #[derive(Default)]
    struct Numbers {
        /// Items available per query; pages slice into it
        totals: HashMap<String, u32>,
        failures: Mutex<VecDeque<AppError>>,
        gates: HashMap<String, Arc<Gate>>,
        calls: Mutex<Vec<(String, u32, u32)>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl Numbers {
        fn with_total(query: &str, total: u32) -> Self {
            let mut numbers = Numbers::default();
            numbers.totals.insert(query.to_string(), total);
            numbers
        }

        fn fail_next(&self, count: usize) {
            let mut failures = self.failures.lock().unwrap();
            for _ in 0..count {
                failures.push_back(AppError::Network("connection reset".to_string()));
            }
        }

        fn calls(&self) -> Vec<(String, u32, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for Arc<Numbers> {
        type Query = String;
        type Item = u32;

        fn key(&self, query: &String) -> ResourceKey {
            match query.strip_prefix('?') {
                Some(term) => ResourceKey::new(Endpoint::Search).with("q", term),
                None => ResourceKey::new(Endpoint::Movies).with("genre", query),
            }
        }

        fn is_bounded(&self, query: &String) -> bool {
            query.starts_with('?')
        }

        async fn fetch_page(&self, query: &String, page: u32, limit: u32) -> AppResult<Vec<u32>> {
            self.calls
                .lock()
                .unwrap()
                .push((query.clone(), page, limit));
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            if let Some(gate) = self.gates.get(query) {
                gate.pass().await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if let Some(error) = self.failures.lock().unwrap().pop_front() {
                return Err(error);
            }
            let total = self.totals.get(query).copied().unwrap_or(0);
            let start = (page - 1) * limit;
            Ok((start..total.min(start + limit)).collect())
        }
    }

    fn guard() -> FetchGuard {
        FetchGuard::new(Session::authenticated(user(), "tok"))
    }

    fn collection(source: &Arc<Numbers>, policy: RetryPolicy) -> Arc<PaginatedCollection<Arc<Numbers>>> {
        Arc::new(PaginatedCollection::new(
            source.clone(),
            guard(),
            policy,
            LIMIT,
            10,
        ))
    }

    #[tokio::test]
    async fn test_reset_then_appends_concatenates_pages() {
        let source = Arc::new(Numbers::with_total("Drama", 8));
        let movies = collection(&source, fast_policy());

        assert_eq!(movies.reset_fetch("Drama".to_string()).await, LoadOutcome::Committed);
        assert_eq!(movies.snapshot().page.cursor, 2);
        assert!(movies.snapshot().page.has_more);

        assert_eq!(movies.append_fetch().await, LoadOutcome::Committed);
        assert_eq!(movies.append_fetch().await, LoadOutcome::Committed);

        let snapshot = movies.snapshot();
        assert_eq!(snapshot.page.items, (0..8).collect::<Vec<_>>());
        assert_eq!(snapshot.page.cursor, 4);
        assert!(!snapshot.page.has_more);
        assert_eq!(
            source.calls(),
            vec![
                ("Drama".to_string(), 1, LIMIT),
                ("Drama".to_string(), 2, LIMIT),
                ("Drama".to_string(), 3, LIMIT),
            ]
        );
    }

    #[tokio::test]
    async fn test_append_without_more_pages_makes_no_request() {
        let source = Arc::new(Numbers::with_total("Drama", 2));
        let movies = collection(&source, fast_policy());

        movies.reset_fetch("Drama".to_string()).await;
        let before = movies.snapshot();
        assert!(!before.page.has_more);

        assert_eq!(movies.append_fetch().await, LoadOutcome::Unchanged);
        assert_eq!(source.calls().len(), 1);
        assert_eq!(movies.snapshot(), before);
    }

    #[tokio::test]
    async fn test_append_before_first_page_is_ignored() {
        let source = Arc::new(Numbers::with_total("Drama", 9));
        let movies = collection(&source, fast_policy());

        assert_eq!(movies.append_fetch().await, LoadOutcome::Unchanged);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_search_is_single_bounded_page() {
        let source = Arc::new(Numbers::with_total("?matrix", 10));
        let movies = collection(&source, fast_policy());

        movies.reset_fetch("?matrix".to_string()).await;
        let snapshot = movies.snapshot();
        assert_eq!(snapshot.page.items.len(), 10);
        assert!(!snapshot.page.has_more);
        assert_eq!(source.calls(), vec![("?matrix".to_string(), 1, 10)]);

        assert_eq!(movies.append_fetch().await, LoadOutcome::Unchanged);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_new_query_replaces_items() {
        let mut numbers = Numbers::with_total("", 5);
        numbers.totals.insert("Horror".to_string(), 2);
        let source = Arc::new(numbers);
        let movies = collection(&source, fast_policy());

        movies.reset_fetch(String::new()).await;
        movies.append_fetch().await;
        assert_eq!(movies.items().len(), 5);

        assert_eq!(movies.reset_fetch("Horror".to_string()).await, LoadOutcome::Committed);
        assert_eq!(movies.items(), vec![0, 1]);
        assert_eq!(source.calls().last(), Some(&("Horror".to_string(), 1, LIMIT)));
    }

    #[tokio::test]
    async fn test_stale_first_page_is_discarded() {
        let mut numbers = Numbers::with_total("", 5);
        numbers.totals.insert("Horror".to_string(), 2);
        let gate = Arc::new(Gate::default());
        numbers.gates.insert(String::new(), gate.clone());
        let source = Arc::new(numbers);
        let movies = collection(&source, fast_policy());

        let all = {
            let movies = movies.clone();
            tokio::spawn(async move { movies.reset_fetch(String::new()).await })
        };
        gate.entered().await;

        assert_eq!(movies.reset_fetch("Horror".to_string()).await, LoadOutcome::Committed);
        gate.open();
        assert_eq!(all.await.unwrap(), LoadOutcome::Superseded);
        assert_eq!(movies.items(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_failed_reset_clears_items_and_retry_reloads() {
        let source = Arc::new(Numbers::with_total("Drama", 5));
        let movies = collection(&source, fast_policy());
        movies.reset_fetch("Drama".to_string()).await;

        source.fail_next(3);
        assert!(matches!(movies.reload().await, LoadOutcome::Failed(AppError::Network(_))));
        let snapshot = movies.snapshot();
        assert_eq!(snapshot.state, ViewState::Error);
        assert!(snapshot.page.items.is_empty());
        assert!(snapshot.error.is_some());

        assert_eq!(movies.retry().await, LoadOutcome::Committed);
        assert_eq!(movies.items(), vec![0, 1, 2]);
        assert_eq!(movies.snapshot().error, None);
    }

    #[tokio::test]
    async fn test_failed_append_keeps_items_and_retry_appends() {
        let source = Arc::new(Numbers::with_total("Drama", 5));
        let movies = collection(&source, fast_policy());
        movies.reset_fetch("Drama".to_string()).await;

        source.fail_next(3);
        assert!(matches!(movies.append_fetch().await, LoadOutcome::Failed(_)));
        let snapshot = movies.snapshot();
        assert_eq!(snapshot.page.items, vec![0, 1, 2]);
        assert_eq!(snapshot.page.cursor, 2);
        assert!(snapshot.error.is_some());
        assert!(!snapshot.loading_more);

        assert_eq!(movies.retry_if_failed().await, LoadOutcome::Committed);
        assert_eq!(movies.items(), vec![0, 1, 2, 3, 4]);
        assert_eq!(movies.retry_if_failed().await, LoadOutcome::Unchanged);
        assert_eq!(movies.items(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_append_auth_failure_waits_for_auth() {
        let source = Arc::new(Numbers::with_total("Drama", 5));
        let movies = collection(&source, fast_policy());
        movies.reset_fetch("Drama".to_string()).await;

        source.failures.lock().unwrap().push_back(AppError::Auth(ApiError {
            status: 401,
            message: "expired".to_string(),
            raw: None,
        }));
        assert!(matches!(movies.append_fetch().await, LoadOutcome::Failed(AppError::Auth(_))));
        let snapshot = movies.snapshot();
        assert_eq!(snapshot.state, ViewState::WaitingForAuth);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_manual_retry() {
        let source = Arc::new(Numbers::with_total("Drama", 2));
        let movies = collection(&source, RetryPolicy::default());
        source.fail_next(3);

        let started = tokio::time::Instant::now();
        assert!(matches!(
            movies.reset_fetch("Drama".to_string()).await,
            LoadOutcome::Failed(_)
        ));
        // backoff of 1s then 2s between the three attempts
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
        assert_eq!(source.calls().len(), 3);
        assert_eq!(movies.state(), ViewState::Error);

        assert_eq!(movies.retry().await, LoadOutcome::Committed);
        assert_eq!(source.calls().len(), 4);
        assert_eq!(movies.items(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_collections_sharing_a_key_fetch_one_at_a_time() {
        let mut numbers = Numbers::with_total("Drama", 2);
        let gate = Arc::new(Gate::default());
        numbers.gates.insert("Drama".to_string(), gate.clone());
        let source = Arc::new(numbers);
        let shared = guard();
        let first = Arc::new(PaginatedCollection::new(
            source.clone(),
            shared.clone(),
            fast_policy(),
            LIMIT,
            10,
        ));
        let second = Arc::new(PaginatedCollection::new(
            source.clone(),
            shared.clone(),
            fast_policy(),
            LIMIT,
            10,
        ));

        let a = {
            let first = first.clone();
            tokio::spawn(async move { first.reset_fetch("Drama".to_string()).await })
        };
        gate.entered().await;
        let b = {
            let second = second.clone();
            tokio::spawn(async move { second.reset_fetch("Drama".to_string()).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(shared.in_flight_count(), 1);

        gate.open();
        gate.open();
        assert_eq!(a.await.unwrap(), LoadOutcome::Committed);
        assert_eq!(b.await.unwrap(), LoadOutcome::Committed);
        assert_eq!(source.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(shared.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_mutate_edits_loaded_items() {
        let source = Arc::new(Numbers::with_total("Drama", 3));
        let movies = collection(&source, fast_policy());
        movies.reset_fetch("Drama".to_string()).await;

        let removed = movies.with_mut(|items| items.remove(1));
        assert_eq!(removed, 1);
        assert_eq!(movies.items(), vec![0, 2]);
    }
}
