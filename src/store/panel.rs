use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{
    error::{AppError, AppResult},
    services::{with_retry, Commit, FetchGuard, Reconciler, ResourceKey, RetryPolicy, ViewState},
    store::{admit, LoadOutcome},
};

/// A single, non-paginated fetchable resource
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Query: Clone + Send + Sync + 'static;
    type Output: Clone + Send + Sync + 'static;

    fn key(&self, query: &Self::Query) -> ResourceKey;

    async fn fetch(&self, query: &Self::Query) -> AppResult<Self::Output>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelSnapshot<T> {
    pub state: ViewState,
    pub data: Option<T>,
    pub error: Option<AppError>,
}

struct PanelInner<Q, T> {
    reconciler: Reconciler,
    query: Option<Q>,
    data: Option<T>,
    error: Option<AppError>,
}

/// Store for one resource of a view (genres, details, a recommendation set, ...)
pub struct Panel<R: Resource> {
    resource: R,
    guard: FetchGuard,
    policy: RetryPolicy,
    inner: Mutex<PanelInner<R::Query, R::Output>>,
}

impl<R: Resource> Panel<R> {
    pub fn new(resource: R, guard: FetchGuard, policy: RetryPolicy) -> Self {
        Self {
            resource,
            guard,
            policy,
            inner: Mutex::new(PanelInner {
                reconciler: Reconciler::new(),
                query: None,
                data: None,
                error: None,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, PanelInner<R::Query, R::Output>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> PanelSnapshot<R::Output> {
        let inner = self.inner();
        PanelSnapshot {
            state: inner.reconciler.state(),
            data: inner.data.clone(),
            error: inner.error.clone(),
        }
    }

    pub fn state(&self) -> ViewState {
        self.inner().reconciler.state()
    }

    pub fn data(&self) -> Option<R::Output> {
        self.inner().data.clone()
    }

    pub fn query(&self) -> Option<R::Query> {
        self.inner().query.clone()
    }

    /// Loads `query`; a no-op when that key is already loaded or loading
    pub async fn load(&self, query: R::Query) -> LoadOutcome {
        self.run(query, false).await
    }

    /// Re-fetches the current query even if it is loaded
    ///
    /// A fetch of the same query that is still running is superseded; the refresh queues
    /// behind it and only its own result is committed. On failure the data already shown
    /// is kept next to the error.
    pub async fn refresh(&self) -> LoadOutcome {
        match self.query() {
            Some(query) => self.run(query, true).await,
            None => LoadOutcome::Unchanged,
        }
    }

    /// Manual retry after an error
    pub async fn retry(&self) -> LoadOutcome {
        self.inner().error = None;
        self.refresh().await
    }

    /// [`retry`](Self::retry), but only when the last fetch ended in an error
    pub async fn retry_if_failed(&self) -> LoadOutcome {
        if self.state() != ViewState::Error {
            return LoadOutcome::Unchanged;
        }
        self.retry().await
    }

    pub fn unmount(&self) {
        self.inner().reconciler.unmount();
    }

    async fn run(&self, query: R::Query, force: bool) -> LoadOutcome {
        let key = self.resource.key(&query);
        let generation = {
            let mut inner = self.inner();
            match inner.reconciler.request(key.clone(), force) {
                Some(generation) => {
                    inner.query = Some(query.clone());
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

        tracing::debug!(key = %key, "Fetching");
        let result = with_retry(&self.policy, || self.resource.fetch(&query)).await;
        drop(permit);

        let mut inner = self.inner();
        match result {
            Ok(data) => match inner.reconciler.resolve(generation) {
                Commit::Accepted => {
                    inner.data = Some(data);
                    inner.error = None;
                    LoadOutcome::Committed
                }
                Commit::Discarded => {
                    tracing::debug!(key = %key, "Dropping superseded result");
                    LoadOutcome::discarded(inner.reconciler.is_mounted())
                }
            },
            Err(e) => match inner.reconciler.fail(generation, &e) {
                Commit::Accepted => {
                    tracing::warn!(key = %key, error = %e, "Fetch failed");
                    if !force {
                        inner.data = None;
                    }
                    inner.error = (!e.is_auth()).then(|| e.clone());
                    LoadOutcome::Failed(e)
                }
                Commit::Discarded => LoadOutcome::discarded(inner.reconciler.is_mounted()),
            },
        }
    }
}
