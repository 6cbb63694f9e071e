pub mod fetch_guard;
pub mod optimistic;
pub mod ratings;
pub mod reconciler;
pub mod refresh;
pub mod resource_key;
pub mod retry;

pub use fetch_guard::{FetchGuard, FetchPermit, Rejection};
pub use optimistic::{run_optimistic, OptimisticUpdate, StateCell};
pub use ratings::{MovieCard, RatingCheck, RatingEngine, RatingSlot};
pub use reconciler::{Commit, Generation, Reconciler, ViewState};
pub use refresh::{RefreshBus, RefreshSignal};
pub use resource_key::{Endpoint, ResourceKey, Scope};
pub use retry::{with_retry, RetryPolicy};
