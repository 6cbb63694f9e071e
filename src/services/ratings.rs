use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    client::MovieApi,
    error::{AppError, AppResult},
    models::{Movie, MovieId, RateReceipt, RatingAction, UserRating},
    services::{
        optimistic::{run_optimistic, OptimisticUpdate},
        refresh::{RefreshBus, RefreshSignal},
    },
};

/// What the client knows about the user's rating of one movie
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RatingSlot {
    /// Never fetched (e.g. a deep link before the rating check returned)
    #[default]
    Unknown,
    Absent,
    Rated(UserRating),
}

impl RatingSlot {
    pub fn rating(&self) -> Option<&UserRating> {
        match self {
            RatingSlot::Rated(rating) => Some(rating),
            _ => None,
        }
    }
}

/// Aggregate shown on a visible movie card
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovieCard {
    pub avg_rating: f64,
    pub rating_count: u64,
}

/// Result of a rating check, tagged with the ledger version it was started at
#[derive(Debug, Clone, PartialEq)]
pub struct RatingCheck {
    version: u64,
    pub rating: Option<UserRating>,
}

#[derive(Debug, Default)]
pub struct RatingLedger {
    slots: HashMap<MovieId, RatingSlot>,
    cards: HashMap<MovieId, MovieCard>,
    pending: HashSet<MovieId>,
    /// Bumped on every local change of a movie's slot
    versions: HashMap<MovieId, u64>,
}

impl RatingLedger {
    pub fn slot(&self, id: &MovieId) -> RatingSlot {
        self.slots.get(id).cloned().unwrap_or_default()
    }

    pub fn card(&self, id: &MovieId) -> Option<MovieCard> {
        self.cards.get(id).copied()
    }

    fn version(&self, id: &MovieId) -> u64 {
        self.versions.get(id).copied().unwrap_or_default()
    }

    fn touch(&mut self, id: &MovieId) {
        *self.versions.entry(id.clone()).or_default() += 1;
    }

    fn restore(&mut self, id: &MovieId, slot: RatingSlot) {
        match slot {
            RatingSlot::Unknown => {
                self.slots.remove(id);
            }
            slot => {
                self.slots.insert(id.clone(), slot);
            }
        }
    }
}

struct SubmitRating {
    draft: UserRating,
}

struct SubmitUndo {
    previous: RatingSlot,
    bumped: bool,
}

impl OptimisticUpdate<RatingLedger> for SubmitRating {
    type Undo = SubmitUndo;
    type Confirmed = RateReceipt;

    fn apply(&self, ledger: &mut RatingLedger) -> AppResult<SubmitUndo> {
        let id = &self.draft.movie_id;
        let previous = ledger.slot(id);
        ledger
            .slots
            .insert(id.clone(), RatingSlot::Rated(self.draft.clone()));
        ledger.touch(id);

        // an Unknown slot counts as a first rating; confirm() corrects it from the server
        let first = !matches!(previous, RatingSlot::Rated(_));
        let bumped = match ledger.cards.get_mut(id) {
            Some(card) if first => {
                card.rating_count += 1;
                true
            }
            _ => false,
        };
        Ok(SubmitUndo { previous, bumped })
    }

    fn confirm(&self, ledger: &mut RatingLedger, undo: SubmitUndo, receipt: &RateReceipt) {
        let id = &self.draft.movie_id;
        ledger
            .slots
            .insert(id.clone(), RatingSlot::Rated(receipt.rating.clone()));
        ledger.touch(id);

        if let Some(card) = ledger.cards.get_mut(id) {
            match (receipt.action, undo.bumped) {
                (Some(RatingAction::Updated), true) => {
                    card.rating_count = card.rating_count.saturating_sub(1);
                }
                (Some(RatingAction::Created), false) => card.rating_count += 1,
                _ => {}
            }
            if let Some(avg) = receipt.new_avg_rating {
                card.avg_rating = avg;
            }
        }
    }

    fn rollback(&self, ledger: &mut RatingLedger, undo: SubmitUndo) {
        let id = &self.draft.movie_id;
        ledger.restore(id, undo.previous);
        ledger.touch(id);
        if undo.bumped {
            if let Some(card) = ledger.cards.get_mut(id) {
                card.rating_count = card.rating_count.saturating_sub(1);
            }
        }
    }

    fn signal(&self, _receipt: &RateReceipt) -> Option<RefreshSignal> {
        Some(RefreshSignal::RatingsChanged {
            movie_id: self.draft.movie_id.clone(),
        })
    }
}

struct DeleteRating {
    movie_id: MovieId,
}

struct DeleteUndo {
    previous: RatingSlot,
    decremented: bool,
}

impl OptimisticUpdate<RatingLedger> for DeleteRating {
    type Undo = DeleteUndo;
    type Confirmed = ();

    fn apply(&self, ledger: &mut RatingLedger) -> AppResult<DeleteUndo> {
        let previous = ledger.slot(&self.movie_id);
        if previous == RatingSlot::Absent {
            return Err(AppError::Validation(
                "You have not rated this movie".to_string(),
            ));
        }
        ledger
            .slots
            .insert(self.movie_id.clone(), RatingSlot::Absent);
        ledger.touch(&self.movie_id);

        let decremented = match ledger.cards.get_mut(&self.movie_id) {
            Some(card) if matches!(previous, RatingSlot::Rated(_)) && card.rating_count > 0 => {
                card.rating_count -= 1;
                true
            }
            _ => false,
        };
        Ok(DeleteUndo {
            previous,
            decremented,
        })
    }

    fn confirm(&self, ledger: &mut RatingLedger, _undo: DeleteUndo, _confirmed: &()) {
        ledger.touch(&self.movie_id);
    }

    fn rollback(&self, ledger: &mut RatingLedger, undo: DeleteUndo) {
        ledger.restore(&self.movie_id, undo.previous);
        ledger.touch(&self.movie_id);
        if undo.decremented {
            if let Some(card) = ledger.cards.get_mut(&self.movie_id) {
                card.rating_count += 1;
            }
        }
    }

    fn signal(&self, _confirmed: &()) -> Option<RefreshSignal> {
        Some(RefreshSignal::RatingsChanged {
            movie_id: self.movie_id.clone(),
        })
    }
}

/// Marks a movie as having a mutation in flight; cleared on drop
struct PendingMutation<'a> {
    ledger: &'a Mutex<RatingLedger>,
    movie_id: MovieId,
}

impl<'a> PendingMutation<'a> {
    fn acquire(ledger: &'a Mutex<RatingLedger>, movie_id: &MovieId) -> AppResult<Self> {
        let mut guard = ledger.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.pending.insert(movie_id.clone()) {
            return Err(AppError::Conflict(
                "A rating change for this movie is already in progress".to_string(),
            ));
        }
        Ok(Self {
            ledger,
            movie_id: movie_id.clone(),
        })
    }
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .remove(&self.movie_id);
    }
}

/// Owns the user's ratings as seen by one view and the aggregates of the cards it shows
pub struct RatingEngine {
    api: Arc<dyn MovieApi>,
    ledger: Mutex<RatingLedger>,
    bus: RefreshBus,
}

impl RatingEngine {
    pub fn new(api: Arc<dyn MovieApi>, bus: RefreshBus) -> Self {
        Self {
            api,
            ledger: Mutex::new(RatingLedger::default()),
            bus,
        }
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, RatingLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn slot(&self, id: &MovieId) -> RatingSlot {
        self.ledger().slot(id)
    }

    pub fn card(&self, id: &MovieId) -> Option<MovieCard> {
        self.ledger().card(id)
    }

    /// Registers the movie's aggregate as visible so rating changes are reflected on it
    pub fn show_card(&self, movie: &Movie) {
        self.ledger().cards.insert(
            movie.id.clone(),
            MovieCard {
                avg_rating: movie.avg_rating,
                rating_count: movie.rating_count,
            },
        );
    }

    pub fn hide_card(&self, id: &MovieId) {
        self.ledger().cards.remove(id);
    }

    /// Stores a rating known to be current on the server
    pub fn record_server_rating(&self, id: &MovieId, rating: Option<UserRating>) {
        let mut ledger = self.ledger();
        if ledger.pending.contains(id) {
            return;
        }
        let slot = rating.map_or(RatingSlot::Absent, RatingSlot::Rated);
        ledger.slots.insert(id.clone(), slot);
    }

    /// Asks the server for the user's rating of `id` without recording it
    pub async fn check_rating(&self, id: &MovieId) -> AppResult<RatingCheck> {
        let version = self.ledger().version(id);
        let rating = self.api.check_rating(id).await?;
        Ok(RatingCheck { version, rating })
    }

    /// Records a check unless the movie's rating changed locally after the check started
    ///
    /// Returns whether the check was applied.
    pub fn record_check(&self, id: &MovieId, check: RatingCheck) -> bool {
        let mut ledger = self.ledger();
        if ledger.pending.contains(id) || ledger.version(id) != check.version {
            tracing::debug!(movie_id = %id, "Dropping stale rating check");
            return false;
        }
        let slot = check.rating.map_or(RatingSlot::Absent, RatingSlot::Rated);
        ledger.slots.insert(id.clone(), slot);
        true
    }

    /// Fetches the user's rating for `id` and records it
    pub async fn load_rating(&self, id: &MovieId) -> AppResult<RatingSlot> {
        let check = self.check_rating(id).await?;
        self.record_check(id, check);
        Ok(self.slot(id))
    }

    /// Rates a movie optimistically
    ///
    /// The rating is visible locally before the request is sent. The write is attempted
    /// once; on failure the previous rating and the card count are restored.
    pub async fn submit_rating(
        &self,
        movie_id: &MovieId,
        value: f64,
        review: &str,
    ) -> AppResult<UserRating> {
        let draft = UserRating::draft(movie_id.clone(), value, review)?;
        let _pending = PendingMutation::acquire(&self.ledger, movie_id)?;

        let review = draft.review.clone();
        let receipt = run_optimistic(
            &self.ledger,
            SubmitRating { draft },
            || self.api.rate_movie(movie_id, value, &review),
            Some(&self.bus),
        )
        .await?;

        tracing::info!(movie_id = %movie_id, value, "Rating confirmed");
        Ok(receipt.rating)
    }

    pub async fn delete_rating(&self, movie_id: &MovieId) -> AppResult<()> {
        let _pending = PendingMutation::acquire(&self.ledger, movie_id)?;
        run_optimistic(
            &self.ledger,
            DeleteRating {
                movie_id: movie_id.clone(),
            },
            || self.api.delete_rating(movie_id),
            Some(&self.bus),
        )
        .await?;
        tracing::info!(movie_id = %movie_id, "Rating removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMovieApi;
    use crate::error::ApiError;
    use crate::test_support::GatedApi;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mid() -> MovieId {
        MovieId::parse("m1").unwrap()
    }

    fn card_movie(count: u64) -> Movie {
        let mut movie = Movie::new(mid(), "Inception");
        movie.avg_rating = 4.0;
        movie.rating_count = count;
        movie
    }

    fn receipt(value: f64, action: RatingAction, avg: Option<f64>) -> RateReceipt {
        RateReceipt {
            rating: UserRating {
                movie_id: mid(),
                value,
                review: String::new(),
                timestamp: None,
            },
            action: Some(action),
            new_avg_rating: avg,
        }
    }

    fn server_error() -> AppError {
        AppError::Server(ApiError {
            status: 500,
            message: "Error creating/updating rating".to_string(),
            raw: None,
        })
    }

    fn engine(api: MockMovieApi) -> RatingEngine {
        RatingEngine::new(Arc::new(api), RefreshBus::new())
    }

    #[tokio::test]
    async fn test_out_of_range_rating_makes_no_request() {
        let mut api = MockMovieApi::new();
        api.expect_rate_movie().never();
        let engine = engine(api);

        let result = engine.submit_rating(&mid(), 6.0, "").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(engine.slot(&mid()), RatingSlot::Unknown);
    }

    #[tokio::test]
    async fn test_first_rating_bumps_count_and_takes_server_average() {
        let mut api = MockMovieApi::new();
        api.expect_rate_movie()
            .times(1)
            .returning(|_, value, _| Ok(receipt(value, RatingAction::Created, Some(3.8))));
        let engine = engine(api);
        engine.show_card(&card_movie(10));
        engine.record_server_rating(&mid(), None);

        let rating = engine.submit_rating(&mid(), 3.0, "").await.unwrap();
        assert_eq!(rating.value, 3.0);
        assert_eq!(
            engine.card(&mid()),
            Some(MovieCard {
                avg_rating: 3.8,
                rating_count: 11
            })
        );
        assert_eq!(engine.slot(&mid()).rating().map(|r| r.value), Some(3.0));
    }

    #[tokio::test]
    async fn test_editing_does_not_bump_count() {
        let mut api = MockMovieApi::new();
        api.expect_rate_movie()
            .times(1)
            .returning(|_, value, _| Ok(receipt(value, RatingAction::Updated, None)));
        let engine = engine(api);
        engine.show_card(&card_movie(10));
        engine.record_server_rating(
            &mid(),
            Some(UserRating::draft(mid(), 2.0, "").unwrap()),
        );

        engine.submit_rating(&mid(), 4.0, "").await.unwrap();
        assert_eq!(engine.card(&mid()).unwrap().rating_count, 10);
    }

    #[tokio::test]
    async fn test_unknown_slot_bump_is_corrected_by_server_action() {
        let mut api = MockMovieApi::new();
        api.expect_rate_movie()
            .times(1)
            .returning(|_, value, _| Ok(receipt(value, RatingAction::Updated, None)));
        let engine = engine(api);
        engine.show_card(&card_movie(10));

        engine.submit_rating(&mid(), 4.0, "").await.unwrap();
        assert_eq!(engine.card(&mid()).unwrap().rating_count, 10);
    }

    #[tokio::test]
    async fn test_failed_first_rating_reverts_value_and_count() {
        let mut mock = MockMovieApi::new();
        mock.expect_rate_movie()
            .times(1)
            .returning(|_, _, _| Err(server_error()));
        let api = Arc::new(GatedApi::new(mock));
        let gate = api.gate("rate_movie");
        let engine = Arc::new(RatingEngine::new(api.clone(), RefreshBus::new()));
        engine.show_card(&card_movie(10));
        engine.record_server_rating(&mid(), None);

        let submit = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.submit_rating(&mid(), 3.0, "").await })
        };

        // optimistic state while the write is outstanding
        gate.entered().await;
        assert_eq!(engine.slot(&mid()).rating().map(|r| r.value), Some(3.0));
        assert_eq!(engine.card(&mid()).unwrap().rating_count, 11);

        gate.open();
        let result = submit.await.unwrap();
        assert!(matches!(result, Err(AppError::Server(_))));
        assert_eq!(engine.slot(&mid()), RatingSlot::Absent);
        assert_eq!(engine.card(&mid()).unwrap().rating_count, 10);
    }

    #[tokio::test]
    async fn test_concurrent_mutation_of_same_movie_conflicts() {
        let mut mock = MockMovieApi::new();
        mock.expect_rate_movie()
            .times(1)
            .returning(|_, value, _| Ok(receipt(value, RatingAction::Created, None)));
        mock.expect_delete_rating().never();
        let api = Arc::new(GatedApi::new(mock));
        let gate = api.gate("rate_movie");
        let engine = Arc::new(RatingEngine::new(api.clone(), RefreshBus::new()));

        let submit = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.submit_rating(&mid(), 4.0, "").await })
        };
        gate.entered().await;

        assert!(matches!(
            engine.submit_rating(&mid(), 2.0, "").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            engine.delete_rating(&mid()).await,
            Err(AppError::Conflict(_))
        ));

        gate.open();
        assert_eq!(submit.await.unwrap().unwrap().value, 4.0);
        assert_eq!(engine.slot(&mid()).rating().map(|r| r.value), Some(4.0));
    }

    #[tokio::test]
    async fn test_rating_write_is_not_retried() {
        let mut api = MockMovieApi::new();
        api.expect_rate_movie()
            .times(1)
            .returning(|_, _, _| Err(AppError::Network("timeout".to_string())));
        let engine = engine(api);
        assert!(engine.submit_rating(&mid(), 3.0, "").await.is_err());
    }

    #[tokio::test]
    async fn test_confirmed_rating_publishes_refresh() {
        let mut api = MockMovieApi::new();
        api.expect_rate_movie()
            .returning(|_, value, _| Ok(receipt(value, RatingAction::Created, None)));
        let bus = RefreshBus::new();
        let mut signals = bus.subscribe();
        let engine = RatingEngine::new(Arc::new(api), bus);

        engine.submit_rating(&mid(), 5.0, "great").await.unwrap();
        assert_eq!(
            signals.try_recv().unwrap(),
            RefreshSignal::RatingsChanged { movie_id: mid() }
        );
    }

    #[tokio::test]
    async fn test_delete_decrements_and_rolls_back_on_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut api = MockMovieApi::new();
        let counter = calls.clone();
        api.expect_delete_rating().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(server_error())
            } else {
                Ok(())
            }
        });
        let engine = engine(api);
        engine.show_card(&card_movie(10));
        let existing = UserRating::draft(mid(), 4.0, "").unwrap();
        engine.record_server_rating(&mid(), Some(existing.clone()));

        assert!(engine.delete_rating(&mid()).await.is_err());
        assert_eq!(engine.slot(&mid()), RatingSlot::Rated(existing));
        assert_eq!(engine.card(&mid()).unwrap().rating_count, 10);

        engine.delete_rating(&mid()).await.unwrap();
        assert_eq!(engine.slot(&mid()), RatingSlot::Absent);
        assert_eq!(engine.card(&mid()).unwrap().rating_count, 9);
    }

    #[tokio::test]
    async fn test_check_started_before_rating_does_not_overwrite_it() {
        let mut mock = MockMovieApi::new();
        mock.expect_check_rating().times(1).returning(|_| Ok(None));
        mock.expect_rate_movie()
            .times(1)
            .returning(|_, value, _| Ok(receipt(value, RatingAction::Created, None)));
        let api = Arc::new(GatedApi::new(mock));
        let gate = api.gate("check_rating");
        let engine = Arc::new(RatingEngine::new(api.clone(), RefreshBus::new()));

        let check = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.load_rating(&mid()).await })
        };
        gate.entered().await;

        engine.submit_rating(&mid(), 4.0, "").await.unwrap();
        assert_eq!(engine.slot(&mid()).rating().map(|r| r.value), Some(4.0));

        gate.open();
        let slot = check.await.unwrap().unwrap();
        assert_eq!(slot.rating().map(|r| r.value), Some(4.0));
        assert_eq!(engine.slot(&mid()).rating().map(|r| r.value), Some(4.0));
    }

    #[tokio::test]
    async fn test_check_after_settled_change_is_recorded() {
        let mut api = MockMovieApi::new();
        api.expect_delete_rating().returning(|_| Ok(()));
        api.expect_check_rating()
            .returning(|id| Ok(Some(UserRating::draft(id.clone(), 2.5, "").unwrap())));
        let engine = engine(api);
        engine.record_server_rating(&mid(), Some(UserRating::draft(mid(), 4.0, "").unwrap()));
        engine.delete_rating(&mid()).await.unwrap();

        let check = engine.check_rating(&mid()).await.unwrap();
        assert!(engine.record_check(&mid(), check));
        assert_eq!(engine.slot(&mid()).rating().map(|r| r.value), Some(2.5));
    }

    #[tokio::test]
    async fn test_deleting_an_absent_rating_is_rejected_locally() {
        let mut api = MockMovieApi::new();
        api.expect_delete_rating().never();
        let engine = engine(api);
        engine.record_server_rating(&mid(), None);
        assert!(matches!(
            engine.delete_rating(&mid()).await,
            Err(AppError::Validation(_))
        ));
    }
}
