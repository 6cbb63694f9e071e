use std::future::Future;

use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::models::MovieId;

const BUS_CAPACITY: usize = 64;

/// Cross-view invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshSignal {
    /// The user's ratings changed; personal recommendations and rating lists are stale
    RatingsChanged { movie_id: MovieId },
    /// The listener fell behind and signals were dropped; refresh everything
    Resync,
}

/// Fire-and-forget broadcast of [`RefreshSignal`]s
#[derive(Clone)]
pub struct RefreshBus {
    tx: broadcast::Sender<RefreshSignal>,
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Never blocks; having no listeners is fine
    pub fn publish(&self, signal: RefreshSignal) {
        match self.tx.send(signal) {
            Ok(listeners) => tracing::debug!(listeners, "Refresh signal published"),
            Err(_) => tracing::debug!("Refresh signal published with no listeners"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshSignal> {
        self.tx.subscribe()
    }

    /// Spawns a task running `handler` for every signal until the bus is dropped
    /// or the returned handle is aborted
    pub fn listen<F, Fut>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(RefreshSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => handler(signal).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Refresh listener lagged");
                        handler(RefreshSignal::Resync).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn movie(id: &str) -> MovieId {
        MovieId::parse(id).unwrap()
    }

    #[test]
    fn test_publish_without_listeners_is_fine() {
        let bus = RefreshBus::new();
        bus.publish(RefreshSignal::RatingsChanged { movie_id: movie("m1") });
    }

    #[tokio::test]
    async fn test_listener_receives_signals_in_order() {
        let bus = RefreshBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = bus.listen(move |signal| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(signal);
            }
        });

        bus.publish(RefreshSignal::RatingsChanged { movie_id: movie("a") });
        bus.publish(RefreshSignal::RatingsChanged { movie_id: movie("b") });

        assert_eq!(
            rx.recv().await.unwrap(),
            RefreshSignal::RatingsChanged { movie_id: movie("a") }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            RefreshSignal::RatingsChanged { movie_id: movie("b") }
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_lagging_listener_gets_resync() {
        let bus = RefreshBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = bus.listen(move |signal| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(signal);
            }
        });

        // the listener task has not run yet on the current-thread runtime
        for _ in 0..(BUS_CAPACITY + 5) {
            bus.publish(RefreshSignal::RatingsChanged { movie_id: movie("a") });
        }

        assert_eq!(rx.recv().await.unwrap(), RefreshSignal::Resync);
        assert_eq!(
            rx.recv().await.unwrap(),
            RefreshSignal::RatingsChanged { movie_id: movie("a") }
        );
        handle.abort();
    }
}
