use crate::model::PriceUpdate;
use parking_lot::Mutex;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// Consumer of price update batches.
pub type PriceUpdateHandler = Arc<dyn Fn(&[PriceUpdate]) + Send + Sync>;

/// Consumer of connection status transitions, `true` on connect.
pub type ConnectionHandler = Arc<dyn Fn(bool) + Send + Sync>;

/// The pair of consumer callbacks a [`PriceFeed`](super::PriceFeed) delivers to.
///
/// Either may be absent. Installing a new set replaces only the handlers it carries, so a
/// consumer re-subscribing its price handler keeps its connection listener.
#[derive(Clone, Default)]
pub struct FeedCallbacks {
    pub on_price_update: Option<PriceUpdateHandler>,
    pub on_connection_change: Option<ConnectionHandler>,
}

impl FeedCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price_update<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[PriceUpdate]) + Send + Sync + 'static,
    {
        self.on_price_update = Some(Arc::new(handler));
        self
    }

    pub fn with_connection_change<F>(mut self, handler: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_connection_change = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for FeedCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedCallbacks")
            .field("on_price_update", &self.on_price_update.is_some())
            .field("on_connection_change", &self.on_connection_change.is_some())
            .finish()
    }
}

/// Last-listener-wins delivery of batches and status transitions.
///
/// Handlers are looked up at fire time, so a swap takes effect on the very next delivery and
/// never disturbs running timers. The lock is released before a handler runs, which lets a
/// handler swap callbacks itself.
#[derive(Debug, Default)]
pub(crate) struct Broadcaster {
    callbacks: Mutex<FeedCallbacks>,
}

impl Broadcaster {
    pub(crate) fn new(callbacks: FeedCallbacks) -> Self {
        Self {
            callbacks: Mutex::new(callbacks),
        }
    }

    pub(crate) fn replace(&self, callbacks: FeedCallbacks) {
        let FeedCallbacks {
            on_price_update,
            on_connection_change,
        } = callbacks;

        let mut current = self.callbacks.lock();
        if on_price_update.is_some() {
            current.on_price_update = on_price_update;
        }
        if on_connection_change.is_some() {
            current.on_connection_change = on_connection_change;
        }
    }

    /// Deliver a non-empty batch to the current listener. Returns `false` when the batch was
    /// empty or dropped for lack of a listener.
    pub(crate) fn deliver_batch(&self, batch: &[PriceUpdate]) -> bool {
        if batch.is_empty() {
            return false;
        }

        let handler = self.callbacks.lock().on_price_update.clone();
        match handler {
            Some(handler) => {
                debug!(batch_len = batch.len(), "delivering price update batch");
                handler(batch);
                true
            }
            None => {
                warn!(batch_len = batch.len(), "no price update listener, dropping batch");
                false
            }
        }
    }

    pub(crate) fn deliver_status(&self, connected: bool) {
        let handler = self.callbacks.lock().on_connection_change.clone();
        if let Some(handler) = handler {
            handler(connected);
        }
    }
}
