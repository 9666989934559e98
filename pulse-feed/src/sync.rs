//! Consumer side of the feed: keeps the transient [`PriceBoard`] and the durable [`TokenCache`]
//! in step with every delivered batch and every simulated new token.

use crate::{
    age::AgeTicker,
    board::PriceBoard,
    cache::TokenCache,
    config::SyncConfig,
    error::FeedError,
    feed::FeedCallbacks,
    model::{
        Category, CategoryMap, Direction, MetricsPatch, NewToken, PriceUpdate, Token, TokenId,
        TokenListResponse,
    },
};
use chrono::Utc;
use parking_lot::Mutex;
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace};

#[derive(Debug)]
struct SyncShared {
    cache: Arc<Mutex<TokenCache>>,
    board: Mutex<PriceBoard>,
    closed: AtomicBool,
    feed_connected: AtomicBool,
}

impl SyncShared {
    fn apply_batch(&self, batch: &[PriceUpdate]) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }

        self.board.lock().apply_batch(batch, Instant::now());
        let merged = self.cache.lock().apply_batch(batch);
        debug!(batch_len = batch.len(), merged, "price batch synchronised");
        merged
    }

    fn on_new_token(&self, new_token: NewToken) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let NewToken { token, category } = new_token;
        let token_id = token.id.clone();
        let held = self.cache.lock().prepend(token, category);
        debug!(%token_id, %category, held, "new token prepended");
        held
    }
}

/// Owns the cache and the price board and the two timers that maintain them: the flash sweep
/// and the [`AgeTicker`].
///
/// Callbacks handed out by [`Synchronizer::callbacks`] and [`Synchronizer::new_token_handler`]
/// become no-ops once the synchronizer is shut down or dropped.
#[derive(Debug)]
pub struct Synchronizer {
    config: SyncConfig,
    shared: Arc<SyncShared>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    age_ticker: Mutex<Option<AgeTicker>>,
}

impl Synchronizer {
    pub fn new(config: SyncConfig) -> Result<Self, FeedError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| FeedError::RuntimeUnavailable)?;

        let shared = Arc::new(SyncShared {
            cache: Arc::new(Mutex::new(TokenCache::new())),
            board: Mutex::new(PriceBoard::new(config.flash_duration)),
            closed: AtomicBool::new(false),
            feed_connected: AtomicBool::new(false),
        });

        let age_ticker = AgeTicker::spawn(
            &runtime,
            config.age_interval,
            config.age_increment,
            Arc::downgrade(&shared.cache),
        )?;
        let sweep_task = runtime.spawn(run_sweep_loop(
            Arc::downgrade(&shared),
            config.sweep_interval,
        ));

        Ok(Self {
            config,
            shared,
            sweep_task: Mutex::new(Some(sweep_task)),
            age_ticker: Mutex::new(Some(age_ticker)),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Callbacks to install on a [`PriceFeed`](crate::feed::PriceFeed).
    pub fn callbacks(&self) -> FeedCallbacks {
        let on_batch = Arc::downgrade(&self.shared);
        let on_status = Arc::downgrade(&self.shared);

        FeedCallbacks::new()
            .with_price_update(move |batch| {
                if let Some(shared) = on_batch.upgrade() {
                    shared.apply_batch(batch);
                }
            })
            .with_connection_change(move |connected| {
                if let Some(shared) = on_status.upgrade() {
                    if shared.closed.load(Ordering::Acquire) {
                        return;
                    }
                    shared.feed_connected.store(connected, Ordering::Release);
                    info!(connected, "feed connection changed");
                }
            })
    }

    /// Handler for a [`TokenSimulator`](crate::simulator::TokenSimulator) emission.
    pub fn new_token_handler(&self) -> impl Fn(NewToken) + Send + Sync + 'static {
        let shared = Arc::downgrade(&self.shared);
        move |new_token| {
            if let Some(shared) = shared.upgrade() {
                shared.on_new_token(new_token);
            }
        }
    }

    pub fn apply_batch(&self, batch: &[PriceUpdate]) -> usize {
        self.shared.apply_batch(batch)
    }

    /// Prepend a new token into the loaded views of its category.
    pub fn on_new_token(&self, new_token: NewToken) -> bool {
        self.shared.on_new_token(new_token)
    }

    pub fn load_all(&self, buckets: CategoryMap<Vec<Token>>) {
        self.shared.cache.lock().load_all(buckets);
    }

    pub fn load_category(&self, category: Category, response: TokenListResponse) {
        self.shared.cache.lock().load_category(category, response);
    }

    pub fn invalidate_category(&self, category: Category) {
        self.shared.cache.lock().invalidate_category(category);
    }

    pub fn invalidate_all(&self) {
        self.shared.cache.lock().invalidate_all();
    }

    pub fn merge_metrics(&self, id: &str, patch: &MetricsPatch) -> bool {
        self.shared.cache.lock().merge_metrics(id, patch, Utc::now())
    }

    /// Drop the flash state of a token that left the feed. Other tokens are unaffected.
    pub fn forget(&self, id: &str) {
        self.shared.board.lock().forget(id);
    }

    pub fn all_view(&self) -> Option<CategoryMap<Vec<Token>>> {
        self.shared.cache.lock().all_view()
    }

    pub fn category_view(&self, category: Category) -> Option<TokenListResponse> {
        self.shared.cache.lock().category_view(category)
    }

    pub fn token(&self, id: &str) -> Option<Token> {
        self.shared.cache.lock().get(id).cloned()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.shared.cache.lock().tokens()
    }

    pub fn direction(&self, id: &str) -> Direction {
        self.shared.board.lock().direction(id, Instant::now())
    }

    pub fn active_directions(&self) -> Vec<(TokenId, Direction)> {
        self.shared.board.lock().active_directions(Instant::now())
    }

    pub fn latest_update(&self, id: &str) -> Option<PriceUpdate> {
        self.shared.board.lock().latest_update(id).cloned()
    }

    pub fn update_count(&self) -> u64 {
        self.shared.board.lock().update_count()
    }

    pub fn clear_all_directions(&self) {
        self.shared.board.lock().clear_all_directions();
    }

    pub fn reset_board(&self) {
        self.shared.board.lock().reset();
    }

    pub fn is_feed_connected(&self) -> bool {
        self.shared.feed_connected.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Cancel the sweep and the age ticker. Outstanding callbacks become no-ops.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.sweep_task.lock().take() {
            task.abort();
        }
        if let Some(ticker) = self.age_ticker.lock().take() {
            ticker.stop();
        }
        debug!("synchronizer shut down");
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_sweep_loop(shared: Weak<SyncShared>, period: Duration) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let expired = shared.board.lock().sweep(Instant::now());
        if expired > 0 {
            trace!(expired, "direction flags reset");
        }
    }
}
