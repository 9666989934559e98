//! Simulated real-time price feed.
//!
//! A [`PriceFeed`] owns the [`TokenRegistry`] of subscribed tokens, a simulated connection with an
//! establishment delay, and a tick loop that runs only while connected. Every tick a random
//! subset of the registry moves and the batch is handed to the current [`FeedCallbacks`].
//!
//! Spawned tasks only hold a [`Weak`] reference to the feed, so dropping the [`PriceFeed`] turns
//! any timer still in flight into a no-op.

use crate::{
    config::{FEED_RNG_STREAM, FeedConfig, rng_from_seed},
    error::FeedError,
    model::{PriceUpdate, Token},
    registry::TokenRegistry,
};
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info};

pub use broadcast::{ConnectionHandler, FeedCallbacks, PriceUpdateHandler};

mod broadcast;
mod scheduler;

use broadcast::Broadcaster;

/// Simulated connection lifecycle: `Idle -> Connecting -> Connected -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Explicitly constructed price feed. Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct PriceFeed {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    runtime: Handle,
    broadcaster: Broadcaster,
    state: Mutex<FeedState>,
}

#[derive(Debug)]
struct FeedState {
    config: FeedConfig,
    registry: TokenRegistry,
    rng: StdRng,
    connection: ConnectionState,
    /// Bumped on every lifecycle transition; a timer carrying a stale epoch does nothing.
    epoch: u64,
    connect_task: Option<JoinHandle<()>>,
    tick_task: Option<JoinHandle<()>>,
}

impl FeedState {
    fn abort_tasks(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }
    }
}

impl PriceFeed {
    pub fn new(config: FeedConfig, callbacks: FeedCallbacks) -> Result<Self, FeedError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| FeedError::RuntimeUnavailable)?;
        let rng = rng_from_seed(config.seed, FEED_RNG_STREAM);

        Ok(Self {
            shared: Arc::new(Shared {
                runtime,
                broadcaster: Broadcaster::new(callbacks),
                state: Mutex::new(FeedState {
                    config,
                    registry: TokenRegistry::new(),
                    rng,
                    connection: ConnectionState::Idle,
                    epoch: 0,
                    connect_task: None,
                    tick_task: None,
                }),
            }),
        })
    }

    /// Begin connecting. After the configured delay the feed flips to connected, the status
    /// callback fires with `true` and the tick loop starts. No-op unless idle.
    pub fn connect(&self) {
        let mut state = self.shared.state.lock();
        if state.connection != ConnectionState::Idle {
            debug!(state = %state.connection, "connect ignored");
            return;
        }

        state.connection = ConnectionState::Connecting;
        state.epoch += 1;

        let delay = state.config.connect_delay;
        let epoch = state.epoch;
        let shared = Arc::downgrade(&self.shared);
        state.connect_task = Some(self.shared.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.complete_connect(epoch);
            }
        }));

        info!(delay_ms = delay.as_millis() as u64, "price feed connecting");
    }

    /// Stop the tick loop and fire the status callback with `false`. No-op unless connected.
    pub fn disconnect(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.connection != ConnectionState::Connected {
                debug!(state = %state.connection, "disconnect ignored");
                return;
            }
            state.abort_tasks();
            state.connection = ConnectionState::Idle;
            state.epoch += 1;
        }

        info!("price feed disconnected");
        self.shared.broadcaster.deliver_status(false);
    }

    /// Cancel any pending connect and the tick loop without invoking callbacks. The registry is
    /// kept and the feed may be connected again.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.abort_tasks();
        state.connection = ConnectionState::Idle;
        state.epoch += 1;
        debug!("price feed shut down");
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().connection
    }

    /// Replace the consumer callbacks present in `callbacks`, keeping any handler it leaves
    /// out. Timers keep running and the connect delay is not re-triggered.
    pub fn update_callbacks(&self, callbacks: FeedCallbacks) {
        self.shared.broadcaster.replace(callbacks);
    }

    /// Copy tokens into the registry, replacing any with the same id.
    pub fn register_tokens<Iter>(&self, tokens: Iter)
    where
        Iter: IntoIterator<Item = Token>,
    {
        let registered = self.shared.state.lock().registry.register(tokens);
        debug!(registered, "tokens registered");
    }

    pub fn unregister_token(&self, id: &str) -> bool {
        self.shared.state.lock().registry.unregister(id).is_some()
    }

    pub fn clear_tokens(&self) {
        self.shared.state.lock().registry.clear();
    }

    /// Point-in-time copy of every registered token.
    pub fn registered_tokens(&self) -> Vec<Token> {
        self.shared.state.lock().registry.snapshot()
    }

    pub fn registered_len(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    pub fn tick_interval(&self) -> Duration {
        self.shared.state.lock().config.tick_interval
    }

    /// Change the tick period. A running tick loop is re-armed with the new period, the registry
    /// is untouched.
    pub fn set_tick_interval(&self, interval: Duration) -> Result<(), FeedError> {
        if interval.is_zero() {
            return Err(FeedError::invalid_config(
                "tick interval must be greater than zero",
            ));
        }

        let mut state = self.shared.state.lock();
        state.config.tick_interval = interval;
        if state.connection == ConnectionState::Connected {
            if let Some(task) = state.tick_task.take() {
                task.abort();
            }
            let epoch = state.epoch;
            state.tick_task = Some(self.shared.spawn_tick_loop(interval, epoch));
        }
        Ok(())
    }
}

impl Drop for PriceFeed {
    fn drop(&mut self) {
        self.shared.state.lock().abort_tasks();
    }
}

impl Shared {
    fn complete_connect(self: Arc<Self>, epoch: u64) {
        {
            let mut state = self.state.lock();
            if state.epoch != epoch || state.connection != ConnectionState::Connecting {
                return;
            }
            state.connection = ConnectionState::Connected;
            state.connect_task = None;
            let interval = state.config.tick_interval;
            state.tick_task = Some(self.spawn_tick_loop(interval, epoch));
        }

        info!("price feed connected");
        self.broadcaster.deliver_status(true);
    }

    fn spawn_tick_loop(self: &Arc<Self>, period: Duration, epoch: u64) -> JoinHandle<()> {
        let shared = Arc::downgrade(self);
        self.runtime.spawn(run_tick_loop(shared, period, epoch))
    }

    fn tick(&self, epoch: u64) -> Vec<PriceUpdate> {
        let mut state = self.state.lock();
        if state.epoch != epoch || state.connection != ConnectionState::Connected {
            return Vec::new();
        }

        let FeedState {
            config,
            registry,
            rng,
            ..
        } = &mut *state;
        scheduler::next_batch(registry, config, rng, Utc::now())
    }
}

async fn run_tick_loop(shared: Weak<Shared>, period: Duration, epoch: u64) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let batch = shared.tick(epoch);
        debug!(batch_len = batch.len(), "price feed tick");
        shared.broadcaster.deliver_batch(&batch);
    }
}
