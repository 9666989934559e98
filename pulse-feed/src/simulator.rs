//! Periodic generator of brand new tokens.
//!
//! The simulator only mints and emits; prepending into the cache is the consumer's job.

use crate::{
    config::{SIMULATOR_RNG_STREAM, SimulatorConfig, rng_from_seed},
    error::FeedError,
    factory::TokenFactory,
    model::{Category, CategoryMap, NewToken},
};
use chrono::Utc;
use parking_lot::Mutex;
use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
    rngs::StdRng,
};
use std::sync::{Arc, Weak};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info};

/// Consumer of minted tokens.
pub type NewTokenHandler = Arc<dyn Fn(NewToken) + Send + Sync>;

/// Weighted choice over the three [`Category`] buckets.
#[derive(Debug, Clone)]
pub struct CategoryPicker {
    index: WeightedIndex<f64>,
}

impl CategoryPicker {
    pub fn new(weights: &CategoryMap<f64>) -> Result<Self, FeedError> {
        let index = WeightedIndex::new(Category::ALL.map(|category| *weights.get(category)))
            .map_err(|error| FeedError::invalid_config(format!("category weights: {error}")))?;
        Ok(Self { index })
    }

    pub fn pick<R>(&self, rng: &mut R) -> Category
    where
        R: Rng + ?Sized,
    {
        Category::ALL[self.index.sample(rng)]
    }
}

#[derive(Debug)]
struct SimState {
    factory: TokenFactory,
    picker: CategoryPicker,
    rng: StdRng,
    emitted: u64,
    task: Option<JoinHandle<()>>,
}

impl SimState {
    fn mint(&mut self) -> NewToken {
        let category = self.picker.pick(&mut self.rng);
        let token = self.factory.simulated(category, &mut self.rng, Utc::now());
        self.emitted += 1;
        NewToken::new(token, category)
    }
}

/// Emits one new token after `initial_delay`, then one every `interval`, until stopped.
#[derive(Debug)]
pub struct TokenSimulator {
    runtime: Handle,
    config: SimulatorConfig,
    state: Arc<Mutex<SimState>>,
}

impl TokenSimulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, FeedError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| FeedError::RuntimeUnavailable)?;
        let picker = CategoryPicker::new(&config.weights)?;
        let rng = rng_from_seed(config.seed, SIMULATOR_RNG_STREAM);

        Ok(Self {
            runtime,
            config,
            state: Arc::new(Mutex::new(SimState {
                factory: TokenFactory::new(),
                picker,
                rng,
                emitted: 0,
                task: None,
            })),
        })
    }

    /// Start emitting to `on_new_token`. Returns `false`, keeping the current handler, if already
    /// running.
    pub fn start<F>(&self, on_new_token: F) -> bool
    where
        F: Fn(NewToken) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if state.task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("token simulator already running");
            return false;
        }

        let handler: NewTokenHandler = Arc::new(on_new_token);
        state.task = Some(self.runtime.spawn(run_simulator_loop(
            Arc::downgrade(&self.state),
            self.config.clone(),
            handler,
        )));

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            initial_delay_ms = self.config.initial_delay.as_millis() as u64,
            "token simulator started"
        );
        true
    }

    /// Cancel the pending first emission and the periodic timer. Returns `false` if not running.
    pub fn stop(&self) -> bool {
        let Some(task) = self.state.lock().task.take() else {
            return false;
        };
        task.abort();
        info!("token simulator stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Number of tokens minted since construction.
    pub fn emitted(&self) -> u64 {
        self.state.lock().emitted
    }
}

impl Drop for TokenSimulator {
    fn drop(&mut self) {
        if let Some(task) = self.state.lock().task.take() {
            task.abort();
        }
    }
}

async fn run_simulator_loop(
    state: Weak<Mutex<SimState>>,
    config: SimulatorConfig,
    handler: NewTokenHandler,
) {
    let mut ticks =
        tokio::time::interval_at(Instant::now() + config.initial_delay, config.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let Some(state) = state.upgrade() else {
            break;
        };

        let new_token = state.lock().mint();
        debug!(
            token_id = %new_token.token.id,
            category = %new_token.category,
            "new token minted"
        );
        handler(new_token);
    }
}
