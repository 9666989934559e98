//! Configuration for every timer-owning component.
//!
//! Each config has reference defaults, `with_*` builder setters and a `validate` method that the
//! owning component calls at construction so misconfiguration fails fast.

use crate::{error::FeedError, generator::GeneratorParams, model::CategoryMap};
use rand::{SeedableRng, rngs::StdRng};
use std::{str::FromStr, time::Duration};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1_500);
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MIN_UPDATE_FRACTION: f64 = 0.2;
pub const DEFAULT_MAX_UPDATE_FRACTION: f64 = 0.4;
pub const DEFAULT_FLASH_DURATION: Duration = Duration::from_millis(500);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_AGE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_AGE_INCREMENT: u64 = 1;
pub const DEFAULT_NEW_TOKEN_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_NEW_TOKEN_INITIAL_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_FETCH_LATENCY: Duration = Duration::from_millis(800);
pub const DEFAULT_FETCH_FAILURE_RATE: f64 = 0.02;
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_FETCH_RETRIES: u32 = 2;

/// Per-component salts mixed into a shared seed so seeded components never replay the same
/// random stream.
pub(crate) const FEED_RNG_STREAM: u64 = 1;
pub(crate) const SIMULATOR_RNG_STREAM: u64 = 2;
pub(crate) const API_RNG_STREAM: u64 = 3;

/// Build a [`StdRng`] for one component. Seeded generators are reproducible, unseeded ones draw
/// from the OS.
pub fn rng_from_seed(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => {
            StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        }
        None => StdRng::from_os_rng(),
    }
}

fn ensure_positive(name: &str, duration: Duration) -> Result<(), FeedError> {
    if duration.is_zero() {
        return Err(FeedError::invalid_config(format!(
            "{name} must be greater than zero"
        )));
    }
    Ok(())
}

fn ensure_probability(name: &str, value: f64) -> Result<(), FeedError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(FeedError::invalid_config(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// [`PriceFeed`](crate::feed::PriceFeed) configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Period of the price tick loop while connected.
    pub tick_interval: Duration,
    /// Simulated connection-establishment delay.
    pub connect_delay: Duration,
    /// Lower bound (inclusive) of the fraction of registered tokens updated per tick.
    pub min_update_fraction: f64,
    /// Upper bound (exclusive) of the fraction of registered tokens updated per tick.
    pub max_update_fraction: f64,
    pub generator: GeneratorParams,
    pub seed: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            connect_delay: DEFAULT_CONNECT_DELAY,
            min_update_fraction: DEFAULT_MIN_UPDATE_FRACTION,
            max_update_fraction: DEFAULT_MAX_UPDATE_FRACTION,
            generator: GeneratorParams::default(),
            seed: None,
        }
    }
}

impl FeedConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_update_fraction(mut self, min: f64, max: f64) -> Self {
        self.min_update_fraction = min;
        self.max_update_fraction = max;
        self
    }

    pub fn with_generator(mut self, generator: GeneratorParams) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        ensure_positive("tick interval", self.tick_interval)?;
        ensure_positive("connect delay", self.connect_delay)?;
        ensure_probability("min update fraction", self.min_update_fraction)?;
        ensure_probability("max update fraction", self.max_update_fraction)?;
        if self.min_update_fraction > self.max_update_fraction {
            return Err(FeedError::invalid_config(
                "min update fraction must not exceed max update fraction",
            ));
        }
        self.generator.validate()
    }
}

/// [`Synchronizer`](crate::sync::Synchronizer) configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// How long a direction flag stays set after the latest update for its token.
    pub flash_duration: Duration,
    /// Cadence of the sweep that resets expired direction flags.
    pub sweep_interval: Duration,
    /// Cadence of the age ticker.
    pub age_interval: Duration,
    /// Seconds added to every cached token per age tick.
    pub age_increment: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flash_duration: DEFAULT_FLASH_DURATION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            age_interval: DEFAULT_AGE_INTERVAL,
            age_increment: DEFAULT_AGE_INCREMENT,
        }
    }
}

impl SyncConfig {
    pub fn with_flash_duration(mut self, duration: Duration) -> Self {
        self.flash_duration = duration;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_age_interval(mut self, interval: Duration) -> Self {
        self.age_interval = interval;
        self
    }

    pub fn with_age_increment(mut self, increment: u64) -> Self {
        self.age_increment = increment;
        self
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        ensure_positive("flash duration", self.flash_duration)?;
        ensure_positive("sweep interval", self.sweep_interval)?;
        ensure_positive("age interval", self.age_interval)
    }
}

/// [`TokenSimulator`](crate::simulator::TokenSimulator) configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Period between minted tokens.
    pub interval: Duration,
    /// One-off delay before the first token.
    pub initial_delay: Duration,
    /// Relative weight of each category when choosing where a new token lands.
    pub weights: CategoryMap<f64>,
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_NEW_TOKEN_INTERVAL,
            initial_delay: DEFAULT_NEW_TOKEN_INITIAL_DELAY,
            weights: CategoryMap {
                new_pairs: 0.60,
                final_stretch: 0.25,
                migrated: 0.15,
            },
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_weights(mut self, weights: CategoryMap<f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        ensure_positive("new token interval", self.interval)?;
        ensure_positive("new token initial delay", self.initial_delay)?;

        let mut total = 0.0;
        for (category, weight) in self.weights.iter() {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(FeedError::invalid_config(format!(
                    "weight for {category} must be a finite non-negative number"
                )));
            }
            total += weight;
        }
        if total <= 0.0 {
            return Err(FeedError::invalid_config(
                "at least one category weight must be positive",
            ));
        }
        Ok(())
    }
}

/// [`MockTokenApi`](crate::api::MockTokenApi) configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Simulated request latency.
    pub latency: Duration,
    /// Probability that any single request fails with a retryable network error.
    pub failure_rate: f64,
    pub page_size: usize,
    /// Extra attempts made by [`with_retry`](crate::api::with_retry) after the first failure.
    pub retries: u32,
    pub seed: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            latency: DEFAULT_FETCH_LATENCY,
            failure_rate: DEFAULT_FETCH_FAILURE_RATE,
            page_size: DEFAULT_PAGE_SIZE,
            retries: DEFAULT_FETCH_RETRIES,
            seed: None,
        }
    }
}

impl ApiConfig {
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        ensure_probability("fetch failure rate", self.failure_rate)?;
        if self.page_size == 0 {
            return Err(FeedError::invalid_config("page size must be greater than zero"));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(FeedError::invalid_config(format!(
                "page size must be at most {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Complete configuration of a pulse session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulseConfig {
    pub feed: FeedConfig,
    pub sync: SyncConfig,
    pub simulator: SimulatorConfig,
    pub api: ApiConfig,
    /// Stop after this long, or run until interrupted when `None`.
    pub run_for: Option<Duration>,
}

impl PulseConfig {
    /// Read `PULSE_*` environment variables, falling back to defaults for anything unset or
    /// unparsable, then validate the result.
    pub fn from_env() -> Result<Self, FeedError> {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>("PULSE_TICK_MS") {
            config.feed.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("PULSE_CONNECT_DELAY_MS") {
            config.feed.connect_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("PULSE_FLASH_MS") {
            config.sync.flash_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("PULSE_AGE_TICK_MS") {
            config.sync.age_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("PULSE_NEW_TOKEN_MS") {
            config.simulator.interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("PULSE_NEW_TOKEN_DELAY_MS") {
            config.simulator.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("PULSE_FETCH_LATENCY_MS") {
            config.api.latency = Duration::from_millis(ms);
        }
        if let Some(rate) = env_parse::<f64>("PULSE_FETCH_FAILURE_RATE") {
            config.api.failure_rate = rate;
        }
        if let Some(seed) = env_parse::<u64>("PULSE_SEED") {
            config.feed.seed = Some(seed);
            config.simulator.seed = Some(seed);
            config.api.seed = Some(seed);
        }
        config.run_for = env_parse::<u64>("PULSE_RUN_SECS").map(Duration::from_secs);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        self.feed.validate()?;
        self.sync.validate()?;
        self.simulator.validate()?;
        self.api.validate()
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
}
