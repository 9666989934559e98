//! Pure price-move generation.
//!
//! Nothing in here owns state or touches a clock: callers pass the random source and the
//! timestamp, so a seeded [`StdRng`](rand::rngs::StdRng) reproduces an exact sequence.

use crate::{
    error::FeedError,
    model::{Direction, PRICE_FLOOR, PriceUpdate, TokenId, TokenMetrics},
};
use chrono::{DateTime, Utc};
use rand::{Rng, seq::SliceRandom};

/// Shape of the price and volume move distributions.
///
/// A base move is `(u - change_bias) * change_range` for `u ~ U[0, 1)`, so the defaults give
/// moves in `[-8%, +12%)`. With probability `boost_probability` a symmetric volatility boost of
/// `(u - 0.5) * boost_range` is added on top. Volume moves independently by
/// `(u - volume_bias) * volume_range`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorParams {
    pub change_bias: f64,
    pub change_range: f64,
    pub boost_probability: f64,
    pub boost_range: f64,
    pub volume_bias: f64,
    pub volume_range: f64,
    pub price_floor: f64,
    pub market_cap_floor: f64,
    /// Relative price moves smaller than this register as [`Direction::Neutral`].
    pub dead_band: f64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            change_bias: 0.4,
            change_range: 0.2,
            boost_probability: 0.05,
            boost_range: 0.5,
            volume_bias: 0.3,
            volume_range: 0.1,
            price_floor: PRICE_FLOOR,
            market_cap_floor: 100.0,
            dead_band: 0.001,
        }
    }
}

impl GeneratorParams {
    pub fn validate(&self) -> Result<(), FeedError> {
        let finite = [
            ("change bias", self.change_bias),
            ("change range", self.change_range),
            ("boost range", self.boost_range),
            ("volume bias", self.volume_bias),
            ("volume range", self.volume_range),
            ("market cap floor", self.market_cap_floor),
            ("dead band", self.dead_band),
        ];
        for (name, value) in finite {
            if !value.is_finite() || value < 0.0 {
                return Err(FeedError::invalid_config(format!(
                    "{name} must be a finite non-negative number"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.boost_probability) {
            return Err(FeedError::invalid_config(
                "boost probability must be within [0, 1]",
            ));
        }
        if !self.price_floor.is_finite() || self.price_floor <= 0.0 {
            return Err(FeedError::invalid_config("price floor must be positive"));
        }
        Ok(())
    }
}

/// Classify a price move, treating relative changes below `dead_band` as neutral.
pub fn direction(old_price: f64, new_price: f64, dead_band: f64) -> Direction {
    if old_price <= 0.0 {
        return if new_price > old_price {
            Direction::Up
        } else {
            Direction::Neutral
        };
    }

    let change = (new_price - old_price) / old_price;
    if change.abs() < dead_band {
        Direction::Neutral
    } else if new_price > old_price {
        Direction::Up
    } else {
        Direction::Down
    }
}

/// Compute the next [`PriceUpdate`] for one token from its current metrics.
pub fn generate_update<R>(
    token_id: &TokenId,
    metrics: &TokenMetrics,
    params: &GeneratorParams,
    rng: &mut R,
    timestamp: DateTime<Utc>,
) -> PriceUpdate
where
    R: Rng + ?Sized,
{
    let change = (rng.random::<f64>() - params.change_bias) * params.change_range;
    let boost = if rng.random::<f64>() < params.boost_probability {
        (rng.random::<f64>() - 0.5) * params.boost_range
    } else {
        0.0
    };
    let total_change = change + boost;

    let volume_change = (rng.random::<f64>() - params.volume_bias) * params.volume_range;

    let new_price = (metrics.price * (1.0 + total_change)).max(params.price_floor);
    let new_market_cap = (metrics.market_cap * (1.0 + total_change)).max(params.market_cap_floor);
    let new_volume = (metrics.volume * (1.0 + volume_change)).max(0.0);

    PriceUpdate {
        token_id: token_id.clone(),
        old_price: metrics.price,
        new_price,
        old_market_cap: metrics.market_cap,
        new_market_cap,
        old_volume: metrics.volume,
        new_volume,
        direction: direction(metrics.price, new_price, params.dead_band),
        timestamp,
    }
}

/// Number of tokens to update this tick: `floor(registered * f)` with `f ~ U[min, max)`.
pub fn batch_size<R>(registered: usize, min_fraction: f64, max_fraction: f64, rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    if registered == 0 {
        return 0;
    }

    let fraction = if max_fraction > min_fraction {
        rng.random_range(min_fraction..max_fraction)
    } else {
        min_fraction
    };

    let lower = (registered as f64 * min_fraction).floor() as usize;
    let upper = (registered as f64 * max_fraction).floor() as usize;
    let count = (registered as f64 * fraction).floor() as usize;

    count.clamp(lower, upper.max(lower)).min(registered)
}

/// Unbiased subset selection: shuffle every candidate, keep the first `count`.
pub fn select_subset<T, R>(mut candidates: Vec<T>, count: usize, rng: &mut R) -> Vec<T>
where
    R: Rng + ?Sized,
{
    candidates.shuffle(rng);
    candidates.truncate(count);
    candidates
}
