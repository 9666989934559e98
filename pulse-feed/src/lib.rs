#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Pulse-Feed
//! Simulated real-time token market data, and the consumer-side machinery that keeps a
//! presentation cache in step with it.
//!
//! * **Feed**: [`PriceFeed`](feed::PriceFeed) owns a registry of subscribed tokens and, while its
//!   simulated connection is up, moves a random 20-40% of them every tick and broadcasts the
//!   batch to the current [`FeedCallbacks`](feed::FeedCallbacks).
//! * **Synchronisation**: [`Synchronizer`](sync::Synchronizer) consumes those batches, flashing a
//!   short-lived direction flag per token and merging the new metrics into a normalised
//!   [`TokenCache`](cache::TokenCache) whose "all" and per-category views are projections of
//!   the same entries.
//! * **Simulation**: [`TokenSimulator`](simulator::TokenSimulator) mints brand new tokens on its
//!   own timer, and the [`AgeTicker`](age::AgeTicker) ages every cached token regardless of feed
//!   connectivity.
//! * **Fetching**: [`MockTokenApi`](api::MockTokenApi) serves the initial listings with
//!   simulated latency and occasional retryable failures.
//!
//! Every component is explicitly constructed, takes its own validated config, and draws from
//! its own optionally seeded random source, so seeded runs are reproducible.
//!
//! ## Example
//! ```rust,no_run
//! use pulse_feed::{
//!     config::{FeedConfig, SyncConfig},
//!     feed::PriceFeed,
//!     sync::Synchronizer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pulse_feed::error::FeedError> {
//!     let synchronizer = Synchronizer::new(SyncConfig::default())?;
//!     let feed = PriceFeed::new(FeedConfig::default().with_seed(42), synchronizer.callbacks())?;
//!
//!     feed.connect();
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     println!("updates received: {}", synchronizer.update_count());
//!     Ok(())
//! }
//! ```

/// Periodic ageing of every cached token.
pub mod age;

/// Mock listing API with simulated latency, failures and [`with_retry`](api::with_retry).
pub mod api;

/// Transient direction flags and latest-update bookkeeping.
pub mod board;

/// Normalised token cache with "all" and per-category projections.
pub mod cache;

/// Component configs, defaults and `PULSE_*` environment overrides.
pub mod config;

/// All [`Error`](std::error::Error)s generated in `pulse-feed`.
pub mod error;

/// Synthesis of listing and simulated tokens.
pub mod factory;

/// Simulated connection, tick loop and last-listener-wins broadcaster.
pub mod feed;

/// Pure price-move generation.
pub mod generator;

/// Core data model.
pub mod model;

/// Working set of tokens eligible for price updates.
pub mod registry;

/// Periodic new-token simulator.
pub mod simulator;

/// Sorting and filtering of token lists.
pub mod sort;

/// Keeps the price board and cache in step with the feed and the simulator.
pub mod sync;
