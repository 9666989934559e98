use chrono::Utc;
use pulse_feed::{
    api::{MockTokenApi, with_retry},
    config::PulseConfig,
    error::FeedError,
    feed::PriceFeed,
    model::Category,
    simulator::TokenSimulator,
    sort::{FilterConfig, SortConfig, SortDirection, SortField, sort_tokens},
    sync::Synchronizer,
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// How often the cache is summarised in the log.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);

/// Tokens listed per category in each summary.
const SNAPSHOT_DEPTH: usize = 3;

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    if let Err(error) = run().await {
        error!(%error, "pulse feed demo failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), FeedError> {
    let config = PulseConfig::from_env()?;
    let started_at = Utc::now();
    info!(
        tick_ms = config.feed.tick_interval.as_millis() as u64,
        seed = ?config.feed.seed,
        run_for = ?config.run_for,
        "starting pulse feed demo"
    );

    // Every component is owned here and wired explicitly
    let api = MockTokenApi::new(config.api.clone())?;
    let synchronizer = Arc::new(Synchronizer::new(config.sync.clone())?);
    let feed = Arc::new(PriceFeed::new(
        config.feed.clone(),
        synchronizer.callbacks(),
    )?);
    let simulator = TokenSimulator::new(config.simulator.clone())?;

    // Initial listings, retrying simulated network failures
    let retries = config.api.retries;
    let buckets = with_retry(retries, || api.fetch_all_tokens()).await?;
    synchronizer.load_all(buckets);
    for category in Category::ALL {
        match with_retry(retries, || api.fetch_tokens_by_category(category, 1, None)).await {
            Ok(listing) => synchronizer.load_category(category, listing),
            Err(error) => warn!(%category, %error, "category listing unavailable, continuing"),
        }
    }

    feed.register_tokens(synchronizer.tokens());
    info!(tokens = feed.registered_len(), "initial listings loaded");

    // New tokens go into the cache and start receiving prices
    let on_new_token = synchronizer.new_token_handler();
    let registrar = Arc::downgrade(&feed);
    simulator.start(move |new_token| {
        if let Some(feed) = registrar.upgrade() {
            feed.register_tokens([new_token.token.clone()]);
        }
        on_new_token(new_token);
    });

    feed.connect();

    let run_for = config.run_for;
    let deadline = async move {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut snapshots =
        tokio::time::interval_at(Instant::now() + SNAPSHOT_INTERVAL, SNAPSHOT_INTERVAL);

    loop {
        tokio::select! {
            _ = snapshots.tick() => log_snapshot(&synchronizer),
            _ = &mut deadline => {
                info!("configured run time elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    warn!(%error, "failed to listen for ctrl-c");
                }
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    simulator.stop();
    feed.disconnect();
    feed.shutdown();
    synchronizer.shutdown();

    info!(
        updates = synchronizer.update_count(),
        minted = simulator.emitted(),
        uptime_secs = (Utc::now() - started_at).num_seconds(),
        "pulse feed demo finished"
    );
    Ok(())
}

/// Log the largest tokens of each category with their current flash direction.
fn log_snapshot(synchronizer: &Synchronizer) {
    let Some(all) = synchronizer.all_view() else {
        warn!("all tokens view not loaded");
        return;
    };

    let sort = SortConfig::new(SortField::MarketCap, SortDirection::Desc);
    for (category, tokens) in all.iter() {
        let top = sort_tokens(tokens, &sort, &FilterConfig::default())
            .into_iter()
            .take(SNAPSHOT_DEPTH)
            .map(|token| {
                serde_json::json!({
                    "symbol": token.symbol,
                    "price": token.metrics.price,
                    "marketCap": token.metrics.market_cap,
                    "ageInSeconds": token.age_in_seconds,
                    "direction": synchronizer.direction(token.id.as_str()),
                })
            })
            .collect::<Vec<_>>();

        info!(
            %category,
            tokens = tokens.len(),
            top = %serde_json::Value::Array(top),
            "category snapshot"
        );
    }

    info!(
        connected = synchronizer.is_feed_connected(),
        updates = synchronizer.update_count(),
        flashing = synchronizer.active_directions().len(),
        "feed status"
    );
}

/// Install the global subscriber. `RUST_LOG` sets the filter (default `info`) and
/// `PULSE_LOG_JSON=1` switches to JSON lines.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("PULSE_LOG_JSON")
        .ok()
        .is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
