use crate::{cache::TokenCache, error::FeedError};
use parking_lot::Mutex;
use std::{sync::Weak, time::Duration};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::trace;

/// Periodically advances the age of every cached token, independent of feed connectivity.
///
/// Holds only a [`Weak`] reference to the cache: once the cache is dropped the ticker exits on
/// its next fire. Dropping the ticker stops it.
#[derive(Debug)]
pub struct AgeTicker {
    task: JoinHandle<()>,
}

impl AgeTicker {
    pub fn spawn(
        runtime: &Handle,
        interval: Duration,
        increment: u64,
        cache: Weak<Mutex<TokenCache>>,
    ) -> Result<Self, FeedError> {
        if interval.is_zero() {
            return Err(FeedError::invalid_config(
                "age interval must be greater than zero",
            ));
        }

        let task = runtime.spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let aged = cache.lock().increment_ages(increment);
                trace!(aged, increment, "token ages advanced");
            }
        });

        Ok(Self { task })
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for AgeTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, CategoryMap, test_utils::token};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn cache() -> Arc<Mutex<TokenCache>> {
        let mut cache = TokenCache::new();
        cache.load_all(CategoryMap {
            new_pairs: vec![token("a", Category::NewPairs, 1.0)],
            final_stretch: vec![token("b", Category::FinalStretch, 1.0)],
            migrated: Vec::new(),
        });
        Arc::new(Mutex::new(cache))
    }

    fn ages(cache: &Mutex<TokenCache>) -> Vec<u64> {
        cache
            .lock()
            .tokens()
            .iter()
            .map(|token| token.age_in_seconds)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ages_advance_by_k_times_increment() {
        let cache = cache();
        let ticker = AgeTicker::spawn(
            &Handle::current(),
            Duration::from_secs(1),
            2,
            Arc::downgrade(&cache),
        )
        .unwrap();

        sleep(Duration::from_millis(4_500)).await;
        assert_eq!(ages(&cache), vec![8, 8]);

        ticker.stop();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(ages(&cache), vec![8, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_exits_when_cache_dropped() {
        let cache = cache();
        let ticker = AgeTicker::spawn(
            &Handle::current(),
            Duration::from_millis(100),
            1,
            Arc::downgrade(&cache),
        )
        .unwrap();

        drop(cache);
        sleep(Duration::from_millis(250)).await;
        assert!(!ticker.is_running());
    }

    #[tokio::test]
    async fn test_rejects_zero_interval() {
        let result = AgeTicker::spawn(&Handle::current(), Duration::ZERO, 1, Weak::new());
        assert!(matches!(result, Err(FeedError::InvalidConfig(_))));
    }
}
