use crate::{
    config::FeedConfig,
    generator::{batch_size, generate_update, select_subset},
    model::PriceUpdate,
    registry::TokenRegistry,
};
use chrono::{DateTime, Utc};
use rand::Rng;

/// One scheduler tick: pick a random subset of the registry, generate an update for each
/// member and write it back so the next tick compounds from the new values.
///
/// Each registered token appears at most once in the returned batch.
pub(crate) fn next_batch<R>(
    registry: &mut TokenRegistry,
    config: &FeedConfig,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Vec<PriceUpdate>
where
    R: Rng + ?Sized,
{
    let count = batch_size(
        registry.len(),
        config.min_update_fraction,
        config.max_update_fraction,
        rng,
    );
    if count == 0 {
        return Vec::new();
    }

    let selected = select_subset(registry.ids(), count, rng);

    let mut batch = Vec::with_capacity(selected.len());
    for id in selected {
        let Some(token) = registry.get(id.as_str()) else {
            continue;
        };
        let update = generate_update(&token.id, &token.metrics, &config.generator, rng, now);
        registry.apply_update(&update);
        batch.push(update);
    }
    batch
}
