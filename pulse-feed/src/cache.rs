//! Durable consumer-facing token cache.
//!
//! Tokens are stored once, keyed by id. The "all" view and the per-category listing views only
//! hold ordered id lists and are projected into full [`Token`]s on read, so a merge lands in
//! every view at once and the views can never disagree.

use crate::model::{
    Category, CategoryMap, MetricsPatch, PriceUpdate, Token, TokenId, TokenListResponse,
};
use chrono::{DateTime, Utc};
use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;

#[derive(Debug, Clone, PartialEq)]
struct ListingView {
    ids: Vec<TokenId>,
    total: usize,
    page: usize,
    page_size: usize,
    has_more: bool,
}

impl ListingView {
    /// Remove `id` from the page, reporting whether it was present. `total` is left as is.
    fn drop_id(&mut self, id: &TokenId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() < before
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    tokens: FnvHashMap<TokenId, Token>,
    all: Option<CategoryMap<Vec<TokenId>>>,
    listings: CategoryMap<Option<ListingView>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the "all" view from a bulk fetch.
    pub fn load_all(&mut self, buckets: CategoryMap<Vec<Token>>) {
        let ids = buckets.map(|_, tokens| self.insert_tokens(tokens));
        self.all = Some(ids);
        self.prune();
    }

    /// Install or replace one category listing from a page fetch.
    pub fn load_category(&mut self, category: Category, response: TokenListResponse) {
        let TokenListResponse {
            tokens,
            total,
            page,
            page_size,
            has_more,
        } = response;

        let ids = self.insert_tokens(tokens);
        *self.listings.get_mut(category) = Some(ListingView {
            ids,
            total,
            page,
            page_size,
            has_more,
        });
        self.prune();
    }

    fn insert_tokens(&mut self, tokens: Vec<Token>) -> Vec<TokenId> {
        tokens
            .into_iter()
            .map(|token| {
                let id = token.id.clone();
                self.tokens.insert(id.clone(), token);
                id
            })
            .unique()
            .collect()
    }

    /// Shallow-merge `patch` into a cached token and bump its `updated_at`. Returns `false` if
    /// no view holds the token.
    pub fn merge_metrics(&mut self, id: &str, patch: &MetricsPatch, now: DateTime<Utc>) -> bool {
        let Some(token) = self.tokens.get_mut(id) else {
            return false;
        };
        patch.apply(&mut token.metrics);
        token.touch(now);
        true
    }

    /// Merge the price, market cap and volume of every update. Returns how many were cached.
    pub fn apply_batch(&mut self, batch: &[PriceUpdate]) -> usize {
        batch
            .iter()
            .filter(|update| {
                self.merge_metrics(
                    update.token_id.as_str(),
                    &update.metrics_patch(),
                    update.timestamp,
                )
            })
            .count()
    }

    /// Insert `token` at the front of every loaded view of `category`.
    ///
    /// A token already cached under another category moves: it leaves every other bucket first.
    /// Views that have not been loaded are left unloaded, and a token no view holds is not
    /// retained. Returns whether any view took the token.
    pub fn prepend(&mut self, mut token: Token, category: Category) -> bool {
        token.category = category;
        let id = token.id.clone();
        let mut held = false;

        if let Some(all) = self.all.as_mut() {
            for (_, bucket) in all.iter_mut() {
                bucket.retain(|existing| existing != &id);
            }
            all.get_mut(category).insert(0, id.clone());
            held = true;
        }

        for other in Category::ALL.into_iter().filter(|other| *other != category) {
            if let Some(listing) = self.listings.get_mut(other).as_mut() {
                if listing.drop_id(&id) {
                    listing.total = listing.total.saturating_sub(1);
                }
            }
        }

        if let Some(listing) = self.listings.get_mut(category).as_mut() {
            if !listing.drop_id(&id) {
                listing.total += 1;
            }
            listing.ids.insert(0, id.clone());
            held = true;
        }

        if held {
            self.tokens.insert(id, token);
        } else {
            self.prune();
        }
        held
    }

    /// Add `seconds` to the age of every cached token. No other field changes.
    pub fn increment_ages(&mut self, seconds: u64) -> usize {
        for token in self.tokens.values_mut() {
            token.age_in_seconds = token.age_in_seconds.saturating_add(seconds);
        }
        self.tokens.len()
    }

    pub fn invalidate_category(&mut self, category: Category) {
        *self.listings.get_mut(category) = None;
        self.prune();
    }

    pub fn invalidate_all(&mut self) {
        self.all = None;
        self.prune();
    }

    /// Remove a token from every view.
    pub fn remove(&mut self, id: &str) -> Option<Token> {
        let token = self.tokens.remove(id)?;
        if let Some(all) = self.all.as_mut() {
            for (_, bucket) in all.iter_mut() {
                bucket.retain(|existing| existing.as_str() != id);
            }
        }
        for category in Category::ALL {
            if let Some(listing) = self.listings.get_mut(category).as_mut() {
                if listing.drop_id(&token.id) {
                    listing.total = listing.total.saturating_sub(1);
                }
            }
        }
        Some(token)
    }

    /// Drop tokens no longer referenced by any view.
    fn prune(&mut self) {
        let referenced: FnvHashSet<&TokenId> = self
            .all
            .iter()
            .flat_map(|all| all.iter().flat_map(|(_, ids)| ids.iter()))
            .chain(
                self.listings
                    .iter()
                    .filter_map(|(_, listing)| listing.as_ref())
                    .flat_map(|listing| listing.ids.iter()),
            )
            .collect();

        let orphans = self
            .tokens
            .keys()
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect::<Vec<_>>();
        for id in orphans {
            self.tokens.remove(&id);
        }
    }

    fn project(&self, ids: &[TokenId]) -> Vec<Token> {
        ids.iter()
            .filter_map(|id| self.tokens.get(id))
            .cloned()
            .collect()
    }

    /// The "all" view, bucketed by category, or `None` if it has not been loaded.
    pub fn all_view(&self) -> Option<CategoryMap<Vec<Token>>> {
        self.all
            .as_ref()
            .map(|all| CategoryMap::from_fn(|category| self.project(all.get(category))))
    }

    /// One category listing, or `None` if it has not been loaded.
    pub fn category_view(&self, category: Category) -> Option<TokenListResponse> {
        self.listings
            .get(category)
            .as_ref()
            .map(|listing| TokenListResponse {
                tokens: self.project(&listing.ids),
                total: listing.total,
                page: listing.page,
                page_size: listing.page_size,
                has_more: listing.has_more,
            })
    }

    pub fn get(&self, id: &str) -> Option<&Token> {
        self.tokens.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tokens.contains_key(id)
    }

    /// Every cached token, ordered by id.
    pub fn tokens(&self) -> Vec<Token> {
        self.tokens
            .values()
            .sorted_by(|a, b| a.id.cmp(&b.id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, test_utils::token};

    fn bucket(category: Category, ids: &[&str]) -> Vec<Token> {
        ids.iter().map(|id| token(id, category, 1.0)).collect()
    }

    fn listing(category: Category, ids: &[&str]) -> TokenListResponse {
        TokenListResponse {
            tokens: bucket(category, ids),
            total: ids.len() * 3,
            page: 1,
            page_size: ids.len(),
            has_more: true,
        }
    }

    fn loaded() -> TokenCache {
        let mut cache = TokenCache::new();
        cache.load_all(CategoryMap {
            new_pairs: bucket(Category::NewPairs, &["a", "b", "c"]),
            final_stretch: bucket(Category::FinalStretch, &["d"]),
            migrated: bucket(Category::Migrated, &["e"]),
        });
        cache.load_category(Category::NewPairs, listing(Category::NewPairs, &["a", "b", "c"]));
        cache
    }

    fn ids(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|token| token.id.as_str()).collect()
    }

    fn update(id: &str, price: f64) -> PriceUpdate {
        PriceUpdate {
            token_id: TokenId::from(id),
            old_price: 1.0,
            new_price: price,
            old_market_cap: 1_000_000.0,
            new_market_cap: price * 1_000_000.0,
            old_volume: 10_000.0,
            new_volume: 9_000.0,
            direction: Direction::Up,
            timestamp: Utc::now() + chrono::Duration::seconds(1),
        }
    }

    #[test]
    fn test_batch_merge_is_identical_across_views() {
        let mut cache = loaded();
        let before = cache.get("a").unwrap().clone();

        assert_eq!(cache.apply_batch(&[update("a", 2.0), update("missing", 3.0)]), 1);

        let all = cache.all_view().unwrap();
        let listing = cache.category_view(Category::NewPairs).unwrap();
        let from_all = all.new_pairs.iter().find(|t| t.id.as_str() == "a").unwrap();
        let from_listing = listing.tokens.iter().find(|t| t.id.as_str() == "a").unwrap();

        assert_eq!(from_all, from_listing);
        assert_eq!(from_all.metrics.price, 2.0);
        assert_eq!(from_all.metrics.market_cap, 2_000_000.0);
        assert_eq!(from_all.metrics.volume, 9_000.0);
        assert_eq!(from_all.metrics.holders, before.metrics.holders);
        assert_eq!(from_all.metrics.liquidity, before.metrics.liquidity);
        assert_eq!(from_all.risk_metrics, before.risk_metrics);
        assert!(from_all.updated_at > before.updated_at);
    }

    #[test]
    fn test_prepend_goes_to_front_of_loaded_views() {
        let mut cache = loaded();

        assert!(cache.prepend(token("x", Category::NewPairs, 0.5), Category::NewPairs));

        let all = cache.all_view().unwrap();
        assert_eq!(ids(&all.new_pairs), vec!["x", "a", "b", "c"]);
        assert_eq!(ids(&all.final_stretch), vec!["d"]);

        let listing = cache.category_view(Category::NewPairs).unwrap();
        assert_eq!(ids(&listing.tokens), vec!["x", "a", "b", "c"]);
        assert_eq!(listing.total, 10);
    }

    #[test]
    fn test_prepend_does_not_create_unloaded_views() {
        let mut cache = loaded();

        assert!(cache.prepend(token("y", Category::Migrated, 0.5), Category::Migrated));
        assert!(cache.category_view(Category::Migrated).is_none());
        assert_eq!(ids(&cache.all_view().unwrap().migrated), vec!["y", "e"]);

        let mut empty = TokenCache::new();
        assert!(!empty.prepend(token("z", Category::Migrated, 0.5), Category::Migrated));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_prepend_same_id_twice_is_not_duplicated() {
        let mut cache = loaded();
        cache.prepend(token("x", Category::NewPairs, 0.5), Category::NewPairs);
        cache.prepend(token("x", Category::NewPairs, 0.7), Category::NewPairs);

        let listing = cache.category_view(Category::NewPairs).unwrap();
        assert_eq!(ids(&listing.tokens), vec!["x", "a", "b", "c"]);
        assert_eq!(listing.total, 10);
        assert_eq!(cache.get("x").unwrap().metrics.price, 0.7);
    }

    #[test]
    fn test_prepend_under_new_category_moves_token() {
        let mut cache = loaded();
        assert!(cache.prepend(token("b", Category::NewPairs, 2.0), Category::Migrated));

        let all = cache.all_view().unwrap();
        assert_eq!(ids(&all.new_pairs), vec!["a", "c"]);
        assert_eq!(ids(&all.migrated), vec!["b", "e"]);
        assert_eq!(cache.get("b").unwrap().category, Category::Migrated);

        let listing = cache.category_view(Category::NewPairs).unwrap();
        assert_eq!(ids(&listing.tokens), vec!["a", "c"]);
        assert_eq!(listing.total, 8);

        assert!(cache.remove("b").is_some());
        let all = cache.all_view().unwrap();
        assert_eq!(ids(&all.migrated), vec!["e"]);
        assert!(all.iter().all(|(_, bucket)| bucket.iter().all(|t| t.id.as_str() != "b")));
    }

    #[test]
    fn test_age_increments_are_additive() {
        let mut cache = loaded();
        cache.apply_batch(&[update("b", 4.0)]);

        for _ in 0..7 {
            assert_eq!(cache.increment_ages(3), 5);
        }

        for token in cache.tokens() {
            assert_eq!(token.age_in_seconds, 21, "token {}", token.id);
        }
        let listing = cache.category_view(Category::NewPairs).unwrap();
        assert!(listing.tokens.iter().all(|token| token.age_in_seconds == 21));
        assert_eq!(cache.get("b").unwrap().metrics.price, 4.0);
    }

    #[test]
    fn test_invalidate_prunes_orphans() {
        let mut cache = loaded();
        cache.prepend(token("x", Category::NewPairs, 0.5), Category::NewPairs);

        cache.invalidate_all();
        assert!(cache.all_view().is_none());
        assert!(cache.contains("a"));
        assert!(!cache.contains("d"));
        assert!(cache.contains("x"));

        cache.invalidate_category(Category::NewPairs);
        assert!(cache.is_empty());
        assert!(!cache.merge_metrics("a", &MetricsPatch::default(), Utc::now()));
    }

    #[test]
    fn test_reload_replaces_view_and_last_write_wins() {
        let mut cache = loaded();

        let mut fresh = token("a", Category::NewPairs, 9.0);
        fresh.name = "FRESH".to_string();
        cache.load_category(
            Category::NewPairs,
            TokenListResponse {
                tokens: vec![fresh],
                total: 1,
                page: 1,
                page_size: 20,
                has_more: false,
            },
        );

        let listing = cache.category_view(Category::NewPairs).unwrap();
        assert_eq!(ids(&listing.tokens), vec!["a"]);
        assert!(!listing.has_more);
        // The all view still lists b and c, and sees the fresh copy of a
        let all = cache.all_view().unwrap();
        assert_eq!(ids(&all.new_pairs), vec!["a", "b", "c"]);
        assert_eq!(all.new_pairs[0].name, "FRESH");
    }

    #[test]
    fn test_remove_drops_token_from_every_view() {
        let mut cache = loaded();

        assert!(cache.remove("b").is_some());
        assert!(cache.remove("b").is_none());

        assert_eq!(ids(&cache.all_view().unwrap().new_pairs), vec!["a", "c"]);
        let listing = cache.category_view(Category::NewPairs).unwrap();
        assert_eq!(ids(&listing.tokens), vec!["a", "c"]);
        assert_eq!(listing.total, 8);
    }
}
