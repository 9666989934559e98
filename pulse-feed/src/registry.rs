use crate::model::{PRICE_FLOOR, PriceUpdate, Token, TokenId};
use indexmap::IndexMap;

/// Working set of [`Token`]s eligible for simulated price updates.
///
/// Entries are owned copies: [`TokenRegistry::register`] copies in and
/// [`TokenRegistry::snapshot`] copies out, so callers can never alias stored state. Insertion
/// order is preserved so a seeded feed selects the same subsets run to run.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: IndexMap<TokenId, Token>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert by id. A token already present is replaced in place (last write wins) and keeps
    /// its position.
    pub fn register<Iter>(&mut self, tokens: Iter) -> usize
    where
        Iter: IntoIterator<Item = Token>,
    {
        let mut registered = 0;
        for mut token in tokens {
            token.metrics.price = token.metrics.price.max(PRICE_FLOOR);
            self.tokens.insert(token.id.clone(), token);
            registered += 1;
        }
        registered
    }

    pub fn unregister(&mut self, id: &str) -> Option<Token> {
        self.tokens.shift_remove(id)
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn snapshot(&self) -> Vec<Token> {
        self.tokens.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Token> {
        self.tokens.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tokens.contains_key(id)
    }

    pub fn ids(&self) -> Vec<TokenId> {
        self.tokens.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Write the new price, market cap and volume of `update` back into its entry so later
    /// ticks compound from it. Returns `false` if the token is not registered.
    pub fn apply_update(&mut self, update: &PriceUpdate) -> bool {
        let Some(token) = self.tokens.get_mut(update.token_id.as_str()) else {
            return false;
        };
        update.metrics_patch().apply(&mut token.metrics);
        token.touch(update.timestamp);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Direction, test_utils::token};
    use chrono::Utc;

    #[test]
    fn test_register_is_last_write_wins_upsert() {
        let mut registry = TokenRegistry::new();

        assert_eq!(
            registry.register([
                token("a", Category::NewPairs, 1.0),
                token("b", Category::Migrated, 2.0),
            ]),
            2
        );
        registry.register([token("a", Category::NewPairs, 5.0)]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a").unwrap().metrics.price, 5.0);
        assert_eq!(
            registry.ids(),
            vec![TokenId::from("a"), TokenId::from("b")]
        );
    }

    #[test]
    fn test_register_floors_price() {
        let mut registry = TokenRegistry::new();
        registry.register([token("zero", Category::NewPairs, 0.0)]);

        assert_eq!(registry.get("zero").unwrap().metrics.price, PRICE_FLOOR);
    }

    #[test]
    fn test_unregister_and_clear_are_total() {
        let mut registry = TokenRegistry::new();
        registry.register([
            token("a", Category::NewPairs, 1.0),
            token("b", Category::NewPairs, 1.0),
            token("c", Category::NewPairs, 1.0),
        ]);

        assert!(registry.unregister("missing").is_none());
        assert!(registry.unregister("b").is_some());
        assert_eq!(registry.ids(), vec![TokenId::from("a"), TokenId::from("c")]);

        registry.clear();
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_does_not_alias_state() {
        let mut registry = TokenRegistry::new();
        registry.register([token("a", Category::NewPairs, 1.0)]);

        let mut snapshot = registry.snapshot();
        snapshot[0].metrics.price = 99.0;
        snapshot.clear();

        assert_eq!(registry.get("a").unwrap().metrics.price, 1.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_apply_update_writes_back_price_fields_only() {
        let mut registry = TokenRegistry::new();
        registry.register([token("a", Category::NewPairs, 1.0)]);
        let before = registry.get("a").unwrap().clone();
        let timestamp = before.updated_at + chrono::Duration::seconds(1);

        let update = PriceUpdate {
            token_id: TokenId::from("a"),
            old_price: 1.0,
            new_price: 1.5,
            old_market_cap: before.metrics.market_cap,
            new_market_cap: 1_500_000.0,
            old_volume: before.metrics.volume,
            new_volume: 12.0,
            direction: Direction::Up,
            timestamp,
        };
        assert!(registry.apply_update(&update));

        let after = registry.get("a").unwrap();
        assert_eq!(after.metrics.price, 1.5);
        assert_eq!(after.metrics.market_cap, 1_500_000.0);
        assert_eq!(after.metrics.volume, 12.0);
        assert_eq!(after.metrics.holders, before.metrics.holders);
        assert_eq!(after.updated_at, timestamp);

        let orphan = PriceUpdate {
            token_id: TokenId::from("gone"),
            timestamp: Utc::now(),
            ..update
        };
        assert!(!registry.apply_update(&orphan));
    }
}
