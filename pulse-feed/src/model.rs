//! Core data model shared by the feed, the caches and the simulators.
//!
//! Every type serialises to the camelCase shape consumed by the presentation layer.

use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;

/// Smallest price any [`Token`] may carry. Generated and merged prices are floored here.
pub const PRICE_FLOOR: f64 = 0.000_000_1;

/// Unique [`Token`] identifier, eg/ "new-pairs-12" or "simulated-1001".
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct TokenId(pub SmolStr);

impl TokenId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for TokenId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TokenId {
    fn from(value: String) -> Self {
        Self(SmolStr::from(value))
    }
}

impl Borrow<str> for TokenId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Lifecycle bucket a [`Token`] is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    NewPairs,
    FinalStretch,
    Migrated,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::NewPairs, Category::FinalStretch, Category::Migrated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::NewPairs => "new-pairs",
            Category::FinalStretch => "final-stretch",
            Category::Migrated => "migrated",
        }
    }

    /// Parse a category label, eg/ "final-stretch".
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == label)
    }

    fn index(self) -> usize {
        match self {
            Category::NewPairs => 0,
            Category::FinalStretch => 1,
            Category::Migrated => 2,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed three-slot map holding one `T` per [`Category`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CategoryMap<T> {
    #[serde(rename = "new-pairs")]
    pub new_pairs: T,
    #[serde(rename = "final-stretch")]
    pub final_stretch: T,
    pub migrated: T,
}

impl<T> CategoryMap<T> {
    pub fn from_fn(mut f: impl FnMut(Category) -> T) -> Self {
        Self {
            new_pairs: f(Category::NewPairs),
            final_stretch: f(Category::FinalStretch),
            migrated: f(Category::Migrated),
        }
    }

    pub fn get(&self, category: Category) -> &T {
        match category.index() {
            0 => &self.new_pairs,
            1 => &self.final_stretch,
            _ => &self.migrated,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category.index() {
            0 => &mut self.new_pairs,
            1 => &mut self.final_stretch,
            _ => &mut self.migrated,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL
            .into_iter()
            .map(move |category| (category, self.get(category)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Category, &mut T)> {
        [
            (Category::NewPairs, &mut self.new_pairs),
            (Category::FinalStretch, &mut self.final_stretch),
            (Category::Migrated, &mut self.migrated),
        ]
        .into_iter()
    }

    pub fn map<U>(self,mut f: impl FnMut(Category, T) -> U) -> CategoryMap<U> {
        CategoryMap {
            new_pairs: f(Category::NewPairs, self.new_pairs),
            final_stretch: f(Category::FinalStretch, self.final_stretch),
            migrated: f(Category::Migrated, self.migrated),
        }
    }
}

/// Market metrics of a [`Token`]. All values are non-negative except `price_change`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetrics {
    /// Market capitalisation in USD.
    pub market_cap: f64,
    /// 24h trading volume in USD.
    pub volume: f64,
    /// Current price in USD.
    pub price: f64,
    /// Price change percentage, may be negative.
    pub price_change: f64,
    pub holders: u64,
    pub transactions: u64,
    /// Liquidity in USD.
    pub liquidity: f64,
    /// Fee as a fraction, eg/ 0.01 is 1%.
    pub fee_percentage: f64,
}

/// Holder distribution percentages in `[0, 1]` and the risk score derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub top_holder_percentage: f64,
    pub dev_holding_percentage: f64,
    pub sniper_percentage: f64,
    pub bundle_percentage: f64,
    /// Risk score in `[0, 100]`.
    pub risk_score: f64,
}

impl RiskMetrics {
    const WEIGHTS: [f64; 4] = [0.4, 0.3, 0.2, 0.1];

    /// Construct [`RiskMetrics`] from the four holder percentages, clamping each to `[0, 1]`
    /// and deriving the weighted risk score.
    pub fn new(top_holder: f64, dev_holding: f64, sniper: f64, bundle: f64) -> Self {
        let clamp = |value: f64| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        let percentages = [
            clamp(top_holder),
            clamp(dev_holding),
            clamp(sniper),
            clamp(bundle),
        ];
        let weighted: f64 = percentages
            .iter()
            .zip(Self::WEIGHTS)
            .map(|(percentage, weight)| percentage * weight)
            .sum();

        Self {
            top_holder_percentage: percentages[0],
            dev_holding_percentage: percentages[1],
            sniper_percentage: percentages[2],
            bundle_percentage: percentages[3],
            risk_score: (weighted * 100.0).clamp(0.0, 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialMetrics {
    pub likes: u32,
    pub dislikes: u32,
    pub comments: u32,
    pub is_bookmarked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<String>,
}

/// Simulated tradable asset listed under one [`Category`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    /// Contract address.
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub image_url: String,
    /// Age since creation, only ever incremented.
    pub age_in_seconds: u64,
    pub category: Category,
    pub metrics: TokenMetrics,
    pub social_metrics: SocialMetrics,
    pub risk_metrics: RiskMetrics,
    pub social_links: SocialLinks,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    /// Bump `updated_at` to `now`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
    }
}

/// Direction of the latest price move, used to drive presentation flash effects only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    #[default]
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Neutral => "neutral",
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Direction::Neutral)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One simulated price move for one [`Token`]. Never persisted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub token_id: TokenId,
    pub old_price: f64,
    pub new_price: f64,
    pub old_market_cap: f64,
    pub new_market_cap: f64,
    pub old_volume: f64,
    pub new_volume: f64,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

impl PriceUpdate {
    /// The subset of [`TokenMetrics`] this update changes.
    pub fn metrics_patch(&self) -> MetricsPatch {
        MetricsPatch {
            price: Some(self.new_price),
            market_cap: Some(self.new_market_cap),
            volume: Some(self.new_volume),
            ..MetricsPatch::default()
        }
    }
}

/// Shallow patch over [`TokenMetrics`]: only `Some` fields are written.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPatch {
    pub market_cap: Option<f64>,
    pub volume: Option<f64>,
    pub price: Option<f64>,
    pub price_change: Option<f64>,
    pub holders: Option<u64>,
    pub transactions: Option<u64>,
    pub liquidity: Option<f64>,
    pub fee_percentage: Option<f64>,
}

impl MetricsPatch {
    pub fn apply(&self, metrics: &mut TokenMetrics) {
        if let Some(price) = self.price {
            metrics.price = price.max(PRICE_FLOOR);
        }
        if let Some(market_cap) = self.market_cap {
            metrics.market_cap = market_cap.max(0.0);
        }
        if let Some(volume) = self.volume {
            metrics.volume = volume.max(0.0);
        }
        if let Some(price_change) = self.price_change {
            metrics.price_change = price_change;
        }
        if let Some(holders) = self.holders {
            metrics.holders = holders;
        }
        if let Some(transactions) = self.transactions {
            metrics.transactions = transactions;
        }
        if let Some(liquidity) = self.liquidity {
            metrics.liquidity = liquidity.max(0.0);
        }
        if let Some(fee_percentage) = self.fee_percentage {
            metrics.fee_percentage = fee_percentage.max(0.0);
        }
    }
}

/// A freshly minted [`Token`] and the bucket it should be prepended to.
#[derive(Debug, Clone, PartialEq, Constructor, Deserialize, Serialize)]
pub struct NewToken {
    pub token: Token,
    pub category: Category,
}

/// One page of a category listing, as returned by the fetch layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListResponse {
    pub tokens: Vec<Token>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    pub fn token(id: &str, category: Category, price: f64) -> Token {
        let now = Utc::now();
        Token {
            id: TokenId::from(id),
            address: format!("{id}-address"),
            name: id.to_uppercase(),
            symbol: id.chars().take(6).collect::<String>().to_uppercase(),
            image_url: String::new(),
            age_in_seconds: 0,
            category,
            metrics: TokenMetrics {
                market_cap: price * 1_000_000.0,
                volume: 10_000.0,
                price,
                price_change: 0.0,
                holders: 42,
                transactions: 7,
                liquidity: 5_000.0,
                fee_percentage: 0.01,
            },
            social_metrics: SocialMetrics::default(),
            risk_metrics: RiskMetrics::new(0.2, 0.1, 0.05, 0.01),
            social_links: SocialLinks::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
