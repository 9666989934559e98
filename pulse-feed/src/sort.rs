use crate::model::Token;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Age,
    MarketCap,
    Volume,
    Price,
    PriceChange,
    Holders,
    Transactions,
    Liquidity,
}

impl SortField {
    fn key(&self, token: &Token) -> f64 {
        let metrics = &token.metrics;
        match self {
            SortField::Age => token.age_in_seconds as f64,
            SortField::MarketCap => metrics.market_cap,
            SortField::Volume => metrics.volume,
            SortField::Price => metrics.price,
            SortField::PriceChange => metrics.price_change,
            SortField::Holders => metrics.holders as f64,
            SortField::Transactions => metrics.transactions as f64,
            SortField::Liquidity => metrics.liquidity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Column ordering, youngest first by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub struct SortConfig {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortConfig {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn compare(&self, a: &Token, b: &Token) -> Ordering {
        let ordering = self.field.key(a).total_cmp(&self.field.key(b));
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Optional inclusive bounds a [`Token`] must satisfy to be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub min_market_cap: Option<f64>,
    pub max_market_cap: Option<f64>,
    pub min_volume: Option<f64>,
    pub max_volume: Option<f64>,
    pub min_holders: Option<u64>,
    pub max_holders: Option<u64>,
    pub min_age: Option<u64>,
    pub max_age: Option<u64>,
}

impl FilterConfig {
    pub fn matches(&self, token: &Token) -> bool {
        fn within<T: PartialOrd>(value: T, min: Option<T>, max: Option<T>) -> bool {
            min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
        }

        let metrics = &token.metrics;
        within(metrics.market_cap, self.min_market_cap, self.max_market_cap)
            && within(metrics.volume, self.min_volume, self.max_volume)
            && within(metrics.holders, self.min_holders, self.max_holders)
            && within(token.age_in_seconds, self.min_age, self.max_age)
    }
}

/// Filter then stably sort `tokens`.
pub fn sort_tokens<'a, Iter>(tokens: Iter, sort: &SortConfig, filter: &FilterConfig) -> Vec<Token>
where
    Iter: IntoIterator<Item = &'a Token>,
{
    tokens
        .into_iter()
        .filter(|token| filter.matches(token))
        .sorted_by(|a, b| sort.compare(a, b))
        .cloned()
        .collect()
}
