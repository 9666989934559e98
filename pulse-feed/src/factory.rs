use crate::model::{
    Category, RiskMetrics, SocialLinks, SocialMetrics, Token, TokenId, TokenMetrics,
};
use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric, seq::IndexedRandom};
use std::ops::RangeInclusive;

const TOKEN_NAMES: &[&str] = &[
    "PEN", "HEN", "TEN", "LEG", "BEN", "SEN", "CEN", "GEN", "REN", "EARTH", "SUN", "MARS",
    "JUPITER", "VENUS", "PLUTO", "MERCURY", "SATURN", "URANUS", "GME", "TRUMP", "ELON", "MOON",
    "ROCKET", "APE", "KONG", "BEAR", "STAR", "MONEY", "COIN", "LION", "PANDA", "KOALA", "DOLL",
    "CAT", "DOG", "RAT", "BAT", "BIRD", "FISH", "CRAB", "SQUID", "DRAGON", "ONEPLUS", "APPLE",
    "VIVO", "OPPO", "SAMSUNG", "NOKIA", "JIO", "AIRTEL",
];

const NAME_SUFFIXES: &[&str] = &[
    "", "2.0", "AI", "X", "PRO", "INU", "COIN", "TOKEN", "SWAP", "CHAIN",
];

const SUFFIX_PROBABILITY: f64 = 0.3;
const SYMBOL_LEN: usize = 6;
const ADDRESS_LEN: usize = 44;

/// First id handed out to a simulated token, eg/ "simulated-1001".
pub const FIRST_SIMULATED_ID: u64 = 1001;

/// Synthesises internally consistent [`Token`]s: listing tokens for the fetch layer and brand new
/// tokens for the simulator.
#[derive(Debug, Clone)]
pub struct TokenFactory {
    next_simulated: u64,
}

impl Default for TokenFactory {
    fn default() -> Self {
        Self {
            next_simulated: FIRST_SIMULATED_ID,
        }
    }
}

impl TokenFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A freshly minted token: id "simulated-<n>", age zero, timestamps `now`.
    pub fn simulated<R>(&mut self, category: Category, rng: &mut R, now: DateTime<Utc>) -> Token
    where
        R: Rng + ?Sized,
    {
        let id = TokenId::from(format!("simulated-{}", self.next_simulated));
        self.next_simulated += 1;
        build_token(id, category, 0, rng, now)
    }

    /// The `index`th listed token of a category: id "<category>-<index>", with an age typical of
    /// that lifecycle bucket.
    pub fn listing<R>(category: Category, index: usize, rng: &mut R, now: DateTime<Utc>) -> Token
    where
        R: Rng + ?Sized,
    {
        let id = TokenId::from(format!("{}-{index}", category.as_str()));
        let age = rng.random_range(listing_age_range(category));
        let mut token = build_token(id, category, age, rng, now);
        token.created_at = now - chrono::Duration::seconds(age as i64);
        token
    }
}

fn listing_age_range(category: Category) -> RangeInclusive<u64> {
    match category {
        Category::NewPairs => 1..=900,
        Category::FinalStretch => 900..=21_600,
        Category::Migrated => 21_600..=604_800,
    }
}

fn random_name<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    let base = TOKEN_NAMES.choose(rng).copied().unwrap_or("PEN");
    let suffix = if rng.random_bool(SUFFIX_PROBABILITY) {
        NAME_SUFFIXES.choose(rng).copied().unwrap_or_default()
    } else {
        ""
    };
    format!("{base}{suffix}")
}

fn random_address<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    (0..ADDRESS_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

fn maybe_link<R>(rng: &mut R, url: &str) -> Option<String>
where
    R: Rng + ?Sized,
{
    rng.random_bool(0.5).then(|| url.to_string())
}

fn build_token<R>(
    id: TokenId,
    category: Category,
    age_in_seconds: u64,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Token
where
    R: Rng + ?Sized,
{
    let name = random_name(rng);
    let symbol = name.chars().take(SYMBOL_LEN).collect::<String>().to_uppercase();
    let address = random_address(rng);

    let metrics = TokenMetrics {
        price: rng.random::<f64>() * 0.001 + 0.000_01,
        price_change: (rng.random::<f64>() - 0.5) * 100.0,
        market_cap: rng.random::<f64>() * 500_000.0 + 1_000.0,
        volume: rng.random::<f64>() * 50_000.0 + 100.0,
        liquidity: rng.random::<f64>() * 100_000.0 + 1_000.0,
        holders: rng.random_range(1..=100),
        transactions: rng.random_range(1..=50),
        fee_percentage: rng.random::<f64>() * 0.05,
    };

    let risk_metrics = RiskMetrics::new(
        rng.random::<f64>() * 0.5 + 0.1,
        rng.random::<f64>() * 0.3,
        rng.random::<f64>() * 0.15,
        rng.random::<f64>() * 0.1,
    );

    let social_metrics = SocialMetrics {
        likes: rng.random_range(0..100),
        dislikes: rng.random_range(0..20),
        comments: rng.random_range(0..50),
        is_bookmarked: false,
    };

    let social_links = SocialLinks {
        website: maybe_link(rng, "https://example.com"),
        twitter: maybe_link(rng, "https://twitter.com/example"),
        telegram: maybe_link(rng, "https://t.me/example"),
        discord: None,
    };

    Token {
        id,
        address,
        name,
        symbol,
        image_url: String::new(),
        age_in_seconds,
        category,
        metrics,
        social_metrics,
        risk_metrics,
        social_links,
        created_at: now,
        updated_at: now,
    }
}
