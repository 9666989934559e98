//! Mock fetch layer standing in for a remote token listing API.
//!
//! Every request sleeps for the configured latency. Listing requests additionally fail with a
//! retryable [`FeedError::Network`] at the configured rate.

use crate::{
    config::{API_RNG_STREAM, ApiConfig, MAX_PAGE_SIZE, rng_from_seed},
    error::FeedError,
    factory::TokenFactory,
    model::{Category, CategoryMap, Token, TokenId, TokenListResponse},
};
use chrono::Utc;
use parking_lot::Mutex;
use rand::{Rng, rngs::StdRng};
use std::time::Duration;
use tracing::{debug, warn};

/// Number of tokens per category returned by [`MockTokenApi::fetch_all_tokens`].
pub const BULK_TOKENS_PER_CATEGORY: usize = 10;

/// Number of tokens per category scanned by [`MockTokenApi::search_tokens`].
pub const SEARCH_TOKENS_PER_CATEGORY: usize = 20;

/// Listings are generated `page_size * LISTING_PAGES` tokens deep.
const LISTING_PAGES: usize = 3;

#[derive(Debug)]
pub struct MockTokenApi {
    config: ApiConfig,
    rng: Mutex<StdRng>,
}

impl MockTokenApi {
    pub fn new(config: ApiConfig) -> Result<Self, FeedError> {
        config.validate()?;
        let rng = Mutex::new(rng_from_seed(config.seed, API_RNG_STREAM));
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn delay(&self, latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn roll_failure(&self) -> Result<(), FeedError> {
        if self.rng.lock().random_bool(self.config.failure_rate) {
            warn!("simulated fetch failure");
            return Err(FeedError::Network("Failed to fetch tokens".to_string()));
        }
        Ok(())
    }

    fn generate(&self, category: Category, count: usize) -> Vec<Token> {
        let now = Utc::now();
        let mut rng = self.rng.lock();
        (1..=count)
            .map(|index| TokenFactory::listing(category, index, &mut *rng, now))
            .collect()
    }

    /// One 1-based page of a category listing. `page_size` defaults to the configured size and
    /// is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn fetch_tokens_by_category(
        &self,
        category: Category,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<TokenListResponse, FeedError> {
        self.delay(self.config.latency).await;
        self.roll_failure()?;

        let page = page.max(1);
        let page_size = page_size
            .unwrap_or(self.config.page_size)
            .clamp(1, MAX_PAGE_SIZE);

        let listing = self.generate(category, page_size * LISTING_PAGES);
        let total = listing.len();
        let start = (page - 1).saturating_mul(page_size);
        let tokens = listing
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect::<Vec<_>>();

        debug!(%category, page, page_size, returned = tokens.len(), "fetched category page");
        Ok(TokenListResponse {
            tokens,
            total,
            page,
            page_size,
            has_more: start.saturating_add(page_size) < total,
        })
    }

    /// Every category at once, [`BULK_TOKENS_PER_CATEGORY`] tokens each.
    pub async fn fetch_all_tokens(&self) -> Result<CategoryMap<Vec<Token>>, FeedError> {
        self.delay(self.config.latency).await;
        self.roll_failure()?;

        let buckets =
            CategoryMap::from_fn(|category| self.generate(category, BULK_TOKENS_PER_CATEGORY));
        debug!("fetched all tokens");
        Ok(buckets)
    }

    /// A single token. The category comes from the id prefix, eg/ "migrated-4"; simulated ids
    /// resolve to [`Category::NewPairs`]. Unrecognised ids are [`FeedError::NotFound`].
    pub async fn fetch_token_by_id(&self, id: &str) -> Result<Token, FeedError> {
        self.delay(self.config.latency / 2).await;

        let category = category_of(id).ok_or_else(|| FeedError::NotFound(TokenId::from(id)))?;
        let mut token = self
            .generate(category, 1)
            .pop()
            .ok_or_else(|| FeedError::NotFound(TokenId::from(id)))?;
        token.id = TokenId::from(id);
        Ok(token)
    }

    /// Case-insensitive match on name, symbol or address across one or every category.
    pub async fn search_tokens(
        &self,
        query: &str,
        category: Option<Category>,
    ) -> Result<Vec<Token>, FeedError> {
        self.delay(self.config.latency / 2).await;

        let query = query.to_lowercase();
        let categories = match category {
            Some(category) => vec![category],
            None => Category::ALL.to_vec(),
        };

        let matches = categories
            .into_iter()
            .flat_map(|category| self.generate(category, SEARCH_TOKENS_PER_CATEGORY))
            .filter(|token| {
                token.name.to_lowercase().contains(&query)
                    || token.symbol.to_lowercase().contains(&query)
                    || token.address.to_lowercase().contains(&query)
            })
            .collect::<Vec<_>>();

        debug!(%query, matches = matches.len(), "searched tokens");
        Ok(matches)
    }
}

/// Infer the category of a listing id ("<category>-<n>") or a simulated id ("simulated-<n>").
fn category_of(id: &str) -> Option<Category> {
    let (prefix, number) = id.rsplit_once('-')?;
    number.parse::<u64>().ok()?;
    match prefix {
        "simulated" => Some(Category::NewPairs),
        other => Category::from_label(other),
    }
}

/// Run `op`, retrying up to `retries` more times while it fails with a retryable error.
pub async fn with_retry<T, Op, Fut>(retries: u32, mut op: Op) -> Result<T, FeedError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!(%error, attempt, retries, "retrying fetch");
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn api(failure_rate: f64) -> MockTokenApi {
        MockTokenApi::new(
            ApiConfig::default()
                .with_latency(Duration::from_millis(800))
                .with_failure_rate(failure_rate)
                .with_seed(17),
        )
        .unwrap()
    }

    #[test]
    fn test_category_of() {
        struct TestCase {
            input: &'static str,
            expected: Option<Category>,
        }

        let tests = vec![
            TestCase {
                // TC0: listing id
                input: "final-stretch-12",
                expected: Some(Category::FinalStretch),
            },
            TestCase {
                // TC1: simulated id
                input: "simulated-1001",
                expected: Some(Category::NewPairs),
            },
            TestCase {
                // TC2: unknown prefix
                input: "graduated-3",
                expected: None,
            },
            TestCase {
                // TC3: no number
                input: "migrated",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(category_of(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_tokens_by_category_pages() {
        let api = api(0.0);

        let first = api
            .fetch_tokens_by_category(Category::Migrated, 1, Some(5))
            .await
            .unwrap();
        assert_eq!(first.tokens.len(), 5);
        assert_eq!(first.total, 15);
        assert!(first.has_more);
        assert_eq!(first.tokens[0].id.as_str(), "migrated-1");
        assert!(first.tokens.iter().all(|t| t.category == Category::Migrated));

        let last = api
            .fetch_tokens_by_category(Category::Migrated, 3, Some(5))
            .await
            .unwrap();
        assert_eq!(last.tokens[0].id.as_str(), "migrated-11");
        assert!(!last.has_more);

        let beyond = api
            .fetch_tokens_by_category(Category::Migrated, 9, None)
            .await
            .unwrap();
        assert!(beyond.tokens.is_empty());
        assert_eq!(beyond.page_size, 20);

        let oversized = api
            .fetch_tokens_by_category(Category::Migrated, usize::MAX, Some(usize::MAX))
            .await
            .unwrap();
        assert_eq!(oversized.page_size, MAX_PAGE_SIZE);
        assert_eq!(oversized.total, MAX_PAGE_SIZE * 3);
        assert!(oversized.tokens.is_empty());
        assert!(!oversized.has_more);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_simulates_latency() {
        let api = api(0.0);
        let start = tokio::time::Instant::now();

        api.fetch_all_tokens().await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(800) && elapsed < Duration::from_millis(810));

        api.fetch_token_by_id("new-pairs-1").await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_200) && elapsed < Duration::from_millis(1_210));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_tokens_shape() {
        let buckets = api(0.0).fetch_all_tokens().await.unwrap();

        for (category, tokens) in buckets.iter() {
            assert_eq!(tokens.len(), BULK_TOKENS_PER_CATEGORY);
            assert!(tokens.iter().all(|token| token.category == category));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_retryable_network_errors() {
        let api = api(1.0);

        let error = api.fetch_all_tokens().await.unwrap_err();
        assert_eq!(error, FeedError::Network("Failed to fetch tokens".to_string()));
        assert!(error.is_retryable());

        // Single lookups and searches never roll a failure
        assert!(api.fetch_token_by_id("migrated-2").await.is_ok());
        assert!(api.search_tokens("", None).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_token_by_id() {
        let api = api(0.0);

        let token = api.fetch_token_by_id("final-stretch-42").await.unwrap();
        assert_eq!(token.id.as_str(), "final-stretch-42");
        assert_eq!(token.category, Category::FinalStretch);

        assert_eq!(
            api.fetch_token_by_id("nonsense").await.unwrap_err(),
            FeedError::NotFound(TokenId::from("nonsense"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_is_case_insensitive() {
        let api = api(0.0);

        let everything = api.search_tokens("", None).await.unwrap();
        assert_eq!(everything.len(), SEARCH_TOKENS_PER_CATEGORY * 3);

        let needle = everything[0].symbol.to_lowercase();
        let found = api.search_tokens(&needle, None).await.unwrap();
        assert!(!found.is_empty());
        assert!(found.iter().all(|token| {
            token.name.to_lowercase().contains(&needle)
                || token.symbol.to_lowercase().contains(&needle)
                || token.address.to_lowercase().contains(&needle)
        }));

        let scoped = api.search_tokens("", Some(Category::NewPairs)).await.unwrap();
        assert!(scoped.iter().all(|token| token.category == Category::NewPairs));
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_success_or_terminal_error() {
        struct TestCase {
            failures_before_success: u32,
            error: FeedError,
            retries: u32,
            expected_ok: bool,
            expected_calls: u32,
        }

        let tests = vec![
            TestCase {
                // TC0: succeeds after two network failures
                failures_before_success: 2,
                error: FeedError::Network("down".to_string()),
                retries: 2,
                expected_ok: true,
                expected_calls: 3,
            },
            TestCase {
                // TC1: retries exhausted
                failures_before_success: 5,
                error: FeedError::Network("down".to_string()),
                retries: 2,
                expected_ok: false,
                expected_calls: 3,
            },
            TestCase {
                // TC2: non-retryable error is returned immediately
                failures_before_success: 5,
                error: FeedError::NotFound(TokenId::from("x")),
                retries: 2,
                expected_ok: false,
                expected_calls: 1,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let calls = AtomicU32::new(0);
            let result = with_retry(test.retries, || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                let error = test.error.clone();
                let fail = call < test.failures_before_success;
                async move { if fail { Err(error) } else { Ok(call) } }
            })
            .await;

            assert_eq!(result.is_ok(), test.expected_ok, "TC{} failed", index);
            assert_eq!(
                calls.load(Ordering::SeqCst),
                test.expected_calls,
                "TC{} failed",
                index
            );
        }
    }
}
