use std::future::Future;
use std::sync::Arc;

use crate::core::config::RateLimitSettings;
use crate::features::rate_limits::error::RateLimitError;
use crate::features::rate_limits::models::{ApiCategory, RateLimitStatus};
use crate::features::rate_limits::services::RateLimiter;

/// One limiter per `ApiCategory`, built once at startup and shared by every
/// service that talks to an external API.
pub struct RateLimiterRegistry {
    limiters: [Arc<RateLimiter>; ApiCategory::ALL.len()],
}

impl RateLimiterRegistry {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let limiters = ApiCategory::ALL.map(|category| {
            let config = settings
                .categories
                .get(&category)
                .copied()
                .unwrap_or_else(|| category.default_config());
            Arc::new(RateLimiter::new(category, config))
        });

        Self { limiters }
    }

    /// Registry using the built-in limits for every category
    #[cfg(test)]
    pub fn with_defaults() -> Self {
        Self {
            limiters: ApiCategory::ALL
                .map(|category| Arc::new(RateLimiter::new(category, category.default_config()))),
        }
    }

    pub fn get(&self, category: ApiCategory) -> &Arc<RateLimiter> {
        &self.limiters[category.index()]
    }

    /// Runs `op` under the limiter for `category`
    pub async fn execute<T, E, F, Fut>(&self, category: ApiCategory, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<RateLimitError> + Send + 'static,
    {
        self.get(category).execute(op).await
    }

    pub async fn status(&self, category: ApiCategory) -> RateLimitStatus {
        self.get(category).status().await
    }

    pub async fn statuses(&self) -> Vec<RateLimitStatus> {
        let mut statuses = Vec::with_capacity(self.limiters.len());
        for limiter in &self.limiters {
            statuses.push(limiter.status().await);
        }
        statuses
    }

    pub async fn reset(&self, category: ApiCategory) {
        self.get(category).reset().await
    }
}
