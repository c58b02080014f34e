//! Cached category listing.

use std::sync::Arc;
use std::time::Duration;

use contest_cache::TtlCache;
use contest_core::config::ttl_from_secs;
use contest_core::traits::ContestStore;
use contest_core::types::Category;
use contest_core::ContestResult;

const LIST_KEY: &str = "categories:all";

pub struct CategoryDirectory {
    store: Arc<dyn ContestStore>,
    cache: Arc<TtlCache<&'static str, Arc<Vec<Category>>>>,
    ttl: Duration,
}

impl CategoryDirectory {
    pub fn new(store: Arc<dyn ContestStore>, ttl_secs: f64) -> ContestResult<Self> {
        Ok(Self {
            store,
            cache: Arc::new(TtlCache::new("category_list")),
            ttl: ttl_from_secs(ttl_secs)?,
        })
    }

    pub fn cache(&self) -> &Arc<TtlCache<&'static str, Arc<Vec<Category>>>> {
        &self.cache
    }

    pub async fn list(&self) -> ContestResult<Arc<Vec<Category>>> {
        if let Some(categories) = self.cache.get(LIST_KEY) {
            return Ok(categories);
        }
        let categories = Arc::new(self.store.list_categories().await?);
        self.cache.put(LIST_KEY, categories.clone(), Some(self.ttl));
        Ok(categories)
    }

    /// Drop the cached listing after categories are created or change state.
    pub fn invalidate(&self) {
        self.cache.expire(LIST_KEY);
    }
}
