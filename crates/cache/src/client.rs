//! Redis sorted-set adapter for per-category rankings.
//! Each category is one `ZSET` keyed `{prefix}:{category_id}`; members are
//! photo ids and scores mirror the authoritative photo score.

use async_trait::async_trait;
use contest_core::config::RedisConfig;
use contest_core::traits::RankedScoreStore;
use contest_core::types::RankedEntry;
use contest_core::{ContestError, ContestResult};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Redis-backed ranked score store.
pub struct RedisRankedStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRankedStore {
    /// Connect to Redis and verify the connection with `PING`.
    pub async fn new(config: &RedisConfig) -> anyhow::Result<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())?;

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let mut conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| anyhow::anyhow!("timed out connecting to Redis at {url}"))??;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn key(&self, category_id: Uuid) -> String {
        format!("{}:{category_id}", self.key_prefix)
    }

    async fn connection(&self) -> anyhow::Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn zadd(&self, category_id: Uuid, member: &str, score: f64) -> anyhow::Result<()> {
        let mut conn = self.connection().await?;
        conn.zadd::<_, _, _, ()>(self.key(category_id), member, score)
            .await?;
        Ok(())
    }

    async fn zrevrange(
        &self,
        category_id: Uuid,
        page: usize,
        page_size: usize,
    ) -> anyhow::Result<Vec<RankedEntry>> {
        let start = page * page_size;
        let stop = start + page_size - 1;
        let mut conn = self.connection().await?;
        let rows: Vec<(String, f64)> = conn
            .zrevrange_withscores(self.key(category_id), start as isize, stop as isize)
            .await?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, (member, score))| RankedEntry {
                member,
                score,
                rank: start + i + 1,
            })
            .collect())
    }

    async fn exists(&self, category_id: Uuid) -> anyhow::Result<bool> {
        let mut conn = self.connection().await?;
        Ok(conn.exists(self.key(category_id)).await?)
    }

    async fn zrem(&self, category_id: Uuid, member: &str) -> anyhow::Result<()> {
        let mut conn = self.connection().await?;
        conn.zrem::<_, _, ()>(self.key(category_id), member).await?;
        Ok(())
    }
}

fn unavailable(e: anyhow::Error) -> ContestError {
    ContestError::LeaderboardUnavailable(e.to_string())
}

#[async_trait]
impl RankedScoreStore for RedisRankedStore {
    async fn set_score(&self, category_id: Uuid, member: &str, score: f64) -> ContestResult<()> {
        debug!(category_id = %category_id, member = member, score = score, "ZADD");
        self.zadd(category_id, member, score).await.map_err(unavailable)
    }

    async fn top_page(
        &self,
        category_id: Uuid,
        page: usize,
        page_size: usize,
    ) -> ContestResult<Vec<RankedEntry>> {
        if page_size == 0 {
            return Ok(Vec::new());
        }
        self.zrevrange(category_id, page, page_size)
            .await
            .map_err(unavailable)
    }

    async fn member_exists(&self, category_id: Uuid) -> ContestResult<bool> {
        self.exists(category_id).await.map_err(unavailable)
    }

    async fn remove_member(&self, category_id: Uuid, member: &str) -> ContestResult<()> {
        self.zrem(category_id, member).await.map_err(unavailable)
    }
}
