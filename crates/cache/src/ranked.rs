//! In-process ranked score store with Redis `ZREVRANGE` ordering.
//! Used for development runs and tests; it can be switched offline or slowed
//! down to exercise the unavailable and timeout paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use contest_core::traits::RankedScoreStore;
use contest_core::types::RankedEntry;
use contest_core::{ContestError, ContestResult};
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryRankedStore {
    sets: RwLock<HashMap<Uuid, HashMap<String, f64>>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryRankedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the remote service being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn score_of(&self, category_id: Uuid, member: &str) -> Option<f64> {
        self.sets
            .read()
            .get(&category_id)
            .and_then(|set| set.get(member).copied())
    }

    async fn round_trip(&self) -> ContestResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ContestError::LeaderboardUnavailable(
                "ranked score store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RankedScoreStore for MemoryRankedStore {
    async fn set_score(&self, category_id: Uuid, member: &str, score: f64) -> ContestResult<()> {
        self.round_trip().await?;
        self.sets
            .write()
            .entry(category_id)
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn top_page(
        &self,
        category_id: Uuid,
        page: usize,
        page_size: usize,
    ) -> ContestResult<Vec<RankedEntry>> {
        self.round_trip().await?;
        let sets = self.sets.read();
        let Some(set) = sets.get(&category_id) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<(&String, f64)> = set.iter().map(|(m, s)| (m, *s)).collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(a.0)));

        let start = page * page_size;
        Ok(rows
            .into_iter()
            .enumerate()
            .skip(start)
            .take(page_size)
            .map(|(i, (member, score))| RankedEntry {
                member: member.clone(),
                score,
                rank: i + 1,
            })
            .collect())
    }

    async fn member_exists(&self, category_id: Uuid) -> ContestResult<bool> {
        self.round_trip().await?;
        Ok(self
            .sets
            .read()
            .get(&category_id)
            .is_some_and(|set| !set.is_empty()))
    }

    async fn remove_member(&self, category_id: Uuid, member: &str) -> ContestResult<()> {
        self.round_trip().await?;
        let mut sets = self.sets.write();
        if let Some(set) = sets.get_mut(&category_id) {
            set.remove(member);
            if set.is_empty() {
                sets.remove(&category_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ordering_and_pages() {
        let store = MemoryRankedStore::new();
        let category = Uuid::new_v4();
        assert!(!store.member_exists(category).await.unwrap());

        store.set_score(category, "a", 5.0).await.unwrap();
        store.set_score(category, "b", 9.0).await.unwrap();
        store.set_score(category, "c", 5.0).await.unwrap();
        store.set_score(category, "d", 1.0).await.unwrap();
        assert!(store.member_exists(category).await.unwrap());

        let first = store.top_page(category, 0, 3).await.unwrap();
        let members: Vec<&str> = first.iter().map(|e| e.member.as_str()).collect();
        assert_eq!(members, vec!["b", "c", "a"]);
        assert_eq!(first[0].rank, 1);
        assert_eq!(first[2].rank, 3);

        let second = store.top_page(category, 1, 3).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].member, "d");
        assert_eq!(second[0].rank, 4);

        store.set_score(category, "d", 10.0).await.unwrap();
        let top = store.top_page(category, 0, 1).await.unwrap();
        assert_eq!(top[0].member, "d");
    }

    #[tokio::test]
    async fn test_remove_and_offline() {
        let store = MemoryRankedStore::new();
        let category = Uuid::new_v4();
        store.set_score(category, "a", 1.0).await.unwrap();
        store.remove_member(category, "a").await.unwrap();
        assert!(!store.member_exists(category).await.unwrap());

        store.set_offline(true);
        assert!(matches!(
            store.top_page(category, 0, 10).await,
            Err(ContestError::LeaderboardUnavailable(_))
        ));
        store.set_offline(false);
        assert!(store.top_page(category, 0, 10).await.unwrap().is_empty());
    }
}
