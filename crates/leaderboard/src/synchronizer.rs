//! Leaderboard synchronizer: keeps enriched leaderboard views coherent with
//! the external ranked score store through two cache tiers.
//!
//! The raw tier holds the last top page seen for a category and only serves
//! as a change detector. The enriched tier holds the expensive view (names,
//! thumbnails, friendship flags). On every fetch the live page is compared
//! with the raw snapshot; enrichment is redone only when they differ.
//!
//! Enriched views carry per-viewer flags. They are grouped per category
//! under a snapshot that remembers the raw page they were built from, so a
//! ranking change drops every viewer's view at once. A view is served only
//! when its snapshot's page equals the live one, which keeps other viewers
//! from seeing a stale board after one viewer's fetch rolls the raw tier
//! forward.
//!
//! No lock is held across the call to the ranked score store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use contest_cache::TtlCache;
use contest_core::config::{ttl_from_secs, AppConfig};
use contest_core::traits::{ContestStore, ProfileResolver, RankedScoreStore, ScorePublisher};
use contest_core::types::{EnrichedEntry, RankedEntry};
use contest_core::{ContestError, ContestResult};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type RawSnapshot = Arc<Vec<RankedEntry>>;
pub type Leaderboard = Arc<Vec<EnrichedEntry>>;

/// Per-viewer enriched views of one category, all built from `basis`.
#[derive(Clone)]
pub struct EnrichedSnapshot {
    basis: RawSnapshot,
    views: Arc<DashMap<Uuid, Leaderboard>>,
}

impl EnrichedSnapshot {
    fn new(basis: RawSnapshot) -> Self {
        Self {
            basis,
            views: Arc::new(DashMap::new()),
        }
    }

    fn view(&self, viewer: Uuid) -> Option<Leaderboard> {
        self.views.get(&viewer).map(|view| view.value().clone())
    }
}

pub struct LeaderboardSynchronizer {
    ranking: Arc<dyn RankedScoreStore>,
    resolver: Arc<dyn ProfileResolver>,
    store: Arc<dyn ContestStore>,
    raw_cache: Arc<TtlCache<Uuid, RawSnapshot>>,
    enriched_cache: Arc<TtlCache<Uuid, EnrichedSnapshot>>,
    raw_ttl: Duration,
    enriched_ttl: Duration,
    page_size: usize,
    timeout: Duration,
}

impl LeaderboardSynchronizer {
    pub fn new(
        ranking: Arc<dyn RankedScoreStore>,
        resolver: Arc<dyn ProfileResolver>,
        store: Arc<dyn ContestStore>,
        config: &AppConfig,
    ) -> ContestResult<Self> {
        let raw_ttl = ttl_from_secs(config.cache.leaderboard_raw_ttl_secs)?;
        let enriched_ttl = ttl_from_secs(config.cache.leaderboard_enriched_ttl_secs)?;
        info!(
            page_size = config.leaderboard.page_size,
            timeout_ms = config.leaderboard.store_timeout_ms,
            raw_ttl_secs = raw_ttl.as_secs(),
            enriched_ttl_secs = enriched_ttl.as_secs(),
            "Leaderboard synchronizer initialized"
        );
        Ok(Self {
            ranking,
            resolver,
            store,
            raw_cache: Arc::new(TtlCache::new("leaderboard_raw")),
            enriched_cache: Arc::new(TtlCache::new("leaderboard_enriched")),
            raw_ttl,
            enriched_ttl,
            page_size: config.leaderboard.page_size,
            timeout: Duration::from_millis(config.leaderboard.store_timeout_ms),
        })
    }

    pub fn raw_cache(&self) -> &Arc<TtlCache<Uuid, RawSnapshot>> {
        &self.raw_cache
    }

    pub fn enriched_cache(&self) -> &Arc<TtlCache<Uuid, EnrichedSnapshot>> {
        &self.enriched_cache
    }

    /// Bound a ranked-store call by the configured timeout. Timeouts and
    /// store failures both surface as `LeaderboardUnavailable`.
    async fn bounded<T>(&self, call: impl Future<Output = ContestResult<T>>) -> ContestResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(ContestError::LeaderboardUnavailable(reason))) => {
                Err(ContestError::LeaderboardUnavailable(reason))
            }
            Ok(Err(other)) => Err(ContestError::LeaderboardUnavailable(other.to_string())),
            Err(_) => {
                metrics::counter!("leaderboard.store_timeout").increment(1);
                Err(ContestError::LeaderboardUnavailable(format!(
                    "ranked score store did not answer within {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// Top page of the category's leaderboard as seen by `viewer`.
    ///
    /// A category with no ranking yet yields an empty list.
    pub async fn fetch_leaderboard(&self, category_id: Uuid, viewer: Uuid) -> ContestResult<Leaderboard> {
        let cached_raw = self.raw_cache.get(&category_id);
        let live: RawSnapshot = Arc::new(
            self.bounded(self.ranking.top_page(category_id, 0, self.page_size))
                .await?,
        );

        let unchanged = cached_raw
            .as_ref()
            .is_some_and(|cached| cached.as_slice() == live.as_slice());
        if unchanged {
            let view = self
                .enriched_cache
                .get(&category_id)
                .filter(|snapshot| snapshot.basis.as_slice() == live.as_slice())
                .and_then(|snapshot| snapshot.view(viewer));
            if let Some(entries) = view {
                metrics::counter!("leaderboard.hit").increment(1);
                return Ok(entries);
            }
        }
        metrics::counter!("leaderboard.rebuild").increment(1);

        self.raw_cache
            .put(category_id, live.clone(), Some(self.raw_ttl));
        if cached_raw.is_some() && !unchanged {
            self.enriched_cache.expire(&category_id);
        }

        if live.is_empty() {
            debug!(category_id = %category_id, "Leaderboard not started");
            return Ok(Arc::new(Vec::new()));
        }

        let entries: Leaderboard = Arc::new(self.enrich(&live, viewer).await?);
        let snapshot = match self.enriched_cache.get(&category_id) {
            Some(snapshot) if snapshot.basis.as_slice() == live.as_slice() => snapshot,
            _ => {
                let snapshot = EnrichedSnapshot::new(live);
                self.enriched_cache
                    .put(category_id, snapshot.clone(), Some(self.enriched_ttl));
                snapshot
            }
        };
        snapshot.views.insert(viewer, entries.clone());

        debug!(
            category_id = %category_id,
            viewer = %viewer,
            entries = entries.len(),
            "Leaderboard rebuilt"
        );
        Ok(entries)
    }

    /// Join raw rows with display data. Rows whose photo cannot be resolved
    /// are dropped.
    async fn enrich(&self, live: &[RankedEntry], viewer: Uuid) -> ContestResult<Vec<EnrichedEntry>> {
        let mut entries = Vec::with_capacity(live.len());
        for row in live {
            let Ok(photo_id) = Uuid::parse_str(&row.member) else {
                warn!(member = %row.member, "Ranked member is not a photo id, skipping");
                continue;
            };
            let Some(card) = self.resolver.photo_card(photo_id).await? else {
                debug!(photo_id = %photo_id, "Photo unavailable, dropped from leaderboard");
                continue;
            };
            let is_mine = card.owner_id == viewer;
            let is_friend = !is_mine && self.resolver.are_friends(viewer, card.owner_id).await?;

            entries.push(EnrichedEntry {
                photo_id,
                owner_id: card.owner_id,
                display_name: card.display_name,
                thumbnail: card.thumbnail,
                score: row.score,
                rank: row.rank,
                votes: card.votes,
                likes: card.likes,
                is_mine,
                is_friend,
            });
        }
        Ok(entries)
    }

    async fn publish(&self, category_id: Uuid, photo_id: Uuid, score: i64) -> ContestResult<()> {
        let exists = self.bounded(self.ranking.member_exists(category_id)).await?;
        if !exists {
            self.reconcile(category_id).await?;
            return Ok(());
        }
        self.bounded(
            self.ranking
                .set_score(category_id, &photo_id.to_string(), score as f64),
        )
        .await
    }

    /// Rebuild the category's ranking from authoritative photo scores.
    /// Active photos are (re)scored and inactive ones removed. Returns the
    /// number of photos scored.
    pub async fn reconcile(&self, category_id: Uuid) -> ContestResult<usize> {
        let photos = self.store.category_photos(category_id).await?;
        let mut scored = 0;
        for photo in &photos {
            let member = photo.id.to_string();
            if photo.active {
                self.bounded(
                    self.ranking
                        .set_score(category_id, &member, photo.score as f64),
                )
                .await?;
                scored += 1;
            } else {
                self.bounded(self.ranking.remove_member(category_id, &member))
                    .await?;
            }
        }
        info!(
            category_id = %category_id,
            scored = scored,
            removed = photos.len() - scored,
            "Leaderboard reconciled"
        );
        Ok(scored)
    }
}

#[async_trait]
impl ScorePublisher for LeaderboardSynchronizer {
    async fn push_score(&self, category_id: Uuid, photo_id: Uuid, score: i64) {
        if let Err(e) = self.publish(category_id, photo_id, score).await {
            metrics::counter!("leaderboard.push_failed").increment(1);
            warn!(
                category_id = %category_id,
                photo_id = %photo_id,
                error = %e,
                "Leaderboard push failed; vote kept, ranking will be reconciled later"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DirectoryResolver;
    use chrono::Utc;
    use contest_ballot::{MemoryContestStore, ScoreTabulator};
    use contest_cache::MemoryRankedStore;
    use contest_core::types::{Ballot, Category, CategoryState, Photo, PhotoCard, VoteSubmission};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts resolver calls so tests can see when enrichment ran.
    struct CountingResolver {
        inner: DirectoryResolver,
        cards: AtomicUsize,
    }

    #[async_trait]
    impl ProfileResolver for CountingResolver {
        async fn photo_card(&self, photo_id: Uuid) -> ContestResult<Option<PhotoCard>> {
            self.cards.fetch_add(1, Ordering::SeqCst);
            self.inner.photo_card(photo_id).await
        }

        async fn are_friends(&self, user_a: Uuid, user_b: Uuid) -> ContestResult<bool> {
            self.inner.are_friends(user_a, user_b).await
        }
    }

    struct Fixture {
        store: Arc<MemoryContestStore>,
        ranking: Arc<MemoryRankedStore>,
        resolver: Arc<CountingResolver>,
        sync: Arc<LeaderboardSynchronizer>,
        category: Category,
        photos: Vec<Photo>,
    }

    fn fixture_with(config: AppConfig) -> Fixture {
        let store = Arc::new(MemoryContestStore::new());
        let category = Category {
            id: Uuid::new_v4(),
            name: "Macro".to_string(),
            state: CategoryState::Voting,
            round: 0,
            start_time: Utc::now(),
            upload_duration_secs: 60,
            voting_duration_secs: 60,
        };
        store.insert_category(category.clone());
        let photos: Vec<Photo> = (0..5)
            .map(|i| {
                let mut photo = Photo::new(Uuid::new_v4(), category.id);
                photo.score = 10 * (i + 1);
                store.insert_photo(photo.clone());
                photo
            })
            .collect();

        let ranking = Arc::new(MemoryRankedStore::new());
        let resolver = Arc::new(CountingResolver {
            inner: DirectoryResolver::new(store.clone()),
            cards: AtomicUsize::new(0),
        });
        let sync = Arc::new(
            LeaderboardSynchronizer::new(ranking.clone(), resolver.clone(), store.clone(), &config)
                .unwrap(),
        );
        Fixture {
            store,
            ranking,
            resolver,
            sync,
            category,
            photos,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(AppConfig::default())
    }

    fn cards(fx: &Fixture) -> usize {
        fx.resolver.cards.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_unchanged_ranking_served_from_cache() {
        let fx = fixture();
        fx.sync.reconcile(fx.category.id).await.unwrap();
        let viewer = Uuid::new_v4();

        let first = fx.sync.fetch_leaderboard(fx.category.id, viewer).await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first[0].photo_id, fx.photos[4].id);
        assert_eq!(first[0].rank, 1);
        let calls = cards(&fx);
        assert_eq!(calls, 5);

        let second = fx.sync.fetch_leaderboard(fx.category.id, viewer).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cards(&fx), calls);
    }

    #[tokio::test]
    async fn test_changed_ranking_rebuilds() {
        let fx = fixture();
        fx.sync.reconcile(fx.category.id).await.unwrap();
        let viewer = Uuid::new_v4();

        let first = fx.sync.fetch_leaderboard(fx.category.id, viewer).await.unwrap();
        fx.sync.push_score(fx.category.id, fx.photos[0].id, 100).await;

        let second = fx.sync.fetch_leaderboard(fx.category.id, viewer).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second[0].photo_id, fx.photos[0].id);
        assert_eq!(second[0].score, 100.0);
        assert_eq!(cards(&fx), 10);
    }

    #[tokio::test]
    async fn test_other_viewers_never_see_stale_snapshots() {
        let fx = fixture();
        fx.sync.reconcile(fx.category.id).await.unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        fx.sync.fetch_leaderboard(fx.category.id, alice).await.unwrap();
        fx.sync.push_score(fx.category.id, fx.photos[1].id, 500).await;
        // Bob's fetch rolls the raw tier forward to the new ranking.
        fx.sync.fetch_leaderboard(fx.category.id, bob).await.unwrap();

        let alice_again = fx.sync.fetch_leaderboard(fx.category.id, alice).await.unwrap();
        assert_eq!(alice_again[0].photo_id, fx.photos[1].id);
        assert_eq!(alice_again[0].score, 500.0);
    }

    #[tokio::test]
    async fn test_ranking_change_drops_every_viewer() {
        let fx = fixture();
        fx.sync.reconcile(fx.category.id).await.unwrap();
        let viewers: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for viewer in &viewers {
            fx.sync.fetch_leaderboard(fx.category.id, *viewer).await.unwrap();
        }
        let snapshot = fx.sync.enriched_cache().get(&fx.category.id).unwrap();
        assert_eq!(snapshot.views.len(), 3);

        fx.sync.push_score(fx.category.id, fx.photos[0].id, 900).await;
        let newcomer = Uuid::new_v4();
        fx.sync.fetch_leaderboard(fx.category.id, newcomer).await.unwrap();

        assert_eq!(fx.sync.enriched_cache().len(), 1);
        let snapshot = fx.sync.enriched_cache().get(&fx.category.id).unwrap();
        assert_eq!(snapshot.views.len(), 1);
        assert!(snapshot.view(newcomer).is_some());
        assert!(viewers.iter().all(|v| snapshot.view(*v).is_none()));
    }

    #[tokio::test]
    async fn test_unstarted_leaderboard_is_empty() {
        let fx = fixture();
        let board = fx
            .sync
            .fetch_leaderboard(fx.category.id, Uuid::new_v4())
            .await
            .unwrap();
        assert!(board.is_empty());
        assert_eq!(cards(&fx), 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let fx = fixture();
        fx.sync.reconcile(fx.category.id).await.unwrap();
        let viewer = Uuid::new_v4();
        fx.sync.fetch_leaderboard(fx.category.id, viewer).await.unwrap();

        fx.ranking.set_offline(true);
        let err = fx.sync.fetch_leaderboard(fx.category.id, viewer).await;
        assert!(matches!(err, Err(ContestError::LeaderboardUnavailable(_))));
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let mut config = AppConfig::default();
        config.leaderboard.store_timeout_ms = 20;
        let fx = fixture_with(config);
        fx.ranking.set_latency(Duration::from_millis(200));

        let err = fx.sync.fetch_leaderboard(fx.category.id, Uuid::new_v4()).await;
        assert!(matches!(err, Err(ContestError::LeaderboardUnavailable(_))));
    }

    #[tokio::test]
    async fn test_flags_and_dropped_photos() {
        let fx = fixture();
        fx.sync.reconcile(fx.category.id).await.unwrap();

        let viewer = fx.photos[4].user_id;
        let friend = fx.photos[3].user_id;
        fx.resolver.inner.register_user(friend, "Ansel");
        fx.resolver.inner.add_friendship(viewer, friend);
        fx.store.set_active(fx.photos[2].id, false);

        let board = fx.sync.fetch_leaderboard(fx.category.id, viewer).await.unwrap();
        assert_eq!(board.len(), 4);
        assert!(board.iter().all(|e| e.photo_id != fx.photos[2].id));
        assert!(board[0].is_mine);
        assert!(!board[0].is_friend);
        assert!(board[1].is_friend);
        assert_eq!(board[1].display_name, "Ansel");
        // Ranks come from the store, gaps included.
        assert_eq!(board[2].rank, 4);
    }

    #[tokio::test]
    async fn test_push_creates_missing_leaderboard() {
        let fx = fixture();
        assert!(!fx.ranking.member_exists(fx.category.id).await.unwrap());

        fx.sync.push_score(fx.category.id, fx.photos[0].id, 10).await;
        for photo in &fx.photos {
            let score = fx.ranking.score_of(fx.category.id, &photo.id.to_string());
            assert_eq!(score, Some(photo.score as f64));
        }
    }

    #[tokio::test]
    async fn test_reconcile_removes_inactive() {
        let fx = fixture();
        fx.sync.reconcile(fx.category.id).await.unwrap();
        fx.store.set_active(fx.photos[0].id, false);

        let scored = fx.sync.reconcile(fx.category.id).await.unwrap();
        assert_eq!(scored, 4);
        assert_eq!(
            fx.ranking.score_of(fx.category.id, &fx.photos[0].id.to_string()),
            None
        );
    }

    #[tokio::test]
    async fn test_votes_commit_when_ranking_is_down() {
        let fx = fixture();
        let voter = Uuid::new_v4();
        let ballot = Ballot::for_photos(fx.category.id, voter, &fx.photos[..4]);
        fx.store.insert_ballot(&ballot, &[]).await.unwrap();
        fx.ranking.set_offline(true);

        let tabulator = ScoreTabulator::new(fx.store.clone(), fx.sync.clone());
        let votes = vec![VoteSubmission {
            entry_id: ballot.entries[0].id,
            vote: 1,
            like: false,
            offensive: false,
            tags: Vec::new(),
        }];
        let entries = tabulator.tabulate_votes(voter, votes).await.unwrap();
        assert_eq!(entries[0].vote, Some(1));

        let photo = fx.store.get_photo(fx.photos[0].id).await.unwrap().unwrap();
        assert_eq!(photo.score, 13);
        assert_eq!(photo.times_voted, 1);

        fx.ranking.set_offline(false);
        fx.sync.reconcile(fx.category.id).await.unwrap();
        assert_eq!(
            fx.ranking.score_of(fx.category.id, &fx.photos[0].id.to_string()),
            Some(13.0)
        );
    }
}
