//! Ballot allocation: picks up to `BALLOT_SIZE` photos for a voter.
//!
//! Round 0 prefers photos that have appeared on the fewest ballots, walking
//! appearance counts upward until enough candidates are gathered. Round 1
//! walks the round-two exposure counter the same way but across the
//! stratification sections in a random order, and finishes with an
//! unconstrained backfill once every photo has reached the ceiling.
//!
//! In round 1 a photo's exposure counter is bumped when the ballot is
//! allocated, not when it is voted on. An abandoned ballot therefore still
//! uses up part of the photo's round-two budget; this is what makes round 1
//! converge and must be preserved.

use std::collections::HashSet;
use std::sync::Arc;

use contest_core::config::BallotConfig;
use contest_core::traits::ContestStore;
use contest_core::types::{Ballot, Category, Photo, BALLOT_SIZE, MAX_ROUNDS, SECTION_COUNT};
use contest_core::{ContestError, ContestResult};
use rand::seq::SliceRandom;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dedup::drop_near_duplicates;

pub struct BallotAllocator {
    store: Arc<dyn ContestStore>,
    config: BallotConfig,
}

impl BallotAllocator {
    pub fn new(store: Arc<dyn ContestStore>, config: &BallotConfig) -> Self {
        info!(
            oversample_factor = config.oversample_factor,
            dedup = config.dedup_enabled,
            "Ballot allocator initialized"
        );
        Self {
            store,
            config: config.clone(),
        }
    }

    fn oversample(&self) -> usize {
        BALLOT_SIZE * self.config.oversample_factor
    }

    /// Allocate and persist a ballot for `user_id` in `category_id`.
    ///
    /// A small pool yields a ballot with fewer than `BALLOT_SIZE` entries
    /// (possibly none); that is not an error.
    pub async fn create_ballot(&self, category_id: Uuid, user_id: Uuid) -> ContestResult<Ballot> {
        let category = self
            .store
            .get_category(category_id)
            .await?
            .ok_or(ContestError::CategoryNotFound(category_id))?;

        if !category.accepts_ballots() {
            return Err(ContestError::CategoryNotEligible {
                id: category.id,
                state: category.state,
            });
        }

        let candidates = if category.is_finals() {
            self.finals_candidates(&category, user_id).await?
        } else {
            self.broad_candidates(&category, user_id).await?
        };
        let gathered = candidates.len();
        let photos = self.finalize(candidates);

        let ballot = Ballot::for_photos(category.id, user_id, &photos);
        let round_two_seen: Vec<Uuid> = if category.is_finals() {
            photos.iter().map(|p| p.id).collect()
        } else {
            Vec::new()
        };
        self.store.insert_ballot(&ballot, &round_two_seen).await?;

        metrics::counter!("ballot.created").increment(1);
        if !ballot.is_full() {
            metrics::counter!("ballot.partial").increment(1);
        }
        debug!(
            ballot_id = %ballot.id,
            category_id = %category.id,
            user_id = %user_id,
            round = category.round,
            gathered = gathered,
            entries = ballot.entries.len(),
            "Ballot allocated"
        );

        Ok(ballot)
    }

    /// Round 0: never-balloted photos first, then photos with 1, 2, ...
    /// appearances, the last pool taking everything at or above the ceiling.
    async fn broad_candidates(&self, category: &Category, user_id: Uuid) -> ContestResult<Vec<Photo>> {
        let limit = self.oversample();
        let mut gathered = Vec::new();

        for n in 0..=MAX_ROUNDS {
            let pool = if n == 0 {
                self.store
                    .unballoted_photos(category.id, user_id, limit)
                    .await?
            } else {
                self.store
                    .photos_with_appearances(category.id, user_id, n, n == MAX_ROUNDS, limit)
                    .await?
            };
            gathered.extend(pool);
            if gathered.len() >= BALLOT_SIZE {
                break;
            }
        }

        Ok(gathered)
    }

    /// Round 1: for each exposure level below the ceiling, visit the sections
    /// in this call's random order. If every level is exhausted, backfill
    /// from the same sections ignoring exposure.
    async fn finals_candidates(&self, category: &Category, user_id: Uuid) -> ContestResult<Vec<Photo>> {
        let limit = self.oversample();
        let mut sections: Vec<u8> = (0..SECTION_COUNT).collect();
        sections.shuffle(&mut rand::thread_rng());

        let mut gathered: Vec<Photo> = Vec::new();
        for n in 0..MAX_ROUNDS {
            for &section in &sections {
                let pool = self
                    .store
                    .round_two_photos(category.id, section, user_id, Some(n), limit)
                    .await?;
                gathered.extend(pool);
                if gathered.len() >= BALLOT_SIZE {
                    return Ok(gathered);
                }
            }
        }

        debug!(
            category_id = %category.id,
            gathered = gathered.len(),
            "Round-two pools exhausted, backfilling past the exposure ceiling"
        );

        let mut seen: HashSet<Uuid> = gathered.iter().map(|p| p.id).collect();
        for &section in &sections {
            let pool = self
                .store
                .round_two_photos(category.id, section, user_id, None, limit)
                .await?;
            gathered.extend(pool.into_iter().filter(|p| seen.insert(p.id)));
            if gathered.len() >= BALLOT_SIZE {
                break;
            }
        }

        Ok(gathered)
    }

    /// Shuffle, optionally drop near-duplicates, and cut to ballot size.
    fn finalize(&self, candidates: Vec<Photo>) -> Vec<Photo> {
        let mut seen = HashSet::new();
        let mut photos: Vec<Photo> = candidates
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .collect();
        photos.shuffle(&mut rand::thread_rng());

        if self.config.dedup_enabled {
            photos = drop_near_duplicates(photos, self.config.dedup_max_distance);
        }
        photos.truncate(BALLOT_SIZE);
        photos
    }
}
