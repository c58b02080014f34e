//! In-memory contest store.
//!
//! Production deployments back [`ContestStore`] with a relational database;
//! this implementation provides the same semantics for development and tests.
//! All tables sit behind one lock so that ballot inserts and vote commits are
//! applied as a single unit of work.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use contest_core::traits::ContestStore;
use contest_core::types::{
    Ballot, BallotEntry, Category, CategoryState, Photo, TabulatedVote, VotingRound,
    SECTION_COUNT,
};
use contest_core::{ContestError, ContestResult};
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    categories: HashMap<Uuid, Category>,
    photos: HashMap<Uuid, Photo>,
    /// Upload order, so candidate queries are stable.
    photo_order: Vec<Uuid>,
    voting_rounds: HashMap<Uuid, VotingRound>,
    ballots: HashMap<Uuid, Ballot>,
    /// entry id → (ballot id, index within the ballot)
    entry_index: HashMap<Uuid, (Uuid, usize)>,
    /// photo id → number of ballot entries referencing it
    appearances: HashMap<Uuid, u32>,
}

impl Tables {
    fn eligible<'a>(
        &'a self,
        category_id: Uuid,
        exclude_user: Uuid,
    ) -> impl Iterator<Item = &'a Photo> + 'a {
        self.photo_order
            .iter()
            .filter_map(|id| self.photos.get(id))
            .filter(move |p| p.category_id == category_id && p.active && p.user_id != exclude_user)
    }

    fn entry(&self, entry_id: Uuid) -> Option<&BallotEntry> {
        let (ballot_id, idx) = self.entry_index.get(&entry_id)?;
        self.ballots.get(ballot_id)?.entries.get(*idx)
    }

    fn entry_mut(&mut self, entry_id: Uuid) -> Option<&mut BallotEntry> {
        let (ballot_id, idx) = *self.entry_index.get(&entry_id)?;
        self.ballots.get_mut(&ballot_id)?.entries.get_mut(idx)
    }
}

/// Thread-safe in-memory [`ContestStore`].
#[derive(Default)]
pub struct MemoryContestStore {
    tables: RwLock<Tables>,
}

impl MemoryContestStore {
    pub fn new() -> Self {
        info!("Contest store initialized (in-memory, development mode)");
        Self::default()
    }

    pub fn insert_category(&self, category: Category) {
        self.tables.write().categories.insert(category.id, category);
    }

    pub fn insert_photo(&self, photo: Photo) {
        let mut tables = self.tables.write();
        if tables.photos.insert(photo.id, photo.clone()).is_none() {
            tables.photo_order.push(photo.id);
        }
    }

    /// Promote a photo into round two. The section is frozen on first
    /// assignment; later calls return the existing record unchanged.
    pub fn assign_section(&self, photo_id: Uuid, section: u8) -> ContestResult<VotingRound> {
        if section >= SECTION_COUNT {
            return Err(ContestError::Store(format!(
                "section {section} out of range (0..{SECTION_COUNT})"
            )));
        }
        let mut tables = self.tables.write();
        if !tables.photos.contains_key(&photo_id) {
            return Err(ContestError::Store(format!("unknown photo {photo_id}")));
        }
        Ok(*tables
            .voting_rounds
            .entry(photo_id)
            .or_insert(VotingRound {
                photo_id,
                section,
                times_voted: 0,
            }))
    }

    /// Overwrite a photo's round-two counter.
    pub fn set_round_two_votes(&self, photo_id: Uuid, times_voted: u32) {
        if let Some(round) = self.tables.write().voting_rounds.get_mut(&photo_id) {
            round.times_voted = times_voted;
        }
    }

    pub fn set_active(&self, photo_id: Uuid, active: bool) {
        if let Some(photo) = self.tables.write().photos.get_mut(&photo_id) {
            photo.active = active;
        }
    }

    pub fn set_category_state(&self, category_id: Uuid, state: CategoryState) {
        if let Some(category) = self.tables.write().categories.get_mut(&category_id) {
            category.state = state;
        }
    }

    pub fn ballot_count(&self) -> usize {
        self.tables.read().ballots.len()
    }
}

#[async_trait]
impl ContestStore for MemoryContestStore {
    async fn get_category(&self, id: Uuid) -> ContestResult<Option<Category>> {
        Ok(self.tables.read().categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> ContestResult<Vec<Category>> {
        let mut categories: Vec<Category> =
            self.tables.read().categories.values().cloned().collect();
        categories.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(categories)
    }

    async fn get_photo(&self, id: Uuid) -> ContestResult<Option<Photo>> {
        Ok(self.tables.read().photos.get(&id).cloned())
    }

    async fn category_photos(&self, category_id: Uuid) -> ContestResult<Vec<Photo>> {
        let tables = self.tables.read();
        Ok(tables
            .photo_order
            .iter()
            .filter_map(|id| tables.photos.get(id))
            .filter(|p| p.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn voting_round(&self, photo_id: Uuid) -> ContestResult<Option<VotingRound>> {
        Ok(self.tables.read().voting_rounds.get(&photo_id).copied())
    }

    async fn unballoted_photos(
        &self,
        category_id: Uuid,
        exclude_user: Uuid,
        limit: usize,
    ) -> ContestResult<Vec<Photo>> {
        let tables = self.tables.read();
        Ok(tables
            .eligible(category_id, exclude_user)
            .filter(|p| !tables.appearances.contains_key(&p.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn photos_with_appearances(
        &self,
        category_id: Uuid,
        exclude_user: Uuid,
        appearances: u32,
        at_least: bool,
        limit: usize,
    ) -> ContestResult<Vec<Photo>> {
        let tables = self.tables.read();
        Ok(tables
            .eligible(category_id, exclude_user)
            .filter(|p| match tables.appearances.get(&p.id) {
                Some(&count) if at_least => count >= appearances,
                Some(&count) => count == appearances,
                None => false,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn round_two_photos(
        &self,
        category_id: Uuid,
        section: u8,
        exclude_user: Uuid,
        times_voted: Option<u32>,
        limit: usize,
    ) -> ContestResult<Vec<Photo>> {
        let tables = self.tables.read();
        Ok(tables
            .eligible(category_id, exclude_user)
            .filter(|p| {
                tables.voting_rounds.get(&p.id).is_some_and(|round| {
                    round.section == section
                        && times_voted.map_or(true, |n| round.times_voted == n)
                })
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_ballot(&self, ballot: &Ballot, round_two_seen: &[Uuid]) -> ContestResult<()> {
        let mut tables = self.tables.write();
        if tables.ballots.contains_key(&ballot.id) {
            return Err(ContestError::Store(format!("duplicate ballot {}", ballot.id)));
        }
        if let Some(missing) = round_two_seen
            .iter()
            .find(|id| !tables.voting_rounds.contains_key(id))
        {
            return Err(ContestError::Store(format!(
                "photo {missing} has no round-two record"
            )));
        }

        for (idx, entry) in ballot.entries.iter().enumerate() {
            tables.entry_index.insert(entry.id, (ballot.id, idx));
            *tables.appearances.entry(entry.photo_id).or_insert(0) += 1;
        }
        for photo_id in round_two_seen {
            if let Some(round) = tables.voting_rounds.get_mut(photo_id) {
                round.times_voted += 1;
            }
        }
        tables.ballots.insert(ballot.id, ballot.clone());
        Ok(())
    }

    async fn ballot(&self, id: Uuid) -> ContestResult<Option<Ballot>> {
        Ok(self.tables.read().ballots.get(&id).cloned())
    }

    async fn ballot_entry(&self, id: Uuid) -> ContestResult<Option<BallotEntry>> {
        Ok(self.tables.read().entry(id).cloned())
    }

    async fn commit_votes(
        &self,
        votes: &[TabulatedVote],
    ) -> ContestResult<Vec<(BallotEntry, Photo)>> {
        let mut tables = self.tables.write();

        // Validate the whole batch before touching anything.
        let mut seen = HashSet::new();
        for vote in votes {
            if !seen.insert(vote.entry_id) {
                return Err(ContestError::InvalidBallotEntry(format!(
                    "entry {} submitted twice",
                    vote.entry_id
                )));
            }
            let entry = tables.entry(vote.entry_id).ok_or_else(|| {
                ContestError::InvalidBallotEntry(format!("unknown ballot entry {}", vote.entry_id))
            })?;
            if entry.vote.is_some() {
                return Err(ContestError::EntryAlreadyVoted(vote.entry_id));
            }
            if entry.photo_id != vote.photo_id || !tables.photos.contains_key(&vote.photo_id) {
                return Err(ContestError::InvalidBallotEntry(format!(
                    "entry {} does not reference photo {}",
                    vote.entry_id, vote.photo_id
                )));
            }
        }

        let mut committed = Vec::with_capacity(votes.len());
        for vote in votes {
            let entry = match tables.entry_mut(vote.entry_id) {
                Some(entry) => {
                    entry.vote = Some(vote.vote);
                    entry.like = vote.like;
                    entry.offensive = vote.offensive;
                    entry.tags = vote.tags.clone();
                    entry.clone()
                }
                None => continue,
            };
            let Some(photo) = tables.photos.get_mut(&vote.photo_id) else {
                continue;
            };
            photo.score += vote.score_delta;
            photo.times_voted += 1;
            if vote.like {
                photo.likes += 1;
            }
            if vote.offensive {
                photo.offensive += 1;
            }
            committed.push((entry, photo.clone()));
        }
        Ok(committed)
    }
}
