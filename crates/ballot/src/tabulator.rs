//! Vote tabulation: turns submitted rankings into score deltas and commits
//! the per-photo counters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use contest_core::scoring::calculate_score;
use contest_core::traits::{ContestStore, ScorePublisher};
use contest_core::types::{
    Ballot, BallotEntry, RawVoteSubmission, TabulatedVote, VoteSubmission, BALLOT_SIZE,
};
use contest_core::{ContestError, ContestResult};
use tracing::{debug, info};
use uuid::Uuid;

pub struct ScoreTabulator {
    store: Arc<dyn ContestStore>,
    publisher: Arc<dyn ScorePublisher>,
}

impl ScoreTabulator {
    pub fn new(store: Arc<dyn ContestStore>, publisher: Arc<dyn ScorePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Convert client-posted votes and tabulate them.
    pub async fn tabulate_raw(
        &self,
        user_id: Uuid,
        raw: Vec<RawVoteSubmission>,
    ) -> ContestResult<Vec<BallotEntry>> {
        check_batch_size(raw.len())?;
        let submissions = raw
            .into_iter()
            .map(RawVoteSubmission::into_submission)
            .collect::<ContestResult<Vec<_>>>()?;
        self.tabulate_votes(user_id, submissions).await
    }

    /// Score a batch of rankings from one ballot owned by `user_id`.
    ///
    /// The batch is validated as a whole before anything is written; any
    /// invalid entry rejects the batch. Every entry is scored with the table
    /// of the first entry's round-two section.
    pub async fn tabulate_votes(
        &self,
        user_id: Uuid,
        submissions: Vec<VoteSubmission>,
    ) -> ContestResult<Vec<BallotEntry>> {
        check_batch_size(submissions.len())?;
        if submissions.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.resolve_entries(user_id, &submissions).await?;

        let category_id = entries[0].category_id;
        if entries.iter().any(|e| e.category_id != category_id) {
            return Err(ContestError::InvalidBallotEntry(
                "vote batch spans more than one category".to_string(),
            ));
        }
        let category = self
            .store
            .get_category(category_id)
            .await?
            .ok_or(ContestError::CategoryNotFound(category_id))?;

        let section = if category.is_finals() {
            let first_photo = entries[0].photo_id;
            self.store
                .voting_round(first_photo)
                .await?
                .ok_or(ContestError::SectionUnassigned(first_photo))?
                .section
        } else {
            0
        };

        let votes = submissions
            .into_iter()
            .zip(&entries)
            .map(|(sub, entry)| -> ContestResult<TabulatedVote> {
                let score_delta = calculate_score(sub.vote, category.round, section).ok_or(
                    ContestError::InvalidRank {
                        entry_id: sub.entry_id,
                        rank: sub.vote,
                    },
                )?;
                Ok(TabulatedVote {
                    entry_id: sub.entry_id,
                    photo_id: entry.photo_id,
                    vote: sub.vote,
                    like: sub.like,
                    offensive: sub.offensive,
                    tags: sub.tags,
                    score_delta,
                })
            })
            .collect::<ContestResult<Vec<_>>>()?;

        let committed = self.store.commit_votes(&votes).await?;
        metrics::counter!("votes.tabulated").increment(committed.len() as u64);

        for (entry, photo) in &committed {
            debug!(
                entry_id = %entry.id,
                photo_id = %photo.id,
                vote = ?entry.vote,
                score = photo.score,
                "Vote recorded"
            );
            self.publisher
                .push_score(photo.category_id, photo.id, photo.score)
                .await;
        }

        info!(
            user_id = %user_id,
            category_id = %category_id,
            round = category.round,
            section = section,
            entries = committed.len(),
            "Votes tabulated"
        );

        Ok(committed.into_iter().map(|(entry, _)| entry).collect())
    }

    /// Look up every submitted entry and check it may be voted by `user_id`.
    async fn resolve_entries(
        &self,
        user_id: Uuid,
        submissions: &[VoteSubmission],
    ) -> ContestResult<Vec<BallotEntry>> {
        let mut seen = HashSet::new();
        let mut ballots: HashMap<Uuid, Ballot> = HashMap::new();
        let mut entries = Vec::with_capacity(submissions.len());

        for sub in submissions {
            if !seen.insert(sub.entry_id) {
                return Err(ContestError::InvalidBallotEntry(format!(
                    "entry {} submitted twice",
                    sub.entry_id
                )));
            }
            let entry = self.store.ballot_entry(sub.entry_id).await?.ok_or_else(|| {
                ContestError::InvalidBallotEntry(format!("unknown ballot entry {}", sub.entry_id))
            })?;

            if !ballots.contains_key(&entry.ballot_id) {
                let ballot = self.store.ballot(entry.ballot_id).await?.ok_or_else(|| {
                    ContestError::InvalidBallotEntry(format!("unknown ballot {}", entry.ballot_id))
                })?;
                ballots.insert(ballot.id, ballot);
            }
            let voter = ballots.get(&entry.ballot_id).map(|b| b.user_id);
            if voter != Some(user_id) {
                return Err(ContestError::InvalidBallotEntry(format!(
                    "entry {} belongs to another voter's ballot",
                    sub.entry_id
                )));
            }

            if entry.vote.is_some() {
                return Err(ContestError::EntryAlreadyVoted(entry.id));
            }
            if !(1..=BALLOT_SIZE).contains(&usize::from(sub.vote)) {
                return Err(ContestError::InvalidRank {
                    entry_id: entry.id,
                    rank: sub.vote,
                });
            }
            entries.push(entry);
        }

        Ok(entries)
    }
}

fn check_batch_size(len: usize) -> ContestResult<()> {
    if len > BALLOT_SIZE {
        return Err(ContestError::TooManyEntries {
            got: len,
            max: BALLOT_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryContestStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use contest_core::types::{Category, CategoryState, Photo};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        pushed: Mutex<Vec<(Uuid, i64)>>,
    }

    #[async_trait]
    impl ScorePublisher for RecordingPublisher {
        async fn push_score(&self, _category_id: Uuid, photo_id: Uuid, score: i64) {
            self.pushed.lock().push((photo_id, score));
        }
    }

    struct Fixture {
        store: Arc<MemoryContestStore>,
        publisher: Arc<RecordingPublisher>,
        tabulator: ScoreTabulator,
        photos: Vec<Photo>,
        ballot: Ballot,
        voter: Uuid,
    }

    async fn fixture(round: u8) -> Fixture {
        let store = Arc::new(MemoryContestStore::new());
        let category = Category {
            id: Uuid::new_v4(),
            name: "Wildlife".to_string(),
            state: CategoryState::Voting,
            round,
            start_time: Utc::now(),
            upload_duration_secs: 60,
            voting_duration_secs: 60,
        };
        store.insert_category(category.clone());
        let photos: Vec<Photo> = (0..BALLOT_SIZE)
            .map(|_| Photo::new(Uuid::new_v4(), category.id))
            .collect();
        for photo in &photos {
            store.insert_photo(photo.clone());
        }
        let voter = Uuid::new_v4();
        let ballot = Ballot::for_photos(category.id, voter, &photos);
        store.insert_ballot(&ballot, &[]).await.unwrap();

        let publisher = Arc::new(RecordingPublisher::default());
        let tabulator = ScoreTabulator::new(store.clone(), publisher.clone());
        Fixture {
            store,
            publisher,
            tabulator,
            photos,
            ballot,
            voter,
        }
    }

    fn rank_all(ballot: &Ballot) -> Vec<VoteSubmission> {
        ballot
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| VoteSubmission {
                entry_id: entry.id,
                vote: (i + 1) as u8,
                like: i == 0,
                offensive: false,
                tags: Vec::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_round_zero_scores() {
        let fx = fixture(0).await;
        let entries = fx
            .tabulator
            .tabulate_votes(fx.voter, rank_all(&fx.ballot))
            .await
            .unwrap();
        assert_eq!(entries.len(), BALLOT_SIZE);
        assert!(entries.iter().all(|e| e.vote.is_some()));

        let expected = [3, 1, 0, 0];
        for (photo, score) in fx.photos.iter().zip(expected) {
            let stored = fx.store.get_photo(photo.id).await.unwrap().unwrap();
            assert_eq!(stored.score, score);
            assert_eq!(stored.times_voted, 1);
        }
        let first = fx.store.get_photo(fx.photos[0].id).await.unwrap().unwrap();
        assert_eq!(first.likes, 1);

        let pushed = fx.publisher.pushed.lock().clone();
        assert_eq!(pushed.len(), BALLOT_SIZE);
        assert_eq!(pushed[0], (fx.photos[0].id, 3));
    }

    #[tokio::test]
    async fn test_finals_use_first_entry_section() {
        let fx = fixture(1).await;
        fx.store.assign_section(fx.photos[0].id, 2).unwrap();
        for photo in &fx.photos[1..] {
            fx.store.assign_section(photo.id, 0).unwrap();
        }

        fx.tabulator
            .tabulate_votes(fx.voter, rank_all(&fx.ballot))
            .await
            .unwrap();

        // Section 2 table: [5, 3, 1, 1]
        let expected = [5, 3, 1, 1];
        for (photo, score) in fx.photos.iter().zip(expected) {
            let stored = fx.store.get_photo(photo.id).await.unwrap().unwrap();
            assert_eq!(stored.score, score);
        }
    }

    #[tokio::test]
    async fn test_finals_without_section() {
        let fx = fixture(1).await;
        let err = fx
            .tabulator
            .tabulate_votes(fx.voter, rank_all(&fx.ballot))
            .await;
        assert!(matches!(err, Err(ContestError::SectionUnassigned(_))));
    }

    #[tokio::test]
    async fn test_too_many_entries() {
        let fx = fixture(0).await;
        let mut subs = rank_all(&fx.ballot);
        subs.push(subs[0].clone());
        let err = fx.tabulator.tabulate_votes(fx.voter, subs).await;
        assert!(matches!(
            err,
            Err(ContestError::TooManyEntries { got: 5, max: 4 })
        ));
    }

    #[tokio::test]
    async fn test_unknown_entry_rejects_whole_batch() {
        let fx = fixture(0).await;
        let mut subs = rank_all(&fx.ballot);
        subs[3].entry_id = Uuid::new_v4();

        let err = fx.tabulator.tabulate_votes(fx.voter, subs).await;
        assert!(matches!(err, Err(ContestError::InvalidBallotEntry(_))));
        for photo in &fx.photos {
            let stored = fx.store.get_photo(photo.id).await.unwrap().unwrap();
            assert_eq!(stored.times_voted, 0);
            assert_eq!(stored.score, 0);
        }
        assert!(fx.publisher.pushed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_other_voter_and_revotes() {
        let fx = fixture(0).await;
        let err = fx
            .tabulator
            .tabulate_votes(Uuid::new_v4(), rank_all(&fx.ballot))
            .await;
        assert!(matches!(err, Err(ContestError::InvalidBallotEntry(_))));

        fx.tabulator
            .tabulate_votes(fx.voter, rank_all(&fx.ballot)[..1].to_vec())
            .await
            .unwrap();
        let again = fx
            .tabulator
            .tabulate_votes(fx.voter, rank_all(&fx.ballot))
            .await;
        assert!(matches!(again, Err(ContestError::EntryAlreadyVoted(_))));
    }

    #[tokio::test]
    async fn test_rank_out_of_range() {
        let fx = fixture(0).await;
        let mut subs = rank_all(&fx.ballot);
        subs[1].vote = 5;
        let err = fx.tabulator.tabulate_votes(fx.voter, subs).await;
        assert!(matches!(err, Err(ContestError::InvalidRank { rank: 5, .. })));

        let mut zero = rank_all(&fx.ballot);
        zero[0].vote = 0;
        assert!(fx.tabulator.tabulate_votes(fx.voter, zero).await.is_err());
    }

    #[tokio::test]
    async fn test_raw_submissions_and_tags() {
        let fx = fixture(0).await;
        let raw = vec![
            RawVoteSubmission {
                id: fx.ballot.entries[0].id.to_string(),
                vote: "1".to_string(),
                like: Some("yes".to_string()),
                offensive: Some("0".to_string()),
                tags: Some(vec!["golden hour".to_string()]),
            },
            RawVoteSubmission {
                id: fx.ballot.entries[1].id.to_string(),
                vote: "2".to_string(),
                like: None,
                offensive: Some("1".to_string()),
                tags: None,
            },
        ];

        let entries = fx.tabulator.tabulate_raw(fx.voter, raw).await.unwrap();
        assert!(entries[0].like);
        assert!(!entries[0].offensive);
        assert_eq!(entries[0].tags, vec!["golden hour".to_string()]);
        assert!(!entries[1].like);
        assert!(entries[1].offensive);

        let flagged = fx.store.get_photo(fx.photos[1].id).await.unwrap().unwrap();
        assert_eq!(flagged.offensive, 1);
        assert_eq!(flagged.score, 1);
    }
}
