//! Contest domain types shared by the allocator, tabulator and leaderboard.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ContestError, ContestResult};

/// Number of photos on a full ballot (K).
pub const BALLOT_SIZE: usize = 4;
/// Appearance / round-two exposure ceiling used by the allocator.
pub const MAX_ROUNDS: u32 = 4;
/// Number of round-two stratification sections.
pub const SECTION_COUNT: u8 = 4;
/// Candidates fetched per pool = `BALLOT_SIZE * DEFAULT_OVERSAMPLE_FACTOR`.
pub const DEFAULT_OVERSAMPLE_FACTOR: usize = 20;

// ─── Category ───────────────────────────────────────────────────────────────

/// Lifecycle order: a category only ever moves down this list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryState {
    Pending,
    Upload,
    Voting,
    Counting,
    Closed,
}

/// A timed contest round that photos are uploaded into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub state: CategoryState,
    /// 0 = broad elimination, 1 = stratified finals.
    pub round: u8,
    pub start_time: DateTime<Utc>,
    pub upload_duration_secs: i64,
    pub voting_duration_secs: i64,
}

impl Category {
    /// Ballots are handed out while uploading (preview voting) and voting.
    pub fn accepts_ballots(&self) -> bool {
        matches!(self.state, CategoryState::Upload | CategoryState::Voting)
    }

    pub fn is_finals(&self) -> bool {
        self.round >= 1
    }

    pub fn upload_closes_at(&self) -> DateTime<Utc> {
        self.start_time + Duration::seconds(self.upload_duration_secs)
    }

    pub fn voting_closes_at(&self) -> DateTime<Utc> {
        self.upload_closes_at() + Duration::seconds(self.voting_duration_secs)
    }

    /// State implied by the schedule at `now`. Counting and closing are
    /// driven by category management, so a stored `Counting`/`Closed` wins.
    pub fn scheduled_state(&self, now: DateTime<Utc>) -> CategoryState {
        if matches!(self.state, CategoryState::Counting | CategoryState::Closed) {
            return self.state;
        }
        if now < self.start_time {
            CategoryState::Pending
        } else if now < self.upload_closes_at() {
            CategoryState::Upload
        } else if now < self.voting_closes_at() {
            CategoryState::Voting
        } else {
            CategoryState::Counting
        }
    }
}

// ─── Photos ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: Uuid,
    /// Owner of the submission.
    pub user_id: Uuid,
    pub category_id: Uuid,
    /// Rankings received over the photo's lifetime.
    pub times_voted: u32,
    pub score: i64,
    pub likes: u32,
    pub offensive: u32,
    /// Inactive photos are never drawn onto new ballots.
    pub active: bool,
    /// 64-bit perceptual hash, when one was computed at upload.
    #[serde(default)]
    pub phash: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Photo {
    pub fn new(user_id: Uuid, category_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            category_id,
            times_voted: 0,
            score: 0,
            likes: 0,
            offensive: 0,
            active: true,
            phash: None,
            created_at: Utc::now(),
        }
    }
}

/// Round-two side record. `section` is fixed once assigned; `times_voted`
/// counts ballot appearances within round two and is bumped when a ballot
/// is allocated, not when it is voted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VotingRound {
    pub photo_id: Uuid,
    pub section: u8,
    pub times_voted: u32,
}

// ─── Ballots ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ballot {
    pub id: Uuid,
    pub category_id: Uuid,
    /// The voter.
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BallotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BallotEntry {
    pub id: Uuid,
    pub ballot_id: Uuid,
    pub category_id: Uuid,
    /// Owner of the photo, not the voter.
    pub user_id: Uuid,
    pub photo_id: Uuid,
    pub vote: Option<u8>,
    pub like: bool,
    pub offensive: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Ballot {
    /// Build a ballot for `voter` over the given photos, in order.
    pub fn for_photos(category_id: Uuid, voter: Uuid, photos: &[Photo]) -> Self {
        let id = Uuid::new_v4();
        let entries = photos
            .iter()
            .map(|photo| BallotEntry {
                id: Uuid::new_v4(),
                ballot_id: id,
                category_id,
                user_id: photo.user_id,
                photo_id: photo.id,
                vote: None,
                like: false,
                offensive: false,
                tags: Vec::new(),
            })
            .collect();
        Self {
            id,
            category_id,
            user_id: voter,
            created_at: Utc::now(),
            entries,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == BALLOT_SIZE
    }
}

// ─── Vote submissions ───────────────────────────────────────────────────────

/// A validated, typed ranking for one ballot entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteSubmission {
    pub entry_id: Uuid,
    pub vote: u8,
    pub like: bool,
    pub offensive: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Vote as posted by clients: every field arrives as a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawVoteSubmission {
    pub id: String,
    pub vote: String,
    #[serde(default)]
    pub like: Option<String>,
    #[serde(default)]
    pub offensive: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Client flag coercion: a missing key is false, `"0"` is false, and any
/// other value (including the empty string) is true.
pub fn coerce_flag(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => v != "0",
    }
}

impl RawVoteSubmission {
    pub fn into_submission(self) -> ContestResult<VoteSubmission> {
        let entry_id = Uuid::parse_str(self.id.trim()).map_err(|_| {
            ContestError::InvalidBallotEntry(format!("malformed ballot entry id {:?}", self.id))
        })?;
        let vote = self.vote.trim().parse::<u8>().map_err(|_| {
            ContestError::InvalidBallotEntry(format!(
                "malformed vote {:?} for entry {entry_id}",
                self.vote
            ))
        })?;
        let tags = self
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(VoteSubmission {
            entry_id,
            vote,
            like: coerce_flag(self.like.as_deref()),
            offensive: coerce_flag(self.offensive.as_deref()),
            tags,
        })
    }
}

/// A submission that passed validation, ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedVote {
    pub entry_id: Uuid,
    pub photo_id: Uuid,
    pub vote: u8,
    pub like: bool,
    pub offensive: bool,
    pub tags: Vec<String>,
    pub score_delta: i64,
}

// ─── Leaderboards ───────────────────────────────────────────────────────────

/// One row of the ranked score store, straight off the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedEntry {
    pub member: String,
    pub score: f64,
    /// 1-based position within the category.
    pub rank: usize,
}

/// Display data for a photo, produced by the identity resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoCard {
    pub photo_id: Uuid,
    pub owner_id: Uuid,
    pub display_name: String,
    pub thumbnail: String,
    pub votes: u32,
    pub likes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedEntry {
    pub photo_id: Uuid,
    pub owner_id: Uuid,
    pub display_name: String,
    pub thumbnail: String,
    pub score: f64,
    pub rank: usize,
    pub votes: u32,
    pub likes: u32,
    pub is_mine: bool,
    pub is_friend: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(state: CategoryState) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: "Landscapes".to_string(),
            state,
            round: 0,
            start_time: Utc::now(),
            upload_duration_secs: 3600,
            voting_duration_secs: 7200,
        }
    }

    #[test]
    fn test_ballot_eligibility() {
        assert!(category(CategoryState::Upload).accepts_ballots());
        assert!(category(CategoryState::Voting).accepts_ballots());
        assert!(!category(CategoryState::Pending).accepts_ballots());
        assert!(!category(CategoryState::Counting).accepts_ballots());
        assert!(!category(CategoryState::Closed).accepts_ballots());
    }

    #[test]
    fn test_scheduled_state() {
        let c = category(CategoryState::Pending);
        assert_eq!(c.scheduled_state(c.start_time - Duration::seconds(1)), CategoryState::Pending);
        assert_eq!(c.scheduled_state(c.start_time + Duration::seconds(10)), CategoryState::Upload);
        assert_eq!(c.scheduled_state(c.upload_closes_at()), CategoryState::Voting);
        assert_eq!(c.scheduled_state(c.voting_closes_at()), CategoryState::Counting);

        let closed = category(CategoryState::Closed);
        assert_eq!(closed.scheduled_state(closed.start_time), CategoryState::Closed);
    }

    #[test]
    fn test_coerce_flag() {
        assert!(!coerce_flag(None));
        assert!(!coerce_flag(Some("0")));
        assert!(coerce_flag(Some("1")));
        assert!(coerce_flag(Some("false")));
        assert!(coerce_flag(Some("")));
    }

    #[test]
    fn test_raw_submission_conversion() {
        let id = Uuid::new_v4();
        let raw = RawVoteSubmission {
            id: id.to_string(),
            vote: " 2 ".to_string(),
            like: Some("on".to_string()),
            offensive: Some("0".to_string()),
            tags: Some(vec!["sunset".to_string(), "  ".to_string()]),
        };
        let sub = raw.into_submission().unwrap();
        assert_eq!(sub.entry_id, id);
        assert_eq!(sub.vote, 2);
        assert!(sub.like);
        assert!(!sub.offensive);
        assert_eq!(sub.tags, vec!["sunset".to_string()]);

        let bad = RawVoteSubmission {
            id: "not-a-uuid".to_string(),
            vote: "1".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            bad.into_submission(),
            Err(ContestError::InvalidBallotEntry(_))
        ));
    }

    #[test]
    fn test_ballot_for_photos() {
        let category_id = Uuid::new_v4();
        let voter = Uuid::new_v4();
        let photos: Vec<Photo> = (0..BALLOT_SIZE)
            .map(|_| Photo::new(Uuid::new_v4(), category_id))
            .collect();
        let ballot = Ballot::for_photos(category_id, voter, &photos);
        assert!(ballot.is_full());
        for (entry, photo) in ballot.entries.iter().zip(&photos) {
            assert_eq!(entry.ballot_id, ballot.id);
            assert_eq!(entry.user_id, photo.user_id);
            assert_eq!(entry.photo_id, photo.id);
            assert!(entry.vote.is_none());
        }
    }
}
