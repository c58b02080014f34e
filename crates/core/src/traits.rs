//! Collaborator contracts. The engine only talks to persistence, the ranked
//! score store and the identity service through these traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ContestResult;
use crate::types::{
    Ballot, BallotEntry, Category, Photo, PhotoCard, RankedEntry, TabulatedVote, VotingRound,
};

/// Persistent store for categories, photos, round-two records and ballots.
#[async_trait]
pub trait ContestStore: Send + Sync {
    async fn get_category(&self, id: Uuid) -> ContestResult<Option<Category>>;
    async fn list_categories(&self) -> ContestResult<Vec<Category>>;

    async fn get_photo(&self, id: Uuid) -> ContestResult<Option<Photo>>;
    async fn category_photos(&self, category_id: Uuid) -> ContestResult<Vec<Photo>>;
    async fn voting_round(&self, photo_id: Uuid) -> ContestResult<Option<VotingRound>>;

    /// Active photos in the category, not owned by `exclude_user`, that have
    /// never appeared on any ballot.
    async fn unballoted_photos(
        &self,
        category_id: Uuid,
        exclude_user: Uuid,
        limit: usize,
    ) -> ContestResult<Vec<Photo>>;

    /// Active photos in the category, not owned by `exclude_user`, that have
    /// appeared on exactly `appearances` ballots (or at least that many when
    /// `at_least` is set). `appearances` must be non-zero.
    async fn photos_with_appearances(
        &self,
        category_id: Uuid,
        exclude_user: Uuid,
        appearances: u32,
        at_least: bool,
        limit: usize,
    ) -> ContestResult<Vec<Photo>>;

    /// Active round-two photos in `section`, not owned by `exclude_user`.
    /// With `times_voted` set only photos whose round-two counter equals it
    /// are returned.
    async fn round_two_photos(
        &self,
        category_id: Uuid,
        section: u8,
        exclude_user: Uuid,
        times_voted: Option<u32>,
        limit: usize,
    ) -> ContestResult<Vec<Photo>>;

    /// Persist a ballot and bump the round-two counter of every photo in
    /// `round_two_seen` as a single unit of work.
    async fn insert_ballot(&self, ballot: &Ballot, round_two_seen: &[Uuid]) -> ContestResult<()>;

    async fn ballot(&self, id: Uuid) -> ContestResult<Option<Ballot>>;
    async fn ballot_entry(&self, id: Uuid) -> ContestResult<Option<BallotEntry>>;

    /// Apply every vote or none. Photo counters are incremented in place
    /// (`score = score + delta`), never read-modify-written by the caller.
    /// Returns the updated entry and photo for each vote, in order.
    async fn commit_votes(&self, votes: &[TabulatedVote])
        -> ContestResult<Vec<(BallotEntry, Photo)>>;
}

/// External sorted-set service holding live per-category rankings.
#[async_trait]
pub trait RankedScoreStore: Send + Sync {
    async fn set_score(&self, category_id: Uuid, member: &str, score: f64) -> ContestResult<()>;

    /// Page `page` (0-based) of the ranking, highest score first.
    async fn top_page(
        &self,
        category_id: Uuid,
        page: usize,
        page_size: usize,
    ) -> ContestResult<Vec<RankedEntry>>;

    /// Whether a ranking has been created for the category at all.
    async fn member_exists(&self, category_id: Uuid) -> ContestResult<bool>;

    async fn remove_member(&self, category_id: Uuid, member: &str) -> ContestResult<()>;
}

/// Thumbnail and identity lookups used to enrich leaderboards.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// `None` when the photo is gone or deactivated.
    async fn photo_card(&self, photo_id: Uuid) -> ContestResult<Option<PhotoCard>>;
    async fn are_friends(&self, user_a: Uuid, user_b: Uuid) -> ContestResult<bool>;
}

/// Receives authoritative photo scores after votes are committed. Pushes are
/// best-effort: implementations log failures instead of returning them.
#[async_trait]
pub trait ScorePublisher: Send + Sync {
    async fn push_score(&self, category_id: Uuid, photo_id: Uuid, score: i64);
}
