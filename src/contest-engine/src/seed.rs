//! Seed data for `serve`: categories, photos, round-two sections and the
//! user directory, read from a JSON file at startup.

use contest_core::types::{Category, Photo};
use contest_core::ContestResult;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::Engine;

#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub photos: Vec<SeedPhoto>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub friendships: Vec<(Uuid, Uuid)>,
}

#[derive(Debug, Deserialize)]
pub struct SeedPhoto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub times_voted: u32,
    #[serde(default)]
    pub likes: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub phash: Option<u64>,
    /// Round-two section, for photos promoted to the finals.
    #[serde(default)]
    pub section: Option<u8>,
    #[serde(default)]
    pub round_two_votes: u32,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub id: Uuid,
    pub display_name: String,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub photos: usize,
    pub finalists: usize,
    pub users: usize,
}

impl SeedFile {
    pub fn parse(text: &str) -> ContestResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load everything into the engine's stores.
    pub fn apply(self, engine: &Engine) -> ContestResult<SeedSummary> {
        let mut summary = SeedSummary {
            categories: self.categories.len(),
            photos: self.photos.len(),
            users: self.users.len(),
            ..SeedSummary::default()
        };

        for category in self.categories {
            engine.store.insert_category(category);
        }
        for seed in self.photos {
            let mut photo = Photo::new(seed.user_id, seed.category_id);
            photo.id = seed.id;
            photo.score = seed.score;
            photo.times_voted = seed.times_voted;
            photo.likes = seed.likes;
            photo.active = seed.active;
            photo.phash = seed.phash;
            engine.store.insert_photo(photo);

            if let Some(section) = seed.section {
                engine.store.assign_section(seed.id, section)?;
                engine.store.set_round_two_votes(seed.id, seed.round_two_votes);
                summary.finalists += 1;
            }
        }
        for user in &self.users {
            engine.resolver.register_user(user.id, &user.display_name);
        }
        for &(a, b) in &self.friendships {
            engine.resolver.add_friendship(a, b);
        }
        engine.categories.invalidate();

        info!(
            categories = summary.categories,
            photos = summary.photos,
            finalists = summary.finalists,
            users = summary.users,
            "Seed data loaded"
        );
        Ok(summary)
    }
}
