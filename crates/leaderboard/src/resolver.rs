//! In-process identity resolver: display names and friendships live in
//! memory, photo data comes from the contest store.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use contest_core::traits::{ContestStore, ProfileResolver};
use contest_core::types::PhotoCard;
use contest_core::ContestResult;
use dashmap::DashMap;
use uuid::Uuid;

const ANONYMOUS: &str = "anonymous";

pub struct DirectoryResolver {
    store: Arc<dyn ContestStore>,
    names: DashMap<Uuid, String>,
    friends: DashMap<Uuid, HashSet<Uuid>>,
}

impl DirectoryResolver {
    pub fn new(store: Arc<dyn ContestStore>) -> Self {
        Self {
            store,
            names: DashMap::new(),
            friends: DashMap::new(),
        }
    }

    pub fn register_user(&self, user_id: Uuid, display_name: &str) {
        self.names.insert(user_id, display_name.to_string());
    }

    /// Friendship is symmetric.
    pub fn add_friendship(&self, a: Uuid, b: Uuid) {
        self.friends.entry(a).or_default().insert(b);
        self.friends.entry(b).or_default().insert(a);
    }

    pub fn thumbnail_path(photo_id: Uuid) -> String {
        format!("/thumbnails/{photo_id}.jpg")
    }
}

#[async_trait]
impl ProfileResolver for DirectoryResolver {
    async fn photo_card(&self, photo_id: Uuid) -> ContestResult<Option<PhotoCard>> {
        let Some(photo) = self.store.get_photo(photo_id).await? else {
            return Ok(None);
        };
        if !photo.active {
            return Ok(None);
        }
        let display_name = self
            .names
            .get(&photo.user_id)
            .map(|name| name.value().clone())
            .unwrap_or_else(|| ANONYMOUS.to_string());

        Ok(Some(PhotoCard {
            photo_id,
            owner_id: photo.user_id,
            display_name,
            thumbnail: Self::thumbnail_path(photo_id),
            votes: photo.times_voted,
            likes: photo.likes,
        }))
    }

    async fn are_friends(&self, user_a: Uuid, user_b: Uuid) -> ContestResult<bool> {
        Ok(self
            .friends
            .get(&user_a)
            .is_some_and(|set| set.contains(&user_b)))
    }
}
