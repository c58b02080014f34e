//! Demo run: seed one category, let simulated voters rank ballots, print the
//! resulting leaderboard as JSON.

use std::collections::HashMap;

use chrono::Utc;
use contest_core::types::{
    Ballot, Category, CategoryState, Photo, VoteSubmission, SECTION_COUNT,
};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::Engine;

pub async fn run(engine: &Engine, photos: usize, voters: usize, finals: bool) -> anyhow::Result<()> {
    let category = Category {
        id: Uuid::new_v4(),
        name: "Demo".to_string(),
        state: CategoryState::Voting,
        round: u8::from(finals),
        start_time: Utc::now(),
        upload_duration_secs: 3600,
        voting_duration_secs: 3600,
    };
    engine.store.insert_category(category.clone());
    engine.categories.invalidate();

    // Hidden "quality" that simulated voters agree on, plus per-vote noise.
    let mut quality: HashMap<Uuid, f64> = HashMap::new();
    let mut owners = Vec::with_capacity(photos);
    for i in 0..photos {
        let owner = Uuid::new_v4();
        engine
            .resolver
            .register_user(owner, &format!("photographer-{i:02}"));
        let photo = Photo::new(owner, category.id);
        quality.insert(photo.id, rand::thread_rng().gen::<f64>());
        engine.store.insert_photo(photo.clone());
        if finals {
            engine
                .store
                .assign_section(photo.id, (i % usize::from(SECTION_COUNT)) as u8)?;
        }
        owners.push(owner);
    }

    info!(
        category_id = %category.id,
        photos = photos,
        voters = voters,
        round = category.round,
        "Demo category seeded"
    );

    let mut ballots = 0;
    let mut partial = 0;
    for _ in 0..voters {
        let voter = Uuid::new_v4();
        let ballot = engine.allocator.create_ballot(category.id, voter).await?;
        if ballot.entries.is_empty() {
            continue;
        }
        if !ballot.is_full() {
            partial += 1;
        }
        ballots += 1;
        let submissions = rank_ballot(&ballot, &quality);
        engine.tabulator.tabulate_votes(voter, submissions).await?;
    }

    let viewer = owners.first().copied().unwrap_or_else(Uuid::new_v4);
    let board = engine
        .leaderboard
        .fetch_leaderboard(category.id, viewer)
        .await?;

    info!(
        ballots = ballots,
        partial = partial,
        leaderboard_entries = board.len(),
        "Simulation complete"
    );
    println!("{}", serde_json::to_string_pretty(&*board)?);
    Ok(())
}

/// Rank a ballot by noisy perceived quality, best first.
fn rank_ballot(ballot: &Ballot, quality: &HashMap<Uuid, f64>) -> Vec<VoteSubmission> {
    let mut rng = rand::thread_rng();
    let mut perceived: Vec<(Uuid, f64)> = ballot
        .entries
        .iter()
        .map(|entry| {
            let base = quality.get(&entry.photo_id).copied().unwrap_or(0.5);
            (entry.id, base + rng.gen_range(-0.15..0.15))
        })
        .collect();
    perceived.sort_by(|a, b| b.1.total_cmp(&a.1));

    perceived
        .into_iter()
        .enumerate()
        .map(|(i, (entry_id, _))| VoteSubmission {
            entry_id,
            vote: (i + 1) as u8,
            like: rng.gen_bool(0.2),
            offensive: false,
            tags: Vec::new(),
        })
        .collect()
}
