//! Contest Engine: ballot allocation, vote tabulation and leaderboard
//! synchronization for timed photo contests.
//!
//! Main entry point that wires the subsystems and runs background
//! maintenance (cache sweeps and leaderboard reconciliation).

mod seed;
mod simulate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use contest_ballot::{BallotAllocator, MemoryContestStore, ScoreTabulator};
use contest_cache::{MemoryRankedStore, RedisRankedStore};
use contest_core::config::AppConfig;
use contest_core::traits::{ContestStore, RankedScoreStore};
use contest_core::types::CategoryState;
use contest_core::ContestResult;
use contest_leaderboard::{CategoryDirectory, DirectoryResolver, LeaderboardSynchronizer};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "contest-engine")]
#[command(about = "Ballot allocation, scoring and leaderboards for photo contests")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "PHOTO_CONTEST__NODE_ID")]
    node_id: Option<String>,

    /// Redis URL for the ranked score store (overrides config)
    #[arg(long)]
    redis_url: Option<String>,

    /// Keep rankings in process instead of Redis
    #[arg(long, default_value_t = false)]
    memory_ranking: bool,

    /// Cache sweep period in seconds (overrides config)
    #[arg(long)]
    sweep_interval: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load seed data and run background maintenance until interrupted
    Serve {
        /// JSON file with categories, photos and users
        #[arg(long, env = "PHOTO_CONTEST__SEED")]
        seed: PathBuf,
    },
    /// Seed a demo category, run voters through it and print the leaderboard
    Simulate {
        /// Number of photos to seed
        #[arg(long, default_value_t = 24)]
        photos: usize,
        /// Number of voters, each submitting one ballot
        #[arg(long, default_value_t = 60)]
        voters: usize,
        /// Run the stratified finals round instead of round 0
        #[arg(long, default_value_t = false)]
        finals: bool,
    },
}

/// Everything a request handler needs, built once per process.
pub struct Engine {
    pub config: AppConfig,
    pub store: Arc<MemoryContestStore>,
    pub resolver: Arc<DirectoryResolver>,
    pub allocator: BallotAllocator,
    pub tabulator: ScoreTabulator,
    pub leaderboard: Arc<LeaderboardSynchronizer>,
    pub categories: CategoryDirectory,
}

impl Engine {
    fn build(config: AppConfig, ranking: Arc<dyn RankedScoreStore>) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryContestStore::new());
        let resolver = Arc::new(DirectoryResolver::new(store.clone()));
        let leaderboard = Arc::new(LeaderboardSynchronizer::new(
            ranking,
            resolver.clone(),
            store.clone(),
            &config,
        )?);
        let allocator = BallotAllocator::new(store.clone(), &config.ballot);
        let tabulator = ScoreTabulator::new(store.clone(), leaderboard.clone());
        let categories =
            CategoryDirectory::new(store.clone(), config.cache.category_list_ttl_secs)?;

        Ok(Self {
            config,
            store,
            resolver,
            allocator,
            tabulator,
            leaderboard,
            categories,
        })
    }

    fn spawn_sweepers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let period = Duration::from_secs(self.config.cache.sweep_interval_secs);
        let raw = self.leaderboard.raw_cache();
        let enriched = self.leaderboard.enriched_cache();
        let categories = self.categories.cache();
        info!(
            caches = ?[raw.name(), enriched.name(), categories.name()],
            period_secs = period.as_secs(),
            "Cache sweepers started"
        );
        vec![
            raw.spawn_sweeper(period),
            enriched.spawn_sweeper(period),
            categories.spawn_sweeper(period),
        ]
    }

    /// Move categories forward along their upload/voting schedule. A state
    /// set ahead of the clock is kept. Returns the number changed.
    async fn advance_schedules(&self, now: DateTime<Utc>) -> ContestResult<usize> {
        let mut changed = 0;
        for category in self.store.list_categories().await? {
            let next = category.scheduled_state(now);
            if next > category.state {
                self.store.set_category_state(category.id, next);
                info!(
                    category_id = %category.id,
                    from = ?category.state,
                    to = ?next,
                    "Category state advanced"
                );
                changed += 1;
            }
        }
        if changed > 0 {
            self.categories.invalidate();
        }
        Ok(changed)
    }

    /// One maintenance pass.
    async fn tick(&self) {
        if let Err(e) = self.advance_schedules(Utc::now()).await {
            error!(error = %e, "Failed to advance category schedules");
        }
        self.reconcile_open_categories().await;
    }

    /// Push authoritative scores for every category still being voted on.
    async fn reconcile_open_categories(&self) {
        let categories = match self.categories.list().await {
            Ok(categories) => categories,
            Err(e) => {
                error!(error = %e, "Failed to list categories for reconciliation");
                return;
            }
        };
        for category in categories.iter() {
            if !matches!(category.state, CategoryState::Voting | CategoryState::Counting) {
                continue;
            }
            if let Err(e) = self.leaderboard.reconcile(category.id).await {
                warn!(category_id = %category.id, error = %e, "Leaderboard reconciliation failed");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "contest_engine=info,contest_ballot=info,contest_leaderboard=info,contest_cache=info"
                    .into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Contest engine starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(url) = cli.redis_url {
        config.redis.urls = vec![url];
    }
    if let Some(secs) = cli.sweep_interval {
        config.cache.sweep_interval_secs = secs;
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        sweep_interval_secs = config.cache.sweep_interval_secs,
        page_size = config.leaderboard.page_size,
        "Configuration loaded"
    );

    let in_memory = cli.memory_ranking || matches!(cli.command, Command::Simulate { .. });
    let ranking: Arc<dyn RankedScoreStore> = if in_memory {
        info!("Using in-process ranked score store");
        Arc::new(MemoryRankedStore::new())
    } else {
        Arc::new(RedisRankedStore::new(&config.redis).await?)
    };

    let engine = Engine::build(config, ranking)?;
    let sweepers = engine.spawn_sweepers();

    match cli.command {
        Command::Serve { seed } => serve(&engine, &seed).await?,
        Command::Simulate {
            photos,
            voters,
            finals,
        } => simulate::run(&engine, photos, voters, finals).await?,
    }

    for handle in sweepers {
        handle.abort();
    }
    Ok(())
}

async fn serve(engine: &Engine, seed_path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(seed_path)
        .with_context(|| format!("reading seed file {}", seed_path.display()))?;
    seed::SeedFile::parse(&text)?.apply(engine)?;

    let period = Duration::from_secs(engine.config.leaderboard.reconcile_interval_secs);
    let mut interval = tokio::time::interval(period);

    info!("Contest engine is ready");

    loop {
        tokio::select! {
            _ = interval.tick() => engine.tick().await,
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown signal received");
                return Ok(());
            }
        }
    }
}
