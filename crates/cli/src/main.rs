use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;
use pipeline::ScoredCandidate;
use rand::seq::IndexedRandom;
use server::{EngineConfig, FeedEngine, FeedPage, FeedRequest};
use sources::Scene;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::{ActionType, BehaviorEvent, MemoryCache, MemoryStore, UserId, VideoId, VideoStore};
use tokio::sync::Semaphore;
use tracing::debug;

/// FeedRecs - Short-Video Feed Recommender
#[derive(Parser)]
#[command(name = "feed-recs")]
#[command(about = "Personalized short-video feeds from recall, ranking and filtering", long_about = None)]
struct Cli {
    /// Seed data directory (overrides FEED_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve one feed page
    Recommend {
        /// Viewer to personalize for; anonymous when omitted
        #[arg(long)]
        viewer: Option<UserId>,

        /// feed, follow or hot
        #[arg(long, default_value = "feed")]
        scene: Scene,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "20")]
        page_size: usize,

        /// Show the score breakdown and recall source of each video
        #[arg(long)]
        explain: bool,
    },

    /// Show a user profile and its computed feature
    User {
        #[arg(long)]
        user_id: UserId,
    },

    /// Show the computed feature of a video
    Video {
        #[arg(long)]
        video_id: VideoId,
    },

    /// Ingest a behavior event and wait for the interest update
    Event {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        video_id: VideoId,

        /// view, like, comment, share, favorite or complete
        #[arg(long)]
        action: ActionType,

        /// Seconds watched (views)
        #[arg(long, default_value = "0")]
        watch_time: f64,

        /// Fraction watched, 0 to 1 (views)
        #[arg(long, default_value = "0")]
        completion: f64,
    },

    /// Block or unblock an author for a viewer
    Block {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        author_id: UserId,

        #[arg(long)]
        unblock: bool,
    },

    /// Run benchmark to test performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env()?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    println!("Loading seed data from {}...", config.data_dir.display());
    let start = Instant::now();
    let store = Arc::new(
        MemoryStore::load_from_dir(&config.data_dir).context("Failed to load seed data")?,
    );
    let (users, videos, events) = store.counts();
    println!(
        "{} Loaded {} users, {} videos, {} events in {:?}",
        "✓".green(),
        users,
        videos,
        events,
        start.elapsed()
    );

    // The CLI always runs against the in-process cache
    let engine = Arc::new(FeedEngine::new(
        store.clone(),
        Arc::new(MemoryCache::new()),
        config,
    ));

    match cli.command {
        Commands::Recommend {
            viewer,
            scene,
            page,
            page_size,
            explain,
        } => handle_recommend(&engine, viewer, scene, page, page_size, explain).await?,
        Commands::User { user_id } => handle_user(&engine, store.as_ref(), user_id).await?,
        Commands::Video { video_id } => handle_video(&engine, video_id).await?,
        Commands::Event {
            user_id,
            video_id,
            action,
            watch_time,
            completion,
        } => {
            let event = BehaviorEvent::new(user_id, video_id, action).with_watch(watch_time, completion);
            handle_event(&engine, store.as_ref(), event).await?
        }
        Commands::Block {
            user_id,
            author_id,
            unblock,
        } => handle_block(&engine, user_id, author_id, unblock).await?,
        Commands::Benchmark {
            requests,
            concurrent,
        } => handle_benchmark(engine.clone(), store.user_ids(), requests, concurrent).await?,
    }

    engine.shutdown().await;
    Ok(())
}

/// Handle the 'recommend' command
async fn handle_recommend(
    engine: &FeedEngine,
    viewer: Option<UserId>,
    scene: Scene,
    page: usize,
    page_size: usize,
    explain: bool,
) -> Result<()> {
    let request = FeedRequest::new(viewer, scene).with_page(page, page_size);
    let start = Instant::now();
    let feed = engine.recommend(&request).await?;
    debug!("Served in {:?}", start.elapsed());

    print_page(&feed, explain);
    Ok(())
}

/// Handle the 'user' command
async fn handle_user(engine: &FeedEngine, store: &dyn VideoStore, user_id: UserId) -> Result<()> {
    let user = store
        .get_user(user_id)
        .await
        .map_err(|_| anyhow!("User {} not found", user_id))?;
    let feature = engine.features().user_feature(user_id).await?;

    println!("{}", format!("User ID: {}", user_id).bold().blue());
    println!("{}Nickname: {}", "• ".green(), user.nickname);
    println!("{}Gender: {:?}", "• ".green(), user.gender);
    println!("{}Location: {} {}", "• ".green(), user.province, user.city);
    match feature.age {
        Some(age) => println!("{}Age: {}", "• ".green(), age),
        None => println!("{}Age: unknown", "• ".green()),
    }

    println!("{}Active days (30d): {}", "• ".cyan(), feature.active_days);
    println!("{}Avg watch time: {:.1}s", "• ".cyan(), feature.avg_watch_time);
    println!("{}Avg completion: {:.2}", "• ".cyan(), feature.avg_completion);
    println!(
        "{}Like / comment / share rate: {:.2} / {:.2} / {:.2}",
        "• ".cyan(),
        feature.like_rate,
        feature.comment_rate,
        feature.share_rate
    );
    if !feature.active_hours.is_empty() {
        let hours: Vec<String> = feature
            .active_hours
            .iter()
            .map(|h| format!("{:02}:00", h))
            .collect();
        println!("{}Active hours (UTC): {}", "• ".cyan(), hours.join(", "));
    }

    let mut interests: Vec<_> = feature.interests.iter().collect();
    interests.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
    println!("Category interests:");
    if interests.is_empty() {
        println!("  (none yet)");
    }
    for (category, score) in interests {
        println!("  - category {}: {:.3}", category, score);
    }
    Ok(())
}

/// Handle the 'video' command
async fn handle_video(engine: &FeedEngine, video_id: VideoId) -> Result<()> {
    let feature = engine.features().video_feature_by_id(video_id).await?;

    println!(
        "{}",
        format!("Video {}: {}", video_id, feature.title).bold().blue()
    );
    println!("{}Owner: {}", "• ".green(), feature.owner_id);
    println!("{}Category: {}", "• ".green(), feature.category_id);
    println!("{}Duration: {}s", "• ".green(), feature.duration);
    if !feature.tags.is_empty() {
        println!("{}Tags: {}", "• ".green(), feature.tags.join(", "));
    }
    println!("{}Quality: {:.1}", "• ".cyan(), feature.quality_score);
    println!("{}Hot score: {:.1}", "• ".cyan(), feature.hot_score);
    println!("{}Freshness: {:.3}", "• ".cyan(), feature.freshness);
    println!(
        "{}Like / comment / share rate: {:.3} / {:.3} / {:.3}",
        "• ".cyan(),
        feature.like_rate,
        feature.comment_rate,
        feature.share_rate
    );
    println!(
        "{}Yesterday: finish {:.2}, avg watch {:.1}s, ctr {:.3}",
        "• ".cyan(),
        feature.finish_rate,
        feature.avg_watch_time,
        feature.ctr
    );
    Ok(())
}

/// Handle the 'event' command
async fn handle_event(engine: &FeedEngine, store: &dyn VideoStore, event: BehaviorEvent) -> Result<()> {
    let video = store
        .get_video(event.video_id)
        .await
        .map_err(|_| anyhow!("Video {} not found", event.video_id))?;
    let (user_id, event_id, action) = (event.user_id, event.id, event.action);

    engine.update_user_profile(user_id, event).await?;
    engine.flush_interests().await;

    if let Some(letter) = engine
        .dead_letters()
        .into_iter()
        .find(|letter| letter.event_id == event_id)
    {
        println!(
            "{} Interest update failed: {}",
            "✗".red(),
            letter.reason
        );
        return Ok(());
    }

    let score = store
        .get_interest(user_id, video.category_id)
        .await?
        .map(|record| record.score)
        .unwrap_or(0.0);
    println!(
        "{} Recorded {} of video {} by user {}; category {} interest is now {:.3}",
        "✓".green(),
        action.as_str(),
        video.id,
        user_id,
        video.category_id,
        score
    );
    Ok(())
}

/// Handle the 'block' command
async fn handle_block(engine: &FeedEngine, user_id: UserId, author_id: UserId, unblock: bool) -> Result<()> {
    if unblock {
        engine.unblock_author(user_id, author_id).await?;
        println!("{} User {} unblocked author {}", "✓".green(), user_id, author_id);
    } else {
        engine.block_author(user_id, author_id).await?;
        println!("{} User {} blocked author {}", "✓".green(), user_id, author_id);
    }
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(
    engine: Arc<FeedEngine>,
    user_ids: Vec<UserId>,
    requests: usize,
    concurrent: usize,
) -> Result<()> {
    if requests == 0 {
        return Err(anyhow!("benchmark needs at least one request"));
    }

    // Random known viewers, with an anonymous request when there are none
    let viewers: Vec<Option<UserId>> = (0..requests)
        .map(|_| user_ids.choose(&mut rand::rng()).copied())
        .collect();

    let permits = Arc::new(Semaphore::new(concurrent.max(1)));
    let wall_clock = Instant::now();
    let mut handles = vec![];
    for viewer in viewers {
        let engine = engine.clone();
        let permits = permits.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let start = Instant::now();
            engine.recommend(&FeedRequest::new(viewer, Scene::Feed)).await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings = vec![];
    for handle in handles {
        timings.push(handle.await??);
    }
    let total_time = wall_clock.elapsed();

    timings.sort();
    let sum: Duration = timings.iter().sum();
    let avg_latency = sum / timings.len() as u32;
    let throughput = requests as f64 / total_time.as_secs_f64();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} concurrent)", requests, concurrent.max(1));
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(&timings, 0.50));
    println!("P95 latency: {:?}", percentile(&timings, 0.95));
    println!("P99 latency: {:?}", percentile(&timings, 0.99));
    println!("Throughput: {:.2} requests/second", throughput);

    Ok(())
}

/// Nearest-rank percentile of sorted timings.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Print a served page
fn print_page(feed: &FeedPage, explain: bool) {
    println!(
        "{}",
        format!(
            "Feed page {} ({} of {} videos):",
            feed.page,
            feed.items.len(),
            feed.total
        )
        .bold()
        .blue()
    );
    if feed.items.is_empty() {
        println!("  (nothing to show)");
    }

    let offset = (feed.page - 1) * feed.page_size;
    for (i, item) in feed.items.iter().enumerate() {
        println!(
            "{}. [{}] {} (category {}, {}s) - Score: {:.3}",
            (offset + i + 1).to_string().green(),
            item.id(),
            item.video.title,
            item.video.category_id,
            item.video.duration,
            item.score
        );
        if explain {
            print_explanation(item);
        }
    }

    if explain {
        let mut sources: Vec<_> = feed.recall.per_source.iter().collect();
        sources.sort_by_key(|(source, _)| source.as_str());
        let summary: Vec<String> = sources
            .iter()
            .map(|(source, count)| format!("{}={}", source.as_str(), count))
            .collect();
        println!("Recall: {} ({} pooled)", summary.join(", "), feed.recall.total);
        if !feed.recall.failed.is_empty() {
            let failed: Vec<&str> = feed.recall.failed.iter().map(|s| s.as_str()).collect();
            println!("{} Failed strategies: {}", "!".yellow(), failed.join(", "));
        }
    }
}

fn print_explanation(item: &ScoredCandidate) {
    let b = &item.breakdown;
    println!(
        "   source={} ctr={:.3} completion={:.3} engagement={:.3} hot={:.3} freshness={:.3}",
        item.source.as_str(),
        b.ctr,
        b.completion,
        b.engagement,
        b.hot,
        b.freshness
    );
}
