mod settings;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use courier_core::processors::{
    InMemoryUsageStore, QUESTION_SYNC_QUEUE, QuestionTaskProcessor, QuestionTaskProducer,
    RedisUsageStore, UsageStore,
};
use courier_core::{
    InMemoryQueueProvider, QueueProvider, RedisQueueProvider, Worker, WorkerManager,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Queue-backed background workers for question usage sync", long_about = None)]
struct Cli {
    /// Path to a JSON settings file
    #[arg(long, env = "COURIER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Redis URL, overrides the settings file
    #[arg(long, env = "COURIER_REDIS_URL", global = true)]
    redis_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start every configured worker and run until a shutdown signal
    Run {
        /// Use an in-memory queue seeded with sample tasks instead of Redis
        #[arg(long)]
        demo: bool,
    },
    /// Enqueue one question task
    Push {
        #[arg(value_enum)]
        kind: PushKind,
        #[arg(long)]
        user: u64,
        /// Question id for study/practice, project id for usage
        #[arg(long)]
        target: u64,
        #[arg(long, default_value = QUESTION_SYNC_QUEUE)]
        queue: String,
    },
    /// Print the number of tasks waiting in a queue
    Len {
        #[arg(long, default_value = QUESTION_SYNC_QUEUE)]
        queue: String,
    },
    /// Print the stored counters for one user and question or project
    Usage {
        #[arg(value_enum)]
        kind: UsageKind,
        #[arg(long)]
        user: u64,
        #[arg(long)]
        target: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UsageKind {
    Question,
    Project,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PushKind {
    Study,
    Practice,
    Usage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(url) = cli.redis_url {
        settings.redis_url = url;
    }

    match cli.command {
        Command::Run { demo } => run(settings, demo).await,
        Command::Push {
            kind,
            user,
            target,
            queue,
        } => push(&settings, kind, user, target, queue).await,
        Command::Len { queue } => {
            let provider = connect(&settings).await?;
            println!("{}", provider.length(&queue).await?);
            Ok(())
        }
        Command::Usage { kind, user, target } => show_usage(&settings, kind, user, target).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<RedisQueueProvider> {
    RedisQueueProvider::connect(&settings.redis_url, settings.redis.pool_config())
        .await
        .context("connect to redis")
}

fn usage_store(settings: &Settings, provider: &RedisQueueProvider) -> RedisUsageStore {
    RedisUsageStore::new(provider.pool().clone()).with_dedup_ttl(settings.usage_dedup_ttl())
}

async fn run(settings: Settings, demo: bool) -> anyhow::Result<()> {
    // demo keeps everything in process; otherwise queue and counters share one pool
    let queue: Arc<dyn QueueProvider>;
    let store: Arc<dyn UsageStore>;
    let mut demo_store = None;
    if demo {
        let memory_queue = Arc::new(InMemoryQueueProvider::new());
        seed_demo(memory_queue.clone()).await?;
        let memory_store = Arc::new(InMemoryUsageStore::new());
        demo_store = Some(memory_store.clone());
        queue = memory_queue;
        store = memory_store;
    } else {
        let provider = connect(&settings).await?;
        store = Arc::new(usage_store(&settings, &provider));
        queue = Arc::new(provider);
    }
    info!(action = "usage_store_selected", persistent = !demo, "usage store ready");

    let processor = Arc::new(QuestionTaskProcessor::new(store));

    let mut manager = WorkerManager::new();
    for entry in &settings.workers {
        let mut worker = Worker::new(entry.worker_config(), processor.clone(), queue.clone())?;
        if let Some(backoff) = &entry.backoff {
            worker = worker.with_retry_policy(backoff.policy());
        }
        manager.register_worker(entry.name.clone(), worker)?;
    }

    let root = CancellationToken::new();
    manager.start_all(&root)?;
    info!(
        action = "courier_started",
        workers = ?manager.names(),
        demo,
        "workers running"
    );

    match signals::wait_for_shutdown_signal().await {
        Ok(signal) => info!(action = "shutdown_signal_received", signal, "shutting down"),
        Err(e) => error!(
            action = "shutdown_signal_failed",
            error = %e,
            "cannot listen for signals, shutting down"
        ),
    }

    root.cancel();
    if let Err(e) = manager.stop_all(settings.shutdown_timeout()).await {
        warn!(
            action = "shutdown_incomplete",
            failed = ?e.failed_workers(),
            "exiting with workers still running"
        );
    }

    if let Some(store) = demo_store {
        log_demo_summary(&store).await;
    }
    info!(action = "courier_stopped", "shutdown complete");
    Ok(())
}

async fn push(
    settings: &Settings,
    kind: PushKind,
    user: u64,
    target: u64,
    queue_key: String,
) -> anyhow::Result<()> {
    let queue: Arc<dyn QueueProvider> = Arc::new(connect(settings).await?);
    let producer = QuestionTaskProducer::new(queue).with_queue_key(queue_key);

    let delivery_id = match kind {
        PushKind::Study => producer.record_study(user, target).await?,
        PushKind::Practice => producer.record_practice(user, target).await?,
        PushKind::Usage => producer.record_usage(user, target).await?,
    };
    println!("{delivery_id}");
    Ok(())
}

async fn show_usage(
    settings: &Settings,
    kind: UsageKind,
    user: u64,
    target: u64,
) -> anyhow::Result<()> {
    let provider = connect(settings).await?;
    let store = usage_store(settings, &provider);
    match kind {
        UsageKind::Question => match store.question_usage(user, target).await? {
            Some(row) => println!(
                "study_count={} practice_count={} last_studied_at={} last_practiced_at={}",
                row.study_count,
                row.practice_count,
                row.last_studied_at.map_or_else(|| "-".to_string(), |at| at.to_rfc3339()),
                row.last_practiced_at.map_or_else(|| "-".to_string(), |at| at.to_rfc3339()),
            ),
            None => println!("no usage recorded"),
        },
        UsageKind::Project => match store.project_usage(user, target).await? {
            Some(row) => println!(
                "usage_count={} last_used_at={}",
                row.usage_count,
                row.last_used_at.to_rfc3339()
            ),
            None => println!("no usage recorded"),
        },
    }
    Ok(())
}

const DEMO_USERS: [u64; 2] = [1, 2];
const DEMO_QUESTION: u64 = 101;
const DEMO_PROJECT: u64 = 7;

async fn seed_demo(queue: Arc<InMemoryQueueProvider>) -> anyhow::Result<()> {
    let producer = QuestionTaskProducer::new(queue);
    for user in DEMO_USERS {
        producer.record_study(user, DEMO_QUESTION).await?;
        producer.record_practice(user, DEMO_QUESTION).await?;
        producer.record_usage(user, DEMO_PROJECT).await?;
    }
    info!(
        action = "demo_seeded",
        queue_key = producer.queue_key(),
        tasks = DEMO_USERS.len() * 3,
        "sample tasks enqueued"
    );
    Ok(())
}

async fn log_demo_summary(store: &InMemoryUsageStore) {
    for user in DEMO_USERS {
        let question = store.question_usage(user, DEMO_QUESTION).await;
        let project = store.project_usage(user, DEMO_PROJECT).await;
        info!(
            action = "demo_summary",
            user_id = user,
            study_count = question.as_ref().map_or(0, |q| q.study_count),
            practice_count = question.as_ref().map_or(0, |q| q.practice_count),
            usage_count = project.as_ref().map_or(0, |p| p.usage_count),
            "usage after shutdown"
        );
    }
}
