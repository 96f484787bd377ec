mod activity;
mod config;
mod net;
mod session;
mod store;
mod sync;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use activity::{ActivityKind, ActivityRecord, WriteOutcome};
use config::Config;
use net::HttpNetwork;
use session::Session;
use store::{CacheStore, PartitionNames, SqliteStore};
use sync::{Connectivity, OfflineClient, PendingQueue, SyncCoordinator};
use worker::{
  ClientMessage, EventReply, FetchOutcome, FetchRequest, ServeSource, ServiceWorker, WorkerEvent,
};

#[derive(Parser, Debug)]
#[command(name = "readsync")]
#[command(about = "Offline cache and activity sync engine for a light-novel reader")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/readsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show cache partitions and pending queue depth
  Status,
  /// Fetch and cache the static shell manifest
  Warm,
  /// Remove cache partitions left over from older versions
  Purge,
  /// Deliver all queued activities to the backend
  Drain,
  /// Run the page-load sequence: cache the shell, purge stale
  /// partitions, then sync pending activities
  Register,
  /// Route one GET through the cache layers and report the source
  Fetch {
    /// Absolute request URL
    url: String,
  },
  /// Store a chapter body for offline reading
  CacheChapter {
    /// Chapter identifier
    #[arg(long)]
    id: String,
    /// JSON file with the chapter content
    #[arg(long)]
    file: PathBuf,
  },
  /// Record one reading activity
  Record {
    /// One of: chapter-read, bookmark, rating, comment
    #[arg(long)]
    kind: String,
    #[arg(long)]
    story_id: String,
    #[arg(long)]
    story_title: String,
    #[arg(long)]
    details: Option<String>,
    /// Skip the immediate delivery attempt and queue directly
    #[arg(long)]
    offline: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let config = Config::load(args.config.as_deref())?;

  let store = Arc::new(match &config.store_path {
    Some(path) => SqliteStore::open(path)?,
    None => SqliteStore::open_default()?,
  });
  let net = Arc::new(HttpNetwork::new()?);
  let session = Config::get_api_token()
    .map(Session::with_token)
    .unwrap_or_else(|_| Session::anonymous());

  let names = PartitionNames::new(&config.cache_version);
  let queue = Arc::new(PendingQueue::new(store.clone(), &names.offline));
  let worker = ServiceWorker::new(
    store.clone(),
    net.clone(),
    queue.clone(),
    &config,
    session.clone(),
  );

  match args.command {
    Command::Status => {
      let partitions = store.partitions()?;
      if partitions.is_empty() {
        println!("cache is empty");
      }
      for partition in partitions {
        let marker = if names.is_current(&partition) { "" } else { " (stale)" };
        println!(
          "{:<28} {:>5} entries{}",
          partition,
          store.entry_count(&partition)?,
          marker
        );
      }
      println!("pending activities: {}", queue.len()?);
    }

    Command::Warm => {
      if let EventReply::Installed { cached } = worker.handle(WorkerEvent::Install).await? {
        println!("cached {} shell assets", cached);
      }
    }

    Command::Purge => {
      if let EventReply::Activated { purged } = worker.handle(WorkerEvent::Activate).await? {
        if purged.is_empty() {
          println!("no stale partitions");
        } else {
          for name in purged {
            println!("purged {}", name);
          }
        }
      }
    }

    Command::Drain => {
      let reply = worker
        .handle(WorkerEvent::Sync {
          tag: config.sync_tag.clone(),
        })
        .await?;
      if let EventReply::Synced { delivered } = reply {
        println!("delivered {} queued activities", delivered);
      }
    }

    Command::Register => {
      let client = OfflineClient::register(
        store.clone(),
        net.clone(),
        &config,
        session.clone(),
        Connectivity::Online,
      )
      .await?;
      client.coordinator.set_connectivity(Connectivity::Online).await;
      println!(
        "offline layer registered; pending activities: {}",
        queue.len()?
      );
    }

    Command::Fetch { url } => {
      let reply = worker
        .handle(WorkerEvent::Fetch(FetchRequest::get(url)))
        .await?;
      if let EventReply::Fetched(outcome) = reply {
        match outcome {
          FetchOutcome::PassThrough => println!("not intercepted"),
          FetchOutcome::Served(response) => {
            let source = match response.source {
              ServeSource::Network => "network",
              ServeSource::Cache => "cache",
            };
            println!("{} ({} bytes) from {}", response.status, response.body.len(), source);
          }
        }
      }
    }

    Command::CacheChapter { id, file } => {
      let raw = std::fs::read_to_string(&file)
        .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?;
      let content: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| eyre!("{} is not valid JSON: {}", file.display(), e))?;

      worker
        .handle(WorkerEvent::Message(ClientMessage::CacheChapter {
          chapter_id: id.clone(),
          content,
        }))
        .await?;
      println!("chapter {} cached for offline reading", id);
    }

    Command::Record {
      kind,
      story_id,
      story_title,
      details,
      offline,
    } => {
      let connectivity = if offline {
        Connectivity::Offline
      } else {
        Connectivity::Online
      };
      let coordinator = SyncCoordinator::new(net, queue, &config, session, connectivity);

      let record = ActivityRecord::new(parse_kind(&kind)?, story_id, story_title, details);
      match coordinator.record_activity(record).await {
        Ok(WriteOutcome::Delivered(_)) => println!("activity delivered"),
        Ok(WriteOutcome::Queued) => println!("activity queued for the next sync"),
        // The error chain says whether the record was queued for retry
        // or the fallback write itself failed.
        Err(e) => println!("delivery failed: {:#}", e),
      }
    }
  }

  Ok(())
}

fn parse_kind(raw: &str) -> Result<ActivityKind> {
  match raw {
    "chapter-read" => Ok(ActivityKind::ChapterRead),
    "bookmark" => Ok(ActivityKind::Bookmark),
    "rating" => Ok(ActivityKind::Rating),
    "comment" => Ok(ActivityKind::Comment),
    other => Err(eyre!(
      "Unknown activity kind '{}'. Use chapter-read, bookmark, rating or comment.",
      other
    )),
  }
}

/// Log to a daily-rolling file so command output stays clean.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("readsync")
    .join("logs");
  std::fs::create_dir_all(&log_dir).map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "readsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("readsync=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
