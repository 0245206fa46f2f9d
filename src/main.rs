use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use feedlist::bus::EventBus;
use feedlist::config::Config;
use feedlist::feed::build_client;
use feedlist::list::{ChannelList, DropOutcome};
use feedlist::model::{ChannelEntity, CountAction, CountDelta};
use feedlist::source::LocalSource;
use feedlist::storage::{Database, DatabaseError};
use feedlist::util::validate_feed_url;

/// Get the config directory path (~/.config/feedlist/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedlist"))
}

#[derive(Parser, Debug)]
#[command(name = "feedlist", about = "Channel list, unread counters and bulk sync for RSS feeds")]
struct Args {
    /// Config file (default: ~/.config/feedlist/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the channel list with unread counts
    List,
    /// Subscribe to a feed
    AddFeed {
        url: String,
        #[arg(long)]
        title: Option<String>,
        /// Folder uuid to place the channel in
        #[arg(long, value_name = "UUID")]
        folder: Option<String>,
    },
    /// Create a folder
    AddFolder { title: String },
    /// Sync every channel and folder
    Refresh,
    /// Move a top-level entity to INDEX, or into a folder
    Move {
        uuid: String,
        index: usize,
        #[arg(long, value_name = "UUID")]
        into_folder: Option<String>,
    },
    /// Mark every article of a channel read
    MarkRead { uuid: String },
    /// Set how many syncs run at once during a refresh
    Threads { count: usize },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let db_path = match args.db.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)
                    .context("Failed to create config directory")?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Err(e) = std::fs::set_permissions(
                        &config_dir,
                        std::fs::Permissions::from_mode(0o700),
                    ) {
                        tracing::warn!(
                            path = %config_dir.display(),
                            error = %e,
                            "Failed to set config directory permissions to 0700"
                        );
                    }
                }
            }
            config_dir.join("feedlist.db")
        }
    };

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of feedlist appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let options = config.fetch_options();
    let client = build_client(&options).context("Failed to build HTTP client")?;
    let source = Arc::new(LocalSource::new(db.clone(), client, options));
    let mut list = ChannelList::new(source, config.count_traversal, config.settle_delay());
    list.reload().await.context("Failed to load channel list")?;

    let bus = EventBus::new(config.bus_capacity);
    let reloads = bus.subscribe_reload();
    let counts = bus.subscribe_counts();

    match args.command {
        Command::List => {}
        Command::AddFeed { url, title, folder } => {
            let url = validate_feed_url(&url)?;
            let title = title.unwrap_or_else(|| url.host_str().unwrap_or("Untitled").to_string());
            let uuid = db
                .insert_channel(url.as_str(), &title, None, folder.as_deref())
                .await
                .context("Failed to add feed")?;
            println!("Added channel {uuid}");
            bus.request_reload();
        }
        Command::AddFolder { title } => {
            let uuid = db.insert_folder(&title).await.context("Failed to add folder")?;
            println!("Added folder {uuid}");
            bus.request_reload();
        }
        Command::Refresh => {
            match list.refresh_and_wait().await? {
                Some(report) => println!(
                    "Synced {} of {} ({} failed)",
                    report.succeeded, report.total, report.failed
                ),
                None => println!("Refresh did not complete"),
            }
        }
        Command::Move {
            uuid,
            index,
            into_folder,
        } => {
            if let Some(folder) = &into_folder {
                db.move_channel_to_folder(&uuid, Some(folder))
                    .await
                    .context("Failed to move channel into folder")?;
            }
            list.move_entity(&uuid, index, into_folder.is_some())?;
            match list.drop_completed(&uuid, &uuid).await {
                DropOutcome::PersistFailed(e) => eprintln!("Warning: order not saved: {e}"),
                DropOutcome::Persisted | DropOutcome::Ignored => {}
            }
            if into_folder.is_some() {
                bus.request_reload();
            }
        }
        Command::MarkRead { uuid } => {
            let marked = db
                .mark_channel_read(&uuid)
                .await
                .context("Failed to mark channel read")?;
            println!("Marked {marked} articles read");
            let amount = i64::try_from(marked).unwrap_or(i64::MAX);
            bus.publish_count(CountDelta::new(uuid, CountAction::Decrease, amount));
        }
        Command::Threads { count } => {
            db.set_sync_threads(count)
                .await
                .context("Failed to save thread count")?;
            println!("Refresh will run {count} syncs at once");
            return Ok(());
        }
    }

    // Publishers are gone once the bus drops, so run drains and returns
    drop(bus);
    list.run(reloads, counts).await;

    print_list(list.entities());
    Ok(())
}

fn print_list(entities: &[ChannelEntity]) {
    if entities.is_empty() {
        println!("No channels. Add one with `feedlist add-feed URL`.");
        return;
    }
    for entity in entities {
        println!(
            "{:>3}  {:<7} {}  {} ({})",
            entity.sort(),
            entity.item_type(),
            entity.uuid(),
            entity.title(),
            entity.unread()
        );
        if let ChannelEntity::Folder(folder) = entity {
            for child in &folder.children {
                println!(
                    "          channel {}  {} ({})",
                    child.uuid, child.title, child.unread
                );
            }
        }
    }
}
