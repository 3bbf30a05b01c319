use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use garuda_kv::{CompactionStats, FileKv};
use garuda_store::{BackendConfig, FeedItem, Post, RecordStore, StoreConfig, UserRecord};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

/// Log file used when neither `--data` nor the config names one.
pub const DEFAULT_DATA_PATH: &str = "garuda.log";

/// What a command produced, before rendering.
#[derive(Debug)]
pub enum Output {
    Done(String),
    User(UserRecord),
    Posts { username: String, posts: Vec<Post> },
    Following { username: String, users: Vec<String> },
    Pruned { username: String, users: Vec<String> },
    Feed { username: String, items: Vec<FeedItem> },
    Compacted(CompactionStats),
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli.config.as_deref(), cli.data.as_deref())?;
    let kv = open_kv(&config)?;
    let store = RecordStore::new(Arc::clone(&kv), config);

    let output = execute(&store, &kv, cli.command).await?;
    println!("{}", render(&output, cli.format));
    Ok(())
}

/// Load the config file (if any) and point the backend at a log file.
pub fn resolve_config(config: Option<&Path>, data: Option<&Path>) -> anyhow::Result<StoreConfig> {
    let mut config = match config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };

    config.backend = match (config.backend, data) {
        (BackendConfig::File { sync, .. }, Some(data)) => BackendConfig::File {
            path: data.to_path_buf(),
            sync,
        },
        (BackendConfig::Memory, Some(data)) => BackendConfig::File {
            path: data.to_path_buf(),
            sync: Default::default(),
        },
        (file @ BackendConfig::File { .. }, None) => file,
        (BackendConfig::Memory, None) => BackendConfig::File {
            path: PathBuf::from(DEFAULT_DATA_PATH),
            sync: Default::default(),
        },
    };
    config.validate()?;
    Ok(config)
}

fn open_kv(config: &StoreConfig) -> anyhow::Result<Arc<FileKv>> {
    let BackendConfig::File { path, sync } = &config.backend else {
        anyhow::bail!("the command line needs a file backend");
    };
    debug!(path = %path.display(), ?sync, "opening record log");
    let kv = FileKv::open(path, *sync)
        .with_context(|| format!("opening record log {}", path.display()))?;
    Ok(Arc::new(kv))
}

pub async fn execute(
    store: &RecordStore<FileKv>,
    kv: &FileKv,
    command: Command,
) -> anyhow::Result<Output> {
    let output = match command {
        Command::User(args) => match args.action {
            UserAction::Create {
                username,
                password_hash,
            } => {
                store.create(&username, &password_hash).await?;
                Output::Done(format!("Created user {username}"))
            }
            UserAction::Show { username } => Output::User(store.get(&username).await?),
            UserAction::Passwd {
                username,
                password_hash,
            } => {
                store.update_credential(&username, &password_hash).await?;
                Output::Done(format!("Updated credential for {username}"))
            }
            UserAction::Delete { username } => {
                store.delete(&username).await?;
                Output::Done(format!("Deleted user {username}"))
            }
        },
        Command::Post(args) => match args.action {
            PostAction::Create {
                username,
                title,
                content,
            } => {
                store.create_post(&username, &title, &content).await?;
                Output::Done(format!("Posted {title} as {username}"))
            }
            PostAction::List { username } => {
                let posts = store.list_posts(&username).await?;
                Output::Posts { username, posts }
            }
            PostAction::Update {
                username,
                title,
                content,
            } => {
                store.update_post(&username, &title, &content).await?;
                Output::Done(format!("Updated {title} for {username}"))
            }
            PostAction::Delete { username, title } => {
                store.delete_post(&username, &title).await?;
                Output::Done(format!("Deleted {title} for {username}"))
            }
        },
        Command::Follow(args) => match args.action {
            FollowAction::Add { follower, followee } => {
                store.add_following(&follower, &followee).await?;
                Output::Done(format!("{follower} now follows {followee}"))
            }
            FollowAction::List { username } => {
                let users = store.list_following(&username).await?;
                Output::Following { username, users }
            }
            FollowAction::Remove { follower, followee } => {
                store.remove_following(&follower, &followee).await?;
                Output::Done(format!("{follower} no longer follows {followee}"))
            }
            FollowAction::Prune { username } => {
                let users = store.prune_following(&username).await?;
                Output::Pruned { username, users }
            }
        },
        Command::Feed(args) => {
            let items = store.feed(&args.username).await?;
            Output::Feed {
                username: args.username,
                items,
            }
        }
        Command::Compact => Output::Compacted(kv.compact()?),
    };
    Ok(output)
}

pub fn render(output: &Output, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => render_text(output),
        OutputFormat::Json => render_json(output).to_string(),
    }
}

fn render_text(output: &Output) -> String {
    match output {
        Output::Done(msg) => format!("{} {msg}", "✓".green().bold()),
        Output::User(record) => {
            let mut out = format!("User {}\n", record.username().as_str().yellow().bold());
            out.push_str(&format!("  Posts: {}\n", record.posts().len()));
            out.push_str(&format!("  Following: {}", record.following_count()));
            for followee in record.following() {
                out.push_str(&format!("\n    {}", followee.as_str().cyan()));
            }
            out
        }
        Output::Posts { username, posts } => {
            if posts.is_empty() {
                return format!("{} has no posts.", username.yellow());
            }
            posts
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{} {}\n    {}", format!("#{}", i + 1).dimmed(), p.title.bold(), p.content))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Output::Following { username, users } => {
            if users.is_empty() {
                return format!("{} follows nobody.", username.yellow());
            }
            users
                .iter()
                .map(|u| format!("  {}", u.cyan()))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Output::Pruned { username, users } => {
            if users.is_empty() {
                format!("{} Nothing to prune for {}.", "✓".green(), username.yellow())
            } else {
                format!(
                    "{} Pruned {} from {}",
                    "✓".green().bold(),
                    users.join(", ").cyan(),
                    username.yellow()
                )
            }
        }
        Output::Feed { username, items } => {
            if items.is_empty() {
                return format!("Nothing in {}'s feed.", username.yellow());
            }
            items
                .iter()
                .map(|i| format!("{} {}\n    {}", i.author.cyan(), i.title.bold(), i.content))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Output::Compacted(stats) => format!(
            "{} Compacted: {} records, {} → {} bytes",
            "✓".green().bold(),
            stats.live_keys,
            stats.bytes_before,
            stats.bytes_after
        ),
    }
}

fn render_json(output: &Output) -> serde_json::Value {
    match output {
        Output::Done(msg) => json!({ "ok": true, "message": msg }),
        Output::User(record) => json!({
            "username": record.username().as_str(),
            "posts": record.posts(),
            "following": record.following().map(|u| u.as_str()).collect::<Vec<_>>(),
        }),
        Output::Posts { username, posts } => json!({ "username": username, "posts": posts }),
        Output::Following { username, users } => json!({ "username": username, "following": users }),
        Output::Pruned { username, users } => json!({ "username": username, "pruned": users }),
        Output::Feed { username, items } => json!({ "username": username, "feed": items }),
        Output::Compacted(stats) => json!({
            "live_keys": stats.live_keys,
            "bytes_before": stats.bytes_before,
            "bytes_after": stats.bytes_after,
        }),
    }
}
