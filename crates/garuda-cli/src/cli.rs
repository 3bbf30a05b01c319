use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "garuda",
    about = "Garuda record store: accounts, posts and follows",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML store configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Record log file; overrides the configured backend path
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create, inspect, or delete accounts
    User(UserArgs),
    /// Manage a user's posts
    Post(PostArgs),
    /// Manage who a user follows
    Follow(FollowArgs),
    /// Show posts from everyone a user follows
    Feed(FeedArgs),
    /// Rewrite the record log keeping only live records
    Compact,
}

#[derive(Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub action: UserAction,
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a new account
    Create {
        username: String,
        /// Pre-hashed credential
        #[arg(long)]
        password_hash: String,
    },
    /// Show an account summary
    Show { username: String },
    /// Replace an account's credential
    Passwd {
        username: String,
        #[arg(long)]
        password_hash: String,
    },
    /// Delete an account and everything in it
    Delete { username: String },
}

#[derive(Args)]
pub struct PostArgs {
    #[command(subcommand)]
    pub action: PostAction,
}

#[derive(Subcommand)]
pub enum PostAction {
    /// Append a post
    Create {
        username: String,
        title: String,
        content: String,
    },
    /// List posts in order
    List { username: String },
    /// Replace the content of the first post with this title
    Update {
        username: String,
        title: String,
        content: String,
    },
    /// Delete the first post with this title
    Delete { username: String, title: String },
}

#[derive(Args)]
pub struct FollowArgs {
    #[command(subcommand)]
    pub action: FollowAction,
}

#[derive(Subcommand)]
pub enum FollowAction {
    /// Start following a user
    Add { follower: String, followee: String },
    /// List followed users
    List { username: String },
    /// Stop following a user
    Remove { follower: String, followee: String },
    /// Forget followed users that no longer exist
    Prune { username: String },
}

#[derive(Args)]
pub struct FeedArgs {
    pub username: String,
}
