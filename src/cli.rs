//! CLI argument definitions using clap derive macros.
//!
//! Every option can also be supplied through its environment variable, which
//! is how the archiver is usually configured in a container.

use std::path::PathBuf;

use clap::Parser;
use clap::builder::BoolishValueParser;

use crate::dedup::DEFAULT_CACHE_CAPACITY;
use crate::download::{DEFAULT_MAX_IMAGE_SIZE, DEFAULT_MAX_VIDEO_SIZE};
use crate::gateway::DEFAULT_GATEWAY_URL;
use crate::health::DEFAULT_HEALTH_PORT;

/// Archive media attachments posted to monitored channels.
///
/// Connects to the gateway, downloads image and video attachments into a
/// date-partitioned folder tree, and discards content it has already saved.
#[derive(Parser, Debug)]
#[command(name = "attachment-archiver")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Bot token used to identify with the gateway
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Comma-separated channel ids to monitor
    #[arg(long = "channel-ids", env = "CHANNEL_IDS", value_delimiter = ',')]
    pub channel_ids: Vec<String>,

    /// Root folder for saved attachments
    #[arg(long, env = "SAVE_PATH", default_value = "./downloads")]
    pub save_path: PathBuf,

    /// Smallest image to keep, in bytes
    #[arg(long, env = "MIN_IMAGE_SIZE", default_value_t = 0)]
    pub min_image_size: u64,

    /// Largest image to keep, in bytes
    #[arg(long, env = "MAX_IMAGE_SIZE", default_value_t = DEFAULT_MAX_IMAGE_SIZE)]
    pub max_image_size: u64,

    /// Smallest video to keep, in bytes
    #[arg(long, env = "MIN_VIDEO_SIZE", default_value_t = 0)]
    pub min_video_size: u64,

    /// Largest video to keep, in bytes
    #[arg(long, env = "MAX_VIDEO_SIZE", default_value_t = DEFAULT_MAX_VIDEO_SIZE)]
    pub max_video_size: u64,

    /// Comma-separated author ids or usernames to ignore
    #[arg(long = "blacklisted-users", env = "BLACKLISTED_USERS", value_delimiter = ',')]
    pub blacklisted_users: Vec<String>,

    /// Number of digests kept in the in-memory duplicate cache
    #[arg(long, env = "CACHE_SIZE", default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_size: usize,

    /// SQLite connection string for the durable digest store (e.g. sqlite:hashes.db)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Discard downloads whose content was already saved
    #[arg(
        long,
        env = "ENABLE_DEDUP",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub enable_dedup: bool,

    /// Port for the /health status endpoint
    #[arg(long, env = "HEALTH_PORT", default_value_t = DEFAULT_HEALTH_PORT)]
    pub health_port: u16,

    /// Gateway websocket URL
    #[arg(long, env = "GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,
}
