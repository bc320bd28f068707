//! Validated runtime configuration.
//!
//! [`Config::from_args`] turns parsed [`Args`] into an immutable [`Config`].
//! Any problem is a [`ConfigError`], which the binary treats as fatal.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::cli::Args;
use crate::download::{MediaKind, SizeBounds, SizeClassifier};
use crate::gateway::GatewayConfig;

/// Configuration errors detected at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No token was supplied, or it is blank.
    #[error("a bot token is required (set DISCORD_TOKEN or pass --token)")]
    MissingToken,

    /// No channel ids were supplied.
    #[error("at least one channel id is required (set CHANNEL_IDS or pass --channel-ids)")]
    NoChannels,

    /// A channel id is not a numeric snowflake.
    #[error("invalid channel id '{value}': expected a numeric snowflake")]
    InvalidChannelId {
        /// The offending value.
        value: String,
    },

    /// A media class has `min > max`.
    #[error("{kind} size bounds are inverted: min {min} > max {max}")]
    InvertedBounds {
        /// The media class.
        kind: MediaKind,
        /// Configured minimum.
        min: u64,
        /// Configured maximum.
        max: u64,
    },

    /// The duplicate cache must hold at least one digest.
    #[error("cache size must be at least 1")]
    ZeroCacheSize,
}

/// Immutable runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub token: String,
    pub channel_ids: HashSet<u64>,
    pub save_path: PathBuf,
    pub image_bounds: SizeBounds,
    pub video_bounds: SizeBounds,
    pub blacklisted_users: HashSet<String>,
    pub cache_size: usize,
    pub database_url: Option<String>,
    pub enable_dedup: bool,
    pub health_port: u16,
    pub gateway_url: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("channel_ids", &self.channel_ids)
            .field("save_path", &self.save_path)
            .field("image_bounds", &self.image_bounds)
            .field("video_bounds", &self.video_bounds)
            .field("blacklisted_users", &self.blacklisted_users)
            .field("cache_size", &self.cache_size)
            .field("database_configured", &self.database_url.is_some())
            .field("enable_dedup", &self.enable_dedup)
            .field("health_port", &self.health_port)
            .field("gateway_url", &self.gateway_url)
            .finish()
    }
}

impl Config {
    /// Validates parsed arguments.
    ///
    /// Blank entries in the channel and blacklist lists are ignored, so a
    /// trailing comma is harmless.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let token = args
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?
            .to_string();

        let channel_ids = args
            .channel_ids
            .iter()
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .map(parse_snowflake)
            .collect::<Result<HashSet<u64>, _>>()?;
        if channel_ids.is_empty() {
            return Err(ConfigError::NoChannels);
        }

        let image_bounds = bounds(MediaKind::Image, args.min_image_size, args.max_image_size)?;
        let video_bounds = bounds(MediaKind::Video, args.min_video_size, args.max_video_size)?;

        if args.cache_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }

        let blacklisted_users = args
            .blacklisted_users
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();

        let database_url = args
            .database_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self {
            token,
            channel_ids,
            save_path: args.save_path.clone(),
            image_bounds,
            video_bounds,
            blacklisted_users,
            cache_size: args.cache_size,
            database_url,
            enable_dedup: args.enable_dedup,
            health_port: args.health_port,
            gateway_url: args.gateway_url.clone(),
        })
    }

    /// Classifier built from the per-class size bounds.
    #[must_use]
    pub fn classifier(&self) -> SizeClassifier {
        SizeClassifier::new(self.image_bounds, self.video_bounds)
    }

    /// Gateway settings: URL, token, channel filter, and blacklist.
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut gateway = GatewayConfig::new(self.token.clone(), self.channel_ids.clone());
        gateway.url.clone_from(&self.gateway_url);
        gateway.blacklisted_authors.clone_from(&self.blacklisted_users);
        gateway
    }
}

fn parse_snowflake(raw: &str) -> Result<u64, ConfigError> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::InvalidChannelId {
            value: raw.to_string(),
        });
    }
    raw.parse().map_err(|_| ConfigError::InvalidChannelId {
        value: raw.to_string(),
    })
}

fn bounds(kind: MediaKind, min: u64, max: u64) -> Result<SizeBounds, ConfigError> {
    if min > max {
        return Err(ConfigError::InvertedBounds { kind, min, max });
    }
    Ok(SizeBounds::new(min, max))
}
