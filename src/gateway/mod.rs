//! Gateway protocol client.
//!
//! Maintains the authenticated real-time connection: heartbeat cadence,
//! identify handshake, invalid-session recovery, and unbounded reconnection
//! with capped exponential backoff. `MESSAGE_CREATE` events from monitored
//! channels are turned into [`crate::download::AttachmentDescriptor`]s and
//! handed to an [`crate::download::AttachmentHandler`] on their own tasks.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashSet;
//! use std::sync::Arc;
//!
//! use archiver_core::download::{DownloadPipeline, HttpClient, SizeClassifier};
//! use archiver_core::gateway::{GatewayClient, GatewayConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Arc::new(DownloadPipeline::new(
//!     HttpClient::new(),
//!     SizeClassifier::default(),
//!     "./archive",
//!     None,
//! ));
//! let config = GatewayConfig::new("token", HashSet::from([123_u64]));
//! let client = GatewayClient::new(config, pipeline);
//! client.connect().await?;
//! // ... later
//! client.cleanup().await;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod client;
mod error;
mod heartbeat;
pub mod protocol;
mod state;
mod writer;

pub use backoff::{Backoff, DEFAULT_RECONNECT_BASE, DEFAULT_RECONNECT_CAP};
pub use client::{DEFAULT_GATEWAY_URL, GatewayClient, GatewayConfig, GatewayTimings};
pub use error::GatewayError;
pub use protocol::DEFAULT_INTENTS;
pub use state::{ConnectionPhase, GatewayStatus, StatusSnapshot};
