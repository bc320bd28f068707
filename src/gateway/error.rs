//! Error types for the gateway module.

use thiserror::Error;

/// Errors surfaced by [`super::GatewayClient`].
///
/// Protocol events (reconnect, invalid session), handshake failures and socket
/// drops are handled internally by reconnecting and never reach the caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// `connect()` was called on a client that is already running.
    #[error("gateway client already started")]
    AlreadyStarted,

    /// `cleanup()` ran before any socket open completed.
    #[error("gateway client shut down before connecting")]
    Shutdown,
}
