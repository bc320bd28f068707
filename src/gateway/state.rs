//! Connection phase and shared gateway status.
//!
//! [`GatewayStatus`] is written by the connection tasks and read by the
//! health endpoint. Readers take a [`StatusSnapshot`] so they never hold the
//! lock across an await.

use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Lifecycle phase of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    /// Socket opened, no frame received yet.
    Connecting,
    /// A frame other than hello arrived first.
    AwaitingHello,
    /// Heartbeating; identify pending or sent.
    Identifying,
    /// `READY` (or `RESUMED`) received.
    Connected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct StatusInner {
    phase: ConnectionPhase,
    session_id: Option<String>,
    username: Option<String>,
    last_sequence: Option<u64>,
    last_ack: Option<Instant>,
    unacked_heartbeats: u32,
    heartbeats_sent: u64,
    reconnects: u64,
}

/// Point-in-time copy of [`GatewayStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub phase: ConnectionPhase,
    pub session_id: Option<String>,
    pub username: Option<String>,
    pub last_sequence: Option<u64>,
    pub last_ack: Option<Instant>,
    pub unacked_heartbeats: u32,
    pub heartbeats_sent: u64,
    pub reconnects: u64,
}

impl StatusSnapshot {
    /// Healthy when connected and the last heartbeat ack is younger than
    /// `max_ack_age` at `now`.
    #[must_use]
    pub fn is_healthy(&self, now: Instant, max_ack_age: Duration) -> bool {
        self.phase == ConnectionPhase::Connected
            && self
                .last_ack
                .is_some_and(|ack| now.saturating_duration_since(ack) <= max_ack_age)
    }
}

/// Shared, thread-safe gateway status.
#[derive(Debug)]
pub struct GatewayStatus {
    inner: RwLock<StatusInner>,
}

impl Default for GatewayStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayStatus {
    /// A status in the `Disconnected` phase with no session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StatusInner {
                phase: ConnectionPhase::Disconnected,
                session_id: None,
                username: None,
                last_sequence: None,
                last_ack: None,
                unacked_heartbeats: 0,
                heartbeats_sent: 0,
                reconnects: 0,
            }),
        }
    }

    // Writers never leave the state half-updated, so a poisoned lock is
    // still consistent.
    fn read(&self) -> RwLockReadGuard<'_, StatusInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StatusInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies the current status.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.read();
        StatusSnapshot {
            phase: inner.phase,
            session_id: inner.session_id.clone(),
            username: inner.username.clone(),
            last_sequence: inner.last_sequence,
            last_ack: inner.last_ack,
            unacked_heartbeats: inner.unacked_heartbeats,
            heartbeats_sent: inner.heartbeats_sent,
            reconnects: inner.reconnects,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.read().phase
    }

    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.read().last_sequence
    }

    pub(crate) fn set_phase(&self, phase: ConnectionPhase) {
        self.write().phase = phase;
    }

    /// Fresh socket: no session, no sequence, heartbeat bookkeeping cleared.
    pub(crate) fn begin_socket(&self, is_reconnect: bool) {
        let mut inner = self.write();
        inner.phase = ConnectionPhase::Connecting;
        inner.session_id = None;
        inner.last_sequence = None;
        inner.unacked_heartbeats = 0;
        if is_reconnect {
            inner.reconnects += 1;
        }
    }

    /// A new identify starts a new session numbering.
    pub(crate) fn begin_identify(&self) {
        let mut inner = self.write();
        inner.session_id = None;
        inner.last_sequence = None;
    }

    pub(crate) fn clear_session(&self) {
        self.write().session_id = None;
    }

    pub(crate) fn record_ready(&self, session_id: String, username: String) {
        let mut inner = self.write();
        inner.phase = ConnectionPhase::Connected;
        inner.session_id = Some(session_id);
        inner.username = Some(username);
    }

    /// Captures a sequence number; never moves backwards.
    pub(crate) fn record_sequence(&self, sequence: u64) {
        let mut inner = self.write();
        inner.last_sequence = Some(inner.last_sequence.map_or(sequence, |s| s.max(sequence)));
    }

    /// Counts an outgoing heartbeat, returning how many were already unacked.
    pub(crate) fn record_heartbeat_sent(&self) -> u32 {
        let mut inner = self.write();
        let previously_unacked = inner.unacked_heartbeats;
        inner.unacked_heartbeats = inner.unacked_heartbeats.saturating_add(1);
        inner.heartbeats_sent += 1;
        previously_unacked
    }

    pub(crate) fn record_ack(&self) {
        self.record_ack_at(Instant::now());
    }

    pub(crate) fn record_ack_at(&self, at: Instant) {
        let mut inner = self.write();
        inner.last_ack = Some(at);
        inner.unacked_heartbeats = 0;
    }
}
