//! Heartbeat pump: periodic liveness frames for one socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::protocol::GatewayFrame;
use super::state::GatewayStatus;

/// Shortest heartbeat period honored; smaller hello intervals are raised to it.
pub(crate) const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Builds the heartbeat message for the current sequence.
pub(crate) fn heartbeat_message(status: &GatewayStatus) -> tungstenite::Message {
    tungstenite::Message::Text(GatewayFrame::heartbeat(status.last_sequence()).to_text().into())
}

/// Sends a heartbeat every `interval` until cancelled or the writer closes.
///
/// The first heartbeat goes out one full interval after hello. A heartbeat
/// sent while the previous one is still unacknowledged is logged; the socket
/// is kept open regardless.
pub(crate) async fn heartbeat_pump(
    interval: Duration,
    status: Arc<GatewayStatus>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let interval = if interval < MIN_HEARTBEAT_INTERVAL {
        warn!(
            requested_ms = interval.as_millis(),
            "heartbeat interval too short, using minimum"
        );
        MIN_HEARTBEAT_INTERVAL
    } else {
        interval
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let unacked = status.record_heartbeat_sent();
                if unacked > 0 {
                    warn!(unacked, "previous heartbeat was not acknowledged");
                }
                trace!(seq = ?status.last_sequence(), "sending heartbeat");
                if write_tx.send(heartbeat_message(&status)).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn text_of(message: tungstenite::Message) -> Value {
        let tungstenite::Message::Text(text) = message else {
            panic!("expected text frame");
        };
        serde_json::from_str(text.as_str()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_heartbeat_after_one_interval() {
        let (tx, mut rx) = mpsc::channel(16);
        let status = Arc::new(GatewayStatus::new());
        let cancel = CancellationToken::new();
        let interval = Duration::from_millis(45_000);

        let handle = tokio::spawn(heartbeat_pump(interval, status.clone(), tx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(44_000)).await;
        assert!(rx.try_recv().is_err(), "heartbeat sent too early");

        let first = tokio::time::timeout(Duration::from_millis(2_000), rx.recv())
            .await
            .expect("heartbeat within interval")
            .unwrap();
        assert_eq!(text_of(first), json!({"op": 1, "d": null}));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_carries_last_sequence_and_counts_unacked() {
        let (tx, mut rx) = mpsc::channel(16);
        let status = Arc::new(GatewayStatus::new());
        status.record_sequence(7);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(heartbeat_pump(
            Duration::from_millis(1_000),
            status.clone(),
            tx,
            cancel.clone(),
        ));

        let first = rx.recv().await.unwrap();
        assert_eq!(text_of(first), json!({"op": 1, "d": 7}));
        let _second = rx.recv().await.unwrap();
        assert_eq!(status.snapshot().unacked_heartbeats, 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let (tx, mut rx) = mpsc::channel(16);
        let status = Arc::new(GatewayStatus::new());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(heartbeat_pump(
            Duration::ZERO,
            status.clone(),
            tx,
            cancel.clone(),
        ));

        tokio::time::sleep(MIN_HEARTBEAT_INTERVAL - Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err(), "heartbeat sent before the minimum period");

        let first = tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("heartbeat at the minimum period")
            .unwrap();
        assert_eq!(text_of(first), json!({"op": 1, "d": null}));
        assert!(!handle.is_finished(), "pump should keep running");

        cancel.cancel();
        handle.await.expect("pump must not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_pump_stops_when_writer_closes() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let status = Arc::new(GatewayStatus::new());
        let handle = tokio::spawn(heartbeat_pump(
            MIN_HEARTBEAT_INTERVAL,
            status,
            tx,
            CancellationToken::new(),
        ));
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
