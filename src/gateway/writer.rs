//! Write pump: the only task that touches the socket sink.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Forwards queued messages to the socket until cancelled or the queue closes,
/// then sends a close frame.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = sink.send(msg).await {
                    error!(error = %e, "gateway write failed");
                    break;
                }
            }
        }
    }

    let _ = sink.send(tungstenite::Message::Close(None)).await;
}
