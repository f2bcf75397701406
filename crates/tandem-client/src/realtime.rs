//! Client end of the realtime socket.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use tandem_shared::protocol::ServerEvent;

use crate::error::Result;

/// A live socket. Decoded events arrive through [`RealtimeConnection::next_event`]
/// in the order the server sent them.
pub struct RealtimeConnection {
    events: mpsc::UnboundedReceiver<ServerEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeConnection {
    /// Connect to a full `ws://…/ws?token=…` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        info!("Realtime socket connected");

        let (mut write, mut read) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                    frame = read.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => match ServerEvent::from_json(&text) {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "Ignoring undecodable event"),
                        },
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Realtime socket failed");
                            break;
                        }
                    },
                }
            }
            debug!("Realtime socket task finished");
        });

        Ok(Self {
            events: rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Next event, or `None` once the socket has closed.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    /// Send a close frame and wait for the reader to stop.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Realtime socket closed");
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
