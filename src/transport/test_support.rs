//! Scripted companion peer for transport tests.

use std::sync::Once;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub(crate) fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Reply policy answering every `ping` command with a pong at `timestamp`.
pub(crate) fn pong_reply(timestamp: u64) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    move |frame: &str| {
        frame.contains(r#""command":"ping""#).then(|| {
            format!(r#"{{"success":true,"data":{{"pong":true,"timestamp":{timestamp}}}}}"#)
        })
    }
}

enum PeerAction {
    Push(String),
    Close,
}

/// A WebSocket server on `127.0.0.1:0` that serves one connection at a
/// time, records every text frame and answers through a reply policy.
pub(crate) struct ScriptedPeer {
    host: String,
    received: mpsc::UnboundedReceiver<String>,
    actions: mpsc::UnboundedSender<PeerAction>,
}

impl ScriptedPeer {
    pub(crate) async fn start<F>(reply: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind peer");
        let host = listener.local_addr().expect("peer addr").to_string();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (actions, mut action_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();

                loop {
                    tokio::select! {
                        message = read.next() => match message {
                            Some(Ok(Message::Text(text))) => {
                                let text = text.as_str().to_string();
                                if let Some(answer) = reply(&text) {
                                    let _ = write.send(Message::Text(answer.into())).await;
                                }
                                let _ = received_tx.send(text);
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            _ => {}
                        },
                        action = action_rx.recv() => match action {
                            Some(PeerAction::Push(text)) => {
                                let _ = write.send(Message::Text(text.into())).await;
                            }
                            Some(PeerAction::Close) => {
                                let _ = write.close().await;
                                break;
                            }
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            host,
            received,
            actions,
        }
    }

    /// Address to configure the bridge with.
    pub(crate) fn host(&self) -> String {
        self.host.clone()
    }

    /// Sends a raw text frame to the connected bridge.
    pub(crate) fn push(&self, text: &str) {
        let _ = self.actions.send(PeerAction::Push(text.to_string()));
    }

    /// Closes the current connection from the peer side.
    pub(crate) fn close(&self) {
        let _ = self.actions.send(PeerAction::Close);
    }

    /// Next frame the bridge sent, waiting up to two seconds.
    pub(crate) async fn next_frame(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .ok()
            .flatten()
    }
}
