use anyhow::{Context, Result, bail};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;

/// One open socket, reduced to text frames in each direction.
///
/// Dropping `outgoing` closes the socket. `incoming` yields `None` once the
/// socket is closed from either side.
pub struct Channel {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

/// Opens chat sockets for an identity.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, identity: &str) -> BoxFuture<'static, Result<Channel>>;
}

/// [`Connector`] over a real WebSocket to the relay's `/ws` endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    server_url: String,
}

impl WsConnector {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.server_url.clone())
    }

    /// `<server_url>/ws?userId=<identity>`, with http(s) mapped to ws(s).
    pub fn session_url(&self, identity: &str) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => bail!("unsupported scheme '{}'", other),
        };
        if url.set_scheme(scheme).is_err() {
            bail!("cannot use scheme '{}' for '{}'", scheme, self.server_url);
        }

        let path = format!("{}/ws", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);
        url.query_pairs_mut().append_pair("userId", identity);
        Ok(url)
    }
}

impl Connector for WsConnector {
    fn open(&self, identity: &str) -> BoxFuture<'static, Result<Channel>> {
        let url = self.session_url(identity);
        Box::pin(async move {
            let url = url?;
            let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .with_context(|| format!("WS connect to {} failed", url))?;
            debug!("Connected to {}", url);

            let (mut ws_tx, mut ws_rx) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        outgoing = out_rx.recv() => match outgoing {
                            Some(text) => {
                                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                let _ = ws_tx.send(Message::Close(None)).await;
                                break;
                            }
                        },
                        incoming = ws_rx.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(text.as_str().to_string()).is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("WS read error: {}", e);
                                break;
                            }
                        },
                    }
                }
            });

            Ok(Channel {
                outgoing: out_tx,
                incoming: in_rx,
            })
        })
    }
}
