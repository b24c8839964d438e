use super::handlers::{Handlers, ServerContentContext, UsageMetadataContext};
use crate::error::{PolarisError, Result};
use crate::types::{BidiGenerateContentSetup, ClientMessagePayload, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

pub(crate) struct ConnectionParams<S> {
    pub(crate) live_url: String,
    pub(crate) api_key: String,
    pub(crate) setup: BidiGenerateContentSetup,
    pub(crate) handlers: Arc<Handlers<S>>,
    pub(crate) state: Arc<S>,
}

/// Spawns the task that owns the socket. `ready_tx` resolves once the server
/// acknowledges the setup message, or with the error that prevented it.
pub(crate) fn spawn_processing_task<S: Clone + Send + Sync + 'static>(
    params: ConnectionParams<S>,
    ready_tx: oneshot::Sender<Result<()>>,
    shutdown_rx: oneshot::Receiver<()>,
    outgoing_rx: mpsc::Receiver<ClientMessagePayload>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ready_tx = Some(ready_tx);
        let result = run(params, &mut ready_tx, shutdown_rx, outgoing_rx).await;
        match result {
            Ok(()) => info!("[LiveConnection] Task finished."),
            Err(e) => {
                error!("[LiveConnection] Task ended with error: {}", e);
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(e));
                }
            }
        }
    })
}

async fn run<S: Clone + Send + Sync + 'static>(
    params: ConnectionParams<S>,
    ready_tx: &mut Option<oneshot::Sender<Result<()>>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut outgoing_rx: mpsc::Receiver<ClientMessagePayload>,
) -> Result<()> {
    ensure_crypto_provider();

    let url = Url::parse_with_params(&params.live_url, &[("key", params.api_key.as_str())])?;
    info!(
        "[LiveConnection] Connecting to {}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.path()
    );
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let setup_json = serde_json::to_string(&ClientMessagePayload::Setup(params.setup))?;
    debug!("[LiveConnection] Sending setup.");
    write.send(Message::Text(setup_json.into())).await?;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("[LiveConnection] Shutdown requested.");
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            outgoing = outgoing_rx.recv() => {
                match outgoing {
                    Some(payload) => {
                        let json = serde_json::to_string(&payload)?;
                        trace!("[LiveConnection] -> {} bytes", json.len());
                        write.send(Message::Text(json.into())).await?;
                    }
                    None => {
                        info!("[LiveConnection] All client handles dropped; closing.");
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = read.next() => {
                let raw = match incoming {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("[LiveConnection] Ignoring non-UTF-8 binary frame.");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!("[LiveConnection] Server closed the socket: {:?}", frame);
                        if let Some(tx) = ready_tx.take() {
                            let reason = frame
                                .map(|f| f.reason.as_str().to_string())
                                .unwrap_or_else(|| "closed before setup completed".to_string());
                            let _ = tx.send(Err(PolarisError::Api(reason)));
                        }
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        info!("[LiveConnection] Stream ended.");
                        break;
                    }
                };

                match serde_json::from_str::<ServerMessage>(&raw) {
                    Ok(message) => {
                        dispatch(message, &params.handlers, &params.state, ready_tx).await;
                    }
                    Err(e) => warn!("[LiveConnection] Unparseable server message: {}", e),
                }
            }
        }
    }
    Ok(())
}

async fn dispatch<S: Clone + Send + Sync + 'static>(
    message: ServerMessage,
    handlers: &Handlers<S>,
    state: &Arc<S>,
    ready_tx: &mut Option<oneshot::Sender<Result<()>>>,
) {
    if message.setup_complete.is_some() {
        info!("[LiveConnection] Setup complete.");
        if let Some(tx) = ready_tx.take() {
            let _ = tx.send(Ok(()));
        }
    }

    // Awaited inline so audio chunks reach the handler in arrival order.
    if let Some(content) = message.server_content {
        if let Some(handler) = &handlers.on_server_content {
            handler
                .call(ServerContentContext { content }, state.clone())
                .await;
        }
    }

    if let Some(metadata) = message.usage_metadata {
        if let Some(handler) = &handlers.on_usage_metadata {
            handler
                .call(UsageMetadataContext { metadata }, state.clone())
                .await;
        }
    }

    if let Some(go_away) = message.go_away {
        warn!(
            "[LiveConnection] Server will disconnect soon (time left: {:?}).",
            go_away.time_left
        );
    }

    if message.tool_call.is_some() {
        warn!("[LiveConnection] Received a tool call; no tools are declared, ignoring.");
    }
}

/// reqwest and rustls both pull in a crypto backend; pin one process-wide
/// before the first TLS handshake.
pub(crate) fn ensure_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}
