//! Socket connection lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use qim_core::Frame;
use qim_rpc::{DispatchError, Dispatcher};
use qim_session::SessionConnector;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::{handle_call, parse_call};
use super::registry::ConnectionRegistry;
use crate::config::GatewayConfig;
use crate::metrics::{
    WS_CONNECT_FAILURES_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL,
};

const MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a connection needs, shared by all connections.
pub struct ConnectionContext {
    /// Gateway configuration (discovery URL, limits, heartbeat).
    pub config: Arc<GatewayConfig>,
    /// Opens the per-connection session.
    pub connector: Arc<dyn SessionConnector>,
    /// Routes calls.
    pub dispatcher: Arc<Dispatcher>,
    /// Open connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Root shutdown token; each connection runs under a child of it.
    pub shutdown: CancellationToken,
}

/// Run a socket connection for a freshly upgraded client.
///
/// 1. Opens a private session against the discovery URL; on failure sends
///    one `error` event and closes
/// 2. Spawns each inbound `call` onto a bounded per-connection task set
/// 3. Forwards replies and periodic pings through a single writer task
/// 4. On close or shutdown aborts in-flight calls and closes the session
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_connection(ws: WebSocket, client_id: String, ctx: Arc<ConnectionContext>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let max_in_flight = ctx.config.max_in_flight.max(1);
    let (send_tx, mut send_rx) = mpsc::channel::<String>(max_in_flight * 2);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    // Unopened → Open
    let session = match ctx.connector.connect(&ctx.config.discovery_url).await {
        Ok(session) => session,
        Err(err) => {
            let err = DispatchError::from(err);
            warn!(url = %ctx.config.discovery_url, error = %err, "failed to open session");
            counter!(WS_CONNECT_FAILURES_TOTAL).increment(1);
            let _ = connection.close();
            if let Some(json) = error_event(&err) {
                let _ = ws_tx.send(Message::Text(json.into())).await;
            }
            let _ = ws_tx.close().await;
            return;
        }
    };
    let _ = connection.open();

    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    ctx.registry.add(Arc::clone(&connection)).await;
    info!("client connected");

    let cancel = ctx.shutdown.child_token();

    // Outbound writer with periodic pings.
    let outbound_conn = Arc::clone(&connection);
    let outbound_cancel = cancel.clone();
    let ping_interval = ctx.config.ping_interval().max(MIN_PING_INTERVAL);
    let pong_timeout = ctx.config.pong_timeout();
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if !outbound_conn.check_alive() && outbound_conn.last_pong_elapsed() > pong_timeout {
                        warn!(?pong_timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        outbound_cancel.cancel();
        let _ = ws_tx.close().await;
    });

    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut calls = JoinSet::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("connection cancelled");
                break;
            }
            Some(joined) = calls.join_next(), if !calls.is_empty() => {
                if let Some(e) = joined.err().filter(JoinError::is_panic) {
                    warn!(error = %e, "call task panicked");
                }
            }
            inbound = ws_rx.next() => {
                let Some(Ok(msg)) = inbound else { break };
                connection.mark_alive();

                let text = match msg {
                    Message::Text(t) => t.as_str().to_owned(),
                    Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(s) => s,
                        Err(_) => {
                            info!(len = data.len(), "ignoring non-UTF8 binary frame");
                            continue;
                        }
                    },
                    Message::Close(_) => {
                        info!("client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                let permit = tokio::select! {
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                    () = cancel.cancelled() => break,
                };

                let conn = Arc::clone(&connection);
                let dispatcher = Arc::clone(&ctx.dispatcher);
                let session = Arc::clone(&session);
                let _ = calls.spawn(async move {
                    let reply = match parse_call(&text) {
                        Ok(request) => handle_call(request, &dispatcher, session.as_ref()).await,
                        Err(rejected) => {
                            debug!(error = %rejected.error, "rejected inbound frame");
                            rejected.into_reply()
                        }
                    };
                    match Frame::reply(&reply) {
                        Ok(frame) => {
                            if !conn.send_frame(&frame).await {
                                debug!("reply not delivered, connection closed");
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to encode reply"),
                    }
                    drop(permit);
                });
            }
        }
    }

    // Open → Closed
    let _ = connection.close();
    let aborted = calls.len();
    calls.shutdown().await;
    outbound.abort();
    session.close().await;
    ctx.registry.remove(&client_id).await;

    let duration = connection.open_duration().unwrap_or_default();
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(duration.as_secs_f64());
    info!(
        aborted_calls = aborted,
        duration_secs = duration.as_secs_f64(),
        "client disconnected"
    );
}

/// JSON text of the `error` event sent when the session cannot be opened.
fn error_event(err: &DispatchError) -> Option<String> {
    Frame::error(&err.to_error_body())
        .and_then(|frame| frame.to_json())
        .map_err(|e| warn!(error = %e, "failed to encode error event"))
        .ok()
}

#[cfg(test)]
mod tests {
    // Connection lifecycle tests need real sockets and live in
    // tests/integration.rs. Unit tests here cover the helpers.
    use super::*;
    use qim_rpc::errors::CONNECTION_ERROR;
    use qim_session::SessionError;

    #[test]
    fn error_event_shape() {
        let err = DispatchError::from(SessionError::Connection {
            url: "http://nowhere".into(),
            message: "connection refused".into(),
        });
        let json = error_event(&err).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["name"], "error");
        assert_eq!(parsed["args"][0]["kind"], CONNECTION_ERROR);
        assert!(
            parsed["args"][0]["detail"]
                .as_str()
                .unwrap()
                .contains("connection refused")
        );
    }
}
