//! Per-connection handler: open a session, then pump frames both ways.

use std::net::SocketAddr;

use codemate_common::{Envelope, ProtocolError};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::dispatcher::Dispatcher;

/// Handle a single WebSocket connection until either side closes it.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    dispatcher: Dispatcher,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let conn = dispatcher.open(tx).await;

    tracing::info!(peer = %addr, connection = conn, "Client connected");

    loop {
        tokio::select! {
            // Session output → this client's WebSocket
            Some(envelope) = rx.recv() => {
                let json = match envelope.encode() {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(connection = conn, error = %e, "dropping unencodable envelope");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            // Client frames → session
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        dispatcher.route(conn, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            dispatcher.route(conn, text).await;
                        }
                        Err(_) => {
                            let err = ProtocolError::Malformed("binary frame is not UTF-8".into());
                            dispatcher.reject(conn, &err).await;
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, connection = conn, "Client disconnected");
    dispatcher.close(conn).await;
}
