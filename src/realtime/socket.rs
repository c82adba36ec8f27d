use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

use super::connection::{ConnectionHandle, Outbound, Outbox};
use super::registry::ConnectionRegistry;

// -----------------------------------------------------------------------------
// ----- Connection loop -------------------------------------------------------

/// Drive one authenticated, upgraded WebSocket until it goes away.
///
/// The socket is split: a writer task drains the handle's outbox, this task
/// reads. Text and binary frames are echoed back in arrival order; an echo
/// waits for room in the outbox, so a slow peer slows its own reads. Closing
/// the handle (a newer connection replaced this one) ends the loop. Whatever
/// ends it, the guard closes the handle and drops the registry entry if it is
/// still ours.
pub async fn run_connection(socket: WebSocket, principal: i64, registry: Arc<ConnectionRegistry>) {
    let (sink, mut stream) = socket.split();
    let (handle, outbound) = ConnectionHandle::channel(principal);
    let connection_id = handle.id();

    let writer = tokio::spawn(write_loop(sink, outbound));

    if let Some(replaced) = registry.insert(principal, handle.clone()) {
        debug!(principal, replaced = replaced.id(), "replacing previous connection");
        replaced.close();
    }

    let guard = ConnectionGuard {
        handle,
        registry,
    };

    info!(principal, connection_id, "websocket connected");

    loop {
        let frame = tokio::select! {
            biased;
            _ = guard.handle.closed() => {
                debug!(principal, connection_id, "connection closed by the gateway");
                break;
            }
            frame = stream.next() => frame,
        };

        let echo = match frame {
            Some(Ok(Message::Text(text))) => Outbound::Text(text.as_str().to_string()),
            Some(Ok(Message::Binary(data))) => Outbound::Binary(data),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(principal, connection_id, "websocket read error: {e}");
                break;
            }
        };

        if !guard.handle.send_wait(echo).await {
            break;
        }
    }

    drop(guard);
    let _ = writer.await;

    info!(principal, connection_id, "websocket disconnected");
}

// -----------------------------------------------------------------------------
// ----- Internal: Writer ------------------------------------------------------

/// Drains `outbox` into `sink`. Once the outbox ends (closed, or every handle
/// gone) a close frame goes out and the sink is shut.
async fn write_loop<S>(mut sink: S, mut outbox: Outbox)
where
    S: futures::Sink<Message> + Unpin,
{
    while let Some(frame) = outbox.next().await {
        let message = match frame {
            Outbound::Text(text) => Message::Text(text.into()),
            Outbound::Binary(data) => Message::Binary(data),
        };

        if sink.send(message).await.is_err() {
            return;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}

// -----------------------------------------------------------------------------
// ----- Internal: ConnectionGuard ---------------------------------------------

struct ConnectionGuard {
    handle: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.handle.close();
        self.registry
            .remove_if_current(self.handle.principal(), self.handle.id());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
