use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Frames queued per connection before `send` starts dropping and
/// `send_wait` starts waiting.
pub const OUTBOUND_CAPACITY: usize = 256;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// -----------------------------------------------------------------------------
// ----- Outbound --------------------------------------------------------------

/// A frame on its way to the socket's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
}

// -----------------------------------------------------------------------------
// ----- ConnectionHandle ------------------------------------------------------

/// Write side of one live WebSocket.
///
/// Cloning is cheap; clones feed the same writer task. `send` never blocks: a
/// full or closed channel drops the frame and bumps `dropped()`. `send_wait`
/// waits for room instead. Closing is signalled beside the queue, so it is
/// never lost to a full channel.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    principal: i64,
    tx: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    dropped: Arc<AtomicU64>,
}

impl ConnectionHandle {
    /// New handle for `principal` plus the outbox its writer task drains.
    pub fn channel(principal: i64) -> (Self, Outbox) {
        Self::with_capacity(principal, OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(principal: i64, capacity: usize) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity);
        let closed = CancellationToken::new();

        let handle = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            principal,
            tx,
            closed: closed.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (handle, Outbox { rx, closed })
    }

    /// Process-unique connection id. Distinguishes successive connections of
    /// the same principal.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn principal(&self) -> i64 {
        self.principal
    }

    pub fn send(&self, frame: Outbound) -> bool {
        if !self.closed.is_cancelled() && self.tx.try_send(frame).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Outbound::Text(text.into()))
    }

    /// Queue `frame`, waiting while the outbox is full. False once the
    /// connection is closed or its writer is gone.
    pub async fn send_wait(&self, frame: Outbound) -> bool {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => false,
            sent = self.tx.send(frame) => sent.is_ok(),
        }
    }

    /// Ask the writer to send a close frame and stop. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once `close` has been called on any clone.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// -----------------------------------------------------------------------------
// ----- Outbox ----------------------------------------------------------------

/// Read side of a connection's outbound queue, owned by its writer task.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
}

impl Outbox {
    /// Next frame to write. `None` once the connection is closed or every
    /// handle is gone; a close wins over frames still queued.
    pub async fn next(&mut self) -> Option<Outbound> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            frame = self.rx.recv() => frame,
        }
    }

    pub fn try_recv(&mut self) -> Result<Outbound, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
