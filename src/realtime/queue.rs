use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::streams::StreamReadReply;
use redis::{AsyncCommands, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::cli::EventsConfig;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Stream entry field holding the JSON event.
pub const PAYLOAD_FIELD: &str = "payload";

const READ_BLOCK: Duration = Duration::from_secs(5);
const READ_COUNT: usize = 64;

// -----------------------------------------------------------------------------
// ----- EventSource -----------------------------------------------------------

/// One queued message. `id` is what gets acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub body: Bytes,
}

/// At-least-once event feed with manual acknowledgement.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next message. `Ok(None)` means the source is finished.
    async fn next(&mut self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError>;
}

// -----------------------------------------------------------------------------
// ----- RedisStreamSource -----------------------------------------------------

/// Consumer-group reader over a Redis stream.
///
/// Starts by replaying this consumer's pending entries (delivered before a
/// restart but never acknowledged), then switches to new entries.
pub struct RedisStreamSource {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    cursor: Cursor,
    buffered: VecDeque<Delivery>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Pending,
    New,
}

impl Cursor {
    fn as_id(self) -> &'static str {
        match self {
            Cursor::Pending => "0",
            Cursor::New => ">",
        }
    }
}

impl RedisStreamSource {
    pub async fn connect(url: &str, events: &EventsConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection_manager().await?;

        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&events.stream, &events.group, "0")
            .await;

        match created {
            Ok(()) => info!(stream = %events.stream, group = %events.group, "created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            conn,
            stream: events.stream.clone(),
            group: events.group.clone(),
            consumer: events.consumer.clone(),
            cursor: Cursor::Pending,
            buffered: VecDeque::new(),
        })
    }
}

#[async_trait]
impl EventSource for RedisStreamSource {
    async fn next(&mut self) -> Result<Option<Delivery>, QueueError> {
        loop {
            if let Some(delivery) = self.buffered.pop_front() {
                return Ok(Some(delivery));
            }

            let read = self.read_batch().await?;
            if read == 0 && self.cursor == Cursor::Pending {
                debug!(stream = %self.stream, "pending entries replayed");
                self.cursor = Cursor::New;
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        let _: i64 = self
            .conn
            .xack(&self.stream, &self.group, &[&delivery.id])
            .await?;
        Ok(())
    }
}

impl RedisStreamSource {
    async fn read_batch(&mut self) -> Result<usize, QueueError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(READ_COUNT);

        if self.cursor == Cursor::New {
            cmd.arg("BLOCK").arg(READ_BLOCK.as_millis() as u64);
        }

        cmd.arg("STREAMS").arg(&self.stream).arg(self.cursor.as_id());

        let reply: Option<StreamReadReply> = cmd.query_async(&mut self.conn).await?;
        let Some(reply) = reply else {
            return Ok(0);
        };

        let mut read = 0;
        for key in reply.keys {
            for entry in key.ids {
                let body = match entry.map.get(PAYLOAD_FIELD) {
                    Some(Value::BulkString(bytes)) => Bytes::from(bytes.clone()),
                    Some(Value::SimpleString(s)) => Bytes::from(s.clone()),
                    _ => Bytes::new(),
                };

                self.buffered.push_back(Delivery { id: entry.id, body });
                read += 1;
            }
        }

        Ok(read)
    }
}

// -----------------------------------------------------------------------------
// ----- In-process queue ------------------------------------------------------

/// Channel-backed queue with the same contract as the Redis source.
pub fn memory_queue() -> (MemoryPublisher, MemorySource) {
    let (tx, rx) = mpsc::unbounded_channel();
    let acked = Arc::new(Mutex::new(Vec::new()));

    let publisher = MemoryPublisher {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
        acked: acked.clone(),
    };

    (publisher, MemorySource { rx, acked })
}

#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<Delivery>,
    next_id: Arc<AtomicU64>,
    acked: Arc<Mutex<Vec<String>>>,
}

impl MemoryPublisher {
    /// Enqueue a raw body and return its delivery id.
    pub fn publish(&self, body: impl Into<Bytes>) -> Result<String, QueueError> {
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tx
            .send(Delivery {
                id: id.clone(),
                body: body.into(),
            })
            .map_err(|_| QueueError::Closed)?;
        Ok(id)
    }

    /// Ids acknowledged so far, in ack order.
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().clone()
    }
}

#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Delivery>,
    acked: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EventSource for MemorySource {
    async fn next(&mut self) -> Result<Option<Delivery>, QueueError> {
        Ok(self.rx.recv().await)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        self.acked.lock().push(delivery.id.clone());
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("malformed event {id}: {reason}")]
    MalformedMessage { id: String, reason: String },

    #[error("event queue unavailable: {0}")]
    Unavailable(String),

    #[error("event queue closed")]
    Closed,
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
