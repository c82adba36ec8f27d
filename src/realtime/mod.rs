//! Live WebSocket connections and the backend-event fanout that feeds them.

pub mod connection;
pub mod events;
pub mod fanout;
pub mod queue;
pub mod registry;
pub mod socket;

pub use connection::{ConnectionHandle, Outbound, Outbox};
pub use events::{EventKind, EventNotification};
pub use fanout::FanoutBridge;
pub use queue::{
    Delivery, EventSource, MemoryPublisher, MemorySource, QueueError, RedisStreamSource,
    memory_queue,
};
pub use registry::ConnectionRegistry;
pub use socket::run_connection;
