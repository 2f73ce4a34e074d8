//! # Event Bus System
//!
//! Broadcasts transfer and session lifecycle events using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Progress callbacks registered on a fetch task only reach the code that
//! started the task. The event bus mirrors the same lifecycle to any number
//! of independent observers (UI badges, download managers, audit logs):
//!
//! - **Event Types**: `CoreEvent` wrapping `TransferEvent` and `SessionEvent`
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Transfer(TransferEvent::Started {
//!         task_id: "task-1".to_string(),
//!         method: "GET".to_string(),
//!         url: "https://example.com/file.bin".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.task_id(), Some("task-1"));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Progress events are the usual cause; the subscriber can keep receiving.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Network or local-file transfer events
    Transfer(TransferEvent),
    /// File session events
    Session(SessionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Transfer(e) => e.description(),
            CoreEvent::Session(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Transfer(TransferEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Transfer(TransferEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::Disposed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Session(SessionEvent::Disposed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Task the event belongs to, if it is a transfer event.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Transfer(e) => Some(e.task_id()),
            CoreEvent::Session(_) => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Transfer Events
// ============================================================================

/// Events emitted over the life of a fetch task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TransferEvent {
    /// Task started; the request is about to be sent.
    Started {
        task_id: String,
        method: String,
        url: String,
    },
    /// Response headers arrived.
    StateChanged {
        task_id: String,
        /// Numeric task state code
        state: u8,
        /// HTTP status, or 200 for local-file transfers
        status: u16,
    },
    /// Download progress. `total` is `None` when the length is unknown.
    Progress {
        task_id: String,
        received: u64,
        total: Option<u64>,
    },
    /// Upload progress.
    UploadProgress {
        task_id: String,
        written: u64,
        total: Option<u64>,
    },
    /// Task finished and produced a response.
    Completed {
        task_id: String,
        status: u16,
        bytes: u64,
        /// Where the body was stored, if it went to disk
        path: Option<String>,
    },
    /// Task failed.
    Failed { task_id: String, message: String },
    /// Task was cancelled by the caller.
    Cancelled { task_id: String },
}

impl TransferEvent {
    fn description(&self) -> &str {
        match self {
            TransferEvent::Started { .. } => "Transfer started",
            TransferEvent::StateChanged { .. } => "Transfer state changed",
            TransferEvent::Progress { .. } => "Download in progress",
            TransferEvent::UploadProgress { .. } => "Upload in progress",
            TransferEvent::Completed { .. } => "Transfer completed",
            TransferEvent::Failed { .. } => "Transfer failed",
            TransferEvent::Cancelled { .. } => "Transfer cancelled",
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            TransferEvent::Started { task_id, .. }
            | TransferEvent::StateChanged { task_id, .. }
            | TransferEvent::Progress { task_id, .. }
            | TransferEvent::UploadProgress { task_id, .. }
            | TransferEvent::Completed { task_id, .. }
            | TransferEvent::Failed { task_id, .. }
            | TransferEvent::Cancelled { task_id } => task_id,
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Events emitted by file sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A session deleted its files and was unregistered.
    Disposed {
        name: String,
        /// Files deleted
        removed: usize,
        /// Files that could not be deleted
        failed: usize,
    },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::Disposed { .. } => "Session disposed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning is cheap; clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let task_events = EventStream::new(event_bus.subscribe()).for_task("task-1");
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only yield events matching `predicate`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only yield transfer events for one task.
    pub fn for_task(self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        self.filter(move |event| event.task_id() == Some(task_id.as_str()))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }

    /// Non-blocking receive; `None` when no matching event is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Some(Err(RecvError::Closed))
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
            };

            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Some(Ok(event)),
            }
        }
    }
}
