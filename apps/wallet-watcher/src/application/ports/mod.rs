//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamTransport`: Opens subscribe streams against the upstream service
//! - `StreamHandle`: One live stream; accepts requests and can be destroyed
//!
//! Transport events (data, error, end, close) travel back to the supervisor
//! through a [`SessionEventSink`] rather than callbacks, so every state
//! change is applied on the supervisor's own task.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::streaming::Notification;
use crate::domain::subscription::StreamRequest;
use crate::domain::watchlist::SlotIndex;

// =============================================================================
// Errors
// =============================================================================

/// Failure reported by the transport, with a status code and detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("code {code}, details: {detail}")]
pub struct TransportError {
    /// Canonical status code name (e.g. `UNAVAILABLE`).
    pub code: String,
    /// Human-readable detail.
    pub detail: String,
}

impl TransportError {
    /// Create a new transport error.
    #[must_use]
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
        }
    }

    /// Shorthand for an `UNAVAILABLE` error.
    #[must_use]
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new("UNAVAILABLE", detail)
    }
}

// =============================================================================
// Events
// =============================================================================

/// What happened on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    /// A notification arrived.
    Data(Notification),
    /// The stream failed.
    Error(TransportError),
    /// The server ended the stream.
    End,
    /// The stream is fully closed.
    Close,
}

/// An event tagged with the slot and handle generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Slot the stream belongs to.
    pub slot: SlotIndex,
    /// Generation of the handle that produced the event.
    pub generation: u64,
    /// The event.
    pub kind: SessionEventKind,
}

/// Event queue sender bound to one stream handle.
///
/// Sends never block; a closed queue means the supervisor has gone away and
/// the event is dropped.
#[derive(Debug, Clone)]
pub struct SessionEventSink {
    slot: SlotIndex,
    generation: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionEventSink {
    /// Bind a sink to a slot and handle generation.
    #[must_use]
    pub const fn new(
        slot: SlotIndex,
        generation: u64,
        tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            slot,
            generation,
            tx,
        }
    }

    /// Slot this sink reports for.
    #[must_use]
    pub const fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Handle generation this sink reports for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a notification.
    pub fn data(&self, notification: Notification) -> bool {
        self.emit(SessionEventKind::Data(notification))
    }

    /// Report a stream failure.
    pub fn error(&self, error: TransportError) -> bool {
        self.emit(SessionEventKind::Error(error))
    }

    /// Report a server-side end of stream.
    pub fn end(&self) -> bool {
        self.emit(SessionEventKind::End)
    }

    /// Report that the stream is closed.
    pub fn close(&self) -> bool {
        self.emit(SessionEventKind::Close)
    }

    fn emit(&self, kind: SessionEventKind) -> bool {
        self.tx
            .send(SessionEvent {
                slot: self.slot,
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

// =============================================================================
// Transport Ports
// =============================================================================

/// One live subscribe stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamHandle: Send {
    /// Send a request on the stream, resolving once it has been accepted
    /// for delivery.
    async fn send(&mut self, request: StreamRequest) -> Result<(), TransportError>;

    /// Request termination and resolve once the stream has terminated.
    ///
    /// An error here still means the stream is gone.
    async fn destroy(&mut self) -> Result<(), TransportError>;
}

/// Opens subscribe streams for session slots.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Handle type produced by [`open`](Self::open).
    type Handle: StreamHandle + 'static;

    /// Open a new stream for `slot`, reporting its events to `events`.
    async fn open(
        &self,
        slot: SlotIndex,
        events: SessionEventSink,
    ) -> Result<Self::Handle, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = TransportError::unavailable("connection reset");
        assert_eq!(err.to_string(), "code UNAVAILABLE, details: connection reset");
    }

    #[test]
    fn sink_tags_events_with_slot_and_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SessionEventSink::new(2, 7, tx);

        assert!(sink.end());
        assert!(sink.error(TransportError::new("INTERNAL", "boom")));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.slot, 2);
        assert_eq!(first.generation, 7);
        assert_eq!(first.kind, SessionEventKind::End);

        let second = rx.try_recv().unwrap();
        assert!(matches!(second.kind, SessionEventKind::Error(e) if e.code == "INTERNAL"));
    }

    #[test]
    fn sink_reports_closed_queue() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = SessionEventSink::new(0, 1, tx);
        drop(rx);

        assert!(!sink.close());
    }

    #[test]
    fn mock_handle_reports_send_failure() {
        let mut handle = MockStreamHandle::new();
        handle
            .expect_send()
            .returning(|_| Err(TransportError::unavailable("closed")));

        let err = tokio_test::block_on(handle.send(crate::domain::subscription::build_ping()))
            .unwrap_err();
        assert_eq!(err.code, "UNAVAILABLE");
    }
}
