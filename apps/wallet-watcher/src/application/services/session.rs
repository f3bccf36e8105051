//! Stream Session
//!
//! One subscription slot. A session owns at most one live stream handle,
//! remembers the address group it was last assigned, and carries the
//! "reconnect needed" flag the supervisor's resolution pass consumes.
//!
//! # Transitions
//!
//! ```text
//! Idle ──start──► Connecting ──subscribe sent──► Active
//!   ▲                 │                             │
//!   │            open/send failed          error/end/close event,
//!   │                 ▼                    failed update or ping
//!   └──teardown── Degraded ◄────────────────────────┘
//! ```
//!
//! Every `start` first tears down the previous handle (Closing) and waits
//! for it to terminate, so a slot never has two live streams.
//!
//! A slot assigned an empty group holds no stream and stays Idle: an empty
//! `account_include` would match every transaction.

use tokio::sync::mpsc;

use crate::application::ports::{
    SessionEvent, SessionEventKind, SessionEventSink, StreamHandle, StreamTransport,
    TransportError,
};
use crate::domain::session::SessionState;
use crate::domain::subscription::{build_ping, build_subscribe};
use crate::domain::watchlist::{Address, SlotIndex};

// =============================================================================
// Errors and Outcomes
// =============================================================================

/// Errors from session operations. The session is already Degraded when
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Opening the stream failed.
    #[error("failed to open stream: {0}")]
    Open(TransportError),

    /// Sending the initial subscribe request failed.
    #[error("failed to send subscription: {0}")]
    Subscribe(TransportError),

    /// Sending a replacement subscribe request failed.
    #[error("failed to update subscription: {0}")]
    Update(TransportError),

    /// Sending a ping failed.
    #[error("failed to send ping: {0}")]
    Ping(TransportError),

    /// In-place update requested on a slot without a live handle.
    #[error("no live stream handle")]
    NoHandle,

    /// In-place update requested on a slot that is not Active.
    #[error("session is {0}, not active")]
    NotActive(SessionState),
}

impl SessionError {
    /// The underlying transport error, if any.
    #[must_use]
    pub const fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Open(e) | Self::Subscribe(e) | Self::Update(e) | Self::Ping(e) => Some(e),
            Self::NoHandle | Self::NotActive(_) => None,
        }
    }

    /// Short name for metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Subscribe(_) => "subscribe",
            Self::Update(_) => "update",
            Self::Ping(_) => "ping",
            Self::NoHandle => "no_handle",
            Self::NotActive(_) => "not_active",
        }
    }
}

/// Effect of applying a transport event to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event came from a handle that is no longer current.
    Stale,
    /// A notification was logged; state unchanged.
    Notified,
    /// The session is now Degraded.
    Degraded,
    /// The session was already Degraded; nothing changed.
    Unchanged,
}

// =============================================================================
// Stream Session
// =============================================================================

/// A single stream slot.
pub struct StreamSession<H> {
    slot: SlotIndex,
    state: SessionState,
    handle: Option<H>,
    reconnect_needed: bool,
    addresses: Vec<Address>,
    generation: u64,
    starts: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<H: StreamHandle> StreamSession<H> {
    /// Create an idle session for `slot` reporting events to `events`.
    #[must_use]
    pub const fn new(slot: SlotIndex, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            slot,
            state: SessionState::Idle,
            handle: None,
            reconnect_needed: false,
            addresses: Vec::new(),
            generation: 0,
            starts: 0,
            events,
        }
    }

    /// Slot index.
    #[must_use]
    pub const fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a stream handle is held.
    #[must_use]
    pub const fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether the next resolution pass must restart this slot.
    #[must_use]
    pub const fn reconnect_needed(&self) -> bool {
        self.reconnect_needed
    }

    /// Most recently assigned address group.
    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Generation of the current (or last) handle.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of times a stream was opened for this slot.
    #[must_use]
    pub const fn starts(&self) -> u64 {
        self.starts
    }

    /// Record a new address group without touching the stream.
    pub fn assign(&mut self, addresses: Vec<Address>) {
        self.addresses = addresses;
    }

    /// Flag the slot for restart on the next resolution pass.
    pub fn mark_degraded(&mut self) {
        self.state = SessionState::Degraded;
        self.reconnect_needed = true;
    }

    /// Clear the reconnect flag, returning whether it was set.
    pub fn take_reconnect(&mut self) -> bool {
        std::mem::replace(&mut self.reconnect_needed, false)
    }

    /// Destroy the current handle, if any, and wait for it to terminate.
    ///
    /// Returns `true` if a handle was torn down. Events the old handle
    /// emitted are ignored from here on.
    pub async fn teardown(&mut self) -> bool {
        let Some(mut handle) = self.handle.take() else {
            return false;
        };

        self.generation += 1;
        self.state = SessionState::Closing;

        match handle.destroy().await {
            Ok(()) => tracing::debug!(slot = self.slot, "Stream closed after destroy"),
            Err(e) => tracing::warn!(
                slot = self.slot,
                code = %e.code,
                detail = %e.detail,
                "Stream destroy error"
            ),
        }

        self.state = if self.reconnect_needed {
            SessionState::Degraded
        } else {
            SessionState::Idle
        };
        true
    }

    /// Tear down any existing stream, open a new one and subscribe it to
    /// `addresses`.
    ///
    /// With no addresses the slot is left Idle without opening a stream.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Open`] or [`SessionError::Subscribe`]; the
    /// session is then Degraded and holds no handle.
    pub async fn start<T>(
        &mut self,
        transport: &T,
        addresses: Vec<Address>,
    ) -> Result<(), SessionError>
    where
        T: StreamTransport<Handle = H>,
    {
        self.teardown().await;

        self.addresses = addresses;
        if self.addresses.is_empty() {
            self.leave_idle();
            return Ok(());
        }

        self.generation += 1;
        self.starts += 1;
        self.state = SessionState::Connecting;

        tracing::info!(
            slot = self.slot,
            accounts = self.addresses.len(),
            "Starting stream"
        );

        let sink = SessionEventSink::new(self.slot, self.generation, self.events.clone());
        let mut handle = match transport.open(self.slot, sink).await {
            Ok(handle) => handle,
            Err(e) => {
                self.mark_degraded();
                return Err(SessionError::Open(e));
            }
        };

        if let Err(e) = handle.send(build_subscribe(&self.addresses)).await {
            self.generation += 1;
            if let Err(destroy_err) = handle.destroy().await {
                tracing::debug!(
                    slot = self.slot,
                    error = %destroy_err,
                    "Destroy after failed subscribe also failed"
                );
            }
            self.mark_degraded();
            return Err(SessionError::Subscribe(e));
        }

        self.handle = Some(handle);
        self.state = SessionState::Active;
        tracing::info!(slot = self.slot, "Subscription sent");
        Ok(())
    }

    /// Restart with the most recently assigned group.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn restart<T>(&mut self, transport: &T) -> Result<(), SessionError>
    where
        T: StreamTransport<Handle = H>,
    {
        let addresses = std::mem::take(&mut self.addresses);
        self.start(transport, addresses).await
    }

    /// Replace the filter on the live stream without reconnecting.
    ///
    /// The group is recorded even when the update fails so the next
    /// restart uses it. An empty group tears the stream down and leaves the
    /// slot Idle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoHandle`], [`SessionError::NotActive`] or
    /// [`SessionError::Update`]; the session is then Degraded.
    pub async fn update_in_place(&mut self, addresses: Vec<Address>) -> Result<(), SessionError> {
        self.addresses = addresses;
        if self.addresses.is_empty() {
            self.teardown().await;
            self.leave_idle();
            return Ok(());
        }

        let state = self.state;
        let Some(handle) = self.handle.as_mut() else {
            self.mark_degraded();
            return Err(SessionError::NoHandle);
        };
        if !state.is_active() {
            self.mark_degraded();
            return Err(SessionError::NotActive(state));
        }

        match handle.send(build_subscribe(&self.addresses)).await {
            Ok(()) => {
                tracing::info!(
                    slot = self.slot,
                    accounts = self.addresses.len(),
                    "Updated subscription request (without destroying stream)"
                );
                Ok(())
            }
            Err(e) => {
                self.mark_degraded();
                Err(SessionError::Update(e))
            }
        }
    }

    fn leave_idle(&mut self) {
        self.state = SessionState::Idle;
        self.reconnect_needed = false;
        tracing::info!(slot = self.slot, "No accounts assigned, slot left idle");
    }

    /// Send a keepalive ping when Active.
    ///
    /// Returns `Ok(false)` when skipped because there is no live stream.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Ping`]; the session is then Degraded.
    pub async fn send_ping(&mut self) -> Result<bool, SessionError> {
        let active = self.state.is_active();
        let Some(handle) = self.handle.as_mut().filter(|_| active) else {
            return Ok(false);
        };

        match handle.send(build_ping()).await {
            Ok(()) => {
                tracing::debug!(slot = self.slot, "Sent ping");
                Ok(true)
            }
            Err(e) => {
                self.mark_degraded();
                Err(SessionError::Ping(e))
            }
        }
    }

    /// Apply an event reported by the handle of `generation`.
    pub fn apply_event(&mut self, generation: u64, kind: SessionEventKind) -> EventOutcome {
        if generation != self.generation || self.handle.is_none() {
            tracing::trace!(
                slot = self.slot,
                generation,
                current = self.generation,
                "Ignoring event from stale stream"
            );
            return EventOutcome::Stale;
        }

        let already_degraded = self.state == SessionState::Degraded;
        match kind {
            SessionEventKind::Data(notification) => {
                if notification.has_accounts() {
                    tracing::info!(
                        slot = self.slot,
                        tx_slot = notification.slot,
                        signature = notification.signature.as_deref().unwrap_or(""),
                        accounts = %notification.accounts.join(", "),
                        "Received data involving accounts"
                    );
                }
                return EventOutcome::Notified;
            }
            SessionEventKind::Error(e) => {
                tracing::warn!(
                    slot = self.slot,
                    code = %e.code,
                    detail = %e.detail,
                    "Stream error"
                );
            }
            SessionEventKind::End => tracing::info!(slot = self.slot, "Stream ended"),
            SessionEventKind::Close => tracing::info!(slot = self.slot, "Stream closed"),
        }

        self.mark_degraded();
        if already_degraded {
            EventOutcome::Unchanged
        } else {
            EventOutcome::Degraded
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
