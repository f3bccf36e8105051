//! Geyser Stream Transport
//!
//! Implements [`StreamTransport`] over the Yellowstone `geyser.Geyser/Subscribe`
//! bidirectional stream.
//!
//! # Architecture
//!
//! Each slot gets its own lazily-connected channel so a failing HTTP/2
//! connection only takes down one slot. Opening a stream:
//!
//! 1. Starts the `Subscribe` call with an `mpsc`-backed request stream
//! 2. Spawns a reader task that turns updates into session events
//! 3. Returns a [`GeyserHandle`] that pushes requests and tears the call down
//!
//! `send` never waits: a full request buffer is `RESOURCE_EXHAUSTED` and a
//! closed one is `UNAVAILABLE`, so only the affected slot is degraded.
//!
//! The reader emits `End` then `Close` when the server finishes the stream,
//! `Error` then `Close` when the call fails, and only `Close` when the
//! handle is destroyed.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::codec::Streaming;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use super::proto::geyser_client::GeyserClient;
use super::proto::{self, subscribe_update::UpdateOneof};
use crate::application::ports::{SessionEventSink, StreamHandle, StreamTransport, TransportError};
use crate::domain::streaming::Notification;
use crate::domain::subscription::StreamRequest;
use crate::domain::watchlist::SlotIndex;
use crate::infrastructure::config::GeyserSettings;

/// Requests queued per stream before `send` reports `RESOURCE_EXHAUSTED`.
const REQUEST_BUFFER: usize = 16;

/// Largest update the client will decode.
const MAX_DECODING_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

// =============================================================================
// Errors
// =============================================================================

/// Failure building the transport.
#[derive(Debug, thiserror::Error)]
pub enum GeyserClientError {
    /// Endpoint URL or TLS setup rejected.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] tonic::transport::Error),
    /// Access token is not a valid header value.
    #[error("invalid x-token: {0}")]
    Token(#[from] tonic::metadata::errors::InvalidMetadataValue),
}

// =============================================================================
// Interceptor
// =============================================================================

/// Adds the `x-token` header to every call when a token is configured.
#[derive(Debug, Clone, Default)]
pub struct XTokenInterceptor {
    token: Option<AsciiMetadataValue>,
}

impl XTokenInterceptor {
    /// Create an interceptor for an optional token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token contains non-ASCII or control characters.
    pub fn new(token: Option<&str>) -> Result<Self, GeyserClientError> {
        let token = token.map(str::parse::<AsciiMetadataValue>).transpose()?;
        Ok(Self { token })
    }
}

impl Interceptor for XTokenInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        if let Some(token) = &self.token {
            request.metadata_mut().insert("x-token", token.clone());
        }
        Ok(request)
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Opens Geyser subscribe streams, one channel per slot.
#[derive(Debug, Clone)]
pub struct GeyserTransport {
    channels: Vec<Channel>,
    interceptor: XTokenInterceptor,
}

impl GeyserTransport {
    /// Build a transport with `slots` lazily-connected channels.
    ///
    /// No connection is made until the first stream is opened. Must be
    /// called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL, TLS setup, or token is invalid.
    pub fn new(settings: &GeyserSettings, slots: usize) -> Result<Self, GeyserClientError> {
        let endpoint = build_endpoint(settings)?;
        let channels = (0..slots.max(1)).map(|_| endpoint.connect_lazy()).collect();
        let interceptor = XTokenInterceptor::new(settings.x_token())?;

        tracing::info!(
            url = %settings.url,
            slots = slots.max(1),
            keepalive_interval = ?settings.keepalive.interval,
            keepalive_timeout = ?settings.keepalive.timeout,
            permit_without_calls = settings.keepalive.permit_without_calls,
            max_pings_without_data = settings.keepalive.max_pings_without_data,
            "Geyser transport configured"
        );

        Ok(Self {
            channels,
            interceptor,
        })
    }

    /// Number of channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn client(
        &self,
        slot: SlotIndex,
    ) -> GeyserClient<InterceptedService<Channel, XTokenInterceptor>> {
        let channel = self.channels[slot % self.channels.len()].clone();
        GeyserClient::with_interceptor(channel, self.interceptor.clone())
            .max_decoding_message_size(MAX_DECODING_MESSAGE_SIZE)
    }
}

fn build_endpoint(settings: &GeyserSettings) -> Result<Endpoint, GeyserClientError> {
    let keepalive = &settings.keepalive;
    let mut endpoint = Endpoint::from_shared(settings.url.clone())?
        .http2_keep_alive_interval(keepalive.interval)
        .keep_alive_timeout(keepalive.timeout)
        .keep_alive_while_idle(keepalive.permit_without_calls)
        .tcp_nodelay(true);

    if settings.url.starts_with("https://") {
        endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
    }

    Ok(endpoint)
}

#[async_trait]
impl StreamTransport for GeyserTransport {
    type Handle = GeyserHandle;

    async fn open(
        &self,
        slot: SlotIndex,
        events: SessionEventSink,
    ) -> Result<Self::Handle, TransportError> {
        let (requests, rx) = mpsc::channel(REQUEST_BUFFER);

        let updates = self
            .client(slot)
            .subscribe(ReceiverStream::new(rx))
            .await
            .map_err(|status| status_to_transport_error(&status))?
            .into_inner();

        tracing::debug!(slot, generation = events.generation(), "Subscribe stream opened");

        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_updates(updates, events, cancel.clone()));

        Ok(GeyserHandle {
            requests: Some(requests),
            cancel,
            reader: Some(reader),
        })
    }
}

// =============================================================================
// Handle
// =============================================================================

/// One live Geyser subscribe stream.
#[derive(Debug)]
pub struct GeyserHandle {
    requests: Option<mpsc::Sender<proto::SubscribeRequest>>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

#[async_trait]
impl StreamHandle for GeyserHandle {
    async fn send(&mut self, request: StreamRequest) -> Result<(), TransportError> {
        let Some(requests) = &self.requests else {
            return Err(TransportError::unavailable("stream destroyed"));
        };

        requests
            .try_send(proto::SubscribeRequest::from(&request))
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    TransportError::new("RESOURCE_EXHAUSTED", "request buffer full")
                }
                TrySendError::Closed(_) => TransportError::unavailable("request stream closed"),
            })
    }

    async fn destroy(&mut self) -> Result<(), TransportError> {
        // Dropping the sender half-closes the request stream.
        self.requests = None;
        self.cancel.cancel();

        if let Some(reader) = self.reader.take() {
            reader
                .await
                .map_err(|e| TransportError::new("INTERNAL", e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for GeyserHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Reader
// =============================================================================

async fn read_updates(
    mut updates: Streaming<proto::SubscribeUpdate>,
    events: SessionEventSink,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            message = updates.message() => match message {
                Ok(Some(update)) => forward_update(&events, update),
                Ok(None) => {
                    events.end();
                    break;
                }
                Err(status) => {
                    events.error(status_to_transport_error(&status));
                    break;
                }
            },
        }
    }

    events.close();
}

fn forward_update(events: &SessionEventSink, update: proto::SubscribeUpdate) {
    match update.update_oneof {
        Some(UpdateOneof::Transaction(tx)) => {
            events.data(to_notification(tx));
        }
        Some(UpdateOneof::Ping(_)) => {
            tracing::trace!(slot = events.slot(), "Server ping");
        }
        Some(UpdateOneof::Pong(pong)) => {
            tracing::trace!(slot = events.slot(), id = pong.id, "Pong");
        }
        None => {}
    }
}

/// Convert a transaction update, base58-encoding the signature and keys.
#[must_use]
pub fn to_notification(update: proto::SubscribeUpdateTransaction) -> Notification {
    let Some(info) = update.transaction else {
        return Notification {
            slot: update.slot,
            ..Notification::default()
        };
    };

    let signature = (!info.signature.is_empty())
        .then(|| bs58::encode(&info.signature).into_string());
    let accounts = info
        .transaction
        .and_then(|tx| tx.message)
        .map(|message| {
            message
                .account_keys
                .iter()
                .map(|key| bs58::encode(key).into_string())
                .collect()
        })
        .unwrap_or_default();

    Notification {
        slot: update.slot,
        signature,
        accounts,
    }
}

/// Map a gRPC status to a transport error with the canonical code name.
#[must_use]
pub fn status_to_transport_error(status: &tonic::Status) -> TransportError {
    TransportError::new(code_name(status.code()), status.message())
}

/// Canonical upper-snake name of a gRPC status code.
#[must_use]
pub const fn code_name(code: tonic::Code) -> &'static str {
    match code {
        tonic::Code::Ok => "OK",
        tonic::Code::Cancelled => "CANCELLED",
        tonic::Code::Unknown => "UNKNOWN",
        tonic::Code::InvalidArgument => "INVALID_ARGUMENT",
        tonic::Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        tonic::Code::NotFound => "NOT_FOUND",
        tonic::Code::AlreadyExists => "ALREADY_EXISTS",
        tonic::Code::PermissionDenied => "PERMISSION_DENIED",
        tonic::Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        tonic::Code::FailedPrecondition => "FAILED_PRECONDITION",
        tonic::Code::Aborted => "ABORTED",
        tonic::Code::OutOfRange => "OUT_OF_RANGE",
        tonic::Code::Unimplemented => "UNIMPLEMENTED",
        tonic::Code::Internal => "INTERNAL",
        tonic::Code::Unavailable => "UNAVAILABLE",
        tonic::Code::DataLoss => "DATA_LOSS",
        tonic::Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

// =============================================================================
// Tests
// =============================================================================
