//! Geyser Transport Adapter
//!
//! Connects stream sessions to a Yellowstone gRPC (Geyser) endpoint.
//!
//! - `proto`: Wire messages and the `Subscribe` client
//! - `requests`: Encodes logical stream requests onto the wire
//! - `client`: The [`StreamTransport`](crate::application::ports::StreamTransport)
//!   implementation and its reader task

pub mod client;
pub mod proto;
mod requests;

pub use client::{
    GeyserClientError, GeyserHandle, GeyserTransport, XTokenInterceptor, code_name,
    status_to_transport_error, to_notification,
};
