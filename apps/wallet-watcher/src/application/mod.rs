//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the stream session state machine, the supervisor
//! that drives it, and the port interfaces it uses to reach the upstream
//! streaming service.

/// Port interfaces for the upstream transport.
pub mod ports;

/// Stream sessions, supervisor, and shared status.
pub mod services;
