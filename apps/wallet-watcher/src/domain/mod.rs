//! Domain Layer - Watch-list, request and session types.
//!
//! This layer contains the core domain types for the stream supervisor
//! with no I/O. Partitioning and request building live here because they
//! are pure.

/// Session lifecycle states.
pub mod session;

/// Transaction notification types.
pub mod streaming;

/// Subscribe and ping request builders.
pub mod subscription;

/// Watch-list and partitioning.
pub mod watchlist;
