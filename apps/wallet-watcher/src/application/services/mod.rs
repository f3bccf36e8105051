//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamSession`: Per-slot state machine owning at most one stream
//! - `StreamSupervisor`: Owns every slot, runs keepalive and rebalance
//! - `SupervisorStatus`: Read-only view of the slots for health checks

pub mod session;
pub mod status;
pub mod supervisor;

pub use session::{EventOutcome, SessionError, StreamSession};
pub use status::{SharedSupervisorStatus, SlotStatus, SupervisorStatus};
pub use supervisor::{MIN_INTERVAL, RebalanceMode, StreamSupervisor, SupervisorConfig};
