//! Stream Session States
//!
//! The lifecycle states a session slot moves through. The transitions
//! themselves are driven by the application layer's `StreamSession`.

use serde::Serialize;

/// Lifecycle state of one stream session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport handle.
    #[default]
    Idle,
    /// Handle requested, subscribe request not yet sent.
    Connecting,
    /// Subscribe request sent on a live handle.
    Active,
    /// Handle failed or terminated; restart required.
    Degraded,
    /// Teardown in progress.
    Closing,
}

impl SessionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Closing => "closing",
        }
    }

    /// Whether the session is receiving notifications.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn only_active_is_active() {
        assert!(SessionState::Active.is_active());
        assert!(!SessionState::Degraded.is_active());
        assert!(!SessionState::Connecting.is_active());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionState::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(SessionState::Closing.to_string(), "closing");
    }
}
