//! Session state and its transition table.

use strum_macros::{AsRefStr, Display};
use tokio::sync::watch;

/// Lifecycle state of the collector session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum SessionState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// Opening the TCP stream.
    Connecting,
    /// Stream open, handshake not sent yet.
    Connected,
    /// Handshake sent, waiting for `auth-success`.
    Registering,
    /// Registered; heartbeat and report jobs are running.
    Ready,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// Shutdown requested; no further attempts will be made.
    ShuttingDown,
}

impl SessionState {
    /// Whether a stream to the collector is currently open.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Registering | Self::Ready)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (ShuttingDown, Disconnected) => true,
            (ShuttingDown, _) => false,
            (_, ShuttingDown) => true,
            (Disconnected | Reconnecting, Connecting) => true,
            (Connecting, Connected) => true,
            (Connected, Registering) => true,
            (Registering, Ready) => true,
            (Connecting | Connected | Registering | Ready, Disconnected) => true,
            (Disconnected, Reconnecting) => true,
            _ => false,
        }
    }
}

/// Single point of truth for the session state.
///
/// Transitions are checked and applied atomically; observers get a
/// consistent snapshot through [`StateCell::get`] or a watch receiver.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            tx: watch::Sender::new(SessionState::Disconnected),
        }
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Apply `next` if the table allows it from the current state.
    ///
    /// Returns `false` and leaves the state untouched otherwise.
    pub(crate) fn advance(&self, next: SessionState) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                tracing::trace!(from = %current, to = %next, "Session state transition");
                *current = next;
                applied = true;
            }
            applied
        });
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_happy_path_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), Disconnected);

        for next in [Connecting, Connected, Registering, Ready, Disconnected] {
            assert!(cell.advance(next), "transition to {next} rejected");
        }
        assert!(cell.advance(Reconnecting));
        assert!(cell.advance(Connecting));
        assert_eq!(cell.get(), Connecting);
    }

    #[test]
    fn test_ready_only_from_registering() {
        let cell = StateCell::new();
        assert!(!cell.advance(Ready));

        cell.advance(Connecting);
        cell.advance(Connected);
        assert!(!cell.advance(Ready));
        cell.advance(Registering);
        assert!(cell.advance(Ready));
        // duplicate readiness is a no-op
        assert!(!cell.advance(Ready));
        assert_eq!(cell.get(), Ready);
    }

    #[test]
    fn test_shutting_down_is_sticky() {
        let cell = StateCell::new();
        cell.advance(Connecting);
        assert!(cell.advance(ShuttingDown));

        assert!(!cell.advance(Connected));
        assert!(!cell.advance(Reconnecting));
        assert!(!cell.advance(Connecting));
        assert!(!cell.advance(ShuttingDown));
        assert!(cell.advance(Disconnected));
    }

    #[test]
    fn test_failed_open_returns_to_disconnected() {
        assert!(Connecting.can_transition_to(Disconnected));
        assert!(!Reconnecting.can_transition_to(Disconnected));
        assert!(!Disconnected.can_transition_to(Connected));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();

        cell.advance(Connecting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Connecting);

        // rejected transitions do not notify
        cell.advance(Ready);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ShuttingDown.to_string(), "shutting-down");
        assert_eq!(Ready.as_ref(), "ready");
        assert!(Registering.is_connected());
        assert!(!Reconnecting.is_connected());
    }
}
