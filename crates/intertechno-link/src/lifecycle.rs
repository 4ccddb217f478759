//! Connection state machine shared by the line interfaces.
//!
//! [`Lifecycle::apply`] is a pure transition function. The listen loop feeds
//! it what happened and performs the returned [`LinkAction`], so backoff and
//! retry behavior are testable without a device.

use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Listening,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    StartRequested,
    Opened,
    OpenFailed,
    ReadFailed,
    BackoffElapsed,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    None,
    /// Open the device or socket.
    Open,
    /// Sleep, then report [`LinkEvent::BackoffElapsed`].
    Wait(Duration),
    /// Release the handle and leave the listen loop.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    /// Whether a failed open is retried or ends the listen loop.
    pub retry_failed_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    state: ConnectionState,
    policy: RetryPolicy,
}

impl Lifecycle {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn apply(&mut self, event: LinkEvent) -> LinkAction {
        use ConnectionState::*;
        let (next, action) = match (self.state, event) {
            (_, LinkEvent::StopRequested) => (Disconnected, LinkAction::Close),
            (Disconnected, LinkEvent::StartRequested) => (Connecting, LinkAction::Open),
            (Connecting, LinkEvent::Opened) => (Listening, LinkAction::None),
            (Connecting, LinkEvent::OpenFailed) => {
                if self.policy.retry_failed_open {
                    (Reconnecting, LinkAction::Wait(self.policy.backoff))
                } else {
                    (Disconnected, LinkAction::Close)
                }
            }
            (Listening, LinkEvent::ReadFailed) => {
                (Reconnecting, LinkAction::Wait(self.policy.backoff))
            }
            (Reconnecting, LinkEvent::BackoffElapsed) => (Connecting, LinkAction::Open),
            (state, _) => (state, LinkAction::None),
        };
        self.state = next;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionState, Lifecycle, LinkAction, LinkEvent, RetryPolicy};
    use std::time::Duration;

    fn serial() -> Lifecycle {
        Lifecycle::new(RetryPolicy {
            backoff: Duration::from_secs(10),
            retry_failed_open: false,
        })
    }

    fn tcp() -> Lifecycle {
        Lifecycle::new(RetryPolicy {
            backoff: Duration::from_secs(1),
            retry_failed_open: true,
        })
    }

    #[test]
    fn read_failure_reconnects_after_backoff() {
        let mut l = serial();
        assert_eq!(l.apply(LinkEvent::StartRequested), LinkAction::Open);
        assert_eq!(l.apply(LinkEvent::Opened), LinkAction::None);
        assert_eq!(l.state(), ConnectionState::Listening);
        assert_eq!(
            l.apply(LinkEvent::ReadFailed),
            LinkAction::Wait(Duration::from_secs(10))
        );
        assert_eq!(l.state(), ConnectionState::Reconnecting);
        assert_eq!(l.apply(LinkEvent::BackoffElapsed), LinkAction::Open);
        assert_eq!(l.apply(LinkEvent::Opened), LinkAction::None);
        assert_eq!(l.state(), ConnectionState::Listening);
    }

    #[test]
    fn serial_open_failure_gives_up() {
        let mut l = serial();
        l.apply(LinkEvent::StartRequested);
        assert_eq!(l.apply(LinkEvent::OpenFailed), LinkAction::Close);
        assert_eq!(l.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn tcp_open_failure_keeps_retrying() {
        let mut l = tcp();
        l.apply(LinkEvent::StartRequested);
        for _ in 0..3 {
            assert_eq!(
                l.apply(LinkEvent::OpenFailed),
                LinkAction::Wait(Duration::from_secs(1))
            );
            assert_eq!(l.apply(LinkEvent::BackoffElapsed), LinkAction::Open);
        }
        assert_eq!(l.state(), ConnectionState::Connecting);
    }

    #[test]
    fn stop_is_idempotent_from_any_state() {
        let mut l = tcp();
        assert_eq!(l.apply(LinkEvent::StopRequested), LinkAction::Close);
        assert_eq!(l.apply(LinkEvent::StopRequested), LinkAction::Close);
        l.apply(LinkEvent::StartRequested);
        l.apply(LinkEvent::Opened);
        assert_eq!(l.apply(LinkEvent::StopRequested), LinkAction::Close);
        assert_eq!(l.state(), ConnectionState::Disconnected);
        assert_eq!(l.apply(LinkEvent::StartRequested), LinkAction::Open);
    }

    #[test]
    fn stray_events_are_ignored() {
        let mut l = serial();
        assert_eq!(l.apply(LinkEvent::ReadFailed), LinkAction::None);
        assert_eq!(l.apply(LinkEvent::BackoffElapsed), LinkAction::None);
        assert_eq!(l.state(), ConnectionState::Disconnected);
    }
}
