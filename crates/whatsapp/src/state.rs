//! Push connection lifecycle as a pure state machine.
//!
//! The ingest loop performs the I/O; every decision about what happens next
//! goes through [`ConnectionState::next`].

use relay_channels::CloseInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    /// The connection ended; the close is classified on `Settle`.
    Closed(CloseInfo),
    Reconnecting,
    /// Terminal: the remote session was invalidated.
    LoggedOut(CloseInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    ConnectFailed(String),
    Closed(CloseInfo),
    Settle,
    DelayElapsed,
}

impl ConnectionState {
    /// Transition function. Events that make no sense in the current state
    /// leave it unchanged.
    #[must_use]
    pub fn next(&self, event: ConnectionEvent) -> Self {
        use {ConnectionEvent as E, ConnectionState as S};

        match (self, event) {
            (S::Connecting, E::Connected) => S::Active,
            (S::Connecting, E::ConnectFailed(reason)) => S::Closed(CloseInfo::transient(reason)),
            (S::Active, E::Closed(info)) => S::Closed(info),
            (S::Closed(info), E::Settle) if info.invalidated => S::LoggedOut(info.clone()),
            (S::Closed(_), E::Settle) => S::Reconnecting,
            (S::Reconnecting, E::DelayElapsed) => S::Connecting,
            (state, _) => state.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closed(_) => "closed",
            Self::Reconnecting => "reconnecting",
            Self::LoggedOut(_) => "logged_out",
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::{ConnectionEvent as E, ConnectionState as S},
        relay_channels::CloseInfo,
        rstest::rstest,
    };

    #[rstest]
    #[case(S::Connecting, E::Connected, S::Active)]
    #[case(S::Connecting, E::ConnectFailed("refused".into()), S::Closed(CloseInfo::transient("refused")))]
    #[case(S::Active, E::Closed(CloseInfo::transient("eof")), S::Closed(CloseInfo::transient("eof")))]
    #[case(S::Closed(CloseInfo::transient("eof")), E::Settle, S::Reconnecting)]
    #[case(S::Closed(CloseInfo::logged_out("bye")), E::Settle, S::LoggedOut(CloseInfo::logged_out("bye")))]
    #[case(S::Reconnecting, E::DelayElapsed, S::Connecting)]
    fn transitions(#[case] from: S, #[case] event: E, #[case] to: S) {
        assert_eq!(from.next(event), to);
    }

    #[rstest]
    #[case(S::Active, E::Connected)]
    #[case(S::Connecting, E::Settle)]
    #[case(S::Reconnecting, E::Closed(CloseInfo::transient("late")))]
    #[case(S::LoggedOut(CloseInfo::logged_out("bye")), E::DelayElapsed)]
    #[case(S::LoggedOut(CloseInfo::logged_out("bye")), E::Connected)]
    fn ignores_out_of_place_events(#[case] from: S, #[case] event: E) {
        assert_eq!(from.next(event), from);
    }

    #[test]
    fn transient_close_cycles_back_to_connecting() {
        let mut state = S::Connecting;
        for event in [
            E::Connected,
            E::Closed(CloseInfo::transient("network")),
            E::Settle,
            E::DelayElapsed,
        ] {
            state = state.next(event);
            assert!(!state.is_terminal());
        }
        assert_eq!(state, S::Connecting);
    }

    #[test]
    fn only_logged_out_is_terminal() {
        assert!(S::LoggedOut(CloseInfo::logged_out("x")).is_terminal());
        assert!(!S::Closed(CloseInfo::logged_out("x")).is_terminal());
        assert_eq!(S::Reconnecting.label(), "reconnecting");
    }
}
