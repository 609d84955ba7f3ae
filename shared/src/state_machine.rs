//! Droid Connection State Machine
//!
//! Defines valid connection lifecycle transitions.

/// Lifecycle states of a droid connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// BLE link being established
    Connecting,
    /// Link up, unlocking the droid and running the pairing animation
    Handshaking,
    /// Accepting commands, heartbeat running
    Ready,
    /// Shutdown audio playing, link about to close
    Disconnecting,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection attempt started
    ConnectRequested,
    /// GATT link established
    LinkEstablished,
    /// Handshake written and pairing animation finished
    HandshakeComplete,
    /// Graceful disconnect started
    DisconnectRequested,
    /// Link closed after a graceful disconnect
    LinkClosed,
    /// Link dropped unexpectedly
    LinkLost,
    /// Connection attempt failed
    ConnectFailed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid {
        from: ConnectionState,
        event: ConnectionEvent,
    },
}

/// The connection state machine for a single droid
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
}

impl ConnectionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Whether commands may be written in the current state
    pub fn can_send(&self) -> bool {
        matches!(
            self.current_state,
            ConnectionState::Handshaking | ConnectionState::Ready | ConnectionState::Disconnecting
        )
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: ConnectionEvent) -> TransitionResult {
        match self.next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn next_state(&self, event: ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self.current_state, event) {
            (S::Disconnected, E::ConnectRequested) => Some(S::Connecting),
            (S::Connecting, E::LinkEstablished) => Some(S::Handshaking),
            (S::Connecting, E::ConnectFailed) => Some(S::Disconnected),
            (S::Handshaking, E::HandshakeComplete) => Some(S::Ready),
            (S::Handshaking, E::ConnectFailed) => Some(S::Disconnected),
            (S::Ready, E::DisconnectRequested) => Some(S::Disconnecting),
            (S::Handshaking, E::DisconnectRequested) => Some(S::Disconnecting),
            (S::Disconnecting, E::LinkClosed) => Some(S::Disconnected),
            (S::Handshaking | S::Ready | S::Disconnecting, E::LinkLost) => Some(S::Disconnected),
            _ => None,
        }
    }
}
