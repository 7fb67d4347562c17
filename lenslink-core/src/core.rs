//! Host-driven API: LinkCore receives transport events, returns actions.

use std::net::SocketAddr;

use crate::protocol::{ConnectionEvent, Endpoint, SessionId};
use crate::wire::{self, DecodedUnit, FrameDecodeError, FrameEnvelope};

/// Reason reported when both transport attempts fail.
pub const NO_TRANSPORT_REASON: &str = "no transport available";
/// Reason reported for a caller-initiated stop.
pub const CALLER_CLOSE_REASON: &str = "closed by caller";

/// Connection lifecycle. Exactly one state per core instance at any time;
/// `Closed` is terminal — a new `start` means a new core instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Idle,
    Connecting(PendingTransport),
    Open(Endpoint),
    Closing,
    Closed(String),
}

/// Which connection attempt is in flight. The wireless address is unknown
/// until discovery resolves it, so `Connecting` is refined in three steps.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingTransport {
    /// Wired connect in flight.
    Wired(Endpoint),
    /// Resolving a wireless candidate on the local subnet.
    Discovery,
    /// Wireless connect in flight.
    Wireless(Endpoint),
}

/// Action for the host to perform. Event emission and I/O stay on the host;
/// the core only decides what happens next.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Deliver an event to the consumer, in order.
    Emit(ConnectionEvent),
    /// Open the transport session toward this endpoint.
    Connect(Endpoint),
    /// Resolve a wireless candidate via LAN discovery.
    Discover,
    /// Begin periodic liveness probes on the open session.
    StartHeartbeat,
    /// Stop the heartbeat monitor.
    StopHeartbeat,
    /// Close the transport session.
    CloseSession,
}

/// Connection state machine for one logical session. The host passes
/// transport events in and executes the returned actions; the core performs
/// no I/O itself. Terminal-event bookkeeping lives here so the consumer sees
/// exactly one `Connected` per open and exactly one of
/// `Disconnected`/`Error` per session.
pub struct LinkCore {
    session: SessionId,
    state: ConnectionState,
    stream_port: u16,
    close_reason: Option<String>,
}

impl LinkCore {
    pub fn new(stream_port: u16) -> Self {
        Self {
            session: SessionId::generate(),
            state: ConnectionState::Idle,
            stream_port,
            close_reason: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Whether this core has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed(_))
    }

    /// Begin connection establishment: wired channel first.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::Idle {
            return vec![];
        }
        let wired = Endpoint::wired(self.stream_port);
        self.state = ConnectionState::Connecting(PendingTransport::Wired(wired));
        vec![Action::Connect(wired)]
    }

    /// The in-flight connect attempt failed. Falls back from wired to
    /// wireless discovery; a failed wireless attempt is terminal.
    pub fn on_connect_failed(&mut self) -> Vec<Action> {
        match &self.state {
            ConnectionState::Connecting(PendingTransport::Wired(_)) => {
                self.state = ConnectionState::Connecting(PendingTransport::Discovery);
                vec![Action::Discover]
            }
            ConnectionState::Connecting(PendingTransport::Wireless(_)) => self.fail_to_connect(),
            _ => vec![],
        }
    }

    /// Discovery resolved a wireless candidate.
    pub fn on_discovered(&mut self, addr: SocketAddr) -> Vec<Action> {
        match &self.state {
            ConnectionState::Connecting(PendingTransport::Discovery) => {
                let ep = Endpoint::wireless(addr);
                self.state = ConnectionState::Connecting(PendingTransport::Wireless(ep));
                vec![Action::Connect(ep)]
            }
            _ => vec![],
        }
    }

    /// Discovery found no streamer on the subnet. Terminal.
    pub fn on_discovery_failed(&mut self) -> Vec<Action> {
        match &self.state {
            ConnectionState::Connecting(PendingTransport::Discovery) => self.fail_to_connect(),
            _ => vec![],
        }
    }

    /// The in-flight connect attempt succeeded.
    pub fn on_open(&mut self) -> Vec<Action> {
        let ep = match &self.state {
            ConnectionState::Connecting(PendingTransport::Wired(ep))
            | ConnectionState::Connecting(PendingTransport::Wireless(ep)) => *ep,
            _ => return vec![],
        };
        self.state = ConnectionState::Open(ep);
        vec![
            Action::Emit(ConnectionEvent::Connected),
            Action::StartHeartbeat,
        ]
    }

    /// One message arrived on the open session. Binary frames decode into a
    /// parameter event; control text is inert. A decode failure is returned
    /// for the host to log — the session stays open and later frames still
    /// decode.
    pub fn on_envelope(&mut self, envelope: &FrameEnvelope) -> Result<Vec<Action>, FrameDecodeError> {
        if !matches!(self.state, ConnectionState::Open(_)) {
            return Ok(vec![]);
        }
        match wire::decode_frame(envelope)? {
            DecodedUnit::Parameters(params) => {
                Ok(vec![Action::Emit(ConnectionEvent::FrameDecoded(params))])
            }
            DecodedUnit::Control(_) => Ok(vec![]),
        }
    }

    /// The remote side closed the session cleanly.
    pub fn on_remote_close(&mut self, reason: String) -> Vec<Action> {
        if !matches!(self.state, ConnectionState::Open(_)) {
            return vec![];
        }
        self.begin_teardown(reason.clone(), ConnectionEvent::Disconnected(reason))
    }

    /// Mid-session transport failure.
    pub fn on_transport_error(&mut self, message: String) -> Vec<Action> {
        if !matches!(self.state, ConnectionState::Open(_)) {
            return vec![];
        }
        self.begin_teardown(message.clone(), ConnectionEvent::Error(message))
    }

    /// Caller-initiated stop. Safe in any state; no-op once closing or
    /// closed, so repeated calls produce no further events.
    pub fn on_stop(&mut self) -> Vec<Action> {
        match &self.state {
            ConnectionState::Idle | ConnectionState::Connecting(_) => {
                // No session reached Open; nothing to tear down.
                self.state = ConnectionState::Closed(CALLER_CLOSE_REASON.to_string());
                vec![Action::Emit(ConnectionEvent::Disconnected(
                    CALLER_CLOSE_REASON.to_string(),
                ))]
            }
            ConnectionState::Open(_) => self.begin_teardown(
                CALLER_CLOSE_REASON.to_string(),
                ConnectionEvent::Disconnected(CALLER_CLOSE_REASON.to_string()),
            ),
            ConnectionState::Closing | ConnectionState::Closed(_) => vec![],
        }
    }

    /// The host finished releasing the session and monitor.
    pub fn on_teardown_complete(&mut self) -> Vec<Action> {
        if self.state == ConnectionState::Closing {
            let reason = self
                .close_reason
                .take()
                .unwrap_or_else(|| CALLER_CLOSE_REASON.to_string());
            self.state = ConnectionState::Closed(reason);
        }
        vec![]
    }

    /// Open -> Closing with the terminal event. The session and monitor are
    /// released on every teardown path, whoever initiated it.
    fn begin_teardown(&mut self, reason: String, event: ConnectionEvent) -> Vec<Action> {
        self.state = ConnectionState::Closing;
        self.close_reason = Some(reason);
        vec![
            Action::StopHeartbeat,
            Action::CloseSession,
            Action::Emit(event),
        ]
    }

    /// Both transport attempts exhausted. Terminal, before any session opened.
    fn fail_to_connect(&mut self) -> Vec<Action> {
        self.state = ConnectionState::Closed(NO_TRANSPORT_REASON.to_string());
        vec![Action::Emit(ConnectionEvent::Error(
            NO_TRANSPORT_REASON.to_string(),
        ))]
    }
}
