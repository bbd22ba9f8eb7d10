//! The [`Connection`] type: one TCP stream plus the protocol state that
//! travels with it.

use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use snafu::{ResultExt, Snafu};

use crate::pdu::{reader::read_pdu, writer::write_pdu, Pdu, PresentationContextProposed};
use crate::timer::Timer;

use super::pdata::fragment_pdvs;
use super::state::StateId;

/// Errors produced while opening, reading from, or writing to a
/// [`Connection`].
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// failed to open the transport connection
    Connect { source: std::io::Error },

    /// failed to bind the local listener
    Bind { source: std::io::Error },

    /// failed to accept an incoming transport connection
    Accept { source: std::io::Error },

    /// failed to send a PDU
    Send { source: crate::pdu::writer::Error },

    /// failed to receive a PDU
    Receive { source: crate::pdu::reader::Error },

    /// failed to configure the socket
    Configure { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A negotiated presentation context, as recorded once association
/// negotiation concludes (whether accepted or rejected).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedPresentationContext {
    pub id: u8,
    pub abstract_syntax_uid: String,
    pub transfer_syntax_uid: Option<String>,
    pub accepted: bool,
}

/// Static per-association user information, exchanged during negotiation.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub max_pdu_length: u32,
    pub implementation_class_uid: String,
    pub implementation_version_name: Option<String>,
}

impl Default for UserInfo {
    fn default() -> Self {
        UserInfo {
            max_pdu_length: crate::pdu::reader::DEFAULT_MAX_PDU,
            implementation_class_uid: crate::IMPLEMENTATION_CLASS_UID.to_string(),
            implementation_version_name: Some(crate::IMPLEMENTATION_VERSION_NAME.to_string()),
        }
    }
}

/// One TCP stream driving one DICOM upper layer association, together
/// with the protocol state, ARTIM timer, and negotiated presentation
/// contexts belonging to it.
///
/// A `Connection` is exclusively owned by the manager for its whole
/// lifetime: there is exactly one PDU in flight in either direction at a
/// time, and state only ever changes through the transition table.
#[derive(Debug)]
pub struct Connection {
    stream: Option<TcpStream>,
    listener: Option<TcpListener>,
    state: StateId,
    timer: Timer,
    local_ae_title: String,
    remote_ae_title: String,
    presentation_contexts: Vec<NegotiatedPresentationContext>,
    proposed_presentation_contexts: Vec<PresentationContextProposed>,
    user_info: UserInfo,
    peer_max_pdu_length: u32,
    last_received_pdu: Option<Pdu>,
}

impl Connection {
    /// Create a connection object in state `Sta1Idle`, not yet bound to any
    /// transport.
    pub fn new(local_ae_title: impl Into<String>, remote_ae_title: impl Into<String>) -> Self {
        Connection {
            stream: None,
            listener: None,
            state: StateId::Sta1Idle,
            timer: Timer::new(),
            local_ae_title: local_ae_title.into(),
            remote_ae_title: remote_ae_title.into(),
            presentation_contexts: Vec::new(),
            proposed_presentation_contexts: Vec::new(),
            user_info: UserInfo::default(),
            peer_max_pdu_length: crate::pdu::reader::DEFAULT_MAX_PDU,
            last_received_pdu: None,
        }
    }

    /// Open a transport connection to `addr`, moving the state to
    /// `Sta4AwaitingTransportOpen` and then, on success,
    /// `Sta2TransportOpen` (a connection is never used as an SCU without
    /// immediately issuing A-ASSOCIATE-RQ, but the intermediate state is
    /// kept observable for symmetry with the transition table).
    pub fn open<A: ToSocketAddrs>(&mut self, addr: A, timeout: Duration) -> Result<()> {
        self.state = StateId::Sta4AwaitingTransportOpen;
        let addr = addr
            .to_socket_addrs()
            .context(ConnectSnafu)?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no address"))
            .context(ConnectSnafu)?;
        let stream = TcpStream::connect_timeout(&addr, timeout).context(ConnectSnafu)?;
        stream.set_read_timeout(Some(timeout)).context(ConfigureSnafu)?;
        self.stream = Some(stream);
        self.state = StateId::Sta2TransportOpen;
        Ok(())
    }

    /// Bind the local listener for the secondary (store) connection used
    /// during C-MOVE, without blocking on an inbound connection. Idempotent:
    /// calling this ahead of time (as
    /// [`ManagerOptions::establish_move`](crate::manager::ManagerOptions::establish_move)
    /// does) means the port is already open by the time the peer's C-STORE
    /// sub-association tries to connect, rather than racing a lazy bind.
    pub fn bind_listener(&mut self, local_port: u16) -> Result<()> {
        if self.listener.is_none() {
            let listener =
                TcpListener::bind(("0.0.0.0", local_port)).context(BindSnafu)?;
            self.listener = Some(listener);
        }
        Ok(())
    }

    /// Bind the local listener if not already bound, then accept exactly
    /// one inbound transport connection from it. Moves the state from
    /// `Sta1Idle` to `Sta2TransportOpen`.
    pub fn init_listener(&mut self, local_port: u16) -> Result<()> {
        self.bind_listener(local_port)?;
        let (stream, _peer) = self
            .listener
            .as_ref()
            .expect("listener bound above")
            .accept()
            .context(AcceptSnafu)?;
        self.stream = Some(stream);
        self.state = StateId::Sta2TransportOpen;
        Ok(())
    }

    /// The current protocol state.
    pub fn state(&self) -> StateId {
        self.state
    }

    /// Force the connection into a given state. Used exclusively by the
    /// transition table, which is the sole authority over state changes.
    pub(crate) fn set_state(&mut self, state: StateId) {
        self.state = state;
    }

    pub fn local_ae_title(&self) -> &str {
        &self.local_ae_title
    }

    pub fn remote_ae_title(&self) -> &str {
        &self.remote_ae_title
    }

    pub fn user_info(&self) -> &UserInfo {
        &self.user_info
    }

    pub fn set_user_info(&mut self, user_info: UserInfo) {
        self.user_info = user_info;
    }

    /// The max PDU length the peer declared it is willing to receive, used
    /// to fragment outbound `P-DATA-TF` PDVs. Defaults to
    /// [`crate::pdu::reader::DEFAULT_MAX_PDU`] until negotiation sets it.
    pub fn set_peer_max_pdu_length(&mut self, max_pdu_length: u32) {
        self.peer_max_pdu_length = max_pdu_length;
    }

    pub fn presentation_contexts(&self) -> &[NegotiatedPresentationContext] {
        &self.presentation_contexts
    }

    pub fn set_presentation_contexts(&mut self, pcs: Vec<NegotiatedPresentationContext>) {
        self.presentation_contexts = pcs;
    }

    /// The presentation contexts proposed in the outbound A-ASSOCIATE-RQ,
    /// recorded by the transition table on AE-2 so that AE-3 can resolve
    /// the abstract syntax UID for each id the peer echoes back in the AC.
    pub(crate) fn proposed_presentation_contexts(&self) -> &[PresentationContextProposed] {
        &self.proposed_presentation_contexts
    }

    pub(crate) fn set_proposed_presentation_contexts(
        &mut self,
        pcs: Vec<PresentationContextProposed>,
    ) {
        self.proposed_presentation_contexts = pcs;
    }

    /// The last PDU classified into a `*Recv` event by the transition
    /// table, kept around so a caller driving `step` directly (rather than
    /// through the event loop) can recover the PDU behind a rejection or
    /// abort after the fact.
    pub(crate) fn last_received_pdu(&self) -> Option<&Pdu> {
        self.last_received_pdu.as_ref()
    }

    pub(crate) fn set_last_received_pdu(&mut self, pdu: Pdu) {
        self.last_received_pdu = Some(pdu);
    }

    /// Look up the accepted transfer syntax UID for a presentation context
    /// id, if that context was accepted.
    pub fn transfer_syntax_for(&self, pc_id: u8) -> Option<&str> {
        self.presentation_contexts
            .iter()
            .find(|pc| pc.id == pc_id && pc.accepted)
            .and_then(|pc| pc.transfer_syntax_uid.as_deref())
    }

    /// Arm the ARTIM timer with the given timeout, marking entry into an
    /// "awaiting peer" state.
    pub fn arm_timer(&mut self, timeout: Duration) {
        self.timer.arm(timeout);
    }

    /// Disarm the ARTIM timer, marking entry into `Sta6` or `Sta1`.
    pub fn clear_timer(&mut self) {
        self.timer.clear();
    }

    /// Whether the ARTIM timer has expired.
    pub fn timer_expired(&self) -> bool {
        self.timer.expired()
    }

    /// Whether the ARTIM timer is currently armed.
    pub(crate) fn timer_is_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// Write one PDU to the peer. A `P-DATA-TF` whose PDVs would not fit in
    /// the peer's negotiated max PDU length is fragmented into consecutive
    /// PDUs first.
    pub fn write_pdu(&mut self, pdu: &Pdu) -> Result<()> {
        let stream = self.stream.as_mut().expect("connection not open");
        match pdu {
            Pdu::PData { data } => {
                for chunk in fragment_pdvs(data, self.peer_max_pdu_length) {
                    write_pdu(stream, &Pdu::PData { data: chunk }).context(SendSnafu)?;
                }
                Ok(())
            }
            other => write_pdu(stream, other).context(SendSnafu),
        }
    }

    /// Read one complete PDU from the peer.
    pub fn read_pdu(&mut self) -> Result<Pdu> {
        let stream = self.stream.as_mut().expect("connection not open");
        read_pdu(stream, self.user_info.max_pdu_length, true).context(ReceiveSnafu)
    }

    /// Tear down the transport connection. Idempotent.
    ///
    /// Does not touch `state`: the transition table is the sole authority
    /// over state changes and sets the resulting state itself via
    /// `set_state` once the arm that called `close` returns. A caller that
    /// closes a connection outside the transition table (the move
    /// coordinator, on its own read loop) must set the resulting state
    /// itself.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.listener = None;
        self.timer.clear();
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
