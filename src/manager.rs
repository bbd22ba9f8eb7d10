//! [`UlConnectionManager`]: the public facade over a managed association,
//! combining the association builder, transition table, event loop and
//! move coordinator into the small set of operations a caller actually
//! needs (`establish`, `establish_move`, `send_echo`, `send_find`,
//! `send_store`, `send_move`, `release`, `abort`), the way
//! `ClientAssociationOptions`/`ClientAssociation` present association setup
//! and use as one client API.

use std::time::Duration;

use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info};

use crate::association::builder::{self, ServiceKind};
use crate::association::connection::{Connection, NegotiatedPresentationContext};
use crate::association::event::{EventId, ULEvent};
use crate::association::event_loop;
use crate::association::move_coordinator;
pub use crate::association::move_coordinator::MoveSummary;
use crate::association::pdu_factory;
use crate::association::state::StateId;
use crate::association::transition;
use crate::error::{self, Result};
use crate::pdu::Pdu;

/// Configuration for establishing a managed association.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub max_pdu_length: u32,
    /// Local TCP port the secondary connection listens on during C-MOVE.
    pub move_port: u16,
    pub connect_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        ManagerOptions {
            calling_ae_title: "THIS-SCU".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            max_pdu_length: crate::pdu::reader::DEFAULT_MAX_PDU,
            move_port: 11113,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ManagerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calling_ae_title(mut self, value: impl Into<String>) -> Self {
        self.calling_ae_title = value.into();
        self
    }

    pub fn called_ae_title(mut self, value: impl Into<String>) -> Self {
        self.called_ae_title = value.into();
        self
    }

    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    pub fn move_port(mut self, value: u16) -> Self {
        self.move_port = value;
        self
    }

    pub fn connect_timeout(mut self, value: Duration) -> Self {
        self.connect_timeout = value;
        self
    }

    /// Open the transport connection and negotiate an association for
    /// `service`, returning the manager once `Sta6TransferReady` is
    /// reached.
    ///
    /// The A-ASSOCIATE-AC/RJ read goes through
    /// [`event_loop::classify_next_event`], the same read-failure →
    /// `TransportClose`/`ArtimExpired` classification the event loop uses
    /// for every other operation, so a peer that never answers or drops
    /// the connection mid-negotiation tears the connection down and ends
    /// in `Sta1Idle` (AA-2/AA-4) instead of leaking a half-open socket
    /// behind a raw I/O error.
    pub fn establish<A>(
        self,
        addr: A,
        service: ServiceKind,
        store_sop_class_uid: Option<&str>,
    ) -> Result<UlConnectionManager>
    where
        A: std::net::ToSocketAddrs,
    {
        let mut control = Connection::new(self.calling_ae_title.clone(), self.called_ae_title.clone());
        control.open(addr, self.connect_timeout)?;

        let rq = builder::build_association_rq(
            service,
            &self.calling_ae_title,
            &self.called_ae_title,
            self.max_pdu_length,
            crate::IMPLEMENTATION_CLASS_UID,
            Some(crate::IMPLEMENTATION_VERSION_NAME),
            store_sop_class_uid,
        )?;

        transition::step(&mut control, &ULEvent::bare(EventId::AAssociateReqLocal), Some(&rq))?;

        let event = event_loop::classify_next_event(&mut control);
        let transition = transition::step(&mut control, &event, None)?;

        match event.pdu {
            Some(Pdu::AssociationAC(_)) => {
                info!(ae = %self.called_ae_title, "association established");
                Ok(UlConnectionManager {
                    control,
                    secondary: Connection::new(self.calling_ae_title.clone(), self.called_ae_title.clone()),
                    options: self,
                    message_id: 1,
                })
            }
            Some(pdu @ Pdu::AssociationRJ(_)) => error::AssociationRejectedSnafu { pdu }.fail(),
            Some(other) => error::UnknownPduSnafu { pdu: other }.fail(),
            None => error::AssociationNotEstablishedSnafu {
                final_state: transition.next_state,
            }
            .fail(),
        }
    }

    /// Like [`ManagerOptions::establish`] for [`ServiceKind::Move`], but
    /// also binds the secondary connection's listener on `self.move_port`
    /// up front, before the control association is even negotiated. The
    /// peer's inbound C-STORE sub-association has somewhere to land the
    /// instant a pending C-MOVE-RSP is sent, instead of racing a bind
    /// performed lazily on the first pending response.
    pub fn establish_move<A>(self, addr: A) -> Result<UlConnectionManager>
    where
        A: std::net::ToSocketAddrs,
    {
        let move_port = self.move_port;
        let mut manager = self.establish(addr, ServiceKind::Move, None)?;
        manager.secondary.bind_listener(move_port)?;
        Ok(manager)
    }
}

/// A managed DICOM upper layer association: owns the control connection
/// (and, for C-MOVE, the secondary connection) for its whole lifetime and
/// exposes the DIMSE-level operations a caller issues over it.
#[derive(Debug)]
pub struct UlConnectionManager {
    control: Connection,
    secondary: Connection,
    options: ManagerOptions,
    message_id: u16,
}

impl UlConnectionManager {
    /// Establish a new managed association. See [`ManagerOptions::establish`].
    pub fn establish<A>(
        options: ManagerOptions,
        addr: A,
        service: ServiceKind,
        store_sop_class_uid: Option<&str>,
    ) -> Result<Self>
    where
        A: std::net::ToSocketAddrs,
    {
        options.establish(addr, service, store_sop_class_uid)
    }

    /// Establish a new managed association for C-MOVE. See
    /// [`ManagerOptions::establish_move`].
    pub fn establish_move<A>(options: ManagerOptions, addr: A) -> Result<Self>
    where
        A: std::net::ToSocketAddrs,
    {
        options.establish_move(addr)
    }

    fn next_message_id(&mut self) -> u16 {
        let id = self.message_id;
        self.message_id = self.message_id.wrapping_add(1);
        id
    }

    fn accepted_context(&self) -> Result<&NegotiatedPresentationContext> {
        self.control
            .presentation_contexts()
            .iter()
            .find(|pc| pc.accepted)
            .context(error::NoAcceptedPresentationContextSnafu)
    }

    /// Send a C-ECHO-RQ and wait for the C-ECHO-RSP.
    pub fn send_echo(&mut self) -> Result<()> {
        let pc = self.accepted_context()?;
        let pc_id = pc.id;
        let abstract_syntax_uid = pc.abstract_syntax_uid.clone();
        let message_id = self.next_message_id();

        let pdu = pdu_factory::create_c_echo(pc_id, message_id, &abstract_syntax_uid)?;
        self.control.write_pdu(&pdu)?;

        let mut datasets = Vec::new();
        event_loop::run(
            &mut self.control,
            ULEvent::does_not_exist(),
            &mut datasets,
            true,
        )?;
        debug!("C-ECHO complete");
        Ok(())
    }

    /// Send a C-FIND-RQ with the given identifier and collect every
    /// pending result into the returned vector.
    pub fn send_find(&mut self, identifier: &InMemDicomObject) -> Result<Vec<InMemDicomObject>> {
        let pc = self.accepted_context()?;
        let pc_id = pc.id;
        let abstract_syntax_uid = pc.abstract_syntax_uid.clone();
        let message_id = self.next_message_id();

        let pdu = pdu_factory::create_c_find(pc_id, message_id, &abstract_syntax_uid, identifier)?;
        self.control.write_pdu(&pdu)?;

        let mut datasets = Vec::new();
        event_loop::run(
            &mut self.control,
            ULEvent::does_not_exist(),
            &mut datasets,
            true,
        )?;
        Ok(datasets)
    }

    /// Send a C-STORE-RQ for `dataset` and wait for the C-STORE-RSP.
    pub fn send_store(
        &mut self,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        dataset: &InMemDicomObject,
    ) -> Result<()> {
        let pc = self.accepted_context()?;
        let pc_id = pc.id;
        let ts_uid = pc
            .transfer_syntax_uid
            .clone()
            .context(error::NoAcceptedPresentationContextSnafu)?;
        let ts = TransferSyntaxRegistry
            .get(&ts_uid)
            .context(error::UnsupportedTransferSyntaxSnafu { uid: ts_uid })?;
        let message_id = self.next_message_id();

        let pdu = pdu_factory::create_c_store_rq(
            pc_id,
            message_id,
            sop_class_uid,
            sop_instance_uid,
            dataset,
            ts,
        )?;
        self.control.write_pdu(&pdu)?;

        let mut datasets = Vec::new();
        event_loop::run(
            &mut self.control,
            ULEvent::does_not_exist(),
            &mut datasets,
            true,
        )?;
        Ok(())
    }

    /// Send a C-MOVE-RQ to `move_destination` and drive both the control
    /// and secondary connections until every sub-operation has completed.
    pub fn send_move(
        &mut self,
        move_destination: &str,
        identifier: &InMemDicomObject,
    ) -> Result<MoveSummary> {
        let pc = self.accepted_context()?;
        let pc_id = pc.id;
        let abstract_syntax_uid = pc.abstract_syntax_uid.clone();
        let message_id = self.next_message_id();

        let pdu = pdu_factory::create_c_move(
            pc_id,
            message_id,
            &abstract_syntax_uid,
            move_destination,
            identifier,
        )?;
        self.control.write_pdu(&pdu)?;

        let summary = move_coordinator::run(&mut self.control, &mut self.secondary, self.options.move_port)?;
        Ok(summary)
    }

    /// Gracefully release the association. Returns `true` iff the
    /// connection ended in `Sta1Idle`; `false` means the peer never
    /// answered A-RELEASE-RQ (ARTIM expired, or the transport closed/was
    /// aborted first), and the association was torn down as AA-2/AA-4/AA-3
    /// rather than AR-2.
    pub fn release(&mut self) -> Result<bool> {
        if self.control.state() != StateId::Sta6TransferReady {
            return Ok(self.control.state() == StateId::Sta1Idle);
        }
        let final_state = event_loop::run(
            &mut self.control,
            ULEvent::bare(EventId::AReleaseReqLocal),
            &mut Vec::new(),
            false,
        )?;
        Ok(final_state == StateId::Sta1Idle)
    }

    /// Abort the association immediately.
    pub fn abort(&mut self) -> Result<()> {
        if !self.control.is_open() {
            return Ok(());
        }
        transition::step(&mut self.control, &ULEvent::bare(EventId::AAbortReqLocal), None)
            ?;
        Ok(())
    }
}

impl Drop for UlConnectionManager {
    fn drop(&mut self) {
        let _ = self.release();
        let _ = self.abort();
    }
}
