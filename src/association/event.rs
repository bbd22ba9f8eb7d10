//! Upper layer events (PS3.8 Table 9-1) and the tagged PDU payload that
//! travels with them through the transition table and event loop.

use crate::pdu::Pdu;

/// One of the events the DICOM upper layer state machine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    /// A-ASSOCIATE request primitive, issued by the local user.
    AAssociateReqLocal,
    /// A-ASSOCIATE-AC PDU received from the peer.
    AAssociateAcRecv,
    /// A-ASSOCIATE-RJ PDU received from the peer.
    AAssociateRjRecv,
    /// A-ASSOCIATE-RQ PDU received from a connecting peer (SCP role).
    AAssociateRqRecv,
    /// The local transport connection has been confirmed open.
    TransportConnConfirm,
    /// A transport connection has been indicated (incoming).
    TransportConnIndication,
    /// A-RELEASE request primitive, issued by the local user.
    AReleaseReqLocal,
    /// A-RELEASE-RQ PDU received from the peer (SCP role).
    AReleaseRqRecv,
    /// A-RELEASE-RP PDU received from the peer.
    AReleaseRpRecv,
    /// A-RELEASE response primitive, issued by the local user.
    AReleaseRspLocal,
    /// A-ABORT request primitive, issued by the local user.
    AAbortReqLocal,
    /// A-ABORT PDU received from the peer.
    AAbortRecv,
    /// The transport connection has been closed.
    TransportClose,
    /// P-DATA request primitive, issued by the local user.
    PDataReqLocal,
    /// P-DATA-TF PDU received from the peer.
    PDataTfRecv,
    /// The ARTIM timer has expired.
    ArtimExpired,
    /// A PDU could not be parsed or is unrecognised in this state.
    InvalidPdu,
    /// Sentinel value: no event. Used to terminate the event loop.
    EventDoesNotExist,
}

/// A tagged event carrying the PDU it is about, if any.
///
/// The payload is either a PDU the action should send (for locally raised
/// events), a PDU just read off the wire (for `*Recv` events), or absent
/// (for transport-level and timer events).
#[derive(Debug, Clone)]
pub struct ULEvent {
    pub event_id: EventId,
    pub pdu: Option<Pdu>,
}

impl ULEvent {
    /// Construct an event with no attached PDU.
    pub fn bare(event_id: EventId) -> Self {
        ULEvent {
            event_id,
            pdu: None,
        }
    }

    /// Construct an event carrying the given PDU.
    pub fn with_pdu(event_id: EventId, pdu: Pdu) -> Self {
        ULEvent {
            event_id,
            pdu: Some(pdu),
        }
    }

    /// The sentinel event that terminates an event loop.
    pub fn does_not_exist() -> Self {
        ULEvent::bare(EventId::EventDoesNotExist)
    }
}
