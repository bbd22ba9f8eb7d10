//! The association states of PS3.8 section 9.1, as a plain enum.
//!
//! States Sta9 through Sta12 are reserved by the standard for
//! asynchronous-operations-window negotiation, which this crate does not
//! implement; they are kept in the enum only so the transition table can be
//! indexed uniformly and so that an unreachable state is still nameable in
//! logs.

/// One of the thirteen association states defined by the DICOM upper layer
/// state machine, plus the sentinel `DoesNotExist` state used before a
/// connection object has been opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateId {
    /// Sta1: Idle.
    Sta1Idle,
    /// Sta2: Transport connection open, awaiting A-ASSOCIATE-RQ PDU.
    Sta2TransportOpen,
    /// Sta3: Awaiting local A-ASSOCIATE response primitive.
    Sta3AwaitingLocalAssocRsp,
    /// Sta4: Awaiting transport connection opening to complete.
    Sta4AwaitingTransportOpen,
    /// Sta5: Awaiting A-ASSOCIATE-AC or -RJ PDU.
    Sta5AwaitingAssocAC,
    /// Sta6: Association established, ready for data transfer.
    Sta6TransferReady,
    /// Sta7: Awaiting A-RELEASE-RP PDU.
    Sta7AwaitingReleaseRP,
    /// Sta8: Awaiting local A-RELEASE response primitive.
    Sta8AwaitingLocalReleaseRsp,
    /// Sta9: reserved for asynchronous operations window negotiation.
    Sta9Reserved,
    /// Sta10: reserved for asynchronous operations window negotiation.
    Sta10Reserved,
    /// Sta11: reserved for asynchronous operations window negotiation.
    Sta11Reserved,
    /// Sta12: reserved for asynchronous operations window negotiation.
    Sta12Reserved,
    /// Sta13: Awaiting transport connection close.
    Sta13AwaitingClose,
    /// No association exists (connection not yet opened, or torn down).
    StaDoesNotExist,
}

impl StateId {
    /// Whether this state represents a usable, transfer-ready association.
    pub fn is_transfer_ready(self) -> bool {
        matches!(self, StateId::Sta6TransferReady)
    }

    /// Whether this state is terminal: no further transitions are expected
    /// without establishing a new association.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StateId::StaDoesNotExist | StateId::Sta13AwaitingClose | StateId::Sta1Idle
        )
    }

    /// Whether this state expects the next transition to be driven by a PDU
    /// read from the peer, rather than by a locally raised event.
    pub fn awaits_peer(self) -> bool {
        matches!(
            self,
            StateId::Sta2TransportOpen
                | StateId::Sta4AwaitingTransportOpen
                | StateId::Sta5AwaitingAssocAC
                | StateId::Sta7AwaitingReleaseRP
                | StateId::Sta13AwaitingClose
        )
    }
}
