//! Top-level error taxonomy for the connection manager.
//!
//! Each module boundary (PDU codec, connection, association builder, event
//! loop, move coordinator) owns its own `snafu`-derived `Error` enum; this
//! one is the type returned by [`crate::manager::UlConnectionManager`],
//! wrapping the lower-level errors with the context needed to tell a
//! caller what went wrong without requiring them to match on the inner
//! layers.

use snafu::Snafu;

use crate::association::state::StateId;
use crate::association::{builder, connection, event_loop, move_coordinator, pdu_factory};
use crate::pdu::Pdu;

/// Type alias for a result from this crate's public API.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// An AE title, host or other call argument did not meet a precondition.
    #[snafu(display("invalid argument: {}", message))]
    InvalidArgument { message: String },

    /// The peer rejected the association request.
    #[snafu(display("association rejected by peer: {:?}", pdu))]
    #[non_exhaustive]
    AssociationRejected { pdu: Pdu },

    /// Establishment did not reach `Sta6TransferReady` (the peer never
    /// responded before ARTIM expired, or closed the transport mid
    /// negotiation).
    #[snafu(display("association could not be established (ended in {:?})", final_state))]
    AssociationNotEstablished { final_state: StateId },

    /// A PDU was received that could not be classified into a known event.
    #[snafu(display("unknown or invalid PDU received"))]
    #[non_exhaustive]
    UnknownPdu { pdu: Pdu },

    /// No presentation context was accepted by the peer.
    #[snafu(display("no presentation context was accepted by the peer"))]
    NoAcceptedPresentationContext,

    /// The peer accepted a transfer syntax this crate's registry cannot
    /// resolve.
    #[snafu(display("unsupported transfer syntax: {}", uid))]
    UnsupportedTransferSyntax { uid: String },

    /// Failure building an association request: an invalid AE title or a
    /// `ServiceKind::Store` call missing its SOP Class UID.
    #[snafu(display("association builder error"))]
    #[snafu(context(false))]
    Builder { source: builder::Error },

    /// Failure at the transport/connection layer.
    #[snafu(display("connection error"))]
    #[snafu(context(false))]
    Connection { source: connection::Error },

    /// Failure building or decoding a command PDU.
    #[snafu(display("command PDU error"))]
    #[snafu(context(false))]
    PduFactory { source: pdu_factory::Error },

    /// Failure driving a single-connection event loop.
    #[snafu(display("event loop error"))]
    #[snafu(context(false))]
    EventLoop { source: event_loop::Error },

    /// Failure driving a C-MOVE operation across both connections.
    #[snafu(display("move coordinator error"))]
    #[snafu(context(false))]
    MoveCoordinator { source: move_coordinator::Error },
}
