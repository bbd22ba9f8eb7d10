//! This crate contains the types and methods needed to drive a DICOM
//! network association through the upper layer protocol, from the first
//! A-ASSOCIATE-RQ to the final A-RELEASE or A-ABORT.
//!
//! Unlike a bare protocol toolkit, this crate owns the whole client-side
//! lifecycle: the [`association`] module holds the Sta1-Sta13 state
//! machine, the single-connection event loop and the dual-channel C-MOVE
//! coordinator, and the [`manager`] module exposes the resulting
//! `Establish`/`SendEcho`/`SendFind`/`SendStore`/`SendMove`/`Release`/`Abort`
//! operations as one facade.
//!
//! - The [`address`] module
//!   provides an abstraction for working with compound addresses
//!   referring to application entities in a network.
//! - The [`pdu`] module
//!   provides data structures representing _protocol data units_,
//!   which are passed around as part of the DICOM network communication support.
//! - The [`association`] module
//!   comprises the state machine, event loop and move coordinator driving
//!   an association over TCP.
//! - The [`manager`] module
//!   exposes [`manager::UlConnectionManager`], the public facade over a
//!   managed association.
//! - The [`status`] module classifies DIMSE status codes.
//! - The [`timer`] module implements the ARTIM timer.

pub mod address;
pub mod association;
pub mod error;
pub mod manager;
pub mod pdu;
pub mod status;
pub mod timer;

/// The current implementation class UID generically referring to this crate.
///
/// Automatically generated as per the standard, part 5, section B.2.
///
/// This UID may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.156227610253341005307660858504280353500";

/// The current implementation version name generically referring to this crate.
///
/// This name may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "CONNMGR-rs 0.1.0";

// re-exports

pub use address::{AeAddr, FullAeAddr};
pub use manager::{ManagerOptions, MoveSummary, UlConnectionManager};
pub use pdu::read_pdu;
pub use pdu::write_pdu;
pub use pdu::Pdu;
