//! The DICOM upper layer association: connection state, the PS3.8 state
//! machine, and the building blocks the connection manager drives to run
//! one association end to end.
//!
//! | Component | Module |
//! |---|---|
//! | A. Transport + per-association state | [`connection`] |
//! | B. State identifiers (PS3.8 Table 9-4) | [`state`] |
//! | C. Events | [`event`] |
//! | D. Transition table | [`transition`] |
//! | E. Association builder | [`builder`] |
//! | F. Command PDU factory | [`pdu_factory`] |
//! | G. Single-connection event loop | [`event_loop`] |
//! | H. Dual-channel C-MOVE coordinator | [`move_coordinator`] |
//!
//! Each of these owns its own `snafu`-derived `Error` enum for the
//! failures specific to it; [`crate::error`] is the flat aggregate that
//! [`crate::manager::UlConnectionManager`] actually returns.

pub mod builder;
pub mod connection;
pub mod event;
pub mod event_loop;
pub mod move_coordinator;
pub mod pdata;
pub mod pdu_factory;
pub mod scp;
pub mod state;
pub mod transition;
pub mod uid;
