//! The single-connection event loop (component G): drives one
//! [`Connection`] through events until it reaches a terminal state or a
//! transfer-ready state with no more data in flight.

use dicom_encoding::transfer_syntax::TransferSyntax;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::{entries, TransferSyntaxRegistry};
use snafu::{ResultExt, Snafu};
use tracing::{debug, warn};

use super::connection::Connection;
use super::event::{EventId, ULEvent};
use super::pdu_factory;
use super::state::StateId;
use super::transition::{self, Transition};
use crate::pdu::{PDataValue, Pdu};
use crate::status::DimseStatus;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// connection-level failure
    Connection { source: super::connection::Error },

    /// failed to build or decode a command PDU
    PduFactory { source: pdu_factory::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn implicit_vr_le() -> &'static TransferSyntax {
    &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased()
}

fn resolve_transfer_syntax(conn: &Connection, pc_id: u8) -> &'static TransferSyntax {
    conn.transfer_syntax_for(pc_id)
        .and_then(|uid| TransferSyntaxRegistry.get(uid))
        .unwrap_or_else(implicit_vr_le)
}

/// Read one PDU off `conn` and classify it into the event the transition
/// table should see: a `*Recv` event carrying the PDU on success, a bare
/// `ArtimExpired` if the ARTIM timer had already elapsed by the time the
/// PDU arrived, or a bare `TransportClose` if the read itself failed.
///
/// Shared between the main loop's `waiting` branch and
/// [`crate::manager::ManagerOptions::establish`], which drives a single
/// read through the same classification without going through the rest
/// of [`run`] (it still needs the negotiated A-ASSOCIATE-AC/RJ PDU, which
/// `run`'s `StateId`-only return value cannot carry).
pub(crate) fn classify_next_event(conn: &mut Connection) -> ULEvent {
    match conn.read_pdu() {
        Ok(pdu) => {
            let event_id = pdu_factory::determine_event_by_pdu(&pdu);
            if conn.timer_expired() {
                ULEvent::bare(EventId::ArtimExpired)
            } else {
                ULEvent::with_pdu(event_id, pdu)
            }
        }
        Err(_) => ULEvent::bare(EventId::TransportClose),
    }
}

/// Split a P-DATA message's PDVs into the command group (the leading run
/// of `value_type == Command`) and the data group that follows, if any.
fn split_command_and_data(pdvs: &[PDataValue]) -> (&[PDataValue], &[PDataValue]) {
    let split = pdvs
        .iter()
        .position(|pdv| !matches!(pdv.value_type, crate::pdu::PDataValueType::Command))
        .unwrap_or(pdvs.len());
    pdvs.split_at(split)
}

/// Run the event loop on `conn`, starting from `start_event`. `waiting`
/// mirrors the algorithm's `waiting_for_peer` flag: when true, the loop
/// reads from the socket before doing anything else.
///
/// Datasets decoded from pending C-FIND/C-MOVE responses, or received via
/// C-STORE during a move, are appended to `out_datasets` in arrival
/// order.
#[tracing::instrument(skip_all, fields(remote_ae = conn.remote_ae_title()))]
pub fn run(
    conn: &mut Connection,
    start_event: ULEvent,
    out_datasets: &mut Vec<InMemDicomObject>,
    start_waiting: bool,
) -> Result<StateId> {
    let mut current = start_event;
    let mut waiting = start_waiting;
    let mut receiving_data = false;

    loop {
        if !waiting {
            if current.event_id == EventId::EventDoesNotExist {
                break;
            }
            let Transition {
                waiting_for_peer, ..
            } = transition::step(conn, &current, current.pdu.as_ref())
                .context(ConnectionSnafu)?;
            waiting = waiting_for_peer;
        } else {
            current = classify_next_event(conn);

            if current.event_id == EventId::PDataTfRecv {
                waiting = false;
                handle_pdata(conn, &current, out_datasets, &mut receiving_data, &mut waiting)?;
            } else {
                // Dispatch the received event through the transition table
                // immediately: deferring it to the next iteration would let
                // the Sta6 "nothing in flight" check below fire first and
                // return before the reply (A-RELEASE-RP, A-ABORT, ...) is
                // ever sent.
                let Transition {
                    waiting_for_peer, ..
                } = transition::step(conn, &current, None).context(ConnectionSnafu)?;
                waiting = waiting_for_peer;
            }
        }

        let state = conn.state();
        if current.event_id == EventId::EventDoesNotExist
            || state.is_terminal()
            || (state == StateId::Sta6TransferReady && !receiving_data && !waiting)
        {
            break;
        }
    }

    Ok(conn.state())
}

fn handle_pdata(
    conn: &mut Connection,
    current: &ULEvent,
    out_datasets: &mut Vec<InMemDicomObject>,
    receiving_data: &mut bool,
    waiting: &mut bool,
) -> Result<()> {
    let Some(Pdu::PData { data: pdvs }) = &current.pdu else {
        return Ok(());
    };
    let (command_pdvs, data_pdvs) = split_command_and_data(pdvs);

    let command = pdu_factory::decode_command(command_pdvs).context(PduFactorySnafu)?;
    let field = pdu_factory::command_field(&command);
    let raw_status = pdu_factory::status(&command);

    if let Some(raw_status) = raw_status {
        match DimseStatus::classify(raw_status) {
            DimseStatus::Pending => {
                *receiving_data = true;
                if !data_pdvs.is_empty() {
                    let pc_id = data_pdvs[0].presentation_context_id;
                    let ts = resolve_transfer_syntax(conn, pc_id);
                    let dataset =
                        pdu_factory::concatenate_pdvs(data_pdvs, ts).context(PduFactorySnafu)?;
                    out_datasets.push(dataset);
                } else {
                    // the identifier/data set arrives as its own P-DATA-TF
                    let next = conn.read_pdu().context(ConnectionSnafu)?;
                    if let Pdu::PData { data: next_pdvs } = next {
                        let pc_id = next_pdvs
                            .first()
                            .map(|p| p.presentation_context_id)
                            .unwrap_or(command_pdvs[0].presentation_context_id);
                        let ts = resolve_transfer_syntax(conn, pc_id);
                        let dataset = pdu_factory::concatenate_pdvs(&next_pdvs, ts)
                            .context(PduFactorySnafu)?;
                        out_datasets.push(dataset);
                    }
                }
                *waiting = true;
            }
            DimseStatus::Success => {
                *receiving_data = false;
                debug!("DIMSE operation completed successfully");
            }
            DimseStatus::Warning(code) => {
                *receiving_data = false;
                warn!(status = format!("0x{:04X}", code), "{}", DimseStatus::describe(code));
            }
            DimseStatus::Failure(code) => {
                *receiving_data = false;
                warn!(status = format!("0x{:04X}", code), "{}", DimseStatus::describe(code));
            }
        }
    }

    if let Some(field) = field {
        if pdu_factory::is_c_store_rq(field) {
            if !data_pdvs.is_empty() {
                let pc_id = data_pdvs[0].presentation_context_id;
                let ts = resolve_transfer_syntax(conn, pc_id);
                let dataset =
                    pdu_factory::concatenate_pdvs(data_pdvs, ts).context(PduFactorySnafu)?;
                out_datasets.push(dataset);
            }

            use dicom_dictionary_std::tags;
            let message_id = command
                .get(tags::MESSAGE_ID)
                .and_then(|e| e.to_int::<u16>().ok())
                .unwrap_or(0);
            let sop_class_uid = command
                .get(tags::AFFECTED_SOP_CLASS_UID)
                .and_then(|e| e.to_str().ok())
                .map(|s| s.to_string());
            let sop_instance_uid = command
                .get(tags::AFFECTED_SOP_INSTANCE_UID)
                .and_then(|e| e.to_str().ok())
                .map(|s| s.to_string());
            let pc_id = command_pdvs[0].presentation_context_id;

            let rsp = pdu_factory::create_c_store_rsp(
                pc_id,
                message_id,
                sop_class_uid.as_deref(),
                sop_instance_uid.as_deref(),
            )
            .context(PduFactorySnafu)?;
            conn.write_pdu(&rsp).context(ConnectionSnafu)?;
            *waiting = true;
        }
    }

    Ok(())
}
