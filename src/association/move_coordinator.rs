//! The dual-channel C-MOVE coordinator (component H): alternates between
//! the control association (where C-MOVE-RQ/RSP travel) and a secondary,
//! passively-accepted association (where the peer performs its C-STORE
//! sub-operations), the way storescp accepts and drains an incoming
//! association, but driven single-threaded from the same caller that
//! issued the C-MOVE-RQ instead of a second, independently running
//! process.

use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use snafu::{ResultExt, Snafu};
use tracing::debug;

use super::connection::{Connection, NegotiatedPresentationContext};
use super::event::{EventId, ULEvent};
use super::event_loop;
use super::pdu_factory;
use super::state::StateId;
use super::transition;
use crate::pdu::{
    AssociationAC, PDataValue, PDataValueType, PresentationContextResult,
    PresentationContextResultReason, Pdu,
};
use crate::status::DimseStatus;

/// The leading run of Command-typed PDVs in a P-DATA message; any data
/// PDVs that follow (an identifier some peers attach to a pending
/// C-MOVE-RSP) are not needed here and are left unread.
fn command_pdvs(pdvs: &[PDataValue]) -> &[PDataValue] {
    let split = pdvs
        .iter()
        .position(|pdv| !matches!(pdv.value_type, PDataValueType::Command))
        .unwrap_or(pdvs.len());
    &pdvs[..split]
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// failure driving the control association
    Control { source: super::connection::Error },

    /// failure driving the secondary (store) association
    Secondary { source: event_loop::Error },

    /// failed to accept the peer's inbound store connection
    Accept { source: super::connection::Error },

    /// failed to decode a command PDU from the control association
    PduFactory { source: pdu_factory::Error },

    /// the peer sent something other than an A-ASSOCIATE-RQ when opening
    /// the secondary connection
    UnexpectedSecondaryPdu,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The outcome of a C-MOVE operation: every dataset received on the
/// secondary connection, plus the final sub-operation counters reported
/// by the control association's last C-MOVE-RSP.
#[derive(Debug, Clone, Default)]
pub struct MoveSummary {
    pub datasets: Vec<InMemDicomObject>,
    pub completed: u16,
    pub warning: u16,
    pub failed: u16,
    pub final_status: u16,
}

fn record_counts(command: &InMemDicomObject, summary: &mut MoveSummary) {
    if let Some(v) = command
        .get(tags::NUMBER_OF_COMPLETED_SUBOPERATIONS)
        .and_then(|e| e.to_int::<u16>().ok())
    {
        summary.completed = v;
    }
    if let Some(v) = command
        .get(tags::NUMBER_OF_WARNING_SUBOPERATIONS)
        .and_then(|e| e.to_int::<u16>().ok())
    {
        summary.warning = v;
    }
    if let Some(v) = command
        .get(tags::NUMBER_OF_FAILED_SUBOPERATIONS)
        .and_then(|e| e.to_int::<u16>().ok())
    {
        summary.failed = v;
    }
    if let Some(status) = pdu_factory::status(command) {
        summary.final_status = status;
    }
}

/// Accept one inbound association on `secondary`: read its A-ASSOCIATE-RQ,
/// accept every proposed presentation context using its first offered
/// transfer syntax (this crate only ever proposes Implicit VR Little
/// Endian, so that is always what gets accepted), and reply with
/// A-ASSOCIATE-AC.
fn accept_secondary_association(secondary: &mut Connection, local_port: u16) -> Result<()> {
    secondary.init_listener(local_port).context(AcceptSnafu)?;
    let rq = secondary.read_pdu().context(AcceptSnafu)?;
    let Pdu::AssociationRQ(rq) = rq else {
        return UnexpectedSecondaryPduSnafu.fail();
    };

    let presentation_contexts: Vec<PresentationContextResult> = rq
        .presentation_contexts
        .iter()
        .map(|pc| PresentationContextResult {
            id: pc.id,
            reason: PresentationContextResultReason::Acceptance,
            transfer_syntax: pc.transfer_syntaxes[0].clone(),
        })
        .collect();

    secondary.set_presentation_contexts(
        rq.presentation_contexts
            .iter()
            .zip(presentation_contexts.iter())
            .map(|(proposed, result)| NegotiatedPresentationContext {
                id: proposed.id,
                abstract_syntax_uid: proposed.abstract_syntax.clone(),
                transfer_syntax_uid: Some(result.transfer_syntax.clone()),
                accepted: true,
            })
            .collect(),
    );
    if let Some(peer_max) = rq.user_variables.iter().find_map(|v| match v {
        crate::pdu::UserVariableItem::MaxLength(n) => Some(*n),
        _ => None,
    }) {
        secondary.set_peer_max_pdu_length(peer_max);
    }

    let ac = Pdu::AssociationAC(AssociationAC {
        protocol_version: 1,
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        called_ae_title: rq.called_ae_title,
        calling_ae_title: rq.calling_ae_title,
        presentation_contexts,
        user_variables: rq.user_variables,
    });
    transition::accept_association(secondary, &ac).context(AcceptSnafu)
}

/// Drive a C-MOVE operation to completion.
///
/// `control` must already be in `Sta6TransferReady` with the C-MOVE-RQ
/// already sent (the caller builds and sends it via
/// [`pdu_factory::create_c_move`] and [`Connection::write_pdu`], the same
/// way it sends C-FIND/C-ECHO requests, before handing the connection to
/// this function). `secondary` is a fresh, unopened connection that
/// accepts the peer's inbound store association the first time a pending
/// C-MOVE-RSP is seen.
#[tracing::instrument(skip_all, fields(remote_ae = control.remote_ae_title(), local_port))]
pub fn run(control: &mut Connection, secondary: &mut Connection, local_port: u16) -> Result<MoveSummary> {
    let mut summary = MoveSummary::default();
    let mut secondary_open = false;

    loop {
        let pdu = match control.read_pdu() {
            Ok(pdu) => pdu,
            Err(_) => {
                control.close();
                control.set_state(StateId::Sta1Idle);
                break;
            }
        };

        if control.timer_expired() {
            control.close();
            control.set_state(StateId::Sta1Idle);
            break;
        }

        let event_id = pdu_factory::determine_event_by_pdu(&pdu);

        if event_id != EventId::PDataTfRecv {
            // Anything other than a C-MOVE-RSP (abort, unexpected PDU,
            // transport close) ends the operation through the ordinary
            // transition table.
            let _ = transition::step(control, &ULEvent::with_pdu(event_id, pdu), None)
                .context(ControlSnafu)?;
            break;
        }

        let Pdu::PData { data: pdvs } = &pdu else {
            unreachable!("PDataTfRecv always carries a PData PDU")
        };
        let command = pdu_factory::decode_command(command_pdvs(pdvs)).context(PduFactorySnafu)?;
        record_counts(&command, &mut summary);

        match pdu_factory::status(&command).map(DimseStatus::classify) {
            Some(DimseStatus::Pending) => {
                if !secondary_open {
                    accept_secondary_association(secondary, local_port)?;
                    secondary_open = true;
                }

                let mut grew = true;
                while grew {
                    let mut batch = Vec::new();
                    event_loop::run(secondary, ULEvent::does_not_exist(), &mut batch, true)
                        .context(SecondarySnafu)?;
                    grew = !batch.is_empty();
                    summary.datasets.append(&mut batch);
                    if secondary.state().is_terminal() {
                        break;
                    }
                }
            }
            _ => {
                // Success, Warning, Failure, or a command with no status:
                // the move operation itself has concluded.
                break;
            }
        }

        if control.state() == StateId::StaDoesNotExist || control.state() == StateId::Sta1Idle {
            break;
        }
    }

    debug!(
        completed = summary.completed,
        warning = summary.warning,
        failed = summary.failed,
        "C-MOVE finished"
    );

    Ok(summary)
}
