//! Construction of outbound command PDUs and classification of inbound
//! ones (component F).
//!
//! Command PDUs are built through the small per-command types in
//! [`crate::pdu::generated`] (`CEchoRq`, `CFindRq`, `CMoveRq`, `CStoreRq`,
//! `CStoreRsp`, …), each implementing [`crate::pdu::Command`]; this module
//! wraps their encoded bytes, plus an optional dataset, into the `P-DATA`
//! PDVs that actually go on the wire, the way `movescu`/`findscu` build
//! their command/identifier PDVs by hand.

use dicom_encoding::transfer_syntax::TransferSyntax;
use dicom_object::{InMemDicomObject, ReadError};
use dicom_transfer_syntax_registry::entries;
use snafu::{ResultExt, Snafu};

use crate::pdu::{
    commands::Command, generated::*, AbortRQSource, CommandField, PDataValue, PDataValueType, Pdu,
};

use super::event::EventId;

/// Errors raised while building or decoding command PDUs.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// failed to encode a command dataset
    EncodeCommand {
        source: Box<dicom_object::WriteError>,
    },

    /// failed to encode an identifier or data set
    EncodeDataset { source: dicom_object::WriteError },

    /// failed to decode a command or data set
    DecodeDataset { source: ReadError },

    /// a P-DATA message carried no PDVs
    EmptyPData,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn implicit_vr_le() -> &'static TransferSyntax {
    &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased()
}

/// Build the single-PDV C-ECHO-RQ command PDU.
pub fn create_c_echo(pc_id: u8, message_id: u16, abstract_syntax_uid: &str) -> Result<Pdu> {
    let cmd = CEchoRq::builder()
        .message_id(message_id)
        .affected_sop_class_uid(abstract_syntax_uid)
        .build();
    let data = cmd.encode(false).context(EncodeCommandSnafu)?;
    Ok(Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: pc_id,
            value_type: PDataValueType::Command,
            is_last: true,
            data,
        }],
    })
}

/// Build the two-PDV C-FIND-RQ command PDU (command + identifier dataset).
pub fn create_c_find(
    pc_id: u8,
    message_id: u16,
    abstract_syntax_uid: &str,
    identifier: &InMemDicomObject,
) -> Result<Pdu> {
    let cmd = CFindRq::builder()
        .message_id(message_id)
        .affected_sop_class_uid(abstract_syntax_uid)
        .build();
    let cmd_data = cmd.encode(true).context(EncodeCommandSnafu)?;

    let mut id_data = Vec::new();
    identifier
        .write_dataset_with_ts(&mut id_data, implicit_vr_le())
        .context(EncodeDatasetSnafu)?;

    Ok(Pdu::PData {
        data: vec![
            PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: cmd_data,
            },
            PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: id_data,
            },
        ],
    })
}

/// Build the two-PDV C-MOVE-RQ command PDU. The move destination is the
/// calling AE title of the *secondary* (store) connection.
pub fn create_c_move(
    pc_id: u8,
    message_id: u16,
    abstract_syntax_uid: &str,
    move_destination: &str,
    identifier: &InMemDicomObject,
) -> Result<Pdu> {
    let cmd = CMoveRq::builder()
        .message_id(message_id)
        .affected_sop_class_uid(abstract_syntax_uid)
        .move_destination(move_destination)
        .build();
    let cmd_data = cmd.encode(true).context(EncodeCommandSnafu)?;

    let mut id_data = Vec::new();
    identifier
        .write_dataset_with_ts(&mut id_data, implicit_vr_le())
        .context(EncodeDatasetSnafu)?;

    Ok(Pdu::PData {
        data: vec![
            PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: cmd_data,
            },
            PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: id_data,
            },
        ],
    })
}

/// Build the two-PDV C-STORE-RQ command PDU, with (0000,1000) set to the
/// dataset's own SOP Instance UID.
pub fn create_c_store_rq(
    pc_id: u8,
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    dataset: &InMemDicomObject,
    ts: &TransferSyntax,
) -> Result<Pdu> {
    let cmd = CStoreRq::builder()
        .message_id(message_id)
        .affected_sop_class_uid(sop_class_uid)
        .affected_sop_instance_uid(sop_instance_uid)
        .build();
    let cmd_data = cmd.encode(true).context(EncodeCommandSnafu)?;

    let mut ds_data = Vec::new();
    dataset
        .write_dataset_with_ts(&mut ds_data, ts)
        .context(EncodeDatasetSnafu)?;

    Ok(Pdu::PData {
        data: vec![
            PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: cmd_data,
            },
            PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: ds_data,
            },
        ],
    })
}

/// Build a single-PDV C-STORE-RSP with Status 0x0000, echoing the
/// request's message ID, on the same presentation context.
pub fn create_c_store_rsp(
    pc_id: u8,
    message_id_being_responded_to: u16,
    affected_sop_class_uid: Option<&str>,
    affected_sop_instance_uid: Option<&str>,
) -> Result<Pdu> {
    let cmd = CStoreRsp::builder()
        .message_id_being_responded_to(message_id_being_responded_to)
        .maybe_affected_sop_class_uid(affected_sop_class_uid)
        .maybe_affected_sop_instance_uid(affected_sop_instance_uid)
        .status(0x0000)
        .build();
    let data = cmd.encode(false).context(EncodeCommandSnafu)?;
    Ok(Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: pc_id,
            value_type: PDataValueType::Command,
            is_last: true,
            data,
        }],
    })
}

/// Build an A-RELEASE-RQ PDU.
pub fn construct_release() -> Pdu {
    Pdu::ReleaseRQ
}

/// Build an A-ABORT PDU raised by the service user, reason 0.
pub fn construct_abort() -> Pdu {
    Pdu::AbortRQ {
        source: AbortRQSource::ServiceUser,
    }
}

/// Classify an inbound PDU into the upper layer event it represents.
pub fn determine_event_by_pdu(pdu: &Pdu) -> EventId {
    match pdu {
        Pdu::AssociationAC(_) => EventId::AAssociateAcRecv,
        Pdu::AssociationRJ(_) => EventId::AAssociateRjRecv,
        Pdu::AssociationRQ(_) => EventId::AAssociateRqRecv,
        Pdu::PData { .. } => EventId::PDataTfRecv,
        Pdu::ReleaseRQ => EventId::AReleaseRqRecv,
        Pdu::ReleaseRP => EventId::AReleaseRpRecv,
        Pdu::AbortRQ { .. } => EventId::AAbortRecv,
        Pdu::Unknown { .. } => EventId::InvalidPdu,
    }
}

/// Concatenate the PDV byte payloads of a single message (all fragments
/// of one command or data set, in arrival order) and decode the result as
/// a DICOM dataset using `ts`.
pub fn concatenate_pdvs(pdvs: &[PDataValue], ts: &TransferSyntax) -> Result<InMemDicomObject> {
    if pdvs.is_empty() {
        return EmptyPDataSnafu.fail();
    }
    let mut bytes = Vec::new();
    for pdv in pdvs {
        bytes.extend_from_slice(&pdv.data);
    }
    InMemDicomObject::read_dataset_with_ts(&bytes[..], ts).context(DecodeDatasetSnafu)
}

/// Decode a command dataset, always carried as Implicit VR Little Endian
/// regardless of the negotiated transfer syntax (PS3.8 Annex D).
pub fn decode_command(pdvs: &[PDataValue]) -> Result<InMemDicomObject> {
    concatenate_pdvs(pdvs, implicit_vr_le())
}

/// Read the (0000,0100) CommandField element, if present, from a decoded
/// command dataset.
pub fn command_field(command: &InMemDicomObject) -> Option<u16> {
    use dicom_dictionary_std::tags;
    command.get(tags::COMMAND_FIELD)?.to_int::<u16>().ok()
}

/// Whether a command field value denotes a C-STORE-RQ.
pub fn is_c_store_rq(field: u16) -> bool {
    field == CommandField::C_STORE_RQ as u16
}

/// Read the (0000,0900) Status element, if present, from a decoded
/// command dataset.
pub fn status(command: &InMemDicomObject) -> Option<u16> {
    use dicom_dictionary_std::tags;
    command.get(tags::STATUS)?.to_int::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_pdus() {
        assert_eq!(
            determine_event_by_pdu(&Pdu::ReleaseRQ),
            EventId::AReleaseRqRecv
        );
        assert_eq!(
            determine_event_by_pdu(&construct_abort()),
            EventId::AAbortRecv
        );
        assert_eq!(
            determine_event_by_pdu(&Pdu::Unknown {
                pdu_type: 0xFF,
                data: vec![]
            }),
            EventId::InvalidPdu
        );
    }

    #[test]
    fn builds_c_echo_pdu() {
        let pdu = create_c_echo(1, 7, "1.2.840.10008.1.1").unwrap();
        match pdu {
            Pdu::PData { data } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].presentation_context_id, 1);
            }
            _ => panic!("expected PData"),
        }
    }
}
