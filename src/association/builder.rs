//! The association builder (component E): turns a requested service kind
//! into the presentation-context list of an A-ASSOCIATE-RQ.

use dicom_dictionary_std::uids;
use snafu::Snafu;

use crate::pdu::{AssociationRQ, PresentationContextProposed, Pdu, UserVariableItem};

use super::scp::choose_supported;

/// Implicit VR Little Endian, the only transfer syntax this crate offers.
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

/// The DICOM service this association is being established to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Echo,
    Find,
    /// Store carries the SOP Class UID of the dataset to send, since the
    /// abstract syntax offered is derived from it.
    Store,
    Move,
}

/// Precondition failure for building an association request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
#[snafu(display("AE title must be at most 16 ASCII bytes"))]
pub struct InvalidAeTitle;

/// `ServiceKind::Store` was requested without the SOP Class UID its
/// abstract syntax is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, snafu::Snafu)]
#[snafu(display("Store service requires a SOP Class UID"))]
pub struct MissingStoreSopClassUid;

/// Failure building an association request, aggregating the precondition
/// failures of [`validate_ae_title`] and [`build_presentation_contexts`].
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// An AE title did not meet PS3.8's length/charset constraints.
    #[snafu(context(false))]
    InvalidAeTitle { source: InvalidAeTitle },

    /// `ServiceKind::Store` was requested without a SOP Class UID.
    #[snafu(context(false))]
    MissingStoreSopClassUid { source: MissingStoreSopClassUid },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An AE title must be at most 16 ASCII bytes (PS3.8 allows padding with
/// spaces up to that length, never more).
pub fn validate_ae_title(ae_title: &str) -> std::result::Result<(), InvalidAeTitle> {
    if ae_title.len() > 16 || !ae_title.is_ascii() {
        Err(InvalidAeTitle)
    } else {
        Ok(())
    }
}

/// The abstract syntax UIDs offered for a given service, in presentation
/// context order (see SPEC_FULL.md §4.E).
fn abstract_syntaxes_for(
    service: ServiceKind,
    store_sop_class_uid: Option<&str>,
) -> std::result::Result<Vec<String>, MissingStoreSopClassUid> {
    Ok(match service {
        ServiceKind::Echo => vec![uids::VERIFICATION.to_string()],
        ServiceKind::Find => vec![
            uids::PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND.to_string(),
            uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND.to_string(),
            uids::PATIENT_STUDY_ONLY_QUERY_RETRIEVE_INFORMATION_MODEL_FIND.to_string(),
            uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND.to_string(),
            uids::GENERAL_PURPOSE_WORKLIST_INFORMATION_MODEL_FIND.to_string(),
        ],
        ServiceKind::Store => vec![store_sop_class_uid
            .ok_or(MissingStoreSopClassUid)?
            .to_string()],
        ServiceKind::Move => vec![
            uids::PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND.to_string(),
            uids::PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE.to_string(),
            uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND.to_string(),
            uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE.to_string(),
        ],
    })
}

/// Build the list of proposed presentation contexts for `service`, with
/// odd ids starting at 1, each offering exactly Implicit VR Little
/// Endian.
pub fn build_presentation_contexts(
    service: ServiceKind,
    store_sop_class_uid: Option<&str>,
) -> std::result::Result<Vec<PresentationContextProposed>, MissingStoreSopClassUid> {
    Ok(abstract_syntaxes_for(service, store_sop_class_uid)?
        .into_iter()
        .enumerate()
        .map(|(i, abstract_syntax)| PresentationContextProposed {
            id: (i as u8) * 2 + 1,
            abstract_syntax,
            transfer_syntaxes: vec![IMPLICIT_VR_LITTLE_ENDIAN.to_string()],
        })
        .collect())
}

/// Check that the registry can decode the sole transfer syntax this crate
/// offers; used when validating a peer's accepted presentation contexts.
pub fn accepted_transfer_syntax<'a, I>(offered: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    choose_supported(offered)
}

/// Build the full A-ASSOCIATE-RQ PDU for `service`.
pub fn build_association_rq(
    service: ServiceKind,
    calling_ae_title: &str,
    called_ae_title: &str,
    max_pdu_length: u32,
    implementation_class_uid: &str,
    implementation_version_name: Option<&str>,
    store_sop_class_uid: Option<&str>,
) -> Result<Pdu> {
    validate_ae_title(calling_ae_title)?;
    validate_ae_title(called_ae_title)?;

    let mut user_variables = vec![
        UserVariableItem::MaxLength(max_pdu_length),
        UserVariableItem::ImplementationClassUID(implementation_class_uid.to_string()),
    ];
    if let Some(version_name) = implementation_version_name {
        user_variables.push(UserVariableItem::ImplementationVersionName(
            version_name.to_string(),
        ));
    }

    Ok(Pdu::AssociationRQ(AssociationRQ {
        protocol_version: 1,
        calling_ae_title: calling_ae_title.to_string(),
        called_ae_title: called_ae_title.to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: build_presentation_contexts(service, store_sop_class_uid)?,
        user_variables,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_offers_verification_only() {
        let pcs = build_presentation_contexts(ServiceKind::Echo, None).unwrap();
        assert_eq!(pcs.len(), 1);
        assert_eq!(pcs[0].id, 1);
        assert_eq!(pcs[0].abstract_syntax, uids::VERIFICATION);
        assert_eq!(pcs[0].transfer_syntaxes, vec![IMPLICIT_VR_LITTLE_ENDIAN]);
    }

    #[test]
    fn move_offers_four_contexts_with_odd_ids() {
        let pcs = build_presentation_contexts(ServiceKind::Move, None).unwrap();
        assert_eq!(pcs.len(), 4);
        assert_eq!(
            pcs.iter().map(|pc| pc.id).collect::<Vec<_>>(),
            vec![1, 3, 5, 7]
        );
    }

    #[test]
    fn store_offers_the_dataset_sop_class() {
        let pcs = build_presentation_contexts(ServiceKind::Store, Some("1.2.840.10008.5.1.4.1.1.7"))
            .unwrap();
        assert_eq!(pcs.len(), 1);
        assert_eq!(pcs[0].abstract_syntax, "1.2.840.10008.5.1.4.1.1.7");
    }

    #[test]
    fn store_without_a_sop_class_uid_is_rejected() {
        assert!(build_presentation_contexts(ServiceKind::Store, None).is_err());
    }

    #[test]
    fn rejects_overlong_ae_titles() {
        assert!(validate_ae_title("THIS-AE-TITLE-IS-WAY-TOO-LONG").is_err());
        assert!(validate_ae_title("SHORT-AE").is_ok());
    }
}
