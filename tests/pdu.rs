use dicom_connmgr::pdu::reader::{read_pdu, DEFAULT_MAX_PDU};
use dicom_connmgr::pdu::writer::write_pdu;
use dicom_connmgr::pdu::{
    AssociationRQ, PDataValue, PDataValueType, Pdu, PresentationContextProposed, UserIdentity,
    UserIdentityType, UserVariableItem,
};
use matches::matches;
use std::io::Cursor;

#[test]
fn can_read_write_associate_rq() -> Result<(), Box<dyn std::error::Error>> {
    let association_rq = Pdu::AssociationRQ(AssociationRQ {
        protocol_version: 1,
        calling_ae_title: "calling ae".to_string(),
        called_ae_title: "called ae".to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![
            PresentationContextProposed {
                id: 1,
                abstract_syntax: "abstract 1".to_string(),
                transfer_syntaxes: vec!["transfer 1".to_string(), "transfer 2".to_string()],
            },
            PresentationContextProposed {
                id: 3,
                abstract_syntax: "abstract 2".to_string(),
                transfer_syntaxes: vec!["transfer 3".to_string()],
            },
        ],
        user_variables: vec![
            UserVariableItem::ImplementationClassUID("class uid".to_string()),
            UserVariableItem::ImplementationVersionName("version name".to_string()),
            UserVariableItem::MaxLength(16_384),
            UserVariableItem::SopClassExtendedNegotiationSubItem(
                "abstract 1".to_string(),
                vec![1, 1, 0, 1, 1, 0, 1],
            ),
            UserVariableItem::UserIdentityItem(UserIdentity::new(
                false,
                UserIdentityType::UsernameAndPassword,
                b"MyUsername".to_vec(),
                b"MyPassword".to_vec(),
            )),
        ],
    });

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &association_rq)?;

    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true)?;

    let Pdu::AssociationRQ(AssociationRQ {
        protocol_version,
        calling_ae_title,
        called_ae_title,
        application_context_name,
        presentation_contexts,
        user_variables,
    }) = result
    else {
        panic!("expected AssociationRQ");
    };

    assert_eq!(protocol_version, 1);
    assert_eq!(calling_ae_title, "calling ae");
    assert_eq!(called_ae_title, "called ae");
    assert_eq!(application_context_name, "1.2.840.10008.3.1.1.1");
    assert_eq!(presentation_contexts.len(), 2);
    assert_eq!(presentation_contexts[0].abstract_syntax, "abstract 1");
    assert_eq!(presentation_contexts[0].transfer_syntaxes.len(), 2);
    assert_eq!(presentation_contexts[1].abstract_syntax, "abstract 2");
    assert_eq!(user_variables.len(), 5);
    assert!(matches!(
        &user_variables[0],
        UserVariableItem::ImplementationClassUID(u) if u == "class uid"
    ));
    assert!(matches!(user_variables[2], UserVariableItem::MaxLength(16_384)));
    assert!(matches!(&user_variables[3],
        UserVariableItem::SopClassExtendedNegotiationSubItem(sop_class_uid, data)
        if sop_class_uid == "abstract 1" && data.as_slice() == [1, 1, 0, 1, 1, 0, 1]
    ));
    assert!(matches!(&user_variables[4],
        UserVariableItem::UserIdentityItem(user_identity)
        if !user_identity.positive_response_requested()
            && user_identity.identity_type() == UserIdentityType::UsernameAndPassword
            && user_identity.primary_field() == b"MyUsername"
            && user_identity.secondary_field() == b"MyPassword"
    ));

    Ok(())
}

#[test]
fn can_read_write_pdata() -> Result<(), Box<dyn std::error::Error>> {
    let pdata_rq = Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: 3,
            value_type: PDataValueType::Command,
            is_last: true,
            data: vec![0, 0, 0, 0],
        }],
    };

    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &pdata_rq)?;

    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true)?;

    let Pdu::PData { data } = result else {
        panic!("expected PData");
    };
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].presentation_context_id, 3);
    assert!(matches!(data[0].value_type, PDataValueType::Command));
    assert!(data[0].is_last);
    assert_eq!(data[0].data, vec![0, 0, 0, 0]);

    Ok(())
}

#[test]
fn can_read_write_release_and_abort() -> Result<(), Box<dyn std::error::Error>> {
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &Pdu::ReleaseRQ)?;
    assert!(matches!(
        read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true)?,
        Pdu::ReleaseRQ
    ));

    bytes.clear();
    write_pdu(&mut bytes, &Pdu::ReleaseRP)?;
    assert!(matches!(
        read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true)?,
        Pdu::ReleaseRP
    ));

    bytes.clear();
    write_pdu(
        &mut bytes,
        &Pdu::AbortRQ {
            source: dicom_connmgr::pdu::AbortRQSource::ServiceUser,
        },
    )?;
    assert!(matches!(
        read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true)?,
        Pdu::AbortRQ { .. }
    ));

    Ok(())
}
