//! End-to-end tests driving [`dicom_connmgr::manager::UlConnectionManager`]
//! against a mock peer on a background thread, the way `echoscu`/`findscu`/
//! `storescu`/`movescu` are exercised against a real SCP in practice but
//! without needing one.

use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use dicom_connmgr::association::builder::{ServiceKind, IMPLICIT_VR_LITTLE_ENDIAN};
use dicom_connmgr::manager::ManagerOptions;
use dicom_connmgr::pdu::commands::Command;
use dicom_connmgr::pdu::generated::{CEchoRsp, CFindRsp, CMoveRsp, CStoreRq, CStoreRsp};
use dicom_connmgr::pdu::reader::{read_pdu, DEFAULT_MAX_PDU};
use dicom_connmgr::pdu::writer::write_pdu;
use dicom_connmgr::pdu::{
    AssociationAC, AssociationRQ, PDataValue, PDataValueType, PresentationContextProposed,
    PresentationContextResult, PresentationContextResultReason, Pdu, UserVariableItem,
};
use dicom_core::{dicom_value, DataElement};
use dicom_dictionary_std::{tags, uids};
use dicom_object::InMemDicomObject;

/// Read the peer's A-ASSOCIATE-RQ and reply with an A-ASSOCIATE-AC
/// accepting every proposed presentation context on its first offered
/// transfer syntax.
fn accept_association(stream: &mut TcpStream) -> AssociationRQ {
    let pdu = read_pdu(stream, DEFAULT_MAX_PDU, true).expect("read RQ");
    let Pdu::AssociationRQ(rq) = pdu else {
        panic!("expected AssociationRQ");
    };

    let presentation_contexts = rq
        .presentation_contexts
        .iter()
        .map(|pc| PresentationContextResult {
            id: pc.id,
            reason: PresentationContextResultReason::Acceptance,
            transfer_syntax: pc.transfer_syntaxes[0].clone(),
        })
        .collect();

    let ac = Pdu::AssociationAC(AssociationAC {
        protocol_version: 1,
        application_context_name: rq.application_context_name.clone(),
        called_ae_title: rq.called_ae_title.clone(),
        calling_ae_title: rq.calling_ae_title.clone(),
        presentation_contexts,
        user_variables: vec![UserVariableItem::MaxLength(DEFAULT_MAX_PDU)],
    });
    write_pdu(stream, &ac).expect("write AC");
    rq
}

fn read_command_pdvs(stream: &mut TcpStream) -> Vec<PDataValue> {
    let Pdu::PData { data } = read_pdu(stream, DEFAULT_MAX_PDU, true).expect("read PData") else {
        panic!("expected PData");
    };
    data
}

#[test]
fn send_echo_round_trips_through_a_mock_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let rq = accept_association(&mut stream);
        assert_eq!(rq.calling_ae_title.trim(), "TEST-SCU");

        let pdvs = read_command_pdvs(&mut stream);
        assert_eq!(pdvs.len(), 1);
        assert!(matches!(pdvs[0].value_type, PDataValueType::Command));

        let rsp = CEchoRsp::builder()
            .message_id_being_responded_to(1)
            .status(0x0000)
            .build();
        let data = rsp.encode(false).unwrap();
        write_pdu(
            &mut stream,
            &Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pdvs[0].presentation_context_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data,
                }],
            },
        )
        .unwrap();

        // Play along with the graceful release the manager issues on drop.
        assert!(matches!(
            read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap(),
            Pdu::ReleaseRQ
        ));
        write_pdu(&mut stream, &Pdu::ReleaseRP).unwrap();
    });

    let options = ManagerOptions::new()
        .calling_ae_title("TEST-SCU")
        .called_ae_title("TEST-SCP")
        .connect_timeout(Duration::from_secs(5));
    let mut manager = ManagerOptions::establish(options, addr, ServiceKind::Echo, None)
        .expect("association established");
    manager.send_echo().expect("C-ECHO succeeds");
    assert!(manager.release().expect("release succeeds"));

    peer.join().unwrap();
}

#[test]
fn send_find_collects_pending_results_then_stops_on_success() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        accept_association(&mut stream);

        let pdvs = read_command_pdvs(&mut stream);
        let pc_id = pdvs[0].presentation_context_id;

        for i in 0..2u16 {
            let rsp = CFindRsp::builder()
                .message_id_being_responded_to(1)
                .status(0xFF00)
                .build();
            let cmd_data = rsp.encode(true).unwrap();

            let mut identifier = InMemDicomObject::new_empty();
            identifier.put(DataElement::new(
                tags::PATIENT_NAME,
                dicom_core::VR::PN,
                dicom_value!(format!("RESULT^{i}")),
            ));
            let mut id_data = Vec::new();
            identifier
                .write_dataset_with_ts(
                    &mut id_data,
                    &dicom_transfer_syntax_registry::entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
                )
                .unwrap();

            write_pdu(
                &mut stream,
                &Pdu::PData {
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
                },
            )
            .unwrap();
        }

        let final_rsp = CFindRsp::builder()
            .message_id_being_responded_to(1)
            .status(0x0000)
            .build();
        let data = final_rsp.encode(false).unwrap();
        write_pdu(
            &mut stream,
            &Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data,
                }],
            },
        )
        .unwrap();

        assert!(matches!(
            read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap(),
            Pdu::ReleaseRQ
        ));
        write_pdu(&mut stream, &Pdu::ReleaseRP).unwrap();
    });

    let options = ManagerOptions::new().connect_timeout(Duration::from_secs(5));
    let mut manager = ManagerOptions::establish(options, addr, ServiceKind::Find, None)
        .expect("association established");

    let identifier = InMemDicomObject::new_empty();
    let results = manager.send_find(&identifier).expect("C-FIND succeeds");
    assert_eq!(results.len(), 2);

    assert!(manager.release().unwrap());
    peer.join().unwrap();
}

#[test]
fn send_store_succeeds_against_an_accepting_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let sop_class_uid = uids::SECONDARY_CAPTURE_IMAGE_STORAGE;
    let sop_instance_uid = "1.2.3.4.5.6.7.8.9";

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        accept_association(&mut stream);

        let pdvs = read_command_pdvs(&mut stream);
        let pc_id = pdvs[0].presentation_context_id;

        let rsp = CStoreRsp::builder()
            .message_id_being_responded_to(1)
            .status(0x0000)
            .build();
        let data = rsp.encode(false).unwrap();
        write_pdu(
            &mut stream,
            &Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data,
                }],
            },
        )
        .unwrap();

        assert!(matches!(
            read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap(),
            Pdu::ReleaseRQ
        ));
        write_pdu(&mut stream, &Pdu::ReleaseRP).unwrap();
    });

    let options = ManagerOptions::new().connect_timeout(Duration::from_secs(5));
    let mut manager =
        ManagerOptions::establish(options, addr, ServiceKind::Store, Some(sop_class_uid))
            .expect("association established");

    let dataset = InMemDicomObject::new_empty();
    manager
        .send_store(sop_class_uid, sop_instance_uid, &dataset)
        .expect("C-STORE succeeds");

    assert!(manager.release().unwrap());
    peer.join().unwrap();
}

#[test]
fn send_move_drives_the_secondary_connection_for_c_store_suboperations() {
    let control_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let control_addr = control_listener.local_addr().unwrap();

    // Grab a free port, then release it immediately: `establish_move` binds
    // it itself, ahead of the control association, the way it would for a
    // real move port.
    let move_port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let control_peer = thread::spawn(move || {
        let (mut stream, _) = control_listener.accept().unwrap();
        accept_association(&mut stream);

        let pdvs = read_command_pdvs(&mut stream);
        let pc_id = pdvs[0].presentation_context_id;

        let pending = CMoveRsp::builder()
            .message_id_being_responded_to(1)
            .status(0xFF00)
            .number_of_remaining_suboperations(1)
            .number_of_completed_suboperations(0)
            .number_of_failed_suboperations(0)
            .build();
        let data = pending.encode(false).unwrap();
        write_pdu(
            &mut stream,
            &Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data,
                }],
            },
        )
        .unwrap();

        let final_rsp = CMoveRsp::builder()
            .message_id_being_responded_to(1)
            .status(0x0000)
            .number_of_remaining_suboperations(0)
            .number_of_completed_suboperations(1)
            .number_of_failed_suboperations(0)
            .build();
        let data = final_rsp.encode(false).unwrap();
        write_pdu(
            &mut stream,
            &Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data,
                }],
            },
        )
        .unwrap();

        assert!(matches!(
            read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap(),
            Pdu::ReleaseRQ
        ));
        write_pdu(&mut stream, &Pdu::ReleaseRP).unwrap();
    });

    let sop_class_uid = uids::SECONDARY_CAPTURE_IMAGE_STORAGE;
    let store_peer = thread::spawn(move || {
        // Wait for `establish_move` to have bound the secondary's listener
        // before dialing in as the peer's C-STORE sub-association.
        let mut stream = loop {
            match TcpStream::connect(("127.0.0.1", move_port)) {
                Ok(s) => break s,
                Err(_) => thread::sleep(Duration::from_millis(20)),
            }
        };

        let rq = Pdu::AssociationRQ(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "TEST-SCP".to_string(),
            called_ae_title: "TEST-SCU".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: sop_class_uid.to_string(),
                transfer_syntaxes: vec![IMPLICIT_VR_LITTLE_ENDIAN.to_string()],
            }],
            user_variables: vec![UserVariableItem::MaxLength(DEFAULT_MAX_PDU)],
        });
        write_pdu(&mut stream, &rq).unwrap();

        let Pdu::AssociationAC(_) = read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap() else {
            panic!("expected AssociationAC from the secondary connection");
        };

        let cmd = CStoreRq::builder()
            .message_id(1)
            .affected_sop_class_uid(sop_class_uid)
            .affected_sop_instance_uid("1.2.3.4.5.6.7.8.9")
            .build();
        let cmd_data = cmd.encode(true).unwrap();

        let dataset = InMemDicomObject::new_empty();
        let mut ds_data = Vec::new();
        dataset
            .write_dataset_with_ts(
                &mut ds_data,
                &dicom_transfer_syntax_registry::entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
            )
            .unwrap();

        write_pdu(
            &mut stream,
            &Pdu::PData {
                data: vec![
                    PDataValue {
                        presentation_context_id: 1,
                        value_type: PDataValueType::Command,
                        is_last: true,
                        data: cmd_data,
                    },
                    PDataValue {
                        presentation_context_id: 1,
                        value_type: PDataValueType::Data,
                        is_last: true,
                        data: ds_data,
                    },
                ],
            },
        )
        .unwrap();

        let Pdu::PData { data: rsp_pdvs } = read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap()
        else {
            panic!("expected C-STORE-RSP over P-DATA-TF");
        };
        assert_eq!(rsp_pdvs.len(), 1);

        // The sub-association is done after one C-STORE: release it
        // ourselves, the secondary connection only ever answers.
        write_pdu(&mut stream, &Pdu::ReleaseRQ).unwrap();
        assert!(matches!(
            read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap(),
            Pdu::ReleaseRP
        ));
    });

    let options = ManagerOptions::new()
        .calling_ae_title("TEST-SCU")
        .called_ae_title("TEST-SCP")
        .move_port(move_port)
        .connect_timeout(Duration::from_secs(5));
    let mut manager =
        ManagerOptions::establish_move(options, control_addr).expect("move association established");

    let identifier = InMemDicomObject::new_empty();
    let summary = manager
        .send_move("TEST-SCP", &identifier)
        .expect("C-MOVE succeeds");

    assert_eq!(summary.datasets.len(), 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.final_status, 0x0000);

    assert!(manager.release().unwrap());
    control_peer.join().unwrap();
    store_peer.join().unwrap();
}

#[test]
fn abort_closes_the_connection_immediately_without_release() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        accept_association(&mut stream);

        // The manager calls abort() directly, so the peer should see an
        // A-ABORT rather than a graceful release.
        let pdu = read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap();
        assert!(matches!(pdu, Pdu::AbortRQ { .. }));
    });

    let options = ManagerOptions::new().connect_timeout(Duration::from_secs(5));
    let mut manager = ManagerOptions::establish(options, addr, ServiceKind::Echo, None)
        .expect("association established");
    manager.abort().expect("abort succeeds");

    peer.join().unwrap();
}

#[test]
fn peer_silence_during_establish_surfaces_as_an_error_and_closes_the_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = thread::spawn(move || {
        // Accept the TCP connection and read the A-ASSOCIATE-RQ, but never
        // answer: the manager is left waiting for an AC/RJ that never
        // comes, the way a peer wedged mid-negotiation would behave.
        let (mut stream, _) = listener.accept().unwrap();
        let _ = read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap();

        // The manager's own read timeout should fire and tear the
        // connection down well before this bound is reached.
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 1];
        use std::io::Read;
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    });

    let options = ManagerOptions::new().connect_timeout(Duration::from_millis(200));
    let result = ManagerOptions::establish(options, addr, ServiceKind::Echo, None);
    assert!(matches!(
        result,
        Err(dicom_connmgr::error::Error::AssociationNotEstablished { .. })
    ));

    peer.join().unwrap();
}

#[test]
fn association_rejected_by_peer_surfaces_as_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = read_pdu(&mut stream, DEFAULT_MAX_PDU, true).unwrap();
        let rj = Pdu::AssociationRJ(dicom_connmgr::pdu::AssociationRJ {
            result: dicom_connmgr::pdu::AssociationRJResult::Permanent,
            source: dicom_connmgr::pdu::AssociationRJSource::ServiceUser(
                dicom_connmgr::pdu::AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            ),
        });
        write_pdu(&mut stream, &rj).unwrap();
    });

    let options = ManagerOptions::new().connect_timeout(Duration::from_secs(5));
    let result = ManagerOptions::establish(options, addr, ServiceKind::Echo, None);
    assert!(matches!(
        result,
        Err(dicom_connmgr::error::Error::AssociationRejected { .. })
    ));

    peer.join().unwrap();
}
