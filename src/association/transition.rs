//! The association state transition table (PS3.8 Table 9-4), as a pure
//! dispatch function over `(event, state)`.
//!
//! Unlike a lookup table keyed by two enums, this is implemented as a
//! `match` over `(state, event)`, which the compiler can check for
//! exhaustiveness; the effect is the same data-driven table the standard
//! describes, just expressed the idiomatic way. Actions never block on a
//! read; all reads happen in the event loop (component G).

use std::time::Duration;

use crate::pdu::{AbortRQSource, PresentationContextResultReason, Pdu};

use super::connection::{self, Connection, NegotiatedPresentationContext};
use super::event::{EventId, ULEvent};
use super::state::StateId;

/// The default ARTIM timeout: how long to wait for a peer response before
/// aborting the connection.
pub const ARTIM_TIMEOUT: Duration = Duration::from_secs(30);

/// The protocol action selected by the table for a given `(event, state)`
/// pair, named after its PS3.8 designation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// AE-2: send A-ASSOCIATE-RQ, arm ARTIM, await AC/RJ.
    Ae2,
    /// AE-3: A-ASSOCIATE-AC received, association is now usable.
    Ae3,
    /// AE-4: A-ASSOCIATE-RJ received, transport closed.
    Ae4,
    /// AE-6: accept an incoming A-ASSOCIATE-RQ, respond with -AC.
    Ae6,
    /// AE-7/AE-8: respond to an incoming association with rejection.
    Ae8,
    /// DT-1: send P-DATA-TF.
    Dt1,
    /// DT-2: P-DATA-TF received; handled by the event loop, not here.
    Dt2,
    /// AR-1: send A-RELEASE-RQ, await -RP.
    Ar1,
    /// AR-2: A-RELEASE-RP received, association released.
    Ar2,
    /// AR-3+AR-4 combined: an incoming A-RELEASE-RQ is answered
    /// immediately with A-RELEASE-RP (no higher-layer approval step,
    /// matching the minimal SCP role of the secondary connection).
    Ar3Ar4,
    /// AA-1: send A-ABORT in response to an invalid/unexpected PDU.
    Aa1,
    /// AA-2: ARTIM expired, transport closed without notification.
    Aa2,
    /// AA-3: A-ABORT received from peer, transport closed.
    Aa3,
    /// AA-4: transport closed while awaiting a response.
    Aa4,
    /// No action: the event does not change protocol state.
    None,
}

/// The outcome of applying one event to a connection: the action taken,
/// the resulting state, and whether the event loop should now block on a
/// read rather than process another locally raised event.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub action: Action,
    pub next_state: StateId,
    pub waiting_for_peer: bool,
}

/// Apply `event` to `conn`, executing whatever action the table selects
/// (writing a PDU, arming/disarming the timer, closing the transport) and
/// returning the resulting transition.
///
/// `outbound` supplies the PDU to send for locally raised events that
/// require one (`AAssociateReqLocal` needs the A-ASSOCIATE-RQ built by the
/// association builder; `PDataReqLocal` needs the P-DATA-TF built by the
/// PDU factory). It is ignored for events that carry their own PDU
/// (`*Recv` events) or that need none (`AReleaseReqLocal`, `AAbortReqLocal`).
pub fn step(
    conn: &mut Connection,
    event: &ULEvent,
    outbound: Option<&Pdu>,
) -> connection::Result<Transition> {
    let state = conn.state();

    let transition = match (state, event.event_id) {
        // --- Association establishment, SCU side ---
        (StateId::Sta2TransportOpen, EventId::AAssociateReqLocal) => {
            let pdu = outbound.expect("AAssociateReqLocal requires an outbound PDU");
            if let Pdu::AssociationRQ(rq) = pdu {
                conn.set_proposed_presentation_contexts(rq.presentation_contexts.clone());
            }
            conn.write_pdu(pdu)?;
            conn.arm_timer(ARTIM_TIMEOUT);
            Transition {
                action: Action::Ae2,
                next_state: StateId::Sta5AwaitingAssocAC,
                waiting_for_peer: true,
            }
        }
        (StateId::Sta5AwaitingAssocAC, EventId::AAssociateAcRecv) => {
            conn.clear_timer();
            if let Some(Pdu::AssociationAC(ac)) = &event.pdu {
                let proposed = conn.proposed_presentation_contexts().to_vec();
                let negotiated = ac
                    .presentation_contexts
                    .iter()
                    .map(|pc| NegotiatedPresentationContext {
                        id: pc.id,
                        abstract_syntax_uid: proposed
                            .iter()
                            .find(|p| p.id == pc.id)
                            .map(|p| p.abstract_syntax.clone())
                            .unwrap_or_default(),
                        transfer_syntax_uid: Some(pc.transfer_syntax.clone()),
                        accepted: matches!(pc.reason, PresentationContextResultReason::Acceptance),
                    })
                    .collect();
                conn.set_presentation_contexts(negotiated);
                if let Some(peer_max) = ac.user_variables.iter().find_map(|v| match v {
                    crate::pdu::UserVariableItem::MaxLength(n) => Some(*n),
                    _ => None,
                }) {
                    conn.set_peer_max_pdu_length(peer_max);
                }
            }
            Transition {
                action: Action::Ae3,
                next_state: StateId::Sta6TransferReady,
                waiting_for_peer: false,
            }
        }
        (StateId::Sta5AwaitingAssocAC, EventId::AAssociateRjRecv) => {
            conn.clear_timer();
            if let Some(pdu) = &event.pdu {
                conn.set_last_received_pdu(pdu.clone());
            }
            conn.close();
            Transition {
                action: Action::Ae4,
                next_state: StateId::Sta1Idle,
                waiting_for_peer: false,
            }
        }

        // --- Association establishment, minimal SCP side (secondary) ---
        (StateId::Sta2TransportOpen, EventId::TransportConnIndication) => Transition {
            action: Action::None,
            next_state: StateId::Sta2TransportOpen,
            waiting_for_peer: true,
        },

        // --- Data transfer ---
        (StateId::Sta6TransferReady, EventId::PDataReqLocal) => {
            let pdu = outbound.expect("PDataReqLocal requires an outbound PDU");
            conn.write_pdu(pdu)?;
            Transition {
                action: Action::Dt1,
                next_state: StateId::Sta6TransferReady,
                waiting_for_peer: true,
            }
        }
        (StateId::Sta6TransferReady, EventId::PDataTfRecv) => Transition {
            action: Action::Dt2,
            next_state: StateId::Sta6TransferReady,
            waiting_for_peer: false,
        },

        // --- Release ---
        (StateId::Sta6TransferReady, EventId::AReleaseReqLocal) => {
            conn.write_pdu(&Pdu::ReleaseRQ)?;
            conn.arm_timer(ARTIM_TIMEOUT);
            Transition {
                action: Action::Ar1,
                next_state: StateId::Sta7AwaitingReleaseRP,
                waiting_for_peer: true,
            }
        }
        (StateId::Sta7AwaitingReleaseRP, EventId::AReleaseRpRecv) => {
            conn.close();
            Transition {
                action: Action::Ar2,
                next_state: StateId::Sta1Idle,
                waiting_for_peer: false,
            }
        }
        (StateId::Sta6TransferReady, EventId::AReleaseRqRecv) => {
            // The secondary connection never issues A-RELEASE-Req itself;
            // an incoming A-RELEASE-RQ is answered immediately instead.
            conn.write_pdu(&Pdu::ReleaseRP)?;
            conn.close();
            Transition {
                action: Action::Ar3Ar4,
                next_state: StateId::Sta1Idle,
                waiting_for_peer: false,
            }
        }

        // --- Abort, locally raised ---
        (_, EventId::AAbortReqLocal) => {
            let _ = conn.write_pdu(&Pdu::AbortRQ {
                source: AbortRQSource::ServiceUser,
            });
            conn.close();
            Transition {
                action: Action::Aa1,
                next_state: StateId::StaDoesNotExist,
                waiting_for_peer: false,
            }
        }

        // --- Abort / timer / transport close, any awaiting state ---
        (_, EventId::AAbortRecv) => {
            conn.close();
            Transition {
                action: Action::Aa3,
                next_state: StateId::Sta1Idle,
                waiting_for_peer: false,
            }
        }
        (_, EventId::ArtimExpired) => {
            conn.close();
            Transition {
                action: Action::Aa2,
                next_state: StateId::Sta1Idle,
                waiting_for_peer: false,
            }
        }
        (_, EventId::TransportClose) => {
            conn.close();
            Transition {
                action: Action::Aa4,
                next_state: StateId::Sta1Idle,
                waiting_for_peer: false,
            }
        }

        // --- Anything else is an unrecognised/unexpected PDU: abort ---
        (_, EventId::InvalidPdu) | (_, _) => {
            let _ = conn.write_pdu(&Pdu::AbortRQ {
                source: AbortRQSource::ServiceProvider(
                    crate::pdu::AbortRQServiceProviderReason::UnexpectedPdu,
                ),
            });
            conn.arm_timer(ARTIM_TIMEOUT);
            conn.close();
            Transition {
                action: Action::Aa1,
                next_state: StateId::Sta13AwaitingClose,
                waiting_for_peer: false,
            }
        }
    };

    conn.set_state(transition.next_state);
    Ok(transition)
}

/// Accept an incoming association on the secondary connection: read the
/// A-ASSOCIATE-RQ's presentation contexts are negotiated by the caller
/// (the association builder), this only performs the bookkeeping common
/// to AE-6: move from `Sta2TransportOpen`/`Sta3AwaitingLocalAssocRsp` to
/// `Sta6TransferReady` once the A-ASSOCIATE-AC has been sent.
pub fn accept_association(conn: &mut Connection, ac: &Pdu) -> connection::Result<()> {
    conn.write_pdu(ac)?;
    conn.set_state(StateId::Sta6TransferReady);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::pdu::reader::{read_pdu, DEFAULT_MAX_PDU};
    use crate::pdu::writer::write_pdu;

    fn connected_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut conn = Connection::new("LOCAL", "REMOTE");
        conn.open(addr, Duration::from_secs(5)).unwrap();
        let (peer, _) = listener.accept().unwrap();
        (conn, peer)
    }

    #[rstest]
    #[case(StateId::Sta2TransportOpen)]
    #[case(StateId::Sta5AwaitingAssocAC)]
    #[case(StateId::Sta6TransferReady)]
    #[case(StateId::Sta7AwaitingReleaseRP)]
    fn local_abort_closes_the_connection_from_any_state(#[case] state: StateId) {
        let (mut conn, _peer) = connected_pair();
        conn.set_state(state);

        let transition = step(&mut conn, &ULEvent::bare(EventId::AAbortReqLocal), None).unwrap();

        assert_eq!(transition.action, Action::Aa1);
        assert_eq!(transition.next_state, StateId::StaDoesNotExist);
        assert!(!conn.is_open());
    }

    #[rstest]
    #[case(StateId::Sta5AwaitingAssocAC)]
    #[case(StateId::Sta6TransferReady)]
    #[case(StateId::Sta7AwaitingReleaseRP)]
    fn artim_expiry_closes_without_notifying_the_peer(#[case] state: StateId) {
        let mut conn = Connection::new("LOCAL", "REMOTE");
        conn.set_state(state);

        let transition = step(&mut conn, &ULEvent::bare(EventId::ArtimExpired), None).unwrap();

        assert_eq!(transition.action, Action::Aa2);
        assert_eq!(transition.next_state, StateId::Sta1Idle);
        assert!(!conn.is_open());
    }

    #[rstest]
    #[case(StateId::Sta2TransportOpen)]
    #[case(StateId::Sta5AwaitingAssocAC)]
    #[case(StateId::Sta6TransferReady)]
    fn transport_close_tears_down_from_any_awaiting_state(#[case] state: StateId) {
        let mut conn = Connection::new("LOCAL", "REMOTE");
        conn.set_state(state);

        let transition = step(&mut conn, &ULEvent::bare(EventId::TransportClose), None).unwrap();

        assert_eq!(transition.action, Action::Aa4);
        assert_eq!(transition.next_state, StateId::Sta1Idle);
    }

    #[test]
    fn release_request_arms_the_artim_timer() {
        let (mut conn, _peer) = connected_pair();
        conn.set_state(StateId::Sta6TransferReady);

        let transition =
            step(&mut conn, &ULEvent::bare(EventId::AReleaseReqLocal), None).unwrap();

        assert_eq!(transition.next_state, StateId::Sta7AwaitingReleaseRP);
        assert!(conn.timer_is_armed());
    }

    #[test]
    fn release_round_trip_reaches_idle() {
        let (mut conn, mut peer) = connected_pair();
        conn.set_state(StateId::Sta6TransferReady);

        let transition =
            step(&mut conn, &ULEvent::bare(EventId::AReleaseReqLocal), None).unwrap();
        assert_eq!(transition.action, Action::Ar1);
        assert_eq!(transition.next_state, StateId::Sta7AwaitingReleaseRP);

        assert!(matches!(
            read_pdu(&mut peer, DEFAULT_MAX_PDU, true).unwrap(),
            Pdu::ReleaseRQ
        ));
        write_pdu(&mut peer, &Pdu::ReleaseRP).unwrap();

        let pdu = conn.read_pdu().unwrap();
        let event_id = super::super::pdu_factory::determine_event_by_pdu(&pdu);
        let transition = step(&mut conn, &ULEvent::with_pdu(event_id, pdu), None).unwrap();
        assert_eq!(transition.action, Action::Ar2);
        assert_eq!(transition.next_state, StateId::Sta1Idle);
    }
}
