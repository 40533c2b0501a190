/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Integration tests for the peer connection engine, driven over loopback transports.

mod common;

use classroom_rtc::{
    CaptureIntent, MediaKind, NegotiationRole, NegotiationState, ParticipantRole, PeerError,
    RemoteStream, SessionDescription, SessionEvent, Signal, SignalKind, SignalingMessage,
};
use classroom_rtc::constants::MAX_PARKED_CANDIDATES_PER_PEER;
use common::{candidate, candidate_in, drain, Harness};

fn answer(from: &str, to: &str) -> SignalingMessage {
    SignalingMessage::new(
        from,
        to,
        Signal::Answer(SessionDescription::answer("v=0\r\ns=-\r\n")),
    )
}

fn offer(from: &str, to: &str) -> SignalingMessage {
    SignalingMessage::new(
        from,
        to,
        Signal::Offer(SessionDescription::offer(
            "v=0\r\ns=-\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n",
        )),
    )
}

fn offer_with_ufrag(from: &str, to: &str, ufrag: &str) -> SignalingMessage {
    SignalingMessage::new(
        from,
        to,
        Signal::Offer(SessionDescription::offer(format!(
            "v=0\r\ns=-\r\na=ice-ufrag:{ufrag}\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n"
        ))),
    )
}

fn trickle(from: &str, to: &str, n: u16) -> SignalingMessage {
    SignalingMessage::new(from, to, Signal::Candidate(candidate(n)))
}

/// Offers from `a` to `b`, feeds back an answer and processes transport events.
async fn connect(harness: &mut Harness, peer_id: &str) {
    let local = harness.manager.local_peer_id().to_string();
    harness.manager.create_offer(peer_id).await.unwrap();
    harness
        .manager
        .handle_signaling_message(answer(peer_id, &local))
        .await
        .unwrap();
    harness.manager.process_transport_events();
    assert_eq!(harness.manager.state(peer_id), Some(NegotiationState::Connected));
}

#[tokio::test]
async fn test_create_offer_attaches_media_and_sends_offer() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.hardware
        .acquire(CaptureIntent::new(true, true), false)
        .await
        .unwrap();
    let mut rx = a.subscribe();

    a.manager.create_offer("b").await.unwrap();

    let outbox = a.take_outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].kind(), SignalKind::Offer);
    assert_eq!((outbox[0].from.as_str(), outbox[0].to.as_str()), ("a", "b"));
    assert_eq!(a.manager.state("b"), Some(NegotiationState::Negotiating));

    let transport = a.factory.latest("b").unwrap();
    assert_eq!(
        transport.attached_kinds(),
        vec![MediaKind::Camera, MediaKind::Microphone]
    );
    assert_eq!(transport.data_channels(), vec!["sync".to_string()]);
    assert!(transport.local_description().unwrap().sdp.contains("m=video"));
    assert_eq!(drain(&mut rx), vec![SessionEvent::PeerNegotiating("b".into())]);

    // The host candidate gathered on set_local_description is trickled out
    a.manager.process_transport_events();
    let outbox = a.take_outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].kind(), SignalKind::Candidate);
}

#[tokio::test]
async fn test_double_create_offer_leaves_one_record() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.manager.create_offer("b").await.unwrap();
    let first = a.factory.latest("b").unwrap();
    a.manager.create_offer("b").await.unwrap();
    let second = a.factory.latest("b").unwrap();

    assert_eq!(a.manager.len(), 1);
    assert_eq!(a.factory.created_count(), 2);
    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(
        a.manager.peer("b").unwrap().generation(),
        second.generation()
    );
    assert_eq!(a.manager.state("b"), Some(NegotiationState::Negotiating));
}

#[tokio::test]
async fn test_candidates_before_answer_are_applied_in_order() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.manager.create_offer("b").await.unwrap();

    for n in 1..=3 {
        a.manager
            .handle_signaling_message(trickle("b", "a", n))
            .await
            .unwrap();
    }
    let record = a.manager.peer("b").unwrap().record().clone();
    assert_eq!(record.pending_ice_candidates().len(), 3);
    let transport = a.factory.latest("b").unwrap();
    assert!(transport.applied_candidates().is_empty());

    a.manager
        .handle_signaling_message(answer("b", "a"))
        .await
        .unwrap();
    assert_eq!(
        transport.applied_candidates(),
        vec![candidate(1), candidate(2), candidate(3)]
    );
    let record = a.manager.peer("b").unwrap().record();
    assert!(record.pending_ice_candidates().is_empty());
    assert_eq!(record.applied_candidates(), 3);

    // Later candidates go straight in
    a.manager
        .handle_signaling_message(trickle("b", "a", 4))
        .await
        .unwrap();
    assert_eq!(transport.applied_candidates().len(), 4);
}

#[tokio::test]
async fn test_candidates_before_offer_are_parked_for_the_answerer() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    b.manager
        .handle_signaling_message(trickle("a", "b", 1))
        .await
        .unwrap();
    b.manager
        .handle_signaling_message(trickle("a", "b", 2))
        .await
        .unwrap();
    assert!(b.manager.is_empty());

    b.manager
        .handle_signaling_message(offer("a", "b"))
        .await
        .unwrap();
    let transport = b.factory.latest("a").unwrap();
    assert_eq!(transport.applied_candidates(), vec![candidate(1), candidate(2)]);
    assert_eq!(b.manager.peer("a").unwrap().role(), NegotiationRole::Answerer);

    let outbox = b.take_outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].kind(), SignalKind::Answer);
    assert_eq!(outbox[0].to, "a");
}

#[tokio::test]
async fn test_late_candidate_after_cleanup_stays_out_of_next_session() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    b.manager
        .handle_signaling_message(offer("a", "b"))
        .await
        .unwrap();
    assert!(b.manager.cleanup("a"));

    // Trails behind the session that was just torn down
    b.manager
        .handle_signaling_message(trickle("a", "b", 9))
        .await
        .unwrap();
    b.manager
        .handle_signaling_message(offer("a", "b"))
        .await
        .unwrap();

    assert_eq!(b.factory.created_count(), 2);
    let transport = b.factory.latest("a").unwrap();
    assert!(transport.applied_candidates().is_empty());

    // Candidates of the new session still flow
    b.manager
        .handle_signaling_message(trickle("a", "b", 10))
        .await
        .unwrap();
    assert_eq!(transport.applied_candidates(), vec![candidate(10)]);
}

#[tokio::test]
async fn test_parked_candidates_of_another_ice_session_are_dropped() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    for message in [
        SignalingMessage::new("a", "b", Signal::Candidate(candidate_in(1, "old"))),
        SignalingMessage::new("a", "b", Signal::Candidate(candidate_in(2, "s2"))),
    ] {
        b.manager.handle_signaling_message(message).await.unwrap();
    }

    b.manager
        .handle_signaling_message(offer_with_ufrag("a", "b", "s2"))
        .await
        .unwrap();
    let transport = b.factory.latest("a").unwrap();
    assert_eq!(transport.applied_candidates(), vec![candidate_in(2, "s2")]);
}

#[tokio::test]
async fn test_candidate_for_previous_ice_session_is_not_applied() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    b.manager
        .handle_signaling_message(offer_with_ufrag("a", "b", "s2"))
        .await
        .unwrap();
    for (n, ufrag) in [(3, "s1"), (4, "s2")] {
        b.manager
            .handle_signaling_message(SignalingMessage::new(
                "a",
                "b",
                Signal::Candidate(candidate_in(n, ufrag)),
            ))
            .await
            .unwrap();
    }
    let transport = b.factory.latest("a").unwrap();
    assert_eq!(transport.applied_candidates(), vec![candidate_in(4, "s2")]);
}

#[tokio::test]
async fn test_parked_candidates_are_bounded_per_peer() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    let flood = MAX_PARKED_CANDIDATES_PER_PEER as u16 + 5;
    for n in 1..=flood {
        b.manager
            .handle_signaling_message(trickle("a", "b", n))
            .await
            .unwrap();
    }
    b.manager
        .handle_signaling_message(offer("a", "b"))
        .await
        .unwrap();

    let applied = b.factory.latest("a").unwrap().applied_candidates();
    assert_eq!(applied.len(), MAX_PARKED_CANDIDATES_PER_PEER);
    assert_eq!(applied[0], candidate(1));
}

#[tokio::test]
async fn test_answerer_connects_and_opens_channel_from_transport_events() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    let mut rx = b.subscribe();
    b.manager
        .handle_signaling_message(offer("a", "b"))
        .await
        .unwrap();
    assert_eq!(b.manager.state("a"), Some(NegotiationState::Negotiating));
    assert!(!b.manager.peer("a").unwrap().is_data_channel_open());

    b.manager.process_transport_events();
    assert_eq!(b.manager.state("a"), Some(NegotiationState::Connected));
    assert!(b.manager.peer("a").unwrap().is_data_channel_open());
    assert!(b.factory.latest("a").unwrap().data_channels().is_empty());
    assert_eq!(
        drain(&mut rx),
        vec![
            SessionEvent::PeerNegotiating("a".into()),
            SessionEvent::PeerConnected("a".into()),
            SessionEvent::DataChannelOpen("a".into()),
        ]
    );
}

#[tokio::test]
async fn test_unexpected_answers_are_rejected_without_teardown() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    let err = b
        .manager
        .handle_signaling_message(answer("c", "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::UnexpectedSignal { kind: SignalKind::Answer, .. }));

    b.manager
        .handle_signaling_message(offer("a", "b"))
        .await
        .unwrap();
    let err = b
        .manager
        .handle_signaling_message(answer("a", "b"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PeerError::UnexpectedSignal {
            peer_id: "a".into(),
            kind: SignalKind::Answer,
            state: NegotiationState::Negotiating,
        }
    );
    assert_eq!(b.manager.state("a"), Some(NegotiationState::Negotiating));
}

#[tokio::test]
async fn test_misrouted_message_is_rejected() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    let err = b
        .manager
        .handle_signaling_message(offer("a", "z"))
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::Misrouted { .. }));
    assert!(b.manager.is_empty());
    assert_eq!(b.factory.created_count(), 0);
}

#[tokio::test]
async fn test_cleanup_is_idempotent_and_clears_registry() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    connect(&mut a, "b").await;
    let transport = a.factory.latest("b").unwrap();
    transport.inject_remote_track(RemoteStream::new("stream-b", vec![MediaKind::Camera]));
    a.manager.process_transport_events();
    assert!(a.registry.contains("b"));
    let mut rx = a.subscribe();

    assert!(a.manager.cleanup("b"));
    assert!(transport.is_closed());
    assert!(a.registry.is_empty());
    assert!(a.manager.state("b").is_none());
    assert_eq!(
        drain(&mut rx),
        vec![
            SessionEvent::RemoteStreamRemoved("b".into()),
            SessionEvent::PeerClosed("b".into()),
        ]
    );

    assert!(!a.manager.cleanup("b"));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_later_remote_track_replaces_entry() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    connect(&mut a, "b").await;
    let transport = a.factory.latest("b").unwrap();

    transport.inject_remote_track(RemoteStream::new("audio-b", vec![MediaKind::Microphone]));
    transport.inject_remote_track(RemoteStream::new(
        "av-b",
        vec![MediaKind::Microphone, MediaKind::Camera],
    ));
    a.manager.process_transport_events();

    assert_eq!(a.registry.len(), 1);
    let entry = a.registry.get("b").unwrap();
    assert_eq!(entry.stream.stream_id, "av-b");
    assert!(entry.stream.has(MediaKind::Camera));
}

#[tokio::test]
async fn test_failure_before_connect_reports_negotiation_failed() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.factory.set_auto_connect(false);
    a.manager.create_offer("b").await.unwrap();
    a.manager
        .handle_signaling_message(answer("b", "a"))
        .await
        .unwrap();
    let transport = a.factory.latest("b").unwrap();
    let mut rx = a.subscribe();

    transport.fail();
    a.manager.process_transport_events();

    let events = drain(&mut rx);
    assert!(matches!(
        &events[0],
        SessionEvent::PeerFailed { peer_id, error: PeerError::NegotiationFailed { .. } } if peer_id == "b"
    ));
    assert_eq!(events[1], SessionEvent::PeerClosed("b".into()));
    assert!(a.manager.is_empty());
    assert!(transport.is_closed());
}

#[tokio::test]
async fn test_disconnect_after_connect_reports_transport_disconnected() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    connect(&mut a, "b").await;
    let transport = a.factory.latest("b").unwrap();
    let mut rx = a.subscribe();

    transport.disconnect();
    a.manager.process_transport_events();

    let events = drain(&mut rx);
    assert!(matches!(
        &events[0],
        SessionEvent::PeerFailed { error: PeerError::TransportDisconnected { .. }, .. }
    ));
    assert!(a.manager.state("b").is_none());
}

#[tokio::test]
async fn test_manual_connect_needs_both_descriptions() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.factory.set_auto_connect(false);
    a.manager.create_offer("b").await.unwrap();
    let transport = a.factory.latest("b").unwrap();

    transport.connect();
    a.manager.process_transport_events();
    assert_eq!(a.manager.state("b"), Some(NegotiationState::Negotiating));

    a.manager
        .handle_signaling_message(answer("b", "a"))
        .await
        .unwrap();
    assert_eq!(a.manager.state("b"), Some(NegotiationState::Connected));
}

#[tokio::test]
async fn test_events_from_superseded_transport_are_ignored() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.manager.create_offer("b").await.unwrap();
    let stale = a.factory.latest("b").unwrap();
    a.manager.create_offer("b").await.unwrap();
    a.manager.process_transport_events();
    let mut rx = a.subscribe();

    stale.inject_remote_track(RemoteStream::new("ghost", vec![MediaKind::Camera]));
    stale.fail();
    assert_eq!(a.manager.process_transport_events(), 2);

    assert!(a.registry.is_empty());
    assert_eq!(a.manager.state("b"), Some(NegotiationState::Negotiating));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_offer_collision_resolved_in_favour_of_teacher() {
    let mut teacher = Harness::new("t", ParticipantRole::Teacher);
    let mut student = Harness::new("s", ParticipantRole::Student);

    teacher.manager.create_offer("s").await.unwrap();
    student.manager.create_offer("t").await.unwrap();
    let teacher_offer = teacher.take_outbox().remove(0);
    let student_offer = student.take_outbox().remove(0);

    // The teacher ignores the colliding offer
    teacher
        .manager
        .handle_signaling_message(student_offer)
        .await
        .unwrap();
    assert_eq!(teacher.manager.peer("s").unwrap().role(), NegotiationRole::Offerer);
    assert!(teacher.take_outbox().is_empty());

    // The student drops its own offer and answers
    student
        .manager
        .handle_signaling_message(teacher_offer)
        .await
        .unwrap();
    assert_eq!(student.manager.peer("t").unwrap().role(), NegotiationRole::Answerer);
    let reply = student.take_outbox().remove(0);
    assert_eq!(reply.kind(), SignalKind::Answer);

    teacher.manager.handle_signaling_message(reply).await.unwrap();
    teacher.manager.process_transport_events();
    assert_eq!(teacher.manager.state("s"), Some(NegotiationState::Connected));
}

#[tokio::test]
async fn test_offer_on_established_connection_replaces_it() {
    let mut b = Harness::new("b", ParticipantRole::Student);
    b.manager
        .handle_signaling_message(offer("a", "b"))
        .await
        .unwrap();
    b.manager.process_transport_events();
    let first = b.factory.latest("a").unwrap();

    b.manager
        .handle_signaling_message(offer("a", "b"))
        .await
        .unwrap();
    assert!(first.is_closed());
    assert_eq!(b.manager.len(), 1);
    assert_eq!(b.manager.state("a"), Some(NegotiationState::Negotiating));
}

#[tokio::test]
async fn test_send_data_requires_open_channel() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    assert!(!a.manager.send_data("b", b"nobody").await);

    a.manager.create_offer("b").await.unwrap();
    assert!(!a.manager.send_data("b", b"too early").await);
    assert!(a.factory.latest("b").unwrap().sent_payloads().is_empty());

    a.manager
        .handle_signaling_message(answer("b", "a"))
        .await
        .unwrap();
    a.manager.process_transport_events();
    assert!(a.manager.send_data("b", b"stroke").await);
    assert_eq!(
        a.factory.latest("b").unwrap().sent_payloads(),
        vec![b"stroke".to_vec()]
    );
}

#[tokio::test]
async fn test_send_json_and_broadcast() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    connect(&mut a, "s1").await;
    connect(&mut a, "s2").await;
    a.manager.create_offer("s3").await.unwrap();

    assert_eq!(a.manager.broadcast_data(b"slide 4").await, 2);
    assert!(a
        .manager
        .send_json("s1", &serde_json::json!({ "type": "chat", "text": "hi" }))
        .await
        .unwrap());
    let sent = a.factory.latest("s1").unwrap().sent_payloads();
    assert_eq!(sent.len(), 2);
    let chat: serde_json::Value = serde_json::from_slice(&sent[1]).unwrap();
    assert_eq!(chat["text"], "hi");
}

#[tokio::test]
async fn test_inbound_data_reaches_callback_with_sender() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    connect(&mut a, "b").await;
    a.factory.latest("b").unwrap().inject_data(b"ink".to_vec());
    a.manager.process_transport_events();
    assert_eq!(
        a.received.borrow().as_slice(),
        &[("b".to_string(), b"ink".to_vec())]
    );
}

#[tokio::test]
async fn test_bad_remote_description_fails_and_cleans_up() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.manager.create_offer("b").await.unwrap();
    a.factory.set_fail_remote_description(true);
    let mut rx = a.subscribe();

    let err = a
        .manager
        .handle_signaling_message(answer("b", "a"))
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::NegotiationFailed { .. }));
    assert!(a.manager.is_empty());
    assert!(matches!(drain(&mut rx)[0], SessionEvent::PeerFailed { .. }));
}

#[tokio::test]
async fn test_transport_creation_failure() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.factory.set_fail_create(true);
    let err = a.manager.create_offer("b").await.unwrap_err();
    assert!(err.is_fatal());
    assert!(a.manager.is_empty());
    assert!(a.take_outbox().is_empty());
}

#[tokio::test]
async fn test_next_transport_event_waits_for_the_transport() {
    let mut a = Harness::new("a", ParticipantRole::Teacher);
    a.manager.create_offer("b").await.unwrap();
    assert!(a.manager.next_transport_event().await);
    assert_eq!(a.take_outbox()[0].kind(), SignalKind::Candidate);
}
