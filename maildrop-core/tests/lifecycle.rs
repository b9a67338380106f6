//! End-to-end session lifecycle tests against the in-memory engine.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use maildrop_core::{Error, Session};
use maildrop_engine::mem::MemEngine;
use maildrop_engine::{CallbackReply, Engine, EventData, MsgId, Transport, names};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn engine() -> Arc<MemEngine> {
    init_tracing();
    Arc::new(MemEngine::new())
}

fn open(engine: &Arc<MemEngine>) -> Session {
    let session = Session::open(
        Arc::clone(engine) as Arc<dyn Engine>,
        Path::new("/tmp/acct.db"),
    )
    .unwrap();
    session.log().set_timeout(Some(Duration::from_secs(5)));
    session
}

/// Open, configure with valid credentials, start, and wait until the
/// engine reports configuration done.
fn started(engine: &Arc<MemEngine>) -> Session {
    let session = open(engine);
    session.set_config("addr", "me@example.org").unwrap();
    session.set_config("mail_pw", "hunter2").unwrap();
    session.start();
    loop {
        let ev = session.log().get_matching(names::CONFIGURE_PROGRESS).unwrap();
        if ev.data1 == EventData::Int(1000) {
            break;
        }
    }
    session
}

#[test]
fn start_registers_sink_and_runs_both_transports() {
    let engine = engine();
    let session = started(&engine);
    let id = session.id();
    assert!(engine.has_sink(id));

    // Both workers complete at least their first round.
    let deadline = Instant::now() + Duration::from_secs(5);
    while (engine.jobs_performed(id, Transport::Inbound) == 0
        || engine.jobs_performed(id, Transport::Outbound) == 0
        || engine.fetch_count(id) == 0)
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(engine.jobs_performed(id, Transport::Inbound) >= 1);
    assert!(engine.jobs_performed(id, Transport::Outbound) >= 1);

    session.shutdown();
    assert!(!engine.has_sink(id));
    assert!(!engine.is_open(id));
}

#[test]
fn immediate_shutdown_joins_workers_without_hanging() {
    let engine = engine();
    let session = open(&engine);
    session.start();
    let start = Instant::now();
    session.shutdown();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!engine.is_open(session.id()));
}

#[test]
fn shutdown_before_start_is_a_noop() {
    let engine = engine();
    let session = open(&engine);
    session.shutdown();
    session.shutdown();
}

#[test]
fn events_arrive_in_emission_order() {
    let engine = engine();
    let session = started(&engine);
    engine
        .emit(session.id(), "A", EventData::Int(1), EventData::Int(2))
        .unwrap();
    engine
        .emit(session.id(), "B", EventData::Int(3), EventData::Int(4))
        .unwrap();
    let first = session.log().get_matching("A").unwrap();
    assert_eq!((first.data1, first.data2), (EventData::Int(1), EventData::Int(2)));
    let second = session.log().get(None, true).unwrap();
    assert_eq!(second.name, "B");
    session.shutdown();
}

#[test]
fn empty_log_get_times_out_within_bound() {
    let engine = engine();
    let session = open(&engine);
    let start = Instant::now();
    let err = session
        .log()
        .get(Some(Duration::from_millis(50)), true)
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn failed_configuration_surfaces_as_error_event_only() {
    let engine = engine();
    let session = open(&engine);
    // No addr/mail_pw: start succeeds, the failure arrives in the log.
    session.start();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match session.log().get(Some(Duration::from_millis(100)), true) {
            Err(Error::Protocol { name, data2, .. }) => {
                assert_eq!(name, names::ERROR);
                assert!(matches!(data2, EventData::Text(_)));
                break;
            }
            Ok(_) => {}
            Err(Error::Timeout) => assert!(Instant::now() < deadline, "no error event"),
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }
    session.shutdown();
}

#[test]
fn sent_text_is_delivered_by_the_outbound_worker() {
    let engine = engine();
    let session = started(&engine);
    let contact = session.create_contact("bob@example.org", Some("Bob")).unwrap();
    let chat = session.create_chat_by_contact(&contact).unwrap();
    let message = chat.send_text("hi bob").unwrap();

    let ev = session.log().get_matching(names::MSG_DELIVERED).unwrap();
    assert_eq!(ev.data1, EventData::Int(i64::from(chat.id().0)));
    assert_eq!(ev.data2, EventData::Int(i64::from(message.id().0)));
    assert!(engine.is_delivered(session.id(), message.id()));

    drop(message);
    drop(contact);
    session.shutdown();
}

#[test]
fn staged_incoming_flows_through_the_inbound_worker() {
    let engine = engine();
    let session = started(&engine);
    let contact = session.create_contact("carol@example.org", None).unwrap();
    let chat = session.create_chat_by_contact(&contact).unwrap();
    engine
        .stage_incoming(session.id(), chat.id(), "hello there")
        .unwrap();

    let ev = session.log().get_matching(names::INCOMING_MSG).unwrap();
    assert_eq!(ev.data1, EventData::Int(i64::from(chat.id().0)));
    let EventData::Int(msg_id) = ev.data2 else {
        panic!("expected message id in data2");
    };
    let message = session.message(MsgId(u32::try_from(msg_id).unwrap()));
    assert_eq!(message.text().unwrap(), "hello there");

    drop(message);
    session.shutdown();
}

#[test]
fn http_get_request_with_dead_host_answers_empty_bytes() {
    let engine = engine();
    let session = started(&engine);
    let reply = engine
        .emit(
            session.id(),
            names::HTTP_GET,
            EventData::Text("http://127.0.0.1:1/content".into()),
            EventData::None,
        )
        .unwrap();
    assert_eq!(reply, CallbackReply::Bytes(Vec::new()));
    // The request was still logged like any other event.
    let ev = session.log().get_matching(names::HTTP_GET).unwrap();
    assert_eq!(ev.data1, EventData::Text("http://127.0.0.1:1/content".into()));
    session.shutdown();
}

#[test]
fn custom_handler_registered_at_open_answers_events() {
    let engine = engine();
    let session = Session::open_with(
        Arc::clone(&engine) as Arc<dyn Engine>,
        Path::new("/tmp/acct.db"),
        Some("custom"),
        |router| {
            router.register("ping", |_, _| CallbackReply::Int(1));
        },
    )
    .unwrap();
    session.start();
    let reply = engine
        .emit(session.id(), "PING", EventData::None, EventData::None)
        .unwrap();
    assert_eq!(reply, CallbackReply::Int(1));
    session.shutdown();
}

#[test]
fn contact_resource_is_fetched_once_and_released_once() {
    let engine = engine();
    let session = started(&engine);
    let contact = session.create_contact("dave@example.org", None).unwrap();
    let copy = contact.clone();

    // Many accesses, one fetch.
    for _ in 0..4 {
        assert_eq!(contact.addr().unwrap(), "dave@example.org");
        assert_eq!(copy.addr().unwrap(), "dave@example.org");
    }
    assert_eq!(engine.live_resources(), 1);

    drop(contact);
    assert_eq!(engine.live_resources(), 1);
    drop(copy);
    assert_eq!(engine.live_resources(), 0);

    session.shutdown();
}

#[test]
fn self_contact_reflects_configured_address() {
    let engine = engine();
    let session = started(&engine);
    let me = session.self_contact().unwrap();
    assert_eq!(me.addr().unwrap(), "me@example.org");
    drop(me);
    session.shutdown();
}
