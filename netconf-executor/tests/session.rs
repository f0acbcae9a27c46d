mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{CANDIDATE, FakeDevice, Reply, connected, rpc_reply, session};
use netconf_executor::error::{Error, ProtocolError, SessionError};
use netconf_executor::{Framing, SessionState, rpc};

#[tokio::test]
async fn test_hello_exchange_negotiates_chunked_framing() {
    let device = FakeDevice::default();
    let (session, _) = connected(&device).await;

    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.session_id().as_deref(), Some("4711"));
    assert!(session.device_capabilities().iter().any(|c| c == CANDIDATE));
    assert_eq!(session.framing(), Framing::Chunked);

    let reply = session
        .sync_rpc(&rpc::get(&session.next_message_id(), None), "1", None)
        .await
        .unwrap();
    assert!(reply.contains("<ok/>"));
    assert_eq!(session.pending_replies(), 0);
}

#[tokio::test]
async fn test_base_1_0_device_keeps_end_of_message_framing() {
    let device = FakeDevice::default().base_1_0_only();
    let (session, _) = connected(&device).await;

    assert_eq!(session.framing(), Framing::EndOfMessage);
    let reply = session
        .sync_rpc(&rpc::lock("7", netconf_executor::Datastore::Candidate), "7", None)
        .await
        .unwrap();
    assert!(reply.contains("message-id=\"7\""));
}

#[tokio::test]
async fn test_hello_without_session_id_fails_connect() {
    let device = FakeDevice {
        session_id: None,
        ..FakeDevice::default()
    };
    let (session, _) = session(&device);

    let err = session.connect().await.unwrap_err();
    match err {
        Error::Session(SessionError::Connection { device, source }) => {
            assert_eq!(device, "fake-device:830");
            assert!(matches!(
                *source,
                Error::Protocol(ProtocolError::MissingSessionId { .. })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_connection_failure_names_device() {
    let device = FakeDevice {
        refuse_connect: true,
        ..FakeDevice::default()
    };
    let (session, _) = session(&device);

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::Connection { .. })));
    assert!(err.to_string().contains("fake-device:830"));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_rpc_before_connect_is_rejected() {
    let (session, _) = session(&FakeDevice::default());
    let err = session.async_rpc("<rpc><get/></rpc>", "1").await.unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::NotConnected { .. })));
}

#[tokio::test]
async fn test_concurrent_replies_out_of_order() {
    const N: usize = 8;
    let device = FakeDevice {
        reverse_batch: N,
        ..FakeDevice::default()
    }
    .respond_with(|request| Reply::Data(rpc::extract_message_id(request)));
    let (session, _) = connected(&device).await;

    let mut tasks = Vec::new();
    for i in 0..N {
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            let message_id = format!("req-{i}");
            let reply = session
                .sync_rpc(&rpc::get(&message_id, None), &message_id, None)
                .await
                .unwrap();
            (message_id, reply)
        }));
    }

    for task in tasks {
        let (message_id, reply) = task.await.unwrap();
        assert!(reply.contains(&format!("<data>{message_id}</data>")));
    }
    assert_eq!(session.pending_replies(), 0);
}

#[tokio::test]
async fn test_timeout_leaves_other_requests_alone() {
    let device = FakeDevice::default().respond_with(|request| {
        if request.contains("<slow/>") {
            Reply::Silent
        } else {
            Reply::Delayed(Duration::from_millis(200))
        }
    });
    let (session, _) = connected(&device).await;

    let other = session
        .async_rpc(&rpc::get("fast", None), "fast")
        .await
        .unwrap();
    let err = session
        .sync_rpc(
            &rpc::wrap_rpc("slow", "<slow/>\n"),
            "slow",
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    match &err {
        Error::Session(SessionError::Timeout { device, request, timeout }) => {
            assert_eq!(device, "fake-device:830");
            assert!(request.contains("<slow/>"));
            assert_eq!(*timeout, Duration::from_millis(50));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(session.pending_replies(), 1);
    let reply = other.wait(Duration::from_secs(2)).await.unwrap();
    assert!(reply.contains("message-id=\"fast\""));
    assert_eq!(session.pending_replies(), 0);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_late_reply_after_timeout_is_dropped() {
    let device = FakeDevice::default().respond_with(|request| {
        if request.contains("message-id=\"late\"") {
            Reply::Delayed(Duration::from_millis(150))
        } else {
            Reply::Ok
        }
    });
    let (session, _) = connected(&device).await;

    let err = session
        .sync_rpc(&rpc::get("late", None), "late", Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::Timeout { .. })));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let reply = session.sync_rpc(&rpc::get("next", None), "next", None).await.unwrap();
    assert!(reply.contains("message-id=\"next\""));
    assert_eq!(session.pending_replies(), 0);
}

#[tokio::test]
async fn test_reply_for_unknown_message_id_is_ignored() {
    let device = FakeDevice::default()
        .respond_with(|_| Reply::Stray(rpc_reply("999", "<ok/>")));
    let (session, _) = connected(&device).await;

    let reply = session.sync_rpc(&rpc::get("3", None), "3", None).await.unwrap();
    assert!(reply.contains("message-id=\"3\""));
    assert_eq!(session.pending_replies(), 0);
}

#[tokio::test]
async fn test_duplicate_message_id_is_rejected() {
    let device = FakeDevice::default().respond_with(|_| Reply::Silent);
    let (session, _) = connected(&device).await;

    let _first = session.async_rpc(&rpc::get("dup", None), "dup").await.unwrap();
    let err = session.async_rpc(&rpc::get("dup", None), "dup").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Session(SessionError::DuplicateMessageId(ref id)) if id == "dup"
    ));
}

#[tokio::test]
async fn test_transport_loss_fails_pending_and_reestablishes() {
    let device = FakeDevice::default().respond_with(|request| {
        if request.contains("<hangup/>") {
            Reply::Hangup
        } else {
            Reply::Ok
        }
    });
    let (session, opens) = connected(&device).await;

    let err = session
        .sync_rpc(&rpc::wrap_rpc("9", "<hangup/>\n"), "9", None)
        .await
        .unwrap_err();
    match &err {
        Error::Session(SessionError::Transport { device, session_id, .. }) => {
            assert_eq!(device, "fake-device:830");
            assert_eq!(session_id, "4711");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.pending_replies(), 0);
    assert_eq!(session.state(), SessionState::Connected);

    let reply = session.sync_rpc(&rpc::get("10", None), "10", None).await.unwrap();
    assert!(reply.contains("message-id=\"10\""));
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_disconnect_closes_session_and_transport() {
    let device = FakeDevice::default();
    let (session, _) = connected(&device).await;

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(device.received_containing("<close-session/>"), 1);

    let err = session.async_rpc(&rpc::get("1", None), "1").await.unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::NotConnected { .. })));
}

#[tokio::test]
async fn test_disconnect_completes_even_if_close_session_is_rejected() {
    let device = FakeDevice::default().respond_with(|request| {
        if request.contains("<kill-session/>") {
            Reply::Error("operation-not-supported")
        } else {
            Reply::Ok
        }
    });
    let (session, _) = connected(&device).await;

    session.disconnect_with(true).await.unwrap();
    assert_eq!(device.received_containing("<kill-session/>"), 1);
    assert_eq!(device.received_containing("<close-session/>"), 0);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_disconnect_interrupts_waiters() {
    let device = FakeDevice::default().respond_with(|request| {
        if request.contains("<close-session/>") {
            Reply::Ok
        } else {
            Reply::Silent
        }
    });
    let (session, _) = connected(&device).await;

    let pending = session.async_rpc(&rpc::get("stuck", None), "stuck").await.unwrap();
    session.disconnect().await.unwrap();
    assert!(matches!(
        pending.wait(Duration::from_secs(1)).await,
        Err(Error::Session(SessionError::Interrupted { .. }))
    ));
}

#[tokio::test]
async fn test_reconnect_opens_new_transport() {
    let device = FakeDevice::default();
    let (session, opens) = connected(&device).await;

    session.reconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(device.received_containing("<close-session/>"), 1);

    let reply = session.sync_rpc(&rpc::get("1", None), "1", None).await.unwrap();
    assert!(reply.contains("<ok/>"));
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let device = FakeDevice::default();
    let (session, opens) = connected(&device).await;
    session.connect().await.unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_write_failure_discards_pending_and_closes_channel() {
    let device = FakeDevice::default().respond_with(|request| {
        if request.contains("message-id=\"stuck\"") {
            Reply::Silent
        } else {
            Reply::Ok
        }
    });
    let (session, opens) = connected(&device).await;

    let stuck = session.async_rpc(&rpc::get("stuck", None), "stuck").await.unwrap();
    device.break_writes.store(true, Ordering::SeqCst);

    let err = session
        .sync_rpc(&rpc::get("2", None), "2", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::Transport { .. })));
    assert_eq!(session.pending_replies(), 0);
    assert!(matches!(
        stuck.wait(Duration::from_secs(1)).await,
        Err(Error::Session(SessionError::Interrupted { .. }))
    ));
    assert_eq!(session.state(), SessionState::Connected);

    device.break_writes.store(false, Ordering::SeqCst);
    let reply = session.sync_rpc(&rpc::get("3", None), "3", None).await.unwrap();
    assert!(reply.contains("message-id=\"3\""));
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}
