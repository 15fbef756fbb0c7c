//! Session cancellation and readiness semantics without a broker
//!
//! These tests point the session at a port nothing listens on; the transport
//! keeps retrying in the background while the operations under test resolve
//! from the cancellation scope and deadlines alone.


use doorwatch::router::TopicRouter;
use doorwatch::transport::mqtt::MqttSession;
use doorwatch::transport::SessionError;
use doorwatch::CancelScope;
use rumqttc::v5::mqttbytes::QoS;
use std::sync::Arc;
use std::time::Duration;

async fn unreachable_session(cancel: CancelScope) -> MqttSession {
    MqttSession::connect(
        &test_helpers::unreachable_config().mqtt,
        Arc::new(TopicRouter::new()),
        cancel,
    )
    .await
    .expect("session construction should not need a broker")
}

#[tokio::test]
async fn test_publish_after_cancel_is_a_cancellation_not_a_publish_error() {
    let cancel = CancelScope::new();
    let session = unreachable_session(cancel.clone()).await;

    cancel.cancel();
    let result = session
        .publish(
            "door_controller/health_check",
            b"test-monitor".to_vec(),
            QoS::AtLeastOnce,
        )
        .await;

    match result {
        Err(e) => assert!(e.is_cancellation(), "expected cancellation, got {e:?}"),
        Ok(()) => panic!("publish must not succeed after cancellation"),
    }
}

#[tokio::test]
async fn test_publish_without_connection_is_not_a_cancellation() {
    let session = unreachable_session(CancelScope::new()).await;
    let result = session
        .publish(
            "door_controller/health_check",
            b"test-monitor".to_vec(),
            QoS::AtLeastOnce,
        )
        .await;

    match result {
        Err(SessionError::NotConnected { .. }) => {}
        other => panic!("expected NotConnected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_await_ready_deadline() {
    let session = unreachable_session(CancelScope::new()).await;
    let result = session.await_ready(Duration::from_millis(100)).await;
    assert!(matches!(result, Err(SessionError::Timeout)));
}

#[tokio::test]
async fn test_await_ready_cancellation_beats_deadline() {
    let cancel = CancelScope::new();
    let session = unreachable_session(cancel.clone()).await;

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = session.await_ready(Duration::from_secs(60)).await;
    match result {
        Err(e) => assert!(e.is_cancellation(), "expected cancellation, got {e:?}"),
        Ok(()) => panic!("session cannot become ready without a broker"),
    }
}

#[tokio::test]
async fn test_disconnect_closes_the_session_signal() {
    let mut session = unreachable_session(CancelScope::new()).await;
    let done = session.done_receiver();
    assert!(!*done.borrow());

    session.disconnect().await.unwrap();
    assert!(*done.borrow());
}

#[tokio::test]
async fn test_subscribe_submission_without_broker() {
    let session = unreachable_session(CancelScope::new()).await;
    // Filters are queued for the event loop; no broker required
    assert!(session.subscribe_all().await.is_ok());
}

#[tokio::test]
async fn test_subscribe_after_cancel_is_a_cancellation() {
    let cancel = CancelScope::new();
    let session = unreachable_session(cancel.clone()).await;
    cancel.cancel();
    let result = session.subscribe_all().await;
    match result {
        Err(e) => assert!(e.is_cancellation(), "expected cancellation, got {e:?}"),
        Ok(()) => panic!("subscribe must not succeed after cancellation"),
    }
}
