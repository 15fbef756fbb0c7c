//! Mock session and connector
//!
//! The mock records publishes, subscription submissions and lifecycle calls
//! into shared state so tests can assert on what the control loop did.

use crate::cancel::CancelScope;
use crate::protocol::subscription_filters;
use crate::router::TopicRouter;
use crate::transport::{ConnectionState, Connector, Session, SessionError};
use rumqttc::v5::mqttbytes::QoS;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Shared recording state for all sessions built by one [`MockConnector`]
pub struct MockState {
    pub published: Mutex<Vec<(String, Vec<u8>, QoS)>>,
    pub subscribe_calls: Mutex<Vec<Vec<String>>>,
    connect_count: AtomicUsize,
    disconnect_count: AtomicUsize,
    current_done: Mutex<Option<watch::Sender<bool>>>,
}

impl MockState {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            subscribe_calls: Mutex::new(Vec::new()),
            connect_count: AtomicUsize::new(0),
            disconnect_count: AtomicUsize::new(0),
            current_done: Mutex::new(None),
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    /// Simulate the most recent session's background task dying
    pub fn close_current_session(&self) {
        if let Some(done_tx) = &*self.current_done.lock().unwrap() {
            let _ = done_tx.send(true);
        }
    }
}

/// In-memory stand-in for a broker session
pub struct MockSession {
    state: Arc<MockState>,
    cancel: CancelScope,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

#[async_trait::async_trait]
impl Session for MockSession {
    async fn await_ready(&self, _deadline: Duration) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.state
            .published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload, qos));
        Ok(())
    }

    async fn subscribe_all(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.state
            .subscribe_calls
            .lock()
            .unwrap()
            .push(subscription_filters().to_vec());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.state.disconnect_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.done_tx.send(true);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        if *self.done_rx.borrow() {
            ConnectionState::Disconnected("Mock session closed".to_string())
        } else {
            ConnectionState::Connected
        }
    }

    fn done_receiver(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }
}

/// Builds [`MockSession`]s; optionally fails after a number of successful
/// connects to simulate a broken reconnect.
pub struct MockConnector {
    state: Arc<MockState>,
    fail_after: Option<usize>,
}

impl MockConnector {
    pub fn new(state: Arc<MockState>) -> Self {
        Self {
            state,
            fail_after: None,
        }
    }

    /// Succeed for the first `successes` connects, then fail
    pub fn failing_after(state: Arc<MockState>, successes: usize) -> Self {
        Self {
            state,
            fail_after: Some(successes),
        }
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(
        &self,
        _router: Arc<TopicRouter>,
        cancel: CancelScope,
    ) -> Result<MockSession, SessionError> {
        let attempt = self.state.connect_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(successes) = self.fail_after {
            if attempt > successes {
                return Err(SessionError::ConnectionFailed(
                    "Mock connector refused connection".to_string(),
                ));
            }
        }

        let (done_tx, done_rx) = watch::channel(false);
        *self.state.current_done.lock().unwrap() = Some(done_tx.clone());
        Ok(MockSession {
            state: self.state.clone(),
            cancel,
            done_tx,
            done_rx,
        })
    }
}
