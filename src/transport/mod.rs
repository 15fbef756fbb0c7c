//! Transport layer for broker communication
//!
//! Provides the session abstraction and its MQTT implementation. The traits
//! exist so the control loop can be exercised against a mock session without
//! a live broker.

use crate::cancel::CancelScope;
use crate::router::TopicRouter;
use rumqttc::v5::mqttbytes::QoS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub mod mqtt;

pub use mqtt::connection::{ConnectionState, SessionError};

/// One logical session with the broker
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Block until the broker has confirmed the session, the deadline
    /// elapses, or the cancellation scope fires.
    async fn await_ready(&self, deadline: Duration) -> Result<(), SessionError>;

    /// Publish a payload. Fails with `NotConnected` while the transport is
    /// down and with `Cancelled` when the scope fired first.
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), SessionError>;

    /// Subscribe to the monitor's fixed topic set. Idempotent.
    async fn subscribe_all(&self) -> Result<(), SessionError>;

    /// Best-effort disconnect, then stop the session's background work.
    async fn disconnect(&mut self) -> Result<(), SessionError>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Receiver that flips to `true` once the session's background task has
    /// exited; this is the control loop's "session closed" signal.
    fn done_receiver(&self) -> watch::Receiver<bool>;
}

/// Creates sessions; the reload path uses this to build a fresh session with
/// the same configuration.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    async fn connect(
        &self,
        router: Arc<TopicRouter>,
        cancel: CancelScope,
    ) -> Result<Self::Session, SessionError>;
}

/// Type alias for the production connector
pub type MqttTransport = mqtt::MqttConnector;
