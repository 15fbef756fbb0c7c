//! MQTT session handle and event-loop supervisor
//!
//! This module owns the impure half of the transport: the rumqttc client,
//! the background task that polls its event loop, and the cancellation-aware
//! operations the control loop calls.

use super::connection::{configure_mqtt_options, ConnectionState, SessionError};
use super::message_handler::{route_event, EventRoute};
use crate::cancel::CancelScope;
use crate::config::MqttSection;
use crate::protocol::subscription_filters;
use crate::router::TopicRouter;
use crate::transport::{Connector, Session};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::AsyncClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// How long `disconnect` waits for the supervisor task before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// One live session with the broker.
///
/// Created by [`MqttSession::connect`]; a reload tears the session down and
/// builds a new one rather than mutating this handle.
pub struct MqttSession {
    identity: String,
    client: AsyncClient,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    supervisor: Option<JoinHandle<()>>,
    cancel: CancelScope,
}

impl MqttSession {
    /// Open a session and spawn its event-loop supervisor. Establishment is
    /// asynchronous: the returned handle is not usable for publishing until
    /// [`await_ready`](Self::await_ready) confirms the broker's ConnAck.
    pub async fn connect(
        config: &MqttSection,
        router: Arc<TopicRouter>,
        cancel: CancelScope,
    ) -> Result<Self, SessionError> {
        let mqtt_options = configure_mqtt_options(config)?;
        let (client, mut event_loop) = AsyncClient::new(mqtt_options, 10);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        let identity = config.identity.clone();
        let retry_delay = config.retry_delay();
        let task_identity = identity.clone();
        let task_client = client.clone();
        let task_state_tx = state_tx.clone();

        let supervisor = tokio::spawn(async move {
            info!(identity = %task_identity, "Starting MQTT event loop");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Shutdown signal received, stopping MQTT event loop");
                            break;
                        }
                    }
                    event_result = event_loop.poll() => {
                        match event_result {
                            Ok(event) => match route_event(&event) {
                                EventRoute::ConnectionAcknowledged => {
                                    info!("Connected to MQTT broker");
                                    let _ = task_state_tx.send(ConnectionState::Connected);
                                    Self::resubscribe(&task_client).await;
                                }
                                EventRoute::MessageReceived(message) => {
                                    if !router.route(&message) {
                                        trace!(topic = %message.topic, "No handler for topic, dropping");
                                    }
                                }
                                EventRoute::Disconnected(disconnect) => {
                                    warn!(
                                        reason_code = %disconnect.reason_code,
                                        reason = disconnect.reason.as_deref().unwrap_or(""),
                                        "Broker requested disconnect"
                                    );
                                    let _ = task_state_tx
                                        .send(ConnectionState::Disconnected(disconnect.reason_code));
                                }
                                EventRoute::SubscriptionConfirmed { return_codes } => {
                                    debug!(?return_codes, "Subscription confirmed");
                                }
                                EventRoute::InfrastructureEvent(event) => {
                                    trace!(event = %event, "MQTT event");
                                }
                                EventRoute::OutgoingEvent => {}
                            },
                            Err(e) => {
                                let _ = task_state_tx
                                    .send(ConnectionState::Disconnected(e.to_string()));
                                error!(error = %e, delay_secs = retry_delay.as_secs(), "MQTT event loop error, retrying");
                                // Re-polling after the delay drives rumqttc's reconnect
                                if !Self::interruptible_sleep(shutdown_rx.clone(), retry_delay).await {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            let _ = done_tx.send(true);
            info!(identity = %task_identity, "MQTT event loop stopped");
        });

        Ok(MqttSession {
            identity,
            client,
            state_tx,
            state_rx,
            shutdown_tx,
            done_rx,
            supervisor: Some(supervisor),
            cancel,
        })
    }

    /// Subscribe to the monitor's fixed filter set; called on every ConnAck
    /// so a reconnected session recovers its subscriptions.
    async fn resubscribe(client: &AsyncClient) {
        for filter in subscription_filters() {
            if let Err(e) = client.subscribe(filter.as_str(), QoS::AtLeastOnce).await {
                error!(filter = %filter, error = %e, "Failed to subscribe");
            } else {
                debug!(filter = %filter, "Subscribed");
            }
        }
    }

    /// Sleep that wakes early on shutdown. Returns false when shutdown fired.
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn check_connection_state(&self) -> Result<(), SessionError> {
        let state = self.state_rx.borrow().clone();
        if state != ConnectionState::Connected {
            return Err(SessionError::NotConnected { state });
        }
        Ok(())
    }

    pub async fn await_ready(&self, deadline: Duration) -> Result<(), SessionError> {
        let mut state_rx = self.state_rx.clone();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            result = tokio::time::timeout(deadline, async move {
                loop {
                    if *state_rx.borrow() == ConnectionState::Connected {
                        return Ok(());
                    }
                    if state_rx.changed().await.is_err() {
                        return Err(SessionError::ConnectionFailed(
                            "Session state channel closed".to_string(),
                        ));
                    }
                }
            }) => match result {
                Ok(inner) => inner,
                Err(_) => Err(SessionError::Timeout),
            },
        }
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.check_connection_state()?;

        tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            result = self.client.publish(topic, qos, false, payload) => {
                result.map_err(|e| SessionError::PublishFailed(Box::new(e)))
            }
        }
    }

    /// Submit the fixed subscription set. Safe to repeat; the broker treats a
    /// duplicate SUBSCRIBE for the same filter as a refresh.
    pub async fn subscribe_all(&self) -> Result<(), SessionError> {
        for filter in subscription_filters() {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            self.client
                .subscribe(filter.as_str(), QoS::AtLeastOnce)
                .await
                .map_err(|e| SessionError::SubscriptionFailed(Box::new(e)))?;
        }
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        // Best effort; the broker may already be gone
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request failed");
        }

        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.supervisor.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => info!("MQTT event loop shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(error = %e, "MQTT event loop ended with error");
                }
                Err(_) => {
                    warn!("MQTT event loop did not stop in time, aborting");
                    abort.abort();
                }
                _ => {}
            }
        }

        let _ = self
            .state_tx
            .send(ConnectionState::Disconnected("Client disconnected".to_string()));
        info!(identity = %self.identity, "MQTT session disconnected");
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn done_receiver(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }
}

#[async_trait::async_trait]
impl Session for MqttSession {
    async fn await_ready(&self, deadline: Duration) -> Result<(), SessionError> {
        MqttSession::await_ready(self, deadline).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), SessionError> {
        MqttSession::publish(self, topic, payload, qos).await
    }

    async fn subscribe_all(&self) -> Result<(), SessionError> {
        MqttSession::subscribe_all(self).await
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        MqttSession::disconnect(self).await
    }

    fn state(&self) -> ConnectionState {
        MqttSession::state(self)
    }

    fn done_receiver(&self) -> watch::Receiver<bool> {
        MqttSession::done_receiver(self)
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        // Cannot run async teardown here; just make sure the supervisor dies
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
    }
}

/// Builds [`MqttSession`]s from one configuration; the reload path uses it to
/// re-create the session without re-reading config.
pub struct MqttConnector {
    config: MqttSection,
}

impl MqttConnector {
    pub fn new(config: MqttSection) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Connector for MqttConnector {
    type Session = MqttSession;

    async fn connect(
        &self,
        router: Arc<TopicRouter>,
        cancel: CancelScope,
    ) -> Result<MqttSession, SessionError> {
        MqttSession::connect(&self.config, router, cancel).await
    }
}
