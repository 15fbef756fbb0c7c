//! The monitor control loop
//!
//! One loop per process waits on the heartbeat timer, the sweep timer, the
//! reload signal, the termination scope and the session-closed signal, and
//! dispatches whichever fires first. Inbound messages are handled on the
//! transport's event loop concurrently with this loop; the health table's
//! mutex is the meeting point.

pub mod reload;

use crate::cancel::CancelScope;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::health::{ClientHealthTable, HealthState};
use crate::notify::Readiness;
use crate::protocol::{
    parse_device_topic, severity_for_level, LogSeverity, HEALTH_CHECK_TOPIC, ROOT_WILDCARD,
};
use crate::router::{InboundMessage, TopicRouter};
use crate::transport::{Connector, Session};
use chrono::Utc;
use self::reload::{announce, MonitorPhase};
use rumqttc::v5::mqttbytes::QoS;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Fleet monitor: owns the session, the router and the health table
pub struct Monitor<C: Connector> {
    config: MonitorConfig,
    connector: C,
    router: Arc<TopicRouter>,
    health: Arc<ClientHealthTable>,
    cancel: CancelScope,
}

impl<C: Connector> Monitor<C> {
    pub fn new(config: MonitorConfig, connector: C, cancel: CancelScope) -> Self {
        let health = Arc::new(ClientHealthTable::new(config.monitor.unhealthy_duration()));
        Self {
            config,
            connector,
            router: Arc::new(TopicRouter::new()),
            health,
            cancel,
        }
    }

    pub fn health(&self) -> &Arc<ClientHealthTable> {
        &self.health
    }

    /// Connect, announce readiness, and run the control loop until a
    /// termination signal or a fatal error.
    pub async fn run(self, mut reload_rx: mpsc::Receiver<()>) -> Result<(), MonitorError> {
        install_handlers(&self.router, &self.health);

        let mut session = self
            .connector
            .connect(self.router.clone(), self.cancel.clone())
            .await
            .map_err(MonitorError::InitialConnect)?;

        match session.await_ready(self.config.mqtt.connect_timeout()).await {
            Ok(()) => {}
            Err(e) if e.is_cancellation() => {
                warn!(error = %e, "Cancelled while awaiting initial connection");
                return Ok(());
            }
            Err(e) => return Err(MonitorError::InitialConnect(e)),
        }

        if let Err(e) = session.subscribe_all().await {
            if e.is_cancellation() {
                return Ok(());
            }
            // The supervisor retries subscriptions on every ConnAck
            error!(error = %e, "Failed to submit subscriptions");
        }

        announce(Readiness::Ready)?;

        let mut heartbeat = tokio::time::interval(self.config.monitor.heartbeat_interval());
        heartbeat.tick().await; // first tick completes immediately, skip it
        let mut sweep = tokio::time::interval(self.config.monitor.sweep_interval());
        sweep.tick().await;

        let cancel = self.cancel.clone();
        let mut done_rx = session.done_receiver();

        info!(phase = MonitorPhase::Running.as_str(), "Monitor running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(
                        phase = MonitorPhase::Exiting.as_str(),
                        "Termination signal received"
                    );
                    if let Err(e) = session.disconnect().await {
                        warn!(error = %e, "Disconnect during shutdown failed");
                    }
                    return Ok(());
                }
                Some(()) = reload_rx.recv() => {
                    session = self.reload(session).await?;
                    done_rx = session.done_receiver();
                }
                _ = heartbeat.tick() => {
                    self.send_heartbeat(&session).await;
                }
                _ = sweep.tick() => {
                    self.sweep_once();
                }
                _ = session_done(&mut done_rx) => {
                    error!("MQTT session closed unexpectedly");
                    return Err(MonitorError::SessionClosed);
                }
            }
        }
    }

    /// Operator-triggered reload: tear the session down, announce, and bring
    /// up a fresh one with the same configuration. Reconnect failure here is
    /// fatal - the operator asked for the reload and must see it fail.
    async fn reload(&self, mut session: C::Session) -> Result<C::Session, MonitorError> {
        info!(
            phase = MonitorPhase::Disconnecting.as_str(),
            "Reload signal received"
        );
        if let Err(e) = session.disconnect().await {
            warn!(error = %e, "Disconnect during reload failed");
        }
        self.router.clear();
        drop(session);

        announce(Readiness::Reloading)?;

        info!(
            phase = MonitorPhase::AwaitingReconnect.as_str(),
            "Re-establishing MQTT session"
        );
        install_handlers(&self.router, &self.health);
        let session = self
            .connector
            .connect(self.router.clone(), self.cancel.clone())
            .await
            .map_err(MonitorError::ReloadReconnect)?;

        match session.await_ready(self.config.mqtt.connect_timeout()).await {
            Ok(()) => {}
            Err(e) if e.is_cancellation() => {
                // Termination raced the reload; the main loop exits next
                warn!(error = %e, "Cancelled while awaiting reconnection");
                return Ok(session);
            }
            Err(e) => return Err(MonitorError::ReloadReconnect(e)),
        }

        if let Err(e) = session.subscribe_all().await {
            if !e.is_cancellation() {
                error!(error = %e, "Failed to submit subscriptions after reload");
            }
        }

        announce(Readiness::Ready)?;
        info!(
            phase = MonitorPhase::Running.as_str(),
            "Session re-established"
        );
        Ok(session)
    }

    /// Publish this process's own liveness beacon
    async fn send_heartbeat(&self, session: &C::Session) {
        let payload = self.config.mqtt.identity.clone().into_bytes();
        match session
            .publish(HEALTH_CHECK_TOPIC, payload, QoS::AtLeastOnce)
            .await
        {
            Ok(()) => {
                info!(topic = HEALTH_CHECK_TOPIC, "Health check sent");
            }
            Err(e) if e.is_cancellation() => {
                warn!(topic = HEALTH_CHECK_TOPIC, error = %e, "Health check publish cancelled");
            }
            Err(e) => {
                error!(topic = HEALTH_CHECK_TOPIC, error = %e, "Failed to publish health check");
            }
        }
    }

    /// Run one sweep over the health table and log the outcome
    fn sweep_once(&self) {
        let now = Utc::now();
        let transitions = self.health.sweep(now);
        for transition in &transitions {
            match transition.to {
                HealthState::Unhealthy => {
                    error!(
                        client_id = %transition.client_id,
                        last_seen = %transition.last_seen,
                        unhealthy_after = %transition.unhealthy_after,
                        observed_at = %transition.observed_at,
                        "Client is now unhealthy"
                    );
                }
                HealthState::Healthy => {
                    info!(
                        client_id = %transition.client_id,
                        last_seen = %transition.last_seen,
                        "Client recovered"
                    );
                }
            }
        }

        for (client_id, record) in self.health.snapshot() {
            if record.state == HealthState::Healthy {
                debug!(
                    client_id = %client_id,
                    last_seen = %record.last_seen,
                    unhealthy_after = %record.unhealthy_after,
                    "Client healthy"
                );
            }
        }
    }
}

/// Register the device-message handler under the root wildcard. Called at
/// session start and again after each reload clears the router.
pub fn install_handlers(router: &TopicRouter, health: &Arc<ClientHealthTable>) {
    let table = Arc::clone(health);
    router.register(ROOT_WILDCARD, move |message| {
        handle_device_message(&table, message);
    });
}

/// Bump the sender's liveness record and log the message at the severity its
/// topic level maps to. Malformed topics are logged and dropped.
fn handle_device_message(health: &ClientHealthTable, message: &InboundMessage) {
    let parsed = match parse_device_topic(&message.topic) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!(
                topic = %message.topic,
                packet_id = message.packet_id,
                qos = message.qos,
                retain = message.retain,
                duplicate = message.duplicate,
                error = %e,
                "Unable to parse topic"
            );
            return;
        }
    };

    health.bump(&parsed.client_id, Utc::now());

    let payload = String::from_utf8_lossy(&message.payload);
    match severity_for_level(&parsed.level) {
        LogSeverity::Error => {
            error!(
                client_id = %parsed.client_id,
                topic = %message.topic,
                packet_id = message.packet_id,
                qos = message.qos,
                retain = message.retain,
                duplicate = message.duplicate,
                payload = %payload,
                "Device message handled"
            );
        }
        LogSeverity::Warn => {
            warn!(
                client_id = %parsed.client_id,
                topic = %message.topic,
                packet_id = message.packet_id,
                qos = message.qos,
                retain = message.retain,
                duplicate = message.duplicate,
                payload = %payload,
                "Device message handled"
            );
        }
        LogSeverity::Info => {
            info!(
                client_id = %parsed.client_id,
                topic = %message.topic,
                packet_id = message.packet_id,
                qos = message.qos,
                retain = message.retain,
                duplicate = message.duplicate,
                payload = %payload,
                "Device message handled"
            );
        }
    }
}

/// Resolves once the session's background task has exited
async fn session_done(done_rx: &mut watch::Receiver<bool>) {
    while !*done_rx.borrow() {
        if done_rx.changed().await.is_err() {
            return;
        }
    }
}
