//! Pure connection state and option handling for the MQTT session
//!
//! Everything here is side-effect free: session errors, the connection state
//! machine, and translation of our configuration into rumqttc options.

use crate::config::MqttSection;
use rumqttc::v5::mqttbytes::v5::ConnectProperties;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use thiserror::Error;
use url::Url;

/// Connection state for the MQTT session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Attempting to connect; the transport retries on its own
    Connecting,
    /// Session confirmed by the broker and ready for operations
    Connected,
    /// Transport down, with the reason the broker or socket gave
    Disconnected(String),
}

/// MQTT session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Deadline elapsed before the session was ready")]
    Timeout,
    #[error("Operation cancelled")]
    Cancelled,
}

impl SessionError {
    /// Cancellation is reported by callers as a warning, never an error
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }
}

/// Build rumqttc options from the broker section. The client ID is the
/// configured identity; it must stay stable across reconnects for the
/// broker-side session (and its expiry interval) to be resumed.
pub fn configure_mqtt_options(config: &MqttSection) -> Result<MqttOptions, SessionError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| SessionError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| SessionError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(config.identity.clone(), host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    mqtt_options.set_credentials(
        &config.identity,
        config.secret.clone().unwrap_or_default(),
    );
    mqtt_options.set_keep_alive(config.keep_alive());
    mqtt_options.set_clean_start(config.clean_start);

    let mut connect_properties = ConnectProperties::new();
    connect_properties.session_expiry_interval = Some(config.session_expiry_secs);
    mqtt_options.set_connect_properties(connect_properties);

    Ok(mqtt_options)
}
