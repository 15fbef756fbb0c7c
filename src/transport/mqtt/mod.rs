//! MQTT session implementation on rumqttc's v5 client

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{MqttConnector, MqttSession};
pub use connection::{configure_mqtt_options, ConnectionState, SessionError};
pub use message_handler::EventRoute;
