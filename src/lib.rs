//! doorwatch - fleet monitor for MQTT door-access controllers
//!
//! The monitor subscribes to the `door_controller/#` topic hierarchy, tracks
//! whether each controller is still checking in, logs device messages at the
//! severity their topic implies, and publishes its own liveness beacon. It
//! survives broker reconnects and supports systemd-driven reloads.
//!
//! # Overview
//!
//! - [`transport`] owns the MQTT session: connect, subscribe, publish, and
//!   the event-loop supervisor that feeds inbound messages to the router.
//! - [`router`] dispatches each inbound topic to at most one handler.
//! - [`health`] keeps the per-device liveness table; a periodic sweep is the
//!   only writer of the healthy/unhealthy state.
//! - [`monitor`] is the control loop tying the timers, signals and session
//!   together.

pub mod cancel;
pub mod config;
pub mod error;
pub mod health;
pub mod monitor;
pub mod notify;
pub mod observability;
pub mod protocol;
pub mod router;
pub mod testing;
pub mod transport;

pub use cancel::CancelScope;
pub use config::{ConfigError, MonitorConfig, MonitorSection, MqttSection};
pub use error::{
    MonitorError, EXIT_BAD_URL, EXIT_CONNECT_FAILED, EXIT_FAILURE, EXIT_OK, EXIT_RELOAD_FAILED,
};
pub use health::{ClientHealth, ClientHealthTable, HealthState, HealthTransition};
pub use monitor::Monitor;
pub use router::{InboundMessage, TopicRouter};
pub use transport::mqtt::{MqttConnector, MqttSession};
pub use transport::{ConnectionState, Connector, Session, SessionError};
