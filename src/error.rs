//! Monitor error taxonomy and process exit codes
//!
//! Components return typed errors; only the control loop and `main` decide
//! fatality. Each fatal path maps to a distinct exit code so an operator can
//! tell a bad URL from a failed reload at a glance.

use crate::config::ConfigError;
use crate::notify::NotifyError;
use crate::transport::SessionError;
use thiserror::Error;

/// Clean shutdown
pub const EXIT_OK: i32 = 0;
/// Unclassified fatal error
pub const EXIT_FAILURE: i32 = 1;
/// The broker URL did not parse
pub const EXIT_BAD_URL: i32 = 2;
/// The initial connection could not be established
pub const EXIT_CONNECT_FAILED: i32 = 3;
/// Reconnection after an operator-triggered reload failed
pub const EXIT_RELOAD_FAILED: i32 = 4;

/// Fatal monitor errors
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Initial connection failed: {0}")]
    InitialConnect(#[source] SessionError),

    #[error("Reconnection after reload failed: {0}")]
    ReloadReconnect(#[source] SessionError),

    #[error("Supervisor notification failed: {0}")]
    Notify(#[source] NotifyError),

    #[error("MQTT session closed unexpectedly")]
    SessionClosed,

    #[error("Signal handler installation failed: {0}")]
    Signals(#[source] std::io::Error),
}

impl MonitorError {
    /// Exit code this failure maps to
    pub fn exit_code(&self) -> i32 {
        match self {
            MonitorError::Config(ConfigError::InvalidBrokerUrl(_)) => EXIT_BAD_URL,
            MonitorError::Config(_) => EXIT_FAILURE,
            MonitorError::InitialConnect(SessionError::InvalidBrokerUrl(_)) => EXIT_BAD_URL,
            MonitorError::InitialConnect(_) => EXIT_CONNECT_FAILED,
            MonitorError::ReloadReconnect(_) => EXIT_RELOAD_FAILED,
            MonitorError::Notify(_) | MonitorError::SessionClosed | MonitorError::Signals(_) => {
                EXIT_FAILURE
            }
        }
    }
}
