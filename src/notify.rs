//! Readiness notifications to the process supervisor
//!
//! The monitor tells systemd when it is ready and when a reload cycle has
//! started. Running without a supervisor (no `NOTIFY_SOCKET`) is a supported
//! deployment; only a real write failure on an existing socket is an error.

use sd_notify::NotifyState;
use thiserror::Error;

/// Lifecycle states reported to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Reloading,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readiness::Ready => "ready",
            Readiness::Reloading => "reloading",
        }
    }
}

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    /// No status socket is registered; running unsupervised
    #[error("Notify socket was not found")]
    SocketNotFound,
    /// The socket exists but the notification could not be delivered
    #[error("Notification failed: {0}")]
    Delivery(#[from] std::io::Error),
}

impl NotifyError {
    /// Only a delivery failure is treated as fatal by the caller
    pub fn is_fatal(&self) -> bool {
        matches!(self, NotifyError::Delivery(_))
    }
}

/// Send a readiness notification to the supervisor, if one is listening
pub fn notify(state: Readiness) -> Result<(), NotifyError> {
    if std::env::var_os("NOTIFY_SOCKET").is_none() {
        return Err(NotifyError::SocketNotFound);
    }

    let notify_state = match state {
        Readiness::Ready => NotifyState::Ready,
        Readiness::Reloading => NotifyState::Reloading,
    };
    sd_notify::notify(false, &[notify_state])?;
    Ok(())
}
