//! Reload-cycle phases and supervisor announcements
//!
//! The control loop moves through `Running → Disconnecting →
//! AwaitingReconnect → Running` on a reload signal, with `Exiting` reachable
//! from `Running` on termination. Phases are logged so an operator can follow
//! a reload in the journal.

use crate::error::MonitorError;
use crate::notify::{notify, NotifyError, Readiness};
use tracing::{error, info, warn};

/// Control-loop phase, used in structured log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Running,
    Disconnecting,
    AwaitingReconnect,
    Exiting,
}

impl MonitorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorPhase::Running => "running",
            MonitorPhase::Disconnecting => "disconnecting",
            MonitorPhase::AwaitingReconnect => "awaiting_reconnect",
            MonitorPhase::Exiting => "exiting",
        }
    }
}

/// Tell the supervisor about a lifecycle phase. Running unsupervised (no
/// notify socket) is reported once per attempt and tolerated; a delivery
/// failure on a registered socket is escalated.
pub fn announce(state: Readiness) -> Result<(), MonitorError> {
    info!(
        notification = state.as_str(),
        "Sending readiness notification"
    );
    match notify(state) {
        Ok(()) => {
            info!(
                notification = state.as_str(),
                "Readiness notification sent"
            );
            Ok(())
        }
        Err(NotifyError::SocketNotFound) => {
            warn!(
                notification = state.as_str(),
                "Notify socket not registered, continuing unsupervised"
            );
            Ok(())
        }
        Err(e) => {
            error!(
                notification = state.as_str(),
                error = %e,
                "Supervisor notification failed"
            );
            Err(MonitorError::Notify(e))
        }
    }
}
