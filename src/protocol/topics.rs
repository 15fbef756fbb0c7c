//! Topic constants and parsing for the door-controller hierarchy
//!
//! Every controller publishes under `door_controller/<level>/<clientID>`;
//! the monitor subscribes to the per-device levels and publishes its own
//! beacon on the health-check topic.

use once_cell::sync::Lazy;
use thiserror::Error;

pub const ROOT_LEVEL: &str = "door_controller";

pub const ACCESS_LIST_LEVEL: &str = "access_list";
pub const CHECK_IN_LEVEL: &str = "check_in";
pub const HEALTH_CHECK_LEVEL: &str = "health_check";
pub const UNLOCK_LEVEL: &str = "unlock";
pub const LOCK_LEVEL: &str = "lock";
pub const DENIED_ACCESS_LEVEL: &str = "denied_access";
pub const LOG_INFO_LEVEL: &str = "log_info";
pub const LOG_WARN_LEVEL: &str = "log_warn";
pub const LOG_FATAL_LEVEL: &str = "log_fatal";

pub const ACCESS_LIST_TOPIC: &str = "door_controller/access_list";
pub const CHECK_IN_TOPIC: &str = "door_controller/check_in";
pub const HEALTH_CHECK_TOPIC: &str = "door_controller/health_check";
pub const UNLOCK_TOPIC: &str = "door_controller/unlock";
pub const LOCK_TOPIC: &str = "door_controller/lock";
pub const DENIED_ACCESS_TOPIC: &str = "door_controller/denied_access";
pub const LOG_INFO_TOPIC: &str = "door_controller/log_info";
pub const LOG_WARN_TOPIC: &str = "door_controller/log_warn";
pub const LOG_FATAL_TOPIC: &str = "door_controller/log_fatal";

/// Root wildcard the inbound router is registered under
pub const ROOT_WILDCARD: &str = "door_controller/#";

/// Broker subscription filters for the per-device message levels
pub static SUBSCRIPTION_FILTERS: Lazy<Vec<String>> = Lazy::new(|| {
    [
        LOG_INFO_TOPIC,
        LOG_WARN_TOPIC,
        LOG_FATAL_TOPIC,
        LOCK_TOPIC,
        UNLOCK_TOPIC,
        DENIED_ACCESS_TOPIC,
        CHECK_IN_TOPIC,
    ]
    .iter()
    .map(|topic| format!("{topic}/#"))
    .collect()
});

/// The fixed set of filters this monitor subscribes to
pub fn subscription_filters() -> &'static [String] {
    &SUBSCRIPTION_FILTERS
}

/// Local log severity a device message level maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Info,
    Warn,
    Error,
}

/// Map a device message level to the severity it is logged at
pub fn severity_for_level(level: &str) -> LogSeverity {
    match level {
        LOG_FATAL_LEVEL => LogSeverity::Error,
        LOG_WARN_LEVEL | DENIED_ACCESS_LEVEL => LogSeverity::Warn,
        _ => LogSeverity::Info,
    }
}

/// Parsed per-device topic: `<root>/<level>/.../<clientID>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopic {
    pub level: String,
    pub client_id: String,
}

/// Topic strings that do not fit the per-device shape
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicParseError {
    #[error("Topic has fewer than 3 segments: {0}")]
    TooFewSegments(String),
}

/// Parse a per-device topic. The client identifier is always the last
/// `/`-delimited segment; anything shorter than 3 segments is rejected.
pub fn parse_device_topic(topic: &str) -> Result<DeviceTopic, TopicParseError> {
    let chunks: Vec<&str> = topic.split('/').collect();
    if chunks.len() < 3 {
        return Err(TopicParseError::TooFewSegments(topic.to_string()));
    }

    Ok(DeviceTopic {
        level: chunks[1].to_string(),
        client_id: chunks[chunks.len() - 1].to_string(),
    })
}
