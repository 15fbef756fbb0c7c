//! Pure routing of rumqttc events
//!
//! Turns the transport's event stream into the handful of cases the session
//! supervisor cares about.

use crate::router::InboundMessage;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;

/// Broker-initiated disconnect details, surfaced for the caller to judge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectEvent {
    pub reason_code: String,
    pub reason: Option<String>,
}

/// Routing decision for one transport event
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// ConnAck received - session confirmed, resubscribe and mark ready
    ConnectionAcknowledged,
    /// Publish received on a subscribed topic
    MessageReceived(InboundMessage),
    /// Broker asked us to disconnect
    Disconnected(DisconnectEvent),
    /// Subscription confirmed with per-filter return codes
    SubscriptionConfirmed { return_codes: Vec<String> },
    /// Anything else incoming (PingResp, PubAck, ...)
    InfrastructureEvent(String),
    /// Outgoing traffic, handled by rumqttc itself
    OutgoingEvent,
}

/// Classify a transport event
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
            Packet::Publish(publish) => EventRoute::MessageReceived(InboundMessage {
                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                payload: publish.payload.to_vec(),
                packet_id: publish.pkid,
                qos: publish.qos as u8,
                retain: publish.retain,
                duplicate: publish.dup,
            }),
            Packet::Disconnect(disconnect) => EventRoute::Disconnected(DisconnectEvent {
                reason_code: format!("{:?}", disconnect.reason_code),
                reason: disconnect
                    .properties
                    .as_ref()
                    .and_then(|props| props.reason_string.clone()),
            }),
            Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                return_codes: suback
                    .return_codes
                    .iter()
                    .map(|code| format!("{code:?}"))
                    .collect(),
            },
            other => EventRoute::InfrastructureEvent(format!("{other:?}")),
        },
        Event::Outgoing(_) => EventRoute::OutgoingEvent,
    }
}
