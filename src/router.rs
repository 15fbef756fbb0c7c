//! Topic router for inbound broker messages
//!
//! Maps a topic to at most one registered handler. Patterns are either an
//! exact topic or `"<segment>/#"`, which matches any topic whose first
//! `/`-delimited segment equals the prefix. Exact matches win over the
//! wildcard. Unmatched topics are dropped without error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An inbound publish as delivered by the transport
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub packet_id: u16,
    pub qos: u8,
    pub retain: bool,
    pub duplicate: bool,
}

/// Handler invoked for each routed message
pub type Handler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Registration table from topic pattern to handler
#[derive(Default)]
pub struct TopicRouter {
    routes: Mutex<HashMap<String, Handler>>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler for a pattern. Registering the same pattern again
    /// replaces the previous handler, so re-registration after a reconnect
    /// is safe.
    pub fn register<F>(&self, pattern: &str, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let mut routes = self.routes.lock().expect("router lock poisoned");
        routes.insert(pattern.to_string(), Arc::new(handler));
    }

    /// Remove a single registration
    pub fn unregister(&self, pattern: &str) {
        let mut routes = self.routes.lock().expect("router lock poisoned");
        routes.remove(pattern);
    }

    /// Remove every registration; used at session teardown so no stale
    /// handler fires against a later session's traffic.
    pub fn clear(&self) {
        let mut routes = self.routes.lock().expect("router lock poisoned");
        routes.clear();
    }

    /// Dispatch a message to the matching handler, if any. Returns whether a
    /// handler ran.
    pub fn route(&self, message: &InboundMessage) -> bool {
        let handler = self.lookup(&message.topic);
        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => false,
        }
    }

    /// Exact match first, then the first-segment wildcard. The handler is
    /// cloned out so it runs without the table lock held.
    fn lookup(&self, topic: &str) -> Option<Handler> {
        let routes = self.routes.lock().expect("router lock poisoned");
        if let Some(handler) = routes.get(topic) {
            return Some(Arc::clone(handler));
        }

        let first_segment = topic.split('/').next()?;
        routes.get(&format!("{first_segment}/#")).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.routes.lock().expect("router lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(topic: &str) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            payload: b"payload".to_vec(),
            packet_id: 1,
            qos: 1,
            retain: false,
            duplicate: false,
        }
    }

    fn counting_router(pattern: &str) -> (TopicRouter, Arc<AtomicUsize>) {
        let router = TopicRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        router.register(pattern, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        (router, hits)
    }

    #[test]
    fn test_unregistered_topic_is_dropped_silently() {
        let (router, hits) = counting_router("door_controller/#");
        assert!(!router.route(&message("other_root/log_info/dev1")));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wildcard_matches_deep_topic() {
        let (router, hits) = counting_router("door_controller/#");
        assert!(router.route(&message("door_controller/log_info/dev7")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exact_pattern_requires_full_equality() {
        let (router, hits) = counting_router("door_controller/log_info");

        // Exact pattern must not match a longer topic
        assert!(!router.route(&message("door_controller/log_info/dev7")));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(router.route(&message("door_controller/log_info")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exact_match_wins_over_wildcard() {
        let router = TopicRouter::new();
        let wildcard_hits = Arc::new(AtomicUsize::new(0));
        let exact_hits = Arc::new(AtomicUsize::new(0));

        let w = wildcard_hits.clone();
        router.register("door_controller/#", move |_| {
            w.fetch_add(1, Ordering::SeqCst);
        });
        let e = exact_hits.clone();
        router.register("door_controller/check_in", move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        router.route(&message("door_controller/check_in"));
        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard_hits.load(Ordering::SeqCst), 0);

        router.route(&message("door_controller/check_in/dev1"));
        assert_eq!(wildcard_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reregistration_replaces_handler() {
        let router = TopicRouter::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        router.register("door_controller/#", move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = second.clone();
        router.register("door_controller/#", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(router.len(), 1);
        router.route(&message("door_controller/check_in/dev1"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_stops_dispatch() {
        let (router, hits) = counting_router("door_controller/#");
        router.unregister("door_controller/#");
        assert!(!router.route(&message("door_controller/check_in/dev1")));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(router.is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let router = TopicRouter::new();
        router.register("door_controller/#", |_| {});
        router.register("door_controller/access_list", |_| {});
        assert_eq!(router.len(), 2);
        router.clear();
        assert!(router.is_empty());
    }

    #[test]
    fn test_handler_receives_message_fields() {
        let router = TopicRouter::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        router.register("door_controller/#", move |msg| {
            *seen_clone.lock().unwrap() = Some((msg.topic.clone(), msg.payload.clone()));
        });

        router.route(&message("door_controller/unlock/dev3"));
        let captured = seen.lock().unwrap().clone();
        assert_eq!(
            captured,
            Some((
                "door_controller/unlock/dev3".to_string(),
                b"payload".to_vec()
            ))
        );
    }
}
