/// Cluster time gossip across backends
use crate::core::document::{self, ClusterTime, Document};
use serde_json::Value;

/// Tracks the greatest `$clusterTime` seen from any backend and
/// advances outgoing commands to it.
///
/// The whole `$clusterTime` document is kept so that the signature
/// travels with the time it signs.
#[derive(Debug, Default)]
pub struct ClockSynchronizer {
    latest: Option<(ClusterTime, Value)>,
}

impl ClockSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<ClusterTime> {
        self.latest.as_ref().map(|(time, _)| *time)
    }

    /// Record a `$clusterTime` document if it is strictly newer.
    pub fn observe(&mut self, gossip: &Value) -> bool {
        let Some(time) = gossip
            .as_object()
            .and_then(|g| g.get("clusterTime"))
            .and_then(ClusterTime::from_value)
        else {
            return false;
        };

        match self.current() {
            Some(current) if time <= current => false,
            _ => {
                log::debug!("Cluster time advanced to {}", time);
                self.latest = Some((time, gossip.clone()));
                true
            }
        }
    }

    /// Observe the `$clusterTime` carried by a reply, if any
    pub fn observe_reply(&mut self, reply: &Document) -> bool {
        match reply.get("$clusterTime") {
            Some(gossip) => self.observe(gossip),
            None => false,
        }
    }

    /// Advance the command's `$clusterTime` to the tracked maximum.
    ///
    /// Commands without `$clusterTime`, or already at or past the
    /// maximum, are returned unchanged.
    pub fn correct(&self, mut command: Document) -> Document {
        let Some((latest, gossip)) = &self.latest else {
            return command;
        };
        if !command.contains_key("$clusterTime") {
            return command;
        }

        let behind = match document::cluster_time_of(&command) {
            Some(carried) => carried < *latest,
            // Unreadable gossip is replaced with the known-good document
            None => true,
        };
        if behind {
            log::debug!(
                "Advancing {} cluster time to {}",
                document::command_name(&command),
                latest
            );
            command.insert("$clusterTime".to_string(), gossip.clone());
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gossip(t: u32, i: u32) -> Value {
        json!({
            "clusterTime": {"$timestamp": {"t": t, "i": i}},
            "signature": {"hash": format!("h{t}.{i}"), "keyId": 1}
        })
    }

    fn command_at(t: u32, i: u32) -> Document {
        json!({"find": "c", "$clusterTime": gossip(t, i)})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_observe_is_monotonic() {
        let mut clock = ClockSynchronizer::new();
        assert_eq!(clock.current(), None);

        assert!(clock.observe(&gossip(10, 1)));
        assert!(!clock.observe(&gossip(10, 1)));
        assert!(!clock.observe(&gossip(9, 100)));
        assert_eq!(clock.current(), Some(ClusterTime::new(10, 1)));

        assert!(clock.observe(&gossip(10, 2)));
        assert_eq!(clock.current(), Some(ClusterTime::new(10, 2)));
        assert!(!clock.observe(&json!({"signature": {}})));
    }

    #[test]
    fn test_correct_advances_stale_command() {
        let mut clock = ClockSynchronizer::new();
        clock.observe(&gossip(20, 0));

        let corrected = clock.correct(command_at(5, 0));
        assert_eq!(
            document::cluster_time_of(&corrected),
            Some(ClusterTime::new(20, 0))
        );
        // Signature is carried along with the time it signs
        assert_eq!(corrected["$clusterTime"]["signature"]["hash"], json!("h20.0"));
        assert_eq!(document::command_name(&corrected), "find");
    }

    #[test]
    fn test_correct_leaves_newer_or_absent_time() {
        let mut clock = ClockSynchronizer::new();
        clock.observe(&gossip(20, 0));

        let newer = clock.correct(command_at(30, 0));
        assert_eq!(document::cluster_time_of(&newer), Some(ClusterTime::new(30, 0)));

        let plain = json!({"ping": 1}).as_object().cloned().unwrap();
        assert!(!clock.correct(plain).contains_key("$clusterTime"));
    }

    #[test]
    fn test_observe_reply() {
        let mut clock = ClockSynchronizer::new();
        let reply = json!({"ok": 1, "$clusterTime": gossip(3, 4)})
            .as_object()
            .cloned()
            .unwrap();
        assert!(clock.observe_reply(&reply));
        assert!(!clock.observe_reply(&json!({"ok": 1}).as_object().cloned().unwrap()));
        assert_eq!(clock.current(), Some(ClusterTime::new(3, 4)));
    }
}
