/// Command classification
///
/// Every inbound command is inspected exactly once and reduced to a
/// [`Disposition`]. The dispatcher never probes command fields itself.
use crate::core::document::{self, CursorId, Document};
use crate::routing::session::{SessionId, SessionKey};
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

lazy_static! {
    /// Administrative commands that must reach every router to take effect
    static ref BROADCAST_COMMANDS: HashSet<&'static str> = [
        "refreshLogicalSessionCacheNow",
        "flushRouterConfig",
        "setParameter",
        "setQuerySettings",
        "removeQuerySettings",
    ]
    .into_iter()
    .collect();

    /// Commands whose answer only describes the router that serves them
    static ref NODE_LOCAL_COMMANDS: Vec<(&'static str, &'static str)> = vec![
        ("getShardVersion", "reads routing metadata cached by a single router"),
        ("getDatabaseVersion", "reads routing metadata cached by a single router"),
        ("getLog", "returns the log of a single router"),
    ];
}

/// How a command must be routed
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Must not be sent anywhere
    Unsupported { field: String, reason: String },
    /// Must be sent to every backend
    Broadcast,
    /// Must follow an existing cursor or transaction pin
    Affine(Affinity),
    /// Any backend may serve it
    Free,
}

impl Disposition {
    pub fn name(&self) -> &'static str {
        match self {
            Disposition::Unsupported { .. } => "unsupported",
            Disposition::Broadcast => "broadcast",
            Disposition::Affine(_) => "affine",
            Disposition::Free => "free",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Unsupported { field, reason } => {
                write!(f, "unsupported ('{field}' {reason})")
            }
            Disposition::Affine(affinity) => write!(f, "affine ({affinity})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Affinity keys carried by a command. Both may be present at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Affinity {
    /// Cursor being continued (getMore, single-target killCursors/releaseMemory)
    pub cursor: Option<CursorId>,
    /// Session and transaction number the command belongs to
    pub session: Option<SessionKey>,
}

impl Affinity {
    pub fn is_continuation(&self) -> bool {
        self.cursor.is_some()
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.cursor, &self.session) {
            (Some(cursor), Some(session)) => write!(f, "cursor {cursor}, {session}"),
            (Some(cursor), None) => write!(f, "cursor {cursor}"),
            (None, Some(session)) => write!(f, "{session}"),
            (None, None) => f.write_str("none"),
        }
    }
}

/// Classify a command. Pure: no I/O and no state.
pub fn classify(command: &Document) -> Disposition {
    if let Some(rejection) = unsupported_reason(command) {
        return rejection;
    }

    if command
        .keys()
        .any(|key| BROADCAST_COMMANDS.contains(key.as_str()))
    {
        return Disposition::Broadcast;
    }

    let affinity = Affinity {
        cursor: continued_cursor(command),
        session: session_key(command),
    };
    if affinity.cursor.is_some() || affinity.session.is_some() {
        Disposition::Affine(affinity)
    } else {
        Disposition::Free
    }
}

fn unsupported_reason(command: &Document) -> Option<Disposition> {
    let reject = |field: &str, reason: String| {
        Some(Disposition::Unsupported {
            field: field.to_string(),
            reason,
        })
    };

    for (field, ids) in [
        ("releaseMemory", release_memory_ids(command)),
        ("killCursors", kill_cursors_ids(command)),
    ] {
        if let Some(ids) = ids {
            if ids.len() > 1 {
                return reject(
                    field,
                    format!(
                        "targets {} cursors; they may live on different routers and their results cannot be merged locally",
                        ids.len()
                    ),
                );
            }
        }
    }

    if command.contains_key("aggregate") {
        let stages = command
            .get("pipeline")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for stage in stages.iter().filter_map(Value::as_object) {
            if let Some(current_op) = stage.get("$currentOp").and_then(Value::as_object) {
                if current_op.get("localOps").is_some_and(document::is_truthy) {
                    return reject(
                        "$currentOp.localOps",
                        "reports only the operations running on the router that serves it".to_string(),
                    );
                }
            }
            if stage.contains_key("$listLocalSessions") {
                return reject(
                    "$listLocalSessions",
                    "lists only the sessions cached on the router that serves it".to_string(),
                );
            }
        }
    }

    NODE_LOCAL_COMMANDS
        .iter()
        .find(|(name, _)| command.contains_key(*name))
        .and_then(|(name, reason)| reject(*name, (*reason).to_string()))
}

/// `releaseMemory` carries its ids as the command value; older shapes use `cursors`
fn release_memory_ids(command: &Document) -> Option<&Vec<Value>> {
    let value = command.get("releaseMemory")?;
    value
        .as_array()
        .or_else(|| command.get("cursors").and_then(Value::as_array))
}

fn kill_cursors_ids(command: &Document) -> Option<&Vec<Value>> {
    command.get("killCursors")?;
    command.get("cursors").and_then(Value::as_array)
}

fn continued_cursor(command: &Document) -> Option<CursorId> {
    if let Some(id) = command.get("getMore") {
        return CursorId::from_value(id);
    }

    let ids = release_memory_ids(command).or_else(|| kill_cursors_ids(command))?;
    match ids.as_slice() {
        [only] => CursorId::from_value(only),
        _ => None,
    }
}

fn session_key(command: &Document) -> Option<SessionKey> {
    let lsid = command.get("lsid")?;
    let txn_number = document::as_i64(command.get("txnNumber")?)?;
    Some(SessionKey {
        session: SessionId::from_lsid(lsid),
        txn_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn lsid() -> Value {
        json!({"id": {"$binary": {"base64": "AAAAAAAAAAAAAAAAAAAAAA==", "subType": "04"}}})
    }

    #[test]
    fn test_free_commands() {
        assert_eq!(classify(&doc(json!({"find": "c", "filter": {}}))), Disposition::Free);
        assert_eq!(classify(&doc(json!({"insert": "c", "documents": [{"x": 1}]}))), Disposition::Free);
        // A session without a transaction number is not pinned
        assert_eq!(classify(&doc(json!({"find": "c", "lsid": lsid()}))), Disposition::Free);
        assert_eq!(classify(&doc(json!({"killCursors": "c", "cursors": []}))), Disposition::Free);
    }

    #[test]
    fn test_unsupported_multi_cursor_commands() {
        let kill = classify(&doc(json!({"killCursors": "c", "cursors": [1, 2]})));
        match kill {
            Disposition::Unsupported { field, reason } => {
                assert_eq!(field, "killCursors");
                assert!(reason.contains("2 cursors"));
            }
            other => panic!("unexpected disposition {other:?}"),
        }

        let release = classify(&doc(json!({"releaseMemory": [1, 2, 3]})));
        assert!(matches!(release, Disposition::Unsupported { ref field, .. } if field == "releaseMemory"));
    }

    #[test]
    fn test_unsupported_local_pipelines() {
        let local_ops = doc(json!({
            "aggregate": 1,
            "pipeline": [{"$currentOp": {"localOps": true}}],
            "cursor": {}
        }));
        assert!(matches!(
            classify(&local_ops),
            Disposition::Unsupported { ref field, .. } if field == "$currentOp.localOps"
        ));

        let cluster_ops = doc(json!({
            "aggregate": 1,
            "pipeline": [{"$currentOp": {"localOps": false}}],
            "cursor": {}
        }));
        assert_eq!(classify(&cluster_ops), Disposition::Free);

        let canonical_cluster_ops = doc(json!({
            "aggregate": 1,
            "pipeline": [{"$currentOp": {"localOps": {"$numberDouble": "0.0"}}}],
            "cursor": {}
        }));
        assert_eq!(classify(&canonical_cluster_ops), Disposition::Free);

        let canonical_local_ops = doc(json!({
            "aggregate": 1,
            "pipeline": [{"$currentOp": {"localOps": {"$numberInt": "1"}}}],
            "cursor": {}
        }));
        assert_eq!(classify(&canonical_local_ops).name(), "unsupported");

        let local_sessions = doc(json!({
            "aggregate": 1,
            "pipeline": [{"$listLocalSessions": {}}, {"$match": {}}],
            "cursor": {}
        }));
        assert!(matches!(
            classify(&local_sessions),
            Disposition::Unsupported { ref field, .. } if field == "$listLocalSessions"
        ));
    }

    #[test]
    fn test_unsupported_node_local_commands() {
        for name in ["getShardVersion", "getDatabaseVersion", "getLog"] {
            let mut command = Document::new();
            command.insert(name.to_string(), json!("test.coll"));
            match classify(&command) {
                Disposition::Unsupported { field, .. } => assert_eq!(field, name),
                other => panic!("{name} classified as {other:?}"),
            }
        }
    }

    #[test]
    fn test_broadcast_commands() {
        for command in [
            json!({"refreshLogicalSessionCacheNow": 1}),
            json!({"flushRouterConfig": 1}),
            json!({"setParameter": 1, "logLevel": 2}),
            json!({"setQuerySettings": {"find": "c", "$db": "test"}, "settings": {}}),
            json!({"removeQuerySettings": "hash"}),
        ] {
            assert_eq!(classify(&doc(command.clone())), Disposition::Broadcast, "{command}");
        }
    }

    #[test]
    fn test_cursor_affinity() {
        let get_more = classify(&doc(json!({"getMore": {"$numberLong": "42"}, "collection": "c"})));
        assert_eq!(
            get_more,
            Disposition::Affine(Affinity {
                cursor: Some(CursorId(42)),
                session: None
            })
        );

        let kill_one = classify(&doc(json!({"killCursors": "c", "cursors": [42]})));
        assert!(matches!(kill_one, Disposition::Affine(ref a) if a.cursor == Some(CursorId(42))));

        let release_one = classify(&doc(json!({"releaseMemory": [42.0]})));
        assert!(matches!(release_one, Disposition::Affine(ref a) if a.cursor == Some(CursorId(42))));
    }

    #[test]
    fn test_session_affinity() {
        let update = classify(&doc(json!({
            "update": "c",
            "updates": [],
            "lsid": lsid(),
            "txnNumber": {"$numberLong": "1"},
            "autocommit": false
        })));
        match update {
            Disposition::Affine(affinity) => {
                assert!(!affinity.is_continuation());
                let key = affinity.session.unwrap();
                assert_eq!(key.txn_number, 1);
                assert_eq!(key.session, SessionId::from_lsid(&lsid()));
            }
            other => panic!("unexpected disposition {other:?}"),
        }
    }

    #[test]
    fn test_cursor_and_session_together() {
        let get_more = classify(&doc(json!({
            "getMore": 7,
            "collection": "c",
            "lsid": lsid(),
            "txnNumber": 3
        })));
        match get_more {
            Disposition::Affine(affinity) => {
                assert_eq!(affinity.cursor, Some(CursorId(7)));
                assert_eq!(affinity.session.unwrap().txn_number, 3);
            }
            other => panic!("unexpected disposition {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_wins_over_session() {
        let command = doc(json!({"getLog": "global", "lsid": lsid(), "txnNumber": 1}));
        assert_eq!(classify(&command).name(), "unsupported");
    }
}
