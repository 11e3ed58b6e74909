/// Transaction affinity: (lsid, txnNumber) -> backend
use crate::core::document;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// Logical session id, compared by canonical document value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn from_lsid(lsid: &Value) -> Self {
        SessionId(document::canonicalize(lsid).to_string())
    }

    /// Short stable fingerprint for logs; raw lsid documents are verbose
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.fingerprint())
    }
}

/// Session plus the transaction number a command belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub session: SessionId,
    pub txn_number: i64,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} txn {}", self.session, self.txn_number)
    }
}

/// A session's current transaction pin
#[derive(Debug, Clone)]
pub struct SessionPin {
    pub txn_number: i64,
    pub backend_id: String,
    pub pinned_at: SystemTime,
}

/// Maps each session to the backend running its current transaction.
///
/// A session holds at most one pin. Pins are replaced when a new
/// transaction number arrives and are otherwise never removed.
#[derive(Debug, Default)]
pub struct SessionAffinityTable {
    pins: HashMap<SessionId, SessionPin>,
}

impl SessionAffinityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pinned for exactly this session and transaction number
    pub fn resolve(&self, key: &SessionKey) -> Option<&str> {
        self.pins
            .get(&key.session)
            .filter(|pin| pin.txn_number == key.txn_number)
            .map(|pin| pin.backend_id.as_str())
    }

    /// Pin `key` to `backend_id`, evicting a pin for an older transaction
    /// of the same session first. Returns the evicted pin, if any.
    pub fn record(&mut self, key: &SessionKey, backend_id: &str) -> Option<SessionPin> {
        let evicted = match self.pins.get(&key.session) {
            Some(pin) if pin.txn_number != key.txn_number => self.pins.remove(&key.session),
            _ => None,
        };

        if let Some(ref old) = evicted {
            log::info!(
                "{} moved from txn {} on {} to txn {}",
                key.session,
                old.txn_number,
                old.backend_id,
                key.txn_number
            );
        }

        self.pins.insert(
            key.session.clone(),
            SessionPin {
                txn_number: key.txn_number,
                backend_id: backend_id.to_string(),
                pinned_at: SystemTime::now(),
            },
        );
        log::info!("Pinned {} to backend {}", key, backend_id);

        evicted
    }

    /// When the longest-held pin was taken
    pub fn oldest_pin(&self) -> Option<SystemTime> {
        self.pins.values().map(|pin| pin.pinned_at).min()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Number of session pins per backend
    pub fn backend_distribution(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for pin in self.pins.values() {
            *counts.entry(pin.backend_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}
