/// Cursor affinity: cursor id -> backend that opened it
use crate::core::CursorId;
use fnv::FnvHashMap;
use std::collections::HashMap;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct CursorPin {
    pub backend_id: String,
    pub opened_at: SystemTime,
}

/// Cursor state is local to the router that opened it, so every
/// continuation must go back there.
#[derive(Debug, Default)]
pub struct CursorAffinityTable {
    pins: FnvHashMap<CursorId, CursorPin>,
}

impl CursorAffinityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, cursor_id: CursorId) -> Option<&str> {
        self.pins.get(&cursor_id).map(|pin| pin.backend_id.as_str())
    }

    /// Pin a freshly opened cursor. Returns false for the zero id, which
    /// means the whole result set came back in the first batch.
    pub fn record(&mut self, cursor_id: CursorId, backend_id: &str) -> bool {
        if cursor_id.is_none() {
            return false;
        }

        let pin = CursorPin {
            backend_id: backend_id.to_string(),
            opened_at: SystemTime::now(),
        };
        if let Some(previous) = self.pins.insert(cursor_id, pin) {
            if previous.backend_id != backend_id {
                log::warn!(
                    "Cursor {} reissued by {}; previously pinned to {}",
                    cursor_id,
                    backend_id,
                    previous.backend_id
                );
            }
        }
        log::info!("Pinned cursor {} to backend {}", cursor_id, backend_id);
        true
    }

    pub fn remove(&mut self, cursor_id: CursorId) -> Option<CursorPin> {
        let removed = self.pins.remove(&cursor_id);
        if let Some(ref pin) = removed {
            log::debug!("Released cursor {} on backend {}", cursor_id, pin.backend_id);
        }
        removed
    }

    /// When the longest-lived cursor was opened
    pub fn oldest_pin(&self) -> Option<SystemTime> {
        self.pins.values().map(|pin| pin.opened_at).min()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Number of cursor pins per backend
    pub fn backend_distribution(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for pin in self.pins.values() {
            *counts.entry(pin.backend_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}
