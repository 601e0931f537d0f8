use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use teachat_types::TempId;

use crate::error::SendError;

/// How long a provisional message may wait for its server echo.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Clock-based temp ids, forced strictly increasing so two sends within the
/// same millisecond stay distinct.
#[derive(Debug, Default)]
pub struct TempIdGenerator {
    last: u64,
}

impl TempIdGenerator {
    pub fn next(&mut self, now_millis: u64) -> TempId {
        let value = now_millis.max(self.last + 1);
        self.last = value;
        TempId(value)
    }
}

/// Rejects blank input. The content itself is sent as typed.
pub fn validate_content(content: &str) -> Result<(), SendError> {
    if content.trim().is_empty() {
        Err(SendError::EmptyContent)
    } else {
        Ok(())
    }
}

/// Provisional sends still waiting for an echo, with their deadlines.
#[derive(Debug)]
pub struct PendingSends {
    timeout: Duration,
    pending: HashMap<TempId, Instant>,
}

impl Default for PendingSends {
    fn default() -> Self {
        Self::new(SEND_TIMEOUT)
    }
}

impl PendingSends {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
        }
    }

    pub fn track(&mut self, temp_id: TempId, now: Instant) {
        self.pending.insert(temp_id, now + self.timeout);
    }

    /// Returns true if the send was still awaited.
    pub fn confirm(&mut self, temp_id: TempId) -> bool {
        self.pending.remove(&temp_id).is_some()
    }

    /// Removes and returns every send whose deadline passed, oldest first.
    pub fn expire(&mut self, now: Instant) -> Vec<TempId> {
        let mut stuck: Vec<TempId> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(temp_id, _)| *temp_id)
            .collect();
        stuck.sort();
        for temp_id in &stuck {
            self.pending.remove(temp_id);
        }
        stuck
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
