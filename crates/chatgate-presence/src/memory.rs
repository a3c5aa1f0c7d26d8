//! In-memory presence store.
//!
//! Expiry is measured with `tokio::time::Instant`, so under
//! `tokio::time::pause()` tests decide exactly when a record's TTL runs out
//! by calling `tokio::time::advance`. Expired records are purged on every
//! operation, so the map never holds more than the live records plus
//! whatever expired since the last call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chatgate_protocol::{ConnectionId, SessionData, UserId};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::{PresenceConfig, PresenceError, PresenceStore};

struct Record {
    data: SessionData,
    expires_at: Instant,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A [`PresenceStore`] backed by a `HashMap`, for tests and single-node runs.
///
/// [`set_unavailable`](Self::set_unavailable) makes every operation fail
/// with [`PresenceError::StoreUnavailable`], which is how tests simulate an
/// outage of the shared store.
pub struct MemoryPresenceStore {
    records: Mutex<HashMap<String, Record>>,
    config: PresenceConfig,
    unavailable: AtomicBool,
}

impl MemoryPresenceStore {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            config,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Simulates the backing store going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records that have not expired.
    pub fn live_count(&self) -> usize {
        self.records().len()
    }

    /// Locks the map with every expired record already dropped.
    fn records(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        records.retain(|_, r| r.is_live(now));
        records
    }

    fn check_available(&self) -> Result<(), PresenceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PresenceError::StoreUnavailable(
                "in-memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryPresenceStore {
    fn default() -> Self {
        Self::new(PresenceConfig::default())
    }
}

impl PresenceStore for MemoryPresenceStore {
    async fn set_session(
        &self,
        user_id: &UserId,
        connection_id: ConnectionId,
        connected_at: DateTime<Utc>,
    ) -> Result<SessionData, PresenceError> {
        self.check_available()?;
        let data = SessionData::new(connection_id, &self.config.gateway_address, connected_at);
        let record = Record {
            data: data.clone(),
            expires_at: Instant::now() + self.config.ttl,
        };
        self.records().insert(self.config.key_for(user_id), record);
        Ok(data)
    }

    async fn get_session(
        &self,
        user_id: &UserId,
    ) -> Result<SessionData, PresenceError> {
        self.check_available()?;
        self.records()
            .get(&self.config.key_for(user_id))
            .map(|r| r.data.clone())
            .ok_or_else(|| PresenceError::NotOnline(user_id.clone()))
    }

    async fn remove_session(&self, user_id: &UserId) -> Result<(), PresenceError> {
        self.check_available()?;
        self.records().remove(&self.config.key_for(user_id));
        Ok(())
    }

    async fn is_online(&self, user_id: &UserId) -> Result<bool, PresenceError> {
        self.check_available()?;
        Ok(self.records().contains_key(&self.config.key_for(user_id)))
    }

    async fn refresh_ttl(&self, user_id: &UserId) -> Result<(), PresenceError> {
        self.check_available()?;
        match self.records().get_mut(&self.config.key_for(user_id)) {
            Some(record) => {
                record.expires_at = Instant::now() + self.config.ttl;
                Ok(())
            }
            None => Err(PresenceError::NotOnline(user_id.clone())),
        }
    }
}
