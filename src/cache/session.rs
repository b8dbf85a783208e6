/// Multi-tier session cache
///
/// Three tiers over one [`CacheStore`], each with its own key and TTL:
/// - validity: session id -> "valid" / "invalid"
/// - snapshot: public id -> serialized [`AccountSnapshot`]
/// - combined: session id -> snapshot plus validity, read first
///
/// A missing entry is never a rejection, and neither is a failing store:
/// both send the caller on to the next tier. Writes are fire-and-forget.
/// Invalidation is the one operation callers await, and it wins over any
/// write scheduled before it: pending writes for the invalidated keys are
/// awaited before the delete, and writes carrying an older [`WriteTicket`]
/// are dropped.
use crate::{
    cache::{categories, CacheConfig, CacheStore},
    db::account::AccountSnapshot,
    error::GateResult,
    metrics,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

const VALID: &str = "valid";
const INVALID: &str = "invalid";

/// Keys remembered by the write fence before it resets
const MAX_FENCED_KEYS: usize = 10_000;

/// Taken before resolving a session; writes scheduled under it are dropped
/// if their key was invalidated after it was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WriteTicket(u64);

/// Orders scheduled cache writes against invalidations
#[derive(Default)]
struct WriteFence {
    generation: u64,
    /// Tickets below this are stale for every key
    floor: u64,
    /// key -> generation of its last invalidation
    invalidated: HashMap<String, u64>,
    /// key -> spawned writes that may not have landed yet
    pending: HashMap<String, Vec<JoinHandle<()>>>,
}

impl WriteFence {
    fn ticket(&self) -> WriteTicket {
        WriteTicket(self.generation)
    }

    fn admits(&self, key: &str, ticket: WriteTicket) -> bool {
        ticket.0 >= self.floor
            && self
                .invalidated
                .get(key)
                .map_or(true, |generation| *generation <= ticket.0)
    }

    fn track(&mut self, key: String, handle: JoinHandle<()>) {
        if self.pending.len() >= MAX_FENCED_KEYS {
            self.pending.retain(|_, handles| {
                handles.retain(|h| !h.is_finished());
                !handles.is_empty()
            });
        }
        let handles = self.pending.entry(key).or_default();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Move `keys` past every ticket issued so far and take their pending writes
    fn invalidate(&mut self, keys: &[String]) -> Vec<JoinHandle<()>> {
        self.generation += 1;
        if self.invalidated.len() + keys.len() > MAX_FENCED_KEYS {
            self.invalidated.clear();
            self.floor = self.generation;
        }

        let mut handles = Vec::new();
        for key in keys {
            self.invalidated.insert(key.clone(), self.generation);
            if let Some(pending) = self.pending.remove(key) {
                handles.extend(pending);
            }
        }
        handles
    }
}

/// Cached session-validity value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
}

impl Validity {
    fn as_str(&self) -> &'static str {
        match self {
            Validity::Valid => VALID,
            Validity::Invalid => INVALID,
        }
    }
}

/// Combined tier value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedEntry {
    pub snapshot: Option<AccountSnapshot>,
    pub session_valid: bool,
}

/// Result of the tiered read protocol
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Session cached as valid with its owner's snapshot
    Hit(AccountSnapshot),
    /// Some tier holds an explicit negative
    Negative,
    /// Nothing definitive; consult the store
    Miss,
}

/// TTLs in seconds for each tier
#[derive(Debug, Clone, Copy)]
struct Ttls {
    validity: u64,
    snapshot: u64,
    combined: u64,
}

/// Session cache tiers over a shared store
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn CacheStore>,
    ttls: Ttls,
    fence: Arc<Mutex<WriteFence>>,
}

fn validity_key(session_id: &str) -> String {
    format!("{}{}", categories::SESSION_VALIDITY, session_id)
}

fn combined_key(session_id: &str) -> String {
    format!("{}{}", categories::SESSION_COMBINED, session_id)
}

fn snapshot_key(public_id: &str) -> String {
    format!("{}{}", categories::ACCOUNT_SNAPSHOT, public_id)
}

impl SessionCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            ttls: Ttls {
                validity: config.validity_ttl,
                snapshot: config.snapshot_ttl,
                combined: config.combined_ttl,
            },
            fence: Arc::new(Mutex::new(WriteFence::default())),
        }
    }

    fn fence(&self) -> MutexGuard<'_, WriteFence> {
        self.fence.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ticket for writes derived from a resolution starting now
    pub fn write_ticket(&self) -> WriteTicket {
        self.fence().ticket()
    }

    /// Raw read that treats store errors and corrupt values as misses
    async fn read<T: DeserializeOwned>(&self, tier: &str, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::record_cache_lookup(tier, "miss");
                return None;
            }
            Err(e) => {
                debug!("Cache read failed for {}, falling through: {}", key, e);
                metrics::record_cache_lookup(tier, "error");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Discarding undecodable cache entry {}: {}", key, e);
                metrics::record_cache_lookup(tier, "error");
                None
            }
        }
    }

    pub async fn get_combined(&self, session_id: &str) -> Option<CombinedEntry> {
        let entry: CombinedEntry = self.read("combined", &combined_key(session_id)).await?;
        metrics::record_cache_lookup(
            "combined",
            if entry.session_valid { "hit" } else { "negative" },
        );
        Some(entry)
    }

    pub async fn get_session_validity(&self, session_id: &str) -> Option<Validity> {
        let key = validity_key(session_id);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::record_cache_lookup("validity", "miss");
                return None;
            }
            Err(e) => {
                debug!("Cache read failed for {}, falling through: {}", key, e);
                metrics::record_cache_lookup("validity", "error");
                return None;
            }
        };

        match raw.as_str() {
            VALID => {
                metrics::record_cache_lookup("validity", "hit");
                Some(Validity::Valid)
            }
            INVALID => {
                metrics::record_cache_lookup("validity", "negative");
                Some(Validity::Invalid)
            }
            other => {
                debug!("Unexpected validity value {:?} for {}", other, key);
                metrics::record_cache_lookup("validity", "error");
                None
            }
        }
    }

    pub async fn get_account_snapshot(&self, public_id: &str) -> Option<AccountSnapshot> {
        let snapshot = self.read("snapshot", &snapshot_key(public_id)).await?;
        metrics::record_cache_lookup("snapshot", "hit");
        Some(snapshot)
    }

    /// Tiered read: combined first, then validity and snapshot together
    pub async fn lookup(&self, session_id: &str, public_id: &str) -> CacheLookup {
        if let Some(entry) = self.get_combined(session_id).await {
            match (entry.session_valid, entry.snapshot) {
                (false, _) => return CacheLookup::Negative,
                (true, Some(snapshot)) => return CacheLookup::Hit(snapshot),
                (true, None) => {}
            }
        }

        let (validity, snapshot) = tokio::join!(
            self.get_session_validity(session_id),
            self.get_account_snapshot(public_id)
        );

        match (validity, snapshot) {
            (Some(Validity::Invalid), _) => CacheLookup::Negative,
            (Some(Validity::Valid), Some(snapshot)) => CacheLookup::Hit(snapshot),
            _ => CacheLookup::Miss,
        }
    }

    /// Spawn a write whose failure is logged and dropped
    ///
    /// Skipped when `key` was invalidated after `ticket` was issued.
    fn spawn_write(
        &self,
        ticket: WriteTicket,
        tier: &'static str,
        key: String,
        value: String,
        ttl: u64,
    ) {
        let mut fence = self.fence();
        if !fence.admits(&key, ticket) {
            debug!("Dropping {} cache write for {}, invalidated since", tier, key);
            return;
        }

        let store = Arc::clone(&self.store);
        let write_key = key.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = store.set_with_ttl(&write_key, &value, ttl).await {
                debug!("Cache write failed for {}: {}", write_key, e);
                metrics::record_cache_write_failure(tier);
            }
        });
        fence.track(key, handle);
    }

    fn encode<T: Serialize>(tier: &'static str, value: &T) -> Option<String> {
        match serde_json::to_string(value) {
            Ok(json) => Some(json),
            Err(e) => {
                debug!("Failed to serialize {} cache entry: {}", tier, e);
                metrics::record_cache_write_failure(tier);
                None
            }
        }
    }

    pub fn put_validity(&self, ticket: WriteTicket, session_id: &str, validity: Validity) {
        self.spawn_write(
            ticket,
            "validity",
            validity_key(session_id),
            validity.as_str().to_string(),
            self.ttls.validity,
        );
    }

    pub fn put_snapshot(&self, ticket: WriteTicket, snapshot: &AccountSnapshot) {
        if let Some(json) = Self::encode("snapshot", snapshot) {
            self.spawn_write(
                ticket,
                "snapshot",
                snapshot_key(&snapshot.public_id),
                json,
                self.ttls.snapshot,
            );
        }
    }

    pub fn put_combined(&self, ticket: WriteTicket, session_id: &str, entry: &CombinedEntry) {
        if let Some(json) = Self::encode("combined", entry) {
            self.spawn_write(
                ticket,
                "combined",
                combined_key(session_id),
                json,
                self.ttls.combined,
            );
        }
    }

    /// Delete every tier that references the given keys
    pub async fn invalidate(
        &self,
        session_ids: &[String],
        public_id: Option<&str>,
    ) -> GateResult<()> {
        let mut keys: Vec<String> = session_ids
            .iter()
            .flat_map(|sid| [validity_key(sid), combined_key(sid)])
            .collect();
        if let Some(public_id) = public_id {
            keys.push(snapshot_key(public_id));
        }

        if keys.is_empty() {
            return Ok(());
        }

        let pending = self.fence().invalidate(&keys);
        for handle in pending {
            if let Err(e) = handle.await {
                debug!("Pending cache write did not complete: {}", e);
            }
        }

        self.store.delete(&keys).await
    }

    /// Write negative validity entries and wait for them to land
    ///
    /// Used after an explicit session invalidation so the next lookup is
    /// rejected from cache even before the store reflects the change.
    pub async fn mark_invalid(&self, session_ids: &[String]) -> GateResult<()> {
        for session_id in session_ids {
            self.store
                .set_with_ttl(
                    &validity_key(session_id),
                    Validity::Invalid.as_str(),
                    self.ttls.validity,
                )
                .await?;
        }
        Ok(())
    }
}
