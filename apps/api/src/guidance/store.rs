//! Bundle Store: an in-process, time-bounded registry of request bundles.
//!
//! Every bundle ends in the same place: payload scrubbed, entry removed. Three
//! things get it there: an explicit `destroy`, TTL expiry, or capacity
//! eviction. Expiry is driven by one ordered schedule keyed on
//! `(expires_at, seq)`, checked on every access and by a single background
//! reaper task; there is no per-bundle timer.
//!
//! Eviction follows arrival order (`seq`), not timestamps, so a wall clock
//! stepping backwards can never make a fresh bundle look like the oldest.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use crate::guidance::bundle::{Bundle, BundlePayload};
use crate::guidance::clock::Clock;

#[derive(Debug, Clone, Copy)]
pub struct BundleStoreConfig {
    pub ttl: Duration,
    pub max_bundles: usize,
}

/// Lifecycle of a registered bundle. A destroyed bundle is simply absent
/// from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    Active,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    Consumed,
    Expired,
    Evicted,
    Shutdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BundleUseError {
    #[error("bundle {0} is not registered")]
    Unknown(Uuid),

    #[error("bundle {0} is already in flight")]
    InFlight(Uuid),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStoreStatus {
    pub count: usize,
    pub in_flight: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

type ScheduleKey = (DateTime<Utc>, u64);

struct Entry {
    bundle: Bundle,
    state: BundleState,
    schedule_key: ScheduleKey,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<Uuid, Entry>,
    /// Expiry order.
    schedule: BTreeMap<ScheduleKey, Uuid>,
    /// Arrival order, for eviction and status.
    arrivals: BTreeMap<u64, Uuid>,
    next_seq: u64,
}

impl Registry {
    fn insert(&mut self, bundle: Bundle) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let schedule_key = (bundle.expires_at, seq);
        self.schedule.insert(schedule_key, bundle.id);
        self.arrivals.insert(seq, bundle.id);
        self.entries.insert(
            bundle.id,
            Entry {
                bundle,
                state: BundleState::Active,
                schedule_key,
            },
        );
    }

    fn remove(&mut self, id: Uuid, reason: DestroyReason) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        self.schedule.remove(&entry.schedule_key);
        self.arrivals.remove(&entry.schedule_key.1);
        entry.bundle.scrub();
        debug!("Bundle {id} destroyed ({reason:?})");
        true
    }

    fn next_to_expire(&self) -> Option<(DateTime<Utc>, Uuid)> {
        self.schedule
            .first_key_value()
            .map(|(&(expires_at, _), &id)| (expires_at, id))
    }

    fn oldest(&self) -> Option<Uuid> {
        self.arrivals.first_key_value().map(|(_, &id)| id)
    }

    fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut swept = 0;
        while let Some((expires_at, id)) = self.next_to_expire() {
            if expires_at > now {
                break;
            }
            self.remove(id, DestroyReason::Expired);
            swept += 1;
        }
        swept
    }

    fn evict_over_capacity(&mut self, max_bundles: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max_bundles {
            let Some(id) = self.oldest() else {
                break;
            };
            self.remove(id, DestroyReason::Evicted);
            evicted += 1;
        }
        evicted
    }
}

pub struct BundleStore {
    ttl: chrono::Duration,
    max_bundles: usize,
    clock: Arc<dyn Clock>,
    registry: Mutex<Registry>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl BundleStore {
    pub fn new(config: BundleStoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        ensure!(!config.ttl.is_zero(), "bundle TTL must be positive");
        ensure!(config.max_bundles > 0, "bundle capacity must be at least 1");
        let ttl = chrono::Duration::from_std(config.ttl).context("bundle TTL is out of range")?;

        Ok(Self {
            ttl,
            max_bundles: config.max_bundles,
            clock,
            registry: Mutex::new(Registry::default()),
            reaper: Mutex::new(None),
        })
    }

    /// Registers `payload` under a fresh id, then sweeps expired bundles and
    /// evicts the oldest ones while the population exceeds the cap.
    pub fn create(&self, payload: BundlePayload) -> Bundle {
        let now = self.clock.now();
        let bundle = Bundle::new(Uuid::new_v4(), now, now + self.ttl, payload);

        let mut registry = self.lock_registry();
        registry.insert(bundle.clone());
        debug!("Bundle {} created, expires at {}", bundle.id, bundle.expires_at);

        let expired = registry.sweep_expired(now);
        let evicted = registry.evict_over_capacity(self.max_bundles);
        if evicted > 0 {
            info!(
                "Bundle store over capacity: evicted {evicted} oldest bundle(s), {expired} expired"
            );
        }

        bundle
    }

    /// Scrubs and removes `id`. Unknown or already-destroyed ids are a no-op.
    pub fn destroy(&self, id: Uuid) -> bool {
        self.lock_registry().remove(id, DestroyReason::Consumed)
    }

    /// Claims an active bundle for its single upstream call, returning the
    /// prompt by value.
    ///
    /// The TTL keeps running while a bundle is in flight; the caller holds its
    /// own copy of the prompt, so expiry mid-call scrubs only the stored payload.
    pub fn begin_use(&self, id: Uuid) -> Result<String, BundleUseError> {
        let mut registry = self.swept_registry();
        let entry = registry
            .entries
            .get_mut(&id)
            .ok_or(BundleUseError::Unknown(id))?;

        match entry.state {
            BundleState::Active => {
                entry.state = BundleState::InFlight;
                Ok(entry.bundle.prompt())
            }
            BundleState::InFlight => Err(BundleUseError::InFlight(id)),
        }
    }

    /// `None` once the bundle is destroyed or expired.
    #[cfg(test)]
    pub fn state(&self, id: Uuid) -> Option<BundleState> {
        self.swept_registry().entries.get(&id).map(|entry| entry.state)
    }

    #[cfg(test)]
    pub fn contains(&self, id: Uuid) -> bool {
        self.state(id).is_some()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.swept_registry().entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys every bundle whose TTL has passed. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        self.lock_registry().sweep_expired(now)
    }

    pub fn status(&self) -> BundleStoreStatus {
        let registry = self.swept_registry();
        let created_at = |entry: Option<(&u64, &Uuid)>| {
            entry
                .and_then(|(_, id)| registry.entries.get(id))
                .map(|e| e.bundle.created_at)
        };

        BundleStoreStatus {
            count: registry.entries.len(),
            in_flight: registry
                .entries
                .values()
                .filter(|e| e.state == BundleState::InFlight)
                .count(),
            oldest: created_at(registry.arrivals.first_key_value()),
            newest: created_at(registry.arrivals.last_key_value()),
        }
    }

    /// Starts the periodic expiry tick. The task holds only a weak reference
    /// and exits once the store is dropped. Replaces any running reaper.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                let swept = store.sweep_expired();
                if swept > 0 {
                    debug!("Bundle reaper destroyed {swept} expired bundle(s)");
                }
            }
        });

        if let Some(previous) = self.lock_reaper().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the reaper and destroys every registered bundle.
    pub fn shutdown(&self) {
        if let Some(reaper) = self.lock_reaper().take() {
            reaper.abort();
        }

        let mut registry = self.lock_registry();
        let ids: Vec<Uuid> = registry.entries.keys().copied().collect();
        for id in &ids {
            registry.remove(*id, DestroyReason::Shutdown);
        }
        info!("Bundle store shut down, destroyed {} bundle(s)", ids.len());
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn swept_registry(&self) -> MutexGuard<'_, Registry> {
        let now = self.clock.now();
        let mut registry = self.lock_registry();
        registry.sweep_expired(now);
        registry
    }

    fn lock_reaper(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reaper.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
