//! Per-owner quota ledger
//!
//! The ledger caches each owner's `used_space` so quota checks do not scan
//! photos. It must always equal [`weighted_usage`] over the owner's photos.
//! Each owner has its own slot lock. Every mutation of an entry happens under
//! that slot's lock, and [`QuotaLedger::commit`] runs the photo write under
//! the same lock so the write and the ledger delta land together or not at
//! all. Writes for different owners never wait on each other.

use shoebox_domain::{LifecyclePolicy, OwnerId, Photo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Sum of weighted sizes of an owner's live photos
pub fn weighted_usage(photos: &[Photo], policy: &LifecyclePolicy) -> u64 {
    photos.iter().map(|p| p.weighted_size(policy)).sum()
}

/// Point-in-time view of one owner's quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    /// Owner
    pub owner_id: OwnerId,
    /// Limit in bytes (0 = unlimited)
    pub quota_limit: u64,
    /// Weighted bytes in use
    pub used_space: u64,
}

impl QuotaSnapshot {
    /// Bytes left under the limit, `None` when unlimited
    pub fn available(&self) -> Option<u64> {
        (self.quota_limit > 0).then(|| self.quota_limit.saturating_sub(self.used_space))
    }
}

/// Outcome of a quota-checked charge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// The write ran and the bytes were charged
    Admitted,
    /// The charge would have exceeded the limit; nothing was written
    WouldExceed {
        /// Bytes left under the limit
        available: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    quota_limit: u64,
    used_space: u64,
}

impl LedgerEntry {
    fn would_exceed(&self, bytes: u64) -> bool {
        self.quota_limit > 0 && self.used_space.saturating_add(bytes) > self.quota_limit
    }

    fn apply(&mut self, owner_id: OwnerId, delta: i64) {
        let next = self.used_space as i128 + delta as i128;
        if next < 0 {
            tracing::warn!(
                "Ledger underflow for owner {}: {} {:+}, clamping to 0",
                owner_id,
                self.used_space,
                delta
            );
        }
        self.used_space = next.clamp(0, u64::MAX as i128) as u64;
    }

    fn snapshot(&self, owner_id: OwnerId) -> QuotaSnapshot {
        QuotaSnapshot {
            owner_id,
            quota_limit: self.quota_limit,
            used_space: self.used_space,
        }
    }
}

/// One owner's entry; `None` until it is seeded or first touched
type Slot = Arc<Mutex<Option<LedgerEntry>>>;

/// Per-owner `used_space` counters
#[derive(Debug)]
pub struct QuotaLedger {
    slots: RwLock<HashMap<OwnerId, Slot>>,
    default_limit: u64,
}

impl QuotaLedger {
    /// Create an empty ledger; unknown owners get `default_limit`
    pub fn new(default_limit: u64) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            default_limit,
        }
    }

    /// The owner's slot, created empty on first use
    ///
    /// The map lock is only held for the lookup; callers then lock the slot.
    fn slot(&self, owner_id: OwnerId) -> Slot {
        {
            // Slots are plain counters; a panic elsewhere cannot leave one half-written
            let slots = self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(slot) = slots.get(&owner_id) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.entry(owner_id).or_default().clone()
    }

    fn existing_slot(&self, owner_id: OwnerId) -> Option<Slot> {
        let slots = self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.get(&owner_id).cloned()
    }

    /// Copy of the owner's entry without creating a slot
    fn current(&self, owner_id: OwnerId) -> Option<LedgerEntry> {
        let slot = self.existing_slot(owner_id)?;
        let entry = *Self::lock(&slot);
        entry
    }

    fn lock(slot: &Slot) -> MutexGuard<'_, Option<LedgerEntry>> {
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn default_entry(&self) -> LedgerEntry {
        LedgerEntry {
            quota_limit: self.default_limit,
            used_space: 0,
        }
    }

    fn entry<'a>(&self, guard: &'a mut MutexGuard<'_, Option<LedgerEntry>>) -> &'a mut LedgerEntry {
        let default = self.default_entry();
        guard.get_or_insert(default)
    }

    /// Whether the owner has an entry
    pub fn contains(&self, owner_id: OwnerId) -> bool {
        self.current(owner_id).is_some()
    }

    /// Owners with an entry
    pub fn owners(&self) -> Vec<OwnerId> {
        let slots: Vec<(OwnerId, Slot)> = {
            let map = self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            map.iter().map(|(owner, slot)| (*owner, slot.clone())).collect()
        };
        slots
            .into_iter()
            .filter(|(_, slot)| Self::lock(slot).is_some())
            .map(|(owner, _)| owner)
            .collect()
    }

    /// Atomically add `delta` bytes (may be negative) and return the new usage
    pub fn adjust(&self, owner_id: OwnerId, delta: i64) -> u64 {
        let slot = self.slot(owner_id);
        let mut guard = Self::lock(&slot);
        let entry = self.entry(&mut guard);
        entry.apply(owner_id, delta);
        entry.used_space
    }

    /// Run `write` under the owner's lock and apply `delta` if it returns `Ok(true)`
    ///
    /// `write` is the version-guarded photo write. Returning `Ok(false)` means
    /// the write lost a version race; the ledger is left untouched.
    pub fn commit<E>(
        &self,
        owner_id: OwnerId,
        delta: i64,
        write: impl FnOnce() -> Result<bool, E>,
    ) -> Result<bool, E> {
        let slot = self.slot(owner_id);
        let mut guard = Self::lock(&slot);
        let committed = write()?;
        if committed {
            self.entry(&mut guard).apply(owner_id, delta);
        }
        Ok(committed)
    }

    /// Charge `bytes` if they fit, running `write` first under the same lock
    pub fn charge_with<E>(
        &self,
        owner_id: OwnerId,
        bytes: u64,
        write: impl FnOnce() -> Result<(), E>,
    ) -> Result<Charge, E> {
        let slot = self.slot(owner_id);
        let mut guard = Self::lock(&slot);
        let entry = *self.entry(&mut guard);
        if entry.would_exceed(bytes) {
            return Ok(Charge::WouldExceed {
                available: entry.quota_limit.saturating_sub(entry.used_space),
            });
        }
        write()?;
        self.entry(&mut guard)
            .apply(owner_id, bytes.min(i64::MAX as u64) as i64);
        Ok(Charge::Admitted)
    }

    /// Whether charging `bytes` would push the owner over its limit
    ///
    /// A limit of 0 means unlimited. Only net-increasing operations consult
    /// this; lifecycle transitions never do.
    pub fn charge_would_exceed(&self, owner_id: OwnerId, bytes: u64) -> bool {
        let slot = self.slot(owner_id);
        let mut guard = Self::lock(&slot);
        self.entry(&mut guard).would_exceed(bytes)
    }

    /// Resynchronise the owner's usage from its photos and return it
    pub fn recompute(&self, owner_id: OwnerId, photos: &[Photo], policy: &LifecyclePolicy) -> u64 {
        let used = weighted_usage(photos, policy);
        let slot = self.slot(owner_id);
        let mut guard = Self::lock(&slot);
        self.entry(&mut guard).used_space = used;
        used
    }

    /// Return the owner's snapshot, seeding the entry first if it is missing
    ///
    /// `seed` yields `(quota_limit, used_space)` and runs under the owner's
    /// lock, so no adjustment can slip in between the read and the insert.
    pub fn get_or_seed<E>(
        &self,
        owner_id: OwnerId,
        seed: impl FnOnce() -> Result<(u64, u64), E>,
    ) -> Result<QuotaSnapshot, E> {
        let slot = self.slot(owner_id);
        let mut guard = Self::lock(&slot);
        if guard.is_none() {
            let (quota_limit, used_space) = seed()?;
            *guard = Some(LedgerEntry {
                quota_limit,
                used_space,
            });
        }
        Ok(self.entry(&mut guard).snapshot(owner_id))
    }

    /// Replace the owner's entry with a fresh `(quota_limit, used_space)` seed
    pub fn reseed<E>(
        &self,
        owner_id: OwnerId,
        seed: impl FnOnce() -> Result<(u64, u64), E>,
    ) -> Result<QuotaSnapshot, E> {
        let slot = self.slot(owner_id);
        let mut guard = Self::lock(&slot);
        let (quota_limit, used_space) = seed()?;
        let entry = guard.insert(LedgerEntry {
            quota_limit,
            used_space,
        });
        Ok(entry.snapshot(owner_id))
    }

    /// Compare the cached usage with `expected()`, evaluated under the owner's lock
    ///
    /// Returns `(cached, expected)`.
    pub fn verify<E>(
        &self,
        owner_id: OwnerId,
        expected: impl FnOnce() -> Result<u64, E>,
    ) -> Result<(u64, u64), E> {
        let slot = self.slot(owner_id);
        let guard = Self::lock(&slot);
        let cached = (*guard).map(|e| e.used_space).unwrap_or(0);
        Ok((cached, expected()?))
    }

    /// Set the owner's limit (0 = unlimited)
    pub fn set_limit(&self, owner_id: OwnerId, quota_limit: u64) {
        let slot = self.slot(owner_id);
        let mut guard = Self::lock(&slot);
        self.entry(&mut guard).quota_limit = quota_limit;
    }

    /// Cached usage of the owner (0 if unknown)
    pub fn used_space(&self, owner_id: OwnerId) -> u64 {
        self.current(owner_id)
            .map(|e| e.used_space)
            .unwrap_or(0)
    }

    /// Current snapshot of the owner
    pub fn snapshot(&self, owner_id: OwnerId) -> QuotaSnapshot {
        self.current(owner_id)
            .unwrap_or_else(|| self.default_entry())
            .snapshot(owner_id)
    }
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoebox_domain::StorageTier;

    #[test]
    fn test_adjust_both_directions() {
        let ledger = QuotaLedger::default();
        let owner = OwnerId::new();
        assert_eq!(ledger.adjust(owner, 1_000), 1_000);
        assert_eq!(ledger.adjust(owner, -400), 600);
        assert_eq!(ledger.used_space(owner), 600);
    }

    #[test]
    fn test_adjust_clamps_underflow() {
        let ledger = QuotaLedger::default();
        let owner = OwnerId::new();
        ledger.adjust(owner, 10);
        assert_eq!(ledger.adjust(owner, -50), 0);
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let ledger = QuotaLedger::new(0);
        let owner = OwnerId::new();
        ledger.adjust(owner, 1 << 40);
        assert!(!ledger.charge_would_exceed(owner, u64::MAX / 2));
        assert_eq!(ledger.snapshot(owner).available(), None);
    }

    #[test]
    fn test_charge_would_exceed() {
        let ledger = QuotaLedger::new(1_000);
        let owner = OwnerId::new();
        ledger.adjust(owner, 600);
        assert!(!ledger.charge_would_exceed(owner, 400));
        assert!(ledger.charge_would_exceed(owner, 401));
        assert_eq!(ledger.snapshot(owner).available(), Some(400));
    }

    #[test]
    fn test_commit_applies_only_on_success() {
        let ledger = QuotaLedger::default();
        let owner = OwnerId::new();
        ledger.adjust(owner, 100);

        let lost: Result<bool, ()> = ledger.commit(owner, -50, || Ok(false));
        assert_eq!(lost, Ok(false));
        assert_eq!(ledger.used_space(owner), 100);

        let failed: Result<bool, &str> = ledger.commit(owner, -50, || Err("db down"));
        assert!(failed.is_err());
        assert_eq!(ledger.used_space(owner), 100);

        let won: Result<bool, ()> = ledger.commit(owner, -50, || Ok(true));
        assert_eq!(won, Ok(true));
        assert_eq!(ledger.used_space(owner), 50);
    }

    #[test]
    fn test_charge_with_refuses_without_writing() {
        let ledger = QuotaLedger::new(100);
        let owner = OwnerId::new();
        let mut wrote = false;
        let outcome: Result<Charge, ()> = ledger.charge_with(owner, 150, || {
            wrote = true;
            Ok(())
        });
        assert_eq!(outcome, Ok(Charge::WouldExceed { available: 100 }));
        assert!(!wrote);

        let outcome: Result<Charge, ()> = ledger.charge_with(owner, 100, || Ok(()));
        assert_eq!(outcome, Ok(Charge::Admitted));
        assert_eq!(ledger.used_space(owner), 100);
    }

    #[test]
    fn test_recompute_matches_weighted_sizes() {
        let policy = LifecyclePolicy::default();
        let owner = OwnerId::new();
        let mut frozen = Photo::uploaded(owner, 1_001, 0, 0);
        frozen.frozen = true;
        let mut deleted = Photo::uploaded(owner, 5_000, 0, 0);
        deleted.storage_tier = StorageTier::Deleted;
        let cold = Photo {
            storage_tier: StorageTier::Cold,
            ..Photo::uploaded(owner, 300, 20, 0)
        };

        let ledger = QuotaLedger::default();
        ledger.adjust(owner, 42);
        let used = ledger.recompute(owner, &[frozen, deleted, cold], &policy);
        assert_eq!(used, 500 + 320);
        assert_eq!(ledger.used_space(owner), used);
    }

    #[test]
    fn test_get_or_seed_runs_once() {
        let ledger = QuotaLedger::default();
        let owner = OwnerId::new();
        let first: Result<_, ()> = ledger.get_or_seed(owner, || Ok((500, 200)));
        assert_eq!(first.unwrap().used_space, 200);

        let second: Result<_, ()> = ledger.get_or_seed(owner, || panic!("seeded twice"));
        let snapshot = second.unwrap();
        assert_eq!(snapshot.quota_limit, 500);
        assert_eq!(snapshot.available(), Some(300));
    }

    #[test]
    fn test_owners_commit_independently() {
        use std::sync::mpsc;
        use std::time::Duration;

        let ledger = &QuotaLedger::default();
        let (slow, other) = (OwnerId::new(), OwnerId::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        std::thread::scope(|scope| {
            let blocked = scope.spawn(move || {
                let committed: Result<bool, ()> = ledger.commit(slow, 100, || {
                    entered_tx.send(()).unwrap();
                    // Only released once the other owner's commit went through
                    Ok(release_rx.recv_timeout(Duration::from_secs(5)).is_ok())
                });
                committed
            });

            entered_rx.recv().unwrap();
            let committed: Result<bool, ()> = ledger.commit(other, 40, || Ok(true));
            assert_eq!(committed, Ok(true));
            assert_eq!(ledger.used_space(other), 40);
            release_tx.send(()).unwrap();

            assert_eq!(blocked.join().unwrap(), Ok(true));
        });

        assert_eq!(ledger.used_space(slow), 100);
        let mut owners = ledger.owners();
        owners.sort();
        let mut expected = vec![slow, other];
        expected.sort();
        assert_eq!(owners, expected);
    }
}
