//! The lifecycle engine
//!
//! Owns the photo state machine (`apply`), the freeze manager
//! (`freeze`/`unfreeze`) and the quota ledger upkeep. Every photo write goes
//! through `write_photo`, which pairs the version-guarded
//! store write with its ledger delta.

use crate::error::store_error;
use crate::ledger::{weighted_usage, Charge, QuotaLedger, QuotaSnapshot};
use crate::retry::with_storage_retry;
use crate::storage::{StorageBackend, StorageError};
use crate::{EngineConfig, LifecycleError, RetryConfig, TracingAuditSink};
use shoebox_domain::{
    plan_transition, AlbumId, AuditEvent, AuditSink, CasOutcome, Clock, GoverningAction,
    LifecyclePolicy, LifecycleStore, OwnerId, Photo, PhotoId, RuleId, RuleSet, RuleSetId,
    StorageTier, SystemClock, Transition, TransitionRecord,
};
use shoebox_gatekeeper::{Gatekeeper, ValidationConfig, ValidationError};
use std::sync::{Arc, Mutex};

/// An owner whose cached usage disagrees with a recomputation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerDrift {
    /// Owner
    pub owner_id: OwnerId,
    /// Usage held by the ledger
    pub cached: u64,
    /// Usage recomputed from the owner's photos
    pub expected: u64,
}

/// A photo update that went through the conflict-retry loop
struct Committed {
    photo: Photo,
    changed: bool,
    at: u64,
}

/// Lifecycle engine over a persistence store `S`
pub struct LifecycleEngine<S> {
    store: Arc<S>,
    storage: Arc<dyn StorageBackend>,
    ledger: Arc<QuotaLedger>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    gatekeeper: Gatekeeper,
    policy: LifecyclePolicy,
    retry: RetryConfig,
    default_quota_limit: u64,
    rule_set_writes: Mutex<()>,
}

impl<S: LifecycleStore> LifecycleEngine<S> {
    /// Create an engine with the wall clock and a tracing audit sink
    ///
    /// Fails with `Config` when the configuration does not validate.
    pub fn new(
        store: Arc<S>,
        storage: Arc<dyn StorageBackend>,
        config: &EngineConfig,
    ) -> Result<Self, LifecycleError> {
        config.validate().map_err(LifecycleError::Config)?;
        let policy = config.policy.to_policy();
        Ok(Self {
            store,
            storage,
            ledger: Arc::new(QuotaLedger::new(config.quota.default_limit_bytes)),
            clock: Arc::new(SystemClock),
            audit: Arc::new(TracingAuditSink),
            gatekeeper: Gatekeeper::new(ValidationConfig::from_policy(&policy)),
            policy,
            retry: config.retry.clone(),
            default_quota_limit: config.quota.default_limit_bytes,
            rule_set_writes: Mutex::new(()),
        })
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the audit sink
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// The persistence store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The quota ledger
    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    /// The audit sink
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Active lifecycle policy
    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Active retry budgets
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Current instant according to the engine's clock
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // ---- Photos ----

    /// Load a photo
    pub fn get_photo(&self, photo_id: PhotoId) -> Result<Photo, LifecycleError> {
        self.store
            .get_photo(photo_id)
            .map_err(store_error)?
            .ok_or(LifecycleError::PhotoNotFound(photo_id))
    }

    /// Register a new upload and charge it to the owner's quota
    ///
    /// Refuses with `SizeOutOfRange` when the sizes overflow, and with
    /// `QuotaExceeded` when the full size does not fit.
    pub fn register_upload(
        &self,
        owner_id: OwnerId,
        original_size: u64,
        thumbnail_size: u64,
        album_ids: impl IntoIterator<Item = AlbumId>,
    ) -> Result<Photo, LifecycleError> {
        if !Photo::size_in_range(original_size, thumbnail_size) {
            return Err(LifecycleError::SizeOutOfRange {
                original_size,
                thumbnail_size,
            });
        }
        self.ensure_owner(owner_id)?;

        let photo = Photo::uploaded(owner_id, original_size, thumbnail_size, self.now())
            .in_albums(album_ids);
        let bytes = photo.weighted_size(&self.policy);

        let charge = self.ledger.charge_with(owner_id, bytes, || {
            self.store.insert_photo(&photo).map_err(store_error)
        })?;

        match charge {
            Charge::Admitted => {
                tracing::info!(
                    "Registered photo {} for owner {} ({} bytes)",
                    photo.id,
                    owner_id,
                    bytes
                );
                Ok(photo)
            }
            Charge::WouldExceed { available } => Err(LifecycleError::QuotaExceeded {
                owner_id,
                requested: bytes,
                available,
            }),
        }
    }

    /// Apply a governing action to `photo`, guarded by `photo.version`
    ///
    /// `photo` must be the state the caller read. No-op transitions (repeating
    /// an action already in effect, anything on a tombstone) commit a version
    /// bump only. A real transition calls the storage backend first and
    /// commits the new tier and its ledger delta only once the backend has
    /// confirmed; if the backend stays unavailable the photo keeps its tier
    /// and is flagged `pending_retry`. Once the backend has confirmed, version
    /// conflicts no longer fail the call: the tier change is re-committed over
    /// the fresh record, within the conflict budget.
    pub async fn apply(
        &self,
        photo: &Photo,
        action: GoverningAction,
        rule_id: Option<RuleId>,
    ) -> Result<Photo, LifecycleError> {
        let conflict = LifecycleError::Conflict {
            photo_id: photo.id,
            attempts: 1,
        };

        let mut next = photo.clone();
        next.version = photo.version + 1;

        let (from, to) = match plan_transition(photo.storage_tier, action) {
            Transition::NoOp => {
                if !self.write_photo(photo, &next)? {
                    return Err(conflict);
                }
                tracing::debug!(
                    "Photo {} already satisfies {} (version {})",
                    photo.id,
                    action.as_str(),
                    next.version
                );
                return Ok(next);
            }
            Transition::Advance { from, to } => (from, to),
        };

        // Do not touch the backend on behalf of a stale read
        if self.get_photo(photo.id)?.version != photo.version {
            return Err(conflict);
        }

        if let Err(err) = self.call_storage(photo.id, to).await {
            return Err(self.defer(photo, &err));
        }

        self.commit_transition(photo, action, from, to, rule_id).await
    }

    /// Record a tier change the backend has already carried out
    ///
    /// A concurrent write (a freeze, say) may have bumped the version since
    /// `photo` was read. The new tier is then layered over the fresh record,
    /// so the ledger delta is taken against what is actually stored.
    async fn commit_transition(
        &self,
        photo: &Photo,
        action: GoverningAction,
        from: StorageTier,
        to: StorageTier,
        rule_id: Option<RuleId>,
    ) -> Result<Photo, LifecycleError> {
        let attempts = self.retry.conflict_attempts.max(1);
        let mut current = photo.clone();

        for attempt in 1..=attempts {
            let mut next = current.clone();
            next.storage_tier = to;
            next.pending_retry = false;
            next.version = current.version + 1;

            if self.write_photo(&current, &next)? {
                self.audit.record(&AuditEvent::Transition(TransitionRecord {
                    photo_id: photo.id,
                    from_tier: from,
                    to_tier: to,
                    timestamp: self.now(),
                    rule_id,
                }));
                tracing::info!("Photo {} moved {} -> {}", photo.id, from, to);
                return Ok(next);
            }

            tracing::warn!(
                "Photo {} changed while moving to {} (attempt {}/{}), re-reading",
                photo.id,
                to,
                attempt,
                attempts
            );
            if attempt < attempts {
                tokio::time::sleep(self.retry.conflict_backoff(attempt)).await;
            }
            current = self.get_photo(photo.id)?;
            if matches!(plan_transition(current.storage_tier, action), Transition::NoOp) {
                return Ok(current);
            }
        }

        if let Err(e) = self.flag_pending(current) {
            tracing::warn!("Failed to flag photo {} pending_retry: {}", photo.id, e);
        }
        tracing::error!(
            "Backend moved photo {} to {} but the record kept conflicting; retried next sweep",
            photo.id,
            to
        );
        self.audit.record(&AuditEvent::Failure {
            photo_id: photo.id,
            kind: "conflict".to_string(),
            detail: format!("tier {} not recorded after {} attempts", to, attempts),
            timestamp: self.now(),
        });

        Err(LifecycleError::Conflict {
            photo_id: photo.id,
            attempts,
        })
    }

    async fn call_storage(&self, photo_id: PhotoId, to: StorageTier) -> Result<(), StorageError> {
        let storage = &self.storage;
        match to {
            StorageTier::Deleted => {
                with_storage_retry(&self.retry, "delete", move || storage.delete(photo_id)).await
            }
            tier => {
                with_storage_retry(&self.retry, "move", move || storage.move_to_tier(photo_id, tier))
                    .await
            }
        }
    }

    /// Flag the photo for the next sweep after the backend gave up
    fn defer(&self, photo: &Photo, err: &StorageError) -> LifecycleError {
        if let Err(e) = self.flag_pending(photo.clone()) {
            tracing::warn!("Failed to flag photo {} pending_retry: {}", photo.id, e);
        }

        tracing::error!(
            "Storage retries exhausted for photo {}: {}; deferring to next sweep",
            photo.id,
            err
        );
        self.audit.record(&AuditEvent::Failure {
            photo_id: photo.id,
            kind: "collaborator_unavailable".to_string(),
            detail: err.to_string(),
            timestamp: self.now(),
        });

        LifecycleError::CollaboratorUnavailable {
            photo_id: photo.id,
            reason: err.to_string(),
        }
    }

    /// Set `pending_retry`, re-reading on version conflicts
    fn flag_pending(&self, mut current: Photo) -> Result<(), LifecycleError> {
        for _ in 0..self.retry.conflict_attempts.max(1) {
            if current.pending_retry {
                return Ok(());
            }
            let mut pending = current.clone();
            pending.pending_retry = true;
            pending.version = current.version + 1;
            if self.write_photo(&current, &pending)? {
                return Ok(());
            }
            current = self.get_photo(current.id)?;
        }
        Err(LifecycleError::Conflict {
            photo_id: current.id,
            attempts: self.retry.conflict_attempts.max(1),
        })
    }

    // ---- Freeze / unfreeze ----

    /// Freeze a photo, halving its quota cost
    ///
    /// Fails with `AlreadyFrozen`, or `CooldownActive` when the photo was
    /// unfrozen less than the re-freeze cooldown ago.
    pub async fn freeze(&self, photo_id: PhotoId) -> Result<QuotaSnapshot, LifecycleError> {
        let policy = self.policy;
        let committed = self
            .update_photo(photo_id, |photo, now| {
                if photo.frozen {
                    return Err(LifecycleError::AlreadyFrozen(photo_id));
                }
                if let Some(remaining_secs) = photo.cooldown_remaining(now, &policy) {
                    return Err(LifecycleError::CooldownActive {
                        photo_id,
                        remaining_secs,
                    });
                }
                let mut next = photo.clone();
                next.frozen = true;
                Ok(Some(next))
            })
            .await?;

        self.freeze_changed(&committed.photo, committed.at);
        Ok(self.ledger.snapshot(committed.photo.owner_id))
    }

    /// Unfreeze a photo, restoring its full quota cost and starting the cooldown
    pub async fn unfreeze(&self, photo_id: PhotoId) -> Result<QuotaSnapshot, LifecycleError> {
        let committed = self
            .update_photo(photo_id, |photo, now| {
                if !photo.frozen {
                    return Err(LifecycleError::NotFrozen(photo_id));
                }
                let mut next = photo.clone();
                next.frozen = false;
                next.unfrozen_at = Some(now);
                Ok(Some(next))
            })
            .await?;

        self.freeze_changed(&committed.photo, committed.at);
        Ok(self.ledger.snapshot(committed.photo.owner_id))
    }

    fn freeze_changed(&self, photo: &Photo, at: u64) {
        self.audit.record(&AuditEvent::FreezeChanged {
            photo_id: photo.id,
            frozen: photo.frozen,
            timestamp: at,
        });
        tracing::info!(
            "Photo {} {}",
            photo.id,
            if photo.frozen { "frozen" } else { "unfrozen" }
        );
    }

    // ---- Quarantine ----

    /// Exclude a photo from automatic processing after an integrity failure
    pub async fn quarantine(&self, photo_id: PhotoId, reason: &str) -> Result<Photo, LifecycleError> {
        let committed = self
            .update_photo(photo_id, |photo, _| {
                Ok((!photo.quarantined).then(|| Photo {
                    quarantined: true,
                    ..photo.clone()
                }))
            })
            .await?;

        if committed.changed {
            tracing::error!("Photo {} quarantined: {}", photo_id, reason);
            self.audit.record(&AuditEvent::Failure {
                photo_id,
                kind: "integrity".to_string(),
                detail: reason.to_string(),
                timestamp: committed.at,
            });
        }
        Ok(committed.photo)
    }

    /// Return a quarantined photo to automatic processing
    pub async fn release_quarantine(&self, photo_id: PhotoId) -> Result<Photo, LifecycleError> {
        let committed = self
            .update_photo(photo_id, |photo, _| {
                Ok(photo.quarantined.then(|| Photo {
                    quarantined: false,
                    ..photo.clone()
                }))
            })
            .await?;

        if committed.changed {
            tracing::info!("Photo {} released from quarantine", photo_id);
        }
        Ok(committed.photo)
    }

    /// Read-modify-write a live photo, retrying on version conflicts
    ///
    /// `change` gets the current photo and the instant, and returns the new
    /// state or `None` if nothing needs to change. The version is bumped here.
    async fn update_photo<F>(&self, photo_id: PhotoId, mut change: F) -> Result<Committed, LifecycleError>
    where
        F: FnMut(&Photo, u64) -> Result<Option<Photo>, LifecycleError>,
    {
        let attempts = self.retry.conflict_attempts.max(1);

        for attempt in 1..=attempts {
            let photo = self.get_photo(photo_id)?;
            if photo.storage_tier == StorageTier::Deleted {
                return Err(LifecycleError::PhotoDeleted(photo_id));
            }

            let now = self.now();
            let Some(mut next) = change(&photo, now)? else {
                return Ok(Committed {
                    photo,
                    changed: false,
                    at: now,
                });
            };
            next.version = photo.version + 1;

            if self.write_photo(&photo, &next)? {
                return Ok(Committed {
                    photo: next,
                    changed: true,
                    at: now,
                });
            }

            tracing::warn!(
                "Version conflict on photo {} (attempt {}/{})",
                photo_id,
                attempt,
                attempts
            );
            if attempt < attempts {
                tokio::time::sleep(self.retry.conflict_backoff(attempt)).await;
            }
        }

        Err(LifecycleError::Conflict { photo_id, attempts })
    }

    /// Commit `after` over `before` and its ledger delta together
    ///
    /// Returns false if the stored version no longer matches `before`.
    fn write_photo(&self, before: &Photo, after: &Photo) -> Result<bool, LifecycleError> {
        self.ensure_owner(before.owner_id)?;

        let delta =
            after.weighted_size(&self.policy) as i64 - before.weighted_size(&self.policy) as i64;
        self.ledger.commit(before.owner_id, delta, || {
            self.store
                .compare_and_swap(after, before.version)
                .map(|outcome| outcome == CasOutcome::Applied)
                .map_err(store_error)
        })
    }

    // ---- Quota ----

    /// Seed the owner's ledger entry from the store if it has none
    fn ensure_owner(&self, owner_id: OwnerId) -> Result<QuotaSnapshot, LifecycleError> {
        self.ledger.get_or_seed(owner_id, || self.load_owner(owner_id))
    }

    fn load_owner(&self, owner_id: OwnerId) -> Result<(u64, u64), LifecycleError> {
        let limit = self
            .store
            .quota_limit(owner_id)
            .map_err(store_error)?
            .unwrap_or(self.default_quota_limit);
        Ok((limit, self.recompute_usage(owner_id)?))
    }

    fn recompute_usage(&self, owner_id: OwnerId) -> Result<u64, LifecycleError> {
        let photos = self.store.photos_for_owner(owner_id).map_err(store_error)?;
        Ok(weighted_usage(&photos, &self.policy))
    }

    /// Current quota snapshot of an owner
    pub fn quota_snapshot(&self, owner_id: OwnerId) -> Result<QuotaSnapshot, LifecycleError> {
        self.ensure_owner(owner_id)
    }

    /// Whether charging `bytes` would push the owner over its limit
    pub fn charge_would_exceed(&self, owner_id: OwnerId, bytes: u64) -> Result<bool, LifecycleError> {
        self.ensure_owner(owner_id)?;
        Ok(self.ledger.charge_would_exceed(owner_id, bytes))
    }

    /// Persist and apply a new limit for an owner (0 = unlimited)
    pub fn set_quota_limit(&self, owner_id: OwnerId, limit: u64) -> Result<QuotaSnapshot, LifecycleError> {
        self.store
            .set_quota_limit(owner_id, limit)
            .map_err(store_error)?;
        self.ensure_owner(owner_id)?;
        self.ledger.set_limit(owner_id, limit);
        tracing::info!("Quota limit of owner {} set to {} bytes", owner_id, limit);
        Ok(self.ledger.snapshot(owner_id))
    }

    /// Reseed every owner's entry from the store; returns the number of owners
    pub fn rebuild_ledger(&self) -> Result<usize, LifecycleError> {
        let owners = self.store.owners().map_err(store_error)?;
        for owner_id in &owners {
            self.ledger.reseed(*owner_id, || self.load_owner(*owner_id))?;
        }
        tracing::info!("Quota ledger rebuilt for {} owners", owners.len());
        Ok(owners.len())
    }

    /// Owners whose cached usage differs from a recomputation
    pub fn check_ledger(&self) -> Result<Vec<LedgerDrift>, LifecycleError> {
        let mut drifted = Vec::new();
        for owner_id in self.store.owners().map_err(store_error)? {
            self.ensure_owner(owner_id)?;
            let (cached, expected) = self
                .ledger
                .verify(owner_id, || self.recompute_usage(owner_id))?;
            if cached != expected {
                tracing::warn!(
                    "Ledger drift for owner {}: cached {} bytes, expected {}",
                    owner_id,
                    cached,
                    expected
                );
                drifted.push(LedgerDrift {
                    owner_id,
                    cached,
                    expected,
                });
            }
        }
        Ok(drifted)
    }

    /// Check the ledger and reseed every drifted owner; returns what was repaired
    pub fn repair_ledger(&self) -> Result<Vec<LedgerDrift>, LifecycleError> {
        let drifted = self.check_ledger()?;
        for drift in &drifted {
            self.ledger
                .reseed(drift.owner_id, || self.load_owner(drift.owner_id))?;
        }
        Ok(drifted)
    }

    // ---- Rule sets ----

    /// Validate and persist a new rule set
    pub fn create_rule_set(&self, rule_set: &RuleSet) -> Result<(), LifecycleError> {
        let _writes = self.rule_set_writes.lock().unwrap_or_else(|p| p.into_inner());

        let existing = self
            .store
            .rule_sets_for_owner(rule_set.owner_id)
            .map_err(store_error)?;
        self.gatekeeper.validate(rule_set, &existing)?;
        self.store.insert_rule_set(rule_set).map_err(store_error)?;

        tracing::info!(
            "Created rule set {} for owner {} ({} rules)",
            rule_set.id,
            rule_set.owner_id,
            rule_set.rules.len()
        );
        Ok(())
    }

    /// Validate and replace an existing rule set of the same owner
    pub fn update_rule_set(&self, rule_set: &RuleSet) -> Result<(), LifecycleError> {
        let _writes = self.rule_set_writes.lock().unwrap_or_else(|p| p.into_inner());

        let owned = self
            .store
            .get_rule_set(rule_set.id)
            .map_err(store_error)?
            .is_some_and(|current| current.owner_id == rule_set.owner_id);
        if !owned {
            return Err(LifecycleError::RuleSetNotFound(rule_set.id));
        }

        let existing = self
            .store
            .rule_sets_for_owner(rule_set.owner_id)
            .map_err(store_error)?;
        self.gatekeeper.validate(rule_set, &existing)?;
        if !self.store.update_rule_set(rule_set).map_err(store_error)? {
            return Err(LifecycleError::RuleSetNotFound(rule_set.id));
        }

        tracing::info!("Updated rule set {}", rule_set.id);
        Ok(())
    }

    /// Load a rule set
    pub fn get_rule_set(&self, rule_set_id: RuleSetId) -> Result<RuleSet, LifecycleError> {
        self.store
            .get_rule_set(rule_set_id)
            .map_err(store_error)?
            .ok_or(LifecycleError::RuleSetNotFound(rule_set_id))
    }

    /// Every rule set of an owner, as stored
    pub fn rule_sets_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RuleSet>, LifecycleError> {
        self.store.rule_sets_for_owner(owner_id).map_err(store_error)
    }

    /// Structural re-check of a stored rule set before it is evaluated
    pub fn revalidate(&self, rule_set: &RuleSet) -> Result<(), ValidationError> {
        self.gatekeeper.validate_structure(rule_set)
    }
}
