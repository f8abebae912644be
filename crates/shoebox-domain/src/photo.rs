//! Photo module - the unit the lifecycle engine ages, tiers and charges

use crate::{
    AlbumId, LifecyclePolicy, OwnerId, PhotoId, StorageTier, MAX_PHOTO_BYTES, SECONDS_PER_DAY,
};
use std::collections::BTreeSet;

/// A stored photo and its lifecycle state
///
/// `frozen` is orthogonal to `storage_tier`: a frozen photo keeps aging and
/// can still be moved to Cold or deleted by a rule. `version` is bumped by
/// every committed write and guards all mutations (optimistic concurrency).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    /// Unique identifier
    pub id: PhotoId,

    /// Owner whose quota this photo is charged to
    pub owner_id: OwnerId,

    /// Size of the original in bytes
    pub original_size: u64,

    /// Size of the thumbnail in bytes
    pub thumbnail_size: u64,

    /// Upload instant (seconds since Unix epoch)
    pub uploaded_at: u64,

    /// Current storage tier
    pub storage_tier: StorageTier,

    /// Manual freeze flag
    pub frozen: bool,

    /// Instant of the last unfreeze, if any
    pub unfrozen_at: Option<u64>,

    /// Albums containing this photo
    pub album_ids: BTreeSet<AlbumId>,

    /// Monotonic write counter
    pub version: u64,

    /// The storage backend was unreachable on the last attempted transition
    pub pending_retry: bool,

    /// Automatic processing is suspended after an integrity failure
    pub quarantined: bool,
}

impl Photo {
    /// Create a freshly uploaded photo: Standard tier, not frozen, version 0
    pub fn uploaded(
        owner_id: OwnerId,
        original_size: u64,
        thumbnail_size: u64,
        uploaded_at: u64,
    ) -> Self {
        Self {
            id: PhotoId::new(),
            owner_id,
            original_size,
            thumbnail_size,
            uploaded_at,
            storage_tier: StorageTier::Standard,
            frozen: false,
            unfrozen_at: None,
            album_ids: BTreeSet::new(),
            version: 0,
            pending_retry: false,
            quarantined: false,
        }
    }

    /// Builder-style helper to place the photo in albums
    pub fn in_albums(mut self, albums: impl IntoIterator<Item = AlbumId>) -> Self {
        self.album_ids.extend(albums);
        self
    }

    /// Original plus thumbnail, in bytes (saturating)
    pub fn total_size(&self) -> u64 {
        self.original_size.saturating_add(self.thumbnail_size)
    }

    /// Whether the sizes fit the range the store and ledger can represent
    pub fn size_in_range(original_size: u64, thumbnail_size: u64) -> bool {
        original_size
            .checked_add(thumbnail_size)
            .is_some_and(|total| total <= MAX_PHOTO_BYTES)
    }

    /// Bytes this photo contributes to its owner's `used_space`
    ///
    /// Deleted photos contribute nothing. Otherwise the full size is scaled by
    /// the tier weight and, when frozen, by the freeze weight. Integer math
    /// (floor) keeps the ledger and a recomputation bit-for-bit identical.
    pub fn weighted_size(&self, policy: &LifecyclePolicy) -> u64 {
        let tier_percent = match self.storage_tier {
            StorageTier::Standard => 100,
            StorageTier::Cold => policy.cold_cost_percent,
            StorageTier::Deleted => return 0,
        };
        let frozen_percent = if self.frozen {
            policy.frozen_cost_percent
        } else {
            100
        };

        let weighted =
            self.total_size() as u128 * tier_percent as u128 * frozen_percent as u128 / 10_000;
        weighted as u64
    }

    /// Whole days elapsed since upload at `now` (floor, never negative)
    pub fn age_days(&self, now: u64) -> i64 {
        (now.saturating_sub(self.uploaded_at) / SECONDS_PER_DAY) as i64
    }

    /// Seconds left before this photo may be frozen again, or `None` if allowed
    pub fn cooldown_remaining(&self, now: u64, policy: &LifecyclePolicy) -> Option<u64> {
        let unfrozen_at = self.unfrozen_at?;
        let elapsed = now.saturating_sub(unfrozen_at);
        let cooldown = policy.refreeze_cooldown_secs();
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Whether the automatic scheduler should look at this photo at all
    pub fn is_schedulable(&self) -> bool {
        self.storage_tier.is_live() && !self.quarantined
    }
}
