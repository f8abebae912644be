//! Tier module - storage placement stages for photos

/// Storage tier of a photo
///
/// Photos only ever move forward through the tiers:
/// - Standard: hot placement, the tier every upload starts in
/// - Cold: archival placement, cheaper and slower to read
/// - Deleted: terminal; the bytes are released and the record is a tombstone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageTier {
    /// Hot storage (new uploads)
    Standard,

    /// Archival storage
    Cold,

    /// Tombstone; excluded from all further evaluation
    Deleted,
}

impl StorageTier {
    /// Get the tier name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Standard => "standard",
            StorageTier::Cold => "cold",
            StorageTier::Deleted => "deleted",
        }
    }

    /// Parse a tier from a string (internal use)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Some(StorageTier::Standard),
            "cold" => Some(StorageTier::Cold),
            "deleted" => Some(StorageTier::Deleted),
            _ => None,
        }
    }

    /// Whether the photo's bytes still exist and count against the quota
    pub fn is_live(&self) -> bool {
        !matches!(self, StorageTier::Deleted)
    }

    /// Whether moving from `self` to `to` follows the one-way progression
    ///
    /// Standard → Cold, Standard → Deleted and Cold → Deleted are the only
    /// forward moves. Nothing leaves Deleted.
    pub fn can_advance_to(&self, to: StorageTier) -> bool {
        *self != StorageTier::Deleted && to > *self
    }
}

impl std::str::FromStr for StorageTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid storage tier: {}", s))
    }
}

impl std::fmt::Display for StorageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_progression() {
        assert!(StorageTier::Standard.can_advance_to(StorageTier::Cold));
        assert!(StorageTier::Standard.can_advance_to(StorageTier::Deleted));
        assert!(StorageTier::Cold.can_advance_to(StorageTier::Deleted));
    }

    #[test]
    fn test_no_backwards_or_terminal_moves() {
        assert!(!StorageTier::Cold.can_advance_to(StorageTier::Standard));
        assert!(!StorageTier::Cold.can_advance_to(StorageTier::Cold));
        assert!(!StorageTier::Deleted.can_advance_to(StorageTier::Standard));
        assert!(!StorageTier::Deleted.can_advance_to(StorageTier::Deleted));
    }

    #[test]
    fn test_parse() {
        assert_eq!(StorageTier::parse("COLD"), Some(StorageTier::Cold));
        assert_eq!("deleted".parse::<StorageTier>(), Ok(StorageTier::Deleted));
        assert!(StorageTier::parse("glacier").is_none());
    }
}
