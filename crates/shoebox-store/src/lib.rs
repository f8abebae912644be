//! Shoebox Storage Layer
//!
//! Implements [`LifecycleStore`] and [`AuditSink`] on top of SQLite.
//!
//! # Architecture
//!
//! - One SQLite connection behind a mutex; every method is a short, complete
//!   statement or transaction, so the lock is never held across an await
//! - Photo writes are version-guarded (`UPDATE ... WHERE version = ?`)
//! - Album membership and rule lists are child tables rewritten inside the
//!   same transaction as their parent row
//!
//! # Examples
//!
//! ```no_run
//! use shoebox_store::SqliteStore;
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! // Store is now ready for lifecycle operations
//! ```

#![warn(missing_docs)]

use rusqlite::{params, Connection, OptionalExtension, Row};
use shoebox_domain::{
    Action, AlbumId, AuditEvent, AuditSink, CasOutcome, LifecycleStore, OwnerId, Photo, PhotoId,
    Rule, RuleId, RuleScope, RuleSet, RuleSetId, StorageTier, TransitionRecord,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A photo or rule set with this id already exists
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A previous holder of the connection panicked
    #[error("Store connection lock poisoned")]
    Poisoned,
}

const PHOTO_COLUMNS: &str = "id, owner_id, original_size, thumbnail_size, uploaded_at, storage_tier, \
     frozen, unfrozen_at, version, pending_retry, quarantined";

/// SQLite-based implementation of [`LifecycleStore`]
///
/// # Thread Safety
///
/// The connection is guarded by a mutex, so one store can be shared (behind an
/// `Arc`) by the scheduler's workers and the HTTP handlers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given database path
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Audit events recorded for a photo, oldest first
    pub fn audit_trail(&self, photo_id: PhotoId) -> Result<Vec<AuditEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT photo_id, kind, from_tier, to_tier, rule_id, frozen, detail, recorded_at
             FROM audit_log WHERE photo_id = ?1 ORDER BY seq",
        )?;

        let events = stmt
            .query_map(params![id_to_bytes(photo_id.value())], row_to_audit_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let photo_id = id_to_bytes(event.photo_id().value());

        match event {
            AuditEvent::Transition(record) => conn.execute(
                "INSERT INTO audit_log (photo_id, kind, from_tier, to_tier, rule_id, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    photo_id,
                    event.kind(),
                    record.from_tier.as_str(),
                    record.to_tier.as_str(),
                    record.rule_id.map(|id| id_to_bytes(id.value())),
                    record.timestamp as i64,
                ],
            )?,
            AuditEvent::FreezeChanged { frozen, timestamp, .. } => conn.execute(
                "INSERT INTO audit_log (photo_id, kind, frozen, recorded_at) VALUES (?1, ?2, ?3, ?4)",
                params![photo_id, event.kind(), *frozen, *timestamp as i64],
            )?,
            AuditEvent::Failure { detail, timestamp, .. } => conn.execute(
                "INSERT INTO audit_log (photo_id, kind, detail, recorded_at) VALUES (?1, ?2, ?3, ?4)",
                params![photo_id, event.kind(), detail, *timestamp as i64],
            )?,
        };
        Ok(())
    }

    fn load_albums(conn: &Connection, photo_id: &[u8]) -> Result<BTreeSet<AlbumId>, StoreError> {
        let mut stmt = conn.prepare("SELECT album_id FROM photo_albums WHERE photo_id = ?1")?;
        let albums = stmt
            .query_map(params![photo_id], |row| {
                let bytes: Vec<u8> = row.get(0)?;
                blob_to_id(&bytes, 0).map(AlbumId::from_value)
            })?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(albums)
    }

    fn write_albums(conn: &Connection, photo: &Photo) -> Result<(), StoreError> {
        let photo_id = id_to_bytes(photo.id.value());
        conn.execute("DELETE FROM photo_albums WHERE photo_id = ?1", params![photo_id])?;
        for album_id in &photo.album_ids {
            conn.execute(
                "INSERT INTO photo_albums (photo_id, album_id) VALUES (?1, ?2)",
                params![photo_id, id_to_bytes(album_id.value())],
            )?;
        }
        Ok(())
    }

    fn write_rules(conn: &Connection, rule_set: &RuleSet) -> Result<(), StoreError> {
        let set_id = id_to_bytes(rule_set.id.value());
        conn.execute("DELETE FROM rules WHERE rule_set_id = ?1", params![set_id])?;
        for (position, rule) in rule_set.rules.iter().enumerate() {
            conn.execute(
                "INSERT INTO rules (rule_set_id, position, id, age_threshold_days, action)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    set_id,
                    position as i64,
                    id_to_bytes(rule.id.value()),
                    rule.age_threshold_days,
                    rule.action.as_str(),
                ],
            )?;
        }
        Ok(())
    }

    fn load_rule_set(conn: &Connection, row: RuleSetRow) -> Result<RuleSet, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, age_threshold_days, action FROM rules
             WHERE rule_set_id = ?1 ORDER BY position",
        )?;
        let rules = stmt
            .query_map(params![id_to_bytes(row.id.value())], |r| {
                let id_bytes: Vec<u8> = r.get(0)?;
                let action: String = r.get(2)?;
                Ok(Rule {
                    id: RuleId::from_value(blob_to_id(&id_bytes, 0)?),
                    age_threshold_days: r.get(1)?,
                    action: Action::parse(&action).ok_or_else(|| {
                        conversion_error(2, format!("Unknown action: {}", action))
                    })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RuleSet {
            id: row.id,
            owner_id: row.owner_id,
            scope: row.scope,
            rules,
        })
    }
}

struct RuleSetRow {
    id: RuleSetId,
    owner_id: OwnerId,
    scope: RuleScope,
}

impl LifecycleStore for SqliteStore {
    type Error = StoreError;

    fn insert_photo(&self, photo: &Photo) -> Result<(), Self::Error> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id_bytes = id_to_bytes(photo.id.value());

        let exists = tx
            .query_row("SELECT 1 FROM photos WHERE id = ?1", params![id_bytes], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if exists {
            return Err(StoreError::Duplicate(format!("photo {}", photo.id)));
        }

        tx.execute(
            &format!("INSERT INTO photos ({PHOTO_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                id_bytes,
                id_to_bytes(photo.owner_id.value()),
                photo.original_size as i64,
                photo.thumbnail_size as i64,
                photo.uploaded_at as i64,
                photo.storage_tier.as_str(),
                photo.frozen,
                photo.unfrozen_at.map(|t| t as i64),
                photo.version as i64,
                photo.pending_retry,
                photo.quarantined,
            ],
        )?;
        Self::write_albums(&tx, photo)?;
        tx.commit()?;
        Ok(())
    }

    fn get_photo(&self, id: PhotoId) -> Result<Option<Photo>, Self::Error> {
        let conn = self.conn()?;
        let id_bytes = id_to_bytes(id.value());

        let photo = conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1"),
                params![id_bytes],
                row_to_photo,
            )
            .optional()?;

        match photo {
            Some(mut photo) => {
                photo.album_ids = Self::load_albums(&conn, &id_bytes)?;
                Ok(Some(photo))
            }
            None => Ok(None),
        }
    }

    fn photos_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Photo>, Self::Error> {
        let conn = self.conn()?;
        let owner_bytes = id_to_bytes(owner_id.value());

        let mut stmt = conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE owner_id = ?1 ORDER BY id"
        ))?;
        let mut photos = stmt
            .query_map(params![owner_bytes], row_to_photo)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT pa.photo_id, pa.album_id FROM photo_albums pa
             JOIN photos p ON p.id = pa.photo_id WHERE p.owner_id = ?1",
        )?;
        let mut memberships: HashMap<u128, BTreeSet<AlbumId>> = HashMap::new();
        let rows = stmt.query_map(params![owner_bytes], |row| {
            let photo: Vec<u8> = row.get(0)?;
            let album: Vec<u8> = row.get(1)?;
            Ok((blob_to_id(&photo, 0)?, blob_to_id(&album, 1)?))
        })?;
        for row in rows {
            let (photo, album) = row?;
            memberships
                .entry(photo)
                .or_default()
                .insert(AlbumId::from_value(album));
        }

        for photo in &mut photos {
            if let Some(albums) = memberships.remove(&photo.id.value()) {
                photo.album_ids = albums;
            }
        }
        Ok(photos)
    }

    fn owners(&self) -> Result<Vec<OwnerId>, Self::Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT owner_id FROM photos ORDER BY owner_id")?;
        let owners = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(0)?;
                blob_to_id(&bytes, 0).map(OwnerId::from_value)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(owners)
    }

    fn compare_and_swap(&self, photo: &Photo, expected_version: u64) -> Result<CasOutcome, Self::Error> {
        if photo.version <= expected_version {
            return Err(StoreError::InvalidData(format!(
                "photo {} written with version {} not above expected {}",
                photo.id, photo.version, expected_version
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE photos SET storage_tier = ?1, frozen = ?2, unfrozen_at = ?3, version = ?4,
                 pending_retry = ?5, quarantined = ?6, original_size = ?7, thumbnail_size = ?8
             WHERE id = ?9 AND version = ?10",
            params![
                photo.storage_tier.as_str(),
                photo.frozen,
                photo.unfrozen_at.map(|t| t as i64),
                photo.version as i64,
                photo.pending_retry,
                photo.quarantined,
                photo.original_size as i64,
                photo.thumbnail_size as i64,
                id_to_bytes(photo.id.value()),
                expected_version as i64,
            ],
        )?;

        if changed == 0 {
            return Ok(CasOutcome::VersionMismatch);
        }

        Self::write_albums(&tx, photo)?;
        tx.commit()?;
        Ok(CasOutcome::Applied)
    }

    fn insert_rule_set(&self, rule_set: &RuleSet) -> Result<(), Self::Error> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let (scope_kind, album_id) = scope_to_columns(rule_set.scope);

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO rule_sets (id, owner_id, scope_kind, album_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                id_to_bytes(rule_set.id.value()),
                id_to_bytes(rule_set.owner_id.value()),
                scope_kind,
                album_id,
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(format!("rule set {}", rule_set.id)));
        }

        Self::write_rules(&tx, rule_set)?;
        tx.commit()?;
        Ok(())
    }

    fn update_rule_set(&self, rule_set: &RuleSet) -> Result<bool, Self::Error> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let (scope_kind, album_id) = scope_to_columns(rule_set.scope);

        let changed = tx.execute(
            "UPDATE rule_sets SET owner_id = ?1, scope_kind = ?2, album_id = ?3 WHERE id = ?4",
            params![
                id_to_bytes(rule_set.owner_id.value()),
                scope_kind,
                album_id,
                id_to_bytes(rule_set.id.value()),
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        Self::write_rules(&tx, rule_set)?;
        tx.commit()?;
        Ok(true)
    }

    fn get_rule_set(&self, id: RuleSetId) -> Result<Option<RuleSet>, Self::Error> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, owner_id, scope_kind, album_id FROM rule_sets WHERE id = ?1",
                params![id_to_bytes(id.value())],
                row_to_rule_set_row,
            )
            .optional()?;

        row.map(|row| Self::load_rule_set(&conn, row)).transpose()
    }

    fn rule_sets_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RuleSet>, Self::Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, scope_kind, album_id FROM rule_sets WHERE owner_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![id_to_bytes(owner_id.value())], row_to_rule_set_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| Self::load_rule_set(&conn, row))
            .collect()
    }

    fn quota_limit(&self, owner_id: OwnerId) -> Result<Option<u64>, Self::Error> {
        let conn = self.conn()?;
        let limit = conn
            .query_row(
                "SELECT quota_limit FROM quotas WHERE owner_id = ?1",
                params![id_to_bytes(owner_id.value())],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(limit.map(|l| l as u64))
    }

    fn set_quota_limit(&self, owner_id: OwnerId, limit: u64) -> Result<(), Self::Error> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO quotas (owner_id, quota_limit) VALUES (?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET quota_limit = excluded.quota_limit",
            params![id_to_bytes(owner_id.value()), limit as i64],
        )?;
        Ok(())
    }

    fn last_run_at(&self, owner_id: OwnerId) -> Result<Option<u64>, Self::Error> {
        let conn = self.conn()?;
        let at = conn
            .query_row(
                "SELECT last_run_at FROM sweep_watermarks WHERE owner_id = ?1",
                params![id_to_bytes(owner_id.value())],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(at.map(|t| t as u64))
    }

    fn record_run(&self, owner_id: OwnerId, at: u64) -> Result<(), Self::Error> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sweep_watermarks (owner_id, last_run_at) VALUES (?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET last_run_at = excluded.last_run_at",
            params![id_to_bytes(owner_id.value()), at as i64],
        )?;
        Ok(())
    }
}

impl AuditSink for SqliteStore {
    fn record(&self, event: &AuditEvent) {
        if let Err(e) = self.insert_audit_event(event) {
            tracing::warn!(photo_id = %event.photo_id(), kind = event.kind(), "Failed to persist audit event: {}", e);
        }
    }
}

/// Convert an id to bytes for storage
fn id_to_bytes(value: u128) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(StoreError::InvalidData(message)),
    )
}

/// Convert a 16-byte blob back to an id value
fn blob_to_id(bytes: &[u8], column: usize) -> rusqlite::Result<u128> {
    let arr: [u8; 16] = bytes.try_into().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Blob,
            Box::new(StoreError::InvalidData(format!(
                "Expected 16 bytes for id, got {}",
                bytes.len()
            ))),
        )
    })?;
    Ok(u128::from_be_bytes(arr))
}

fn scope_to_columns(scope: RuleScope) -> (&'static str, Option<Vec<u8>>) {
    match scope {
        RuleScope::Global => ("global", None),
        RuleScope::Album(album_id) => ("album", Some(id_to_bytes(album_id.value()))),
    }
}

fn row_to_photo(row: &Row<'_>) -> rusqlite::Result<Photo> {
    let id: Vec<u8> = row.get(0)?;
    let owner: Vec<u8> = row.get(1)?;
    let tier: String = row.get(5)?;
    let unfrozen_at: Option<i64> = row.get(7)?;

    Ok(Photo {
        id: PhotoId::from_value(blob_to_id(&id, 0)?),
        owner_id: OwnerId::from_value(blob_to_id(&owner, 1)?),
        original_size: row.get::<_, i64>(2)? as u64,
        thumbnail_size: row.get::<_, i64>(3)? as u64,
        uploaded_at: row.get::<_, i64>(4)? as u64,
        storage_tier: StorageTier::parse(&tier)
            .ok_or_else(|| conversion_error(5, format!("Unknown storage tier: {}", tier)))?,
        frozen: row.get(6)?,
        unfrozen_at: unfrozen_at.map(|t| t as u64),
        album_ids: BTreeSet::new(),
        version: row.get::<_, i64>(8)? as u64,
        pending_retry: row.get(9)?,
        quarantined: row.get(10)?,
    })
}

fn row_to_rule_set_row(row: &Row<'_>) -> rusqlite::Result<RuleSetRow> {
    let id: Vec<u8> = row.get(0)?;
    let owner: Vec<u8> = row.get(1)?;
    let scope_kind: String = row.get(2)?;
    let album: Option<Vec<u8>> = row.get(3)?;

    let scope = match (scope_kind.as_str(), album) {
        ("global", _) => RuleScope::Global,
        ("album", Some(bytes)) => RuleScope::Album(AlbumId::from_value(blob_to_id(&bytes, 3)?)),
        (other, _) => return Err(conversion_error(2, format!("Invalid rule set scope: {}", other))),
    };

    Ok(RuleSetRow {
        id: RuleSetId::from_value(blob_to_id(&id, 0)?),
        owner_id: OwnerId::from_value(blob_to_id(&owner, 1)?),
        scope,
    })
}

fn row_to_audit_event(row: &Row<'_>) -> rusqlite::Result<AuditEvent> {
    let photo: Vec<u8> = row.get(0)?;
    let photo_id = PhotoId::from_value(blob_to_id(&photo, 0)?);
    let kind: String = row.get(1)?;
    let timestamp = row.get::<_, i64>(7)? as u64;

    let parse_tier = |column: usize| -> rusqlite::Result<StorageTier> {
        let value: Option<String> = row.get(column)?;
        value
            .as_deref()
            .and_then(StorageTier::parse)
            .ok_or_else(|| conversion_error(column, format!("Missing tier in {} event", kind)))
    };

    match kind.as_str() {
        "transition" => {
            let rule: Option<Vec<u8>> = row.get(4)?;
            Ok(AuditEvent::Transition(TransitionRecord {
                photo_id,
                from_tier: parse_tier(2)?,
                to_tier: parse_tier(3)?,
                timestamp,
                rule_id: rule
                    .map(|bytes| blob_to_id(&bytes, 4).map(RuleId::from_value))
                    .transpose()?,
            }))
        }
        "freeze" | "unfreeze" => Ok(AuditEvent::FreezeChanged {
            photo_id,
            frozen: kind == "freeze",
            timestamp,
        }),
        _ => Ok(AuditEvent::Failure {
            photo_id,
            kind: kind.clone(),
            detail: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            timestamp,
        }),
    }
}
