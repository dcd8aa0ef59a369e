//! Schema generation fingerprinting
//!
//! Note stores changed layout with almost every OS release. The generation
//! is recovered from the column set of the sync-object table, sorted so
//! declaration order never matters, checked newest marker first:
//!
//! | Marker                          | Generation |
//! |---------------------------------|------------|
//! | note-data table has no columns  | Legacy (8) |
//! | `ZACCOUNT5: INTEGER`            | 15         |
//! | `ZLASTOPENEDDATE: TIMESTAMP`    | 14         |
//! | `ZACCOUNT4: INTEGER`            | 13         |
//! | `ZSERVERRECORDDATA: BLOB`       | 12         |
//! | table `Z_11NOTES` exists        | 11         |
//! | anything else                   | Unknown    |

use crate::database::Database;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Sync-object table holding notes, folders, accounts and attachments
pub const SYNC_OBJECT_TABLE: &str = "ZICCLOUDSYNCINGOBJECT";
/// Table holding compressed note bodies
pub const NOTE_DATA_TABLE: &str = "ZICNOTEDATA";
/// Folder join table of generation 11
pub const FOLDER_JOIN_TABLE: &str = "Z_11NOTES";

/// Unknown generation sentinel
pub const VERSION_UNKNOWN: i32 = -1;
/// Pre-sync generation with HTML bodies
pub const VERSION_LEGACY: i32 = 8;
/// First generation with compressed protobuf bodies
pub const VERSION_9: i32 = 9;
#[allow(missing_docs)]
pub const VERSION_10: i32 = 10;
#[allow(missing_docs)]
pub const VERSION_11: i32 = 11;
#[allow(missing_docs)]
pub const VERSION_12: i32 = 12;
#[allow(missing_docs)]
pub const VERSION_13: i32 = 13;
#[allow(missing_docs)]
pub const VERSION_14: i32 = 14;
#[allow(missing_docs)]
pub const VERSION_15: i32 = 15;
#[allow(missing_docs)]
pub const VERSION_16: i32 = 16;
#[allow(missing_docs)]
pub const VERSION_17: i32 = 17;
#[allow(missing_docs)]
pub const VERSION_18: i32 = 18;

/// Device family the store came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    /// Phone or tablet
    #[default]
    Mobile,
    /// Desktop container
    Desktop,
}

/// Schema generation of one note store.
///
/// Ordering and equality look at the ordinal only; the platform is carried
/// alongside for dialect decisions that differ per device family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchemaVersion {
    ordinal: i32,
    platform: Platform,
}

impl SchemaVersion {
    /// Explicit generation
    pub fn new(ordinal: i32, platform: Platform) -> Self {
        Self { ordinal, platform }
    }

    /// Unknown sentinel
    pub fn unknown() -> Self {
        Self::new(VERSION_UNKNOWN, Platform::Mobile)
    }

    /// Legacy generation
    pub fn legacy() -> Self {
        Self::new(VERSION_LEGACY, Platform::Mobile)
    }

    /// Ordinal, -1 for unknown
    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    /// Device family
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Same generation on another platform
    pub fn with_platform(self, platform: Platform) -> Self {
        Self { platform, ..self }
    }

    /// True for the unknown sentinel
    pub fn is_unknown(&self) -> bool {
        self.ordinal == VERSION_UNKNOWN
    }

    /// True for the legacy HTML-body generation
    pub fn is_legacy(&self) -> bool {
        self.ordinal == VERSION_LEGACY
    }

    /// True for generations storing compressed protobuf bodies
    pub fn is_modern(&self) -> bool {
        self.ordinal >= VERSION_9
    }

    /// True if this generation is at least `ordinal`
    pub fn at_least(&self, ordinal: i32) -> bool {
        self.ordinal >= ordinal
    }

    /// Fingerprint `db`. Never fails on an unrecognized layout; that yields
    /// [`SchemaVersion::unknown`].
    pub fn resolve(db: &Database) -> Result<Self> {
        let note_data_columns = db.table_columns(NOTE_DATA_TABLE)?;
        if note_data_columns.is_empty() {
            tracing::debug!("{} has no columns, treating store as legacy", NOTE_DATA_TABLE);
            return Ok(Self::legacy());
        }

        let columns = db.table_columns(SYNC_OBJECT_TABLE)?;
        let has = |marker: &str| columns.iter().any(|c| c == marker);

        let ordinal = if has("ZACCOUNT5: INTEGER") {
            VERSION_15
        } else if has("ZLASTOPENEDDATE: TIMESTAMP") {
            VERSION_14
        } else if has("ZACCOUNT4: INTEGER") {
            VERSION_13
        } else if has("ZSERVERRECORDDATA: BLOB") {
            VERSION_12
        } else if db.has_table(FOLDER_JOIN_TABLE)? {
            VERSION_11
        } else {
            VERSION_UNKNOWN
        };

        let version = Self::new(ordinal, Platform::Mobile);
        if version.is_unknown() {
            tracing::warn!("Note store layout matches no known generation");
        } else {
            tracing::debug!("Resolved note store generation {}", version);
        }
        Ok(version)
    }

    /// Like [`resolve`](Self::resolve), but an unrecognized layout is an error.
    pub fn resolve_strict(db: &Database) -> Result<Self> {
        let version = Self::resolve(db)?;
        if version.is_unknown() {
            let columns = db.table_columns(SYNC_OBJECT_TABLE)?;
            return Err(Error::SchemaUnrecognized(format!(
                "{} has {} columns and no generation marker",
                SYNC_OBJECT_TABLE,
                columns.len()
            )));
        }
        Ok(version)
    }

    /// True if the tables this generation reads from exist in `db`.
    pub fn is_usable(&self, db: &Database) -> Result<bool> {
        if self.is_legacy() {
            return Ok(db.has_table("ZNOTE")? && db.has_table("ZNOTEBODY")?);
        }
        Ok(db.has_table(SYNC_OBJECT_TABLE)? && db.has_table(NOTE_DATA_TABLE)?)
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal.cmp(&other.ordinal)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.platform {
            Platform::Mobile => "iOS",
            Platform::Desktop => "macOS",
        };
        match self.ordinal {
            VERSION_UNKNOWN => write!(f, "Unknown"),
            VERSION_LEGACY => write!(f, "Legacy"),
            n => write!(f, "{} {}", family, n),
        }
    }
}
