//! Assembled note types

use crate::embedded::EmbeddedObject;
use chrono::{DateTime, TimeZone, Utc};
use notes_content::{Table, TableCell, TableDirection};
use serde::Serialize;

/// Seconds between the Unix epoch and the Core Data reference date
/// (2001-01-01T00:00:00Z)
pub const CORE_TIME_OFFSET: i64 = 978_307_200;

/// Convert a Core Data timestamp (seconds since 2001) into UTC.
pub fn core_time_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    Utc.timestamp_opt(whole as i64 + CORE_TIME_OFFSET, nanos.min(999_999_999))
        .single()
}

/// How far reconstruction got for one note
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NoteStatus {
    /// Content reconstructed
    Parsed,
    /// Protected and no candidate password opened it
    Locked,
    /// Payload was corrupt or of an unexpected shape
    Unparseable(String),
}

/// Grid of one table object inside a note
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteTable {
    /// `ZIDENTIFIER` of the table object
    pub identifier: String,
    /// Row-major cells in display order
    pub rows: Vec<Vec<TableCell>>,
    /// Column direction
    pub direction: TableDirection,
}

impl NoteTable {
    /// Keep the grid of a reconstructed table
    pub fn from_table<O>(identifier: &str, table: &Table<O>) -> Self {
        Self {
            identifier: identifier.to_string(),
            rows: table.rows.clone(),
            direction: table.direction,
        }
    }

    fn grid(&self) -> Table<()> {
        Table {
            rows: self.rows.clone(),
            direction: self.direction,
            secondary_objects: Vec::new(),
        }
    }

    /// HTML table
    pub fn to_html(&self) -> String {
        self.grid().to_html()
    }

    /// Plaintext rows
    pub fn to_plaintext(&self) -> String {
        self.grid().to_plaintext()
    }
}

/// A fully reconstructed note
#[derive(Debug, Clone, Serialize)]
pub struct AssembledNote {
    /// `ZICCLOUDSYNCINGOBJECT.Z_PK` of the note (legacy: `ZNOTE.Z_PK`)
    pub note_id: i64,
    /// `ZICNOTEDATA.Z_PK` (legacy: same as `note_id`)
    pub primary_key: i64,
    /// Title
    pub title: Option<String>,
    /// Folder primary key
    pub folder_id: Option<i64>,
    /// Account primary key
    pub account_id: Option<i64>,
    /// Creation time
    pub created: Option<DateTime<Utc>>,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
    /// Whether the note is password protected
    pub is_password_protected: bool,
    /// Password that opened it, kept out of serialized output
    #[serde(skip)]
    pub password_used: Option<zeroize::Zeroizing<String>>,
    /// Whether a cloud server record is attached
    pub cloud_synced: bool,
    /// Reconstruction outcome
    pub status: NoteStatus,
    /// Plaintext with objects as `{description}`
    pub plaintext: String,
    /// HTML fragment, empty when HTML rendering is disabled
    pub html: String,
    /// Embedded objects in document order
    pub objects: Vec<EmbeddedObject>,
    /// Objects found inside table cells
    pub secondary_objects: Vec<EmbeddedObject>,
    /// Tables found in the note
    pub tables: Vec<NoteTable>,
    /// Inflated document protobuf, kept for plaintext write-back
    #[serde(skip)]
    pub decompressed: Option<Vec<u8>>,
}

impl AssembledNote {
    /// Empty note with identity fields only
    pub fn new(note_id: i64, primary_key: i64) -> Self {
        Self {
            note_id,
            primary_key,
            title: None,
            folder_id: None,
            account_id: None,
            created: None,
            modified: None,
            is_password_protected: false,
            password_used: None,
            cloud_synced: false,
            status: NoteStatus::Parsed,
            plaintext: String::new(),
            html: String::new(),
            objects: Vec::new(),
            secondary_objects: Vec::new(),
            tables: Vec::new(),
            decompressed: None,
        }
    }

    /// True when content was reconstructed
    pub fn is_parsed(&self) -> bool {
        self.status == NoteStatus::Parsed
    }
}
