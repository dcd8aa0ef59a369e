//! Note assembly
//!
//! Ties the pieces together per note: query the generation-specific row,
//! open protected payloads with the session's passwords, then inflate,
//! parse and render with embedded objects resolved from the same store.
//!
//! Only database failures surface as errors. A note that is locked or
//! corrupt comes back with a [`NoteStatus`] saying so, and its siblings are
//! unaffected.

use crate::backup::{BackupLocator, NullLocator};
use crate::config::AssemblerConfig;
use crate::database::Database;
use crate::dialect::Dialect;
use crate::embedded::{envelope_from_columns, NoteContext, StoreResolver};
use crate::keyed_archive::RecordValues;
use crate::models::{core_time_to_utc, AssembledNote, NoteStatus};
use crate::schema_version::{SchemaVersion, NOTE_DATA_TABLE};
use crate::{Error, Result};
use notes_content::{gunzip, render_document, Document};
use notes_crypto::DecryptionSession;
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Assembly counters
#[derive(Debug, Default)]
pub struct AssemblerCounters {
    /// Notes attempted
    pub notes_seen: AtomicU64,
    /// Notes fully reconstructed
    pub notes_parsed: AtomicU64,
    /// Protected notes no password opened
    pub notes_locked: AtomicU64,
    /// Notes with corrupt payloads
    pub notes_unparseable: AtomicU64,
    /// Placeholders that resolved to an object
    pub objects_resolved: AtomicU64,
    /// Placeholders rendered as the missing marker
    pub objects_missing: AtomicU64,
}

impl AssemblerCounters {
    fn record(&self, note: &AssembledNote, missing: usize) {
        self.notes_seen.fetch_add(1, Ordering::Relaxed);
        let counter = match note.status {
            NoteStatus::Parsed => &self.notes_parsed,
            NoteStatus::Locked => &self.notes_locked,
            NoteStatus::Unparseable(_) => &self.notes_unparseable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.objects_resolved
            .fetch_add(note.objects.len() as u64, Ordering::Relaxed);
        self.objects_missing.fetch_add(missing as u64, Ordering::Relaxed);
    }

    /// Get snapshot of counters
    pub fn snapshot(&self) -> AssemblerSnapshot {
        AssemblerSnapshot {
            notes_seen: self.notes_seen.load(Ordering::Relaxed),
            notes_parsed: self.notes_parsed.load(Ordering::Relaxed),
            notes_locked: self.notes_locked.load(Ordering::Relaxed),
            notes_unparseable: self.notes_unparseable.load(Ordering::Relaxed),
            objects_resolved: self.objects_resolved.load(Ordering::Relaxed),
            objects_missing: self.objects_missing.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of assembly counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct AssemblerSnapshot {
    /// Notes attempted
    pub notes_seen: u64,
    /// Notes fully reconstructed
    pub notes_parsed: u64,
    /// Locked notes
    pub notes_locked: u64,
    /// Corrupt notes
    pub notes_unparseable: u64,
    /// Resolved objects
    pub objects_resolved: u64,
    /// Missing objects
    pub objects_missing: u64,
}

/// Columns of [`Dialect::note_query`], in order
struct NoteRow {
    primary_key: i64,
    note_id: i64,
    data: Option<Vec<u8>>,
    iv: Option<Vec<u8>>,
    tag: Option<Vec<u8>>,
    salt: Option<Vec<u8>>,
    iterations: Option<i64>,
    wrapped_key: Option<Vec<u8>>,
    is_password_protected: bool,
    title: Option<String>,
    created: Option<f64>,
    modified: Option<f64>,
    account_id: Option<i64>,
    folder_id: Option<i64>,
    unapplied_record: Option<Vec<u8>>,
    server_record: Option<Vec<u8>>,
}

/// Reconstructs notes from one store
pub struct NoteAssembler {
    db: Database,
    version: SchemaVersion,
    dialect: Dialect,
    config: AssemblerConfig,
    session: Arc<DecryptionSession>,
    locator: Box<dyn BackupLocator + Send + Sync>,
    account_folders: Mutex<HashMap<i64, String>>,
    counters: AssemblerCounters,
}

impl NoteAssembler {
    /// Fingerprint `db` and prepare its dialect.
    ///
    /// An unrecognized layout is rejected unless
    /// [`AssemblerConfig::allow_unknown_schema`] is set.
    pub fn new(db: Database, session: Arc<DecryptionSession>, config: AssemblerConfig) -> Result<Self> {
        let version = SchemaVersion::resolve(&db)?;
        Self::with_version(db, version, session, config)
    }

    /// Use an already known generation
    pub fn with_version(
        db: Database,
        version: SchemaVersion,
        session: Arc<DecryptionSession>,
        config: AssemblerConfig,
    ) -> Result<Self> {
        if version.is_unknown() && !config.allow_unknown_schema {
            return Err(Error::SchemaUnrecognized(
                "Store layout matches no known generation and best-effort parsing is disabled".to_string(),
            ));
        }
        if !version.is_usable(&db)? {
            return Err(Error::SchemaUnrecognized(format!(
                "Store lacks the tables generation {} reads from",
                version
            )));
        }

        let dialect = if version.is_unknown() {
            Dialect::probe(&db, version)?
        } else {
            Dialect::new(version)
        };

        tracing::info!("Assembling notes from {} store", version);
        Ok(Self {
            db,
            version,
            dialect,
            config,
            session,
            locator: Box::new(NullLocator),
            account_folders: Mutex::new(HashMap::new()),
            counters: AssemblerCounters::default(),
        })
    }

    /// Look up backing files through `locator`
    pub fn with_locator(mut self, locator: Box<dyn BackupLocator + Send + Sync>) -> Self {
        self.locator = locator;
        self
    }

    /// Store generation
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Column dialect in use
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Configuration
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Counter snapshot
    pub fn stats(&self) -> AssemblerSnapshot {
        self.counters.snapshot()
    }

    /// Ids of every note in the store
    pub fn note_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.db.conn().prepare(self.dialect.note_ids_query())?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Reconstruct one note.
    pub fn assemble(&self, note_id: i64) -> Result<AssembledNote> {
        if self.version.is_legacy() {
            return self.assemble_legacy(note_id);
        }

        let row = self
            .db
            .conn()
            .query_row(&self.dialect.note_query(), [note_id], |row| {
                Ok(NoteRow {
                    primary_key: row.get(0)?,
                    note_id: row.get(1)?,
                    data: row.get(2)?,
                    iv: row.get(3)?,
                    tag: row.get(4)?,
                    salt: row.get(5)?,
                    iterations: row.get(6)?,
                    wrapped_key: row.get(7)?,
                    is_password_protected: row.get::<_, Option<i64>>(8)?.unwrap_or(0) == 1,
                    title: row.get(9)?,
                    created: row.get(10)?,
                    modified: row.get(11)?,
                    account_id: row.get(12)?,
                    folder_id: row.get(13)?,
                    unapplied_record: row.get(14)?,
                    server_record: row.get(15)?,
                })
            })
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Note {}", note_id)))?;

        let mut note = AssembledNote::new(row.note_id, row.primary_key);
        note.title = row.title.clone();
        note.folder_id = row.folder_id;
        note.account_id = row.account_id;
        note.created = row.created.and_then(core_time_to_utc);
        note.modified = row.modified.and_then(core_time_to_utc);
        note.is_password_protected = row.is_password_protected;
        note.cloud_synced = row.server_record.is_some();

        let Some(data) = row.data.clone() else {
            tracing::warn!("Note {} has no data", note_id);
            note.status = NoteStatus::Unparseable("Note has no data".to_string());
            self.counters.record(&note, 0);
            return Ok(note);
        };

        let compressed = if row.is_password_protected {
            match self.open_protected(&row, &data, &mut note) {
                Some(plaintext) => plaintext,
                None => {
                    tracing::debug!("Note {} stays locked", note_id);
                    note.status = NoteStatus::Locked;
                    self.counters.record(&note, 0);
                    return Ok(note);
                }
            }
        } else {
            data
        };

        let missing = self.render(&compressed, &mut note)?;
        self.counters.record(&note, missing);
        Ok(note)
    }

    /// Reconstruct every note. Notes that fail on database errors are
    /// logged and skipped.
    pub fn assemble_all(&mut self) -> Result<Vec<AssembledNote>> {
        let ids = self.note_ids()?;
        let mut notes = Vec::with_capacity(ids.len());
        for id in ids {
            match self.assemble(id) {
                Ok(note) => notes.push(note),
                Err(e) => tracing::error!("Skipping note {}: {}", id, e),
            }
        }

        if self.config.cache_plaintext && !self.version.is_legacy() {
            if let Err(e) = self.cache_plaintext(&notes) {
                tracing::warn!("Plaintext write-back failed: {}", e);
            }
        }

        let stats = self.stats();
        tracing::info!(
            "Assembled {} notes: {} parsed, {} locked, {} unparseable",
            stats.notes_seen,
            stats.notes_parsed,
            stats.notes_locked,
            stats.notes_unparseable
        );
        Ok(notes)
    }

    /// Write plaintext and inflated protobufs back into `ZICNOTEDATA`,
    /// adding the columns if needed. Needs a read-write connection.
    pub fn cache_plaintext(&mut self, notes: &[AssembledNote]) -> Result<usize> {
        for column in ["ZPLAINTEXT", "ZDECOMPRESSEDDATA"] {
            if !self.db.has_column(NOTE_DATA_TABLE, column)? {
                let kind = if column == "ZPLAINTEXT" { "TEXT" } else { "BLOB" };
                self.db
                    .conn()
                    .execute(&format!("ALTER TABLE {} ADD COLUMN {} {}", NOTE_DATA_TABLE, column, kind), [])?;
            }
        }

        let tx = self.db.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare("UPDATE ZICNOTEDATA SET ZPLAINTEXT=?1, ZDECOMPRESSEDDATA=?2 WHERE Z_PK=?3")?;
            for note in notes.iter().filter(|n| n.is_parsed()) {
                written += stmt.execute(params![note.plaintext, note.decompressed, note.primary_key])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Cached plaintext of {} notes", written);
        Ok(written)
    }

    /// Decrypt a protected payload; `None` leaves the note locked.
    fn open_protected(&self, row: &NoteRow, data: &[u8], note: &mut AssembledNote) -> Option<Vec<u8>> {
        let record = row.unapplied_record.as_deref().and_then(|blob| match RecordValues::parse(blob) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Unreadable unapplied record on note {}: {}", row.note_id, e);
                None
            }
        });

        let envelope = record.as_ref().and_then(RecordValues::envelope).or_else(|| {
            envelope_from_columns(
                row.iv.clone(),
                row.tag.clone(),
                row.salt.clone(),
                row.iterations,
                row.wrapped_key.clone(),
            )
        });
        let Some(envelope) = envelope else {
            tracing::warn!("Protected note {} lacks crypto parameters", row.note_id);
            return None;
        };

        let outcome = self.session.decrypt(&envelope, data)?;

        // Unapplied records carry the title encrypted alongside
        if note.title.is_none() {
            if let Some(values) = record.as_ref().and_then(RecordValues::encrypted_values) {
                note.title = self
                    .session
                    .decrypt_with_password(&outcome.password, &envelope, values)
                    .and_then(|plain| plist::Value::from_reader(Cursor::new(plain)).ok())
                    .and_then(|v| v.as_dictionary()?.get("Title1")?.as_string().map(str::to_string));
            }
        }

        note.password_used = Some(outcome.password);
        Some(outcome.plaintext)
    }

    /// Inflate, parse and render into `note`; returns the missing count.
    fn render(&self, compressed: &[u8], note: &mut AssembledNote) -> Result<usize> {
        let parsed = gunzip(compressed).and_then(|inflated| {
            let document = Document::from_protobuf(&inflated)?;
            Ok((inflated, document))
        });
        let (inflated, document) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Note {} is unparseable: {}", note.note_id, e);
                note.status = NoteStatus::Unparseable(e.to_string());
                return Ok(0);
            }
        };

        let context = NoteContext {
            note_id: note.note_id,
            account_folder: self.account_folder(note.account_id)?,
            is_password_protected: note.is_password_protected,
            password: note.password_used.clone(),
        };
        let mut resolver = StoreResolver::new(
            &self.db,
            &self.dialect,
            &self.config,
            &self.session,
            self.locator.as_ref(),
            context,
        );
        let rendered = render_document(&document, &mut resolver);
        let (tables, secondary) = resolver.into_parts();

        if rendered.missing > 0 {
            tracing::debug!("Note {} has {} missing objects", note.note_id, rendered.missing);
        }

        note.plaintext = rendered.plaintext;
        if self.config.render_html {
            note.html = rendered.html;
        }
        note.objects = rendered.objects;
        note.secondary_objects = secondary;
        note.tables = tables;
        note.decompressed = Some(inflated);
        note.status = NoteStatus::Parsed;
        Ok(rendered.missing)
    }

    /// `Accounts/<identifier>/` for an account row, cached
    fn account_folder(&self, account_id: Option<i64>) -> Result<String> {
        let Some(account_id) = account_id else {
            return Ok("[Unknown Account]/".to_string());
        };
        if let Some(folder) = self.account_folders.lock().get(&account_id) {
            return Ok(folder.clone());
        }

        let identifier: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT ZIDENTIFIER FROM ZICCLOUDSYNCINGOBJECT WHERE Z_PK=?1",
                [account_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let folder = match identifier {
            Some(identifier) => format!("Accounts/{}/", identifier),
            None => "[Unknown Account]/".to_string(),
        };
        self.account_folders.lock().insert(account_id, folder.clone());
        Ok(folder)
    }

    fn assemble_legacy(&self, note_id: i64) -> Result<AssembledNote> {
        type LegacyRow = (i64, Option<String>, Option<f64>, Option<f64>, Option<String>, Option<i64>);
        let row: LegacyRow = self
            .db
            .conn()
            .query_row(self.dialect.legacy_note_query(), [note_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(6)?))
            })
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Legacy note {}", note_id)))?;
        let (pk, title, created, modified, body, account) = row;

        let mut note = AssembledNote::new(pk, pk);
        note.title = title;
        note.created = created.and_then(core_time_to_utc);
        note.modified = modified.and_then(core_time_to_utc);
        note.account_id = account;

        match body {
            Some(html) => {
                note.plaintext = strip_html(&html);
                if self.config.render_html {
                    note.html = html;
                }
            }
            None => note.status = NoteStatus::Unparseable("Legacy note has no body".to_string()),
        }
        self.counters.record(&note, 0);
        Ok(note)
    }
}

/// Plaintext of a legacy HTML body: tags dropped, line-breaking tags kept
/// as newlines, common entities decoded.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('>') else {
            rest = &rest[start..];
            break;
        };
        let tag = rest[start + 1..start + end].trim().to_ascii_lowercase();
        if tag.starts_with("br") || tag == "/div" || tag == "/p" {
            out.push('\n');
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);

    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<div>Hello<br>World</div>"), "Hello\nWorld\n");
        assert_eq!(strip_html("a &amp;lt; b&nbsp;c"), "a &lt; b c");
        assert_eq!(strip_html("no tags"), "no tags");
        assert_eq!(strip_html("broken <tag"), "broken <tag");
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = AssemblerCounters::default();
        let mut note = AssembledNote::new(1, 1);
        counters.record(&note, 2);
        note.status = NoteStatus::Locked;
        counters.record(&note, 0);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.notes_seen, 2);
        assert_eq!(snapshot.notes_parsed, 1);
        assert_eq!(snapshot.notes_locked, 1);
        assert_eq!(snapshot.objects_missing, 2);
    }
}
