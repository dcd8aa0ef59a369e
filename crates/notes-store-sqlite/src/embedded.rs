//! Embedded objects and the database-backed object resolver
//!
//! Each placeholder in a note points at a `ZICCLOUDSYNCINGOBJECT` row by
//! `ZIDENTIFIER`. The row's type identifier picks an [`ObjectKind`]; every
//! kind renders HTML, describes itself in one line, and may have a backing
//! file somewhere in the backup.

use crate::backup::BackupLocator;
use crate::config::AssemblerConfig;
use crate::database::Database;
use crate::dialect::Dialect;
use crate::keyed_archive::RecordValues;
use crate::models::NoteTable;
use crate::schema_version::SYNC_OBJECT_TABLE;
use crate::uti::{self, InlineKind, MediaCategory, UtiClass};
use crate::{Error, Result};
use base64::Engine;
use notes_content::proto_types::AttachmentInfo;
use notes_content::{escape_html, gallery_children, reconstruct_table, EmbeddedContent, ObjectResolver};
use notes_crypto::{CryptoEnvelope, DecryptionSession};
use rusqlite::OptionalExtension;
use serde::Serialize;
use std::path::PathBuf;

/// Suffix of protected files on disk
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Extensions tried for drawing fallback images
pub const FALLBACK_IMAGE_EXTENSIONS: &[&str] = &["jpeg", "png", "jpg"];

/// Nesting limit for tables inside tables and galleries inside cells
const MAX_OBJECT_DEPTH: usize = 4;

/// Per-kind data of an embedded object
#[derive(Debug, Clone, Serialize)]
pub enum ObjectKind {
    /// Hashtag, mention, note link or calculation
    Inline {
        /// Flavour
        kind: InlineKind,
        /// `ZALTTEXT`
        alt_text: Option<String>,
        /// `ZTOKENCONTENTIDENTIFIER`
        token: Option<String>,
    },
    /// Web link
    Url {
        /// `ZURLSTRING`
        url: Option<String>,
    },
    /// Table grid
    Table {
        /// Reconstructed grid, `None` if the mergeable data was unusable
        table: Option<NoteTable>,
    },
    /// Collection of scanned or photographed items
    Gallery {
        /// Items in stored order
        children: Vec<EmbeddedObject>,
    },
    /// File attachment stored under `Media/`
    Media {
        /// Media family
        category: MediaCategory,
        /// `ZIDENTIFIER` of the media row
        media_uuid: Option<String>,
        /// `ZFILENAME` of the media row
        filename: Option<String>,
    },
    /// Sketch with a rendered fallback image
    Drawing,
    /// Document scan with a fallback PDF
    Scan,
    /// Row no longer exists
    Deleted,
    /// Unrecognized type
    Generic,
}

/// Backing file found in the backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackingFile {
    /// Path inside the note container
    pub logical_path: String,
    /// Name the file is stored under, without the protected suffix
    pub display_name: String,
    /// Where the locator found it
    pub source: PathBuf,
    /// Where the locator stored a copy, if it did
    pub stored: Option<PathBuf>,
}

impl BackingFile {
    /// Path used to reference the file from HTML and descriptions.
    ///
    /// Stored copies keep the logical directory under the display name,
    /// relative to the output root.
    pub fn reference(&self) -> String {
        if self.stored.is_none() {
            return self.logical_path.clone();
        }
        match self.logical_path.rsplit_once('/') {
            Some((parent, _)) => format!("{}/{}", parent, self.display_name),
            None => self.display_name.clone(),
        }
    }
}

/// One embedded object
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedObject {
    /// `Z_PK`, absent for deleted objects
    pub primary_key: Option<i64>,
    /// `ZIDENTIFIER`
    pub identifier: String,
    /// Type identifier
    pub type_uti: String,
    /// Conformance label
    pub conforms_to: &'static str,
    /// Inherited from the owning note
    pub is_password_protected: bool,
    /// Kind-specific data
    pub kind: ObjectKind,
    /// Candidate logical paths of the backing file, best first
    pub locations: Vec<String>,
    /// Located backing file
    pub backing: Option<BackingFile>,
    #[serde(skip)]
    envelope: Option<CryptoEnvelope>,
}

impl EmbeddedObject {
    /// Object with no backing file
    pub fn new(primary_key: Option<i64>, identifier: &str, type_uti: &str, kind: ObjectKind) -> Self {
        Self {
            primary_key,
            identifier: identifier.to_string(),
            type_uti: type_uti.to_string(),
            conforms_to: uti::conforms_to(type_uti),
            is_password_protected: false,
            kind,
            locations: Vec::new(),
            backing: None,
            envelope: None,
        }
    }

    /// Placeholder for an object whose row is gone
    pub fn deleted(identifier: &str, type_uti: Option<&str>) -> Self {
        let mut object = Self::new(None, identifier, type_uti.unwrap_or_default(), ObjectKind::Deleted);
        object.conforms_to = "deleted";
        object
    }

    /// Envelope protecting the backing file
    pub fn envelope(&self) -> Option<&CryptoEnvelope> {
        self.envelope.as_ref()
    }

    fn base_description(&self) -> String {
        format!("Embedded Object {}: {}", self.type_uti, self.identifier)
    }

    fn data_label(&self) -> Option<&'static str> {
        match &self.kind {
            ObjectKind::Media { category, .. } => Some(category.label()),
            ObjectKind::Drawing => Some("drawing"),
            ObjectKind::Scan => Some("scan"),
            _ => None,
        }
    }

    fn renders_as_image(&self) -> bool {
        match &self.kind {
            ObjectKind::Media { category, .. } => category.renders_inline(),
            ObjectKind::Drawing | ObjectKind::Scan => true,
            _ => false,
        }
    }

    /// Find the first candidate location the locator knows, and store a
    /// copy; protected files are decrypted on the way.
    ///
    /// Returns `Ok(None)` when no candidate exists in the backup.
    pub fn locate_backing_file(
        &mut self,
        locator: &dyn BackupLocator,
        session: &DecryptionSession,
        password: Option<&str>,
    ) -> Result<Option<&BackingFile>> {
        let Some((logical_path, source)) = self
            .locations
            .iter()
            .find_map(|p| locator.resolve_path(p).map(|abs| (p.clone(), abs)))
        else {
            tracing::debug!("No backing file for {} in backup", self.identifier);
            return Ok(None);
        };

        let file_name = logical_path.rsplit('/').next().unwrap_or(logical_path.as_str());
        let display_name = match &self.kind {
            ObjectKind::Media { filename: Some(name), .. } => name.clone(),
            _ => file_name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(file_name).to_string(),
        };

        let stored = if self.is_password_protected {
            let envelope = self
                .envelope
                .as_ref()
                .ok_or_else(|| Error::Validation(format!("No envelope for protected {}", self.identifier)))?;
            let asset = envelope.for_asset().unwrap_or_else(|| envelope.clone());
            let ciphertext = std::fs::read(&source)?;
            let plaintext = match password {
                Some(pw) => session.decrypt_with_password(pw, &asset, &ciphertext),
                None => session.decrypt(&asset, &ciphertext).map(|o| o.plaintext),
            };
            match plaintext {
                Some(bytes) => locator.materialize_bytes(&logical_path, &display_name, &bytes).ok(),
                None => {
                    tracing::warn!("Could not decrypt backing file of {}", self.identifier);
                    None
                }
            }
        } else {
            locator.materialize(&logical_path, &display_name, &source).ok()
        };

        self.backing = Some(BackingFile {
            logical_path,
            display_name,
            source,
            stored,
        });
        Ok(self.backing.as_ref())
    }
}

impl EmbeddedContent for EmbeddedObject {
    fn render_html(&self) -> String {
        match &self.kind {
            ObjectKind::Url { url: Some(url) } => {
                let url = escape_html(url);
                format!("<a href='{}'>{}</a>", url, url)
            }
            ObjectKind::Table { table: Some(table) } => table.to_html(),
            ObjectKind::Gallery { children } => children.iter().map(|c| c.render_html()).collect(),
            _ if self.data_label().is_some() => match &self.backing {
                Some(file) if self.renders_as_image() => {
                    format!("<img src=\"../{}\">", escape_html(&file.reference()))
                }
                Some(file) => format!(
                    "<a href=\"../{}\">{} {}</a>",
                    escape_html(&file.reference()),
                    self.data_label().unwrap_or("media"),
                    escape_html(&file.display_name)
                ),
                None if self.renders_as_image() => {
                    "{Image missing due to not having a file reference location}".to_string()
                }
                None => "{Media missing due to not having a file reference location}".to_string(),
            },
            _ => escape_html(&self.describe()),
        }
    }

    fn describe(&self) -> String {
        match &self.kind {
            ObjectKind::Inline { kind, alt_text, token } => {
                let alt = alt_text.as_deref().unwrap_or_default();
                match (kind, token) {
                    (InlineKind::Mention | InlineKind::Link, Some(token)) => format!("{} [{}]", alt, token),
                    _ => alt.to_string(),
                }
            }
            ObjectKind::Url { url } => match url {
                Some(url) => format!("{} pointing to {}", self.base_description(), url),
                None => self.base_description(),
            },
            ObjectKind::Table { table: Some(table) } => {
                format!("{} with cells: {}", self.base_description(), table.to_plaintext())
            }
            ObjectKind::Deleted => format!(
                "{{Deleted embedded {} object which had ZICCLOUDSYNCINGOBJECTS.ZIDENTIFIER: {}}}",
                self.type_uti, self.identifier
            ),
            _ => match (self.data_label(), &self.backing) {
                (Some(label), Some(file)) => {
                    format!("{} with {} in {}", self.base_description(), label, file.reference())
                }
                _ => self.base_description(),
            },
        }
    }
}

/// Build an envelope from nullable crypto columns.
pub(crate) fn envelope_from_columns(
    iv: Option<Vec<u8>>,
    tag: Option<Vec<u8>>,
    salt: Option<Vec<u8>>,
    iterations: Option<i64>,
    wrapped_key: Option<Vec<u8>>,
) -> Option<CryptoEnvelope> {
    let envelope = CryptoEnvelope::new(
        iv?,
        tag?,
        salt?,
        u32::try_from(iterations?).ok()?,
        wrapped_key?,
    );
    envelope.is_complete().then_some(envelope)
}

/// What the resolver knows about the note being rendered
#[derive(Debug, Clone, Default)]
pub struct NoteContext {
    /// Owning note
    pub note_id: i64,
    /// `Accounts/<account identifier>/`
    pub account_folder: String,
    /// Whether the note (and so every object) is protected
    pub is_password_protected: bool,
    /// Password that opened the note
    pub password: Option<zeroize::Zeroizing<String>>,
}

struct ObjectRow {
    primary_key: i64,
    type_uti: Option<String>,
    type_uti_inline: Option<String>,
    alt_text: Option<String>,
    token: Option<String>,
}

/// Resolves placeholders against the sync-object table of one store
pub struct StoreResolver<'a> {
    db: &'a Database,
    dialect: &'a Dialect,
    config: &'a AssemblerConfig,
    session: &'a DecryptionSession,
    locator: &'a dyn BackupLocator,
    note: NoteContext,
    tables: Vec<NoteTable>,
    secondary: Vec<EmbeddedObject>,
    depth: usize,
}

impl<'a> StoreResolver<'a> {
    /// Resolver for one note
    pub fn new(
        db: &'a Database,
        dialect: &'a Dialect,
        config: &'a AssemblerConfig,
        session: &'a DecryptionSession,
        locator: &'a dyn BackupLocator,
        note: NoteContext,
    ) -> Self {
        Self {
            db,
            dialect,
            config,
            session,
            locator,
            note,
            tables: Vec::new(),
            secondary: Vec::new(),
            depth: 0,
        }
    }

    /// Tables and table-cell objects collected while rendering
    pub fn into_parts(self) -> (Vec<NoteTable>, Vec<EmbeddedObject>) {
        (self.tables, self.secondary)
    }

    /// Build the object stored under `identifier`, or `None` if no row has it.
    pub fn load_object(&mut self, identifier: &str) -> Result<Option<EmbeddedObject>> {
        let row = self
            .db
            .conn()
            .query_row(self.dialect.object_query(), [identifier], |row| {
                Ok(ObjectRow {
                    primary_key: row.get(0)?,
                    type_uti: row.get(1)?,
                    type_uti_inline: row.get(2)?,
                    alt_text: row.get(3)?,
                    token: row.get(4)?,
                })
            })
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let type_uti = row
            .type_uti_inline
            .clone()
            .or_else(|| row.type_uti.clone())
            .unwrap_or_default();
        let pk = row.primary_key;

        let mut object = match uti::classify(&type_uti) {
            UtiClass::Inline(kind) => EmbeddedObject::new(
                Some(pk),
                identifier,
                &type_uti,
                ObjectKind::Inline {
                    kind,
                    alt_text: row.alt_text,
                    token: row.token,
                },
            ),
            UtiClass::Url => {
                let url = self.string_column(pk, "ZURLSTRING")?;
                EmbeddedObject::new(Some(pk), identifier, &type_uti, ObjectKind::Url { url })
            }
            UtiClass::Table => {
                let table = self.load_table(pk, identifier);
                EmbeddedObject::new(Some(pk), identifier, &type_uti, ObjectKind::Table { table })
            }
            UtiClass::Gallery => {
                let children = self.load_gallery(pk, identifier);
                EmbeddedObject::new(Some(pk), identifier, &type_uti, ObjectKind::Gallery { children })
            }
            UtiClass::Media(category) => self.media_object(pk, identifier, &type_uti, category)?,
            UtiClass::Drawing => self.fallback_object(pk, identifier, &type_uti, ObjectKind::Drawing)?,
            UtiClass::Scan => self.fallback_object(pk, identifier, &type_uti, ObjectKind::Scan)?,
            UtiClass::Generic => EmbeddedObject::new(Some(pk), identifier, &type_uti, ObjectKind::Generic),
        };
        object.is_password_protected = self.note.is_password_protected;

        if !object.locations.is_empty() {
            let password = self.note.password.as_ref().map(|p| p.as_str());
            if let Err(e) = object.locate_backing_file(self.locator, self.session, password) {
                tracing::warn!("Failed to store backing file of {}: {}", identifier, e);
            }
        }
        Ok(Some(object))
    }

    fn string_column(&self, pk: i64, column: &str) -> Result<Option<String>> {
        if !self.db.has_column(SYNC_OBJECT_TABLE, column)? {
            return Ok(None);
        }
        let query = format!("SELECT {} FROM ZICCLOUDSYNCINGOBJECT WHERE Z_PK=?1", column);
        Ok(self
            .db
            .conn()
            .query_row(&query, [pk], |row| row.get::<_, Option<String>>(0))
            .optional()?
            .flatten())
    }

    /// Envelope of a sync-object row, with an optional secondary IV/tag pair
    fn row_envelope(&self, pk: i64, fallback: Option<(&str, &str)>) -> Result<Option<CryptoEnvelope>> {
        if !self.db.has_column(SYNC_OBJECT_TABLE, "ZCRYPTOWRAPPEDKEY")? {
            return Ok(None);
        }
        let (fallback_iv, fallback_tag) = match fallback {
            Some((iv, tag))
                if self.db.has_column(SYNC_OBJECT_TABLE, iv)? && self.db.has_column(SYNC_OBJECT_TABLE, tag)? =>
            {
                (iv, tag)
            }
            _ => ("NULL", "NULL"),
        };
        let query = format!(
            "SELECT ZCRYPTOINITIALIZATIONVECTOR, ZCRYPTOTAG, ZCRYPTOSALT, ZCRYPTOITERATIONCOUNT, \
             ZCRYPTOWRAPPEDKEY, {}, {} FROM ZICCLOUDSYNCINGOBJECT WHERE Z_PK=?1",
            fallback_iv, fallback_tag
        );
        let envelope = self
            .db
            .conn()
            .query_row(&query, [pk], |row| {
                let envelope = envelope_from_columns(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?);
                let fallback: (Option<Vec<u8>>, Option<Vec<u8>>) = (row.get(5)?, row.get(6)?);
                Ok(match (envelope, fallback) {
                    (Some(env), (Some(iv), Some(tag))) => Some(env.with_fallback(iv, tag)),
                    (env, _) => env,
                })
            })
            .optional()?
            .flatten();
        Ok(envelope)
    }

    /// Not-yet-applied keyed archive of a sync-object row
    fn unapplied_record(&self, pk: i64) -> Result<Option<RecordValues>> {
        let column = self.dialect.unapplied_encrypted_record;
        if !self.db.has_column(SYNC_OBJECT_TABLE, column)? {
            return Ok(None);
        }
        let query = format!("SELECT {} FROM ZICCLOUDSYNCINGOBJECT WHERE Z_PK=?1", column);
        let blob: Option<Vec<u8>> = self
            .db
            .conn()
            .query_row(&query, [pk], |row| row.get(0))
            .optional()?
            .flatten();
        blob.map(|b| RecordValues::parse(&b)).transpose()
    }

    /// Gzipped mergeable data of a table or gallery row, decrypting it first
    /// for protected notes.
    fn mergeable_data(&self, pk: i64) -> Result<Option<Vec<u8>>> {
        if !self.note.is_password_protected {
            let column = self.dialect.mergeable_data;
            if !self.db.has_column(SYNC_OBJECT_TABLE, column)? {
                return Ok(None);
            }
            let query = format!("SELECT {} FROM ZICCLOUDSYNCINGOBJECT WHERE Z_PK=?1", column);
            return Ok(self
                .db
                .conn()
                .query_row(&query, [pk], |row| row.get::<_, Option<Vec<u8>>>(0))
                .optional()?
                .flatten());
        }

        let (envelope, ciphertext) = match self.unapplied_record(pk)? {
            Some(record) => (record.envelope(), record.encrypted_values().map(<[u8]>::to_vec)),
            None => {
                let ciphertext = if self.db.has_column(SYNC_OBJECT_TABLE, "ZENCRYPTEDVALUESJSON")? {
                    self.db
                        .conn()
                        .query_row(
                            "SELECT ZENCRYPTEDVALUESJSON FROM ZICCLOUDSYNCINGOBJECT WHERE Z_PK=?1",
                            [pk],
                            |row| row.get::<_, Option<Vec<u8>>>(0),
                        )
                        .optional()?
                        .flatten()
                } else {
                    None
                };
                (self.row_envelope(pk, None)?, ciphertext)
            }
        };
        let (Some(envelope), Some(ciphertext)) = (envelope, ciphertext) else {
            return Ok(None);
        };

        let plaintext = match self.note.password.as_ref() {
            Some(pw) => self.session.decrypt_with_password(pw, &envelope, &ciphertext),
            None => self.session.decrypt(&envelope, &ciphertext).map(|o| o.plaintext),
        };
        let Some(plaintext) = plaintext else {
            tracing::warn!("Encrypted values of object {} did not decrypt", pk);
            return Ok(None);
        };

        let json: serde_json::Value = serde_json::from_slice(&plaintext)?;
        let encoded = json
            .get("mergeableData")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::NotFound("mergeableData".to_string()))?;
        Ok(Some(base64::engine::general_purpose::STANDARD.decode(encoded)?))
    }

    fn load_table(&mut self, pk: i64, identifier: &str) -> Option<NoteTable> {
        if self.depth >= MAX_OBJECT_DEPTH {
            tracing::warn!("Table {} nested too deeply, skipping", identifier);
            return None;
        }
        let data = match self.mergeable_data(pk) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Could not read mergeable data of table {}: {}", identifier, e);
                return None;
            }
        };

        self.depth += 1;
        let reconstructed = reconstruct_table(&data, self);
        self.depth -= 1;

        match reconstructed {
            Ok(table) => {
                let grid = NoteTable::from_table(identifier, &table);
                self.secondary.extend(table.secondary_objects);
                self.tables.push(grid.clone());
                Some(grid)
            }
            Err(e) => {
                tracing::warn!("Could not rebuild table {}: {}", identifier, e);
                None
            }
        }
    }

    fn load_gallery(&mut self, pk: i64, identifier: &str) -> Vec<EmbeddedObject> {
        if self.depth >= MAX_OBJECT_DEPTH {
            return Vec::new();
        }
        let children = match self.mergeable_data(pk).map(|d| d.map(|d| gallery_children(&d))) {
            Ok(Some(Ok(children))) => children,
            Ok(None) => return Vec::new(),
            Ok(Some(Err(e))) => {
                tracing::warn!("Could not read gallery {}: {}", identifier, e);
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Could not read mergeable data of gallery {}: {}", identifier, e);
                return Vec::new();
            }
        };

        self.depth += 1;
        let mut objects = Vec::with_capacity(children.len());
        for child in &children {
            match self.load_object(child) {
                Ok(Some(object)) => objects.push(object),
                Ok(None) => tracing::debug!("Gallery {} item {} is gone", identifier, child),
                Err(e) => tracing::warn!("Gallery {} item {} failed: {}", identifier, child, e),
            }
        }
        self.depth -= 1;
        objects
    }

    fn media_object(
        &self,
        pk: i64,
        identifier: &str,
        type_uti: &str,
        category: MediaCategory,
    ) -> Result<EmbeddedObject> {
        let media: Option<(i64, Option<String>, Option<String>)> = if self.db.has_column(SYNC_OBJECT_TABLE, "ZMEDIA")? {
            self.db
                .conn()
                .query_row(
                    "SELECT m.Z_PK, m.ZIDENTIFIER, m.ZFILENAME FROM ZICCLOUDSYNCINGOBJECT o \
                     JOIN ZICCLOUDSYNCINGOBJECT m ON m.Z_PK=o.ZMEDIA WHERE o.Z_PK=?1",
                    [pk],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?
        } else {
            None
        };

        let (media_pk, media_uuid, filename) = match media {
            Some((media_pk, uuid, filename)) => (Some(media_pk), uuid, filename),
            None => (None, None, None),
        };

        let mut locations = Vec::new();
        if let Some(uuid) = &media_uuid {
            let stored_name = if self.note.is_password_protected {
                Some(uuid.as_str())
            } else {
                filename.as_deref()
            };
            if let Some(name) = stored_name {
                locations.push(format!("{}Media/{}/{}", self.note.account_folder, uuid, name));
            }
        }

        let envelope = match (self.note.is_password_protected, media_pk) {
            (true, Some(media_pk)) => {
                self.row_envelope(media_pk, Some(("ZASSETCRYPTOINITIALIZATIONVECTOR", "ZASSETCRYPTOTAG")))?
            }
            _ => None,
        };

        let mut object = EmbeddedObject::new(
            Some(pk),
            identifier,
            type_uti,
            ObjectKind::Media {
                category,
                media_uuid,
                filename,
            },
        );
        object.locations = locations;
        object.envelope = envelope;
        Ok(object)
    }

    /// Drawings and scans keep a rendered fallback next to the account.
    fn fallback_object(&self, pk: i64, identifier: &str, type_uti: &str, kind: ObjectKind) -> Result<EmbeddedObject> {
        let protected = self.note.is_password_protected;
        let suffix = if protected { ENCRYPTED_SUFFIX } else { "" };
        let (folder, generation_column, names): (&str, &str, Vec<(String, String)>) = match kind {
            ObjectKind::Scan => (
                "FallbackPDFs",
                "ZFALLBACKPDFGENERATION",
                vec![(format!("{}.pdf", identifier), "FallbackPDF.pdf".to_string())],
            ),
            _ => (
                "FallbackImages",
                "ZFALLBACKIMAGEGENERATION",
                FALLBACK_IMAGE_EXTENSIONS
                    .iter()
                    .map(|ext| (format!("{}.{}", identifier, ext), format!("FallbackImage.{}", ext)))
                    .collect(),
            ),
        };

        // Generation subfolders appear from generation 17 on
        let generation = self
            .string_column(pk, generation_column)?
            .filter(|g| !g.is_empty());

        let base = format!("{}{}/", self.note.account_folder, folder);
        let mut locations = Vec::new();
        for (flat, nested) in &names {
            locations.push(format!("{}{}{}", base, flat, suffix));
            if let Some(generation) = &generation {
                locations.push(format!("{}{}/{}/{}{}", base, identifier, generation, nested, suffix));
            }
        }

        let envelope = if protected {
            self.row_envelope(
                pk,
                Some(("ZFALLBACKIMAGECRYPTOINITIALIZATIONVECTOR", "ZFALLBACKIMAGECRYPTOTAG")),
            )?
        } else {
            None
        };

        let mut object = EmbeddedObject::new(Some(pk), identifier, type_uti, kind);
        object.locations = locations;
        object.envelope = envelope;
        Ok(object)
    }
}

impl ObjectResolver for StoreResolver<'_> {
    type Object = EmbeddedObject;

    fn resolve(&mut self, attachment: &AttachmentInfo) -> Option<EmbeddedObject> {
        let identifier = attachment.attachment_identifier.as_deref()?;
        match self.load_object(identifier) {
            Ok(Some(object)) => Some(object),
            Ok(None) if self.config.include_deleted_objects => {
                tracing::debug!("Note {} references deleted object {}", self.note.note_id, identifier);
                Some(EmbeddedObject::deleted(identifier, attachment.type_uti.as_deref()))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Object {} of note {} failed: {}", identifier, self.note.note_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::NullLocator;
    use crate::schema_version::{Platform, SchemaVersion, VERSION_15};
    use notes_crypto::PasswordList;
    use rusqlite::Connection;

    fn store() -> Database {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ZICCLOUDSYNCINGOBJECT (Z_PK INTEGER PRIMARY KEY, ZIDENTIFIER VARCHAR,
                ZTYPEUTI VARCHAR, ZTYPEUTI1 VARCHAR, ZALTTEXT VARCHAR, ZTOKENCONTENTIDENTIFIER VARCHAR,
                ZURLSTRING VARCHAR, ZMEDIA INTEGER, ZFILENAME VARCHAR, ZMERGEABLEDATA1 BLOB,
                ZFALLBACKIMAGEGENERATION VARCHAR);
             INSERT INTO ZICCLOUDSYNCINGOBJECT (Z_PK, ZIDENTIFIER, ZTYPEUTI1, ZALTTEXT, ZTOKENCONTENTIDENTIFIER)
                VALUES (1, 'MENTION', 'com.apple.notes.inlinetextattachment.mention', '@Ann', 'rec-1');
             INSERT INTO ZICCLOUDSYNCINGOBJECT (Z_PK, ZIDENTIFIER, ZTYPEUTI, ZURLSTRING)
                VALUES (2, 'URL', 'public.url', 'https://example.com/?a=1&b=2');
             INSERT INTO ZICCLOUDSYNCINGOBJECT (Z_PK, ZIDENTIFIER, ZTYPEUTI, ZMEDIA)
                VALUES (3, 'PHOTO', 'public.jpeg', 4);
             INSERT INTO ZICCLOUDSYNCINGOBJECT (Z_PK, ZIDENTIFIER, ZFILENAME)
                VALUES (4, 'MEDIA-UUID', 'beach.jpeg');
             INSERT INTO ZICCLOUDSYNCINGOBJECT (Z_PK, ZIDENTIFIER, ZTYPEUTI, ZFALLBACKIMAGEGENERATION)
                VALUES (5, 'SKETCH', 'com.apple.drawing.2', 'G1');",
        )
        .unwrap();
        Database::from_connection(conn)
    }

    fn with_resolver<T>(config: AssemblerConfig, f: impl FnOnce(&mut StoreResolver<'_>) -> T) -> T {
        let db = store();
        let dialect = Dialect::new(SchemaVersion::new(VERSION_15, Platform::Mobile));
        let session = DecryptionSession::new(PasswordList::new());
        let note = NoteContext {
            note_id: 10,
            account_folder: "Accounts/ACCT/".to_string(),
            ..Default::default()
        };
        let mut resolver = StoreResolver::new(&db, &dialect, &config, &session, &NullLocator, note);
        f(&mut resolver)
    }

    fn attachment(id: &str, uti: &str) -> AttachmentInfo {
        AttachmentInfo {
            attachment_identifier: Some(id.to_string()),
            type_uti: Some(uti.to_string()),
        }
    }

    #[test]
    fn test_inline_mention_uses_alt_text_and_token() {
        with_resolver(AssemblerConfig::default(), |r| {
            let object = r.resolve(&attachment("MENTION", "com.apple.notes.inlinetextattachment")).unwrap();
            assert_eq!(object.describe(), "@Ann [rec-1]");
            assert_eq!(object.render_html(), "@Ann [rec-1]");
            assert_eq!(object.conforms_to, "inline");
        });
    }

    #[test]
    fn test_url_renders_escaped_link() {
        with_resolver(AssemblerConfig::default(), |r| {
            let object = r.resolve(&attachment("URL", "public.url")).unwrap();
            assert_eq!(
                object.render_html(),
                "<a href='https://example.com/?a=1&amp;b=2'>https://example.com/?a=1&amp;b=2</a>"
            );
            assert_eq!(
                object.describe(),
                "Embedded Object public.url: URL pointing to https://example.com/?a=1&b=2"
            );
        });
    }

    #[test]
    fn test_media_path_from_media_row() {
        with_resolver(AssemblerConfig::default(), |r| {
            let object = r.resolve(&attachment("PHOTO", "public.jpeg")).unwrap();
            assert_eq!(object.locations, vec!["Accounts/ACCT/Media/MEDIA-UUID/beach.jpeg"]);
            assert!(object.backing.is_none());
            assert_eq!(object.describe(), "Embedded Object public.jpeg: PHOTO");
            assert_eq!(
                object.render_html(),
                "{Image missing due to not having a file reference location}"
            );
        });
    }

    #[test]
    fn test_drawing_fallback_candidates() {
        with_resolver(AssemblerConfig::default(), |r| {
            let object = r.load_object("SKETCH").unwrap().unwrap();
            assert_eq!(object.locations.len(), 6);
            assert_eq!(object.locations[0], "Accounts/ACCT/FallbackImages/SKETCH.jpeg");
            assert_eq!(object.locations[1], "Accounts/ACCT/FallbackImages/SKETCH/G1/FallbackImage.jpeg");
            assert!(object.locations.iter().all(|l| !l.ends_with(ENCRYPTED_SUFFIX)));
        });
    }

    #[test]
    fn test_deleted_object_policy() {
        with_resolver(AssemblerConfig::default(), |r| {
            let object = r.resolve(&attachment("GONE", "public.png")).unwrap();
            assert_eq!(
                object.describe(),
                "{Deleted embedded public.png object which had ZICCLOUDSYNCINGOBJECTS.ZIDENTIFIER: GONE}"
            );
        });

        let config = AssemblerConfig {
            include_deleted_objects: false,
            ..Default::default()
        };
        with_resolver(config, |r| {
            assert!(r.resolve(&attachment("GONE", "public.png")).is_none());
        });
    }

    #[test]
    fn test_envelope_from_columns_requires_everything() {
        assert!(envelope_from_columns(Some(vec![1; 12]), Some(vec![2; 16]), Some(vec![3; 16]), Some(1000), Some(vec![4; 24])).is_some());
        assert!(envelope_from_columns(Some(vec![1; 12]), None, Some(vec![3; 16]), Some(1000), Some(vec![4; 24])).is_none());
        assert!(envelope_from_columns(Some(vec![1; 12]), Some(vec![2; 16]), Some(vec![3; 16]), Some(-1), Some(vec![4; 24])).is_none());
    }
}
