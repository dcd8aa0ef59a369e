//! Per-generation column names and note queries

use crate::database::Database;
use crate::schema_version::{
    SchemaVersion, FOLDER_JOIN_TABLE, SYNC_OBJECT_TABLE, VERSION_11, VERSION_12, VERSION_13,
    VERSION_14, VERSION_15, VERSION_18,
};
use crate::Result;

/// Where a note's folder reference lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderSource {
    /// `ZICCLOUDSYNCINGOBJECT.ZFOLDER`
    Column,
    /// `Z_11NOTES.Z_11FOLDERS`, joined on `Z_8NOTES`
    Join,
}

/// Column names that vary across generations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    /// Generation this dialect was derived from
    pub version: SchemaVersion,
    /// Cloud record blob column
    pub server_record: &'static str,
    /// Account reference on a note row
    pub account: &'static str,
    /// Creation date on a note row
    pub creation_date: &'static str,
    /// Mergeable data on table and gallery rows
    pub mergeable_data: &'static str,
    /// Keyed archive holding not-yet-applied encrypted values
    pub unapplied_encrypted_record: &'static str,
    /// Folder reference
    pub folder: FolderSource,
    /// Whether `ZTYPEUTI1`, `ZALTTEXT` and `ZTOKENCONTENTIDENTIFIER` exist
    pub inline_attachments: bool,
}

impl Dialect {
    /// Dialect implied by a known generation
    pub fn new(version: SchemaVersion) -> Self {
        let n = version.ordinal();
        Self {
            version,
            server_record: if n >= VERSION_12 { "ZSERVERRECORDDATA" } else { "ZSERVERRECORD" },
            account: if n >= VERSION_15 {
                "ZACCOUNT4"
            } else if n >= VERSION_13 {
                "ZACCOUNT3"
            } else {
                "ZACCOUNT2"
            },
            creation_date: if n > VERSION_14 { "ZCREATIONDATE3" } else { "ZCREATIONDATE1" },
            mergeable_data: if n >= VERSION_13 { "ZMERGEABLEDATA1" } else { "ZMERGEABLEDATA" },
            unapplied_encrypted_record: if n >= VERSION_18 {
                "ZUNAPPLIEDENCRYPTEDRECORDDATA"
            } else {
                "ZUNAPPLIEDENCRYPTEDRECORD"
            },
            folder: if n == VERSION_11 { FolderSource::Join } else { FolderSource::Column },
            inline_attachments: n >= VERSION_15,
        }
    }

    /// Dialect for a store whose generation could not be fingerprinted:
    /// each varying column is picked by probing what actually exists.
    pub fn probe(db: &Database, version: SchemaVersion) -> Result<Self> {
        let columns = db.table_columns(SYNC_OBJECT_TABLE)?;
        let has = |name: &str| {
            let prefix = format!("{}: ", name);
            columns.iter().any(|c| c.starts_with(&prefix))
        };
        let first = |candidates: &[&'static str], default: &'static str| {
            candidates.iter().copied().find(|c| has(*c)).unwrap_or(default)
        };

        let dialect = Self {
            version,
            server_record: first(&["ZSERVERRECORDDATA", "ZSERVERRECORD"], "ZSERVERRECORD"),
            account: first(&["ZACCOUNT4", "ZACCOUNT3", "ZACCOUNT2"], "ZACCOUNT2"),
            creation_date: first(&["ZCREATIONDATE3", "ZCREATIONDATE1"], "ZCREATIONDATE1"),
            mergeable_data: first(&["ZMERGEABLEDATA1", "ZMERGEABLEDATA"], "ZMERGEABLEDATA"),
            unapplied_encrypted_record: first(
                &["ZUNAPPLIEDENCRYPTEDRECORDDATA", "ZUNAPPLIEDENCRYPTEDRECORD"],
                "ZUNAPPLIEDENCRYPTEDRECORD",
            ),
            folder: if has("ZFOLDER") || !db.has_table(FOLDER_JOIN_TABLE)? {
                FolderSource::Column
            } else {
                FolderSource::Join
            },
            inline_attachments: has("ZTYPEUTI1") && has("ZALTTEXT") && has("ZTOKENCONTENTIDENTIFIER"),
        };
        tracing::debug!("Probed dialect for unrecognized store: {:?}", dialect);
        Ok(dialect)
    }

    /// Ids of every modern note
    pub fn note_ids_query(&self) -> &'static str {
        if self.version.is_legacy() {
            "SELECT ZNOTE.Z_PK FROM ZNOTE ORDER BY ZNOTE.Z_PK"
        } else {
            "SELECT ZICNOTEDATA.ZNOTE FROM ZICNOTEDATA WHERE ZICNOTEDATA.ZNOTE IS NOT NULL ORDER BY ZICNOTEDATA.ZNOTE"
        }
    }

    /// Query for one modern note, bound to its note id.
    ///
    /// Column order is fixed; see `NoteRow` in the assembler.
    pub fn note_query(&self) -> String {
        let (folder, from, join) = match self.folder {
            FolderSource::Column => ("ZICCLOUDSYNCINGOBJECT.ZFOLDER", "ZICNOTEDATA, ZICCLOUDSYNCINGOBJECT", ""),
            FolderSource::Join => (
                "Z_11NOTES.Z_11FOLDERS",
                "ZICNOTEDATA, ZICCLOUDSYNCINGOBJECT, Z_11NOTES",
                " AND Z_11NOTES.Z_8NOTES=ZICNOTEDATA.ZNOTE",
            ),
        };
        format!(
            "SELECT ZICNOTEDATA.Z_PK, ZICNOTEDATA.ZNOTE, ZICNOTEDATA.ZDATA, \
             ZICNOTEDATA.ZCRYPTOINITIALIZATIONVECTOR, ZICNOTEDATA.ZCRYPTOTAG, \
             ZICCLOUDSYNCINGOBJECT.ZCRYPTOSALT, ZICCLOUDSYNCINGOBJECT.ZCRYPTOITERATIONCOUNT, \
             ZICCLOUDSYNCINGOBJECT.ZCRYPTOWRAPPEDKEY, ZICCLOUDSYNCINGOBJECT.ZISPASSWORDPROTECTED, \
             ZICCLOUDSYNCINGOBJECT.ZTITLE1, ZICCLOUDSYNCINGOBJECT.{creation}, \
             ZICCLOUDSYNCINGOBJECT.ZMODIFICATIONDATE1, ZICCLOUDSYNCINGOBJECT.{account}, {folder}, \
             ZICCLOUDSYNCINGOBJECT.{unapplied}, ZICCLOUDSYNCINGOBJECT.{server_record} \
             FROM {from} \
             WHERE ZICNOTEDATA.ZNOTE=?1 AND ZICCLOUDSYNCINGOBJECT.Z_PK=ZICNOTEDATA.ZNOTE{join}",
            creation = self.creation_date,
            account = self.account,
            folder = folder,
            unapplied = self.unapplied_encrypted_record,
            server_record = self.server_record,
            from = from,
            join = join,
        )
    }

    /// Query for one legacy note, bound to `ZNOTE.Z_PK`
    pub fn legacy_note_query(&self) -> &'static str {
        "SELECT ZNOTE.Z_PK, ZNOTE.ZTITLE, ZNOTE.ZCREATIONDATE, ZNOTE.ZMODIFICATIONDATE, \
         ZNOTEBODY.ZCONTENT, ZSTORE.Z_PK, ZSTORE.ZACCOUNT \
         FROM ZNOTE, ZNOTEBODY, ZSTORE \
         WHERE ZNOTE.Z_PK=?1 AND ZNOTEBODY.Z_PK=ZNOTE.ZBODY AND ZSTORE.Z_PK=ZNOTE.ZSTORE"
    }

    /// Query for an embedded object row, bound to its identifier
    pub fn object_query(&self) -> &'static str {
        if self.inline_attachments {
            "SELECT Z_PK, ZTYPEUTI, ZTYPEUTI1, ZALTTEXT, ZTOKENCONTENTIDENTIFIER \
             FROM ZICCLOUDSYNCINGOBJECT WHERE ZIDENTIFIER=?1"
        } else {
            "SELECT Z_PK, ZTYPEUTI, NULL, NULL, NULL \
             FROM ZICCLOUDSYNCINGOBJECT WHERE ZIDENTIFIER=?1"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_version::{Platform, VERSION_16};
    use rusqlite::Connection;

    fn dialect(n: i32) -> Dialect {
        Dialect::new(SchemaVersion::new(n, Platform::Mobile))
    }

    #[test]
    fn test_account_column_by_generation() {
        assert_eq!(dialect(VERSION_11).account, "ZACCOUNT2");
        assert_eq!(dialect(VERSION_12).account, "ZACCOUNT2");
        assert_eq!(dialect(VERSION_13).account, "ZACCOUNT3");
        assert_eq!(dialect(VERSION_14).account, "ZACCOUNT3");
        assert_eq!(dialect(VERSION_15).account, "ZACCOUNT4");
    }

    #[test]
    fn test_renamed_columns() {
        assert_eq!(dialect(VERSION_11).server_record, "ZSERVERRECORD");
        assert_eq!(dialect(VERSION_12).server_record, "ZSERVERRECORDDATA");
        assert_eq!(dialect(VERSION_14).creation_date, "ZCREATIONDATE1");
        assert_eq!(dialect(VERSION_15).creation_date, "ZCREATIONDATE3");
        assert_eq!(dialect(VERSION_12).mergeable_data, "ZMERGEABLEDATA");
        assert_eq!(dialect(VERSION_13).mergeable_data, "ZMERGEABLEDATA1");
        assert_eq!(dialect(VERSION_16).unapplied_encrypted_record, "ZUNAPPLIEDENCRYPTEDRECORD");
        assert_eq!(dialect(VERSION_18).unapplied_encrypted_record, "ZUNAPPLIEDENCRYPTEDRECORDDATA");
        assert!(!dialect(VERSION_14).inline_attachments);
        assert!(dialect(VERSION_15).inline_attachments);
    }

    #[test]
    fn test_generation_11_joins_folders() {
        let d = dialect(VERSION_11);
        assert_eq!(d.folder, FolderSource::Join);
        let query = d.note_query();
        assert!(query.contains("Z_11NOTES.Z_11FOLDERS"));
        assert!(query.contains("Z_11NOTES.Z_8NOTES=ZICNOTEDATA.ZNOTE"));
        assert!(!dialect(VERSION_12).note_query().contains("Z_11NOTES"));
    }

    #[test]
    fn test_probe_picks_existing_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ZICCLOUDSYNCINGOBJECT (Z_PK INTEGER PRIMARY KEY, ZACCOUNT3 INTEGER,
                ZFOLDER INTEGER, ZCREATIONDATE1 TIMESTAMP, ZMERGEABLEDATA1 BLOB,
                ZUNAPPLIEDENCRYPTEDRECORD BLOB, ZSERVERRECORDDATA BLOB);",
        )
        .unwrap();
        let db = Database::from_connection(conn);
        let d = Dialect::probe(&db, SchemaVersion::unknown()).unwrap();
        assert_eq!(d.account, "ZACCOUNT3");
        assert_eq!(d.mergeable_data, "ZMERGEABLEDATA1");
        assert_eq!(d.server_record, "ZSERVERRECORDDATA");
        assert_eq!(d.folder, FolderSource::Column);
        assert!(!d.inline_attachments);
    }
}
