//! Database connection and layout introspection

use crate::Result;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Magic bytes at the start of every SQLite file
pub const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

/// Note store connection wrapper
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open a note store read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path_buf,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // Fail fast on files that are not databases at all
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;

        tracing::debug!("Opened note store {} read-only", path_buf.display());
        Ok(Self {
            conn,
            path: Some(path_buf),
        })
    }

    /// Open a working copy read-write, needed for plaintext write-back
    pub fn open_read_write<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path_buf,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;

        tracing::debug!("Opened note store {} read-write", path_buf.display());
        Ok(Self {
            conn,
            path: Some(path_buf),
        })
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn, path: None }
    }

    /// Get connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Path the database was opened from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begin transaction
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Names of all tables
    pub fn tables(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }

    /// True if `table` exists
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Columns of `table` as sorted `NAME: TYPE` strings.
    ///
    /// Sorting makes the list independent of declaration order. A missing
    /// table yields an empty list.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let mut columns = stmt
            .query_map([table], |row| {
                let name: String = row.get(0)?;
                let declared: String = row.get(1)?;
                Ok(format!("{}: {}", name, declared.to_uppercase()))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        columns.sort();
        Ok(columns)
    }

    /// True if `table` has a column called `column`
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let prefix = format!("{}: ", column);
        Ok(self
            .table_columns(table)?
            .iter()
            .any(|c| c.starts_with(&prefix)))
    }
}

/// True if `path` starts with the SQLite magic.
pub fn is_sqlite_file<P: AsRef<Path>>(path: P) -> bool {
    use std::io::Read;

    let mut header = [0u8; 16];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map(|_| header == SQLITE_MAGIC)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn fixture() -> Database {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ZICNOTEDATA (Z_PK INTEGER PRIMARY KEY, ZNOTE INTEGER, ZDATA BLOB);
             CREATE TABLE ZICCLOUDSYNCINGOBJECT (ZTITLE1 VARCHAR, Z_PK INTEGER PRIMARY KEY);",
        )
        .unwrap();
        Database::from_connection(conn)
    }

    #[test]
    fn test_tables_and_columns() {
        let db = fixture();
        let tables = db.tables().unwrap();
        assert!(tables.contains("ZICNOTEDATA"));
        assert!(db.has_table("ZICCLOUDSYNCINGOBJECT").unwrap());
        assert!(!db.has_table("ZNOTE").unwrap());

        assert_eq!(
            db.table_columns("ZICCLOUDSYNCINGOBJECT").unwrap(),
            vec!["ZTITLE1: VARCHAR", "Z_PK: INTEGER"]
        );
        assert!(db.has_column("ZICNOTEDATA", "ZDATA").unwrap());
        assert!(!db.has_column("ZICNOTEDATA", "ZPLAINTEXT").unwrap());
    }

    #[test]
    fn test_missing_table_has_no_columns() {
        let db = fixture();
        assert!(db.table_columns("ZNOTEBODY").unwrap().is_empty());
    }

    #[test]
    fn test_open_read_only_and_magic() {
        let file = NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(file.path()).unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        }
        assert!(is_sqlite_file(file.path()));

        let db = Database::open(file.path()).unwrap();
        assert!(db.has_table("t").unwrap());
        assert!(db.conn().execute("INSERT INTO t (x) VALUES (1)", []).is_err());
        assert_eq!(db.path(), Some(file.path()));
    }

    #[test]
    fn test_rejects_non_database() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0x42u8; 4096]).unwrap();
        assert!(!is_sqlite_file(file.path()));
        assert!(Database::open(file.path()).is_err());
    }
}
