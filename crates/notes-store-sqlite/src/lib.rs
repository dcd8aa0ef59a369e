//! Note store reading and assembly
//!
//! Opens note databases of any supported generation, fingerprints their
//! layout, and turns each row into a reconstructed note.
//!
//! ## Generations
//!
//! - **Legacy**: HTML bodies in `ZNOTEBODY`, returned as-is
//! - **9 and later**: gzip-compressed protobuf documents in `ZICNOTEDATA`,
//!   with column names that drift per release ([`Dialect`])
//!
//! ## Protected notes
//!
//! Protected payloads are opened through a shared
//! [`DecryptionSession`](notes_crypto::DecryptionSession). Notes no password
//! opens come back as [`NoteStatus::Locked`] instead of failing the run.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assembler;
pub mod backup;
pub mod config;
pub mod database;
pub mod dialect;
pub mod embedded;
pub mod error;
pub mod keyed_archive;
pub mod models;
pub mod schema_version;
pub mod uti;

pub use assembler::{strip_html, AssemblerSnapshot, NoteAssembler};
pub use backup::{BackupLocator, DirectoryLocator, NullLocator};
pub use config::AssemblerConfig;
pub use database::{is_sqlite_file, Database};
pub use dialect::{Dialect, FolderSource};
pub use embedded::{BackingFile, EmbeddedObject, ObjectKind, StoreResolver};
pub use error::{Error, Result};
pub use keyed_archive::RecordValues;
pub use models::{core_time_to_utc, AssembledNote, NoteStatus, NoteTable, CORE_TIME_OFFSET};
pub use schema_version::{Platform, SchemaVersion};
pub use uti::{classify, InlineKind, MediaCategory, UtiClass};
