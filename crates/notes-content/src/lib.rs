//! Note content reconstruction
//!
//! Turns a note's stored payload into text and HTML:
//!
//! 1. **Decompress** - check the gzip magic, inflate ([`decompress`])
//! 2. **Parse** - decode the document protobuf ([`proto_types`], [`document`])
//! 3. **Merge** - coalesce adjacent runs with identical formatting
//! 4. **Render** - one pass over merged runs producing HTML and plaintext,
//!    with embedded objects supplied by an [`ObjectResolver`] ([`render`])
//!
//! Tables are stored separately as mergeable data and rebuilt by
//! [`table::reconstruct_table`], which runs the same pipeline per cell.
//! Galleries only list their items, read by [`gallery_children`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod decompress;
pub mod document;
pub mod error;
pub mod gallery;
pub mod objects;
pub mod proto_types;
pub mod render;
pub mod table;

pub use decompress::{gunzip, is_gzip, GZIP_MAGIC};
pub use document::{merge_runs, Document, ListKind, Segment, StyleRun, OBJECT_PLACEHOLDER};
pub use error::{Error, Result};
pub use gallery::gallery_children;
pub use objects::{EmbeddedContent, NoObjects, ObjectResolver, MISSING_OBJECT_MARKER};
pub use render::{escape_html, render_document, RenderedDocument};
pub use table::{reconstruct_table, Table, TableCell, TableDirection};

/// Decompress, parse and render a stored note payload in one call.
pub fn reconstruct_note<R: ObjectResolver>(
    compressed: &[u8],
    resolver: &mut R,
) -> Result<RenderedDocument<R::Object>> {
    let document = Document::from_compressed(compressed)?;
    Ok(render_document(&document, resolver))
}
