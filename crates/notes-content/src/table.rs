//! Table reconstruction from mergeable data
//!
//! A table is stored as a flat object graph: arrays of key names, type
//! names, UUIDs and entries, all cross-referenced by index. The root entry
//! is the custom map whose type is [`TABLE_TYPE_MARKER`]; its map entries
//! (looked up by key name) point at the row ordering, the column ordering
//! and the cell dictionary.
//!
//! Orderings list UUIDs in display order. Their `contents` dictionary adds
//! synonyms: a second UUID that shares the grid index of the first. The cell
//! dictionary maps column UUID to a dictionary of row UUID to cell note.

use crate::decompress::gunzip;
use crate::document::Document;
use crate::objects::ObjectResolver;
use crate::proto_types::{MergableDataProto, MergeableDataObjectEntry, ObjectId};
use crate::render::render_document;
use crate::{Error, Result};
use prost::Message;
use serde::Serialize;
use std::collections::HashMap;

/// Type name of a table's root entry
pub const TABLE_TYPE_MARKER: &str = "com.apple.notes.ICTable";

/// Direction value for right-to-left tables
pub const DIRECTION_RIGHT_TO_LEFT: &str = "CRTableColumnDirectionRightToLeft";

const KEY_ROWS: &str = "crRows";
const KEY_COLUMNS: &str = "crColumns";
const KEY_CELLS: &str = "cellColumns";
const KEY_DIRECTION: &str = "crTableColumnDirection";

/// Column order of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TableDirection {
    /// Storage order is display order
    #[default]
    LeftToRight,
    /// Columns display reversed
    RightToLeft,
}

/// One rendered cell
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TableCell {
    /// Cell text
    pub plaintext: String,
    /// Cell HTML
    pub html: String,
}

/// Reconstructed table
#[derive(Debug, Clone, PartialEq)]
pub struct Table<O> {
    /// Row-major cells, already in display order
    pub rows: Vec<Vec<TableCell>>,
    /// Column direction
    pub direction: TableDirection,
    /// Objects embedded inside cells
    pub secondary_objects: Vec<O>,
}

impl<O> Table<O> {
    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// HTML table, empty cells rendered as `&nbsp;`
    pub fn to_html(&self) -> String {
        let mut html = String::from("<table style=\"border:1px solid black\">\n");
        for row in &self.rows {
            html.push_str("<tr>\n");
            for cell in row {
                let content = if cell.html.is_empty() { "&nbsp;" } else { cell.html.as_str() };
                html.push_str("<td style=\"border:1px solid black\">");
                html.push_str(content);
                html.push_str("</td>\n");
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</table>\n");
        html
    }

    /// Plaintext rows, tab-indented, cells separated by ` | `
    pub fn to_plaintext(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                let cells: Vec<&str> = row.iter().map(|c| c.plaintext.as_str()).collect();
                format!("\n\t{}", cells.join(" | "))
            })
            .collect()
    }
}

/// UUID index to grid index, plus the number of grid slots.
#[derive(Debug, Default)]
struct AxisMap {
    indices: HashMap<u64, usize>,
    count: usize,
}

struct ObjectGraph<'a> {
    entries: &'a [MergeableDataObjectEntry],
    keys: &'a [String],
    types: &'a [String],
    uuids: &'a [Vec<u8>],
}

impl<'a> ObjectGraph<'a> {
    fn entry(&self, id: Option<&ObjectId>) -> Option<&'a MergeableDataObjectEntry> {
        let index = usize::try_from(id?.object_index).ok()?;
        let entry = self.entries.get(index);
        if entry.is_none() {
            tracing::debug!("Object index {} out of range ({} entries)", index, self.entries.len());
        }
        entry
    }

    fn key_name(&self, key: i32) -> Option<&'a str> {
        usize::try_from(key).ok().and_then(|k| self.keys.get(k)).map(String::as_str)
    }

    fn key_index(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == name)
    }

    /// UUID index a map-shaped entry points at.
    fn target_uuid(&self, entry: Option<&MergeableDataObjectEntry>) -> Option<u64> {
        let map = entry?.custom_map.as_ref()?;
        Some(map.map_entry.first()?.value.as_ref()?.unsigned_integer_value)
    }

    fn root(&self) -> Option<&'a MergeableDataObjectEntry> {
        self.entries.iter().find(|entry| {
            entry.custom_map.as_ref().is_some_and(|map| {
                usize::try_from(map.map_type)
                    .ok()
                    .and_then(|t| self.types.get(t))
                    .is_some_and(|t| t == TABLE_TYPE_MARKER)
            })
        })
    }

    fn axis(&self, entry: Option<&MergeableDataObjectEntry>) -> AxisMap {
        let mut axis = AxisMap::default();
        let Some(ordering) = entry
            .and_then(|e| e.ordered_set.as_ref())
            .and_then(|s| s.ordering.as_ref())
        else {
            return axis;
        };

        if let Some(array) = ordering.array.as_ref() {
            for attachment in &array.attachment {
                match self.uuids.iter().position(|u| *u == attachment.uuid) {
                    Some(uuid_index) => {
                        axis.indices.insert(uuid_index as u64, axis.count);
                    }
                    None => tracing::debug!("Ordering references unknown UUID"),
                }
                axis.count += 1;
            }
        }

        if let Some(contents) = ordering.contents.as_ref() {
            for element in &contents.element {
                let key = self.target_uuid(self.entry(element.key.as_ref()));
                let value = self.target_uuid(self.entry(element.value.as_ref()));
                if let (Some(key), Some(value)) = (key, value) {
                    if let Some(&slot) = axis.indices.get(&key) {
                        axis.indices.insert(value, slot);
                    }
                }
            }
        }
        axis
    }

    fn direction_value(entry: &MergeableDataObjectEntry) -> Option<&str> {
        let from_map = entry
            .custom_map
            .as_ref()
            .and_then(|m| m.map_entry.first())
            .and_then(|e| e.value.as_ref())
            .map(|v| v.string_value.as_str());
        let from_register = entry
            .register_latest
            .as_ref()
            .and_then(|r| r.contents.as_ref())
            .map(|v| v.string_value.as_str());
        from_map
            .filter(|s| !s.is_empty())
            .or(from_register.filter(|s| !s.is_empty()))
    }

    /// Direction via the root's pointer, else any map whose first key is
    /// the direction key's self-reference.
    fn direction(&self, pointer: Option<&'a MergeableDataObjectEntry>) -> TableDirection {
        let direct = pointer.and_then(Self::direction_value);
        let scanned = || {
            let self_key = i32::try_from(self.key_index(KEY_DIRECTION)? + 1).ok()?;
            self.entries.iter().find_map(|entry| {
                let first = entry.custom_map.as_ref()?.map_entry.first()?;
                if first.key == self_key {
                    Self::direction_value(entry)
                } else {
                    None
                }
            })
        };

        match direct.or_else(scanned) {
            Some(DIRECTION_RIGHT_TO_LEFT) => TableDirection::RightToLeft,
            _ => TableDirection::LeftToRight,
        }
    }
}

/// Rebuild a table from its gzip-compressed mergeable data.
///
/// Cell documents go through [`render_document`] with the same resolver, and
/// whatever objects they contain end up in [`Table::secondary_objects`].
pub fn reconstruct_table<R: ObjectResolver>(
    compressed: &[u8],
    resolver: &mut R,
) -> Result<Table<R::Object>> {
    let inflated = gunzip(compressed)?;
    reconstruct_table_from_protobuf(&inflated, resolver)
}

/// Rebuild a table from already-inflated mergeable data.
pub fn reconstruct_table_from_protobuf<R: ObjectResolver>(
    bytes: &[u8],
    resolver: &mut R,
) -> Result<Table<R::Object>> {
    let proto = MergableDataProto::decode(bytes)?;
    let object = proto
        .mergable_data_object
        .ok_or_else(|| Error::UnexpectedShape("Mergeable data without object".to_string()))?;
    let data = object
        .mergeable_data_object_data
        .ok_or_else(|| Error::UnexpectedShape("Mergeable object without data".to_string()))?;

    let graph = ObjectGraph {
        entries: &data.mergeable_data_object_entry,
        keys: &data.mergeable_data_object_key_item,
        types: &data.mergeable_data_object_type_item,
        uuids: &data.mergeable_data_object_uuid_item,
    };

    let root = graph
        .root()
        .and_then(|e| e.custom_map.as_ref())
        .ok_or_else(|| Error::MissingCrossReference(format!("No {} root entry", TABLE_TYPE_MARKER)))?;

    let mut rows = AxisMap::default();
    let mut columns = AxisMap::default();
    let mut cells = None;
    let mut direction_pointer = None;

    for map_entry in &root.map_entry {
        let target = graph.entry(map_entry.value.as_ref());
        match graph.key_name(map_entry.key) {
            Some(KEY_ROWS) => rows = graph.axis(target),
            Some(KEY_COLUMNS) => columns = graph.axis(target),
            Some(KEY_CELLS) => cells = target,
            Some(KEY_DIRECTION) => direction_pointer = target,
            other => tracing::debug!("Ignoring table key {:?}", other),
        }
    }

    let mut grid = vec![vec![TableCell::default(); columns.count]; rows.count];
    let mut secondary_objects = Vec::new();

    let column_elements = cells
        .and_then(|c| c.dictionary.as_ref())
        .map(|d| d.element.as_slice())
        .unwrap_or_default();

    for column in column_elements {
        let Some(column_uuid) = graph.target_uuid(graph.entry(column.key.as_ref())) else {
            continue;
        };
        let Some(row_dictionary) = graph
            .entry(column.value.as_ref())
            .and_then(|e| e.dictionary.as_ref())
        else {
            continue;
        };

        for row in &row_dictionary.element {
            let Some(row_uuid) = graph.target_uuid(graph.entry(row.key.as_ref())) else {
                continue;
            };
            let Some(note) = graph.entry(row.value.as_ref()).and_then(|e| e.note.as_ref()) else {
                continue;
            };

            let (Some(&r), Some(&c)) = (rows.indices.get(&row_uuid), columns.indices.get(&column_uuid))
            else {
                tracing::debug!("Dropping cell with unresolved row {} / column {}", row_uuid, column_uuid);
                continue;
            };
            if r >= rows.count || c >= columns.count {
                tracing::debug!("Dropping out-of-range cell ({}, {})", r, c);
                continue;
            }

            let document = Document::from_note(note.clone(), object.version);
            let rendered = render_document(&document, resolver);
            grid[r][c] = TableCell {
                plaintext: rendered.plaintext,
                html: rendered.html,
            };
            secondary_objects.extend(rendered.objects);
        }
    }

    let direction = graph.direction(direction_pointer);
    if direction == TableDirection::RightToLeft {
        for row in &mut grid {
            row.reverse();
        }
    }

    tracing::debug!(
        "Reconstructed {}x{} table ({:?})",
        rows.count,
        columns.count,
        direction
    );

    Ok(Table {
        rows: grid,
        direction,
        secondary_objects,
    })
}
