//! Note document and mergeable-data protobuf definitions
//!
//! These types mirror the message layout Apple Notes writes into
//! `ZICNOTEDATA.ZDATA` (note documents) and `ZMERGEABLEDATA1` (tables and
//! other object graphs). Field numbers were recovered from stored blobs;
//! there is no published `.proto`.
//!
//! The structs are written by hand with `prost` derives rather than
//! generated at build time, so no `protoc` is needed. Only fields the
//! reconstruction pipeline reads are declared; prost skips the rest.
//! Style attributes are `optional` because an absent value must differ
//! from zero.
//!
//! Behavior on top of these messages (style equality, HTML emission) lives
//! in [`crate::document`] and [`crate::render`], not here.

#![allow(missing_docs)]

use prost::Message;

// ============================================================================
// Note documents
// ============================================================================

/// Outer wrapper of a note document blob.
#[derive(Clone, PartialEq, Message)]
pub struct NoteStoreProto {
    #[prost(message, optional, tag = "2")]
    pub document: Option<Document>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Document {
    #[prost(int32, tag = "2")]
    pub version: i32,
    #[prost(message, optional, tag = "3")]
    pub note: Option<Note>,
}

/// Flat text buffer plus the style runs covering it.
#[derive(Clone, PartialEq, Message)]
pub struct Note {
    #[prost(string, tag = "2")]
    pub note_text: String,
    #[prost(message, repeated, tag = "5")]
    pub attribute_run: Vec<AttributeRun>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AttributeRun {
    #[prost(int32, tag = "1")]
    pub length: i32,
    #[prost(message, optional, tag = "2")]
    pub paragraph_style: Option<ParagraphStyle>,
    #[prost(message, optional, tag = "3")]
    pub font: Option<Font>,
    #[prost(int32, optional, tag = "5")]
    pub font_weight: Option<i32>,
    #[prost(int32, optional, tag = "6")]
    pub underlined: Option<i32>,
    #[prost(int32, optional, tag = "7")]
    pub strikethrough: Option<i32>,
    #[prost(int32, optional, tag = "8")]
    pub superscript: Option<i32>,
    #[prost(string, optional, tag = "9")]
    pub link: Option<String>,
    #[prost(message, optional, tag = "10")]
    pub color: Option<Color>,
    #[prost(message, optional, tag = "12")]
    pub attachment_info: Option<AttachmentInfo>,
    #[prost(int32, optional, tag = "13")]
    pub unknown_identifier: Option<i32>,
    #[prost(int32, optional, tag = "14")]
    pub emphasis_style: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParagraphStyle {
    #[prost(int32, optional, tag = "1")]
    pub style_type: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub alignment: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub indent_amount: Option<i32>,
    #[prost(message, optional, tag = "5")]
    pub checklist: Option<Checklist>,
    #[prost(int32, optional, tag = "8")]
    pub block_quote: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Checklist {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(int32, tag = "2")]
    pub done: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Font {
    #[prost(string, optional, tag = "1")]
    pub font_name: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub point_size: Option<f32>,
    #[prost(int32, optional, tag = "3")]
    pub font_hints: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Color {
    #[prost(float, tag = "1")]
    pub red: f32,
    #[prost(float, tag = "2")]
    pub green: f32,
    #[prost(float, tag = "3")]
    pub blue: f32,
    #[prost(float, tag = "4")]
    pub alpha: f32,
}

#[derive(Clone, PartialEq, Message)]
pub struct AttachmentInfo {
    #[prost(string, optional, tag = "1")]
    pub attachment_identifier: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub type_uti: Option<String>,
}

// ============================================================================
// Mergeable data (index-addressed object graphs)
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct MergableDataProto {
    #[prost(message, optional, tag = "2")]
    pub mergable_data_object: Option<MergableDataObject>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MergableDataObject {
    #[prost(int32, tag = "2")]
    pub version: i32,
    #[prost(message, optional, tag = "3")]
    pub mergeable_data_object_data: Option<MergeableDataObjectData>,
}

/// Flat arrays every cross reference in the graph indexes into.
#[derive(Clone, PartialEq, Message)]
pub struct MergeableDataObjectData {
    #[prost(message, repeated, tag = "3")]
    pub mergeable_data_object_entry: Vec<MergeableDataObjectEntry>,
    #[prost(string, repeated, tag = "4")]
    pub mergeable_data_object_key_item: Vec<String>,
    #[prost(string, repeated, tag = "5")]
    pub mergeable_data_object_type_item: Vec<String>,
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub mergeable_data_object_uuid_item: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MergeableDataObjectEntry {
    #[prost(message, optional, tag = "1")]
    pub register_latest: Option<RegisterLatest>,
    #[prost(message, optional, tag = "6")]
    pub dictionary: Option<Dictionary>,
    #[prost(message, optional, tag = "10")]
    pub note: Option<Note>,
    #[prost(message, optional, tag = "13")]
    pub custom_map: Option<MergeableDataObjectMap>,
    #[prost(message, optional, tag = "16")]
    pub ordered_set: Option<OrderedSet>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RegisterLatest {
    #[prost(message, optional, tag = "2")]
    pub contents: Option<ObjectId>,
}

/// Typed scalar or pointer into the entry array.
#[derive(Clone, PartialEq, Message)]
pub struct ObjectId {
    #[prost(uint64, tag = "2")]
    pub unsigned_integer_value: u64,
    #[prost(string, tag = "4")]
    pub string_value: String,
    #[prost(int32, tag = "6")]
    pub object_index: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct MapEntry {
    #[prost(int32, tag = "1")]
    pub key: i32,
    #[prost(message, optional, tag = "2")]
    pub value: Option<ObjectId>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MergeableDataObjectMap {
    #[prost(int32, tag = "1")]
    pub map_type: i32,
    #[prost(message, repeated, tag = "3")]
    pub map_entry: Vec<MapEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Dictionary {
    #[prost(message, repeated, tag = "1")]
    pub element: Vec<DictionaryElement>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DictionaryElement {
    #[prost(message, optional, tag = "1")]
    pub key: Option<ObjectId>,
    #[prost(message, optional, tag = "2")]
    pub value: Option<ObjectId>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OrderedSet {
    #[prost(message, optional, tag = "1")]
    pub ordering: Option<OrderedSetOrdering>,
    #[prost(message, optional, tag = "2")]
    pub elements: Option<Dictionary>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OrderedSetOrdering {
    #[prost(message, optional, tag = "1")]
    pub array: Option<OrderedSetOrderingArray>,
    #[prost(message, optional, tag = "2")]
    pub contents: Option<Dictionary>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OrderedSetOrderingArray {
    #[prost(message, optional, tag = "1")]
    pub contents: Option<Note>,
    #[prost(message, repeated, tag = "2")]
    pub attachment: Vec<OrderedSetOrderingArrayAttachment>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OrderedSetOrderingArrayAttachment {
    #[prost(int32, tag = "1")]
    pub index: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub uuid: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_style_presence_survives_decode() {
        let run = AttributeRun {
            length: 3,
            font_weight: Some(0),
            superscript: Some(-1),
            ..Default::default()
        };
        let decoded = AttributeRun::decode(run.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.font_weight, Some(0));
        assert_eq!(decoded.superscript, Some(-1));
        assert_eq!(decoded.underlined, None);
    }
}
