//! Gallery membership from mergeable data

use crate::decompress::gunzip;
use crate::proto_types::MergableDataProto;
use crate::Result;
use prost::Message;

/// Identifiers of the items of a gallery, in stored order.
///
/// Every custom-map entry whose first value carries a string names one
/// child object by its `ZIDENTIFIER`.
pub fn gallery_children(compressed: &[u8]) -> Result<Vec<String>> {
    let inflated = gunzip(compressed)?;
    let proto = MergableDataProto::decode(inflated.as_slice())?;

    let children = proto
        .mergable_data_object
        .and_then(|o| o.mergeable_data_object_data)
        .map(|data| {
            data.mergeable_data_object_entry
                .into_iter()
                .filter_map(|entry| {
                    let first = entry.custom_map?.map_entry.into_iter().next()?;
                    let identifier = first.value?.string_value;
                    (!identifier.is_empty()).then_some(identifier)
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto_types::{
        MapEntry, MergableDataObject, MergeableDataObjectData, MergeableDataObjectEntry,
        MergeableDataObjectMap, ObjectId,
    };
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn entry(value: ObjectId) -> MergeableDataObjectEntry {
        MergeableDataObjectEntry {
            custom_map: Some(MergeableDataObjectMap {
                map_type: 0,
                map_entry: vec![MapEntry { key: 0, value: Some(value) }],
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_children_in_order() {
        let named = |s: &str| {
            entry(ObjectId {
                string_value: s.to_string(),
                ..Default::default()
            })
        };
        let proto = MergableDataProto {
            mergable_data_object: Some(MergableDataObject {
                version: 1,
                mergeable_data_object_data: Some(MergeableDataObjectData {
                    mergeable_data_object_entry: vec![
                        named("IMG-1"),
                        entry(ObjectId {
                            unsigned_integer_value: 3,
                            ..Default::default()
                        }),
                        MergeableDataObjectEntry::default(),
                        named("IMG-2"),
                    ],
                    ..Default::default()
                }),
            }),
        };
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&proto.encode_to_vec()).unwrap();
        let compressed = gz.finish().unwrap();

        assert_eq!(gallery_children(&compressed).unwrap(), vec!["IMG-1", "IMG-2"]);
    }

    #[test]
    fn test_rejects_uncompressed() {
        assert!(gallery_children(b"plain").is_err());
    }
}
