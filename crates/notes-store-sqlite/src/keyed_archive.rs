//! Keyed-archive record values
//!
//! Notes whose latest cloud changes were not yet merged keep their crypto
//! fields in a keyed archive: `$top.root` → `ValueStore` → `RecordValues`,
//! an archived dictionary of parallel `NS.keys` / `NS.objects` arrays whose
//! members are UID references into `$objects`.

use crate::{Error, Result};
use notes_crypto::CryptoEnvelope;
use plist::{Dictionary, Value};
use std::collections::HashMap;
use std::io::Cursor;

const NULL_OBJECT: &str = "$null";

/// Decoded `RecordValues` of one keyed archive
#[derive(Debug, Clone, Default)]
pub struct RecordValues {
    values: HashMap<String, Value>,
}

impl RecordValues {
    /// Parse an archive blob
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let top = Value::from_reader(Cursor::new(bytes))?;
        let archive = top
            .as_dictionary()
            .ok_or_else(|| Error::Validation("Keyed archive root is not a dictionary".to_string()))?;
        let objects = archive
            .get("$objects")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Validation("Keyed archive lacks $objects".to_string()))?;
        let root = archive
            .get("$top")
            .and_then(Value::as_dictionary)
            .and_then(|t| t.get("root"))
            .ok_or_else(|| Error::Validation("Keyed archive lacks $top.root".to_string()))?;

        let resolver = Archive { objects };
        let record_values = resolver
            .dictionary(root)
            .and_then(|d| resolver.dictionary(d.get("ValueStore")?))
            .and_then(|d| resolver.dictionary(d.get("RecordValues")?))
            .ok_or_else(|| Error::NotFound("ValueStore.RecordValues".to_string()))?;

        let keys = record_values.get("NS.keys").and_then(Value::as_array);
        let vals = record_values.get("NS.objects").and_then(Value::as_array);
        let (keys, vals) = match (keys, vals) {
            (Some(k), Some(v)) => (k, v),
            _ => return Err(Error::Validation("RecordValues is not an archived dictionary".to_string())),
        };

        let mut values = HashMap::new();
        for (key, value) in keys.iter().zip(vals) {
            let key = resolver.resolve(key).and_then(Value::as_string);
            let value = resolver.resolve(value);
            if let (Some(key), Some(value)) = (key, value) {
                if value.as_string() != Some(NULL_OBJECT) {
                    values.insert(key.to_string(), value.clone());
                }
            }
        }
        tracing::debug!("Keyed archive carries {} record values", values.len());
        Ok(Self { values })
    }

    /// Raw value for `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Bytes for `key`, unwrapping archived `NS.data` containers
    pub fn data(&self, key: &str) -> Option<&[u8]> {
        match self.values.get(key)? {
            Value::Data(bytes) => Some(bytes.as_slice()),
            Value::Dictionary(d) => d.get("NS.data").and_then(Value::as_data),
            _ => None,
        }
    }

    /// Integer for `key`
    pub fn integer(&self, key: &str) -> Option<i64> {
        let value = self.values.get(key)?;
        value
            .as_signed_integer()
            .or_else(|| value.as_unsigned_integer().and_then(|u| i64::try_from(u).ok()))
    }

    /// Encrypted payload stored under `EncryptedValues`
    pub fn encrypted_values(&self) -> Option<&[u8]> {
        self.data("EncryptedValues")
    }

    /// Envelope built from the `Crypto*` values, if all are present
    pub fn envelope(&self) -> Option<CryptoEnvelope> {
        let iterations = u32::try_from(self.integer("CryptoIterationCount")?).ok()?;
        let envelope = CryptoEnvelope::new(
            self.data("CryptoInitializationVector")?.to_vec(),
            self.data("CryptoTag")?.to_vec(),
            self.data("CryptoSalt")?.to_vec(),
            iterations,
            self.data("CryptoWrappedKey")?.to_vec(),
        );
        envelope.is_complete().then_some(envelope)
    }
}

struct Archive<'a> {
    objects: &'a [Value],
}

impl<'a> Archive<'a> {
    /// Follow a UID reference; plain values resolve to themselves
    fn resolve(&self, value: &'a Value) -> Option<&'a Value> {
        match value {
            Value::Uid(uid) => self.objects.get(usize::try_from(uid.get()).ok()?),
            other => Some(other),
        }
    }

    fn dictionary(&self, value: &'a Value) -> Option<&'a Dictionary> {
        self.resolve(value)?.as_dictionary()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use plist::Uid;

    /// Archive with `RecordValues` holding `entries`
    pub(crate) fn archive(entries: &[(&str, Value)]) -> Vec<u8> {
        let mut objects = vec![Value::String(NULL_OBJECT.to_string())];
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        for (key, value) in entries {
            objects.push(Value::String(key.to_string()));
            keys.push(Value::Uid(Uid::new(objects.len() as u64 - 1)));
            objects.push(value.clone());
            vals.push(Value::Uid(Uid::new(objects.len() as u64 - 1)));
        }

        let mut record_values = Dictionary::new();
        record_values.insert("NS.keys".to_string(), Value::Array(keys));
        record_values.insert("NS.objects".to_string(), Value::Array(vals));
        objects.push(Value::Dictionary(record_values));
        let record_uid = objects.len() as u64 - 1;

        let mut value_store = Dictionary::new();
        value_store.insert("RecordValues".to_string(), Value::Uid(Uid::new(record_uid)));
        objects.push(Value::Dictionary(value_store));
        let store_uid = objects.len() as u64 - 1;

        let mut root = Dictionary::new();
        root.insert("ValueStore".to_string(), Value::Uid(Uid::new(store_uid)));
        objects.push(Value::Dictionary(root));
        let root_uid = objects.len() as u64 - 1;

        let mut top = Dictionary::new();
        top.insert("root".to_string(), Value::Uid(Uid::new(root_uid)));
        let mut archive = Dictionary::new();
        archive.insert("$archiver".to_string(), Value::String("NSKeyedArchiver".to_string()));
        archive.insert("$objects".to_string(), Value::Array(objects));
        archive.insert("$top".to_string(), Value::Dictionary(top));

        let mut out = Vec::new();
        plist::to_writer_binary(&mut out, &Value::Dictionary(archive)).unwrap();
        out
    }

    #[test]
    fn test_envelope_from_record_values() {
        let bytes = archive(&[
            ("CryptoInitializationVector", Value::Data(vec![1; 16])),
            ("CryptoTag", Value::Data(vec![2; 16])),
            ("CryptoSalt", Value::Data(vec![3; 16])),
            ("CryptoIterationCount", Value::from(20_000i64)),
            ("CryptoWrappedKey", Value::Data(vec![4; 24])),
            ("EncryptedValues", Value::Data(vec![5; 8])),
        ]);
        let values = RecordValues::parse(&bytes).unwrap();
        let envelope = values.envelope().unwrap();
        assert_eq!(envelope.iv, vec![1; 16]);
        assert_eq!(envelope.iterations, 20_000);
        assert_eq!(envelope.wrapped_key, vec![4; 24]);
        assert_eq!(values.encrypted_values(), Some(&[5u8; 8][..]));
    }

    #[test]
    fn test_incomplete_values_yield_no_envelope() {
        let bytes = archive(&[
            ("CryptoTag", Value::Data(vec![2; 16])),
            ("CryptoSalt", Value::String(NULL_OBJECT.to_string())),
        ]);
        let values = RecordValues::parse(&bytes).unwrap();
        assert!(values.get("CryptoSalt").is_none());
        assert!(values.envelope().is_none());
    }

    #[test]
    fn test_rejects_non_archive() {
        let mut out = Vec::new();
        plist::to_writer_binary(&mut out, &Value::Array(vec![])).unwrap();
        assert!(RecordValues::parse(&out).is_err());
        assert!(RecordValues::parse(b"not a plist").is_err());
    }
}
