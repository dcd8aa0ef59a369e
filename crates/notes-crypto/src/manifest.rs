//! Backup manifest property list
//!
//! An encrypted backup's `Manifest.plist` carries the keybag and the wrapped
//! key of the manifest database.

use crate::cancel::CancelToken;
use crate::decrypter::PasswordList;
use crate::keybag::Keybag;
use crate::{Error, Result};
use std::io::Cursor;
use std::path::Path;
use zeroize::Zeroizing;

/// Length of the wrapped manifest database key following the class id
pub const MANIFEST_KEY_LEN: usize = 40;

/// Decoded backup manifest
#[derive(Debug)]
pub struct ManifestPlist {
    /// `IsEncrypted`
    pub is_encrypted: bool,
    /// Protection class protecting the manifest database key
    pub manifest_key_class: Option<u32>,
    /// Wrapped manifest database key
    pub manifest_key: Option<Vec<u8>>,
    /// Parsed `BackupKeyBag`, present for encrypted backups
    pub keybag: Option<Keybag>,
}

impl ManifestPlist {
    /// Read and parse a manifest file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let value = plist::Value::from_file(path.as_ref())?;
        Self::from_value(&value)
    }

    /// Parse manifest bytes (binary or XML property list)
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value = plist::Value::from_reader(Cursor::new(bytes))?;
        Self::from_value(&value)
    }

    fn from_value(value: &plist::Value) -> Result<Self> {
        let dict = value
            .as_dictionary()
            .ok_or_else(|| Error::Manifest("Manifest root is not a dictionary".to_string()))?;

        let is_encrypted = dict
            .get("IsEncrypted")
            .and_then(plist::Value::as_boolean)
            .unwrap_or(false);

        if !is_encrypted {
            return Ok(Self {
                is_encrypted,
                manifest_key_class: None,
                manifest_key: None,
                keybag: None,
            });
        }

        let manifest_key = dict
            .get("ManifestKey")
            .and_then(plist::Value::as_data)
            .ok_or_else(|| Error::Manifest("Encrypted manifest lacks ManifestKey".to_string()))?;
        if manifest_key.len() < 4 {
            return Err(Error::Manifest("ManifestKey too short".to_string()));
        }
        let class_bytes: [u8; 4] = manifest_key[..4]
            .try_into()
            .map_err(|_| Error::Manifest("ManifestKey too short".to_string()))?;
        let key_end = manifest_key.len().min(4 + MANIFEST_KEY_LEN);

        let keybag_bytes = dict
            .get("BackupKeyBag")
            .and_then(plist::Value::as_data)
            .ok_or_else(|| Error::Manifest("Encrypted manifest lacks BackupKeyBag".to_string()))?;

        Ok(Self {
            is_encrypted,
            manifest_key_class: Some(u32::from_le_bytes(class_bytes)),
            manifest_key: Some(manifest_key[4..key_end].to_vec()),
            keybag: Some(Keybag::parse(keybag_bytes)?),
        })
    }

    /// Unlock the embedded keybag. Unencrypted manifests report `true`.
    pub fn unlock(&mut self, passwords: &PasswordList, cancel: &CancelToken) -> Result<bool> {
        match self.keybag.as_mut() {
            Some(keybag) => keybag.unlock(passwords, cancel),
            None => Ok(!self.is_encrypted),
        }
    }

    /// True when the manifest database key can be recovered
    pub fn can_decrypt(&self) -> bool {
        self.keybag.as_ref().is_some_and(Keybag::is_unlocked)
    }

    /// Unwrap the manifest database key with its protection class key.
    pub fn manifest_db_key(&self) -> Option<Zeroizing<Vec<u8>>> {
        let keybag = self.keybag.as_ref()?;
        keybag.unwrap_with_class(self.manifest_key_class?, self.manifest_key.as_ref()?)
    }
}
