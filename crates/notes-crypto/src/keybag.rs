//! Backup keybag parsing and unlocking
//!
//! A keybag is a flat sequence of `tag(4) | length(4, big-endian) | value`
//! records with no nesting. The first `UUID` names the keybag itself; every
//! later `UUID` starts a new protection class, and the `CLAS`, `KTYP`,
//! `WPKY` and `WRAP` records that follow belong to it.
//!
//! Unlocking is a two-stage PBKDF2: the password is first stretched with
//! HMAC-SHA256 over the double-protection salt (`DPSL`/`DPIC`), and that
//! result is stretched again with HMAC-SHA1 over `SALT`/`ITER`. The final key
//! unwraps each class key with RFC 3394.

use crate::cancel::CancelToken;
use crate::decrypter::PasswordList;
use crate::kdf::{aes_key_unwrap, pbkdf2_sha1, pbkdf2_sha256, KEYBAG_KEY_LEN};
use crate::{Error, Result};
use zeroize::Zeroizing;

/// Class key is wrapped with the device UID only
pub const WRAP_DEVICE: u32 = 1;

/// Class key is wrapped with the passcode-derived key
pub const WRAP_PASSCODE: u32 = 2;

const TLV_HEADER_LEN: usize = 8;

/// One encryption domain inside a keybag
#[derive(Clone, Default)]
pub struct ProtectionClass {
    /// Class UUID
    pub uuid: Vec<u8>,
    /// Protection class id (`CLAS`)
    pub class_id: Option<u32>,
    /// Wrap flags (`WRAP`)
    pub wrap: Option<u32>,
    /// Key type (`KTYP`)
    pub key_type: Option<u32>,
    /// Wrapped class key (`WPKY`)
    pub wrapped_key: Vec<u8>,
    unwrapped_key: Option<Zeroizing<Vec<u8>>>,
}

impl ProtectionClass {
    fn new(uuid: Vec<u8>) -> Self {
        Self {
            uuid,
            ..Self::default()
        }
    }

    /// True once the class key has been unwrapped
    pub fn is_unlocked(&self) -> bool {
        self.unwrapped_key.is_some()
    }

    /// The unwrapped class key, if unlocked
    pub fn unwrapped_key(&self) -> Option<&[u8]> {
        self.unwrapped_key.as_ref().map(|k| k.as_slice())
    }
}

impl std::fmt::Debug for ProtectionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectionClass")
            .field("uuid", &hex::encode(&self.uuid))
            .field("class_id", &self.class_id)
            .field("wrap", &self.wrap)
            .field("key_type", &self.key_type)
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

/// Parsed backup keybag
#[derive(Default)]
pub struct Keybag {
    /// Keybag format version (`VERS`)
    pub version: Option<u32>,
    /// Keybag HMAC (`HMCK`)
    pub hmac: Option<Vec<u8>>,
    /// Keybag type (`TYPE`)
    pub keybag_type: Option<u32>,
    /// Keybag UUID
    pub uuid: Option<Vec<u8>>,
    /// Keybag-level wrap value
    pub wrap: Option<Vec<u8>>,
    salt: Option<Vec<u8>>,
    iterations: Option<u32>,
    double_protection_salt: Option<Vec<u8>>,
    double_protection_iterations: Option<u32>,
    classes: Vec<ProtectionClass>,
    unlock_key: Option<Zeroizing<Vec<u8>>>,
}

fn read_u32(tag: &str, value: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = value
        .try_into()
        .map_err(|_| Error::Keybag(format!("{} must be 4 bytes, got {}", tag, value.len())))?;
    Ok(u32::from_be_bytes(bytes))
}

impl Keybag {
    /// Parse the TLV keybag blob.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut keybag = Keybag::default();
        let mut current: Option<ProtectionClass> = None;
        let mut offset = 0usize;

        while offset < bytes.len() {
            if bytes.len() - offset < TLV_HEADER_LEN {
                return Err(Error::Keybag(format!(
                    "Truncated record header at offset {}",
                    offset
                )));
            }

            let tag = String::from_utf8_lossy(&bytes[offset..offset + 4]).into_owned();
            let len_bytes: [u8; 4] = bytes[offset + 4..offset + 8]
                .try_into()
                .map_err(|_| Error::Keybag("Unreadable length".to_string()))?;
            let len = u32::from_be_bytes(len_bytes) as usize;
            offset += TLV_HEADER_LEN;

            if bytes.len() - offset < len {
                return Err(Error::Keybag(format!(
                    "Record {} claims {} bytes but only {} remain",
                    tag,
                    len,
                    bytes.len() - offset
                )));
            }
            let value = &bytes[offset..offset + len];
            offset += len;

            match tag.as_str() {
                "VERS" => keybag.version = Some(read_u32(&tag, value)?),
                "HMCK" => keybag.hmac = Some(value.to_vec()),
                "TYPE" => keybag.keybag_type = Some(read_u32(&tag, value)?),
                "SALT" => keybag.salt = Some(value.to_vec()),
                "ITER" => keybag.iterations = Some(read_u32(&tag, value)?),
                "DPSL" => keybag.double_protection_salt = Some(value.to_vec()),
                "DPIC" => keybag.double_protection_iterations = Some(read_u32(&tag, value)?),
                "UUID" => {
                    if keybag.uuid.is_none() {
                        keybag.uuid = Some(value.to_vec());
                    } else {
                        if let Some(class) = current.take() {
                            keybag.classes.push(class);
                        }
                        current = Some(ProtectionClass::new(value.to_vec()));
                    }
                }
                "WRAP" => match current.as_mut() {
                    Some(class) => class.wrap = Some(read_u32(&tag, value)?),
                    None if keybag.wrap.is_none() => keybag.wrap = Some(value.to_vec()),
                    None => tracing::debug!("Ignoring repeated keybag-level WRAP"),
                },
                "CLAS" | "KTYP" | "WPKY" => match current.as_mut() {
                    Some(class) => match tag.as_str() {
                        "CLAS" => class.class_id = Some(read_u32(&tag, value)?),
                        "KTYP" => class.key_type = Some(read_u32(&tag, value)?),
                        _ => class.wrapped_key = value.to_vec(),
                    },
                    None => tracing::warn!("Keybag record {} appears before any protection class", tag),
                },
                other => tracing::debug!("Skipping keybag record {}", other),
            }
        }

        if let Some(class) = current.take() {
            keybag.classes.push(class);
        }

        tracing::debug!(
            "Parsed keybag: version={:?}, classes={}",
            keybag.version,
            keybag.classes.len()
        );
        Ok(keybag)
    }

    /// True when both salt/iteration pairs are present.
    pub fn has_derivation_params(&self) -> bool {
        self.salt.is_some()
            && self.iterations.is_some()
            && self.double_protection_salt.is_some()
            && self.double_protection_iterations.is_some()
    }

    /// Protection classes in keybag order
    pub fn classes(&self) -> &[ProtectionClass] {
        &self.classes
    }

    /// Look up a class by its `CLAS` id
    pub fn class_by_id(&self, class_id: u32) -> Option<&ProtectionClass> {
        self.classes.iter().find(|c| c.class_id == Some(class_id))
    }

    /// True once a password has produced a working unlock key
    pub fn is_unlocked(&self) -> bool {
        self.unlock_key.is_some()
    }

    /// Derive the unlock key for one password.
    pub fn derive_unlock_key(&self, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        let (Some(salt), Some(iterations), Some(dp_salt), Some(dp_iterations)) = (
            self.salt.as_ref(),
            self.iterations,
            self.double_protection_salt.as_ref(),
            self.double_protection_iterations,
        ) else {
            return Err(Error::Keybag("Keybag lacks derivation parameters".to_string()));
        };

        let outer = pbkdf2_sha256(password.as_bytes(), dp_salt, dp_iterations, KEYBAG_KEY_LEN)?;
        pbkdf2_sha1(&outer, salt, iterations, KEYBAG_KEY_LEN)
    }

    /// Try each password until one unwraps at least one class key.
    ///
    /// Classes that do not unwrap stay locked. Returns `Ok(false)` if no
    /// candidate worked and `Err(Error::Cancelled)` if the token fires.
    pub fn unlock(&mut self, passwords: &PasswordList, cancel: &CancelToken) -> Result<bool> {
        if !self.has_derivation_params() {
            return Err(Error::Keybag("Keybag lacks derivation parameters".to_string()));
        }

        tracing::info!(
            "Checking {} passwords against keybag, each attempt is computationally expensive",
            passwords.len()
        );

        for password in passwords.iter() {
            cancel.check()?;

            let unlock_key = match self.derive_unlock_key(password) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!("Key derivation failed for candidate: {}", e);
                    continue;
                }
            };

            if self.unlock_with_key(unlock_key) {
                return Ok(true);
            }
        }

        tracing::warn!("No password candidate unlocked the keybag");
        Ok(false)
    }

    /// Unwrap every class with an already-derived unlock key.
    ///
    /// Keeps the key only if at least one class opened.
    pub fn unlock_with_key(&mut self, unlock_key: Zeroizing<Vec<u8>>) -> bool {
        let unwrapped: Vec<Option<Zeroizing<Vec<u8>>>> = self
            .classes
            .iter()
            .map(|class| aes_key_unwrap(&class.wrapped_key, &unlock_key))
            .collect();

        if unwrapped.iter().all(Option::is_none) {
            return false;
        }

        for (class, key) in self.classes.iter_mut().zip(unwrapped) {
            match key {
                Some(key) => {
                    tracing::debug!("Unwrapped key for protection class {:?}", class.class_id);
                    class.unwrapped_key = Some(key);
                }
                None => {
                    tracing::debug!("Protection class {:?} left locked", class.class_id);
                }
            }
        }
        self.unlock_key = Some(unlock_key);
        true
    }

    /// Unwrap a key that was wrapped with the given class key.
    pub fn unwrap_with_class(&self, class_id: u32, wrapped: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        let class_key = self.class_by_id(class_id)?.unwrapped_key()?;
        aes_key_unwrap(wrapped, class_key)
    }
}

impl std::fmt::Debug for Keybag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keybag")
            .field("version", &self.version)
            .field("keybag_type", &self.keybag_type)
            .field("classes", &self.classes)
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}
