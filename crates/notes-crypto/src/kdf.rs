//! Key derivation, key unwrap and authenticated decryption primitives
//!
//! Every function here reports a wrong key as `None` (or an `Err` for
//! parameter problems) so callers can move on to the next password
//! candidate without unwinding.

use crate::{Error, Result};
use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::{Aes128, Aes256};
use aes_gcm::{AesGcm, Nonce, Tag};
use aes_kw::{KekAes128, KekAes192, KekAes256};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Length of the key-encrypting key derived for a protected note
pub const NOTE_KEK_LEN: usize = 16;

/// Length of the keys derived while unlocking a backup keybag
pub const KEYBAG_KEY_LEN: usize = 32;

/// Integrity block prepended by RFC 3394 key wrap
pub const KEY_WRAP_OVERHEAD: usize = 8;

/// GCM authentication tag length
pub const GCM_TAG_LEN: usize = 16;

type Aes128Gcm12 = AesGcm<Aes128, U12>;
type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes256Gcm12 = AesGcm<Aes256, U12>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

fn check_params(iterations: u32, len: usize) -> Result<()> {
    if iterations == 0 {
        return Err(Error::KeyDerivation("Iteration count must be non-zero".to_string()));
    }
    if len == 0 {
        return Err(Error::KeyDerivation("Output length must be non-zero".to_string()));
    }
    Ok(())
}

/// PBKDF2-HMAC-SHA256 with a caller-chosen output length
pub fn pbkdf2_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    check_params(iterations, len)?;
    let mut out = Zeroizing::new(vec![0u8; len]);
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    Ok(out)
}

/// PBKDF2-HMAC-SHA1 with a caller-chosen output length
pub fn pbkdf2_sha1(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    check_params(iterations, len)?;
    let mut out = Zeroizing::new(vec![0u8; len]);
    pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut out);
    Ok(out)
}

/// Derive the 128-bit key-encrypting key for a password-protected note.
pub fn derive_note_kek(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<Vec<u8>>> {
    pbkdf2_sha256(password.as_bytes(), salt, iterations, NOTE_KEK_LEN)
}

/// RFC 3394 AES key unwrap.
///
/// Returns `None` when the integrity check fails, which is what a wrong
/// key-encrypting key looks like.
pub fn aes_key_unwrap(wrapped: &[u8], kek: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    if wrapped.len() < 3 * KEY_WRAP_OVERHEAD || wrapped.len() % KEY_WRAP_OVERHEAD != 0 {
        return None;
    }

    let mut out = Zeroizing::new(vec![0u8; wrapped.len() - KEY_WRAP_OVERHEAD]);
    let unwrapped = match kek.len() {
        16 => {
            let key: [u8; 16] = kek.try_into().ok()?;
            KekAes128::from(key).unwrap(wrapped, &mut out)
        }
        24 => {
            let key: [u8; 24] = kek.try_into().ok()?;
            KekAes192::from(key).unwrap(wrapped, &mut out)
        }
        32 => {
            let key: [u8; 32] = kek.try_into().ok()?;
            KekAes256::from(key).unwrap(wrapped, &mut out)
        }
        _ => return None,
    };

    unwrapped.ok().map(|_| out)
}

/// AES-GCM decrypt with a detached tag.
///
/// Accepts 128 or 256 bit keys and 12 or 16 byte IVs (notes use 16).
pub fn aes_gcm_decrypt(key: &[u8], iv: &[u8], tag: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
    if tag.len() != GCM_TAG_LEN {
        return None;
    }

    let tag = Tag::from_slice(tag);
    let mut buffer = ciphertext.to_vec();
    let result = match (key.len(), iv.len()) {
        (16, 16) => Aes128Gcm16::new_from_slice(key).ok()?.decrypt_in_place_detached(
            Nonce::<U16>::from_slice(iv),
            b"",
            &mut buffer,
            tag,
        ),
        (16, 12) => Aes128Gcm12::new_from_slice(key).ok()?.decrypt_in_place_detached(
            Nonce::<U12>::from_slice(iv),
            b"",
            &mut buffer,
            tag,
        ),
        (32, 16) => Aes256Gcm16::new_from_slice(key).ok()?.decrypt_in_place_detached(
            Nonce::<U16>::from_slice(iv),
            b"",
            &mut buffer,
            tag,
        ),
        (32, 12) => Aes256Gcm12::new_from_slice(key).ok()?.decrypt_in_place_detached(
            Nonce::<U12>::from_slice(iv),
            b"",
            &mut buffer,
            tag,
        ),
        _ => return None,
    };

    result.ok().map(|_| buffer)
}
