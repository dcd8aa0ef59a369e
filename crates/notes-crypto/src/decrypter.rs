//! Password-based decryption of protected notes
//!
//! A protected note carries a [`CryptoEnvelope`]. For each password
//! candidate the session derives a key-encrypting key with
//! PBKDF2-HMAC-SHA256, unwraps the content key and then opens the payload
//! with AES-GCM. Passwords that worked once are tried first next time.
//!
//! The success cache lives inside a [`DecryptionSession`] value instead of a
//! process-wide global, so two backups opened in the same process never share
//! passwords by accident.

use crate::envelope::CryptoEnvelope;
use crate::kdf::{aes_gcm_decrypt, aes_key_unwrap, derive_note_kek};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use zeroize::Zeroizing;

/// Ordered list of password candidates.
#[derive(Default, Clone)]
pub struct PasswordList {
    passwords: Vec<Zeroizing<String>>,
}

impl PasswordList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one password per line. Line terminators are stripped and blank
    /// lines skipped; surrounding spaces are kept since they may be part of
    /// the password.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = Zeroizing::new(std::fs::read_to_string(path.as_ref())?);
        let mut list = Self::new();
        for line in contents.lines() {
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                list.add(line);
            }
        }
        tracing::debug!("Loaded {} password candidates", list.len());
        Ok(list)
    }

    /// Append a candidate, ignoring duplicates.
    pub fn add(&mut self, password: &str) {
        if !self.passwords.iter().any(|p| p.as_str() == password) {
            self.passwords.push(Zeroizing::new(password.to_string()));
        }
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.passwords.len()
    }

    /// True if there are no candidates
    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }

    /// Iterate candidates in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.passwords.iter().map(|p| p.as_str())
    }
}

impl<S: AsRef<str>> FromIterator<S> for PasswordList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        for password in iter {
            list.add(password.as_ref());
        }
        list
    }
}

impl std::fmt::Debug for PasswordList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordList").field("len", &self.len()).finish()
    }
}

/// Successful decryption
pub struct DecryptOutcome {
    /// Decrypted payload
    pub plaintext: Vec<u8>,
    /// Password that opened it
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for DecryptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptOutcome")
            .field("plaintext_len", &self.plaintext.len())
            .finish()
    }
}

/// One decryption session, scoped to a single backup or database.
pub struct DecryptionSession {
    candidates: PasswordList,
    successful: Mutex<Vec<Zeroizing<String>>>,
    warned_empty: AtomicBool,
}

impl DecryptionSession {
    /// Create a session over the given candidates
    pub fn new(candidates: PasswordList) -> Self {
        Self {
            candidates,
            successful: Mutex::new(Vec::new()),
            warned_empty: AtomicBool::new(false),
        }
    }

    /// Password candidates this session was created with
    pub fn candidates(&self) -> &PasswordList {
        &self.candidates
    }

    /// Number of distinct passwords that have worked so far
    pub fn successful_count(&self) -> usize {
        self.successful.lock().len()
    }

    /// Decrypt with the session's own candidate list.
    pub fn decrypt(&self, envelope: &CryptoEnvelope, ciphertext: &[u8]) -> Option<DecryptOutcome> {
        let candidates: Vec<&str> = self.candidates.iter().collect();
        self.decrypt_with_candidates(envelope, ciphertext, &candidates)
    }

    /// Decrypt trying cached passwords first, then `candidates` in order.
    ///
    /// Returns `None` if nothing works. Unwrap and cipher failures are
    /// treated as a wrong password and never surface as errors.
    pub fn decrypt_with_candidates(
        &self,
        envelope: &CryptoEnvelope,
        ciphertext: &[u8],
        candidates: &[&str],
    ) -> Option<DecryptOutcome> {
        let cached: Vec<Zeroizing<String>> = self.successful.lock().clone();

        if cached.is_empty() && candidates.is_empty() {
            if !self.warned_empty.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "Encrypted content found but no passwords were supplied, protected notes will stay locked"
                );
            }
            return None;
        }

        let ordered = cached
            .iter()
            .map(|p| p.as_str())
            .chain(candidates.iter().copied().filter(|c| !cached.iter().any(|p| p.as_str() == *c)));

        for password in ordered {
            if let Some(plaintext) = self.decrypt_with_password(password, envelope, ciphertext) {
                self.remember(password);
                return Some(DecryptOutcome {
                    plaintext,
                    password: Zeroizing::new(password.to_string()),
                });
            }
        }

        tracing::debug!("No password candidate opened envelope {:?}", envelope);
        None
    }

    /// Decrypt with one known password. Does not touch the cache.
    pub fn decrypt_with_password(
        &self,
        password: &str,
        envelope: &CryptoEnvelope,
        ciphertext: &[u8],
    ) -> Option<Vec<u8>> {
        let content_key = unwrap_content_key(password, envelope)?;
        let plaintext = aes_gcm_decrypt(&content_key, &envelope.iv, &envelope.tag, ciphertext);
        if plaintext.is_none() {
            tracing::debug!("Content key unwrapped but GCM authentication failed");
        }
        plaintext
    }

    /// Check whether `password` unwraps the envelope's key, caching it if so.
    pub fn check_password(&self, password: &str, envelope: &CryptoEnvelope) -> bool {
        let ok = unwrap_content_key(password, envelope).is_some();
        if ok {
            self.remember(password);
        }
        ok
    }

    fn remember(&self, password: &str) {
        let mut successful = self.successful.lock();
        if !successful.iter().any(|p| p.as_str() == password) {
            successful.push(Zeroizing::new(password.to_string()));
        }
    }
}

fn unwrap_content_key(password: &str, envelope: &CryptoEnvelope) -> Option<Zeroizing<Vec<u8>>> {
    let kek = match derive_note_kek(password, &envelope.salt, envelope.iterations) {
        Ok(kek) => kek,
        Err(Error::KeyDerivation(reason)) => {
            tracing::debug!("Skipping key derivation: {}", reason);
            return None;
        }
        Err(e) => {
            tracing::debug!("Unexpected key derivation failure: {}", e);
            return None;
        }
    };
    aes_key_unwrap(&envelope.wrapped_key, &kek)
}
