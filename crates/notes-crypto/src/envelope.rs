//! Wrapped-key envelope attached to a protected note or attachment

/// Everything needed to decrypt one protected payload once the right
/// password is known.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct CryptoEnvelope {
    /// GCM initialization vector
    pub iv: Vec<u8>,
    /// GCM authentication tag
    pub tag: Vec<u8>,
    /// PBKDF2 salt
    pub salt: Vec<u8>,
    /// PBKDF2 iteration count
    pub iterations: u32,
    /// RFC 3394 wrapped content key
    pub wrapped_key: Vec<u8>,
    /// IV for a secondary asset (media file, fallback image)
    pub fallback_iv: Option<Vec<u8>>,
    /// Tag for a secondary asset
    pub fallback_tag: Option<Vec<u8>>,
}

impl CryptoEnvelope {
    /// Create an envelope for a primary payload.
    pub fn new(iv: Vec<u8>, tag: Vec<u8>, salt: Vec<u8>, iterations: u32, wrapped_key: Vec<u8>) -> Self {
        Self {
            iv,
            tag,
            salt,
            iterations,
            wrapped_key,
            fallback_iv: None,
            fallback_tag: None,
        }
    }

    /// Attach the IV/tag pair used by a secondary asset.
    pub fn with_fallback(mut self, iv: Vec<u8>, tag: Vec<u8>) -> Self {
        self.fallback_iv = Some(iv);
        self.fallback_tag = Some(tag);
        self
    }

    /// Envelope for the secondary asset: same key material, fallback IV/tag.
    ///
    /// Returns `None` if no fallback pair was recorded.
    pub fn for_asset(&self) -> Option<Self> {
        Some(Self {
            iv: self.fallback_iv.clone()?,
            tag: self.fallback_tag.clone()?,
            salt: self.salt.clone(),
            iterations: self.iterations,
            wrapped_key: self.wrapped_key.clone(),
            fallback_iv: None,
            fallback_tag: None,
        })
    }

    /// True when all fields needed for decryption are present.
    pub fn is_complete(&self) -> bool {
        !self.iv.is_empty()
            && !self.tag.is_empty()
            && !self.salt.is_empty()
            && self.iterations > 0
            && !self.wrapped_key.is_empty()
    }
}

impl std::fmt::Debug for CryptoEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEnvelope")
            .field("iv", &hex::encode(&self.iv))
            .field("salt", &hex::encode(&self.salt))
            .field("iterations", &self.iterations)
            .field("wrapped_key_len", &self.wrapped_key.len())
            .field("has_fallback", &self.fallback_iv.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_asset_swaps_iv_and_tag() {
        let envelope = CryptoEnvelope::new(vec![1; 16], vec![2; 16], vec![3; 16], 20_000, vec![4; 24])
            .with_fallback(vec![5; 16], vec![6; 16]);
        let asset = envelope.for_asset().unwrap();
        assert_eq!(asset.iv, vec![5; 16]);
        assert_eq!(asset.tag, vec![6; 16]);
        assert_eq!(asset.salt, envelope.salt);
        assert!(asset.for_asset().is_none());
    }

    #[test]
    fn test_incomplete_envelope() {
        let envelope = CryptoEnvelope::new(vec![1; 16], vec![], vec![3; 16], 1, vec![4; 24]);
        assert!(!envelope.is_complete());
        assert!(!CryptoEnvelope::default().is_complete());
    }
}
