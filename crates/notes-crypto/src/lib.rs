//! Cryptography for protected notes and encrypted backups
//!
//! Two encryption regimes show up when recovering note stores:
//!
//! - **Password-protected notes**: each note carries a wrapped content key.
//!   PBKDF2-HMAC-SHA256 over the note password yields a key-encrypting key,
//!   RFC 3394 unwraps the content key, and AES-GCM opens the payload.
//! - **Encrypted backups**: a keybag inside the backup manifest holds one
//!   wrapped key per protection class. A two-stage PBKDF2 (SHA256 then SHA1)
//!   over the backup password unwraps them.
//!
//! ## Security Features
//!
//! - **Zeroized secrets**: passwords and derived keys live in `Zeroizing` buffers
//! - **Scoped password cache**: successful passwords are remembered per session
//! - **Cancellable unlock**: keybag brute force checks a [`CancelToken`] between candidates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod decrypter;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keybag;
pub mod manifest;

pub use cancel::CancelToken;
pub use decrypter::{DecryptOutcome, DecryptionSession, PasswordList};
pub use envelope::CryptoEnvelope;
pub use error::{Error, Result};
pub use keybag::{Keybag, ProtectionClass, WRAP_DEVICE, WRAP_PASSCODE};
pub use manifest::ManifestPlist;
