//! The encryption hook.
//!
//! The core never interprets credentials; it only threads an opaque pair of
//! callbacks through serialization and payload access. Key derivation and
//! cipher selection live in the host.

use crate::object::ObjectId;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// The cipher pair supplied by the host for encrypted documents.
pub trait Crypt {
    /// Encrypt the bytes belonging to the given object.
    fn encrypt(&self, id: ObjectId, data: &[u8]) -> Vec<u8>;

    /// Decrypt the bytes belonging to the given object.
    fn decrypt(&self, id: ObjectId, data: &[u8]) -> Vec<u8>;
}

/// Opaque per-document credentials, cheap to clone and pass through.
#[derive(Clone)]
pub struct CryptInfo(Arc<dyn Crypt>);

impl CryptInfo {
    /// Wrap a cipher pair.
    pub fn new(crypt: impl Crypt + 'static) -> Self {
        Self(Arc::new(crypt))
    }

    pub fn encrypt(&self, id: ObjectId, data: &[u8]) -> Vec<u8> {
        self.0.encrypt(id, data)
    }

    pub fn decrypt(&self, id: ObjectId, data: &[u8]) -> Vec<u8> {
        self.0.decrypt(id, data)
    }
}

impl Debug for CryptInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("CryptInfo")
    }
}
