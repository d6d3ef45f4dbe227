//! Secret key handling.
//!
//! Configured secrets are plain strings. [`key_pairs`] turns them into raw byte keys
//! and [`KeyPair::from_keys`] groups those keys as `(auth, encryption)` pairs, one
//! pair per rotation generation: the first pair encodes new cookies, every pair is
//! tried when decoding.

/// Converts configured secrets to raw byte keys, preserving order.
///
/// No length or entropy checks are made: a short secret gives a weak cookie, not an error.
pub fn key_pairs(src: &[String]) -> Vec<Vec<u8>> {
    src.iter().map(|s| s.as_bytes().to_vec()).collect()
}

/// One signing key with an optional encryption key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    pub auth: Vec<u8>,
    pub encryption: Option<Vec<u8>>,
}

impl KeyPair {
    /// Groups raw keys in pairs. A trailing odd key becomes a signing-only pair.
    pub fn from_keys(keys: &[Vec<u8>]) -> Vec<KeyPair> {
        keys.chunks(2)
            .map(|chunk| KeyPair {
                auth: chunk[0].clone(),
                encryption: chunk.get(1).filter(|k| !k.is_empty()).cloned(),
            })
            .collect()
    }
}
