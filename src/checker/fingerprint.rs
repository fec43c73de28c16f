//! Cache keys for compiled checkers.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::context::ContextTag;
use crate::location::LocationKey;

/// Key over location identity, effective properties and the building context.
pub fn checker_fingerprint(location: &LocationKey, properties: &BTreeMap<String, String>, context: &ContextTag) -> String {
    let mut hasher = Sha256::new();
    hasher.update(location.kind.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(location.raw_location.as_bytes());
    hasher.update([0]);
    for (name, value) in properties {
        hasher.update(name.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.as_bytes());
        hasher.update([0]);
    }
    hasher.update(context.id.as_bytes());
    hasher.update(context.generation.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Digest of the document a checker was compiled from.
pub fn content_fingerprint(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
