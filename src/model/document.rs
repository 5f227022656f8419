//! `DocumentId` (§3 supplement): a hash of the source markdown bytes,
//! letting the controller tell "same document reloaded" apart from "a new
//! document". Grounded on the teacher's own `cache.rs::hash_dir`, which
//! identifies a document by hashing its path; here the hash covers the
//! document's content instead, since a reader's source may come from
//! stdin or an editor buffer with no stable path at all.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn from_source(source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_source_produces_the_same_id() {
        assert_eq!(DocumentId::from_source("Hello world."), DocumentId::from_source("Hello world."));
    }

    #[test]
    fn different_source_produces_a_different_id() {
        assert_ne!(DocumentId::from_source("Hello world."), DocumentId::from_source("Goodbye world."));
    }
}
