//! Content digest
//!
//! SHA-256 rendered as lowercase hex. The digest doubles as the
//! deduplication key and as the last component of a storage key.

use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::{self, Read};

/// Bytes fed to the hasher per update
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    /// Hex length of a SHA-256 digest
    pub const HEX_LEN: usize = 64;

    /// Compute the digest of `content`, hashing it incrementally
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = DigestHasher::new();
        for chunk in content.chunks(CHUNK_SIZE) {
            hasher.update(chunk);
        }
        hasher.finish()
    }

    /// Digest of everything `reader` yields, without buffering it whole
    pub fn from_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut hasher = DigestHasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => return Ok(hasher.finish()),
                Ok(n) => hasher.update(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Incremental digest for content that arrives in pieces
#[derive(Clone, Default)]
pub struct DigestHasher(Sha256);

impl DigestHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    pub fn finish(self) -> Digest {
        Digest(format!("{:x}", self.0.finalize()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest as _;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            Digest::of(b"hello").as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_lowercase_hex() {
        let digest = Digest::of(b"porter");
        assert_eq!(digest.as_str().len(), Digest::HEX_LEN);
        assert!(
            digest
                .as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn test_chunking_does_not_change_digest() {
        // Larger than one chunk, so several updates are fed to the hasher
        let content = vec![7u8; CHUNK_SIZE * 3 + 17];
        let expected = format!("{:x}", Sha256::digest(&content));
        assert_eq!(Digest::of(&content).as_str(), expected);
    }

    #[test]
    fn test_from_reader_matches_in_memory() {
        let content: Vec<u8> = (0..CHUNK_SIZE * 2 + 5).map(|i| (i % 251) as u8).collect();
        let streamed = Digest::from_reader(std::io::Cursor::new(&content)).unwrap();
        assert_eq!(streamed, Digest::of(&content));
        assert_eq!(Digest::from_reader(std::io::empty()).unwrap(), Digest::of(b""));
    }

    #[test]
    fn test_hasher_split_points_do_not_matter() {
        let mut hasher = DigestHasher::new();
        hasher.update(b"hel");
        hasher.update(b"");
        hasher.update(b"lo");
        assert_eq!(hasher.finish(), Digest::of(b"hello"));
    }

    #[test]
    fn test_different_content_different_digest() {
        assert_ne!(Digest::of(b"a"), Digest::of(b"b"));
        assert_eq!(Digest::of(b"a"), Digest::of(b"a"));
    }
}
