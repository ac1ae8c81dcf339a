// Content-addressed media store
//
// The mirror's object-storage capability is deliberately small: store bytes,
// return a content address. Addresses are `sha256:<hex digest>` and map
// one-to-one onto files under the media root, so storing the same bytes twice
// is a no-op and addresses can be handed out before the ledger confirms a
// mint.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const ADDRESS_PREFIX: &str = "sha256:";

#[derive(Debug, Clone)]
pub enum MediaError {
    Io(String),
    NotFound(String),
    InvalidAddress(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::Io(msg) => write!(f, "media i/o error: {}", msg),
            MediaError::NotFound(addr) => write!(f, "no media stored at {}", addr),
            MediaError::InvalidAddress(addr) => write!(f, "invalid content address: {}", addr),
        }
    }
}

impl std::error::Error for MediaError {}

pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn open(root: &Path) -> Result<Self, MediaError> {
        fs::create_dir_all(root).map_err(|e| MediaError::Io(e.to_string()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Store bytes, return their content address.
    pub fn store_bytes(&self, bytes: &[u8]) -> Result<String, MediaError> {
        let digest = hex::encode(Sha256::digest(bytes));
        let path = self.root.join(&digest);
        if !path.exists() {
            fs::write(&path, bytes).map_err(|e| MediaError::Io(e.to_string()))?;
        }
        Ok(format!("{}{}", ADDRESS_PREFIX, digest))
    }

    /// Store a JSON metadata document, return its content address.
    pub fn store_metadata(&self, metadata: &Value) -> Result<String, MediaError> {
        let bytes =
            serde_json::to_vec(metadata).map_err(|e| MediaError::Io(e.to_string()))?;
        self.store_bytes(&bytes)
    }

    pub fn load(&self, address: &str) -> Result<Vec<u8>, MediaError> {
        let digest = self.digest_of(address)?;
        fs::read(self.root.join(digest)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MediaError::NotFound(address.to_string()),
            _ => MediaError::Io(e.to_string()),
        })
    }

    pub fn contains(&self, address: &str) -> bool {
        match self.digest_of(address) {
            Ok(digest) => self.root.join(digest).exists(),
            Err(_) => false,
        }
    }

    fn digest_of<'a>(&self, address: &'a str) -> Result<&'a str, MediaError> {
        let digest = address
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or_else(|| MediaError::InvalidAddress(address.to_string()))?;
        // A digest is exactly 64 hex chars; anything else never names a file
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MediaError::InvalidAddress(address.to_string()));
        }
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, ContentStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContentStore::open(dir.path()).expect("open media store");
        (dir, store)
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let (_dir, store) = store();
        let address = store.store_bytes(b"sunset pixels").unwrap();
        assert!(address.starts_with("sha256:"));
        assert_eq!(store.load(&address).unwrap(), b"sunset pixels");
    }

    #[test]
    fn test_same_bytes_same_address() {
        let (_dir, store) = store();
        let a = store.store_bytes(b"dup").unwrap();
        let b = store.store_bytes(b"dup").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_metadata_address() {
        let (_dir, store) = store();
        let address = store
            .store_metadata(&json!({"name": "Sunset", "image": "sha256:00"}))
            .unwrap();
        assert!(store.contains(&address));
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("ipfs://whatever"),
            Err(MediaError::InvalidAddress(_))
        ));
        assert!(matches!(
            store.load("sha256:../../etc/passwd"),
            Err(MediaError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_missing_media_not_found() {
        let (_dir, store) = store();
        let addr = format!("sha256:{}", "0".repeat(64));
        assert!(matches!(store.load(&addr), Err(MediaError::NotFound(_))));
    }
}
