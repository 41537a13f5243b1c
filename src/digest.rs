use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const CHUNK_SIZE: usize = 8192;

/// SHA-256 of the file contents as lowercase hex.
///
/// Returns an empty string when the file cannot be read. Callers treat that
/// as "changed".
pub fn fingerprint(path: &Path) -> String {
    let Ok(mut file) = File::open(path) else {
        return String::new();
    };
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return String::new(),
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Last known fingerprint per path.
#[derive(Debug, Default)]
pub struct DigestCache {
    known: HashMap<PathBuf, String>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` differs from what was last seen, updating the record.
    ///
    /// Unreadable files count as changed and leave the record untouched.
    pub fn changed(&mut self, path: &Path) -> bool {
        self.update(path, fingerprint(path))
    }

    /// Like [`changed`](Self::changed) with a fingerprint computed elsewhere.
    pub fn update(&mut self, path: &Path, digest: String) -> bool {
        if digest.is_empty() {
            return true;
        }
        if self.known.get(path) == Some(&digest) {
            return false;
        }
        self.known.insert(path.to_path_buf(), digest);
        true
    }

    pub fn forget(&mut self, path: &Path) {
        self.known.remove(path);
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn known_sha256() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            fingerprint(&path),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn larger_than_one_chunk() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut data = vec![7u8; CHUNK_SIZE * 3 + 11];
        fs::write(&a, &data).unwrap();
        *data.last_mut().unwrap() = 8;
        fs::write(&b, &data).unwrap();
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn unreadable_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(fingerprint(&dir.path().join("missing")), "");
    }

    #[test]
    fn cache_suppresses_identical_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.py");
        fs::write(&path, "print(1)").unwrap();

        let mut cache = DigestCache::new();
        assert!(cache.changed(&path));
        assert!(!cache.changed(&path));

        fs::write(&path, "print(2)").unwrap();
        assert!(cache.changed(&path));
        assert!(!cache.changed(&path));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_file_always_counts_as_changed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.py");
        let mut cache = DigestCache::new();
        assert!(cache.changed(&path));
        assert!(cache.changed(&path));
        assert!(cache.is_empty());
    }
}
