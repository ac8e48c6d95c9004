//! Durable object storage for document images.
//!
//! Same minimal surface the intake pipeline would get from a hosted bucket:
//! named-key blob writes (`put_object` is an upsert, no versioning) plus
//! public read URLs. Backed by a directory tree; the content type rides in a
//! sidecar file so reads can serve the original MIME type.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    public_base: String,
}

impl BlobStore {
    /// Open (and create if needed) the bucket directory.
    pub fn open(root: impl Into<PathBuf>, public_base: &str) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    /// Write a blob under `key`, overwriting any previous object. Returns the
    /// key so callers can record it instead of the bytes.
    pub fn put_object(&self, key: &str, bytes: &[u8], content_type: &str) -> io::Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        fs::write(meta_path(&path), content_type)?;
        Ok(key.to_string())
    }

    /// Read a blob back as (bytes, content type).
    pub fn get_object(&self, key: &str) -> io::Result<(Vec<u8>, String)> {
        let path = self.path_for(key)?;
        let bytes = fs::read(&path)?;
        let content_type = fs::read_to_string(meta_path(&path))
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Ok((bytes, content_type))
    }

    pub fn object_exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Public read URL for a stored key.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Keys are relative slash paths; anything absolute or escaping the root
    /// is refused.
    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        let rel = Path::new(key);
        let clean = rel.components().all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !clean {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid object key: {}", key),
            ));
        }
        Ok(self.root.join(rel))
    }
}

fn meta_path(path: &Path) -> PathBuf {
    let mut meta = path.as_os_str().to_owned();
    meta.push(".meta");
    PathBuf::from(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp(name: &str) -> (BlobStore, PathBuf) {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        let store = BlobStore::open(&dir, "http://localhost:5000/storage").expect("open store");
        (store, dir)
    }

    #[test]
    fn test_put_and_get_round_trip() {
        let (store, dir) = open_temp("loan_intake_test_blob_rt");

        let key = store
            .put_object("loans/LN-1/panCard-abc.jpg", b"jpegbytes", "image/jpeg")
            .unwrap();
        assert_eq!(key, "loans/LN-1/panCard-abc.jpg");

        let (bytes, content_type) = store.get_object(&key).unwrap();
        assert_eq!(bytes, b"jpegbytes");
        assert_eq!(content_type, "image/jpeg");
        assert!(store.object_exists(&key));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_put_is_an_upsert() {
        let (store, dir) = open_temp("loan_intake_test_blob_upsert");

        store.put_object("a/b.jpg", b"one", "image/jpeg").unwrap();
        store.put_object("a/b.jpg", b"two", "image/png").unwrap();
        let (bytes, content_type) = store.get_object("a/b.jpg").unwrap();
        assert_eq!(bytes, b"two");
        assert_eq!(content_type, "image/png");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_escaping_keys_rejected() {
        let (store, dir) = open_temp("loan_intake_test_blob_escape");

        assert!(store.put_object("../oops.jpg", b"x", "image/jpeg").is_err());
        assert!(store.put_object("", b"x", "image/jpeg").is_err());
        assert!(store
            .put_object("loans/../../etc/passwd", b"x", "image/jpeg")
            .is_err());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_public_url_joins_base_and_key() {
        let (store, dir) = open_temp("loan_intake_test_blob_url");
        assert_eq!(
            store.public_url("loans/LN-1/signature-x.jpg"),
            "http://localhost:5000/storage/loans/LN-1/signature-x.jpg"
        );
        let _ = fs::remove_dir_all(dir);
    }
}
