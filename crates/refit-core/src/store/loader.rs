use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

use super::StoreError;

/// Source of persisted rule blobs
pub trait ResourceLoader: Send + Sync {
    /// Names of all available resources, in a stable order
    fn list(&self) -> io::Result<Vec<String>>;

    fn read(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// Loads `<name><suffix>` files from one directory
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    suffixes: Vec<String>,
}

impl DirectoryLoader {
    pub fn new(root: impl AsRef<Path>, suffixes: &[&str]) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLoader for DirectoryLoader {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(name))
    }
}

/// Reads one resource, retrying I/O failures up to `max_attempts` times.
pub fn read_with_retry(
    loader: &dyn ResourceLoader,
    name: &str,
    max_attempts: usize,
) -> Result<Vec<u8>, StoreError> {
    let attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match loader.read(name) {
            Ok(bytes) => {
                trace!(resource = name, attempt, bytes = bytes.len(), "read resource");
                return Ok(bytes);
            }
            Err(source) if attempt >= attempts => {
                return Err(StoreError::Read {
                    resource: name.to_string(),
                    attempts,
                    source,
                });
            }
            Err(err) => {
                warn!(resource = name, attempt, error = %err, "resource read failed; retrying");
            }
        }
    }
}
