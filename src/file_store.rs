//! File-backed [`FingerprintStore`].
//!
//! One pretty-printed JSON file per domain key under a directory:
//!
//! ```text
//! <dir>/shop.example.json
//! {
//!   "schema": 1,
//!   "domain_key": "shop.example",
//!   "records": { "<locator>": { "latest": {...}, "history": [...] } }
//! }
//! ```
//!
//! Writes go to a temporary file in the same directory, are fsynced, and
//! are renamed over the target, so a reader sees the previous file or the
//! new one. Saves to one domain are serialized by an exclusive lock on
//! `<dir>/<stem>.lock`, held across the read-modify-write. The lock is an OS
//! file lock, so it holds between store handles and between processes
//! sharing the directory.
//!
//! Reads never fail. A missing, unreadable, or undecodable file, or one
//! whose embedded `domain_key` disagrees with its name, loads as an empty
//! domain and is logged.

use adaptive_locator_core::fingerprint::Fingerprint;
use adaptive_locator_core::store::{
    ensure_domain, DomainRecords, FingerprintStore, DEFAULT_HISTORY_LIMIT,
};
use adaptive_locator_core::StoreError;
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";

pub struct FileStore {
    dir: PathBuf,
    history_limit: usize,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the records for `domain_key`.
    pub fn path_for(&self, domain_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", encode_file_stem(domain_key), EXTENSION))
    }

    fn lock_path(&self, domain_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", encode_file_stem(domain_key), LOCK_EXTENSION))
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        if self.dir.exists() && !self.dir.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.display().to_string(),
            source,
        })
    }

    fn read(&self, domain_key: &str) -> DomainRecords {
        let path = self.path_for(domain_key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(domain = domain_key, "no store file, cold start");
                return DomainRecords::empty(domain_key);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable store file, treating as empty");
                return DomainRecords::empty(domain_key);
            }
        };
        match serde_json::from_str::<DomainRecords>(&content) {
            Ok(records) if records.domain_key == domain_key => records,
            Ok(records) => {
                warn!(
                    path = %path.display(),
                    expected = domain_key,
                    found = %records.domain_key,
                    "store file belongs to another domain, treating as empty"
                );
                DomainRecords::empty(domain_key)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt store file, treating as empty");
                DomainRecords::empty(domain_key)
            }
        }
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.display().to_string(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl FingerprintStore for FileStore {
    fn load(&self, domain_key: &str) -> DomainRecords {
        self.read(domain_key)
    }

    fn save(
        &self,
        domain_key: &str,
        locator_key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        ensure_domain(domain_key, fingerprint)?;

        self.ensure_dir()?;

        let lock_path = self.lock_path(domain_key);
        let lock_err = |source: std::io::Error| StoreError::Io {
            path: lock_path.display().to_string(),
            source,
        };
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(lock_err)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock.write().map_err(lock_err)?;

        let mut records = self.read(domain_key);
        records.insert(locator_key, fingerprint.clone(), self.history_limit);
        let bytes = serde_json::to_vec_pretty(&records).map_err(|source| StoreError::Encode {
            domain: domain_key.to_string(),
            source,
        })?;

        let path = self.path_for(domain_key);
        self.write_atomic(&path, &bytes)?;
        info!(domain = domain_key, locator = locator_key, path = %path.display(), "stored fingerprint");
        Ok(())
    }

    fn domains(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut out: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|x| x.to_str()) == Some(EXTENSION))
            .filter_map(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(decode_file_stem)
            })
            .collect();
        out.sort();
        out
    }
}

/// Reversible file-name encoding: `[A-Za-z0-9._-]` pass through, every
/// other byte becomes `%XX`.
fn encode_file_stem(domain_key: &str) -> String {
    let mut out = String::with_capacity(domain_key.len());
    for b in domain_key.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn decode_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
