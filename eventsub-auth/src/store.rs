//! File-backed credential persistence.

use parking_lot::{Mutex, RwLock};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::credential::Credential;
use crate::error::{AuthError, Result};

/// Reads and writes the JSON credential file.
///
/// The store caches the last credential it read or wrote. A missing file is not
/// cached, so a credential written by another component (the authorization
/// callback) becomes visible on the next [`get`](Self::get).
///
/// Writes are serialized; [`update`](Self::update) applies a change to the
/// credential as it is at write time, never to a copy read before an await.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    cached: RwLock<Option<Credential>>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Create a store for the given file path. No I/O happens until the first read.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a credential is available, either cached or on disk.
    pub fn exists(&self) -> bool {
        self.cached.read().is_some() || self.path.exists()
    }

    /// Return the current credential, reading the file on first use.
    ///
    /// Returns `Ok(None)` when the file does not exist yet.
    pub fn get(&self) -> Result<Option<Credential>> {
        if let Some(credential) = self.cached.read().as_ref() {
            return Ok(Some(credential.clone()));
        }

        let loaded = self.load()?;
        if let Some(credential) = &loaded {
            *self.cached.write() = Some(credential.clone());
        }
        Ok(loaded)
    }

    /// Like [`get`](Self::get) but a missing credential is a configuration error.
    pub fn require(&self) -> Result<Credential> {
        self.get()?.ok_or_else(|| {
            AuthError::Configuration(format!(
                "no credential file at {}; authorize the application first",
                self.path.display()
            ))
        })
    }

    /// Persist the credential, replacing the file atomically.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write(credential)
    }

    /// Read-modify-write against the current credential.
    ///
    /// `change` receives the stored credential and returns whether it modified it;
    /// only modified credentials are written. Returns the credential as stored
    /// afterwards.
    pub fn update<F>(&self, change: F) -> Result<Credential>
    where
        F: FnOnce(&mut Credential) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut credential = self.require()?;
        if change(&mut credential) {
            self.write(&credential)?;
        }
        Ok(credential)
    }

    fn write(&self, credential: &Credential) -> Result<()> {
        let body = serde_json::to_string_pretty(credential)
            .map_err(|e| AuthError::Storage(format!("failed to encode credential: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.storage_error("create directory for", e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, body).map_err(|e| self.storage_error("write", e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.storage_error("replace", e))?;

        *self.cached.write() = Some(credential.clone());
        tracing::info!(path = %self.path.display(), "credential saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Credential>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.storage_error("read", e)),
        };

        serde_json::from_str(&raw).map(Some).map_err(|e| {
            AuthError::Storage(format!(
                "credential file {} is malformed: {e}",
                self.path.display()
            ))
        })
    }

    fn storage_error(&self, action: &str, error: std::io::Error) -> AuthError {
        AuthError::Storage(format!("failed to {action} {}: {error}", self.path.display()))
    }
}
