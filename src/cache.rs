//! Persistent fallback cache for vault-sourced servers.
//!
//! The last successful sync is written to a TOML file so the tool can
//! start with usable (possibly stale) data while the external vault is
//! unreachable or locked. Writes are atomic: the document is rendered
//! to a temporary file which is then renamed into place, so a crash
//! never leaves a half-written cache behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Server;

/// Maximum cache file size (1MB).
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// File I/O error. A missing file surfaces here; at startup the
    /// caller treats it as non-fatal.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// File too large.
    #[error("File too large (max {MAX_FILE_SIZE} bytes)")]
    FileTooLarge,
}

/// On-disk cache document: a sync timestamp plus the full server list.
///
/// Every server field round-trips; this file is the sole source of
/// truth when the vault is unreachable at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheFile {
    /// When the snapshot was taken.
    pub last_sync: DateTime<Utc>,
    /// Servers known at that time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
}

impl CacheFile {
    /// Creates a snapshot of `servers` stamped with the current time.
    #[must_use]
    pub fn now(servers: Vec<Server>) -> Self {
        Self {
            last_sync: Utc::now(),
            servers,
        }
    }
}

/// Durable snapshot store for one backend's last-known-good server
/// list.
///
/// Each instance exclusively owns its file; no cross-process locking
/// is attempted (single-user, single-instance tool).
#[derive(Debug, Clone)]
pub struct FallbackCache {
    /// Path to the cache file.
    path: PathBuf,
}

impl FallbackCache {
    /// Creates a cache at the default path.
    ///
    /// Default path: `~/.hostvault/servers.toml`
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
        }
    }

    /// Creates a cache at a custom path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        assert!(!path.as_os_str().is_empty(), "path must not be empty");
        Self { path }
    }

    /// Returns the default cache path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hostvault")
            .join("servers.toml")
    }

    /// Returns the cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the cache file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Writes a snapshot atomically (temp file + rename).
    pub fn save(&self, cache: &CacheFile) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(cache)?;

        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;

        // Restrict permissions on Unix; server records can carry notes
        // the user considers private.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }

    /// Reads the snapshot back. All-or-nothing: a missing or malformed
    /// file is an error, never a silently empty result.
    pub fn load(&self) -> Result<CacheFile, CacheError> {
        let metadata = fs::metadata(&self.path)?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(CacheError::FileTooLarge);
        }

        let content = fs::read_to_string(&self.path)?;
        let cache: CacheFile = toml::from_str(&content)?;
        Ok(cache)
    }
}

impl Default for FallbackCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn full_server() -> Server {
        Server {
            id: "srv1".to_string(),
            display_name: "prod-web".to_string(),
            host: "10.0.0.5".to_string(),
            user: "deploy".to_string(),
            port: 2222,
            identity_file: Some("~/.ssh/id_ed25519".to_string()),
            proxy: Some("bastion".to_string()),
            remote_project_path: Some("/srv/app".to_string()),
            project_ids: vec!["proj1".to_string(), "proj2".to_string()],
            vault_id: Some("vault1".to_string()),
            tags: vec!["prod".to_string()],
            notes: Some("primary".to_string()),
            favorite: true,
            last_connected: Some(Utc::now()),
        }
    }

    #[test]
    fn test_roundtrip_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FallbackCache::with_path(dir.path().join("servers.toml"));

        let snapshot = CacheFile::now(vec![full_server()]);
        cache.save(&snapshot).unwrap();

        let loaded = cache.load().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_roundtrip_empty_optionals() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FallbackCache::with_path(dir.path().join("servers.toml"));

        let server = Server::new("bare", "bare.example.com");
        let snapshot = CacheFile::now(vec![server.clone()]);
        cache.save(&snapshot).unwrap();

        // Omitted optional fields come back as their zero values.
        let loaded = cache.load().unwrap();
        assert_eq!(loaded.servers[0], server);
        assert_eq!(loaded.servers[0].port, 0);
        assert!(loaded.servers[0].tags.is_empty());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FallbackCache::with_path(dir.path().join("absent.toml"));
        assert!(!cache.exists());
        assert!(matches!(cache.load(), Err(CacheError::Io(_))));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.toml");
        let cache = FallbackCache::with_path(path.clone());

        cache.save(&CacheFile::now(vec![full_server()])).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FallbackCache::with_path(dir.path().join("servers.toml"));

        cache.save(&CacheFile::now(vec![full_server()])).unwrap();
        cache
            .save(&CacheFile::now(vec![Server::new("other", "other.host")]))
            .unwrap();

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.servers.len(), 1);
        assert_eq!(loaded.servers[0].display_name, "other");
    }

    #[test]
    fn test_omitted_fields_absent_from_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.toml");
        let cache = FallbackCache::with_path(path.clone());

        cache
            .save(&CacheFile::now(vec![Server::new("bare", "bare.host")]))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("last_sync"));
        assert!(content.contains("display_name"));
        assert!(!content.contains("identity_file"));
        assert!(!content.contains("port"));
        assert!(!content.contains("favorite"));
    }
}
