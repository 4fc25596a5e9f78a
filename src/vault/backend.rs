//! Vault-backed server store.
//!
//! Adapts a [`Client`] to the [`Backend`]+[`Writer`]+[`Syncer`]
//! contract. Reads serve an in-memory cache that a sync pass fully
//! replaces; every successful sync is also persisted to the fallback
//! cache so the next process start has usable data even while the
//! vault is locked or unreachable.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendStatus, Filterer, Syncer, Writer};
use crate::cache::{CacheFile, FallbackCache};
use crate::error::{BackendError, EntityKind};
use crate::model::{Credential, Project, Server, ServerFilter};
use crate::vault::mapping;
use crate::vault::{Client, ClientError};

/// Substrings in a probe failure that mean "the vault is locked"
/// rather than "the vault is gone".
const LOCK_SIGNATURES: [&str; 2] = ["locked", "session expired"];

/// Classifies a probe failure message into a status.
///
/// Matching is case-insensitive; anything without a lock signature is
/// treated as unavailable. The external tool only speaks prose, so
/// this stays a substring check, centralized here.
#[must_use]
pub fn classify_probe_error(message: &str) -> BackendStatus {
    let message = message.to_lowercase();
    if LOCK_SIGNATURES.iter().any(|sig| message.contains(sig)) {
        BackendStatus::Locked
    } else {
        BackendStatus::Unavailable
    }
}

#[derive(Debug)]
struct VaultState {
    /// Servers keyed by id; fully replaced on each successful sync.
    servers: HashMap<String, Server>,
    status: BackendStatus,
    /// When replayed from the fallback cache, the snapshot's age.
    last_sync: Option<DateTime<Utc>>,
    /// Most recent local mutation; the poller debounces on this.
    last_write: Option<Instant>,
    closed: bool,
}

impl Default for VaultState {
    fn default() -> Self {
        Self {
            servers: HashMap::new(),
            status: BackendStatus::Unknown,
            last_sync: None,
            last_write: None,
            closed: false,
        }
    }
}

/// [`Backend`] over an external password-manager vault.
///
/// Projects and credentials are modeled inside items on this source,
/// not as standalone entities, so their reads are empty and their
/// writes are read-only by design.
pub struct VaultBackend {
    id: String,
    client: Arc<dyn Client>,
    fallback: Option<FallbackCache>,
    state: RwLock<VaultState>,
}

impl VaultBackend {
    /// Identity string used in error context and logs.
    pub const ID: &'static str = "vault";

    /// Creates a backend over `client`, persisting to the default
    /// fallback cache path.
    #[must_use]
    pub fn new(client: Arc<dyn Client>) -> Self {
        Self {
            id: Self::ID.to_string(),
            client,
            fallback: Some(FallbackCache::new()),
            state: RwLock::new(VaultState::default()),
        }
    }

    /// Uses a custom fallback cache location.
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackCache) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Disables fallback-cache persistence entirely.
    #[must_use]
    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    fn err(&self, op: &'static str, err: BackendError) -> BackendError {
        err.context(&self.id, op)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, VaultState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, VaultState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_open(&self, op: &'static str) -> Result<(), BackendError> {
        if self.read_state().closed {
            return Err(self.err(op, BackendError::Unavailable));
        }
        Ok(())
    }

    /// Records a local mutation for the poller's debounce window.
    fn touch_write(state: &mut VaultState) {
        state.last_write = Some(Instant::now());
    }

    /// Time since the last local write, if any write happened.
    #[must_use]
    pub fn last_write_elapsed(&self) -> Option<Duration> {
        self.read_state().last_write.map(|at| at.elapsed())
    }

    /// Timestamp of the data currently served (from sync or from the
    /// fallback cache), if known.
    #[must_use]
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_sync
    }

    /// Marks the backend's probe status directly.
    ///
    /// Used by the poller when a sync is cut short by its timeout and
    /// never got to classify itself.
    pub(crate) fn set_status(&self, status: BackendStatus) {
        self.write_state().status = status;
    }

    /// Loads the persisted fallback snapshot into the in-memory cache.
    ///
    /// Explicit, not triggered by sync: called once at startup so the
    /// caller has usable (possibly stale) data before the first probe.
    /// Status is untouched — only a probe moves it off `Unknown`.
    /// Returns the number of servers loaded.
    pub fn load_from_cache(&self) -> Result<usize, BackendError> {
        self.ensure_open("load_from_cache")?;
        let Some(ref fallback) = self.fallback else {
            return Err(self.err(
                "load_from_cache",
                BackendError::Validation("no fallback cache configured".to_string()),
            ));
        };

        let snapshot = fallback
            .load()
            .map_err(|e| self.err("load_from_cache", e.into()))?;

        let count = snapshot.servers.len();
        let mut state = self.write_state();
        state.servers = snapshot
            .servers
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        state.last_sync = Some(snapshot.last_sync);
        info!(count, last_sync = %snapshot.last_sync, "loaded servers from fallback cache");
        Ok(count)
    }

    /// Enumerates all tagged items across all vaults and maps them.
    ///
    /// Per-vault and per-item failures are skipped: a partial,
    /// explainable result beats a total failure.
    async fn scan_vaults(&self) -> Result<HashMap<String, Server>, ClientError> {
        let vaults = self.client.list_vaults().await?;

        let mut servers = HashMap::new();
        for vault in vaults {
            let items = match self.client.list_items(&vault.id).await {
                Ok(items) => items,
                Err(err) => {
                    warn!(vault = %vault.id, %err, "skipping vault during scan");
                    continue;
                }
            };
            for item in items {
                if !mapping::has_membership_tag(&item) {
                    continue;
                }
                match mapping::item_to_server(&item) {
                    Ok(server) => {
                        servers.insert(server.id.clone(), server);
                    }
                    Err(err) => {
                        warn!(item = %item.id, %err, "skipping unmappable item");
                    }
                }
            }
        }
        Ok(servers)
    }

    /// Runs one synchronization pass.
    ///
    /// On probe failure the status is classified and the existing
    /// cache left untouched — stale-but-available data beats a wipe on
    /// a transient failure. On success the in-memory cache is replaced
    /// wholesale and persisted to the fallback file (best-effort).
    pub async fn sync_from_vault(&self) -> Result<(), BackendError> {
        self.ensure_open("sync")?;

        let servers = match self.scan_vaults().await {
            Ok(servers) => servers,
            Err(err) => {
                let status = classify_probe_error(&err.to_string());
                let mut state = self.write_state();
                state.status = status;
                info!(status = status.as_str(), %err, "vault probe failed");
                return Err(self.err("sync", err.into()));
            }
        };

        let now = Utc::now();
        let snapshot: Vec<Server> = {
            let mut state = self.write_state();
            state.servers = servers;
            state.status = BackendStatus::Available;
            state.last_sync = Some(now);
            state.servers.values().cloned().collect()
        };
        debug!(count = snapshot.len(), "vault sync complete");

        // Persistence is best-effort by contract: the in-memory result
        // is already valid, so a cache write failure never fails sync.
        if let Some(ref fallback) = self.fallback {
            let file = CacheFile {
                last_sync: now,
                servers: snapshot,
            };
            if let Err(err) = fallback.save(&file) {
                warn!(%err, path = %fallback.path().display(), "failed to persist fallback cache");
            }
        }
        Ok(())
    }

    /// Resolves the vault an existing server lives in, preferring the
    /// cached record over the caller-provided value.
    fn resolve_vault(&self, server: &Server) -> Option<String> {
        let state = self.read_state();
        state
            .servers
            .get(&server.id)
            .and_then(|cached| cached.vault_id.clone())
            .or_else(|| server.vault_id.clone())
    }
}

#[async_trait]
impl Backend for VaultBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_server(&self, id: &str) -> Result<Server, BackendError> {
        self.ensure_open("get_server")?;
        self.read_state().servers.get(id).cloned().ok_or_else(|| {
            self.err(
                "get_server",
                BackendError::not_found(EntityKind::Server, id),
            )
        })
    }

    async fn list_servers(&self) -> Result<Vec<Server>, BackendError> {
        self.ensure_open("list_servers")?;
        // Clones are defensive copies: callers may mutate freely
        // without corrupting cache state.
        Ok(self.read_state().servers.values().cloned().collect())
    }

    async fn get_project(&self, id: &str) -> Result<Project, BackendError> {
        self.ensure_open("get_project")?;
        Err(self.err(
            "get_project",
            BackendError::not_found(EntityKind::Project, id),
        ))
    }

    async fn list_projects(&self) -> Result<Vec<Project>, BackendError> {
        self.ensure_open("list_projects")?;
        Ok(Vec::new())
    }

    async fn get_credential(&self, id: &str) -> Result<Credential, BackendError> {
        self.ensure_open("get_credential")?;
        Err(self.err(
            "get_credential",
            BackendError::not_found(EntityKind::Credential, id),
        ))
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, BackendError> {
        self.ensure_open("list_credentials")?;
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<(), BackendError> {
        {
            let mut state = self.write_state();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }
        self.client
            .close()
            .await
            .map_err(|e| self.err("close", e.into()))
    }

    fn as_writer(&self) -> Option<&dyn Writer> {
        Some(self)
    }

    fn as_filterer(&self) -> Option<&dyn Filterer> {
        Some(self)
    }

    fn as_syncer(&self) -> Option<&dyn Syncer> {
        Some(self)
    }
}

#[async_trait]
impl Writer for VaultBackend {
    async fn create_server(&self, server: Server) -> Result<Server, BackendError> {
        self.ensure_open("create_server")?;
        server
            .validate()
            .map_err(|e| self.err("create_server", e))?;
        if server.vault_id.as_deref().unwrap_or("").is_empty() {
            return Err(self.err(
                "create_server",
                BackendError::Validation("a target vault is required to create a server".to_string()),
            ));
        }

        let item = mapping::server_to_item(&server);
        let created = self
            .client
            .create_item(&item)
            .await
            .map_err(|e| self.err("create_server", e.into()))?;
        let stored =
            mapping::item_to_server(&created).map_err(|e| self.err("create_server", e))?;

        let mut state = self.write_state();
        state.servers.insert(stored.id.clone(), stored.clone());
        Self::touch_write(&mut state);
        Ok(stored)
    }

    async fn update_server(&self, server: Server) -> Result<Server, BackendError> {
        self.ensure_open("update_server")?;
        server
            .validate()
            .map_err(|e| self.err("update_server", e))?;

        let Some(vault_id) = self.resolve_vault(&server) else {
            return Err(self.err(
                "update_server",
                BackendError::Validation(format!(
                    "no vault known for server {}; not in cache and none provided",
                    server.id
                )),
            ));
        };

        // Fetch the stored item first so identity and vault linkage
        // survive the rewrite.
        let existing = self
            .client
            .get_item(&vault_id, &server.id)
            .await
            .map_err(|e| self.err("update_server", e.into()))?;

        let mut item = mapping::server_to_item(&server);
        item.id = existing.id;
        item.vault_id = existing.vault_id;

        let updated = self
            .client
            .update_item(&item)
            .await
            .map_err(|e| self.err("update_server", e.into()))?;
        let stored =
            mapping::item_to_server(&updated).map_err(|e| self.err("update_server", e))?;

        let mut state = self.write_state();
        state.servers.insert(stored.id.clone(), stored.clone());
        Self::touch_write(&mut state);
        Ok(stored)
    }

    async fn delete_server(&self, id: &str) -> Result<(), BackendError> {
        self.ensure_open("delete_server")?;

        // Deletion needs the cached vault/id linkage; an uncached
        // server cannot be deleted through this backend.
        let vault_id = {
            let state = self.read_state();
            match state.servers.get(id).and_then(|s| s.vault_id.clone()) {
                Some(vault_id) => vault_id,
                None => {
                    return Err(self.err(
                        "delete_server",
                        BackendError::not_found(EntityKind::Server, id),
                    ));
                }
            }
        };

        self.client
            .delete_item(&vault_id, id)
            .await
            .map_err(|e| self.err("delete_server", e.into()))?;

        let mut state = self.write_state();
        state.servers.remove(id);
        Self::touch_write(&mut state);
        Ok(())
    }

    async fn create_project(&self, _project: Project) -> Result<Project, BackendError> {
        self.ensure_open("create_project")?;
        Err(self.err(
            "create_project",
            BackendError::ReadOnly {
                kind: EntityKind::Project,
            },
        ))
    }

    async fn update_project(&self, _project: Project) -> Result<Project, BackendError> {
        self.ensure_open("update_project")?;
        Err(self.err(
            "update_project",
            BackendError::ReadOnly {
                kind: EntityKind::Project,
            },
        ))
    }

    async fn delete_project(&self, _id: &str) -> Result<(), BackendError> {
        self.ensure_open("delete_project")?;
        Err(self.err(
            "delete_project",
            BackendError::ReadOnly {
                kind: EntityKind::Project,
            },
        ))
    }

    async fn create_credential(&self, _credential: Credential) -> Result<Credential, BackendError> {
        self.ensure_open("create_credential")?;
        Err(self.err(
            "create_credential",
            BackendError::ReadOnly {
                kind: EntityKind::Credential,
            },
        ))
    }

    async fn update_credential(&self, _credential: Credential) -> Result<Credential, BackendError> {
        self.ensure_open("update_credential")?;
        Err(self.err(
            "update_credential",
            BackendError::ReadOnly {
                kind: EntityKind::Credential,
            },
        ))
    }

    async fn delete_credential(&self, _id: &str) -> Result<(), BackendError> {
        self.ensure_open("delete_credential")?;
        Err(self.err(
            "delete_credential",
            BackendError::ReadOnly {
                kind: EntityKind::Credential,
            },
        ))
    }
}

#[async_trait]
impl Filterer for VaultBackend {
    async fn filter_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>, BackendError> {
        self.ensure_open("filter_servers")?;
        Ok(self
            .read_state()
            .servers
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Syncer for VaultBackend {
    async fn sync(&self) -> Result<(), BackendError> {
        self.sync_from_vault().await
    }

    fn status(&self) -> BackendStatus {
        self.read_state().status
    }
}
