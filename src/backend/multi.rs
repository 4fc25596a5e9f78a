//! Backend aggregator.
//!
//! Composes an ordered list of backends into one. Ordering carries
//! meaning in two deliberately different directions:
//!
//! - **Reads** prefer the freshest source: list-dedup lets the
//!   highest-index backend win, and by-id lookups scan in reverse
//!   construction order.
//! - **Writes** go to a stable target: the first (lowest-index)
//!   backend that advertises [`Writer`].
//!
//! Swapping those two orders silently breaks expected behavior; the
//! integration suite pins both.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::backend::{Backend, Filterer, Writer};
use crate::error::{BackendError, EntityKind};
use crate::model::{Credential, Project, Server, ServerFilter};

/// Identity string used in aggregator error context.
const MULTI_ID: &str = "multi";

/// Aggregates any number of backends behind the [`Backend`] contract.
///
/// Later entries in the construction list have higher priority. A
/// single misbehaving backend never prevents the aggregator from
/// serving data available from the others.
pub struct MultiBackend {
    /// Constituent backends, lowest priority first. The lock only
    /// guards membership of this list; each backend is independently
    /// thread-safe.
    backends: RwLock<Vec<Arc<dyn Backend>>>,
}

impl MultiBackend {
    /// Creates an aggregator over `backends`, ordered lowest to
    /// highest priority.
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        Self {
            backends: RwLock::new(backends),
        }
    }

    /// Appends a backend as the new highest-priority source.
    pub fn push(&self, backend: Arc<dyn Backend>) {
        let mut backends = self.backends.write().unwrap_or_else(|e| e.into_inner());
        backends.push(backend);
    }

    /// Returns the number of constituent backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Returns true if no backends are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots the backend list so iteration never holds the lock
    /// across an await.
    fn snapshot(&self) -> Vec<Arc<dyn Backend>> {
        self.backends
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Merges per-backend listings, deduplicating by case-insensitive
    /// display name. Later (higher-priority) entries replace earlier
    /// ones; within a single backend's result no ordering is assumed.
    fn merge_by_name(lists: Vec<Vec<Server>>) -> Vec<Server> {
        let mut merged: HashMap<String, Server> = HashMap::new();
        for servers in lists {
            for server in servers {
                merged.insert(server.display_name.to_lowercase(), server);
            }
        }
        let mut servers: Vec<Server> = merged.into_values().collect();
        servers.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
        });
        servers
    }
}

#[async_trait]
impl Backend for MultiBackend {
    fn id(&self) -> &str {
        MULTI_ID
    }

    async fn get_server(&self, id: &str) -> Result<Server, BackendError> {
        // Highest priority first; first hit wins. Errors (including
        // per-backend not-found) skip to the next source.
        for backend in self.snapshot().iter().rev() {
            match backend.get_server(id).await {
                Ok(server) => return Ok(server),
                Err(err) => debug!(backend = backend.id(), %err, "get_server miss"),
            }
        }
        Err(BackendError::not_found(EntityKind::Server, id).context(MULTI_ID, "get_server"))
    }

    async fn list_servers(&self) -> Result<Vec<Server>, BackendError> {
        let mut lists = Vec::new();
        for backend in self.snapshot() {
            match backend.list_servers().await {
                Ok(servers) => lists.push(servers),
                // A broken source degrades gracefully; it does not
                // abort the whole read.
                Err(err) => warn!(backend = backend.id(), %err, "skipping backend in list"),
            }
        }
        Ok(Self::merge_by_name(lists))
    }

    async fn get_project(&self, id: &str) -> Result<Project, BackendError> {
        for backend in self.snapshot().iter().rev() {
            match backend.get_project(id).await {
                Ok(project) => return Ok(project),
                Err(err) => debug!(backend = backend.id(), %err, "get_project miss"),
            }
        }
        Err(BackendError::not_found(EntityKind::Project, id).context(MULTI_ID, "get_project"))
    }

    async fn list_projects(&self) -> Result<Vec<Project>, BackendError> {
        // Plain concatenation: multiplicity across sources is
        // meaningful for projects.
        let mut projects = Vec::new();
        for backend in self.snapshot() {
            match backend.list_projects().await {
                Ok(mut list) => projects.append(&mut list),
                Err(err) => warn!(backend = backend.id(), %err, "skipping backend in list"),
            }
        }
        Ok(projects)
    }

    async fn get_credential(&self, id: &str) -> Result<Credential, BackendError> {
        for backend in self.snapshot().iter().rev() {
            match backend.get_credential(id).await {
                Ok(credential) => return Ok(credential),
                Err(err) => debug!(backend = backend.id(), %err, "get_credential miss"),
            }
        }
        Err(BackendError::not_found(EntityKind::Credential, id).context(MULTI_ID, "get_credential"))
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, BackendError> {
        let mut credentials = Vec::new();
        for backend in self.snapshot() {
            match backend.list_credentials().await {
                Ok(mut list) => credentials.append(&mut list),
                Err(err) => warn!(backend = backend.id(), %err, "skipping backend in list"),
            }
        }
        Ok(credentials)
    }

    async fn close(&self) -> Result<(), BackendError> {
        // Every backend gets a chance to release resources; the first
        // error is reported after all closes ran.
        let mut first_err = None;
        for backend in self.snapshot() {
            if let Err(err) = backend.close().await {
                warn!(backend = backend.id(), %err, "close failed");
                if first_err.is_none() {
                    first_err = Some(err.context(MULTI_ID, "close"));
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn as_writer(&self) -> Option<&dyn Writer> {
        let has_writer = self
            .backends
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|b| b.as_writer().is_some());
        if has_writer { Some(self) } else { None }
    }

    fn as_filterer(&self) -> Option<&dyn Filterer> {
        Some(self)
    }
}

/// Delegates each write to the first backend (lowest index) that
/// implements [`Writer`], scanning in construction order.
macro_rules! delegate_write {
    ($self:ident, $op:literal, $kind:expr, |$writer:ident| $call:expr) => {{
        let backends = $self.snapshot();
        for backend in &backends {
            if let Some($writer) = backend.as_writer() {
                return $call.await;
            }
        }
        Err(BackendError::ReadOnly { kind: $kind }.context(MULTI_ID, $op))
    }};
}

#[async_trait]
impl Writer for MultiBackend {
    async fn create_server(&self, server: Server) -> Result<Server, BackendError> {
        delegate_write!(self, "create_server", EntityKind::Server, |w| w
            .create_server(server))
    }

    async fn update_server(&self, server: Server) -> Result<Server, BackendError> {
        delegate_write!(self, "update_server", EntityKind::Server, |w| w
            .update_server(server))
    }

    async fn delete_server(&self, id: &str) -> Result<(), BackendError> {
        delegate_write!(self, "delete_server", EntityKind::Server, |w| w
            .delete_server(id))
    }

    async fn create_project(&self, project: Project) -> Result<Project, BackendError> {
        delegate_write!(self, "create_project", EntityKind::Project, |w| w
            .create_project(project))
    }

    async fn update_project(&self, project: Project) -> Result<Project, BackendError> {
        delegate_write!(self, "update_project", EntityKind::Project, |w| w
            .update_project(project))
    }

    async fn delete_project(&self, id: &str) -> Result<(), BackendError> {
        delegate_write!(self, "delete_project", EntityKind::Project, |w| w
            .delete_project(id))
    }

    async fn create_credential(&self, credential: Credential) -> Result<Credential, BackendError> {
        delegate_write!(self, "create_credential", EntityKind::Credential, |w| w
            .create_credential(credential))
    }

    async fn update_credential(&self, credential: Credential) -> Result<Credential, BackendError> {
        delegate_write!(self, "update_credential", EntityKind::Credential, |w| w
            .update_credential(credential))
    }

    async fn delete_credential(&self, id: &str) -> Result<(), BackendError> {
        delegate_write!(self, "delete_credential", EntityKind::Credential, |w| w
            .delete_credential(id))
    }
}

#[async_trait]
impl Filterer for MultiBackend {
    /// Filters with each backend's own [`Filterer`] when it has one,
    /// falling back to filtering the plain listing locally, then
    /// applies the same name dedup as `list_servers`.
    async fn filter_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>, BackendError> {
        let mut lists = Vec::new();
        for backend in self.snapshot() {
            let result = match backend.as_filterer() {
                Some(filterer) => filterer.filter_servers(filter).await,
                None => backend
                    .list_servers()
                    .await
                    .map(|servers| servers.into_iter().filter(|s| filter.matches(s)).collect()),
            };
            match result {
                Ok(servers) => lists.push(servers),
                Err(err) => warn!(backend = backend.id(), %err, "skipping backend in filter"),
            }
        }
        Ok(Self::merge_by_name(lists))
    }
}
