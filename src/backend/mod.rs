//! Backend contract and optional capabilities.
//!
//! [`Backend`] is the mandatory read contract every data source
//! satisfies. Write, filter and sync support are optional capabilities
//! a source advertises through the `as_*` probing accessors; a source
//! that stays with the defaults is usable purely through [`Backend`]
//! and never has to stub out unsupported operations.

pub mod memory;
pub mod multi;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::model::{Credential, Project, Server, ServerFilter};

pub use memory::MemoryBackend;
pub use multi::MultiBackend;

/// Health of a syncing backend.
///
/// `Unknown` is only valid before the first probe; after that the
/// status moves freely between the other three for the life of the
/// process and never returns to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendStatus {
    /// Not yet probed.
    #[default]
    Unknown,
    /// Last probe succeeded.
    Available,
    /// Last probe failed with a lock/session-expiry signature.
    Locked,
    /// Last probe failed for any other reason.
    Unavailable,
}

impl BackendStatus {
    /// Returns a display string for the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Available => "Available",
            Self::Locked => "Locked",
            Self::Unavailable => "Unavailable",
        }
    }
}

/// Mandatory read contract for a data source.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Identity string used in error context and logs.
    fn id(&self) -> &str;

    /// Fetches a single server by id.
    async fn get_server(&self, id: &str) -> Result<Server, BackendError>;

    /// Lists all servers this source knows about.
    async fn list_servers(&self) -> Result<Vec<Server>, BackendError>;

    /// Fetches a single project by id.
    async fn get_project(&self, id: &str) -> Result<Project, BackendError>;

    /// Lists all projects. Sources without project support return an
    /// empty list, never fabricated data.
    async fn list_projects(&self) -> Result<Vec<Project>, BackendError>;

    /// Fetches a single credential by id.
    async fn get_credential(&self, id: &str) -> Result<Credential, BackendError>;

    /// Lists all credentials. Sources without credential support
    /// return an empty list.
    async fn list_credentials(&self) -> Result<Vec<Credential>, BackendError>;

    /// Releases resources. Idempotent; operations after close return
    /// an unavailable error.
    async fn close(&self) -> Result<(), BackendError>;

    /// Write capability, if this source supports it.
    fn as_writer(&self) -> Option<&dyn Writer> {
        None
    }

    /// Server-side filter capability, if this source supports it.
    fn as_filterer(&self) -> Option<&dyn Filterer> {
        None
    }

    /// Sync capability, if this source supports it.
    fn as_syncer(&self) -> Option<&dyn Syncer> {
        None
    }
}

/// Optional write capability.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Creates a server, returning the stored record (with assigned
    /// id).
    async fn create_server(&self, server: Server) -> Result<Server, BackendError>;

    /// Updates an existing server.
    async fn update_server(&self, server: Server) -> Result<Server, BackendError>;

    /// Deletes a server by id.
    async fn delete_server(&self, id: &str) -> Result<(), BackendError>;

    /// Creates a project.
    async fn create_project(&self, project: Project) -> Result<Project, BackendError>;

    /// Updates an existing project.
    async fn update_project(&self, project: Project) -> Result<Project, BackendError>;

    /// Deletes a project by id.
    async fn delete_project(&self, id: &str) -> Result<(), BackendError>;

    /// Creates a credential.
    async fn create_credential(&self, credential: Credential) -> Result<Credential, BackendError>;

    /// Updates an existing credential.
    async fn update_credential(&self, credential: Credential) -> Result<Credential, BackendError>;

    /// Deletes a credential by id.
    async fn delete_credential(&self, id: &str) -> Result<(), BackendError>;
}

/// Optional server-side filtering capability.
#[async_trait]
pub trait Filterer: Send + Sync {
    /// Lists servers matching the filter. Semantics are
    /// per-implementation but must be documented and stable; both
    /// built-in filterers use [`ServerFilter::matches`].
    async fn filter_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>, BackendError>;
}

/// Optional synchronization capability.
#[async_trait]
pub trait Syncer: Send + Sync {
    /// Runs one synchronization pass against the source of truth.
    async fn sync(&self) -> Result<(), BackendError>;

    /// Returns the status observed by the most recent probe.
    fn status(&self) -> BackendStatus;
}
