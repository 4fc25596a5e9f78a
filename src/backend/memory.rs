//! In-memory backend.
//!
//! Fully capable (read, write, filter) store backed by hash maps.
//! This is the adapter seam for sources whose parsing lives outside
//! this layer — an SSH-config reader populates one of these — and the
//! workhorse double for aggregator tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::backend::{Backend, Filterer, Writer};
use crate::error::{BackendError, EntityKind};
use crate::model::{Credential, Project, Server, ServerFilter};

#[derive(Debug, Default)]
struct MemoryState {
    servers: HashMap<String, Server>,
    projects: HashMap<String, Project>,
    credentials: HashMap<String, Credential>,
    closed: bool,
}

/// Hash-map backed backend with full write and filter support.
#[derive(Debug)]
pub struct MemoryBackend {
    id: String,
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    /// Creates an empty backend with the given identity string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Creates a backend pre-populated with servers.
    ///
    /// # Panics
    /// Panics if two seeded servers share an id.
    #[must_use]
    pub fn with_servers(id: impl Into<String>, servers: Vec<Server>) -> Self {
        let backend = Self::new(id);
        {
            let mut state = backend.state.write().unwrap_or_else(|e| e.into_inner());
            for server in servers {
                let prev = state.servers.insert(server.id.clone(), server);
                assert!(prev.is_none(), "seeded servers must have unique ids");
            }
        }
        backend
    }

    /// Seeds a project without going through the write path.
    pub fn seed_project(&self, project: Project) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.projects.insert(project.id.clone(), project);
    }

    /// Seeds a credential without going through the write path.
    pub fn seed_credential(&self, credential: Credential) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.credentials.insert(credential.id.clone(), credential);
    }

    fn err(&self, op: &'static str, err: BackendError) -> BackendError {
        err.context(&self.id, op)
    }

    fn read_open(
        &self,
        op: &'static str,
    ) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, BackendError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(self.err(op, BackendError::Unavailable));
        }
        Ok(state)
    }

    fn write_open(
        &self,
        op: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, BackendError> {
        let state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(self.err(op, BackendError::Unavailable));
        }
        Ok(state)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_server(&self, id: &str) -> Result<Server, BackendError> {
        let state = self.read_open("get_server")?;
        state.servers.get(id).cloned().ok_or_else(|| {
            self.err(
                "get_server",
                BackendError::not_found(EntityKind::Server, id),
            )
        })
    }

    async fn list_servers(&self) -> Result<Vec<Server>, BackendError> {
        let state = self.read_open("list_servers")?;
        Ok(state.servers.values().cloned().collect())
    }

    async fn get_project(&self, id: &str) -> Result<Project, BackendError> {
        let state = self.read_open("get_project")?;
        state.projects.get(id).cloned().ok_or_else(|| {
            self.err(
                "get_project",
                BackendError::not_found(EntityKind::Project, id),
            )
        })
    }

    async fn list_projects(&self) -> Result<Vec<Project>, BackendError> {
        let state = self.read_open("list_projects")?;
        Ok(state.projects.values().cloned().collect())
    }

    async fn get_credential(&self, id: &str) -> Result<Credential, BackendError> {
        let state = self.read_open("get_credential")?;
        state.credentials.get(id).cloned().ok_or_else(|| {
            self.err(
                "get_credential",
                BackendError::not_found(EntityKind::Credential, id),
            )
        })
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, BackendError> {
        let state = self.read_open("list_credentials")?;
        Ok(state.credentials.values().cloned().collect())
    }

    async fn close(&self) -> Result<(), BackendError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        Ok(())
    }

    fn as_writer(&self) -> Option<&dyn Writer> {
        Some(self)
    }

    fn as_filterer(&self) -> Option<&dyn Filterer> {
        Some(self)
    }
}

#[async_trait]
impl Writer for MemoryBackend {
    async fn create_server(&self, mut server: Server) -> Result<Server, BackendError> {
        server
            .validate()
            .map_err(|e| self.err("create_server", e))?;
        if server.id.is_empty() {
            server.id = uuid::Uuid::new_v4().to_string();
        }

        let mut state = self.write_open("create_server")?;
        if state.servers.contains_key(&server.id) {
            return Err(self.err(
                "create_server",
                BackendError::DuplicateId(server.id.clone()),
            ));
        }
        state.servers.insert(server.id.clone(), server.clone());
        Ok(server)
    }

    async fn update_server(&self, server: Server) -> Result<Server, BackendError> {
        server
            .validate()
            .map_err(|e| self.err("update_server", e))?;

        let mut state = self.write_open("update_server")?;
        if !state.servers.contains_key(&server.id) {
            return Err(self.err(
                "update_server",
                BackendError::not_found(EntityKind::Server, &server.id),
            ));
        }
        state.servers.insert(server.id.clone(), server.clone());
        Ok(server)
    }

    async fn delete_server(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.write_open("delete_server")?;
        state.servers.remove(id).map(|_| ()).ok_or_else(|| {
            self.err(
                "delete_server",
                BackendError::not_found(EntityKind::Server, id),
            )
        })
    }

    async fn create_project(&self, mut project: Project) -> Result<Project, BackendError> {
        if project.id.is_empty() {
            project.id = uuid::Uuid::new_v4().to_string();
        }

        let mut state = self.write_open("create_project")?;
        if state.projects.contains_key(&project.id) {
            return Err(self.err(
                "create_project",
                BackendError::DuplicateId(project.id.clone()),
            ));
        }
        state.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn update_project(&self, project: Project) -> Result<Project, BackendError> {
        let mut state = self.write_open("update_project")?;
        if !state.projects.contains_key(&project.id) {
            return Err(self.err(
                "update_project",
                BackendError::not_found(EntityKind::Project, &project.id),
            ));
        }
        state.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn delete_project(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.write_open("delete_project")?;
        state.projects.remove(id).map(|_| ()).ok_or_else(|| {
            self.err(
                "delete_project",
                BackendError::not_found(EntityKind::Project, id),
            )
        })
    }

    async fn create_credential(
        &self,
        mut credential: Credential,
    ) -> Result<Credential, BackendError> {
        if credential.id.is_empty() {
            credential.id = uuid::Uuid::new_v4().to_string();
        }

        let mut state = self.write_open("create_credential")?;
        if state.credentials.contains_key(&credential.id) {
            return Err(self.err(
                "create_credential",
                BackendError::DuplicateId(credential.id.clone()),
            ));
        }
        state
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(credential)
    }

    async fn update_credential(&self, credential: Credential) -> Result<Credential, BackendError> {
        let mut state = self.write_open("update_credential")?;
        if !state.credentials.contains_key(&credential.id) {
            return Err(self.err(
                "update_credential",
                BackendError::not_found(EntityKind::Credential, &credential.id),
            ));
        }
        state
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(credential)
    }

    async fn delete_credential(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.write_open("delete_credential")?;
        state.credentials.remove(id).map(|_| ()).ok_or_else(|| {
            self.err(
                "delete_credential",
                BackendError::not_found(EntityKind::Credential, id),
            )
        })
    }
}

#[async_trait]
impl Filterer for MemoryBackend {
    async fn filter_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>, BackendError> {
        let state = self.read_open("filter_servers")?;
        Ok(state
            .servers
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}
