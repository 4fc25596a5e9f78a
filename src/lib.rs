//! Hostvault
//!
//! Core reconciliation layer for a multi-source SSH server manager.
//! Server definitions live in heterogeneous sources — an SSH config
//! file, an external password-manager vault — and this crate presents
//! them behind one read/write surface.
//!
//! # Architecture
//!
//! - **Backend Module**: the mandatory read contract plus optional
//!   write/filter/sync capabilities, and the aggregator that merges
//!   any number of sources with deterministic priority
//! - **Vault Module**: the external-vault backend, its CLI client and
//!   the item field mapping
//! - **Cache Module**: atomic on-disk fallback snapshot for offline
//!   bootstrap
//! - **Poller Module**: background sync loop with write debounce and
//!   status change notification
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use hostvault::{Backend, CliClient, MemoryBackend, MultiBackend, VaultBackend};
//!
//! let config: Arc<dyn Backend> = Arc::new(MemoryBackend::new("ssh-config"));
//! let vault: Arc<dyn Backend> = Arc::new(VaultBackend::new(Arc::new(CliClient::new())));
//! // Later entries win on read collisions; writes go to the first
//! // writable backend.
//! let store = MultiBackend::new(vec![config, vault]);
//! ```

pub mod backend;
pub mod cache;
pub mod error;
pub mod logging;
pub mod model;
pub mod poller;
pub mod vault;

// Re-export main types
pub use backend::{Backend, BackendStatus, Filterer, MemoryBackend, MultiBackend, Syncer, Writer};
pub use cache::{CacheFile, FallbackCache};
pub use error::{BackendError, EntityKind, ErrorKind};
pub use model::{Credential, Project, Server, ServerFilter};
pub use poller::Poller;
pub use vault::{CliClient, Client, Item, ItemField, MockClient, Vault, VaultBackend};
