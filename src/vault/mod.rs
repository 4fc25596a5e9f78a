//! External vault integration.
//!
//! [`Client`] is the collaborator boundary to the password-manager
//! vault: this layer never speaks the vault protocol itself. Two
//! implementations ship here — [`cli::CliClient`] shelling out to the
//! vendor's command-line tool, and [`mock::MockClient`] for tests.
//! [`backend::VaultBackend`] adapts a client to the [`crate::backend`]
//! contract.

pub mod backend;
pub mod cli;
pub mod mapping;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use backend::VaultBackend;
pub use cli::CliClient;
pub use mock::MockClient;

/// A vault visible to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// Vault identifier.
    pub id: String,
    /// Vault display name.
    pub name: String,
}

/// A single labeled value on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemField {
    /// Field title; matched case-insensitively against the well-known
    /// names in [`mapping`].
    pub title: String,
    /// Field value.
    pub value: String,
}

impl ItemField {
    /// Creates a field.
    #[must_use]
    pub fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
        }
    }
}

/// The unit of storage in the external vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item identifier, assigned by the vault.
    pub id: String,
    /// Item title.
    pub title: String,
    /// Identifier of the vault holding the item.
    pub vault_id: String,
    /// Item tags. Items managed by this tool carry the membership
    /// sentinel ([`mapping::MEMBERSHIP_TAG`]).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Labeled fields.
    #[serde(default)]
    pub fields: Vec<ItemField>,
}

/// Errors from the external client.
///
/// Command failure text is carried verbatim: the sync status machine
/// classifies locked-vs-unavailable by inspecting it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Process or file I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tool produced output this layer cannot decode.
    #[error("invalid client output: {0}")]
    Json(#[from] serde_json::Error),

    /// The tool exited with a failure; message is its stderr.
    #[error("{0}")]
    Command(String),

    /// The requested vault or item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The client has been closed.
    #[error("client is closed")]
    Closed,
}

impl From<ClientError> for crate::error::BackendError {
    fn from(err: ClientError) -> Self {
        Self::Client(err.to_string())
    }
}

/// Vault/item CRUD boundary.
///
/// Doubles as the health probe: `list_vaults` is the operation the
/// sync state machine uses to decide availability.
#[async_trait]
pub trait Client: Send + Sync {
    /// Lists the vaults this client can see.
    async fn list_vaults(&self) -> Result<Vec<Vault>, ClientError>;

    /// Lists the items in a vault.
    async fn list_items(&self, vault_id: &str) -> Result<Vec<Item>, ClientError>;

    /// Fetches one item.
    async fn get_item(&self, vault_id: &str, item_id: &str) -> Result<Item, ClientError>;

    /// Creates an item, returning the stored copy (with assigned id).
    async fn create_item(&self, item: &Item) -> Result<Item, ClientError>;

    /// Updates an existing item.
    async fn update_item(&self, item: &Item) -> Result<Item, ClientError>;

    /// Deletes an item.
    async fn delete_item(&self, vault_id: &str, item_id: &str) -> Result<(), ClientError>;

    /// Releases client resources. Idempotent.
    async fn close(&self) -> Result<(), ClientError>;
}
