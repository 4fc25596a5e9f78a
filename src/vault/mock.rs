//! In-memory vault client for tests.
//!
//! Holds vaults and items in shared state, supports per-operation
//! fault injection (so sync failure classification can be exercised
//! with the exact phrasing the real CLI produces) and counts calls for
//! debounce assertions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::vault::{Client, ClientError, Item, Vault};

#[derive(Debug, Default)]
struct MockState {
    vaults: Vec<Vault>,
    /// Items keyed by vault id.
    items: HashMap<String, Vec<Item>>,
    /// Injected error message per operation name.
    errors: HashMap<String, String>,
    /// Call count per operation name.
    calls: HashMap<String, u32>,
    closed: bool,
    next_id: u32,
}

/// Shared-state mock [`Client`]. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    /// Creates an empty mock client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a vault.
    pub fn add_vault(&self, id: impl Into<String>, name: impl Into<String>) {
        let mut state = self.lock();
        let id = id.into();
        state.items.entry(id.clone()).or_default();
        state.vaults.push(Vault {
            id,
            name: name.into(),
        });
    }

    /// Adds an item to its vault.
    pub fn add_item(&self, item: Item) {
        let mut state = self.lock();
        state.items.entry(item.vault_id.clone()).or_default().push(item);
    }

    /// Makes `operation` fail with `message` until cleared.
    pub fn set_error(&self, operation: &str, message: impl Into<String>) {
        self.lock()
            .errors
            .insert(operation.to_string(), message.into());
    }

    /// Clears an injected error.
    pub fn clear_error(&self, operation: &str) {
        self.lock().errors.remove(operation);
    }

    /// Returns how many times `operation` was invoked.
    #[must_use]
    pub fn calls(&self, operation: &str) -> u32 {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Returns all items across all vaults (test inspection).
    #[must_use]
    pub fn all_items(&self) -> Vec<Item> {
        self.lock().items.values().flatten().cloned().collect()
    }

    /// Records the call and returns the injected error, if any.
    fn enter(state: &mut MockState, operation: &str) -> Result<(), ClientError> {
        *state.calls.entry(operation.to_string()).or_insert(0) += 1;
        if state.closed {
            return Err(ClientError::Closed);
        }
        if let Some(message) = state.errors.get(operation) {
            return Err(ClientError::Command(message.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Client for MockClient {
    async fn list_vaults(&self) -> Result<Vec<Vault>, ClientError> {
        let mut state = self.lock();
        Self::enter(&mut state, "list_vaults")?;
        Ok(state.vaults.clone())
    }

    async fn list_items(&self, vault_id: &str) -> Result<Vec<Item>, ClientError> {
        let mut state = self.lock();
        Self::enter(&mut state, "list_items")?;
        state
            .items
            .get(vault_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("vault {vault_id}")))
    }

    async fn get_item(&self, vault_id: &str, item_id: &str) -> Result<Item, ClientError> {
        let mut state = self.lock();
        Self::enter(&mut state, "get_item")?;
        state
            .items
            .get(vault_id)
            .and_then(|items| items.iter().find(|i| i.id == item_id))
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("item {item_id}")))
    }

    async fn create_item(&self, item: &Item) -> Result<Item, ClientError> {
        let mut state = self.lock();
        Self::enter(&mut state, "create_item")?;
        if !state.items.contains_key(&item.vault_id) {
            return Err(ClientError::NotFound(format!("vault {}", item.vault_id)));
        }

        let mut stored = item.clone();
        if stored.id.is_empty() {
            state.next_id += 1;
            stored.id = format!("item-{}", state.next_id);
        }
        state
            .items
            .entry(stored.vault_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update_item(&self, item: &Item) -> Result<Item, ClientError> {
        let mut state = self.lock();
        Self::enter(&mut state, "update_item")?;
        let items = state
            .items
            .get_mut(&item.vault_id)
            .ok_or_else(|| ClientError::NotFound(format!("vault {}", item.vault_id)))?;
        let slot = items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| ClientError::NotFound(format!("item {}", item.id)))?;
        *slot = item.clone();
        Ok(item.clone())
    }

    async fn delete_item(&self, vault_id: &str, item_id: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        Self::enter(&mut state, "delete_item")?;
        let items = state
            .items
            .get_mut(vault_id)
            .ok_or_else(|| ClientError::NotFound(format!("vault {vault_id}")))?;
        let before = items.len();
        items.retain(|i| i.id != item_id);
        if items.len() == before {
            return Err(ClientError::NotFound(format!("item {item_id}")));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.lock().closed = true;
        Ok(())
    }
}
