//! CLI-backed vault client.
//!
//! Shells out to the password manager's command-line tool (`op` by
//! default), asks for JSON output and maps the tool's vocabulary
//! (`label`/`value` fields, nested vault references) onto this layer's
//! [`Vault`]/[`Item`] model. Failures carry the tool's stderr verbatim
//! so the sync status classifier can see lock phrasing.

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::vault::{Client, ClientError, Item, ItemField, Vault};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default CLI program name.
pub const DEFAULT_PROGRAM: &str = "op";

/// Item category used for records this tool creates.
const ITEM_CATEGORY: &str = "server";

/// Vault client shelling out to an external CLI tool.
#[derive(Debug)]
pub struct CliClient {
    program: String,
    closed: AtomicBool,
}

impl CliClient {
    /// Creates a client using the default program (`op`).
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Creates a client using a custom program name or path.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Runs the tool and returns its stdout, folding a non-zero exit
    /// into a [`ClientError::Command`] carrying stderr.
    async fn run(&self, args: &[String]) -> Result<Vec<u8>, ClientError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ClientError::Closed);
        }

        trace!(program = %self.program, ?args, "running vault cli");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(program = %self.program, %stderr, "vault cli failed");
            return Err(ClientError::Command(stderr));
        }
        Ok(output.stdout)
    }
}

impl Default for CliClient {
    fn default() -> Self {
        Self::new()
    }
}

// --- the tool's JSON vocabulary ---

#[derive(Debug, Deserialize)]
struct RawVault {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawVaultRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(default)]
    label: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: String,
    title: String,
    vault: RawVaultRef,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    fields: Vec<RawField>,
}

impl From<RawItem> for Item {
    fn from(raw: RawItem) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            vault_id: raw.vault.id,
            tags: raw.tags,
            fields: raw
                .fields
                .into_iter()
                .filter(|f| !f.label.is_empty())
                .map(|f| ItemField::new(f.label, f.value.unwrap_or_default()))
                .collect(),
        }
    }
}

fn decode_vaults(stdout: &[u8]) -> Result<Vec<Vault>, ClientError> {
    let raw: Vec<RawVault> = serde_json::from_slice(stdout)?;
    Ok(raw
        .into_iter()
        .map(|v| Vault {
            id: v.id,
            name: v.name,
        })
        .collect())
}

fn decode_items(stdout: &[u8]) -> Result<Vec<Item>, ClientError> {
    let raw: Vec<RawItem> = serde_json::from_slice(stdout)?;
    Ok(raw.into_iter().map(Item::from).collect())
}

fn decode_item(stdout: &[u8]) -> Result<Item, ClientError> {
    let raw: RawItem = serde_json::from_slice(stdout)?;
    Ok(raw.into())
}

// --- argument builders (pure, unit tested) ---

fn vault_list_args() -> Vec<String> {
    svec(&["vault", "list", "--format=json"])
}

fn item_list_args(vault_id: &str) -> Vec<String> {
    let mut args = svec(&["item", "list", "--vault", vault_id, "--format=json"]);
    args.push("--long".to_string());
    args
}

fn item_get_args(vault_id: &str, item_id: &str) -> Vec<String> {
    svec(&["item", "get", item_id, "--vault", vault_id, "--format=json"])
}

fn item_create_args(item: &Item) -> Vec<String> {
    let mut args = svec(&[
        "item",
        "create",
        "--vault",
        &item.vault_id,
        "--category",
        ITEM_CATEGORY,
        "--title",
        &item.title,
        "--format=json",
    ]);
    push_tags(&mut args, item);
    push_assignments(&mut args, item);
    args
}

fn item_edit_args(item: &Item) -> Vec<String> {
    let mut args = svec(&[
        "item",
        "edit",
        &item.id,
        "--vault",
        &item.vault_id,
        "--title",
        &item.title,
        "--format=json",
    ]);
    push_tags(&mut args, item);
    push_assignments(&mut args, item);
    args
}

fn item_delete_args(vault_id: &str, item_id: &str) -> Vec<String> {
    svec(&["item", "delete", item_id, "--vault", vault_id])
}

fn push_tags(args: &mut Vec<String>, item: &Item) {
    if !item.tags.is_empty() {
        args.push("--tags".to_string());
        args.push(item.tags.join(","));
    }
}

fn push_assignments(args: &mut Vec<String>, item: &Item) {
    for field in &item.fields {
        args.push(format!("{}[text]={}", field.title, field.value));
    }
}

fn svec(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

#[async_trait]
impl Client for CliClient {
    async fn list_vaults(&self) -> Result<Vec<Vault>, ClientError> {
        let stdout = self.run(&vault_list_args()).await?;
        decode_vaults(&stdout)
    }

    async fn list_items(&self, vault_id: &str) -> Result<Vec<Item>, ClientError> {
        let stdout = self.run(&item_list_args(vault_id)).await?;
        decode_items(&stdout)
    }

    async fn get_item(&self, vault_id: &str, item_id: &str) -> Result<Item, ClientError> {
        let stdout = self.run(&item_get_args(vault_id, item_id)).await?;
        decode_item(&stdout)
    }

    async fn create_item(&self, item: &Item) -> Result<Item, ClientError> {
        let stdout = self.run(&item_create_args(item)).await?;
        decode_item(&stdout)
    }

    async fn update_item(&self, item: &Item) -> Result<Item, ClientError> {
        let stdout = self.run(&item_edit_args(item)).await?;
        decode_item(&stdout)
    }

    async fn delete_item(&self, vault_id: &str, item_id: &str) -> Result<(), ClientError> {
        self.run(&item_delete_args(vault_id, item_id)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        // Nothing to tear down beyond refusing further calls; the tool
        // is invoked per operation.
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_vault_list() {
        let json = r#"[
            {"id": "v1", "name": "Infrastructure", "content_version": 7},
            {"id": "v2", "name": "Personal"}
        ]"#;
        let vaults = decode_vaults(json.as_bytes()).unwrap();
        assert_eq!(vaults.len(), 2);
        assert_eq!(vaults[0].id, "v1");
        assert_eq!(vaults[1].name, "Personal");
    }

    #[test]
    fn test_decode_item_with_fields() {
        let json = r#"{
            "id": "item1",
            "title": "prod-web",
            "version": 3,
            "vault": {"id": "v1", "name": "Infrastructure"},
            "category": "SERVER",
            "tags": ["hostvault", "prod"],
            "fields": [
                {"id": "f1", "type": "STRING", "label": "hostname", "value": "10.0.0.5"},
                {"id": "f2", "type": "STRING", "label": "user", "value": "deploy"},
                {"id": "f3", "type": "STRING", "label": "empty"},
                {"id": "f4", "type": "CONCEALED", "value": "no-label"}
            ]
        }"#;

        let item = decode_item(json.as_bytes()).unwrap();
        assert_eq!(item.vault_id, "v1");
        assert_eq!(item.tags, vec!["hostvault", "prod"]);
        // Unlabeled fields are dropped; labeled ones keep an empty
        // value rather than failing.
        assert_eq!(item.fields.len(), 3);
        assert_eq!(item.fields[0].value, "10.0.0.5");
        assert_eq!(item.fields[2].value, "");
    }

    #[test]
    fn test_decode_garbage_is_an_error() {
        assert!(matches!(
            decode_items(b"op: not signed in"),
            Err(ClientError::Json(_))
        ));
    }

    #[test]
    fn test_create_args_include_category_tags_and_fields() {
        let item = Item {
            id: String::new(),
            title: "prod-web".to_string(),
            vault_id: "v1".to_string(),
            tags: vec!["hostvault".to_string()],
            fields: vec![
                ItemField::new("hostname", "10.0.0.5"),
                ItemField::new("user", "deploy"),
            ],
        };

        let args = item_create_args(&item);
        assert_eq!(args[0..2], ["item", "create"]);
        assert!(args.contains(&"--vault".to_string()));
        assert!(args.contains(&"v1".to_string()));
        assert!(args.contains(&"--tags".to_string()));
        assert!(args.contains(&"hostvault".to_string()));
        assert!(args.contains(&"hostname[text]=10.0.0.5".to_string()));
        assert!(args.contains(&"user[text]=deploy".to_string()));
    }

    #[test]
    fn test_edit_args_reference_existing_item() {
        let item = Item {
            id: "item1".to_string(),
            title: "prod-web".to_string(),
            vault_id: "v1".to_string(),
            tags: Vec::new(),
            fields: Vec::new(),
        };

        let args = item_edit_args(&item);
        assert_eq!(args[0..3], ["item", "edit", "item1"]);
        assert!(!args.contains(&"--tags".to_string()));
    }

    #[test]
    fn test_delete_args() {
        assert_eq!(
            item_delete_args("v1", "item1"),
            vec!["item", "delete", "item1", "--vault", "v1"]
        );
    }

    #[tokio::test]
    async fn test_closed_client_refuses_calls() {
        let client = CliClient::with_program("definitely-not-a-real-binary");
        client.close().await.unwrap();
        assert!(matches!(
            client.list_vaults().await,
            Err(ClientError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let client = CliClient::with_program("hostvault-test-missing-binary");
        assert!(matches!(
            client.list_vaults().await,
            Err(ClientError::Io(_))
        ));
    }
}
