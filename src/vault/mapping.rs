//! Item ⇄ Server field mapping.
//!
//! Field titles are matched case-insensitively on read; unknown fields
//! are ignored. Writes use a fixed serialization order, elide the port
//! when it is the default, and normalize the membership tag so it is
//! present exactly once no matter what the item carried before.

use crate::error::BackendError;
use crate::model::{DEFAULT_SSH_PORT, Server};
use crate::vault::{Item, ItemField};

/// Sentinel tag marking items managed by this tool.
pub const MEMBERSHIP_TAG: &str = "hostvault";

// Well-known field titles (canonical lowercase forms).
const FIELD_HOSTNAME: &str = "hostname";
const FIELD_USER: &str = "user";
const FIELD_PORT: &str = "port";
const FIELD_IDENTITY_FILE: &str = "identity_file";
const FIELD_PROXY: &str = "proxy";
const FIELD_REMOTE_PROJECT_PATH: &str = "remote_project_path";
const FIELD_PROJECT_IDS: &str = "project_ids";
const FIELD_NOTES: &str = "notes";
const FIELD_FAVORITE: &str = "favorite";

/// Returns true if the item carries the membership tag
/// (case-insensitive exact match).
#[must_use]
pub fn has_membership_tag(item: &Item) -> bool {
    item.tags.iter().any(|t| t.eq_ignore_ascii_case(MEMBERSHIP_TAG))
}

/// Maps a vault item onto a server.
///
/// Hostname and user are required; an item missing either fails to
/// map and is skipped by the enumeration paths. The server's tags are
/// the item's tags minus the membership sentinel.
pub fn item_to_server(item: &Item) -> Result<Server, BackendError> {
    let mut server = Server {
        id: item.id.clone(),
        display_name: item.title.clone(),
        vault_id: Some(item.vault_id.clone()),
        tags: item
            .tags
            .iter()
            .filter(|t| !t.eq_ignore_ascii_case(MEMBERSHIP_TAG))
            .cloned()
            .collect(),
        ..Server::default()
    };

    for field in &item.fields {
        let value = field.value.trim();
        if value.is_empty() {
            continue;
        }
        match field.title.to_lowercase().as_str() {
            FIELD_HOSTNAME => server.host = value.to_string(),
            FIELD_USER => server.user = value.to_string(),
            FIELD_PORT => {
                // An unparseable port falls back to the default
                // rather than failing the whole item.
                server.port = value.parse().unwrap_or(0);
            }
            FIELD_IDENTITY_FILE => server.identity_file = Some(value.to_string()),
            FIELD_PROXY => server.proxy = Some(value.to_string()),
            FIELD_REMOTE_PROJECT_PATH => server.remote_project_path = Some(value.to_string()),
            FIELD_PROJECT_IDS => {
                server.project_ids = value
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
            }
            FIELD_NOTES => server.notes = Some(field.value.clone()),
            FIELD_FAVORITE => server.favorite = value.eq_ignore_ascii_case("true"),
            // Unknown fields are ignored on read.
            _ => {}
        }
    }

    if server.host.is_empty() {
        return Err(BackendError::Validation(format!(
            "item {} has no hostname field",
            item.id
        )));
    }
    if server.user.is_empty() {
        return Err(BackendError::Validation(format!(
            "item {} has no user field",
            item.id
        )));
    }

    Ok(server)
}

/// Maps a server onto a vault item.
///
/// The caller is responsible for `vault_id` being resolved. Optional
/// fields are included only when non-empty, and the port only when it
/// differs from the default, to keep the external item uncluttered.
#[must_use]
pub fn server_to_item(server: &Server) -> Item {
    let mut fields = vec![
        ItemField::new(FIELD_HOSTNAME, &server.host),
        ItemField::new(FIELD_USER, &server.user),
    ];

    if server.port != 0 && server.port != DEFAULT_SSH_PORT {
        fields.push(ItemField::new(FIELD_PORT, server.port.to_string()));
    }
    if let Some(ref identity_file) = server.identity_file {
        fields.push(ItemField::new(FIELD_IDENTITY_FILE, identity_file));
    }
    if let Some(ref proxy) = server.proxy {
        fields.push(ItemField::new(FIELD_PROXY, proxy));
    }
    if let Some(ref path) = server.remote_project_path {
        fields.push(ItemField::new(FIELD_REMOTE_PROJECT_PATH, path));
    }
    if !server.project_ids.is_empty() {
        fields.push(ItemField::new(
            FIELD_PROJECT_IDS,
            server.project_ids.join(","),
        ));
    }
    if let Some(ref notes) = server.notes {
        fields.push(ItemField::new(FIELD_NOTES, notes));
    }
    if server.favorite {
        fields.push(ItemField::new(FIELD_FAVORITE, "true"));
    }

    // Membership tag exactly once, canonical form, regardless of what
    // the server record carries.
    let mut tags: Vec<String> = server
        .tags
        .iter()
        .filter(|t| !t.eq_ignore_ascii_case(MEMBERSHIP_TAG))
        .cloned()
        .collect();
    tags.push(MEMBERSHIP_TAG.to_string());

    Item {
        id: server.id.clone(),
        title: server.display_name.clone(),
        vault_id: server.vault_id.clone().unwrap_or_default(),
        tags,
        fields,
    }
}
