//! Source-agnostic domain entities.
//!
//! Servers, projects and credentials as this layer sees them, with no
//! knowledge of where a record came from. Serialization derives exist
//! only for the fallback cache; backends map their own wire formats
//! onto these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Default SSH port, used when a server's port is 0.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A managed SSH server definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// Unique identifier (per-source; the originating backend assigns it).
    #[serde(default)]
    pub id: String,
    /// User-facing name; the aggregator deduplicates on this
    /// (case-insensitively).
    pub display_name: String,
    /// Hostname or IP address.
    pub host: String,
    /// Login user.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// SSH port; 0 means "use the default" (22).
    #[serde(default, skip_serializing_if = "is_default_port")]
    pub port: u16,
    /// Path to a private key file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    /// ProxyJump-style hop specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Working directory on the remote side, when the server is tied to
    /// a project checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_project_path: Option<String>,
    /// Projects this server belongs to (many-to-many).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_ids: Vec<String>,
    /// Identifier of the vault the record lives in, for vault-sourced
    /// servers. Empty for other sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_id: Option<String>,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Marked as favorite by the user.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub favorite: bool,
    /// Timestamp of the last successful connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<DateTime<Utc>>,
}

fn is_default_port(port: &u16) -> bool {
    *port == 0
}

impl Server {
    /// Creates a server with the required fields set.
    #[must_use]
    pub fn new(display_name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    /// Returns the port to actually connect to (0 maps to 22).
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_SSH_PORT
        } else {
            self.port
        }
    }

    /// Checks the record invariants: non-empty host and display name.
    ///
    /// The port needs no range check (`u16` already bounds it; 0 means
    /// "default").
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.display_name.trim().is_empty() {
            return Err(BackendError::Validation(
                "display name must not be empty".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(BackendError::Validation(
                "host must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Updates the last-connected timestamp to now.
    pub fn mark_connected(&mut self) {
        self.last_connected = Some(Utc::now());
    }
}

/// A project grouping servers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A stored credential reference.
///
/// This layer only tracks identity; secret material never passes
/// through it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login user the credential applies to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
}

/// Optional criteria for narrowing a server listing.
///
/// The zero value matches everything. Semantics, stable across
/// backends that use [`ServerFilter::matches`]:
///
/// - `project_id`: exact membership in `project_ids`
/// - `tags`: AND — the server must carry every listed tag (exact,
///   case-sensitive)
/// - `favorite`: tri-state; `None` means "don't care"
/// - `query`: case-insensitive substring over display name, host and
///   notes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFilter {
    /// Restrict to servers belonging to this project.
    pub project_id: Option<String>,
    /// Tags the server must all carry.
    pub tags: Vec<String>,
    /// Restrict to (non-)favorites.
    pub favorite: Option<bool>,
    /// Free-text search.
    pub query: Option<String>,
}

impl ServerFilter {
    /// Returns true if the filter places no constraint at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.project_id.is_none()
            && self.tags.is_empty()
            && self.favorite.is_none()
            && self.query.is_none()
    }

    /// Returns true if `server` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, server: &Server) -> bool {
        if let Some(ref project_id) = self.project_id {
            if !server.project_ids.iter().any(|p| p == project_id) {
                return false;
            }
        }

        if !self.tags.iter().all(|t| server.tags.contains(t)) {
            return false;
        }

        if let Some(favorite) = self.favorite {
            if server.favorite != favorite {
                return false;
            }
        }

        if let Some(ref query) = self.query {
            let needle = query.to_lowercase();
            let in_name = server.display_name.to_lowercase().contains(&needle);
            let in_host = server.host.to_lowercase().contains(&needle);
            let in_notes = server
                .notes
                .as_ref()
                .is_some_and(|n| n.to_lowercase().contains(&needle));
            if !(in_name || in_host || in_notes) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> Server {
        Server {
            id: "srv1".to_string(),
            display_name: "prod-web".to_string(),
            host: "10.0.0.5".to_string(),
            user: "deploy".to_string(),
            tags: vec!["prod".to_string(), "web".to_string()],
            notes: Some("primary load balancer".to_string()),
            favorite: true,
            ..Server::default()
        }
    }

    #[test]
    fn test_effective_port_defaults() {
        let mut server = sample();
        assert_eq!(server.effective_port(), 22);
        server.port = 2222;
        assert_eq!(server.effective_port(), 2222);
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut server = sample();
        server.host = "  ".to_string();
        let err = server.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut server = sample();
        server.display_name = String::new();
        assert!(server.validate().is_err());

        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_mark_connected_sets_timestamp() {
        let mut server = sample();
        assert!(server.last_connected.is_none());
        server.mark_connected();
        assert!(server.last_connected.is_some());
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = ServerFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&sample()));
    }

    #[test]
    fn test_filter_tags_are_and() {
        let filter = ServerFilter {
            tags: vec!["prod".to_string(), "web".to_string()],
            ..ServerFilter::default()
        };
        assert!(filter.matches(&sample()));

        let filter = ServerFilter {
            tags: vec!["prod".to_string(), "db".to_string()],
            ..ServerFilter::default()
        };
        assert!(!filter.matches(&sample()));
    }

    #[test]
    fn test_filter_query_is_substring_case_insensitive() {
        let filter = ServerFilter {
            query: Some("PROD".to_string()),
            ..ServerFilter::default()
        };
        assert!(filter.matches(&sample()));

        // Matches notes too.
        let filter = ServerFilter {
            query: Some("load balancer".to_string()),
            ..ServerFilter::default()
        };
        assert!(filter.matches(&sample()));

        let filter = ServerFilter {
            query: Some("staging".to_string()),
            ..ServerFilter::default()
        };
        assert!(!filter.matches(&sample()));
    }

    #[test]
    fn test_filter_favorite_tristate() {
        let filter = ServerFilter {
            favorite: Some(false),
            ..ServerFilter::default()
        };
        assert!(!filter.matches(&sample()));

        let filter = ServerFilter {
            favorite: Some(true),
            ..ServerFilter::default()
        };
        assert!(filter.matches(&sample()));
    }

    #[test]
    fn test_filter_project_membership() {
        let mut server = sample();
        server.project_ids = vec!["proj1".to_string()];

        let filter = ServerFilter {
            project_id: Some("proj1".to_string()),
            ..ServerFilter::default()
        };
        assert!(filter.matches(&server));

        let filter = ServerFilter {
            project_id: Some("proj2".to_string()),
            ..ServerFilter::default()
        };
        assert!(!filter.matches(&server));
    }
}
