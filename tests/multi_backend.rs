//! Aggregation scenarios across multiple backends.
//!
//! The priority asymmetry pinned here is deliberate: reads prefer the
//! freshest source (reverse construction order, last index wins on
//! name collisions) while writes go to a stable target (first backend
//! advertising write support). Inverting either order is a regression.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hostvault::{
    Backend, BackendError, Credential, EntityKind, ErrorKind, MemoryBackend, MultiBackend,
    Project, Server, Writer,
};

fn server(id: &str, name: &str, host: &str) -> Server {
    Server {
        id: id.to_string(),
        ..Server::new(name, host)
    }
}

fn multi(backends: Vec<Arc<dyn Backend>>) -> MultiBackend {
    MultiBackend::new(backends)
}

#[tokio::test]
async fn list_dedups_by_name_with_higher_index_winning() {
    // A at priority 0 and B at priority 1 both know "prod-web".
    let a = MemoryBackend::with_servers("a", vec![server("srv1", "prod-web", "host1")]);
    let b = MemoryBackend::with_servers("b", vec![server("srv3", "prod-web", "host2")]);
    let agg = multi(vec![Arc::new(a), Arc::new(b)]);

    let servers = agg.list_servers().await.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].display_name, "prod-web");
    assert_eq!(servers[0].host, "host2");
    assert_eq!(servers[0].id, "srv3");
}

#[tokio::test]
async fn list_keeps_distinct_names_from_all_backends() {
    let a = MemoryBackend::with_servers(
        "a",
        vec![server("s1", "alpha", "h1"), server("s2", "bravo", "h2")],
    );
    let b = MemoryBackend::with_servers("b", vec![server("s3", "charlie", "h3")]);
    let agg = multi(vec![Arc::new(a), Arc::new(b)]);

    let servers = agg.list_servers().await.unwrap();
    let names: Vec<&str> = servers.iter().map(|s| s.display_name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
}

#[tokio::test]
async fn write_goes_to_first_writer_read_prefers_last_backend() {
    // Regression pin for the read/write priority asymmetry.
    let first = Arc::new(MemoryBackend::new("first"));
    let second = Arc::new(MemoryBackend::new("second"));
    let agg = multi(vec![first.clone(), second.clone()]);

    // Write lands on the first-configured writable source...
    let created = agg
        .create_server(Server::new("prod-web", "host-w"))
        .await
        .unwrap();
    assert_eq!(first.list_servers().await.unwrap().len(), 1);
    assert!(second.list_servers().await.unwrap().is_empty());

    // ...while a same-id read prefers the last-configured source.
    let mut shadow = created.clone();
    shadow.host = "host-shadow".to_string();
    second
        .create_server(shadow)
        .await
        .unwrap();
    assert_eq!(agg.get_server(&created.id).await.unwrap().host, "host-shadow");
}

#[tokio::test]
async fn get_scans_in_strict_reverse_order() {
    let low = MemoryBackend::with_servers("low", vec![server("dup", "from-low", "h1")]);
    let mid = MemoryBackend::with_servers("mid", vec![server("dup", "from-mid", "h2")]);
    let high = MemoryBackend::with_servers("high", vec![server("dup", "from-high", "h3")]);
    let agg = multi(vec![Arc::new(low), Arc::new(mid), Arc::new(high)]);

    assert_eq!(agg.get_server("dup").await.unwrap().display_name, "from-high");

    let err = agg.get_server("absent").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn broken_backend_degrades_gracefully() {
    let broken = MemoryBackend::with_servers("broken", vec![server("x", "lost", "h")]);
    broken.close().await.unwrap();
    let healthy = MemoryBackend::with_servers("ok", vec![server("s1", "web", "host1")]);
    let agg = multi(vec![Arc::new(broken), Arc::new(healthy)]);

    // The read still serves what the healthy source has.
    let servers = agg.list_servers().await.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].display_name, "web");
}

#[tokio::test]
async fn projects_and_credentials_concatenate_without_dedup() {
    let a = MemoryBackend::new("a");
    a.seed_project(Project {
        id: "p1".to_string(),
        name: "infra".to_string(),
        description: None,
    });
    a.seed_credential(Credential {
        id: "c1".to_string(),
        name: "key".to_string(),
        username: "root".to_string(),
    });
    let b = MemoryBackend::new("b");
    b.seed_project(Project {
        id: "p1".to_string(),
        name: "infra".to_string(),
        description: None,
    });
    let agg = multi(vec![Arc::new(a), Arc::new(b)]);

    assert_eq!(agg.list_projects().await.unwrap().len(), 2);
    assert_eq!(agg.list_credentials().await.unwrap().len(), 1);
    assert_eq!(agg.get_project("p1").await.unwrap().name, "infra");
    assert_eq!(agg.get_credential("c1").await.unwrap().username, "root");
}

/// Backend whose close always fails, for cleanup-order assertions.
struct FailingClose {
    closed: AtomicBool,
}

#[async_trait]
impl Backend for FailingClose {
    fn id(&self) -> &str {
        "failing-close"
    }

    async fn get_server(&self, id: &str) -> Result<Server, BackendError> {
        Err(BackendError::not_found(EntityKind::Server, id))
    }

    async fn list_servers(&self) -> Result<Vec<Server>, BackendError> {
        Ok(Vec::new())
    }

    async fn get_project(&self, id: &str) -> Result<Project, BackendError> {
        Err(BackendError::not_found(EntityKind::Project, id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>, BackendError> {
        Ok(Vec::new())
    }

    async fn get_credential(&self, id: &str) -> Result<Credential, BackendError> {
        Err(BackendError::not_found(EntityKind::Credential, id))
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>, BackendError> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::SeqCst);
        Err(BackendError::Client("close exploded".to_string()))
    }
}

#[tokio::test]
async fn close_reaches_every_backend_despite_errors() {
    let failing = Arc::new(FailingClose {
        closed: AtomicBool::new(false),
    });
    let tail = Arc::new(MemoryBackend::new("tail"));
    let agg = multi(vec![failing.clone(), tail.clone()]);

    let err = agg.close().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);

    // The failing backend was attempted and the one after it still got
    // closed.
    assert!(failing.closed.load(Ordering::SeqCst));
    let err = tail.list_servers().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}
