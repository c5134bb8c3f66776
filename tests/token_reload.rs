//! End-to-end token rotation: a watcher polls the token file and feeds the
//! registry, so rotated tokens take effect without a restart and malformed
//! content leaves the previous set in place.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{error, warn};

use terraform_registry::store::{MemoryStore, Store};
use terraform_registry::{config, watcher, Registry};

const TICK: Duration = Duration::from_millis(25);
const SETTLE: Duration = Duration::from_millis(200);

fn write_file(file: &tempfile::NamedTempFile, contents: &str) {
    // Rewrite in place the way an operator's config management would.
    let mut handle = file.reopen().unwrap();
    handle.set_len(0).unwrap();
    write!(handle, "{contents}").unwrap();
    handle.sync_all().unwrap();
}

async fn status_with_token(registry: &Registry, token: &str) -> StatusCode {
    let app = registry.create_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/modules/hashicorp/consul/aws/versions")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn tokens_rotate_through_the_file_watcher() {
    let store = MemoryStore::new();
    store.set_module_versions(
        "hashicorp/consul/aws",
        vec![terraform_registry::models::ModuleVersion {
            version: "1.0.0".to_string(),
            source_url: "git::ssh://git@github.com/hashicorp/consul.git?ref=v1.0.0".to_string(),
        }],
    );

    let registry = Registry::builder()
        .store(Store::Memory(store))
        .access_log_disabled(true)
        .build()
        .unwrap();

    let file = tempfile::NamedTempFile::new().unwrap();
    write_file(&file, r#"{"ci":"first-token"}"#);

    let shutdown = CancellationToken::new();
    let watcher_handle = {
        let reg = registry.clone();
        let path = file.path().to_path_buf();
        let shutdown = shutdown.clone();
        tokio::spawn(watcher::watch_file(path, TICK, shutdown, move |bytes| {
            match config::parse_auth_tokens(bytes) {
                Ok(tokens) => {
                    if tokens.is_empty() {
                        warn!("no tokens loaded from auth token file");
                    }
                    reg.set_auth_tokens(tokens);
                }
                Err(err) => error!(error = %err, "failed to load auth tokens"),
            }
        }))
    };

    // Initial load.
    tokio::time::sleep(SETTLE).await;
    assert_eq!(status_with_token(&registry, "first-token").await, StatusCode::OK);
    assert_eq!(
        status_with_token(&registry, "second-token").await,
        StatusCode::FORBIDDEN
    );

    // Malformed content must not clobber the working set.
    write_file(&file, "{not valid json");
    tokio::time::sleep(SETTLE).await;
    assert_eq!(status_with_token(&registry, "first-token").await, StatusCode::OK);

    // Rotation takes effect without a restart.
    write_file(&file, r#"{"ci":"second-token"}"#);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(
        status_with_token(&registry, "first-token").await,
        StatusCode::FORBIDDEN
    );
    assert_eq!(status_with_token(&registry, "second-token").await, StatusCode::OK);

    assert_eq!(
        registry.get_auth_tokens(),
        HashMap::from([("ci".to_string(), "second-token".to_string())])
    );

    shutdown.cancel();
    watcher_handle.await.unwrap();
}
