//! A private Terraform registry backed by pluggable stores.
//!
//! This crate implements the Terraform registry protocols (service
//! discovery, modules.v1 and providers.v1) on top of a store backend:
//! GitHub (tagged repositories for modules, validated releases for
//! providers) or S3 (module archives under a key prefix).
//!
//! # Features
//!
//! - **Module registry**: versions discovered from SemVer-shaped repository
//!   tags or object keys, served as `git::ssh://` or `s3::https://` source
//!   addresses.
//! - **Provider registry**: releases admitted only with a complete
//!   manifest/signature/checksum contract; private release assets are
//!   streamed through an authenticated proxy route.
//! - **Bearer authentication**: the token set hot-reloads from a JSON file
//!   without restarting the process.
//! - **Snapshot caching**: a background refresher rebuilds the indices and
//!   swaps them in atomically; requests never see a partially built index.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use terraform_registry::store::{MemoryStore, Store};
//! use terraform_registry::Registry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::builder()
//!         .store(Store::Memory(MemoryStore::new()))
//!         .auth_disabled(true)
//!         .build()?;
//!
//!     let app = registry.create_router();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Authentication
//!
//! The `/v1` namespace requires `Authorization: Bearer <token>` where the
//! token is a value of the configured token map. Asset-proxy routes under
//! `/download/provider` are instead protected by short-lived HMAC tickets
//! that the provider download handler mints into the package URLs.

pub use error::{RegistryError, StoreError};

mod access_log;
pub mod auth;
pub mod cache;
pub mod config;
mod error;
mod handlers;
pub mod models;
pub mod store;
pub mod watcher;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::routing::get;
use axum::{middleware, Router};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use crate::access_log::MakeRequestUuid;
use crate::store::Store;

/// Time budget for one protocol request. The asset-proxy routes are exempt
/// since they stream release binaries of arbitrary size.
const HANDLER_TIMEOUT: Duration = Duration::from_secs(3);

/// The registry. Construct via [`Registry::builder`], then mount the router
/// returned by [`Registry::create_router`] on an HTTP server.
#[derive(Clone)]
pub struct Registry {
    state: Arc<AppState>,
}

/// Shared state consulted by handlers and middleware.
pub(crate) struct AppState {
    pub(crate) auth_disabled: bool,
    pub(crate) access_log_disabled: bool,
    pub(crate) access_log_ignored_paths: Vec<String>,
    pub(crate) asset_download_auth_secret: Vec<u8>,
    pub(crate) auth_tokens: RwLock<Arc<HashMap<String, String>>>,
    pub(crate) store: Arc<Store>,
}

impl Registry {
    /// Creates a new [`RegistryBuilder`] for configuring a registry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use terraform_registry::store::{MemoryStore, Store};
    /// use terraform_registry::Registry;
    ///
    /// let registry = Registry::builder()
    ///     .store(Store::Memory(MemoryStore::new()))
    ///     .auth_disabled(true)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The valid auth tokens configured for this instance. The returned map
    /// is a copy; mutating it does not affect the registry.
    pub fn get_auth_tokens(&self) -> HashMap<String, String> {
        let tokens = self
            .state
            .auth_tokens
            .read()
            .expect("auth token lock poisoned");
        tokens.as_ref().clone()
    }

    /// Replaces the valid auth tokens for this instance. The map is copied;
    /// the caller keeps ownership of its own copy.
    ///
    /// Typically driven by the token file watcher so operators can rotate
    /// tokens without restarting:
    ///
    /// ```rust,no_run
    /// # use std::time::Duration;
    /// # use terraform_registry::{config, watcher, Registry};
    /// # async fn example(registry: Registry) {
    /// let shutdown = tokio_util::sync::CancellationToken::new();
    /// let reg = registry.clone();
    /// tokio::spawn(watcher::watch_file(
    ///     "/etc/terraform-registry/tokens.json".into(),
    ///     Duration::from_secs(10),
    ///     shutdown,
    ///     move |bytes| {
    ///         if let Ok(tokens) = config::parse_auth_tokens(bytes) {
    ///             reg.set_auth_tokens(tokens);
    ///         }
    ///     },
    /// ));
    /// # }
    /// ```
    pub fn set_auth_tokens(&self, tokens: HashMap<String, String>) {
        let fresh = Arc::new(tokens);
        *self
            .state
            .auth_tokens
            .write()
            .expect("auth token lock poisoned") = fresh;
    }

    /// Handle to the configured store, e.g. for the initial cache refresh
    /// and the background refresher.
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.state.store)
    }

    /// Builds the axum router with all registry routes and middleware:
    ///
    /// - `/` and `/health` and `/.well-known/{name}`: unauthenticated
    /// - `/v1/modules/...`, `/v1/providers/...`: bearer-token protected
    /// - `/download/provider/...`: signed-ticket protected asset proxy
    pub fn create_router(&self) -> Router {
        let state = Arc::clone(&self.state);

        let protocol = Router::new()
            .route(
                "/modules/{namespace}/{name}/{provider}/versions",
                get(handlers::module_versions),
            )
            .route(
                "/modules/{namespace}/{name}/{provider}/{version}/download",
                get(handlers::module_download),
            )
            .route(
                "/providers/{namespace}/{name}/versions",
                get(handlers::provider_versions),
            )
            .route(
                "/providers/{namespace}/{name}/{version}/download/{os}/{arch}",
                get(handlers::provider_download),
            )
            .fallback(handlers::not_found_fallback)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                auth::token_auth,
            ))
            .layer(TimeoutLayer::new(HANDLER_TIMEOUT));

        let asset_proxy = Router::new()
            .route(
                "/{namespace}/{name}/{version}/asset/{asset_name}",
                get(handlers::provider_asset_download),
            )
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                auth::asset_download_auth,
            ));

        Router::new()
            .route("/", get(handlers::index))
            .route("/health", get(handlers::health))
            .route("/.well-known/{name}", get(handlers::service_discovery))
            .nest("/v1", protocol)
            .nest("/download/provider", asset_proxy)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                access_log::access_log,
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(state)
    }
}

/// Builder for [`Registry`]. A store backend is required; everything else
/// has defaults matching a locked-down deployment (auth on, access log on).
#[derive(Default)]
pub struct RegistryBuilder {
    store: Option<Store>,
    auth_disabled: bool,
    access_log_disabled: bool,
    access_log_ignored_paths: Vec<String>,
    asset_download_auth_secret: Vec<u8>,
}

impl RegistryBuilder {
    /// Sets the store backend serving modules and providers.
    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Disables bearer-token authentication and asset-ticket checks.
    pub fn auth_disabled(mut self, disabled: bool) -> Self {
        self.auth_disabled = disabled;
        self
    }

    /// Disables the access-log middleware entirely.
    pub fn access_log_disabled(mut self, disabled: bool) -> Self {
        self.access_log_disabled = disabled;
        self
    }

    /// Request paths the access log skips, e.g. `/health`.
    pub fn access_log_ignored_paths(mut self, paths: Vec<String>) -> Self {
        self.access_log_ignored_paths = paths;
        self
    }

    /// HMAC secret for signing asset-download tickets.
    pub fn asset_download_auth_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.asset_download_auth_secret = secret.into();
        self
    }

    /// Validates the configuration and creates the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingStore`] when no store was configured.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let store = self.store.ok_or(RegistryError::MissingStore)?;

        Ok(Registry {
            state: Arc::new(AppState {
                auth_disabled: self.auth_disabled,
                access_log_disabled: self.access_log_disabled,
                access_log_ignored_paths: self.access_log_ignored_paths,
                asset_download_auth_secret: self.asset_download_auth_secret,
                auth_tokens: RwLock::new(Arc::new(HashMap::new())),
                store: Arc::new(store),
            }),
        })
    }
}
