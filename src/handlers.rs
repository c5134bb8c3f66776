//! Protocol handlers.
//!
//! Each handler translates URL path parameters into store lookups and
//! serialises the protocol response. Store errors never leak backend
//! identifiers to clients: lookups that fail map to plain 404s.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::auth;
use crate::error::StoreError;
use crate::models::ProviderPackage;
use crate::AppState;

/// Message returned from the index route.
const WELCOME_MESSAGE: &str = "Terraform Registry\n";

/// Prefix that marks a package URL as pointing at the internal asset proxy
/// rather than a public backend address.
const PROXY_URL_PREFIX: &str = "/download";

pub(crate) async fn index() -> &'static str {
    WELCOME_MESSAGE
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Reports runtime health. Always healthy: it only asserts that the HTTP
/// server still handles requests, not cache freshness.
pub(crate) async fn health() -> Response {
    let body = serde_json::to_string(&HealthResponse {
        status: "OK".to_string(),
    })
    .expect("health response serialization");

    (
        [(header::CONTENT_TYPE, "application/json")],
        body + "\n",
    )
        .into_response()
}

#[derive(Serialize, Deserialize)]
pub struct ServiceDiscoveryResponse {
    #[serde(rename = "modules.v1")]
    pub modules_v1: String,
    #[serde(rename = "providers.v1")]
    pub providers_v1: String,
}

/// Terraform service discovery document.
/// https://developer.hashicorp.com/terraform/internals/remote-service-discovery
pub(crate) async fn service_discovery(Path(name): Path<String>) -> Response {
    if name != "terraform.json" {
        return not_found();
    }

    Json(ServiceDiscoveryResponse {
        modules_v1: "/v1/modules/".to_string(),
        providers_v1: "/v1/providers/".to_string(),
    })
    .into_response()
}

#[derive(Serialize, Deserialize)]
pub struct ModuleVersionsResponse {
    pub modules: Vec<ModuleVersionsModule>,
}

#[derive(Serialize, Deserialize, Default)]
pub struct ModuleVersionsModule {
    pub versions: Vec<ModuleVersionsVersion>,
}

#[derive(Serialize, Deserialize)]
pub struct ModuleVersionsVersion {
    pub version: String,
}

/// Lists the available versions for a module.
/// https://developer.hashicorp.com/terraform/internals/module-registry-protocol#list-available-versions-for-a-specific-module
pub(crate) async fn module_versions(
    Path((namespace, name, provider)): Path<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let versions = match state
        .store
        .list_module_versions(&namespace, &name, &provider)
        .await
    {
        Ok(versions) => versions,
        Err(err) => return store_error_response(&err, "ListModuleVersions"),
    };

    // The outer array always carries exactly one element.
    let mut response = ModuleVersionsResponse {
        modules: vec![ModuleVersionsModule::default()],
    };
    response.modules[0].versions = versions
        .into_iter()
        .map(|v| ModuleVersionsVersion { version: v.version })
        .collect();

    Json(response).into_response()
}

/// Returns the download address for a module version in the
/// `X-Terraform-Get` header of a 204 response.
/// https://developer.hashicorp.com/terraform/internals/module-registry-protocol#download-source-code-for-a-specific-module-version
pub(crate) async fn module_download(
    Path((namespace, name, provider, version)): Path<(String, String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let module = match state
        .store
        .get_module_version(&namespace, &name, &provider, &version)
        .await
    {
        Ok(module) => module,
        Err(err) => return store_error_response(&err, "GetModuleVersion"),
    };

    (
        StatusCode::NO_CONTENT,
        [("X-Terraform-Get", module.source_url)],
    )
        .into_response()
}

/// Lists the available versions and platforms for a provider.
/// https://developer.hashicorp.com/terraform/internals/provider-registry-protocol#list-available-versions
pub(crate) async fn provider_versions(
    Path((namespace, name)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.store.list_provider_versions(&namespace, &name).await {
        Ok(versions) => Json(versions).into_response(),
        Err(err) => store_error_response(&err, "ListProviderVersions"),
    }
}

/// Returns the package descriptor for one (version, os, arch).
/// https://developer.hashicorp.com/terraform/internals/provider-registry-protocol#find-a-provider-package
pub(crate) async fn provider_download(
    Path((namespace, name, version, os, arch)): Path<(String, String, String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let package = match state
        .store
        .get_provider_package(&namespace, &name, &version, &os, &arch)
        .await
    {
        Ok(package) => package,
        Err(err) => return store_error_response(&err, "GetProviderPackage"),
    };

    // Terraform does not send registry auth headers when downloading assets,
    // so packages served through the internal proxy get a short-lived signed
    // ticket appended to their URLs. The indexed package is copied first; the
    // snapshot is never mutated.
    if package.download_url.starts_with(PROXY_URL_PREFIX) && !state.auth_disabled {
        let ticket = match auth::issue_asset_ticket(&state.asset_download_auth_secret) {
            Ok(ticket) => ticket,
            Err(err) => {
                error!(error = %err, "GetProviderPackage: unable to create asset ticket");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
                    .into_response();
            }
        };
        return Json(with_ticket(package, &ticket)).into_response();
    }

    Json(package).into_response()
}

fn with_ticket(package: ProviderPackage, ticket: &str) -> ProviderPackage {
    let mut signed = package;
    signed.download_url = format!("{}?token={ticket}", signed.download_url);
    signed.shasums_url = format!("{}?token={ticket}", signed.shasums_url);
    signed.shasums_signature_url = format!("{}?token={ticket}", signed.shasums_signature_url);
    signed
}

/// Streams a release asset through the registry. Used when provider
/// binaries are not reachable on a public webserver.
pub(crate) async fn provider_asset_download(
    Path((namespace, name, version, asset_name)): Path<(String, String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let stream = match state
        .store
        .fetch_asset(&namespace, &name, &version, &asset_name)
        .await
    {
        Ok(stream) => stream,
        Err(err) => return store_error_response(&err, "ProviderAssetDownload"),
    };

    // A failure mid-stream aborts the response rather than padding it; the
    // byte count written so far is logged for diagnosis.
    let mut written: u64 = 0;
    let counted = stream.map(move |chunk| match chunk {
        Ok(bytes) => {
            written += bytes.len() as u64;
            Ok(bytes)
        }
        Err(err) => {
            error!(bytes_written = written, error = %err, "ProviderAssetDownload: stream aborted");
            Err(err)
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(counted))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Fallback for unmatched paths inside the protocol namespace, so the auth
/// middleware still runs for them.
pub(crate) async fn not_found_fallback() -> Response {
    not_found()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found\n").into_response()
}

/// All store errors surface to the client as 404; the distinction only
/// matters for logging.
fn store_error_response(err: &StoreError, operation: &str) -> Response {
    match err {
        StoreError::NotFound(_) => debug!(error = %err, "{operation}"),
        StoreError::Unsupported(_) => warn!(error = %err, "{operation}"),
        _ => error!(error = %err, "{operation}"),
    }
    not_found()
}
