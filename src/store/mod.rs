//! Store backends that feed the registry's module and provider indices.
//!
//! A backend is a capability set: it may serve modules, providers, both, or
//! only a subset of the operations. Dispatch is a tagged enum rather than a
//! trait object so each variant keeps its concrete method set and the
//! unsupported operations stay explicit.

pub mod github;
pub mod memory;
pub mod s3;

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::StoreError;
use crate::models::{ModuleVersion, ProviderPackage, ProviderVersions};

pub use github::{GithubConfig, GithubStore};
pub use memory::MemoryStore;
pub use s3::{S3Config, S3Store};

/// Byte stream handed back by [`Store::fetch_asset`] for the asset proxy.
pub type AssetStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

/// A configured store backend.
pub enum Store {
    Github(GithubStore),
    S3(S3Store),
    Memory(MemoryStore),
}

impl Store {
    /// Human-readable backend name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Store::Github(_) => "github",
            Store::S3(_) => "s3",
            Store::Memory(_) => "memory",
        }
    }

    /// Rebuilds the backend's indices. Called once at startup and then
    /// periodically by the cache refresher. A failure leaves the previously
    /// published snapshots in place.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        match self {
            Store::Github(s) => s.refresh().await,
            // The object store is consulted live per request.
            Store::S3(_) => Ok(()),
            Store::Memory(_) => Ok(()),
        }
    }

    pub async fn list_module_versions(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> Result<Vec<ModuleVersion>, StoreError> {
        match self {
            Store::Github(s) => s.list_module_versions(namespace, name, provider),
            Store::S3(s) => s.list_module_versions(namespace, name, provider).await,
            Store::Memory(s) => s.list_module_versions(namespace, name, provider),
        }
    }

    pub async fn get_module_version(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
        version: &str,
    ) -> Result<ModuleVersion, StoreError> {
        match self {
            Store::Github(s) => s.get_module_version(namespace, name, provider, version),
            Store::S3(s) => s.get_module_version(namespace, name, provider, version).await,
            Store::Memory(s) => s.get_module_version(namespace, name, provider, version),
        }
    }

    pub async fn list_provider_versions(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ProviderVersions, StoreError> {
        match self {
            Store::Github(s) => s.list_provider_versions(namespace, name),
            Store::S3(_) => Err(StoreError::Unsupported("provider registry")),
            Store::Memory(s) => s.list_provider_versions(namespace, name),
        }
    }

    pub async fn get_provider_package(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<ProviderPackage, StoreError> {
        match self {
            Store::Github(s) => s.get_provider_package(namespace, name, version, os, arch),
            Store::S3(_) => Err(StoreError::Unsupported("provider registry")),
            Store::Memory(s) => s.get_provider_package(namespace, name, version, os, arch),
        }
    }

    /// Fetches a single release asset for streaming through the asset proxy.
    pub async fn fetch_asset(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        asset_name: &str,
    ) -> Result<AssetStream, StoreError> {
        match self {
            Store::Github(s) => s.fetch_asset(owner, repo, tag, asset_name).await,
            Store::S3(_) => Err(StoreError::Unsupported("asset downloads")),
            Store::Memory(s) => s.fetch_asset(owner, repo, tag, asset_name),
        }
    }
}
