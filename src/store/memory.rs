//! In-memory store without a backend, used by the registry tests.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use futures_util::stream;

use crate::error::StoreError;
use crate::models::{ModuleVersion, ProviderPackage, ProviderVersions};
use crate::store::AssetStream;

#[derive(Default)]
pub struct MemoryStore {
    modules: RwLock<HashMap<String, Vec<ModuleVersion>>>,
    provider_versions: RwLock<HashMap<String, ProviderVersions>>,
    provider_packages: RwLock<HashMap<String, ProviderPackage>>,
    assets: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores module versions under `namespace/name/provider`.
    pub fn set_module_versions(&self, key: impl Into<String>, versions: Vec<ModuleVersion>) {
        self.modules
            .write()
            .expect("module map lock poisoned")
            .insert(key.into(), versions);
    }

    /// Stores the version list for a provider under `namespace/name`.
    pub fn set_provider_versions(&self, key: impl Into<String>, versions: ProviderVersions) {
        self.provider_versions
            .write()
            .expect("provider versions lock poisoned")
            .insert(key.into(), versions);
    }

    /// Stores a package under `namespace/name/version/os/arch`.
    pub fn set_provider_package(&self, key: impl Into<String>, package: ProviderPackage) {
        self.provider_packages
            .write()
            .expect("provider package lock poisoned")
            .insert(key.into(), package);
    }

    /// Stores raw asset bytes under `owner/repo/tag/assetName`.
    pub fn set_asset(&self, key: impl Into<String>, bytes: impl Into<Bytes>) {
        self.assets
            .write()
            .expect("asset map lock poisoned")
            .insert(key.into(), bytes.into());
    }

    pub fn list_module_versions(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> Result<Vec<ModuleVersion>, StoreError> {
        let key = format!("{namespace}/{name}/{provider}");
        let modules = self.modules.read().expect("module map lock poisoned");
        match modules.get(&key) {
            Some(versions) if !versions.is_empty() => Ok(versions.clone()),
            _ => Err(StoreError::not_found(format!("module '{key}'"))),
        }
    }

    pub fn get_module_version(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
        version: &str,
    ) -> Result<ModuleVersion, StoreError> {
        let versions = self.list_module_versions(namespace, name, provider)?;
        versions
            .into_iter()
            .find(|v| v.version == version)
            .ok_or_else(|| {
                StoreError::not_found(format!(
                    "version '{version}' for module '{namespace}/{name}/{provider}'"
                ))
            })
    }

    pub fn list_provider_versions(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ProviderVersions, StoreError> {
        let key = format!("{namespace}/{name}");
        self.provider_versions
            .read()
            .expect("provider versions lock poisoned")
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("provider '{key}'")))
    }

    pub fn get_provider_package(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> Result<ProviderPackage, StoreError> {
        let key = format!("{namespace}/{name}/{version}/{os}/{arch}");
        self.provider_packages
            .read()
            .expect("provider package lock poisoned")
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("provider '{key}'")))
    }

    pub fn fetch_asset(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        asset_name: &str,
    ) -> Result<AssetStream, StoreError> {
        let key = format!("{owner}/{repo}/{tag}/{asset_name}");
        let bytes = self
            .assets
            .read()
            .expect("asset map lock poisoned")
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("asset '{key}'")))?;
        Ok(Box::pin(stream::once(async move { Ok(bytes) })))
    }
}
