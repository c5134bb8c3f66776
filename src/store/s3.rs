//! S3-backed module store.
//!
//! Modules live under `<prefix>/<namespace>/<name>/<provider>/<version>/<version>.zip`
//! and are consulted live: listings enumerate the three-part key prefix and
//! version lookups HEAD the expected key. This backend serves modules only.

use std::sync::LazyLock;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use regex::Regex;
use tracing::warn;

use crate::error::StoreError;
use crate::models::ModuleVersion;

/// SemVer as suggested by https://semver.org, anchored inside a
/// `namespace/name/provider/<version>` key prefix.
static MODULE_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let version = r"(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-(?:(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+(?:[0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?";
    Regex::new(&format!(r"^\w+/\w+/\w+/{version}")).expect("module key regex")
});

/// Configuration for [`S3Store`].
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    /// Optional key prefix the module tree lives under.
    pub prefix: Option<String>,
    /// Custom endpoint URL for S3-compatible stores.
    pub endpoint: Option<String>,
    /// Path-style addressing, required by most S3-compatible stores.
    pub force_path_style: bool,
}

impl S3Config {
    pub fn new(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            prefix: None,
            endpoint: None,
            force_path_style: false,
        }
    }
}

/// Store implementation reading module archives from an S3 bucket.
pub struct S3Store {
    client: Client,
    region: String,
    bucket: String,
    prefix: Option<String>,
}

impl S3Store {
    /// Creates a store using credentials from the ambient AWS environment.
    pub async fn new(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            region: config.region,
            bucket: config.bucket,
            prefix: config.prefix,
        }
    }

    pub async fn list_module_versions(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> Result<Vec<ModuleVersion>, StoreError> {
        let address = format!("{namespace}/{name}/{provider}");
        let prefix = format!("{}/", self.full_key(&address));

        let out = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .send()
            .await
            .map_err(StoreError::backend)?;

        let mut versions = Vec::new();
        for object in out.contents() {
            let Some(key) = object.key() else { continue };
            let relative = self.strip_prefix(key);
            if !MODULE_KEY_REGEX.is_match(relative) {
                continue;
            }
            let Some(version) = relative.split('/').nth(3) else {
                continue;
            };
            versions.push(ModuleVersion {
                version: version.to_string(),
                source_url: self.source_url(key),
            });
        }

        if versions.is_empty() {
            return Err(StoreError::not_found(format!("module '{address}'")));
        }
        Ok(versions)
    }

    pub async fn get_module_version(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
        version: &str,
    ) -> Result<ModuleVersion, StoreError> {
        let address = format!("{namespace}/{name}/{provider}");
        let relative = format!("{address}/{version}");

        // Validate the version shape before any backend call is made.
        if !MODULE_KEY_REGEX.is_match(&relative) {
            warn!(path = relative, "invalid module path requested");
            return Err(StoreError::not_found(format!(
                "module version path '{relative}'"
            )));
        }

        let key = format!("{}/{version}.zip", self.full_key(&relative));
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|_| {
                StoreError::not_found(format!("version '{version}' for module '{address}'"))
            })?;

        Ok(ModuleVersion {
            version: version.to_string(),
            source_url: self.source_url(&key),
        })
    }

    fn full_key(&self, relative: &str) -> String {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{relative}", prefix.trim_end_matches('/'))
            }
            _ => relative.to_string(),
        }
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => key
                .strip_prefix(prefix.trim_end_matches('/'))
                .map(|k| k.trim_start_matches('/'))
                .unwrap_or(key),
            _ => key,
        }
    }

    fn source_url(&self, key: &str) -> String {
        format!(
            "s3::https://{}.s3.{}.amazonaws.com/{key}",
            self.bucket, self.region
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_key_regex_accepts_semver_paths() {
        assert!(MODULE_KEY_REGEX.is_match("ns/name/provider/1.0.0"));
        assert!(MODULE_KEY_REGEX.is_match("ns/name/provider/1.0.0/1.0.0.zip"));
        assert!(MODULE_KEY_REGEX.is_match("ns/name/provider/1.2.3-rc.1"));
        assert!(MODULE_KEY_REGEX.is_match("ns/name/provider/1.2.3+build.5"));
    }

    #[test]
    fn module_key_regex_rejects_invalid_paths() {
        assert!(!MODULE_KEY_REGEX.is_match("ns/name/provider/latest"));
        assert!(!MODULE_KEY_REGEX.is_match("ns/name/provider/v1.0.0"));
        assert!(!MODULE_KEY_REGEX.is_match("ns/name/provider/1.0"));
        assert!(!MODULE_KEY_REGEX.is_match("ns/name/provider/01.0.0"));
        assert!(!MODULE_KEY_REGEX.is_match("ns/name/1.0.0"));
        assert!(!MODULE_KEY_REGEX.is_match(""));
    }

    #[tokio::test]
    async fn source_url_and_prefix_handling() {
        let store = S3Store::new(S3Config {
            prefix: Some("registry/".to_string()),
            ..S3Config::new("eu-north-1", "modules")
        })
        .await;

        assert_eq!(store.full_key("a/b/c"), "registry/a/b/c");
        assert_eq!(store.strip_prefix("registry/a/b/c/1.0.0/1.0.0.zip"), "a/b/c/1.0.0/1.0.0.zip");
        assert_eq!(
            store.source_url("registry/a/b/c/1.0.0/1.0.0.zip"),
            "s3::https://modules.s3.eu-north-1.amazonaws.com/registry/a/b/c/1.0.0/1.0.0.zip"
        );
    }

    #[tokio::test]
    async fn no_prefix_passes_keys_through() {
        let store = S3Store::new(S3Config::new("eu-north-1", "modules")).await;

        assert_eq!(store.full_key("a/b/c"), "a/b/c");
        assert_eq!(store.strip_prefix("a/b/c/1.0.0/1.0.0.zip"), "a/b/c/1.0.0/1.0.0.zip");
    }
}
