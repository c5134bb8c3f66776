//! GitHub-backed store.
//!
//! Modules are discovered from tagged repositories and providers from
//! releases on repositories named `terraform-provider-<name>`. Discovery
//! runs inside [`GithubStore::refresh`]; the protocol lookups only consult
//! the snapshots published by the most recent successful refresh.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Instant;

use futures_util::StreamExt;
use octocrab::models::repos::{Asset as ReleaseAsset, Release};
use octocrab::models::Repository;
use octocrab::{Octocrab, Page};
use pgp::composed::{Deserializable, SignedPublicKey};
use pgp::types::KeyTrait;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{RegistryError, StoreError};
use crate::models::{
    GpgPublicKey, ModuleVersion, Platform, ProviderManifest, ProviderPackage, ProviderVersion,
    ProviderVersions, SigningKeys,
};
use crate::store::AssetStream;

/// Repository name prefix HashiCorp requires for provider repositories.
const PROVIDER_REPO_PREFIX: &str = "terraform-provider-";

/// Protocol versions assumed when a release carries no manifest.
/// https://developer.hashicorp.com/terraform/registry/providers/publishing
const DEFAULT_PROTOCOL_VERSIONS: &[&str] = &["5.0"];

const PER_PAGE: u8 = 100;

/// Matches the `_<os>_<arch>.` fragment of provider binary filenames.
static PLATFORM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_(freebsd|darwin|linux|windows)_([a-zA-Z0-9]+)\.").expect("platform regex")
});

/// Configuration for [`GithubStore`].
#[derive(Debug, Clone, Default)]
pub struct GithubConfig {
    /// Org/user to filter module repositories by. Leave empty for all.
    pub owner_filter: Option<String>,
    /// Topic to filter module repositories by. Leave empty for all.
    pub topic_filter: Option<String>,
    /// Org/user to filter provider repositories by. Leave empty for all.
    pub provider_owner_filter: Option<String>,
    /// Topic to filter provider repositories by. Leave empty for all.
    pub provider_topic_filter: Option<String>,
    /// GitHub access token.
    pub token: String,
    /// Override of the GitHub API base URI, for tests.
    pub base_uri: Option<String>,
}

/// Provider lookup tables published together so a version listed is always
/// resolvable to its per-platform packages within one snapshot.
#[derive(Default)]
struct ProviderIndex {
    versions: HashMap<String, ProviderVersions>,
    packages: HashMap<String, ProviderPackage>,
}

/// Store implementation using GitHub as a backend.
pub struct GithubStore {
    owner_filter: Option<String>,
    topic_filter: Option<String>,
    provider_owner_filter: Option<String>,
    provider_topic_filter: Option<String>,

    client: Octocrab,
    modules: RwLock<Arc<HashMap<String, Vec<ModuleVersion>>>>,
    providers: RwLock<Arc<ProviderIndex>>,
    /// Releases that failed admission, keyed `<provider>/<version>`. Never
    /// evicted before process exit.
    ignored_releases: RwLock<HashSet<String>>,
}

impl GithubStore {
    pub fn new(config: GithubConfig) -> Result<Self, RegistryError> {
        if config.token.is_empty() {
            return Err(RegistryError::MissingGitHubToken);
        }
        if config.owner_filter.is_none()
            && config.topic_filter.is_none()
            && config.provider_owner_filter.is_none()
            && config.provider_topic_filter.is_none()
        {
            return Err(RegistryError::MissingRepositoryFilter);
        }

        let client = match &config.base_uri {
            Some(uri) => Octocrab::builder()
                .base_uri(uri.clone())?
                .personal_token(config.token.clone())
                .build()?,
            None => Octocrab::builder()
                .personal_token(config.token.clone())
                .build()?,
        };

        Ok(Self {
            owner_filter: config.owner_filter,
            topic_filter: config.topic_filter,
            provider_owner_filter: config.provider_owner_filter,
            provider_topic_filter: config.provider_topic_filter,
            client,
            modules: RwLock::new(Arc::new(HashMap::new())),
            providers: RwLock::new(Arc::new(ProviderIndex::default())),
            ignored_releases: RwLock::new(HashSet::new()),
        })
    }

    /// Rebuilds the module index, then the provider index. The module swap
    /// happens first so a client that walks modules and then providers never
    /// sees a provider snapshot ahead of the module snapshot.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        self.reload_modules().await?;
        self.reload_providers().await
    }

    pub fn list_module_versions(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> Result<Vec<ModuleVersion>, StoreError> {
        let key = format!("{namespace}/{name}/{provider}");
        let snapshot = self.module_snapshot();
        match snapshot.get(&key) {
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
        let key = format!("{namespace}/{name}/{provider}");
        let snapshot = self.module_snapshot();
        let versions = snapshot
            .get(&key)
            .ok_or_else(|| StoreError::not_found(format!("module '{key}'")))?;
        versions
            .iter()
            .find(|v| v.version == version)
            .cloned()
            .ok_or_else(|| {
                StoreError::not_found(format!("version '{version}' for module '{key}'"))
            })
    }

    pub fn list_provider_versions(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ProviderVersions, StoreError> {
        let key = format!("{namespace}/{name}");
        let snapshot = self.provider_snapshot();
        snapshot
            .versions
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
        let snapshot = self.provider_snapshot();
        snapshot
            .packages
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("provider '{key}'")))
    }

    /// Fetches a release asset for the proxy route. The requested tag must
    /// correspond to an indexed provider version before the backend is asked
    /// for the release.
    pub async fn fetch_asset(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        asset_name: &str,
    ) -> Result<AssetStream, StoreError> {
        let name_key = repo.strip_prefix(PROVIDER_REPO_PREFIX).unwrap_or(repo);
        let key = format!("{owner}/{name_key}");
        let version = tag.strip_prefix('v').unwrap_or(tag);

        let snapshot = self.provider_snapshot();
        let versions = snapshot
            .versions
            .get(&key)
            .ok_or_else(|| StoreError::not_found(format!("provider '{key}'")))?;
        if !versions.versions.iter().any(|v| v.version == version) {
            return Err(StoreError::not_found(format!(
                "provider version '{tag}' for '{key}'"
            )));
        }

        let release = self
            .client
            .repos(owner, repo)
            .releases()
            .get_by_tag(tag)
            .await
            .map_err(classify_github_error)?;

        let asset = release
            .assets
            .iter()
            .find(|a| a.name == asset_name)
            .ok_or_else(|| {
                StoreError::not_found(format!("asset '{asset_name}' in release '{tag}'"))
            })?;

        let stream = self
            .client
            .repos(owner, repo)
            .release_assets()
            .stream(asset.id.0)
            .await
            .map_err(classify_github_error)?;

        Ok(Box::pin(stream.map(|chunk| chunk.map_err(classify_github_error))))
    }

    /// Remaining and total core-API rate budget of the authenticated client.
    pub async fn rate_limit(&self) -> Result<(u64, u64), StoreError> {
        let limits = self
            .client
            .ratelimit()
            .get()
            .await
            .map_err(classify_github_error)?;
        Ok((limits.rate.remaining as u64, limits.rate.limit as u64))
    }

    fn module_snapshot(&self) -> Arc<HashMap<String, Vec<ModuleVersion>>> {
        Arc::clone(&self.modules.read().expect("module index lock poisoned"))
    }

    fn provider_snapshot(&self) -> Arc<ProviderIndex> {
        Arc::clone(&self.providers.read().expect("provider index lock poisoned"))
    }

    fn is_ignored(&self, key: &str) -> bool {
        self.ignored_releases
            .read()
            .expect("ignore cache lock poisoned")
            .contains(key)
    }

    fn ignore_release(&self, key: String) {
        self.ignored_releases
            .write()
            .expect("ignore cache lock poisoned")
            .insert(key);
    }

    /// Queries the GitHub API and republishes the module snapshot.
    async fn reload_modules(&self) -> Result<(), StoreError> {
        let repos = self
            .search_repositories(&self.owner_filter, &self.topic_filter)
            .await?;

        let mut fresh: HashMap<String, Vec<ModuleVersion>> = HashMap::new();

        for repo in &repos {
            let (owner, name) = owner_repo_name(repo)?;
            let key = format!("{owner}/{name}/generic");

            let tags = self.list_all_tags(&owner, &name).await?;

            let mut versions = Vec::new();
            for tag in &tags {
                // Terraform uses SemVer names without a 'v' prefix.
                let version = tag.strip_prefix('v').unwrap_or(tag);
                if semver::Version::parse(version).is_err() {
                    continue;
                }
                versions.push(ModuleVersion {
                    version: version.to_string(),
                    source_url: format!(
                        "git::ssh://git@github.com/{owner}/{name}.git?ref={tag}"
                    ),
                });
            }

            debug!(name = %key, version_count = versions.len(), "found module");
            if !versions.is_empty() {
                fresh.insert(key, versions);
            }
        }

        *self.modules.write().expect("module index lock poisoned") = Arc::new(fresh);
        Ok(())
    }

    /// Queries the GitHub API and republishes the provider snapshot.
    async fn reload_providers(&self) -> Result<(), StoreError> {
        let repos = self
            .search_repositories(&self.provider_owner_filter, &self.provider_topic_filter)
            .await?;

        if repos.is_empty() {
            warn!(
                owner = self.provider_owner_filter.as_deref().unwrap_or(""),
                topic = self.provider_topic_filter.as_deref().unwrap_or(""),
                "could not find any provider repos matching filter"
            );
        }

        let mut fresh = ProviderIndex::default();

        for repo in &repos {
            let (owner, name) = owner_repo_name(repo)?;

            // HashiCorp requires provider repositories to be named
            // terraform-provider-{NAME}, lowercase.
            let Some(name_key) = name.strip_prefix(PROVIDER_REPO_PREFIX) else {
                continue;
            };
            let private = repo.private.unwrap_or(false);

            let start = Instant::now();
            let releases = self.list_all_releases(&owner, &name).await?;

            let mut versions = Vec::new();
            for release in &releases {
                if let Some(version) =
                    self.admit_release(&owner, &name, name_key, private, release, &mut fresh)
                        .await
                {
                    versions.push(version);
                }
            }

            debug!(
                name = %format!("{owner}/{name_key}"),
                versions = versions.len(),
                duration = ?start.elapsed(),
                "found provider"
            );

            fresh
                .versions
                .insert(format!("{owner}/{name_key}"), ProviderVersions { versions });
        }

        *self.providers.write().expect("provider index lock poisoned") = Arc::new(fresh);
        Ok(())
    }

    /// Validates one release against the admission contract and, when it
    /// holds, inserts its per-platform packages into `fresh`. Invalid
    /// releases are remembered in the ignore cache and skipped on later
    /// refreshes.
    async fn admit_release(
        &self,
        owner: &str,
        repo: &str,
        name_key: &str,
        private: bool,
        release: &Release,
        fresh: &mut ProviderIndex,
    ) -> Option<ProviderVersion> {
        let release_name = release
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&release.tag_name);
        let version = release_name.strip_prefix('v').unwrap_or(release_name);
        let ignore_key = format!("{name_key}/{version}");

        if self.is_ignored(&ignore_key) {
            debug!(
                release = %ignore_key,
                "ignoring release, previously found to be not valid"
            );
            return None;
        }

        let shasums = match self.fetch_shasums(owner, repo, &release.assets).await {
            Ok(Some(shasums)) => shasums,
            Ok(None) => {
                warn!(release = %ignore_key, "not a valid release - could not find SHA checksums");
                self.ignore_release(ignore_key);
                return None;
            }
            Err(err) => {
                warn!(
                    release = %ignore_key,
                    error = %err,
                    "not a valid release - could not fetch SHA checksums"
                );
                self.ignore_release(ignore_key);
                return None;
            }
        };

        let Some(signature) = release
            .assets
            .iter()
            .find(|a| a.name == format!("{}.sig", shasums.filename))
        else {
            warn!(release = %ignore_key, "not a valid release - could not find SHA checksums signature");
            self.ignore_release(ignore_key);
            return None;
        };

        let protocols = match self.fetch_protocols(owner, repo, &release.assets).await {
            Ok(protocols) => protocols,
            Err(err) => {
                warn!(
                    release = %ignore_key,
                    error = %err,
                    "not a valid release - unable to identify provider protocol"
                );
                self.ignore_release(ignore_key);
                return None;
            }
        };

        let signing_key = match self.fetch_gpg_public_key(owner, repo, &release.assets).await {
            Ok(Some(key)) => key,
            Ok(None) | Err(_) => {
                warn!(release = %ignore_key, "not a valid release - unable to get GPG public key");
                self.ignore_release(ignore_key);
                return None;
            }
        };

        let mut platforms = Vec::new();
        for asset in &release.assets {
            // Assets without os/arch in their name are not provider binaries.
            let Some(platform) = extract_os_arch(&asset.name) else {
                continue;
            };

            let (download_url, shasums_url, shasums_signature_url) = if private {
                (
                    proxy_url(owner, repo, version, &asset.name),
                    proxy_url(owner, repo, version, &shasums.filename),
                    proxy_url(owner, repo, version, &signature.name),
                )
            } else {
                (
                    asset.browser_download_url.to_string(),
                    shasums.url.clone(),
                    signature.browser_download_url.to_string(),
                )
            };

            let package = ProviderPackage {
                protocols: protocols.clone(),
                os: platform.os.clone(),
                arch: platform.arch.clone(),
                filename: asset.name.clone(),
                download_url,
                shasums_url,
                shasums_signature_url,
                shasum: shasums.sums.get(&asset.name).cloned().unwrap_or_default(),
                signing_keys: SigningKeys {
                    gpg_public_keys: vec![signing_key.clone()],
                },
            };

            fresh.packages.insert(
                format!("{owner}/{name_key}/{version}/{}/{}", platform.os, platform.arch),
                package,
            );
            platforms.push(platform);
        }

        if platforms.is_empty() {
            return None;
        }

        Some(ProviderVersion {
            version: version.to_string(),
            protocols,
            platforms,
        })
    }

    /// Finds and parses the SHA256SUMS asset. `Ok(None)` means the release
    /// carries no checksum file at all.
    async fn fetch_shasums(
        &self,
        owner: &str,
        repo: &str,
        assets: &[ReleaseAsset],
    ) -> Result<Option<ShaSums>, StoreError> {
        for asset in assets {
            if asset.name.contains("SHA256SUMS") && !asset.name.ends_with(".sig") {
                let bytes = self.download_asset(owner, repo, asset).await?;
                return Ok(Some(ShaSums {
                    sums: parse_shasums(&bytes),
                    url: asset.browser_download_url.to_string(),
                    filename: asset.name.clone(),
                }));
            }
        }
        Ok(None)
    }

    /// Reads `metadata.protocol_versions` from the release manifest, falling
    /// back to the documented default when no manifest asset is present.
    async fn fetch_protocols(
        &self,
        owner: &str,
        repo: &str,
        assets: &[ReleaseAsset],
    ) -> Result<Vec<String>, StoreError> {
        for asset in assets {
            if asset.name.contains("manifest.json") {
                let bytes = self.download_asset(owner, repo, asset).await?;
                let manifest: ProviderManifest =
                    serde_json::from_slice(&bytes).map_err(StoreError::backend)?;
                return Ok(manifest.metadata.protocol_versions);
            }
        }
        Ok(DEFAULT_PROTOCOL_VERSIONS.iter().map(|s| s.to_string()).collect())
    }

    /// Downloads the armored GPG public key attached to the release. The
    /// key ring must parse to exactly one entity.
    async fn fetch_gpg_public_key(
        &self,
        owner: &str,
        repo: &str,
        assets: &[ReleaseAsset],
    ) -> Result<Option<GpgPublicKey>, StoreError> {
        for asset in assets {
            if asset.name.contains("gpg-public-key.pem") {
                let bytes = self.download_asset(owner, repo, asset).await?;
                let (keys, _headers) =
                    SignedPublicKey::from_armor_many(std::io::Cursor::new(&bytes))
                        .map_err(StoreError::backend)?;
                let keys: Vec<SignedPublicKey> = keys
                    .collect::<Result<_, _>>()
                    .map_err(StoreError::backend)?;
                if keys.len() != 1 {
                    return Err(StoreError::Backend(
                        format!("GPG key ring contains {} entities, wanted 1", keys.len())
                            .into(),
                    ));
                }

                return Ok(Some(GpgPublicKey {
                    key_id: hex::encode_upper(keys[0].key_id().as_ref()),
                    ascii_armor: String::from_utf8_lossy(&bytes).into_owned(),
                    ..Default::default()
                }));
            }
        }
        Ok(None)
    }

    async fn download_asset(
        &self,
        owner: &str,
        repo: &str,
        asset: &ReleaseAsset,
    ) -> Result<Vec<u8>, StoreError> {
        let mut stream = self
            .client
            .repos(owner, repo)
            .release_assets()
            .stream(asset.id.0)
            .await
            .map_err(classify_github_error)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify_github_error)?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    /// Fetches all repositories matching the given owner/topic filters.
    async fn search_repositories(
        &self,
        owner_filter: &Option<String>,
        topic_filter: &Option<String>,
    ) -> Result<Vec<Repository>, StoreError> {
        let query = search_query(owner_filter.as_deref(), topic_filter.as_deref());

        let mut page: Page<Repository> = self
            .client
            .search()
            .repositories(&query)
            .per_page(PER_PAGE)
            .send()
            .await
            .map_err(classify_github_error)?;

        let mut all = Vec::new();
        loop {
            all.extend(page.items.drain(..));
            page = match self
                .client
                .get_page::<Repository>(&page.next)
                .await
                .map_err(classify_github_error)?
            {
                Some(next) => next,
                None => break,
            };
        }
        Ok(all)
    }

    /// Lists all tag names of a repository, 100 per page.
    async fn list_all_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>, StoreError> {
        let mut page = self
            .client
            .repos(owner, repo)
            .list_tags()
            .per_page(PER_PAGE)
            .send()
            .await
            .map_err(classify_github_error)?;

        let mut all = Vec::new();
        loop {
            all.extend(page.items.drain(..).map(|t| t.name));
            page = match self
                .client
                .get_page(&page.next)
                .await
                .map_err(classify_github_error)?
            {
                Some(next) => next,
                None => break,
            };
        }
        Ok(all)
    }

    /// Lists all releases of a repository, 100 per page.
    async fn list_all_releases(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Release>, StoreError> {
        let mut page = self
            .client
            .repos(owner, repo)
            .releases()
            .list()
            .per_page(PER_PAGE)
            .send()
            .await
            .map_err(classify_github_error)?;

        let mut all = Vec::new();
        loop {
            all.extend(page.items.drain(..));
            page = match self
                .client
                .get_page::<Release>(&page.next)
                .await
                .map_err(classify_github_error)?
            {
                Some(next) => next,
                None => break,
            };
        }
        Ok(all)
    }
}

/// Parsed SHA256SUMS asset.
struct ShaSums {
    sums: HashMap<String, String>,
    url: String,
    filename: String,
}

/// Parses `hash<whitespace>filename` lines into a filename-to-hash map.
/// Lines that do not have both fields are skipped.
fn parse_shasums(bytes: &[u8]) -> HashMap<String, String> {
    let mut sums = HashMap::new();
    for line in String::from_utf8_lossy(bytes).lines() {
        let mut fields = line.split_whitespace();
        if let (Some(hash), Some(filename)) = (fields.next(), fields.next()) {
            sums.insert(filename.to_string(), hash.to_string());
        }
    }
    sums
}

/// Extracts the operating system and architecture from a release asset name,
/// e.g. `terraform-provider-test_1.0.3_darwin_arm64.zip` yields darwin/arm64.
fn extract_os_arch(name: &str) -> Option<Platform> {
    PLATFORM_REGEX.captures(name).map(|caps| Platform {
        os: caps[1].to_string(),
        arch: caps[2].to_string(),
    })
}

/// Internal proxy path used instead of the backend URL when the repository
/// is private.
fn proxy_url(owner: &str, repo: &str, version: &str, asset_name: &str) -> String {
    format!("/download/provider/{owner}/{repo}/v{version}/asset/{asset_name}")
}

/// Builds the repository search query with quoted literals. Omitted clauses
/// expand to the unconstrained query.
fn search_query(owner_filter: Option<&str>, topic_filter: Option<&str>) -> String {
    let mut clauses = Vec::new();
    if let Some(owner) = owner_filter {
        clauses.push(format!(r#"org:"{owner}""#));
    }
    if let Some(topic) = topic_filter {
        clauses.push(format!(r#"topic:"{topic}""#));
    }
    clauses.join(" ")
}

/// Splits `full_name` into owner and repository name. The owner field on the
/// repository object itself can be empty depending on OAuth scopes.
fn owner_repo_name(repo: &Repository) -> Result<(String, String), StoreError> {
    let full_name = repo.full_name.as_deref().unwrap_or_default();
    match full_name.split('/').collect::<Vec<_>>()[..] {
        [owner, name] if !owner.is_empty() && !name.is_empty() => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(StoreError::Backend(
            format!("repository full_name is not in expected format 'owner/repo', is '{full_name}'")
                .into(),
        )),
    }
}

/// Maps octocrab transport errors onto [`StoreError`], keeping rate-limit
/// exhaustion distinguishable so a refresh cycle can abort and retain the
/// previous snapshot.
fn classify_github_error(err: octocrab::Error) -> StoreError {
    if let octocrab::Error::GitHub { source, .. } = &err {
        let status = source.status_code;
        if (status == http::StatusCode::FORBIDDEN
            || status == http::StatusCode::TOO_MANY_REQUESTS)
            && source.message.to_lowercase().contains("rate limit")
        {
            return StoreError::RateLimited;
        }
    }
    StoreError::backend(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_shasums_maps_filename_to_hash() {
        let body = b"abc123  terraform-provider-test_1.0.0_linux_amd64.zip\n\
                     def456  terraform-provider-test_1.0.0_darwin_arm64.zip\n";
        let sums = parse_shasums(body);
        assert_eq!(sums.len(), 2);
        assert_eq!(
            sums["terraform-provider-test_1.0.0_linux_amd64.zip"],
            "abc123"
        );
        assert_eq!(
            sums["terraform-provider-test_1.0.0_darwin_arm64.zip"],
            "def456"
        );
    }

    #[test]
    fn parse_shasums_skips_malformed_lines() {
        let body = b"onlyonefield\n\nabc123  file.zip\n";
        let sums = parse_shasums(body);
        assert_eq!(sums.len(), 1);
        assert_eq!(sums["file.zip"], "abc123");
    }

    #[test]
    fn extract_os_arch_from_binary_names() {
        let platform =
            extract_os_arch("terraform-provider-test_1.0.3_darwin_arm64.zip").unwrap();
        assert_eq!(platform.os, "darwin");
        assert_eq!(platform.arch, "arm64");

        let platform =
            extract_os_arch("terraform-provider-test_2.1.0_linux_amd64.zip").unwrap();
        assert_eq!(platform.os, "linux");
        assert_eq!(platform.arch, "amd64");
    }

    #[test]
    fn extract_os_arch_rejects_non_binaries() {
        assert!(extract_os_arch("terraform-provider-test_1.0.0_SHA256SUMS").is_none());
        assert!(extract_os_arch("terraform-provider-test_1.0.0_SHA256SUMS.sig").is_none());
        assert!(extract_os_arch("terraform-provider-test_1.0.0_manifest.json").is_none());
        assert!(extract_os_arch("gpg-public-key.pem").is_none());
        assert!(extract_os_arch("terraform-provider-test_1.0.0_solaris_amd64.zip").is_none());
    }

    #[test]
    fn search_query_quotes_filters() {
        assert_eq!(
            search_query(Some("my-org"), Some("terraform-module")),
            r#"org:"my-org" topic:"terraform-module""#
        );
        assert_eq!(search_query(Some("my-org"), None), r#"org:"my-org""#);
        assert_eq!(search_query(None, Some("tm")), r#"topic:"tm""#);
        assert_eq!(search_query(None, None), "");
    }

    #[test]
    fn proxy_url_shape() {
        assert_eq!(
            proxy_url("org", "terraform-provider-test", "1.0.0", "f.zip"),
            "/download/provider/org/terraform-provider-test/v1.0.0/asset/f.zip"
        );
    }

    #[test]
    fn new_requires_token_and_filter() {
        let err = GithubStore::new(GithubConfig {
            owner_filter: Some("org".to_string()),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, RegistryError::MissingGitHubToken));

        let err = GithubStore::new(GithubConfig {
            token: "ghp_test".to_string(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, RegistryError::MissingRepositoryFilter));
    }

    #[test]
    fn empty_indices_report_not_found() {
        let store = GithubStore::new(GithubConfig {
            token: "ghp_test".to_string(),
            owner_filter: Some("org".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert!(store
            .list_module_versions("a", "b", "generic")
            .unwrap_err()
            .is_not_found());
        assert!(store
            .list_provider_versions("a", "b")
            .unwrap_err()
            .is_not_found());
        assert!(store
            .get_provider_package("a", "b", "1.0.0", "linux", "amd64")
            .unwrap_err()
            .is_not_found());
    }
}
