//! Process configuration.
//!
//! Options are parsed from the command line; credentials arrive through the
//! environment (`GITHUB_TOKEN`, `ASSET_DOWNLOAD_AUTH_SECRET`, AWS variables)
//! and can be injected from JSON files via `--env-json-files`. Validation
//! failures are fatal at startup with a message naming the offending option.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::LazyLock;

use clap::{Parser, ValueEnum};
use regex::Regex;
use tracing::{info, warn};

use crate::error::RegistryError;

/// Environment variable names as defined by IEEE Std 1003.1-2001: uppercase
/// letters, digits and underscores, not beginning with a digit.
static ENV_VAR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("env var name regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreType {
    Github,
    S3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Console,
}

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "terraform-registry", version, about = "Private Terraform registry")]
pub struct Settings {
    /// TCP listen address. A bare `:port` binds all interfaces.
    #[arg(long, default_value = ":8080")]
    pub listen_addr: String,

    /// Disable authentication on the protocol and asset-proxy routes.
    #[arg(long)]
    pub auth_disabled: bool,

    /// JSON encoded file containing a map of auth token descriptions and
    /// tokens.
    #[arg(long)]
    pub auth_tokens_file: Option<PathBuf>,

    /// Comma-separated list of paths to JSON encoded files containing a map
    /// of environment variable names and values to set. Keys are uppercased
    /// and '-' is replaced with '_'. Prefix a path with 'myprefix_:' to
    /// prefix all keys in that file with 'MYPREFIX_' before they are set.
    #[arg(long, value_delimiter = ',')]
    pub env_json_files: Vec<String>,

    /// Terminate TLS with the given certificate and key.
    #[arg(long)]
    pub tls_enabled: bool,

    #[arg(long)]
    pub tls_cert_file: Option<PathBuf>,

    #[arg(long)]
    pub tls_key_file: Option<PathBuf>,

    /// Store backend to use.
    #[arg(long, value_enum)]
    pub store: Option<StoreType>,

    /// GitHub org/user filter for module repository discovery.
    #[arg(long)]
    pub github_owner_filter: Option<String>,

    /// GitHub topic filter for module repository discovery.
    #[arg(long)]
    pub github_topic_filter: Option<String>,

    /// GitHub org/user filter for provider repository discovery.
    #[arg(long)]
    pub github_provider_owner_filter: Option<String>,

    /// GitHub topic filter for provider repository discovery.
    #[arg(long)]
    pub github_provider_topic_filter: Option<String>,

    /// AWS region of the module bucket.
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Name of the module bucket.
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Key prefix the module tree lives under.
    #[arg(long)]
    pub s3_prefix: Option<String>,

    /// Custom endpoint URL for S3-compatible stores.
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Use path-style addressing, required by most S3-compatible stores.
    #[arg(long)]
    pub s3_force_path_style: bool,

    /// HMAC secret protecting the provider asset download routes.
    #[arg(long, env = "ASSET_DOWNLOAD_AUTH_SECRET", hide_env_values = true)]
    pub asset_download_auth_secret: Option<String>,

    /// Disable the HTTP access log.
    #[arg(long)]
    pub access_log_disabled: bool,

    /// Comma-separated request paths to exclude from the access log.
    #[arg(long, value_delimiter = ',')]
    pub access_log_ignored_paths: Vec<String>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, value_enum, default_value_t = LogFormat::Console)]
    pub log_format: LogFormat,
}

impl Settings {
    /// Resolves `--listen-addr` into a socket address, accepting the
    /// `:8080` shorthand for all interfaces.
    pub fn socket_addr(&self) -> Result<SocketAddr, RegistryError> {
        let addr = if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        };
        addr.parse().map_err(|_| {
            RegistryError::InvalidConfig(format!(
                "--listen-addr '{}' is not a valid address",
                self.listen_addr
            ))
        })
    }

    /// Cross-field validation run once at startup.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.store.is_none() {
            return Err(RegistryError::InvalidConfig(
                "a store backend must be selected with --store".to_string(),
            ));
        }

        if !self.auth_disabled && self.auth_tokens_file.is_none() {
            return Err(RegistryError::InvalidConfig(
                "--auth-tokens-file is required unless --auth-disabled is set".to_string(),
            ));
        }

        if self.tls_enabled && (self.tls_cert_file.is_none() || self.tls_key_file.is_none()) {
            return Err(RegistryError::InvalidConfig(
                "--tls-cert-file and --tls-key-file are required when --tls-enabled is set"
                    .to_string(),
            ));
        }

        if self.store == Some(StoreType::S3)
            && (self.s3_region.is_none() || self.s3_bucket.is_none())
        {
            return Err(RegistryError::InvalidConfig(
                "--s3-region and --s3-bucket are required for the s3 store".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses the auth token file: a JSON object of description to token.
pub fn parse_auth_tokens(bytes: &[u8]) -> Result<HashMap<String, String>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Loads each `--env-json-files` entry into the process environment. An
/// entry may carry a key prefix separated from the path by ':'.
pub fn load_env_json_files(items: &[String]) -> Result<(), RegistryError> {
    for item in items.iter().filter(|i| !i.is_empty()) {
        let (prefix, filename) = match item.split_once(':') {
            Some((prefix, filename)) => (prefix, filename),
            None => ("", item.as_str()),
        };
        set_env_from_json_file(prefix, filename)?;
    }
    Ok(())
}

/// Reads a JSON object from `filename` and exports each entry as an
/// environment variable. Keys are uppercased, dashes become underscores and
/// names that still do not look like environment variables are skipped.
fn set_env_from_json_file(prefix: &str, filename: &str) -> Result<(), RegistryError> {
    let bytes = std::fs::read(filename).map_err(|err| {
        RegistryError::InvalidConfig(format!("while reading file '{filename}': {err}"))
    })?;
    let vars: HashMap<String, String> = serde_json::from_slice(&bytes).map_err(|err| {
        RegistryError::InvalidConfig(format!("while parsing file '{filename}': {err}"))
    })?;

    for (key, value) in vars {
        let name = format!("{prefix}{key}").to_uppercase().replace('-', "_");
        if !ENV_VAR_NAME.is_match(&name) {
            warn!(
                name,
                expected_pattern = ENV_VAR_NAME.as_str(),
                "unexpected environment variable name format"
            );
            continue;
        }
        std::env::set_var(&name, &value);
        info!(name, file = filename, "environment variable set from file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Settings {
        Settings::try_parse_from(
            std::iter::once("terraform-registry").chain(args.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn defaults() {
        let settings = parse(&[]);
        assert_eq!(settings.listen_addr, ":8080");
        assert!(!settings.auth_disabled);
        assert!(!settings.tls_enabled);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.log_format, LogFormat::Console);
    }

    #[test]
    fn socket_addr_accepts_port_shorthand() {
        let settings = parse(&[]);
        assert_eq!(
            settings.socket_addr().unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );

        let settings = parse(&["--listen-addr", "127.0.0.1:9000"]);
        assert_eq!(
            settings.socket_addr().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );

        let settings = parse(&["--listen-addr", "not-an-address"]);
        assert!(settings.socket_addr().is_err());
    }

    #[test]
    fn validate_requires_store_selection() {
        let settings = parse(&["--auth-disabled"]);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("--store"));
    }

    #[test]
    fn validate_requires_token_file_with_auth_enabled() {
        let settings = parse(&["--store", "github"]);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("--auth-tokens-file"));

        let settings = parse(&["--store", "github", "--auth-tokens-file", "/tokens.json"]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_requires_tls_files_when_enabled() {
        let settings = parse(&["--store", "github", "--auth-disabled", "--tls-enabled"]);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("--tls-cert-file"));
    }

    #[test]
    fn validate_requires_s3_parameters() {
        let settings = parse(&["--store", "s3", "--auth-disabled"]);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("--s3-region"));

        let settings = parse(&[
            "--store",
            "s3",
            "--auth-disabled",
            "--s3-region",
            "eu-north-1",
            "--s3-bucket",
            "modules",
        ]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn asset_secret_comes_from_flag_or_environment() {
        let settings = parse(&["--asset-download-auth-secret", "flag-secret"]);
        assert_eq!(
            settings.asset_download_auth_secret.as_deref(),
            Some("flag-secret")
        );

        std::env::set_var("ASSET_DOWNLOAD_AUTH_SECRET", "env-secret");
        let settings = parse(&[]);
        assert_eq!(
            settings.asset_download_auth_secret.as_deref(),
            Some("env-secret")
        );
        std::env::remove_var("ASSET_DOWNLOAD_AUTH_SECRET");
    }

    #[test]
    fn ignored_paths_split_on_commas() {
        let settings = parse(&["--access-log-ignored-paths", "/health,/metrics"]);
        assert_eq!(settings.access_log_ignored_paths, vec!["/health", "/metrics"]);
    }

    #[test]
    fn parse_auth_tokens_reads_description_token_map() {
        let tokens = parse_auth_tokens(br#"{"deploy":"token-1","ci":"token-2"}"#).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["deploy"], "token-1");
        assert_eq!(tokens["ci"], "token-2");

        assert!(parse_auth_tokens(b"not json").is_err());
        assert!(parse_auth_tokens(br#"["array"]"#).is_err());
    }

    #[test]
    fn env_json_files_set_transformed_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"reg-test-var":"value-1"}}"#).unwrap();
        file.flush().unwrap();

        let item = file.path().display().to_string();
        load_env_json_files(&[item]).unwrap();
        assert_eq!(std::env::var("REG_TEST_VAR").unwrap(), "value-1");
    }

    #[test]
    fn env_json_files_apply_prefix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"secret":"value-2"}}"#).unwrap();
        file.flush().unwrap();

        let item = format!("myprefix_:{}", file.path().display());
        load_env_json_files(&[item]).unwrap();
        assert_eq!(std::env::var("MYPREFIX_SECRET").unwrap(), "value-2");
    }

    #[test]
    fn env_json_files_missing_file_is_fatal() {
        let err =
            load_env_json_files(&["/nonexistent/env.json".to_string()]).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/env.json"));
    }

    #[test]
    fn env_var_name_pattern() {
        assert!(ENV_VAR_NAME.is_match("GITHUB_TOKEN"));
        assert!(ENV_VAR_NAME.is_match("_PRIVATE"));
        assert!(!ENV_VAR_NAME.is_match("1BAD"));
        assert!(!ENV_VAR_NAME.is_match("lowercase"));
        assert!(!ENV_VAR_NAME.is_match("WITH-DASH"));
    }
}
