//! Process bootstrap: configuration, logging, store construction, background
//! workers and the HTTP accept loop.

mod server;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use terraform_registry::config::{self, LogFormat, Settings, StoreType};
use terraform_registry::store::{GithubConfig, GithubStore, S3Config, S3Store, Store};
use terraform_registry::{cache, watcher, Registry};

use crate::server::TimedIo;

/// Deadline for reading a request head off the wire, enforced by hyper.
const READ_HEADER_TIMEOUT: Duration = Duration::from_secs(3);

/// Deadline for reading a whole request once its first byte arrived.
const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Deadline for writing a response.
const WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// How long a keep-alive connection may sit idle between requests.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll interval for the auth token file.
const TOKEN_WATCH_INTERVAL: Duration = Duration::from_secs(10);

/// Poll interval for backend rate-limit telemetry.
const RATE_LIMIT_POLL_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    init_tracing(&settings);

    config::load_env_json_files(&settings.env_json_files)
        .context("failed to load environment from file(s)")?;
    settings.validate()?;

    // Read again here since --env-json-files may have set it.
    let asset_secret = settings
        .asset_download_auth_secret
        .clone()
        .or_else(|| std::env::var("ASSET_DOWNLOAD_AUTH_SECRET").ok())
        .unwrap_or_default();
    if !settings.auth_disabled
        && settings.store == Some(StoreType::Github)
        && asset_secret.is_empty()
    {
        anyhow::bail!(
            "--asset-download-auth-secret (or ASSET_DOWNLOAD_AUTH_SECRET) is required \
             for the github store unless --auth-disabled is set"
        );
    }

    let store = build_store(&settings).await?;
    let is_github = matches!(store, Store::Github(_));

    let registry = Registry::builder()
        .store(store)
        .auth_disabled(settings.auth_disabled)
        .access_log_disabled(settings.access_log_disabled)
        .access_log_ignored_paths(settings.access_log_ignored_paths.clone())
        .asset_download_auth_secret(asset_secret)
        .build()?;

    let shutdown = CancellationToken::new();

    if settings.auth_disabled {
        warn!("authentication disabled");
    } else {
        let tokens_file = settings
            .auth_tokens_file
            .clone()
            .expect("validated: auth tokens file is set when auth is enabled");
        let reg = registry.clone();
        tokio::spawn(watcher::watch_file(
            tokens_file,
            TOKEN_WATCH_INTERVAL,
            shutdown.clone(),
            move |bytes| match config::parse_auth_tokens(bytes) {
                Ok(tokens) => {
                    if tokens.is_empty() {
                        warn!("no tokens loaded from auth token file");
                    }
                    let count = tokens.len();
                    reg.set_auth_tokens(tokens);
                    info!(count, "successfully loaded auth tokens");
                }
                Err(err) => {
                    error!(error = %err, "failed to load auth tokens");
                }
            },
        ));
        info!("authentication enabled");
    }

    // Fill the store cache before serving, then keep it fresh.
    debug!("loading store cache");
    cache::refresh(&registry.store()).await;
    cache::spawn_refresher(registry.store(), cache::REFRESH_INTERVAL, shutdown.clone());

    if is_github {
        spawn_rate_limit_telemetry(registry.store(), shutdown.clone());
    }

    let app = registry.create_router();
    let addr = settings.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let tls_acceptor = if settings.tls_enabled {
        // Presence of both files is checked during validation.
        let cert = settings.tls_cert_file.as_deref().unwrap_or(Path::new(""));
        let key = settings.tls_key_file.as_deref().unwrap_or(Path::new(""));
        Some(build_tls_acceptor(cert, key)?)
    } else {
        None
    };

    info!(
        tls = settings.tls_enabled,
        listen_addr = %addr,
        "starting HTTP server"
    );

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        error!(error = %err, "failed to accept connection");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                tokio::spawn(handle_connection(stream, tls_acceptor.clone(), app.clone()));
            }
        }
    }

    info!("server stopped");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Console => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Constructs the configured store backend, pulling credentials from the
/// environment.
async fn build_store(settings: &Settings) -> anyhow::Result<Store> {
    match settings.store {
        Some(StoreType::Github) => {
            let token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
            let store = GithubStore::new(GithubConfig {
                owner_filter: settings.github_owner_filter.clone(),
                topic_filter: settings.github_topic_filter.clone(),
                provider_owner_filter: settings.github_provider_owner_filter.clone(),
                provider_topic_filter: settings.github_provider_topic_filter.clone(),
                token,
                base_uri: None,
            })
            .context("failed to create github store")?;
            Ok(Store::Github(store))
        }
        Some(StoreType::S3) => {
            // Presence is checked during validation.
            let region = settings.s3_region.clone().unwrap_or_default();
            let bucket = settings.s3_bucket.clone().unwrap_or_default();
            let store = S3Store::new(S3Config {
                prefix: settings.s3_prefix.clone(),
                endpoint: settings.s3_endpoint.clone(),
                force_path_style: settings.s3_force_path_style,
                ..S3Config::new(region, bucket)
            })
            .await;
            Ok(Store::S3(store))
        }
        None => anyhow::bail!("a store backend must be selected with --store"),
    }
}

/// Periodically logs how much of the backend rate budget remains.
fn spawn_rate_limit_telemetry(store: Arc<Store>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let Store::Github(github) = store.as_ref() else {
            return;
        };
        let mut ticker = tokio::time::interval(RATE_LIMIT_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    match github.rate_limit().await {
                        Ok((remaining, limit)) => {
                            debug!(remaining, limit, "github rate limit");
                        }
                        Err(err) => {
                            debug!(error = %err, "failed to read github rate limit");
                        }
                    }
                }
            }
        }
    });
}

fn build_tls_acceptor(cert_file: &Path, key_file: &Path) -> anyhow::Result<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(
        File::open(cert_file)
            .with_context(|| format!("failed to open --tls-cert-file {}", cert_file.display()))?,
    ))
    .collect::<Result<Vec<_>, _>>()
    .context("failed to parse TLS certificates")?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key_file)
            .with_context(|| format!("failed to open --tls-key-file {}", key_file.display()))?,
    ))
    .context("failed to parse TLS private key")?
    .with_context(|| format!("no private key found in {}", key_file.display()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid TLS certificate/key pair")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

async fn handle_connection(
    stream: TcpStream,
    tls_acceptor: Option<TlsAcceptor>,
    app: axum::Router,
) {
    match tls_acceptor {
        Some(acceptor) => {
            match tokio::time::timeout(READ_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls_stream)) => serve_connection(tls_stream, app).await,
                Ok(Err(err)) => debug!(error = %err, "TLS handshake failed"),
                Err(_) => debug!("TLS handshake timed out"),
            }
        }
        None => serve_connection(stream, app).await,
    }
}

/// Serves one connection. hyper enforces the header-read deadline; the
/// request-read, response-write and keep-alive idle deadlines sit on the
/// wrapped IO underneath it.
async fn serve_connection<I>(stream: I, app: axum::Router)
where
    I: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(TimedIo::new(
        stream,
        READ_TIMEOUT,
        WRITE_TIMEOUT,
        IDLE_TIMEOUT,
    ));
    let service = TowerToHyperService::new(app);
    let result = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(READ_HEADER_TIMEOUT)
        .serve_connection(io, service)
        .await;

    if let Err(err) = result {
        debug!(error = %err, "connection error");
    }
}
