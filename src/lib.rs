use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod settings;

use application::services::{
    ClusterApi, LanguageModel, QueryService, ThreadSleeper, TracingObserver,
};
use infrastructure::cluster::KUBECTL_PROXY_URL;
use infrastructure::{FixtureCluster, KubeApiClient, OpenAiChatClient, TlsOptions};
use settings::{AppConfig, ClusterSource, ConfigManager, LlmConfig};

pub struct AppHandles {
    pub service: Arc<QueryService>,
    pub config: Arc<ConfigManager>,
    pub config_dir: PathBuf,
}

/// Install the global subscriber once. Filter from `KUBEQUERY_LOG` (default `info`); output
/// goes to stderr, or is appended to `KUBEQUERY_LOG_FILE` when that is set.
pub fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();

    INIT.get_or_init(|| {
        let filter = std::env::var("KUBEQUERY_LOG").unwrap_or_else(|_| "info".into());
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact();

        let log_file = std::env::var_os("KUBEQUERY_LOG_FILE").and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| {
                    eprintln!(
                        "[kubequery] cannot open log file {}: {err}; logging to stderr",
                        PathBuf::from(&path).display()
                    )
                })
                .ok()
        });

        let _ = match log_file {
            Some(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
            None => builder.with_writer(std::io::stderr).try_init(),
        };
    });
}

/// Config directory: `KUBEQUERY_CONFIG_DIR`, else the per-user OS config directory.
pub fn resolve_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("KUBEQUERY_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let dirs = directories::ProjectDirs::from("dev", "kubequery", "kubequery")
        .ok_or_else(|| anyhow!("unable to determine OS config dir"))?;
    Ok(dirs.config_dir().to_path_buf())
}

/// Load configuration and wire the adapters into a ready `QueryService`.
pub fn build_environment() -> Result<AppHandles> {
    let config_dir = resolve_config_dir()?;
    let config = Arc::new(ConfigManager::load(&config_dir));
    let active = config.current();

    let service = build_service(&active)?;
    info!(
        target: "kubequery::bootstrap",
        config = %config.path().display(),
        cluster = active.cluster.id(),
        model = %active.llm.model,
        "environment ready"
    );

    Ok(AppHandles {
        service: Arc::new(service),
        config,
        config_dir,
    })
}

pub fn build_service(config: &AppConfig) -> Result<QueryService> {
    let cluster = build_cluster(&config.cluster).context("failed to initialise cluster access")?;
    let model = build_model(&config.llm).context("failed to initialise language model")?;
    Ok(QueryService::new(
        cluster,
        model,
        Arc::new(TracingObserver),
        Arc::new(ThreadSleeper),
        config.service_config(),
    ))
}

fn build_cluster(source: &ClusterSource) -> Result<Arc<dyn ClusterApi>> {
    let cluster: Arc<dyn ClusterApi> = match source {
        ClusterSource::Auto if KubeApiClient::is_in_cluster() => Arc::new(KubeApiClient::in_cluster()?),
        ClusterSource::Auto => Arc::new(KubeApiClient::new(
            KUBECTL_PROXY_URL,
            None,
            &TlsOptions::default(),
        )?),
        ClusterSource::InCluster => Arc::new(KubeApiClient::in_cluster()?),
        ClusterSource::External {
            api_url,
            token_env,
            ca_cert_path,
            accept_invalid_certs,
        } => {
            let token = match token_env {
                Some(name) => Some(
                    std::env::var(name)
                        .with_context(|| format!("token variable {name} is not set"))?,
                ),
                None => None,
            };
            let tls = TlsOptions {
                ca_cert_path: ca_cert_path.clone(),
                accept_invalid_certs: *accept_invalid_certs,
            };
            Arc::new(KubeApiClient::new(api_url.clone(), token, &tls)?)
        }
        ClusterSource::Fixture { dir } => {
            if !dir.is_dir() {
                bail!("fixture directory {} does not exist", dir.display());
            }
            Arc::new(FixtureCluster::new(dir.clone()))
        }
    };
    Ok(cluster)
}

fn build_model(llm: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    let api_key = std::env::var(&llm.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| anyhow!("API key variable {} is not set", llm.api_key_env))?;
    Ok(Arc::new(OpenAiChatClient::new(
        llm.endpoint.clone(),
        llm.model.clone(),
        api_key,
        Duration::from_secs(llm.timeout_secs.max(1)),
    )))
}

/// Entry point of the `kubequery` service binary.
pub async fn run_service() -> Result<()> {
    init_tracing();

    let handles = tokio::task::spawn_blocking(build_environment)
        .await
        .context("initialisation task panicked")?
        .context("failed to bootstrap kubequery environment")?;

    let server = handles.config.current().server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", server.host, server.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(target: "kubequery::http", %addr, "kubequery listening");

    axum::serve(listener, interfaces::router(handles.service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!(target: "kubequery::http", "kubequery stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "kubequery::http", %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
