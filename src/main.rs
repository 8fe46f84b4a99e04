use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use driftscan::cache::MemoCache;
use driftscan::config::Config;
use driftscan::gcp::auth::validate_project_id;
use driftscan::gcp::{ApiTransport, Endpoints, GcpClient};
use driftscan::remote::google::{self, GoogleRepositories};
use driftscan::remote::{
    Alerter, Cancellation, CollectingAlerter, RemoteLibrary, ScanError, Scanner, ScannerOptions,
    TypeFilter,
};
use driftscan::resource::{self, MetadataRegistry, ResourceFactory, TerraformResourceFactory};
use driftscan::terraform::downloader::HttpProviderDownloader;
use driftscan::terraform::{
    Locks, ProviderClient, ProviderConfig, ProviderInstaller, ProviderLibrary, TerraformProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Scan live GCP resources for drift detection
#[derive(Parser, Debug)]
#[command(name = "driftscan", version = driftscan::VERSION, about, long_about = None)]
struct Args {
    /// GCP project to scan
    #[arg(short, long)]
    project: Option<String>,

    /// GCP region passed to the provider
    #[arg(short, long)]
    region: Option<String>,

    /// Enrich resources through the Terraform provider
    #[arg(long)]
    deep: bool,

    /// Google provider version to use
    #[arg(long)]
    provider_version: Option<String>,

    /// Dependency lock file pinning provider versions
    #[arg(long)]
    lock_file: Option<PathBuf>,

    /// Resource types to skip (repeatable, trailing `*` matches a prefix)
    #[arg(long = "ignore")]
    ignored_types: Vec<String>,

    /// Number of resource types scanned concurrently
    #[arg(long)]
    parallelism: Option<usize>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("driftscan started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("driftscan").join("driftscan.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".driftscan").join("driftscan.log");
    }
    PathBuf::from("driftscan.log")
}

/// CLI flags win over the persisted configuration
fn merge_args(mut config: Config, args: &Args) -> Config {
    if let Some(project) = &args.project {
        config.project_id = Some(project.clone());
    }
    if let Some(region) = &args.region {
        config.region = Some(region.clone());
    }
    if let Some(version) = &args.provider_version {
        config.provider_version = Some(version.clone());
    }
    if let Some(lock_file) = &args.lock_file {
        config.lock_file = Some(lock_file.clone());
    }
    if let Some(parallelism) = args.parallelism {
        config.parallelism = parallelism;
    }
    config.deep |= args.deep;
    config.ignored_types.extend(args.ignored_types.iter().cloned());
    config
}

fn build_provider(config: &Config, project: &str, region: &str) -> Result<TerraformProvider> {
    let mut provider_config = ProviderConfig::with_default_version("google")
        .context("No pinned version for the google provider")?;
    provider_config.config_dir = config.config_dir.clone();

    let downloader = HttpProviderDownloader::new().context("Failed to build HTTP client")?;
    let mut installer = ProviderInstaller::new(provider_config, Arc::new(downloader));

    if let Some(lock_path) = &config.lock_file {
        let (locks, errors) = Locks::load(lock_path);
        for err in &errors {
            eprintln!("Warning: {}", err);
        }
        installer = installer.with_locks(Arc::new(locks));
    }

    Ok(TerraformProvider::google(
        installer,
        config.provider_version.clone(),
        project,
        region,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let config = merge_args(Config::load(), &args);
    let project = config.effective_project();
    let region = config.effective_region();

    if project.is_empty() {
        anyhow::bail!("No GCP project configured. Set GOOGLE_CLOUD_PROJECT or use --project flag");
    }
    if !validate_project_id(&project) {
        anyhow::bail!("Invalid GCP project ID: {}", project);
    }

    tracing::info!("Using project: {}, region: {}", project, region);

    let client = GcpClient::new(&project, &region)
        .await
        .context("Failed to initialize GCP client")?;
    let endpoints = client.endpoints.clone();
    let transport: Arc<dyn ApiTransport> = Arc::new(client);
    let cache = MemoCache::with_ttl(config.cache_capacity, config.cache_ttl());
    let repositories = GoogleRepositories::new(transport, cache, &endpoints);

    let mut metadata = MetadataRegistry::new();
    resource::google::init_resources_metadata(&mut metadata);
    let factory: Arc<dyn ResourceFactory> =
        Arc::new(TerraformResourceFactory::new(Arc::new(metadata)));

    let mut providers = ProviderLibrary::new();
    let provider: Option<Arc<dyn ProviderClient>> = if config.deep {
        let provider: Arc<dyn ProviderClient> =
            Arc::new(build_provider(&config, &project, &region)?);
        providers.add(provider.clone());
        Some(provider)
    } else {
        None
    };

    let mut library = RemoteLibrary::new();
    google::init(&mut library, &repositories, factory, provider)?;

    let alerter = Arc::new(CollectingAlerter::new());
    let scanner = Scanner::new(
        Arc::new(library),
        alerter.clone() as Arc<dyn Alerter>,
        ScannerOptions {
            deep: config.deep,
            parallelism: config.parallelism,
        },
        Arc::new(TypeFilter::new(config.ignored_types.clone())),
    );

    let cancel = Cancellation::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling scan");
            ctrl_c.cancel();
        }
    });

    let result = scanner.resources(&cancel).await;
    providers.shutdown().await;

    let report = match result {
        Ok(report) => report,
        Err(ScanError::Cancelled) => anyhow::bail!("Scan cancelled"),
        Err(e) => return Err(e.into()),
    };

    for alerts in alerter.retrieve().values() {
        for alert in alerts {
            eprintln!("Warning: {}", alert.message());
        }
    }
    for failure in &report.failures {
        eprintln!("Error: {}", failure);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report.resources).context("Failed to encode resources")?
    );

    Ok(())
}
