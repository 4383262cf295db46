//! certrenew - Main entry point
//!
//! Renews a TLS certificate through ACME DNS-01 and stores it in a
//! versioned store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};

use certrenew::acme::order_timeout_within;
use certrenew::app_config::install_certificate;
use certrenew::{
    update_app_certificate, AcmeIssuer, AppConfigUpdate, CertificateRecord, FileStore,
    PayloadFormat, RenewalOrchestrator, RenewalOutcome, SecureStore,
};
use certrenew_common::Scope;
use certrenew_config::RenewalConfig;

/// Default overall deadline for one renewal attempt
const DEFAULT_DEADLINE_SECS: u64 = 900;

/// certrenew - ACME DNS-01 certificate renewal
#[derive(Parser, Debug)]
#[command(name = "certrenew")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory of the versioned store
    #[arg(long = "store", env = "CERTRENEW_STORE", default_value = "/var/lib/certrenew", global = true)]
    store: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one renewal attempt
    Run {
        /// Configuration file; defaults to the latest stored configuration
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Renew even if the stored certificate is not due
        #[arg(long = "force")]
        force: bool,

        /// Overall deadline for the attempt, in seconds
        #[arg(long = "timeout-secs", default_value_t = DEFAULT_DEADLINE_SECS)]
        timeout_secs: u64,
    },
    /// Validate a configuration file and store it as the latest configuration
    ImportConfig {
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
    },
    /// Write a configuration with placeholder values
    Blueprint {
        #[arg(short = 'o', long = "output", default_value = "acme.blueprint.toml")]
        output: PathBuf,
    },
    /// Show the latest stored certificate
    Show,
    /// Copy the latest certificate into the stored application config
    UpdateAppConfig {
        /// Certificate chain file to install instead of the stored certificate
        #[arg(long = "cert", requires = "key")]
        cert: Option<PathBuf>,

        /// Private key file to install instead of the stored certificate
        #[arg(long = "key", requires = "cert")]
        key: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    match cli.command {
        Commands::Blueprint { output } => write_blueprint(&output),
        Commands::Run {
            config,
            force,
            timeout_secs,
        } => runtime.block_on(run_renewal(
            &cli.store,
            config.as_deref(),
            force,
            Duration::from_secs(timeout_secs),
        )),
        Commands::ImportConfig { config } => runtime.block_on(import_config(&cli.store, &config)),
        Commands::Show => runtime.block_on(show_certificate(&cli.store)),
        Commands::UpdateAppConfig { cert, key } => {
            runtime.block_on(update_app_config(&cli.store, cert.zip(key)))
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
    }
}

fn open_store(path: &Path) -> Result<Arc<FileStore>> {
    let store = FileStore::new(path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn load_config(store: &dyn SecureStore, path: Option<&Path>) -> Result<RenewalConfig> {
    if let Some(path) = path {
        return RenewalConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    let latest = store
        .latest(&Scope::acme_config())
        .await
        .context("No configuration given and none stored; run `certrenew import-config` first")?;
    info!(version = latest.version, "Using stored configuration");
    RenewalConfig::from_toml_str(latest.text()?).context("Stored configuration is invalid")
}

async fn run_renewal(
    store_path: &Path,
    config_path: Option<&Path>,
    force: bool,
    timeout: Duration,
) -> Result<()> {
    let store = open_store(store_path)?;
    let config = load_config(store.as_ref(), config_path).await?;

    // Leaves room under the deadline for cleaning up presented challenges
    let order_timeout = order_timeout_within(timeout, config.api_timeout(), config.domains.len())
        .with_context(|| {
            format!(
                "A {}s deadline leaves no time for the order with api_timeout_secs = {}",
                timeout.as_secs(),
                config.api_timeout().as_secs()
            )
        })?;
    debug!(order_timeout_secs = order_timeout.as_secs(), "Order time budget");

    let issuer = AcmeIssuer::new(config.api_timeout())
        .context("Failed to create ACME client")?
        .with_order_timeout(order_timeout);

    let orchestrator = RenewalOrchestrator::builder()
        .issuer(Arc::new(issuer))
        .store(store)
        .config(config)
        .force(force)
        .build()?;

    let outcome = tokio::time::timeout(timeout, orchestrator.run())
        .await
        .with_context(|| format!("Renewal did not finish within {}s", timeout.as_secs()))??;

    match outcome {
        RenewalOutcome::Disabled => info!("Renewal is disabled in the configuration"),
        RenewalOutcome::NotDue {
            identifier,
            expires_at,
        } => info!(identifier = %identifier, expires_at = %expires_at, "Certificate is not due"),
        RenewalOutcome::Renewed {
            identifier,
            expires_at,
            version,
        } => info!(
            identifier = %identifier,
            expires_at = %expires_at,
            version,
            "Certificate renewed and stored"
        ),
    }
    Ok(())
}

async fn import_config(store_path: &Path, config_path: &Path) -> Result<()> {
    let config = RenewalConfig::from_file(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let store = open_store(store_path)?;

    let description = format!(
        "Imported renewal configuration for domains: {}",
        config.domains.join(", ")
    );
    let version = store
        .save(
            &Scope::acme_config(),
            config.to_toml_string()?.as_bytes(),
            PayloadFormat::Toml,
            &description,
        )
        .await
        .context("Failed to store configuration")?;

    info!(version, "Configuration stored");
    Ok(())
}

fn write_blueprint(output: &Path) -> Result<()> {
    let config = certrenew_config::blueprint();
    std::fs::write(output, config.to_toml_string()?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(path = %output.display(), "Blueprint configuration written");
    warn!("Replace the placeholder email, domains, API token and account key before use");
    Ok(())
}

async fn show_certificate(store_path: &Path) -> Result<()> {
    let store = open_store(store_path)?;
    let latest = store
        .latest(&Scope::certificate_output())
        .await
        .context("No certificate stored")?;
    let record =
        CertificateRecord::from_stored(&latest).context("Stored certificate is unreadable")?;

    println!("version:     {}", latest.version);
    println!("stored at:   {}", latest.created_at);
    println!("identifier:  {}", record.identifier);
    println!("domains:     {}", record.domains.join(", "));
    println!("issued at:   {}", record.issued_at);
    println!("expires at:  {}", record.expires_at);
    println!("description: {}", latest.description);
    Ok(())
}

async fn update_app_config(store_path: &Path, files: Option<(PathBuf, PathBuf)>) -> Result<()> {
    let store = open_store(store_path)?;

    let update = match files {
        Some((cert, key)) => {
            let chain = std::fs::read_to_string(&cert)
                .with_context(|| format!("Failed to read {}", cert.display()))?;
            let private_key = std::fs::read_to_string(&key)
                .with_context(|| format!("Failed to read {}", key.display()))?;
            if chain.trim().is_empty() || private_key.trim().is_empty() {
                bail!("Certificate and key files must not be empty");
            }
            let description = format!(
                "Updated TLS cert/key data from files: {}, {}",
                file_name(&key),
                file_name(&cert)
            );
            install_certificate(store.as_ref(), &chain, &private_key, &description).await?
        }
        None => update_app_certificate(store.as_ref()).await?,
    };

    match update {
        AppConfigUpdate::Unchanged { version } => {
            info!(version, "Application config already up to date")
        }
        AppConfigUpdate::Updated { version } => info!(version, "Application config updated"),
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
