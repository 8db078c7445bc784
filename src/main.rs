//! Railwatch - Main Entry Point
//!
//! Loads configuration, wires the classifier, roster and upload store into the
//! request workflow, and serves the HTTP surface until SIGINT or SIGTERM.

use railwatch::classifier::{ClassificationTag, Classifier, HttpClassifier, HttpClassifierConfig};
use railwatch::config::ServiceConfig;
use railwatch::lifecycle_span;
use railwatch::observability::{health::HealthMonitor, init_default_logging, metrics::metrics};
use railwatch::resolver::Roster;
use railwatch::routing::RoutingPolicy;
use railwatch::server::{self, AppState};
use railwatch::upload::UploadStore;
use railwatch::workflow::RequestWorkflow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, Instrument};

/// Slack on top of the classifier's own retry budget
const CLASSIFY_TIMEOUT_SLACK_MS: u64 = 1000;

/// Incident image classification and routing service
#[derive(Parser)]
#[command(name = "railwatch")]
#[command(about = "Classifies incident images and routes them to responsible personnel")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "RAILWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Run,
    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting railwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_service(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ServiceConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["railwatch.toml", "config/railwatch.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ServiceConfig::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Provide one with -c/--config or create railwatch.toml"
                .into())
        }
    }
}

async fn run_service(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let collector = metrics();
    collector.set_service_state("initializing");

    let span = lifecycle_span!(service_id = %config.service.id);
    let state = build_state(&config).instrument(span.clone()).await?;
    let addr = config.bind_address()?;

    collector.set_service_state("running");
    info!(parent: &span, address = %addr, "Service is accepting submissions");

    // Set up signal handling for graceful shutdown
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
        metrics().set_service_state("stopping");
    };

    let result = server::serve(state, addr, shutdown).await;

    collector.set_service_state("stopped");
    result.map_err(Into::into)
}

/// Provider factory for classifier adapters named in configuration
struct ClassifierFactory;

impl ClassifierFactory {
    /// The adapter plus the longest one classification may take including retries
    fn create_classifier(
        config: &ServiceConfig,
    ) -> Result<(Arc<dyn Classifier>, Duration), Box<dyn std::error::Error>> {
        match config.classifier.provider.as_str() {
            "http" => {
                let http_config = HttpClassifierConfig::from_service_config(config)?;
                let budget = http_config.retry_budget();
                Ok((Arc::new(HttpClassifier::new(http_config)), budget))
            }
            provider => Err(format!("Unsupported classifier provider: {provider}").into()),
        }
    }
}

/// Bootstrap: build the workflow and shared state from configuration
async fn build_state(config: &ServiceConfig) -> Result<Arc<AppState>, Box<dyn std::error::Error>> {
    let (classifier, retry_budget) = ClassifierFactory::create_classifier(config)?;
    info!(adapter = classifier.name(), url = %config.classifier.url, "Classifier configured");

    let roster = Roster::load_from_file(&config.roster.path)?;
    info!(
        path = %config.roster.path.display(),
        tickets = roster.len(),
        "Roster loaded"
    );

    let uploads = UploadStore::open(&config.uploads.dir)?;
    let policy = RoutingPolicy::new(ClassificationTag::parse(&config.routing.escalation_category)?);

    // Outlasts every attempt and backoff the adapter may make
    let classify_timeout =
        retry_budget.saturating_add(Duration::from_millis(CLASSIFY_TIMEOUT_SLACK_MS));

    let workflow = RequestWorkflow::new(classifier.clone(), Arc::new(roster), uploads, policy)
        .with_classify_timeout(classify_timeout);
    let health = Arc::new(HealthMonitor::new(config.service.id.clone(), classifier));

    Ok(Arc::new(AppState::new(
        workflow,
        health,
        config.uploads.max_bytes,
    )))
}

fn handle_config_command(
    config: ServiceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    println!("Configuration is valid");
    Ok(())
}
