mod config;

use clap::{Parser, Subcommand};
use config::RelayConfig;
use relay_backends::{
    validate_environment, BackendConfig, BackendProvider, BackendRegistry, FailoverOrchestrator,
    StatsTracker,
};
use relay_gateway::{CorsConfig, GatewayServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay", version, about = "Relay: streaming chat failover gateway")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, global = true, default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List the backend rotation
    Backends,
    /// Check that every backend has a credential
    Check,
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Ok(path) = dotenvy::dotenv() {
        info!(path = %path.display(), "Loaded environment file");
    }

    let mut config = RelayConfig::load(&cli.config).await?;
    config.apply_port_override(std::env::var("PORT").ok())?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(&config, &host, port).await?;
        }
        Commands::Backends => {
            let backends = config.backends()?;
            println!("Backend rotation:");
            for (i, backend) in backends.iter().enumerate() {
                println!("  {}", describe_backend(i, backend));
            }
            println!("\nTotal: {} backend(s)", backends.len());
        }
        Commands::Check => {
            let missing = validate_environment(&config.backends()?);
            if missing.is_empty() {
                println!("All backend credentials are present.");
            } else {
                for warning in &missing {
                    println!("{warning}");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn serve(config: &RelayConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let backends = config.backends()?;

    // Missing credentials are not fatal; the orchestrator routes around them.
    let missing = validate_environment(&backends);
    for warning in &missing {
        warn!("{warning}");
    }
    if !missing.is_empty() {
        warn!("Some services may not work correctly");
    }

    let registry = Arc::new(BackendRegistry::from_configs(backends)?);
    info!(backends = ?registry.names(), "Backend rotation configured");

    let orchestrator = FailoverOrchestrator::new(registry, Arc::new(StatsTracker::new()))
        .with_channel_capacity(config.gateway.channel_capacity);
    let cors = CorsConfig::new(&config.gateway.cors_allow_origin)?;
    let app = GatewayServer::build_with_cors(Arc::new(orchestrator), cors);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Relay gateway listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn describe_backend(index: usize, backend: &BackendConfig) -> String {
    let provider = match backend.provider {
        BackendProvider::OpenAiCompatible => "openai_compatible",
        BackendProvider::Gemini => "gemini",
    };
    let credential = if backend.resolve_api_key().is_some() {
        "set"
    } else {
        "missing"
    };
    format!(
        "{}. {} ({provider}, {}) at {} [{}: {credential}]",
        index + 1,
        backend.name,
        backend.model_id,
        backend.base_url(),
        backend.api_key_env,
    )
}
