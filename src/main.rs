use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use view_gateway::config::{GatewayConfig, OrchestratorKind};

/// Environment variable overriding the gateway domain
const HOSTNAME_ENV: &str = "GATEWAY_HOSTNAME";

/// View Gateway: on-demand per-view workloads behind one HTTP entrypoint
#[derive(Parser)]
#[command(name = "view-gateway", version, about)]
struct Cli {
    /// Path to configuration file (.hcl)
    #[arg(short, long, default_value = "gateway.hcl")]
    config: String,

    /// Override listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the gateway domain views are addressed under
    #[arg(long)]
    hostname: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file without starting the gateway
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long, default_value = "gateway.hcl")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> view_gateway::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Validate { config: config_path }) = &cli.command {
        return validate_config(config_path).await;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    tracing::info!("View Gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut config = if std::path::Path::new(&cli.config).exists() {
        tracing::info!(config = cli.config, "Loading configuration");
        GatewayConfig::from_file(&cli.config).await?
    } else {
        tracing::warn!("Config file not found, using defaults");
        GatewayConfig::default()
    };

    // CLI flag wins over the environment, which wins over the file
    if let Ok(hostname) = std::env::var(HOSTNAME_ENV) {
        if !hostname.is_empty() {
            config.hostname = hostname;
        }
    }
    if let Some(hostname) = &cli.hostname {
        config.hostname = hostname.clone();
    }
    if let Some(listen) = &cli.listen {
        config.listen = listen.clone();
    }

    let gateway = view_gateway::Gateway::from_config(config).await?;
    gateway.start().await?;

    tracing::info!("Gateway ready, press Ctrl+C to stop");

    gateway.wait_for_shutdown().await;

    Ok(())
}

/// Validate a configuration file and print diagnostics
async fn validate_config(path: &str) -> view_gateway::Result<()> {
    use std::path::Path;

    if !Path::new(path).exists() {
        eprintln!("✗ Config file not found: {}", path);
        std::process::exit(1);
    }

    let config = match GatewayConfig::from_file(path).await {
        Ok(c) => {
            println!("✓ Config parsed successfully ({})", path);
            c
        }
        Err(e) => {
            eprintln!("✗ Parse error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("✗ Validation error: {}", e);
        std::process::exit(1);
    }

    println!("✓ Configuration is valid");
    println!();
    println!("  Hostname:     {}", config.hostname);
    println!("  Listen:       {}", config.listen);
    match config.orchestrator {
        OrchestratorKind::Kubernetes => println!(
            "  Orchestrator: kubernetes (namespace {}, prefix {})",
            config.kubernetes.namespace, config.kubernetes.name_prefix
        ),
        OrchestratorKind::Memory => println!(
            "  Orchestrator: memory (endpoint {})",
            config.memory.endpoint
        ),
    }
    println!("  Containers:   {}", config.workload.containers.len());
    for container in &config.workload.containers {
        println!("    - {} ({})", container.name, container.image);
    }
    println!(
        "  Cold start:   timeout {}s, poll every {}ms",
        config.cold_start.timeout_secs, config.cold_start.poll_interval_ms
    );
    println!("  Resync:       every {}s", config.reconcile.resync_interval_secs);

    Ok(())
}
