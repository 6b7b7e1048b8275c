use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// OpenAPI Gateway: token-issuing authenticated reverse proxy
#[derive(Parser)]
#[command(name = "openapi-gateway", version, about)]
struct Cli {
    /// Path to configuration file (.hcl)
    #[arg(short, long, default_value = "gateway.hcl")]
    config: String,

    /// Override listen address (e.g., 0.0.0.0:8000)
    #[arg(short, long)]
    listen: Option<String>,

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
async fn main() -> openapi_gateway::Result<()> {
    let cli = Cli::parse();

    // Handle validate subcommand
    if let Some(Commands::Validate {
        config: config_path,
    }) = &cli.command
    {
        return validate_config(config_path).await;
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    tracing::info!("OpenAPI Gateway v{}", env!("CARGO_PKG_VERSION"));

    // The JWT secret has no usable default, so a missing config file
    // is a startup failure rather than a silent fallback.
    if !std::path::Path::new(&cli.config).exists() {
        return Err(openapi_gateway::GatewayError::Config(format!(
            "Config file not found: {}",
            cli.config
        )));
    }

    tracing::info!(config = cli.config, "Loading configuration");
    let mut config = openapi_gateway::config::GatewayConfig::from_file(&cli.config).await?;

    // Override listen address if provided
    if let Some(listen) = &cli.listen {
        config.listen = listen.clone();
    }

    // Create and start the gateway
    let gateway = openapi_gateway::Gateway::new(config)?;
    gateway.start().await?;

    tracing::info!("Gateway ready, press Ctrl+C to stop");

    // Wait for shutdown signal
    gateway.wait_for_shutdown().await;

    Ok(())
}

/// Validate a configuration file and print diagnostics
async fn validate_config(path: &str) -> openapi_gateway::Result<()> {
    if !std::path::Path::new(path).exists() {
        eprintln!("✗ Config file not found: {}", path);
        std::process::exit(1);
    }

    // Parse
    let config = match openapi_gateway::config::GatewayConfig::from_file(path).await {
        Ok(c) => {
            println!("✓ Config parsed successfully ({})", path);
            c
        }
        Err(e) => {
            eprintln!("✗ Parse error: {}", e);
            std::process::exit(1);
        }
    };

    // Validate
    if let Err(e) = config.validate() {
        eprintln!("✗ Validation error: {}", e);
        std::process::exit(1);
    }

    // Print summary
    println!("✓ Configuration is valid");
    println!();
    println!("  Listen:    {}", config.listen);
    println!(
        "  JWT:       issuer {}, expiry {}s",
        config.jwt.issuer, config.jwt.expiry_secs
    );
    match &config.discovery.endpoint {
        Some(endpoint) => println!(
            "  Discovery: {} (every {}s after {}s)",
            endpoint, config.discovery.poll_interval_secs, config.discovery.initial_delay_secs
        ),
        None => println!(
            "  Discovery: static, {} routes (every {}s after {}s)",
            config.discovery.routes.len(),
            config.discovery.poll_interval_secs,
            config.discovery.initial_delay_secs
        ),
    }
    for route in &config.discovery.routes {
        println!("    - {} → {}", route.pattern, route.target);
    }
    println!("  Apps:      {}", config.apps.len());
    for app in &config.apps {
        println!("    - {} ({})", app.app_id, app.app_name);
    }

    Ok(())
}
