use clap::Parser;
use radius_server::{Config, FileAccountingSink, LocalHandler, RadiusServer};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// RADIUS authentication, accounting and proxy server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radiusd")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start server)
    #[arg(short, long)]
    validate: bool,
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_summary(config: &Config) {
    println!("Configuration validated successfully");
    println!();
    println!("  Listen: {}", config.listen_address);
    println!("  Auth port: {}", config.auth_port);
    match config.acct_port {
        Some(port) => println!("  Accounting port: {}", port),
        None => println!("  Accounting port: disabled"),
    }
    println!("  Clients: {}", config.clients.len());
    println!("  Users: {}", config.users.len());
    if let Some(proxy) = &config.proxy {
        println!("  Proxy port: {} ({} realms)", proxy.listen_port, proxy.realms.len());
    }
    if let Some(path) = &config.accounting_log_path {
        println!("  Accounting log: {}", path);
    }

    if config.clients.is_empty() {
        println!();
        println!("WARNING: No clients configured, every request will be dropped");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_path) {
        Ok(config) => config,
        Err(e) => {
            if cli.validate {
                eprintln!("Configuration validation failed: {}", e);
                process::exit(1);
            }

            init_tracing("info");
            warn!(path = %cli.config_path, error = %e, "Could not load config file");
            info!(path = %cli.config_path, "Creating example configuration");

            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!(error = %e, "Error creating example config");
                process::exit(1);
            }

            info!("Please edit {} and restart the server", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        print_summary(&config);
        process::exit(0);
    }

    init_tracing(config.log_level.as_deref().unwrap_or("info"));
    info!(path = %cli.config_path, "RADIUS server v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = serve(config).await {
        error!(error = %e, "Server error");
        process::exit(1);
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let dictionary = Arc::new(config.load_dictionary()?);
    let mut handler = LocalHandler::from_config(&config, &dictionary)?;

    if let Some(path) = &config.accounting_log_path {
        let sink = FileAccountingSink::new(path).await?;
        info!(path = %path, "Accounting records written to file");
        handler.set_accounting_sink(Arc::new(sink));
    }

    if config.clients.iter().all(|client| !client.enabled) {
        warn!("No enabled clients configured, every request will be dropped");
    }

    let server = RadiusServer::bind(config.server_config()?, dictionary, Arc::new(handler)).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.shutdown();
            }
            Err(e) => warn!(error = %e, "Unable to listen for shutdown signal"),
        }
    });

    info!("Server started, press Ctrl+C to stop");
    server.run().await?;
    Ok(())
}
