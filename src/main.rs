use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use fcg_gateway::{
    adapters::{AppState, FileConfigProvider, HealthChecker, build_router},
    config::{GatewayConfig, GatewayConfigValidator, SERVICE_NAME},
    core::GatewayService,
    metrics, tracing_setup,
    ports::{config_provider::ConfigProvider, http_client::HttpClient},
    utils::GracefulShutdown,
};
use tokio::sync::Mutex as TokioMutex;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "gateway.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "gateway.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "gateway.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "gateway.toml")]
        config: String,
    },
}

fn spawn_health_checker(
    gateway: Arc<GatewayService>,
    http_client: Arc<dyn HttpClient>,
) -> Option<tokio::task::JoinHandle<()>> {
    let health_config = gateway.health_config();
    if !health_config.enabled {
        tracing::info!("Destination health checking is disabled in the configuration");
        return None;
    }

    tracing::info!(
        "Starting health checker task. Interval: {}s, Path: {}, Unhealthy Threshold: {}, Healthy Threshold: {}",
        health_config.interval_secs,
        health_config.path,
        health_config.unhealthy_threshold,
        health_config.healthy_threshold
    );

    let checker = HealthChecker::new(gateway, http_client);
    Some(tokio::spawn(async move {
        if let Err(e) = checker.run().await {
            tracing::error!("Health checker run error: {}", e);
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    // Determine the command to run
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    // Telemetry is configured from the file, so the config must load before
    // the subscriber comes up.
    let initial_config: GatewayConfig =
        fcg_gateway::config::loader::load_config(&config_path)
            .await
            .with_context(|| format!("Failed to load initial config from {config_path}"))?;
    GatewayConfigValidator::validate(&initial_config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}:\n{e}"))?;

    let telemetry_guard =
        tracing_setup::init_telemetry(&initial_config.logging, &initial_config.opentelemetry)
            .map_err(|e| eyre!("Failed to initialize telemetry: {}", e))?;

    let prometheus_handle =
        metrics::install_recorder().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    tracing::info!("Loaded initial configuration from {config_path}");

    let config_provider: Arc<dyn ConfigProvider> = Arc::new(
        FileConfigProvider::new(&config_path).context("Failed to create config provider")?,
    );

    let initial_config_arc = Arc::new(initial_config);
    let config_holder = Arc::new(ArcSwap::new(initial_config_arc.clone()));

    let http_client: Arc<dyn HttpClient> = Arc::new(
        fcg_gateway::HttpClientAdapter::new().context("Failed to create upstream HTTP client")?,
    );

    let initial_gateway = Arc::new(GatewayService::new(config_holder.load_full()));
    let gateway_holder = Arc::new(ArcSwap::new(initial_gateway.clone()));

    let health_checker_handle = Arc::new(TokioMutex::new(spawn_health_checker(
        gateway_holder.load_full(),
        http_client.clone(),
    )));

    // Config watcher task: debounce change events, reload, validate, swap the
    // gateway snapshot and restart the health checker.
    {
        let config_holder = config_holder.clone();
        let gateway_holder = gateway_holder.clone();
        let health_checker_handle = health_checker_handle.clone();
        let http_client = http_client.clone();
        let config_provider = config_provider.clone();
        let config_path = config_path.clone();
        let debounce_duration = Duration::from_secs(2);

        let mut notify_rx = config_provider.watch();

        tokio::spawn(async move {
            tracing::info!("Config watcher task started.");
            let mut last_reload_attempt = tokio::time::Instant::now();
            last_reload_attempt = last_reload_attempt
                .checked_sub(debounce_duration)
                .unwrap_or(last_reload_attempt);

            while notify_rx.recv().await.is_some() {
                if last_reload_attempt.elapsed() < debounce_duration {
                    tracing::info!("Debouncing config reload event. Still within cooldown period.");
                    while notify_rx.try_recv().is_ok() {}
                    continue;
                }
                last_reload_attempt = tokio::time::Instant::now();

                tracing::info!("Attempting to reload configuration from {}", config_path);

                let new_config = match config_provider.load_config().await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::error!(
                            "Failed to reload configuration: {}. Keeping old configuration.",
                            e
                        );
                        while notify_rx.try_recv().is_ok() {}
                        continue;
                    }
                };

                if let Err(e) = GatewayConfigValidator::validate(&new_config) {
                    tracing::error!(
                        "Reloaded configuration is invalid: {}. Keeping old configuration.",
                        e
                    );
                    while notify_rx.try_recv().is_ok() {}
                    continue;
                }

                let new_config_arc = Arc::new(new_config);
                config_holder.store(new_config_arc.clone());

                let new_gateway = Arc::new(GatewayService::new(new_config_arc));
                gateway_holder.store(new_gateway.clone());
                tracing::info!(
                    "Configuration reloaded: {} routes, {} destinations",
                    new_gateway.route_count(),
                    new_gateway.destination_count()
                );

                let mut handle_guard = health_checker_handle.lock().await;
                if let Some(handle) = handle_guard.take() {
                    handle.abort();
                }
                *handle_guard = spawn_health_checker(new_gateway, http_client.clone());

                while notify_rx.try_recv().is_ok() {}
            }
            tracing::info!("Config watcher task is shutting down.");
        });
    }

    // Create graceful shutdown manager
    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let state = AppState {
        gateway: gateway_holder.clone(),
        http_client,
        prometheus: prometheus_handle,
    };
    let app = build_router(state);

    // Log initial routes from the config_holder
    {
        let config = config_holder.load();
        for (route_id, route) in &config.proxy.routes {
            tracing::info!(
                "Configured route '{}': {} -> cluster '{}'",
                route_id,
                route.path,
                route.cluster
            );
        }
    }

    let addr: SocketAddr = config_holder
        .load()
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "{} listening on {} ({} routes configured, metrics on /metrics)",
        SERVICE_NAME,
        addr,
        gateway_holder.load().route_count()
    );

    let server_result = tokio::select! {
        result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>()
        ) => {
            result.context("Server error")
        },
        shutdown_reason = graceful_shutdown.wait_for_shutdown_signal() => {
            tracing::info!("Shutdown signal received: {:?}", shutdown_reason);

            let mut handle_guard = health_checker_handle.lock().await;
            if let Some(handle) = handle_guard.take() {
                tracing::info!("Shutting down health checker...");
                handle.abort();
            }

            tracing::info!("Graceful shutdown completed");
            Ok(())
        }
    };

    server_result?;

    // Flush pending spans on exit
    telemetry_guard.shutdown();

    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match fcg_gateway::config::loader::load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Routes: {}", config.proxy.routes.len());
            println!("   • Clusters: {}", config.proxy.clusters.len());
            println!("   • Health Checks: {}", config.health_check.enabled);
            println!(
                "   • OTLP Export: {} ({})",
                config.opentelemetry.enabled, config.opentelemetry.otlp_endpoint
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure destination addresses start with http:// or https://");
            println!("   • Check that every route references a defined cluster");
            println!("   • Verify listen address format (e.g., '0.0.0.0:8080')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# fcg-gateway configuration

# The address to listen on
listen_addr = "0.0.0.0:8080"

# Structured logging
[logging]
level = "info"
format = "json"

# OTLP trace export
[opentelemetry]
enabled = true
otlp_endpoint = "http://jaeger:4317"

# Destination health probing
[health_check]
enabled = true
interval_secs = 10
path = "/health"

# Example route: everything under /games goes to the games cluster
[proxy.routes.games]
path = "/games"
cluster = "games"

[proxy.clusters.games]
policy = "round_robin"

[proxy.clusters.games.destinations.primary]
address = "http://games:8080"

# Example cluster with two destinations
# [proxy.routes.users]
# path = "/users"
# cluster = "users"
#
# [proxy.clusters.users]
# policy = "random"
#
# [proxy.clusters.users.destinations.a]
# address = "http://users-a:8080"
#
# [proxy.clusters.users.destinations.b]
# address = "http://users-b:8080"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'fcg-gateway serve --config {config_path}' to start the gateway");
    Ok(())
}
