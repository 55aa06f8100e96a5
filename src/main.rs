// Speed Filter Server - Main Entry Point

use speed_filter::config::Config;
use speed_filter::coordinator::Coordinator;
use speed_filter::net::listener::TcpServer;
use speed_filter::output::{CsvOutput, JsonOutput, TextOutput};
use std::sync::Arc;
use tokio::signal;
use clap::Parser;
use tracing::{info, error, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    info!("Starting speed filter server");
    info!(
        "Sampling period {} s, measurement variance {}",
        config.sample_period, config.measurement_variance
    );

    let coordinator = Arc::new(Coordinator::new_with_status(
        config.filter_config(),
        config.status_interval,
    ));

    // 1. Setup sensor feed listeners
    let mut servers: Vec<TcpServer> = Vec::new();

    if config.sensor_listen.is_empty() {
        warn!("No sensor listeners specified! Use --sensor-listen [host:]port");
    }

    for listen_addr in &config.sensor_listen {
        let addr_str = normalize_listen_addr(listen_addr);
        match addr_str.parse::<std::net::SocketAddr>() {
            Ok(addr) => match TcpServer::start(addr, coordinator.clone()).await {
                Ok(server) => {
                    info!("Sensor feed handler listening on {} (TCP)", server.addr());
                    servers.push(server);
                }
                Err(e) => error!("Failed to start sensor listener on {}: {}", addr, e),
            },
            Err(e) => error!("Invalid listen address '{}': {}", addr_str, e),
        }
    }

    // 2. Setup outputs

    // Separate broadcast channels for text and JSON payloads, capacity 100
    let (text_tx, _rx) = tokio::sync::broadcast::channel(100);
    let (json_tx, _rx) = tokio::sync::broadcast::channel(100);

    for target in &config.speed_connect {
        info!("Speed output to {} (Connect)", target);
        let rx = text_tx.subscribe();
        let target_clone = target.clone();
        tokio::spawn(async move {
            speed_filter::net::output_tcp::run_tcp_connect_output(target_clone, rx, "Speed").await;
        });
    }

    for target in &config.speed_listen {
        info!("Speed output on {} (Listen)", target);
        let tx_clone = text_tx.clone();
        let target_clone = normalize_listen_addr(target);
        tokio::spawn(async move {
            speed_filter::net::output_tcp::run_tcp_listen_output(target_clone, tx_clone, "Speed").await;
        });
    }

    for target in &config.json_connect {
        info!("JSON output to {} (Connect)", target);
        let rx = json_tx.subscribe();
        let target_clone = target.clone();
        tokio::spawn(async move {
            speed_filter::net::output_tcp::run_tcp_connect_output(target_clone, rx, "JSON").await;
        });
    }

    for target in &config.json_listen {
        info!("JSON output on {} (Listen)", target);
        let tx_clone = json_tx.clone();
        let target_clone = normalize_listen_addr(target);
        tokio::spawn(async move {
            speed_filter::net::output_tcp::run_tcp_listen_output(target_clone, tx_clone, "JSON").await;
        });
    }

    if !config.speed_connect.is_empty() || !config.speed_listen.is_empty() {
        coordinator.add_output(Box::new(TextOutput::new(Some(text_tx.clone())))).await;
    }
    if !config.json_connect.is_empty() || !config.json_listen.is_empty() {
        coordinator.add_output(Box::new(JsonOutput::new(Some(json_tx.clone())))).await;
    }

    for filename in &config.write_csv {
        info!("Writing CSV results to {}", filename);
        match CsvOutput::new(filename) {
            Ok(csv_out) => {
                coordinator.add_output(Box::new(csv_out)).await;
            }
            Err(e) => {
                error!("Failed to open CSV output file {}: {}", filename, e);
            }
        }
    }

    // 3. Start the periodic publish loop
    let coordinator_clone = coordinator.clone();
    tokio::spawn(async move {
        coordinator_clone.run().await;
    });

    info!("Server ready");

    // Wait for shutdown signal (Ctrl+C)
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            return Err(err.into());
        }
    }

    // Graceful shutdown
    info!("Shutting down...");
    for mut server in servers {
        server.shutdown().await;
    }

    // Report final statistics
    let stats = coordinator.stats();
    info!(
        "Server stopped. {} accel samples, {} speed samples, {} rejected, {} published",
        stats.accel_samples, stats.speed_samples, stats.rejected_samples, stats.published
    );

    Ok(())
}

/// Accept "[host:]port"; a bare port listens on all interfaces.
fn normalize_listen_addr(addr: &str) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("0.0.0.0:{}", addr)
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(if verbose {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if verbose {
        subscriber
            .with_max_level(tracing::Level::DEBUG)
            .init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber
            .with_max_level(tracing::Level::INFO)
            .init();
    }
}
