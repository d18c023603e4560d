//! Basic example: Find a LILO and poll its readings once per second
//!
//! Run with: cargo run --example poll_lilo

use lilo_rust_ble::{discover_with_config, BtleplugTransport, Lilo, LiloConfig, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lilo_rust_ble=debug".parse().unwrap()),
        )
        .init();

    let config = LiloConfig::default();

    println!("Scanning for {} ...", config.device_name);

    let transport = BtleplugTransport::with_config(config.clone()).await?;
    let device = discover_with_config(&transport, &config).await;

    match &device {
        Some(device) => println!("Found {}\n", device),
        None => {
            println!("No {} found. Is it powered and in range?", config.device_name);
            return Ok(());
        }
    }

    let lilo = Lilo::with_config(transport, device, config);

    println!("Polling every second. Press Ctrl+C to exit.\n");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted!");
                break;
            }
        }

        let reading = lilo.gather().await;
        let light = reading
            .light_mode()
            .map(|mode| mode.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "[{}] {} (light mode: {})",
            lilo.connection_state(),
            reading,
            light
        );
    }

    lilo.disconnect();
    println!("Done!");

    Ok(())
}
