//! Example: Watching a Sensor
//!
//! Scans for nearby sensors, connects to the one named on the command line
//! (or the first named device found) and prints every reading it pushes.
//!
//! Run with: `cargo run --example watch_sensor -- [DEVICE_ADDRESS_OR_NAME]`

use std::env;
use std::time::Duration;

use hygrolink_core::{HubConfig, HubEvent, ScanOptions, SensorHub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let query = env::args().nth(1);
    let config = HubConfig::new().scan(ScanOptions::new().named_only(query.is_none()));
    let hub = SensorHub::with_bluetooth(config).await?;

    println!("Scanning for 10 seconds...");
    hub.start_scan().await?;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let devices = hub.device_list().await?;
    let target = match &query {
        Some(q) => devices.into_iter().find(|d| d.matches(q)),
        None => devices.into_iter().next(),
    };
    let Some(target) = target else {
        eprintln!("No matching sensor found");
        hub.shutdown().await?;
        return Ok(());
    };

    let mut events = hub.subscribe();
    hub.select_device(target.clone()).await?;
    hub.connect_selected().await?;
    println!("Connecting to {}...", target);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event? {
                HubEvent::Reading { reading, .. } => {
                    println!(
                        "  Temperature: {:.1} °C  Humidity: {}%",
                        reading.temperature, reading.humidity
                    );
                }
                HubEvent::SessionStateChanged { state, .. } => {
                    println!("Session: {}", state);
                    if state.is_terminal() {
                        break;
                    }
                }
                _ => {}
            },
        }
    }

    hub.shutdown().await?;
    Ok(())
}
