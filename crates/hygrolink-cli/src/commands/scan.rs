//! Scan command implementation.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use hygrolink_core::{EventReceiver, HubEvent, SensorHub};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{FormatOptions, format_devices_json, format_devices_text};

/// Extra time allowed for the platform to report the end of a scan.
const FINISH_GRACE: Duration = Duration::from_secs(5);

pub async fn cmd_scan(
    timeout: Option<u64>,
    named_only: bool,
    format: OutputFormat,
    quiet: bool,
    opts: &FormatOptions,
    config: &Config,
) -> Result<()> {
    let mut hub_config = config.hub_config()?;
    if let Some(secs) = timeout {
        hub_config.scan = hub_config.scan.duration_secs(secs);
    }
    if named_only {
        hub_config.scan = hub_config.scan.named_only(true);
    }
    let duration = hub_config.scan.duration;

    let hub = SensorHub::with_bluetooth(hub_config)
        .await
        .context("Failed to open Bluetooth adapter")?;
    let mut events = hub.subscribe();

    let live = !quiet && matches!(format, OutputFormat::Text);
    if live {
        eprintln!("Scanning for sensors... ({}s)", duration.as_secs());
    }
    hub.start_scan().await.context("Failed to start scan")?;

    await_scan_end(&mut events, live, duration + FINISH_GRACE).await?;

    let devices = hub.device_list().await?;
    hub.shutdown().await?;

    let content = match format {
        OutputFormat::Text => format_devices_text(&devices, opts),
        OutputFormat::Json => format_devices_json(&devices)? + "\n",
    };
    print!("{}", content);
    Ok(())
}

/// Wait up to `limit` for the scan to finish. Running out of time is not an
/// error; the hub stopping is.
async fn await_scan_end(events: &mut EventReceiver, live: bool, limit: Duration) -> Result<()> {
    match tokio::time::timeout(limit, wait_for_finish(events, live)).await {
        Ok(finished) => finished,
        Err(_) => {
            tracing::warn!("Scan did not report completion; listing devices seen so far");
            Ok(())
        }
    }
}

async fn wait_for_finish(events: &mut EventReceiver, live: bool) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(HubEvent::DeviceDiscovered { device }) if live => {
                eprintln!("  found {}", device);
            }
            Ok(HubEvent::ScanFinished { .. }) => return Ok(()),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Scan event stream lagged");
            }
            Err(RecvError::Closed) => bail!("Sensor hub stopped during scan"),
        }
    }
}
