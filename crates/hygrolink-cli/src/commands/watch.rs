//! Watch command implementation.
//!
//! Scans for the requested sensor, connects to it and prints every reading
//! it pushes. Link loss ends the command; there is no reconnection.

use anyhow::{Context, Result, bail};
use hygrolink_core::{EventReceiver, GattSessionState, HubEvent, HubHandle, SensorHub};
use hygrolink_types::PeripheralHandle;
use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::OutputFormat;
use crate::config::{Config, resolve_device};
use crate::format::{FormatOptions, format_reading_json, format_watch_line};

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub device: Option<String>,
    pub scan_timeout: Option<u64>,
    pub count: u32,
    pub format: OutputFormat,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
    pub config: &'a Config,
}

pub async fn cmd_watch(args: WatchArgs<'_>) -> Result<()> {
    let query = resolve_device(args.device.clone(), args.config);

    let mut hub_config = args.config.hub_config()?;
    if let Some(secs) = args.scan_timeout {
        hub_config.scan = hub_config.scan.duration_secs(secs);
    }
    if query.is_none() {
        // Without a target, take the first sensor that advertises a name.
        hub_config.scan = hub_config.scan.named_only(true);
    }

    let hub = SensorHub::with_bluetooth(hub_config)
        .await
        .context("Failed to open Bluetooth adapter")?;

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nShutting down...");
            Ok(())
        }
        result = run(&hub, query.as_deref(), &args) => result,
    };

    // Disconnects the session if one is still up.
    if let Err(e) = hub.shutdown().await {
        tracing::debug!(error = %e, "Hub already stopped");
    }
    result
}

async fn run(hub: &HubHandle, query: Option<&str>, args: &WatchArgs<'_>) -> Result<()> {
    let mut events = hub.subscribe();

    if !args.quiet {
        match query {
            Some(q) => eprintln!("Looking for {}...", q),
            None => eprintln!("Looking for the first named sensor..."),
        }
    }
    hub.start_scan().await.context("Failed to start scan")?;

    let Some(target) = find_target(hub, &mut events, query).await? else {
        match query {
            Some(q) => bail!("No sensor matching '{}' found", q),
            None => bail!("No sensors found"),
        }
    };

    hub.select_device(target.clone()).await?;
    hub.connect_selected()
        .await
        .with_context(|| format!("Failed to connect to {}", target))?;

    if !args.quiet {
        let header = if args.opts.no_color {
            format!("Watching: {} ({})", target.display_name(), target.id)
        } else {
            format!(
                "Watching: {} ({})",
                target.display_name().green(),
                target.id.cyan()
            )
        };
        eprintln!("{}", header);
        eprintln!("Press Ctrl+C to stop");
        eprintln!("{}", "-".repeat(50));
    }

    let mut readings_taken: u32 = 0;
    loop {
        match events.recv().await {
            Ok(HubEvent::Reading {
                device,
                reading,
                received_at,
            }) => {
                let line = match args.format {
                    OutputFormat::Text => format_watch_line(&reading, received_at, args.opts),
                    OutputFormat::Json => {
                        format_reading_json(&reading, Some(&device), Some(received_at), args.opts)?
                    }
                };
                println!("{}", line);

                readings_taken += 1;
                if args.count > 0 && readings_taken >= args.count {
                    if !args.quiet {
                        eprintln!("Completed {} readings.", readings_taken);
                    }
                    return Ok(());
                }
            }
            Ok(HubEvent::PayloadRejected { raw, error, .. }) => {
                if !args.quiet {
                    eprintln!("Ignoring malformed payload {:?}: {}", raw, error);
                }
            }
            Ok(HubEvent::SessionStateChanged { state, .. }) => match state {
                GattSessionState::Disconnected => {
                    if !args.quiet {
                        eprintln!("Disconnected.");
                    }
                    return Ok(());
                }
                GattSessionState::Failed(e) => bail!("Session failed: {}", e),
                GattSessionState::Stalled(reason) => {
                    bail!("{} does not provide readings: {}", target, reason)
                }
                other => tracing::debug!(state = %other, "Session state changed"),
            },
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed events while printing readings");
            }
            Err(RecvError::Closed) => bail!("Sensor hub stopped unexpectedly"),
        }
    }
}

/// Wait for the scan to surface the target, or the first device when no
/// query was given. `None` means the scan ended without a match.
async fn find_target(
    hub: &HubHandle,
    events: &mut EventReceiver,
    query: Option<&str>,
) -> Result<Option<PeripheralHandle>> {
    let wanted = |device: &PeripheralHandle| query.is_none_or(|q| device.matches(q));
    loop {
        match events.recv().await {
            Ok(HubEvent::DeviceDiscovered { device }) => {
                if wanted(&device) {
                    return Ok(Some(device));
                }
                tracing::debug!(device = %device, "Skipping non-matching device");
            }
            Ok(HubEvent::ScanFinished { .. }) => {
                // Covers discoveries dropped by a lagging receiver.
                let devices = hub.device_list().await?;
                return Ok(devices.into_iter().find(|d| wanted(d)));
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Scan event stream lagged");
            }
            Err(RecvError::Closed) => bail!("Sensor hub stopped during scan"),
        }
    }
}
