//! Scan lifecycle with a hard, cancellable timeout.
//!
//! [`ScanController`] starts discovery, restarts it when asked to start while
//! already scanning, and arms a deadline timer that cancels discovery after
//! the configured duration. Only the most recently armed timer can fire:
//! arming a new one cancels the previous token, and deadlines carry a
//! generation number so one that was already queued is ignored.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use hygrolink_types::PeripheralHandle;

use crate::discovery::DiscoverySet;
use crate::error::{Error, Result};
use crate::inbox::Inbound;
use crate::transport::BleTransport;

/// Default scan window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Options for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// How long discovery runs before it is cancelled automatically.
    pub duration: Duration,
    /// Clear the discovery set at the start of every scan.
    pub reset_on_start: bool,
    /// Only record peripherals that advertise a name.
    pub named_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SCAN_DURATION,
            reset_on_start: true,
            named_only: false,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Set whether each scan starts from an empty discovery set.
    #[must_use]
    pub fn reset_on_start(mut self, reset: bool) -> Self {
        self.reset_on_start = reset;
        self
    }

    /// Set whether unnamed peripherals are skipped.
    #[must_use]
    pub fn named_only(mut self, named_only: bool) -> Self {
        self.named_only = named_only;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        validate_duration(self.duration)
    }
}

fn validate_duration(duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Err(Error::invalid_config("scan duration must be > 0"));
    }
    Ok(())
}

/// Expiry of a scan timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanDeadline {
    pub(crate) generation: u64,
}

/// Drives one discovery session at a time.
#[derive(Debug)]
pub struct ScanController {
    options: ScanOptions,
    generation: u64,
    timer: Option<CancellationToken>,
    deadlines: mpsc::UnboundedSender<Inbound>,
    active: bool,
}

impl ScanController {
    pub(crate) fn new(options: ScanOptions, deadlines: mpsc::UnboundedSender<Inbound>) -> Self {
        Self {
            options,
            generation: 0,
            timer: None,
            deadlines,
            active: false,
        }
    }

    /// The options this controller was built with.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Whether the transport has reported discovery as running.
    pub fn is_scanning(&self) -> bool {
        self.active
    }

    /// Whether a deadline timer is armed.
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Start a scan, restarting discovery if it is already running.
    ///
    /// Uses the configured duration unless `duration` overrides it.
    pub async fn start_scan(
        &mut self,
        transport: &dyn BleTransport,
        devices: &mut DiscoverySet,
        duration: Option<Duration>,
    ) -> Result<()> {
        let duration = duration.unwrap_or(self.options.duration);
        validate_duration(duration)?;

        if transport.is_discovering().await {
            debug!("Discovery already running, restarting");
            transport.cancel_discovery().await?;
        }
        if self.options.reset_on_start {
            devices.reset();
        }

        transport.start_discovery().await?;
        self.arm(duration);
        info!("Scanning for {:?}", duration);
        Ok(())
    }

    /// Handle an expired timer. Returns whether the deadline was current.
    pub(crate) async fn on_deadline(
        &mut self,
        transport: &dyn BleTransport,
        deadline: ScanDeadline,
    ) -> Result<bool> {
        if deadline.generation != self.generation || self.timer.is_none() {
            debug!(
                generation = deadline.generation,
                current = self.generation,
                "Ignoring stale scan deadline"
            );
            return Ok(false);
        }
        self.timer = None;

        if transport.is_discovering().await {
            debug!("Scan window elapsed, cancelling discovery");
            transport.cancel_discovery().await?;
        }
        Ok(true)
    }

    /// Stop scanning now and disarm the timer.
    pub async fn stop(&mut self, transport: &dyn BleTransport) -> Result<()> {
        self.disarm();
        if transport.is_discovering().await {
            transport.cancel_discovery().await?;
        }
        Ok(())
    }

    /// Record that discovery started.
    pub fn on_started(&mut self) {
        self.active = true;
    }

    /// Feed a discovered peripheral into the set.
    ///
    /// Returns whether the set gained an entry.
    pub fn on_device_found(&self, devices: &mut DiscoverySet, handle: PeripheralHandle) -> bool {
        if self.options.named_only && handle.name.is_none() {
            return false;
        }
        devices.observe(handle)
    }

    /// Record that discovery stopped.
    pub fn on_finished(&mut self) {
        self.active = false;
    }

    fn arm(&mut self, duration: Duration) {
        self.disarm();
        self.generation = self.generation.wrapping_add(1);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let deadlines = self.deadlines.clone();
        let deadline = ScanDeadline {
            generation: self.generation,
        };
        let expiry = tokio::time::sleep(duration);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {}
                _ = expiry => {
                    let _ = deadlines.send(Inbound::Deadline(deadline));
                }
            }
        });
        self.timer = Some(token);
    }

    fn disarm(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.disarm();
    }
}
