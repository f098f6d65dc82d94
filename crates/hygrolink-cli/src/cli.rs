//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "hygrolink")]
#[command(
    author,
    version,
    about = "Discover and watch BLE temperature/humidity sensors",
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Use an alternate config file
    #[arg(long, global = true, env = "HYGROLINK_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby sensors
    Scan {
        /// Scan duration in seconds (defaults to the config value, or 10)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Only list devices that advertise a name
        #[arg(long)]
        named_only: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Connect to a sensor and print readings as they arrive
    Watch {
        #[command(flatten)]
        device: DeviceArgs,

        /// Stop after this many readings (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Decode a raw "<temperature>;<humidity>" payload
    Decode {
        /// Payload text as the sensor sends it
        payload: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show or edit the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Set the default device
    SetDevice {
        /// Device identifier, name or alias
        device: String,
    },
    /// Add or replace a device alias
    Alias {
        /// Alias name
        name: String,
        /// Device identifier the alias points to
        device: String,
    },
    /// Remove a device alias
    Unalias {
        /// Alias name
        name: String,
    },
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Device selection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device identifier (MAC address or UUID), name or alias, or use HYGROLINK_DEVICE env var
    #[arg(short, long, env = "HYGROLINK_DEVICE")]
    pub device: Option<String>,

    /// Seconds to scan for the device before giving up
    #[arg(short = 'T', long)]
    pub scan_timeout: Option<u64>,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Use Fahrenheit for temperature display (overrides --celsius and config)
    #[arg(long, conflicts_with = "celsius")]
    pub fahrenheit: bool,

    /// Use Celsius for temperature display (default, overrides config)
    #[arg(long, conflicts_with = "fahrenheit")]
    pub celsius: bool,
}

impl OutputArgs {
    /// Resolve fahrenheit setting: explicit flags override config
    pub fn resolve_fahrenheit(&self, config_fahrenheit: bool) -> bool {
        if self.fahrenheit {
            true
        } else if self.celsius {
            false
        } else {
            config_fahrenheit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn output(fahrenheit: bool, celsius: bool) -> OutputArgs {
        OutputArgs {
            format: OutputFormat::Text,
            fahrenheit,
            celsius,
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_fahrenheit() {
        assert!(output(true, false).resolve_fahrenheit(false));
        assert!(!output(false, true).resolve_fahrenheit(true));
        assert!(output(false, false).resolve_fahrenheit(true));
        assert!(!output(false, false).resolve_fahrenheit(false));
    }

    #[test]
    fn test_parse_watch_args() {
        let cli = Cli::try_parse_from([
            "hygrolink",
            "watch",
            "--device",
            "attic",
            "-n",
            "3",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Watch {
                device,
                count,
                output,
            } => {
                assert_eq!(device.device.as_deref(), Some("attic"));
                assert_eq!(count, 3);
                assert_eq!(output.format, OutputFormat::Json);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_unit_flags_conflict() {
        let result =
            Cli::try_parse_from(["hygrolink", "decode", "1;2", "--fahrenheit", "--celsius"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let result = Cli::try_parse_from(["hygrolink", "-v", "-q", "config", "path"]);
        assert!(result.is_err());
    }
}
