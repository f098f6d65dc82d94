//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_from(path);
            let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            print!("{}", content);
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::SetDevice { device } => {
            let mut config = Config::load_from(path);
            println!("Default device set to {}", device);
            config.device = Some(device);
            config.save_to(path)?;
        }
        ConfigAction::Alias { name, device } => {
            let mut config = Config::load_from(path);
            println!("{} -> {}", name, device);
            config.aliases.insert(name, device);
            config.save_to(path)?;
        }
        ConfigAction::Unalias { name } => {
            let mut config = Config::load_from(path);
            if config.aliases.remove(&name).is_none() {
                bail!("No alias named '{}'", name);
            }
            config.save_to(path)?;
            println!("Removed alias '{}'", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_device_and_aliases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        cmd_config(
            ConfigAction::SetDevice {
                device: "attic".to_string(),
            },
            &path,
        )
        .unwrap();
        cmd_config(
            ConfigAction::Alias {
                name: "attic".to_string(),
                device: "AA:BB:CC:DD:EE:FF".to_string(),
            },
            &path,
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.device.as_deref(), Some("attic"));
        assert_eq!(config.aliases["attic"], "AA:BB:CC:DD:EE:FF");

        cmd_config(
            ConfigAction::Unalias {
                name: "attic".to_string(),
            },
            &path,
        )
        .unwrap();
        assert!(Config::load_from(&path).aliases.is_empty());
    }

    #[test]
    fn test_unalias_unknown_name_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let result = cmd_config(
            ConfigAction::Unalias {
                name: "cellar".to_string(),
            },
            &path,
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
