//! Client configuration loading.
//!
//! The configuration file is a JSON [`ClientConfig`] document; missing
//! fields take their defaults. Command line flags override the file.

use anyhow::{Context, Result};
use bioscan_device::ClientConfig;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub connect_timeout_ms: Option<u64>,
    pub label: Option<String>,
}

/// Load the configuration file, if any, and apply the overrides.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            parse(&content).with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => ClientConfig::default(),
    };

    Ok(apply(config, overrides))
}

fn parse(content: &str) -> Result<ClientConfig> {
    Ok(serde_json::from_str(content)?)
}

fn apply(mut config: ClientConfig, overrides: &Overrides) -> ClientConfig {
    if let Some(timeout) = overrides.connect_timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(timeout));
    }
    if let Some(label) = &overrides.label {
        config = config.with_label(label.clone());
    }
    config
}
