//! Command-line interface definition.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, FacilitatorConfig};

/// Verifies and settles gasless payment authorizations across EVM and Solana networks.
#[derive(Parser, Debug)]
#[command(name = "payrail-facilitator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file. Missing means defaults.
    #[arg(long, short, default_value = "config.toml", env = "CONFIG")]
    pub config: PathBuf,

    /// Bind address, overriding the file.
    #[arg(long, env = "HOST")]
    pub host: Option<IpAddr>,

    /// Listening port, overriding the file.
    #[arg(long, short, env = "PORT")]
    pub port: Option<u16>,
}

impl Cli {
    /// Loads the configuration file and applies the overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn into_config(self) -> Result<FacilitatorConfig, ConfigError> {
        let mut config = FacilitatorConfig::load_from(&self.config)?;
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}
