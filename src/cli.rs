//! Command-line interface.

use clap::Parser;

use crate::config::DEFAULT_CONFIG_NAME;
use crate::lifecycle::StartupOptions;

#[derive(Debug, Parser)]
#[command(name = "service-bootstrap")]
#[command(about = "Bootstrap, serve and gracefully stop a network service", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Configuration source (a path, `.toml` optional)
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_NAME)]
    pub config: String,

    /// Listening port; 0 uses the configured port
    #[arg(short = 'p', long = "port", default_value_t = 0)]
    pub port: u16,
}

impl Cli {
    pub fn startup_options(&self) -> StartupOptions {
        StartupOptions {
            config_name: self.config.clone(),
            port_override: self.port,
        }
    }
}

/// A non-zero override replaces the configured port.
pub fn resolve_port(configured: u16, override_port: u16) -> u16 {
    if override_port != 0 {
        override_port
    } else {
        configured
    }
}

pub fn version_string() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
