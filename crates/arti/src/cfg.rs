//! Command-line parsing and configuration-file loading.
//!
//! (Named `cfg`, not `config`, to avoid clashing with the `arti_client`
//! re-export of the same name, following the teacher's own reason for the
//! name.)

use std::path::PathBuf;

use arti_client::TorClientConfig;
use clap::Parser;

/// A minimal Tor client.
#[derive(Debug, Parser)]
#[command(name = "arti", version, about = "A minimal command-line client for the Tor network")]
pub struct Cli {
    /// Path to a TOML configuration file; if omitted, built-in defaults are used.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Override the configured SOCKS5 port.
    #[arg(short = 'p', long = "socks-port", value_name = "PORT")]
    pub socks_port: Option<u16>,

    /// Override the log level (e.g. "trace", "debug", "info", "warn", "error").
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

/// Build a [`TorClientConfig`] from `cli`'s config file (if any) and flag
/// overrides, then validate it.
pub fn load_config(cli: &Cli) -> anyhow::Result<TorClientConfig> {
    let mut config = match &cli.config_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
            toml::from_str(&text).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?
        }
        None => TorClientConfig::default(),
    };

    if let Some(socks_port) = cli.socks_port {
        config.socks_port = socks_port;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_config_file_are_valid() {
        let cli = Cli {
            config_file: None,
            socks_port: None,
            log_level: None,
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.socks_port, TorClientConfig::default().socks_port);
    }

    #[test]
    fn socks_port_flag_overrides_the_default() {
        let cli = Cli {
            config_file: None,
            socks_port: Some(9999),
            log_level: None,
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.socks_port, 9999);
    }

    #[test]
    fn a_config_file_is_parsed_and_merged_with_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arti.toml");
        std::fs::write(&path, "socks_port = 9150\nconn_limit = 50\n").unwrap();

        let cli = Cli {
            config_file: Some(path),
            socks_port: None,
            log_level: None,
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.socks_port, 9150);
        assert_eq!(config.conn_limit, 50);
    }

    #[test]
    fn an_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arti.toml");
        std::fs::write(&path, "num_entry_guards = 0\n").unwrap();

        let cli = Cli {
            config_file: Some(path),
            socks_port: None,
            log_level: None,
        };
        assert!(load_config(&cli).is_err());
    }
}
