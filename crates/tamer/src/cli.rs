//! Command-line interface handling for the Tamer game server.
//!
//! Every option here overrides the matching value from the configuration
//! file.

use clap::Parser;
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Parser)]
#[command(name = "tamer", version, about = "Tamer game server: map and dungeon hosts")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long = "config", value_name = "FILE", default_value = "config.toml")]
    pub config_path: PathBuf,

    /// Bind address of the map host (e.g., 127.0.0.1:7607)
    #[arg(short, long = "bind", value_name = "ADDRESS")]
    pub bind_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Output logs in JSON format
    #[arg(long = "json-logs")]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_config_toml() {
        let args = CliArgs::parse_from(["tamer"]);
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert!(args.bind_address.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn overrides_are_parsed() {
        let args = CliArgs::parse_from([
            "tamer",
            "-c",
            "/etc/tamer.toml",
            "--bind",
            "0.0.0.0:7000",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        assert_eq!(args.config_path, PathBuf::from("/etc/tamer.toml"));
        assert_eq!(args.bind_address.as_deref(), Some("0.0.0.0:7000"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }
}
