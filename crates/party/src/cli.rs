//! Command-line argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the party server.
///
/// Every option overrides the matching value from the configuration file.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// If the file doesn't exist, a default configuration will be created.
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Server listen address, e.g. "0.0.0.0:8080"
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config.toml"),
            listen: None,
            debug: false,
            json_logs: false,
            max_connections: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::default();
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert!(!args.debug);
        assert!(!args.json_logs);
        assert!(args.listen.is_none());
        assert!(args.max_connections.is_none());
    }

    #[test]
    fn test_args_parse_overrides() {
        let args = Args::parse_from([
            "party",
            "--config",
            "custom.toml",
            "--listen",
            "0.0.0.0:9000",
            "--debug",
            "--json-logs",
            "--max-connections",
            "50",
        ]);
        assert_eq!(args.config, PathBuf::from("custom.toml"));
        assert_eq!(args.listen.as_deref(), Some("0.0.0.0:9000"));
        assert!(args.debug);
        assert!(args.json_logs);
        assert_eq!(args.max_connections, Some(50));
    }
}
