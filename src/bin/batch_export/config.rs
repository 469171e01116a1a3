//! Configuration for the batch export tool.
//!
//! Configuration comes from two sources:
//! - Environment variables (via .env file or shell): RPC endpoint
//! - CLI arguments: block range, limits and output options

use std::{path::PathBuf, time::Duration};

use alloy::primitives::Address;
use batch_export::{
    compress::Compression,
    error::CompressError,
    export::{DEFAULT_OUTPUT, ExportConfig},
    fetch::{DEFAULT_BLOCK_RANGE_LIMIT, DEFAULT_REQUESTS_PER_SECOND, FetchConfig},
};
use clap::Parser;
use url::Url;

/// Environment configuration.
#[derive(Debug, Default, serde::Deserialize)]
pub struct EnvConfig {
    /// RPC URL for the node, used when `--endpoint` is not given
    pub node_rpc_url: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}

/// CLI arguments of the export.
#[derive(Debug, Parser)]
#[command(name = "batch-export")]
#[command(about = "Export Swarm postage stamp contract event logs within a block range")]
#[command(
    long_about = "Exports postage stamp contract event logs within a block range (--start to --end). \
Large ranges are queried in chunks (--block-range-limit) within the RPC rate limit (--max-request).\n\n\
Logs are saved to the output file in NDJSON format. The export can be interrupted at any time \
(Ctrl+C), already retrieved logs are saved before exiting."
)]
pub struct CliConfig {
    /// Start block, the contract deployment block if 0
    #[arg(long, default_value_t = 0)]
    pub start: u64,

    /// End block, the latest block if 0
    #[arg(long, default_value_t = 0)]
    pub end: u64,

    /// Ethereum RPC endpoint URL, falls back to NODE_RPC_URL
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Max RPC requests per second, 0 for no limit
    #[arg(short, long, default_value_t = DEFAULT_REQUESTS_PER_SECOND)]
    pub max_request: u32,

    /// Max blocks per log query
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_RANGE_LIMIT)]
    pub block_range_limit: u64,

    /// Output file path (NDJSON)
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Compress the output file once the export stops
    #[arg(short, long)]
    pub compress: bool,

    /// Compression algorithm (gzip, zstd, xz)
    #[arg(long, default_value = "gzip")]
    pub compression: String,

    /// Postage stamp contract address, looked up by chain ID if omitted
    #[arg(long)]
    pub address: Option<String>,

    /// Seconds between progress reports
    #[arg(long, default_value_t = 15)]
    pub heartbeat: u64,

    /// Log verbosity (silent, error, warn, info, debug), ignored if RUST_LOG is set
    #[arg(short, long, default_value = "info")]
    pub verbosity: String,
}

impl CliConfig {
    /// RPC endpoint from the CLI or the environment.
    pub fn endpoint(&self, env: &EnvConfig) -> Result<Url, ConfigError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .or(env.node_rpc_url.as_deref())
            .ok_or(ConfigError::MissingEndpoint)?;
        Ok(Url::parse(endpoint)?)
    }

    pub fn address(&self) -> Result<Option<Address>, ConfigError> {
        self.address
            .as_deref()
            .map(|address| address.parse().map_err(ConfigError::InvalidAddress))
            .transpose()
    }

    pub fn fetch_config(&self) -> Result<FetchConfig, ConfigError> {
        if self.block_range_limit == 0 {
            return Err(ConfigError::ZeroBlockRangeLimit);
        }
        Ok(FetchConfig {
            block_range_limit: self.block_range_limit,
            requests_per_second: self.max_request,
        })
    }

    pub fn export_config(&self) -> Result<ExportConfig, ConfigError> {
        if self.heartbeat == 0 {
            return Err(ConfigError::ZeroHeartbeat);
        }
        let compression = if self.compress {
            Some(self.compression.parse::<Compression>()?)
        } else {
            None
        };
        Ok(ExportConfig {
            output: self.output.clone(),
            compression,
            heartbeat: Duration::from_secs(self.heartbeat),
        })
    }

    /// Log filter directive for the verbosity level.
    pub fn log_level(&self) -> Result<&'static str, ConfigError> {
        match self.verbosity.to_ascii_lowercase().as_str() {
            "0" | "silent" => Ok("off"),
            "1" | "error" => Ok("error"),
            "2" | "warn" => Ok("warn"),
            "3" | "info" => Ok("info"),
            "4" | "debug" => Ok("debug"),
            _ => Err(ConfigError::InvalidVerbosity(self.verbosity.clone())),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("RPC endpoint is required, use --endpoint or NODE_RPC_URL")]
    MissingEndpoint,

    #[error("Invalid RPC URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Invalid contract address: {0}")]
    InvalidAddress(alloy::primitives::hex::FromHexError),

    #[error("Invalid verbosity level: {0}")]
    InvalidVerbosity(String),

    #[error("block_range_limit must be at least 1")]
    ZeroBlockRangeLimit,

    #[error("heartbeat must be at least 1 second")]
    ZeroHeartbeat,

    #[error(transparent)]
    Compression(#[from] CompressError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliConfig {
        CliConfig::parse_from(std::iter::once("batch-export").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = cli(&[]);

        assert_eq!(cli.fetch_config().unwrap(), FetchConfig::default());
        assert_eq!(cli.export_config().unwrap(), ExportConfig::default());
        assert_eq!(cli.log_level().unwrap(), "info");
        assert!(cli.address().unwrap().is_none());
        assert_eq!((cli.start, cli.end), (0, 0));
    }

    #[test]
    fn test_cli_config_to_export_config() {
        let cli = cli(&[
            "--start",
            "100",
            "--end",
            "200",
            "-m",
            "5",
            "-b",
            "10",
            "-o",
            "out.ndjson",
            "-c",
            "--compression",
            "zstd",
            "--heartbeat",
            "30",
            "-v",
            "debug",
        ]);

        let fetch = cli.fetch_config().unwrap();
        assert_eq!(fetch.block_range_limit, 10);
        assert_eq!(fetch.requests_per_second, 5);

        let export = cli.export_config().unwrap();
        assert_eq!(export.output, PathBuf::from("out.ndjson"));
        assert_eq!(export.compression, Some(Compression::Zstd));
        assert_eq!(export.heartbeat, Duration::from_secs(30));
        assert_eq!(cli.log_level().unwrap(), "debug");
    }

    #[test]
    fn test_endpoint_fallback() {
        let env = EnvConfig {
            node_rpc_url: Some("http://localhost:8545".to_string()),
        };

        assert_eq!(
            cli(&[]).endpoint(&env).unwrap().as_str(),
            "http://localhost:8545/"
        );
        assert_eq!(
            cli(&["-e", "https://rpc.gnosischain.com"])
                .endpoint(&env)
                .unwrap()
                .host_str(),
            Some("rpc.gnosischain.com")
        );
        assert!(matches!(
            cli(&[]).endpoint(&EnvConfig::default()),
            Err(ConfigError::MissingEndpoint)
        ));
        assert!(matches!(
            cli(&["-e", "not a url"]).endpoint(&env),
            Err(ConfigError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            cli(&["-b", "0"]).fetch_config(),
            Err(ConfigError::ZeroBlockRangeLimit)
        ));
        assert!(matches!(
            cli(&["-c", "--compression", "bzip2"]).export_config(),
            Err(ConfigError::Compression(_))
        ));
        assert!(matches!(
            cli(&["-v", "trace"]).log_level(),
            Err(ConfigError::InvalidVerbosity(_))
        ));
        assert!(matches!(
            cli(&["--address", "0x1234"]).address(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_compression_ignored_unless_enabled() {
        let export = cli(&["--compression", "bzip2"]).export_config().unwrap();
        assert!(export.compression.is_none());

        let export = cli(&["-c", "--compression", "xz"]).export_config().unwrap();
        assert_eq!(export.compression, Some(Compression::Xz));
    }
}
