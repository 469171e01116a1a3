//! Postage stamp event log exporter.
//!
//! Retrieves the postage stamp contract logs of a block range and saves them
//! as NDJSON, optionally compressed. Ctrl+C stops the export gracefully.

mod config;
mod error;

use std::process::exit;

use alloy::{
    providers::{DynProvider, ProviderBuilder},
    rpc::client::RpcClient,
};
use batch_export::{
    Chain,
    export::{ExportSummary, Exporter},
    fetch::ChunkedFetcher,
    source::ProviderSource,
    types::FetchRequest,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{CliConfig, EnvConfig};
use error::{Error, Result};

#[tokio::main]
async fn main() {
    // Load .env file, if any
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let cli_config = CliConfig::parse();

    let env_config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to parse environment configuration: {}", e);
            exit(1);
        }
    };

    // RUST_LOG takes precedence over --verbosity
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match cli_config.log_level() {
            Ok(level) => EnvFilter::new(level),
            Err(e) => {
                eprintln!("Invalid configuration: {}", e);
                exit(1);
            }
        },
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping export");
                token.cancel();
            }
        }
    });

    match run(cli_config, env_config, token).await {
        Ok(summary) => {
            info!(
                records = summary.records,
                bytes = summary.bytes,
                first_block = summary.stats.first_block(),
                last_block = summary.stats.last_block(),
                "Export finished"
            );
            println!("{}", summary.output.display());
            if let Some(compressed) = summary.compressed {
                println!("{}", compressed.display());
            }
        }
        Err(e) if e.is_cancelled() => {
            info!("Export cancelled, partial output saved");
            exit(130);
        }
        Err(e) => {
            error!(%e, "Export failed");
            exit(1);
        }
    }
}

async fn run(cli: CliConfig, env: EnvConfig, token: CancellationToken) -> Result<ExportSummary> {
    let node_url = cli.endpoint(&env)?;
    let provider =
        DynProvider::new(ProviderBuilder::new().connect_client(RpcClient::new_http(node_url)));

    let fetcher = ChunkedFetcher::new(ProviderSource::new(provider), cli.fetch_config()?)?;
    let export_config = cli.export_config()?;

    let chain_id = fetcher.source().chain_id(&token).await?;
    let chain = Chain::by_id(chain_id);

    let address = match (cli.address()?, &chain) {
        (Some(address), _) => address,
        (None, Some(chain)) => chain.postage_stamp(),
        (None, None) => return Err(Error::UnknownChain(chain_id)),
    };
    let start = match (cli.start, &chain) {
        (0, Some(chain)) => chain.deployed_at_block(),
        (0, None) => return Err(Error::UnknownChain(chain_id)),
        (start, _) => start,
    };

    info!(
        chain_id,
        %address,
        start_block = start,
        end_block = cli.end,
        output = %export_config.output.display(),
        "Retrieving logs"
    );

    let exporter = Exporter::new(fetcher, export_config);
    Ok(exporter
        .run(token, FetchRequest::new(address, start, cli.end))
        .await?)
}
