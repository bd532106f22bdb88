use alloy::primitives::I256;
use alloy::providers::{Provider, RootProvider};
use clap::{Parser, Subcommand};
use eyre::{bail, Result};
use futures::StreamExt;
use log::info;

use fly::arb::catalog::{FlashQueryReserves, MarketCatalog};
use fly::arb::finder::{FinderConfig, OpportunityFinder};
use fly::bot::ArbitrageBot;
use fly::config::Config;
use fly::execution::bundle::BundleBuilder;
use fly::execution::fees::{FeeEstimator, FeeParams};
use fly::execution::relay::{FlashbotsRelay, WaitSettings};
use fly::execution::submitter::{BundleSubmitter, SubmissionPolicy};
use fly::notify::HealthCheck;
use fly::scheduler::{BlockDrivenScheduler, BlockInfo};
use fly::utils::logger::setup_logger;
use fly::utils::providers::create_ws_provider;

/// The searcher wired to live chain and relay access
type Searcher = ArbitrageBot<FlashQueryReserves<RootProvider>, FlashbotsRelay<RootProvider>>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Run one search-and-submit cycle per new block (default)
    Start,
    /// Refresh reserves once and print ranked opportunities, submitting nothing
    Evaluate,
}

fn build_searcher(config: &Config, provider: &RootProvider, catalog: MarketCatalog) -> Result<Searcher> {
    let reserves = FlashQueryReserves::new(
        provider.clone(),
        config.flash_query,
        config.reserve_batch_size,
    );
    let finder = OpportunityFinder::new(FinderConfig::new(
        config.base_token,
        I256::try_from(config.min_profit_wei)?,
    ));
    let fees = FeeEstimator::new(FeeParams {
        priority_fee: config.priority_fee_wei,
        gas_limit: config.gas_limit,
    });
    let relay = FlashbotsRelay::new(
        provider.clone(),
        config.relay_url.clone(),
        config.relay_signer.clone(),
        WaitSettings {
            resolution_timeout: config.resolution_timeout,
            ..WaitSettings::default()
        },
    )?;
    let submitter = BundleSubmitter::new(
        relay,
        config.signer.clone(),
        SubmissionPolicy {
            max_bundles_per_block: config.max_bundles_per_block,
        },
    );
    let healthcheck = HealthCheck::from_url(config.healthcheck_url.as_deref())?;

    Ok(ArbitrageBot::new(
        catalog,
        reserves,
        finder,
        fees,
        BundleBuilder::new(config.executor, config.chain_id),
        submitter,
        healthcheck,
    ))
}

async fn start(searcher: Searcher, config: &Config, provider: &RootProvider) -> Result<()> {
    let blocks = provider
        .subscribe_blocks()
        .await?
        .into_stream()
        .map(|header| BlockInfo {
            number: header.number,
            base_fee: header.base_fee_per_gas.map(u128::from),
        })
        .boxed();

    info!("Waiting for new blocks");
    let scheduler = BlockDrivenScheduler::new(searcher, config.cycle_timeout);
    let stats = scheduler.run(blocks).await;

    bail!("Block subscription ended after {} cycles", stats.cycles_started)
}

async fn evaluate(searcher: &Searcher) -> Result<()> {
    let opportunities = searcher.evaluate().await?;
    info!("Found {} opportunities", opportunities.len());
    for opportunity in &opportunities {
        info!("{opportunity}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logger()?;
    let cli = Cli::parse();
    let config = Config::from_env()?;

    info!("Searcher Wallet Address: {}", config.signer.address());
    info!(
        "Flashbots Relay Signing Wallet Address: {}",
        config.relay_signer.address()
    );

    let provider = create_ws_provider(&config.rpc_ws_url).await?;
    let catalog = MarketCatalog::from_file(config.base_token, &config.markets_file)?;
    let searcher = build_searcher(&config, &provider, catalog)?;

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => start(searcher, &config, &provider).await,
        Commands::Evaluate => evaluate(&searcher).await,
    }
}
