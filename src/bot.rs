use std::fmt::{self, Display};

use eyre::Result;
use itertools::Itertools;
use log::{info, warn};

use crate::arb::catalog::{MarketCatalog, ReserveSource};
use crate::arb::finder::OpportunityFinder;
use crate::arb::opportunity::CrossedOpportunity;
use crate::arb::uniswap_v2::UniswapV2Market;
use crate::execution::bundle::BundleBuilder;
use crate::execution::fees::FeeEstimator;
use crate::execution::relay::{BundleRelay, ResolutionOutcome};
use crate::execution::submitter::BundleSubmitter;
use crate::notify::HealthCheck;
use crate::scheduler::{BlockInfo, CycleRunner};

/// Summary of one block cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Block the cycle ran for
    pub block: u64,
    /// Opportunities above the minimum profit
    pub opportunities: usize,
    /// One outcome per submitted bundle
    pub outcomes: Vec<ResolutionOutcome>,
}

impl CycleReport {
    /// An empty report for `block`
    #[must_use]
    pub const fn new(block: u64) -> Self {
        Self {
            block,
            opportunities: 0,
            outcomes: Vec::new(),
        }
    }
}

impl Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {}: {} opportunities, outcomes [{}]",
            self.block,
            self.opportunities,
            self.outcomes.iter().join(", ")
        )
    }
}

/// Refreshes reserves, finds crossed markets and submits the best of them.
#[derive(Debug)]
pub struct ArbitrageBot<S, R> {
    /// Tracked venues
    catalog: MarketCatalog,
    /// Reserve reader
    reserves: S,
    /// Opportunity search
    finder: OpportunityFinder,
    /// Fee fields
    fees: FeeEstimator,
    /// Executor call construction
    builder: BundleBuilder,
    /// Signing and submission
    submitter: BundleSubmitter<R>,
    /// Optional uptime ping
    healthcheck: Option<HealthCheck>,
}

impl<S, R> ArbitrageBot<S, R>
where
    S: ReserveSource,
    R: BundleRelay,
{
    /// Wires the cycle's components
    #[must_use]
    pub const fn new(
        catalog: MarketCatalog,
        reserves: S,
        finder: OpportunityFinder,
        fees: FeeEstimator,
        builder: BundleBuilder,
        submitter: BundleSubmitter<R>,
        healthcheck: Option<HealthCheck>,
    ) -> Self {
        Self {
            catalog,
            reserves,
            finder,
            fees,
            builder,
            submitter,
            healthcheck,
        }
    }

    /// Refreshes every market and returns the ranked opportunities, without
    /// submitting anything.
    ///
    /// # Errors
    /// * If the reserve refresh fails
    pub async fn evaluate(&self) -> Result<Vec<CrossedOpportunity<UniswapV2Market>>> {
        let markets = self.catalog.refresh(&self.reserves).await?;
        Ok(self.finder.evaluate(&markets))
    }
}

impl<S, R> CycleRunner for ArbitrageBot<S, R>
where
    S: ReserveSource,
    R: BundleRelay,
{
    async fn run_cycle(&self, block: BlockInfo) -> Result<CycleReport> {
        let mut report = CycleReport::new(block.number);
        let opportunities = self.evaluate().await?;
        report.opportunities = opportunities.len();

        if opportunities.is_empty() {
            info!("bot: no crossed markets at block {}", block.number);
            return Ok(report);
        }
        for opportunity in &opportunities {
            info!("bot: {opportunity}");
        }

        let fees = self.fees.estimate(block.base_fee, 1);
        let base_token = self.catalog.base_token();
        let transactions: Vec<_> = opportunities
            .iter()
            .take(self.submitter.policy().max_bundles_per_block)
            .filter_map(|opportunity| match self.builder.build(base_token, opportunity, fees) {
                Ok(transaction) => Some(transaction),
                Err(e) => {
                    warn!("bot: cannot build bundle for {opportunity}: {e}");
                    None
                }
            })
            .collect();

        report.outcomes = self.submitter.submit(&transactions, block.number).await?;

        if let Some(healthcheck) = &self.healthcheck {
            healthcheck.ping().await;
        }
        Ok(report)
    }
}
