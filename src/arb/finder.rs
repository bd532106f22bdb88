//! # Opportunity finder
//!
//! Scans every tracked token for crossed venue pairs and sizes the trade for
//! each pair.
//!
//! ## Crossing
//!
//! For a probe size `P` of the base asset, every venue `v` is asked how many
//! tokens `P` buys: `bought(v) = v.quote(base → token, P)`. The ordered pair
//! `(buy, sell)` is crossed when selling `bought(buy)` into `sell` returns
//! more than `P`. Both sides are exact-input quotes, so the comparison is a
//! round trip at the probe size.
//!
//! ## Sizing
//!
//! `profit(size) = sell.quote(token → base, buy.quote(base → token, size)) - size`
//! is evaluated over an ascending ladder of sizes. The walk stops at the
//! first size that earns less than the best so far, and the peak is then
//! refined once (see [`Refinement`]).
//!
//! This is an approximation. For a unimodal profit curve the true optimum
//! lies between the ladder neighbours of the best ladder size; with
//! [`Refinement::Midpoint`] the reported volume can be off by up to half a
//! ladder step, and a curve with several local maxima can be missed entirely.

use std::sync::Arc;

use alloy::primitives::{Address, I256, U256};
use eyre::Result;
use itertools::Itertools;
use log::{debug, info};

use super::catalog::MarketsByToken;
use super::market::Market;
use super::opportunity::CrossedOpportunity;
use crate::utils::constants::ETHER;

/// Candidate trade sizes, ascending
#[must_use]
pub fn default_size_ladder() -> Vec<U256> {
    vec![
        ETHER / U256::from(100),
        ETHER / U256::from(10),
        ETHER / U256::from(6),
        ETHER / U256::from(4),
        ETHER / U256::from(2),
        ETHER,
        ETHER * U256::from(2),
        ETHER * U256::from(5),
        ETHER * U256::from(10),
    ]
}

/// Default probe size: 0.01 of the base asset
#[must_use]
pub fn default_probe_size() -> U256 {
    ETHER / U256::from(100)
}

/// How the ladder peak is refined once the walk overshoots it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refinement {
    /// Evaluate the midpoint between the best size and the first regressing
    /// size; adopt it only if it strictly improves.
    Midpoint,
    /// Bisect on the sign of `profit(x + precision) - profit(x)` between the
    /// ladder size below the best and the regressing size, keeping the best
    /// strictly-improving size seen.
    Bisection {
        /// Upper bound on bisection steps
        max_iterations: usize,
        /// Bracket width at which to stop; also the slope step
        precision: U256,
    },
}

/// Finder settings
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// The common settlement asset
    pub base_token: Address,
    /// Size used only to detect crossed pairs
    pub probe_size: U256,
    /// Ascending candidate trade sizes
    pub size_ladder: Vec<U256>,
    /// Opportunities must earn strictly more than this
    pub min_profit: I256,
    /// Peak refinement
    pub refinement: Refinement,
}

impl FinderConfig {
    /// Default probe, ladder and midpoint refinement
    #[must_use]
    pub fn new(base_token: Address, min_profit: I256) -> Self {
        Self {
            base_token,
            probe_size: default_probe_size(),
            size_ladder: default_size_ladder(),
            min_profit,
            refinement: Refinement::Midpoint,
        }
    }
}

/// A sized trade: `(volume, profit)`
type SizedTrade = (U256, I256);

/// Finds and ranks crossed venue pairs.
#[derive(Debug, Clone)]
pub struct OpportunityFinder {
    /// Settings
    config: FinderConfig,
}

impl OpportunityFinder {
    /// Creates a finder
    #[must_use]
    pub const fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Finder settings
    #[must_use]
    pub const fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// The best crossed pair of every token that clears the minimum profit,
    /// most profitable first.
    pub fn evaluate<M: Market>(
        &self,
        markets_by_token: &MarketsByToken<M>,
    ) -> Vec<CrossedOpportunity<M>> {
        let mut best_crossed_markets: Vec<_> = markets_by_token
            .iter()
            .filter_map(|(token, markets)| {
                let crossed = self.crossed_pairs(*token, markets);
                self.best_crossed_market(*token, crossed)
            })
            .filter(|opportunity| {
                opportunity.profit.is_positive() && opportunity.profit > self.config.min_profit
            })
            .collect();

        rank(&mut best_crossed_markets);

        info!(
            "finder: {} tokens scanned, {} opportunities above minimum profit",
            markets_by_token.len(),
            best_crossed_markets.len()
        );
        best_crossed_markets
    }

    /// Ordered `(buy, sell)` pairs that are crossed at the probe size.
    /// Venues that cannot quote the probe are left out.
    fn crossed_pairs<M: Market>(&self, token: Address, markets: &[Arc<M>]) -> Vec<(Arc<M>, Arc<M>)> {
        let base = self.config.base_token;
        let probe = self.config.probe_size;

        let bought: Vec<Option<U256>> = markets
            .iter()
            .map(|market| match market.quote(base, token, probe) {
                Ok(tokens) => Some(tokens),
                Err(e) => {
                    debug!("finder: skipping {} for {token} at probe: {e}", market.address());
                    None
                }
            })
            .collect();

        markets
            .iter()
            .zip(bought)
            .filter_map(|(buy, tokens)| tokens.map(|tokens| (buy, tokens)))
            .cartesian_product(markets.iter())
            .filter(|((buy, _), sell)| !Arc::ptr_eq(*buy, *sell))
            .filter(|((buy, tokens), sell)| match sell.quote(token, base, *tokens) {
                Ok(proceeds) => proceeds > probe,
                Err(e) => {
                    debug!(
                        "finder: skipping {} -> {} for {token}: {e}",
                        buy.address(),
                        sell.address()
                    );
                    false
                }
            })
            .map(|((buy, _), sell)| (Arc::clone(buy), Arc::clone(sell)))
            .collect()
    }

    /// The most profitable sized trade over all crossed pairs of one token.
    /// Earlier pairs win ties.
    fn best_crossed_market<M: Market>(
        &self,
        token: Address,
        crossed: Vec<(Arc<M>, Arc<M>)>,
    ) -> Option<CrossedOpportunity<M>> {
        let base = self.config.base_token;
        let mut best: Option<CrossedOpportunity<M>> = None;

        for (buy_market, sell_market) in crossed {
            let profit_at = |size: U256| {
                CrossedOpportunity::<M>::round_trip_profit(base, token, &buy_market, &sell_market, size)
            };
            let (volume, profit) = match self.search_volume(profit_at) {
                Ok(Some(sized)) => sized,
                Ok(None) => continue,
                Err(e) => {
                    debug!(
                        "finder: skipping {} -> {} for {token}: {e}",
                        buy_market.address(),
                        sell_market.address()
                    );
                    continue;
                }
            };

            if best.as_ref().is_none_or(|best| profit > best.profit) {
                best = Some(CrossedOpportunity {
                    token,
                    buy_market,
                    sell_market,
                    volume,
                    profit,
                });
            }
        }
        best
    }

    /// Walks the size ladder and refines the peak.
    ///
    /// # Errors
    /// * If a ladder size cannot be quoted; the pair is then unusable
    fn search_volume<F>(&self, profit_at: F) -> Result<Option<SizedTrade>>
    where
        F: Fn(U256) -> Result<I256>,
    {
        let ladder = &self.config.size_ladder;
        let mut best: Option<SizedTrade> = None;

        for (index, &size) in ladder.iter().enumerate() {
            let profit = profit_at(size)?;
            if let Some(ladder_best) = best {
                if profit < ladder_best.1 {
                    // The size below the best bounds the peak from the left
                    let lower = index.checked_sub(2).map_or(U256::ZERO, |i| ladder[i]);
                    return Ok(Some(self.refine(&profit_at, ladder_best, lower, size)));
                }
            }
            best = Some((size, profit));
        }
        Ok(best)
    }

    /// Refines a ladder peak `best` that lies between `lower` and `upper`.
    /// Quote failures during refinement keep the ladder result.
    fn refine<F>(&self, profit_at: &F, best: SizedTrade, lower: U256, upper: U256) -> SizedTrade
    where
        F: Fn(U256) -> Result<I256>,
    {
        match self.config.refinement {
            Refinement::Midpoint => {
                let midpoint = (best.0 + upper) / U256::from(2);
                match profit_at(midpoint) {
                    Ok(profit) if profit > best.1 => (midpoint, profit),
                    Ok(_) => best,
                    Err(e) => {
                        debug!("finder: midpoint {midpoint} unquotable: {e}");
                        best
                    }
                }
            }
            Refinement::Bisection {
                max_iterations,
                precision,
            } => bisect(profit_at, best, lower, upper, max_iterations, precision),
        }
    }
}

/// Bisection on the profit slope inside `[lower, upper]`.
///
/// A `precision` that is too small can stall on flat stretches where
/// `profit(x + precision) == profit(x)`; `max_iterations` bounds that.
fn bisect<F>(
    profit_at: &F,
    mut best: SizedTrade,
    mut lower: U256,
    mut upper: U256,
    max_iterations: usize,
    precision: U256,
) -> SizedTrade
where
    F: Fn(U256) -> Result<I256>,
{
    let delta = precision.max(U256::from(1));
    let mut iterations = 0;

    while upper.saturating_sub(lower) > delta && iterations < max_iterations {
        iterations += 1;
        let amount_in = (lower + upper) / U256::from(2);
        let amount_in_delta = amount_in + delta;

        let (profit, profit_delta) = match (profit_at(amount_in), profit_at(amount_in_delta)) {
            (Ok(profit), Ok(profit_delta)) => (profit, profit_delta),
            (Err(e), _) | (_, Err(e)) => {
                debug!("finder: bisection stopped at {amount_in}: {e}");
                break;
            }
        };

        if profit_delta > profit {
            // Rising profit curve
            lower = amount_in;
        } else {
            // Falling profit curve
            upper = amount_in;
        }

        if profit > best.1 {
            best = (amount_in, profit);
        }
        if profit_delta > best.1 {
            best = (amount_in_delta, profit_delta);
        }
    }
    best
}

/// Sorts opportunities by profit, highest first. The sort is stable, so
/// equal profits keep their scan order.
pub fn rank<M>(opportunities: &mut [CrossedOpportunity<M>]) {
    opportunities.sort_by(|a, b| b.profit.cmp(&a.profit));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;
    use crate::arb::uniswap_v2::UniswapV2Market;

    /// Finder over tiny integer reserves: base "A", probe of 10 units
    fn small_finder(ladder: &[u64], refinement: Refinement) -> OpportunityFinder {
        OpportunityFinder::new(FinderConfig {
            base_token: address_from_str("A"),
            probe_size: U256::from(10),
            size_ladder: ladder.iter().map(|size| U256::from(*size)).collect(),
            min_profit: I256::ZERO,
            refinement,
        })
    }

    /// P1 sells B cheaply (2 B per A), P2 buys it back at 1 A per B
    fn small_markets() -> MarketsByToken<UniswapV2Market> {
        markets_by_token(&[(
            "B",
            vec![
                v2_market("P1", "A", "B", 100, 200),
                v2_market("P2", "B", "A", 300, 300),
            ],
        )])
    }

    #[test]
    fn test_finds_profitable_direction_between_constant_product_venues() {
        let finder = OpportunityFinder::new(FinderConfig::new(
            address_from_str("WETH"),
            I256::from_raw(ETHER / U256::from(100)),
        ));
        let markets = markets_by_token(&[(
            "T",
            vec![
                v2_market("VA", "WETH", "T", 1000 * ETHER_U128, 2000 * ETHER_U128),
                v2_market("VB", "WETH", "T", 1000 * ETHER_U128, 1500 * ETHER_U128),
            ],
        )]);

        let opportunities = finder.evaluate(&markets);

        assert_eq!(opportunities.len(), 1);
        let opportunity = &opportunities[0];
        assert_eq!(opportunity.token, address_from_str("T"));
        assert_eq!(opportunity.buy_market.address(), address_from_str("VA"));
        assert_eq!(opportunity.sell_market.address(), address_from_str("VB"));
        // The profit keeps rising across the whole ladder
        assert_eq!(opportunity.volume, ETHER * U256::from(10));
        assert!(opportunity.profit.is_positive());
        assert_eq!(
            opportunity.recompute_profit(address_from_str("WETH")).unwrap(),
            opportunity.profit
        );
    }

    #[test]
    fn test_reverse_direction_is_not_crossed() {
        let finder = small_finder(&[10, 20, 30], Refinement::Midpoint);
        let markets = small_markets();
        let pairs = finder.crossed_pairs(address_from_str("B"), &markets[&address_from_str("B")]);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.address(), address_from_str("P1"));
        assert_eq!(pairs[0].1.address(), address_from_str("P2"));
    }

    #[test]
    fn test_equal_prices_are_not_crossed() {
        let finder = small_finder(&[10, 20, 30], Refinement::Midpoint);
        let markets = markets_by_token(&[(
            "B",
            vec![
                v2_market("P1", "A", "B", 1000, 1000),
                v2_market("P2", "B", "A", 1000, 1000),
            ],
        )]);

        assert!(finder.evaluate(&markets).is_empty());
    }

    #[test]
    fn test_ladder_stops_at_regression_and_keeps_best_when_midpoint_is_worse() {
        // profits: 10 => 6, 20 => 9, 30 => 9, 40 => 7; midpoint 35 => 8
        let finder = small_finder(&[10, 20, 30, 40, 50], Refinement::Midpoint);
        let opportunities = finder.evaluate(&small_markets());

        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].volume, U256::from(30));
        assert_eq!(opportunities[0].profit, I256::try_from(9).unwrap());
    }

    #[test]
    fn test_midpoint_adopted_when_strictly_better() {
        // profits: 10 => 6, 50 => 3; midpoint 30 => 9
        let finder = small_finder(&[10, 50], Refinement::Midpoint);
        let opportunities = finder.evaluate(&small_markets());

        assert_eq!(opportunities[0].volume, U256::from(30));
        assert_eq!(opportunities[0].profit, I256::try_from(9).unwrap());
    }

    #[test]
    fn test_bisection_refinement() {
        let finder = small_finder(
            &[10, 50],
            Refinement::Bisection {
                max_iterations: 64,
                precision: U256::from(1),
            },
        );
        let opportunities = finder.evaluate(&small_markets());

        assert_eq!(opportunities[0].volume, U256::from(25));
        assert_eq!(opportunities[0].profit, I256::try_from(9).unwrap());
        assert_eq!(
            opportunities[0].recompute_profit(address_from_str("A")).unwrap(),
            opportunities[0].profit
        );
    }

    #[test]
    fn test_stored_profit_matches_independent_quotes() {
        let finder = small_finder(&[10, 20, 30, 40, 50], Refinement::Midpoint);
        for opportunity in finder.evaluate(&small_markets()) {
            let base = address_from_str("A");
            let tokens = opportunity
                .buy_market
                .quote(base, opportunity.token, opportunity.volume)
                .unwrap();
            let proceeds = opportunity
                .sell_market
                .quote(opportunity.token, base, tokens)
                .unwrap();
            assert_eq!(
                I256::from_raw(proceeds) - I256::from_raw(opportunity.volume),
                opportunity.profit
            );
        }
    }

    #[test]
    fn test_minimum_profit_filter() {
        let mut finder = small_finder(&[10, 20, 30, 40, 50], Refinement::Midpoint);
        finder.config.min_profit = I256::try_from(9).unwrap();
        assert!(finder.evaluate(&small_markets()).is_empty());

        finder.config.min_profit = I256::try_from(8).unwrap();
        assert_eq!(finder.evaluate(&small_markets()).len(), 1);
    }

    #[test]
    fn test_never_reports_non_positive_profit() {
        // Crossed at the probe but every ladder size loses
        let mut finder = small_finder(&[60, 70, 80], Refinement::Midpoint);
        finder.config.min_profit = I256::MIN;
        assert!(finder.evaluate(&small_markets()).is_empty());
    }

    #[test]
    fn test_quote_failure_skips_only_that_venue() {
        let finder = small_finder(&[10, 20, 30, 40, 50], Refinement::Midpoint);
        let mut markets = small_markets();
        markets
            .get_mut(&address_from_str("B"))
            .unwrap()
            .push(Arc::new(v2_pair("P3", "A", "B")));
        markets.extend(markets_by_token(&[(
            "C",
            vec![v2_pair("P4", "A", "C"), v2_pair("P5", "C", "A")],
        )]));

        let opportunities = finder.evaluate(&markets);

        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].token, address_from_str("B"));
    }

    #[test]
    fn test_rank_orders_by_profit_descending() {
        let market = Arc::new(v2_market("P1", "A", "B", 100, 200));
        let mut opportunities: Vec<_> = [5, 10, 3]
            .into_iter()
            .map(|profit| CrossedOpportunity {
                token: address_from_str("B"),
                buy_market: Arc::clone(&market),
                sell_market: Arc::clone(&market),
                volume: U256::from(1),
                profit: I256::try_from(profit).unwrap(),
            })
            .collect();

        rank(&mut opportunities);

        let profits: Vec<_> = opportunities.iter().map(|o| o.profit).collect();
        assert_eq!(
            profits,
            [10, 5, 3].map(|p| I256::try_from(p).unwrap()).to_vec()
        );
    }

    #[test]
    fn test_ranking_across_tokens() {
        let finder = small_finder(&[10, 20, 30, 40, 50], Refinement::Midpoint);
        let markets = markets_by_token(&[
            (
                "B",
                vec![
                    v2_market("P1", "A", "B", 100, 200),
                    v2_market("P2", "B", "A", 300, 300),
                ],
            ),
            (
                "C",
                vec![
                    v2_market("P3", "A", "C", 1000, 2000),
                    v2_market("P4", "C", "A", 3000, 3000),
                ],
            ),
        ]);

        let opportunities = finder.evaluate(&markets);

        assert_eq!(opportunities.len(), 2);
        assert!(opportunities[0].profit >= opportunities[1].profit);
        assert_eq!(opportunities[0].token, address_from_str("C"));
    }
}
