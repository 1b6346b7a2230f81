use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base/quote pair an auction cleared
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    pub base: String,
    pub quote: String,
}

impl TokenPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Taker buys base; a lower price is an improvement
    Buy,
    /// Taker sells base; a higher price is an improvement
    Sell,
}

/// A single winner's share of the cleared volume
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub participant: String,
    pub quantity: Decimal,
}

/// Observed market conditions around the settlement, used for MEV scoring
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// Liquidity available in the pool the settlement trades against
    pub pool_liquidity: Decimal,
    /// Rolling average trade volume for the pair
    pub average_volume: Decimal,
    pub gas_price: Decimal,
    pub median_gas_price: Decimal,
    /// Offset of submission inside the current block
    pub block_offset_ms: u64,
    pub block_time_ms: u64,
    pub current_block: u64,
    pub sender: String,
    pub sender_tx_count: u64,
    /// Prior transactions from this sender flagged as sandwich legs
    pub sender_flagged_count: u64,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            pool_liquidity: Decimal::ZERO,
            average_volume: Decimal::ZERO,
            gas_price: Decimal::ZERO,
            median_gas_price: Decimal::ZERO,
            block_offset_ms: 0,
            block_time_ms: 6_000,
            current_block: 0,
            sender: String::new(),
            sender_tx_count: 0,
            sender_flagged_count: 0,
        }
    }
}

/// Outcome of an auction handed to settlement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionResult {
    pub auction_id: String,
    pub pair: TokenPair,
    pub side: Side,
    pub clearing_price: Decimal,
    pub volume: Decimal,
    pub allocations: Vec<Allocation>,
    pub market: Option<MarketContext>,
}

impl AuctionResult {
    pub fn new(
        auction_id: impl Into<String>,
        pair: TokenPair,
        side: Side,
        clearing_price: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            auction_id: auction_id.into(),
            pair,
            side,
            clearing_price,
            volume,
            allocations: vec![],
            market: None,
        }
    }

    pub fn with_allocation(mut self, participant: impl Into<String>, quantity: Decimal) -> Self {
        self.allocations.push(Allocation {
            participant: participant.into(),
            quantity,
        });
        self
    }

    pub fn with_market(mut self, market: MarketContext) -> Self {
        self.market = Some(market);
        self
    }

    /// Quote-denominated value of the cleared volume
    pub fn notional(&self) -> Decimal {
        self.clearing_price * self.volume
    }

    pub fn allocated_volume(&self) -> Decimal {
        self.allocations.iter().map(|a| a.quantity).sum()
    }
}
