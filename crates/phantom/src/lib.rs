//! Phantom auction: a sealed-bid, commit-reveal sub-auction run before
//! settlement to discover a better price than the auction baseline.
//!
//! Bidders seal a SHA-256 commitment during collection and reveal during the
//! reveal window. Reveals that do not reproduce their commitment are dropped.
//! The winner is chosen by score, or priced by VCG when configured.

pub mod auction;
pub mod commitment;
pub mod vcg;

pub use auction::{
    AuctionMessage, AuctionPhase, AuctionSchedule, BidRejection, BidSource, PhantomAuction,
    PhantomAuctionBook, PhantomAuctionConfig, PhantomAuctionResult, PhantomBaseline,
    PricingMechanism, WinningBid,
};
pub use commitment::{
    bid_commitment, encode_bid, BidEnvelope, BidNonce, BidReveal, Commitment, ImprovementBid,
    RevealedBid, SealedBid,
};
pub use vcg::{run_vcg, VcgAllocation, VcgBid, VcgResult};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhantomError {
    #[error("invalid phantom auction config: {reason}")]
    InvalidConfig { reason: String },
}

impl From<PhantomError> for auction_settlement_types::SettlementError {
    fn from(err: PhantomError) -> Self {
        auction_settlement_types::SettlementError::Validation {
            reason: err.to_string(),
        }
    }
}
