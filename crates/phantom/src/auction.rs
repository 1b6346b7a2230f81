use async_trait::async_trait;
use auction_settlement_types::{Side, TokenPair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::commitment::{bid_commitment, BidEnvelope, BidReveal, RevealedBid, SealedBid};
use crate::vcg::{run_vcg, VcgAllocation, VcgBid, VcgResult};
use crate::PhantomError;

const BPS: u32 = 10_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMechanism {
    /// Winner settles at its own improved price
    #[default]
    HighestScore,
    /// Winner settles at the improvement implied by its VCG payment
    Vcg,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhantomAuctionConfig {
    /// Total auction window, collection plus reveal
    pub duration: Duration,
    pub reveal_delay: Duration,
    pub min_participants: usize,
    pub min_improvement_bps: Decimal,
    pub max_improvement_bps: Decimal,
    /// Largest bid volume as a multiple of baseline volume
    pub max_volume_multiple: Decimal,
    /// Largest priority fee as a fraction of the bid's own volume
    pub max_fee_fraction: Decimal,
    pub price_weight: Decimal,
    pub fee_weight: Decimal,
    pub mechanism: PricingMechanism,
}

impl Default for PhantomAuctionConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(1_000),
            reveal_delay: Duration::from_millis(300),
            min_participants: 2,
            min_improvement_bps: Decimal::ONE,
            max_improvement_bps: Decimal::from(500),
            max_volume_multiple: Decimal::from(2),
            max_fee_fraction: Decimal::new(1, 2),
            price_weight: Decimal::new(7, 1),
            fee_weight: Decimal::new(3, 1),
            mechanism: PricingMechanism::HighestScore,
        }
    }
}

impl PhantomAuctionConfig {
    pub fn validate(&self) -> Result<(), PhantomError> {
        if self.reveal_delay.is_zero() || self.reveal_delay >= self.duration {
            return Err(PhantomError::InvalidConfig {
                reason: format!(
                    "reveal_delay {:?} must be non-zero and shorter than duration {:?}",
                    self.reveal_delay, self.duration
                ),
            });
        }
        if self.min_improvement_bps >= self.max_improvement_bps {
            return Err(PhantomError::InvalidConfig {
                reason: format!(
                    "min_improvement_bps {} must be below max_improvement_bps {}",
                    self.min_improvement_bps, self.max_improvement_bps
                ),
            });
        }
        if self.price_weight < Decimal::ZERO
            || self.fee_weight < Decimal::ZERO
            || self.price_weight + self.fee_weight != Decimal::ONE
        {
            return Err(PhantomError::InvalidConfig {
                reason: "price_weight and fee_weight must be non-negative and sum to 1".into(),
            });
        }
        if self.min_participants == 0 {
            return Err(PhantomError::InvalidConfig {
                reason: "min_participants must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn collection_window(&self) -> Duration {
        self.duration.saturating_sub(self.reveal_delay)
    }
}

/// The price and volume the phantom auction tries to beat
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhantomBaseline {
    pub pair: TokenPair,
    pub side: Side,
    pub price: Decimal,
    pub volume: Decimal,
}

impl PhantomBaseline {
    /// Signed improvement of `price` over the baseline, in basis points.
    /// `None` when the result is not representable.
    pub fn improvement_bps(&self, price: Decimal) -> Option<Decimal> {
        if self.price <= Decimal::ZERO {
            return Some(Decimal::ZERO);
        }
        let delta = match self.side {
            Side::Buy => self.price.checked_sub(price)?,
            Side::Sell => price.checked_sub(self.price)?,
        };
        delta.checked_div(self.price)?.checked_mul(Decimal::from(BPS))
    }

    /// Price that delivers `per_unit` improvement over the baseline
    pub fn improved_by(&self, per_unit: Decimal) -> Option<Decimal> {
        match self.side {
            Side::Buy => self.price.checked_sub(per_unit),
            Side::Sell => self.price.checked_add(per_unit),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionPhase {
    Collecting,
    Revealing,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BidRejection {
    #[error("auction is {phase:?}")]
    WrongPhase { phase: AuctionPhase },
    #[error("pair {got} does not match auction pair {expected}")]
    PairMismatch { expected: TokenPair, got: TokenPair },
    #[error("improvement of {bps} bps outside [{min}, {max}]")]
    ImprovementOutOfRange { bps: Decimal, min: Decimal, max: Decimal },
    #[error("volume {volume} outside (0, {max}]")]
    VolumeOutOfRange { volume: Decimal, max: Decimal },
    #[error("priority fee {fee} outside [0, {max}]")]
    FeeOutOfRange { fee: Decimal, max: Decimal },
    #[error("bidder {bidder_id} already submitted")]
    Duplicate { bidder_id: String },
    #[error("no sealed bid from {bidder_id}")]
    UnknownBidder { bidder_id: String },
    #[error("reveal from {bidder_id} does not match its commitment")]
    CommitmentMismatch { bidder_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WinningBid {
    pub bidder_id: String,
    pub improved_price: Decimal,
    pub volume: Decimal,
    pub priority_fee: Decimal,
    pub score: Decimal,
    /// VCG payment, when priced by VCG
    pub payment: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhantomAuctionResult {
    pub auction_id: String,
    pub winning_bid: Option<WinningBid>,
    pub clearing_price: Decimal,
    pub clearing_volume: Decimal,
    pub improvement_bps: Decimal,
    /// Bids that revealed validly
    pub participants: usize,
    pub sealed_bids: usize,
    pub duration: Duration,
    pub vcg: Option<VcgResult>,
}

impl PhantomAuctionResult {
    pub fn baseline(auction_id: impl Into<String>, baseline: &PhantomBaseline) -> Self {
        Self {
            auction_id: auction_id.into(),
            winning_bid: None,
            clearing_price: baseline.price,
            clearing_volume: baseline.volume,
            improvement_bps: Decimal::ZERO,
            participants: 0,
            sealed_bids: 0,
            duration: Duration::ZERO,
            vcg: None,
        }
    }

    pub fn improved(&self) -> bool {
        self.winning_bid.is_some()
    }
}

struct SealedEntry {
    bid: SealedBid,
    arrival: u64,
}

/// Synchronous phantom auction state machine
pub struct PhantomAuctionBook {
    auction_id: String,
    config: PhantomAuctionConfig,
    baseline: PhantomBaseline,
    phase: AuctionPhase,
    sealed: HashMap<String, SealedEntry>,
    revealed: Vec<RevealedBid>,
    revealed_ids: HashSet<String>,
    next_arrival: u64,
}

impl PhantomAuctionBook {
    pub fn new(
        auction_id: impl Into<String>,
        config: PhantomAuctionConfig,
        baseline: PhantomBaseline,
    ) -> Self {
        Self {
            auction_id: auction_id.into(),
            config,
            baseline,
            phase: AuctionPhase::Collecting,
            sealed: HashMap::new(),
            revealed: Vec::new(),
            revealed_ids: HashSet::new(),
            next_arrival: 0,
        }
    }

    pub fn phase(&self) -> AuctionPhase {
        self.phase
    }

    pub fn sealed_count(&self) -> usize {
        self.sealed.len()
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed.len()
    }

    fn check_eligibility(&self, envelope: &BidEnvelope) -> Result<(), BidRejection> {
        if envelope.pair != self.baseline.pair {
            return Err(BidRejection::PairMismatch {
                expected: self.baseline.pair.clone(),
                got: envelope.pair.clone(),
            });
        }

        // Unrepresentable improvements are reported as Decimal::MAX
        let bps = self.baseline.improvement_bps(envelope.improved_price);
        match bps {
            Some(bps)
                if envelope.improved_price > Decimal::ZERO
                    && bps >= self.config.min_improvement_bps
                    && bps <= self.config.max_improvement_bps => {}
            _ => {
                return Err(BidRejection::ImprovementOutOfRange {
                    bps: bps.unwrap_or(Decimal::MAX),
                    min: self.config.min_improvement_bps,
                    max: self.config.max_improvement_bps,
                });
            }
        }

        let max_volume = self
            .baseline
            .volume
            .saturating_mul(self.config.max_volume_multiple);
        if envelope.volume <= Decimal::ZERO || envelope.volume > max_volume {
            return Err(BidRejection::VolumeOutOfRange {
                volume: envelope.volume,
                max: max_volume,
            });
        }

        let max_fee = envelope.volume.saturating_mul(self.config.max_fee_fraction);
        if envelope.priority_fee < Decimal::ZERO || envelope.priority_fee > max_fee {
            return Err(BidRejection::FeeOutOfRange {
                fee: envelope.priority_fee,
                max: max_fee,
            });
        }

        Ok(())
    }

    pub fn submit(&mut self, bid: SealedBid) -> Result<(), BidRejection> {
        if self.phase != AuctionPhase::Collecting {
            return Err(BidRejection::WrongPhase { phase: self.phase });
        }
        if self.sealed.contains_key(&bid.bidder_id) {
            return Err(BidRejection::Duplicate {
                bidder_id: bid.bidder_id,
            });
        }
        self.check_eligibility(&bid.envelope)?;

        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.sealed
            .insert(bid.bidder_id.clone(), SealedEntry { bid, arrival });
        Ok(())
    }

    pub fn begin_reveal(&mut self) {
        if self.phase == AuctionPhase::Collecting {
            self.phase = AuctionPhase::Revealing;
            debug!(
                auction_id = %self.auction_id,
                sealed = self.sealed.len(),
                "Phantom auction revealing"
            );
        }
    }

    pub fn reveal(&mut self, reveal: BidReveal) -> Result<(), BidRejection> {
        if self.phase != AuctionPhase::Revealing {
            return Err(BidRejection::WrongPhase { phase: self.phase });
        }
        if self.revealed_ids.contains(&reveal.bidder_id) {
            return Err(BidRejection::Duplicate {
                bidder_id: reveal.bidder_id,
            });
        }
        let entry = self
            .sealed
            .get(&reveal.bidder_id)
            .ok_or_else(|| BidRejection::UnknownBidder {
                bidder_id: reveal.bidder_id.clone(),
            })?;

        // The revealed terms must be the ones hashed and the ones vetted at submission
        let recomputed = bid_commitment(&reveal.bidder_id, &reveal.envelope, &reveal.nonce);
        if recomputed != entry.bid.commitment || reveal.envelope != entry.bid.envelope {
            return Err(BidRejection::CommitmentMismatch {
                bidder_id: reveal.bidder_id,
            });
        }

        let revealed = RevealedBid {
            bidder_id: reveal.bidder_id,
            commitment: entry.bid.commitment,
            envelope: reveal.envelope,
            nonce: reveal.nonce,
            arrival: entry.arrival,
        };
        self.revealed_ids.insert(revealed.bidder_id.clone());
        self.revealed.push(revealed);
        Ok(())
    }

    /// Weighted sum of price improvement and fee, both in basis points.
    /// `None` when any term overflows.
    pub fn score(&self, envelope: &BidEnvelope) -> Option<Decimal> {
        let improvement = self.baseline.improvement_bps(envelope.improved_price)?;
        let notional = envelope.volume.checked_mul(envelope.improved_price)?;
        let fee_bps = if notional > Decimal::ZERO {
            envelope
                .priority_fee
                .checked_div(notional)?
                .checked_mul(Decimal::from(BPS))?
        } else {
            Decimal::ZERO
        };
        self.config
            .price_weight
            .checked_mul(improvement)?
            .checked_add(self.config.fee_weight.checked_mul(fee_bps)?)
    }

    /// Revealed bids by descending score, then arrival, then bidder id.
    /// Bids whose score cannot be represented are left out.
    fn ranked(&self) -> Vec<(Decimal, &RevealedBid)> {
        let mut ranked: Vec<(Decimal, &RevealedBid)> = self
            .revealed
            .iter()
            .filter(|b| b.validate_commitment())
            .filter_map(|b| self.score(&b.envelope).map(|score| (score, b)))
            .collect();
        ranked.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then(a.arrival.cmp(&b.arrival))
                .then(a.bidder_id.cmp(&b.bidder_id))
        });
        ranked
    }

    /// Settlement terms for the VCG winner as (clearing price, payment in quote units).
    ///
    /// VCG runs on scores, so the winner keeps the share of its own price
    /// improvement that its per-unit payment bears to its per-unit score.
    fn vcg_terms(
        &self,
        score: Decimal,
        bid: &RevealedBid,
        allocation: &VcgAllocation,
    ) -> Option<(Decimal, Decimal)> {
        if score <= Decimal::ZERO || allocation.quantity <= Decimal::ZERO {
            return None;
        }
        let share = allocation
            .payment
            .checked_div(allocation.quantity)?
            .checked_div(score)?
            .min(Decimal::ONE);
        let bps = self
            .baseline
            .improvement_bps(bid.envelope.improved_price)?
            .checked_mul(share)?;
        let per_unit = self
            .baseline
            .price
            .checked_mul(bps)?
            .checked_div(Decimal::from(BPS))?;
        let payment = per_unit.checked_mul(allocation.quantity)?;
        Some((self.baseline.improved_by(per_unit)?, payment))
    }

    pub fn finalize(&mut self, elapsed: Duration) -> PhantomAuctionResult {
        self.phase = AuctionPhase::Finalized;

        let mut result = PhantomAuctionResult::baseline(self.auction_id.clone(), &self.baseline);
        result.participants = self.revealed.len();
        result.sealed_bids = self.sealed.len();
        result.duration = elapsed;

        if self.revealed.len() < self.config.min_participants {
            info!(
                auction_id = %self.auction_id,
                revealed = self.revealed.len(),
                min_participants = self.config.min_participants,
                "Phantom auction below participation minimum, keeping baseline"
            );
            return result;
        }

        let ranked = self.ranked();
        match self.config.mechanism {
            PricingMechanism::HighestScore => {
                if let Some((score, bid)) = ranked.first() {
                    result.clearing_price = bid.envelope.improved_price;
                    result.clearing_volume = bid.envelope.volume.min(self.baseline.volume);
                    result.winning_bid = Some(WinningBid {
                        bidder_id: bid.bidder_id.clone(),
                        improved_price: bid.envelope.improved_price,
                        volume: bid.envelope.volume,
                        priority_fee: bid.envelope.priority_fee,
                        score: *score,
                        payment: None,
                    });
                }
            }
            PricingMechanism::Vcg => {
                // Per-unit scores as valuations keep the VCG fill order equal to the ranking
                let bids: Vec<VcgBid> = ranked
                    .iter()
                    .map(|(score, b)| VcgBid {
                        bidder_id: b.bidder_id.clone(),
                        valuation: *score,
                        quantity: b.envelope.volume,
                    })
                    .collect();
                let vcg = run_vcg(&bids, self.baseline.volume);

                if let Some((score, bid)) = ranked.first() {
                    let terms = vcg.allocation_for(&bid.bidder_id).and_then(|allocation| {
                        self.vcg_terms(*score, bid, allocation)
                            .map(|(price, payment)| (price, payment, allocation.quantity))
                    });
                    if let Some((clearing_price, payment, quantity)) = terms {
                        result.clearing_price = clearing_price;
                        result.clearing_volume = quantity;
                        result.winning_bid = Some(WinningBid {
                            bidder_id: bid.bidder_id.clone(),
                            improved_price: bid.envelope.improved_price,
                            volume: bid.envelope.volume,
                            priority_fee: bid.envelope.priority_fee,
                            score: *score,
                            payment: Some(payment),
                        });
                    }
                }
                result.vcg = Some(vcg);
            }
        }

        result.improvement_bps = self
            .baseline
            .improvement_bps(result.clearing_price)
            .unwrap_or(Decimal::ZERO);
        if let Some(winner) = &result.winning_bid {
            info!(
                auction_id = %self.auction_id,
                winner = %winner.bidder_id,
                improvement_bps = %result.improvement_bps,
                participants = result.participants,
                "Phantom auction finalized"
            );
        }
        result
    }
}

/// Messages delivered to a running auction
#[derive(Clone, Debug)]
pub enum AuctionMessage {
    Seal(SealedBid),
    Reveal(BidReveal),
}

/// Timetable handed to bid sources
#[derive(Clone, Copy, Debug)]
pub struct AuctionSchedule {
    pub reveal_opens_at: Instant,
    pub closes_at: Instant,
}

/// Feeds sealed bids and reveals into a running auction
#[async_trait]
pub trait BidSource: Send + Sync {
    async fn solicit(
        &self,
        auction_id: &str,
        baseline: &PhantomBaseline,
        schedule: AuctionSchedule,
        bids: mpsc::Sender<AuctionMessage>,
    );
}

/// Timer-driven runner for the phantom auction
pub struct PhantomAuction {
    config: PhantomAuctionConfig,
}

impl PhantomAuction {
    pub fn new(config: PhantomAuctionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhantomAuctionConfig {
        &self.config
    }

    /// Drive one auction from `messages` until the window closes or the
    /// channel is dropped.
    pub async fn run(
        &self,
        auction_id: &str,
        baseline: PhantomBaseline,
        schedule: AuctionSchedule,
        mut messages: mpsc::Receiver<AuctionMessage>,
    ) -> PhantomAuctionResult {
        let started = Instant::now();
        let mut book = PhantomAuctionBook::new(auction_id, self.config.clone(), baseline);

        loop {
            let next = tokio::time::timeout_at(schedule.closes_at, messages.recv()).await;
            let message = match next {
                Ok(Some(message)) => message,
                // Channel closed or window elapsed
                Ok(None) | Err(_) => break,
            };

            if book.phase() == AuctionPhase::Collecting && Instant::now() >= schedule.reveal_opens_at {
                book.begin_reveal();
            }

            let (bidder_id, outcome) = match message {
                AuctionMessage::Seal(bid) => (bid.bidder_id.clone(), book.submit(bid)),
                AuctionMessage::Reveal(reveal) => (reveal.bidder_id.clone(), book.reveal(reveal)),
            };
            if let Err(reason) = outcome {
                debug!(auction_id, bidder_id = %bidder_id, %reason, "Phantom bid dropped");
            }
        }

        book.begin_reveal();
        book.finalize(started.elapsed())
    }

    /// Run an auction fed by `source`
    pub async fn run_with_source(
        &self,
        auction_id: &str,
        baseline: PhantomBaseline,
        source: &dyn BidSource,
    ) -> PhantomAuctionResult {
        let now = Instant::now();
        let schedule = AuctionSchedule {
            reveal_opens_at: now + self.config.collection_window(),
            closes_at: now + self.config.duration,
        };
        let (tx, rx) = mpsc::channel(256);

        let (_, result) = tokio::join!(
            source.solicit(auction_id, &baseline, schedule, tx),
            self.run(auction_id, baseline.clone(), schedule, rx)
        );
        result
    }
}
