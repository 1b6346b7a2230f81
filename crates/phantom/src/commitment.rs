//! Bid commitments.
//!
//! The committed bytes are a fixed, versioned encoding: a domain tag followed
//! by each field as a big-endian `u32` length and its UTF-8 bytes, with prices
//! and volumes written as normalized decimal strings, then the raw nonce.

use auction_settlement_types::TokenPair;
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const COMMITMENT_DOMAIN: &[u8] = b"phantom-bid-v1";

pub type BidNonce = [u8; 32];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The plaintext terms of a bid
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidEnvelope {
    pub pair: TokenPair,
    pub improved_price: Decimal,
    pub volume: Decimal,
    pub priority_fee: Decimal,
}

fn put_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_be_bytes());
    buf.extend_from_slice(field);
}

/// Stable byte encoding of the committed fields
pub fn encode_bid(
    bidder_id: &str,
    pair: &TokenPair,
    improved_price: Decimal,
    volume: Decimal,
    nonce: &BidNonce,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(COMMITMENT_DOMAIN);
    put_field(&mut buf, bidder_id.as_bytes());
    put_field(&mut buf, pair.base.as_bytes());
    put_field(&mut buf, pair.quote.as_bytes());
    put_field(&mut buf, improved_price.normalize().to_string().as_bytes());
    put_field(&mut buf, volume.normalize().to_string().as_bytes());
    buf.extend_from_slice(nonce);
    buf
}

pub fn bid_commitment(bidder_id: &str, envelope: &BidEnvelope, nonce: &BidNonce) -> Commitment {
    let encoded = encode_bid(
        bidder_id,
        &envelope.pair,
        envelope.improved_price,
        envelope.volume,
        nonce,
    );
    Commitment(Sha256::digest(&encoded).into())
}

/// What a bidder submits while the auction is collecting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SealedBid {
    pub bidder_id: String,
    pub commitment: Commitment,
    pub envelope: BidEnvelope,
}

/// What a bidder submits once reveals open
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidReveal {
    pub bidder_id: String,
    pub envelope: BidEnvelope,
    pub nonce: BidNonce,
}

/// A sealed bid paired with its reveal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevealedBid {
    pub bidder_id: String,
    pub commitment: Commitment,
    pub envelope: BidEnvelope,
    pub nonce: BidNonce,
    /// Submission order within the auction, used to break ties
    pub arrival: u64,
}

impl RevealedBid {
    /// Recomputes the hash over the revealed fields
    pub fn validate_commitment(&self) -> bool {
        bid_commitment(&self.bidder_id, &self.envelope, &self.nonce) == self.commitment
    }
}

/// Client-side helper that keeps the nonce until reveal time
#[derive(Clone, Debug)]
pub struct ImprovementBid {
    pub bidder_id: String,
    pub envelope: BidEnvelope,
    nonce: BidNonce,
}

impl ImprovementBid {
    pub fn new(bidder_id: impl Into<String>, envelope: BidEnvelope) -> Self {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::with_nonce(bidder_id, envelope, nonce)
    }

    pub fn with_nonce(bidder_id: impl Into<String>, envelope: BidEnvelope, nonce: BidNonce) -> Self {
        Self {
            bidder_id: bidder_id.into(),
            envelope,
            nonce,
        }
    }

    pub fn commitment(&self) -> Commitment {
        bid_commitment(&self.bidder_id, &self.envelope, &self.nonce)
    }

    pub fn seal(&self) -> SealedBid {
        SealedBid {
            bidder_id: self.bidder_id.clone(),
            commitment: self.commitment(),
            envelope: self.envelope.clone(),
        }
    }

    pub fn reveal(&self) -> BidReveal {
        BidReveal {
            bidder_id: self.bidder_id.clone(),
            envelope: self.envelope.clone(),
            nonce: self.nonce,
        }
    }
}
