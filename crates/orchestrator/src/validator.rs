use auction_settlement_types::{AuctionResult, SettlementError, TokenPair, Transaction};
use rust_decimal::Decimal;
use std::collections::HashSet;
use thiserror::Error;

/// Pre-checks auction results and prepared transactions before they cause
/// any side effect
pub struct TransactionValidator {
    /// Empty means every well-formed pair is accepted
    supported_pairs: HashSet<TokenPair>,
    /// Minimum volume (to prevent dust)
    min_volume: Decimal,
    max_notional: Option<Decimal>,
}

impl TransactionValidator {
    pub fn new(
        supported_pairs: HashSet<TokenPair>,
        min_volume: Decimal,
        max_notional: Option<Decimal>,
    ) -> Self {
        Self {
            supported_pairs,
            min_volume,
            max_notional,
        }
    }

    /// Accepts any pair, any positive volume and any notional
    pub fn permissive() -> Self {
        Self::new(HashSet::new(), Decimal::ZERO, None)
    }

    pub fn add_supported_pair(&mut self, pair: TokenPair) {
        self.supported_pairs.insert(pair);
    }

    /// Validate an auction result before a transaction is created for it
    pub fn validate_auction(&self, auction: &AuctionResult) -> Result<(), ValidationError> {
        if auction.auction_id.trim().is_empty() {
            return Err(ValidationError::MissingAuctionId);
        }
        let auction_id = auction.auction_id.clone();

        self.validate_pair(&auction_id, &auction.pair)?;

        if auction.clearing_price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice {
                auction_id,
                price: auction.clearing_price,
            });
        }

        if auction.volume <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveVolume {
                auction_id,
                volume: auction.volume,
            });
        }

        if auction.volume < self.min_volume {
            return Err(ValidationError::VolumeTooSmall {
                auction_id,
                volume: auction.volume,
                minimum: self.min_volume,
            });
        }

        if let Some(max) = self.max_notional {
            let notional = auction.notional();
            if notional > max {
                return Err(ValidationError::NotionalTooLarge {
                    auction_id,
                    notional,
                    maximum: max,
                });
            }
        }

        let allocated = auction.allocated_volume();
        if allocated > auction.volume {
            return Err(ValidationError::OverAllocated {
                auction_id,
                allocated,
                volume: auction.volume,
            });
        }

        Ok(())
    }

    fn validate_pair(&self, auction_id: &str, pair: &TokenPair) -> Result<(), ValidationError> {
        if pair.base.trim().is_empty() || pair.quote.trim().is_empty() {
            return Err(ValidationError::MalformedPair {
                auction_id: auction_id.to_string(),
                pair: pair.to_string(),
            });
        }

        if pair.base == pair.quote {
            return Err(ValidationError::SameAssetTrading {
                auction_id: auction_id.to_string(),
                denom: pair.base.clone(),
            });
        }

        if !self.supported_pairs.is_empty() && !self.supported_pairs.contains(pair) {
            return Err(ValidationError::UnsupportedPair {
                auction_id: auction_id.to_string(),
                pair: pair.to_string(),
            });
        }

        Ok(())
    }

    /// Validate the routes a route optimizer prepared
    pub fn validate_routes(&self, transaction: &Transaction) -> Result<(), ValidationError> {
        if transaction.routes.is_empty() {
            return Err(ValidationError::NoRoutes {
                transaction_id: transaction.id.clone(),
            });
        }

        if let Some(route) = transaction.routes.iter().find(|r| r.amount <= Decimal::ZERO) {
            return Err(ValidationError::EmptyRoute {
                transaction_id: transaction.id.clone(),
                route_id: route.route_id.clone(),
            });
        }

        let routed = transaction.routed_volume();
        if routed > transaction.volume {
            return Err(ValidationError::OverRouted {
                transaction_id: transaction.id.clone(),
                routed,
                volume: transaction.volume,
            });
        }

        Ok(())
    }
}

impl Default for TransactionValidator {
    fn default() -> Self {
        Self::permissive()
    }
}

/// Validation errors with detailed reasons
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("auction result has no auction id")]
    MissingAuctionId,

    #[error("auction {auction_id}: malformed pair {pair}")]
    MalformedPair { auction_id: String, pair: String },

    #[error("auction {auction_id}: base and quote are both {denom}")]
    SameAssetTrading { auction_id: String, denom: String },

    #[error("auction {auction_id}: unsupported pair {pair}")]
    UnsupportedPair { auction_id: String, pair: String },

    #[error("auction {auction_id}: clearing price {price} is not positive")]
    NonPositivePrice { auction_id: String, price: Decimal },

    #[error("auction {auction_id}: volume {volume} is not positive")]
    NonPositiveVolume { auction_id: String, volume: Decimal },

    #[error("auction {auction_id}: volume {volume} below minimum {minimum}")]
    VolumeTooSmall {
        auction_id: String,
        volume: Decimal,
        minimum: Decimal,
    },

    #[error("auction {auction_id}: notional {notional} above maximum {maximum}")]
    NotionalTooLarge {
        auction_id: String,
        notional: Decimal,
        maximum: Decimal,
    },

    #[error("auction {auction_id}: allocations total {allocated} exceed volume {volume}")]
    OverAllocated {
        auction_id: String,
        allocated: Decimal,
        volume: Decimal,
    },

    #[error("transaction {transaction_id}: no routes prepared")]
    NoRoutes { transaction_id: String },

    #[error("transaction {transaction_id}: route {route_id} has no amount")]
    EmptyRoute {
        transaction_id: String,
        route_id: String,
    },

    #[error("transaction {transaction_id}: routes carry {routed}, volume is {volume}")]
    OverRouted {
        transaction_id: String,
        routed: Decimal,
        volume: Decimal,
    },
}

impl From<ValidationError> for SettlementError {
    fn from(err: ValidationError) -> Self {
        SettlementError::Validation {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_settlement_types::{Route, Side};
    use std::str::FromStr;

    fn auction(price: &str, volume: &str) -> AuctionResult {
        AuctionResult::new(
            "auction-1",
            TokenPair::new("ATOM", "USDC"),
            Side::Buy,
            Decimal::from_str(price).unwrap(),
            Decimal::from_str(volume).unwrap(),
        )
    }

    #[test]
    fn test_accepts_well_formed_auction() {
        let validator = TransactionValidator::permissive();
        assert!(validator.validate_auction(&auction("10.5", "100")).is_ok());
    }

    #[test]
    fn test_rejects_non_positive_amounts() {
        let validator = TransactionValidator::permissive();

        assert!(matches!(
            validator.validate_auction(&auction("0", "100")),
            Err(ValidationError::NonPositivePrice { .. })
        ));
        assert!(matches!(
            validator.validate_auction(&auction("10", "-1")),
            Err(ValidationError::NonPositiveVolume { .. })
        ));
    }

    #[test]
    fn test_rejects_malformed_and_unsupported_pairs() {
        let mut validator = TransactionValidator::permissive();

        let mut same = auction("10", "100");
        same.pair = TokenPair::new("ATOM", "ATOM");
        assert!(matches!(
            validator.validate_auction(&same),
            Err(ValidationError::SameAssetTrading { .. })
        ));

        let mut blank = auction("10", "100");
        blank.pair = TokenPair::new("", "USDC");
        assert!(matches!(
            validator.validate_auction(&blank),
            Err(ValidationError::MalformedPair { .. })
        ));

        validator.add_supported_pair(TokenPair::new("OSMO", "USDC"));
        assert!(matches!(
            validator.validate_auction(&auction("10", "100")),
            Err(ValidationError::UnsupportedPair { .. })
        ));
    }

    #[test]
    fn test_limits_and_allocations() {
        let validator = TransactionValidator::new(
            HashSet::new(),
            Decimal::from(10),
            Some(Decimal::from(1_000)),
        );

        assert!(matches!(
            validator.validate_auction(&auction("10", "5")),
            Err(ValidationError::VolumeTooSmall { .. })
        ));
        assert!(matches!(
            validator.validate_auction(&auction("10", "500")),
            Err(ValidationError::NotionalTooLarge { .. })
        ));

        let over = auction("10", "50")
            .with_allocation("alice", Decimal::from(30))
            .with_allocation("bob", Decimal::from(30));
        assert!(matches!(
            validator.validate_auction(&over),
            Err(ValidationError::OverAllocated { .. })
        ));
    }

    #[test]
    fn test_route_validation() {
        let validator = TransactionValidator::permissive();
        let mut tx = Transaction::from_auction("tx-1", &auction("10", "100"), u64::MAX);

        assert!(matches!(
            validator.validate_routes(&tx),
            Err(ValidationError::NoRoutes { .. })
        ));

        tx.routes = vec![
            Route::new("r1", "osmosis", Decimal::from(60), Decimal::TEN),
            Route::new("r2", "astroport", Decimal::from(60), Decimal::TEN),
        ];
        assert!(matches!(
            validator.validate_routes(&tx),
            Err(ValidationError::OverRouted { .. })
        ));

        tx.routes[1].amount = Decimal::from(40);
        assert!(validator.validate_routes(&tx).is_ok());

        let err: SettlementError = ValidationError::NoRoutes {
            transaction_id: "tx-1".into(),
        }
        .into();
        assert!(matches!(err, SettlementError::Validation { .. }));
    }
}
