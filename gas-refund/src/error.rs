// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced by the refund pipeline.
///
/// The first four variants are fatal to the whole run: they indicate either
/// corrupted upstream data or a broken accounting invariant, and the run
/// must abort before any Merkle root is sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundError {
    // A qualifying swap has no same-day price point
    MissingPricePoint {
        chain_id: u64,
        tx_hash: String,
        timestamp: u64,
    },
    // A budget cap computed negative headroom, meaning a prior over-refund
    NegativeCap {
        address: String,
        epoch: u64,
    },
    // Rows left in IDLE after a full re-validation pass
    IdleAfterRevalidation(u64),
    // Stake is at or above the minimum but no tier matched
    TierContradiction {
        address: String,
        stake: String,
    },
    // Same txHash seen twice in one slice (upstream inconsistency)
    DuplicateTransaction {
        chain_id: u64,
        tx_hash: String,
    },
    // ChainId outside the supported set
    InvalidChainId(u64),
    // Swaps subgraph failure after retries
    Subgraph(String),
    // Block explorer failure after retries
    Explorer(String),
    // Price oracle failure after retries
    PriceOracle(String),
    // Database failure
    Storage(String),
    // Distributed lock failure
    Lock(String),
    // Uncategorized error
    Generic(String),
}

impl RefundError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            RefundError::MissingPricePoint { .. } => "missing_price_point",
            RefundError::NegativeCap { .. } => "negative_cap",
            RefundError::IdleAfterRevalidation(_) => "idle_after_revalidation",
            RefundError::TierContradiction { .. } => "tier_contradiction",
            RefundError::DuplicateTransaction { .. } => "duplicate_transaction",
            RefundError::InvalidChainId(_) => "invalid_chain_id",
            RefundError::Subgraph(_) => "subgraph",
            RefundError::Explorer(_) => "explorer",
            RefundError::PriceOracle(_) => "price_oracle",
            RefundError::Storage(_) => "storage",
            RefundError::Lock(_) => "lock",
            RefundError::Generic(_) => "generic",
        }
    }

    /// Fatal-to-run errors must abort the run before Merkle sealing.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            RefundError::MissingPricePoint { .. }
                | RefundError::NegativeCap { .. }
                | RefundError::IdleAfterRevalidation(_)
                | RefundError::TierContradiction { .. }
                | RefundError::DuplicateTransaction { .. }
        )
    }
}

impl std::fmt::Display for RefundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundError::MissingPricePoint {
                chain_id,
                tx_hash,
                timestamp,
            } => write!(
                f,
                "no same-day price point for tx {tx_hash} on chain {chain_id} at {timestamp}"
            ),
            RefundError::NegativeCap { address, epoch } => write!(
                f,
                "negative budget headroom for {address} in epoch {epoch}: prior over-refund"
            ),
            RefundError::IdleAfterRevalidation(count) => {
                write!(f, "{count} rows still IDLE after re-validation")
            }
            RefundError::TierContradiction { address, stake } => write!(
                f,
                "no refund tier for {address} despite stake {stake} >= minimum"
            ),
            RefundError::DuplicateTransaction { chain_id, tx_hash } => {
                write!(f, "duplicate tx {tx_hash} on chain {chain_id}")
            }
            RefundError::InvalidChainId(id) => write!(f, "unsupported chain id {id}"),
            RefundError::Subgraph(msg) => write!(f, "subgraph error: {msg}"),
            RefundError::Explorer(msg) => write!(f, "block explorer error: {msg}"),
            RefundError::PriceOracle(msg) => write!(f, "price oracle error: {msg}"),
            RefundError::Storage(msg) => write!(f, "storage error: {msg}"),
            RefundError::Lock(msg) => write!(f, "lock error: {msg}"),
            RefundError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RefundError {}

pub type RefundResult<T> = Result<T, RefundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RefundError::MissingPricePoint {
            chain_id: 1,
            tx_hash: "0x00".to_string(),
            timestamp: 0,
        }
        .is_fatal_to_run());
        assert!(RefundError::IdleAfterRevalidation(3).is_fatal_to_run());
        assert!(RefundError::NegativeCap {
            address: "0x00".to_string(),
            epoch: 10,
        }
        .is_fatal_to_run());

        assert!(!RefundError::Subgraph("503".to_string()).is_fatal_to_run());
        assert!(!RefundError::Storage("down".to_string()).is_fatal_to_run());
    }

    /// Test that error_type values are valid Prometheus label values
    /// (lowercase, underscores only, no spaces or special chars)
    #[test]
    fn test_error_type_valid_prometheus_labels() {
        let errors = vec![
            RefundError::MissingPricePoint {
                chain_id: 1,
                tx_hash: String::new(),
                timestamp: 0,
            },
            RefundError::NegativeCap {
                address: String::new(),
                epoch: 0,
            },
            RefundError::IdleAfterRevalidation(0),
            RefundError::TierContradiction {
                address: String::new(),
                stake: String::new(),
            },
            RefundError::DuplicateTransaction {
                chain_id: 1,
                tx_hash: String::new(),
            },
            RefundError::InvalidChainId(0),
            RefundError::Subgraph(String::new()),
            RefundError::Explorer(String::new()),
            RefundError::PriceOracle(String::new()),
            RefundError::Storage(String::new()),
            RefundError::Lock(String::new()),
            RefundError::Generic(String::new()),
        ];

        for error in errors {
            let error_type = error.error_type();
            assert!(!error_type.is_empty());
            for c in error_type.chars() {
                assert!(
                    c.is_ascii_lowercase() || c == '_',
                    "error_type '{}' contains invalid character '{}'",
                    error_type,
                    c
                );
            }
            assert!(!error_type.starts_with('_'));
            assert!(!error_type.ends_with('_'));
        }
    }

    /// Test that error_type is consistent regardless of payload content
    #[test]
    fn test_error_type_payload_independence() {
        let err1 = RefundError::Subgraph("short".to_string());
        let err2 = RefundError::Subgraph("a much longer error message".to_string());
        assert_eq!(err1.error_type(), err2.error_type());
    }
}
