//! Error taxonomy for the auction core.
//!
//! Validation failures are terminal and reported to the caller verbatim.
//! [`AuctionError::Conflict`] is retried internally by the engine before it
//! surfaces; [`AuctionError::DependencyUnavailable`] is never swallowed.

use rust_decimal::Decimal;
use thiserror::Error;

/// Why a lot refused a bid even though it exists.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InactiveReason {
    /// The auction window has not opened yet.
    NotYetStarted,
    /// The auction window has passed (or the lot was closed by settlement).
    AlreadyClosed,
}

#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("lot not found")]
    NotFound,

    #[error("auction is not active: {0}")]
    AuctionNotActive(InactiveReason),

    #[error("bid must exceed the current price of {current}")]
    BidTooLow { current: Decimal },

    #[error("wallet balance {balance} does not cover the bid of {amount}")]
    InsufficientBalance { balance: Decimal, amount: Decimal },

    #[error("bidding again on this lot is allowed in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("the standing highest bid is already yours")]
    CannotOutbidSelf,

    #[error("lost a concurrent update race, safe to retry")]
    Conflict,

    #[error("credential could not be resolved to a bidder")]
    Unauthenticated,

    #[error("the auction window must end after it starts")]
    InvalidWindow,

    #[error("the lot cannot be removed once it has bids")]
    LotHasBids,

    #[error("only the seller who listed the lot may remove it")]
    NotLotOwner,

    #[error("{service} is unavailable: {detail}")]
    DependencyUnavailable { service: &'static str, detail: String },
}

impl AuctionError {
    pub fn dependency(service: &'static str, detail: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            service,
            detail: detail.into(),
        }
    }

    /// Whether the caller may safely resubmit the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::DependencyUnavailable { .. })
    }
}

impl From<crate::catalog::CatalogError> for AuctionError {
    fn from(err: crate::catalog::CatalogError) -> Self {
        use crate::catalog::CatalogError;
        match err {
            CatalogError::LotNotFound => Self::NotFound,
            CatalogError::VersionConflict => Self::Conflict,
            CatalogError::Storage(detail) => Self::dependency("catalog", detail),
        }
    }
}

impl From<crate::ledger::LedgerError> for AuctionError {
    fn from(err: crate::ledger::LedgerError) -> Self {
        use crate::ledger::LedgerError;
        match err {
            LedgerError::BidNotFound => Self::NotFound,
            LedgerError::Storage(detail) => Self::dependency("bid ledger", detail),
        }
    }
}

impl From<crate::wallet::WalletError> for AuctionError {
    fn from(err: crate::wallet::WalletError) -> Self {
        use crate::wallet::WalletError;
        match err {
            WalletError::AccountNotFound => Self::NotFound,
            WalletError::InsufficientFunds { balance, requested } => Self::InsufficientBalance {
                balance,
                amount: requested,
            },
            WalletError::Unavailable(detail) => Self::dependency("wallet", detail),
        }
    }
}

impl std::fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotYetStarted => f.write_str("bidding has not started"),
            Self::AlreadyClosed => f.write_str("bidding has ended"),
        }
    }
}
