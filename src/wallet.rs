//! Wallet service collaborator.
//!
//! Holds bidder balances and performs the settlement debit. The core never
//! reserves funds at bid time; it re-checks the balance when the auction is
//! finalized, which is why [`WalletError::InsufficientFunds`] can show up
//! long after a bid was accepted.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::ids::BidderId;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("bidder account not found")]
    AccountNotFound,
    #[error("balance {balance} cannot cover {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },
    #[error("wallet service error: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait WalletService: Send + Sync + 'static {
    async fn balance(&self, bidder: BidderId) -> Result<Decimal, WalletError>;

    /// Removes `amount` from the bidder's balance, failing atomically when
    /// the balance does not cover it.
    async fn debit(&self, bidder: BidderId, amount: Decimal) -> Result<(), WalletError>;

    async fn credit(&self, bidder: BidderId, amount: Decimal) -> Result<(), WalletError>;
}

/// In-memory wallet for tests and local development. Accounts spring into
/// existence on first credit.
#[derive(Default)]
pub struct InMemoryWalletService {
    balances: RwLock<HashMap<BidderId, Decimal>>,
}

impl InMemoryWalletService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletService for InMemoryWalletService {
    async fn balance(&self, bidder: BidderId) -> Result<Decimal, WalletError> {
        let balances = self.balances.read().await;
        balances
            .get(&bidder)
            .copied()
            .ok_or(WalletError::AccountNotFound)
    }

    #[instrument(skip(self), fields(%bidder, %amount))]
    async fn debit(&self, bidder: BidderId, amount: Decimal) -> Result<(), WalletError> {
        let mut balances = self.balances.write().await;
        let balance = balances
            .get_mut(&bidder)
            .ok_or(WalletError::AccountNotFound)?;
        if *balance < amount {
            return Err(WalletError::InsufficientFunds {
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }

    #[instrument(skip(self), fields(%bidder, %amount))]
    async fn credit(&self, bidder: BidderId, amount: Decimal) -> Result<(), WalletError> {
        let mut balances = self.balances.write().await;
        *balances.entry(bidder).or_default() += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn debit_is_all_or_nothing() {
        let wallet = InMemoryWalletService::new();
        let bidder = BidderId::new();
        wallet.credit(bidder, dec!(100)).await.unwrap();

        let err = wallet.debit(bidder, dec!(150)).await.unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
        assert_eq!(wallet.balance(bidder).await.unwrap(), dec!(100));

        wallet.debit(bidder, dec!(100)).await.unwrap();
        assert_eq!(wallet.balance(bidder).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn unknown_account_is_reported() {
        let wallet = InMemoryWalletService::new();
        let err = wallet.balance(BidderId::new()).await.unwrap_err();
        assert!(matches!(err, WalletError::AccountNotFound));
    }
}
