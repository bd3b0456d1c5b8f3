//! Append-only bid ledger.
//!
//! The ledger owns every [`Bid`]. Bids are immutable once appended, except
//! for the winning flag, which the engine flips when a later bid supersedes
//! the standing one and settlement pins when a lot is finalized. Reads come
//! back in settlement order: amount descending, then placement time ascending,
//! so the first entry is always the winner candidate and ties go to the
//! earliest bid.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::ids::{BidId, BidderId, LotId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub lot_id: LotId,
    pub bidder_id: BidderId,
    pub amount: Decimal,
    pub placed_at: DateTime<Utc>,
    /// At most one bid per lot carries this flag at any time.
    pub is_winning: bool,
}

impl Bid {
    pub fn new(lot_id: LotId, bidder_id: BidderId, amount: Decimal, placed_at: DateTime<Utc>) -> Self {
        Self {
            id: BidId::new(),
            lot_id,
            bidder_id,
            amount,
            placed_at,
            is_winning: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("bid not found")]
    BidNotFound,
    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Durable bid storage. Backed by Postgres or a KV store in production; the
/// in-memory implementation below serves tests and local development.
#[async_trait]
pub trait BidLedger: Send + Sync + 'static {
    async fn append(&self, bid: Bid) -> Result<(), LedgerError>;

    async fn bid(&self, id: BidId) -> Result<Option<Bid>, LedgerError>;

    /// All bids for a lot in settlement order (amount desc, time asc).
    async fn bids_for_lot(&self, lot_id: LotId) -> Result<Vec<Bid>, LedgerError>;

    async fn highest_bid(&self, lot_id: LotId) -> Result<Option<Bid>, LedgerError>;

    /// Moves the winning flag to `bid_id`, clearing it on every other bid of
    /// the same lot.
    async fn mark_winning(&self, lot_id: LotId, bid_id: BidId) -> Result<(), LedgerError>;

    /// Drops every non-winning bid of a lot, keeping `keep` if given.
    /// Returns the number of purged bids.
    async fn purge_non_winning(
        &self,
        lot_id: LotId,
        keep: Option<BidId>,
    ) -> Result<usize, LedgerError>;
}

/// Thread-safe in-memory ledger, keyed by lot for cheap per-lot scans.
#[derive(Default)]
pub struct InMemoryBidLedger {
    by_lot: RwLock<HashMap<LotId, Vec<Bid>>>,
}

impl InMemoryBidLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn settlement_order(a: &Bid, b: &Bid) -> std::cmp::Ordering {
    b.amount
        .cmp(&a.amount)
        .then_with(|| a.placed_at.cmp(&b.placed_at))
}

#[async_trait]
impl BidLedger for InMemoryBidLedger {
    #[instrument(skip(self, bid), fields(lot_id = %bid.lot_id, amount = %bid.amount))]
    async fn append(&self, bid: Bid) -> Result<(), LedgerError> {
        let mut map = self.by_lot.write().await;
        map.entry(bid.lot_id).or_default().push(bid);
        Ok(())
    }

    async fn bid(&self, id: BidId) -> Result<Option<Bid>, LedgerError> {
        let map = self.by_lot.read().await;
        Ok(map
            .values()
            .flat_map(|bids| bids.iter())
            .find(|b| b.id == id)
            .cloned())
    }

    async fn bids_for_lot(&self, lot_id: LotId) -> Result<Vec<Bid>, LedgerError> {
        let map = self.by_lot.read().await;
        let mut bids = map.get(&lot_id).cloned().unwrap_or_default();
        bids.sort_by(settlement_order);
        Ok(bids)
    }

    async fn highest_bid(&self, lot_id: LotId) -> Result<Option<Bid>, LedgerError> {
        let map = self.by_lot.read().await;
        Ok(map
            .get(&lot_id)
            .and_then(|bids| bids.iter().min_by(|a, b| settlement_order(a, b)))
            .cloned())
    }

    #[instrument(skip(self))]
    async fn mark_winning(&self, lot_id: LotId, bid_id: BidId) -> Result<(), LedgerError> {
        let mut map = self.by_lot.write().await;
        let bids = map.get_mut(&lot_id).ok_or(LedgerError::BidNotFound)?;
        if !bids.iter().any(|b| b.id == bid_id) {
            return Err(LedgerError::BidNotFound);
        }
        for bid in bids.iter_mut() {
            bid.is_winning = bid.id == bid_id;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_non_winning(
        &self,
        lot_id: LotId,
        keep: Option<BidId>,
    ) -> Result<usize, LedgerError> {
        let mut map = self.by_lot.write().await;
        let Some(bids) = map.get_mut(&lot_id) else {
            return Ok(0);
        };
        let before = bids.len();
        bids.retain(|b| b.is_winning || Some(b.id) == keep);
        Ok(before - bids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn bid_at(lot: LotId, amount: Decimal, offset_ms: i64) -> Bid {
        Bid::new(
            lot,
            BidderId::new(),
            amount,
            Utc::now() + Duration::milliseconds(offset_ms),
        )
    }

    #[tokio::test]
    async fn orders_by_amount_then_time() {
        let ledger = InMemoryBidLedger::new();
        let lot = LotId::new();

        let early = bid_at(lot, dec!(200), 0);
        let late_same_amount = bid_at(lot, dec!(200), 50);
        let low = bid_at(lot, dec!(150), 10);

        ledger.append(low).await.unwrap();
        ledger.append(late_same_amount.clone()).await.unwrap();
        ledger.append(early.clone()).await.unwrap();

        let bids = ledger.bids_for_lot(lot).await.unwrap();
        assert_eq!(bids[0].id, early.id, "tie goes to the earlier bid");
        assert_eq!(bids[1].id, late_same_amount.id);
        assert_eq!(bids[2].amount, dec!(150));

        let highest = ledger.highest_bid(lot).await.unwrap().unwrap();
        assert_eq!(highest.id, early.id);
    }

    #[tokio::test]
    async fn winning_flag_is_exclusive() {
        let ledger = InMemoryBidLedger::new();
        let lot = LotId::new();
        let first = bid_at(lot, dec!(120), 0);
        let second = bid_at(lot, dec!(140), 10);
        ledger.append(first.clone()).await.unwrap();
        ledger.append(second.clone()).await.unwrap();

        ledger.mark_winning(lot, first.id).await.unwrap();
        ledger.mark_winning(lot, second.id).await.unwrap();

        let bids = ledger.bids_for_lot(lot).await.unwrap();
        let winners: Vec<_> = bids.iter().filter(|b| b.is_winning).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, second.id);
    }

    #[tokio::test]
    async fn purge_keeps_the_winning_bid() {
        let ledger = InMemoryBidLedger::new();
        let lot = LotId::new();
        let loser = bid_at(lot, dec!(110), 0);
        let winner = bid_at(lot, dec!(180), 5);
        ledger.append(loser).await.unwrap();
        ledger.append(winner.clone()).await.unwrap();
        ledger.mark_winning(lot, winner.id).await.unwrap();

        let purged = ledger.purge_non_winning(lot, None).await.unwrap();
        assert_eq!(purged, 1);

        let bids = ledger.bids_for_lot(lot).await.unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].id, winner.id);
    }

    #[tokio::test]
    async fn mark_winning_unknown_bid_is_an_error() {
        let ledger = InMemoryBidLedger::new();
        let lot = LotId::new();
        ledger.append(bid_at(lot, dec!(120), 0)).await.unwrap();
        let err = ledger.mark_winning(lot, BidId::new()).await.unwrap_err();
        assert!(matches!(err, LedgerError::BidNotFound));
    }
}
