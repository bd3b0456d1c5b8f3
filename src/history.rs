//! Per-bidder bidding activity.
//!
//! Only references are stored: `(bidder, lot, bid)` triples in a bounded ring
//! per bidder. The displayable projection is joined against the ledger and
//! the catalog at read time, so the history can never drift out of sync with
//! the lots and bids it points at.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{BidId, BidderId, LotId};

/// Reference to one placed bid.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BidRef {
    pub bidder_id: BidderId,
    pub lot_id: LotId,
    pub bid_id: BidId,
}

/// Read-time projection of a [`BidRef`] for UI display.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BidSummary {
    pub lot_id: LotId,
    pub lot_name: String,
    pub bid_id: BidId,
    pub amount: Decimal,
    pub placed_at: DateTime<Utc>,
    pub is_winning: bool,
}

/// Bounded ring of recent bid references per bidder.
pub struct BidActivityLog {
    capacity: usize,
    rings: RwLock<HashMap<BidderId, VecDeque<BidRef>>>,
}

impl BidActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rings: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, entry: BidRef) {
        let mut rings = self.rings.write();
        let ring = rings.entry(entry.bidder_id).or_default();
        ring.push_back(entry);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Most recent first.
    pub fn recent(&self, bidder_id: BidderId) -> Vec<BidRef> {
        let rings = self.rings.read();
        rings
            .get(&bidder_id)
            .map(|ring| ring.iter().rev().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(bidder: BidderId) -> BidRef {
        BidRef {
            bidder_id: bidder,
            lot_id: LotId::new(),
            bid_id: BidId::new(),
        }
    }

    #[test]
    fn ring_is_bounded_and_newest_first() {
        let log = BidActivityLog::new(3);
        let bidder = BidderId::new();

        let entries: Vec<_> = (0..5).map(|_| entry(bidder)).collect();
        for e in &entries {
            log.record(*e);
        }

        let recent = log.recent(bidder);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].bid_id, entries[4].bid_id);
        assert_eq!(recent[2].bid_id, entries[2].bid_id);
    }

    #[test]
    fn bidders_are_isolated() {
        let log = BidActivityLog::new(10);
        let a = BidderId::new();
        let b = BidderId::new();
        log.record(entry(a));

        assert_eq!(log.recent(a).len(), 1);
        assert!(log.recent(b).is_empty());
    }
}
