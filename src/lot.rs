//! Lot record and the auction lifecycle state machine.
//!
//! A lot moves `Upcoming → Live → Closed`, driven purely by wall-clock time.
//! [`evaluate`] is the single decision point for that lifecycle: both the lazy
//! path (every read/write that touches a lot) and the eager path (the
//! settlement sweep) call it, so the two can never disagree about a lot's
//! phase at a given instant. `Closed` is absorbing; re-evaluating a closed lot
//! is a no-op no matter what the clock says.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{BidId, BidderId, LotId, SellerId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Upcoming,
    Live,
    Closed,
}

/// Outcome of settling a closed lot. Stored on the lot itself so that
/// `finalize` can tell "settlement already ran" apart from "merely closed".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// The winner's wallet was debited for the winning amount.
    Settled {
        bid_id: BidId,
        bidder_id: BidderId,
        amount: Decimal,
    },
    /// The window elapsed with no bids; nothing to transfer.
    NoBids,
    /// The winner could no longer cover the amount at finalize time. The lot
    /// stays closed with no funds moved, pending manual reconciliation.
    PaymentFailed {
        bid_id: BidId,
        bidder_id: BidderId,
        amount: Decimal,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub seller_id: SellerId,
    pub name: String,
    pub category: String,
    /// Stem length in centimetres.
    pub size: u32,
    /// Number of stems in the lot.
    pub quantity: u32,
    /// Sequential display number assigned by the catalog.
    pub lot_number: u64,
    pub initial_price: Decimal,
    /// Highest accepted bid so far; never below `initial_price`.
    pub current_price: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: LotStatus,
    pub winning_bid: Option<BidId>,
    pub settlement: Option<SettlementOutcome>,
    /// Optimistic-concurrency counter bumped on every catalog save.
    pub version: u64,
}

impl Lot {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        evaluate(self, now).status == LotStatus::Live
    }

    /// Whether the sweep still owes this lot a settlement pass.
    pub fn awaits_settlement(&self, now: DateTime<Utc>) -> bool {
        self.settlement.is_none() && evaluate(self, now).status == LotStatus::Closed
    }

    pub fn has_bids(&self) -> bool {
        self.winning_bid.is_some()
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// A status change implied by re-evaluating a lot at some instant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    /// The auction window opened.
    Opened,
    /// The auction window elapsed.
    Closed,
}

/// Result of running the state machine over a lot at `now`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Evaluation {
    pub status: LotStatus,
    /// `None` when the stored status already matches the clock.
    pub transition: Option<Transition>,
}

/// Pure lifecycle decision for a lot at `now`.
///
/// `Closed` never reverts, regardless of the stored window. Otherwise the
/// status is derived from the clock alone: live inside `[start, end)`, closed
/// from `end` onward, upcoming before `start`.
pub fn evaluate(lot: &Lot, now: DateTime<Utc>) -> Evaluation {
    if lot.status == LotStatus::Closed {
        return Evaluation {
            status: LotStatus::Closed,
            transition: None,
        };
    }

    let target = if now >= lot.end_time {
        LotStatus::Closed
    } else if now >= lot.start_time {
        LotStatus::Live
    } else {
        LotStatus::Upcoming
    };

    let transition = match (lot.status, target) {
        (LotStatus::Upcoming, LotStatus::Live) => Some(Transition::Opened),
        (_, LotStatus::Closed) => Some(Transition::Closed),
        _ => None,
    };

    Evaluation {
        status: target,
        transition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn lot(start_offset_secs: i64, end_offset_secs: i64) -> (Lot, DateTime<Utc>) {
        let now = Utc::now();
        let lot = Lot {
            id: LotId::new(),
            seller_id: SellerId::new(),
            name: "Red Naomi roses".into(),
            category: "Romantic".into(),
            size: 60,
            quantity: 250,
            lot_number: 1,
            initial_price: dec!(100),
            current_price: dec!(100),
            start_time: now + Duration::seconds(start_offset_secs),
            end_time: now + Duration::seconds(end_offset_secs),
            status: LotStatus::Upcoming,
            winning_bid: None,
            settlement: None,
            version: 0,
        };
        (lot, now)
    }

    #[test]
    fn upcoming_before_start() {
        let (lot, now) = lot(60, 120);
        let eval = evaluate(&lot, now);
        assert_eq!(eval.status, LotStatus::Upcoming);
        assert_eq!(eval.transition, None);
    }

    #[test]
    fn opens_inside_window() {
        let (lot, now) = lot(-1, 60);
        let eval = evaluate(&lot, now);
        assert_eq!(eval.status, LotStatus::Live);
        assert_eq!(eval.transition, Some(Transition::Opened));
    }

    #[test]
    fn closes_after_end_even_from_upcoming() {
        // A lot nobody touched while it was live still closes directly.
        let (lot, now) = lot(-120, -60);
        let eval = evaluate(&lot, now);
        assert_eq!(eval.status, LotStatus::Closed);
        assert_eq!(eval.transition, Some(Transition::Closed));
    }

    #[test]
    fn closed_is_absorbing() {
        let (mut lot, now) = lot(-1, 60);
        lot.status = LotStatus::Closed;
        // The window says "live" but closed never reverts.
        let eval = evaluate(&lot, now);
        assert_eq!(eval.status, LotStatus::Closed);
        assert_eq!(eval.transition, None);
    }

    #[test]
    fn re_evaluating_live_is_a_no_op() {
        let (mut lot, now) = lot(-1, 60);
        lot.status = LotStatus::Live;
        let eval = evaluate(&lot, now);
        assert_eq!(eval.status, LotStatus::Live);
        assert_eq!(eval.transition, None);
    }
}
