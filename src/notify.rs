//! Notification channel: best-effort push of auction events to viewers.
//!
//! The channel is injected into the engine and the settler at construction
//! time; there is no process-wide handle. Delivery is at-most-once and must
//! never fail or block the state mutation that produced the event, so the
//! broadcast implementation logs and drops when nobody is listening or a
//! subscriber lags behind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::ids::{BidId, BidderId, LotId};

/// Events pushed to connected auction viewers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuctionEvent {
    AuctionStarted {
        lot_id: LotId,
        end_time: DateTime<Utc>,
    },
    BidAccepted {
        lot_id: LotId,
        bid_id: BidId,
        bidder_id: BidderId,
        amount: Decimal,
    },
    AuctionClosed {
        lot_id: LotId,
    },
    AuctionSettled {
        lot_id: LotId,
        winner_id: BidderId,
        amount: Decimal,
    },
    SettlementFailed {
        lot_id: LotId,
        winner_id: BidderId,
        amount: Decimal,
    },
}

/// Fire-and-forget event sink.
pub trait NotificationChannel: Send + Sync + 'static {
    fn broadcast(&self, event: AuctionEvent);
}

/// [`tokio::sync::broadcast`]-backed channel. Slow subscribers see
/// `Lagged` on their receiver; the sender never blocks.
pub struct BroadcastChannel {
    tx: broadcast::Sender<AuctionEvent>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.tx.subscribe()
    }
}

impl NotificationChannel for BroadcastChannel {
    fn broadcast(&self, event: AuctionEvent) {
        // A send error only means there are no subscribers right now.
        if let Err(err) = self.tx.send(event) {
            debug!(dropped = ?err.0, "no subscribers for auction event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn delivers_to_subscribers() {
        let channel = BroadcastChannel::new(8);
        let mut rx = channel.subscribe();
        let lot_id = LotId::new();

        channel.broadcast(AuctionEvent::BidAccepted {
            lot_id,
            bid_id: BidId::new(),
            bidder_id: BidderId::new(),
            amount: dec!(150),
        });

        match rx.recv().await.unwrap() {
            AuctionEvent::BidAccepted { lot_id: got, .. } => assert_eq!(got, lot_id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_without_subscribers_is_harmless() {
        let channel = BroadcastChannel::new(8);
        channel.broadcast(AuctionEvent::AuctionClosed { lot_id: LotId::new() });
    }
}
