//! Bid acceptance engine.
//!
//! The engine owns the write path for live auctions: it validates a bid
//! against the lot's lifecycle, the current price, the bidder's wallet and
//! the deployment's bid policy, then commits the result as one atomic unit
//! under the lot's lock. Rejections never leave partial state behind; the
//! loser of a same-lot race observes the winner's price update and is
//! rejected with `BidTooLow`, exactly as if it had arrived later.
//!
//! Every path that reads a lot also runs the lifecycle state machine, so a
//! client sees the correct phase even when the background sweep has not
//! ticked yet.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::catalog::CatalogStore;
use crate::error::{AuctionError, InactiveReason};
use crate::history::{BidActivityLog, BidRef, BidSummary};
use crate::ids::{BidderId, LotId, SellerId};
use crate::ledger::{Bid, BidLedger};
use crate::locks::LotLocks;
use crate::lot::{evaluate, Evaluation, Lot, LotStatus, Transition};
use crate::notify::{AuctionEvent, NotificationChannel};
use crate::policy::BidPolicy;
use crate::wallet::WalletService;

/// Parameters for listing a new lot.
#[derive(Clone, Debug)]
pub struct NewLot {
    pub seller_id: SellerId,
    pub name: String,
    pub category: String,
    pub size: u32,
    pub quantity: u32,
    pub initial_price: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Internal retries when a catalog save loses a version race.
    pub max_commit_retries: u32,
    /// Bound of the per-bidder activity ring.
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 3,
            history_capacity: 10,
        }
    }
}

pub struct AuctionEngine<C, L, W> {
    catalog: Arc<C>,
    ledger: Arc<L>,
    wallet: Arc<W>,
    notifier: Arc<dyn NotificationChannel>,
    policy: Arc<BidPolicy>,
    locks: Arc<LotLocks>,
    activity: Arc<BidActivityLog>,
    max_commit_retries: u32,
}

impl<C, L, W> Clone for AuctionEngine<C, L, W> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            ledger: Arc::clone(&self.ledger),
            wallet: Arc::clone(&self.wallet),
            notifier: Arc::clone(&self.notifier),
            policy: Arc::clone(&self.policy),
            locks: Arc::clone(&self.locks),
            activity: Arc::clone(&self.activity),
            max_commit_retries: self.max_commit_retries,
        }
    }
}

impl<C, L, W> AuctionEngine<C, L, W>
where
    C: CatalogStore,
    L: BidLedger,
    W: WalletService,
{
    pub fn new(
        catalog: Arc<C>,
        ledger: Arc<L>,
        wallet: Arc<W>,
        notifier: Arc<dyn NotificationChannel>,
        policy: Arc<BidPolicy>,
        locks: Arc<LotLocks>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            ledger,
            wallet,
            notifier,
            policy,
            locks,
            activity: Arc::new(BidActivityLog::new(config.history_capacity)),
            max_commit_retries: config.max_commit_retries,
        }
    }

    /* ----------------------------- Lot lifecycle ---------------------------- */

    /// Lists a new lot. Starts live right away when the window is already
    /// open, upcoming otherwise.
    #[instrument(skip(self, params), fields(seller = %params.seller_id, name = %params.name))]
    pub async fn create_lot(&self, params: NewLot) -> Result<Lot, AuctionError> {
        if params.end_time <= params.start_time {
            return Err(AuctionError::InvalidWindow);
        }

        let now = Utc::now();
        let status = if now >= params.start_time {
            LotStatus::Live
        } else {
            LotStatus::Upcoming
        };

        let lot = Lot {
            id: LotId::new(),
            seller_id: params.seller_id,
            name: params.name,
            category: params.category,
            size: params.size,
            quantity: params.quantity,
            lot_number: self.catalog.next_lot_number().await?,
            initial_price: params.initial_price,
            current_price: params.initial_price,
            start_time: params.start_time,
            end_time: params.end_time,
            status,
            winning_bid: None,
            settlement: None,
            version: 0,
        };
        self.catalog.insert_lot(lot.clone()).await?;
        info!(lot_id = %lot.id, lot_number = lot.lot_number, "lot listed");

        if status == LotStatus::Live {
            self.notifier.broadcast(AuctionEvent::AuctionStarted {
                lot_id: lot.id,
                end_time: lot.end_time,
            });
        }
        Ok(lot)
    }

    /// Removes a lot on behalf of its seller. Refused once any bid exists.
    #[instrument(skip(self))]
    pub async fn remove_lot(&self, lot_id: LotId, seller_id: SellerId) -> Result<(), AuctionError> {
        let _guard = self.locks.acquire(lot_id).await;

        let lot = self
            .catalog
            .get_lot(lot_id)
            .await?
            .ok_or(AuctionError::NotFound)?;
        if lot.seller_id != seller_id {
            return Err(AuctionError::NotLotOwner);
        }
        if lot.has_bids() {
            return Err(AuctionError::LotHasBids);
        }

        self.catalog.delete_lot(lot_id).await?;
        self.locks.forget(lot_id);
        self.policy.forget_lot(lot_id);
        Ok(())
    }

    /// Current lot state, with the lifecycle evaluated lazily against the
    /// wall clock. A status change observed here is persisted and announced,
    /// so clients see correct phases without waiting for the sweep.
    pub async fn get_auction_state(&self, lot_id: LotId) -> Result<Lot, AuctionError> {
        let lot = self
            .catalog
            .get_lot(lot_id)
            .await?
            .ok_or(AuctionError::NotFound)?;

        let now = Utc::now();
        let eval = evaluate(&lot, now);
        if eval.transition.is_none() {
            return Ok(lot);
        }

        // Persist the observed transition under the lot's lock.
        let _guard = self.locks.acquire(lot_id).await;
        let lot = self
            .catalog
            .get_lot(lot_id)
            .await?
            .ok_or(AuctionError::NotFound)?;
        let eval = evaluate(&lot, now);
        self.apply_transition(lot, eval).await
    }

    /// Lots that are currently open for bids.
    pub async fn live_lots(&self) -> Result<Vec<Lot>, AuctionError> {
        self.lots_in_phase(LotStatus::Live).await
    }

    /// Lots scheduled to open later.
    pub async fn upcoming_lots(&self) -> Result<Vec<Lot>, AuctionError> {
        self.lots_in_phase(LotStatus::Upcoming).await
    }

    async fn lots_in_phase(&self, phase: LotStatus) -> Result<Vec<Lot>, AuctionError> {
        let now = Utc::now();
        // A lot stored as upcoming may have gone live (or closed) since it
        // was last written, so both stored phases are re-evaluated here.
        let mut lots = self.catalog.list_by_status(LotStatus::Upcoming).await?;
        lots.extend(self.catalog.list_by_status(LotStatus::Live).await?);

        let mut out: Vec<Lot> = lots
            .into_iter()
            .filter(|lot| evaluate(lot, now).status == phase)
            .collect();
        out.sort_by_key(|l| l.lot_number);
        Ok(out)
    }

    /* ------------------------------- Bidding -------------------------------- */

    /// Validates and commits a bid.
    ///
    /// Preconditions run in order and the first failure wins: the lot must
    /// exist, be live at `now`, the amount must beat the current price, the
    /// wallet must cover it, and the deployment policy must agree. The commit
    /// itself retries a bounded number of times when the catalog reports a
    /// version conflict from an external writer.
    #[instrument(skip(self), fields(%lot_id, %bidder_id, %amount))]
    pub async fn place_bid(
        &self,
        lot_id: LotId,
        bidder_id: BidderId,
        amount: Decimal,
    ) -> Result<Bid, AuctionError> {
        let mut attempt = 0;
        loop {
            match self.try_place_bid(lot_id, bidder_id, amount).await {
                Err(AuctionError::Conflict) if attempt < self.max_commit_retries => {
                    attempt += 1;
                    warn!(attempt, "bid commit lost a version race, retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_place_bid(
        &self,
        lot_id: LotId,
        bidder_id: BidderId,
        amount: Decimal,
    ) -> Result<Bid, AuctionError> {
        let _guard = self.locks.acquire(lot_id).await;
        let now = Utc::now();

        // 1. The lot must exist.
        let lot = self
            .catalog
            .get_lot(lot_id)
            .await?
            .ok_or(AuctionError::NotFound)?;

        // 2. The lifecycle must say "live" right now. A transition observed
        //    here is persisted before the verdict so later readers agree.
        let eval = evaluate(&lot, now);
        let lot = match eval.status {
            LotStatus::Live => self.apply_transition(lot, eval).await?,
            LotStatus::Upcoming => {
                return Err(AuctionError::AuctionNotActive(InactiveReason::NotYetStarted))
            }
            LotStatus::Closed => {
                self.apply_transition(lot, eval).await?;
                return Err(AuctionError::AuctionNotActive(InactiveReason::AlreadyClosed));
            }
        };

        // 3. The amount must beat the standing price. `current_price` starts
        //    at the initial price, which covers the no-bids bootstrap.
        if amount <= lot.current_price {
            return Err(AuctionError::BidTooLow {
                current: lot.current_price,
            });
        }

        // 4. The full amount must be coverable right now.
        let balance = self.wallet.balance(bidder_id).await?;
        if balance < amount {
            return Err(AuctionError::InsufficientBalance { balance, amount });
        }

        // 5. Deployment policy (self-outbid, cooldown) in declared order.
        let previous_highest = self.ledger.highest_bid(lot_id).await?;
        self.policy
            .check(lot_id, bidder_id, previous_highest.as_ref(), now)?;

        // Commit: price and winning pointer first (the catalog save is the
        // commit point for concurrent readers), then the ledger append and
        // winning-flag flip.
        let mut bid = Bid::new(lot_id, bidder_id, amount, now);
        bid.is_winning = true;

        let mut updated = lot;
        updated.current_price = amount;
        updated.winning_bid = Some(bid.id);
        self.catalog.save_lot(updated).await?;

        self.ledger.append(bid.clone()).await?;
        self.ledger.mark_winning(lot_id, bid.id).await?;

        self.policy.record_accepted(lot_id, bidder_id, now);
        self.activity.record(BidRef {
            bidder_id,
            lot_id,
            bid_id: bid.id,
        });

        info!(bid_id = %bid.id, "bid accepted");
        self.notifier.broadcast(AuctionEvent::BidAccepted {
            lot_id,
            bid_id: bid.id,
            bidder_id,
            amount,
        });
        Ok(bid)
    }

    /* ----------------------------- History view ----------------------------- */

    /// Recent bidding activity of one bidder, joined against the ledger and
    /// the catalog at read time. References whose bid or lot has since been
    /// purged are skipped.
    pub async fn recent_activity(
        &self,
        bidder_id: BidderId,
    ) -> Result<Vec<BidSummary>, AuctionError> {
        let mut summaries = Vec::new();
        for entry in self.activity.recent(bidder_id) {
            let Some(bid) = self.ledger.bid(entry.bid_id).await? else {
                continue;
            };
            let Some(lot) = self.catalog.get_lot(entry.lot_id).await? else {
                continue;
            };
            summaries.push(BidSummary {
                lot_id: lot.id,
                lot_name: lot.name,
                bid_id: bid.id,
                amount: bid.amount,
                placed_at: bid.placed_at,
                is_winning: bid.is_winning,
            });
        }
        Ok(summaries)
    }

    /* ------------------------------- Internals ------------------------------- */

    /// Persists a lifecycle transition and announces it. Must be called with
    /// the lot's lock held. Passing an evaluation without a transition is a
    /// no-op returning the lot unchanged.
    async fn apply_transition(&self, lot: Lot, eval: Evaluation) -> Result<Lot, AuctionError> {
        let Some(transition) = eval.transition else {
            return Ok(lot);
        };

        let mut updated = lot;
        updated.status = eval.status;
        let updated = self.catalog.save_lot(updated).await?;

        match transition {
            Transition::Opened => {
                info!(lot_id = %updated.id, "auction opened");
                self.notifier.broadcast(AuctionEvent::AuctionStarted {
                    lot_id: updated.id,
                    end_time: updated.end_time,
                });
            }
            Transition::Closed => {
                info!(lot_id = %updated.id, "auction closed");
                self.notifier
                    .broadcast(AuctionEvent::AuctionClosed { lot_id: updated.id });
            }
        }
        Ok(updated)
    }
}
