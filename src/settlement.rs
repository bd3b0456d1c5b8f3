//! Settlement of closed auctions.
//!
//! Two entry points share one code path: the periodic sweep picks up every
//! lot whose window has elapsed without a settlement, and `finalize` ends a
//! single auction on demand. Both serialize against bidding through the same
//! per-lot lock, so a bid can never slip in once settlement has begun and a
//! settlement can never run twice concurrently.
//!
//! Idempotence comes from the settlement marker on the lot rather than its
//! status: a closed lot may still owe a settlement pass, but a lot with a
//! recorded [`SettlementOutcome`] is done, and finalizing it again just
//! returns the recorded outcome without touching the wallet.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::catalog::CatalogStore;
use crate::error::AuctionError;
use crate::ids::LotId;
use crate::ledger::BidLedger;
use crate::locks::LotLocks;
use crate::lot::{Lot, LotStatus, SettlementOutcome};
use crate::notify::{AuctionEvent, NotificationChannel};
use crate::policy::BidPolicy;
use crate::wallet::{WalletError, WalletService};

#[derive(Clone, Copy, Debug, Default)]
pub struct SettlerConfig {
    /// Drop non-winning bids of a lot once its settlement is recorded.
    pub purge_on_settle: bool,
}

/// Per-sweep tally, one entry per lot that failed in isolation.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub examined: usize,
    pub settled: usize,
    pub no_bids: usize,
    pub payment_failed: usize,
    pub errors: Vec<(LotId, AuctionError)>,
}

pub struct Settler<C, L, W> {
    catalog: Arc<C>,
    ledger: Arc<L>,
    wallet: Arc<W>,
    notifier: Arc<dyn NotificationChannel>,
    policy: Arc<BidPolicy>,
    locks: Arc<LotLocks>,
    purge_on_settle: bool,
}

impl<C, L, W> Clone for Settler<C, L, W> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            ledger: Arc::clone(&self.ledger),
            wallet: Arc::clone(&self.wallet),
            notifier: Arc::clone(&self.notifier),
            policy: Arc::clone(&self.policy),
            locks: Arc::clone(&self.locks),
            purge_on_settle: self.purge_on_settle,
        }
    }
}

impl<C, L, W> Settler<C, L, W>
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
        config: SettlerConfig,
    ) -> Self {
        Self {
            catalog,
            ledger,
            wallet,
            notifier,
            policy,
            locks,
            purge_on_settle: config.purge_on_settle,
        }
    }

    /// Ends one auction now and settles it.
    ///
    /// Acts as the explicit "end auction" trigger: a lot that is still inside
    /// its window is closed early. Calling this on an already-settled lot is
    /// a no-op that returns the recorded outcome.
    #[instrument(skip(self))]
    pub async fn finalize(&self, lot_id: LotId) -> Result<SettlementOutcome, AuctionError> {
        let _guard = self.locks.acquire(lot_id).await;
        self.finalize_locked(lot_id).await
    }

    /// Sweeps every lot whose window elapsed without a settlement. A failure
    /// on one lot is reported and does not stop the rest of the sweep.
    #[instrument(skip(self))]
    pub async fn close_expired_auctions(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let due = match self.catalog.list_expired_lots(now).await {
            Ok(due) => due,
            Err(err) => {
                error!(%err, "sweep could not list expired lots");
                return report;
            }
        };

        for lot in due {
            report.examined += 1;
            let _guard = self.locks.acquire(lot.id).await;
            match self.finalize_locked(lot.id).await {
                Ok(SettlementOutcome::Settled { .. }) => report.settled += 1,
                Ok(SettlementOutcome::NoBids) => report.no_bids += 1,
                Ok(SettlementOutcome::PaymentFailed { .. }) => report.payment_failed += 1,
                Err(err) => {
                    warn!(lot_id = %lot.id, %err, "settlement failed, continuing sweep");
                    report.errors.push((lot.id, err));
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                settled = report.settled,
                no_bids = report.no_bids,
                payment_failed = report.payment_failed,
                errors = report.errors.len(),
                "sweep finished"
            );
        }
        report
    }

    /// Spawns the periodic sweep. The loop survives individual failures; in
    /// a clustered deployment only the leader instance should run it.
    pub fn spawn_sweep_loop(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.close_expired_auctions(Utc::now()).await;
            }
        })
    }

    /* ------------------------------- Internals ------------------------------- */

    /// The settlement transaction proper. Caller holds the lot's lock.
    async fn finalize_locked(&self, lot_id: LotId) -> Result<SettlementOutcome, AuctionError> {
        let lot = self
            .catalog
            .get_lot(lot_id)
            .await?
            .ok_or(AuctionError::NotFound)?;

        // Settlement already ran: return the recorded outcome untouched.
        if let Some(outcome) = lot.settlement.clone() {
            return Ok(outcome);
        }

        let lot = self.close(lot).await?;

        // Winner: greatest amount, ties to the earliest bid. The ledger's
        // settlement order encodes exactly that.
        let winner = self.ledger.highest_bid(lot_id).await?;
        let outcome = match winner {
            None => SettlementOutcome::NoBids,
            Some(bid) => match self.wallet.debit(bid.bidder_id, bid.amount).await {
                Ok(()) => {
                    self.ledger.mark_winning(lot_id, bid.id).await?;
                    SettlementOutcome::Settled {
                        bid_id: bid.id,
                        bidder_id: bid.bidder_id,
                        amount: bid.amount,
                    }
                }
                Err(WalletError::InsufficientFunds { balance, .. }) => {
                    // The balance moved since the bid was accepted. The lot
                    // stays closed with no transfer; picking the next-highest
                    // bidder without re-validating their balance would be
                    // unfair, so this is left to manual reconciliation.
                    warn!(
                        lot_id = %lot.id,
                        bidder = %bid.bidder_id,
                        amount = %bid.amount,
                        %balance,
                        "winner can no longer cover the bid"
                    );
                    SettlementOutcome::PaymentFailed {
                        bid_id: bid.id,
                        bidder_id: bid.bidder_id,
                        amount: bid.amount,
                    }
                }
                // Wallet outage: no marker is written, so a later pass
                // retries the debit.
                Err(err) => return Err(err.into()),
            },
        };

        let mut settled = lot;
        if let SettlementOutcome::Settled { bid_id, .. } = &outcome {
            settled.winning_bid = Some(*bid_id);
        }
        settled.settlement = Some(outcome.clone());
        let settled = self.catalog.save_lot(settled).await?;

        match &outcome {
            SettlementOutcome::Settled {
                bidder_id, amount, ..
            } => {
                info!(lot_id = %settled.id, winner = %bidder_id, %amount, "auction settled");
                self.notifier.broadcast(AuctionEvent::AuctionSettled {
                    lot_id: settled.id,
                    winner_id: *bidder_id,
                    amount: *amount,
                });
            }
            SettlementOutcome::PaymentFailed {
                bidder_id, amount, ..
            } => {
                self.notifier.broadcast(AuctionEvent::SettlementFailed {
                    lot_id: settled.id,
                    winner_id: *bidder_id,
                    amount: *amount,
                });
            }
            SettlementOutcome::NoBids => {
                info!(lot_id = %settled.id, "auction closed with no bids");
            }
        }

        if self.purge_on_settle {
            let keep = settled.winning_bid;
            let purged = self.ledger.purge_non_winning(settled.id, keep).await?;
            if purged > 0 {
                info!(lot_id = %settled.id, purged, "purged non-winning bids");
            }
        }

        // The lot will never trade again; its lock entry and cooldown state
        // can go. Safe only after the settlement marker is persisted.
        self.policy.forget_lot(settled.id);
        self.locks.forget(settled.id);

        Ok(outcome)
    }

    /// Forces the lot into `Closed` if it is not there yet and persists the
    /// transition.
    async fn close(&self, lot: Lot) -> Result<Lot, AuctionError> {
        if lot.status == LotStatus::Closed {
            return Ok(lot);
        }

        let mut updated = lot;
        updated.status = LotStatus::Closed;
        let updated = self.catalog.save_lot(updated).await?;

        // Announce the closure whether it came from the clock or from an
        // explicit early finalize.
        self.notifier
            .broadcast(AuctionEvent::AuctionClosed { lot_id: updated.id });
        Ok(updated)
    }
}
