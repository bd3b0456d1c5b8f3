//! Pluggable bid-acceptance policy.
//!
//! The price, liveness and balance checks are structural and always run; the
//! rules here are the deployment-specific layer on top. Each rule is an
//! independent, individually testable variant, and a policy is an explicit
//! ordered list of them. Whether a bidder may raise their own standing bid,
//! and how long the per-lot cooldown lasts, intentionally has no default:
//! every deployment picks one of the named presets (or assembles its own
//! rule list) through configuration.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::AuctionError;
use crate::ids::{BidderId, LotId};
use crate::ledger::Bid;

/// A single acceptance rule, checked in the order declared by the policy.
#[derive(Clone, Copy, Debug)]
pub enum BidRule {
    /// Reject a bid that would out-raise the bidder's own standing highest
    /// bid without a competing bid in between.
    NoSelfOutbid,
    /// One accepted bid per (lot, bidder) within the window.
    Cooldown(Duration),
}

/// Ordered rule list plus the state the cooldown rule needs.
pub struct BidPolicy {
    rules: Vec<BidRule>,
    cooldowns: CooldownTracker,
}

impl BidPolicy {
    /// No restrictions beyond price, liveness and balance.
    pub fn open() -> Self {
        Self::from_rules(Vec::new())
    }

    /// Self-raises forbidden, no cooldown.
    pub fn strict() -> Self {
        Self::from_rules(vec![BidRule::NoSelfOutbid])
    }

    /// Self-raises forbidden and one accepted bid per lot per window.
    pub fn rate_limited(window: Duration) -> Self {
        Self::from_rules(vec![BidRule::NoSelfOutbid, BidRule::Cooldown(window)])
    }

    pub fn from_rules(rules: Vec<BidRule>) -> Self {
        Self {
            rules,
            cooldowns: CooldownTracker::default(),
        }
    }

    /// Runs every rule in order; the first failure wins.
    pub fn check(
        &self,
        lot_id: LotId,
        bidder_id: BidderId,
        previous_highest: Option<&Bid>,
        now: DateTime<Utc>,
    ) -> Result<(), AuctionError> {
        for rule in &self.rules {
            match rule {
                BidRule::NoSelfOutbid => {
                    if previous_highest.is_some_and(|b| b.bidder_id == bidder_id) {
                        return Err(AuctionError::CannotOutbidSelf);
                    }
                }
                BidRule::Cooldown(window) => {
                    self.cooldowns.check(lot_id, bidder_id, now, *window)?;
                }
            }
        }
        Ok(())
    }

    /// Called by the engine once a bid has been committed, so the cooldown
    /// window only starts on accepted bids.
    pub fn record_accepted(&self, lot_id: LotId, bidder_id: BidderId, now: DateTime<Utc>) {
        if self.rules.iter().any(|r| matches!(r, BidRule::Cooldown(_))) {
            self.cooldowns.record(lot_id, bidder_id, now);
        }
    }

    /// Drops cooldown state for a lot that is done trading.
    pub fn forget_lot(&self, lot_id: LotId) {
        self.cooldowns
            .last_accepted
            .write()
            .retain(|(lot, _), _| *lot != lot_id);
    }
}

/// Last accepted bid per (lot, bidder). The map only grows with distinct
/// active pairs; settled lots are dropped via [`CooldownTracker::forget_lot`].
#[derive(Default)]
struct CooldownTracker {
    last_accepted: RwLock<HashMap<(LotId, BidderId), DateTime<Utc>>>,
}

impl CooldownTracker {
    fn check(
        &self,
        lot_id: LotId,
        bidder_id: BidderId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<(), AuctionError> {
        let map = self.last_accepted.read();
        if let Some(last) = map.get(&(lot_id, bidder_id)) {
            let elapsed = (now - *last)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if elapsed < window {
                return Err(AuctionError::RateLimited {
                    retry_after_secs: (window - elapsed).as_secs().max(1),
                });
            }
        }
        Ok(())
    }

    fn record(&self, lot_id: LotId, bidder_id: BidderId, now: DateTime<Utc>) {
        self.last_accepted.write().insert((lot_id, bidder_id), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn standing_bid(lot: LotId, bidder: BidderId) -> Bid {
        Bid::new(lot, bidder, dec!(150), Utc::now())
    }

    #[test]
    fn open_policy_allows_self_raise() {
        let policy = BidPolicy::open();
        let lot = LotId::new();
        let bidder = BidderId::new();
        let prev = standing_bid(lot, bidder);
        assert!(policy.check(lot, bidder, Some(&prev), Utc::now()).is_ok());
    }

    #[test]
    fn strict_policy_rejects_self_raise() {
        let policy = BidPolicy::strict();
        let lot = LotId::new();
        let bidder = BidderId::new();
        let prev = standing_bid(lot, bidder);

        let err = policy.check(lot, bidder, Some(&prev), Utc::now()).unwrap_err();
        assert!(matches!(err, AuctionError::CannotOutbidSelf));

        // A different bidder is fine.
        assert!(policy
            .check(lot, BidderId::new(), Some(&prev), Utc::now())
            .is_ok());
    }

    #[test]
    fn cooldown_counts_from_accepted_bids_only() {
        let policy = BidPolicy::rate_limited(Duration::from_secs(90));
        let lot = LotId::new();
        let bidder = BidderId::new();
        let now = Utc::now();

        // Nothing accepted yet: rejected checks leave no trace.
        assert!(policy.check(lot, bidder, None, now).is_ok());
        assert!(policy.check(lot, bidder, None, now).is_ok());

        policy.record_accepted(lot, bidder, now);

        let err = policy
            .check(lot, bidder, None, now + ChronoDuration::seconds(30))
            .unwrap_err();
        assert!(matches!(err, AuctionError::RateLimited { .. }));

        // The window is per lot.
        assert!(policy
            .check(LotId::new(), bidder, None, now + ChronoDuration::seconds(30))
            .is_ok());

        // And it expires.
        assert!(policy
            .check(lot, bidder, None, now + ChronoDuration::seconds(91))
            .is_ok());
    }

    #[test]
    fn rules_run_in_declared_order() {
        let policy = BidPolicy::rate_limited(Duration::from_secs(90));
        let lot = LotId::new();
        let bidder = BidderId::new();
        let now = Utc::now();
        policy.record_accepted(lot, bidder, now);

        // Both rules would fire; NoSelfOutbid is declared first.
        let prev = standing_bid(lot, bidder);
        let err = policy.check(lot, bidder, Some(&prev), now).unwrap_err();
        assert!(matches!(err, AuctionError::CannotOutbidSelf));
    }
}
