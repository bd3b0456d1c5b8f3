//! Bidding and settlement core for the flower-auction marketplace.
//!
//! Sellers list lots, bidders race to outbid one another while the lot is
//! live, and the highest qualifying bid wins when the window closes. This
//! crate owns exactly that core: the lot lifecycle state machine, the
//! concurrency-safe bid acceptance path, and the settlement sweep that picks
//! winners and debits their wallets. Identity, catalog storage, wallets and
//! viewer notifications are external collaborators injected as traits.
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use auction_service::*;
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let catalog = Arc::new(InMemoryCatalogStore::new());
//! let ledger = Arc::new(InMemoryBidLedger::new());
//! let wallet = Arc::new(InMemoryWalletService::new());
//! let channel = Arc::new(BroadcastChannel::new(1024));
//! let policy = Arc::new(BidPolicy::strict());
//! let locks = Arc::new(LotLocks::new());
//!
//! let engine = AuctionEngine::new(
//!     catalog.clone(),
//!     ledger.clone(),
//!     wallet.clone(),
//!     channel.clone(),
//!     policy.clone(),
//!     locks.clone(),
//!     EngineConfig::default(),
//! );
//! let settler = Settler::new(
//!     catalog, ledger, wallet, channel, policy, locks,
//!     SettlerConfig::default(),
//! );
//! settler.clone().spawn_sweep_loop(std::time::Duration::from_secs(60));
//! # Ok(()) }
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod identity;
pub mod ids;
pub mod ledger;
pub mod locks;
pub mod lot;
pub mod notify;
pub mod policy;
pub mod settlement;
pub mod wallet;

pub use catalog::{CatalogStore, InMemoryCatalogStore};
pub use engine::{AuctionEngine, EngineConfig, NewLot};
pub use error::{AuctionError, InactiveReason};
pub use history::{BidActivityLog, BidRef, BidSummary};
pub use identity::{IdentityProvider, Principal, Role, StaticTokenProvider};
pub use ids::{BidId, BidderId, LotId, SellerId};
pub use ledger::{Bid, BidLedger, InMemoryBidLedger};
pub use locks::LotLocks;
pub use lot::{evaluate, Evaluation, Lot, LotStatus, SettlementOutcome, Transition};
pub use notify::{AuctionEvent, BroadcastChannel, NotificationChannel};
pub use policy::{BidPolicy, BidRule};
pub use settlement::{Settler, SettlerConfig, SweepReport};
pub use wallet::{InMemoryWalletService, WalletService};
