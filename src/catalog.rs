//! Catalog store: durable lot metadata.
//!
//! The catalog is an external collaborator; the core only relies on
//! read-your-writes consistency per lot. Saves carry the lot's version
//! counter so a stale writer loses with [`CatalogError::VersionConflict`]
//! instead of clobbering a newer state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::ids::LotId;
use crate::lot::{Lot, LotStatus};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("lot not found")]
    LotNotFound,
    #[error("lot was updated concurrently")]
    VersionConflict,
    #[error("catalog storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    async fn insert_lot(&self, lot: Lot) -> Result<(), CatalogError>;

    async fn get_lot(&self, id: LotId) -> Result<Option<Lot>, CatalogError>;

    /// Persists `lot`, expecting its `version` to match the stored one.
    /// The stored copy gets `version + 1`; the caller's copy is updated via
    /// the returned lot.
    async fn save_lot(&self, lot: Lot) -> Result<Lot, CatalogError>;

    async fn delete_lot(&self, id: LotId) -> Result<(), CatalogError>;

    /// Lots whose window has elapsed and that have not been settled yet.
    async fn list_expired_lots(&self, now: DateTime<Utc>) -> Result<Vec<Lot>, CatalogError>;

    /// Lots currently in the given status, for the browse views.
    async fn list_by_status(&self, status: LotStatus) -> Result<Vec<Lot>, CatalogError>;

    /// Next sequential display number for a new lot.
    async fn next_lot_number(&self) -> Result<u64, CatalogError>;
}

/// In-memory catalog for tests and local development.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    lots: RwLock<HashMap<LotId, Lot>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    #[instrument(skip(self, lot), fields(lot_id = %lot.id))]
    async fn insert_lot(&self, lot: Lot) -> Result<(), CatalogError> {
        let mut lots = self.lots.write().await;
        lots.insert(lot.id, lot);
        Ok(())
    }

    async fn get_lot(&self, id: LotId) -> Result<Option<Lot>, CatalogError> {
        let lots = self.lots.read().await;
        Ok(lots.get(&id).cloned())
    }

    #[instrument(skip(self, lot), fields(lot_id = %lot.id, version = lot.version))]
    async fn save_lot(&self, mut lot: Lot) -> Result<Lot, CatalogError> {
        let mut lots = self.lots.write().await;
        let stored = lots.get_mut(&lot.id).ok_or(CatalogError::LotNotFound)?;
        if stored.version != lot.version {
            return Err(CatalogError::VersionConflict);
        }
        lot.version += 1;
        *stored = lot.clone();
        Ok(lot)
    }

    async fn delete_lot(&self, id: LotId) -> Result<(), CatalogError> {
        let mut lots = self.lots.write().await;
        lots.remove(&id).map(|_| ()).ok_or(CatalogError::LotNotFound)
    }

    async fn list_expired_lots(&self, now: DateTime<Utc>) -> Result<Vec<Lot>, CatalogError> {
        let lots = self.lots.read().await;
        Ok(lots
            .values()
            .filter(|lot| lot.awaits_settlement(now))
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: LotStatus) -> Result<Vec<Lot>, CatalogError> {
        let lots = self.lots.read().await;
        Ok(lots.values().filter(|l| l.status == status).cloned().collect())
    }

    async fn next_lot_number(&self) -> Result<u64, CatalogError> {
        let lots = self.lots.read().await;
        Ok(lots.values().map(|l| l.lot_number).max().unwrap_or(0) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SellerId;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_lot() -> Lot {
        let now = Utc::now();
        Lot {
            id: LotId::new(),
            seller_id: SellerId::new(),
            name: "White Avalanche".into(),
            category: "Elegant".into(),
            size: 50,
            quantity: 100,
            lot_number: 1,
            initial_price: dec!(80),
            current_price: dec!(80),
            start_time: now - Duration::minutes(10),
            end_time: now - Duration::minutes(1),
            status: LotStatus::Live,
            winning_bid: None,
            settlement: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn stale_save_is_rejected() {
        let store = InMemoryCatalogStore::new();
        let lot = sample_lot();
        store.insert_lot(lot.clone()).await.unwrap();

        let fresh = store.save_lot(lot.clone()).await.unwrap();
        assert_eq!(fresh.version, 1);

        // The original copy still carries version 0.
        let err = store.save_lot(lot).await.unwrap_err();
        assert!(matches!(err, CatalogError::VersionConflict));
    }

    #[tokio::test]
    async fn expired_listing_skips_settled_lots() {
        let store = InMemoryCatalogStore::new();
        let mut expired = sample_lot();
        expired.status = LotStatus::Live;
        let mut settled = sample_lot();
        settled.status = LotStatus::Closed;
        settled.settlement = Some(crate::lot::SettlementOutcome::NoBids);

        store.insert_lot(expired.clone()).await.unwrap();
        store.insert_lot(settled).await.unwrap();

        let due = store.list_expired_lots(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, expired.id);
    }
}
