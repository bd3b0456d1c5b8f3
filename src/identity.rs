//! Identity provider collaborator.
//!
//! The wiring layer resolves a bearer credential to a [`Principal`] before
//! calling into the engine; the core trusts the resulting bidder id for
//! attribution and never sees the raw credential again.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::AuctionError;
use crate::ids::BidderId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Bidder,
    Seller,
    Admin,
}

/// Authenticated caller as asserted by the identity provider.
#[derive(Clone, Copy, Debug)]
pub struct Principal {
    pub bidder_id: BidderId,
    pub role: Role,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolves a bearer credential, failing with
    /// [`AuctionError::Unauthenticated`] for anything unknown.
    async fn authenticate(&self, credential: &str) -> Result<Principal, AuctionError>;
}

/// Token-table provider for tests and local development.
#[derive(Default)]
pub struct StaticTokenProvider {
    tokens: RwLock<HashMap<String, Principal>>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, principal: Principal) {
        self.tokens.write().insert(token.into(), principal);
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn authenticate(&self, credential: &str) -> Result<Principal, AuctionError> {
        self.tokens
            .read()
            .get(credential)
            .copied()
            .ok_or(AuctionError::Unauthenticated)
    }
}
