//! Opaque identifiers shared across the service.
//!
//! Every entity gets its own newtype so a `BidId` can never be passed where a
//! `LotId` is expected. All of them are random UUIDs underneath.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifies a single auction lot.
    LotId
);
id_type!(
    /// Identifies one bid inside the ledger.
    BidId
);
id_type!(
    /// Identifies a bidder account held by the Wallet service.
    BidderId
);
id_type!(
    /// Identifies the seller who listed a lot.
    SellerId
);
