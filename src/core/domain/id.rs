//! Domain identifier types with proper encapsulation.
//!
//! Identifiers assigned by the upstream catalog (events, markets, tokens)
//! wrap the upstream string verbatim. Identifiers minted by this process
//! (signals, opportunities, plans, orders) are UUID v4 strings.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! upstream_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

macro_rules! generated_id {
    ($(#[$doc:meta])* $name:ident) => {
        upstream_id!($(#[$doc])* $name);

        impl $name {
            /// Mint a fresh identifier (UUID v4).
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::generate()
            }
        }
    };
}

upstream_id!(
    /// Catalog event identifier.
    EventId
);
upstream_id!(
    /// Market condition identifier.
    MarketId
);
upstream_id!(
    /// Token (outcome share) identifier.
    TokenId
);
generated_id!(
    /// Signal identifier, minted at emission.
    SignalId
);
generated_id!(
    /// Opportunity identifier.
    OpportunityId
);
generated_id!(
    /// Execution plan identifier.
    PlanId
);
generated_id!(
    /// Order identifier (internal; distinct from the exchange order id).
    OrderId
);
