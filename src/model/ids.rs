//! Identifier newtypes.
//!
//! Agents, plans and payments are all keyed by UUID. Wrapping them keeps an
//! agent id from being passed where a plan id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
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

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Identity of an agent participating in the tree and sponsor chain.
    AgentId
);
uuid_id!(
    /// Identity of a purchasable plan.
    PlanId
);
uuid_id!(
    /// Identity of the confirmed payment that triggered a commission.
    PaymentId
);
uuid_id!(
    /// Identity of a pairing reward entitlement.
    RewardId
);
uuid_id!(
    /// Identity of a commission ledger entry.
    CommissionId
);
