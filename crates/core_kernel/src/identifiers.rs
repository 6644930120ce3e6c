//! Strongly-typed identifiers for domain entities
//!
//! Newtype wrappers around UUIDs keep a booking id from being passed where
//! an invoice id is expected. Displayed ids carry a short prefix
//! (`INV-…`, `BKG-…`); parsing accepts both prefixed and bare UUIDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Accounts
define_id!(UserId, "USR");
define_id!(OwnerId, "OWN");

// Property hierarchy and occupancy (owned by external collaborators)
define_id!(BuildingId, "BLD");
define_id!(BookingId, "BKG");

// Invoicing
define_id!(InvoiceId, "INV");
define_id!(InvoiceExpenseId, "IEX");
define_id!(InvoiceSettingsId, "IST");
define_id!(PaymentId, "PAY");

// Subscriptions
define_id!(PlanId, "PLN");
define_id!(SubscriptionId, "SUB");

impl From<UserId> for OwnerId {
    /// An owner is the pg_admin user account, so both share the same UUID
    fn from(user: UserId) -> Self {
        OwnerId::from_uuid(*user.as_uuid())
    }
}
