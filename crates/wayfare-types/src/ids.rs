//! Typed identifiers for itineraries, boards, cards, and users.
//!
//! All ID types wrap a UUID. They are minted by the backend (or locally for
//! optimistic inserts) and treated as opaque: full UUID text for logging,
//! `short()` (first 8 hex chars) for human-facing UI, never as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An itinerary (shared document) identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItineraryId(uuid::Uuid);

/// A board (day) identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(uuid::Uuid);

/// A card (activity) identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(uuid::Uuid);

/// A user identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident) => {
        impl $T {
            /// Mint a fresh random ID.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// First 8 hex characters — for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Parse from standard UUID text or 32-char hex.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($T), "({})"), self.short())
            }
        }
    };
}

impl_typed_id!(ItineraryId);
impl_typed_id!(BoardId);
impl_typed_id!(CardId);
impl_typed_id!(UserId);

// ============================================================================
// Tests
// ============================================================================
