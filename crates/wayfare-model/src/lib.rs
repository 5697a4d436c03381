//! In-memory itinerary model for Wayfare.
//!
//! An [`Itinerary`] is an ordered run of boards (days), each holding an
//! ordered run of cards (activities). This crate owns the two pieces of the
//! sync core that are pure data engineering:
//!
//! - the store itself, with dense-ordering invariants, move/insert/remove
//!   primitives, and cheap copy-on-write snapshots for optimistic rollback;
//! - schedule-conflict detection over each board's card time ranges.
//!
//! Everything network- or session-shaped (presence, reconciliation, the
//! connection seam) lives in `wayfare-client`; this crate has no I/O and no
//! async.

mod error;
mod itinerary;
pub mod overlap;

pub use error::ModelError;
pub use itinerary::{Board, Card, Itinerary, ItinerarySnapshot};
pub use overlap::{board_overlap, itinerary_overlap, BoardOverlap, OverlapReport};
