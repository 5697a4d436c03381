//! Shared identity and value types for the Wayfare sync core.
//!
//! Everything here is plain data: typed UUID ids, wall-clock day times, and
//! roster/presence value types. The itinerary model lives in `wayfare-model`,
//! the live-session machinery in `wayfare-client`; both depend on this crate
//! so the backend payload shapes and the in-memory model agree on vocabulary.

pub mod ids;
pub mod time;
pub mod user;

pub use ids::{BoardId, CardId, ItineraryId, UserId};
pub use time::{DayTime, DayTimeParseError};
pub use user::{ColorToken, EditLock, EditingUser, UserInfo};
