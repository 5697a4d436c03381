//! Live collaboration layer for Wayfare shared itineraries.
//!
//! This crate turns the passive model from `wayfare-model` into a live,
//! multi-user session:
//!
//! - [`CollaborationSession`] — the façade the UI talks to: join/leave a
//!   room, request optimistic moves, announce edit locks, read presence and
//!   conflict state, subscribe to [`SessionEvent`]s.
//! - [`Reconciler`] — the optimistic-mutate / confirm-or-rollback protocol,
//!   one pending record per in-flight entity.
//! - [`PresenceRegistry`] — who else is in the room and which card each of
//!   them is touching (advisory soft locks).
//! - [`Connection`] — the seam to the transport collaborator, which owns
//!   sockets, reconnect, and wire encoding. Tests drive sessions through an
//!   in-memory implementation.
//!
//! The sync strategy is deliberately simple: optimistic local mutation with
//! server arbitration, and "something changed, refetch" signals instead of
//! operation-level merge. Two peers fighting over the same card inside one
//! ack window resolve as last-writer-wins via full refetch.

pub mod connection;
pub mod constants;
pub mod events;
pub mod presence;
pub mod reconcile;
pub mod session;

pub use connection::{Connection, ConnectionError};
pub use events::{
    ItineraryState, MoveBoardAck, MoveBoardIntent, MoveCardAck, MoveCardIntent, RoomEvent,
};
pub use presence::{Participant, PresenceRegistry};
pub use reconcile::{MoveKey, ReconcileError, Reconciler, Resolution};
pub use session::{CollaborationSession, SessionError, SessionEvent};
