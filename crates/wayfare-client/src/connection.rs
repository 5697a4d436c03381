//! The connection seam between a session and the transport collaborator.
//!
//! The socket layer (reconnect, backoff, wire encoding) lives outside this
//! crate. A session consumes it as a [`Connection`]: request/reply methods
//! for intents the backend acknowledges, fire-and-forget methods for
//! advisory signals, and a broadcast stream of [`RoomEvent`]s pushed by the
//! server. Tests drive sessions with an in-memory implementation.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use wayfare_types::{CardId, ItineraryId};

use crate::events::{
    ItineraryState, MoveBoardAck, MoveBoardIntent, MoveCardAck, MoveCardIntent, RoomEvent,
};

/// Errors from the connection collaborator (or from waiting on it).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The backend rejected the intent or the transport failed mid-flight.
    #[error("network error: {0}")]
    Network(String),

    /// No acknowledgement arrived within the deadline. Raised by the
    /// session's own timer, not the transport.
    #[error("no acknowledgement within {0:?}")]
    AckTimeout(Duration),

    /// The connection service has been shut down.
    #[error("connection closed")]
    Closed,
}

/// Duplex channel to the backend for one room.
///
/// Request/reply methods resolve with the backend's acknowledgement (or a
/// [`ConnectionError`]); the session decides what an ack or failure means
/// for local state. Implementations must be cheap to call concurrently —
/// the session issues moves from spawned tasks.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Enter the room and fetch the initial document.
    async fn join_room(&self, itinerary_id: ItineraryId)
        -> Result<ItineraryState, ConnectionError>;

    /// Announce departure. Best-effort; the session bounds the wait.
    async fn leave_room(&self) -> Result<(), ConnectionError>;

    /// Submit a card move and await the backend's verdict.
    async fn move_card(&self, intent: MoveCardIntent) -> Result<MoveCardAck, ConnectionError>;

    /// Submit a board move and await the backend's verdict.
    async fn move_board(&self, intent: MoveBoardIntent)
        -> Result<MoveBoardAck, ConnectionError>;

    /// Tell peers this user started editing a card (soft lock).
    async fn start_editing(&self, card_id: CardId) -> Result<(), ConnectionError>;

    /// Tell peers this user stopped editing a card.
    async fn end_editing(&self, card_id: CardId) -> Result<(), ConnectionError>;

    /// Fetch the current authoritative document.
    async fn fetch_itinerary(&self) -> Result<ItineraryState, ConnectionError>;

    /// Broadcast "I changed something, please refetch" to peers. The core
    /// never diffs-and-transmits; it signals and lets each peer pull.
    async fn signal_changed(&self) -> Result<(), ConnectionError>;

    /// Subscribe to server-pushed room events.
    fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent>;
}
