//! Typed room events and move intent/acknowledgement payloads.
//!
//! [`RoomEvent`] is the closed union of everything the connection service
//! pushes into a session — presence churn, soft-lock changes, and peers
//! signalling "refetch me". The connection service owns deserialization from
//! whatever the wire speaks; by the time an event reaches this crate it is
//! already typed. Outbound intents and their acknowledgements are plain
//! serde structs for the same reason, in the other direction.

use serde::{Deserialize, Serialize};

use wayfare_model::{Board, Itinerary, ModelError};
use wayfare_types::{BoardId, CardId, ItineraryId, UserId, UserInfo};

// ============================================================================
// Inbound events
// ============================================================================

/// Events pushed from the connection service into a session.
#[derive(Clone, Debug)]
pub enum RoomEvent {
    /// The underlying connection (re-)established itself.
    Connected,
    /// The underlying connection dropped; the connection service handles
    /// reconnect/backoff and will emit `Connected` again.
    Disconnected { reason: String },
    /// A user entered the room.
    UserJoined { user: UserInfo },
    /// A user left the room.
    UserLeft { user: UserInfo },
    /// Authoritative roster snapshot — replaces local membership wholesale.
    UserList { users: Vec<UserInfo> },
    /// A remote user started editing a card (soft lock).
    CardEditingStarted {
        card_id: CardId,
        user: UserInfo,
        timestamp: u64,
    },
    /// A remote user stopped editing a card.
    CardEditingEnded {
        card_id: CardId,
        user_id: UserId,
        timestamp: u64,
    },
    /// A peer changed something and asks everyone to refetch the document.
    RefetchRequested,
}

// ============================================================================
// Outbound intents & acknowledgements
// ============================================================================

/// Intent: move a card between (or within) boards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCardIntent {
    pub card_id: CardId,
    pub from_board: BoardId,
    pub to_board: BoardId,
    pub to_index: usize,
}

/// Intent: move a board to a new 1-based position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveBoardIntent {
    pub board_id: BoardId,
    pub to_position: u32,
}

/// Backend acknowledgement of a card move.
///
/// `card_id` is the authoritative id after the move: the backend implements
/// some cross-board moves as delete+recreate and hands back a fresh id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCardAck {
    pub card_id: CardId,
}

/// Backend acknowledgement of a board move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveBoardAck {
    pub board_id: BoardId,
    /// Server-confirmed 1-based position after renumbering.
    pub position: u32,
}

// ============================================================================
// Full-document payload
// ============================================================================

/// The application-level full itinerary payload, as returned by the join
/// and fetch requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItineraryState {
    pub id: ItineraryId,
    pub title: String,
    /// Canonical board sequence; positions and order indexes are
    /// renumbered from it on ingest.
    pub boards: Vec<Board>,
}

impl ItineraryState {
    /// Validate and build the in-memory model from this payload.
    pub fn into_itinerary(self) -> Result<Itinerary, ModelError> {
        Itinerary::from_parts(self.id, self.title, self.boards)
    }
}

// ============================================================================
// Tests
// ============================================================================
