//! Error types for itinerary model operations.

use thiserror::Error;

use wayfare_types::{BoardId, CardId};

/// Errors that can occur while mutating an itinerary.
///
/// Every variant is raised *before* any state changes: a failed operation
/// leaves the itinerary exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Card not found where the caller said it would be.
    ///
    /// Usually a stale-id race (the card moved or was deleted by a peer
    /// between the UI reading it and the intent arriving).
    #[error("card not found: {0:?}")]
    CardNotFound(CardId),

    /// Board not found in this itinerary.
    #[error("board not found: {0:?}")]
    BoardNotFound(BoardId),

    /// An itinerary must keep at least one board — the final board is
    /// cleared by the product, never deleted.
    #[error("cannot remove the last remaining board")]
    LastBoard,

    /// Board id already present.
    #[error("board already exists: {0:?}")]
    DuplicateBoard(BoardId),

    /// Card id already present.
    #[error("card already exists: {0:?}")]
    DuplicateCard(CardId),
}
