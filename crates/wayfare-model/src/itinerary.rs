//! The itinerary store — ordered boards of ordered cards.
//!
//! # Ordering invariants
//!
//! The `Vec` order of boards is the canonical sequence; each board's
//! `position` is its 1-based slot in that sequence, dense with no gaps.
//! Within a board, `Vec` order of cards is display order and each card's
//! `order_index` is its 0-based slot, dense likewise. Every mutation that
//! touches structure renumbers the affected scope before returning, so the
//! invariants hold between any two calls — never only eventually.
//!
//! # Snapshots
//!
//! Boards are held behind `Arc` and mutated through `Arc::make_mut`, so
//! `snapshot()` clones only the spine (one `Arc` bump per board) and
//! `restore()` is a single assignment. An optimistic move therefore costs
//! O(boards) to make reversible, regardless of how many cards sit on
//! untouched boards.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use wayfare_types::{BoardId, CardId, DayTime, ItineraryId};

use crate::error::ModelError;

/// A card: one scheduled activity on a board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    /// Back-reference to the owning board. Kept in sync by every move;
    /// never an ownership edge.
    pub board_id: BoardId,
    /// 0-based dense slot within the board. Ascending == display order.
    pub order_index: u32,
    pub starts_at: DayTime,
    /// May precede `starts_at`; the overlap sweep tolerates it.
    pub ends_at: DayTime,
    /// User-set "don't reshuffle me" flag. Unrelated to the soft edit lock.
    pub locked: bool,
    /// Content and location details — opaque to the sync core.
    pub payload: serde_json::Value,
}

impl Card {
    pub fn new(board_id: BoardId, starts_at: DayTime, ends_at: DayTime) -> Self {
        Self {
            id: CardId::new(),
            board_id,
            order_index: 0,
            starts_at,
            ends_at,
            locked: false,
            payload: serde_json::Value::Null,
        }
    }
}

/// A board: one day of the trip, holding an ordered run of cards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    /// 1-based dense slot within the itinerary.
    pub position: u32,
    pub cards: Vec<Card>,
}

impl Board {
    pub fn new(id: BoardId) -> Self {
        Self { id, position: 0, cards: Vec::new() }
    }
}

/// An immutable copy of the itinerary taken before an optimistic mutation.
///
/// Structurally shared with the live store — cheap to take, cheap to hold.
/// Feeding it back through [`Itinerary::restore`] is the only way state
/// moves backward.
#[derive(Clone, Debug)]
pub struct ItinerarySnapshot {
    inner: Itinerary,
}

impl ItinerarySnapshot {
    /// Read access for callers that want to diff against the live store.
    pub fn as_itinerary(&self) -> &Itinerary {
        &self.inner
    }
}

/// The in-memory itinerary for one open document.
///
/// Exclusively owned by the session that opened it; all mutation goes
/// through the methods here, which uphold the ordering invariants
/// documented at module level.
#[derive(Clone, Debug)]
pub struct Itinerary {
    id: ItineraryId,
    title: String,
    boards: Vec<Arc<Board>>,
    /// Bumped on every successful mutation (including `restore`), for
    /// cheap change detection by the UI layer.
    version: u64,
}

// Version is change-detection state, not content: two itineraries are equal
// when a reader could not tell them apart.
impl PartialEq for Itinerary {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.title == other.title && self.boards == other.boards
    }
}

impl Itinerary {
    /// Build from a full backend payload.
    ///
    /// Board and card ids must be unique; at least one board is required.
    /// Positions and order indexes in the payload are ignored — the payload's
    /// sequence is canonical and everything is renumbered densely from it.
    pub fn from_parts(
        id: ItineraryId,
        title: impl Into<String>,
        boards: Vec<Board>,
    ) -> Result<Self, ModelError> {
        if boards.is_empty() {
            return Err(ModelError::LastBoard);
        }

        let mut seen_boards = std::collections::HashSet::new();
        let mut seen_cards = std::collections::HashSet::new();
        for board in &boards {
            if !seen_boards.insert(board.id) {
                return Err(ModelError::DuplicateBoard(board.id));
            }
            for card in &board.cards {
                if !seen_cards.insert(card.id) {
                    return Err(ModelError::DuplicateCard(card.id));
                }
            }
        }

        let mut itinerary = Self {
            id,
            title: title.into(),
            boards: boards.into_iter().map(Arc::new).collect(),
            version: 0,
        };
        itinerary.renumber_boards();
        for i in 0..itinerary.boards.len() {
            itinerary.renumber_cards(i);
        }
        debug_assert_eq!(itinerary.check_invariants(), Ok(()));
        Ok(itinerary)
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn id(&self) -> ItineraryId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Monotonic mutation counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    /// Boards in canonical order.
    pub fn boards(&self) -> impl Iterator<Item = &Board> {
        self.boards.iter().map(|b| b.as_ref())
    }

    pub fn board(&self, id: BoardId) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == id).map(|b| b.as_ref())
    }

    pub fn card(&self, id: CardId) -> Option<&Card> {
        self.boards
            .iter()
            .find_map(|b| b.cards.iter().find(|c| c.id == id))
    }

    /// The board currently holding `card_id`.
    pub fn board_of_card(&self, card_id: CardId) -> Option<&Board> {
        self.boards
            .iter()
            .find(|b| b.cards.iter().any(|c| c.id == card_id))
            .map(|b| b.as_ref())
    }

    // =========================================================================
    // Move primitives
    // =========================================================================

    /// Move a card out of `from` and into `to` at `to_index`.
    ///
    /// `to_index` is clamped to `[0, len]` of the destination (measured
    /// after removal when `from == to`); a clamped tie inserts *before* the
    /// card currently occupying that slot, matching the drop indicator.
    /// Only the affected board(s) are renumbered.
    pub fn move_card(
        &mut self,
        card_id: CardId,
        from: BoardId,
        to: BoardId,
        to_index: usize,
    ) -> Result<(), ModelError> {
        let from_idx = self.board_index(from)?;
        let to_idx = self.board_index(to)?;

        let card_pos = self.boards[from_idx]
            .cards
            .iter()
            .position(|c| c.id == card_id)
            .ok_or(ModelError::CardNotFound(card_id))?;

        let mut card = Arc::make_mut(&mut self.boards[from_idx])
            .cards
            .remove(card_pos);

        let dest = Arc::make_mut(&mut self.boards[to_idx]);
        let insert_at = to_index.min(dest.cards.len());
        card.board_id = dest.id;
        dest.cards.insert(insert_at, card);

        self.renumber_cards(to_idx);
        if from_idx != to_idx {
            self.renumber_cards(from_idx);
        }
        self.version += 1;
        trace!(
            card = %card_id.short(),
            from = %from.short(),
            to = %to.short(),
            to_index = insert_at,
            "moved card"
        );
        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(())
    }

    /// Move a board to `to_position` (1-based, clamped to `[1, N]`), then
    /// renumber every board.
    pub fn move_board(&mut self, board_id: BoardId, to_position: u32) -> Result<(), ModelError> {
        let idx = self.board_index(board_id)?;
        let board = self.boards.remove(idx);

        // Position 1 is the front; anything past the end lands last.
        let insert_at = (to_position.max(1) as usize - 1).min(self.boards.len());
        self.boards.insert(insert_at, board);

        self.renumber_boards();
        self.version += 1;
        trace!(board = %board_id.short(), to_position = insert_at + 1, "moved board");
        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(())
    }

    // =========================================================================
    // Board insert / remove
    // =========================================================================

    /// Insert a board at `at_position` (1-based, clamped), renumbering all.
    pub fn insert_board(&mut self, board: Board, at_position: u32) -> Result<(), ModelError> {
        if self.boards.iter().any(|b| b.id == board.id) {
            return Err(ModelError::DuplicateBoard(board.id));
        }
        if let Some(dup) = board
            .cards
            .iter()
            .find(|c| self.card(c.id).is_some())
        {
            return Err(ModelError::DuplicateCard(dup.id));
        }

        let insert_at = (at_position.max(1) as usize - 1).min(self.boards.len());
        self.boards.insert(insert_at, Arc::new(board));
        self.renumber_boards();
        self.renumber_cards(insert_at);
        self.version += 1;
        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(())
    }

    /// Remove a board. The last remaining board cannot be removed — the
    /// product clears it instead.
    pub fn remove_board(&mut self, board_id: BoardId) -> Result<(), ModelError> {
        if self.boards.len() == 1 {
            return Err(ModelError::LastBoard);
        }
        let idx = self.board_index(board_id)?;
        self.boards.remove(idx);
        self.renumber_boards();
        self.version += 1;
        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(())
    }

    // =========================================================================
    // Server reconciliation
    // =========================================================================

    /// Rename a card in place.
    ///
    /// The backend implements some cross-board moves as delete+recreate and
    /// acknowledges them with a fresh card id; this swaps the optimistic id
    /// for the authoritative one without disturbing anything else.
    pub fn replace_card_id(&mut self, old: CardId, new: CardId) -> Result<(), ModelError> {
        if old == new {
            return Ok(());
        }
        if self.card(new).is_some() {
            return Err(ModelError::DuplicateCard(new));
        }
        let board_idx = self
            .boards
            .iter()
            .position(|b| b.cards.iter().any(|c| c.id == old))
            .ok_or(ModelError::CardNotFound(old))?;

        let board = Arc::make_mut(&mut self.boards[board_idx]);
        // position() above guarantees the find succeeds
        if let Some(card) = board.cards.iter_mut().find(|c| c.id == old) {
            card.id = new;
        }
        self.version += 1;
        trace!(old = %old.short(), new = %new.short(), "reassigned card id");
        Ok(())
    }

    // =========================================================================
    // Snapshot / restore
    // =========================================================================

    /// Take a structurally-shared copy for optimistic rollback.
    pub fn snapshot(&self) -> ItinerarySnapshot {
        ItinerarySnapshot { inner: self.clone() }
    }

    /// Roll the store back to `snapshot`. A single assignment — readers
    /// never observe a partially-restored state.
    pub fn restore(&mut self, snapshot: ItinerarySnapshot) {
        let version = self.version;
        *self = snapshot.inner;
        // The rollback itself is a change the UI must observe.
        self.version = version + 1;
    }

    /// Replace the whole store with an authoritative copy (a refetched
    /// document). Like `restore`, a single assignment, and the version
    /// keeps moving forward.
    pub fn replace_with(&mut self, other: Itinerary) {
        let version = self.version;
        *self = other;
        self.version = version + 1;
    }

    // =========================================================================
    // Invariant checking
    // =========================================================================

    /// Verify the dense-ordering invariants. Cheap enough for
    /// `debug_assert!` after every mutation; tests call it after each step.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.boards.is_empty() {
            return Err("itinerary has no boards".into());
        }
        let mut board_ids = std::collections::HashSet::new();
        let mut card_ids = std::collections::HashSet::new();
        for (i, board) in self.boards.iter().enumerate() {
            if !board_ids.insert(board.id) {
                return Err(format!("duplicate board {}", board.id));
            }
            if board.position != i as u32 + 1 {
                return Err(format!(
                    "board {} has position {} at slot {}",
                    board.id,
                    board.position,
                    i + 1
                ));
            }
            for (j, card) in board.cards.iter().enumerate() {
                if !card_ids.insert(card.id) {
                    return Err(format!("duplicate card {}", card.id));
                }
                if card.order_index != j as u32 {
                    return Err(format!(
                        "card {} has order_index {} at slot {}",
                        card.id, card.order_index, j
                    ));
                }
                if card.board_id != board.id {
                    return Err(format!(
                        "card {} on board {} claims board {}",
                        card.id, board.id, card.board_id
                    ));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn board_index(&self, id: BoardId) -> Result<usize, ModelError> {
        self.boards
            .iter()
            .position(|b| b.id == id)
            .ok_or(ModelError::BoardNotFound(id))
    }

    fn renumber_boards(&mut self) {
        for (i, board) in self.boards.iter_mut().enumerate() {
            if board.position != i as u32 + 1 {
                Arc::make_mut(board).position = i as u32 + 1;
            }
        }
    }

    fn renumber_cards(&mut self, board_idx: usize) {
        let board = Arc::make_mut(&mut self.boards[board_idx]);
        let board_id = board.id;
        for (i, card) in board.cards.iter_mut().enumerate() {
            card.order_index = i as u32;
            card.board_id = board_id;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
