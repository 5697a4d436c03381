//! Schedule-conflict detection over each board's card time ranges.
//!
//! A card participates in a conflict when its time range crosses another
//! card's range *on the same board*. Different boards are different days, so
//! clock times never conflict across boards.
//!
//! # Sweep
//!
//! Cards are stable-sorted by start (original board order breaks ties), then
//! swept once carrying the maximum end seen so far and which card produced
//! it. A card whose start falls strictly below that running maximum crosses
//! the carrying card — both are flagged. Comparing against the *maximum*
//! rather than the previous neighbor is what catches a long card spanning
//! several shorter ones that nest inside it. O(n log n) per board.
//!
//! Boundaries are end-exclusive: a card starting exactly when another ends
//! does not conflict. A card whose end precedes its start covers the empty
//! range `[start, end)` and therefore never flags a later card, though it is
//! itself flagged when it starts strictly inside an earlier card's range.

use serde::{Deserialize, Serialize};

use wayfare_types::{BoardId, CardId};

use crate::itinerary::{Board, Itinerary};

/// Conflict result for one board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardOverlap {
    pub board_id: BoardId,
    /// Cards participating in at least one pairwise overlap, in board
    /// display order.
    pub overlapping: Vec<CardId>,
    pub has_overlap: bool,
}

/// Conflict results for a whole itinerary, one entry per board in
/// canonical order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OverlapReport {
    pub boards: Vec<BoardOverlap>,
    /// Boards with at least one conflict — what the UI badges.
    pub boards_with_overlap: Vec<BoardId>,
}

impl OverlapReport {
    pub fn board(&self, id: BoardId) -> Option<&BoardOverlap> {
        self.boards.iter().find(|b| b.board_id == id)
    }

    pub fn has_any(&self) -> bool {
        !self.boards_with_overlap.is_empty()
    }
}

/// Flag every card on `board` that crosses another card's time range.
pub fn board_overlap(board: &Board) -> BoardOverlap {
    // (original slot, start, end) — sort_by_key is stable, so equal starts
    // keep board order.
    let mut spans: Vec<(usize, u16, u16)> = board
        .cards
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.starts_at.minutes(), c.ends_at.minutes()))
        .collect();
    spans.sort_by_key(|&(_, start, _)| start);

    let mut flagged = vec![false; spans.len()];
    let mut max_end: Option<(u16, usize)> = None; // (end, slot that carries it)

    for &(slot, start, end) in &spans {
        if let Some((running_end, carrier)) = max_end {
            if start < running_end {
                flagged[slot] = true;
                flagged[carrier] = true;
            }
        }
        // A card with end <= start covers an empty range and must not
        // become the carrier on ties.
        if end > start && max_end.is_none_or(|(running_end, _)| end > running_end) {
            max_end = Some((end, slot));
        }
    }

    let overlapping: Vec<CardId> = board
        .cards
        .iter()
        .enumerate()
        .filter(|&(i, _)| flagged[i])
        .map(|(_, c)| c.id)
        .collect();

    BoardOverlap {
        board_id: board.id,
        has_overlap: !overlapping.is_empty(),
        overlapping,
    }
}

/// Run conflict detection on every board of the itinerary.
pub fn itinerary_overlap(itinerary: &Itinerary) -> OverlapReport {
    let boards: Vec<BoardOverlap> = itinerary.boards().map(board_overlap).collect();
    let boards_with_overlap = boards
        .iter()
        .filter(|b| b.has_overlap)
        .map(|b| b.board_id)
        .collect();
    OverlapReport { boards, boards_with_overlap }
}

// ============================================================================
// Tests
// ============================================================================
