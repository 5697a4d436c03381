//! Optimistic move reconciliation for a shared itinerary.
//!
//! Every local move is applied to the store immediately, then confirmed or
//! rolled back when the backend answers. The reconciler owns that protocol
//! as one small state machine per in-flight entity, operating on an
//! [`Itinerary`] passed in by the session — the logic stays free of
//! channels and timers and fully unit-testable.
//!
//! # State machine (per moved entity)
//!
//! ```text
//! +--------+  begin_*_move: snapshot + optimistic apply   +---------+
//! |  Idle  | -------------------------------------------> | Pending |
//! +--------+                                              +----+----+
//!      ^        commit_*: accept server ids, drop snapshot     |
//!      +--------------------------------------------------<----+
//!      ^        roll_back: restore snapshot                    |
//!      +--------------------------------------------------<----+
//! ```
//!
//! A second move for an entity already `Pending` is rejected — intents are
//! serialized per entity, never queued. Peer-originated refreshes arriving
//! while anything is pending are parked and applied once the last pending
//! move resolves, so a stale read can't clobber an in-flight optimistic
//! edit.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{info, trace, warn};

use wayfare_model::{Itinerary, ItinerarySnapshot, ModelError};
use wayfare_types::{BoardId, CardId};

use crate::events::{MoveBoardAck, MoveBoardIntent, MoveCardAck, MoveCardIntent};

/// The entity an in-flight move belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MoveKey {
    Card(CardId),
    Board(BoardId),
}

impl fmt::Display for MoveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveKey::Card(id) => write!(f, "card {}", id.short()),
            MoveKey::Board(id) => write!(f, "board {}", id.short()),
        }
    }
}

/// Error from beginning an optimistic move.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// The entity already has a move awaiting acknowledgement. The caller
    /// waits for it to resolve (or cancels) before retrying.
    #[error("{0} already has a move awaiting acknowledgement")]
    MoveInFlight(MoveKey),

    /// The store rejected the optimistic mutation; nothing was changed and
    /// nothing is pending.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// What happened when a pending move resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Move confirmed; the snapshot was discarded. `refreshed` reports
    /// whether a parked peer refresh was applied afterwards.
    Committed { refreshed: bool },
    /// Move failed; the store was rolled back to the pre-move snapshot.
    RolledBack { refreshed: bool },
    /// No pending record for this entity — already resolved, or wiped by a
    /// wholesale rollback. Nothing changed.
    NotPending,
}

/// A move awaiting the backend's verdict.
struct PendingMove {
    /// Begin order, for restoring the oldest snapshot on wholesale rollback.
    seq: u64,
    snapshot: ItinerarySnapshot,
}

/// Confirm-or-rollback coordinator for optimistic moves.
#[derive(Default)]
pub struct Reconciler {
    pending: HashMap<MoveKey, PendingMove>,
    /// Authoritative document that arrived while moves were pending.
    /// Latest wins; applied when the last pending move resolves.
    queued_refresh: Option<Itinerary>,
    next_seq: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Begin
    // =========================================================================

    /// Apply a card move optimistically and register it as pending.
    pub fn begin_card_move(
        &mut self,
        itinerary: &mut Itinerary,
        intent: &MoveCardIntent,
    ) -> Result<(), ReconcileError> {
        self.begin(itinerary, MoveKey::Card(intent.card_id), |it| {
            it.move_card(
                intent.card_id,
                intent.from_board,
                intent.to_board,
                intent.to_index,
            )
        })
    }

    /// Apply a board move optimistically and register it as pending.
    pub fn begin_board_move(
        &mut self,
        itinerary: &mut Itinerary,
        intent: &MoveBoardIntent,
    ) -> Result<(), ReconcileError> {
        self.begin(itinerary, MoveKey::Board(intent.board_id), |it| {
            it.move_board(intent.board_id, intent.to_position)
        })
    }

    fn begin(
        &mut self,
        itinerary: &mut Itinerary,
        key: MoveKey,
        apply: impl FnOnce(&mut Itinerary) -> Result<(), ModelError>,
    ) -> Result<(), ReconcileError> {
        if self.pending.contains_key(&key) {
            return Err(ReconcileError::MoveInFlight(key));
        }

        let snapshot = itinerary.snapshot();
        // Store primitives validate before mutating, so an Err here means
        // the snapshot can simply be dropped — there is nothing to undo.
        apply(itinerary)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(key, PendingMove { seq, snapshot });
        trace!(%key, pending = self.pending.len(), "optimistic move applied");
        Ok(())
    }

    // =========================================================================
    // Resolve
    // =========================================================================

    /// The backend confirmed a card move.
    ///
    /// `requested` is the id the intent was sent with; the ack may carry a
    /// different, authoritative id (the backend recreates cards on some
    /// cross-board moves), which is folded into the store here.
    pub fn commit_card_move(
        &mut self,
        itinerary: &mut Itinerary,
        requested: CardId,
        ack: &MoveCardAck,
    ) -> Resolution {
        let key = MoveKey::Card(requested);
        if self.pending.remove(&key).is_none() {
            warn!(%key, "ack for a move that is not pending, ignoring");
            return Resolution::NotPending;
        }

        if ack.card_id != requested {
            if let Err(e) = itinerary.replace_card_id(requested, ack.card_id) {
                // The card may have been swept away by an interleaved
                // rollback of another entity; the next refetch settles it.
                warn!(%key, error = %e, "could not apply server-reassigned card id");
            }
        }

        info!(%key, "move committed");
        let refreshed = self.drain_refresh(itinerary);
        Resolution::Committed { refreshed }
    }

    /// The backend confirmed a board move.
    pub fn commit_board_move(
        &mut self,
        itinerary: &mut Itinerary,
        ack: &MoveBoardAck,
    ) -> Resolution {
        let key = MoveKey::Board(ack.board_id);
        if self.pending.remove(&key).is_none() {
            warn!(%key, "ack for a move that is not pending, ignoring");
            return Resolution::NotPending;
        }

        if let Some(board) = itinerary.board(ack.board_id) {
            if board.position != ack.position {
                // Positions diverged (a peer squeezed a move in); the
                // refetch signalled by that peer brings them back in line.
                warn!(
                    %key,
                    local = board.position,
                    server = ack.position,
                    "board position diverged from ack"
                );
            }
        }

        info!(%key, "move committed");
        let refreshed = self.drain_refresh(itinerary);
        Resolution::Committed { refreshed }
    }

    /// The backend rejected a move (or the ack timed out): restore the
    /// snapshot taken when it began.
    pub fn roll_back(&mut self, itinerary: &mut Itinerary, key: MoveKey) -> Resolution {
        let Some(record) = self.pending.remove(&key) else {
            warn!(%key, "rollback for a move that is not pending, ignoring");
            return Resolution::NotPending;
        };

        itinerary.restore(record.snapshot);
        info!(%key, "move rolled back");
        let refreshed = self.drain_refresh(itinerary);
        Resolution::RolledBack { refreshed }
    }

    /// Roll back every pending move at once (session teardown).
    ///
    /// Restores the *oldest* snapshot — it pre-dates every in-flight
    /// optimistic edit, so one swap erases them all. Returns how many
    /// moves were pending. The parked refresh is dropped with them; a
    /// closing session has no use for it.
    pub fn roll_back_all(&mut self, itinerary: &mut Itinerary) -> usize {
        let count = self.pending.len();
        if let Some((_, oldest)) = self
            .pending
            .drain()
            .min_by_key(|(_, record)| record.seq)
        {
            itinerary.restore(oldest.snapshot);
            info!(count, "rolled back all pending moves");
        }
        self.queued_refresh = None;
        count
    }

    // =========================================================================
    // Peer refreshes
    // =========================================================================

    /// An authoritative document arrived (triggered by a peer's change).
    ///
    /// Applied wholesale when nothing is pending; otherwise parked until
    /// the last pending move resolves. Returns whether it was applied now.
    pub fn apply_remote(&mut self, itinerary: &mut Itinerary, remote: Itinerary) -> bool {
        if self.pending.is_empty() {
            itinerary.replace_with(remote);
            info!("applied authoritative refresh");
            true
        } else {
            trace!(pending = self.pending.len(), "parking refresh behind pending moves");
            self.queued_refresh = Some(remote);
            false
        }
    }

    fn drain_refresh(&mut self, itinerary: &mut Itinerary) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        match self.queued_refresh.take() {
            Some(remote) => {
                itinerary.replace_with(remote);
                info!("applied parked refresh after last pending move resolved");
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: MoveKey) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn has_queued_refresh(&self) -> bool {
        self.queued_refresh.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_model::{Board, Card};
    use wayfare_types::{DayTime, ItineraryId};

    fn card_on(board_id: BoardId, start: &str, end: &str) -> Card {
        Card::new(
            board_id,
            DayTime::parse(start).unwrap(),
            DayTime::parse(end).unwrap(),
        )
    }

    /// A = [a1, a2], B = [b1].
    fn fixture() -> (Itinerary, BoardId, BoardId, CardId, CardId, CardId) {
        let a = BoardId::new();
        let b = BoardId::new();
        let a1 = card_on(a, "09:00", "10:00");
        let a2 = card_on(a, "10:30", "11:30");
        let b1 = card_on(b, "09:00", "10:00");
        let (a1_id, a2_id, b1_id) = (a1.id, a2.id, b1.id);
        let itinerary = Itinerary::from_parts(
            ItineraryId::new(),
            "Porto",
            vec![
                Board { id: a, position: 0, cards: vec![a1, a2] },
                Board { id: b, position: 0, cards: vec![b1] },
            ],
        )
        .unwrap();
        (itinerary, a, b, a1_id, a2_id, b1_id)
    }

    fn card_move(card_id: CardId, from: BoardId, to: BoardId, to_index: usize) -> MoveCardIntent {
        MoveCardIntent { card_id, from_board: from, to_board: to, to_index }
    }

    #[test]
    fn test_begin_applies_optimistically() {
        let (mut it, a, b, a1, ..) = fixture();
        let mut rec = Reconciler::new();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();

        assert_eq!(it.card(a1).unwrap().board_id, b);
        assert_eq!(rec.pending_count(), 1);
        assert!(rec.is_pending(MoveKey::Card(a1)));
    }

    #[test]
    fn test_second_move_same_card_rejected() {
        let (mut it, a, b, a1, ..) = fixture();
        let mut rec = Reconciler::new();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        let err = rec
            .begin_card_move(&mut it, &card_move(a1, b, a, 0))
            .unwrap_err();

        assert_eq!(err, ReconcileError::MoveInFlight(MoveKey::Card(a1)));
        // Exactly one pending record survives, and the second intent did
        // not move anything.
        assert_eq!(rec.pending_count(), 1);
        assert_eq!(it.card(a1).unwrap().board_id, b);
    }

    #[test]
    fn test_moves_on_distinct_entities_coexist() {
        let (mut it, a, b, a1, ..) = fixture();
        let mut rec = Reconciler::new();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        rec.begin_board_move(&mut it, &MoveBoardIntent { board_id: b, to_position: 1 })
            .unwrap();
        assert_eq!(rec.pending_count(), 2);
    }

    #[test]
    fn test_begin_with_stale_source_is_clean_rejection() {
        let (mut it, _, b, a1, ..) = fixture();
        let mut rec = Reconciler::new();
        let before = it.clone();

        // a1 is not on board B — stale-id race.
        let err = rec
            .begin_card_move(&mut it, &card_move(a1, b, b, 0))
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Model(ModelError::CardNotFound(id)) if id == a1));
        assert_eq!(it, before);
        assert_eq!(rec.pending_count(), 0);
    }

    #[test]
    fn test_commit_keeps_optimistic_state() {
        let (mut it, a, b, a1, ..) = fixture();
        let mut rec = Reconciler::new();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        let resolution = rec.commit_card_move(&mut it, a1, &MoveCardAck { card_id: a1 });

        assert_eq!(resolution, Resolution::Committed { refreshed: false });
        assert_eq!(rec.pending_count(), 0);
        assert_eq!(it.card(a1).unwrap().board_id, b);
    }

    #[test]
    fn test_commit_folds_in_reassigned_id() {
        let (mut it, a, b, a1, ..) = fixture();
        let mut rec = Reconciler::new();
        let server_id = CardId::new();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        rec.commit_card_move(&mut it, a1, &MoveCardAck { card_id: server_id });

        assert!(it.card(a1).is_none());
        let card = it.card(server_id).unwrap();
        assert_eq!(card.board_id, b);
        assert_eq!(card.order_index, 0);
    }

    #[test]
    fn test_rollback_restores_pre_move_state() {
        let (mut it, a, b, a1, ..) = fixture();
        let mut rec = Reconciler::new();
        let before = it.clone();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        assert_ne!(it, before);

        let resolution = rec.roll_back(&mut it, MoveKey::Card(a1));
        assert_eq!(resolution, Resolution::RolledBack { refreshed: false });
        assert_eq!(it, before);
        assert_eq!(it.check_invariants(), Ok(()));
    }

    #[test]
    fn test_resolve_unknown_key_is_not_pending() {
        let (mut it, .., b1) = fixture();
        let mut rec = Reconciler::new();
        assert_eq!(
            rec.commit_card_move(&mut it, b1, &MoveCardAck { card_id: b1 }),
            Resolution::NotPending
        );
        assert_eq!(rec.roll_back(&mut it, MoveKey::Card(b1)), Resolution::NotPending);
    }

    #[test]
    fn test_remote_applies_immediately_when_idle() {
        let (mut it, ..) = fixture();
        let (remote, ..) = fixture();
        let mut rec = Reconciler::new();

        assert!(rec.apply_remote(&mut it, remote.clone()));
        assert_eq!(it, remote);
    }

    #[test]
    fn test_remote_parks_behind_pending_and_drains_on_commit() {
        let (mut it, a, b, a1, ..) = fixture();
        let (remote, ..) = fixture();
        let mut rec = Reconciler::new();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        assert!(!rec.apply_remote(&mut it, remote.clone()));
        assert!(rec.has_queued_refresh());
        // The optimistic state is untouched by the parked refresh.
        assert_eq!(it.card(a1).unwrap().board_id, b);

        let resolution = rec.commit_card_move(&mut it, a1, &MoveCardAck { card_id: a1 });
        assert_eq!(resolution, Resolution::Committed { refreshed: true });
        assert!(!rec.has_queued_refresh());
        assert_eq!(it, remote);
    }

    #[test]
    fn test_parked_refresh_latest_wins() {
        let (mut it, a, b, a1, ..) = fixture();
        let (older, ..) = fixture();
        let (newer, ..) = fixture();
        let mut rec = Reconciler::new();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        rec.apply_remote(&mut it, older);
        rec.apply_remote(&mut it, newer.clone());

        rec.roll_back(&mut it, MoveKey::Card(a1));
        assert_eq!(it, newer);
    }

    #[test]
    fn test_refresh_waits_for_every_pending_move() {
        let (mut it, a, b, a1, ..) = fixture();
        let (remote, ..) = fixture();
        let mut rec = Reconciler::new();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        rec.begin_board_move(&mut it, &MoveBoardIntent { board_id: b, to_position: 1 })
            .unwrap();
        rec.apply_remote(&mut it, remote.clone());

        // First resolution leaves one move pending — still parked.
        let r1 = rec.commit_card_move(&mut it, a1, &MoveCardAck { card_id: a1 });
        assert_eq!(r1, Resolution::Committed { refreshed: false });
        assert!(rec.has_queued_refresh());

        let board_pos = it.board(b).unwrap().position;
        let r2 = rec.commit_board_move(
            &mut it,
            &MoveBoardAck { board_id: b, position: board_pos },
        );
        assert_eq!(r2, Resolution::Committed { refreshed: true });
        assert_eq!(it, remote);
    }

    #[test]
    fn test_roll_back_all_restores_pre_everything_state() {
        let (mut it, a, b, a1, _, b1) = fixture();
        let mut rec = Reconciler::new();
        let before = it.clone();

        rec.begin_card_move(&mut it, &card_move(a1, a, b, 0)).unwrap();
        rec.begin_card_move(&mut it, &card_move(b1, b, a, 0)).unwrap();
        let (remote, ..) = fixture();
        rec.apply_remote(&mut it, remote);

        let count = rec.roll_back_all(&mut it);
        assert_eq!(count, 2);
        assert_eq!(it, before);
        assert_eq!(rec.pending_count(), 0);
        assert!(!rec.has_queued_refresh());
    }

    #[test]
    fn test_roll_back_all_idle_is_noop() {
        let (mut it, ..) = fixture();
        let before = it.clone();
        let mut rec = Reconciler::new();
        assert_eq!(rec.roll_back_all(&mut it), 0);
        assert_eq!(it, before);
    }
}
