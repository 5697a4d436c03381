//! The collaboration session — public façade of the sync core.
//!
//! One [`CollaborationSession`] owns everything for one open itinerary: the
//! store, the reconciler, the presence registry, and the connection to the
//! room. The UI calls the request methods (which apply optimistically and
//! return at once), subscribes to [`SessionEvent`]s for everything that
//! happens asynchronously, and reads current state through the accessors.
//!
//! ```text
//!   UI intent ──▶ CollaborationSession ──▶ Reconciler ──▶ Itinerary
//!                      │    ▲                   │
//!                      │    │ SessionEvent      │ intent / ack (spawned task)
//!                      ▼    │                   ▼
//!                  subscribers            Connection ◀── room events (pump)
//! ```
//!
//! # Concurrency
//!
//! State lives behind one `parking_lot::Mutex` shared by the façade, the
//! per-move ack tasks, and the inbound event pump. Critical sections are
//! short and never held across an await, so the session behaves as the
//! single logical thread the data structures assume.
//!
//! After [`leave`](CollaborationSession::leave), every method fails fast
//! with [`SessionError::Closed`] — nothing can reach the connection once
//! the session has torn down, and no optimistic state survives it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wayfare_model::{itinerary_overlap, Itinerary, ModelError, OverlapReport};
use wayfare_types::{BoardId, CardId, EditLock, EditingUser, ItineraryId};

use crate::connection::{Connection, ConnectionError};
use crate::constants::{ACK_TIMEOUT, LEAVE_TIMEOUT, SESSION_EVENT_BUFFER};
use crate::events::{MoveBoardIntent, MoveCardAck, MoveBoardAck, MoveCardIntent, RoomEvent};
use crate::presence::{Participant, PresenceRegistry};
use crate::reconcile::{MoveKey, Reconciler, ReconcileError, Resolution};

// ============================================================================
// Events & errors
// ============================================================================

/// Asynchronous outcomes pushed to session subscribers.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// An optimistic move was confirmed by the backend.
    MoveCommitted { key: MoveKey },
    /// A move failed (or timed out) and the itinerary was reverted.
    MoveFailed { key: MoveKey, error: ConnectionError },
    /// The itinerary was replaced by an authoritative refetch.
    Refreshed,
    /// Roster or edit-lock state changed.
    PresenceChanged,
    /// The schedule-conflict report changed.
    OverlapChanged(OverlapReport),
    /// The transport dropped; it reconnects on its own, this is
    /// informational for the UI.
    Disconnected { reason: String },
}

/// Errors surfaced by session methods.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session has been left. Programming error — tear down the handle.
    #[error("session is closed")]
    Closed,

    /// A move could not begin (entity busy, or the store rejected it).
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// The backend sent a document payload the model rejects.
    #[error("malformed itinerary payload: {0}")]
    Payload(#[source] ModelError),

    /// The connection failed while this call was waiting on it.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

// ============================================================================
// Session
// ============================================================================

struct SessionState {
    itinerary: Itinerary,
    reconciler: Reconciler,
    presence: PresenceRegistry,
    overlap: OverlapReport,
}

impl SessionState {
    /// Recompute the conflict report. Returns the new report if it changed.
    fn recompute_overlap(&mut self) -> Option<OverlapReport> {
        let report = itinerary_overlap(&self.itinerary);
        if report == self.overlap {
            None
        } else {
            self.overlap = report.clone();
            Some(report)
        }
    }
}

struct SessionInner {
    connection: Arc<dyn Connection>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    closed: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Live handle to one open shared itinerary. Clone freely — all clones
/// address the same session.
#[derive(Clone)]
pub struct CollaborationSession {
    inner: Arc<SessionInner>,
}

impl CollaborationSession {
    /// Join a room: the one entry point that performs network I/O inline.
    ///
    /// Fetches the initial document, then starts consuming room events.
    /// Must be called on a tokio runtime — the session spawns its event
    /// pump and one short-lived task per move.
    pub async fn join(
        connection: Arc<dyn Connection>,
        itinerary_id: ItineraryId,
    ) -> Result<Self, SessionError> {
        let payload = connection.join_room(itinerary_id).await?;
        let itinerary = payload.into_itinerary().map_err(SessionError::Payload)?;
        let overlap = itinerary_overlap(&itinerary);

        let (events, _) = broadcast::channel(SESSION_EVENT_BUFFER);
        let inner = Arc::new(SessionInner {
            connection: connection.clone(),
            state: Mutex::new(SessionState {
                itinerary,
                reconciler: Reconciler::new(),
                presence: PresenceRegistry::new(),
                overlap,
            }),
            events,
            closed: AtomicBool::new(false),
            pump: Mutex::new(None),
        });

        let rx = connection.subscribe_events();
        let pump = tokio::spawn(pump_events(Arc::downgrade(&inner), rx));
        *inner.pump.lock() = Some(pump);

        info!(itinerary = %itinerary_id, "joined room");
        Ok(Self { inner })
    }

    /// Leave the room. Rolls back every pending optimistic move, stops the
    /// event pump, and sends a best-effort departure notification bounded
    /// by [`LEAVE_TIMEOUT`] — teardown never hangs on a dead connection.
    pub async fn leave(&self) -> Result<(), SessionError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }

        // Stop the pump first so no peer event mutates state mid-teardown.
        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }

        {
            let mut state = self.inner.state.lock();
            let SessionState { itinerary, reconciler, .. } = &mut *state;
            let rolled_back = reconciler.roll_back_all(itinerary);
            if rolled_back > 0 {
                info!(rolled_back, "rolled back pending moves on leave");
            }
        }

        match tokio::time::timeout(LEAVE_TIMEOUT, self.inner.connection.leave_room()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "leave notification failed"),
            Err(_) => warn!("leave notification timed out"),
        }
        info!("left room");
        Ok(())
    }

    // =========================================================================
    // Optimistic move requests
    // =========================================================================

    /// Move a card. Applies locally at once; the backend's verdict arrives
    /// later as [`SessionEvent::MoveCommitted`] or
    /// [`SessionEvent::MoveFailed`] (with the store already reverted).
    pub fn request_move_card(
        &self,
        card_id: CardId,
        from_board: BoardId,
        to_board: BoardId,
        to_index: usize,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let intent = MoveCardIntent { card_id, from_board, to_board, to_index };

        let overlap = {
            let mut state = self.inner.state.lock();
            let SessionState { itinerary, reconciler, .. } = &mut *state;
            if let Err(e) = reconciler.begin_card_move(itinerary, &intent) {
                warn!(card = %card_id.short(), error = %e, "move request rejected");
                return Err(e.into());
            }
            state.recompute_overlap()
        };
        self.broadcast_overlap(overlap);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = await_ack(inner.connection.move_card(intent.clone())).await;
            inner.finish_card_move(intent, outcome).await;
        });
        Ok(())
    }

    /// Move a board. Same optimistic contract as
    /// [`request_move_card`](Self::request_move_card).
    pub fn request_move_board(
        &self,
        board_id: BoardId,
        to_position: u32,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let intent = MoveBoardIntent { board_id, to_position };

        let overlap = {
            let mut state = self.inner.state.lock();
            let SessionState { itinerary, reconciler, .. } = &mut *state;
            if let Err(e) = reconciler.begin_board_move(itinerary, &intent) {
                warn!(board = %board_id.short(), error = %e, "move request rejected");
                return Err(e.into());
            }
            // Per-board conflicts are untouched by reordering days, but the
            // report lists boards in canonical order, so it still shifts.
            state.recompute_overlap()
        };
        self.broadcast_overlap(overlap);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = await_ack(inner.connection.move_board(intent.clone())).await;
            inner.finish_board_move(intent, outcome).await;
        });
        Ok(())
    }

    // =========================================================================
    // Soft edit locks
    // =========================================================================

    /// Announce that the local user started editing a card.
    pub async fn begin_editing(&self, card_id: CardId) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.inner.connection.start_editing(card_id).await?;
        Ok(())
    }

    /// Announce that the local user stopped editing a card.
    pub async fn end_editing(&self, card_id: CardId) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.inner.connection.end_editing(card_id).await?;
        Ok(())
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Current itinerary. Cheap clone — board storage is shared until
    /// someone mutates.
    pub fn itinerary(&self) -> Result<Itinerary, SessionError> {
        self.ensure_open()?;
        Ok(self.inner.state.lock().itinerary.clone())
    }

    /// Current schedule-conflict report.
    pub fn overlap_report(&self) -> Result<OverlapReport, SessionError> {
        self.ensure_open()?;
        Ok(self.inner.state.lock().overlap.clone())
    }

    /// Remote users present in the room, in roster order.
    pub fn participants(&self) -> Result<Vec<Participant>, SessionError> {
        self.ensure_open()?;
        Ok(self.inner.state.lock().presence.participants().to_vec())
    }

    /// Who is editing `card_id`, if anyone.
    pub fn editing_user(&self, card_id: CardId) -> Result<Option<EditingUser>, SessionError> {
        self.ensure_open()?;
        Ok(self.inner.state.lock().presence.editing_user(card_id).cloned())
    }

    /// All current soft locks.
    pub fn edit_locks(&self) -> Result<Vec<EditLock>, SessionError> {
        self.ensure_open()?;
        Ok(self.inner.state.lock().presence.edit_locks())
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<SessionEvent>, SessionError> {
        self.ensure_open()?;
        Ok(self.inner.events.subscribe())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn broadcast_overlap(&self, overlap: Option<OverlapReport>) {
        if let Some(report) = overlap {
            self.inner.broadcast(SessionEvent::OverlapChanged(report));
        }
    }
}

/// Await a backend acknowledgement, converting a blown deadline into
/// [`ConnectionError::AckTimeout`].
async fn await_ack<T>(
    fut: impl std::future::Future<Output = Result<T, ConnectionError>>,
) -> Result<T, ConnectionError> {
    match tokio::time::timeout(ACK_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::AckTimeout(ACK_TIMEOUT)),
    }
}

impl SessionInner {
    fn broadcast(&self, event: SessionEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    /// Resolve a card move: commit (folding in server ids) or roll back.
    async fn finish_card_move(
        &self,
        intent: MoveCardIntent,
        outcome: Result<MoveCardAck, ConnectionError>,
    ) {
        let key = MoveKey::Card(intent.card_id);
        let mut committed = false;
        let mut out = Vec::new();
        {
            let mut state = self.state.lock();
            let SessionState { itinerary, reconciler, .. } = &mut *state;
            let resolution = match outcome {
                Ok(ack) => {
                    let r = reconciler.commit_card_move(itinerary, intent.card_id, &ack);
                    if !matches!(r, Resolution::NotPending) {
                        committed = true;
                        out.push(SessionEvent::MoveCommitted { key });
                    }
                    r
                }
                Err(error) => {
                    let r = reconciler.roll_back(itinerary, key);
                    if !matches!(r, Resolution::NotPending) {
                        out.push(SessionEvent::MoveFailed { key, error });
                    }
                    r
                }
            };
            if resolution_applied_refresh(resolution) {
                out.push(SessionEvent::Refreshed);
            }
            if let Some(report) = state.recompute_overlap() {
                out.push(SessionEvent::OverlapChanged(report));
            }
        }
        for event in out {
            self.broadcast(event);
        }

        if committed && !self.closed.load(Ordering::SeqCst) {
            // Peers pull full state on this signal; we never diff-and-send.
            if let Err(e) = self.connection.signal_changed().await {
                warn!(error = %e, "change signal failed; peers will catch up on next fetch");
            }
        }
    }

    /// Resolve a board move.
    async fn finish_board_move(
        &self,
        intent: MoveBoardIntent,
        outcome: Result<MoveBoardAck, ConnectionError>,
    ) {
        let key = MoveKey::Board(intent.board_id);
        let mut committed = false;
        let mut out = Vec::new();
        {
            let mut state = self.state.lock();
            let SessionState { itinerary, reconciler, .. } = &mut *state;
            let resolution = match outcome {
                Ok(ack) => {
                    let r = reconciler.commit_board_move(itinerary, &ack);
                    if !matches!(r, Resolution::NotPending) {
                        committed = true;
                        out.push(SessionEvent::MoveCommitted { key });
                    }
                    r
                }
                Err(error) => {
                    let r = reconciler.roll_back(itinerary, key);
                    if !matches!(r, Resolution::NotPending) {
                        out.push(SessionEvent::MoveFailed { key, error });
                    }
                    r
                }
            };
            if resolution_applied_refresh(resolution) {
                out.push(SessionEvent::Refreshed);
            }
            if let Some(report) = state.recompute_overlap() {
                out.push(SessionEvent::OverlapChanged(report));
            }
        }
        for event in out {
            self.broadcast(event);
        }

        if committed && !self.closed.load(Ordering::SeqCst) {
            if let Err(e) = self.connection.signal_changed().await {
                warn!(error = %e, "change signal failed; peers will catch up on next fetch");
            }
        }
    }

    /// Dispatch one inbound room event.
    async fn handle_room_event(&self, event: RoomEvent) {
        // Presence is best-effort: events for a room we have already left
        // are dropped, never an error.
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        match event {
            RoomEvent::Connected => {
                debug!("connection (re)established");
            }
            RoomEvent::Disconnected { reason } => {
                warn!(%reason, "connection dropped");
                self.broadcast(SessionEvent::Disconnected { reason });
            }
            RoomEvent::UserJoined { user } => {
                self.state.lock().presence.user_joined(user);
                self.broadcast(SessionEvent::PresenceChanged);
            }
            RoomEvent::UserLeft { user } => {
                self.state.lock().presence.user_left(user.id);
                self.broadcast(SessionEvent::PresenceChanged);
            }
            RoomEvent::UserList { users } => {
                self.state.lock().presence.apply_roster(users);
                self.broadcast(SessionEvent::PresenceChanged);
            }
            RoomEvent::CardEditingStarted { card_id, user, .. } => {
                self.state.lock().presence.start_editing(card_id, user);
                self.broadcast(SessionEvent::PresenceChanged);
            }
            RoomEvent::CardEditingEnded { card_id, user_id, .. } => {
                self.state.lock().presence.end_editing(card_id, user_id);
                self.broadcast(SessionEvent::PresenceChanged);
            }
            RoomEvent::RefetchRequested => {
                self.refetch().await;
            }
        }
    }

    /// Pull the authoritative document and hand it to the reconciler.
    async fn refetch(&self) {
        let payload = match self.connection.fetch_itinerary().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "refetch failed; keeping local state");
                return;
            }
        };
        let remote = match payload.into_itinerary() {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "refetch payload malformed; keeping local state");
                return;
            }
        };

        let mut out = Vec::new();
        {
            let mut state = self.state.lock();
            let SessionState { itinerary, reconciler, .. } = &mut *state;
            if reconciler.apply_remote(itinerary, remote) {
                out.push(SessionEvent::Refreshed);
                if let Some(report) = state.recompute_overlap() {
                    out.push(SessionEvent::OverlapChanged(report));
                }
            }
        }
        for event in out {
            self.broadcast(event);
        }
    }
}

fn resolution_applied_refresh(resolution: Resolution) -> bool {
    matches!(
        resolution,
        Resolution::Committed { refreshed: true } | Resolution::RolledBack { refreshed: true }
    )
}

/// Consume room events until the stream closes or the session is dropped.
///
/// Holds only a weak reference — a session abandoned without `leave()` is
/// freed as soon as the last strong handle goes, and the pump exits on its
/// next event.
async fn pump_events(
    inner: std::sync::Weak<SessionInner>,
    mut rx: broadcast::Receiver<RoomEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Some(inner) = inner.upgrade() else { break };
                inner.handle_room_event(event).await;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "room event stream lagged; refetching to resync");
                let Some(inner) = inner.upgrade() else { break };
                inner.refetch().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("room event stream closed; pump exiting");
}
