//! End-to-end session tests over an in-memory connection.
//!
//! `FakeConnection` plays the connection service: it hands out a scripted
//! document, answers move intents from a scripted queue (confirm, fail, or
//! hang), and lets tests push room events the way a server would.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use wayfare_client::{
    CollaborationSession, Connection, ConnectionError, ItineraryState, MoveBoardAck,
    MoveBoardIntent, MoveCardAck, MoveCardIntent, MoveKey, ReconcileError, RoomEvent,
    SessionError, SessionEvent,
};
use wayfare_model::{Board, Card};
use wayfare_types::{BoardId, CardId, DayTime, ItineraryId, UserId, UserInfo};

// ============================================================================
// Fake connection
// ============================================================================

/// Scripted answer for one move intent.
enum Script<T> {
    Confirm(T),
    Fail(ConnectionError),
    /// Never answer; the session's own deadline has to fire.
    Hang,
}

struct FakeConnection {
    room: broadcast::Sender<RoomEvent>,
    state: Mutex<ItineraryState>,
    card_acks: Mutex<VecDeque<Script<MoveCardAck>>>,
    board_acks: Mutex<VecDeque<Script<MoveBoardAck>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeConnection {
    fn new(state: ItineraryState) -> Arc<Self> {
        let (room, _) = broadcast::channel(64);
        Arc::new(Self {
            room,
            state: Mutex::new(state),
            card_acks: Mutex::new(VecDeque::new()),
            board_acks: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn push_event(&self, event: RoomEvent) {
        self.room.send(event).expect("session subscribed");
    }

    fn set_state(&self, state: ItineraryState) {
        *self.state.lock() = state;
    }

    fn script_card(&self, script: Script<MoveCardAck>) {
        self.card_acks.lock().push_back(script);
    }

    fn calls(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == name).count()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().push(name);
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn join_room(
        &self,
        _itinerary_id: ItineraryId,
    ) -> Result<ItineraryState, ConnectionError> {
        self.record("join_room");
        Ok(self.state.lock().clone())
    }

    async fn leave_room(&self) -> Result<(), ConnectionError> {
        self.record("leave_room");
        Ok(())
    }

    async fn move_card(&self, intent: MoveCardIntent) -> Result<MoveCardAck, ConnectionError> {
        self.record("move_card");
        let script = self.card_acks.lock().pop_front();
        match script {
            None => Ok(MoveCardAck { card_id: intent.card_id }),
            Some(Script::Confirm(ack)) => Ok(ack),
            Some(Script::Fail(e)) => Err(e),
            Some(Script::Hang) => futures::future::pending().await,
        }
    }

    async fn move_board(
        &self,
        intent: MoveBoardIntent,
    ) -> Result<MoveBoardAck, ConnectionError> {
        self.record("move_board");
        let script = self.board_acks.lock().pop_front();
        match script {
            None => Ok(MoveBoardAck {
                board_id: intent.board_id,
                position: intent.to_position,
            }),
            Some(Script::Confirm(ack)) => Ok(ack),
            Some(Script::Fail(e)) => Err(e),
            Some(Script::Hang) => futures::future::pending().await,
        }
    }

    async fn start_editing(&self, _card_id: CardId) -> Result<(), ConnectionError> {
        self.record("start_editing");
        Ok(())
    }

    async fn end_editing(&self, _card_id: CardId) -> Result<(), ConnectionError> {
        self.record("end_editing");
        Ok(())
    }

    async fn fetch_itinerary(&self) -> Result<ItineraryState, ConnectionError> {
        self.record("fetch_itinerary");
        Ok(self.state.lock().clone())
    }

    async fn signal_changed(&self) -> Result<(), ConnectionError> {
        self.record("signal_changed");
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent> {
        self.room.subscribe()
    }
}

// ============================================================================
// Fixtures & helpers
// ============================================================================

fn card_on(board_id: BoardId, start: &str, end: &str) -> Card {
    Card::new(
        board_id,
        DayTime::parse(start).unwrap(),
        DayTime::parse(end).unwrap(),
    )
}

/// Day 1 = [a1 09:00–10:00, a2 10:30–11:30], day 2 = [b1 09:30–10:30].
struct Fixture {
    state: ItineraryState,
    day1: BoardId,
    day2: BoardId,
    a1: CardId,
    a2: CardId,
    b1: CardId,
}

fn fixture() -> Fixture {
    let day1 = BoardId::new();
    let day2 = BoardId::new();
    let a1 = card_on(day1, "09:00", "10:00");
    let a2 = card_on(day1, "10:30", "11:30");
    let b1 = card_on(day2, "09:30", "10:30");
    let (a1_id, a2_id, b1_id) = (a1.id, a2.id, b1.id);
    Fixture {
        state: ItineraryState {
            id: ItineraryId::new(),
            title: "Lisbon long weekend".into(),
            boards: vec![
                Board { id: day1, position: 0, cards: vec![a1, a2] },
                Board { id: day2, position: 0, cards: vec![b1] },
            ],
        },
        day1,
        day2,
        a1: a1_id,
        a2: a2_id,
        b1: b1_id,
    }
}

async fn join(fx: &Fixture) -> (Arc<FakeConnection>, CollaborationSession) {
    let connection = FakeConnection::new(fx.state.clone());
    let session = CollaborationSession::join(connection.clone(), fx.state.id)
        .await
        .expect("join");
    (connection, session)
}

/// Wait (generously) for the first event matching `pred`. Under paused
/// time the deadline only fires if it is the earliest timer, so it stays
/// far above ACK_TIMEOUT.
async fn wait_for(
    rx: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = rx.recv().await.expect("session event stream open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn join_exposes_initial_document() {
    let fx = fixture();
    let (_connection, session) = join(&fx).await;

    let itinerary = session.itinerary().unwrap();
    assert_eq!(itinerary.title(), "Lisbon long weekend");
    assert_eq!(itinerary.board_count(), 2);
    assert_eq!(itinerary.board(fx.day1).unwrap().position, 1);

    assert!(!session.overlap_report().unwrap().has_any());
    assert!(session.participants().unwrap().is_empty());
}

#[tokio::test]
async fn leave_closes_the_session() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;

    session.leave().await.unwrap();
    assert_eq!(connection.calls("leave_room"), 1);

    assert!(matches!(session.itinerary(), Err(SessionError::Closed)));
    assert!(matches!(
        session.request_move_card(fx.a1, fx.day1, fx.day2, 0),
        Err(SessionError::Closed)
    ));
    assert!(matches!(session.subscribe(), Err(SessionError::Closed)));
    assert!(matches!(session.leave().await, Err(SessionError::Closed)));
}

#[tokio::test]
async fn leave_with_pending_move_rolls_back_silently() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;
    connection.script_card(Script::Hang);

    session.request_move_card(fx.a1, fx.day1, fx.day2, 0).unwrap();
    session.leave().await.unwrap();

    // The hung ack can never resolve against the closed session; no
    // change signal must ever go out for it.
    assert_eq!(connection.calls("signal_changed"), 0);
}

// ============================================================================
// Optimistic moves
// ============================================================================

#[tokio::test]
async fn move_commits_and_signals_peers() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;
    let mut rx = session.subscribe().unwrap();

    session.request_move_card(fx.a1, fx.day1, fx.day2, 0).unwrap();

    // Optimistic: visible before any ack round trip completes.
    let itinerary = session.itinerary().unwrap();
    assert_eq!(itinerary.card(fx.a1).unwrap().board_id, fx.day2);

    let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::MoveCommitted { .. })).await;
    match event {
        SessionEvent::MoveCommitted { key } => assert_eq!(key, MoveKey::Card(fx.a1)),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(connection.calls("move_card"), 1);
    assert_eq!(connection.calls("signal_changed"), 1);
}

#[tokio::test]
async fn failed_move_reverts_the_document() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;
    let mut rx = session.subscribe().unwrap();
    let before = session.itinerary().unwrap();

    connection.script_card(Script::Fail(ConnectionError::Network("boom".into())));
    session.request_move_card(fx.a1, fx.day1, fx.day2, 0).unwrap();

    let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::MoveFailed { .. })).await;
    match event {
        SessionEvent::MoveFailed { key, error } => {
            assert_eq!(key, MoveKey::Card(fx.a1));
            assert_eq!(error, ConnectionError::Network("boom".into()));
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert_eq!(session.itinerary().unwrap(), before);
    assert_eq!(connection.calls("signal_changed"), 0);
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_move_times_out_and_reverts() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;
    let mut rx = session.subscribe().unwrap();
    let before = session.itinerary().unwrap();

    connection.script_card(Script::Hang);
    session.request_move_card(fx.a1, fx.day1, fx.day2, 0).unwrap();

    let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::MoveFailed { .. })).await;
    match event {
        SessionEvent::MoveFailed { error, .. } => {
            assert!(matches!(error, ConnectionError::AckTimeout(_)));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(session.itinerary().unwrap(), before);
}

#[tokio::test]
async fn second_move_of_same_card_is_rejected_while_pending() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;
    connection.script_card(Script::Hang);

    session.request_move_card(fx.a1, fx.day1, fx.day2, 0).unwrap();
    let err = session
        .request_move_card(fx.a1, fx.day2, fx.day1, 0)
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Reconcile(ReconcileError::MoveInFlight(MoveKey::Card(id))) if id == fx.a1
    ));
    // The rejected intent never reached the wire.
    assert_eq!(connection.calls("move_card"), 1);

    session.leave().await.unwrap();
}

#[tokio::test]
async fn server_reassigned_card_id_is_folded_in() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;
    let mut rx = session.subscribe().unwrap();

    let server_id = CardId::new();
    connection.script_card(Script::Confirm(MoveCardAck { card_id: server_id }));
    session.request_move_card(fx.a1, fx.day1, fx.day2, 0).unwrap();

    wait_for(&mut rx, |e| matches!(e, SessionEvent::MoveCommitted { .. })).await;

    let itinerary = session.itinerary().unwrap();
    assert!(itinerary.card(fx.a1).is_none());
    let card = itinerary.card(server_id).unwrap();
    assert_eq!(card.board_id, fx.day2);
    assert_eq!(card.order_index, 0);
}

#[tokio::test]
async fn board_move_commits() {
    let fx = fixture();
    let (_connection, session) = join(&fx).await;
    let mut rx = session.subscribe().unwrap();

    session.request_move_board(fx.day2, 1).unwrap();
    let order: Vec<BoardId> = session.itinerary().unwrap().boards().map(|b| b.id).collect();
    assert_eq!(order, vec![fx.day2, fx.day1]);

    let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::MoveCommitted { .. })).await;
    match event {
        SessionEvent::MoveCommitted { key } => assert_eq!(key, MoveKey::Board(fx.day2)),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn moving_cards_together_raises_a_conflict() {
    let fx = fixture();
    let (_connection, session) = join(&fx).await;
    let mut rx = session.subscribe().unwrap();

    // b1 (09:30–10:30) onto day 1 next to a1 (09:00–10:00): overlap.
    session.request_move_card(fx.b1, fx.day2, fx.day1, 0).unwrap();

    let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::OverlapChanged(_))).await;
    let SessionEvent::OverlapChanged(report) = event else { unreachable!() };
    assert_eq!(report.boards_with_overlap, vec![fx.day1]);
    let flagged = &report.board(fx.day1).unwrap().overlapping;
    assert!(flagged.contains(&fx.a1) && flagged.contains(&fx.b1));
    assert!(!flagged.contains(&fx.a2));

    assert_eq!(session.overlap_report().unwrap(), report);
}

// ============================================================================
// Peer refreshes
// ============================================================================

#[tokio::test]
async fn peer_change_triggers_refetch_and_replace() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;
    let mut rx = session.subscribe().unwrap();

    // A peer reordered the days; the server now returns day2 first.
    let mut reordered = fx.state.clone();
    reordered.boards.swap(0, 1);
    connection.set_state(reordered);
    connection.push_event(RoomEvent::RefetchRequested);

    wait_for(&mut rx, |e| matches!(e, SessionEvent::Refreshed)).await;

    let order: Vec<BoardId> = session.itinerary().unwrap().boards().map(|b| b.id).collect();
    assert_eq!(order, vec![fx.day2, fx.day1]);
    assert_eq!(connection.calls("fetch_itinerary"), 1);
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn presence_and_soft_locks_flow_through() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;
    let mut rx = session.subscribe().unwrap();

    let ana = UserInfo::new(UserId::new(), "Ana");
    let bo = UserInfo::new(UserId::new(), "Bo");

    connection.push_event(RoomEvent::UserList { users: vec![ana.clone(), bo.clone()] });
    wait_for(&mut rx, |e| matches!(e, SessionEvent::PresenceChanged)).await;
    assert_eq!(session.participants().unwrap().len(), 2);

    connection.push_event(RoomEvent::CardEditingStarted {
        card_id: fx.a1,
        user: ana.clone(),
        timestamp: 1,
    });
    wait_for(&mut rx, |e| matches!(e, SessionEvent::PresenceChanged)).await;
    let editor = session.editing_user(fx.a1).unwrap().expect("lock present");
    assert_eq!(editor.user_id, ana.id);
    assert_eq!(session.edit_locks().unwrap().len(), 1);

    // Ana disconnects while holding the lock: no stuck indicator.
    connection.push_event(RoomEvent::UserLeft { user: ana.clone() });
    wait_for(&mut rx, |e| matches!(e, SessionEvent::PresenceChanged)).await;
    assert!(session.editing_user(fx.a1).unwrap().is_none());
    assert_eq!(session.participants().unwrap().len(), 1);
}

#[tokio::test]
async fn local_edit_lock_intents_reach_the_wire() {
    let fx = fixture();
    let (connection, session) = join(&fx).await;

    session.begin_editing(fx.a1).await.unwrap();
    session.end_editing(fx.a1).await.unwrap();

    assert_eq!(connection.calls("start_editing"), 1);
    assert_eq!(connection.calls("end_editing"), 1);
}
