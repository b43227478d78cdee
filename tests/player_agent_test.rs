//! Tests for the player agent's reactions to coordinator notices.

use strictly_relay::testing::{Recorded, RecordingSink, ScriptedMoveSource};
use strictly_relay::{
    Address, AgentFlow, AgentState, Board, Envelope, Marker, MemoryBroker, Message,
    MessageChannel, PlayerAgent, Subscription,
};

struct Harness {
    agent: PlayerAgent<MemoryBroker>,
    coordinator: Subscription,
    sink: RecordingSink,
    _replies: Subscription,
}

async fn harness(script: &[&str]) -> Harness {
    let broker = MemoryBroker::new();
    let queue = Address::new("game_queue");
    let sink = RecordingSink::new();
    let mut agent = PlayerAgent::new(
        broker.clone(),
        queue.clone(),
        queue.clone(),
        Box::new(ScriptedMoveSource::new(script.iter().copied())),
        Box::new(sink.clone()),
    );
    let replies = agent.register().await.unwrap();
    let mut coordinator = broker.subscribe(&queue).await.unwrap();

    let delivery = coordinator.next().await.unwrap();
    assert!(matches!(delivery.envelope.message, Message::Register(_)));
    coordinator.ack(delivery.tag).await.unwrap();

    Harness {
        agent,
        coordinator,
        sink,
        _replies: replies,
    }
}

async fn start(h: &mut Harness) {
    let flow = h
        .agent
        .handle(Envelope::new(Message::Start {
            player_id: "player1".into(),
            marker: Marker::X,
        }))
        .await
        .unwrap();
    assert_eq!(flow, AgentFlow::Continue);
}

async fn next_move(h: &mut Harness) -> Envelope {
    let delivery = h.coordinator.next().await.unwrap();
    h.coordinator.ack(delivery.tag).await.unwrap();
    delivery.envelope
}

#[tokio::test]
async fn test_start_activates_agent() {
    let mut h = harness(&[]).await;
    assert_eq!(h.agent.state(), AgentState::Registering);
    start(&mut h).await;

    assert_eq!(h.agent.state(), AgentState::Active);
    assert_eq!(h.agent.player_id(), Some("player1"));
    assert_eq!(h.agent.marker(), Some(Marker::X));
    assert_eq!(
        h.sink.events().first(),
        Some(&Recorded::Started {
            player_id: "player1".into(),
            marker: Marker::X
        })
    );
}

#[tokio::test]
async fn test_turn_sends_move_with_player_header() {
    let mut h = harness(&["4"]).await;
    start(&mut h).await;
    h.agent.handle(Message::Turn.into()).await.unwrap();

    let envelope = next_move(&mut h).await;
    assert_eq!(envelope.player_id.as_deref(), Some("player1"));
    assert_eq!(envelope.message, Message::move_to(4));
    assert_eq!(h.agent.turns(), 1);
}

#[tokio::test]
async fn test_malformed_input_is_asked_again_locally() {
    let mut h = harness(&["nine", "12", " 7 "]).await;
    start(&mut h).await;
    h.agent.handle(Message::Turn.into()).await.unwrap();

    assert_eq!(next_move(&mut h).await.message, Message::move_to(7));
    let bad: Vec<_> = h
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, Recorded::BadInput(_)))
        .collect();
    assert_eq!(bad.len(), 2);
}

#[tokio::test]
async fn test_invalid_move_triggers_retry_without_counting_a_turn() {
    let mut h = harness(&["4", "5"]).await;
    start(&mut h).await;
    h.agent.handle(Message::Turn.into()).await.unwrap();
    next_move(&mut h).await;

    h.agent.handle(Message::InvalidMove.into()).await.unwrap();
    assert_eq!(next_move(&mut h).await.message, Message::move_to(5));
    assert_eq!(h.agent.turns(), 1);
    assert!(h.sink.events().contains(&Recorded::Rejected));
}

#[tokio::test]
async fn test_duplicate_invalid_move_is_ignored() {
    let mut h = harness(&["4", "5"]).await;
    start(&mut h).await;
    h.agent.handle(Message::Turn.into()).await.unwrap();
    next_move(&mut h).await;
    h.agent.handle(Message::InvalidMove.into()).await.unwrap();
    next_move(&mut h).await;

    // Verdict for the retried move arrives, then a stale duplicate.
    h.agent
        .handle(Message::BoardState("     X   ".into()).into())
        .await
        .unwrap();
    h.agent.handle(Message::InvalidMove.into()).await.unwrap();

    // Script has no inputs left; a retry would have failed.
    assert_eq!(h.agent.state(), AgentState::Active);
}

#[tokio::test]
async fn test_identical_board_state_is_not_rerendered() {
    let mut h = harness(&[]).await;
    start(&mut h).await;
    let renders = h.sink.board_renders();

    let push = Message::BoardState("    X    ".into());
    h.agent.handle(push.clone().into()).await.unwrap();
    h.agent.handle(push.into()).await.unwrap();

    assert_eq!(h.sink.board_renders(), renders + 1);
    assert_eq!(h.agent.board().to_wire_string(), "    X    ");
}

#[tokio::test]
async fn test_malformed_board_state_is_discarded() {
    let mut h = harness(&[]).await;
    start(&mut h).await;
    h.agent
        .handle(Message::BoardState("    X    ".into()).into())
        .await
        .unwrap();

    for bad in ["XO", "    Z    ", "XXXXXXXXXX"] {
        let flow = h
            .agent
            .handle(Message::BoardState(bad.into()).into())
            .await
            .unwrap();
        assert_eq!(flow, AgentFlow::Continue);
    }
    assert_eq!(h.agent.board().to_wire_string(), "    X    ");
}

#[tokio::test]
async fn test_end_closes_agent() {
    let mut h = harness(&[]).await;
    start(&mut h).await;
    let flow = h
        .agent
        .handle(Message::End("player2 wins".into()).into())
        .await
        .unwrap();

    assert_eq!(flow, AgentFlow::Closed("player2 wins".into()));
    assert_eq!(h.agent.state(), AgentState::Closed);
    assert_eq!(h.sink.result().as_deref(), Some("player2 wins"));

    let renders = h.sink.board_renders();
    h.agent
        .handle(Message::BoardState("XXXXXXXXX".into()).into())
        .await
        .unwrap();
    assert_eq!(h.sink.board_renders(), renders);
    assert_eq!(h.agent.board(), &Board::new());
}

#[tokio::test]
async fn test_rejected_registration_closes_agent() {
    let mut h = harness(&[]).await;
    let flow = h
        .agent
        .handle(Message::Rejected("session_full".into()).into())
        .await
        .unwrap();

    assert_eq!(flow, AgentFlow::Closed("session_full".into()));
    assert!(h.sink.events().contains(&Recorded::Refused("session_full".into())));
}

#[tokio::test]
async fn test_exhausted_move_source_is_a_surface_error() {
    let mut h = harness(&[]).await;
    start(&mut h).await;
    let err = h.agent.handle(Message::Turn.into()).await.unwrap_err();
    assert!(!err.is_channel_fault());
}
