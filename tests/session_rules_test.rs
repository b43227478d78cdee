//! Tests for the coordinator session state machine, without a broker.

use strictly_relay::coordinator::{Outgoing, SessionError};
use strictly_relay::{Address, Board, Envelope, GameResult, Marker, Message, Session, SessionStatus};

fn started() -> Session {
    let mut session = Session::new();
    session.register(Address::new("reply.a")).unwrap();
    session.register(Address::new("reply.b")).unwrap();
    session
}

fn play(session: &mut Session, player_id: &str, cell: usize) -> Vec<Outgoing> {
    session.handle(Envelope::from_player(player_id, Message::move_to(cell)))
}

fn messages_to<'a>(out: &'a [Outgoing], to: &str) -> Vec<&'a Message> {
    out.iter()
        .filter(|o| o.to.as_str() == to)
        .map(|o| &o.envelope.message)
        .collect()
}

#[test]
fn test_start_carries_identity_and_marker() {
    let mut session = Session::new();
    session.register(Address::new("reply.a")).unwrap();
    let registration = session.register(Address::new("reply.b")).unwrap();

    assert_eq!(
        messages_to(&registration.outgoing, "reply.a"),
        vec![
            &Message::Start {
                player_id: "player1".into(),
                marker: Marker::X
            },
            &Message::Turn
        ]
    );
    assert_eq!(
        messages_to(&registration.outgoing, "reply.b"),
        vec![&Message::Start {
            player_id: "player2".into(),
            marker: Marker::O
        }]
    );
}

#[test]
fn test_accepted_move_broadcasts_board_and_hands_over_turn() {
    let mut session = started();
    let out = play(&mut session, "player1", 4);

    let board = Message::BoardState("    X    ".into());
    assert_eq!(messages_to(&out, "reply.a"), vec![&board]);
    assert_eq!(messages_to(&out, "reply.b"), vec![&board, &Message::Turn]);
    assert_eq!(session.current_player().unwrap().player_id(), "player2");
}

#[test]
fn test_draw_sequence() {
    let mut session = started();
    // X O X / X O O / O X X
    let moves = [
        ("player1", 0),
        ("player2", 1),
        ("player1", 2),
        ("player2", 4),
        ("player1", 3),
        ("player2", 5),
        ("player1", 7),
        ("player2", 6),
    ];
    for (player, cell) in moves {
        play(&mut session, player, cell);
        assert_eq!(session.status(), &SessionStatus::InProgress);
    }

    let out = play(&mut session, "player1", 8);
    assert_eq!(session.status(), &SessionStatus::Finished);
    assert_eq!(session.result(), &Some(GameResult::Draw));
    assert_eq!(session.board().to_wire_string(), "XOXXOOOXX");
    for to in ["reply.a", "reply.b"] {
        assert_eq!(
            messages_to(&out, to),
            vec![
                &Message::BoardState("XOXXOOOXX".into()),
                &Message::End("draw".into())
            ]
        );
    }
}

#[test]
fn test_win_fires_on_third_marker() {
    let mut session = started();
    play(&mut session, "player1", 0);
    play(&mut session, "player2", 3);
    play(&mut session, "player1", 1);
    let out = play(&mut session, "player2", 4);
    assert_eq!(session.status(), &SessionStatus::InProgress);
    assert!(!out.iter().any(|o| matches!(o.envelope.message, Message::End(_))));

    let out = play(&mut session, "player1", 2);
    assert_eq!(session.status(), &SessionStatus::Finished);
    assert_eq!(
        session.result(),
        &Some(GameResult::Winner("player1".into()))
    );
    assert_eq!(
        messages_to(&out, "reply.b").last(),
        Some(&&Message::End("player1 wins".into()))
    );
    assert!(!out.iter().any(|o| o.envelope.message == Message::Turn));
}

#[test]
fn test_second_player_can_win() {
    let mut session = started();
    for (player, cell) in [
        ("player1", 0),
        ("player2", 2),
        ("player1", 1),
        ("player2", 4),
        ("player1", 8),
    ] {
        play(&mut session, player, cell);
    }
    let out = play(&mut session, "player2", 6);
    assert_eq!(
        session.result(),
        &Some(GameResult::Winner("player2".into()))
    );
    assert_eq!(
        messages_to(&out, "reply.a").last(),
        Some(&&Message::End("player2 wins".into()))
    );
}

#[test]
fn test_occupied_cell_leaves_state_untouched() {
    let mut session = started();
    play(&mut session, "player1", 4);
    let before = session.board().clone();

    let out = play(&mut session, "player2", 4);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, Address::new("reply.b"));
    assert_eq!(out[0].envelope.message, Message::InvalidMove);
    assert_eq!(session.board(), &before);
    assert_eq!(session.current_player().unwrap().player_id(), "player2");
}

#[test]
fn test_wrong_turn_leaves_state_untouched() {
    let mut session = started();
    let out = play(&mut session, "player2", 0);
    assert_eq!(
        out,
        vec![Outgoing::new(
            Address::new("reply.b"),
            Envelope::new(Message::InvalidMove)
        )]
    );
    assert_eq!(session.board(), &Board::new());
    assert_eq!(session.current_player().unwrap().player_id(), "player1");
}

#[test]
fn test_third_registration_is_session_full() {
    let mut session = started();
    let err = session.register(Address::new("reply.c")).unwrap_err();
    assert_eq!(err, SessionError::SessionFull);
    assert_eq!(session.slots().len(), 2);
    assert_eq!(session.status(), &SessionStatus::InProgress);
}

#[test]
fn test_duplicate_registration_is_idempotent() {
    let mut session = Session::new();
    session.register(Address::new("reply.a")).unwrap();
    let again = session.register(Address::new("reply.a")).unwrap();
    assert_eq!(again.player_id, "player1");
    assert!(again.outgoing.is_empty());
    assert_eq!(session.slots().len(), 1);
    assert_eq!(session.status(), &SessionStatus::Waiting);
}

#[test]
fn test_moves_after_finish_are_rejected() {
    let mut session = started();
    for (player, cell) in [
        ("player1", 0),
        ("player2", 3),
        ("player1", 1),
        ("player2", 4),
        ("player1", 2),
    ] {
        play(&mut session, player, cell);
    }
    let finished = session.board().clone();

    let out = play(&mut session, "player2", 5);
    assert_eq!(out[0].envelope.message, Message::InvalidMove);
    assert_eq!(session.board(), &finished);
}

#[test]
fn test_non_coordinator_messages_are_dropped() {
    let mut session = started();
    for message in [
        Message::Turn,
        Message::InvalidMove,
        Message::BoardState("XXXXXXXXX".into()),
        Message::End("draw".into()),
    ] {
        assert!(session.handle(Envelope::from_player("player1", message)).is_empty());
    }
    assert_eq!(session.board(), &Board::new());
}

#[test]
fn test_signed_payload_is_rejected_without_mutation() {
    let mut session = started();
    let out = session.handle(Envelope::from_player("player1", Message::Move("+4".into())));
    assert_eq!(
        out,
        vec![Outgoing::new(
            Address::new("reply.a"),
            Envelope::new(Message::InvalidMove)
        )]
    );
    assert_eq!(session.board(), &Board::new());
    assert_eq!(session.current_player().unwrap().player_id(), "player1");
}
