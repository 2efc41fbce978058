#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests.
//!
//! Checks the `{"event", "data"}` envelope of every message the controller
//! sends, and decodes JSON fixtures shaped like real game-server output,
//! including the legacy question field names.

use neonmind_controller::protocol::{
    AnswerOption, ClientMessage, GameFinished, GameStateSnapshot, JammerAttack, Kicked, Question,
    RoomPlayer, ServerMessage,
};
use serde_json::{json, Value};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn to_value<T: serde::Serialize>(val: &T) -> Value {
    serde_json::to_value(val).expect("serialize")
}

fn decode(value: Value) -> ServerMessage {
    serde_json::from_value(value).expect("deserialize")
}

// ════════════════════════════════════════════════════════════════════
// ClientMessage wire shape
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_game_wire_shape() {
    let msg = ClientMessage::JoinGame {
        room_code: "ABCD".into(),
    };
    assert_eq!(
        to_value(&msg),
        json!({"event": "join_game", "data": {"room_code": "ABCD"}})
    );
    assert_eq!(msg.name(), "join_game");
}

#[test]
fn reconnect_game_wire_shape() {
    let msg = ClientMessage::ReconnectGame {
        room_code: "ABCD".into(),
    };
    assert_eq!(
        to_value(&msg),
        json!({"event": "reconnect_game", "data": {"room_code": "ABCD"}})
    );
}

#[test]
fn submit_answer_carries_fractional_seconds() {
    let msg = ClientMessage::SubmitAnswer {
        room_code: "ABCD".into(),
        answer_id: 42,
        time_taken: 2.5,
    };
    assert_eq!(
        to_value(&msg),
        json!({
            "event": "submit_answer",
            "data": {"room_code": "ABCD", "answer_id": 42, "time_taken": 2.5}
        })
    );
}

// ════════════════════════════════════════════════════════════════════
// ServerMessage fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn new_question_with_legacy_field_names() {
    let msg = decode(json!({
        "event": "new_question",
        "data": {
            "id": 17,
            "frage_text": "What does `?` do on a Result?",
            "typ": "mc",
            "zeit_sekunden": 20,
            "code_snippet": null,
            "antworten": [
                {"id": 171, "text": "Propagates the error", "reihenfolge": 1},
                {"id": 172, "text": "Panics", "reihenfolge": 2}
            ],
            "question_number": 3
        }
    }));

    let ServerMessage::NewQuestion(q) = msg else {
        panic!("expected NewQuestion, got {msg:?}");
    };
    assert_eq!(q.id, 17);
    assert_eq!(q.text, "What does `?` do on a Result?");
    assert_eq!(q.duration_seconds, 20);
    assert_eq!(q.code_snippet, None);
    assert_eq!(q.kind.as_deref(), Some("mc"));
    assert_eq!(q.question_number, Some(3));
    assert_eq!(q.answers.len(), 2);
    assert!(q.has_answer(172));
    assert!(!q.has_answer(17));
}

#[test]
fn new_question_serializes_with_current_names() {
    let q = Question {
        id: 1,
        text: "2 + 2?".into(),
        code_snippet: Some("let x = 2 + 2;".into()),
        answers: vec![AnswerOption {
            id: 11,
            text: "4".into(),
        }],
        duration_seconds: 10,
        question_number: None,
        kind: None,
    };
    let value = to_value(&ServerMessage::NewQuestion(q.clone()));
    let data = &value["data"];
    assert_eq!(data["text"], "2 + 2?");
    assert_eq!(data["duration_seconds"], 10);
    assert_eq!(data["answers"][0]["id"], 11);
    assert!(data.get("frage_text").is_none());
    assert!(data.get("typ").is_none());

    assert_eq!(decode(value), ServerMessage::NewQuestion(q));
}

#[test]
fn correct_answer_result_fixture() {
    let msg = decode(json!({
        "event": "answer_result",
        "data": {
            "correct": true,
            "score": 50,
            "total_score": 150,
            "streak": 3,
            "xp_gained": 50,
            "level": 4,
            "leveled_up": true
        }
    }));
    let ServerMessage::AnswerResult(r) = msg else {
        panic!("expected AnswerResult, got {msg:?}");
    };
    assert!(r.correct);
    assert_eq!(r.score, Some(50));
    assert_eq!(r.total_score, 150);
    assert_eq!(r.streak, 3);
    assert_eq!(r.level, Some(4));
    assert_eq!(r.leveled_up, Some(true));
    assert!(!r.is_eliminated());
}

#[test]
fn eliminating_answer_result_fixture() {
    let msg = decode(json!({
        "event": "answer_result",
        "data": {"correct": false, "score": 0, "total_score": 80, "streak": 0, "eliminated": true}
    }));
    let ServerMessage::AnswerResult(r) = msg else {
        panic!("expected AnswerResult, got {msg:?}");
    };
    assert!(!r.correct);
    assert!(r.is_eliminated());
    assert_eq!(r.total_score, 80);

    let survived = decode(json!({
        "event": "answer_result",
        "data": {"correct": false, "total_score": 80, "streak": 0, "eliminated": false}
    }));
    let ServerMessage::AnswerResult(r) = survived else {
        panic!("expected AnswerResult");
    };
    assert!(!r.is_eliminated());
}

#[test]
fn game_finished_fixture() {
    let msg = decode(json!({
        "event": "game_finished",
        "data": {
            "leaderboard": [
                {"user_id": 3, "username": "grace", "score": 400, "streak_max": 5},
                {"user_id": 7, "username": "ada", "score": 150, "streak_max": 2}
            ]
        }
    }));
    let ServerMessage::GameFinished(finished) = msg else {
        panic!("expected GameFinished, got {msg:?}");
    };
    assert_eq!(finished.leaderboard.len(), 2);
    assert_eq!(finished.leaderboard[0].username, "grace");

    let empty = decode(json!({"event": "game_finished", "data": {}}));
    assert_eq!(empty, ServerMessage::GameFinished(GameFinished::default()));
}

#[test]
fn jammer_attack_duration_is_optional() {
    let msg = decode(json!({
        "event": "jammer_attack",
        "data": {"from_user_id": 9, "duration": 3000}
    }));
    assert_eq!(
        msg,
        ServerMessage::JammerAttack(JammerAttack {
            from_user_id: Some(9),
            duration: Some(3000),
        })
    );

    let bare = decode(json!({"event": "jammer_attack", "data": {}}));
    assert_eq!(bare, ServerMessage::JammerAttack(JammerAttack::default()));
}

#[test]
fn kicked_with_and_without_payload() {
    assert_eq!(
        decode(json!({"event": "kicked"})),
        ServerMessage::Kicked(None)
    );
    assert_eq!(
        decode(json!({"event": "kicked", "data": {"user_id": 7}})),
        ServerMessage::Kicked(Some(Kicked { user_id: Some(7) }))
    );
}

#[test]
fn game_state_snapshot_fixture() {
    let msg = decode(json!({
        "event": "game_state",
        "data": {"question": null, "score": 320, "streak": 4, "status": "active"}
    }));
    let ServerMessage::GameState(snapshot) = msg else {
        panic!("expected GameState, got {msg:?}");
    };
    assert_eq!(snapshot.score, 320);
    assert_eq!(snapshot.streak, 4);
    assert!(!snapshot.is_finished());

    let finished = GameStateSnapshot {
        status: Some("finished".into()),
        ..GameStateSnapshot::default()
    };
    assert!(finished.is_finished());
}

#[test]
fn room_broadcasts_decode() {
    let room = decode(json!({
        "event": "room_state",
        "data": {
            "players": [{"user_id": 7, "username": "ada", "avatar": {"color": "cyan"}}],
            "status": "waiting"
        }
    }));
    let ServerMessage::RoomState(state) = room else {
        panic!("expected RoomState, got {room:?}");
    };
    assert_eq!(
        state.players,
        vec![RoomPlayer {
            user_id: 7,
            username: "ada".into()
        }]
    );
    assert_eq!(state.status.as_deref(), Some("waiting"));

    assert_eq!(
        decode(json!({"event": "player_answered", "data": {"user_id": 3, "correct": true}})),
        ServerMessage::PlayerAnswered {
            user_id: 3,
            correct: true
        }
    );
    assert_eq!(
        decode(json!({"event": "connected", "data": {"user_id": 7}})),
        ServerMessage::Connected { user_id: 7 }
    );
}

#[test]
fn error_event_fixture() {
    let msg = decode(json!({"event": "error", "data": {"message": "Already answered"}}));
    assert_eq!(
        msg,
        ServerMessage::Error {
            message: "Already answered".into()
        }
    );
    assert_eq!(msg.name(), "error");
}

#[test]
fn unknown_or_malformed_events_are_rejected() {
    for raw in [
        r#"{"event":"start_game","data":{}}"#,
        r#"{"data":{"user_id":7}}"#,
        r#"{"event":"new_question","data":{"id":1}}"#,
        r#"{"event":"answer_result","data":{"correct":"yes"}}"#,
        "not json at all",
    ] {
        assert!(
            serde_json::from_str::<ServerMessage>(raw).is_err(),
            "should reject {raw}"
        );
    }
}
