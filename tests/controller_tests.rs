#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end controller tests.
//!
//! Each test runs a real [`GameController`] against a [`MockTransport`] on
//! paused tokio time, drives it through the server side and the
//! [`ControllerHandle`], and inspects what was rendered and sent.

mod common;

use std::time::Duration;

use common::{
    correct, eliminated, game_finished, jammer, question, GrantingWakeLock, MockServer,
    MockTransport, RecordingSink, RenderCommand, RenderLog,
};
use neonmind_controller::protocol::{
    ClientMessage, GameStateSnapshot, Kicked, LeaderboardEntry, ServerMessage,
};
use neonmind_controller::render::{Notice, ResultOutcome};
use neonmind_controller::wake_lock::{NoWakeLock, WakeLockProvider, WakeLockStatus};
use neonmind_controller::{
    ControllerConfig, ControllerHandle, GameController, ScreenState, Session, SessionEnd,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

type RunTask = JoinHandle<(SessionEnd, GameController<RecordingSink>)>;

struct Harness {
    server: MockServer,
    handle: ControllerHandle,
    render: RenderLog,
    task: RunTask,
}

async fn launch_with<P: WakeLockProvider>(provider: &mut P) -> Harness {
    launch_configured(provider, ControllerConfig::default()).await
}

async fn launch_configured<P: WakeLockProvider>(
    provider: &mut P,
    config: ControllerConfig,
) -> Harness {
    let (transport, mut server) = MockTransport::new();
    let (sink, render) = RecordingSink::new();
    let (mut controller, handle) = GameController::start(
        Session::new("ABCD", 7),
        transport,
        provider,
        sink,
        config,
    )
    .await;
    let task = tokio::spawn(async move {
        let end = controller.run().await;
        (end, controller)
    });

    assert_eq!(
        server.next_sent().await,
        ClientMessage::JoinGame {
            room_code: "ABCD".into()
        }
    );
    Harness {
        server,
        handle,
        render,
        task,
    }
}

async fn launch() -> Harness {
    launch_with(&mut NoWakeLock).await
}

fn is_result(cmd: &RenderCommand, outcome: ResultOutcome) -> bool {
    matches!(cmd, RenderCommand::Result(o, _) if *o == outcome)
}

#[tokio::test(start_paused = true)]
async fn start_shows_waiting_and_wake_lock_state() {
    let mut h = launch().await;

    h.render.wait_for(|c| *c == RenderCommand::Waiting).await;
    assert_eq!(
        h.render.all(),
        vec![RenderCommand::WakeLock(false), RenderCommand::Waiting]
    );

    h.handle.shutdown().unwrap();
    let (end, controller) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Shutdown);
    assert_eq!(controller.wake_lock_status(), WakeLockStatus::Unavailable);
    assert!(h.server.is_closed());
}

#[tokio::test(start_paused = true)]
async fn answer_is_submitted_with_elapsed_time() {
    let mut h = launch().await;

    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;

    tokio::time::sleep(Duration::from_millis(2500)).await;
    h.handle.select_answer(12).unwrap();

    let sent = h.server.next_sent().await;
    let ClientMessage::SubmitAnswer {
        room_code,
        answer_id,
        time_taken,
    } = sent
    else {
        panic!("expected submit_answer, got {sent:?}");
    };
    assert_eq!(room_code, "ABCD");
    assert_eq!(answer_id, 12);
    assert!((time_taken - 2.5).abs() < 1e-3, "time_taken = {time_taken}");

    // Locked after the first submission.
    h.handle.select_answer(11).unwrap();
    h.server.push(&correct(150, 3, 50));
    let result = h
        .render
        .wait_for(|c| is_result(c, ResultOutcome::Correct))
        .await;
    let RenderCommand::Result(_, details) = result else {
        unreachable!()
    };
    assert_eq!(details.detail, "+50 points");
    assert_eq!(details.streak, 3);
    assert!(h.server.drain_sent().is_empty(), "second answer must not be sent");

    let shown = Instant::now();
    h.render.wait_for(|c| *c == RenderCommand::Waiting).await;
    assert_eq!(Instant::now() - shown, Duration::from_secs(3));

    h.handle.shutdown().unwrap();
    let (end, controller) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Shutdown);
    assert_eq!(controller.stats().score, 150);
    assert_eq!(controller.stats().streak, 3);
}

#[tokio::test(start_paused = true)]
async fn invalid_answer_ids_are_ignored() {
    let mut h = launch().await;

    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;

    h.handle.select_answer(99).unwrap();
    h.handle.select_answer(11).unwrap();

    assert_eq!(
        h.server.next_sent().await,
        ClientMessage::SubmitAnswer {
            room_code: "ABCD".into(),
            answer_id: 11,
            time_taken: 0.0,
        }
    );

    h.handle.shutdown().unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn countdown_expiry_shows_timeout_then_waiting() {
    let mut h = launch().await;

    h.server.push(&question(1, 2));
    h.render
        .wait_for(|c| is_result(c, ResultOutcome::Timeout))
        .await;
    h.render.wait_for(|c| *c == RenderCommand::Waiting).await;

    let timers: Vec<_> = h
        .render
        .all()
        .into_iter()
        .filter(|c| matches!(c, RenderCommand::Timer(..)))
        .collect();
    assert_eq!(
        timers,
        vec![
            RenderCommand::Timer(2, 1.0),
            RenderCommand::Timer(1, 0.5),
            RenderCommand::Timer(0, 0.0),
        ]
    );
    assert!(h.server.drain_sent().is_empty(), "nothing is submitted on timeout");

    h.handle.shutdown().unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn next_question_replaces_running_countdown() {
    let mut h = launch().await;

    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    h.server.push(&question(2, 4));
    h.render.wait_for(|c| *c == RenderCommand::Question(2)).await;
    h.render
        .wait_for(|c| is_result(c, ResultOutcome::Timeout))
        .await;

    let after_second: Vec<_> = h
        .render
        .all()
        .into_iter()
        .skip_while(|c| *c != RenderCommand::Question(2))
        .filter_map(|c| match c {
            RenderCommand::Timer(remaining, _) => Some(remaining),
            _ => None,
        })
        .collect();
    assert_eq!(after_second, vec![4, 3, 2, 1, 0]);

    h.handle.shutdown().unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn elimination_keeps_result_until_game_finishes() {
    let mut h = launch().await;

    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;
    h.handle.select_answer(11).unwrap();
    h.server.next_sent().await;

    h.server.push(&eliminated(80));
    let result = h
        .render
        .wait_for(|c| is_result(c, ResultOutcome::Eliminated))
        .await;
    let RenderCommand::Result(_, details) = result else {
        unreachable!()
    };
    assert_eq!(details.detail, "You have been eliminated!");

    tokio::time::sleep(Duration::from_secs(30)).await;
    h.server.push(&question(2, 10));
    h.server.push(&game_finished(vec![]));
    h.render
        .wait_for(|c| matches!(c, RenderCommand::Finished(..)))
        .await;

    let all = h.render.all();
    assert!(!all.contains(&RenderCommand::Question(2)));
    let waits = all.iter().filter(|c| **c == RenderCommand::Waiting).count();
    assert_eq!(waits, 1, "only the initial waiting screen");

    h.server.close();
    let (end, controller) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Finished);
    assert_eq!(controller.screen(), ScreenState::Finished);
    assert_eq!(controller.stats().score, 80);
}

#[tokio::test(start_paused = true)]
async fn game_finished_releases_wake_lock_and_absorbs_late_events() {
    let (mut provider, lease_rx) = GrantingWakeLock::new();
    let mut h = launch_with(&mut provider).await;
    let mut lease = lease_rx.await.unwrap();
    assert_eq!(h.render.all().first(), Some(&RenderCommand::WakeLock(true)));

    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;

    let leaderboard = vec![
        LeaderboardEntry {
            user_id: 3,
            username: "grace".into(),
            score: 400,
            streak_max: 5,
        },
        LeaderboardEntry {
            user_id: 7,
            username: "ada".into(),
            score: 150,
            streak_max: 2,
        },
    ];
    h.server.push(&game_finished(leaderboard.clone()));
    let finished = h
        .render
        .wait_for(|c| matches!(c, RenderCommand::Finished(..)))
        .await;
    assert!(matches!(finished, RenderCommand::Finished(_, ref lb) if *lb == leaderboard));
    assert!(lease.released().await);
    h.render
        .wait_for(|c| *c == RenderCommand::WakeLock(false))
        .await;

    h.server.push(&question(2, 10));
    h.server.push(&correct(999, 9, 10));
    h.server.close();

    let (end, controller) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Finished);
    assert_eq!(controller.wake_lock_status(), WakeLockStatus::Released);
    assert_eq!(controller.stats().score, 0);
    assert!(!h.render.all().contains(&RenderCommand::Question(2)));
}

#[tokio::test(start_paused = true)]
async fn kicked_ends_the_session_immediately() {
    let (mut provider, lease_rx) = GrantingWakeLock::new();
    let mut h = launch_with(&mut provider).await;
    let mut lease = lease_rx.await.unwrap();

    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;
    h.server
        .push(&ServerMessage::Kicked(Some(Kicked { user_id: Some(7) })));

    let (end, controller) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Kicked);
    assert_eq!(controller.wake_lock_status(), WakeLockStatus::Released);
    assert!(lease.released().await);
    assert!(h.server.is_closed());

    let all = h.render.all();
    assert!(all.contains(&RenderCommand::Notice(Notice::Kicked)));
    assert_eq!(all.last(), Some(&RenderCommand::WakeLock(false)));

    // The countdown died with the session.
    tokio::time::sleep(Duration::from_secs(20)).await;
    let timers = h
        .render
        .drain()
        .into_iter()
        .filter(|c| matches!(c, RenderCommand::Timer(..) | RenderCommand::Result(..)))
        .filter(|c| *c != RenderCommand::Timer(10, 1.0))
        .count();
    assert_eq!(timers, 0);
}

#[tokio::test(start_paused = true)]
async fn jammer_overlay_expires_independently_of_transitions() {
    let mut h = launch().await;

    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;

    let started = Instant::now();
    h.server.push(&jammer(Some(500)));
    h.render.wait_for(|c| *c == RenderCommand::Effect(true)).await;

    h.handle.select_answer(11).unwrap();
    h.server.next_sent().await;
    h.server.push(&correct(100, 1, 100));
    h.render
        .wait_for(|c| is_result(c, ResultOutcome::Correct))
        .await;

    h.render.wait_for(|c| *c == RenderCommand::Effect(false)).await;
    assert_eq!(Instant::now() - started, Duration::from_millis(500));

    h.handle.shutdown().unwrap();
    let (_, controller) = h.task.await.unwrap();
    assert_eq!(controller.stats().score, 100);
}

#[tokio::test(start_paused = true)]
async fn jammer_without_duration_uses_default() {
    let mut h = launch().await;

    let started = Instant::now();
    h.server.push(&jammer(None));
    h.render.wait_for(|c| *c == RenderCommand::Effect(true)).await;
    h.render.wait_for(|c| *c == RenderCommand::Effect(false)).await;
    assert_eq!(Instant::now() - started, Duration::from_secs(3));

    h.handle.shutdown().unwrap();
    h.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn foreground_after_link_drop_rejoins_and_restores_stats() {
    let mut h = launch().await;

    h.server.drop_link("backgrounded");
    h.render
        .wait_for(|c| matches!(c, RenderCommand::Notice(Notice::ConnectionLost(_))))
        .await;

    h.handle.foreground().unwrap();
    assert_eq!(
        h.server.next_sent().await,
        ClientMessage::ReconnectGame {
            room_code: "ABCD".into()
        }
    );

    h.server.push(&ServerMessage::GameState(GameStateSnapshot {
        question: None,
        score: 320,
        streak: 4,
        status: Some("active".into()),
    }));
    h.render
        .wait_for(|c| matches!(c, RenderCommand::Stats(s) if s.score == 320 && s.streak == 4))
        .await;

    // Back to normal play, without a second rejoin.
    h.server.push(&question(5, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(5)).await;
    assert!(h.server.drain_sent().is_empty());

    h.handle.shutdown().unwrap();
    let (end, controller) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Shutdown);
    assert_eq!(controller.stats().score, 320);
}

#[tokio::test(start_paused = true)]
async fn recovered_link_rejoins_the_room_without_foreground() {
    let mut h = launch().await;

    h.server.drop_link("network switch");
    h.render
        .wait_for(|c| matches!(c, RenderCommand::Notice(Notice::ConnectionLost(_))))
        .await;

    // The transport reconnected by itself; the server greets the new socket.
    h.server.push(&ServerMessage::Connected { user_id: 7 });
    assert_eq!(
        h.server.next_sent().await,
        ClientMessage::ReconnectGame {
            room_code: "ABCD".into()
        }
    );

    // Already back in the room: foregrounding sends nothing more.
    h.handle.foreground().unwrap();
    h.server.push(&question(3, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(3)).await;
    assert!(h.server.drain_sent().is_empty());

    h.handle.shutdown().unwrap();
    let (end, _) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn game_finished_survives_a_burst_of_broadcasts() {
    let config = ControllerConfig::default().with_event_channel_capacity(4);
    let mut h = launch_configured(&mut NoWakeLock, config).await;

    for user_id in 0..20 {
        h.server.push(&ServerMessage::PlayerAnswered {
            user_id,
            correct: user_id % 2 == 0,
        });
    }
    h.server.push(&game_finished(vec![]));
    h.render
        .wait_for(|c| matches!(c, RenderCommand::Finished(..)))
        .await;

    h.server.close();
    let (end, controller) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Finished);
    assert_eq!(controller.screen(), ScreenState::Finished);
}

#[tokio::test(start_paused = true)]
async fn platform_wake_lock_release_updates_indicator() {
    let (mut provider, lease_rx) = GrantingWakeLock::new();
    let mut h = launch_with(&mut provider).await;

    lease_rx.await.unwrap().revoke();
    h.render
        .wait_for(|c| *c == RenderCommand::WakeLock(false))
        .await;

    h.handle.shutdown().unwrap();
    let (_, controller) = h.task.await.unwrap();
    assert_eq!(
        controller.wake_lock_status(),
        WakeLockStatus::ReleasedExternally
    );
}

#[tokio::test(start_paused = true)]
async fn channel_close_before_finish_ends_session() {
    let mut h = launch().await;

    h.server.push_raw("definitely not json");
    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;

    h.server.close();
    let (end, _) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::ChannelClosed { reason: None });
}

#[tokio::test(start_paused = true)]
async fn server_error_is_shown_and_play_continues() {
    let mut h = launch().await;

    h.server.push(&ServerMessage::Error {
        message: "Room not found".into(),
    });
    h.render
        .wait_for(|c| *c == RenderCommand::Notice(Notice::ServerError("Room not found".into())))
        .await;

    h.server.push(&question(1, 10));
    h.render.wait_for(|c| *c == RenderCommand::Question(1)).await;

    h.handle.shutdown().unwrap();
    let (end, _) = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn handle_reports_not_connected_after_controller_is_gone() {
    let h = launch().await;

    h.handle.shutdown().unwrap();
    let (_, controller) = h.task.await.unwrap();
    drop(controller);

    assert!(h.handle.select_answer(1).is_err());
    assert!(h.handle.foreground().is_err());
}
