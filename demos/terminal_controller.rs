//! # Terminal Controller Example
//!
//! Plays a NeonMind game from the terminal:
//!
//! 1. Connect to the game server via WebSocket
//! 2. Join the room and wait for questions
//! 3. Answer by typing the letter shown next to an answer
//! 4. Type `f` to simulate the app returning to the foreground
//! 5. Shut down gracefully on Ctrl+C, `q`, kick or game end
//!
//! ## Running
//!
//! ```sh
//! NEONMIND_URL=ws://localhost:8000/ws/game/ABCD?user_id=7 \
//! NEONMIND_ROOM=ABCD NEONMIND_USER=7 \
//!     cargo run --example terminal_controller
//! ```

use std::sync::{Arc, Mutex};

use neonmind_controller::protocol::{AnswerId, LeaderboardEntry, Question};
use neonmind_controller::render::{Notice, RenderSink, ResultDetails, ResultOutcome};
use neonmind_controller::{
    ControllerConfig, GameController, NoWakeLock, PlayerStats, Session, SessionEnd,
    WebSocketTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_URL: &str = "ws://localhost:8000/ws";
const DEFAULT_ROOM: &str = "DEMO";
const DEFAULT_USER: u64 = 1;

/// Answer ids of the question on screen, in display order.
type AnswerSlots = Arc<Mutex<Vec<AnswerId>>>;

struct TerminalSink {
    answers: AnswerSlots,
}

impl TerminalSink {
    fn set_answers(&self, ids: Vec<AnswerId>) {
        if let Ok(mut slots) = self.answers.lock() {
            *slots = ids;
        }
    }
}

impl RenderSink for TerminalSink {
    fn show_waiting(&mut self) {
        self.set_answers(Vec::new());
        println!("\n… waiting for the next question");
    }

    fn show_question(&mut self, question: &Question) {
        let number = question
            .question_number
            .map(|n| format!("#{n} "))
            .unwrap_or_default();
        println!("\n{number}{}", question.text);
        if let Some(code) = &question.code_snippet {
            println!("----\n{code}\n----");
        }
        for (letter, answer) in ('a'..='z').zip(&question.answers) {
            println!("  [{letter}] {}", answer.text);
        }
        self.set_answers(question.answers.iter().map(|a| a.id).collect());
    }

    fn set_answers_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.set_answers(Vec::new());
            println!("  answer sent");
        }
    }

    fn show_result(&mut self, outcome: ResultOutcome, details: &ResultDetails) {
        println!("\n{} {}", outcome.icon(), details.headline);
        if !details.detail.is_empty() {
            println!("   {}", details.detail);
        }
    }

    fn show_finished(&mut self, stats: &PlayerStats, leaderboard: &[LeaderboardEntry]) {
        println!("\n== Game over: {} points, level {} ==", stats.score, stats.level);
        for (rank, entry) in leaderboard.iter().enumerate() {
            println!("  {}. {} ({} pts)", rank + 1, entry.username, entry.score);
        }
    }

    fn set_timer_display(&mut self, remaining: u32, percentage: f64) {
        let filled = (percentage * 20.0).round() as usize;
        println!("  [{:<20}] {remaining:>3}s", "#".repeat(filled));
    }

    fn set_wake_lock_indicator(&mut self, active: bool) {
        tracing::info!(active, "wake lock indicator");
    }

    fn set_effect_active(&mut self, active: bool) {
        if active {
            println!("  ~~~ J A M M E D ~~~");
        } else {
            println!("  (signal clear)");
        }
    }

    fn update_stats(&mut self, stats: &PlayerStats) {
        println!("  score {} | streak {} | level {}", stats.score, stats.streak, stats.level);
    }

    fn show_notice(&mut self, notice: &Notice) {
        println!("\n!! {notice}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("NEONMIND_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let room = std::env::var("NEONMIND_ROOM").unwrap_or_else(|_| DEFAULT_ROOM.to_string());
    let user_id = std::env::var("NEONMIND_USER")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_USER);
    tracing::info!("Connecting to {url} (room {room}, user {user_id})");

    // ── Start ───────────────────────────────────────────────────────
    let transport = WebSocketTransport::connect(&url).await?;
    let answers = AnswerSlots::default();
    let sink = TerminalSink {
        answers: Arc::clone(&answers),
    };
    let (mut controller, handle) = GameController::start(
        Session::new(room, user_id),
        transport,
        &mut NoWakeLock,
        sink,
        ControllerConfig::default(),
    )
    .await;

    // ── Keyboard input ──────────────────────────────────────────────
    let input = handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let sent = match line.trim() {
                "f" => input.foreground(),
                "q" => input.shutdown(),
                choice => {
                    let picked = choice
                        .chars()
                        .next()
                        .filter(char::is_ascii_lowercase)
                        .and_then(|c| {
                            let index = usize::from(c as u8 - b'a');
                            answers.lock().ok()?.get(index).copied()
                        });
                    match picked {
                        Some(answer_id) => input.select_answer(answer_id),
                        None => continue,
                    }
                }
            };
            if sent.is_err() {
                break;
            }
        }
    });

    // ── Run ─────────────────────────────────────────────────────────
    let interrupted = tokio::select! {
        end = controller.run() => Some(end),
        _ = tokio::signal::ctrl_c() => None,
    };
    let end = match interrupted {
        Some(end) => end,
        None => {
            tracing::info!("Ctrl+C received, shutting down…");
            handle.shutdown()?;
            controller.run().await
        }
    };

    match end {
        SessionEnd::Kicked => println!("You were removed from the game."),
        SessionEnd::Finished => println!("Thanks for playing!"),
        SessionEnd::ChannelClosed { reason } => {
            println!("Connection closed: {}", reason.as_deref().unwrap_or("server closed"));
        }
        SessionEnd::Shutdown => println!("Goodbye!"),
    }
    Ok(())
}
