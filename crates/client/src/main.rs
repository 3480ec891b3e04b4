//! `habitquest-timer` -- terminal countdown for one event.
//!
//! Runs a session for `EVENT_ID`, ticking once per second, and settles it
//! with the server when the timer runs out or the user ends it early. An
//! active session survives restarts through `SESSION_FILE`.
//!
//! Commands on stdin: `s` start, `p` pause, `r` resume, `e` end early,
//! `a` abandon, `q` quit (keeps an active session for later).
//!
//! # Environment variables
//!
//! | Variable            | Required | Default                     |
//! |---------------------|----------|-----------------------------|
//! | `API_BASE_URL`      | no       | `http://localhost:3000`     |
//! | `ACCESS_TOKEN`      | yes      | --                          |
//! | `EVENT_ID`          | yes      | --                          |
//! | `EVENT_LENGTH_SECS` | yes      | --                          |
//! | `SESSION_FILE`      | no       | `.habitquest/session.json`  |

use std::sync::Arc;

use habitquest_client::api::SettlementClient;
use habitquest_client::runner::{Command, SessionRunner, SettleOutcome, Update};
use habitquest_core::clock::SystemClock;
use habitquest_core::session::FileSessionStore;
use habitquest_core::types::RecordId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_SESSION_FILE: &str = ".habitquest/session.json";

fn required_env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| {
        tracing::error!("{name} environment variable is required");
        std::process::exit(1);
    })
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "s" | "start" => Some(Command::Start),
        "p" | "pause" => Some(Command::Pause),
        "r" | "resume" => Some(Command::Resume),
        "e" | "end" => Some(Command::EndEarly),
        "a" | "abandon" => Some(Command::Abandon),
        _ => None,
    }
}

fn format_remaining(remaining: chrono::Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "habitquest_client=info,habitquest_timer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base_url =
        std::env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
    let access_token = required_env("ACCESS_TOKEN");
    let event_id: RecordId = required_env("EVENT_ID").parse().unwrap_or_else(|_| {
        tracing::error!("EVENT_ID must be a UUID");
        std::process::exit(1);
    });
    let length_secs: i64 = required_env("EVENT_LENGTH_SECS")
        .parse()
        .unwrap_or_else(|_| {
            tracing::error!("EVENT_LENGTH_SECS must be a whole number of seconds");
            std::process::exit(1);
        });
    let session_file =
        std::env::var("SESSION_FILE").unwrap_or_else(|_| DEFAULT_SESSION_FILE.to_string());

    let gateway = SettlementClient::new(&base_url, access_token).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client");
        std::process::exit(1);
    });
    let runner = SessionRunner::open(
        event_id,
        length_secs,
        gateway,
        FileSessionStore::new(&session_file),
        Arc::new(SystemClock),
    )
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, session_file = %session_file, "Failed to open session");
        std::process::exit(1);
    });

    tracing::info!(
        %event_id,
        length_secs,
        state = %runner.session().state(),
        "Timer ready; commands: s start, p pause, r resume, e end, a abandon, q quit"
    );

    let (command_tx, command_rx) = mpsc::channel(16);
    let (update_tx, mut update_rx) = mpsc::channel(16);

    // Stdin reader: closing stdin or `q` drops the sender and stops the runner.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if matches!(line.trim(), "q" | "quit") {
                break;
            }
            match parse_command(&line) {
                Some(command) => {
                    if command_tx.send(command).await.is_err() {
                        break;
                    }
                }
                None => tracing::warn!(input = %line.trim(), "Unknown command"),
            }
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            match update {
                Update::Remaining { state, remaining } => {
                    println!("[{state}] {}", format_remaining(remaining));
                }
                Update::Settlement(SettleOutcome::Settled(receipt)) => {
                    println!(
                        "Done! +{} XP, +{} coins. Level {} ({} XP total)",
                        receipt.rewards.xp, receipt.rewards.coins, receipt.user.level, receipt.user.xp
                    );
                }
                Update::Settlement(SettleOutcome::LikelyAlreadySettled) => {
                    println!("This event was already settled.");
                }
                Update::Settlement(SettleOutcome::Failed(err)) => {
                    println!("Could not record completion ({err}). Paused: `e` to retry, `a` to abandon.");
                }
                Update::Rejected(err) => println!("{err}"),
                Update::Abandoned => println!("Session abandoned."),
            }
        }
    });

    if let Err(e) = runner.run(command_rx, update_tx).await {
        tracing::error!(error = %e, "Timer stopped");
    }
    let _ = printer.await;
}
