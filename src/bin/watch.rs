//! Live comment stream watcher.
//!
//! Connects to a live broadcast, prints the comment stream from every open
//! room, and posts comments typed on stdin. Session credentials are supplied
//! by the caller as an already-extracted `user_session` cookie value.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin watch -- --live lv12345 --session <user_session cookie>
//! cargo run --bin watch -- --live lv12345 --session <cookie> --json
//! ```

use std::sync::Arc;

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use sajiki::api::HttpLiveApi;
use sajiki::cli::formatter::EventFormatter;
use sajiki::cli::json::event_json_line;
use sajiki::common::logger::setup_logger;
use sajiki::domain::ThreadOffsetDerivation;
use sajiki::session::{SessionEvent, SessionOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "watch")]
#[command(about = "Live comment stream watcher with progressive room opening", long_about = None)]
struct Args {
    /// Live id to connect to (e.g. lv12345)
    #[arg(short = 'l', long)]
    live: String,

    /// user_session cookie value of a logged-in account
    #[arg(short = 's', long)]
    session: String,

    /// Post comments with the account id visible instead of anonymously
    #[arg(long, default_value_t = false)]
    named: bool,

    /// Emit events as JSON lines instead of formatted text
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("watch error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let api = Arc::new(HttpLiveApi::new(args.session)?);
    let derivation = Arc::new(ThreadOffsetDerivation::default());
    let (orchestrator, mut events) = SessionOrchestrator::new(api, derivation);
    let orchestrator = Arc::new(orchestrator);

    orchestrator.connect(&args.live).await?;
    tracing::info!("connected to {}", args.live);

    // Channel for comment input typed on stdin
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

    // Spawn a blocking thread for rustyline (synchronous readline)
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline("> ") {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            // Channel closed, exit thread
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    let mut input_closed = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    print_event(&event, args.json);
                    if matches!(event, SessionEvent::Disconnected) {
                        break;
                    }
                }
                None => break,
            },
            line = input_rx.recv(), if !input_closed => match line {
                Some(line) => {
                    // posting must not stall event consumption
                    let orchestrator = Arc::clone(&orchestrator);
                    let anonymous = !args.named;
                    tokio::spawn(async move {
                        if let Err(e) = orchestrator.post_comment(&line, anonymous).await {
                            tracing::warn!("failed to post comment: {}", e);
                        }
                    });
                }
                None => {
                    // stdin closed; end the session
                    input_closed = true;
                    orchestrator.disconnect().await;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, disconnecting");
                orchestrator.disconnect().await;
            }
        }
    }

    Ok(())
}

fn print_event(event: &SessionEvent, json: bool) {
    if json {
        if let Some(line) = event_json_line(event) {
            println!("{}", line);
        }
    } else if let Some(line) = EventFormatter::format_event(event) {
        println!("{}", line);
    }
}
