//! CLI binary for the lecture tutor.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lecture_tutor::chat::ChatUpdate;
use lecture_tutor::{
    FileStore, LectureChat, LectureContext, MemoryStore, Preferences, SessionStore, TeachingMode,
    TurnOutcome, TutorClient, TutorConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Lecture tutor: ask questions about the lecture you are watching.
#[derive(Parser)]
#[command(name = "tutor", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend credential (falls back to stored preferences).
    #[arg(long, env = "TUTOR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Override the backend base URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Chat about one lecture in the terminal.
    Chat {
        /// Lecture identifier.
        #[arg(long)]
        lecture_id: String,

        /// Course title.
        #[arg(long)]
        course_title: String,

        /// Position of the lecture in the course.
        #[arg(long, default_value_t = 1)]
        lecture_order: u32,

        /// Start in `teach` or `fix` mode.
        #[arg(long)]
        mode: Option<TeachingMode>,
    },

    /// Check a credential against the backend.
    Verify {
        /// Remember the key in preferences when it is accepted.
        #[arg(long)]
        save: bool,
    },

    /// Print backend health.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Keep dependency logs quiet unless RUST_LOG asks for them.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lecture_tutor=info,reqwest=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(TutorConfig::default_config_path);
    let mut config = if config_path.exists() {
        TutorConfig::from_file(&config_path)?
    } else {
        TutorConfig::default()
    };
    if let Some(base_url) = cli.base_url.clone() {
        config.api.base_url = base_url;
    }
    config.validate()?;

    let durable = FileStore::new(&config.session.data_dir)?;
    let mut prefs = Preferences::load(&durable).await;
    let api_key = cli.api_key.clone().or_else(|| prefs.api_key.clone());
    let client = TutorClient::new(config.api.clone())?;

    match cli.command {
        Command::Health => {
            let health = client.health().await?;
            println!("status: {}", health.status);
            println!("streaming available: {}", health.streaming_available());
            if let Some(connected) = health.qdrant_connected {
                println!("vector store connected: {connected}");
            }
            Ok(())
        }
        Command::Verify { save } => {
            let key = api_key.ok_or_else(|| anyhow::anyhow!("no API key: pass --api-key or set TUTOR_API_KEY"))?;
            let verification = client.verify_key(&key).await?;
            if verification.ok {
                println!("API key accepted");
                if save {
                    prefs.api_key = Some(key);
                    prefs.save(&durable).await?;
                    println!("saved to preferences");
                }
            } else {
                println!(
                    "API key rejected: {}",
                    verification.message.as_deref().unwrap_or("no reason given")
                );
            }
            Ok(())
        }
        Command::Chat {
            lecture_id,
            course_title,
            lecture_order,
            mode,
        } => {
            let key = api_key.ok_or_else(|| {
                anyhow::anyhow!("no API key: pass --api-key, set TUTOR_API_KEY or run `tutor verify --save`")
            })?;
            let mut chat_config = config.chat.clone();
            chat_config.teaching_mode = mode.unwrap_or(prefs.teaching_mode);
            chat_config.response_style = prefs.response_style;

            let context = LectureContext::new(lecture_id, course_title, lecture_order)?;
            run_chat(client, context, key, &config, &chat_config, &durable, prefs).await
        }
    }
}

async fn run_chat(
    client: TutorClient,
    context: LectureContext,
    api_key: String,
    config: &TutorConfig,
    chat_config: &lecture_tutor::config::ChatConfig,
    durable: &FileStore,
    mut prefs: Preferences,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let sessions = SessionStore::new(MemoryStore::new(), config.session.max_messages);
    let chat = LectureChat::open(client, sessions, context, api_key, chat_config)
        .await
        .with_fallback(config.api.fallback_on_unavailable)
        .with_updates(tx);
    let printer = tokio::spawn(print_updates(rx));

    println!("Lecture tutor v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Chatting about {} (lecture {}). Mode: {}.",
        chat.context().course_title,
        chat.context().lecture_order,
        chat_config.teaching_mode.as_str()
    );
    println!("Commands: /hint, /reveal, /mode teach|fix, /reset, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let result = match line.split_once(' ').map_or((line, ""), |(c, a)| (c, a.trim())) {
            ("", _) => continue,
            ("/quit", _) => break,
            ("/hint", _) => chat.advance_hint().await.map(Some),
            ("/reveal", _) => chat.reveal_hint().await.map(Some),
            ("/reset", _) => chat.reset().await.map(|()| {
                println!("conversation cleared");
                None
            }),
            ("/mode", arg) => match arg.parse::<TeachingMode>() {
                Ok(mode) => {
                    chat.set_mode(mode).await;
                    prefs.teaching_mode = mode;
                    if let Err(e) = prefs.save(durable).await {
                        warn!("could not save preferences: {e}");
                    }
                    println!("mode: {}", mode.as_str());
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            _ => chat.submit(line, None).await.map(Some),
        };

        match result {
            Ok(Some(outcome)) => {
                info!(?outcome, "turn complete");
                if outcome == TurnOutcome::Cached {
                    // The printer shows cached answers from the transcript.
                    if let Some(last) = chat.transcript().await.last() {
                        println!("{}\n", last.content);
                    }
                }
                if chat.hint_controls_visible().await {
                    println!("(type /hint for a stronger hint or /reveal for the full answer)");
                }
            }
            Ok(None) => {}
            Err(e) => println!("! {}", e.message()),
        }
    }

    // Dropping the chat closes the update channel and ends the printer.
    drop(chat);
    let _ = printer.await;
    Ok(())
}

async fn print_updates(mut rx: mpsc::UnboundedReceiver<ChatUpdate>) {
    let mut stdout = std::io::stdout();
    while let Some(update) = rx.recv().await {
        match update {
            ChatUpdate::Token { text, .. } => {
                print!("{text}");
                let _ = stdout.flush();
            }
            ChatUpdate::Finalized {
                references,
                show_references,
                ..
            } => {
                println!();
                if show_references {
                    for r in references {
                        println!("  [{} / {} @ {}] {}", r.chapter_title, r.lecture_title, r.timestamp, r.url);
                    }
                }
                println!();
            }
            ChatUpdate::ErrorMessage { text } => println!("\n{text}\n"),
            ChatUpdate::CacheHit { .. } => println!("(answered from this session's cache)"),
            ChatUpdate::RateLimitNotice { visible: true } => {
                println!("** {} **", lecture_tutor::chat::RATE_LIMIT_NOTICE);
            }
            ChatUpdate::RateLimitNotice { visible: false } => println!("(rate limit cleared)"),
            ChatUpdate::TurnStarted { .. }
            | ChatUpdate::Composing { .. }
            | ChatUpdate::TranscriptChanged { .. } => {}
        }
    }
}
