//! Avatar Sync CLI
//!
//! Usage:
//!   avatar-sync --script timeline.jsonl        # Replay a timeline on a manual clock
//!   avatar-sync --script timeline.jsonl --json # One JSON object per trace entry
//!   avatar-sync --serve                        # HTTP + WebSocket bridge
//!   avatar-sync --serve --config timings.json  # Override timing constants

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use avatar_sync::config::SyncConfig;
use avatar_sync::core::script::TraceDelivery;
use avatar_sync::core::{load_script, run_server, JsonFileStore, MemoryStore, ScriptRunner, TraceEntry, VisitorStore};
use avatar_sync::types::{Effect, OutboundCommand, UiNotice};
use avatar_sync::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "avatar-sync",
    version = VERSION,
    about = "Avatar Sync - keep an avatar's emotion, speech and introduction in step",
    long_about = "Avatar Sync reconciles backend message events, embedded runtime\n\
                  readiness signals and local audio playback into one ordered\n\
                  presentation sequence.\n\n\
                  Modes:\n  \
                  --script FILE  Replay a JSON-lines timeline on a manual clock\n  \
                  --serve        HTTP + WebSocket bridge on the system clock"
)]
struct Args {
    /// JSON-lines timeline to replay
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Virtual time to keep running after the last script step (ms)
    #[arg(long, default_value_t = 65_000)]
    settle_ms: u64,

    /// Run as HTTP + WebSocket bridge
    #[arg(long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// JSON file overriding timing constants
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Visitor record file (in memory if omitted)
    #[arg(long)]
    visitor_file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Debug-level logs
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.no_color {
        colored::control::set_override(false);
    }

    let config = match &args.config {
        Some(path) => match SyncConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{} {}", "Config error:".red(), e);
                std::process::exit(1);
            }
        },
        None => SyncConfig::default(),
    };

    if args.serve {
        run_serve(&args, config).await;
    } else if let Some(ref path) = args.script {
        run_script(path, &args, config);
    } else {
        let _ = Args::command().print_help();
        println!();
    }
}

/// `info` by default, `debug` with --verbose; RUST_LOG wins
fn init_logging(verbose: bool) {
    let default = if verbose { "avatar_sync=debug" } else { "avatar_sync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Replay a timeline and print the trace
fn run_script(path: &Path, args: &Args, config: SyncConfig) {
    let steps = match load_script(path) {
        Ok(steps) => steps,
        Err(e) => {
            eprintln!("{} {}", "Script error:".red(), e);
            std::process::exit(1);
        }
    };

    let mut runner = ScriptRunner::new(config);
    let trace = runner.run(&steps, args.settle_ms).to_vec();

    if args.json {
        for entry in &trace {
            match serde_json::to_string(entry) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("{} {}", "Encode error:".red(), e),
            }
        }
        return;
    }

    print_header(&path.display().to_string(), steps.len());
    for entry in &trace {
        print_entry(entry);
    }
    print_summary(&runner);
}

fn print_header(script: &str, steps: usize) {
    println!("{}", format!("Avatar Sync v{} - replay", VERSION).bold());
    println!("{} {} ({} steps)", "script:".dimmed(), script, steps);
    println!();
}

fn print_entry(entry: &TraceEntry) {
    match entry {
        TraceEntry::Delivery { at, attempt } => print_delivery(*at, attempt),
        TraceEntry::Effect { at, effect } => print_effect(*at, effect),
    }
}

fn print_delivery(at: u64, attempt: &TraceDelivery) {
    let stamp = format!("{:>8}ms", at).dimmed();
    let command: Option<OutboundCommand> = serde_json::from_value(attempt.payload.clone()).ok();
    let text = match command {
        Some(cmd) => {
            let kind = serde_json::to_value(cmd.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let mut line = format!("#{} {}", cmd.sequence, kind);
            if let Some(emotion) = &cmd.emotion {
                line.push_str(&format!(" {}", emotion));
            }
            if let Some(talking) = cmd.talking {
                line.push_str(if talking { " talking" } else { " idle" });
            }
            if let Some(reason) = cmd.reason {
                line.push_str(&format!(" ({})", reason));
            }
            if let Some(conversation) = &cmd.conversation_id {
                line.push_str(&format!(" [{}]", conversation));
            }
            line
        }
        None => attempt.payload.to_string(),
    };
    if attempt.delivered {
        println!("{} {} {}", stamp, "runtime  ->".green(), text);
    } else {
        println!("{} {} {}", stamp, "runtime  x ".red(), text.red());
    }
}

fn print_effect(at: u64, effect: &Effect) {
    let stamp = format!("{:>8}ms", at).dimmed();
    match effect {
        Effect::Server { event } => {
            let body = serde_json::to_string(event).unwrap_or_default();
            println!("{} {} {}", stamp, "server   ->".cyan(), body);
        }
        Effect::Ui { notice } => {
            let text = match notice {
                UiNotice::Message { kind, text } => format!("{:?}: {}", kind, text.replace('\n', " / ")),
                UiNotice::Suggestions { items } => format!("suggestions: {}", items.join(" | ")),
                UiNotice::Error { text } => format!("error: {}", text).red().to_string(),
                UiNotice::LevelChanged { level, name } => format!("relationship level {} ({})", level, name),
                UiNotice::QuizChoices => "quiz choices shown".to_string(),
                UiNotice::QuizOptions { question_index, options } => {
                    format!("question {} options: {}", question_index + 1, options.join(" | "))
                }
                UiNotice::Survey { score } => format!("survey (score {})", score),
            };
            println!("{} {} {}", stamp, "ui       ->".yellow(), text);
        }
    }
}

fn print_summary(runner: &ScriptRunner) {
    let core = runner.orchestrator();
    let status = core.status();
    let attempts = runner.runtime().attempts();
    let failed = attempts.iter().filter(|a| !a.delivered).count();

    println!();
    println!("{}", "summary".bold());
    println!("  deliveries    {} ({} failed)", attempts.len(), failed);
    println!(
        "  emotion       {} {}",
        status.emotion.emotion,
        if status.emotion.talking { "talking" } else { "idle" }
    );
    println!("  introduction  {}", status.introduction);
    println!("  audio plays   {}", runner.audio().plays().len());
    println!("  timers left   {}", status.scheduled_timers);
    println!("  {}", status.to_terminal_string());

    if status.emotion.is_neutral() && status.active_turn.is_none() {
        println!("  {}", "avatar at rest".green());
    } else {
        println!("  {}", "avatar not at rest".red());
    }
}

/// Run HTTP + WebSocket bridge
async fn run_serve(args: &Args, config: SyncConfig) {
    println!();
    println!("{}", format!("Avatar Sync bridge v{}", VERSION).bold());
    println!("  GET  /health           - Health check");
    println!("  GET  /status           - Status snapshot");
    println!("  POST /events/server    - Backend event");
    println!("  POST /events/runtime   - Runtime frame message");
    println!("  POST /events/callback  - Runtime callback");
    println!("  POST /events/custom    - Window custom event");
    println!("  POST /events/audio     - Audio callback");
    println!("  POST /connection       - Connection status");
    println!("  POST /audio/ready      - Local audio ready");
    println!("  GET  /effects          - Drain effects");
    println!("  WS   /ws/runtime       - Runtime bridge");
    println!();

    let store: Box<dyn VisitorStore> = match &args.visitor_file {
        Some(path) => Box::new(JsonFileStore::new(path)),
        None => Box::new(MemoryStore::new()),
    };

    if let Err(e) = run_server(&args.addr, config, store).await {
        eprintln!("{} {}", "Server error:".red(), e);
        std::process::exit(1);
    }
}
