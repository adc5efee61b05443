//! Console Bot Example
//!
//! Reads command lines from stdin, dispatches them through a Herald runtime
//! and prints replies to stdout.
//!
//! ```text
//! > greet name:Alice times:2
//! Hello, Alice! Hello, Alice!
//! > add a:2 b:40
//! 42
//! > help greet
//! Command: greet
//! ...
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --user alice --guild home
//! ```
//!
//! Settings are read from `herald.toml` in the working directory when present;
//! `HERALD_LOGGING__LEVEL=debug` shows the dispatch pipeline.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use herald::prelude::*;
use herald::runtime::wait_for_signal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

#[derive(Debug, Parser)]
#[command(about = "Dispatch Herald commands typed on stdin")]
struct Args {
    /// Configuration file (defaults to herald.toml in the working directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(long)]
    profile: Option<String>,

    /// User id the commands are sent as.
    #[arg(short, long, default_value = "console")]
    user: String,

    #[arg(long, default_value = "console")]
    channel: String,

    /// Guild id; without one, guild-only commands are rejected.
    #[arg(long)]
    guild: Option<String>,
}

// ============================================================================
// Transport
// ============================================================================

struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn acknowledge(&self, interaction: &Interaction, ephemeral: bool) -> TransportResult<()> {
        debug!(label = interaction.label(), ephemeral, "Acknowledged");
        Ok(())
    }

    async fn reply(
        &self,
        _interaction: &Interaction,
        reply: &Reply,
        options: ReplyOptions,
    ) -> TransportResult<()> {
        let mut prefix = String::new();
        if options.stage == ReplyStage::FollowUp {
            prefix.push_str("↳ ");
        }
        if options.ephemeral {
            prefix.push_str("(only you) ");
        }
        println!("{prefix}{reply}");
        Ok(())
    }
}

// ============================================================================
// Controllers and handlers
// ============================================================================

#[derive(Default)]
struct Greeter;

async fn greet(_: Arc<Greeter>, _: CommandEvent, name: String, times: u8) -> String {
    vec![format!("Hello, {name}!"); times as usize].join(" ")
}

async fn here(_: Arc<Greeter>, event: CommandEvent) -> String {
    let interaction = event.interaction();
    format!(
        "You are in guild {} (channel {}).",
        interaction.guild_id().unwrap_or("?"),
        interaction.channel_id()
    )
}

/// One per session: every user/channel pair counts on its own.
#[derive(Default)]
struct Counter {
    hits: AtomicU64,
}

async fn count(counter: Arc<Counter>, event: CommandEvent) -> String {
    let hits = counter.hits.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{} has counted {hits} time(s).", event.session())
}

#[derive(Default)]
struct Calculator;

async fn add(_: Arc<Calculator>, _: CommandEvent, a: i64, b: i64) -> Result<String, String> {
    a.checked_add(b)
        .map(|sum| sum.to_string())
        .ok_or_else(|| format!("{a} + {b} overflows"))
}

async fn echo(_: Arc<Greeter>, event: CommandEvent, text: String) -> Option<String> {
    if text.eq_ignore_ascii_case("twice")
        && let Err(e) = event.reply("twice").await
    {
        warn!(error = %e, "Failed to send first echo");
    }
    Some(text)
}

async fn whisper(_: Arc<Greeter>, _: CommandEvent, text: String) -> String {
    format!("psst: {text}")
}

fn commands() -> Vec<herald::framework::CommandBuilder> {
    vec![
        command("greet")
            .description("Greets someone")
            .param(Param::new::<String>("name").describe("Who to greet"))
            .param(
                Param::new::<u8>("times")
                    .describe("How many times, 1 to 5")
                    .optional()
                    .default("1")
                    .constraint(Constraint::min(1))
                    .constraint(Constraint::max(5).message("At most 5 greetings at once.")),
            )
            .handler(greet),
        command("here")
            .description("Shows where you are")
            .guild_only(true)
            .handler(here),
        command("count")
            .description("Counts how often you called it")
            .handler(count),
        command("add")
            .description("Adds two integers")
            .param(Param::new::<i64>("a"))
            .param(Param::new::<i64>("b"))
            .handler(add),
        command("echo")
            .description("Repeats the text")
            .param(Param::new::<String>("text").concat())
            .handler(echo),
        command("whisper")
            .description("Replies only to you")
            .ephemeral(true)
            .param(Param::new::<String>("text").concat())
            .handler(whisper),
    ]
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut controllers = ControllerFactories::new();
    controllers
        .register_default::<Greeter>()
        .register_default::<Counter>()
        .register_default::<Calculator>();

    let mut builder = HeraldRuntime::builder()
        .commands(commands())
        .provider(controllers);
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?;
    runtime.start().await?;

    let transport: BoxedTransport = Arc::new(ConsoleTransport);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let signal = wait_for_signal();
    tokio::pin!(signal);

    println!(
        "Type a command, `{} <command>` for help, Ctrl+D to quit.",
        runtime.parser().help_label()
    );
    loop {
        tokio::select! {
            () = &mut signal => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let interaction = match runtime.parser().parse(&line, &args.user, &args.channel) {
                    Ok(interaction) => interaction,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                let interaction = match &args.guild {
                    Some(guild) => interaction.in_guild(guild),
                    None => interaction,
                };
                // Wait so replies print before the next prompt.
                runtime.submit(interaction, transport.clone())?.await?;
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}
