use clap::{Parser, Subcommand};
use std::io::Write;

use kairos_cli::CliContext;
use kairos_cli::commands;
use kairos_cli::readline;

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ctx = CliContext::new();

    loop {
        let line = readline()?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, &ctx) {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                write!(std::io::stdout(), "{err}").map_err(|e| e.to_string())?;
                std::io::stdout().flush().map_err(|e| e.to_string())?;
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(version, about = "interactive timer scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or replace a timer firing after a delay
    Set {
        key: String,
        delay_ms: i64,
        #[arg(short, long, default_value_t = 0)]
        offset_ms: i64,
        #[arg(short, long)]
        expires_ms: Option<i64>,
    },
    /// Move the deadline of an existing timer
    Postpone {
        key: String,
        delay_ms: i64,
        #[arg(short, long, default_value_t = 0)]
        offset_ms: i64,
    },
    /// Remove a timer
    Unset { key: String },
    Clear,
    Pause,
    Resume,
    /// Show pending timers
    List {
        #[arg(long)]
        json: bool,
    },
    Stats,
    /// Generate a prefixed id token
    Id {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Toggle the process-wide activity flag
    Active { flag: bool },
    Exit,
}

fn respond(line: &str, ctx: &CliContext) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "kairos".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::Set {
            key,
            delay_ms,
            offset_ms,
            expires_ms,
        }) => commands::set(ctx, key, *delay_ms, *offset_ms, *expires_ms),
        Some(Commands::Postpone {
            key,
            delay_ms,
            offset_ms,
        }) => commands::postpone(ctx, key, *delay_ms, *offset_ms),
        Some(Commands::Unset { key }) => commands::unset(ctx, key),
        Some(Commands::Clear) => commands::clear(ctx),
        Some(Commands::Pause) => commands::pause(ctx),
        Some(Commands::Resume) => commands::resume(ctx),
        Some(Commands::List { json }) => commands::list(ctx, *json),
        Some(Commands::Stats) => commands::stats(ctx),
        Some(Commands::Id { prefix }) => commands::id(ctx, prefix),
        Some(Commands::Active { flag }) => commands::active(*flag),
        Some(Commands::Exit) => {
            commands::exit();
            return Ok(true);
        }
        None => {}
    }

    Ok(false)
}
