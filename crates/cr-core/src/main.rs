use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cr_core::app::{self, ReplayOutcome, ReplaySettings};
use cr_core::config::{config_path, Config};
use cr_core::logging;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Parser)]
#[command(name = "chatreplay", version, about = "Replay markdown transcripts as chat UI streams")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/chatreplay/config.toml).
    #[arg(long, global = true, env = "CHATREPLAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the content chunks of a markdown file as JSON lines.
    Parse {
        /// Source file, or `-` for stdin.
        file: String,
    },
    /// Stream a markdown file as Server-Sent Events.
    Replay {
        /// Source file, or `-` for stdin.
        file: String,
        /// Constant pause before every event, in milliseconds.
        #[arg(long)]
        delay: Option<u64>,
        /// Split text into word-sized deltas.
        #[arg(long)]
        words: bool,
        #[arg(long, default_value = "default")]
        session: String,
    },
    /// Print lorem-ipsum filler text.
    Filler {
        #[arg(long, default_value_t = 50)]
        words: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Re-render a markdown file with canonical tool blocks.
    Template {
        /// Source file, or `-` for stdin.
        file: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(config_path);
    let loaded = Config::load_from(&path);
    let config = loaded.as_ref().cloned().unwrap_or_default();
    logging::init(&config.logging);
    match &loaded {
        Ok(_) => debug!(path = %path.display(), "config loaded"),
        Err(e) => warn!("{e}, using defaults"),
    }

    match run(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &Config) -> Result<ExitCode> {
    let options = config.parser.options();
    let mut stdout = io::stdout().lock();

    match command {
        Command::Parse { file } => app::run_parse(&app::read_source(&file)?, &options, &mut stdout)?,
        Command::Template { file } => {
            app::run_template(&app::read_source(&file)?, &options, &mut stdout)?
        }
        Command::Filler { words, seed } => app::run_filler(words, seed, &mut stdout)?,
        Command::Replay {
            file,
            delay,
            words,
            session,
        } => {
            let source = app::read_source(&file)?;
            let settings = ReplaySettings::from_config(config, delay, words).with_session(session);

            let runtime = tokio::runtime::Runtime::new()?;
            let outcome = runtime.block_on(async {
                let cancel = CancellationToken::new();
                let on_signal = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        on_signal.cancel();
                    }
                });
                app::run_replay(source, settings, cancel, &mut stdout).await
            })?;

            if outcome == ReplayOutcome::Cancelled {
                return Ok(ExitCode::from(130));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn replay_flags() {
        let cli = Cli::parse_from(["chatreplay", "replay", "-", "--delay", "5", "--words"]);
        match cli.command {
            Command::Replay {
                file,
                delay,
                words,
                session,
            } => {
                assert_eq!(file, "-");
                assert_eq!(delay, Some(5));
                assert!(words);
                assert_eq!(session, "default");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
