#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "straightedge: detect abusive node alignment in map edits",
    long_about = None
)]
struct Cli {
    /// Output format (defaults to pretty on a TTY, text otherwise).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Configuration file (default: ./straightedge.toml, then the user config dir).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Replay a diff stream and report aligned lines",
        long_about = "Replay a recorded diff stream against a history fixture. \
                      Changesets are evaluated once they stop appearing in the stream.",
        after_help = "EXAMPLES:\n    # Replay a stream\n    straightedge replay --events minute.stream --history history.json\n\n    # Include closing-pass counters, emit JSON\n    straightedge replay --events minute.stream --history history.json --stats --json"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        about = "Show the effective detector configuration",
        after_help = "EXAMPLES:\n    # Show thresholds and their source\n    straightedge config\n\n    # Preview an override\n    straightedge config --param min_alignment_modification_rate=50"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    straightedge completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STRAIGHTEDGE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "straightedge=debug,straightedge_core=debug,info"
        } else {
            "straightedge=info,straightedge_core=info,warn"
        })
    });

    let format = env::var("STRAIGHTEDGE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();
    let working_dir = env::current_dir()?;
    let config = cli.config.as_deref();
    debug!(?output, "starting");

    let command_result = match &cli.command {
        Commands::Replay(args) => cmd::replay::run_replay(args, config, &working_dir, output),
        Commands::Config(args) => cmd::config::run_config(args, config, &working_dir, output),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    };

    if let Err(err) = command_result {
        output::render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_subcommand_parses() {
        let cli = Cli::parse_from([
            "straightedge",
            "replay",
            "--events",
            "a.stream",
            "--history",
            "h.json",
            "--stats",
            "--param",
            "min_line_node_count=3",
        ]);
        let Commands::Replay(args) = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(args.events, PathBuf::from("a.stream"));
        assert!(args.stats);
        assert!(!args.keep_open);
        assert_eq!(args.params, vec!["min_line_node_count=3".to_string()]);
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from(["straightedge", "config", "--json", "--config", "x.toml"]);
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["straightedge", "--format", "text", "config"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn replay_requires_inputs() {
        assert!(Cli::try_parse_from(["straightedge", "replay", "--events", "a"]).is_err());
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["straightedge", "completions", "zsh"]);
        assert!(matches!(cli.command, Commands::Completions(_)));
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
