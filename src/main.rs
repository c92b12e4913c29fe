//! rpipeline CLI: run a `|`-separated command line, or the phonebook lookup,
//! as a chain of processes connected by pipes.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};
use colored::Colorize;
use rpipeline::lookup::{lookup_stages, DEFAULT_PHONEBOOK};
use rpipeline::{parse_command_line, Pipeline, PipelineBuilder, StageStatus};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "rpipeline",
    version,
    about = "Run external programs as a pipeline connected by anonymous pipes."
)]
struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv). Any level also prints per-stage statuses.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run a pipeline given as one command line, e.g. "sort < in.txt | uniq -c > out.txt".
    Run {
        /// The command line; quote it so your shell does not split it first.
        command_line: String,
    },

    /// Print the phone numbers of every phonebook entry matching NAME.
    Lookup {
        /// Name to search for (letters, spaces and apostrophes).
        name: String,

        /// Phonebook file, one "Full Name,phone" entry per line.
        #[arg(long, env = "PHONEBOOK", default_value = DEFAULT_PHONEBOOK)]
        phonebook: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);
    let code = run(cli)?;
    std::process::exit(code);
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "rpipeline=warn",
        1 => "rpipeline=info",
        2 => "rpipeline=debug",
        _ => "rpipeline=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout belongs to the last stage
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Builds, waits, reports. Returns the exit code for this process.
fn run(cli: Cli) -> Result<i32> {
    let builder = match cli.command {
        Command::Run { command_line } => {
            let line = parse_command_line(&command_line)?;
            PipelineBuilder::new(line.stages)
                .stdin(line.stdin)
                .stdout(line.stdout)
        }
        Command::Lookup { name, phonebook } => {
            let stages = lookup_stages(&name, &phonebook)?;
            println!("phone number(s) for {name}:");
            PipelineBuilder::new(stages)
        }
    };

    let mut pipeline = builder.build().wrap_err("failed to start pipeline")?;
    info!(stages = pipeline.len(), "pipeline wired");

    let statuses = pipeline.wait().wrap_err("failed to collect stage statuses")?;
    if cli.verbose > 0 || statuses.iter().any(|s| !s.success()) {
        report(&pipeline, &statuses);
    }

    Ok(statuses.last().map(StageStatus::shell_code).unwrap_or(0))
}

fn report(pipeline: &Pipeline, statuses: &[StageStatus]) {
    for (index, (stage, status)) in pipeline.stages().iter().zip(statuses).enumerate() {
        let status_text = if status.success() {
            status.to_string().green()
        } else if status.is_broken_pipe() {
            status.to_string().yellow()
        } else {
            status.to_string().red()
        };
        eprintln!("{} {}: {}", format!("[{index}]").dimmed(), stage, status_text);
    }
}
