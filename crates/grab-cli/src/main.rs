//! grab - fetch, verify and run single-file binaries

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use grab_cli::ui::Verbosity;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "grab")]
#[command(author, version, about = "grab - fetch, verify and run single-file binaries")]
pub struct Cli {
    /// Print everything, including debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    silent: bool,

    /// Print nothing; the exit code reports failure
    #[arg(long, global = true)]
    extra_silent: bool,

    /// Do not cut output lines to the terminal width
    #[arg(
        long,
        global = true,
        env = "GRAB_NO_TRUNCATE",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    no_truncate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install binaries: name[#pkg_id[:version]][@repository] or a URL
    #[command(alias = "add")]
    Install {
        #[arg(required = true)]
        tokens: Vec<String>,
        /// Refetch even when the installed file already matches
        #[arg(short, long)]
        force: bool,
    },
    /// Remove installed binaries
    #[command(alias = "del")]
    Remove {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// List available binaries
    List {
        /// Show at most this many
        #[arg(short, long)]
        limit: Option<usize>,
        /// List installed binaries instead
        #[arg(short, long)]
        installed: bool,
    },
    /// Search available binaries
    Search {
        query: String,
        /// Show at most this many
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show everything the index knows about binaries
    Info {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Refetch installed binaries that changed upstream (all when none given)
    Update { tokens: Vec<String> },
    /// Run a binary without installing it
    Run {
        /// Prefer a binary of the same name already on PATH
        #[arg(short, long)]
        transparent: bool,
        token: String,
        /// Arguments for the binary
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.verbose, cli.silent, cli.extra_silent);

    let default_level = if verbosity == Verbosity::Verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match dispatch(cli, verbosity, cancel).await {
        Ok(code) => code,
        Err(e) => {
            if verbosity.shows_errors() {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli, verbosity: Verbosity, cancel: CancellationToken) -> Result<ExitCode> {
    let session = cmd::Session::open(verbosity, cli.no_truncate, cancel)?;

    let result = match cli.command {
        Commands::Install { tokens, force } => cmd::install::install(&session, &tokens, force).await,
        Commands::Remove { tokens } => cmd::remove::remove(&session, &tokens).await,
        Commands::List { limit, installed } => cmd::list::list(&session, limit, installed).await,
        Commands::Search { query, limit } => cmd::search::search(&session, &query, limit).await,
        Commands::Info { tokens } => cmd::info::info(&session, &tokens).await,
        Commands::Update { tokens } => cmd::update::update(&session, &tokens).await,
        Commands::Run {
            transparent,
            token,
            args,
        } => {
            let code = cmd::run::run(&session, &token, &args, transparent).await;
            session.output.flush().await;
            return code.map(exit_code);
        }
    };

    session.output.flush().await;
    result.map(|()| ExitCode::SUCCESS)
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    tracing::debug!("Interrupted, cancelling");
    cancel.cancel();
}
