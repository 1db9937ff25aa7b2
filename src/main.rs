use anyhow::Result;
use clap::Parser;
use nefs::cli::{self, Commands};
use nefs::commands;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Logs go to stderr so `cat` output on stdout stays clean.
    // Only use colors when stderr is a TTY (not when piped to a file)
    let use_color = atty::is(atty::Stream::Stderr);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(true)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.cmd {
        Commands::Mount(args) => commands::cmd_mount(&cli.conn, args),
        Commands::Ping => commands::cmd_ping(&cli.conn),
        Commands::Stat(args) => commands::cmd_stat(&cli.conn, args),
        Commands::Ls(args) => commands::cmd_ls(&cli.conn, args),
        Commands::Cat(args) => commands::cmd_cat(&cli.conn, args),
    };

    if let Err(e) = &result {
        error!(target: "nefs::cli", "Error: {:#}", e);
        std::process::exit(1);
    }

    result
}
