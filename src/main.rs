mod chart;
mod cmd;
mod config;
mod error;
mod exec;
mod inspector;
mod pipeline;
mod probe;
mod progress;
mod repo;
mod web;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::GlobalOpts;

#[derive(Parser)]
#[command(name = "chartpeel")]
#[command(about = "Resolve the container image behind a Helm chart repository and report its size and layers")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Chart repository URL (shorthand for `chartpeel resolve <repo-url>`)
    repo_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web front end
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: SocketAddr,
    },

    /// Clone a chart repository, resolve its image and report size and layers
    Resolve {
        /// Chart repository URL
        repo_url: String,
    },

    /// Detect installed container runtimes
    Probe,

    /// Delete old repository checkouts
    Prune {
        /// Remove checkouts older than this, e.g. `12h`, `7days`
        #[arg(long, default_value = "24h", value_parser = humantime::parse_duration)]
        older_than: Duration,
    },
}

/// Log level used when `RUST_LOG` is unset. The server logs every request;
/// one-shot commands keep stderr for the spinner.
fn default_log_level(command: &Commands) -> &'static str {
    match command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve: `chartpeel <url>` is shorthand for `chartpeel resolve <url>`
    let command = match (cli.command, cli.repo_url) {
        (Some(command), _) => command,
        (None, Some(repo_url)) => Commands::Resolve { repo_url },
        (None, None) => {
            Cli::parse_from(["chartpeel", "--help"]);
            return Ok(());
        }
    };

    init_tracing(default_log_level(&command));

    match command {
        Commands::Serve { listen } => cmd::serve::run(listen, &cli.global).await?,
        Commands::Resolve { repo_url } => cmd::resolve::run(&repo_url, &cli.global).await?,
        Commands::Probe => cmd::probe::run(cli.global.json.is_some())?,
        Commands::Prune { older_than } => cmd::prune::run(&cli.global.storage_root, older_than)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level_by_command() {
        let serve = Cli::parse_from(["chartpeel", "serve"]).command.unwrap();
        assert_eq!(default_log_level(&serve), "info");

        let resolve = Cli::parse_from(["chartpeel", "resolve", "https://example.com/charts.git"])
            .command
            .unwrap();
        assert_eq!(default_log_level(&resolve), "warn");
        assert_eq!(default_log_level(&Commands::Probe), "warn");
    }
}
