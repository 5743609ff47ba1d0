use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::probe::{self, RuntimeInfo};
use crate::repo::RepoStore;

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct GlobalOpts {
    /// Override runtime selection (docker, podman, or a path to either binary)
    #[arg(long, global = true)]
    pub runtime: Option<String>,

    /// Directory that holds cloned repositories
    #[arg(long, global = true, default_value = "repo_db")]
    pub storage_root: PathBuf,

    /// Git binary used to fetch repositories
    #[arg(long, global = true, default_value = "git")]
    pub git: PathBuf,

    /// Upper bound for each external command (clone, pull, inspect), e.g. `90s`, `10m`
    #[arg(long, global = true, default_value = "10m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Keep each request's checkout instead of deleting it afterwards
    #[arg(long, global = true)]
    pub keep_checkouts: bool,

    /// Output as JSON (optionally to a file)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "-")]
    pub json: Option<String>,
}

/// Settings for running the resolution pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub runtime: RuntimeInfo,
    pub storage_root: PathBuf,
    pub git: PathBuf,
    pub command_timeout: Duration,
    pub keep_checkouts: bool,
}

impl AppConfig {
    pub fn init_from_cli(opts: &GlobalOpts) -> Result<Self> {
        let runtime = probe::select(opts.runtime.as_deref())?;
        Ok(Self {
            runtime,
            storage_root: opts.storage_root.clone(),
            git: opts.git.clone(),
            command_timeout: opts.timeout,
            keep_checkouts: opts.keep_checkouts,
        })
    }

    pub fn repo_store(&self) -> RepoStore {
        RepoStore::new(
            &self.storage_root,
            &self.git,
            self.command_timeout,
            self.keep_checkouts,
        )
    }
}
