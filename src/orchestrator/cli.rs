use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(name = "oa-ingest", about = "Streaming ingestion engine for the OpenAlex bulk snapshot")]
pub struct Cli {
    #[arg(long, default_value = "oa-ingest.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// begin from scratch; ignores any existing state file
    Start,
    /// continue from the persisted StateStore
    Resume,
    /// print a snapshot of per-parser progress
    Status,
    /// delete the state file (the database is untouched)
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// convenience wrapper around `start` with a per-file record cap
    Test {
        #[arg(long)]
        limit: usize,
    },
}
