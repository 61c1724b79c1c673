//! Human-readable rendering for the `status` and `reset` subcommands.

use crate::state::{State, Status, StateStore};
use colored::Colorize;

pub fn print_status(state: &State, entities: &[&'static str]) {
    println!("{:<16} {:<10} {:>10} {:>10} {:>10} {:<20}", "parser", "status", "files", "records", "errors", "last file");
    for name in entities {
        match state.parsers.get(*name) {
            Some(progress) => {
                let status_text = format!("{:?}", progress.status).to_lowercase();
                let status_text = match progress.status {
                    Status::Done => status_text.green(),
                    Status::Failed => status_text.red(),
                    Status::Running => status_text.yellow(),
                    Status::Pending => status_text.normal(),
                };
                println!(
                    "{:<16} {:<10} {:>6}/{:<6} {:>10} {:>10} {:<20}",
                    name,
                    status_text,
                    progress.files_processed,
                    progress.files_discovered,
                    progress.records,
                    progress.errors,
                    progress.last_file.as_deref().unwrap_or("-"),
                );
            }
            None => {
                println!("{:<16} {:<10}", name, "pending".normal());
            }
        }
    }
}

/// deletes the state file; the database itself is untouched.
pub fn reset(store: &StateStore) -> anyhow::Result<()> {
    store.delete()?;
    Ok(())
}
