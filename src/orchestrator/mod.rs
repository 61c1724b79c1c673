//! Orchestrator. Discovers entity directories, schedules parsers across
//! the R1 → R2 → M dependency phases, and exposes the ingest/status/reset
//! CLI surface.

pub mod cli;
mod pipeline;
mod registry;
mod status;

use crate::config::Config;
use crate::save;
use crate::state::{State, StateStore};
use crate::writer::{CopyWriter, Writer};
use crate::ShutdownFlag;
use cli::{Cli, Command};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

pub const EXIT_OK: i32 = 0;
pub const EXIT_PARTIAL: i32 = 2;
pub const EXIT_INTERNAL: i32 = 70;

pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = Config::load(&cli.config)?;
    match cli.command {
        Command::Start => run_load(&mut config, false).await,
        Command::Resume => run_load(&mut config, true).await,
        Command::Test { limit } => {
            config.limit = Some(limit);
            run_load(&mut config, false).await
        }
        Command::Status => {
            let store = StateStore::new(config.state_file.clone());
            let state = store.load()?;
            let entities = registry::all_entity_names(config.authors_enabled());
            status::print_status(&state, &entities);
            Ok(EXIT_OK)
        }
        Command::Reset { yes } => {
            if !yes
                && !dialoguer::Confirm::new()
                    .with_prompt("delete the state file? the database is untouched")
                    .default(false)
                    .interact()
                    .unwrap_or(false)
            {
                println!("aborted");
                return Ok(EXIT_OK);
            }
            let store = StateStore::new(config.state_file.clone());
            status::reset(&store)?;
            println!("state file removed");
            Ok(EXIT_OK)
        }
    }
}

async fn run_load(config: &mut Config, resume: bool) -> anyhow::Result<i32> {
    let store = Arc::new(StateStore::new(config.state_file.clone()));
    if resume {
        let resumed = store.prepare_resume()?;
        store.save(&resumed)?;
    } else {
        store.save(&State::default())?;
    }

    let client = save::connect(&config.database).await?;
    let writer: Arc<dyn Writer> = Arc::new(CopyWriter::new(client, config.max_retries));
    log::info!("foreign-key disabling is a no-op against this constraint-free schema");

    let shutdown = ShutdownFlag::new();
    shutdown.install();

    let config = Arc::new(config.clone());
    let parallelism = config.parallel_parsers.max(1);

    let r1_ok = run_phase(
        registry::phase_r1(),
        &config,
        &writer,
        &store,
        &shutdown,
        parallelism,
    )
    .await;
    let r2_ok = run_phase(
        registry::phase_r2(config.authors_enabled()),
        &config,
        &writer,
        &store,
        &shutdown,
        parallelism,
    )
    .await;
    let m_ok = run_phase(registry::phase_m(), &config, &writer, &store, &shutdown, 1).await;

    let all_ok = r1_ok && r2_ok && m_ok;
    let entities = registry::all_entity_names(config.authors_enabled());
    let state = store.load()?;
    status::print_status(&state, &entities);

    Ok(if all_ok { EXIT_OK } else { EXIT_PARTIAL })
}

async fn run_phase(
    entities: Vec<(&'static str, registry::ParserCtor)>,
    config: &Arc<Config>,
    writer: &Arc<dyn Writer>,
    store: &Arc<StateStore>,
    shutdown: &ShutdownFlag,
    parallelism: usize,
) -> bool {
    if entities.is_empty() {
        return true;
    }
    log::info!(
        "starting phase: {}",
        entities.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", ")
    );
    let started = std::time::Instant::now();

    let results = stream::iter(entities.into_iter().map(|(name, ctor)| {
        let config = config.clone();
        let writer = writer.clone();
        let store = store.clone();
        let shutdown = shutdown.clone();
        async move {
            pipeline::run_entity(name, ctor, &config, writer.as_ref(), &store, &shutdown).await
        }
    }))
    .buffer_unordered(parallelism)
    .collect::<Vec<_>>()
    .await;

    let mut all_ok = true;
    for result in results {
        match result {
            Ok(ok) => all_ok &= ok,
            Err(e) => {
                log::error!("parser task error: {e}");
                all_ok = false;
            }
        }
    }
    log::info!("phase finished in {:?}", started.elapsed());
    all_ok
}
