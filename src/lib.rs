pub mod batch;
pub mod config;
pub mod error;
pub mod error_sink;
pub mod id;
pub mod orchestrator;
pub mod parsers;
pub mod reader;
pub mod save;
pub mod state;
pub mod writer;

/// snapshot directory entry naming convention shared by every parser
pub const PART_FILE_GLOB: &str = "part_";

/// default COPY batch threshold, overridable via Config::batch_size
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// initialize logging to both terminal and a per-run file under `log_dir`.
pub fn init_logging(log_dir: &std::path::Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(log_dir.join(format!("{time}.log")))?,
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

/// an atomic flag flipped by a Ctrl-C handler; checked by the orchestrator
/// between files so in-flight files finish before shutdown.
#[derive(Clone, Default)]
pub struct ShutdownFlag(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn trip(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// install a Ctrl-C handler that flips this flag on first signal and
    /// force-exits on a second, mirroring the teacher's hard-exit escape
    /// hatch for an operator who really wants to stop immediately.
    pub fn install(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if flag.requested() {
                    eprintln!();
                    log::warn!("forcing exit");
                    std::process::exit(130);
                }
                log::warn!("shutdown requested, finishing in-flight files");
                flag.trip();
            }
        });
    }
}

/// progress bar for interactive runs; degrades gracefully when not a tty
/// since indicatif itself detects that.
pub fn progress(n: usize) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_millis(500);
    let style =
        "{spinner:.cyan} {elapsed} ~ {percent:>3}% {wide_bar:.cyan} {pos}/{len} ({per_sec})";
    let style = indicatif::ProgressStyle::with_template(style)
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());
    let bar = indicatif::ProgressBar::new(n as u64);
    bar.set_style(style);
    bar.enable_steady_tick(tick);
    bar
}
