use clap::Parser;
use oa_ingest::orchestrator::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                e.print().ok();
                std::process::exit(0);
            }
            _ => {
                e.print().ok();
                std::process::exit(64);
            }
        },
    };

    let log_dir = oa_ingest::config::Config::load(&cli.config)
        .map(|c| c.log_dir)
        .unwrap_or_else(|_| std::path::PathBuf::from("logs"));
    if let Err(e) = oa_ingest::init_logging(&log_dir) {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(70);
    }

    match oa_ingest::orchestrator::run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("fatal: {e:#}");
            std::process::exit(70);
        }
    }
}
