use clap::Parser;
use std::process;

use treesync::cli::commands::{init, watch};
use treesync::cli::{Cli, Commands};
use treesync::{Settings, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };
    if let Some(level) = cli.log_level {
        settings.logging.default = level;
    }

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(Settings::default_config_path);
            init::run_init(&path, force);
        }
        Commands::Config => {
            init::run_config(&settings);
        }
        Commands::Watch {
            root,
            status_interval,
            json,
        } => {
            let args = watch::WatchArgs {
                root,
                status_interval,
                json,
            };
            if let Err(e) = watch::run(args, settings).await {
                eprintln!("Error: {e:#}");
                process::exit(1);
            }
        }
    }
}
