mod cli;
mod error;
mod signals;

use std::cell::RefCell;
use std::rc::Rc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use netpilot_config::{Config, LoggingSection};
use netpilot_core::{EventDispatcher, FileProfileStorage, Manager, ManagerConfig};

use crate::cli::Cli;
use crate::error::DaemonError;

fn main() {
    let cli = Cli::parse();

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(&cli) {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, logging: &LoggingSection, json: bool) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false);
    if json || logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: &Cli) -> Result<(), DaemonError> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(netpilot_config::config_path);
    let config =
        netpilot_config::load_config_from(&path).map_err(|source| DaemonError::ConfigLoad {
            path: path.display().to_string(),
            source,
        })?;

    if cli.print_config {
        let text = config
            .to_toml()
            .map_err(|source| DaemonError::ConfigInvalid { source })?;
        print!("{text}");
        return Ok(());
    }

    let manager_config = config
        .to_manager_config()
        .map_err(|source| DaemonError::ConfigInvalid { source })?;

    init_tracing(cli.verbose, &config.logging, cli.json_logs);
    info!(config = %path.display(), "netpilotd starting");

    // The Manager is single-threaded; everything runs on this one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)?;
    runtime.block_on(serve(manager_config, &config))
}

async fn serve(manager_config: ManagerConfig, config: &Config) -> Result<(), DaemonError> {
    let storage = FileProfileStorage::new(
        config.storage.global_dir.clone(),
        config.storage.user_dir.clone(),
        config.storage.user_profile_list.clone(),
    );
    let dispatcher = EventDispatcher::new();
    let manager = Manager::new(manager_config, dispatcher.clone(), Rc::new(storage));
    manager.start().map_err(|source| DaemonError::Startup {
        global_dir: config.storage.global_dir.display().to_string(),
        source,
    })?;
    info!(profiles = ?manager.profiles(), "manager started");

    let shutdown = CancellationToken::new();
    let watcher = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signals::wait_for_shutdown_signal().await {
            warn!(error = %e, "could not install signal handlers, shutting down");
        }
        watcher.cancel();
    });

    dispatcher.run(shutdown).await;
    info!("shutdown requested");

    run_termination_actions(&manager, &dispatcher).await;
    manager.stop();
    dispatcher.run_until_idle();
    info!("netpilotd stopped");
    Ok(())
}

/// Run registered termination actions, driving the dispatcher until they
/// finish or time out.
async fn run_termination_actions(manager: &Manager, dispatcher: &EventDispatcher) {
    let finished = CancellationToken::new();
    let outcome = Rc::new(RefCell::new(None));
    let fired = finished.clone();
    let slot = Rc::clone(&outcome);
    let started = manager.run_termination_actions_and_notify(Box::new(move |result| {
        *slot.borrow_mut() = Some(result);
        fired.cancel();
    }));
    if !started {
        return;
    }

    dispatcher.run(finished).await;
    let result = outcome.borrow_mut().take();
    match result {
        Some(Err(e)) => warn!(error = %e, "termination actions did not all complete"),
        _ => info!("termination actions complete"),
    }
}
