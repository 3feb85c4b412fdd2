//! Process entry point: load config, start logging, launch the server,
//! and wait for a shutdown signal or operator `EXIT` (§8).
//!
//! Grounded on `main.cpp`: install a signal handler before anything else,
//! load the config (exiting non-zero on failure), start every enabled
//! listener, print a short banner, then block until interrupted. `catchSig`'s
//! "log, tear down, exit" sequence becomes `Handle::shutdown` here; the
//! thread-per-listener `join()` loop becomes awaiting the task set inside it.

use mercury::{init_logging, run_cli, Config, Mercury};
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_CONFIG_PATH: &str = "conf/mercury.xml";
const DEFAULT_MIMES_PATH: &str = "conf/mimes.conf";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    ignore_sigpipe();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mimes_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_MIMES_PATH));

    let config = match Config::load(&config_path, &mimes_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guards = match init_logging(&config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Failed to start logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let handle = match Mercury::new(config).launch().await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("all listeners failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    print_welcome_banner();

    let control = handle.control();
    let cli_task = tokio::spawn(run_cli(control.clone()));

    wait_for_shutdown_signal().await;
    println!("\nIntercepted exit signal, closing...");

    control.request_shutdown();
    cli_task.abort();
    handle.shutdown().await;

    println!("Process killed successfully.");
    ExitCode::SUCCESS
}

fn print_welcome_banner() {
    println!("------------------------------------");
    println!("|{:^36}|", format!("Mercury {VERSION}"));
    println!("|           ...........             |");
    println!("|         Ctrl+C to close.          |");
    println!("------------------------------------");
}

/// Ignores `SIGPIPE` so a client that closes its read side mid-write turns
/// into an `EPIPE` on the next socket write, not process termination.
fn ignore_sigpipe() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigabrt = signal(SignalKind::from_raw(libc::SIGABRT)).expect("failed to install SIGABRT handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
        _ = sigabrt.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
