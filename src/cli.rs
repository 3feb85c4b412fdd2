//! Interactive operator console read from stdin (§8).
//!
//! Grounded on `util/cli.cpp`'s `awaitCLI`/`handleCLICommands`: a line-based
//! command loop supporting `EXIT`, `CLEAR`, `PING`, `INFO`/`STATUS`, `HELP`,
//! and `PHPINIT`. Drops the original's raw-terminal arrow-key history
//! editing — that's terminal-driver plumbing orthogonal to serving HTTP, not
//! something this loop needs to reimplement to be a faithful operator
//! console. The core must keep functioning with stdin closed or redirected
//! from `/dev/null`, so a read error or EOF here just ends the loop quietly
//! rather than touching the server itself.

use crate::server::server_impl::Control;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP_TEXT: &str = "> Clear: Clears the terminal window\n\
  Exit: Exit Mercury\n\
  Help: List available commands\n\
  Info: View current utilization\n\
  PHPInit: Installs php-cgi via the system package manager\n\
  Ping: ???\n\
  Status: View current utilization";

/// Runs the command loop until `EXIT` is entered, stdin is closed, or a read
/// error occurs. Does not return control's shutdown itself — the caller
/// decides what to do once this future resolves (typically treating it the
/// same as a shutdown signal).
pub async fn run(control: Control) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("< ");
        let _ = std::io::Write::flush(&mut std::io::stdout());

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => return,
        };

        let command = line.trim().to_ascii_uppercase();
        if command.is_empty() {
            continue;
        }

        match command.as_str() {
            "EXIT" => {
                control.request_shutdown();
                return;
            }
            "CLEAR" => print!("\x1b[2J\x1b[H"),
            "PING" => println!("> Pong!"),
            "INFO" | "STATUS" => println!("> {}", control.usage()),
            "HELP" => println!("{HELP_TEXT}"),
            "PHPINIT" => run_php_init().await,
            _ => println!("> Unknown command, try \"help\""),
        }
    }
}

async fn run_php_init() {
    println!("> Running `sudo apt install php-cgi -y`");
    match tokio::process::Command::new("sudo")
        .args(["apt", "install", "php-cgi", "-y"])
        .status()
        .await
    {
        Ok(status) if status.success() => {
            println!("> PHP initialized successfully.");
            println!(
                "> If PHP is currently disabled, set EnablePHPCGI to `on` in your Mercury config and restart Mercury for this to take effect."
            );
        }
        Ok(status) => println!("> Failed to initialize PHP, exited with code {:?}", status.code()),
        Err(e) => println!("> Failed to run PHP setup: {e}"),
    }
}
