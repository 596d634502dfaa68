//! `heatex-cli` – Heat Exchanger Dashboard Command Line Interface
//!
//! This binary is the ignition switch for the dashboard stack.  It:
//!
//! 1. Checks for `~/.heatex/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Boots the reading store, the dashboard loop and the browser cockpit.
//! 3. Drops the operator into an **interactive REPL** with slash-commands
//!    (`/mode`, `/reconnect`, `/status`, `/connections`, `/help`, …).
//! 4. Intercepts **Ctrl-C** and stops the dashboard cleanly.
//!
//! Logs go through `tracing` (`RUST_LOG`, `HEATEX_LOG_FORMAT=json`); the
//! operator-facing output uses `println!`.

mod config;
mod ignition;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use heatex_types::DataSourceMode;

use crate::ignition::Station;

fn main() {
    let _telemetry = heatex_runtime::init_tracing("heatex");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // Fires while a command is running; at the prompt the line editor reports
    // the interrupt itself.
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – finishing the current command …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(_)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }

    let cfg = config::load_or_default().unwrap_or_else(|_| {
        let mut cfg = config::Config::default();
        config::apply_env_overrides(&mut cfg);
        cfg
    });
    if cfg.pubsub_url.trim().is_empty() && cfg.initial_mode == DataSourceMode::RealtimeChannel {
        println!(
            "  {}  realtime mode needs {}; use {} to pick another source.",
            "pubsub_url is not set:".yellow(),
            "/settings".bold(),
            "/mode".bold()
        );
    }
    println!();

    // ── Ignition ──────────────────────────────────────────────────────────
    let station = match Station::ignite(&cfg) {
        Ok(station) => station,
        Err(e) => {
            println!("{}: {}", "Startup failed".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "\n  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&station, shutdown);

    station.shutdown();
    println!("{}", "  ✓ Dashboard stopped.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       heatex First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the dashboard.\n");

    let mut cfg = config::Config::default();

    // Data source
    println!("  Which data source should the dashboard start with?");
    println!("    1) Realtime channel  (default, needs a pub/sub service)");
    println!("    2) Database round trip");
    println!("    3) Simulator only");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    cfg.initial_mode = match choice.trim() {
        "2" => DataSourceMode::DatabaseRoundTrip,
        "3" => DataSourceMode::Simulator,
        _ => DataSourceMode::RealtimeChannel,
    };

    // Pub/sub service
    cfg.pubsub_url = prompt_line("  Pub/sub service URL (empty to skip): ", "");
    if !cfg.pubsub_url.is_empty() {
        cfg.pubsub_access_key = prompt_line("  Pub/sub access key (empty for none): ", "");
    }

    // Cockpit port
    let port_str = prompt_line(
        &format!("  Cockpit HTTP port [{}]: ", cfg.cockpit_port),
        &cfg.cockpit_port.to_string(),
    );
    if let Ok(p) = port_str.trim().parse::<u16>() {
        cfg.cockpit_port = p;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __               __          "#.bold().cyan());
    println!("{}", r#"  / /  ___ ___ _ __/ /______ __ "#.bold().cyan());
    println!("{}", r#" / _ \/ -_) _ `/ _  __/ -_) \ / "#.bold().cyan());
    println!("{}", r#"/_//_/\__/\_,_/  \__/\__/_\_\  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "heatex".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Heat Exchanger Efficiency Dashboard");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
