//! REPL – Read-Eval-Print Loop for the heatex operator shell.
//!
//! Supported slash-commands:
//!   /help            – show this list
//!   /mode [name]     – show or select the data source
//!   /reconnect       – manual reconnect of the realtime channel
//!   /status          – status query, current reading and efficiency history
//!   /connections     – persistence and realtime diagnostics
//!   /readings        – the 10 most recent persisted readings
//!   /insert          – persist the reading currently on display
//!   /publish [n]     – publish n simulated readings to the realtime channel
//!   /watch [secs]    – stream live display frames for a while
//!   /settings        – edit `~/.heatex/config.toml`
//!   /quit | /exit    – gracefully exit

use colored::Colorize;
use heatex_memory::ReadingStore;
use heatex_middleware::{Negotiator, Topic, TopicReceiver};
use heatex_runtime::efficiency;
use heatex_types::{ChannelState, DataSourceMode, DisplayUpdate, EventPayload, ReconnectStatus};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{self, Config};
use crate::ignition::Station;

const PROMPT: &str = "heatex> ";
const READINGS_SHOWN: usize = 10;
const MAX_PUBLISH: usize = 100;
const DEFAULT_WATCH_SECS: u64 = 10;
const MAX_WATCH_SECS: u64 = 600;
/// How often a quiet `/watch` checks for Ctrl-C.
const WATCH_WAKE: Duration = Duration::from_millis(250);

/// A parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Mode(Option<DataSourceMode>),
    Reconnect,
    Status,
    Connections,
    Readings,
    Insert,
    Publish(usize),
    Watch(u64),
    Settings,
    Quit,
    /// A known command with bad arguments; carries the usage hint.
    Usage(String),
    Unknown(String),
}

/// Parse one input line.  `None` for blank input.
pub fn parse_command(line: &str) -> Option<ReplCommand> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    let arg = words.next();
    let parsed = match command {
        "/help" => ReplCommand::Help,
        "/mode" => match arg.map(str::parse::<DataSourceMode>) {
            None => ReplCommand::Mode(None),
            Some(Ok(mode)) => ReplCommand::Mode(Some(mode)),
            Some(Err(_)) => ReplCommand::Usage("/mode [simulator|database|realtime]".to_string()),
        },
        "/reconnect" => ReplCommand::Reconnect,
        "/status" => ReplCommand::Status,
        "/connections" => ReplCommand::Connections,
        "/readings" => ReplCommand::Readings,
        "/insert" => ReplCommand::Insert,
        "/publish" => match arg.map(str::parse::<usize>) {
            None => ReplCommand::Publish(1),
            Some(Ok(n)) if (1..=MAX_PUBLISH).contains(&n) => ReplCommand::Publish(n),
            Some(_) => ReplCommand::Usage(format!("/publish [n]  (1-{MAX_PUBLISH})")),
        },
        "/watch" => match arg.map(str::parse::<u64>) {
            None => ReplCommand::Watch(DEFAULT_WATCH_SECS),
            Some(Ok(secs)) if (1..=MAX_WATCH_SECS).contains(&secs) => ReplCommand::Watch(secs),
            Some(_) => ReplCommand::Usage(format!("/watch [seconds]  (1-{MAX_WATCH_SECS})")),
        },
        "/settings" => ReplCommand::Settings,
        "/quit" | "/exit" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    };
    Some(parsed)
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(station: &Station, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };
        let _ = editor.add_history_entry(line.trim());

        match command {
            ReplCommand::Help => cmd_help(),
            ReplCommand::Mode(mode) => cmd_mode(station, mode),
            ReplCommand::Reconnect => cmd_reconnect(station),
            ReplCommand::Status => cmd_status(station),
            ReplCommand::Connections => cmd_connections(station),
            ReplCommand::Readings => cmd_readings(station),
            ReplCommand::Insert => cmd_insert(station),
            ReplCommand::Publish(n) => cmd_publish(station, n),
            ReplCommand::Watch(secs) => cmd_watch(station, secs, &shutdown),
            ReplCommand::Settings => cmd_settings(&mut editor),
            ReplCommand::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            ReplCommand::Usage(usage) => println!("{} {}", "Usage:".yellow(), usage.bold()),
            ReplCommand::Unknown(other) => println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "heatex Commands".bold().underline());
    println!("  {}  – show or select simulator / database / realtime", "/mode [name]".bold().cyan());
    println!("  {}     – reconnect the realtime channel", "/reconnect".bold().cyan());
    println!("  {}        – status, current reading and efficiency trend", "/status".bold().cyan());
    println!("  {}   – persistence and realtime diagnostics", "/connections".bold().cyan());
    println!("  {}      – latest persisted readings", "/readings".bold().cyan());
    println!("  {}        – persist the reading on display", "/insert".bold().cyan());
    println!("  {}   – publish simulated readings to the channel", "/publish [n]".bold().cyan());
    println!("  {} – stream live readings (Ctrl-C stops)", "/watch [secs]".bold().cyan());
    println!("  {}      – edit ~/.heatex/config.toml", "/settings".bold().cyan());
    println!("  {}  – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_mode(station: &Station, mode: Option<DataSourceMode>) {
    let result = match mode {
        Some(mode) => station.block_on(station.dashboard.set_mode(mode)),
        None => station.block_on(station.dashboard.status()),
    };
    match result {
        Ok(status) => {
            let modes: Vec<String> = DataSourceMode::ALL
                .iter()
                .map(|m| {
                    if *m == status.mode {
                        format!("▶ {m}").green().bold().to_string()
                    } else {
                        format!("  {m}")
                    }
                })
                .collect();
            println!("  {}", modes.join("   "));
            print_label(station);
        }
        Err(e) => println!("{}: {}", "Error".red(), e),
    }
}

fn cmd_reconnect(station: &Station) {
    match station.block_on(station.dashboard.manual_reconnect()) {
        Ok(status) => {
            println!("{} attempt budget reset", "✓".green());
            print_status(&status);
        }
        Err(e) => println!("{}: {}", "Error".red(), e),
    }
}

fn cmd_status(station: &Station) {
    let status = station.block_on(station.dashboard.status());
    let snapshot = station.block_on(station.dashboard.snapshot());
    match (status, snapshot) {
        (Ok(status), Ok(snapshot)) => {
            println!("{}", "Dashboard Status".bold().underline());
            print_status(&status);
            print_snapshot(&snapshot);
        }
        (Err(e), _) | (_, Err(e)) => println!("{}: {}", "Error".red(), e),
    }
}

fn cmd_connections(station: &Station) {
    println!("{}", "Connection Diagnostics".bold().underline());

    match station.block_on(station.store.probe()) {
        Ok(info) => println!(
            "  {} {} at {} ({} readings)",
            "🟢".green(),
            info.backend.bold(),
            info.location.dimmed(),
            info.row_count
        ),
        Err(e) => println!("  {} Reading store: {}", "🔴".red(), e.to_string().red()),
    }

    if station.pubsub_configured {
        match station.block_on(station.negotiator.negotiate("heatex-diagnostic")) {
            Ok(descriptor) => {
                let endpoint = descriptor.url.split('?').next().unwrap_or_default().to_string();
                println!("  {} Realtime negotiation OK: {}", "🟢".green(), endpoint.dimmed());
            }
            Err(e) => println!("  {} Realtime negotiation: {}", "🔴".red(), e.to_string().red()),
        }
    } else {
        println!("  {} Realtime channel: {}", "🟡".yellow(), "pubsub_url not configured".dimmed());
    }

    println!(
        "  {} Cockpit: {}",
        "🟢".green(),
        format!("http://localhost:{}", station.cockpit_port).bold()
    );
}

fn cmd_readings(station: &Station) {
    match station.block_on(station.store.list_recent(READINGS_SHOWN)) {
        Ok(rows) if rows.is_empty() => println!("  {}", "No readings stored yet.".dimmed()),
        Ok(rows) => {
            println!(
                "  {:<19}  {:>6}  {:>6}  {:>6}  {:>6}  {:>6}",
                "timestamp".bold(),
                "T1",
                "T2",
                "T3",
                "T4",
                "eff %"
            );
            for row in rows {
                let r = row.reading;
                println!(
                    "  {:<19}  {:>6.1}  {:>6.1}  {:>6.1}  {:>6.1}  {:>6.1}",
                    row.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                    r.t1_outdoor_air_in,
                    r.t2_supply_air,
                    r.t3_extract_air,
                    r.t4_exhaust_air_out,
                    efficiency(&r)
                );
            }
        }
        Err(e) => println!("{}: {}", "Error".red(), e),
    }
}

fn cmd_insert(station: &Station) {
    let result = station.block_on(async {
        let snapshot = station.dashboard.snapshot().await?;
        Ok::<_, heatex_types::DashboardError>(station.store.insert(&snapshot.reading).await?)
    });
    match result {
        Ok(row) => println!("{} reading stored as {}", "✓".green(), row.id.to_string().dimmed()),
        Err(e) => println!("{}: {}", "Error".red(), e),
    }
}

fn cmd_publish(station: &Station, count: usize) {
    for i in 1..=count {
        let reading = station.simulator.sample();
        match station.block_on(station.publisher.publish(&reading)) {
            Ok(()) => println!(
                "  {} [{i}/{count}] T1 {:.1}  T2 {:.1}  T3 {:.1}  T4 {:.1}",
                "✓".green(),
                reading.t1_outdoor_air_in,
                reading.t2_supply_air,
                reading.t3_extract_air,
                reading.t4_exhaust_air_out
            ),
            Err(e) => {
                println!("{}: {}", "Publish failed".red(), e);
                break;
            }
        }
    }
}

fn cmd_watch(station: &Station, secs: u64, shutdown: &AtomicBool) {
    println!("  Watching live readings for {secs}s …");
    let frames = station.bus.subscribe_to(Topic::Display);
    let shown = station.block_on(async {
        let until = Instant::now() + Duration::from_secs(secs);
        watch_frames(frames, until, shutdown, |update| println!("  {}", watch_line(update))).await
    });
    if shown == 0 {
        println!("  {}", "No new readings arrived.".dimmed());
    }
}

fn cmd_settings(editor: &mut DefaultEditor) {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    println!("  (press Enter to keep the current value)");

    let port = prompt(editor, &format!("  Cockpit port   [{}]: ", cfg.cockpit_port));
    if !port.is_empty() {
        match port.parse::<u16>() {
            Ok(p) => cfg.cockpit_port = p,
            Err(_) => println!("  {} '{}' is not a valid port number", "Warning:".yellow(), port),
        }
    }

    let url = prompt(editor, &format!("  Pub/sub URL    [{}]: ", cfg.pubsub_url));
    if !url.is_empty() {
        cfg.pubsub_url = url;
    }

    let key_state = if cfg.pubsub_access_key.is_empty() { "not set" } else { "set" };
    let key = prompt(editor, &format!("  Access key     [{key_state}]: "));
    if !key.is_empty() {
        cfg.pubsub_access_key = key;
    }

    let mode = prompt(editor, &format!("  Initial mode   [{}]: ", cfg.initial_mode));
    if !mode.is_empty() {
        match mode.parse::<DataSourceMode>() {
            Ok(m) => cfg.initial_mode = m,
            Err(e) => println!("  {} {}", "Warning:".yellow(), e),
        }
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold(),
            "(applied on next start)".dimmed()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn print_label(station: &Station) {
    if let Ok(snapshot) = station.block_on(station.dashboard.snapshot()) {
        println!("  {}", snapshot.status.bold());
    }
}

fn print_status(status: &ReconnectStatus) {
    let state = status.channel_state.to_string();
    let state = match status.channel_state {
        ChannelState::Open => state.green(),
        ChannelState::Failed => state.red(),
        ChannelState::AwaitingRetry | ChannelState::Connecting => state.yellow(),
        ChannelState::Idle => state.dimmed(),
    };
    println!("  Mode          : {}", status.mode.to_string().bold());
    println!("  Channel       : {state}");
    println!("  Attempts      : {}/{}", status.attempt_count, status.max_attempts);
    println!("  Retry pending : {}", status.has_pending_retry);
}

fn print_snapshot(snapshot: &DisplayUpdate) {
    let r = snapshot.reading;
    println!("  Status        : {}", snapshot.status.bold());
    println!(
        "  Temperatures  : T1 {:.1} °C  T2 {:.1} °C  T3 {:.1} °C  T4 {:.1} °C",
        r.t1_outdoor_air_in, r.t2_supply_air, r.t3_extract_air, r.t4_exhaust_air_out
    );
    println!("  Efficiency    : {}", format!("{:.1} %", snapshot.efficiency).green().bold());
    let trend: Vec<f64> = snapshot.history.iter().map(|p| p.efficiency).collect();
    if !trend.is_empty() {
        println!("  History ({:>2})  : {}", trend.len(), sparkline(&trend).cyan());
    }
}

/// Hand every display frame to `show` until `until` passes or `stop` is set.
/// Returns how many frames were shown.
pub(crate) async fn watch_frames(
    mut frames: TopicReceiver,
    until: Instant,
    stop: &AtomicBool,
    mut show: impl FnMut(&DisplayUpdate),
) -> usize {
    let mut shown = 0;
    while !stop.load(Ordering::SeqCst) && Instant::now() < until {
        let wake = (Instant::now() + WATCH_WAKE).min(until);
        match tokio::time::timeout_at(wake, frames.recv()).await {
            Ok(Some(event)) => {
                if let EventPayload::Display(update) = event.payload {
                    show(&update);
                    shown += 1;
                }
            }
            Ok(None) => break,
            Err(_elapsed) => {}
        }
    }
    shown
}

pub(crate) fn watch_line(update: &DisplayUpdate) -> String {
    let r = update.reading;
    format!(
        "T1 {:>5.1}  T2 {:>5.1}  T3 {:>5.1}  T4 {:>5.1}  eff {:>5.1} %  {}",
        r.t1_outdoor_air_in,
        r.t2_supply_air,
        r.t3_extract_air,
        r.t4_exhaust_air_out,
        update.efficiency,
        update.status
    )
}

/// Render efficiency values (0..=100) as a block-character sparkline.
pub(crate) fn sparkline(values: &[f64]) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    values
        .iter()
        .map(|v| {
            let idx = ((v.clamp(0.0, 100.0) / 100.0) * (BARS.len() - 1) as f64).round() as usize;
            BARS[idx]
        })
        .collect()
}

fn prompt(editor: &mut DefaultEditor, msg: &str) -> String {
    editor.readline(msg).map(|s| s.trim().to_string()).unwrap_or_default()
}
