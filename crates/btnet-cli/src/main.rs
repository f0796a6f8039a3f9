//! `btnet-cli` – btnet Command Line Interface
//!
//! An interactive bench for the request/event correlation layer. It:
//!
//! 1. Checks for `~/.btnet/config.toml`; writes a default one on first run.
//! 2. Builds a [`SimAdapter`][btnet_hal::SimAdapter] from the `[adapter]`
//!    section and a [`RequestDispatcher`] using the `[request_codes]` slots.
//! 3. Spawns the adapter state machine on a Tokio runtime.
//! 4. Drops the user into an **interactive REPL** with slash-commands.
//! 5. Intercepts **Ctrl-C** and exits at the next prompt.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use btnet_hal::BluetoothAdapter;
use btnet_kernel::RequestDispatcher;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info"); BTNET_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("BTNET_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Runtime & adapter ─────────────────────────────────────────────────
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            std::process::exit(1);
        }
    };
    // Dialog forwarders spawn onto the current runtime; the REPL thread
    // must be inside it.
    let _guard = runtime.enter();

    let (adapter, feed) = cfg.adapter.builder().build();
    let dispatcher = RequestDispatcher::with_codes(adapter.clone(), cfg.request_codes);
    let machine = dispatcher.spawn_state_machine(feed);

    info!(
        address = %adapter.address(),
        present = adapter.is_present(),
        "simulated adapter ready"
    );
    print_adapter_summary(&cfg);

    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&dispatcher, &adapter, shutdown);

    machine.abort();
}

// ─────────────────────────────────────────────────────────────────────────────
// First run
// ─────────────────────────────────────────────────────────────────────────────

fn first_run() -> config::Config {
    println!();
    println!("  No configuration found. Writing defaults.");
    let cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    __    __              __ "#.bold().cyan());
    println!("{}", r#"   / /_  / /_____  ___  / /_"#.bold().cyan());
    println!("{}", r#"  / __ \/ __/ __ \/ _ \/ __/"#.bold().cyan());
    println!("{}", r#" / /_/ / /_/ / / /  __/ /_  "#.bold().cyan());
    println!("{}", r#"/_.___/\__/_/ /_/\___/\__/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "btnet".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Bluetooth adapter request bench");
    println!();
}

fn print_adapter_summary(cfg: &config::Config) {
    let a = &cfg.adapter;
    let presence = if a.present { "present".green() } else { "absent".red() };
    println!(
        "  Adapter {} ({}) – {}, {}",
        a.name.bold(),
        a.address.dimmed(),
        presence,
        if a.enabled { "on" } else { "off" }
    );
    let transitions = if a.auto_complete { "automatic" } else { "manual (/finish, /fail)" };
    let dialogs = match a.dialog_outcome {
        Some(outcome) => format!("auto-answer {outcome:?}"),
        None => "manual (/approve, /deny)".to_string(),
    };
    println!("  Transitions: {transitions}   Dialogs: {dialogs}");
    let c = &cfg.request_codes;
    println!(
        "  Slots: enable {} · disable {} · enable-dialog {} · discoverable-dialog {} · disable-dialog {}",
        c.enable, c.disable, c.enable_dialog, c.discoverable_dialog, c.disable_dialog
    );
    println!();
}
