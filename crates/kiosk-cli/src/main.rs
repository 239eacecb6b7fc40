//! `kiosk` – vending kiosk controller console
//!
//! This binary hosts the kiosk runtime on a Tokio runtime and gives the
//! operator a terminal in place of the customer screens. It:
//!
//! 1. Checks for `~/.kiosk/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Builds the configured transport (native BLE, serial or the simulated
//!    controller) and starts the runtime loop.
//! 3. Drops the operator into an **interactive REPL** with slash-commands
//!    (`/connect`, `/select`, `/item`, `/proceed`, `/settings`, `/help`).
//! 4. Intercepts **Ctrl-C** / SIGTERM to cancel the order, close the link
//!    and exit.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

use kiosk_middleware::{SimController, SimTransport, Transport, build_transport};
use kiosk_runtime::{Command, CueBoard, KioskRuntime, ScreenLog};
use kiosk_types::TransportKind;

fn main() {
    // RUST_LOG picks the filter, KIOSK_LOG_FORMAT=json switches to JSON
    // lines, OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    let _telemetry = kiosk_runtime::init_tracing("kiosk");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start async runtime".red());
            std::process::exit(1);
        }
    };

    // ── Runtime ───────────────────────────────────────────────────────────
    let (transport, sim) = build_link(&cfg);
    println!(
        "  Transport: {}",
        cfg.transport.kind.to_string().bold()
    );
    let (runtime, handle) = KioskRuntime::new(
        transport,
        cfg.runtime_config(),
        Arc::new(CueBoard::new()),
        Arc::new(ScreenLog::new()),
    );
    for topic in repl::FOLLOWED {
        let rx = handle.bus().subscribe_to(topic);
        rt.spawn(repl::follow(rx));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let signalled = Arc::new(AtomicBool::new(false));

    // The REPL may be parked in readline when a signal lands; once the
    // runtime has wound down, leave from here.
    let runtime_task = rt.spawn(runtime.run());
    let signalled_watch = signalled.clone();
    rt.spawn(async move {
        let _ = runtime_task.await;
        if signalled_watch.load(Ordering::SeqCst) {
            println!("{}", "  ✓ Link closed. Exiting.".green());
            std::process::exit(0);
        }
    });

    // ── Ctrl-C / SIGTERM ──────────────────────────────────────────────────
    let ctrlc_handle = handle.clone();
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Signal received – cancelling order and closing link …"
                .yellow()
                .bold()
        );
        shutdown_clone.store(true, Ordering::SeqCst);
        signalled.store(true, Ordering::SeqCst);
        if let Err(e) = ctrlc_handle.try_send(Command::Shutdown) {
            warn!(error = %e, "runtime did not take the shutdown command");
            std::process::exit(1);
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    if cfg.transport.kind == TransportKind::Sim {
        println!(
            "  Simulated controller attached. Try {} then {}.",
            "/connect".bold().cyan(),
            "/sim SYSTEM_READY".bold().cyan()
        );
    }
    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&rt, &handle, sim, cfg, shutdown);

    if let Err(e) = rt.block_on(handle.shutdown()) {
        warn!(error = %e, "runtime already stopped");
    }
    rt.shutdown_timeout(Duration::from_secs(2));
}

/// The configured transport, plus the controller handle when simulated.
fn build_link(cfg: &config::Config) -> (Box<dyn Transport>, Option<SimController>) {
    match cfg.transport.kind {
        TransportKind::Sim => {
            let (transport, controller) = SimTransport::new();
            (Box::new(transport), Some(controller))
        }
        kind => (build_transport(kind, &cfg.ble, &cfg.serial), None),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Kiosk First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the kiosk.\n");

    let mut cfg = config::Config::default();

    let ble_built = cfg!(feature = "ble");
    let default_choice = if cfg.transport.kind == TransportKind::NativeBle { "1" } else { "2" };
    println!("  How is the relay controller attached?");
    if ble_built {
        println!("    1) Bluetooth LE  (default)");
        println!("    2) Serial / USB");
    } else {
        println!("    1) Bluetooth LE  (not in this build; rebuild with --features ble)");
        println!("    2) Serial / USB  (default)");
    }
    println!("    3) Simulated controller  (no hardware)");
    let choice = ask(&format!("  Enter choice [{default_choice}]: "), default_choice);
    cfg.transport.kind = match choice.trim() {
        "1" => TransportKind::NativeBle,
        "2" => TransportKind::Serial,
        "3" => TransportKind::Sim,
        _ => config::default_transport(),
    };
    if cfg.transport.kind == TransportKind::NativeBle && !ble_built {
        println!(
            "  {} Bluetooth LE will report unavailable until rebuilt with BLE support.",
            "Note:".yellow()
        );
    }

    match cfg.transport.kind {
        TransportKind::Serial => {
            cfg.serial.port = ask(
                &format!("  Serial port [{}]: ", cfg.serial.port),
                &cfg.serial.port,
            );
            let baud = ask(
                &format!("  Baud rate (9600 / 115200) [{}]: ", cfg.serial.baud_rate),
                &cfg.serial.baud_rate.to_string(),
            );
            if let Ok(b) = baud.trim().parse::<u32>() {
                cfg.serial.baud_rate = b;
            }
        }
        TransportKind::NativeBle => {
            let prefix = ask(
                &format!("  Controller name prefix [{}]: ", cfg.ble.name_prefix),
                &cfg.ble.name_prefix,
            );
            cfg.ble.name_prefix = prefix;
        }
        _ => {}
    }

    let wait = ask(
        &format!(
            "  Seconds to wait for payment, 5–60 [{}]: ",
            cfg.order.confirmation_wait_secs
        ),
        &cfg.order.confirmation_wait_secs.to_string(),
    );
    if let Ok(secs) = wait.trim().parse::<u64>() {
        cfg.order.confirmation_wait_secs = kiosk_runtime::order::clamp_confirmation_wait(secs);
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __ __ _            __  "#.bold().cyan());
    println!("{}", r#"  / //_/(_)__  ___ / /__"#.bold().cyan());
    println!("{}", r#" / ,<  / / _ \(_-</  '_/"#.bold().cyan());
    println!("{}", r#"/_/|_|/_/\___/___/_/\_\ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Kiosk".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Relay vending controller console");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Ask on stdin; an empty answer or a read error keeps `default`.
fn ask(question: &str, default: &str) -> String {
    use std::io::Write;
    print!("{question}");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return default.to_string();
    }
    match answer.trim() {
        "" => default.to_string(),
        given => given.to_string(),
    }
}
