//! REPL – the operator console and a stand-in for the customer screens.
//!
//! Customer flow:
//!   /select <category>   /item <item>   /proceed   /cancel   /touch
//! Link:
//!   /connect   /disconnect   /ping   /relay-off <n>   /status
//! Catalog and settings:
//!   /categories   /enable <id>   /disable <id>   /dispense <item> <secs>
//!   /rename <item> [name]   /barcode <item> [image]   /wait <secs>
//!   /settings   /save
//! Simulated controller (transport = "sim"):
//!   /sim <frame>   /sim drop   /sim echo on|off   /sim writes
//!
//! Runtime events (connection changes, order progress, notices) are printed
//! as they arrive by [`follow`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use kiosk_middleware::{SimController, Topic, TopicReceiver};
use kiosk_runtime::{Command, KioskHandle, Snapshot};
use kiosk_types::{Event, EventPayload, NoticeLevel, OrderPhase, TransportKind};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;

use crate::config::{self, Config};

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) enum SimAction {
    Inject(String),
    Drop,
    Echo(bool),
    /// Print and forget the frames written so far.
    Writes,
}

#[derive(Debug)]
pub(crate) enum Input {
    Help,
    Quit,
    Status,
    Categories,
    Settings,
    Save,
    /// Category or item, resolved against the live catalog.
    Toggle { id: String, enabled: bool },
    Sim(SimAction),
    Kiosk(Command),
}

pub(crate) fn parse(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".into());
    };
    let rest: Vec<&str> = words.collect();
    let arg = |usage: &str| -> Result<String, String> {
        rest.first()
            .map(|s| s.to_string())
            .ok_or_else(|| format!("usage: {usage}"))
    };
    let number = |usage: &str| -> Result<u64, String> {
        let raw = arg(usage)?;
        raw.parse::<u64>()
            .map_err(|_| format!("'{raw}' is not a number; usage: {usage}"))
    };

    let input = match head {
        "/help" => Input::Help,
        "/quit" | "/exit" => Input::Quit,
        "/status" => Input::Status,
        "/categories" | "/menu" => Input::Categories,
        "/settings" => Input::Settings,
        "/save" => Input::Save,
        "/connect" => Input::Kiosk(Command::Connect),
        "/disconnect" => Input::Kiosk(Command::Disconnect),
        "/ping" => Input::Kiosk(Command::Ping),
        "/select" => Input::Kiosk(Command::SelectCategory(arg("/select <category>")?)),
        "/item" => Input::Kiosk(Command::SelectItem(arg("/item <item>")?)),
        "/proceed" => Input::Kiosk(Command::Proceed),
        "/cancel" | "/back" => Input::Kiosk(Command::Cancel),
        "/touch" => Input::Kiosk(Command::Touch),
        "/relay-off" => {
            let relay = number("/relay-off <relay>")?;
            let relay = u32::try_from(relay).map_err(|_| format!("relay {relay} out of range"))?;
            Input::Kiosk(Command::RelayOff(relay))
        }
        "/wait" => Input::Kiosk(Command::SetConfirmationWait(number("/wait <seconds>")?)),
        "/enable" => Input::Toggle {
            id: arg("/enable <id>")?,
            enabled: true,
        },
        "/disable" => Input::Toggle {
            id: arg("/disable <id>")?,
            enabled: false,
        },
        "/dispense" => {
            let usage = "/dispense <item> <seconds>";
            let id = arg(usage)?;
            let secs = rest
                .get(1)
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| format!("usage: {usage}"))?;
            Input::Kiosk(Command::SetDispenseSecs { id, secs })
        }
        "/rename" => {
            let id = arg("/rename <item> [display name]")?;
            let name = rest[1..].join(" ");
            Input::Kiosk(Command::SetDisplayName {
                id,
                name: (!name.is_empty()).then_some(name),
            })
        }
        "/barcode" => {
            let id = arg("/barcode <item> [image path]")?;
            let image = rest[1..].join(" ");
            Input::Kiosk(Command::SetBarcodeImage {
                id,
                image: (!image.is_empty()).then_some(image),
            })
        }
        "/sim" => match rest.as_slice() {
            ["drop"] => Input::Sim(SimAction::Drop),
            ["writes"] => Input::Sim(SimAction::Writes),
            ["echo", "on"] => Input::Sim(SimAction::Echo(true)),
            ["echo", "off"] => Input::Sim(SimAction::Echo(false)),
            [] => {
                return Err("usage: /sim <frame> | /sim drop | /sim echo on|off | /sim writes".into());
            }
            frame => Input::Sim(SimAction::Inject(frame.join(" "))),
        },
        other => return Err(format!("Unknown command: '{other}'")),
    };
    Ok(input)
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

struct Session<'a> {
    rt: &'a Runtime,
    handle: &'a KioskHandle,
    sim: Option<SimController>,
    cfg: Config,
    editor: DefaultEditor,
}

/// Entry point for the interactive REPL. Returns when the operator quits,
/// stdin closes or `shutdown` is raised.
pub fn run(
    rt: &Runtime,
    handle: &KioskHandle,
    sim: Option<SimController>,
    cfg: Config,
    shutdown: Arc<AtomicBool>,
) {
    let editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {e}", "Terminal error".red());
            return;
        }
    };
    let mut session = Session {
        rt,
        handle,
        sim,
        cfg,
        editor,
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let prompt = format!("{} ", "kiosk>".bold().cyan());
        let line = match session.editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "Type /quit to exit.".dimmed());
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "Read error".red());
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = session.editor.add_history_entry(line);

        match parse(line) {
            Ok(Input::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(input) => session.execute(input),
            Err(msg) => println!(
                "{} Type {} for available commands.",
                msg.red(),
                "/help".bold()
            ),
        }
    }
}

impl Session<'_> {
    fn execute(&mut self, input: Input) {
        match input {
            Input::Help => cmd_help(),
            Input::Quit => {}
            Input::Status => {
                if let Some(snapshot) = self.snapshot() {
                    print_status(&snapshot);
                }
            }
            Input::Categories => {
                if let Some(snapshot) = self.snapshot() {
                    print_catalog(&snapshot);
                }
            }
            Input::Settings => self.cmd_settings(),
            Input::Save => self.cmd_save(),
            Input::Toggle { id, enabled } => {
                let Some(snapshot) = self.snapshot() else { return };
                let command = if snapshot.catalog.category(&id).is_some() {
                    Command::SetCategoryEnabled { id, enabled }
                } else {
                    Command::SetItemEnabled { id, enabled }
                };
                self.send(command);
            }
            Input::Sim(action) => self.cmd_sim(action),
            Input::Kiosk(command) => self.send(command),
        }
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.rt.block_on(self.handle.send(command)) {
            println!("{}: {e}", "Runtime error".red());
        }
    }

    fn snapshot(&self) -> Option<Snapshot> {
        match self.rt.block_on(self.handle.snapshot()) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                println!("{}: {e}", "Runtime error".red());
                None
            }
        }
    }

    fn cmd_sim(&self, action: SimAction) {
        let Some(sim) = &self.sim else {
            println!(
                "{} (transport is {})",
                "No simulated controller".yellow(),
                self.cfg.transport.kind.to_string().bold()
            );
            return;
        };
        match action {
            SimAction::Inject(frame) => {
                if !sim.inject(&frame) {
                    println!("{}", "Controller not connected; frame not sent.".yellow());
                }
            }
            SimAction::Drop => sim.drop_link(),
            SimAction::Echo(on) => {
                sim.set_echo(on);
                println!("  relay echo {}", if on { "on".green() } else { "off".yellow() });
            }
            SimAction::Writes => {
                let writes = sim.writes();
                if writes.is_empty() {
                    println!("  {}", "nothing written".dimmed());
                }
                for frame in writes {
                    println!("  → {frame}");
                }
                sim.clear_writes();
            }
        }
    }

    /// Persist the live catalog and confirmation wait.
    fn cmd_save(&mut self) {
        let Some(snapshot) = self.snapshot() else { return };
        self.cfg.catalog = snapshot.catalog;
        self.cfg.order.confirmation_wait_secs = snapshot.confirmation_wait_secs;
        match config::save(&self.cfg) {
            Ok(()) => println!(
                "{} {}",
                "✓ Saved to".green(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {e}", "Error saving config".red()),
        }
    }

    fn cmd_settings(&mut self) {
        println!("{}", "Settings Editor".bold().underline());
        println!("  (press Enter to keep the current value)");

        let kind = self.prompt(
            &format!("  Transport (native-ble / serial / sim) [{}]: ", self.cfg.transport.kind),
            &self.cfg.transport.kind.to_string(),
        );
        match kind.parse::<TransportKind>() {
            Ok(kind) => self.cfg.transport.kind = kind,
            Err(e) => println!("  {} {e}", "Warning:".yellow()),
        }

        let port = self.prompt(
            &format!("  Serial port [{}]: ", self.cfg.serial.port),
            &self.cfg.serial.port.clone(),
        );
        self.cfg.serial.port = port;

        let baud = self.prompt(
            &format!("  Baud rate (9600 / 115200) [{}]: ", self.cfg.serial.baud_rate),
            &self.cfg.serial.baud_rate.to_string(),
        );
        match baud.parse::<u32>() {
            Ok(baud) => self.cfg.serial.baud_rate = baud,
            Err(_) => println!("  {} '{baud}' is not a baud rate", "Warning:".yellow()),
        }

        let wait = self.prompt(
            &format!(
                "  Confirmation wait, 5–60 s [{}]: ",
                self.cfg.order.confirmation_wait_secs
            ),
            &self.cfg.order.confirmation_wait_secs.to_string(),
        );
        match wait.parse::<u64>() {
            Ok(secs) => {
                self.cfg.order.confirmation_wait_secs =
                    kiosk_runtime::order::clamp_confirmation_wait(secs);
                self.send(Command::SetConfirmationWait(secs));
            }
            Err(_) => println!("  {} '{wait}' is not a number", "Warning:".yellow()),
        }

        match config::save(&self.cfg) {
            Ok(()) => println!(
                "{} {}",
                "✓ Settings saved to".green(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {e}", "Error saving config".red()),
        }
        println!("  {}", "Transport changes apply on the next start.".dimmed());
    }

    fn prompt(&mut self, msg: &str, default: &str) -> String {
        match self.editor.readline(msg) {
            Ok(line) if !line.trim().is_empty() => line.trim().to_string(),
            _ => default.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Customer".bold().underline());
    println!("  {}  – open a category", "/select <category>".bold().cyan());
    println!("  {}        – choose an item", "/item <item>".bold().cyan());
    println!("  {}            – dispense after payment", "/proceed".bold().cyan());
    println!("  {}     – back to the start screen", "/cancel  /touch".bold().cyan());
    println!("{}", "Controller".bold().underline());
    println!("  {}  – open / close the link", "/connect  /disconnect".bold().cyan());
    println!("  {}  – liveness probe, manual relay off", "/ping  /relay-off <n>".bold().cyan());
    println!("  {}              – connection and order state", "/status".bold().cyan());
    println!("{}", "Operator".bold().underline());
    println!("  {}          – list the catalog", "/categories".bold().cyan());
    println!("  {}  – toggle availability", "/enable <id>  /disable <id>".bold().cyan());
    println!("  {}  – per-item timing", "/dispense <item> <secs>".bold().cyan());
    println!("  {}   – custom display name", "/rename <item> [name]".bold().cyan());
    println!("  {} – payment barcode", "/barcode <item> [image]".bold().cyan());
    println!("  {}         – confirmation wait (5–60 s)", "/wait <secs>".bold().cyan());
    println!("  {}   – edit / persist configuration", "/settings  /save".bold().cyan());
    println!("  {}  – simulated controller", "/sim <frame> | drop | echo on|off | writes".bold().cyan());
    println!("  {}         – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn print_status(s: &Snapshot) {
    println!("{}", "Kiosk Status".bold().underline());
    println!("  Link       : {} via {}", status_label(&s.status.to_string()), s.transport.to_string().bold());
    println!("  Controller : {}", if s.system_ready { "ready".green() } else { "not announced".dimmed() });
    println!("  Order      : {}", s.phase.to_string().bold());
    if let Some(order) = &s.order {
        println!(
            "  Item       : {} (relay {}, {} s)",
            order.display_name.bold(),
            order.relay,
            order.dispense_secs
        );
        if let Some(image) = barcode_for(s, &order.item_id) {
            println!("  Barcode    : {image}");
        }
        println!("  Proceed    : {}", if s.proceed_enabled { "unlocked".green() } else { "waiting for payment".yellow() });
    }
    let active: Vec<String> = s
        .relays
        .iter()
        .filter(|(_, on)| *on)
        .map(|(relay, _)| relay.to_string())
        .collect();
    println!("  Relays on  : {}", if active.is_empty() { "none".dimmed().to_string() } else { active.join(", ") });
    println!("  Limit sw.  : {}", if s.limit_switch_pressed { "PRESSED".green().bold() } else { "idle".dimmed() });
    println!("  Timers     : {:?}", s.pending_timers);
    println!("  Wait       : {} s", s.confirmation_wait_secs);
}

fn print_catalog(s: &Snapshot) {
    for category in &s.catalog.categories {
        let marker = if category.enabled { "●".green() } else { "○".red() };
        println!("{marker} {} {}", category.name.bold(), format!("[{}]", category.id).dimmed());
        for item in &category.items {
            let marker = if item.enabled && category.enabled { "●".green() } else { "○".red() };
            let barcode = item.barcode_image.as_deref().unwrap_or("-");
            println!(
                "    {marker} {:<24} relay {:>2}  {:>3} s  {:<20} {}",
                item.display_name(),
                item.relay,
                item.dispense_secs(),
                barcode,
                item.id.dimmed()
            );
        }
    }
}

/// Barcode image configured for the item being ordered.
fn barcode_for<'a>(s: &'a Snapshot, item_id: &str) -> Option<&'a str> {
    s.catalog
        .categories
        .iter()
        .flat_map(|c| c.items.iter())
        .find(|i| i.id == item_id)?
        .barcode_image
        .as_deref()
}

fn status_label(status: &str) -> colored::ColoredString {
    match status {
        "connected" => status.green().bold(),
        "connecting" => status.yellow(),
        "unavailable" => status.red().bold(),
        _ => status.red(),
    }
}

/// One console line per event worth showing, `None` for the rest.
pub(crate) fn render(event: &Event) -> Option<String> {
    let line = match &event.payload {
        EventPayload::ConnectionChanged { status, transport } => {
            format!("● link {} ({transport})", status_label(&status.to_string()))
        }
        EventPayload::OrderChanged {
            phase,
            relay,
            proceed_enabled,
            ..
        } => {
            let mut line = format!("▸ order {}", phase.to_string().bold());
            if let Some(relay) = relay {
                line.push_str(&format!(" · relay {relay}"));
            }
            if *phase == OrderPhase::AwaitingConfirmation && *proceed_enabled {
                line.push_str(&format!(" · {}", "proceed unlocked".green()));
            }
            line
        }
        EventPayload::Countdown { label, seconds } => format!("⏱ {label} {seconds} s"),
        EventPayload::Notice(notice) => match notice.level {
            NoticeLevel::Info => format!("{} {}", notice.title.green().bold(), notice.message),
            NoticeLevel::Error => format!("{} {}", notice.title.red().bold(), notice.message),
        },
        EventPayload::Controller(_) | EventPayload::CommandSent(_) => return None,
    };
    Some(line)
}

/// Print everything arriving on `rx` until the bus closes.
pub async fn follow(mut rx: TopicReceiver) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = render(&event) {
                    println!("\r  {line}");
                }
            }
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(topic = ?rx.topic(), skipped = n, "console fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Topics shown on the console.
pub const FOLLOWED: [Topic; 3] = [Topic::Connection, Topic::Order, Topic::Notices];

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_types::{ConnectionStatus, Notice};

    #[test]
    fn parses_customer_flow() {
        assert!(matches!(
            parse("/select aneka-kopi"),
            Ok(Input::Kiosk(Command::SelectCategory(id))) if id == "aneka-kopi"
        ));
        assert!(matches!(parse("/proceed"), Ok(Input::Kiosk(Command::Proceed))));
        assert!(matches!(parse("/back"), Ok(Input::Kiosk(Command::Cancel))));
    }

    #[test]
    fn missing_arguments_show_usage() {
        let err = parse("/item").unwrap_err();
        assert!(err.contains("usage"));
        assert!(parse("/relay-off x").is_err());
        assert!(parse("/dispense kopi-hitam").is_err());
    }

    #[test]
    fn parses_operator_commands() {
        assert!(matches!(
            parse("/relay-off 7"),
            Ok(Input::Kiosk(Command::RelayOff(7)))
        ));
        assert!(matches!(
            parse("/dispense es-teh 45"),
            Ok(Input::Kiosk(Command::SetDispenseSecs { id, secs: 45 })) if id == "es-teh"
        ));
        assert!(matches!(
            parse("/rename es-teh Teh Botol Dingin"),
            Ok(Input::Kiosk(Command::SetDisplayName { name: Some(n), .. })) if n == "Teh Botol Dingin"
        ));
        assert!(matches!(
            parse("/rename es-teh"),
            Ok(Input::Kiosk(Command::SetDisplayName { name: None, .. }))
        ));
        assert!(matches!(
            parse("/barcode es-teh qris/teh pucuk.png"),
            Ok(Input::Kiosk(Command::SetBarcodeImage { image: Some(p), .. })) if p == "qris/teh pucuk.png"
        ));
        assert!(matches!(
            parse("/barcode es-teh"),
            Ok(Input::Kiosk(Command::SetBarcodeImage { image: None, .. }))
        ));
        assert!(parse("/barcode").is_err());
        assert!(matches!(
            parse("/disable rokok-ketengah"),
            Ok(Input::Toggle { enabled: false, .. })
        ));
    }

    #[test]
    fn parses_sim_actions() {
        assert!(matches!(parse("/sim drop"), Ok(Input::Sim(SimAction::Drop))));
        assert!(matches!(parse("/sim echo off"), Ok(Input::Sim(SimAction::Echo(false)))));
        assert!(matches!(parse("/sim writes"), Ok(Input::Sim(SimAction::Writes))));
        assert!(matches!(
            parse("/sim LIMIT_SWITCH_PRESSED"),
            Ok(Input::Sim(SimAction::Inject(f))) if f == "LIMIT_SWITCH_PRESSED"
        ));
        assert!(parse("/sim").is_err());
        assert!(parse("/launch").is_err());
    }

    #[test]
    fn renders_notices_and_skips_controller_traffic() {
        colored::control::set_override(false);
        let notice = Event::new("test", EventPayload::Notice(Notice::error("Timed Out", "cancelled")));
        assert_eq!(render(&notice).as_deref(), Some("Timed Out cancelled"));

        let link = Event::new(
            "test",
            EventPayload::ConnectionChanged {
                status: ConnectionStatus::Connected,
                transport: TransportKind::Sim,
            },
        );
        assert_eq!(render(&link).as_deref(), Some("● link connected (sim)"));

        let frame = Event::new(
            "test",
            EventPayload::Controller(kiosk_types::NotificationEvent::SystemReady),
        );
        assert!(render(&frame).is_none());
    }
}
