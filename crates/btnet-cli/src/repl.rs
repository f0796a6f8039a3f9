//! REPL – Read-Eval-Print Loop for the btnet interactive shell.
//!
//! Supported slash-commands:
//!   /help                     – show this list
//!   /state                    – getAdapterState
//!   /enable, /disable         – direct power transitions
//!   /request-enable           – show the "turn on?" dialog
//!   /request-disable          – show the "turn off?" dialog
//!   /discoverable             – show the "make discoverable?" dialog
//!   /devices, /device <addr>  – bonded devices / one device
//!   /scan, /stop-scan         – start / stop discovery
//!   /watch                    – subscribe to both event channels
//!   /exec <action> [json]     – run any action by wire name
//!   /approve, /deny           – answer the oldest open dialog
//!   /finish, /fail            – settle the pending power transition
//!   /found <addr> [name]      – simulate a device coming into range
//!   /quit | /exit             – gracefully exit the CLI
//!
//! Responses and events are printed from the callbacks as they arrive, which
//! may be after the next prompt has been drawn.

use colored::Colorize;
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use btnet_hal::SimAdapter;
use btnet_kernel::RequestDispatcher;
use btnet_middleware::{Responder, Response, Subscriber};
use btnet_types::{
    Action, ActivityOutcome, AdapterEvent, DeviceInfo, EventChannel, EventPayload, Reply, Request,
};

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Run(Action),
    Watch,
    Dialog(ActivityOutcome),
    Settle { failed: bool },
    Found(DeviceInfo),
    Quit,
}

/// Parse one REPL line. Errors are user-facing messages.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".to_string());
    };
    let request = |r: Request| Ok(Command::Run(Action::Request(r)));

    match head {
        "/help" => Ok(Command::Help),
        "/state" => request(Request::GetAdapterState),
        "/enable" => request(Request::Enable),
        "/disable" => request(Request::Disable),
        "/request-enable" => request(Request::RequestEnable),
        "/request-disable" => request(Request::RequestDisable),
        "/discoverable" => request(Request::RequestDiscoverable),
        "/devices" => request(Request::GetDevices),
        "/device" => match parts.next() {
            Some(address) => request(Request::GetDevice {
                address: address.to_string(),
            }),
            None => Err("usage: /device <address>".to_string()),
        },
        "/scan" => request(Request::StartDiscovery),
        "/stop-scan" => request(Request::StopDiscovery),
        "/watch" => Ok(Command::Watch),
        "/exec" => {
            let Some(action) = parts.next() else {
                return Err("usage: /exec <action> [json-args]".to_string());
            };
            let rest: Vec<&str> = parts.collect();
            let args = if rest.is_empty() {
                Value::Array(Vec::new())
            } else {
                serde_json::from_str(&rest.join(" "))
                    .map_err(|e| format!("arguments are not valid JSON: {e}"))?
            };
            Action::parse(action, &args)
                .map(Command::Run)
                .map_err(|e| e.to_string())
        }
        "/approve" => Ok(Command::Dialog(ActivityOutcome::Ok)),
        "/deny" => Ok(Command::Dialog(ActivityOutcome::Cancelled)),
        "/finish" => Ok(Command::Settle { failed: false }),
        "/fail" => Ok(Command::Settle { failed: true }),
        "/found" => {
            let Some(address) = parts.next() else {
                return Err("usage: /found <address> [name]".to_string());
            };
            let name: Vec<&str> = parts.collect();
            let name = if name.is_empty() { "unknown".to_string() } else { name.join(" ") };
            Ok(Command::Found(DeviceInfo::new(address, name)))
        }
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command: '{other}'")),
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(dispatcher: &RequestDispatcher, adapter: &SimAdapter, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "btnet>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Ok(Command::Help) => cmd_help(),
            Ok(Command::Run(action)) => cmd_run(dispatcher, action),
            Ok(Command::Watch) => {
                cmd_run(dispatcher, Action::Subscribe(EventChannel::AdapterStateChanged));
                cmd_run(dispatcher, Action::Subscribe(EventChannel::DeviceFound));
            }
            Ok(Command::Dialog(outcome)) => {
                if !adapter.resolve_dialog(outcome) {
                    println!("  {}", "No dialog is open.".yellow());
                }
            }
            Ok(Command::Settle { failed }) => {
                let settled = if failed {
                    adapter.fail_transition()
                } else {
                    adapter.complete_transition()
                };
                if !settled {
                    println!("  {}", "No power transition in flight.".yellow());
                }
            }
            Ok(Command::Found(device)) => adapter.discover(device),
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(msg) => {
                println!(
                    "{} Type {} for available commands.",
                    msg.red(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "btnet Commands".bold().underline());
    let rows = [
        ("/state", "show the adapter state"),
        ("/enable  /disable", "power the adapter on / off directly"),
        ("/request-enable", "ask the user to turn Bluetooth on"),
        ("/request-disable", "ask the user to turn Bluetooth off"),
        ("/discoverable", "ask the user to make the adapter discoverable"),
        ("/devices", "list bonded devices"),
        ("/device <addr>", "look up one device"),
        ("/scan  /stop-scan", "start / stop discovery"),
        ("/watch", "stream adapter-state and device-found events"),
        ("/exec <action> [json]", "run an action by wire name"),
        ("/approve  /deny", "answer the oldest open dialog"),
        ("/finish  /fail", "settle the pending power transition"),
        ("/found <addr> [name]", "simulate a device in range"),
        ("/quit  /exit", "exit the CLI"),
    ];
    for (cmd, what) in rows {
        println!("  {:<24} – {}", cmd.bold().cyan(), what);
    }
    println!();
}

fn cmd_run(dispatcher: &RequestDispatcher, action: Action) {
    match action {
        Action::Request(request) => {
            let label = format!("{request:?}");
            dispatcher.execute(request, Responder::from_fn(move |r| print_response(&label, r)));
        }
        Action::Subscribe(channel) => {
            match dispatcher.subscribe(channel, Subscriber::from_fn(print_event)) {
                Ok(()) => println!("  {} {}", "watching".green(), channel.to_string().bold()),
                Err(e) => println!("  {} {}: {}", "✗".red(), channel, e),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_response(label: &str, response: Response) {
    match response {
        Ok(Reply::Empty) => println!("  {} {}", "✓".green().bold(), label.bold()),
        Ok(reply) => {
            let body = serde_json::to_string_pretty(&reply).unwrap_or_else(|e| e.to_string());
            println!("  {} {}\n{}", "✓".green().bold(), label.bold(), indent(&body));
        }
        Err(e) => println!(
            "  {} {} – {} (code {})",
            "✗".red().bold(),
            label.bold(),
            e.to_string().red(),
            e.code()
        ),
    }
}

fn print_event(event: AdapterEvent) {
    let stamp = event.timestamp.format("%H:%M:%S%.3f").to_string();
    match event.payload {
        EventPayload::AdapterStateChanged(state) => println!(
            "  {} {} enabled={} discovering={} discoverable={}",
            stamp.dimmed(),
            "adapter-state-changed".magenta(),
            state.enabled,
            state.discovering,
            state.discoverable
        ),
        EventPayload::DeviceFound(device) => println!(
            "  {} {} {} {}",
            stamp.dimmed(),
            "device-found".magenta(),
            device.address.bold(),
            device.name
        ),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_map_to_requests() {
        assert_eq!(
            parse_command("/scan"),
            Ok(Command::Run(Action::Request(Request::StartDiscovery)))
        );
        assert_eq!(
            parse_command("/request-disable"),
            Ok(Command::Run(Action::Request(Request::RequestDisable)))
        );
        assert_eq!(
            parse_command("/device AA:BB:CC:DD:EE:FF"),
            Ok(Command::Run(Action::Request(Request::GetDevice {
                address: "AA:BB:CC:DD:EE:FF".into()
            })))
        );
    }

    #[test]
    fn device_requires_address() {
        assert!(parse_command("/device").is_err());
    }

    #[test]
    fn exec_parses_wire_actions() {
        assert_eq!(
            parse_command("/exec registerDeviceAdded"),
            Ok(Command::Run(Action::Subscribe(EventChannel::DeviceFound)))
        );
        assert_eq!(
            parse_command(r#"/exec getDevice ["01:02:03:04:05:06"]"#),
            Ok(Command::Run(Action::Request(Request::GetDevice {
                address: "01:02:03:04:05:06".into()
            })))
        );
    }

    #[test]
    fn exec_reports_bad_input() {
        let err = parse_command("/exec teleport").unwrap_err();
        assert!(err.contains("Invalid action 'teleport'"));

        let err = parse_command("/exec getDevice [oops").unwrap_err();
        assert!(err.contains("not valid JSON"));
    }

    #[test]
    fn found_joins_multi_word_names() {
        match parse_command("/found 0A:0B:0C:0D:0E:0F Living Room Speaker") {
            Ok(Command::Found(device)) => {
                assert_eq!(device.address, "0A:0B:0C:0D:0E:0F");
                assert_eq!(device.name, "Living Room Speaker");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dialog_and_settle_commands() {
        assert_eq!(parse_command("/approve"), Ok(Command::Dialog(ActivityOutcome::Ok)));
        assert_eq!(parse_command("/deny"), Ok(Command::Dialog(ActivityOutcome::Cancelled)));
        assert_eq!(parse_command("/fail"), Ok(Command::Settle { failed: true }));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = parse_command("/teleport").unwrap_err();
        assert!(err.contains("/teleport"));
    }
}
