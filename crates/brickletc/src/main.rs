use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use bricklet_host::{
    list_ports, open_port, Connection, ConnectionStatus, HostEvents,
};
use bricklet_proto::WireValue;
use serde::Serialize;

const HELP: &str = "\
Bricklet host console

Usage:
  bricklet <command> [options]

Commands:
  ports [--json]
  monitor <device> [--json]
  send <device> ping
  send <device> start <chunk-id>
  send <device> stop-all
  send <device> broadcast <name>
  send <device> version

Options:
  -h, --help     Show this help message
  --version      Show version information
";

const TOOL_NAME: &str = "bricklet";
const VERSION: &str = "0.1.0";

#[derive(Serialize)]
struct PortsReport {
    tool: &'static str,
    version: &'static str,
    ok: bool,
    ports: Vec<String>,
}

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .ok();

    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help") {
        print!("{HELP}");
        return;
    }

    if args[0] == "--version" {
        println!("{TOOL_NAME} {VERSION}");
        return;
    }

    let result = match args[0].as_str() {
        "ports" => cmd_ports(args.iter().any(|a| a == "--json")),
        "monitor" => match args.get(1) {
            Some(device) => cmd_monitor(Path::new(device), args.iter().any(|a| a == "--json")),
            None => usage("monitor <device> [--json]"),
        },
        "send" => match (args.get(1), args.get(2)) {
            (Some(device), Some(action)) => {
                cmd_send(Path::new(device), action, args.get(3).map(String::as_str))
            }
            _ => usage("send <device> <action> [arg]"),
        },
        other => {
            eprintln!("Unknown command '{other}'.");
            print!("{HELP}");
            process::exit(2);
        }
    };

    if let Err(message) = result {
        eprintln!("{message}");
        process::exit(1);
    }
}

fn usage(text: &str) -> Result<(), String> {
    Err(format!("Usage:\n  bricklet {text}"))
}

fn cmd_ports(json: bool) -> Result<(), String> {
    let ports = list_ports().map_err(|err| format!("cannot scan /dev: {err}"))?;
    let names: Vec<String> = ports
        .iter()
        .map(|p: &PathBuf| p.display().to_string())
        .collect();
    if json {
        let report = PortsReport {
            tool: TOOL_NAME,
            version: VERSION,
            ok: !names.is_empty(),
            ports: names,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else if names.is_empty() {
        println!("No serial ports found.");
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

/// Event sink that prints device notifications, as text or JSON lines.
struct PrintEvents {
    json: bool,
}

#[derive(Serialize)]
struct EventLine<'a> {
    event: &'static str,
    chunk_id: Option<u8>,
    value: Option<&'a WireValue>,
    error: Option<u8>,
    text: Option<&'a str>,
}

impl PrintEvents {
    fn emit(&self, line: EventLine) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string(&line).unwrap_or_else(|_| "{}".to_string())
            );
            return;
        }
        match line {
            EventLine { event, chunk_id: Some(id), value: Some(value), .. } => {
                println!("{event} chunk={id} value={value:?}");
            }
            EventLine { event, chunk_id: Some(id), error: Some(code), .. } => {
                println!("{event} chunk={id} error={code}");
            }
            EventLine { event, chunk_id: Some(id), .. } => println!("{event} chunk={id}"),
            EventLine { event, text: Some(text), .. } => println!("{event} {text}"),
            EventLine { event, .. } => println!("{event}"),
        }
    }

    fn line<'a>(event: &'static str) -> EventLine<'a> {
        EventLine { event, chunk_id: None, value: None, error: None, text: None }
    }
}

impl HostEvents for PrintEvents {
    fn task_started(&mut self, chunk_id: u8) {
        self.emit(EventLine { chunk_id: Some(chunk_id), ..Self::line("taskStarted") });
    }
    fn task_done(&mut self, chunk_id: u8) {
        self.emit(EventLine { chunk_id: Some(chunk_id), ..Self::line("taskDone") });
    }
    fn task_returned_value(&mut self, chunk_id: u8, value: &WireValue) {
        self.emit(EventLine {
            chunk_id: Some(chunk_id),
            value: Some(value),
            ..Self::line("taskReturnedValue")
        });
    }
    fn task_error(&mut self, chunk_id: u8, error: u8) {
        self.emit(EventLine {
            chunk_id: Some(chunk_id),
            error: Some(error),
            ..Self::line("taskError")
        });
    }
    fn output_value(&mut self, chunk_id: u8, value: &WireValue) {
        self.emit(EventLine {
            chunk_id: Some(chunk_id),
            value: Some(value),
            ..Self::line("outputValue")
        });
    }
    fn var_value(&mut self, var_id: u8, value: &WireValue) {
        self.emit(EventLine {
            chunk_id: Some(var_id),
            value: Some(value),
            ..Self::line("varValue")
        });
    }
    fn version(&mut self, version: &str) {
        self.emit(EventLine { text: Some(version), ..Self::line("version") });
    }
    fn broadcast_received(&mut self, name: &str) {
        self.emit(EventLine { text: Some(name), ..Self::line("broadcast") });
    }
}

fn open_connection(device: &Path) -> Result<Connection<std::fs::File>, String> {
    let port = open_port(device).map_err(|err| format!("cannot open {}: {err}", device.display()))?;
    Ok(Connection::open(port, Instant::now()))
}

fn cmd_monitor(device: &Path, json: bool) -> Result<(), String> {
    let mut conn = open_connection(device)?;
    let mut events = PrintEvents { json };
    let mut last_status = None;
    loop {
        let status = conn.tick(Instant::now(), &mut events);
        if last_status != Some(status) {
            log::info!("connection status: {status:?}");
            last_status = Some(status);
        }
        if status == ConnectionStatus::NotConnected {
            return Err("connection lost".to_string());
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn cmd_send(device: &Path, action: &str, arg: Option<&str>) -> Result<(), String> {
    let mut conn = open_connection(device)?;
    match (action, arg) {
        ("ping", None) => conn.send(&bricklet_proto::Message::Ping),
        ("start", Some(id)) => {
            let chunk_id: u8 = id.parse().map_err(|_| "chunk id must be 0-254".to_string())?;
            conn.start_chunk(chunk_id)
        }
        ("stop-all", None) => conn.stop_all(),
        ("broadcast", Some(name)) => conn.broadcast(name),
        ("version", None) => conn.get_version(),
        _ => return usage("send <device> ping|start <id>|stop-all|broadcast <name>|version"),
    }
    .map_err(|err| err.to_string())?;

    // Give the device a moment to answer, printing whatever comes back.
    let mut events = PrintEvents { json: false };
    let deadline = Instant::now() + Duration::from_millis(1000);
    while Instant::now() < deadline {
        conn.pump(Instant::now(), &mut events);
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}
