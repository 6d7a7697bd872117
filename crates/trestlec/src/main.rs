use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::process;
use trestle_host::ConsoleHost;
use trestle_wasm::Bridge;

const TOOL_NAME: &str = "trestle";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP: &str = "\
Trestle guest runner

Usage:
  trestle <command> [options]

Commands:
  run <module> [--ticks N] [--tick-ms MS] [--root <dir>] [--canvas <id>] [--json] [--verbose]

Options:
  -h, --help     Show this help message
  --version      Show version information
";

const RUN_HELP: &str = "\
Usage:
  trestle run <module> [--ticks N] [--tick-ms MS] [--root <dir>] [--canvas <id>] [--json] [--verbose]

Runs a guest module's main export, then advances the virtual clock so
interval callbacks fire.

Options:
  --ticks        Number of clock advances after main returns (default 0)
  --tick-ms      Milliseconds per advance (default 16)
  --root         Directory fetch and image URLs resolve under
  --canvas       Element id to expose as a canvas (repeatable)
  --json         Emit a JSON run report
  --verbose      Enable debug logging
  -h, --help     Show this help message
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run {
        path: String,
        ticks: u64,
        tick_ms: u64,
        root: Option<String>,
        canvases: Vec<String>,
        json: bool,
        verbose: bool,
    },
}

#[derive(Serialize)]
struct RunReport {
    tool: &'static str,
    version: &'static str,
    ok: bool,
    ticks: u64,
    clock_ms: u64,
    handles: usize,
    error: Option<ReportError>,
}

#[derive(Serialize)]
struct ReportError {
    code: &'static str,
    message: String,
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help") {
        print!("{HELP}");
        return;
    }

    if args[0] == "--version" {
        println!("{TOOL_NAME} {VERSION}");
        return;
    }

    if args[0] == "run" && contains_help_flag(&args[1..]) {
        print!("{RUN_HELP}");
        return;
    }

    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!();
            eprintln!("{HELP}");
            process::exit(2);
        }
    };

    if let Err(message) = execute(command) {
        eprintln!("error: {message}");
        process::exit(2);
    }
}

fn contains_help_flag(args: &[String]) -> bool {
    args.iter().any(|arg| matches!(arg.as_str(), "-h" | "--help"))
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    match args[0].as_str() {
        "run" => parse_run(&args[1..]),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn parse_run(args: &[String]) -> Result<Command, String> {
    let mut path = None;
    let mut ticks = 0u64;
    let mut tick_ms = 16u64;
    let mut root = None;
    let mut canvases = Vec::new();
    let mut json = false;
    let mut verbose = false;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--verbose" => verbose = true,
            "--ticks" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "missing value for --ticks".to_string())?;
                ticks = value
                    .parse()
                    .map_err(|_| format!("invalid --ticks value '{value}'"))?;
            }
            "--tick-ms" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "missing value for --tick-ms".to_string())?;
                tick_ms = value
                    .parse()
                    .map_err(|_| format!("invalid --tick-ms value '{value}'"))?;
                if tick_ms == 0 {
                    return Err("--tick-ms must be at least 1".to_string());
                }
            }
            "--root" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "missing value for --root".to_string())?;
                root = Some(value.to_string());
            }
            "--canvas" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "missing value for --canvas".to_string())?;
                canvases.push(value.to_string());
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option '{flag}'"));
            }
            value => {
                if path.is_some() {
                    return Err("multiple module paths provided".to_string());
                }
                path = Some(value.to_string());
            }
        }
    }

    let path = path.ok_or_else(|| "missing module path for run".to_string())?;
    Ok(Command::Run {
        path,
        ticks,
        tick_ms,
        root,
        canvases,
        json,
        verbose,
    })
}

fn execute(command: Command) -> Result<(), String> {
    match command {
        Command::Run {
            path,
            ticks,
            tick_ms,
            root,
            canvases,
            json,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::WARN
            };
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .init();

            let bytes = std::fs::read(&path)
                .map_err(|err| format!("unable to read module '{path}': {err}"))?;
            let mut host = ConsoleHost::new();
            if let Some(root) = root {
                host = host.with_root(PathBuf::from(root));
            }
            for id in &canvases {
                host = host.with_canvas(id);
            }

            let report = run_report(host, &bytes, ticks, tick_ms);
            if json {
                let report_json =
                    serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string());
                println!("{report_json}");
                Ok(())
            } else if let Some(error) = report.error {
                Err(format!("[{}] {}", error.code, error.message))
            } else {
                Ok(())
            }
        }
    }
}

fn run_report(host: ConsoleHost, bytes: &[u8], ticks: u64, tick_ms: u64) -> RunReport {
    let mut report = RunReport {
        tool: TOOL_NAME,
        version: VERSION,
        ok: false,
        ticks: 0,
        clock_ms: 0,
        handles: 0,
        error: None,
    };

    let mut bridge = match Bridge::new(host, bytes) {
        Ok(bridge) => bridge,
        Err(err) => {
            report.error = Some(ReportError {
                code: err.code,
                message: err.message,
            });
            return report;
        }
    };

    let outcome = bridge.run_main().and_then(|()| {
        for _ in 0..ticks {
            bridge.advance(tick_ms)?;
            report.ticks += 1;
        }
        Ok(())
    });

    report.clock_ms = bridge.now_ms();
    report.handles = bridge.handles().len();
    match outcome {
        Ok(()) => report.ok = true,
        Err(err) => {
            report.error = Some(ReportError {
                code: err.code,
                message: err.message,
            });
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(args: &[&str]) -> Result<Command, String> {
        let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        parse_command(&args)
    }

    #[test]
    fn parse_run_flags_any_order() {
        let command = cmd(&[
            "run", "--ticks", "60", "game.wasm", "--tick-ms", "16", "--canvas", "game", "--json",
        ])
        .unwrap();
        assert_eq!(
            command,
            Command::Run {
                path: "game.wasm".to_string(),
                ticks: 60,
                tick_ms: 16,
                root: None,
                canvases: vec!["game".to_string()],
                json: true,
                verbose: false,
            }
        );
    }

    #[test]
    fn parse_run_requires_path() {
        let err = cmd(&["run", "--json"]).unwrap_err();
        assert!(err.contains("missing module path"));
    }

    #[test]
    fn parse_run_rejects_zero_tick_ms() {
        let err = cmd(&["run", "game.wasm", "--tick-ms", "0"]).unwrap_err();
        assert!(err.contains("at least 1"));
    }

    #[test]
    fn parse_run_rejects_unknown_flag() {
        let err = cmd(&["run", "game.wasm", "--watch"]).unwrap_err();
        assert!(err.contains("unknown option"));
    }

    #[test]
    fn run_report_captures_bridge_errors() {
        let report = run_report(ConsoleHost::new(), b"(module", 0, 16);
        assert!(!report.ok);
        assert_eq!(report.error.as_ref().unwrap().code, "E0512");
    }

    #[test]
    fn run_report_counts_ticks() {
        let wat = r#"(module
            (memory (export "memory") 1)
            (func (export "main")))"#;
        let report = run_report(ConsoleHost::new(), wat.as_bytes(), 3, 16);
        assert!(report.ok);
        assert_eq!(report.ticks, 3);
        assert_eq!(report.clock_ms, 48);
    }
}
