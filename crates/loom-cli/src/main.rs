//! The CLI / REPL boundary (§10): a thin binary over the `loom` engine
//! crate. Reads a script path (or `-e`/`--eval <source>`) from `argv`,
//! builds a `Vm`, evaluates against `Lobby`, and prints the uncaught-exception
//! stack on failure, exiting with the `exit` stop's payload code (0
//! otherwise). With no arguments, drops into a line-mode REPL.

use std::io::{self, BufRead, Write};
use std::{env, fs, process::ExitCode};

use loom::{ExcType, ObjectRef, ReplSession, Stop, Vm};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match parse_args(&args) {
        Ok(Some((label, source))) => run_once(&label, &source),
        Ok(None) => run_repl(),
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

/// `None` means "no script supplied, start the interactive REPL."
fn parse_args(args: &[String]) -> Result<Option<(String, String)>, String> {
    if args.is_empty() {
        return Ok(None);
    }
    if args[0] == "-e" || args[0] == "--eval" {
        let source = args.get(1).ok_or_else(|| format!("{} requires an argument", args[0]))?;
        return Ok(Some(("-e".to_owned(), source.clone())));
    }
    let path = &args[0];
    let source = fs::read_to_string(path).map_err(|e| format!("error reading {path}: {e}"))?;
    Ok(Some((path.clone(), source)))
}

fn run_once(label: &str, source: &str) -> ExitCode {
    let vm = Vm::new().leak();
    let outcome = loom::repl::run_source(vm, source, label);
    vm.scheduler.wait_for_quiescence();
    match outcome {
        Err(parse_err) => {
            eprintln!("parse error: {parse_err}");
            ExitCode::FAILURE
        }
        Ok((_, Stop::None)) => ExitCode::SUCCESS,
        Ok((_, Stop::Exit(payload))) => ExitCode::from(exit_code(&payload)),
        Ok((_, Stop::Exception(exc))) => {
            print_exception(&exc);
            ExitCode::FAILURE
        }
        Ok((_, other)) => {
            eprintln!("unhandled top-level {}", other.tag_name());
            ExitCode::FAILURE
        }
    }
}

fn run_repl() -> ExitCode {
    let vm = Vm::new().leak();
    let mut session = ReplSession::new(vm);
    let stdin = io::stdin();
    loop {
        print!("loom> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match session.execute(trimmed) {
            Ok(result) => println!("==> {}", describe(&result)),
            Err(err) => eprintln!("{err}"),
        }
    }
    vm.scheduler.wait_for_quiescence();
    ExitCode::SUCCESS
}

fn exit_code(payload: &ObjectRef) -> u8 {
    payload.with_tag(|t| t.as_number()).map_or(0, |n| n as u8)
}

fn describe(obj: &ObjectRef) -> String {
    obj.with_tag(|t| match t.as_number() {
        Some(n) => n.to_string(),
        None => match t.as_sequence() {
            Some(s) => s.to_string(),
            None => obj.tag_name().to_string(),
        },
    })
}

fn print_exception(exc: &ObjectRef) {
    let Some(data) = exc.with_tag(|t| t.as_exception().cloned()) else {
        eprintln!("uncaught exception ({})", exc.tag_name());
        return;
    };
    let message = data.error.with_tag(|t| t.as_sequence().map(str::to_string)).unwrap_or_else(|| data.error.tag_name().to_string());
    let prefix = if data.exc_type == ExcType::Exception { "uncaught exception".to_owned() } else { format!("uncaught {} exception", data.exc_type) };
    eprintln!("{prefix}: {message}");
    for frame in data.stack.iter().rev() {
        eprintln!("  at {} ({}:{}:{})", frame.message_name, frame.label, frame.line, frame.col);
    }
}
