//! # callscope - Main Entry Point
//!
//! Drives the library against its own process:
//! - **trace**: capture this thread's stack and print every frame resolved
//! - **modules**: enumerate loaded modules into the cache and print it
//! - **resolve**: resolve addresses given on the command line

use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;
use serde::Serialize;

use callscope::cli::{Args, Command, OutputFormat};
use callscope::report::{resolve_all, ModuleReport, ResolvedFrame};
use callscope::{capture_stack, init_callstack_with, Callstack, RawCallstack};

// Exit codes; clap exits with 2 on usage errors itself
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.callstack_config();
    info!("Starting callscope with {config:?}");

    let mut callstack = init_callstack_with(&config)
        .lock()
        .map_err(|_| anyhow!("callstack lock poisoned"))?;

    match args.command {
        Command::Trace { depth, fast } => trace(&mut callstack, depth, fast, args.format),
        Command::Modules => modules(&mut callstack, args.format),
        Command::Resolve { ref addresses } => resolve(&mut callstack, addresses, args.format),
    }
}

#[inline(never)]
fn capture_here(depth: usize) -> RawCallstack {
    let stack = capture_stack(depth);
    std::hint::black_box(&stack);
    stack
}

fn trace(
    callstack: &mut Callstack,
    depth: usize,
    fast: bool,
    format: OutputFormat,
) -> Result<()> {
    let stack = capture_here(depth);
    info!("Captured {} frames", stack.len());

    if fast {
        let names: Vec<FastFrame> = stack
            .addresses()
            .map(|addr| FastFrame {
                addr: format!("0x{addr:x}"),
                name: callstack.resolve_fast(addr).to_string(),
            })
            .collect();
        return match format {
            OutputFormat::Json => write_json(&names),
            OutputFormat::Text => write_lines(
                names
                    .iter()
                    .enumerate()
                    .map(|(i, frame)| format!("#{i:<2} {} {}", frame.addr, frame.name)),
            ),
        };
    }

    let frames = resolve_all(callstack, stack.addresses());
    print_frames(&frames, format)
}

fn modules(callstack: &mut Callstack, format: OutputFormat) -> Result<()> {
    let added = callstack.enumerate_modules();
    info!("Enumeration added {added} modules");

    let modules: Vec<ModuleReport> =
        callstack.module_cache().entries().iter().map(ModuleReport::from).collect();
    match format {
        OutputFormat::Json => write_json(&modules),
        OutputFormat::Text => write_lines(
            modules
                .iter()
                .map(|m| format!("0x{:016x}-0x{:016x} {}", m.start, m.end, m.name)),
        ),
    }
}

fn resolve(
    callstack: &mut Callstack,
    addresses: &[u64],
    format: OutputFormat,
) -> Result<()> {
    let frames = resolve_all(callstack, addresses.iter().copied());
    print_frames(&frames, format)
}

#[derive(Serialize)]
struct FastFrame {
    addr: String,
    name: String,
}

fn print_frames(frames: &[ResolvedFrame], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(frames),
        OutputFormat::Text => {
            write_lines(frames.iter().enumerate().map(|(i, frame)| frame.format(i)))
        }
    }
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value).context("Failed to write JSON")?;
    writeln!(out).context("Failed to write output")?;
    Ok(())
}

fn write_lines<I: IntoIterator<Item = String>>(lines: I) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in lines {
        writeln!(out, "{line}").context("Failed to write output")?;
    }
    Ok(())
}
