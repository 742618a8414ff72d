//! `cairo-vm`: a CLI driver that loads a compiled Cairo program, runs it on
//! [`cairo_vm_core::runner::CairoRunner`] and persists the relocated memory
//! and trace.
//!
//! Grounded on the clap derive style used throughout the retrieved example
//! pack (a single `#[derive(Parser)]` struct with `#[arg(...)]` fields), and
//! on `tracing-subscriber`'s `EnvFilter` pattern for CLI log configuration.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cairo_vm_core::errors::runner_errors::RunnerError;
use cairo_vm_core::errors::vm_errors::VirtualMachineError;
use cairo_vm_core::hint_processor::{CompiledHints, HintDispatchMode, NoHints};
use cairo_vm_core::program::Program;
use cairo_vm_core::relocation::{RelocationError, RelocationOutput};
use cairo_vm_core::resource_tracker::RunResources;
use cairo_vm_core::runner::{CairoLayout, CairoRunner};
use cairo_vm_core::scopes::ExecutionScopes;
use cairo_vm_core::segments::Arg;

/// Runs a compiled Cairo program and relocates its memory and trace.
#[derive(Parser, Debug)]
#[command(name = "cairo-vm", version, about)]
struct Cli {
    /// Path to the compiled program JSON.
    program: PathBuf,

    /// The builtin layout to run against.
    #[arg(long, default_value = "plain")]
    layout: String,

    /// Run the program's proof-mode entrypoint instead of `main`.
    #[arg(long)]
    proof_mode: bool,

    /// Build the proof-mode stack the way Cairo 1 compiled output expects.
    #[arg(long, requires = "proof_mode")]
    cairo1_proof: bool,

    /// Accept programs that declare builtins the layout doesn't provide.
    #[arg(long)]
    allow_missing_builtins: bool,

    /// Where to write the relocated memory file.
    #[arg(long)]
    memory_file: Option<PathBuf>,

    /// Where to write the relocated trace file.
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Record an execution trace (implied by `--trace-file`).
    #[arg(long)]
    trace: bool,

    /// Maximum number of steps to run before aborting.
    #[arg(long)]
    max_steps: Option<usize>,
}

/// Exit codes categorizing the error taxonomy's top-level error kinds.
#[repr(u8)]
enum ExitStatus {
    Ok = 0,
    Runner = 1,
    Vm = 2,
    Io = 3,
    BadLayout = 4,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::from(ExitStatus::Ok as u8),
        Err(err) => {
            tracing::error!(%err, "run failed");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_status() as u8)
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let layout = CairoLayout::by_name(&cli.layout)
        .ok_or_else(|| CliError::BadLayout(cli.layout.clone()))?;
    tracing::info!(layout = layout.name, program = %cli.program.display(), "loading program");

    let bytes = fs::read(&cli.program).map_err(|e| CliError::Io(e.to_string()))?;
    let program = Program::from_json(&bytes).map_err(CliError::Runner)?;

    let trace_enabled = cli.trace || cli.trace_file.is_some();
    let mut runner = CairoRunner::new(
        program,
        layout,
        cli.proof_mode,
        cli.allow_missing_builtins,
        trace_enabled,
        HintDispatchMode::Extensive,
    )
    .map_err(CliError::Runner)?;

    runner.initialize_segments();
    if cli.proof_mode {
        if cli.cairo1_proof {
            runner.initialize_proof_mode_cairo1().map_err(CliError::Runner)?;
        } else {
            runner.initialize_proof_mode().map_err(CliError::Runner)?;
        }
    } else {
        let args: Vec<Arg> = Vec::new();
        runner.initialize_main_entrypoint(&args).map_err(CliError::Runner)?;
    }

    let mut hint_processor = NoHints;
    let mut exec_scopes = ExecutionScopes::new();
    let hints = CompiledHints::new();
    let mut resources = match cli.max_steps {
        Some(n) => RunResources::new(n),
        None => RunResources::unbounded(),
    };

    runner
        .end_run(&mut hint_processor, &mut exec_scopes, &hints, &mut resources)
        .map_err(CliError::Vm)?;

    runner.verify_secure_runner(true).map_err(CliError::Vm)?;

    tracing::info!(steps = runner.vm.current_step, "run finished");

    let output = runner.relocate(false).map_err(CliError::Relocation)?;

    if let Some(path) = &cli.memory_file {
        write_memory_file(path, &output).map_err(|e| CliError::Io(e.to_string()))?;
    }
    if let Some(path) = &cli.trace_file {
        write_trace_file(path, &output).map_err(|e| CliError::Io(e.to_string()))?;
    }

    Ok(())
}

/// Writes the relocated memory file: `(addr: u64 LE, value: 32-byte LE felt)`
/// pairs in ascending address order, skipping the reserved, always-empty
/// index 0 and every address that was never written.
fn write_memory_file(path: &PathBuf, output: &RelocationOutput) -> std::io::Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for (addr, cell) in output.memory.cells.iter().enumerate().skip(1) {
        let Some(value) = cell else { continue };
        writer.write_all(&(addr as u64).to_le_bytes())?;
        let mut le_bytes = value.to_bytes_be();
        le_bytes.reverse();
        writer.write_all(&le_bytes)?;
    }
    writer.flush()
}

/// Writes the relocated trace file: packed `(ap, fp, pc)` little-endian `u64`
/// triples, one per step, in step order.
fn write_trace_file(path: &PathBuf, output: &RelocationOutput) -> std::io::Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    let Some(trace) = &output.trace else {
        return Ok(());
    };
    for entry in trace {
        writer.write_all(&felt_to_u64(&entry.ap).to_le_bytes())?;
        writer.write_all(&felt_to_u64(&entry.fp).to_le_bytes())?;
        writer.write_all(&felt_to_u64(&entry.pc).to_le_bytes())?;
    }
    writer.flush()
}

fn felt_to_u64(felt: &cairo_vm_core::felt::Felt) -> u64 {
    let be_bytes = felt.to_bytes_be();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&be_bytes[24..]);
    u64::from_be_bytes(buf)
}

/// Errors `main` can surface, each mapped to a distinct exit status.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("unknown layout {0:?} (expected one of: plain, small, dynamic, all_cairo)")]
    BadLayout(String),
    #[error(transparent)]
    Runner(RunnerError),
    #[error(transparent)]
    Vm(VirtualMachineError),
    #[error(transparent)]
    Relocation(RelocationError),
    #[error("{0}")]
    Io(String),
}

impl CliError {
    fn exit_status(&self) -> ExitStatus {
        match self {
            CliError::BadLayout(_) => ExitStatus::BadLayout,
            CliError::Runner(_) => ExitStatus::Runner,
            CliError::Vm(_) | CliError::Relocation(_) => ExitStatus::Vm,
            CliError::Io(_) => ExitStatus::Io,
        }
    }
}

