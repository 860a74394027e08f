use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;
use wgsl_resolver::diagnostic::Diagnostics;
use wgsl_resolver::{parse, resolve};

#[derive(Debug, clap::Parser)]
struct Arguments {
    /// Print every module-scope declaration with its resolved type.
    #[clap(long)]
    dump_types: bool,

    /// Only report errors.
    #[clap(long)]
    no_warnings: bool,

    /// The WGSL source files to check.
    #[clap(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<ExitCode> {
    let arguments = <Arguments as clap::Parser>::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut success = true;
    for path in arguments.files.iter() {
        success &= check_file(&arguments, path)?;
    }

    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Parses and resolves a single file. Returns `false` if it contains errors.
fn check_file(arguments: &Arguments, path: &Path) -> Result<bool> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let _span = tracing::info_span!("check", path = %path.display()).entered();

    let module = match parse::parse(&source) {
        Ok(module) => module,
        Err(diagnostics) => {
            tracing::debug!(errors = diagnostics.error_count(), "could not parse");
            report(path, &diagnostics)?;
            return Ok(false);
        },
    };

    let resolved = resolve::resolve(&module);
    let diagnostics = match arguments.no_warnings {
        true => resolved.diagnostics().without_warnings(),
        false => resolved.diagnostics().clone(),
    };
    report(path, &diagnostics)?;

    if arguments.dump_types {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{}", resolved.dump(&module)).context("could not write to stdout")?;
    }

    Ok(resolved.is_valid())
}

fn report(path: &Path, diagnostics: &Diagnostics) -> Result<()> {
    if diagnostics.is_empty() {
        return Ok(());
    }
    let mut stderr = std::io::stderr().lock();
    for line in diagnostics.to_string().lines() {
        writeln!(stderr, "{}:{line}", path.display()).context("could not write to stderr")?;
    }
    Ok(())
}
