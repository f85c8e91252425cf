//! wasm-emscripten-finalize entry point.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use emfinalize::Finalizer;
use tracing::debug;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let diagnostics = cli.diagnostics();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(diagnostics.color)
        .with_target(false)
        .init();

    let mut finalizer = Finalizer::new().with_diagnostics(diagnostics);
    match finalizer.run(&cli.request()) {
        Ok(outcome) => {
            debug!(
                "wrote {} ({} exports added)",
                outcome.destination,
                outcome.added_exports.len()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            finalizer.report_error(&err, &mut std::io::stderr());
            ExitCode::FAILURE
        }
    }
}
