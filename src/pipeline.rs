//! The finalize pipeline.
//!
//! ```text
//! FinalizeRequest
//!     │ validate (no I/O before this succeeds)
//!     ▼
//! read_module ─► Loaded
//!     │ [debug] dump "Module before"
//!     ▼
//! normalize_exports ─► Normalized
//!     │
//!     ▼
//! drive_glue ─► GlueApplied
//!     │ [debug] dump "Module after", validate
//!     ▼
//! ModuleWriter::write ─► Written ─► Done
//! ```
//!
//! Any failure stops the run with a typed error. Output files are staged and
//! renamed into place, so a failed run never leaves a partial artifact.

use std::io::Write;
use std::path::Path;

use derive_more::Display;
use emfinalize_glue::{EmscriptenGlueGenerator, GlueGenerator};
use emfinalize_ir::{Destination, IrError, Module, ModuleWriter, Name, print_module, read_module};
use tracing::{debug, info, warn};

use crate::diagnostics::DiagnosticsConfig;
use crate::errors::{FinalizeError, FinalizeResult};
use crate::exports::{ExportPolicy, normalize_exports};
use crate::glue_driver::drive_glue;
use crate::request::FinalizeRequest;

/// Progress of a run. A failed run stays at the last stage it reached.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    Loaded,
    Normalized,
    GlueApplied,
    Written,
    Done,
}

/// Summary of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// Exports added by normalization.
    pub added_exports: Vec<Name>,
    /// Functions left unexported because their name was taken.
    pub skipped_exports: Vec<Name>,
    pub destination: Destination,
}

/// Runs the pipeline with swappable collaborators.
pub struct Finalizer<'a> {
    generator: Box<dyn GlueGenerator + 'a>,
    policy: Option<Box<dyn ExportPolicy + 'a>>,
    dump: Box<dyn Write + 'a>,
    diagnostics: DiagnosticsConfig,
    stage: Stage,
}

impl Default for Finalizer<'_> {
    fn default() -> Self {
        Finalizer {
            generator: Box::new(EmscriptenGlueGenerator::new()),
            policy: None,
            dump: Box::new(std::io::stderr()),
            diagnostics: DiagnosticsConfig::default(),
            stage: Stage::Start,
        }
    }
}

impl<'a> Finalizer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(mut self, generator: impl GlueGenerator + 'a) -> Self {
        self.generator = Box::new(generator);
        self
    }

    /// Override the export policy named by the request.
    pub fn with_policy(mut self, policy: impl ExportPolicy + 'a) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Where debug dumps go. Defaults to stderr.
    pub fn with_dump_sink(mut self, dump: impl Write + 'a) -> Self {
        self.dump = Box::new(dump);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn diagnostics(&self) -> DiagnosticsConfig {
        self.diagnostics
    }

    /// Print a failed run's error the way this finalizer is configured to.
    pub fn report_error(&self, error: &FinalizeError, out: &mut dyn Write) {
        self.diagnostics.print_error(error, out);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        debug!("stage: {} -> {stage}", self.stage);
        self.stage = stage;
    }

    pub fn run(&mut self, request: &FinalizeRequest) -> FinalizeResult<FinalizeOutcome> {
        self.stage = Stage::Start;
        let input = request.validate()?;

        let mut module = read_module(input).map_err(FinalizeError::load)?;
        self.advance(Stage::Loaded);

        if request.debug() {
            self.dump_module("Module before:", &module)?;
        }

        let report = match &self.policy {
            Some(policy) => normalize_exports(&mut module, policy.as_ref(), request.forced_exports())?,
            None => normalize_exports(
                &mut module,
                &request.export_policy(),
                request.forced_exports(),
            )?,
        };
        self.advance(Stage::Normalized);

        drive_glue(self.generator.as_mut(), &mut module)?;
        self.advance(Stage::GlueApplied);

        if request.debug() {
            self.dump_module("Module after:", &module)?;
            if let Err(err) = emfinalize_ir::validate(&module) {
                warn!("finalized module does not validate: {err}");
            }
        }

        let destination = ModuleWriter::new(request.emit_binary())
            .with_debug_info(true)
            .write(&module, request.output())
            .map_err(FinalizeError::write)?;
        self.advance(Stage::Written);

        info!(
            "finalized {} into {destination}: {} exports added",
            input.display(),
            report.added.len()
        );
        self.advance(Stage::Done);
        Ok(FinalizeOutcome {
            added_exports: report.added,
            skipped_exports: report.skipped,
            destination,
        })
    }

    fn dump_module(&mut self, title: &str, module: &Module) -> FinalizeResult<()> {
        writeln!(self.dump, "{title}")
            .map_err(|err| FinalizeError::dump(IrError::io(Path::new("<dump>"), err)))?;
        print_module(module, &mut self.dump).map_err(FinalizeError::dump)
    }
}

/// Run the pipeline with the default collaborators.
pub fn finalize(request: &FinalizeRequest) -> FinalizeResult<FinalizeOutcome> {
    Finalizer::new().run(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FinalizeErrorKind;
    use crate::request::ConfigError;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Start < Stage::Loaded);
        assert!(Stage::GlueApplied < Stage::Written);
        assert_eq!(Stage::GlueApplied.to_string(), "GlueApplied");
    }

    #[test]
    fn test_config_error_happens_before_reading() {
        let mut finalizer = Finalizer::new();
        // The input does not exist; a load error would mean it was read.
        let request = FinalizeRequest::new("/nonexistent/input.wasm");
        let err = finalizer.run(&request).unwrap_err();
        assert!(matches!(
            err.kind(),
            FinalizeErrorKind::Config(ConfigError::MissingOutput)
        ));
        assert_eq!(finalizer.stage(), Stage::Start);
    }

    #[test]
    fn test_load_error_stops_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let request = FinalizeRequest::new(dir.path().join("missing.wasm"))
            .with_output(Some(dir.path().join("out.wasm")));
        let mut finalizer = Finalizer::new();
        let err = finalizer.run(&request).unwrap_err();
        assert!(matches!(err.kind(), FinalizeErrorKind::Load(_)));
        assert_eq!(finalizer.stage(), Stage::Start);
        assert!(!dir.path().join("out.wasm").exists());
    }

    #[test]
    fn test_errors_reported_with_configured_diagnostics() {
        let mut finalizer =
            Finalizer::new().with_diagnostics(DiagnosticsConfig::for_output(true));
        let err = finalizer
            .run(&FinalizeRequest::new("/nonexistent/input.wasm"))
            .unwrap_err();

        let mut out = Vec::new();
        finalizer.report_error(&err, &mut out);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "error: Need to specify an outfile, or use text output\n"
        );
    }
}
