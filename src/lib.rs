//! Finalize-stage pipeline for Emscripten WebAssembly modules.
//!
//! A run loads a linked module, makes the selected functions visible at the
//! module boundary, applies the Emscripten glue stages in their fixed order
//! and writes the result in binary or text form.

pub mod diagnostics;
pub mod errors;
pub mod exports;
pub mod glue_driver;
pub mod pipeline;
pub mod request;

pub use diagnostics::DiagnosticsConfig;
pub use errors::{FinalizeError, FinalizeErrorKind, FinalizeResult};
pub use exports::{ExportError, ExportPolicy, ExportPolicyKind, ExportReport, normalize_exports};
pub use glue_driver::{GlueStage, drive_glue};
pub use pipeline::{FinalizeOutcome, Finalizer, Stage, finalize};
pub use request::{ConfigError, FinalizeRequest, ForcedExports};
