//! Export normalization.
//!
//! Every function the selection policy picks must be reachable from the
//! host, so it gets an export under its own name unless some export already
//! targets it. Existing exports are never renamed, reordered or removed; a
//! function whose name is already used by another export is left alone.

use derive_more::Display;
use emfinalize_ir::{Export, ExportKind, Module, Name};
use tracing::{debug, trace, warn};

use crate::request::ForcedExports;

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum ExportError {
    #[display("cannot export {_0}: no such function")]
    UnknownFunction(String),
}

impl std::error::Error for ExportError {}

/// Chooses which functions must be exported.
pub trait ExportPolicy {
    fn select(&self, module: &Module, forced: &ForcedExports) -> Result<Vec<Name>, ExportError>;
}

/// The built-in selection policies.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportPolicyKind {
    /// Every defined function; forced names are ignored.
    #[default]
    #[display("all")]
    All,
    /// Only the forced names.
    #[display("forced")]
    Forced,
    /// Every defined function plus the forced names.
    #[display("all-and-forced")]
    AllAndForced,
}

impl ExportPolicy for ExportPolicyKind {
    fn select(&self, module: &Module, forced: &ForcedExports) -> Result<Vec<Name>, ExportError> {
        let mut selected: Vec<Name> = match self {
            ExportPolicyKind::All | ExportPolicyKind::AllAndForced => {
                module.functions().iter().map(|function| function.name).collect()
            }
            ExportPolicyKind::Forced => Vec::new(),
        };
        if *self == ExportPolicyKind::All {
            if !forced.is_empty() {
                debug!("forced exports ignored by the `all` policy");
            }
            return Ok(selected);
        }
        for text in forced.names() {
            let name = Name::from_dynamic(text);
            if !module.has_function(name) {
                return Err(ExportError::UnknownFunction(text.clone()));
            }
            if !selected.contains(&name) {
                selected.push(name);
            }
        }
        Ok(selected)
    }
}

/// What [`normalize_exports`] changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Names of the exports that were added, in insertion order.
    pub added: Vec<Name>,
    /// Functions left unexported because their name was already taken by an
    /// export of something else.
    pub skipped: Vec<Name>,
}

/// Export every function selected by `policy` that is not exported yet.
pub fn normalize_exports(
    module: &mut Module,
    policy: &dyn ExportPolicy,
    forced: &ForcedExports,
) -> Result<ExportReport, ExportError> {
    let mut report = ExportReport::default();
    for name in policy.select(module, forced)? {
        if module.is_exported(ExportKind::Function, name) {
            trace!("{name} is already exported");
            continue;
        }
        if let Some(existing) = module.get_export(name) {
            warn!(
                "not exporting function {name}: the name is already exported as {} {}",
                existing.kind.as_str(),
                existing.value
            );
            report.skipped.push(name);
            continue;
        }
        module
            .add_export(Export::function(name))
            .map_err(|_| ExportError::UnknownFunction(name.to_string()))?;
        report.added.push(name);
    }
    debug!(
        "normalized exports: {} added, {} skipped",
        report.added.len(),
        report.skipped.len()
    );
    Ok(report)
}
