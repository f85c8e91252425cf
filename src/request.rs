//! The immutable description of one finalize run.

use std::path::{Path, PathBuf};

use derive_more::Display;

use crate::exports::ExportPolicyKind;

/// Problems with the request itself, found before any file is touched.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ConfigError {
    #[display("Need to specify an infile")]
    MissingInput,

    #[display("Need to specify an outfile, or use text output")]
    MissingOutput,
}

impl std::error::Error for ConfigError {}

/// Names given with `--force-exports`, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForcedExports(Vec<String>);

impl ForcedExports {
    /// Split a comma separated list. Empty segments are kept except for a
    /// trailing one, so `"a,b,"` gives `["a", "b"]`.
    pub fn parse(list: &str) -> Self {
        let mut forced = ForcedExports::default();
        forced.extend_from(list);
        forced
    }

    /// Append the names of another comma separated list.
    pub fn extend_from(&mut self, list: &str) {
        let mut names: Vec<String> = list.split(',').map(str::to_string).collect();
        if names.last().is_some_and(|name| name.is_empty()) {
            names.pop();
        }
        self.0.extend(names);
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a finalize run needs to know, fixed once constructed.
#[derive(Clone, Debug)]
pub struct FinalizeRequest {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    emit_binary: bool,
    forced_exports: ForcedExports,
    debug: bool,
    export_policy: ExportPolicyKind,
}

impl FinalizeRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        FinalizeRequest {
            input: (!input.as_os_str().is_empty()).then_some(input),
            output: None,
            emit_binary: true,
            forced_exports: ForcedExports::default(),
            debug: false,
            export_policy: ExportPolicyKind::default(),
        }
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output.filter(|path| !path.as_os_str().is_empty());
        self
    }

    pub fn with_emit_binary(mut self, emit_binary: bool) -> Self {
        self.emit_binary = emit_binary;
        self
    }

    pub fn with_forced_exports(mut self, forced_exports: ForcedExports) -> Self {
        self.forced_exports = forced_exports;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_export_policy(mut self, export_policy: ExportPolicyKind) -> Self {
        self.export_policy = export_policy;
        self
    }

    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn emit_binary(&self) -> bool {
        self.emit_binary
    }

    pub fn forced_exports(&self) -> &ForcedExports {
        &self.forced_exports
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn export_policy(&self) -> ExportPolicyKind {
        self.export_policy
    }

    /// Check the request, returning the input path on success.
    pub fn validate(&self) -> Result<&Path, ConfigError> {
        let input = self.input().ok_or(ConfigError::MissingInput)?;
        if self.emit_binary && self.output.is_none() {
            return Err(ConfigError::MissingOutput);
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_exports_split_on_commas() {
        assert_eq!(ForcedExports::parse("a,b,c").names(), ["a", "b", "c"]);
    }

    #[test]
    fn test_forced_exports_drop_trailing_empty() {
        assert_eq!(ForcedExports::parse("a,b,").names(), ["a", "b"]);
        assert!(ForcedExports::parse("").is_empty());
    }

    #[test]
    fn test_forced_exports_keep_inner_empty() {
        assert_eq!(ForcedExports::parse("a,,b").names(), ["a", "", "b"]);
        assert_eq!(ForcedExports::parse(",a").names(), ["", "a"]);
    }

    #[test]
    fn test_forced_exports_accumulate() {
        let mut forced = ForcedExports::parse("a");
        forced.extend_from("b,c,");
        assert_eq!(forced.names(), ["a", "b", "c"]);
    }

    #[test]
    fn test_binary_output_needs_path() {
        let request = FinalizeRequest::new("in.wasm");
        assert_eq!(request.validate(), Err(ConfigError::MissingOutput));
    }

    #[test]
    fn test_text_output_may_go_to_stdout() {
        let request = FinalizeRequest::new("in.wasm").with_emit_binary(false);
        assert_eq!(request.validate(), Ok(Path::new("in.wasm")));
    }

    #[test]
    fn test_empty_input_is_missing() {
        let request = FinalizeRequest::new("").with_output(Some("out.wasm".into()));
        assert_eq!(request.validate(), Err(ConfigError::MissingInput));
    }
}
