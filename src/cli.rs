//! Command-line interface for wasm-emscripten-finalize.

use std::path::PathBuf;

use clap::Parser;
use emfinalize::{DiagnosticsConfig, ExportPolicyKind, FinalizeRequest, ForcedExports};

#[derive(Parser, Debug)]
#[command(name = "wasm-emscripten-finalize")]
#[command(about = "Performs Emscripten-specific transforms on .wasm files", long_about = None)]
pub struct Cli {
    /// Input module, in binary or text form
    #[arg(value_name = "INFILE")]
    pub infile: PathBuf,

    /// Output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit text instead of binary for the output file
    #[arg(short = 'S', long)]
    pub emit_text: bool,

    /// Comma-separated list of functions to export
    #[arg(long, value_name = "NAMES")]
    pub force_exports: Vec<String>,

    /// Which functions to export
    #[arg(long, value_enum, default_value_t = ExportPolicyKind::All)]
    pub export_policy: ExportPolicyKind,

    /// Print the module before and after transforming, and log verbosely
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    pub fn request(&self) -> FinalizeRequest {
        let mut forced = ForcedExports::default();
        for list in &self.force_exports {
            forced.extend_from(list);
        }
        FinalizeRequest::new(self.infile.clone())
            .with_output(self.output.clone())
            .with_emit_binary(!self.emit_text)
            .with_forced_exports(forced)
            .with_export_policy(self.export_policy)
            .with_debug(self.debug)
    }

    pub fn diagnostics(&self) -> DiagnosticsConfig {
        DiagnosticsConfig::for_output(self.output.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "wasm-emscripten-finalize",
            "in.wasm",
            "-o",
            "out.wasm",
            "--force-exports",
            "a,b,",
        ])
        .unwrap();
        let request = cli.request();
        assert_eq!(request.input(), Some(Path::new("in.wasm")));
        assert_eq!(request.output(), Some(Path::new("out.wasm")));
        assert!(request.emit_binary());
        assert_eq!(request.forced_exports().names(), ["a", "b"]);
        assert_eq!(request.export_policy(), ExportPolicyKind::All);
        assert!(!cli.diagnostics().color);
    }

    #[test]
    fn test_emit_text_without_output() {
        let cli = Cli::try_parse_from(["wasm-emscripten-finalize", "-S", "in.wat"]).unwrap();
        let request = cli.request();
        assert!(!request.emit_binary());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_export_policy_flag() {
        let cli = Cli::try_parse_from([
            "wasm-emscripten-finalize",
            "in.wasm",
            "-o",
            "out.wasm",
            "--export-policy",
            "all-and-forced",
        ])
        .unwrap();
        assert_eq!(cli.request().export_policy(), ExportPolicyKind::AllAndForced);
    }

    #[test]
    fn test_infile_is_required() {
        assert!(Cli::try_parse_from(["wasm-emscripten-finalize", "-S"]).is_err());
    }
}
