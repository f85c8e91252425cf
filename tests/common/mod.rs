//! Common test utilities for finalize tests.

use std::path::{Path, PathBuf};

use emfinalize_ir::{Module, read_module};
use tempfile::TempDir;

/// A scratch directory holding one input module.
pub struct Fixture {
    dir: TempDir,
    input: PathBuf,
}

impl Fixture {
    /// Write `wat` to the fixture directory as a binary module.
    pub fn binary(wat: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = dir.path().join("input.wasm");
        let bytes = wat::parse_str(wat).expect("Failed to assemble fixture");
        std::fs::write(&input, bytes).expect("Failed to write fixture");
        Fixture { dir, input }
    }

    /// Write `wat` to the fixture directory as text.
    #[allow(dead_code)]
    pub fn text(wat: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = dir.path().join("input.wat");
        std::fs::write(&input, wat).expect("Failed to write fixture");
        Fixture { dir, input }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Load and validate a module written by a run.
    pub fn load(&self, name: &str) -> Module {
        let path = self.path(name);
        let bytes = std::fs::read(&path).expect("Failed to read output");
        if bytes.starts_with(b"\0asm") {
            wasmparser::validate(&bytes).expect("Output does not validate");
        }
        read_module(&path).expect("Failed to load output")
    }
}

/// Exported function names, in export order.
#[allow(dead_code)]
pub fn export_names(module: &Module) -> Vec<String> {
    module
        .exports()
        .iter()
        .map(|export| export.name.to_string())
        .collect()
}
