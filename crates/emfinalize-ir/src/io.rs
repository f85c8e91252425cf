//! Reading and writing modules from files and streams.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::decode::parse_binary;
use crate::encode::{WriteOptions, encode};
use crate::{IrError, IrResult, Module};

const WASM_MAGIC: &[u8] = b"\0asm";

/// Parse a module from its text form.
pub fn parse_text(text: &[u8]) -> IrResult<Module> {
    let bytes = wat::parse_bytes(text).map_err(IrError::text)?;
    parse_binary(&bytes)
}

/// Load a module from a file, in binary or text form.
pub fn read_module(path: &Path) -> IrResult<Module> {
    let bytes = std::fs::read(path).map_err(|err| IrError::io(path, err))?;
    debug!("read {} bytes from {}", bytes.len(), path.display());
    if bytes.starts_with(WASM_MAGIC) {
        parse_binary(&bytes)
    } else {
        parse_text(&bytes)
    }
}

/// Render a module in text form.
pub fn print_module(module: &Module, out: &mut dyn Write) -> IrResult<()> {
    let bytes = encode(module, WriteOptions { debug_info: true })?;
    let text = wasmprinter::print_bytes(&bytes).map_err(IrError::print)?;
    out.write_all(text.as_bytes())
        .and_then(|()| out.write_all(b"\n"))
        .map_err(|err| IrError::io(Path::new("<stream>"), err))
}

/// Validate the encoded form of a module.
pub fn validate(module: &Module) -> IrResult<()> {
    let bytes = encode(module, WriteOptions { debug_info: false })?;
    let mut validator = wasmparser::Validator::new_with_features(wasmparser::WasmFeatures::all());
    validator.validate_all(&bytes)?;
    Ok(())
}

/// Where a [`ModuleWriter`] put its output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    File(PathBuf),
    Stdout,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::File(path) => write!(f, "{}", path.display()),
            Destination::Stdout => f.write_str("<stdout>"),
        }
    }
}

/// Serializes a module in binary or text form.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModuleWriter {
    pub binary: bool,
    pub debug_info: bool,
}

impl ModuleWriter {
    pub fn new(binary: bool) -> Self {
        ModuleWriter {
            binary,
            debug_info: false,
        }
    }

    pub fn with_debug_info(mut self, debug_info: bool) -> Self {
        self.debug_info = debug_info;
        self
    }

    /// Render the module to bytes in the configured form.
    pub fn render(&self, module: &Module) -> IrResult<Vec<u8>> {
        let bytes = encode(
            module,
            WriteOptions {
                debug_info: self.debug_info,
            },
        )?;
        if self.binary {
            return Ok(bytes);
        }
        let mut text = wasmprinter::print_bytes(&bytes).map_err(IrError::print)?;
        text.push('\n');
        Ok(text.into_bytes())
    }

    /// Write the module to `path`, or to stdout when there is no path.
    ///
    /// Binary output always needs a path. File output is staged in a
    /// temporary file next to the destination and only renamed into place
    /// once it is complete.
    pub fn write(&self, module: &Module, path: Option<&Path>) -> IrResult<Destination> {
        let bytes = self.render(module)?;
        match path {
            Some(path) => {
                write_atomic(path, &bytes)?;
                info!("wrote {} bytes to {}", bytes.len(), path.display());
                Ok(Destination::File(path.to_path_buf()))
            }
            None if self.binary => Err(IrError::invalid_module(
                "binary output requires an output path",
            )),
            None => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                lock.write_all(&bytes)
                    .and_then(|()| lock.flush())
                    .map_err(|err| IrError::io(Path::new("<stdout>"), err))?;
                Ok(Destination::Stdout)
            }
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> IrResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|err| IrError::io(dir, err))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|err| IrError::io(file.path(), err))?;
    file.persist(path)
        .map_err(|err| IrError::io(path, err.error))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
            .map_err(|err| IrError::io(path, err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Name;

    const TWO_FUNCS: &str = r#"
        (module
          (func $f1 (result i32) i32.const 1)
          (func $f2 (param i32) (result i32) local.get 0)
          (export "f1" (func $f1)))
    "#;

    #[test]
    fn test_parse_text_uses_symbolic_names() {
        let module = parse_text(TWO_FUNCS.as_bytes()).unwrap();
        let names: Vec<_> = module.functions().iter().map(|f| f.name).collect();
        assert_eq!(names, vec![Name::new("f1"), Name::new("f2")]);
    }

    #[test]
    fn test_read_module_detects_binary_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let text_path = dir.path().join("in.wat");
        std::fs::write(&text_path, TWO_FUNCS).unwrap();
        let binary_path = dir.path().join("in.wasm");
        std::fs::write(&binary_path, wat::parse_str(TWO_FUNCS).unwrap()).unwrap();

        let from_text = read_module(&text_path).unwrap();
        let from_binary = read_module(&binary_path).unwrap();
        assert_eq!(from_text.functions(), from_binary.functions());
    }

    #[test]
    fn test_read_module_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_module(&dir.path().join("missing.wasm")).unwrap_err();
        assert!(matches!(err.kind(), crate::IrErrorKind::Io { .. }));
    }

    #[test]
    fn test_binary_write_requires_path() {
        let module = parse_text(TWO_FUNCS.as_bytes()).unwrap();
        assert!(ModuleWriter::new(true).write(&module, None).is_err());
    }

    #[test]
    fn test_write_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.wasm");
        std::fs::write(&out, b"stale").unwrap();
        let module = parse_text(TWO_FUNCS.as_bytes()).unwrap();

        let destination = ModuleWriter::new(true)
            .with_debug_info(true)
            .write(&module, Some(&out))
            .unwrap();
        assert_eq!(destination, Destination::File(out.clone()));

        let written = std::fs::read(&out).unwrap();
        wasmparser::validate(&written).unwrap();
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_print_module() {
        let module = parse_text(br#"(module (func $answer (result i32) i32.const 42))"#).unwrap();
        let mut out = Vec::new();
        print_module(&module, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("$answer"));
        assert!(text.contains("i32.const 42"));
    }

    #[test]
    fn test_validate_rejects_type_mismatch() {
        let module = parse_text(br#"(module (func (result i32) i64.const 1))"#).unwrap();
        assert!(validate(&module).is_err());
    }
}
