//! Error types for module decoding, encoding and file I/O.

use std::path::{Path, PathBuf};

use derive_more::{Display, From};

pub type IrResult<T> = Result<T, IrError>;

#[derive(Display, Debug, From)]
#[display("{kind}")]
pub struct IrError {
    #[from]
    kind: Box<IrErrorKind>,
}

impl<E> From<E> for IrError
where
    IrErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        IrError {
            kind: Box::new(IrErrorKind::from(error)),
        }
    }
}

impl IrError {
    pub fn kind(&self) -> &IrErrorKind {
        &self.kind
    }

    pub fn unsupported(msg: impl std::fmt::Display) -> Self {
        IrErrorKind::Unsupported(msg.to_string()).into()
    }

    pub fn invalid_module(msg: impl std::fmt::Display) -> Self {
        IrErrorKind::InvalidModule(msg.to_string()).into()
    }

    pub fn text(msg: impl std::fmt::Display) -> Self {
        IrErrorKind::Text(msg.to_string()).into()
    }

    pub fn print(msg: impl std::fmt::Display) -> Self {
        IrErrorKind::Print(msg.to_string()).into()
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        IrErrorKind::Io {
            path: path.to_path_buf(),
            source,
        }
        .into()
    }
}

#[derive(Display, Debug)]
pub enum IrErrorKind {
    #[display("Malformed module: {_0}")]
    Parse(wasmparser::BinaryReaderError),

    #[display("Malformed text module: {_0}")]
    Text(String),

    #[display("Unsupported feature: {_0}")]
    Unsupported(String),

    #[display("Invalid module: {_0}")]
    InvalidModule(String),

    #[display("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[display("Duplicate export name: {_0}")]
    DuplicateExport(String),

    #[display("Unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },

    #[display("{}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[display("Failed to print module: {_0}")]
    Print(String),
}

impl From<wasmparser::BinaryReaderError> for IrErrorKind {
    fn from(error: wasmparser::BinaryReaderError) -> Self {
        IrErrorKind::Parse(error)
    }
}

impl std::error::Error for IrError {}
