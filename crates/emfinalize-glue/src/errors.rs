//! Error types for glue generation.

use derive_more::{Display, From};
use emfinalize_ir::IrError;

pub type GlueResult<T> = Result<T, GlueError>;

#[derive(Display, Debug, From)]
#[display("{kind}")]
pub struct GlueError {
    #[from]
    kind: Box<GlueErrorKind>,
}

impl<E> From<E> for GlueError
where
    GlueErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        GlueError {
            kind: Box::new(GlueErrorKind::from(error)),
        }
    }
}

impl GlueError {
    pub fn kind(&self) -> &GlueErrorKind {
        &self.kind
    }

    pub fn malformed_body(function: impl std::fmt::Display, msg: impl std::fmt::Display) -> Self {
        GlueErrorKind::MalformedBody {
            function: function.to_string(),
            message: msg.to_string(),
        }
        .into()
    }

    pub fn stack_pointer(msg: impl std::fmt::Display) -> Self {
        GlueErrorKind::StackPointer(msg.to_string()).into()
    }

    pub fn invalid_module(msg: impl std::fmt::Display) -> Self {
        GlueErrorKind::InvalidModule(msg.to_string()).into()
    }
}

#[derive(Display, Debug)]
pub enum GlueErrorKind {
    #[display("{_0}")]
    Ir(IrError),

    #[display("Malformed body of {function}: {message}")]
    MalformedBody { function: String, message: String },

    #[display("Unusable stack pointer: {_0}")]
    StackPointer(String),

    #[display("In {function}: {message}")]
    AsmConstAddress { function: String, message: String },

    #[display("Invalid module: {_0}")]
    InvalidModule(String),
}

impl From<IrError> for GlueErrorKind {
    fn from(error: IrError) -> Self {
        GlueErrorKind::Ir(error)
    }
}

impl From<wasmparser::BinaryReaderError> for GlueErrorKind {
    fn from(error: wasmparser::BinaryReaderError) -> Self {
        GlueErrorKind::Ir(error.into())
    }
}

impl std::error::Error for GlueError {}
