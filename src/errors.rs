//! Error types for a finalize run.

use derive_more::{Display, From};
use emfinalize_glue::GlueError;
use emfinalize_ir::IrError;

use crate::exports::ExportError;
use crate::glue_driver::GlueStage;
use crate::request::ConfigError;

pub type FinalizeResult<T> = Result<T, FinalizeError>;

#[derive(Display, Debug, From)]
#[display("{kind}")]
pub struct FinalizeError {
    #[from]
    kind: Box<FinalizeErrorKind>,
}

impl<E> From<E> for FinalizeError
where
    FinalizeErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        FinalizeError {
            kind: Box::new(FinalizeErrorKind::from(error)),
        }
    }
}

impl FinalizeError {
    pub fn kind(&self) -> &FinalizeErrorKind {
        &self.kind
    }

    pub fn load(error: IrError) -> Self {
        FinalizeErrorKind::Load(error).into()
    }

    pub fn dump(error: IrError) -> Self {
        FinalizeErrorKind::Dump(error).into()
    }

    pub fn write(error: IrError) -> Self {
        FinalizeErrorKind::Write(error).into()
    }

    pub fn glue(stage: GlueStage, source: GlueError) -> Self {
        FinalizeErrorKind::Glue { stage, source }.into()
    }
}

#[derive(Display, Debug)]
pub enum FinalizeErrorKind {
    #[display("{_0}")]
    Config(ConfigError),

    #[display("failed to load module: {_0}")]
    Load(IrError),

    #[display("{_0}")]
    Export(ExportError),

    #[display("{stage} failed: {source}")]
    Glue { stage: GlueStage, source: GlueError },

    #[display("failed to print module: {_0}")]
    Dump(IrError),

    #[display("failed to write module: {_0}")]
    Write(IrError),
}

impl From<ConfigError> for FinalizeErrorKind {
    fn from(error: ConfigError) -> Self {
        FinalizeErrorKind::Config(error)
    }
}

impl From<ExportError> for FinalizeErrorKind {
    fn from(error: ExportError) -> Self {
        FinalizeErrorKind::Export(error)
    }
}

impl std::error::Error for FinalizeError {}
