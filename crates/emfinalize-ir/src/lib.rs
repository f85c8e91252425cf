//! In-memory WebAssembly modules for the finalize pipeline.
//!
//! This crate provides the [`Module`] data model together with its binary
//! and text codecs. Entities are addressed by interned [`Name`]s so that
//! transforms can add functions and exports without tracking indices.

mod decode;
mod encode;
mod errors;
mod io;
pub mod module;
mod name;
pub mod types;

pub use decode::parse_binary;
pub use encode::{WriteOptions, encode};
pub use errors::{IrError, IrErrorKind, IrResult};
pub use io::{Destination, ModuleWriter, parse_text, print_module, read_module, validate};
pub use module::{
    ConstExpr, CustomSection, DataKind, DataSegment, ElementItems, ElementKind, ElementSegment,
    Export, ExportKind, Function, Global, Import, ImportKind, Memory, Module, Table,
};
pub use name::Name;
pub use types::{FuncType, GlobalType, MemoryType, TableType, ValType};
