//! Runtime glue for modules loaded by the Emscripten JavaScript runtime.
//!
//! The finalize pipeline sees glue generation only through the
//! [`GlueGenerator`] trait. [`EmscriptenGlueGenerator`] is the real
//! implementation; tests substitute their own.

mod asm_consts;
mod dyncall;
mod emscripten;
mod errors;
mod memory_growth;
mod runtime;
mod signature;

use emfinalize_ir::Module;

pub use asm_consts::{AsmConst, AsmConsts};
pub use emscripten::{EmscriptenGlueGenerator, GlueConfig};
pub use errors::{GlueError, GlueErrorKind, GlueResult};
pub use signature::EmscriptenSignature;

/// The four glue operations, each editing the module in place.
///
/// Callers run them in declaration order; later operations may rely on
/// functions and exports added by earlier ones.
pub trait GlueGenerator {
    /// Add the runtime support functions the host expects to find.
    fn generate_runtime_functions(&mut self, module: &mut Module) -> GlueResult<()>;

    /// Add the function the host calls to grow linear memory.
    fn generate_memory_growth_function(&mut self, module: &mut Module) -> GlueResult<()>;

    /// Add one dynamic-call thunk per signature callable through the table.
    fn generate_dyncall_thunks(&mut self, module: &mut Module) -> GlueResult<()>;

    /// Rewrite inline asm constant references into the loader's form.
    fn fix_em_asm_consts(&mut self, module: &mut Module) -> GlueResult<()>;
}

impl<G: GlueGenerator + ?Sized> GlueGenerator for &mut G {
    fn generate_runtime_functions(&mut self, module: &mut Module) -> GlueResult<()> {
        (**self).generate_runtime_functions(module)
    }

    fn generate_memory_growth_function(&mut self, module: &mut Module) -> GlueResult<()> {
        (**self).generate_memory_growth_function(module)
    }

    fn generate_dyncall_thunks(&mut self, module: &mut Module) -> GlueResult<()> {
        (**self).generate_dyncall_thunks(module)
    }

    fn fix_em_asm_consts(&mut self, module: &mut Module) -> GlueResult<()> {
        (**self).fix_em_asm_consts(module)
    }
}
