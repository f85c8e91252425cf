//! The Emscripten glue generator.

use emfinalize_ir::{Export, FuncType, Function, Module, Name};
use tracing::{debug, warn};

use crate::asm_consts::{AsmConsts, fix_em_asm_consts};
use crate::dyncall::generate_dyncall_thunks;
use crate::memory_growth::generate_memory_growth_function;
use crate::runtime::generate_runtime_functions;
use crate::{GlueGenerator, GlueResult};

/// Configuration for Emscripten glue generation.
#[derive(Debug, Clone)]
pub struct GlueConfig {
    /// Symbol of the global holding the shadow stack pointer.
    /// Default: `__stack_pointer`
    pub stack_pointer: String,
    /// Name of the generated memory growth function.
    /// Default: `__growWasmMemory`
    pub memory_growth_function: String,
    /// Field prefix of the imports that take inline asm code.
    /// Default: `emscripten_asm_const`
    pub asm_const_prefix: String,
}

impl Default for GlueConfig {
    fn default() -> Self {
        Self {
            stack_pointer: "__stack_pointer".to_string(),
            memory_growth_function: "__growWasmMemory".to_string(),
            asm_const_prefix: "emscripten_asm_const".to_string(),
        }
    }
}

/// Generates the glue the Emscripten runtime expects in a finalized module.
#[derive(Debug, Default)]
pub struct EmscriptenGlueGenerator {
    config: GlueConfig,
    asm_consts: AsmConsts,
}

impl EmscriptenGlueGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GlueConfig) -> Self {
        Self {
            config,
            asm_consts: AsmConsts::default(),
        }
    }

    /// The asm constants collected by [`GlueGenerator::fix_em_asm_consts`].
    pub fn asm_consts(&self) -> &AsmConsts {
        &self.asm_consts
    }
}

impl GlueGenerator for EmscriptenGlueGenerator {
    fn generate_runtime_functions(&mut self, module: &mut Module) -> GlueResult<()> {
        generate_runtime_functions(module, &self.config)
    }

    fn generate_memory_growth_function(&mut self, module: &mut Module) -> GlueResult<()> {
        generate_memory_growth_function(module, &self.config)
    }

    fn generate_dyncall_thunks(&mut self, module: &mut Module) -> GlueResult<()> {
        generate_dyncall_thunks(module)
    }

    fn fix_em_asm_consts(&mut self, module: &mut Module) -> GlueResult<()> {
        self.asm_consts = fix_em_asm_consts(module, &self.config)?;
        Ok(())
    }
}

/// Add a generated function and export it under its own name.
///
/// A function that already exists is left alone, and so is an export name
/// that is already taken. Returns whether the function was added.
pub(crate) fn install_function(
    module: &mut Module,
    name: Name,
    ty: FuncType,
    body: wasm_encoder::Function,
) -> GlueResult<bool> {
    if module.has_function(name) {
        debug!("keeping existing function {name}");
        return Ok(false);
    }
    let type_index = module.intern_type(ty);
    module.add_function(Function::new(name, type_index, body.into_raw_body()))?;
    if module.get_export(name).is_some() {
        warn!("export name {name} is taken; {name} stays internal");
    } else {
        module.add_export(Export::function(name))?;
    }
    debug!("generated {name}");
    Ok(true)
}
