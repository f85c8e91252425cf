//! The `__growWasmMemory` export, which lets the host grow memory 0.

use emfinalize_ir::{FuncType, Module, Name, ValType};
use tracing::debug;
use wasm_encoder::{Function, Instruction};

use crate::emscripten::install_function;
use crate::{GlueConfig, GlueResult};

/// Add `__growWasmMemory(delta) -> previous_pages` when memory 0 can grow.
pub(crate) fn generate_memory_growth_function(
    module: &mut Module,
    config: &GlueConfig,
) -> GlueResult<()> {
    let Some(memory) = module.memory_type(0) else {
        debug!("module has no memory; skipping memory growth");
        return Ok(());
    };
    if !memory.is_growable() {
        debug!("memory 0 cannot grow; skipping memory growth");
        return Ok(());
    }

    let pages = if memory.memory64 {
        ValType::I64
    } else {
        ValType::I32
    };
    let mut body = Function::new([]);
    body.instruction(&Instruction::LocalGet(0));
    body.instruction(&Instruction::MemoryGrow(0));
    body.instruction(&Instruction::End);
    install_function(
        module,
        Name::from_dynamic(&config.memory_growth_function),
        FuncType::new([pages], [pages]),
        body,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use emfinalize_ir::{ExportKind, parse_text};

    fn run(wat: &str) -> Module {
        let mut module = parse_text(wat.as_bytes()).unwrap();
        generate_memory_growth_function(&mut module, &GlueConfig::default()).unwrap();
        module
    }

    #[test]
    fn test_growable_memory_gets_function() {
        let module = run("(module (memory 1))");
        let name = Name::new("__growWasmMemory");
        assert!(module.function(name).is_some());
        assert!(module.is_exported(ExportKind::Function, name));
        assert_eq!(
            module.function_type(name),
            Some(&FuncType::new([ValType::I32], [ValType::I32]))
        );
    }

    #[test]
    fn test_fixed_memory_is_skipped() {
        let module = run("(module (memory 2 2))");
        assert!(module.functions().is_empty());
    }

    #[test]
    fn test_no_memory_is_skipped() {
        let module = run("(module)");
        assert!(module.functions().is_empty());
    }
}
