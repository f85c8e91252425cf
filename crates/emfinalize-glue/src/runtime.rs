//! Stack manipulation functions over the shadow stack pointer.

use emfinalize_ir::{ExportKind, FuncType, ImportKind, Module, Name, ValType};
use tracing::info;
use wasm_encoder::{Function, Instruction};

use crate::emscripten::install_function;
use crate::{GlueConfig, GlueError, GlueResult};

const STACK_ALIGN: i32 = 16;

/// Add `stackSave`, `stackAlloc` and `stackRestore`.
pub(crate) fn generate_runtime_functions(module: &mut Module, config: &GlueConfig) -> GlueResult<()> {
    let Some(stack_pointer) = find_stack_pointer(module, &config.stack_pointer) else {
        info!(
            "no {} global; skipping stack functions",
            config.stack_pointer
        );
        return Ok(());
    };
    match module.global_type(stack_pointer) {
        Some(ty) if ty.val_type == ValType::I32 && ty.mutable => {}
        other => {
            return Err(GlueError::stack_pointer(format!(
                "{stack_pointer} must be a mutable i32 global, found {other:?}"
            )));
        }
    }
    let global = module
        .global_index(stack_pointer)
        .ok_or_else(|| GlueError::stack_pointer(format!("{stack_pointer} has no index")))?;

    let mut save = Function::new([]);
    save.instruction(&Instruction::GlobalGet(global));
    save.instruction(&Instruction::End);
    install_function(
        module,
        Name::new("stackSave"),
        FuncType::new([], [ValType::I32]),
        save,
    )?;

    // sp = (sp - size) & -16; return sp
    let mut alloc = Function::new([(1, wasm_encoder::ValType::I32)]);
    alloc.instruction(&Instruction::GlobalGet(global));
    alloc.instruction(&Instruction::LocalGet(0));
    alloc.instruction(&Instruction::I32Sub);
    alloc.instruction(&Instruction::I32Const(-STACK_ALIGN));
    alloc.instruction(&Instruction::I32And);
    alloc.instruction(&Instruction::LocalTee(1));
    alloc.instruction(&Instruction::GlobalSet(global));
    alloc.instruction(&Instruction::LocalGet(1));
    alloc.instruction(&Instruction::End);
    install_function(
        module,
        Name::new("stackAlloc"),
        FuncType::new([ValType::I32], [ValType::I32]),
        alloc,
    )?;

    let mut restore = Function::new([]);
    restore.instruction(&Instruction::LocalGet(0));
    restore.instruction(&Instruction::GlobalSet(global));
    restore.instruction(&Instruction::End);
    install_function(
        module,
        Name::new("stackRestore"),
        FuncType::new([ValType::I32], []),
        restore,
    )?;
    Ok(())
}

/// Locate the stack pointer global by internal name, import field or
/// export name, in that order.
fn find_stack_pointer(module: &Module, symbol: &str) -> Option<Name> {
    let by_name = Name::from_dynamic(symbol);
    if module.global_type(by_name).is_some() {
        return Some(by_name);
    }
    let imported = module.imports().iter().find_map(|import| match import.kind {
        ImportKind::Global(_) if import.field == symbol => Some(import.name),
        _ => None,
    });
    imported.or_else(|| {
        module
            .get_export(by_name)
            .filter(|export| export.kind == ExportKind::Global)
            .map(|export| export.value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use emfinalize_ir::parse_text;

    #[test]
    fn test_finds_imported_stack_pointer_by_field() {
        let module = parse_text(
            br#"(module (import "env" "__stack_pointer" (global $sp (mut i32))))"#,
        )
        .unwrap();
        assert_eq!(
            find_stack_pointer(&module, "__stack_pointer"),
            Some(Name::new("sp"))
        );
    }

    #[test]
    fn test_finds_exported_stack_pointer() {
        let module = parse_text(
            br#"(module
                  (global $g (mut i32) (i32.const 1024))
                  (export "__stack_pointer" (global $g)))"#,
        )
        .unwrap();
        assert_eq!(
            find_stack_pointer(&module, "__stack_pointer"),
            Some(Name::new("g"))
        );
    }

    #[test]
    fn test_missing_stack_pointer_is_skipped() {
        let mut module = parse_text(b"(module)").unwrap();
        generate_runtime_functions(&mut module, &GlueConfig::default()).unwrap();
        assert!(module.functions().is_empty());
    }

    #[test]
    fn test_immutable_stack_pointer_is_rejected() {
        let mut module = parse_text(
            br#"(module (global $__stack_pointer i32 (i32.const 1024)))"#,
        )
        .unwrap();
        let err = generate_runtime_functions(&mut module, &GlueConfig::default()).unwrap_err();
        assert!(matches!(err.kind(), crate::GlueErrorKind::StackPointer(_)));
    }
}
