//! `dynCall_<sig>` thunks for calling table entries from the host.

use std::collections::HashSet;

use emfinalize_ir::{ConstExpr, ElementItems, ElementKind, FuncType, Module, Name, ValType};
use tracing::{debug, warn};
use wasm_encoder::{Function, Instruction};

use crate::emscripten::install_function;
use crate::{EmscriptenSignature, GlueResult};

/// Add one thunk per distinct signature of the functions in table 0.
///
/// A thunk takes the table index first, then the target's parameters, and
/// forwards them through `call_indirect`.
pub(crate) fn generate_dyncall_thunks(module: &mut Module) -> GlueResult<()> {
    let mut seen = HashSet::new();
    let mut signatures = Vec::new();
    for name in table_functions(module) {
        let Some(ty) = module.function_type(name) else {
            continue;
        };
        let Some(sig) = ty.emscripten_signature() else {
            warn!("{name} has no signature letters; no dynCall thunk");
            continue;
        };
        if seen.insert(sig.clone()) {
            signatures.push((sig, ty.clone()));
        }
    }

    for (sig, ty) in signatures {
        let target_type = module.intern_type(ty.clone());
        let param_count = ty.params.len() as u32;

        let mut body = Function::new([]);
        for index in 1..=param_count {
            body.instruction(&Instruction::LocalGet(index));
        }
        body.instruction(&Instruction::LocalGet(0));
        body.instruction(&Instruction::CallIndirect {
            type_index: target_type,
            table_index: 0,
        });
        body.instruction(&Instruction::End);

        let thunk_type = FuncType::new(
            std::iter::once(ValType::I32).chain(ty.params.iter().copied()),
            ty.results.iter().copied(),
        );
        let name = Name::from_dynamic(&format!("dynCall_{sig}"));
        install_function(module, name, thunk_type, body)?;
    }
    debug!("dynCall thunks: {} signatures", seen.len());
    Ok(())
}

/// Functions placed in table 0 by active segments, in segment order.
fn table_functions(module: &Module) -> Vec<Name> {
    let mut names = Vec::new();
    for segment in &module.elements {
        if !matches!(segment.kind, ElementKind::Active { table: 0, .. }) {
            continue;
        }
        match &segment.items {
            ElementItems::Functions(functions) => names.extend(functions.iter().copied()),
            ElementItems::Expressions(_, exprs) => {
                names.extend(exprs.iter().filter_map(|expr| match expr {
                    ConstExpr::RefFunc(name) => Some(*name),
                    _ => None,
                }))
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use emfinalize_ir::{ExportKind, parse_text};

    const TABLE: &str = r#"
    (module
      (table 8 funcref)
      (func $a (param i32) (result i32) local.get 0)
      (func $b (param i32) (result i32) local.get 0)
      (func $c (param f64 i64))
      (func $d (param externref))
      (func $unlisted (param f32))
      (elem (i32.const 1) func $a $b $c $d))
    "#;

    #[test]
    fn test_one_thunk_per_signature() {
        let mut module = parse_text(TABLE.as_bytes()).unwrap();
        generate_dyncall_thunks(&mut module).unwrap();

        let thunks: Vec<_> = module
            .functions()
            .iter()
            .map(|f| f.name.to_string())
            .filter(|name| name.starts_with("dynCall_"))
            .collect();
        assert_eq!(thunks, vec!["dynCall_ii", "dynCall_vdj"]);

        let ii = Name::new("dynCall_ii");
        assert!(module.is_exported(ExportKind::Function, ii));
        assert_eq!(
            module.function_type(ii),
            Some(&FuncType::new([ValType::I32, ValType::I32], [ValType::I32]))
        );
    }

    #[test]
    fn test_thunks_validate() {
        let mut module = parse_text(TABLE.as_bytes()).unwrap();
        generate_dyncall_thunks(&mut module).unwrap();
        emfinalize_ir::validate(&module).unwrap();
    }

    #[test]
    fn test_no_table_no_thunks() {
        let mut module = parse_text(b"(module (func $f))").unwrap();
        generate_dyncall_thunks(&mut module).unwrap();
        assert_eq!(module.functions().len(), 1);
    }
}
