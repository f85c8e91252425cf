//! Inline asm constant fix-up.
//!
//! Calls to an `emscripten_asm_const*` import pass the address of a
//! NUL-terminated JavaScript snippet as their first argument. The loader
//! wants a small id instead of the address, and an import name that carries
//! the call signature. This module collects the snippets, rewrites each
//! address constant to its id and renames the imports.

use std::collections::{BTreeSet, HashMap};

use emfinalize_ir::{ImportKind, Module, Name};
use tracing::{debug, warn};
use wasm_encoder::{Encode, Instruction};
use wasmparser::{BinaryReader, FunctionBody, Operator};

use crate::{EmscriptenSignature, GlueConfig, GlueError, GlueErrorKind, GlueResult};

/// One inline asm snippet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsmConst {
    pub id: u32,
    pub code: String,
    /// Signatures of the imports the snippet is called through.
    pub signatures: BTreeSet<String>,
}

/// The snippets found in a module, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AsmConsts {
    entries: Vec<AsmConst>,
    by_code: HashMap<String, usize>,
}

impl AsmConsts {
    pub fn iter(&self) -> impl Iterator<Item = &AsmConst> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&AsmConst> {
        self.entries.get(id as usize)
    }

    /// Id for `code`, recording `signature` as one it is called with.
    fn intern(&mut self, code: String, signature: &str) -> u32 {
        let slot = match self.by_code.get(&code) {
            Some(slot) => *slot,
            None => {
                let slot = self.entries.len();
                self.by_code.insert(code.clone(), slot);
                self.entries.push(AsmConst {
                    id: slot as u32,
                    code,
                    signatures: BTreeSet::new(),
                });
                slot
            }
        };
        let entry = &mut self.entries[slot];
        entry.signatures.insert(signature.to_string());
        entry.id
    }
}

struct AsmImport {
    slot: usize,
    field: String,
    signature: String,
    param_count: u32,
}

/// A byte range of a body to replace with `i32.const id`.
struct Patch {
    start: usize,
    end: usize,
    id: u32,
}

pub(crate) fn fix_em_asm_consts(module: &mut Module, config: &GlueConfig) -> GlueResult<AsmConsts> {
    let imports = asm_imports(module, &config.asm_const_prefix)?;
    let mut consts = AsmConsts::default();
    if imports.is_empty() {
        return Ok(consts);
    }

    let functions: Vec<(Name, Vec<u8>)> = module
        .functions()
        .iter()
        .map(|function| (function.name, function.body.clone()))
        .collect();
    for (name, body) in functions {
        let patches = collect_patches(module, name, &body, &imports, &mut consts)?;
        if !patches.is_empty() {
            debug!("{name}: rewriting {} asm const addresses", patches.len());
            module.set_function_body(name, apply_patches(&body, &patches))?;
        }
    }

    for import in imports.values() {
        let suffix = format!("_{}", import.signature);
        if !import.field.ends_with(&suffix) {
            let field = format!("{}{suffix}", import.field);
            debug!("renaming import {} to {field}", import.field);
            module.set_import_field(import.slot, field)?;
        }
    }
    Ok(consts)
}

/// Asm const imports keyed by function index.
fn asm_imports(module: &Module, prefix: &str) -> GlueResult<HashMap<u32, AsmImport>> {
    let mut imports = HashMap::new();
    for (slot, import) in module.imports().iter().enumerate() {
        let ImportKind::Function { type_index } = import.kind else {
            continue;
        };
        if !import.field.starts_with(prefix) {
            continue;
        }
        let ty = module.func_type(type_index).ok_or_else(|| {
            GlueError::invalid_module(format!("import {} has unknown type", import.field))
        })?;
        let signature = ty.emscripten_signature().ok_or_else(|| {
            GlueError::invalid_module(format!(
                "import {} has a type without a signature",
                import.field
            ))
        })?;
        let index = module.function_index(import.name).ok_or_else(|| {
            GlueError::invalid_module(format!("import {} has no function index", import.field))
        })?;
        imports.insert(
            index,
            AsmImport {
                slot,
                field: import.field.clone(),
                signature,
                param_count: ty.params.len() as u32,
            },
        );
    }
    Ok(imports)
}

fn collect_patches(
    module: &Module,
    name: Name,
    body: &[u8],
    imports: &HashMap<u32, AsmImport>,
    consts: &mut AsmConsts,
) -> GlueResult<Vec<Patch>> {
    let body_reader = FunctionBody::new(BinaryReader::new(body, 0));
    let ops = body_reader
        .get_operators_reader()?
        .into_iter_with_offsets()
        .collect::<Result<Vec<_>, _>>()?;

    let mut patches = Vec::new();
    for (position, (op, _)) in ops.iter().enumerate() {
        let Operator::Call { function_index } = op else {
            continue;
        };
        let Some(import) = imports.get(function_index) else {
            continue;
        };
        let producer = first_argument(&ops[..position], import.param_count)
            .map_err(|message| address_error(name, &import.field, message))?;
        let Operator::I32Const { value } = ops[producer].0 else {
            return Err(address_error(
                name,
                &import.field,
                format!("code address comes from {:?}", ops[producer].0),
            ));
        };
        let code = match module.read_c_string(value as u32) {
            Some(code) => code,
            None => {
                warn!("{name}: no data at asm const address {value}");
                String::new()
            }
        };
        let id = consts.intern(code, &import.signature);
        patches.push(Patch {
            start: ops[producer].1,
            end: ops[producer + 1].1,
            id,
        });
    }
    Ok(patches)
}

/// Index of the instruction producing the first of `arg_count` call
/// arguments, found by walking backward over stack effects.
fn first_argument(ops: &[(Operator<'_>, usize)], arg_count: u32) -> Result<usize, String> {
    if arg_count == 0 {
        return Err("the import takes no arguments".to_string());
    }
    let mut remaining = arg_count;
    for (index, (op, _)) in ops.iter().enumerate().rev() {
        let (pops, pushes) =
            stack_effect(op).ok_or_else(|| format!("cannot trace the code address past {op:?}"))?;
        if remaining <= pushes {
            return Ok(index);
        }
        remaining = remaining - pushes + pops;
    }
    Err("the code address is not computed in this function".to_string())
}

/// Values popped and pushed by straight-line instructions.
fn stack_effect(op: &Operator<'_>) -> Option<(u32, u32)> {
    let effect = match op {
        Operator::Nop => (0, 0),
        Operator::I32Const { .. }
        | Operator::I64Const { .. }
        | Operator::F32Const { .. }
        | Operator::F64Const { .. }
        | Operator::LocalGet { .. }
        | Operator::GlobalGet { .. } => (0, 1),
        Operator::LocalSet { .. } | Operator::GlobalSet { .. } | Operator::Drop => (1, 0),
        Operator::LocalTee { .. }
        | Operator::I32Load { .. }
        | Operator::I64Load { .. }
        | Operator::F32Load { .. }
        | Operator::F64Load { .. }
        | Operator::I32Load8S { .. }
        | Operator::I32Load8U { .. }
        | Operator::I32Load16S { .. }
        | Operator::I32Load16U { .. }
        | Operator::I32Eqz
        | Operator::I64Eqz
        | Operator::I32WrapI64
        | Operator::I64ExtendI32S
        | Operator::I64ExtendI32U
        | Operator::F32ConvertI32S
        | Operator::F64ConvertI32S
        | Operator::F64PromoteF32
        | Operator::F32DemoteF64 => (1, 1),
        Operator::I32Add
        | Operator::I32Sub
        | Operator::I32Mul
        | Operator::I32And
        | Operator::I32Or
        | Operator::I32Xor
        | Operator::I32Shl
        | Operator::I32ShrS
        | Operator::I32ShrU
        | Operator::I64Add
        | Operator::I64Sub
        | Operator::I64Mul
        | Operator::F32Add
        | Operator::F32Mul
        | Operator::F64Add
        | Operator::F64Mul => (2, 1),
        Operator::I32Store { .. } | Operator::I64Store { .. } => (2, 0),
        _ => return None,
    };
    Some(effect)
}

fn address_error(function: Name, field: &str, message: String) -> GlueError {
    GlueErrorKind::AsmConstAddress {
        function: function.to_string(),
        message: format!("call to {field}: {message}"),
    }
    .into()
}

fn apply_patches(body: &[u8], patches: &[Patch]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut cursor = 0;
    for patch in patches {
        out.extend_from_slice(&body[cursor..patch.start]);
        Instruction::I32Const(patch.id as i32).encode(&mut out);
        cursor = patch.end;
    }
    out.extend_from_slice(&body[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use emfinalize_ir::parse_text;

    const ASM: &str = r#"
    (module
      (import "env" "emscripten_asm_const_int" (func $asm (param i32 i32 i32) (result i32)))
      (memory 1)
      (data (i32.const 1024) "{ return 1; }\00{ return 2; }\00")
      (func $first (result i32)
        i32.const 1038
        i32.const 0
        i32.const 0
        call $asm)
      (func $second (param i32) (result i32)
        i32.const 1024
        local.get 0
        i32.const 4
        i32.add
        i32.const 0
        call $asm
        drop
        i32.const 1038
        i32.const 0
        i32.const 0
        call $asm))
    "#;

    fn consts_of(module: &Module, name: &'static str) -> Vec<i32> {
        let body = &module.function(Name::new(name)).unwrap().body;
        FunctionBody::new(BinaryReader::new(body, 0))
            .get_operators_reader()
            .unwrap()
            .into_iter()
            .filter_map(|op| match op.unwrap() {
                Operator::I32Const { value } => Some(value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_ids_follow_first_use() {
        let mut module = parse_text(ASM.as_bytes()).unwrap();
        let consts = fix_em_asm_consts(&mut module, &GlueConfig::default()).unwrap();

        let codes: Vec<_> = consts.iter().map(|c| (c.id, c.code.as_str())).collect();
        assert_eq!(codes, vec![(0, "{ return 2; }"), (1, "{ return 1; }")]);
        assert_eq!(consts_of(&module, "first"), vec![0, 0, 0]);
        assert_eq!(consts_of(&module, "second"), vec![1, 4, 0, 0, 0, 0]);
        emfinalize_ir::validate(&module).unwrap();
    }

    #[test]
    fn test_import_gets_signature_suffix_once() {
        let mut module = parse_text(ASM.as_bytes()).unwrap();
        let consts = fix_em_asm_consts(&mut module, &GlueConfig::default()).unwrap();
        assert_eq!(module.imports()[0].field, "emscripten_asm_const_int_iiii");
        let sigs: Vec<_> = consts.get(0).unwrap().signatures.iter().cloned().collect();
        assert_eq!(sigs, vec!["iiii".to_string()]);

        let mut module = parse_text(
            br#"(module (import "env" "emscripten_asm_const_int_vi" (func (param i32))))"#,
        )
        .unwrap();
        fix_em_asm_consts(&mut module, &GlueConfig::default()).unwrap();
        assert_eq!(module.imports()[0].field, "emscripten_asm_const_int_vi");
    }

    #[test]
    fn test_dynamic_address_is_rejected() {
        let mut module = parse_text(
            br#"(module
                  (import "env" "emscripten_asm_const_int" (func $asm (param i32) (result i32)))
                  (func (param i32) (result i32) local.get 0 call $asm))"#,
        )
        .unwrap();
        let err = fix_em_asm_consts(&mut module, &GlueConfig::default()).unwrap_err();
        assert!(matches!(
            err.kind(),
            GlueErrorKind::AsmConstAddress { .. }
        ));
    }

    #[test]
    fn test_unknown_address_gets_empty_code() {
        let mut module = parse_text(
            br#"(module
                  (import "env" "emscripten_asm_const_int" (func $asm (param i32) (result i32)))
                  (func (result i32) i32.const 64 call $asm))"#,
        )
        .unwrap();
        let consts = fix_em_asm_consts(&mut module, &GlueConfig::default()).unwrap();
        assert_eq!(consts.len(), 1);
        assert_eq!(consts.get(0).unwrap().code, "");
    }

    #[test]
    fn test_first_argument_walks_over_computed_arguments() {
        let ops = vec![
            (Operator::I32Const { value: 1024 }, 0),
            (Operator::LocalGet { local_index: 0 }, 3),
            (Operator::I32Const { value: 4 }, 5),
            (Operator::I32Add, 7),
        ];
        assert_eq!(first_argument(&ops, 2), Ok(0));
        assert_eq!(first_argument(&ops, 1), Ok(3));
        assert!(first_argument(&ops[1..], 2).is_err());
    }
}
