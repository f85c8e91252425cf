//! Module decoding from the WebAssembly binary format.
//!
//! Decoding happens in two steps: sections are first collected with the
//! index-based references of the binary format, then the `name` section (which
//! usually comes last) is used to give every entity a [`Name`] and all
//! references are resolved against those names.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};
use wasmparser::{
    AbstractHeapType, Encoding, ExternalKind, HeapType, KnownCustom, NameSectionReader, Operator,
    Parser, Payload, TableInit, TypeRef,
};

use crate::module::{
    ConstExpr, CustomSection, DataKind, DataSegment, ElementItems, ElementKind, ElementSegment,
    Export, ExportKind, Function, Global, Import, ImportKind, Memory, Module, Table,
};
use crate::types::{FuncType, GlobalType, MemoryType, TableType, ValType};
use crate::{IrError, IrResult, Name};

/// Decode a module from its binary encoding.
pub fn parse_binary(bytes: &[u8]) -> IrResult<Module> {
    let mut decoder = Decoder::default();
    for payload in Parser::new(0).parse_all(bytes) {
        decoder.payload(payload?, bytes)?;
    }
    decoder.finish()
}

/// A constant expression before names are known.
#[derive(Clone, Copy, Debug)]
enum RawConst {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    GlobalGet(u32),
    RefNull(ValType),
    RefFunc(u32),
}

enum RawImportKind {
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

struct RawImport {
    module: String,
    field: String,
    kind: RawImportKind,
}

enum RawElementKind {
    Active { table: u32, offset: RawConst },
    Passive,
    Declared,
}

enum RawElementItems {
    Functions(Vec<u32>),
    Expressions(ValType, Vec<RawConst>),
}

enum RawDataKind {
    Active { memory: u32, offset: RawConst },
    Passive,
}

#[derive(Default)]
struct NameMaps {
    functions: HashMap<u32, String>,
    globals: HashMap<u32, String>,
    memories: HashMap<u32, String>,
    tables: HashMap<u32, String>,
    /// Local names keyed by function index.
    locals: HashMap<u32, BTreeMap<u32, String>>,
    module: Option<String>,
}

#[derive(Default)]
struct Decoder {
    types: Vec<FuncType>,
    imports: Vec<RawImport>,
    func_types: Vec<u32>,
    bodies: Vec<Vec<u8>>,
    tables: Vec<(TableType, Option<RawConst>)>,
    memories: Vec<MemoryType>,
    globals: Vec<(GlobalType, RawConst)>,
    exports: Vec<(String, ExportKind, u32)>,
    start: Option<u32>,
    elements: Vec<(RawElementKind, RawElementItems)>,
    data: Vec<(RawDataKind, Vec<u8>)>,
    data_count: bool,
    customs: Vec<CustomSection>,
    names: NameMaps,
}

impl Decoder {
    fn payload(&mut self, payload: Payload<'_>, bytes: &[u8]) -> IrResult<()> {
        match payload {
            Payload::Version { encoding, .. } => {
                if encoding != Encoding::Module {
                    return Err(IrError::unsupported("components"));
                }
            }
            Payload::TypeSection(reader) => {
                for ty in reader.into_iter_err_on_gc_types() {
                    self.types.push(FuncType::from_wasmparser(&ty?)?);
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    let kind = match import.ty {
                        TypeRef::Func(type_index) => RawImportKind::Function(type_index),
                        TypeRef::Table(ty) => RawImportKind::Table(TableType::from_wasmparser(ty)?),
                        TypeRef::Memory(ty) => {
                            RawImportKind::Memory(MemoryType::from_wasmparser(ty)?)
                        }
                        TypeRef::Global(ty) => {
                            RawImportKind::Global(GlobalType::from_wasmparser(ty)?)
                        }
                        other => {
                            return Err(IrError::unsupported(format!("import of {other:?}")));
                        }
                    };
                    self.imports.push(RawImport {
                        module: import.module.to_string(),
                        field: import.name.to_string(),
                        kind,
                    });
                }
            }
            Payload::FunctionSection(reader) => {
                for type_index in reader {
                    self.func_types.push(type_index?);
                }
            }
            Payload::TableSection(reader) => {
                for table in reader {
                    let table = table?;
                    let init = match table.init {
                        TableInit::RefNull => None,
                        TableInit::Expr(expr) => Some(decode_const(&expr)?),
                    };
                    self.tables
                        .push((TableType::from_wasmparser(table.ty)?, init));
                }
            }
            Payload::MemorySection(reader) => {
                for memory in reader {
                    self.memories.push(MemoryType::from_wasmparser(memory?)?);
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global?;
                    self.globals.push((
                        GlobalType::from_wasmparser(global.ty)?,
                        decode_const(&global.init_expr)?,
                    ));
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    let kind = match export.kind {
                        ExternalKind::Func => ExportKind::Function,
                        ExternalKind::Table => ExportKind::Table,
                        ExternalKind::Memory => ExportKind::Memory,
                        ExternalKind::Global => ExportKind::Global,
                        other => {
                            return Err(IrError::unsupported(format!("export of {other:?}")));
                        }
                    };
                    self.exports
                        .push((export.name.to_string(), kind, export.index));
                }
            }
            Payload::StartSection { func, .. } => {
                self.start = Some(func);
            }
            Payload::ElementSection(reader) => {
                for element in reader {
                    let element = element?;
                    let kind = match element.kind {
                        wasmparser::ElementKind::Passive => RawElementKind::Passive,
                        wasmparser::ElementKind::Declared => RawElementKind::Declared,
                        wasmparser::ElementKind::Active {
                            table_index,
                            offset_expr,
                        } => RawElementKind::Active {
                            table: table_index.unwrap_or(0),
                            offset: decode_const(&offset_expr)?,
                        },
                    };
                    let items = match element.items {
                        wasmparser::ElementItems::Functions(reader) => RawElementItems::Functions(
                            reader.into_iter().collect::<Result<Vec<_>, _>>()?,
                        ),
                        wasmparser::ElementItems::Expressions(ref_type, reader) => {
                            let exprs = reader
                                .into_iter()
                                .map(|expr| decode_const(&expr?))
                                .collect::<IrResult<Vec<_>>>()?;
                            RawElementItems::Expressions(ValType::from_ref_type(ref_type)?, exprs)
                        }
                    };
                    self.elements.push((kind, items));
                }
            }
            Payload::DataCountSection { .. } => {
                self.data_count = true;
            }
            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data?;
                    let kind = match data.kind {
                        wasmparser::DataKind::Passive => RawDataKind::Passive,
                        wasmparser::DataKind::Active {
                            memory_index,
                            offset_expr,
                        } => RawDataKind::Active {
                            memory: memory_index,
                            offset: decode_const(&offset_expr)?,
                        },
                    };
                    self.data.push((kind, data.data.to_vec()));
                }
            }
            Payload::CodeSectionEntry(body) => {
                self.bodies.push(bytes[body.range()].to_vec());
            }
            Payload::CustomSection(reader) => {
                if reader.name() == "name" {
                    if let KnownCustom::Name(names) = reader.as_known() {
                        // A broken name section only costs us readable names.
                        if let Err(error) = self.read_names(names) {
                            warn!("ignoring malformed name section: {error}");
                        }
                    }
                } else {
                    self.customs.push(CustomSection {
                        name: reader.name().to_string(),
                        data: reader.data().to_vec(),
                    });
                }
            }
            Payload::TagSection(_) => {
                return Err(IrError::unsupported("exception tags"));
            }
            Payload::UnknownSection { id, .. } => {
                return Err(IrError::unsupported(format!("unknown section {id}")));
            }
            _ => {}
        }
        Ok(())
    }

    fn read_names(&mut self, reader: NameSectionReader<'_>) -> IrResult<()> {
        for subsection in reader {
            let into = match subsection? {
                wasmparser::Name::Module { name, .. } => {
                    self.names.module = Some(name.to_string());
                    continue;
                }
                wasmparser::Name::Local(indirect) => {
                    for function in indirect {
                        let function = function?;
                        let locals = self.names.locals.entry(function.index).or_default();
                        for naming in function.names {
                            let naming = naming?;
                            locals.insert(naming.index, naming.name.to_string());
                        }
                    }
                    continue;
                }
                wasmparser::Name::Function(map) => (map, &mut self.names.functions),
                wasmparser::Name::Global(map) => (map, &mut self.names.globals),
                wasmparser::Name::Memory(map) => (map, &mut self.names.memories),
                wasmparser::Name::Table(map) => (map, &mut self.names.tables),
                _ => continue,
            };
            let (map, names) = into;
            for naming in map {
                let naming = naming?;
                names.insert(naming.index, naming.name.to_string());
            }
        }
        Ok(())
    }

    fn finish(self) -> IrResult<Module> {
        if self.func_types.len() != self.bodies.len() {
            return Err(IrError::invalid_module(format!(
                "{} function declarations but {} bodies",
                self.func_types.len(),
                self.bodies.len()
            )));
        }

        let count = |pick: fn(&RawImportKind) -> bool| {
            self.imports.iter().filter(|import| pick(&import.kind)).count()
        };
        let function_names = assign_names(
            count(|kind| matches!(kind, RawImportKind::Function(_))) + self.func_types.len(),
            &self.names.functions,
        );
        let global_names = assign_names(
            count(|kind| matches!(kind, RawImportKind::Global(_))) + self.globals.len(),
            &self.names.globals,
        );
        let memory_names = assign_names(
            count(|kind| matches!(kind, RawImportKind::Memory(_))) + self.memories.len(),
            &self.names.memories,
        );
        let table_names = assign_names(
            count(|kind| matches!(kind, RawImportKind::Table(_))) + self.tables.len(),
            &self.names.tables,
        );
        let resolver = Resolver {
            functions: &function_names,
            globals: &global_names,
        };

        let mut module = Module::new();
        for ty in self.types {
            module.push_type(ty);
        }

        let (mut functions, mut globals, mut memories, mut tables) =
            (0usize, 0usize, 0usize, 0usize);
        for import in self.imports {
            let (name, kind) = match import.kind {
                RawImportKind::Function(type_index) => {
                    functions += 1;
                    (
                        function_names[functions - 1],
                        ImportKind::Function { type_index },
                    )
                }
                RawImportKind::Global(ty) => {
                    globals += 1;
                    (global_names[globals - 1], ImportKind::Global(ty))
                }
                RawImportKind::Memory(ty) => {
                    memories += 1;
                    (memory_names[memories - 1], ImportKind::Memory(ty))
                }
                RawImportKind::Table(ty) => {
                    tables += 1;
                    (table_names[tables - 1], ImportKind::Table(ty))
                }
            };
            module.add_import(Import {
                module: import.module,
                field: import.field,
                name,
                kind,
            })?;
        }

        let mut local_names = self.names.locals;
        for (offset, (type_index, body)) in self.func_types.into_iter().zip(self.bodies).enumerate()
        {
            let index = functions + offset;
            let mut function = Function::new(function_names[index], type_index, body);
            if let Some(locals) = local_names.remove(&(index as u32)) {
                function.local_names = locals;
            }
            module.add_function(function)?;
        }
        for (offset, (ty, init)) in self.tables.into_iter().enumerate() {
            module.tables.push(Table {
                name: table_names[tables + offset],
                ty,
                init: init.map(|init| resolver.constant(init)).transpose()?,
            });
        }
        for (offset, ty) in self.memories.into_iter().enumerate() {
            module.memories.push(Memory {
                name: memory_names[memories + offset],
                ty,
            });
        }
        for (offset, (ty, init)) in self.globals.into_iter().enumerate() {
            module.globals.push(Global {
                name: global_names[globals + offset],
                ty,
                init: resolver.constant(init)?,
            });
        }

        for (name, kind, index) in self.exports {
            let names = match kind {
                ExportKind::Function => &function_names,
                ExportKind::Global => &global_names,
                ExportKind::Memory => &memory_names,
                ExportKind::Table => &table_names,
            };
            let value = lookup(names, index, kind.as_str())?;
            module.add_export(Export {
                name: Name::from_dynamic(&name),
                value,
                kind,
            })?;
        }

        module.start = self
            .start
            .map(|index| resolver.function(index))
            .transpose()?;

        for (kind, items) in self.elements {
            let kind = match kind {
                RawElementKind::Active { table, offset } => ElementKind::Active {
                    table,
                    offset: resolver.constant(offset)?,
                },
                RawElementKind::Passive => ElementKind::Passive,
                RawElementKind::Declared => ElementKind::Declared,
            };
            let items = match items {
                RawElementItems::Functions(indices) => ElementItems::Functions(
                    indices
                        .into_iter()
                        .map(|index| resolver.function(index))
                        .collect::<IrResult<Vec<_>>>()?,
                ),
                RawElementItems::Expressions(ty, exprs) => ElementItems::Expressions(
                    ty,
                    exprs
                        .into_iter()
                        .map(|expr| resolver.constant(expr))
                        .collect::<IrResult<Vec<_>>>()?,
                ),
            };
            module.elements.push(ElementSegment { kind, items });
        }

        for (kind, bytes) in self.data {
            let kind = match kind {
                RawDataKind::Active { memory, offset } => DataKind::Active {
                    memory,
                    offset: resolver.constant(offset)?,
                },
                RawDataKind::Passive => DataKind::Passive,
            };
            module.data.push(DataSegment { kind, bytes });
        }
        module.data_count = self.data_count;
        module.customs = self.customs;
        module.module_name = self.names.module;

        debug!(
            "decoded module: {} imports, {} functions, {} exports",
            module.imports().len(),
            module.functions().len(),
            module.exports().len()
        );
        Ok(module)
    }
}

struct Resolver<'a> {
    functions: &'a [Name],
    globals: &'a [Name],
}

impl Resolver<'_> {
    fn function(&self, index: u32) -> IrResult<Name> {
        lookup(self.functions, index, "function")
    }

    fn constant(&self, raw: RawConst) -> IrResult<ConstExpr> {
        Ok(match raw {
            RawConst::I32(value) => ConstExpr::I32(value),
            RawConst::I64(value) => ConstExpr::I64(value),
            RawConst::F32(bits) => ConstExpr::F32(bits),
            RawConst::F64(bits) => ConstExpr::F64(bits),
            RawConst::GlobalGet(index) => ConstExpr::GlobalGet(lookup(self.globals, index, "global")?),
            RawConst::RefNull(ty) => ConstExpr::RefNull(ty),
            RawConst::RefFunc(index) => ConstExpr::RefFunc(self.function(index)?),
        })
    }
}

fn lookup(names: &[Name], index: u32, kind: &str) -> IrResult<Name> {
    names
        .get(index as usize)
        .copied()
        .ok_or_else(|| IrError::invalid_module(format!("{kind} index {index} out of bounds")))
}

/// Give each of `count` entities a name: the one from the name section if
/// present, otherwise its index. Collisions get the index appended.
fn assign_names(count: usize, explicit: &HashMap<u32, String>) -> Vec<Name> {
    let mut taken = HashSet::new();
    (0..count as u32)
        .map(|index| {
            let base = match explicit.get(&index) {
                Some(text) => Name::from_dynamic(text),
                None => Name::from_index(index),
            };
            let mut name = base;
            let mut attempt = 0;
            while !taken.insert(name) {
                name = Name::from_dynamic(&format!("{base}.{index}.{attempt}"));
                attempt += 1;
            }
            name
        })
        .collect()
}

fn decode_const(expr: &wasmparser::ConstExpr<'_>) -> IrResult<RawConst> {
    let mut reader = expr.get_operators_reader();
    let value = match reader.read()? {
        Operator::I32Const { value } => RawConst::I32(value),
        Operator::I64Const { value } => RawConst::I64(value),
        Operator::F32Const { value } => RawConst::F32(value.bits()),
        Operator::F64Const { value } => RawConst::F64(value.bits()),
        Operator::GlobalGet { global_index } => RawConst::GlobalGet(global_index),
        Operator::RefNull { hty } => RawConst::RefNull(heap_type_to_val_type(hty)?),
        Operator::RefFunc { function_index } => RawConst::RefFunc(function_index),
        other => {
            return Err(IrError::unsupported(format!(
                "constant expression starting with {other:?}"
            )));
        }
    };
    match reader.read()? {
        Operator::End => Ok(value),
        _ => Err(IrError::unsupported("extended constant expressions")),
    }
}

fn heap_type_to_val_type(hty: HeapType) -> IrResult<ValType> {
    match hty {
        HeapType::Abstract {
            shared: false,
            ty: AbstractHeapType::Func,
        } => Ok(ValType::FuncRef),
        HeapType::Abstract {
            shared: false,
            ty: AbstractHeapType::Extern,
        } => Ok(ValType::ExternRef),
        other => Err(IrError::unsupported(format!("heap type {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_names_prefers_name_section() {
        let explicit = HashMap::from([(1, "main".to_string())]);
        let names = assign_names(3, &explicit);
        assert_eq!(names, vec![Name::new("0"), Name::new("main"), Name::new("2")]);
    }

    #[test]
    fn test_assign_names_resolves_collisions() {
        let explicit = HashMap::from([(0, "dup".to_string()), (1, "dup".to_string())]);
        let names = assign_names(2, &explicit);
        assert_eq!(names[0], Name::new("dup"));
        assert_ne!(names[1], names[0]);
    }

    #[test]
    fn test_assign_names_index_collision() {
        // Function 0 is named "1", so unnamed function 1 cannot use its index.
        let explicit = HashMap::from([(0, "1".to_string())]);
        let names = assign_names(2, &explicit);
        assert_eq!(names[0], Name::new("1"));
        assert_ne!(names[1], Name::new("1"));
    }

    #[test]
    fn test_rejects_truncated_input() {
        assert!(parse_binary(b"\0asm\x01\0\0\0\x01").is_err());
    }

    #[test]
    fn test_rejects_non_wasm_input() {
        assert!(parse_binary(b"not a module").is_err());
    }
}
