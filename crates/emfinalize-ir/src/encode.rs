//! Module encoding to the WebAssembly binary format.
//!
//! This module converts a [`Module`] back to bytes using the `wasm_encoder`
//! crate. Names are resolved to indices here; function bodies are copied
//! through as they are.

use std::borrow::Cow;

use tracing::debug;
use wasm_encoder::{
    CodeSection, DataCountSection, DataSection, ElementSection, Elements, EntityType,
    ExportSection, FunctionSection, GlobalSection, ImportSection, IndirectNameMap, MemorySection,
    NameMap, NameSection, StartSection, TableSection, TypeSection,
};

use crate::module::{
    ConstExpr, DataKind, ElementItems, ElementKind, ExportKind, ImportKind, Module,
};
use crate::{IrError, IrErrorKind, IrResult, Name};

/// Options controlling what the encoder emits besides the module itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Emit a `name` section: the module name, entity names and local names.
    pub debug_info: bool,
}

/// Encode a module to its binary form.
pub fn encode(module: &Module, options: WriteOptions) -> IrResult<Vec<u8>> {
    let mut output = wasm_encoder::Module::new();

    // dylink sections must precede every other section.
    for custom in module
        .customs
        .iter()
        .filter(|custom| custom.name.starts_with("dylink"))
    {
        output.section(&wasm_encoder::CustomSection {
            name: Cow::Borrowed(custom.name.as_str()),
            data: Cow::Borrowed(custom.data.as_slice()),
        });
    }

    if !module.types().is_empty() {
        let mut types = TypeSection::new();
        for ty in module.types() {
            types.ty().function(
                ty.params.iter().map(|param| param.to_encoder()),
                ty.results.iter().map(|result| result.to_encoder()),
            );
        }
        output.section(&types);
    }

    if !module.imports().is_empty() {
        let mut imports = ImportSection::new();
        for import in module.imports() {
            let entity = match &import.kind {
                ImportKind::Function { type_index } => EntityType::Function(*type_index),
                ImportKind::Table(ty) => EntityType::Table(ty.to_encoder()?),
                ImportKind::Memory(ty) => EntityType::Memory(ty.to_encoder()),
                ImportKind::Global(ty) => EntityType::Global(ty.to_encoder()),
            };
            imports.import(&import.module, &import.field, entity);
        }
        output.section(&imports);
    }

    if !module.functions().is_empty() {
        let mut functions = FunctionSection::new();
        for function in module.functions() {
            functions.function(function.type_index);
        }
        output.section(&functions);
    }

    if !module.tables.is_empty() {
        let mut tables = TableSection::new();
        for table in &module.tables {
            match &table.init {
                Some(init) => {
                    tables.table_with_init(table.ty.to_encoder()?, &encode_const(module, init)?);
                }
                None => {
                    tables.table(table.ty.to_encoder()?);
                }
            }
        }
        output.section(&tables);
    }

    if !module.memories.is_empty() {
        let mut memories = MemorySection::new();
        for memory in &module.memories {
            memories.memory(memory.ty.to_encoder());
        }
        output.section(&memories);
    }

    if !module.globals.is_empty() {
        let mut globals = GlobalSection::new();
        for global in &module.globals {
            globals.global(global.ty.to_encoder(), &encode_const(module, &global.init)?);
        }
        output.section(&globals);
    }

    if !module.exports().is_empty() {
        let mut exports = ExportSection::new();
        for export in module.exports() {
            let index = module
                .entity_index(export.kind, export.value)
                .ok_or_else(|| unknown(export.kind.as_str(), export.value))?;
            let kind = match export.kind {
                ExportKind::Function => wasm_encoder::ExportKind::Func,
                ExportKind::Table => wasm_encoder::ExportKind::Table,
                ExportKind::Memory => wasm_encoder::ExportKind::Memory,
                ExportKind::Global => wasm_encoder::ExportKind::Global,
            };
            export.name.with_str(|name| {
                exports.export(name, kind, index);
            });
        }
        output.section(&exports);
    }

    if let Some(start) = module.start {
        output.section(&StartSection {
            function_index: function_index(module, start)?,
        });
    }

    if !module.elements.is_empty() {
        let mut elements = ElementSection::new();
        for segment in &module.elements {
            let items = match &segment.items {
                ElementItems::Functions(names) => Elements::Functions(Cow::Owned(
                    names
                        .iter()
                        .map(|name| function_index(module, *name))
                        .collect::<IrResult<Vec<_>>>()?,
                )),
                ElementItems::Expressions(ty, exprs) => Elements::Expressions(
                    ty.to_encoder_ref()?,
                    Cow::Owned(
                        exprs
                            .iter()
                            .map(|expr| encode_const(module, expr))
                            .collect::<IrResult<Vec<_>>>()?,
                    ),
                ),
            };
            match &segment.kind {
                ElementKind::Active { table, offset } => {
                    // Table 0 with function indices keeps the MVP encoding.
                    let table_index = match (table, &segment.items) {
                        (0, ElementItems::Functions(_)) => None,
                        _ => Some(*table),
                    };
                    elements.active(table_index, &encode_const(module, offset)?, items);
                }
                ElementKind::Passive => {
                    elements.passive(items);
                }
                ElementKind::Declared => {
                    elements.declared(items);
                }
            }
        }
        output.section(&elements);
    }

    if module.data_count || module.data.iter().any(|d| d.kind == DataKind::Passive) {
        output.section(&DataCountSection {
            count: module.data.len() as u32,
        });
    }

    if !module.functions().is_empty() {
        let mut code = CodeSection::new();
        for function in module.functions() {
            code.raw(&function.body);
        }
        output.section(&code);
    }

    if !module.data.is_empty() {
        let mut data = DataSection::new();
        for segment in &module.data {
            match &segment.kind {
                DataKind::Active { memory, offset } => {
                    data.active(
                        *memory,
                        &encode_const(module, offset)?,
                        segment.bytes.iter().copied(),
                    );
                }
                DataKind::Passive => {
                    data.passive(segment.bytes.iter().copied());
                }
            }
        }
        output.section(&data);
    }

    if options.debug_info {
        output.section(&name_section(module));
    }

    for custom in module
        .customs
        .iter()
        .filter(|custom| !custom.name.starts_with("dylink"))
    {
        output.section(&wasm_encoder::CustomSection {
            name: Cow::Borrowed(custom.name.as_str()),
            data: Cow::Borrowed(custom.data.as_slice()),
        });
    }

    let bytes = output.finish();
    debug!("encoded module: {} bytes", bytes.len());
    Ok(bytes)
}

fn name_section(module: &Module) -> NameSection {
    let mut section = NameSection::new();
    if let Some(name) = &module.module_name {
        section.module(name);
    }
    let functions = name_map(&module.function_names());
    section.functions(&functions);
    if let Some(locals) = local_name_map(module) {
        section.locals(&locals);
    }
    let tables = name_map(&module.table_names());
    section.tables(&tables);
    let memories = name_map(&module.memory_names());
    section.memories(&memories);
    let globals = name_map(&module.global_names());
    section.globals(&globals);
    section
}

fn name_map(names: &[Name]) -> NameMap {
    let mut map = NameMap::new();
    for (index, name) in names.iter().enumerate() {
        name.with_str(|text| map.append(index as u32, text));
    }
    map
}

fn local_name_map(module: &Module) -> Option<IndirectNameMap> {
    let base = module.imported_function_count();
    let mut indirect = IndirectNameMap::new();
    let mut any = false;
    for (offset, function) in module.functions().iter().enumerate() {
        if function.local_names.is_empty() {
            continue;
        }
        let mut locals = NameMap::new();
        for (index, name) in &function.local_names {
            locals.append(*index, name);
        }
        indirect.append(base + offset as u32, &locals);
        any = true;
    }
    any.then_some(indirect)
}

fn function_index(module: &Module, name: Name) -> IrResult<u32> {
    module
        .function_index(name)
        .ok_or_else(|| unknown("function", name))
}

fn unknown(kind: &'static str, name: Name) -> IrError {
    IrErrorKind::UnknownName {
        kind,
        name: name.to_string(),
    }
    .into()
}

fn encode_const(module: &Module, expr: &ConstExpr) -> IrResult<wasm_encoder::ConstExpr> {
    Ok(match *expr {
        ConstExpr::I32(value) => wasm_encoder::ConstExpr::i32_const(value),
        ConstExpr::I64(value) => wasm_encoder::ConstExpr::i64_const(value),
        ConstExpr::F32(bits) => {
            wasm_encoder::ConstExpr::raw([0x43].into_iter().chain(bits.to_le_bytes()))
        }
        ConstExpr::F64(bits) => {
            wasm_encoder::ConstExpr::raw([0x44].into_iter().chain(bits.to_le_bytes()))
        }
        ConstExpr::GlobalGet(name) => wasm_encoder::ConstExpr::global_get(
            module
                .global_index(name)
                .ok_or_else(|| unknown("global", name))?,
        ),
        ConstExpr::RefNull(ty) => wasm_encoder::ConstExpr::ref_null(ty.to_encoder_ref()?.heap_type),
        ConstExpr::RefFunc(name) => {
            wasm_encoder::ConstExpr::ref_func(function_index(module, name)?)
        }
    })
}
