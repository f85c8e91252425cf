//! The in-memory module.
//!
//! A [`Module`] owns every entity of one compiled unit. Functions, globals,
//! memories and tables are identified by [`Name`]; exports, element segments
//! and constant expressions refer to them by name. Function bodies stay in
//! their encoded form: they refer to other entities by index, which is why
//! the module only ever appends entities and never reorders or removes them.

use std::collections::{BTreeMap, HashMap};

use crate::types::{FuncType, GlobalType, MemoryType, TableType, ValType};
use crate::{IrError, IrErrorKind, IrResult, Name};

/// A defined (non-imported) function.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: Name,
    pub type_index: u32,
    /// Encoded body: local declarations followed by the expression,
    /// without the leading size.
    pub body: Vec<u8>,
    /// Debug names of parameters and locals, by local index.
    pub local_names: BTreeMap<u32, String>,
}

impl Function {
    pub fn new(name: Name, type_index: u32, body: Vec<u8>) -> Self {
        Function {
            name,
            type_index,
            body,
            local_names: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ImportKind {
    Function { type_index: u32 },
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub module: String,
    pub field: String,
    /// Internal name of the imported entity.
    pub name: Name,
    pub kind: ImportKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub name: Name,
    pub ty: TableType,
    pub init: Option<ConstExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Memory {
    pub name: Name,
    pub ty: MemoryType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub name: Name,
    pub ty: GlobalType,
    pub init: ConstExpr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Function,
    Table,
    Memory,
    Global,
}

impl ExportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportKind::Function => "function",
            ExportKind::Table => "table",
            ExportKind::Memory => "memory",
            ExportKind::Global => "global",
        }
    }
}

/// An export record. `name` is unique within a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Export {
    pub name: Name,
    pub value: Name,
    pub kind: ExportKind,
}

impl Export {
    /// Export a function under its own name.
    pub fn function(name: Name) -> Self {
        Export {
            name,
            value: name,
            kind: ExportKind::Function,
        }
    }
}

/// Constant expressions as they appear in initializers and segment offsets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    /// Raw IEEE 754 bits.
    F32(u32),
    /// Raw IEEE 754 bits.
    F64(u64),
    GlobalGet(Name),
    RefNull(ValType),
    RefFunc(Name),
}

impl ConstExpr {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ConstExpr::I32(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    Active { table: u32, offset: ConstExpr },
    Passive,
    Declared,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementItems {
    Functions(Vec<Name>),
    Expressions(ValType, Vec<ConstExpr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementSegment {
    pub kind: ElementKind,
    pub items: ElementItems,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DataKind {
    Active { memory: u32, offset: ConstExpr },
    Passive,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataSegment {
    pub kind: DataKind,
    pub bytes: Vec<u8>,
}

/// A custom section carried through unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FunctionSlot {
    Imported(usize),
    Defined(usize),
}

#[derive(Clone, Debug, Default)]
pub struct Module {
    types: Vec<FuncType>,
    imports: Vec<Import>,
    functions: Vec<Function>,
    function_slots: HashMap<Name, FunctionSlot>,
    pub tables: Vec<Table>,
    pub memories: Vec<Memory>,
    pub globals: Vec<Global>,
    exports: Vec<Export>,
    export_slots: HashMap<Name, usize>,
    pub start: Option<Name>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    /// Whether a data count section is emitted.
    pub data_count: bool,
    pub customs: Vec<CustomSection>,
    /// The module's own debug name.
    pub module_name: Option<String>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    pub fn types(&self) -> &[FuncType] {
        &self.types
    }

    pub fn func_type(&self, index: u32) -> Option<&FuncType> {
        self.types.get(index as usize)
    }

    /// Append a type unconditionally; decoders use this to keep indices.
    pub fn push_type(&mut self, ty: FuncType) -> u32 {
        self.types.push(ty);
        (self.types.len() - 1) as u32
    }

    /// Index of an existing identical type, or of a newly appended one.
    pub fn intern_type(&mut self, ty: FuncType) -> u32 {
        match self.types.iter().position(|existing| *existing == ty) {
            Some(index) => index as u32,
            None => self.push_type(ty),
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    /// Add an import.
    ///
    /// Imports come first in their index space, so importing an entity
    /// after a definition of the same kind exists would renumber encoded
    /// bodies. That is rejected.
    pub fn add_import(&mut self, import: Import) -> IrResult<()> {
        let shifts_definitions = match &import.kind {
            ImportKind::Function { type_index } => {
                if self.func_type(*type_index).is_none() {
                    return Err(IrError::invalid_module(format!(
                        "import {}.{} uses unknown type {type_index}",
                        import.module, import.field
                    )));
                }
                if self.function_slots.contains_key(&import.name) {
                    return Err(IrErrorKind::DuplicateName {
                        kind: "function",
                        name: import.name.to_string(),
                    }
                    .into());
                }
                !self.functions.is_empty()
            }
            ImportKind::Table(_) => !self.tables.is_empty(),
            ImportKind::Memory(_) => !self.memories.is_empty(),
            ImportKind::Global(_) => !self.globals.is_empty(),
        };
        if shifts_definitions {
            return Err(IrError::invalid_module(format!(
                "import {}.{} would follow a definition of the same kind",
                import.module, import.field
            )));
        }
        if let ImportKind::Function { .. } = import.kind {
            self.function_slots
                .insert(import.name, FunctionSlot::Imported(self.imports.len()));
        }
        self.imports.push(import);
        Ok(())
    }

    /// Change the field name an import is resolved by.
    pub fn set_import_field(&mut self, index: usize, field: String) -> IrResult<()> {
        let import = self.imports.get_mut(index).ok_or_else(|| {
            IrError::from(IrErrorKind::UnknownName {
                kind: "import",
                name: index.to_string(),
            })
        })?;
        import.field = field;
        Ok(())
    }

    fn imported(&self, pick: fn(&ImportKind) -> bool) -> impl Iterator<Item = &Import> {
        self.imports.iter().filter(move |import| pick(&import.kind))
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Defined functions, in index order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Look up a defined function by name.
    pub fn function(&self, name: Name) -> Option<&Function> {
        match self.function_slots.get(&name)? {
            FunctionSlot::Defined(slot) => self.functions.get(*slot),
            FunctionSlot::Imported(_) => None,
        }
    }

    /// Whether `name` names an imported or defined function.
    pub fn has_function(&self, name: Name) -> bool {
        self.function_slots.contains_key(&name)
    }

    pub fn imported_function_count(&self) -> u32 {
        self.imported(|kind| matches!(kind, ImportKind::Function { .. }))
            .count() as u32
    }

    /// Append a defined function and return its function index.
    pub fn add_function(&mut self, function: Function) -> IrResult<u32> {
        if self.function_slots.contains_key(&function.name) {
            return Err(IrErrorKind::DuplicateName {
                kind: "function",
                name: function.name.to_string(),
            }
            .into());
        }
        if self.func_type(function.type_index).is_none() {
            return Err(IrError::invalid_module(format!(
                "function {} uses unknown type {}",
                function.name, function.type_index
            )));
        }
        let slot = self.functions.len();
        self.function_slots
            .insert(function.name, FunctionSlot::Defined(slot));
        self.functions.push(function);
        Ok(self.imported_function_count() + slot as u32)
    }

    /// Replace the body of a defined function.
    pub fn set_function_body(&mut self, name: Name, body: Vec<u8>) -> IrResult<()> {
        match self.function_slots.get(&name) {
            Some(FunctionSlot::Defined(slot)) => {
                self.functions[*slot].body = body;
                Ok(())
            }
            _ => Err(IrErrorKind::UnknownName {
                kind: "function",
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Position of a function in the function index space.
    pub fn function_index(&self, name: Name) -> Option<u32> {
        match self.function_slots.get(&name)? {
            FunctionSlot::Imported(import_slot) => Some(
                self.imports[..*import_slot]
                    .iter()
                    .filter(|import| matches!(import.kind, ImportKind::Function { .. }))
                    .count() as u32,
            ),
            FunctionSlot::Defined(slot) => Some(self.imported_function_count() + *slot as u32),
        }
    }

    /// Type index of an imported or defined function.
    pub fn function_type_index(&self, name: Name) -> Option<u32> {
        match self.function_slots.get(&name)? {
            FunctionSlot::Imported(import_slot) => match self.imports[*import_slot].kind {
                ImportKind::Function { type_index } => Some(type_index),
                _ => None,
            },
            FunctionSlot::Defined(slot) => Some(self.functions[*slot].type_index),
        }
    }

    pub fn function_type(&self, name: Name) -> Option<&FuncType> {
        self.func_type(self.function_type_index(name)?)
    }

    /// Names of all functions in index order, imports first.
    pub fn function_names(&self) -> Vec<Name> {
        self.imported(|kind| matches!(kind, ImportKind::Function { .. }))
            .map(|import| import.name)
            .chain(self.functions.iter().map(|function| function.name))
            .collect()
    }

    // ------------------------------------------------------------------
    // Globals, memories, tables
    // ------------------------------------------------------------------

    /// Names of all globals in index order, imports first.
    pub fn global_names(&self) -> Vec<Name> {
        self.imported(|kind| matches!(kind, ImportKind::Global(_)))
            .map(|import| import.name)
            .chain(self.globals.iter().map(|global| global.name))
            .collect()
    }

    pub fn global_index(&self, name: Name) -> Option<u32> {
        self.global_names()
            .iter()
            .position(|global| *global == name)
            .map(|index| index as u32)
    }

    pub fn global_type(&self, name: Name) -> Option<GlobalType> {
        self.imports
            .iter()
            .find_map(|import| match import.kind {
                ImportKind::Global(ty) if import.name == name => Some(ty),
                _ => None,
            })
            .or_else(|| {
                self.globals
                    .iter()
                    .find(|global| global.name == name)
                    .map(|global| global.ty)
            })
    }

    /// Names of all memories in index order, imports first.
    pub fn memory_names(&self) -> Vec<Name> {
        self.imported(|kind| matches!(kind, ImportKind::Memory(_)))
            .map(|import| import.name)
            .chain(self.memories.iter().map(|memory| memory.name))
            .collect()
    }

    pub fn memory_type(&self, index: u32) -> Option<MemoryType> {
        self.imported(|kind| matches!(kind, ImportKind::Memory(_)))
            .filter_map(|import| match import.kind {
                ImportKind::Memory(ty) => Some(ty),
                _ => None,
            })
            .chain(self.memories.iter().map(|memory| memory.ty))
            .nth(index as usize)
    }

    /// Names of all tables in index order, imports first.
    pub fn table_names(&self) -> Vec<Name> {
        self.imported(|kind| matches!(kind, ImportKind::Table(_)))
            .map(|import| import.name)
            .chain(self.tables.iter().map(|table| table.name))
            .collect()
    }

    pub fn table_type(&self, index: u32) -> Option<TableType> {
        self.imported(|kind| matches!(kind, ImportKind::Table(_)))
            .filter_map(|import| match import.kind {
                ImportKind::Table(ty) => Some(ty),
                _ => None,
            })
            .chain(self.tables.iter().map(|table| table.ty))
            .nth(index as usize)
    }

    /// Index of `name` in the index space of `kind`.
    pub fn entity_index(&self, kind: ExportKind, name: Name) -> Option<u32> {
        let names = match kind {
            ExportKind::Function => return self.function_index(name),
            ExportKind::Global => return self.global_index(name),
            ExportKind::Memory => self.memory_names(),
            ExportKind::Table => self.table_names(),
        };
        names
            .iter()
            .position(|entity| *entity == name)
            .map(|index| index as u32)
    }

    // ------------------------------------------------------------------
    // Exports
    // ------------------------------------------------------------------

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    /// Look up an export by its exported name.
    pub fn get_export(&self, name: Name) -> Option<&Export> {
        self.export_slots
            .get(&name)
            .and_then(|slot| self.exports.get(*slot))
    }

    /// Exports whose target is `value`.
    pub fn exports_of(&self, kind: ExportKind, value: Name) -> impl Iterator<Item = &Export> {
        self.exports
            .iter()
            .filter(move |export| export.kind == kind && export.value == value)
    }

    pub fn is_exported(&self, kind: ExportKind, value: Name) -> bool {
        self.exports_of(kind, value).next().is_some()
    }

    /// Append an export. Exported names are unique, and the target must exist.
    pub fn add_export(&mut self, export: Export) -> IrResult<()> {
        if self.export_slots.contains_key(&export.name) {
            return Err(IrErrorKind::DuplicateExport(export.name.to_string()).into());
        }
        if self.entity_index(export.kind, export.value).is_none() {
            return Err(IrErrorKind::UnknownName {
                kind: export.kind.as_str(),
                name: export.value.to_string(),
            }
            .into());
        }
        self.export_slots.insert(export.name, self.exports.len());
        self.exports.push(export);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// Read a NUL-terminated string from the active data segments of
    /// memory 0, starting at `address`.
    ///
    /// Returns `None` when no segment with a constant offset covers the
    /// address.
    pub fn read_c_string(&self, address: u32) -> Option<String> {
        let address = address as u64;
        self.data.iter().find_map(|segment| {
            let DataKind::Active { memory: 0, offset } = &segment.kind else {
                return None;
            };
            let start = offset.as_i32()? as u32 as u64;
            let end = start + segment.bytes.len() as u64;
            if address < start || address >= end {
                return None;
            }
            let bytes = &segment.bytes[(address - start) as usize..];
            let len = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
            Some(String::from_utf8_lossy(&bytes[..len]).into_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_type() -> Module {
        let mut module = Module::new();
        module.push_type(FuncType::new([], []));
        module
    }

    fn function(name: &'static str) -> Function {
        Function::new(Name::new(name), 0, vec![0x00, 0x0b])
    }

    #[test]
    fn test_function_indices_follow_imports() {
        let mut module = module_with_type();
        module
            .add_import(Import {
                module: "env".to_string(),
                field: "callback".to_string(),
                name: Name::new("callback"),
                kind: ImportKind::Function { type_index: 0 },
            })
            .unwrap();
        let index = module.add_function(function("f1")).unwrap();
        assert_eq!(index, 1);
        assert_eq!(module.function_index(Name::new("callback")), Some(0));
        assert_eq!(module.function_index(Name::new("f1")), Some(1));
        assert!(module.function(Name::new("callback")).is_none());
        assert!(module.has_function(Name::new("callback")));
    }

    #[test]
    fn test_function_import_after_definition_is_rejected() {
        let mut module = module_with_type();
        module.add_function(function("f1")).unwrap();
        let result = module.add_import(Import {
            module: "env".to_string(),
            field: "late".to_string(),
            name: Name::new("late"),
            kind: ImportKind::Function { type_index: 0 },
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_function_is_rejected() {
        let mut module = module_with_type();
        module.add_function(function("f1")).unwrap();
        assert!(module.add_function(function("f1")).is_err());
    }

    #[test]
    fn test_export_names_are_unique() {
        let mut module = module_with_type();
        module.add_function(function("f1")).unwrap();
        module.add_function(function("f2")).unwrap();
        module.add_export(Export::function(Name::new("f1"))).unwrap();
        let clash = Export {
            name: Name::new("f1"),
            value: Name::new("f2"),
            kind: ExportKind::Function,
        };
        assert!(matches!(
            module.add_export(clash).unwrap_err().kind(),
            IrErrorKind::DuplicateExport(_)
        ));
    }

    #[test]
    fn test_export_target_must_exist() {
        let mut module = module_with_type();
        let result = module.add_export(Export::function(Name::new("missing")));
        assert!(matches!(
            result.unwrap_err().kind(),
            IrErrorKind::UnknownName { .. }
        ));
    }

    #[test]
    fn test_exports_of_matches_target() {
        let mut module = module_with_type();
        module.add_function(function("f1")).unwrap();
        module
            .add_export(Export {
                name: Name::new("renamed"),
                value: Name::new("f1"),
                kind: ExportKind::Function,
            })
            .unwrap();
        assert!(module.is_exported(ExportKind::Function, Name::new("f1")));
        assert!(module.get_export(Name::new("f1")).is_none());
    }

    #[test]
    fn test_intern_type_reuses_existing() {
        let mut module = module_with_type();
        let ty = FuncType::new([ValType::I32], [ValType::I32]);
        let first = module.intern_type(ty.clone());
        let second = module.intern_type(ty);
        assert_eq!(first, 1);
        assert_eq!(first, second);
        assert_eq!(module.intern_type(FuncType::new([], [])), 0);
    }

    #[test]
    fn test_read_c_string() {
        let mut module = Module::new();
        module.data.push(DataSegment {
            kind: DataKind::Active {
                memory: 0,
                offset: ConstExpr::I32(1024),
            },
            bytes: b"abc\0{ return 1; }\0".to_vec(),
        });
        assert_eq!(module.read_c_string(1024).as_deref(), Some("abc"));
        assert_eq!(module.read_c_string(1028).as_deref(), Some("{ return 1; }"));
        assert_eq!(module.read_c_string(16), None);
    }
}
