//! Value, function and entity types.
//!
//! Only the type system of the MVP plus `v128`, `funcref` and `externref` is
//! modeled. Anything richer (GC types, typed function references) is rejected
//! at decode time.

use crate::{IrError, IrResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

impl ValType {
    pub(crate) fn from_wasmparser(ty: wasmparser::ValType) -> IrResult<Self> {
        Ok(match ty {
            wasmparser::ValType::I32 => ValType::I32,
            wasmparser::ValType::I64 => ValType::I64,
            wasmparser::ValType::F32 => ValType::F32,
            wasmparser::ValType::F64 => ValType::F64,
            wasmparser::ValType::V128 => ValType::V128,
            wasmparser::ValType::Ref(ref_type) => ValType::from_ref_type(ref_type)?,
        })
    }

    pub(crate) fn from_ref_type(ref_type: wasmparser::RefType) -> IrResult<Self> {
        if ref_type == wasmparser::RefType::FUNCREF {
            Ok(ValType::FuncRef)
        } else if ref_type == wasmparser::RefType::EXTERNREF {
            Ok(ValType::ExternRef)
        } else {
            Err(IrError::unsupported(format!("reference type {ref_type:?}")))
        }
    }

    pub fn to_encoder(self) -> wasm_encoder::ValType {
        match self {
            ValType::I32 => wasm_encoder::ValType::I32,
            ValType::I64 => wasm_encoder::ValType::I64,
            ValType::F32 => wasm_encoder::ValType::F32,
            ValType::F64 => wasm_encoder::ValType::F64,
            ValType::V128 => wasm_encoder::ValType::V128,
            ValType::FuncRef => wasm_encoder::ValType::Ref(wasm_encoder::RefType::FUNCREF),
            ValType::ExternRef => wasm_encoder::ValType::Ref(wasm_encoder::RefType::EXTERNREF),
        }
    }

    /// The encoder reference type, for table element types.
    pub fn to_encoder_ref(self) -> IrResult<wasm_encoder::RefType> {
        match self {
            ValType::FuncRef => Ok(wasm_encoder::RefType::FUNCREF),
            ValType::ExternRef => Ok(wasm_encoder::RefType::EXTERNREF),
            other => Err(IrError::invalid_module(format!(
                "{other:?} is not a reference type"
            ))),
        }
    }
}

/// A function signature.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(
        params: impl IntoIterator<Item = ValType>,
        results: impl IntoIterator<Item = ValType>,
    ) -> Self {
        FuncType {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }

    pub(crate) fn from_wasmparser(ty: &wasmparser::FuncType) -> IrResult<Self> {
        let params = ty
            .params()
            .iter()
            .map(|ty| ValType::from_wasmparser(*ty))
            .collect::<IrResult<Vec<_>>>()?;
        let results = ty
            .results()
            .iter()
            .map(|ty| ValType::from_wasmparser(*ty))
            .collect::<IrResult<Vec<_>>>()?;
        Ok(FuncType { params, results })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalType {
    pub val_type: ValType,
    pub mutable: bool,
}

impl GlobalType {
    pub(crate) fn from_wasmparser(ty: wasmparser::GlobalType) -> IrResult<Self> {
        if ty.shared {
            return Err(IrError::unsupported("shared globals"));
        }
        Ok(GlobalType {
            val_type: ValType::from_wasmparser(ty.content_type)?,
            mutable: ty.mutable,
        })
    }

    pub fn to_encoder(self) -> wasm_encoder::GlobalType {
        wasm_encoder::GlobalType {
            val_type: self.val_type.to_encoder(),
            mutable: self.mutable,
            shared: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryType {
    pub minimum: u64,
    pub maximum: Option<u64>,
    pub memory64: bool,
    pub shared: bool,
}

impl MemoryType {
    /// Whether `memory.grow` can ever succeed on this memory.
    pub fn is_growable(&self) -> bool {
        match self.maximum {
            None => true,
            Some(maximum) => maximum > self.minimum,
        }
    }

    pub(crate) fn from_wasmparser(ty: wasmparser::MemoryType) -> IrResult<Self> {
        if ty.page_size_log2.is_some() {
            return Err(IrError::unsupported("custom memory page sizes"));
        }
        Ok(MemoryType {
            minimum: ty.initial,
            maximum: ty.maximum,
            memory64: ty.memory64,
            shared: ty.shared,
        })
    }

    pub fn to_encoder(self) -> wasm_encoder::MemoryType {
        wasm_encoder::MemoryType {
            minimum: self.minimum,
            maximum: self.maximum,
            memory64: self.memory64,
            shared: self.shared,
            page_size_log2: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableType {
    pub element_type: ValType,
    pub minimum: u64,
    pub maximum: Option<u64>,
    pub table64: bool,
}

impl TableType {
    pub(crate) fn from_wasmparser(ty: wasmparser::TableType) -> IrResult<Self> {
        if ty.shared {
            return Err(IrError::unsupported("shared tables"));
        }
        Ok(TableType {
            element_type: ValType::from_ref_type(ty.element_type)?,
            minimum: ty.initial,
            maximum: ty.maximum,
            table64: ty.table64,
        })
    }

    pub fn to_encoder(self) -> IrResult<wasm_encoder::TableType> {
        Ok(wasm_encoder::TableType {
            element_type: self.element_type.to_encoder_ref()?,
            minimum: self.minimum,
            maximum: self.maximum,
            table64: self.table64,
            shared: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_growable() {
        let mut memory = MemoryType {
            minimum: 1,
            maximum: None,
            memory64: false,
            shared: false,
        };
        assert!(memory.is_growable());
        memory.maximum = Some(1);
        assert!(!memory.is_growable());
        memory.maximum = Some(2);
        assert!(memory.is_growable());
    }
}
