//! Emscripten signature strings.
//!
//! A signature is one letter for the result (`v` when there is none)
//! followed by one letter per parameter: `i` for i32, `j` for i64, `f` for
//! f32 and `d` for f64.

use emfinalize_ir::{FuncType, ValType};

pub trait EmscriptenSignature {
    /// The signature string, or `None` when some type has no letter.
    fn emscripten_signature(&self) -> Option<String>;
}

fn letter(ty: ValType) -> Option<char> {
    match ty {
        ValType::I32 => Some('i'),
        ValType::I64 => Some('j'),
        ValType::F32 => Some('f'),
        ValType::F64 => Some('d'),
        ValType::V128 | ValType::FuncRef | ValType::ExternRef => None,
    }
}

impl EmscriptenSignature for FuncType {
    fn emscripten_signature(&self) -> Option<String> {
        let mut sig = String::with_capacity(self.params.len() + 1);
        match self.results.as_slice() {
            [] => sig.push('v'),
            [result] => sig.push(letter(*result)?),
            _ => return None,
        }
        for param in &self.params {
            sig.push(letter(*param)?);
        }
        Some(sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_result() {
        let ty = FuncType::new([ValType::I32, ValType::F64], []);
        assert_eq!(ty.emscripten_signature().as_deref(), Some("vid"));
    }

    #[test]
    fn test_with_result() {
        let ty = FuncType::new([ValType::I64, ValType::F32], [ValType::I32]);
        assert_eq!(ty.emscripten_signature().as_deref(), Some("ijf"));
    }

    #[test]
    fn test_multi_value_has_no_signature() {
        let ty = FuncType::new([], [ValType::I32, ValType::I32]);
        assert_eq!(ty.emscripten_signature(), None);
    }

    #[test]
    fn test_reference_types_have_no_signature() {
        let ty = FuncType::new([ValType::ExternRef], []);
        assert_eq!(ty.emscripten_signature(), None);
    }
}
