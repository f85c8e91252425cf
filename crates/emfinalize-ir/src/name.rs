//! Interned symbolic names.
//!
//! Every function, global, memory and table in a [`Module`](crate::Module) is
//! identified by a [`Name`], never by its position in an index space. Exports
//! and element segments refer to their targets by name as well, so passes can
//! add entities without renumbering anything.

use std::borrow::Cow;
use std::sync::LazyLock;

use lasso::{Rodeo, Spur};
use parking_lot::RwLock;

/// Process-wide table of every name text seen so far.
static NAMES: LazyLock<RwLock<Rodeo>> = LazyLock::new(|| RwLock::new(Rodeo::default()));

/// Interned name for an entity of a module.
///
/// A `Name` is a 4-byte key into the process-wide table. Two names are equal
/// exactly when their text is.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name(Spur);

impl Name {
    /// Name with static text; the table borrows the text instead of copying it.
    pub fn new(text: &'static str) -> Self {
        Self::lookup_or_insert(text, |table| table.get_or_intern_static(text))
    }

    /// Name with text only known at runtime, such as a decoded name section.
    pub fn from_dynamic(text: &str) -> Self {
        Self::lookup_or_insert(text, |table| table.get_or_intern(text))
    }

    /// The fallback name of an unnamed entity: its decimal index.
    pub fn from_index(index: u32) -> Self {
        Self::from_dynamic(&index.to_string())
    }

    /// Most names are already present, so only a miss takes the write lock.
    fn lookup_or_insert(text: &str, insert: impl FnOnce(&mut Rodeo) -> Spur) -> Self {
        let mut table = NAMES.upgradable_read();
        match table.get(text) {
            Some(key) => Name(key),
            None => Name(table.with_upgraded(insert)),
        }
    }

    /// Run `f` on the name's text while the table is read-locked.
    ///
    /// The lock is taken recursively, so `f` may format or compare other
    /// names.
    pub fn with_str<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let table = NAMES.read_recursive();
        f(table.resolve(&self.0))
    }
}

impl From<&'static str> for Name {
    fn from(text: &'static str) -> Self {
        Name::new(text)
    }
}

impl From<Cow<'_, str>> for Name {
    fn from(text: Cow<'_, str>) -> Self {
        Name::from_dynamic(&text)
    }
}

impl From<String> for Name {
    fn from(text: String) -> Self {
        Name::from_dynamic(&text)
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.with_str(|s| s == other)
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.with_str(|s| s == *other)
    }
}

impl PartialEq<Name> for &str {
    fn eq(&self, other: &Name) -> bool {
        other.with_str(|s| s == *self)
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_str(|s| f.write_str(s))
    }
}

// Debug shows the text rather than the interner key.
impl std::fmt::Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_str(|s| write!(f, "{s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_equality_is_by_text() {
        let a = Name::new("stackSave");
        let b = Name::from_dynamic(&String::from("stackSave"));
        assert_eq!(a, b);
        assert_ne!(a, Name::new("stackRestore"));
    }

    #[test]
    fn test_name_compares_with_str() {
        let name = Name::new("dynCall_vi");
        assert!(name == "dynCall_vi");
        assert!("dynCall_vi" == name);
        assert!(name != "dynCall_v");
    }

    #[test]
    fn test_name_from_index() {
        assert_eq!(Name::from_index(42), Name::new("42"));
    }

    #[test]
    fn test_name_debug_shows_text() {
        assert_eq!(format!("{:?}", Name::new("main")), "\"main\"");
        assert_eq!(Name::new("main").to_string(), "main");
    }
}
