use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// An interned identifier, compared by its 32-bit FNV-1a hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub u32);

impl Symbol {
    /// Binding slot with no name, used for positional parameters.
    pub const ANONYMOUS: Symbol = Symbol(0);

    pub fn id(self) -> u32 {
        self.0
    }

    pub fn is_anonymous(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym:{:08x}", self.0)
    }
}

/// 32-bit FNV-1a.
pub fn hash_name(name: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Append-only name store. Interning never removes entries; two distinct
/// names landing on the same hash indicate a broken identifier set and
/// abort the process.
#[derive(Default)]
pub struct SymbolTable {
    names: RwLock<HashMap<u32, Arc<str>>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: &str) -> Symbol {
        let id = hash_name(name);
        let mut names = self.names.write().unwrap();
        match names.get(&id) {
            Some(existing) => {
                assert_eq!(
                    existing.as_ref(),
                    name,
                    "symbol hash collision: {:?} vs {:?}",
                    existing,
                    name
                );
            }
            None => {
                names.insert(id, Arc::from(name));
            }
        }
        Symbol(id)
    }

    pub fn name(&self, sym: Symbol) -> Option<Arc<str>> {
        self.names.read().unwrap().get(&sym.0).cloned()
    }

    /// Name of the symbol if known, else its hash form.
    pub fn describe(&self, sym: Symbol) -> String {
        match self.name(sym) {
            Some(name) => name.to_string(),
            None => sym.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_append_only() {
        let table = SymbolTable::new();
        let a = table.intern("update");
        let b = table.intern("update");
        assert_eq!(a, b);
        assert_eq!(table.describe(a), "update");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn hash_matches_fnv1a_reference() {
        // FNV-1a of the empty string is the offset basis.
        assert_eq!(hash_name(""), 2166136261);
        assert_ne!(hash_name("a"), hash_name("b"));
    }
}
