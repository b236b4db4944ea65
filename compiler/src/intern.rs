// intern.rs — Identifier interning
//
// Identifiers and type names repeat heavily across a multi-file unit (every
// binding names a parameter, every reference names a call). They are stored
// once per compilation unit and referred to by `Sym`.
//
// One interner per unit: concurrent invocations on independent inputs share
// nothing and need no locking.

use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Handle to an interned string. Only meaningful with the interner that made it.
pub type Sym = DefaultSymbol;

/// The sentinel id of an unnamed parameter or output reference.
pub const DEFAULT_ID: &str = "default";

#[derive(Debug, Clone, Default)]
pub struct Interner {
    strings: DefaultStringInterner,
}

impl Interner {
    pub fn new() -> Self {
        Interner::default()
    }

    pub fn intern(&mut self, s: &str) -> Sym {
        self.strings.get_or_intern(s)
    }

    /// Look up a string without interning it.
    pub fn get(&self, s: &str) -> Option<Sym> {
        self.strings.get(s)
    }

    /// Text of `sym`. Symbols from another interner resolve to `""`.
    pub fn resolve(&self, sym: Sym) -> &str {
        self.strings.resolve(sym).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
