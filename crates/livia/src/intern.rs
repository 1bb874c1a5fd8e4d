//! Symbol and string interning.
//!
//! Symbols are interned names: expression heads, variable names, type and
//! module names. The evaluator compares heads by id, never by string, so the
//! closed set of well-known heads lives in [`StaticSyms`] and occupies a
//! fixed id range. Dynamically interned symbols start at a higher offset.
//!
//! Symbol ids are laid out as follows:
//! * 0 to count(StaticSyms) - the well-known names in StaticSyms
//! * 1000+ - symbols interned per runtime
//!
//! Strings use the same scheme minus the static range: string literals are
//! only ever needed for diagnostics and `error` payloads, so they are all
//! interned per runtime.

use std::str::FromStr;

use ahash::AHashMap;
use strum::{EnumString, FromRepr, IntoStaticStr};

/// Index into the symbol interner.
///
/// Uses `u32` to keep `Value` small. Ids below [`DYN_SYM_ID_OFFSET`] are
/// static (see [`StaticSyms`]); equality on `Symbol` is the language's
/// symbol identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    /// Returns the static well-known name for this symbol, if it has one.
    #[inline]
    pub fn as_static(self) -> Option<StaticSyms> {
        u16::try_from(self.0).ok().and_then(StaticSyms::from_repr)
    }
}

impl From<StaticSyms> for Symbol {
    fn from(s: StaticSyms) -> Self {
        Self(s as u32)
    }
}

/// Index into the string interner's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

/// Symbol ids at or above this offset are dynamically interned.
const DYN_SYM_ID_OFFSET: u32 = 1000;

/// Well-known names with fixed symbol ids.
///
/// The first block is the closed set of expression heads recognized by the
/// evaluator; the trailing block holds a few names the runtime itself needs
/// (the root module name, the placeholder slot name). The id of each variant
/// is its discriminant, so head dispatch is an integer comparison.
#[repr(u16)]
#[derive(
    Debug, Clone, Copy, FromRepr, EnumString, IntoStaticStr, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum StaticSyms {
    Call,
    Invoke,
    New,
    StaticParameter,
    Inert,
    Copyast,
    StaticTypeof,
    TheException,
    Method,
    Const,
    Global,
    AbstractType,
    BitsType,
    CompositeType,
    Module,
    Thunk,
    Error,
    Incomplete,
    Boundscheck,
    Inbounds,
    Fastmath,
    Simdloop,
    Meta,
    TypeGoto,
    Return,
    #[strum(serialize = "=")]
    Assign,
    GotoIfnot,
    Line,
    Enter,
    Leave,

    // Not heads: names the runtime uses internally.
    Block,
    #[strum(serialize = "Main")]
    Main,
    #[strum(serialize = "_")]
    Underscore,
}

/// Symbol and string storage for a runtime.
///
/// Populated lazily as the IR builder and diagnostics intern names. Lookups
/// during evaluation are only needed for error messages.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Interns {
    symbols: Vec<String>,
    symbol_ids: AHashMap<String, Symbol>,
    strings: Vec<String>,
    string_ids: AHashMap<String, StringId>,
}

impl Interns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a symbol name, returning its id.
    ///
    /// Well-known names resolve to their static id, so `symbol("call")`
    /// always equals `Symbol::from(StaticSyms::Call)`.
    pub fn symbol(&mut self, name: &str) -> Symbol {
        if let Ok(s) = StaticSyms::from_str(name) {
            return Symbol::from(s);
        }
        if let Some(&id) = self.symbol_ids.get(name) {
            return id;
        }
        let id = Symbol(DYN_SYM_ID_OFFSET + u32::try_from(self.symbols.len()).expect("symbol table overflow"));
        self.symbols.push(name.to_owned());
        self.symbol_ids.insert(name.to_owned(), id);
        id
    }

    /// Returns the name of a symbol.
    ///
    /// # Panics
    /// Panics if the id was not produced by this interner.
    pub fn symbol_name(&self, sym: Symbol) -> &str {
        if let Some(s) = sym.as_static() {
            return s.into();
        }
        let idx = (sym.0 - DYN_SYM_ID_OFFSET) as usize;
        self.symbols.get(idx).map(String::as_str).expect("unknown symbol id")
    }

    /// Interns a string, returning its id.
    pub fn string(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.string_ids.get(s) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).expect("string table overflow"));
        self.strings.push(s.to_owned());
        self.string_ids.insert(s.to_owned(), id);
        id
    }

    /// Returns the content of an interned string.
    ///
    /// # Panics
    /// Panics if the id was not produced by this interner.
    pub fn get_string(&self, id: StringId) -> &str {
        self.strings.get(id.0 as usize).map(String::as_str).expect("unknown string id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_heads_resolve_to_fixed_ids() {
        let mut interns = Interns::new();
        assert_eq!(interns.symbol("call"), Symbol::from(StaticSyms::Call));
        assert_eq!(interns.symbol("="), Symbol::from(StaticSyms::Assign));
        assert_eq!(interns.symbol("goto_ifnot"), Symbol::from(StaticSyms::GotoIfnot));
        assert_eq!(interns.symbol_name(Symbol::from(StaticSyms::CompositeType)), "composite_type");
    }

    #[test]
    fn dynamic_symbols_intern_once() {
        let mut interns = Interns::new();
        let a = interns.symbol("Point");
        let b = interns.symbol("Point");
        assert_eq!(a, b);
        assert_ne!(a, interns.symbol("point"));
        assert_eq!(interns.symbol_name(a), "Point");
    }

    #[test]
    fn strings_round_trip() {
        let mut interns = Interns::new();
        let id = interns.string("unexpected token");
        assert_eq!(interns.get_string(id), "unexpected token");
        assert_eq!(interns.string("unexpected token"), id);
    }
}
