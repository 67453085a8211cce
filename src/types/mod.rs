//! # Type & Symbol Model (C1)
//!
//! Primitive and compound type representation, symbol kinds and storage
//! classes, and the per-module / global symbol tables used by every later
//! stage of the pipeline.
//!
//! Types are immutable, shared, and compared structurally (§3.10): `Type`
//! derives `PartialEq`/`Eq`/`Hash` and is always passed by value or `Rc`-free
//! clone, never interned, matching the teacher's `solisp::types::Type`.

use std::collections::HashMap;
use std::fmt;

/// A source location, carried by diagnostics and by every IL instruction's
/// metadata. Produced by the (out-of-scope) parser; this crate only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceLocation {
    /// Source file name.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl SourceLocation {
    /// Build a location.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// A placeholder location for synthetic instructions (merge-block phis,
    /// implicit loop increments) that have no single source site.
    pub fn synthetic() -> Self {
        Self {
            file: String::from("<synthetic>"),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// The closed set of primitive and compound types the language supports.
///
/// `bool` and `byte` convert implicitly in both directions; `byte -> word`
/// widens implicitly; `word -> byte` is a narrowing and requires an explicit
/// cast (§3.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// 8-bit unsigned integer.
    Byte,
    /// 16-bit unsigned integer.
    Word,
    /// Boolean, implicitly convertible to/from `byte`.
    Bool,
    /// The empty/unit type; only valid as a function return type.
    Void,
    /// Fixed-size array of a primitive element type.
    Array {
        /// Element type; must be primitive (§4.1).
        element: Box<Type>,
        /// Element count. `None` only while a declaration with empty
        /// brackets (`[]`) is awaiting size inference from its initializer
        /// (§4.1); every `Array` type reaching the IL builder has `Some`.
        size: Option<u32>,
    },
    /// A function signature, used for `@fn` address-of typing and call checks.
    Function {
        /// Parameter types, in declaration order.
        params: Vec<Type>,
        /// Return type.
        ret: Box<Type>,
    },
}

impl Type {
    /// `true` for `Byte`, `Word`, `Bool` — the only legal array element types.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Byte | Type::Word | Type::Bool)
    }

    /// Whether a value of `self` can be used where `target` is expected,
    /// inserting only implicit (non-narrowing) conversions.
    ///
    /// `byte <-> bool` both directions, `byte -> word` widening, and the
    /// identity conversion are allowed; `word -> byte` is not (§3.1).
    pub fn implicitly_convertible_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (Type::Byte, Type::Bool)
                | (Type::Bool, Type::Byte)
                | (Type::Byte, Type::Word)
        )
    }

    /// Whether narrowing `self` down to `target` is even representable
    /// (used to produce `NarrowingWithoutCast` rather than `TypeMismatch`
    /// when the user forgot an explicit cast).
    pub fn narrows_to(&self, target: &Type) -> bool {
        matches!((self, target), (Type::Word, Type::Byte))
    }

    /// Byte size of a primitive type. Panics on non-primitive types; callers
    /// must check `is_primitive()` (or rely on the type checker having
    /// already rejected non-primitive element types) first.
    pub fn primitive_size(&self) -> u32 {
        match self {
            Type::Byte | Type::Bool => 1,
            Type::Word => 2,
            other => panic!("primitive_size() called on non-primitive type {other}"),
        }
    }

    /// The smallest primitive type that can hold `value` without loss,
    /// per the literal-sizing rule in §3.1/§4.4/§8 (boundary behaviors 10-11).
    pub fn smallest_integer_type_for(value: i64) -> Option<Type> {
        if !(0..=0xFFFF).contains(&value) {
            return None;
        }
        if value <= 0xFF {
            Some(Type::Byte)
        } else {
            Some(Type::Word)
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Byte => write!(f, "byte"),
            Type::Word => write!(f, "word"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Array { element, size } => match size {
                Some(n) => write!(f, "{element}[{n}]"),
                None => write!(f, "{element}[]"),
            },
            Type::Function { params, ret } => {
                write!(f, "function(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "): {ret}")
            }
        }
    }
}

/// What role a symbol plays, independent of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// A mutable variable.
    Variable,
    /// A compile-time constant.
    Const,
    /// A function.
    Function,
    /// A named type (reserved for future struct/alias support).
    Type,
    /// A function parameter.
    Parameter,
    /// A memory-mapped hardware register or struct.
    MemoryMap,
}

/// Where a symbol's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Ordinary RAM, placement left to the code generator.
    Default,
    /// Explicitly requested zero-page placement.
    ZeroPage,
    /// Explicitly requested ordinary-RAM placement (as opposed to `Default`,
    /// which the code generator is free to promote to zero page).
    Ram,
    /// Read-only initialized data.
    Data,
    /// A memory-mapped hardware symbol; never allocated storage.
    Map,
}

/// The four shapes a memory-mapped declaration can take (§3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryMapping {
    /// A single address with a scalar type, e.g. `map border: byte = $D020`.
    Single {
        /// The mapped address.
        address: u16,
    },
    /// An address range treated as an array of a single element type.
    Range {
        /// Base address of the range.
        base: u16,
        /// Element type of each slot in the range.
        element: Box<Type>,
        /// Number of elements.
        count: u32,
    },
    /// A struct laid out sequentially starting at `base`, fields in
    /// declaration order with no gaps.
    SequentialStruct {
        /// Base address.
        base: u16,
        /// Field name and type, in offset order.
        fields: Vec<(String, Type)>,
    },
    /// A struct with explicit per-field offsets (sparse layout allowed).
    ExplicitStruct {
        /// Field name, type, and byte offset from an implicit base of zero
        /// (each field's address is `offset` directly; fields may overlap
        /// hardware sub-ranges by design).
        fields: Vec<(String, Type, u16)>,
    },
}

/// A resolved symbol: everything later stages need to know about a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// The symbol's name as written in source.
    pub name: String,
    /// What kind of entity this is.
    pub kind: SymbolKind,
    /// Its resolved type.
    pub ty: Type,
    /// Where its storage lives.
    pub storage: StorageClass,
    /// Present only for `StorageClass::Map` symbols.
    pub mapping: Option<MemoryMapping>,
    /// Whether the defining module exports this symbol to importers.
    pub exported: bool,
    /// The module that defines this symbol.
    pub module: String,
}

impl Symbol {
    /// Convenience constructor for ordinary (non-mapped) symbols.
    pub fn new(
        name: impl Into<String>,
        kind: SymbolKind,
        ty: Type,
        storage: StorageClass,
        module: impl Into<String>,
        exported: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            storage,
            mapping: None,
            exported,
            module: module.into(),
        }
    }
}

/// The local symbol table for a single module.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a symbol by name.
    pub fn insert(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name.clone(), symbol);
    }

    /// Look up a symbol by name, regardless of export status — used for
    /// lookups originating from within the defining module itself.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// All symbols, in insertion-nondeterministic (HashMap) order; callers
    /// needing determinism should sort by name.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Only the symbols marked for export.
    pub fn exported(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values().filter(|s| s.exported)
    }
}

/// The aggregated, cross-module symbol table (§3.3).
///
/// Built incrementally by the orchestrator as each module in topological
/// order finishes analysis; not mutated after the orchestrator returns
/// (§5).
#[derive(Debug, Clone, Default)]
pub struct GlobalSymbolTable {
    modules: HashMap<String, SymbolTable>,
}

impl GlobalSymbolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a module's local table.
    pub fn set_module_table(&mut self, module: impl Into<String>, table: SymbolTable) {
        self.modules.insert(module.into(), table);
    }

    /// Resolve `name` as seen from `requesting_module`: first within the
    /// requesting module itself (any visibility), then across every other
    /// module restricted to its exports (§3.3).
    ///
    /// A symbol resolved cross-module retains its defining module's name —
    /// callers should read `Symbol::module`, not assume it equals
    /// `requesting_module`.
    pub fn lookup(&self, name: &str, requesting_module: &str) -> Option<&Symbol> {
        if let Some(table) = self.modules.get(requesting_module) {
            if let Some(sym) = table.get(name) {
                return Some(sym);
            }
        }
        for (module, table) in &self.modules {
            if module == requesting_module {
                continue;
            }
            if let Some(sym) = table.get(name) {
                if sym.exported {
                    return Some(sym);
                }
            }
        }
        None
    }

    /// Every exported symbol of `module`, or an empty iterator if the
    /// module is unknown.
    pub fn exported_symbols(&self, module: &str) -> Vec<&Symbol> {
        self.modules
            .get(module)
            .map(|t| t.exported().collect())
            .unwrap_or_default()
    }

    /// The local table for a module, if one has been registered.
    pub fn module_table(&self, module: &str) -> Option<&SymbolTable> {
        self.modules.get(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_word_bool_conversions() {
        assert!(Type::Byte.implicitly_convertible_to(&Type::Word));
        assert!(Type::Byte.implicitly_convertible_to(&Type::Bool));
        assert!(Type::Bool.implicitly_convertible_to(&Type::Byte));
        assert!(!Type::Word.implicitly_convertible_to(&Type::Byte));
        assert!(Type::Word.narrows_to(&Type::Byte));
    }

    #[test]
    fn literal_sizing_boundaries() {
        assert_eq!(Type::smallest_integer_type_for(255), Some(Type::Byte));
        assert_eq!(Type::smallest_integer_type_for(256), Some(Type::Word));
        assert_eq!(Type::smallest_integer_type_for(65535), Some(Type::Word));
        assert_eq!(Type::smallest_integer_type_for(65536), None);
    }

    #[test]
    fn global_table_cross_module_export_filter() {
        let mut global = GlobalSymbolTable::new();

        let mut b = SymbolTable::new();
        b.insert(Symbol::new(
            "helper",
            SymbolKind::Function,
            Type::Function {
                params: vec![],
                ret: Box::new(Type::Byte),
            },
            StorageClass::Default,
            "B",
            true,
        ));
        b.insert(Symbol::new(
            "secret",
            SymbolKind::Function,
            Type::Function {
                params: vec![],
                ret: Box::new(Type::Byte),
            },
            StorageClass::Default,
            "B",
            false,
        ));
        global.set_module_table("B", b);
        global.set_module_table("A", SymbolTable::new());

        let found = global.lookup("helper", "A").expect("helper visible from A");
        assert_eq!(found.module, "B");

        assert!(global.lookup("secret", "A").is_none());
    }
}
