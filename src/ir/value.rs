//! Virtual registers, operands, and typed constant values (§3.6).

use std::fmt;

use crate::types::Type;

/// A virtual register: an SSA-style value slot, unique within the owning
/// function. IDs are allocated by the function's `RegisterFactory` and are
/// never reused — two registers sharing an id within a function is a fatal
/// invariant violation (§3.6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualRegister {
    /// Unique id within the owning function.
    pub id: u32,
    /// The register's type.
    pub ty: Type,
    /// An optional debug name (the source variable it was assigned from).
    pub name: Option<String>,
}

impl VirtualRegister {
    /// Construct an unnamed register.
    pub fn new(id: u32, ty: Type) -> Self {
        Self { id, ty, name: None }
    }

    /// Construct a register carrying a debug name.
    pub fn named(id: u32, ty: Type, name: impl Into<String>) -> Self {
        Self {
            id,
            ty,
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for VirtualRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.id)
    }
}

/// The unique source of register IDs for a function (§3.5, §4.3).
///
/// The common bug this design prevents: allocating register ids from a
/// per-variable "version number" counter, which collides across distinct
/// variables that are each first assigned at version 0. Every fresh
/// register in a function — whatever variable or temporary it represents —
/// comes from this single monotonic counter instead.
#[derive(Debug, Clone, Default)]
pub struct RegisterFactory {
    next_id: u32,
}

impl RegisterFactory {
    /// A factory starting at register id 0.
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Allocate a fresh, unnamed register of type `ty`.
    pub fn fresh(&mut self, ty: Type) -> VirtualRegister {
        let id = self.next_id;
        self.next_id += 1;
        VirtualRegister::new(id, ty)
    }

    /// Allocate a fresh register carrying a debug name.
    pub fn fresh_named(&mut self, ty: Type, name: impl Into<String>) -> VirtualRegister {
        let id = self.next_id;
        self.next_id += 1;
        VirtualRegister::named(id, ty, name)
    }

    /// How many registers have been allocated so far.
    pub fn count(&self) -> u32 {
        self.next_id
    }
}

/// A compile-time constant value, typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    /// An 8-bit unsigned value.
    Byte(u8),
    /// A 16-bit unsigned value.
    Word(u16),
    /// A boolean.
    Bool(bool),
}

impl ConstValue {
    /// The `Type` this constant carries.
    pub fn ty(&self) -> Type {
        match self {
            ConstValue::Byte(_) => Type::Byte,
            ConstValue::Word(_) => Type::Word,
            ConstValue::Bool(_) => Type::Bool,
        }
    }

    /// The constant's value widened to a plain integer, for cycle-estimation
    /// and constant-folding arithmetic.
    pub fn as_i64(&self) -> i64 {
        match self {
            ConstValue::Byte(b) => *b as i64,
            ConstValue::Word(w) => *w as i64,
            ConstValue::Bool(b) => *b as i64,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Byte(b) => write!(f, "${b:02X}"),
            ConstValue::Word(w) => write!(f, "${w:04X}"),
            ConstValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// An operand: either a register read or an inline constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A register whose value is read.
    Register(VirtualRegister),
    /// An inline constant.
    Const(ConstValue),
}

impl Operand {
    /// The operand's type.
    pub fn ty(&self) -> Type {
        match self {
            Operand::Register(r) => r.ty.clone(),
            Operand::Const(c) => c.ty(),
        }
    }

    /// The register this operand reads, if it is a register operand.
    pub fn as_register(&self) -> Option<&VirtualRegister> {
        match self {
            Operand::Register(r) => Some(r),
            Operand::Const(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{r}"),
            Operand::Const(c) => write!(f, "{c}"),
        }
    }
}
