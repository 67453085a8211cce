//! # IL Instructions (§3.7)
//!
//! A flat enumeration with shared metadata. Every instruction exposes
//! `operands()`, `used_registers()`, `result()`, `has_side_effects()`,
//! `is_terminator()`, and a canonical textual form via `Display`.

use std::fmt;

use crate::types::{SourceLocation, Type};

use super::value::{ConstValue, Operand, VirtualRegister};

/// Which kind of symbol a `LOAD_ADDRESS` targets (§3.7, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressOfKind {
    /// `@variable` — address of a global or local variable's storage.
    Variable,
    /// `@function` — address of a function's entry point (used for
    /// callback-style arguments).
    Function,
}

impl fmt::Display for AddressOfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressOfKind::Variable => write!(f, "variable"),
            AddressOfKind::Function => write!(f, "function"),
        }
    }
}

/// A target-specific codegen hint attached to an instruction by an earlier
/// pass, consumed (optionally) by the code generator. Kept as a closed,
/// small enum rather than an open string map per the "Metadata keys" design
/// note (§9) — duplicate or stringly-typed hints are exactly the bug this
/// avoids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetHint {
    /// Prefer zero-page addressing for this instruction's operand(s) if the
    /// code generator has a choice.
    PreferZeroPage,
    /// This instruction is part of a raster-critical region and must not be
    /// reordered or have its cycle count treated as approximate.
    RasterCritical,
}

/// Metadata shared by every instruction.
#[derive(Debug, Clone)]
pub struct InstructionMeta {
    /// Where in source this instruction originated; synthetic instructions
    /// (phi-like merges, implicit loop increments) use
    /// `SourceLocation::synthetic()`.
    pub location: SourceLocation,
    /// Set once the VIC-II analyzer (C7) has classified the containing
    /// block; `None` before hardware analysis has run.
    pub raster_critical: Option<bool>,
    /// Set once cycle estimation has run for the containing statement;
    /// `None` beforehand.
    pub estimated_cycles: Option<u32>,
    /// Target-specific hints, closed enum per instruction (§9).
    pub hints: Vec<TargetHint>,
}

impl InstructionMeta {
    /// Metadata for an instruction at a known source location, with no
    /// hardware annotations yet.
    pub fn at(location: SourceLocation) -> Self {
        Self {
            location,
            raster_critical: None,
            estimated_cycles: None,
            hints: Vec::new(),
        }
    }

    /// Metadata for a synthetic (compiler-introduced) instruction.
    pub fn synthetic() -> Self {
        Self::at(SourceLocation::synthetic())
    }
}

/// A binary arithmetic/logic operator, used by `Instruction::Binary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// bitwise `&`
    And,
    /// bitwise `|`
    Or,
    /// bitwise `^`
    Xor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "ADD",
            BinOp::Sub => "SUB",
            BinOp::Mul => "MUL",
            BinOp::Div => "DIV",
            BinOp::Mod => "MOD",
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Xor => "XOR",
            BinOp::Shl => "SHL",
            BinOp::Shr => "SHR",
        };
        write!(f, "{s}")
    }
}

/// A comparison operator, used by `Instruction::Cmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "CMP_EQ",
            CmpOp::Ne => "CMP_NE",
            CmpOp::Lt => "CMP_LT",
            CmpOp::Le => "CMP_LE",
            CmpOp::Gt => "CMP_GT",
            CmpOp::Ge => "CMP_GE",
        };
        write!(f, "{s}")
    }
}

/// A CPU-level escape opcode (§3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuEscape {
    /// `SEI`
    Sei,
    /// `CLI`
    Cli,
    /// `NOP`
    Nop,
    /// `PHA`
    Pha,
    /// `PLA`
    Pla,
    /// `PHP`
    Php,
    /// `PLP`
    Plp,
}

impl fmt::Display for CpuEscape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CpuEscape::Sei => "CPU_SEI",
            CpuEscape::Cli => "CPU_CLI",
            CpuEscape::Nop => "CPU_NOP",
            CpuEscape::Pha => "CPU_PHA",
            CpuEscape::Pla => "CPU_PLA",
            CpuEscape::Php => "CPU_PHP",
            CpuEscape::Plp => "CPU_PLP",
        };
        write!(f, "{s}")
    }
}

/// One IL instruction, paired with its metadata.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// The operation and its operands/result.
    pub op: Opcode,
    /// Shared metadata.
    pub meta: InstructionMeta,
}

impl Instruction {
    /// Construct an instruction at a concrete source location.
    pub fn new(op: Opcode, location: SourceLocation) -> Self {
        Self {
            op,
            meta: InstructionMeta::at(location),
        }
    }

    /// Construct a synthetic (compiler-introduced) instruction.
    pub fn synthetic(op: Opcode) -> Self {
        Self {
            op,
            meta: InstructionMeta::synthetic(),
        }
    }

    /// Registers read by this instruction (not including `result()`).
    pub fn used_registers(&self) -> Vec<&VirtualRegister> {
        self.op.used_registers()
    }

    /// The register this instruction defines, if any.
    pub fn result(&self) -> Option<&VirtualRegister> {
        self.op.result()
    }

    /// Whether executing this instruction can be observed other than
    /// through its result register (stores, hardware writes, poke/pokew,
    /// calls, barriers, CPU ops — §3.7).
    pub fn has_side_effects(&self) -> bool {
        self.op.has_side_effects()
    }

    /// Whether this instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    /// Labels this instruction can transfer control to, if it is a
    /// terminator.
    pub fn successor_labels(&self) -> Vec<&str> {
        self.op.successor_labels()
    }
}

/// The instruction opcodes (§3.7).
#[derive(Debug, Clone)]
pub enum Opcode {
    /// `CONST(typed_value, result)`
    Const(ConstValue, VirtualRegister),
    /// A binary arithmetic/logic instruction: `result = lhs op rhs`.
    Binary {
        /// Which operator.
        op: BinOp,
        /// Left operand.
        lhs: Operand,
        /// Right operand.
        rhs: Operand,
        /// Result register.
        result: VirtualRegister,
    },
    /// A comparison instruction, yielding a `bool` result.
    Cmp {
        /// Which comparison.
        op: CmpOp,
        /// Left operand.
        lhs: Operand,
        /// Right operand.
        rhs: Operand,
        /// Result register.
        result: VirtualRegister,
    },
    /// `NEG(operand, result)`
    Neg(Operand, VirtualRegister),
    /// `NOT(operand, result)` — bitwise complement.
    Not(Operand, VirtualRegister),
    /// `LOGICAL_NOT(operand, result)`
    LogicalNot(Operand, VirtualRegister),
    /// `LOAD_VAR(name, result)`
    LoadVar { name: String, result: VirtualRegister },
    /// `STORE_VAR(name, value)`
    StoreVar { name: String, value: Operand },
    /// `LOAD_ARRAY(array, index, result)`
    LoadArray {
        array: String,
        index: Operand,
        result: VirtualRegister,
    },
    /// `STORE_ARRAY(array, index, value)` — symmetric store counterpart to
    /// `LOAD_ARRAY`; spec.md names the load form explicitly and this crate
    /// supplements the store form it implies (array element assignment is
    /// in scope — see DESIGN.md).
    StoreArray {
        array: String,
        index: Operand,
        value: Operand,
    },
    /// `JUMP(target_label)`
    Jump(String),
    /// `BRANCH(cond, then_label, else_label)`
    Branch {
        cond: Operand,
        then_label: String,
        else_label: String,
    },
    /// `RETURN(value)`
    Return(Operand),
    /// `RETURN_VOID`
    ReturnVoid,
    /// `CALL(name, args, result)`
    Call {
        name: String,
        args: Vec<Operand>,
        result: VirtualRegister,
    },
    /// `CALL_VOID(name, args)`
    CallVoid { name: String, args: Vec<Operand> },
    /// `HARDWARE_READ(addr, result)` — fixed, compile-time-constant address.
    HardwareRead { addr: u16, result: VirtualRegister },
    /// `HARDWARE_WRITE(addr, value)`
    HardwareWrite { addr: u16, value: Operand },
    /// `PEEK(addr_reg, result)` — dynamic-address byte read.
    Peek { addr: Operand, result: VirtualRegister },
    /// `POKE(addr_reg, value)` — dynamic-address byte write.
    Poke { addr: Operand, value: Operand },
    /// `PEEKW(addr_reg, result)` — dynamic-address little-endian word read.
    Peekw { addr: Operand, result: VirtualRegister },
    /// `POKEW(addr_reg, value)` — dynamic-address little-endian word write.
    Pokew { addr: Operand, value: Operand },
    /// `LOAD_ADDRESS(symbol_name, symbol_kind, result: word)`
    LoadAddress {
        symbol_name: String,
        kind: AddressOfKind,
        result: VirtualRegister,
    },
    /// A CPU-level escape.
    Cpu(CpuEscape),
    /// `OPT_BARRIER` — prevents reordering across; has no operands.
    OptBarrier,
    /// A phi-like merge, introduced by the SSA constructor (C5, §4.5) at a
    /// control-flow join where a variable's reaching definition differs
    /// across predecessors. Not part of the source-level opcode list in
    /// §3.7 — supplemented because SSA form cannot be constructed without
    /// some join representation; see DESIGN.md.
    Phi {
        /// One `(predecessor_block_id, value)` pair per incoming edge.
        /// `predecessor_block_id == u32::MAX` marks a same-block alias
        /// (the SSA constructor collapsing a `LOAD_VAR` whose reaching
        /// definition was unambiguous, not a real control-flow merge).
        incoming: Vec<(u32, Operand)>,
        /// Result register.
        result: VirtualRegister,
    },
}

impl Opcode {
    /// Registers read (not including the result register).
    pub fn used_registers(&self) -> Vec<&VirtualRegister> {
        let mut out = Vec::new();
        let mut push_operand = |o: &Operand, out: &mut Vec<&VirtualRegister>| {
            if let Operand::Register(r) = o {
                out.push(r);
            }
        };
        match self {
            Opcode::Const(_, _) => {}
            Opcode::Binary { lhs, rhs, .. } => {
                push_operand(lhs, &mut out);
                push_operand(rhs, &mut out);
            }
            Opcode::Cmp { lhs, rhs, .. } => {
                push_operand(lhs, &mut out);
                push_operand(rhs, &mut out);
            }
            Opcode::Neg(o, _) | Opcode::Not(o, _) | Opcode::LogicalNot(o, _) => {
                push_operand(o, &mut out);
            }
            Opcode::LoadVar { .. } => {}
            Opcode::StoreVar { value, .. } => push_operand(value, &mut out),
            Opcode::LoadArray { index, .. } => push_operand(index, &mut out),
            Opcode::StoreArray { index, value, .. } => {
                push_operand(index, &mut out);
                push_operand(value, &mut out);
            }
            Opcode::Jump(_) => {}
            Opcode::Branch { cond, .. } => push_operand(cond, &mut out),
            Opcode::Return(v) => push_operand(v, &mut out),
            Opcode::ReturnVoid => {}
            Opcode::Call { args, .. } => {
                for a in args {
                    push_operand(a, &mut out);
                }
            }
            Opcode::CallVoid { args, .. } => {
                for a in args {
                    push_operand(a, &mut out);
                }
            }
            Opcode::HardwareRead { .. } => {}
            Opcode::HardwareWrite { value, .. } => push_operand(value, &mut out),
            Opcode::Peek { addr, .. } => push_operand(addr, &mut out),
            Opcode::Poke { addr, value } => {
                push_operand(addr, &mut out);
                push_operand(value, &mut out);
            }
            Opcode::Peekw { addr, .. } => push_operand(addr, &mut out),
            Opcode::Pokew { addr, value } => {
                push_operand(addr, &mut out);
                push_operand(value, &mut out);
            }
            Opcode::LoadAddress { .. } => {}
            Opcode::Cpu(_) => {}
            Opcode::OptBarrier => {}
            Opcode::Phi { incoming, .. } => {
                for (_, v) in incoming {
                    push_operand(v, &mut out);
                }
            }
        }
        out
    }

    /// Visit (and optionally rewrite) every operand this opcode reads,
    /// including the result register's own defining operands but not the
    /// result register itself. Used by the SSA constructor to substitute
    /// aliased registers throughout a function after collapsing a
    /// `LOAD_VAR` whose reaching definition was already known.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            Opcode::Const(_, _) => {}
            Opcode::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Opcode::Cmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Opcode::Neg(o, _) | Opcode::Not(o, _) | Opcode::LogicalNot(o, _) => f(o),
            Opcode::LoadVar { .. } => {}
            Opcode::StoreVar { value, .. } => f(value),
            Opcode::LoadArray { index, .. } => f(index),
            Opcode::StoreArray { index, value, .. } => {
                f(index);
                f(value);
            }
            Opcode::Jump(_) => {}
            Opcode::Branch { cond, .. } => f(cond),
            Opcode::Return(v) => f(v),
            Opcode::ReturnVoid => {}
            Opcode::Call { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            Opcode::CallVoid { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            Opcode::HardwareRead { .. } => {}
            Opcode::HardwareWrite { value, .. } => f(value),
            Opcode::Peek { addr, .. } => f(addr),
            Opcode::Poke { addr, value } => {
                f(addr);
                f(value);
            }
            Opcode::Peekw { addr, .. } => f(addr),
            Opcode::Pokew { addr, value } => {
                f(addr);
                f(value);
            }
            Opcode::LoadAddress { .. } => {}
            Opcode::Cpu(_) => {}
            Opcode::OptBarrier => {}
            Opcode::Phi { incoming, .. } => {
                for (_, v) in incoming {
                    f(v);
                }
            }
        }
    }

    /// The register this opcode defines, if any.
    pub fn result(&self) -> Option<&VirtualRegister> {
        match self {
            Opcode::Const(_, r)
            | Opcode::Neg(_, r)
            | Opcode::Not(_, r)
            | Opcode::LogicalNot(_, r)
            | Opcode::LoadVar { result: r, .. }
            | Opcode::LoadArray { result: r, .. }
            | Opcode::Call { result: r, .. }
            | Opcode::HardwareRead { result: r, .. }
            | Opcode::Peek { result: r, .. }
            | Opcode::Peekw { result: r, .. }
            | Opcode::LoadAddress { result: r, .. } => Some(r),
            Opcode::Binary { result, .. } => Some(result),
            Opcode::Cmp { result, .. } => Some(result),
            Opcode::Phi { result, .. } => Some(result),
            _ => None,
        }
    }

    /// §3.7: stores, hardware writes, poke/pokew, calls, barriers, and CPU
    /// ops have side effects. Hardware reads and peek/peekw are pure.
    /// Terminators are not listed in §3.7's side-effect set (control
    /// transfer is tracked separately via `is_terminator()`); callers that
    /// need "must not be reordered past" for a terminator should check
    /// `is_terminator()` too.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Opcode::StoreVar { .. }
                | Opcode::StoreArray { .. }
                | Opcode::HardwareWrite { .. }
                | Opcode::Poke { .. }
                | Opcode::Pokew { .. }
                | Opcode::Call { .. }
                | Opcode::CallVoid { .. }
                | Opcode::Cpu(_)
                | Opcode::OptBarrier
        )
    }

    /// Whether this opcode is a block terminator.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Jump(_) | Opcode::Branch { .. } | Opcode::Return(_) | Opcode::ReturnVoid
        )
    }

    /// Labels a terminator transfers control to.
    pub fn successor_labels(&self) -> Vec<&str> {
        match self {
            Opcode::Jump(label) => vec![label.as_str()],
            Opcode::Branch {
                then_label,
                else_label,
                ..
            } => vec![then_label.as_str(), else_label.as_str()],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            Opcode::Const(v, r) => write!(f, "{r} = CONST {v}"),
            Opcode::Binary { op, lhs, rhs, result } => write!(f, "{result} = {op} {lhs}, {rhs}"),
            Opcode::Cmp { op, lhs, rhs, result } => write!(f, "{result} = {op} {lhs}, {rhs}"),
            Opcode::Neg(o, r) => write!(f, "{r} = NEG {o}"),
            Opcode::Not(o, r) => write!(f, "{r} = NOT {o}"),
            Opcode::LogicalNot(o, r) => write!(f, "{r} = LOGICAL_NOT {o}"),
            Opcode::LoadVar { name, result } => write!(f, "{result} = LOAD_VAR {name}"),
            Opcode::StoreVar { name, value } => write!(f, "STORE_VAR {name}, {value}"),
            Opcode::LoadArray { array, index, result } => {
                write!(f, "{result} = LOAD_ARRAY {array}[{index}]")
            }
            Opcode::StoreArray { array, index, value } => {
                write!(f, "STORE_ARRAY {array}[{index}], {value}")
            }
            Opcode::Jump(label) => write!(f, "JUMP {label}"),
            Opcode::Branch {
                cond,
                then_label,
                else_label,
            } => write!(f, "BRANCH {cond}, {then_label}, {else_label}"),
            Opcode::Return(v) => write!(f, "RETURN {v}"),
            Opcode::ReturnVoid => write!(f, "RETURN_VOID"),
            Opcode::Call { name, args, result } => {
                write!(f, "{result} = CALL {name}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Opcode::CallVoid { name, args } => {
                write!(f, "CALL_VOID {name}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Opcode::HardwareRead { addr, result } => write!(f, "{result} = HARDWARE_READ ${addr:04X}"),
            Opcode::HardwareWrite { addr, value } => write!(f, "HARDWARE_WRITE ${addr:04X}, {value}"),
            Opcode::Peek { addr, result } => write!(f, "{result} = PEEK {addr}"),
            Opcode::Poke { addr, value } => write!(f, "POKE {addr}, {value}"),
            Opcode::Peekw { addr, result } => write!(f, "{result} = PEEKW {addr}"),
            Opcode::Pokew { addr, value } => write!(f, "POKEW {addr}, {value}"),
            Opcode::LoadAddress {
                symbol_name,
                kind,
                result,
            } => write!(f, "{result} = LOAD_ADDRESS @{symbol_name} ({kind})"),
            Opcode::Cpu(op) => write!(f, "{op}"),
            Opcode::OptBarrier => write!(f, "OPT_BARRIER"),
            Opcode::Phi { incoming, result } => {
                write!(f, "{result} = PHI(")?;
                for (i, (block, v)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if *block == u32::MAX {
                        write!(f, "{v}")?;
                    } else {
                        write!(f, "b{block}: {v}")?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Operand]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{a}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn side_effects_classification() {
        let r = VirtualRegister::new(0, Type::Byte);
        let store = Instruction::synthetic(Opcode::StoreVar {
            name: "x".into(),
            value: Operand::Register(r.clone()),
        });
        assert!(store.has_side_effects());

        let hr = Instruction::synthetic(Opcode::HardwareRead {
            addr: 0xD020,
            result: r.clone(),
        });
        assert!(!hr.has_side_effects());

        let peek = Instruction::synthetic(Opcode::Peek {
            addr: Operand::Register(r.clone()),
            result: r,
        });
        assert!(!peek.has_side_effects());
    }

    #[test]
    fn terminator_classification_and_successors() {
        let jmp = Instruction::synthetic(Opcode::Jump("exit".into()));
        assert!(jmp.is_terminator());
        assert_eq!(jmp.successor_labels(), vec!["exit"]);

        let br = Instruction::synthetic(Opcode::Branch {
            cond: Operand::Const(ConstValue::Bool(true)),
            then_label: "then".into(),
            else_label: "else".into(),
        });
        assert!(br.is_terminator());
        assert_eq!(br.successor_labels(), vec!["then", "else"]);
    }
}
