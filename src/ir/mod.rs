//! # IL Data Model (C3, §3.5-§3.9)
//!
//! The typed SSA-form intermediate language: modules, functions, basic
//! blocks, virtual registers, typed values, and instructions.

pub mod instruction;
pub mod program;
pub mod value;

pub use instruction::{AddressOfKind, BinOp, CmpOp, CpuEscape, Instruction, InstructionMeta, Opcode, TargetHint};
pub use program::{BasicBlock, GlobalDecl, IlFunction, IlModule, Initializer, Param};
pub use value::{ConstValue, Operand, RegisterFactory, VirtualRegister};
