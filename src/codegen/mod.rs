//! # Code Generation (C8/C9, §4.8-§4.9)
//!
//! `asm_writer` is the low-level ACME-syntax line writer (C8); `select` is
//! the IL-to-6502 instruction selector built on top of it (C9). This module
//! also carries the small shared types both halves produce: `CodegenStats`,
//! the source-map entry, and the debugger-label stream.

pub mod asm_writer;
pub mod select;

pub use asm_writer::{AsmWriter, BasicStubConfig, Section};
pub use select::{CodeGenerator, CodegenOptions, CodegenOutput};

use serde::{Deserialize, Serialize};

/// One entry of the source map (§3.9): ties an emitted assembly line back to
/// the IL instruction's source location. Never mutated after codegen
/// completes (§3.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// 1-based line number in the emitted assembly text.
    pub asm_line: usize,
    /// The label or address this line is associated with, for display.
    pub asm_ref: String,
    /// Originating source file.
    pub source_file: String,
    /// Originating source line.
    pub source_line: u32,
    /// Originating source column.
    pub source_column: u32,
    /// Optional free-text annotation (e.g. "simplified", "placeholder").
    pub note: Option<String>,
}

/// One entry of the debugger-label stream (§4.9 "Debugger-label output"):
/// an emulator-agnostic `al <address> .label` line, emitted for every
/// function and global label when enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugLabel {
    /// The label's resolved address.
    pub address: u16,
    /// The label name as it appears in the assembly.
    pub name: String,
}

impl std::fmt::Display for DebugLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "al {:04X} .{}", self.address, self.name)
    }
}

/// Size/count statistics produced by one codegen run (§6). Supplemented
/// beyond spec.md with `Default` and `summary()`, mirroring the teacher's
/// `ProgramStats`/`VerifyResult` reporting pair — see DESIGN.md.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CodegenStats {
    /// Estimated bytes of emitted code (instructions).
    pub code_size: u32,
    /// Estimated bytes of emitted initialized data.
    pub data_size: u32,
    /// `code_size + data_size`.
    pub total_size: u32,
    /// Bytes allocated out of the zero-page safe range.
    pub zp_bytes_used: u32,
    /// Number of functions emitted.
    pub function_count: u32,
    /// Number of globals emitted.
    pub global_count: u32,
}

impl CodegenStats {
    /// A one-line human-readable summary, the way the teacher's
    /// `VerifyResult`/stats types format for log output.
    pub fn summary(&self) -> String {
        format!(
            "{} functions, {} globals, {} bytes code / {} bytes data ({} total), {} zp bytes used",
            self.function_count, self.global_count, self.code_size, self.data_size, self.total_size, self.zp_bytes_used
        )
    }
}

/// Closed set of metadata keys usable as codegen/instruction annotations
/// (§9 "Metadata keys"). A closed enum rather than an open string map —
/// duplicate or stringly-typed keys are exactly the bug this avoids.
/// Naming discipline: PascalCase, except the legacy `M6502*` keys, which
/// keep their historical underscore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    /// Whether the annotated instruction/function is free of side effects
    /// beyond its result register.
    PurityLevel,
    /// Why a value could not stay in a register and had to escape to memory.
    EscapeReason,
    /// Which memory region (zero page, absolute RAM, hardware) a symbol
    /// resolved to.
    MemoryRegion,
    /// Which physical register (A/X/Y) a value is pinned to, if any.
    Register,
    /// Which 6502 addressing mode was selected for an operand.
    AddressingMode,
    /// Legacy key retained from an earlier 6502-specific annotation scheme;
    /// named with the `M6502` prefix and an underscore per the historical
    /// naming exception.
    M6502RegisterPair,
}

impl MetaKey {
    /// Every key, for the uniqueness/naming-discipline test below.
    pub const ALL: &'static [MetaKey] = &[
        MetaKey::PurityLevel,
        MetaKey::EscapeReason,
        MetaKey::MemoryRegion,
        MetaKey::Register,
        MetaKey::AddressingMode,
        MetaKey::M6502RegisterPair,
    ];
}

impl std::fmt::Display for MetaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MetaKey::PurityLevel => "PurityLevel",
            MetaKey::EscapeReason => "EscapeReason",
            MetaKey::MemoryRegion => "MemoryRegion",
            MetaKey::Register => "Register",
            MetaKey::AddressingMode => "AddressingMode",
            MetaKey::M6502RegisterPair => "M6502_RegisterPair",
        };
        write!(f, "{s}")
    }
}
