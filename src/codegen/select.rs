//! # Instruction Selection / Code Generator (C9, §4.9)
//!
//! Lowers one `IlModule` to ACME-syntax 6502 assembly text via `AsmWriter`,
//! using the three-tier translation strategy spec.md calls for: fully
//! translated, simplified-with-a-comment, and placeholder. Also resolves
//! globals and locals to zero-page vs. absolute storage, and produces the
//! source map and (optionally) the debugger-label stream.

use std::collections::HashMap;

use crate::codegen::asm_writer::{AsmWriter, BasicStubConfig, Section};
use crate::codegen::{CodegenStats, DebugLabel, SourceMapEntry};
use crate::hardware::{Severity, Warning};
use crate::ir::{BinOp, CmpOp, ConstValue, CpuEscape, IlFunction, IlModule, Initializer, Instruction, Opcode, Operand};
use crate::target::TargetConfig;
use crate::types::{GlobalSymbolTable, StorageClass, Type};

/// Reserved zero-page pointer pair used for indirect `PEEK`/`POKE` (§6
/// "Memory-map conventions").
const INDIRECT_PTR_LOW: u8 = 0xFB;

/// Where a variable's storage resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarLocation {
    ZeroPage(u8),
    Absolute(u16),
}

impl VarLocation {
    fn operand_text(self) -> String {
        match self {
            VarLocation::ZeroPage(addr) => format!("${addr:02X}"),
            VarLocation::Absolute(addr) => format!("${addr:04X}"),
        }
    }
}

/// Codegen knobs (SPEC_FULL §B `CompilerOptions` surface, codegen slice).
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Whether to emit the BASIC autostart stub (default on, per §6).
    pub emit_basic_stub: bool,
    /// BASIC load address (`$0801` default).
    pub load_address: u16,
    /// Code start after the stub (`$0810` default).
    pub code_start: u16,
    /// Whether to produce the `Vec<DebugLabel>` stream (§4.9).
    pub emit_debug_labels: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            emit_basic_stub: true,
            load_address: 0x0801,
            code_start: 0x0810,
            emit_debug_labels: false,
        }
    }
}

/// Everything one codegen run produces.
#[derive(Debug, Clone)]
pub struct CodegenOutput {
    /// The assembled ACME-syntax text.
    pub assembly: String,
    /// Source-map entries, in emission order.
    pub source_map: Vec<SourceMapEntry>,
    /// Debugger labels, present only if `CodegenOptions::emit_debug_labels`.
    pub debug_labels: Vec<DebugLabel>,
    /// Accumulated codegen warnings (Tier 3 placeholders, simplified
    /// indirect addressing).
    pub warnings: Vec<Warning>,
    /// Size/count statistics.
    pub stats: CodegenStats,
}

/// Lowers IL to 6502 assembly (C9). One instance per module.
pub struct CodeGenerator<'a> {
    target: &'a TargetConfig,
    #[allow(dead_code)]
    global: &'a GlobalSymbolTable,
    module_name: String,
    options: CodegenOptions,
    asm: AsmWriter,
    source_map: Vec<SourceMapEntry>,
    debug_labels: Vec<DebugLabel>,
    warnings: Vec<Warning>,
    stats: CodegenStats,
    var_locations: HashMap<String, VarLocation>,
    next_zp: u32,
    next_abs: u32,
}

/// Absolute-RAM fallback base for variables that overflow the zero-page
/// budget. A fixed constant rather than something derived from actual code
/// size (which codegen does not know ahead of assembling) — documented as a
/// simplification in DESIGN.md.
const ABSOLUTE_DATA_BASE: u32 = 0xC000;

impl<'a> CodeGenerator<'a> {
    /// Construct a generator for one module against `target`'s memory
    /// layout.
    pub fn new(
        target: &'a TargetConfig,
        global: &'a GlobalSymbolTable,
        module_name: impl Into<String>,
        options: CodegenOptions,
    ) -> Self {
        Self {
            target,
            global,
            module_name: module_name.into(),
            options,
            asm: AsmWriter::new(),
            source_map: Vec::new(),
            debug_labels: Vec::new(),
            warnings: Vec::new(),
            stats: CodegenStats::default(),
            var_locations: HashMap::new(),
            next_zp: target.zero_page_safe_range.start as u32,
            next_abs: ABSOLUTE_DATA_BASE,
        }
    }

    /// Generate assembly for `module`, consuming `self`.
    pub fn generate(mut self, module: &IlModule) -> CodegenOutput {
        self.asm.set_section(Section::Header);
        self.asm.comment_line(&format!("module {}", module.name));
        self.asm.comment_line(&format!("source {}", module.source_file));

        if self.options.emit_basic_stub {
            self.asm.basic_stub(&BasicStubConfig {
                load_address: self.options.load_address,
                code_start: self.options.code_start,
                line_number: 10,
            });
        } else {
            self.asm.set_section(Section::Code);
            self.asm.origin(self.options.load_address);
        }

        self.emit_globals(&module.globals);

        for func in &module.functions {
            self.asm.blank_line();
            self.emit_function(func);
        }

        self.asm.set_section(Section::Footer);
        self.asm.comment_line("end of module");

        self.stats.total_size = self.stats.code_size + self.stats.data_size;

        CodegenOutput {
            assembly: self.asm.finish(),
            source_map: self.source_map,
            debug_labels: self.debug_labels,
            warnings: self.warnings,
            stats: self.stats,
        }
    }

    fn warn(&mut self, severity: Severity, message: impl Into<String>, function: Option<&str>) {
        self.warnings.push(Warning {
            severity,
            message: message.into(),
            function: function.map(|s| s.to_string()),
        });
    }

    // --- Globals -----------------------------------------------------

    fn emit_globals(&mut self, globals: &[crate::ir::GlobalDecl]) {
        if globals.is_empty() {
            return;
        }
        self.asm.set_section(Section::Data);
        for g in globals {
            self.stats.global_count += 1;
            self.emit_global(g);
            if self.options.emit_debug_labels {
                if let Some(loc) = self.var_locations.get(&g.name) {
                    let address = match loc {
                        VarLocation::ZeroPage(a) => *a as u16,
                        VarLocation::Absolute(a) => *a,
                    };
                    self.debug_labels.push(DebugLabel { address, name: g.name.clone() });
                }
            }
        }
    }

    fn emit_global(&mut self, g: &crate::ir::GlobalDecl) {
        match g.storage {
            StorageClass::Map => {
                // Mapped globals are label aliases; no storage reserved.
                if let Some(addr) = g.address {
                    self.asm.comment_line(&format!("{} = ${addr:04X} (mapped, no storage)", g.name));
                    self.var_locations.insert(g.name.clone(), VarLocation::Absolute(addr));
                }
                return;
            }
            StorageClass::ZeroPage => {
                let size = g.ty.primitive_size_or_pointer();
                let addr = self.allocate_zero_page(size);
                self.var_locations.insert(g.name.clone(), VarLocation::ZeroPage(addr));
                self.asm.origin(addr as u16);
                self.asm.label(&g.name);
                self.emit_initializer_or_reservation(&g.initializer, size);
            }
            StorageClass::Default | StorageClass::Ram | StorageClass::Data => {
                let size = g.ty.primitive_size_or_pointer();
                let addr = if g.storage == StorageClass::Default {
                    self.allocate_preferring_zero_page(size)
                } else {
                    self.allocate_absolute(size)
                };
                self.var_locations.insert(g.name.clone(), addr);
                match addr {
                    VarLocation::ZeroPage(a) => self.asm.origin(a as u16),
                    VarLocation::Absolute(a) => self.asm.origin(a),
                }
                self.asm.label(&g.name);
                self.emit_initializer_or_reservation(&g.initializer, size);
            }
        }
    }

    fn emit_initializer_or_reservation(&mut self, initializer: &Option<Initializer>, size: u32) {
        match initializer {
            None => self.asm.fill(size, 0x00),
            Some(Initializer::Scalar(ConstValue::Byte(b))) => self.asm.byte_data(&[*b]),
            Some(Initializer::Scalar(ConstValue::Bool(b))) => self.asm.byte_data(&[*b as u8]),
            Some(Initializer::Scalar(ConstValue::Word(w))) => self.asm.word_data(&[*w]),
            Some(Initializer::Array(values)) => {
                if values.iter().all(|v| matches!(v, ConstValue::Word(_))) {
                    let words: Vec<u16> = values
                        .iter()
                        .map(|v| match v {
                            ConstValue::Word(w) => *w,
                            other => other.as_i64() as u16,
                        })
                        .collect();
                    self.asm.word_data(&words);
                } else {
                    let bytes: Vec<u8> = values.iter().map(|v| v.as_i64() as u8).collect();
                    self.asm.byte_data(&bytes);
                }
            }
        }
        self.stats.data_size += size;
    }

    fn allocate_zero_page(&mut self, size: u32) -> u8 {
        let addr = self.next_zp;
        self.next_zp += size;
        self.stats.zp_bytes_used += size;
        addr as u8
    }

    fn allocate_absolute(&mut self, size: u32) -> VarLocation {
        let addr = self.next_abs;
        self.next_abs += size;
        VarLocation::Absolute(addr as u16)
    }

    fn allocate_preferring_zero_page(&mut self, size: u32) -> VarLocation {
        let end = self.target.zero_page_safe_range.end as u32;
        if self.next_zp + size - 1 <= end {
            VarLocation::ZeroPage(self.allocate_zero_page(size))
        } else {
            self.allocate_absolute(size)
        }
    }

    /// Resolve (allocating on first sight) where `name` lives, scoped to
    /// `function` for names that are not module globals. Local variables and
    /// globals share the `LOAD_VAR`/`STORE_VAR` opcode shape (§3.7); codegen
    /// is the point that tells them apart, by checking whether `name` was
    /// already registered as a global during `emit_globals`.
    fn resolve_var(&mut self, function: &str, name: &str, ty: &Type) -> VarLocation {
        if let Some(loc) = self.var_locations.get(name) {
            return *loc;
        }
        let key = format!("{function}::{name}");
        if let Some(loc) = self.var_locations.get(&key) {
            return *loc;
        }
        let size = ty.primitive_size_or_pointer();
        let loc = self.allocate_preferring_zero_page(size);
        self.var_locations.insert(key, loc);
        loc
    }

    // --- Functions -----------------------------------------------------

    fn emit_function(&mut self, func: &IlFunction) {
        self.stats.function_count += 1;

        let params: Vec<String> = func.params.iter().map(|p| format!("{}: {}", p.name, p.ty)).collect();
        self.asm.comment_line(&format!(
            "function {}({}) -> {}",
            func.name,
            params.join(", "),
            func.return_ty
        ));
        self.asm.label(&format!("_{}", func.name));

        if self.options.emit_debug_labels {
            self.debug_labels.push(DebugLabel {
                address: self.options.code_start,
                name: func.name.clone(),
            });
        }

        for id in func.reverse_postorder() {
            let block = func.block(id);
            if id != 0 {
                self.asm.local_label(&format!("block_{}", block.label));
            }
            for instr in &block.instructions {
                self.emit_instruction(&func.name, instr);
            }
        }
    }

    fn record_source_map(&mut self, asm_ref: &str, instr: &Instruction, note: Option<&str>) {
        if instr.meta.location.file == "<synthetic>" {
            return;
        }
        self.source_map.push(SourceMapEntry {
            asm_line: self.asm.line_count(),
            asm_ref: asm_ref.to_string(),
            source_file: instr.meta.location.file.clone(),
            source_line: instr.meta.location.line,
            source_column: instr.meta.location.column,
            note: note.map(|s| s.to_string()),
        });
    }

    fn emit_instruction(&mut self, function: &str, instr: &Instruction) {
        let asm_ref = format!("_{function}");
        match &instr.op {
            // --- Tier 1: fully translated ---
            Opcode::Const(value, _result) => {
                self.emit_const(value);
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += const_size(value);
            }
            Opcode::HardwareWrite { addr, .. } => {
                self.asm.instruction("STA", Some(&format!("${addr:04X}")), Some("value presumed in A"));
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 3;
            }
            Opcode::HardwareRead { addr, .. } => {
                self.asm.instruction("LDA", Some(&format!("${addr:04X}")), None);
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 3;
            }
            Opcode::ReturnVoid => {
                self.asm.instruction("RTS", None, None);
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 1;
            }
            Opcode::Return(_value) => {
                self.asm.instruction(
                    "RTS",
                    None,
                    Some("value in A per return-value convention (§9)"),
                );
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 1;
            }
            Opcode::Jump(label) => {
                self.asm.instruction("JMP", Some(&format!(".block_{label}")), None);
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 3;
            }
            Opcode::LoadAddress { symbol_name, .. } => {
                self.asm.instruction(
                    "LDA",
                    Some(&format!("#<{symbol_name}")),
                    Some(&format!("low byte; #>{symbol_name} is the high byte")),
                );
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 2;
            }
            Opcode::LoadVar { name, .. } => {
                let loc = self.resolve_var(function, name, &instr.result_ty_or(Type::Byte));
                self.asm.instruction("LDA", Some(&loc.operand_text()), None);
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 2;
            }
            Opcode::StoreVar { name, value } => {
                let loc = self.resolve_var(function, name, &value.ty());
                self.asm.instruction("STA", Some(&loc.operand_text()), None);
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 2;
            }
            Opcode::Cpu(op) => {
                self.asm.instruction(cpu_mnemonic(*op), None, None);
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 1;
            }
            Opcode::OptBarrier => {
                self.asm.comment_line("OPT_BARRIER (no code emitted)");
            }

            // --- Tier 2: simplified ---
            Opcode::Binary { op, .. } => self.emit_binary_simplified(*op, &asm_ref, instr),
            Opcode::Cmp { op, .. } => {
                self.asm.instruction(
                    "CMP",
                    None,
                    Some(&format!("{op} (comparison result feeds a following BRANCH)")),
                );
                self.record_source_map(&asm_ref, instr, Some("simplified"));
                self.stats.code_size += 2;
            }
            Opcode::Not(..) => {
                self.asm.instruction("EOR", Some("#$FF"), Some("bitwise NOT"));
                self.record_source_map(&asm_ref, instr, Some("simplified"));
                self.stats.code_size += 2;
            }
            Opcode::LogicalNot(..) => {
                self.asm.instruction("EOR", Some("#$01"), Some("logical NOT on a 0/1 bool"));
                self.record_source_map(&asm_ref, instr, Some("simplified"));
                self.stats.code_size += 2;
            }
            Opcode::Neg(..) => {
                self.asm.instruction("EOR", Some("#$FF"), Some("two's-complement negate, part 1"));
                self.asm.instruction("CLC", None, None);
                self.asm.instruction("ADC", Some("#$01"), Some("two's-complement negate, part 2"));
                self.record_source_map(&asm_ref, instr, Some("simplified"));
                self.stats.code_size += 4;
            }
            Opcode::Call { name, .. } | Opcode::CallVoid { name, .. } => {
                self.asm.instruction("JSR", Some(&format!("_{name}")), None);
                self.record_source_map(&asm_ref, instr, None);
                self.stats.code_size += 3;
            }
            Opcode::Branch { then_label, .. } => {
                self.asm.instruction(
                    "JMP",
                    Some(&format!(".block_{then_label}")),
                    Some("unconditional: conditional BRANCH codegen pending register allocation (§9)"),
                );
                self.record_source_map(&asm_ref, instr, Some("simplified"));
                self.stats.code_size += 3;
            }
            Opcode::LoadArray { .. } | Opcode::StoreArray { .. } => {
                self.asm.comment_line("array element access deferred to register allocation");
                self.asm.instruction("NOP", None, Some("placeholder: array indexing"));
                self.record_source_map(&asm_ref, instr, Some("simplified"));
                self.stats.code_size += 1;
            }
            Opcode::Peek { .. } => {
                self.asm.instruction("LDY", Some("#$00"), None);
                self.asm.instruction(
                    "LDA",
                    Some(&format!("(${INDIRECT_PTR_LOW:02X}),Y")),
                    Some("uses simplified indirect addressing"),
                );
                self.record_source_map(&asm_ref, instr, Some("simplified indirect addressing"));
                self.warn(
                    Severity::Warning,
                    "uses simplified indirect addressing",
                    Some(function),
                );
                self.stats.code_size += 4;
            }
            Opcode::Poke { .. } => {
                self.asm.instruction("LDY", Some("#$00"), None);
                self.asm.instruction(
                    "STA",
                    Some(&format!("(${INDIRECT_PTR_LOW:02X}),Y")),
                    Some("uses simplified indirect addressing"),
                );
                self.record_source_map(&asm_ref, instr, Some("simplified indirect addressing"));
                self.warn(
                    Severity::Warning,
                    "uses simplified indirect addressing",
                    Some(function),
                );
                self.stats.code_size += 4;
            }
            Opcode::Peekw { .. } => {
                self.asm.instruction("LDY", Some("#$00"), None);
                self.asm.instruction("LDA", Some(&format!("(${INDIRECT_PTR_LOW:02X}),Y")), Some("low byte"));
                self.asm.instruction("INY", None, None);
                self.asm.instruction(
                    "LDA",
                    Some(&format!("(${INDIRECT_PTR_LOW:02X}),Y")),
                    Some("high byte, uses simplified indirect addressing"),
                );
                self.record_source_map(&asm_ref, instr, Some("simplified indirect addressing"));
                self.warn(
                    Severity::Warning,
                    "uses simplified indirect addressing",
                    Some(function),
                );
                self.stats.code_size += 6;
            }
            Opcode::Pokew { .. } => {
                self.asm.instruction("LDY", Some("#$00"), None);
                self.asm.instruction("STA", Some(&format!("(${INDIRECT_PTR_LOW:02X}),Y")), Some("low byte"));
                self.asm.instruction("INY", None, None);
                self.asm.instruction(
                    "STA",
                    Some(&format!("(${INDIRECT_PTR_LOW:02X}),Y")),
                    Some("high byte, uses simplified indirect addressing"),
                );
                self.record_source_map(&asm_ref, instr, Some("simplified indirect addressing"));
                self.warn(
                    Severity::Warning,
                    "uses simplified indirect addressing",
                    Some(function),
                );
                self.stats.code_size += 6;
            }

            // --- Tier 3: placeholder ---
            Opcode::Phi { .. } => {
                self.asm.instruction("NOP", None, Some(&format!("STUB: {instr}")));
                self.record_source_map(&asm_ref, instr, Some("placeholder"));
                self.warn(Severity::Warning, format!("unsupported IL opcode: {instr}"), Some(function));
                self.stats.code_size += 1;
            }
        }
    }

    fn emit_const(&mut self, value: &ConstValue) {
        match value {
            ConstValue::Byte(b) => {
                self.asm.instruction("LDA", Some(&format!("#${b:02X}")), None);
            }
            ConstValue::Bool(b) => {
                self.asm.instruction("LDA", Some(&format!("#${:02X}", *b as u8)), None);
            }
            ConstValue::Word(w) => {
                self.asm.instruction("LDA", Some(&format!("#<${w:04X}")), Some("low byte"));
                self.asm
                    .instruction("LDA", Some(&format!("#>${w:04X}")), Some("high byte (placeholder: needs X/Y)"));
            }
        }
    }

    fn emit_binary_simplified(&mut self, op: BinOp, asm_ref: &str, instr: &Instruction) {
        match op {
            BinOp::Add => {
                self.asm.instruction("CLC", None, None);
                self.asm.instruction("ADC", None, Some("ADD (simplified, operand pending register allocation)"));
                self.stats.code_size += 3;
            }
            BinOp::Sub => {
                self.asm.instruction("SEC", None, None);
                self.asm.instruction("SBC", None, Some("SUB (simplified, operand pending register allocation)"));
                self.stats.code_size += 3;
            }
            BinOp::And => {
                self.asm.instruction("AND", None, Some("AND (simplified)"));
                self.stats.code_size += 2;
            }
            BinOp::Or => {
                self.asm.instruction("ORA", None, Some("OR (simplified)"));
                self.stats.code_size += 2;
            }
            BinOp::Xor => {
                self.asm.instruction("EOR", None, Some("XOR (simplified)"));
                self.stats.code_size += 2;
            }
            BinOp::Shl => {
                self.asm.instruction("ASL", None, Some("SHL (simplified, single-bit shift)"));
                self.stats.code_size += 2;
            }
            BinOp::Shr => {
                self.asm.instruction("LSR", None, Some("SHR (simplified, single-bit shift)"));
                self.stats.code_size += 2;
            }
            BinOp::Mul | BinOp::Div | BinOp::Mod => {
                self.asm.instruction("NOP", None, Some(&format!("STUB: {op} has no native 6502 opcode")));
                self.warn(
                    Severity::Warning,
                    format!("unsupported IL opcode: {op} (no native multiply/divide/modulo)"),
                    None,
                );
                self.stats.code_size += 1;
            }
        }
        self.record_source_map(asm_ref, instr, Some("simplified"));
    }
}

fn cpu_mnemonic(op: CpuEscape) -> &'static str {
    match op {
        CpuEscape::Sei => "SEI",
        CpuEscape::Cli => "CLI",
        CpuEscape::Nop => "NOP",
        CpuEscape::Pha => "PHA",
        CpuEscape::Pla => "PLA",
        CpuEscape::Php => "PHP",
        CpuEscape::Plp => "PLP",
    }
}

fn const_size(value: &ConstValue) -> u32 {
    match value {
        ConstValue::Byte(_) | ConstValue::Bool(_) => 2,
        ConstValue::Word(_) => 4,
    }
}

impl Type {
    /// Byte size used for storage allocation: primitive types use their
    /// natural size; everything else (arrays, functions) is treated as a
    /// 2-byte pointer slot, since register allocation for aggregates is out
    /// of scope (§1 Non-goals).
    fn primitive_size_or_pointer(&self) -> u32 {
        if self.is_primitive() {
            self.primitive_size()
        } else {
            2
        }
    }
}

impl Instruction {
    /// The type of this instruction's result register, if it has one,
    /// falling back to `default` — used only for storage-size decisions in
    /// codegen, never for type-checking (that already happened in C1/C4).
    fn result_ty_or(&self, default: Type) -> Type {
        self.op.result().map(|r| r.ty.clone()).unwrap_or(default)
    }
}
