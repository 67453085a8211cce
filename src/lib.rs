//! # sixtyfive-core
//!
//! Mid-end compiler core for a statically typed, Pascal/BASIC-flavored
//! source language targeting the 6502 CPU and the Commodore 64: a typed
//! SSA-form intermediate language, a multi-module semantic orchestrator, a
//! VIC-II cycle/raster-safety analyzer, and a three-tier 6502 code
//! generator. The lexer, parser, diagnostic formatter, CLI, and external
//! assembler binary are out-of-scope collaborators this crate only talks to
//! through narrow interfaces (`ast`, `assembler`).
//!
//! ```text
//! AST (external) -> Orchestrator (C2) -> per module: symbols/types/IL (C1/C4/C5)
//!                 -> hardware analysis (C6/C7) -> code generator (C9, via C8)
//!                 -> external assembler (C10) -> .PRG
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use sixtyfive_core::{Compiler, CompilerOptions};
//!
//! let compiler = Compiler::new(CompilerOptions::default());
//! let outcome = compiler.compile(modules)?;
//! if outcome.orchestrator.success {
//!     for module in &outcome.modules {
//!         println!("{}", module.codegen.assembly);
//!     }
//! }
//! ```

pub mod assembler;
pub mod ast;
pub mod builder;
pub mod codegen;
pub mod error;
pub mod hardware;
pub mod ir;
pub mod module_graph;
pub mod orchestrator;
pub mod semantic;
pub mod ssa;
pub mod target;
pub mod types;

pub use error::{Error, Result};
pub use orchestrator::{ModuleResult, Orchestrator, OrchestratorResult};
pub use target::Architecture;

use ast::AstModule;
use codegen::{CodegenOptions, CodegenOutput};
use target::TargetConfig;

/// The crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Requested assembly/binary output format (§6 "CLI surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ACME-syntax assembly text only.
    #[default]
    Asm,
    /// A `.PRG` binary (via the external assembler), assembly discarded.
    Prg,
    /// Both the assembly text and the `.PRG` binary.
    Both,
    /// Commodore cartridge ROM image. Accepted but not produced by the
    /// core: requesting it only emits a warning (§6, §7 "CRT format
    /// requested -> warning only"); assembly is still produced as if `Asm`
    /// had been requested.
    Crt,
}

/// Debug-info emission mode (§6 "CLI surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    /// No debug-label stream.
    #[default]
    None,
    /// Inline comments only (source map still produced if requested
    /// separately; no extra label stream).
    Inline,
    /// VICE-monitor-compatible `al <address> .label` label stream (§4.9).
    Vice,
    /// Both inline comments and the VICE label stream.
    Both,
}

impl DebugMode {
    /// Whether this mode requests the `Vec<DebugLabel>` stream.
    pub fn emits_labels(self) -> bool {
        matches!(self, DebugMode::Vice | DebugMode::Both)
    }
}

/// Process exit codes this crate's callers (the out-of-scope CLI) should
/// use to report a compilation outcome (§6 "CLI surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Compilation succeeded.
    Success = 0,
    /// A semantic, IL, or codegen error occurred.
    CompileError = 1,
    /// The external assembler ran and failed.
    AssemblerError = 2,
    /// No external assembler binary could be found.
    AssemblerMissing = 3,
    /// Reading input or writing output failed. Not raised by this crate
    /// (filesystem I/O is out of scope, §1) but reserved here so a CLI built
    /// on top of this crate has a stable, complete code space to report.
    IoFailure = 4,
}

/// Top-level compilation options (SPEC_FULL §B), mirroring the teacher's
/// `solisp::compiler::CompileOptions` shape: one struct, `Default`
/// implemented, every phase's knobs gathered in one place rather than
/// threaded as separate function arguments.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Which architecture to target (§4.6).
    pub architecture: Architecture,
    /// Requested output format (§6). The core itself only ever produces
    /// assembly; `Prg`/`Both` additionally require driving
    /// `assembler::AssemblerDriver` with the resulting text.
    pub output_format: OutputFormat,
    /// Debug-info emission mode (§6).
    pub debug_mode: DebugMode,
    /// Whether to retain the source map (§3.9). Source maps are cheap to
    /// build; this flag exists for parity with the CLI surface and to let
    /// large-scale callers skip the allocation.
    pub source_map: bool,
    /// Whether to emit the BASIC `SYS` autostart stub (default on, §4.8).
    pub basic_stub: bool,
    /// BASIC load address (`$0801` default for C64, §6).
    pub load_address: u16,
    /// Code start after the stub (`$0810` default for C64, §6).
    pub code_start: u16,
    /// Explicit path to the external assembler binary, if the caller wants
    /// to bypass the `$PATH`/well-known-directories search (§4.10).
    pub assembler_path: Option<std::path::PathBuf>,
    /// Optimization level. Always `0` — no optimizer pass is in scope
    /// (§1 Non-goals: "does not guarantee optimal cycle counts"). The field
    /// exists, mirroring the teacher's `opt_level`, so a future optimizer
    /// pass has an established place to plug into without an API break.
    pub opt_level: u8,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            architecture: Architecture::C64Pal,
            output_format: OutputFormat::Asm,
            debug_mode: DebugMode::None,
            source_map: true,
            basic_stub: true,
            load_address: 0x0801,
            code_start: 0x0810,
            assembler_path: None,
            opt_level: 0,
        }
    }
}

impl CompilerOptions {
    fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions {
            emit_basic_stub: self.basic_stub,
            load_address: self.load_address,
            code_start: self.code_start,
            emit_debug_labels: self.debug_mode.emits_labels(),
        }
    }

    fn target_config(&self) -> TargetConfig {
        match self.architecture {
            Architecture::C64Pal => TargetConfig::c64_pal(),
            Architecture::C64Ntsc => TargetConfig::c64_ntsc(),
            other => TargetConfig::placeholder_for(other),
        }
    }
}

/// One module's codegen output, paired with its name for reporting.
#[derive(Debug, Clone)]
pub struct ModuleCodegen {
    /// The module this assembly was generated from.
    pub module_name: String,
    /// The generated assembly, source map, stats, and warnings.
    pub codegen: CodegenOutput,
}

/// The result of a full `Compiler::compile` run: the orchestrator's
/// per-module analysis/IL results plus, for every module that produced IL,
/// its generated assembly.
#[derive(Debug)]
pub struct CompileOutcome {
    /// The orchestrator's result (symbols, IL, diagnostics, hardware
    /// warnings, per module).
    pub orchestrator: OrchestratorResult,
    /// Codegen output for every module whose IL was available, in the same
    /// order as `orchestrator.modules`.
    pub modules: Vec<ModuleCodegen>,
}

impl CompileOutcome {
    /// The exit code a CLI built on this crate should report (§6).
    /// Assembler invocation is a separate, caller-driven step (§1 scope),
    /// so this never returns `AssemblerError`/`AssemblerMissing`/`IoFailure`
    /// — only `Success` or `CompileError`.
    pub fn exit_code(&self) -> ExitCode {
        if self.orchestrator.success {
            ExitCode::Success
        } else {
            ExitCode::CompileError
        }
    }
}

/// The compiler façade: wires the orchestrator (C2) and code generator
/// (C9) together for a whole compilation run, the way the teacher's
/// `Compiler` wires its own numbered phases behind one `compile` call
/// (`compiler/mod.rs`).
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    /// Build a compiler with the given options.
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Run the full pipeline: orchestrate all modules (C2-C5), then
    /// generate assembly (C8/C9) for every module that produced IL. Per
    /// §7's propagation policy, a module with semantic errors simply has no
    /// `ModuleCodegen` entry; it does not abort codegen for the others.
    ///
    /// `CRT` output is accepted but only warned about (§6, §7): when
    /// requested, every module's warnings gain one `Warning::Error ==
    /// false` entry noting the core does not emit cartridge images.
    #[tracing::instrument(skip_all)]
    pub fn compile(&self, modules: Vec<AstModule>) -> Result<CompileOutcome> {
        let orchestrator = Orchestrator::new(self.options.architecture);
        let result = orchestrator.run(modules)?;

        let target = self.options.target_config();
        let codegen_options = self.options.codegen_options();
        let mut outputs = Vec::new();

        for module in &result.modules {
            let Some(il) = &module.il else { continue };
            let generator = codegen::CodeGenerator::new(
                &target,
                &result.global_table,
                module.name.clone(),
                codegen_options.clone(),
            );
            let mut output = generator.generate(il);
            if self.options.output_format == OutputFormat::Crt {
                output.warnings.push(hardware::Warning {
                    severity: hardware::Severity::Warning,
                    message: "CRT output format is accepted but not produced by this core; assembly was generated instead".to_string(),
                    function: None,
                });
            }
            outputs.push(ModuleCodegen {
                module_name: module.name.clone(),
                codegen: output,
            });
        }

        Ok(CompileOutcome {
            orchestrator: result,
            modules: outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{AstDecl, AstExpr, AstExprKind, AstFunctionDecl, AstStmt};
    use types::{SourceLocation, Type};

    fn loc() -> SourceLocation {
        SourceLocation::new("t.6502", 1, 1)
    }

    #[test]
    fn end_to_end_minimal_void_main_produces_assembly() {
        // S1: one function `main`, one block ending in RETURN_VOID; `_main:`
        // then `RTS` in the emitted assembly; function_count == 1.
        let module = AstModule {
            name: "M".into(),
            imports: vec![],
            source_file: "m.6502".into(),
            decls: vec![AstDecl::Function(AstFunctionDecl {
                name: "main".into(),
                params: vec![],
                return_ty: Type::Void,
                body: vec![AstStmt::Return {
                    value: None,
                    location: loc(),
                }],
                exported: true,
                location: loc(),
            })],
        };

        let compiler = Compiler::new(CompilerOptions::default());
        let outcome = compiler.compile(vec![module]).unwrap();
        assert_eq!(outcome.exit_code(), ExitCode::Success);
        assert_eq!(outcome.modules.len(), 1);

        let asm = &outcome.modules[0].codegen.assembly;
        assert!(asm.contains("_main:"));
        assert!(asm.contains("RTS"));
        assert!(outcome.modules[0].codegen.stats.function_count >= 1);
    }

    #[test]
    fn hardware_write_rewrites_to_fixed_address_store() {
        // S2: poke($D020, 1) rewrites to a HARDWARE_WRITE, codegen emits
        // LDA #$01 then STA $D020.
        let module = AstModule {
            name: "M".into(),
            imports: vec![],
            source_file: "m.6502".into(),
            decls: vec![AstDecl::Function(AstFunctionDecl {
                name: "main".into(),
                params: vec![],
                return_ty: Type::Void,
                body: vec![
                    AstStmt::ExprStmt(AstExpr {
                        kind: AstExprKind::Poke {
                            addr: Box::new(AstExpr {
                                kind: AstExprKind::IntLiteral(0xD020),
                                ty: None,
                                location: loc(),
                            }),
                            value: Box::new(AstExpr {
                                kind: AstExprKind::IntLiteral(1),
                                ty: None,
                                location: loc(),
                            }),
                            wide: false,
                        },
                        ty: None,
                        location: loc(),
                    }),
                    AstStmt::Return {
                        value: None,
                        location: loc(),
                    },
                ],
                exported: true,
                location: loc(),
            })],
        };

        let compiler = Compiler::new(CompilerOptions::default());
        let outcome = compiler.compile(vec![module]).unwrap();
        assert!(outcome.orchestrator.success);

        let asm = &outcome.modules[0].codegen.assembly;
        assert!(asm.contains("LDA #$01"));
        assert!(asm.contains("STA $D020"));
    }

    #[test]
    fn crt_output_format_only_warns() {
        let module = AstModule {
            name: "M".into(),
            imports: vec![],
            source_file: "m.6502".into(),
            decls: vec![AstDecl::Function(AstFunctionDecl {
                name: "main".into(),
                params: vec![],
                return_ty: Type::Void,
                body: vec![AstStmt::Return {
                    value: None,
                    location: loc(),
                }],
                exported: true,
                location: loc(),
            })],
        };

        let mut options = CompilerOptions::default();
        options.output_format = OutputFormat::Crt;
        let compiler = Compiler::new(options);
        let outcome = compiler.compile(vec![module]).unwrap();
        assert!(outcome.orchestrator.success);
        assert!(outcome.modules[0]
            .codegen
            .warnings
            .iter()
            .any(|w| w.message.contains("CRT")));
    }
}
