//! # Multi-Module Orchestrator (C2, §4.2)
//!
//! Ties the dependency graph (`module_graph`), per-module semantic analysis
//! (`semantic`), IL lowering (`builder`), SSA construction/verification
//! (`ssa`), and hardware analysis (`target`/`hardware`) into the fixed
//! per-module pipeline §4.2 and §5 describe: symbols -> types -> type check
//! -> IL -> SSA -> verify -> hardware analysis, run once per module in
//! topological order, aggregating one `GlobalSymbolTable` as it goes.
//!
//! Grounded in the teacher's `Compiler::compile` (`compiler/mod.rs`): a
//! struct holding options, one entry method running numbered phases in
//! order, each phase's intermediate result threaded into the next. The
//! difference here is the outer loop over modules in dependency order,
//! which the teacher (single-file-at-a-time) has no equivalent of.

use tracing::instrument;

use crate::ast::AstModule;
use crate::builder::IlBuilder;
use crate::error::{Error, ModuleGraphError, Result, SemanticError};
use crate::hardware::Warning as HardwareWarning;
use crate::ir::IlModule;
use crate::module_graph::ModuleGraph;
use crate::semantic;
use crate::ssa::{SsaBuilder, Verifier};
use crate::target::{create_hardware_analyzer, Architecture};
use crate::types::GlobalSymbolTable;

/// Outcome of running one module through the full per-module pipeline.
#[derive(Debug)]
pub struct ModuleResult {
    /// The module's name.
    pub name: String,
    /// Lowered, SSA-verified IL, present only if semantic analysis produced
    /// no errors for this module.
    pub il: Option<IlModule>,
    /// Semantic diagnostics collected for this module.
    pub errors: Vec<SemanticError>,
    /// Hardware-analyzer warnings (badline/raster-budget), empty if no
    /// analyzer was available for the target or semantic analysis failed.
    pub hardware_warnings: Vec<HardwareWarning>,
    /// `true` iff `errors` is empty (§4.2 step 4: "the overall success flag
    /// is the AND of all modules' success flags").
    pub success: bool,
}

/// The aggregated result of a full orchestrator run (§4.2 step 5, §3.3).
#[derive(Debug)]
pub struct OrchestratorResult {
    /// Per-module results, in the topological order they were processed.
    pub modules: Vec<ModuleResult>,
    /// The aggregated cross-module symbol table.
    pub global_table: GlobalSymbolTable,
    /// AND of every module's `success` flag.
    pub success: bool,
}

impl OrchestratorResult {
    /// Look up one module's result by name.
    pub fn module(&self, name: &str) -> Option<&ModuleResult> {
        self.modules.iter().find(|m| m.name == name)
    }
}

/// Runs the fixed per-module pipeline over a dependency-ordered set of
/// modules, for one target architecture (§4.2, §4.6).
pub struct Orchestrator {
    architecture: Architecture,
}

impl Orchestrator {
    /// Build an orchestrator targeting `architecture`. Hardware analysis is
    /// skipped (not failed) for modules when `architecture` has none
    /// (`Generic`) — §4.6's factory error is swallowed here rather than
    /// propagated, since hardware analysis is an annotation pass, not a
    /// required one.
    pub fn new(architecture: Architecture) -> Self {
        Self { architecture }
    }

    /// Run the full pipeline over an unordered list of parsed modules
    /// (§4.2).
    ///
    /// Fail-fast policy (§4.2, §7 "Propagation policy"): a missing import
    /// target or an import cycle aborts the whole run before any module is
    /// analyzed. Per-module semantic errors do not abort the run — every
    /// module is still analyzed, and `OrchestratorResult::success` reflects
    /// the AND of all of them. An IL-invariant violation (a verifier
    /// failure) is a compiler bug and aborts the run immediately, since it
    /// indicates this crate — not the input program — is wrong.
    #[instrument(skip_all, fields(module_count = modules.len()))]
    pub fn run(&self, modules: Vec<AstModule>) -> Result<OrchestratorResult> {
        let mut graph = ModuleGraph::new();
        for m in &modules {
            graph.add_module(m.name.clone(), m.imports.clone());
        }
        graph.check_missing_imports()?;
        if let Some(cycle) = graph.find_cycle() {
            return Err(Error::from(ModuleGraphError::CircularImport(cycle)));
        }

        let order = graph.topological_order();
        let mut by_name: std::collections::HashMap<String, AstModule> =
            modules.into_iter().map(|m| (m.name.clone(), m)).collect();

        let mut global = GlobalSymbolTable::new();
        let mut results = Vec::new();
        let mut overall_success = true;

        for name in &order {
            let Some(mut module) = by_name.remove(name) else {
                // A module named only as someone's import but never itself
                // registered would already have failed `check_missing_imports`;
                // `topological_order` only ever lists registered modules.
                continue;
            };
            let result = self.run_module(&mut module, &mut global)?;
            overall_success &= result.success;
            results.push(result);
        }

        Ok(OrchestratorResult {
            modules: results,
            global_table: global,
            success: overall_success,
        })
    }

    /// Backward-compatible single-module entry point (§4.2: "a single-module
    /// entry point accepts one module and returns a degenerate global-table
    /// result equivalent to calling the multi-module path with a
    /// one-element list").
    pub fn run_single(&self, module: AstModule) -> Result<OrchestratorResult> {
        self.run(vec![module])
    }

    #[instrument(skip_all, fields(module = %module.name))]
    fn run_module(&self, module: &mut AstModule, global: &mut GlobalSymbolTable) -> Result<ModuleResult> {
        tracing::debug!("analyzing module");
        let analyzed = semantic::analyze_module(module, global);
        let mut errors = analyzed.errors;

        let mut il = None;
        let mut hardware_warnings = Vec::new();

        if errors.is_empty() {
            let builder = IlBuilder::new(module.name.clone(), &analyzed.symbols, global);
            match builder.build_module(module) {
                Ok(mut ilmod) => {
                    SsaBuilder::run(&mut ilmod);
                    Verifier::verify_module(&ilmod, &analyzed.symbols, global)?;

                    if self.architecture.is_hardware_analyzer_available() {
                        // The analyzer only reads the already-aggregated
                        // global table (cross-module call-site lookups for
                        // cycle estimation); it never needs this module's
                        // own table inserted first.
                        let mut analyzer = create_hardware_analyzer(self.architecture, global.clone())?;
                        for f in &ilmod.functions {
                            analyzer.analyze(f);
                        }
                        hardware_warnings = analyzer.warnings();
                    }

                    il = Some(ilmod);
                }
                Err(Error::Semantic(e)) => errors.push(e),
                Err(other) => return Err(other),
            }
        }

        let success = errors.is_empty();
        global.set_module_table(module.name.clone(), analyzed.symbols);

        Ok(ModuleResult {
            name: module.name.clone(),
            il,
            errors,
            hardware_warnings,
            success,
        })
    }
}
