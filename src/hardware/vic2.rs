//! # VIC-II Timing Analyzer (C7, §4.7)
//!
//! Cycle estimation for expressions, statements, and loops; sprite-DMA and
//! badline penalties; raster-safety classification and warnings. The
//! estimation formulas operate on the (already type-resolved) AST directly
//! — the same granularity spec.md describes them at — while the
//! `HardwareAnalyzer` trait implementation walks the *lowered* IL to
//! annotate per-instruction metadata and raise block-level warnings, since
//! that's the artifact §6's "C6/C7 annotate IL with hardware metadata"
//! data-flow step actually has in hand.

use crate::ast::{AstExpr, AstExprKind, AstStmt};
use crate::ir::{IlFunction, Opcode};
use crate::target::TargetConfig;
use crate::types::GlobalSymbolTable;

use super::{HardwareAnalyzer, Recommendation, RasterSafetyMetadata, Severity, Warning};

/// Per-category instruction cost table (§4.7).
pub mod cost {
    /// A plain assignment (`STORE_VAR`-shaped statement).
    pub const ASSIGNMENT: u32 = 5;
    /// A binary arithmetic/logic/comparison operation.
    pub const BINARY_OP: u32 = 8;
    /// A unary operation.
    pub const UNARY_OP: u32 = 6;
    /// A conditional branch.
    pub const BRANCH: u32 = 3;
    /// A function call.
    pub const FUNCTION_CALL: u32 = 12;
    /// A return.
    pub const RETURN: u32 = 6;
    /// Fixed overhead charged once per loop iteration in addition to the
    /// body's own cost (header branch plus increment bookkeeping).
    pub const LOOP_OVERHEAD: u32 = 5;
    /// Anything not covered above.
    pub const DEFAULT: u32 = 2;
}

/// Fixed penalties (§4.7).
pub mod penalty {
    /// Extra cycles stolen per active sprite per scanline.
    pub const SPRITE_DMA_PER_SPRITE: u32 = 2;
    /// Extra cycle for a 6502 page-crossing addressing mode.
    pub const PAGE_CROSSING: u32 = 1;
    /// Extra cycle for a read-modify-write instruction pattern.
    pub const RMW_PENALTY: u32 = 2;
    /// The VIC-II supports at most this many hardware sprites.
    pub const MAX_SPRITES: u32 = 8;
}

/// Unknown-iteration-count loops (any `while`, or a `for` with a
/// non-literal bound) are estimated as this many iterations (§4.7).
pub const DEFAULT_LOOP_ITERATIONS: u32 = 10;

/// Recursive structural cost of an expression (§4.7 "Expression
/// estimation"). Literal = 2, identifier = 3, member access = 4, array
/// index = 5 + index cost, unary = 6 + operand, binary = 8 + lhs + rhs,
/// call = 12 + sum(arg + 3 for push), assignment-as-expression isn't a
/// shape this AST has (assignment is a statement; see
/// `estimate_statement`), array literal = sum(elem + 4 for store), empty
/// array = 0.
pub fn estimate_expression_cycles(expr: &AstExpr) -> u32 {
    match &expr.kind {
        AstExprKind::IntLiteral(_) | AstExprKind::BoolLiteral(_) => 2,
        AstExprKind::Identifier(_) => 3,
        AstExprKind::ArrayLiteral(elems) => {
            if elems.is_empty() {
                0
            } else {
                elems.iter().map(|e| estimate_expression_cycles(e) + 4).sum()
            }
        }
        AstExprKind::ArrayIndex { index, .. } => 5 + estimate_expression_cycles(index),
        AstExprKind::Binary { lhs, rhs, .. } => {
            8 + estimate_expression_cycles(lhs) + estimate_expression_cycles(rhs)
        }
        AstExprKind::Unary { operand, .. } => 6 + estimate_expression_cycles(operand),
        AstExprKind::Call { args, .. } => {
            12 + args.iter().map(|a| estimate_expression_cycles(a) + 3).sum::<u32>()
        }
        AstExprKind::AddressOf(_) => 3,
        AstExprKind::Peek { addr, .. } => 4 + estimate_expression_cycles(addr),
        AstExprKind::Poke { addr, value, .. } => {
            5 + estimate_expression_cycles(addr) + estimate_expression_cycles(value)
        }
        AstExprKind::CpuOp(_) => 2,
    }
}

/// A statement's cycle breakdown by category (§4.7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementBreakdown {
    /// Cycles attributed to plain assignments.
    pub assignments: u32,
    /// Cycles attributed to binary operations.
    pub binary_ops: u32,
    /// Cycles attributed to function calls.
    pub function_calls: u32,
    /// Cycles attributed to branches.
    pub branches: u32,
    /// Everything else.
    pub other: u32,
}

impl StatementBreakdown {
    fn total(&self) -> u32 {
        self.assignments + self.binary_ops + self.function_calls + self.branches + self.other
    }
}

/// The result of estimating one statement's cycle cost (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementEstimate {
    /// Lower bound.
    pub min: u32,
    /// Typical-case estimate.
    pub avg: u32,
    /// Upper bound (`min + PAGE_CROSSING` by default, §4.7).
    pub max: u32,
    /// Category attribution; must be stable across calls for the same
    /// statement shape.
    pub breakdown: StatementBreakdown,
    /// Whether this estimate already folds in hardware penalties (sprite
    /// DMA, RMW, badline) — `false` for a bare structural estimate.
    pub includes_hardware_penalties: bool,
}

fn contains_self_reference(target: &str, expr: &AstExpr) -> bool {
    match &expr.kind {
        AstExprKind::Identifier(name) => name == target,
        AstExprKind::ArrayIndex { array, index } => {
            contains_self_reference(target, array) || contains_self_reference(target, index)
        }
        AstExprKind::Binary { lhs, rhs, .. } => {
            contains_self_reference(target, lhs) || contains_self_reference(target, rhs)
        }
        AstExprKind::Unary { operand, .. } => contains_self_reference(target, operand),
        AstExprKind::Call { args, .. } => args.iter().any(|a| contains_self_reference(target, a)),
        AstExprKind::Peek { addr, .. } => contains_self_reference(target, addr),
        AstExprKind::Poke { addr, value, .. } => {
            contains_self_reference(target, addr) || contains_self_reference(target, value)
        }
        AstExprKind::ArrayLiteral(elems) => elems.iter().any(|e| contains_self_reference(target, e)),
        _ => false,
    }
}

/// Estimate one statement's cycle cost, producing a stable category
/// attribution (§4.7 "Statement estimation"). Control-flow statements
/// (`if`/`while`/`for`) are costed only for their *header* (condition plus
/// branch) here — the body/loop cost is the caller's responsibility via
/// `estimate_for_range`/`estimate_while`/summing `estimate_statement` over
/// a block, matching the source design's statement-by-statement walk.
pub fn estimate_statement(stmt: &AstStmt) -> StatementEstimate {
    let mut b = StatementBreakdown::default();

    match stmt {
        AstStmt::Let(v) => {
            b.assignments += cost::ASSIGNMENT;
            if let Some(init) = &v.init {
                b.other += estimate_expression_cycles(init);
            }
        }
        AstStmt::Assign { target, value, .. } => {
            b.assignments += cost::ASSIGNMENT;
            b.other += estimate_expression_cycles(value);
            if let crate::ast::AstLValue::Variable(name) = target {
                if contains_self_reference(name, value) {
                    b.other += penalty::RMW_PENALTY;
                }
            }
            if let crate::ast::AstLValue::ArrayElement { index, .. } = target {
                b.other += estimate_expression_cycles(index);
            }
        }
        AstStmt::ExprStmt(expr) => {
            attribute_expression(expr, &mut b);
        }
        AstStmt::If { cond, .. } => {
            b.branches += cost::BRANCH;
            b.other += estimate_expression_cycles(cond);
        }
        AstStmt::While { cond, .. } => {
            b.branches += cost::BRANCH;
            b.other += estimate_expression_cycles(cond);
        }
        AstStmt::ForRange { start, end, .. } => {
            b.assignments += cost::ASSIGNMENT;
            b.other += estimate_expression_cycles(start) + estimate_expression_cycles(end);
        }
        AstStmt::Return { value, .. } => {
            b.other += cost::RETURN;
            if let Some(v) = value {
                b.other += estimate_expression_cycles(v);
            }
        }
        AstStmt::Break(_) | AstStmt::Continue(_) => {
            b.other += cost::DEFAULT;
        }
    }

    let avg = b.total().max(cost::DEFAULT);
    StatementEstimate {
        min: avg,
        avg,
        max: avg + penalty::PAGE_CROSSING,
        breakdown: b,
        includes_hardware_penalties: false,
    }
}

fn attribute_expression(expr: &AstExpr, b: &mut StatementBreakdown) {
    match &expr.kind {
        AstExprKind::Call { args, .. } => {
            b.function_calls += cost::FUNCTION_CALL;
            b.other += args.iter().map(|a| estimate_expression_cycles(a) + 3).sum::<u32>();
        }
        AstExprKind::Binary { lhs, rhs, .. } => {
            b.binary_ops += cost::BINARY_OP;
            b.other += estimate_expression_cycles(lhs) + estimate_expression_cycles(rhs);
        }
        _ => {
            b.other += estimate_expression_cycles(expr);
        }
    }
}

/// The result of estimating a loop's cycle cost (§4.7 "Loop estimation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopCycleEstimate {
    /// `setup + iterations * per_iter`.
    pub total: u32,
    /// `body + overhead`.
    pub per_iter: u32,
    /// The iteration count used for `total` (the real count if known,
    /// `DEFAULT_LOOP_ITERATIONS` otherwise).
    pub iterations: u32,
    /// Whether `iterations` is an exact compile-time count.
    pub iterations_known: bool,
    /// One-time setup cost (induction-variable initialization plus bound
    /// evaluation).
    pub setup: u32,
    /// Per-iteration body cost (sum of the body statements' `avg`).
    pub body: u32,
    /// Per-iteration fixed overhead (header compare/branch plus, for
    /// `for`, the induction-variable increment).
    pub overhead: u32,
    /// The body's statement-by-statement breakdown, summed.
    pub body_breakdown: StatementBreakdown,
}

fn sum_breakdown(stmts: &[AstStmt]) -> (u32, StatementBreakdown) {
    let mut total = 0;
    let mut breakdown = StatementBreakdown::default();
    for s in stmts {
        let e = estimate_statement(s);
        total += e.avg;
        breakdown.assignments += e.breakdown.assignments;
        breakdown.binary_ops += e.breakdown.binary_ops;
        breakdown.function_calls += e.breakdown.function_calls;
        breakdown.branches += e.breakdown.branches;
        breakdown.other += e.breakdown.other;
    }
    (total, breakdown)
}

/// Estimate a `for i in start to end { body }` loop (§4.7, §8 invariant 7,
/// boundary behavior 12).
pub fn estimate_for_range(start: &AstExpr, end: &AstExpr, body: &[AstStmt]) -> LoopCycleEstimate {
    let (iterations, iterations_known) = match (literal_value(start), literal_value(end)) {
        (Some(a), Some(b)) => (b.saturating_sub(a).max(0) as u32, true),
        _ => (DEFAULT_LOOP_ITERATIONS, false),
    };

    let setup = cost::ASSIGNMENT + estimate_expression_cycles(start) + estimate_expression_cycles(end);
    let (body_cost, body_breakdown) = sum_breakdown(body);
    let overhead = cost::LOOP_OVERHEAD;
    let per_iter = body_cost + overhead;

    LoopCycleEstimate {
        total: setup + iterations * per_iter,
        per_iter,
        iterations,
        iterations_known,
        setup,
        body: body_cost,
        overhead,
        body_breakdown,
    }
}

/// Estimate a `while cond { body }` loop; the iteration count is always
/// the unknown-count default (§4.7).
pub fn estimate_while(cond: &AstExpr, body: &[AstStmt]) -> LoopCycleEstimate {
    let setup = estimate_expression_cycles(cond);
    let (body_cost, body_breakdown) = sum_breakdown(body);
    let overhead = cost::LOOP_OVERHEAD + cost::BRANCH;
    let per_iter = body_cost + overhead;

    LoopCycleEstimate {
        total: setup + DEFAULT_LOOP_ITERATIONS * per_iter,
        per_iter,
        iterations: DEFAULT_LOOP_ITERATIONS,
        iterations_known: false,
        setup,
        body: body_cost,
        overhead,
        body_breakdown,
    }
}

fn literal_value(expr: &AstExpr) -> Option<i64> {
    match &expr.kind {
        AstExprKind::IntLiteral(v) => Some(*v),
        _ => None,
    }
}

/// Hardware-penalty accounting for one block/statement (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwarePenalties {
    /// Sum of every penalty below.
    pub total: u32,
    /// Cycles stolen by active sprite DMA.
    pub sprite_dma: u32,
    /// Cycles added by page-crossing addressing.
    pub page_crossing: u32,
    /// Cycles added by read-modify-write patterns.
    pub rmw: u32,
    /// Sprites considered active for this estimate.
    pub active_sprites: u32,
    /// Number of page-crossing sites counted.
    pub page_crossings: u32,
    /// Number of RMW sites counted.
    pub rmw_operations: u32,
}

/// Compute hardware penalties for `active_sprites` active sprites,
/// `page_crossings` page-crossing addressing sites, and `rmw_operations`
/// read-modify-write sites (§4.7).
pub fn hardware_penalties(active_sprites: u32, page_crossings: u32, rmw_operations: u32) -> HardwarePenalties {
    let sprite_dma = active_sprites.min(penalty::MAX_SPRITES) * penalty::SPRITE_DMA_PER_SPRITE;
    let page_crossing = page_crossings * penalty::PAGE_CROSSING;
    let rmw = rmw_operations * penalty::RMW_PENALTY;
    HardwarePenalties {
        total: sprite_dma + page_crossing + rmw,
        sprite_dma,
        page_crossing,
        rmw,
        active_sprites: active_sprites.min(penalty::MAX_SPRITES),
        page_crossings,
        rmw_operations,
    }
}

/// §8 invariant 8: cycle estimation with the badline penalty folded in
/// equals the same estimate without it, plus `badline_penalty`.
pub fn estimate_cycles_with_penalties(
    cfg: &TargetConfig,
    base_cycles: u32,
    active_sprites: u32,
    is_badline: bool,
) -> u32 {
    let penalties = hardware_penalties(active_sprites, 0, 0);
    let mut total = base_cycles + penalties.total;
    if is_badline {
        total += cfg.badline_penalty;
    }
    total
}

fn classify(cfg: &TargetConfig, estimated_cycles: u32) -> (Recommendation, bool, bool) {
    let badline_cycles = cfg.badline_cycles();
    let raster_safe = estimated_cycles <= cfg.cycles_per_line;
    let badline_aware = estimated_cycles <= badline_cycles;

    let recommendation = if badline_aware {
        Recommendation::Safe
    } else if estimated_cycles <= cfg.cycles_per_line {
        Recommendation::UseStableRaster
    } else if estimated_cycles <= cfg.cycles_per_line * 4 {
        Recommendation::SplitAcrossLines
    } else {
        Recommendation::TooLong
    };

    (recommendation, raster_safe, badline_aware)
}

/// Classify a block/function's raster safety given its estimated cycle
/// cost (already including any applicable hardware/badline penalties) and
/// emit the warnings §4.7/§8 scenario S6 describes.
pub fn classify_raster_safety(
    cfg: &TargetConfig,
    function: Option<&str>,
    estimated_cycles: u32,
) -> (RasterSafetyMetadata, Vec<Warning>) {
    let (recommendation, raster_safe, badline_aware) = classify(cfg, estimated_cycles);
    let badline_cycles = cfg.badline_cycles();

    let mut warnings = Vec::new();
    if !badline_aware && estimated_cycles <= cfg.cycles_per_line {
        warnings.push(Warning {
            severity: Severity::Warning,
            message: format!(
                "estimated {estimated_cycles} cycles exceeds the {badline_cycles}-cycle badline budget"
            ),
            function: function.map(str::to_string),
        });
    }
    if !raster_safe {
        warnings.push(Warning {
            severity: Severity::Error,
            message: format!(
                "estimated {estimated_cycles} cycles exceeds raster line cycle budget of {}",
                cfg.cycles_per_line
            ),
            function: function.map(str::to_string),
        });
    }

    let lines_required = if cfg.cycles_per_line == 0 {
        0
    } else {
        (estimated_cycles + cfg.cycles_per_line - 1) / cfg.cycles_per_line
    };

    let metadata = RasterSafetyMetadata {
        raster_safe,
        badline_aware,
        estimated_cycles,
        max_safe_cycles: cfg.cycles_per_line,
        cycle_margin: cfg.cycles_per_line as i32 - estimated_cycles as i32,
        recommendation,
        lines_required,
        stable_raster_compatible: recommendation != Recommendation::TooLong,
    };

    (metadata, warnings)
}

fn il_instruction_cost(op: &Opcode) -> u32 {
    match op {
        Opcode::Binary { .. } | Opcode::Cmp { .. } => cost::BINARY_OP,
        Opcode::Neg(..) | Opcode::Not(..) | Opcode::LogicalNot(..) => cost::UNARY_OP,
        Opcode::Branch { .. } => cost::BRANCH,
        Opcode::Call { .. } | Opcode::CallVoid { .. } => cost::FUNCTION_CALL,
        Opcode::Return(_) | Opcode::ReturnVoid => cost::RETURN,
        Opcode::StoreVar { .. }
        | Opcode::StoreArray { .. }
        | Opcode::HardwareWrite { .. }
        | Opcode::Poke { .. }
        | Opcode::Pokew { .. } => cost::ASSIGNMENT,
        _ => cost::DEFAULT,
    }
}

/// The real VIC-II timing analyzer for C64 PAL/NTSC targets.
pub struct Vic2Analyzer {
    config: TargetConfig,
    #[allow(dead_code)]
    global: GlobalSymbolTable,
    warnings: Vec<Warning>,
    active_sprites: u32,
    is_badline: bool,
}

impl Vic2Analyzer {
    /// Construct an analyzer for `config` with no sprites active and no
    /// badline assumed by default.
    pub fn new(config: TargetConfig, global: GlobalSymbolTable) -> Self {
        Self {
            config,
            global,
            warnings: Vec::new(),
            active_sprites: 0,
            is_badline: false,
        }
    }

    /// Configure how many sprites are considered active for subsequent
    /// `analyze` calls.
    pub fn with_active_sprites(mut self, count: u32) -> Self {
        self.active_sprites = count;
        self
    }

    /// Configure whether subsequent `analyze` calls should assume the
    /// analyzed code runs on a badline.
    pub fn with_badline(mut self, is_badline: bool) -> Self {
        self.is_badline = is_badline;
        self
    }

    fn block_cycles(&self, block: &crate::ir::BasicBlock) -> u32 {
        let structural: u32 = block.instructions.iter().map(|i| il_instruction_cost(&i.op)).sum();
        let penalties = hardware_penalties(self.active_sprites, 0, 0);
        let mut total = structural + penalties.total;
        if self.is_badline {
            total += self.config.badline_penalty;
        }
        total
    }
}

impl HardwareAnalyzer for Vic2Analyzer {
    fn name(&self) -> String {
        self.config.architecture.name().to_string()
    }

    fn analyze(&mut self, func: &IlFunction) {
        for block in &func.blocks {
            let cycles = self.block_cycles(block);
            let (_, warnings) = classify_raster_safety(&self.config, Some(func.name.as_str()), cycles);
            self.warnings.extend(warnings);
        }
    }

    fn warnings(&self) -> Vec<Warning> {
        self.warnings.clone()
    }

    fn raster_safety_metadata(&self, func: &IlFunction) -> RasterSafetyMetadata {
        let worst = func.blocks.iter().map(|b| self.block_cycles(b)).max().unwrap_or(0);
        classify_raster_safety(&self.config, Some(func.name.as_str()), worst).0
    }

    fn target_config(&self) -> &TargetConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstExpr, AstExprKind, AstStmt, AstVarDecl, BinaryOp};
    use crate::types::{SourceLocation, StorageClass, Type};

    fn loc() -> SourceLocation {
        SourceLocation::new("t.6502", 1, 1)
    }

    fn int_lit(v: i64) -> AstExpr {
        AstExpr {
            kind: AstExprKind::IntLiteral(v),
            ty: Some(Type::Word),
            location: loc(),
        }
    }

    #[test]
    fn s3_loop_cycle_estimation() {
        let body = vec![AstStmt::Let(AstVarDecl {
            name: "x".into(),
            declared_ty: Some(Type::Byte),
            init: Some(int_lit(42)),
            is_const: false,
            storage: StorageClass::Default,
            exported: false,
            location: loc(),
        })];

        let estimate = estimate_for_range(&int_lit(0), &int_lit(5), &body);

        assert!(estimate.iterations_known);
        assert_eq!(estimate.iterations, 5);
        assert_eq!(estimate.setup, 9);
        assert_eq!(estimate.body, 7);
        assert_eq!(estimate.overhead, 5);
        assert_eq!(estimate.per_iter, 12);
        assert_eq!(estimate.total, 69);
    }

    #[test]
    fn boundary_12_reverse_range_is_zero_iterations() {
        let estimate = estimate_for_range(&int_lit(5), &int_lit(0), &[]);
        assert!(estimate.iterations_known);
        assert_eq!(estimate.iterations, 0);
        assert_eq!(estimate.total, estimate.setup);
    }

    #[test]
    fn invariant_7_unknown_bound_uses_default_iterations() {
        let non_literal = AstExpr {
            kind: AstExprKind::Identifier("n".into()),
            ty: Some(Type::Word),
            location: loc(),
        };
        let estimate = estimate_for_range(&int_lit(0), &non_literal, &[]);
        assert!(!estimate.iterations_known);
        assert_eq!(estimate.iterations, DEFAULT_LOOP_ITERATIONS);
    }

    #[test]
    fn invariant_8_badline_adds_exactly_the_penalty() {
        let cfg = TargetConfig::c64_pal();
        let without = estimate_cycles_with_penalties(&cfg, 30, 2, false);
        let with = estimate_cycles_with_penalties(&cfg, 30, 2, true);
        assert_eq!(with, without + cfg.badline_penalty);
    }

    #[test]
    fn invariant_9_max_ge_avg_ge_min() {
        let stmt = AstStmt::ExprStmt(AstExpr {
            kind: AstExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(int_lit(1)),
                rhs: Box::new(int_lit(2)),
            },
            ty: Some(Type::Word),
            location: loc(),
        });
        let est = estimate_statement(&stmt);
        assert!(est.max >= est.avg);
        assert!(est.avg >= est.min);
    }

    #[test]
    fn s6_badline_warning_then_error_as_cycles_grow() {
        let cfg = TargetConfig::c64_pal();
        let (_, warnings_mid) = classify_raster_safety(&cfg, None, 40);
        assert!(warnings_mid.iter().any(|w| w.message.contains("badline") && w.severity == Severity::Warning));

        let (_, warnings_over) = classify_raster_safety(&cfg, None, 80);
        assert!(warnings_over
            .iter()
            .any(|w| w.message.contains("exceeds raster line cycle budget") && w.severity == Severity::Error));
    }
}
