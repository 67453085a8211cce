//! # Hardware / Timing Analysis (C6/C7, §4.6-§4.7)
//!
//! `HardwareAnalyzer` is the capability set §9 calls for: `analyze`,
//! `get_warnings`, `get_raster_safety_metadata`, `get_target_config`. A
//! trait plus per-architecture concrete types and the `target::create_hardware_analyzer`
//! factory is the natural Rust mapping for what the source design describes
//! as dynamic dispatch over architectures.

pub mod vic2;

use crate::ir::IlFunction;
use crate::target::TargetConfig;

/// Shared by C7 (timing) and C9 (codegen placeholder opcodes) — spec.md
/// describes both but does not name a shared type; unified here per
/// DESIGN.md, grounded in the teacher's `VerifyResult { errors, warnings }`
/// split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Non-fatal; compilation proceeds.
    Warning,
    /// Exceeds a hard budget; still does not abort compilation (§7:
    /// "Timing: badline-budget warnings and raster-line-budget errors from
    /// C7" accumulate, they don't abort), but callers may choose to treat
    /// it as fatal.
    Error,
}

/// One diagnostic produced by a hardware analyzer.
#[derive(Debug, Clone)]
pub struct Warning {
    /// How serious this diagnostic is.
    pub severity: Severity,
    /// Human-readable message. Tests match on substrings like `"badline"`
    /// and `"exceeds raster line cycle budget"` (§8 scenario S6).
    pub message: String,
    /// The function this warning was raised for, if applicable.
    pub function: Option<String>,
}

/// A raster-safety classification recommendation (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    /// Fits comfortably within the badline-safe budget.
    Safe,
    /// Exceeds the badline budget but fits a normal line; use a stable
    /// raster technique (disable badlines or time around them).
    UseStableRaster,
    /// Exceeds a single raster line's budget but fits within a handful of
    /// lines; split the work across multiple lines/frames.
    SplitAcrossLines,
    /// Consistently exceeds the badline budget in raster-critical code;
    /// disable badlines for this region.
    DisableBadlines,
    /// Infeasible within any reasonable number of raster lines.
    TooLong,
}

/// Raster-safety metadata attached to a function or block (§3.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSafetyMetadata {
    /// `true` iff `estimated_cycles <= cycles_per_line`.
    pub raster_safe: bool,
    /// `true` iff `estimated_cycles <= badline_cycles`.
    pub badline_aware: bool,
    /// Estimated cycle cost, including hardware penalties.
    pub estimated_cycles: u32,
    /// The safe-cycle budget this estimate was measured against.
    pub max_safe_cycles: u32,
    /// `max_safe_cycles as i32 - estimated_cycles as i32`; negative means
    /// over budget.
    pub cycle_margin: i32,
    /// What the analyzer recommends doing about it.
    pub recommendation: Recommendation,
    /// How many raster lines this code would need if split.
    pub lines_required: u32,
    /// Whether a stable-raster technique (fixed-cycle branch padding)
    /// would make this code badline-safe.
    pub stable_raster_compatible: bool,
}

/// The capability set every per-architecture hardware analyzer implements
/// (§4.6, §9).
pub trait HardwareAnalyzer {
    /// A human-readable name for this analyzer/architecture, e.g.
    /// `"C64 (PAL)"` or `"C128 (Not Implemented)"`.
    fn name(&self) -> String;

    /// Analyze one function, annotating its instructions' metadata and
    /// accumulating warnings. Hardware analyzers read IL but never mutate
    /// its structure (§5) — only `InstructionMeta` fields.
    fn analyze(&mut self, func: &IlFunction);

    /// Every warning accumulated so far. Append-only; reads return a copy
    /// (§5, §3.10).
    fn warnings(&self) -> Vec<Warning>;

    /// Raster-safety metadata for a previously analyzed function.
    fn raster_safety_metadata(&self, func: &IlFunction) -> RasterSafetyMetadata;

    /// The target configuration this analyzer was built for.
    fn target_config(&self) -> &TargetConfig;
}
