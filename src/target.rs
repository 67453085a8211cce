//! # Target Config & Hardware-Analyzer Registry (C6, §4.6)
//!
//! A target descriptor names the CPU/platform this compilation targets;
//! the factory here dispatches to an architecture-specific
//! `HardwareAnalyzer`. Only C64 PAL/NTSC have a real analyzer (C7); C128
//! and X16 are "known but incomplete" and get a placeholder that reports
//! `"(Not Implemented)"` and safe defaults, while `Generic` has none at all
//! (§9: `isHardwareAnalyzerAvailable` is false only for `Generic`).

use crate::error::{Error, Result};
use crate::hardware::vic2::Vic2Analyzer;
use crate::hardware::{HardwareAnalyzer, RasterSafetyMetadata, Warning};
use crate::ir::IlFunction;
use crate::types::GlobalSymbolTable;

/// The architectures this crate knows the name of. Only `C64Pal`/`C64Ntsc`
/// have a real timing model; `C128`/`X16` are placeholders; `Generic` has
/// no analyzer at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// Commodore 64, PAL (50Hz, 63 cycles/line, 312 lines/frame).
    C64Pal,
    /// Commodore 64, NTSC (60Hz, 65 cycles/line, 262 lines/frame).
    C64Ntsc,
    /// Commodore 128 (recognized, not implemented).
    C128,
    /// Commander X16 (recognized, not implemented).
    X16,
    /// Architecture-agnostic target with no hardware model at all.
    Generic,
}

impl Architecture {
    /// A human-readable name, used in placeholder-analyzer reporting and
    /// diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::C64Pal => "C64 (PAL)",
            Architecture::C64Ntsc => "C64 (NTSC)",
            Architecture::C128 => "C128",
            Architecture::X16 => "Commander X16",
            Architecture::Generic => "Generic",
        }
    }

    /// `true` for every architecture except `Generic` — i.e. whether
    /// `create_hardware_analyzer` will succeed for this target, even if
    /// the result is only a placeholder (§4.6, §9).
    pub fn is_hardware_analyzer_available(&self) -> bool {
        !matches!(self, Architecture::Generic)
    }
}

/// Memory-region metadata (used by codegen's zero-page allocation and the
/// assembler driver's BASIC-stub placement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Inclusive start address.
    pub start: u16,
    /// Inclusive end address.
    pub end: u16,
}

/// A target configuration (§4.6, §6 "Memory-map conventions").
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Which architecture this configures.
    pub architecture: Architecture,
    /// The zero-page range safe for this crate's code generator to use
    /// (C64: `$02-$8F`, leaving BASIC/KERNAL-reserved zero-page bytes
    /// alone).
    pub zero_page_safe_range: MemoryRegion,
    /// CPU cycles available per raster line.
    pub cycles_per_line: u32,
    /// Raster lines per frame.
    pub lines_per_frame: u32,
    /// Cycles stolen by VIC-II character-matrix DMA on a badline.
    pub badline_penalty: u32,
    /// Memory regions available for code/data placement.
    pub available_memory: Vec<MemoryRegion>,
    /// Default BASIC load address (`$0801` on C64).
    pub basic_load_address: u16,
    /// Default code start after the BASIC stub (`$0810` on C64).
    pub default_code_start: u16,
}

impl TargetConfig {
    /// The standard C64 PAL configuration.
    pub fn c64_pal() -> Self {
        Self {
            architecture: Architecture::C64Pal,
            zero_page_safe_range: MemoryRegion { start: 0x02, end: 0x8F },
            cycles_per_line: 63,
            lines_per_frame: 312,
            badline_penalty: 40,
            available_memory: vec![MemoryRegion { start: 0x0810, end: 0xCFFF }],
            basic_load_address: 0x0801,
            default_code_start: 0x0810,
        }
    }

    /// The standard C64 NTSC configuration.
    pub fn c64_ntsc() -> Self {
        Self {
            cycles_per_line: 65,
            lines_per_frame: 262,
            architecture: Architecture::C64Ntsc,
            ..Self::c64_pal()
        }
    }

    /// Total cycles available per video frame.
    pub fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_line * self.lines_per_frame
    }

    /// Cycles available on a badline (`cycles_per_line - badline_penalty`).
    pub fn badline_cycles(&self) -> u32 {
        self.cycles_per_line.saturating_sub(self.badline_penalty)
    }

    /// A config for an architecture with no published timing model yet
    /// (`C128`, `X16`); reuses the C64 PAL numbers as a conservative
    /// stand-in so a `PlaceholderAnalyzer` still has *something* coherent
    /// to report.
    pub fn placeholder_for(architecture: Architecture) -> Self {
        Self {
            architecture,
            ..Self::c64_pal()
        }
    }
}

/// Construct the hardware analyzer for `architecture`. `Generic` has no
/// analyzer and errors; `C128`/`X16` get a placeholder; C64 PAL/NTSC get
/// the real VIC-II timing analyzer (§4.6).
pub fn create_hardware_analyzer(
    architecture: Architecture,
    global: GlobalSymbolTable,
) -> Result<Box<dyn HardwareAnalyzer>> {
    match architecture {
        Architecture::C64Pal => Ok(Box::new(Vic2Analyzer::new(TargetConfig::c64_pal(), global))),
        Architecture::C64Ntsc => Ok(Box::new(Vic2Analyzer::new(TargetConfig::c64_ntsc(), global))),
        Architecture::C128 | Architecture::X16 => Ok(Box::new(PlaceholderAnalyzer::new(architecture))),
        Architecture::Generic => Err(Error::NoHardwareAnalyzer(architecture.name().to_string())),
    }
}

/// A stand-in analyzer for recognized-but-unimplemented architectures.
/// Every method returns a safe default rather than erroring, so pipelines
/// targeting `C128`/`X16` still compile (just without real timing
/// analysis) — §4.6, §9.
pub struct PlaceholderAnalyzer {
    architecture: Architecture,
    config: TargetConfig,
}

impl PlaceholderAnalyzer {
    /// Construct a placeholder for `architecture`.
    pub fn new(architecture: Architecture) -> Self {
        Self {
            config: TargetConfig::placeholder_for(architecture),
            architecture,
        }
    }
}

impl HardwareAnalyzer for PlaceholderAnalyzer {
    fn name(&self) -> String {
        format!("{} (Not Implemented)", self.architecture.name())
    }

    fn analyze(&mut self, _func: &IlFunction) {}

    fn warnings(&self) -> Vec<Warning> {
        Vec::new()
    }

    fn raster_safety_metadata(&self, _func: &IlFunction) -> RasterSafetyMetadata {
        RasterSafetyMetadata {
            raster_safe: true,
            badline_aware: true,
            estimated_cycles: 0,
            max_safe_cycles: self.config.cycles_per_line,
            cycle_margin: self.config.cycles_per_line as i32,
            recommendation: crate::hardware::Recommendation::Safe,
            lines_required: 0,
            stable_raster_compatible: true,
        }
    }

    fn target_config(&self) -> &TargetConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_has_no_analyzer() {
        assert!(!Architecture::Generic.is_hardware_analyzer_available());
        let err = create_hardware_analyzer(Architecture::Generic, GlobalSymbolTable::new());
        assert!(err.is_err());
    }

    #[test]
    fn unimplemented_targets_report_not_implemented() {
        assert!(Architecture::C128.is_hardware_analyzer_available());
        let analyzer = create_hardware_analyzer(Architecture::C128, GlobalSymbolTable::new()).unwrap();
        assert!(analyzer.name().contains("Not Implemented"));
    }

    #[test]
    fn pal_ntsc_constants_match_spec() {
        let pal = TargetConfig::c64_pal();
        assert_eq!(pal.cycles_per_line, 63);
        assert_eq!(pal.lines_per_frame, 312);
        assert_eq!(pal.badline_cycles(), 23);

        let ntsc = TargetConfig::c64_ntsc();
        assert_eq!(ntsc.cycles_per_line, 65);
        assert_eq!(ntsc.lines_per_frame, 262);
    }
}
