//! Error types for the compiler core.
//!
//! Every error carries a source location when one is available, per the
//! taxonomy in the specification: lexical/syntactic errors are surfaced
//! unchanged from the (out-of-scope) parser, everything from symbol
//! resolution onward is owned by this crate.

use thiserror::Error;

use crate::types::SourceLocation;

/// A semantic-analysis error (unresolved names, type mismatches, narrowing,
/// array-size inference failures, malformed address-of expressions).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    /// Reference to a name that has no visible symbol.
    #[error("{location}: unresolved name '{name}'")]
    UnresolvedName {
        /// The unresolved identifier.
        name: String,
        /// Where the reference occurred.
        location: SourceLocation,
    },

    /// Assigning a value whose type cannot be converted to the target type.
    #[error("{location}: type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected type, rendered for display.
        expected: String,
        /// Actual type, rendered for display.
        found: String,
        /// Where the mismatch occurred.
        location: SourceLocation,
    },

    /// A `word -> byte` narrowing was attempted without an explicit cast.
    #[error("{location}: narrowing conversion from {from} to {to} requires an explicit cast")]
    NarrowingWithoutCast {
        /// Source type.
        from: String,
        /// Target type.
        to: String,
        /// Where the conversion occurred.
        location: SourceLocation,
    },

    /// Array size could not be inferred.
    #[error("{location}: cannot infer array size: {reason}")]
    ArraySizeInference {
        /// One of "no initializer provided", "non-literal initializer", or
        /// "empty array literal".
        reason: &'static str,
        /// Where the declaration occurred.
        location: SourceLocation,
    },

    /// An array element type that is not a primitive.
    #[error("{location}: array element type must be primitive, found {found}")]
    NonPrimitiveElementType {
        /// The offending element type, rendered for display.
        found: String,
        /// Where the declaration occurred.
        location: SourceLocation,
    },

    /// A memory-mapped address expression that is not a numeric word.
    #[error("{location}: address must be a numeric word expression")]
    NonNumericAddress {
        /// Where the declaration occurred.
        location: SourceLocation,
    },

    /// `@literal` or `@(expr)` — address-of requires a named symbol operand.
    #[error("{location}: address-of operator requires a named symbol, not an expression")]
    AddressOfRequiresName {
        /// Where the address-of expression occurred.
        location: SourceLocation,
    },

    /// A numeric literal exceeds the widest representable type (word, 16-bit).
    #[error("{location}: literal {value} is out of range for a word (0..=65535)")]
    LiteralOutOfRange {
        /// The offending literal value.
        value: i64,
        /// Where the literal occurred.
        location: SourceLocation,
    },
}

/// Module-dependency-graph errors (abort the whole orchestrator run).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleGraphError {
    /// An import target does not exist among the modules given to the orchestrator.
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    /// A cycle was found in the import graph.
    ///
    /// The message renders the cycle as `A -> B -> ... -> A`.
    #[error("Circular import detected: {}", .0.join(" -> "))]
    CircularImport(Vec<String>),
}

/// IL-invariant violations. These are treated as compiler bugs: they should
/// never be reachable from valid source input, and are fatal when they occur.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IlError {
    /// The same register id was used as the `result` of two instructions.
    #[error("register r{0} is defined multiple times")]
    DuplicateRegisterDefinition(u32),

    /// A non-empty block does not end in a terminator instruction.
    #[error("block '{0}' in function '{1}' is missing a terminator")]
    MissingTerminator(String, String),

    /// A `JUMP`/`BRANCH` refers to a label with no corresponding block.
    #[error("dangling block reference '{0}' in function '{1}'")]
    DanglingBlockReference(String, String),

    /// A register was read before any instruction defines it on all paths
    /// reaching the use.
    #[error("register r{0} used in function '{1}' does not dominate its use")]
    UseBeforeDef(u32, String),

    /// `LOAD_ADDRESS` referenced a symbol absent from the module symbol table,
    /// or present with the wrong kind.
    #[error("address-of target '{0}' has no matching {1} symbol in module '{2}'")]
    UnresolvedAddressOfTarget(String, &'static str, String),

    /// A hardware address did not fit in 16 bits.
    #[error("hardware address ${0:04X} does not fit in 16 bits")]
    AddressOutOfRange(u32),
}

/// Errors from the external-assembler driver (C10).
#[derive(Error, Debug, Clone)]
pub enum AssemblerError {
    /// No assembler binary was found on `$PATH` or in the well-known install
    /// directories searched.
    #[error("no 6502 assembler found; searched {searched:?}.\n{hint}")]
    NotFound {
        /// Every path that was probed.
        searched: Vec<String>,
        /// Platform-specific installation hint.
        hint: String,
    },

    /// The assembler process exited with a non-zero status.
    #[error("assembler exited with status {exit_code}: {stderr}")]
    AssemblyFailed {
        /// Process exit code.
        exit_code: i32,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
        /// The assembly source that was handed to the assembler.
        source: String,
    },

    /// The assembler did not finish within the configured timeout.
    #[error("assembler timed out after {timeout_secs}s running: {command_line}")]
    Timeout {
        /// Timeout that was exceeded, in seconds.
        timeout_secs: u64,
        /// The command line that was run.
        command_line: String,
    },

    /// Reading or writing the temp directory, source, or output files failed.
    #[error("assembler I/O error: {0}")]
    Io(String),
}

/// Top-level error type aggregating every concern in the compiler core.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A semantic-analysis error.
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    /// A module-dependency-graph error.
    #[error(transparent)]
    ModuleGraph(#[from] ModuleGraphError),

    /// An IL-invariant violation (compiler bug).
    #[error("internal compiler error: {0}")]
    Il(#[from] IlError),

    /// An external-assembler error.
    #[error(transparent)]
    Assembler(#[from] AssemblerError),

    /// A hardware-analyzer factory error (e.g. requesting an analyzer for
    /// the `Generic` target, which has none).
    #[error("no hardware analyzer available for target {0}")]
    NoHardwareAnalyzer(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
