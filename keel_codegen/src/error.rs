//! Faults that abort lowering of a single method.

use keel_regalloc::PReg;

/// Why a method could not be lowered.
///
/// None of these are recoverable for the method at hand: they indicate IR the
/// front end should never have produced, a platform table that disagrees with
/// itself, or a collaborator that broke its contract.
#[derive(Debug, thiserror::Error)]
pub enum LoweringError {
    #[error("builtin call with {0} arguments, expected 0, 1 or 2")]
    BuiltinArity(usize),
    #[error("source block b{0} has no target block")]
    UnmappedBlock(u32),
    #[error("source variable %{0} is not declared by the method")]
    UnmappedVariable(u32),
    #[error("block b{0} used in value position")]
    BlockInValuePosition(u32),
    #[error("constant {0} does not fit in a machine word")]
    ConstantOutOfRange(String),
    #[error("callee-save slot of {reg} computed at offset {computed}, platform table says {table}")]
    CalleeSaveOffsetMismatch { reg: PReg, computed: i32, table: i32 },
    #[error("platform table has no callee-save slot for {0}")]
    MissingCalleeSaveSlot(PReg),
    #[error("register allocator broke its contract: {0}")]
    AllocationContract(String),
    #[error("block layout is invalid: {0}")]
    InvalidLayout(String),
}

impl LoweringError {
    /// Whether the fault comes from the platform description rather than the
    /// method being compiled.
    pub fn is_abi_drift(&self) -> bool {
        matches!(
            self,
            LoweringError::CalleeSaveOffsetMismatch { .. } | LoweringError::MissingCalleeSaveSlot(_)
        )
    }
}
