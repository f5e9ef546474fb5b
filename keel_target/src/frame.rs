//! Frame descriptors: GC and deoptimization snapshots.

use keel_ir::value::MethodRef;

use crate::value::{DescId, TargetValue};

/// A snapshot of one interpreter frame at an instrumented instruction.
///
/// Inlined frames are linked through `parent`, innermost first. Lowering
/// never edits a descriptor once interned in a
/// [`TargetMethod`](crate::method::TargetMethod); only a register split
/// redirects a recorded variable to its copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub parent: Option<DescId>,
    pub method: MethodRef,
    pub bci: u32,
    pub locals: Vec<TargetValue>,
    pub stack: Vec<TargetValue>,
}

impl FrameDescriptor {
    /// All values recorded by this frame, locals first.
    pub fn values(&self) -> impl Iterator<Item = &TargetValue> {
        self.locals.iter().chain(self.stack.iter())
    }
}
