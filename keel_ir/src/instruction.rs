//! Instruction definitions for the source IR.
//!
//! The instruction set is closed: lowering matches on it exhaustively.

use crate::value::{BlockRef, MethodRef, SourceValue, VarRef};

/// Flavor of an infopoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfopointOpcode {
    /// Poll point where another thread may request this thread to stop.
    Safepoint,
    /// Capture the address of this program location into a variable.
    Here,
    /// Record debug information only.
    Info,
}

/// Interpreter-level frame state at an instrumented instruction.
///
/// `parent` is set when the instruction belongs to an inlined callee: the
/// chain runs from the innermost frame outwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub method: MethodRef,
    /// Bytecode index of the instruction within `method`.
    pub bci: u32,
    pub locals: Vec<SourceValue>,
    pub stack: Vec<SourceValue>,
    pub parent: Option<Box<FrameState>>,
}

impl FrameState {
    pub fn new(method: MethodRef, bci: u32) -> Self {
        Self {
            method,
            bci,
            locals: Vec::new(),
            stack: Vec::new(),
            parent: None,
        }
    }

    pub fn with_locals(mut self, locals: Vec<SourceValue>) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_stack(mut self, stack: Vec<SourceValue>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_parent(mut self, parent: FrameState) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Number of frames in the chain, this one included.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }
}

/// A call site: method call or builtin call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Callee: a `Method` for direct calls, anything else for indirect calls.
    /// Builtin calls carry their callee in `args` and ignore this field.
    pub callee: SourceValue,
    pub args: Vec<SourceValue>,
    pub result: Option<VarRef>,
    /// Call through the platform's native convention.
    pub native: bool,
    /// Exception handler reached when the callee throws.
    pub catch: Option<BlockRef>,
    pub frame: Option<FrameState>,
}

impl CallSite {
    pub fn new(callee: impl Into<SourceValue>, args: Vec<SourceValue>) -> Self {
        Self {
            callee: callee.into(),
            args,
            result: None,
            native: false,
            catch: None,
            frame: None,
        }
    }

    pub fn returning(mut self, result: VarRef) -> Self {
        self.result = Some(result);
        self
    }

    pub fn native(mut self) -> Self {
        self.native = true;
        self
    }

    pub fn catching(mut self, handler: BlockRef) -> Self {
        self.catch = Some(handler);
        self
    }

    pub fn with_frame(mut self, frame: FrameState) -> Self {
        self.frame = Some(frame);
        self
    }
}

/// Source instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// dst = src
    Assign { dst: VarRef, src: SourceValue },
    /// Unconditional jump.
    Goto(BlockRef),
    /// Call of a method, native function or computed address.
    Call(CallSite),
    /// Call builtin, dispatched on argument count: `[]`, `[address]` or
    /// `[address, receiver]`.
    BuiltinCall(CallSite),
    /// Throw the given throwable.
    Throw(SourceValue),
    /// Return from the method, with a value unless the method is void.
    Return(Option<SourceValue>),
    /// Record machine state at this point.
    Infopoint {
        opcode: InfopointOpcode,
        /// Receives the captured address for `InfopointOpcode::Here`.
        dst: Option<VarRef>,
        frame: FrameState,
    },
}

impl Inst {
    /// Whether the instruction ends its block.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Goto(_) | Inst::Throw(_) | Inst::Return(_))
    }
}
