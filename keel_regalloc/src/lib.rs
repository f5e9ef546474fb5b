//! keel_regalloc: register allocation over a linearized instruction stream.
//!
//! The allocator knows nothing about any particular IR. Callers flatten their
//! method into a sequence of instructions implementing [`RegAllocInst`],
//! with one label pseudo-instruction per block, and get back a register or a
//! spill slot per virtual register.

pub mod allocator;
pub mod liveness;


use std::fmt;

use serde::Deserialize;

/// How an instruction touches a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Use,
    Def,
    /// Read, then written.
    UseDef,
}

/// One register operand of an instruction.
#[derive(Debug, Clone, Copy)]
pub struct RegOp {
    pub vreg: VReg,
    pub kind: OpKind,
}

/// Placement constraint of a virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// The allocator picks a register or spills.
    Free,
    /// Must live in this physical register for its whole range.
    Fixed(PReg),
    /// Placed outside the allocator (e.g. a fixed stack slot); never assigned.
    Pinned,
}

/// What the allocator needs to know about an instruction.
pub trait RegAllocInst {
    /// Push every register operand onto `ops`.
    fn reg_operands(&self, ops: &mut Vec<RegOp>);

    /// Label number, for block label pseudo-instructions.
    fn label_id(&self) -> Option<u32>;

    /// Push the labels this instruction may transfer control to.
    fn branch_targets(&self, targets: &mut Vec<u32>);

    /// Push the registers destroyed by this instruction (calls).
    fn clobbers(&self, clobbers: &mut Vec<PReg>);

    fn is_terminator(&self) -> bool;

    fn falls_through(&self) -> bool;
}

/// A virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A physical register, numbered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct PReg(pub u8);

impl fmt::Display for PReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}
