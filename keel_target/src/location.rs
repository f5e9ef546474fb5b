//! Storage locations assigned to target variables.

use std::fmt;

use keel_regalloc::PReg;

/// What a stack slot is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotPurpose {
    /// Incoming argument area, owned by the caller's frame.
    Parameter,
    /// Locally owned slot, covered by this frame's stack root map.
    Local,
    /// Allocator-owned slot in this frame.
    Spill,
}

/// A stack slot addressed by purpose and byte offset within its area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot {
    pub purpose: SlotPurpose,
    pub offset: i32,
}

impl StackSlot {
    pub fn new(purpose: SlotPurpose, offset: i32) -> Self {
        Self { purpose, offset }
    }
}

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Register(PReg),
    Stack(StackSlot),
}

impl Location {
    pub fn register(self) -> Option<PReg> {
        match self {
            Location::Register(r) => Some(r),
            Location::Stack(_) => None,
        }
    }

    pub fn is_stack(self) -> bool {
        matches!(self, Location::Stack(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(r) => write!(f, "{r}"),
            Location::Stack(s) => {
                let area = match s.purpose {
                    SlotPurpose::Parameter => "param",
                    SlotPurpose::Local => "local",
                    SlotPurpose::Spill => "spill",
                };
                write!(f, "[{area}{:+}]", s.offset)
            }
        }
    }
}
