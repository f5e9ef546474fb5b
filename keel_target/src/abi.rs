//! Calling convention descriptions.
//!
//! Lowering never hard-codes register roles: everything it needs about a
//! platform comes through the [`Abi`] trait. [`RegisterConfig`] is the
//! data-driven implementation, and a [`Platform`] bundles one per
//! [`CallConv`].

use std::collections::HashSet;

use keel_ir::actor::CallConv;
use keel_ir::types::Kind;
use keel_regalloc::PReg;
use serde::Deserialize;

pub use crate::inst::ZeroIdiom;
use crate::location::{Location, SlotPurpose, StackSlot};

/// Register roles and argument passing rules of one calling convention.
pub trait Abi {
    /// Locations of the given parameter kinds, in declaration order.
    fn parameter_locations(&self, kinds: &[Kind]) -> Vec<Location>;

    /// Location of a result of `kind`, `None` for `Void`.
    fn result_location(&self, kind: Kind) -> Option<Location>;

    fn callee_saved(&self) -> &[PReg];

    fn caller_saved(&self) -> &[PReg];

    /// Register polled at safepoints.
    fn safepoint_latch(&self) -> PReg;

    fn frame_pointer(&self) -> PReg;

    /// Where the in-flight exception is delivered to a handler.
    fn catch_parameter_location(&self) -> Location;

    /// Offset of `reg`'s save slot in the callee-save area, as laid out by
    /// the platform table. `None` if the table has no slot for it.
    fn callee_save_slot_offset(&self, reg: PReg) -> Option<i32>;

    /// Size in bytes of one stack slot.
    fn slot_size(&self) -> u32;

    /// Required alignment of the frame size in bytes.
    fn frame_alignment(&self) -> u32;

    /// How to materialize a zero of `kind`.
    fn zero_idiom(&self, kind: Kind) -> ZeroIdiom;

    /// Registers the allocator may hand out.
    fn allocatable(&self) -> Vec<PReg> {
        let reserved = [self.frame_pointer(), self.safepoint_latch()];
        self.caller_saved()
            .iter()
            .chain(self.callee_saved())
            .copied()
            .filter(|r| !reserved.contains(r))
            .collect()
    }

    /// Location of the receiver of a builtin taking a single reference.
    fn reference_parameter_location(&self) -> Location {
        match self.parameter_locations(&[Kind::Reference]).as_slice() {
            [loc, ..] => *loc,
            [] => Location::Stack(StackSlot::new(SlotPurpose::Parameter, 0)),
        }
    }
}

/// Errors from loading or validating a register table.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed register table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("register {0} appears more than once in {1}")]
    DuplicateRegister(PReg, &'static str),
    #[error("slot size must be non-zero")]
    ZeroSlotSize,
    #[error("frame alignment {0} is not a power of two")]
    BadAlignment(u32),
}

/// A calling convention described by data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterConfig {
    pub name: String,
    /// Registers for integral, word and reference arguments, in order.
    pub integer_args: Vec<PReg>,
    /// Registers for floating point arguments, in order.
    pub float_args: Vec<PReg>,
    pub integer_result: PReg,
    pub float_result: PReg,
    pub callee_saved: Vec<PReg>,
    pub caller_saved: Vec<PReg>,
    pub safepoint_latch: PReg,
    pub frame_pointer: PReg,
    pub catch_parameter: PReg,
    /// Save area order of the callee-saved registers. Slot `i` lives at
    /// offset `i * slot_size`.
    pub callee_save_area: Vec<PReg>,
    pub slot_size: u32,
    pub frame_alignment: u32,
    /// Byte offset of the first stack-passed argument.
    #[serde(default)]
    pub stack_arg_offset: i32,
    #[serde(default = "default_zero_idiom")]
    pub zero_idiom: ZeroIdiom,
}

fn default_zero_idiom() -> ZeroIdiom {
    ZeroIdiom::LoadImmediate
}

impl RegisterConfig {
    /// Parse and validate a register table.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RegisterConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_size == 0 {
            return Err(ConfigError::ZeroSlotSize);
        }
        if !self.frame_alignment.is_power_of_two() {
            return Err(ConfigError::BadAlignment(self.frame_alignment));
        }
        let lists: [(&[PReg], &'static str); 5] = [
            (&self.integer_args, "integer_args"),
            (&self.float_args, "float_args"),
            (&self.callee_saved, "callee_saved"),
            (&self.caller_saved, "caller_saved"),
            (&self.callee_save_area, "callee_save_area"),
        ];
        for (regs, what) in lists {
            let mut seen = HashSet::new();
            for r in regs {
                if !seen.insert(*r) {
                    return Err(ConfigError::DuplicateRegister(*r, what));
                }
            }
        }
        Ok(())
    }
}

impl Abi for RegisterConfig {
    fn parameter_locations(&self, kinds: &[Kind]) -> Vec<Location> {
        let mut ints = self.integer_args.iter();
        let mut floats = self.float_args.iter();
        let mut stack_offset = self.stack_arg_offset;
        kinds
            .iter()
            .map(|kind| {
                let reg = if kind.is_floating() {
                    floats.next()
                } else {
                    ints.next()
                };
                match reg {
                    Some(r) => Location::Register(*r),
                    None => {
                        let slot = StackSlot::new(SlotPurpose::Parameter, stack_offset);
                        stack_offset += self.slot_size as i32;
                        Location::Stack(slot)
                    }
                }
            })
            .collect()
    }

    fn result_location(&self, kind: Kind) -> Option<Location> {
        if kind.is_void() {
            None
        } else if kind.is_floating() {
            Some(Location::Register(self.float_result))
        } else {
            Some(Location::Register(self.integer_result))
        }
    }

    fn callee_saved(&self) -> &[PReg] {
        &self.callee_saved
    }

    fn caller_saved(&self) -> &[PReg] {
        &self.caller_saved
    }

    fn safepoint_latch(&self) -> PReg {
        self.safepoint_latch
    }

    fn frame_pointer(&self) -> PReg {
        self.frame_pointer
    }

    fn catch_parameter_location(&self) -> Location {
        Location::Register(self.catch_parameter)
    }

    fn callee_save_slot_offset(&self, reg: PReg) -> Option<i32> {
        self.callee_save_area
            .iter()
            .position(|r| *r == reg)
            .map(|i| i as i32 * self.slot_size as i32)
    }

    fn slot_size(&self) -> u32 {
        self.slot_size
    }

    fn frame_alignment(&self) -> u32 {
        self.frame_alignment
    }

    fn zero_idiom(&self, _kind: Kind) -> ZeroIdiom {
        self.zero_idiom
    }
}

/// The calling conventions of one platform.
#[derive(Debug, Clone)]
pub struct Platform {
    pub name: String,
    pub managed: RegisterConfig,
    pub native: RegisterConfig,
}

impl Platform {
    pub fn abi(&self, convention: CallConv) -> &RegisterConfig {
        match convention {
            CallConv::Managed => &self.managed,
            CallConv::Native => &self.native,
        }
    }
}
