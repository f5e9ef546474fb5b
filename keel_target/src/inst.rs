//! Target instructions.

use keel_ir::instruction::InfopointOpcode;
use keel_ir::types::Kind;

use crate::location::Location;
use crate::value::{BlockId, DescId, TargetValue, VarId};

/// How a call is linked and entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Managed-to-managed call through the managed convention.
    Managed,
    /// Call through the platform's native convention.
    Native,
    /// Call emitted into a stencil; patched per use site, carries no
    /// frame descriptor.
    RuntimeStencil,
}

/// Platform idiom for producing an all-zero 64-bit or floating point value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroIdiom {
    /// `xor r, r` (or the vector equivalent).
    XorSelf,
    /// Load a zero immediate.
    LoadImmediate,
}

/// A lowered call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCall {
    pub kind: CallKind,
    pub callee: TargetValue,
    pub args: Vec<TargetValue>,
    /// Parallel to `args`.
    pub arg_locations: Vec<Location>,
    pub result: Option<VarId>,
    pub result_location: Option<Location>,
    pub descriptor: Option<DescId>,
}

/// Target IR instruction. Owned by exactly one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetInst {
    /// dst = src, moved at `kind` width.
    Assign {
        kind: Kind,
        dst: VarId,
        src: TargetValue,
    },
    /// dst = 0, using the platform idiom.
    MaterializeZero {
        kind: Kind,
        dst: VarId,
        idiom: ZeroIdiom,
    },
    Call(TargetCall),
    /// Marks the following call as covered by `catch`, or with `None` as the
    /// start of unwinding out of this frame.
    Try { catch: Option<BlockId> },
    /// Binds the in-flight exception at the head of a handler block.
    Catch { param: VarId, location: Location },
    Infopoint {
        opcode: InfopointOpcode,
        dst: Option<VarId>,
        descriptor: DescId,
    },
    Jump { target: BlockId },
    /// Frame setup. `defs` are the variables live on entry.
    Prologue { defs: Vec<VarId> },
    /// Frame teardown. `uses` are the restored callee-saved variables.
    Epilogue {
        result: Option<TargetValue>,
        result_location: Option<Location>,
        uses: Vec<VarId>,
    },
    Return,
}

impl TargetInst {
    pub fn is_terminator(&self) -> bool {
        matches!(self, TargetInst::Jump { .. } | TargetInst::Return)
    }

    /// Append the variables this instruction writes.
    pub fn defs(&self, out: &mut Vec<VarId>) {
        match self {
            TargetInst::Assign { dst, .. } | TargetInst::MaterializeZero { dst, .. } => {
                out.push(*dst)
            }
            TargetInst::Call(call) => out.extend(call.result),
            TargetInst::Catch { param, .. } => out.push(*param),
            TargetInst::Infopoint { dst, .. } => out.extend(*dst),
            TargetInst::Prologue { defs } => out.extend_from_slice(defs),
            TargetInst::Try { .. }
            | TargetInst::Jump { .. }
            | TargetInst::Epilogue { .. }
            | TargetInst::Return => {}
        }
    }

    /// Append the variables this instruction reads.
    ///
    /// Frame descriptor contents are not included; see
    /// [`TargetMethod::descriptor_vars`](crate::method::TargetMethod::descriptor_vars).
    pub fn uses(&self, out: &mut Vec<VarId>) {
        match self {
            TargetInst::Assign { src, .. } => out.extend(src.as_var()),
            TargetInst::Call(call) => {
                out.extend(call.callee.as_var());
                out.extend(call.args.iter().filter_map(|a| a.as_var()));
            }
            TargetInst::Epilogue { result, uses, .. } => {
                out.extend(result.and_then(|r| r.as_var()));
                out.extend_from_slice(uses);
            }
            TargetInst::MaterializeZero { .. }
            | TargetInst::Try { .. }
            | TargetInst::Catch { .. }
            | TargetInst::Infopoint { .. }
            | TargetInst::Jump { .. }
            | TargetInst::Prologue { .. }
            | TargetInst::Return => {}
        }
    }

    /// Point every read and write of `from` at `to`.
    pub fn rename_var(&mut self, from: VarId, to: VarId) {
        let var = |v: &mut VarId| {
            if *v == from {
                *v = to;
            }
        };
        let value = |v: &mut TargetValue| {
            if v.as_var() == Some(from) {
                *v = TargetValue::Variable(to);
            }
        };
        match self {
            TargetInst::Assign { dst, src, .. } => {
                var(dst);
                value(src);
            }
            TargetInst::MaterializeZero { dst, .. } => var(dst),
            TargetInst::Call(call) => {
                value(&mut call.callee);
                call.args.iter_mut().for_each(value);
                call.result.iter_mut().for_each(var);
            }
            TargetInst::Catch { param, .. } => var(param),
            TargetInst::Infopoint { dst, .. } => dst.iter_mut().for_each(var),
            TargetInst::Prologue { defs } => defs.iter_mut().for_each(var),
            TargetInst::Epilogue { result, uses, .. } => {
                result.iter_mut().for_each(value);
                uses.iter_mut().for_each(var);
            }
            TargetInst::Try { .. } | TargetInst::Jump { .. } | TargetInst::Return => {}
        }
    }

    /// The frame descriptor attached to this instruction, if any.
    pub fn descriptor(&self) -> Option<DescId> {
        match self {
            TargetInst::Call(call) => call.descriptor,
            TargetInst::Infopoint { descriptor, .. } => Some(*descriptor),
            _ => None,
        }
    }
}
