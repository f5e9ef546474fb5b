//! Register allocation contract and the stock linear scan allocator.

use keel_regalloc::allocator::allocate;
use keel_regalloc::{Constraint, OpKind, PReg, RegAllocInst, RegOp, VReg};
use keel_target::abi::{Abi, Platform};
use keel_target::inst::{CallKind, TargetInst};
use keel_target::location::{Location, SlotPurpose, StackSlot};
use keel_target::method::TargetMethod;
use keel_target::value::VarId;

use crate::error::LoweringError;

/// Assigns a location to every variable of a lowered method.
///
/// Implementations must locate every variable that has none, and must not
/// change a location fixed during lowering. They may add spill slots.
pub trait RegisterAllocator {
    fn allocate(
        &self,
        method: &mut TargetMethod,
        platform: &Platform,
        abi: &dyn Abi,
    ) -> Result<(), LoweringError>;
}

/// One entry of the linearized method handed to `keel_regalloc`.
#[derive(Debug, Default)]
struct LinearInst {
    ops: Vec<RegOp>,
    label: Option<u32>,
    targets: Vec<u32>,
    clobbers: Vec<PReg>,
    terminator: bool,
}

impl RegAllocInst for LinearInst {
    fn reg_operands(&self, ops: &mut Vec<RegOp>) {
        ops.extend_from_slice(&self.ops);
    }

    fn label_id(&self) -> Option<u32> {
        self.label
    }

    fn branch_targets(&self, targets: &mut Vec<u32>) {
        targets.extend_from_slice(&self.targets);
    }

    fn clobbers(&self, clobbers: &mut Vec<PReg>) {
        clobbers.extend_from_slice(&self.clobbers);
    }

    fn is_terminator(&self) -> bool {
        self.terminator
    }

    fn falls_through(&self) -> bool {
        !self.terminator
    }
}

fn clobbers(platform: &Platform, kind: CallKind) -> &[PReg] {
    match kind {
        CallKind::Native => platform.native.caller_saved(),
        CallKind::Managed | CallKind::RuntimeStencil => platform.managed.caller_saved(),
    }
}

fn linearize(method: &TargetMethod, platform: &Platform) -> Vec<LinearInst> {
    let mut out = Vec::new();
    let mut vars = Vec::new();
    let setup: Vec<VarId> = method
        .var_ids()
        .filter(|v| method.var(*v).defined_in_prologue)
        .collect();
    for b in method.block_ids() {
        out.push(LinearInst {
            label: Some(b.index()),
            ..LinearInst::default()
        });
        for inst in &method.block(b).insts {
            let mut li = LinearInst {
                terminator: inst.is_terminator(),
                ..LinearInst::default()
            };
            vars.clear();
            inst.uses(&mut vars);
            if let Some(d) = inst.descriptor() {
                method.descriptor_vars(d, &mut vars);
            }
            li.ops.extend(vars.iter().map(|v| use_op(*v)));
            vars.clear();
            inst.defs(&mut vars);
            if matches!(inst, TargetInst::Prologue { .. }) {
                let extra: Vec<VarId> =
                    setup.iter().copied().filter(|v| !vars.contains(v)).collect();
                vars.extend(extra);
            }
            li.ops.extend(vars.iter().map(|v| RegOp {
                vreg: VReg(v.index()),
                kind: OpKind::Def,
            }));
            let mut frame = None;
            match inst {
                TargetInst::Jump { target } => li.targets.push(target.index()),
                TargetInst::Try { catch: Some(h) } => li.targets.push(h.index()),
                TargetInst::Call(call) => {
                    li.clobbers = clobbers(platform, call.kind).to_vec();
                    frame = call.descriptor;
                }
                _ => {}
            }
            out.push(li);
            // The frame recorded by a call is walked while the callee runs,
            // so its values stay live until the call returns.
            if let Some(d) = frame {
                vars.clear();
                method.descriptor_vars(d, &mut vars);
                out.push(LinearInst {
                    ops: vars.iter().map(|v| use_op(*v)).collect(),
                    ..LinearInst::default()
                });
            }
        }
    }
    out
}

fn use_op(v: VarId) -> RegOp {
    RegOp {
        vreg: VReg(v.index()),
        kind: OpKind::Use,
    }
}

fn constraints(method: &TargetMethod) -> Vec<Constraint> {
    method
        .vars
        .iter()
        .map(|v| match v.fixed {
            Some(Location::Register(r)) => Constraint::Fixed(r),
            Some(Location::Stack(_)) => Constraint::Pinned,
            None => Constraint::Free,
        })
        .collect()
}

/// Whether a register-fixed variable can be moved off its register by a
/// copy at the prologue: it must be defined there by the caller, and its
/// register must not have to hold it until the epilogue.
fn splittable(method: &TargetMethod, abi: &dyn Abi, var: VarId) -> bool {
    let v = method.var(var);
    if v.callee_saved_parameter || v.defined_in_prologue {
        return false;
    }
    if let Some(Location::Register(r)) = v.fixed
        && abi.callee_saved().contains(&r)
    {
        return false;
    }
    method.block(method.prologue()).insts.iter().any(|inst| match inst {
        TargetInst::Prologue { defs } => defs.contains(&var),
        _ => false,
    })
}

/// Linear scan over the method linearized in declaration order.
///
/// Variables fixed to a register keep it for their whole live range;
/// variables fixed to the stack are left alone. A register-fixed parameter
/// that must survive a call clobbering its register is split first: a copy
/// made right after the prologue takes over its later uses and frame
/// descriptor entries, and competes for a register like any other value.
/// Spill slots follow the callee-save area.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearScanAllocator;

impl RegisterAllocator for LinearScanAllocator {
    fn allocate(
        &self,
        method: &mut TargetMethod,
        platform: &Platform,
        abi: &dyn Abi,
    ) -> Result<(), LoweringError> {
        let mut split: Vec<VarId> = Vec::new();
        let result = loop {
            let insts = linearize(method, platform);
            let result = allocate(
                &insts,
                method.vars.len() as u32,
                &constraints(method),
                &abi.allocatable(),
                abi.callee_saved(),
            );
            let ids: Vec<VarId> = method.var_ids().collect();
            let mut pending = Vec::new();
            for vreg in &result.clobbered_fixed {
                let id = ids[vreg.0 as usize];
                if split.contains(&id) {
                    continue;
                }
                if splittable(method, abi, id) {
                    pending.push(id);
                } else {
                    tracing::warn!(method = %method.name, var = %id, "fixed register clobbered by a call");
                }
            }
            if pending.is_empty() {
                break result;
            }
            for id in pending {
                let copy = method.split_after_prologue(id);
                tracing::trace!(method = %method.name, var = %id, copy = %copy, "split at prologue");
                split.push(id);
            }
        };

        let slot_size = abi.slot_size() as i32;
        let spill_base = abi.callee_saved().len() as i32 * slot_size;
        for id in method.var_ids() {
            if method.var(id).fixed.is_some() {
                continue;
            }
            let i = id.index() as usize;
            let location = match (result.assignments.get(i).copied().flatten(), result.spill_map.get(&id.index())) {
                (Some(reg), _) => Location::Register(reg),
                (None, Some(&slot)) => {
                    let offset = spill_base + slot as i32 * slot_size;
                    method.canonical_location(Location::Stack(StackSlot::new(SlotPurpose::Spill, offset)))
                }
                (None, None) => {
                    return Err(LoweringError::AllocationContract(format!(
                        "{id} received neither a register nor a spill slot"
                    )));
                }
            };
            method.var_mut(id).location = Some(location);
        }
        tracing::debug!(
            method = %method.name,
            spills = result.spill_slots,
            splits = split.len(),
            frame_size = method.frame_size(abi.frame_alignment()),
            "allocation done"
        );
        Ok(())
    }
}

/// Check the allocator contract against the fixed locations recorded before
/// allocation ran, and check that no frame descriptor records a value in a
/// register its own call clobbers.
pub fn verify_allocation(
    method: &TargetMethod,
    fixed_before: &[Option<Location>],
    platform: &Platform,
) -> Result<(), LoweringError> {
    if fixed_before.len() > method.vars.len() {
        return Err(LoweringError::AllocationContract(format!(
            "{} variables before allocation, {} after",
            fixed_before.len(),
            method.vars.len()
        )));
    }
    for id in method.var_ids() {
        let var = method.var(id);
        let Some(location) = var.location else {
            return Err(LoweringError::AllocationContract(format!("{id} has no location")));
        };
        if let Some(Some(fixed)) = fixed_before.get(id.index() as usize)
            && (var.fixed != Some(*fixed) || location != *fixed)
        {
            return Err(LoweringError::AllocationContract(format!(
                "{id} was fixed at {fixed} but ended at {location}"
            )));
        }
    }
    let mut vars = Vec::new();
    for b in method.block_ids() {
        for inst in &method.block(b).insts {
            let TargetInst::Call(call) = inst else {
                continue;
            };
            let Some(d) = call.descriptor else {
                continue;
            };
            let clobbered = clobbers(platform, call.kind);
            vars.clear();
            method.descriptor_vars(d, &mut vars);
            for &v in &vars {
                if let Some(location @ Location::Register(r)) = method.var(v).location
                    && clobbered.contains(&r)
                {
                    return Err(LoweringError::AllocationContract(format!(
                        "{v} recorded by {d} in {b} sits in {location}, which the call clobbers"
                    )));
                }
            }
        }
    }
    Ok(())
}
