//! Linear scan register allocator.
//!
//! Assigns physical registers to virtual registers using live range intervals.
//! Fixed-register ranges reserve their register for the whole interval, pinned
//! ranges are left alone, and everything else competes for the allocatable
//! pool. Values live across a call only receive registers the call does not
//! clobber; when nothing fits the range is spilled to a fresh slot.

use std::collections::{BTreeSet, HashMap};

use crate::liveness::{LiveRange, compute_live_ranges};
use crate::{Constraint, PReg, RegAllocInst, VReg};

/// Result of register allocation.
#[derive(Debug, Default)]
pub struct AllocResult {
    /// Maps VReg index to its assigned register. `None` for spilled and
    /// pinned VRegs.
    pub assignments: Vec<Option<PReg>>,
    /// Number of spill slots used.
    pub spill_slots: u32,
    /// Callee-saved registers handed out to free ranges.
    pub used_callee_saved: Vec<PReg>,
    /// Maps VReg index to spill slot number (0-based).
    pub spill_map: HashMap<u32, u32>,
    /// Fixed VRegs whose range spans a call that clobbers their own
    /// register. They still get that register; the caller has to split them.
    pub clobbered_fixed: Vec<VReg>,
}

struct Clobber {
    pos: u32,
    regs: Vec<PReg>,
}

/// Allocate physical registers for virtual registers using linear scan.
///
/// `constraints` is indexed by VReg number. `callee_saved` lists the members
/// of `allocatable` that survive calls; they are preferred for ranges that
/// span a call and avoided otherwise.
pub fn allocate<I: RegAllocInst>(
    insts: &[I],
    vreg_count: u32,
    constraints: &[Constraint],
    allocatable: &[PReg],
    callee_saved: &[PReg],
) -> AllocResult {
    let mut result = AllocResult {
        assignments: vec![None; vreg_count as usize],
        ..AllocResult::default()
    };
    if vreg_count == 0 {
        return result;
    }

    let ranges = compute_live_ranges(insts, vreg_count);

    let mut clobbers: Vec<Clobber> = Vec::new();
    let mut buf = Vec::new();
    for (i, inst) in insts.iter().enumerate() {
        buf.clear();
        inst.clobbers(&mut buf);
        if !buf.is_empty() {
            clobbers.push(Clobber {
                pos: i as u32,
                regs: buf.clone(),
            });
        }
    }

    // Fixed ranges block their register for other VRegs.
    let mut reserved: Vec<(PReg, u32, u32)> = Vec::new();
    let mut seen = vec![false; vreg_count as usize];
    for r in &ranges {
        seen[r.vreg.0 as usize] = true;
        if let Some(Constraint::Fixed(p)) = constraints.get(r.vreg.0 as usize) {
            reserved.push((*p, r.start, r.end));
        }
    }

    let mut used_callee: BTreeSet<PReg> = BTreeSet::new();
    // (end, preg) of currently live free ranges.
    let mut active: Vec<(u32, PReg)> = Vec::new();

    for range in &ranges {
        let v = range.vreg.0 as usize;
        match constraints.get(v).copied().unwrap_or(Constraint::Free) {
            Constraint::Fixed(p) => {
                result.assignments[v] = Some(p);
                if clobbers.iter().any(|c| spans(range, c) && c.regs.contains(&p)) {
                    result.clobbered_fixed.push(range.vreg);
                }
                continue;
            }
            Constraint::Pinned => continue,
            Constraint::Free => {}
        }

        active.retain(|&(end, _)| end > range.start);

        let spanned: Vec<&Clobber> = clobbers
            .iter()
            .filter(|c| spans(range, c))
            .collect();

        let usable = |p: PReg| {
            !active.iter().any(|&(_, q)| q == p)
                && !reserved
                    .iter()
                    .any(|&(q, s, e)| q == p && range.overlaps(s, e))
                && !spanned.iter().any(|c| c.regs.contains(&p))
        };

        let prefer_callee = !spanned.is_empty();
        let pick = allocatable
            .iter()
            .copied()
            .filter(|p| callee_saved.contains(p) == prefer_callee)
            .chain(
                allocatable
                    .iter()
                    .copied()
                    .filter(|p| callee_saved.contains(p) != prefer_callee),
            )
            .find(|&p| usable(p));

        match pick {
            Some(p) => {
                if callee_saved.contains(&p) {
                    used_callee.insert(p);
                }
                result.assignments[v] = Some(p);
                active.push((range.end, p));
            }
            None => spill(&mut result, range),
        }
    }

    // VRegs that never appear in the stream still need a home.
    for v in 0..vreg_count as usize {
        if seen[v] {
            continue;
        }
        match constraints.get(v).copied().unwrap_or(Constraint::Free) {
            Constraint::Fixed(p) => result.assignments[v] = Some(p),
            Constraint::Pinned => {}
            Constraint::Free => match allocatable.first() {
                Some(&p) => result.assignments[v] = Some(p),
                None => {
                    let slot = result.spill_slots;
                    result.spill_map.insert(v as u32, slot);
                    result.spill_slots += 1;
                }
            },
        }
    }

    result.used_callee_saved = used_callee.into_iter().collect();
    tracing::trace!(
        vregs = vreg_count,
        spills = result.spill_slots,
        clobbered_fixed = result.clobbered_fixed.len(),
        "linear scan finished"
    );
    result
}

/// The value is live before the call and still needed after it.
fn spans(range: &LiveRange, clobber: &Clobber) -> bool {
    range.start < clobber.pos && clobber.pos + 1 < range.end
}

fn spill(result: &mut AllocResult, range: &LiveRange) {
    let slot = result.spill_slots;
    result.spill_map.insert(range.vreg.0, slot);
    result.spill_slots += 1;
}
