//! Liveness analysis for virtual registers.
//!
//! Ranges are single intervals over the linearized instruction stream. A range
//! that overlaps a loop (a backward branch and its target label) is stretched
//! over the whole loop, which is conservative but never too short.

use std::collections::HashMap;

use crate::{RegAllocInst, RegOp, VReg};

/// A live range for a single VReg: [start, end) in instruction indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRange {
    pub vreg: VReg,
    pub start: u32,
    pub end: u32,
}

impl LiveRange {
    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        self.start < end && start < self.end
    }
}

/// Compute one live range per mentioned VReg, sorted by start position.
pub fn compute_live_ranges<I: RegAllocInst>(insts: &[I], vreg_count: u32) -> Vec<LiveRange> {
    let mut bounds: Vec<Option<(u32, u32)>> = vec![None; vreg_count as usize];
    let mut labels: HashMap<u32, u32> = HashMap::new();
    let mut ops: Vec<RegOp> = Vec::new();

    for (i, inst) in insts.iter().enumerate() {
        let pos = i as u32;
        if let Some(id) = inst.label_id() {
            labels.insert(id, pos);
        }
        ops.clear();
        inst.reg_operands(&mut ops);
        for op in &ops {
            let slot = &mut bounds[op.vreg.0 as usize];
            *slot = Some(match *slot {
                None => (pos, pos + 1),
                Some((s, e)) => (s.min(pos), e.max(pos + 1)),
            });
        }
    }

    // Loops: (header position, backward branch position).
    let mut loops: Vec<(u32, u32)> = Vec::new();
    let mut targets = Vec::new();
    for (i, inst) in insts.iter().enumerate() {
        targets.clear();
        inst.branch_targets(&mut targets);
        for t in &targets {
            if let Some(&header) = labels.get(t)
                && header <= i as u32
            {
                loops.push((header, i as u32));
            }
        }
    }

    let mut changed = !loops.is_empty();
    while changed {
        changed = false;
        for (s, e) in bounds.iter_mut().flatten() {
            for &(header, latch) in &loops {
                if *s <= latch && header < *e && (*s > header || *e <= latch) {
                    *s = (*s).min(header);
                    *e = (*e).max(latch + 1);
                    changed = true;
                }
            }
        }
    }

    let mut ranges: Vec<LiveRange> = bounds
        .into_iter()
        .enumerate()
        .filter_map(|(v, b)| {
            b.map(|(start, end)| LiveRange {
                vreg: VReg(v as u32),
                start,
                end,
            })
        })
        .collect();
    ranges.sort_by_key(|r| (r.start, r.vreg));
    ranges
}
