//! Block layout: the order blocks are emitted in.

use keel_target::block::TargetBlockRole;
use keel_target::method::TargetMethod;
use keel_target::value::BlockId;

use crate::error::LoweringError;

/// Decides block emission order.
///
/// The result must be a permutation of the method's blocks starting with
/// the prologue. Every edge is an explicit jump or exception edge, so any
/// such permutation keeps control flow intact.
pub trait BlockLayout {
    fn layout(&self, method: &TargetMethod) -> Vec<BlockId>;
}

/// Lays blocks out as chains of unconditional jumps.
///
/// The prologue chain comes first, then chains starting at exception
/// dispatch blocks, then the remaining chains in declaration order. The
/// epilogue block and the blocks that only lead into it close the method.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChainLayout;

impl ChainLayout {
    fn tail(method: &TargetMethod) -> Vec<BlockId> {
        let Some(epilogue) = method
            .block_ids()
            .find(|b| method.block(*b).role == TargetBlockRole::Epilogue)
        else {
            return Vec::new();
        };
        let mut tail = vec![epilogue];
        let mut head = epilogue;
        // Walk back through any unplaced predecessor that ends by jumping
        // into the current head, first in predecessor order.
        while let Some(pred) = method.block(head).preds.iter().copied().find(|p| {
            *p != method.prologue()
                && !tail.contains(p)
                && method.block(*p).jump_target() == Some(head)
        }) {
            tail.insert(0, pred);
            head = pred;
        }
        tail
    }
}

impl BlockLayout for ChainLayout {
    fn layout(&self, method: &TargetMethod) -> Vec<BlockId> {
        let n = method.blocks.len();
        let mut placed = vec![false; n];
        let tail = Self::tail(method);
        for b in &tail {
            placed[b.index() as usize] = true;
        }
        let mut order = Vec::with_capacity(n);

        let place_chain = |start: BlockId, order: &mut Vec<BlockId>, placed: &mut Vec<bool>| {
            let mut cur = Some(start);
            while let Some(b) = cur {
                if placed[b.index() as usize] {
                    break;
                }
                placed[b.index() as usize] = true;
                order.push(b);
                cur = method.block(b).jump_target();
            }
        };

        if n > 0 {
            place_chain(method.prologue(), &mut order, &mut placed);
        }
        let dispatch = method
            .block_ids()
            .filter(|b| method.block(*b).role == TargetBlockRole::ExceptionDispatch);
        let normal = method
            .block_ids()
            .filter(|b| method.block(*b).role != TargetBlockRole::ExceptionDispatch);
        for b in dispatch.chain(normal) {
            place_chain(b, &mut order, &mut placed);
        }
        order.extend(tail);
        order
    }
}

/// Check that `order` is a permutation of the blocks with the prologue first.
pub fn verify_layout(method: &TargetMethod, order: &[BlockId]) -> Result<(), LoweringError> {
    let n = method.blocks.len();
    if order.len() != n {
        return Err(LoweringError::InvalidLayout(format!(
            "{} blocks placed, method has {n}",
            order.len()
        )));
    }
    if n > 0 && order[0] != method.prologue() {
        return Err(LoweringError::InvalidLayout(format!(
            "{} placed first instead of the prologue",
            order[0]
        )));
    }
    let mut seen = vec![false; n];
    for b in order {
        match seen.get_mut(b.index() as usize) {
            Some(s) if !*s => *s = true,
            Some(_) => return Err(LoweringError::InvalidLayout(format!("{b} placed twice"))),
            None => return Err(LoweringError::InvalidLayout(format!("{b} does not exist"))),
        }
    }
    Ok(())
}
