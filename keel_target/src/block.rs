//! Target blocks.

use crate::inst::TargetInst;
use crate::value::BlockId;

/// Role of a target block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetBlockRole {
    Normal,
    Prologue,
    Epilogue,
    ExceptionDispatch,
}

/// A target basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBlock {
    pub role: TargetBlockRole,
    pub insts: Vec<TargetInst>,
    /// Predecessors in edge creation order, without duplicates.
    pub preds: Vec<BlockId>,
}

impl TargetBlock {
    pub fn new(role: TargetBlockRole) -> Self {
        Self {
            role,
            insts: Vec::new(),
            preds: Vec::new(),
        }
    }

    pub fn add_pred(&mut self, pred: BlockId) {
        if !self.preds.contains(&pred) {
            self.preds.push(pred);
        }
    }

    /// Whether the block already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.insts.last().is_some_and(TargetInst::is_terminator)
    }

    /// Targets of the block's jumps and exception edges.
    pub fn successors(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        for inst in &self.insts {
            let target = match inst {
                TargetInst::Jump { target } => Some(*target),
                TargetInst::Try { catch } => *catch,
                _ => None,
            };
            if let Some(t) = target
                && !out.contains(&t)
            {
                out.push(t);
            }
        }
        out
    }

    /// The target of the final unconditional jump, if the block ends in one.
    pub fn jump_target(&self) -> Option<BlockId> {
        match self.insts.last() {
            Some(TargetInst::Jump { target }) => Some(*target),
            _ => None,
        }
    }
}
