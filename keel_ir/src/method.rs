//! Methods and basic blocks.

use crate::instruction::Inst;
use crate::types::Kind;
use crate::value::{BlockRef, MethodRef, SourceValue, VarRef};

/// Role of a source block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRole {
    Normal,
    /// Entered through an exception edge; binds the thrown value.
    ExceptionHandler,
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct Block {
    pub role: BlockRole,
    /// The formal receiving the exception (handler blocks only).
    pub exception_param: Option<VarRef>,
    pub insts: Vec<Inst>,
}

/// A method in the source IR.
#[derive(Debug, Clone)]
pub struct Method {
    pub actor: MethodRef,
    /// Formal parameters, in declaration order.
    pub params: Vec<VarRef>,
    pub result_kind: Kind,
    /// Variable arena: the kind of each variable.
    pub variables: Vec<Kind>,
    /// Block arena. Block 0 is the entry block.
    pub blocks: Vec<Block>,
}

impl Method {
    pub fn new(actor: MethodRef, result_kind: Kind) -> Self {
        Self {
            actor,
            params: Vec::new(),
            result_kind,
            variables: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn block(&self, r: BlockRef) -> &Block {
        &self.blocks[r.index() as usize]
    }

    pub fn entry_block(&self) -> BlockRef {
        BlockRef(0)
    }

    /// All blocks in declaration order.
    pub fn block_refs(&self) -> impl Iterator<Item = BlockRef> + '_ {
        (0..self.blocks.len() as u32).map(BlockRef)
    }

    pub fn var_kind(&self, var: VarRef) -> Kind {
        self.variables[var.index() as usize]
    }

    pub fn param_kinds(&self) -> Vec<Kind> {
        self.params.iter().map(|p| self.var_kind(*p)).collect()
    }

    /// The kind of an operand. Blocks and methods are addresses.
    pub fn value_kind(&self, value: &SourceValue) -> Kind {
        match value {
            SourceValue::Variable(v) => self.var_kind(*v),
            SourceValue::Constant(c) => c.kind,
            SourceValue::Block(_) | SourceValue::Method(_) => Kind::Word,
            SourceValue::Undefined(kind) => *kind,
        }
    }

    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }
}
