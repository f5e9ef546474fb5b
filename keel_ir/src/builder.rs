//! Builder API for constructing source methods.

use crate::instruction::{CallSite, FrameState, InfopointOpcode, Inst};
use crate::method::{Block, BlockRole, Method};
use crate::types::Kind;
use crate::value::{BlockRef, SourceValue, VarRef};

/// Builder for constructing a method's IR.
pub struct Builder<'a> {
    method: &'a mut Method,
    current_block: Option<BlockRef>,
}

impl<'a> Builder<'a> {
    pub fn new(method: &'a mut Method) -> Self {
        Self {
            method,
            current_block: None,
        }
    }

    /// Create a new basic block and return its reference.
    pub fn create_block(&mut self) -> BlockRef {
        self.push_block(BlockRole::Normal, None)
    }

    /// Create an exception handler block binding a fresh `Reference` formal.
    pub fn create_handler_block(&mut self) -> (BlockRef, VarRef) {
        let param = self.var(Kind::Reference);
        let block = self.push_block(BlockRole::ExceptionHandler, Some(param));
        (block, param)
    }

    fn push_block(&mut self, role: BlockRole, exception_param: Option<VarRef>) -> BlockRef {
        let idx = self.method.blocks.len() as u32;
        self.method.blocks.push(Block {
            role,
            exception_param,
            insts: Vec::new(),
        });
        BlockRef(idx)
    }

    /// Set the current block for subsequent instructions.
    pub fn switch_to_block(&mut self, block: BlockRef) {
        self.current_block = Some(block);
    }

    /// Allocate a fresh variable.
    pub fn var(&mut self, kind: Kind) -> VarRef {
        let idx = self.method.variables.len() as u32;
        self.method.variables.push(kind);
        VarRef(idx)
    }

    /// Declare the next formal parameter.
    pub fn param(&mut self, kind: Kind) -> VarRef {
        let var = self.var(kind);
        self.method.params.push(var);
        var
    }

    fn push_inst(&mut self, inst: Inst) {
        let bb = self
            .current_block
            .expect("switch_to_block must be called before emitting");
        self.method.blocks[bb.0 as usize].insts.push(inst);
    }

    pub fn assign(&mut self, dst: VarRef, src: impl Into<SourceValue>) {
        self.push_inst(Inst::Assign {
            dst,
            src: src.into(),
        });
    }

    pub fn goto(&mut self, target: BlockRef) {
        self.push_inst(Inst::Goto(target));
    }

    pub fn call(&mut self, site: CallSite) {
        self.push_inst(Inst::Call(site));
    }

    pub fn builtin_call(&mut self, site: CallSite) {
        self.push_inst(Inst::BuiltinCall(site));
    }

    pub fn throw(&mut self, throwable: impl Into<SourceValue>) {
        self.push_inst(Inst::Throw(throwable.into()));
    }

    pub fn ret(&mut self, value: Option<SourceValue>) {
        self.push_inst(Inst::Return(value));
    }

    pub fn infopoint(&mut self, opcode: InfopointOpcode, dst: Option<VarRef>, frame: FrameState) {
        self.push_inst(Inst::Infopoint { opcode, dst, frame });
    }
}
