//! The target method arena.

use std::collections::HashMap;

use keel_ir::types::Kind;

use crate::block::{TargetBlock, TargetBlockRole};
use crate::frame::FrameDescriptor;
use crate::inst::TargetInst;
use crate::location::{Location, SlotPurpose, StackSlot};
use crate::value::{BlockId, ConstId, DescId, TargetConstant, TargetValue, VarId};

/// A target variable and what is known about its placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetVar {
    pub kind: Kind,
    /// Location mandated before allocation. The allocator must not move it.
    pub fixed: Option<Location>,
    /// Final location. Equal to `fixed` when that is set.
    pub location: Option<Location>,
    /// Occupies a callee-saved register on entry and doubles as its shadow.
    /// The allocator never splits it: the epilogue restores the register
    /// from its repository.
    pub callee_saved_parameter: bool,
    /// Written by the frame setup itself (frame pointer, safepoint latch)
    /// rather than by the caller. The allocator starts its live range at the
    /// prologue even when no `Prologue` instruction lists it.
    pub defined_in_prologue: bool,
}

/// A lowered method: blocks, variables, constants and frame descriptors,
/// all owned here and referenced by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMethod {
    pub name: String,
    pub vars: Vec<TargetVar>,
    pub constants: Vec<TargetConstant>,
    pub blocks: Vec<TargetBlock>,
    pub descriptors: Vec<FrameDescriptor>,
    /// Emission order decided by layout. Empty until layout has run.
    pub order: Vec<BlockId>,
    /// Size in bytes of one stack slot.
    pub slot_size: u32,
    slots: Vec<StackSlot>,
    slot_index: HashMap<StackSlot, u32>,
}

impl TargetMethod {
    pub fn new(name: impl Into<String>, slot_size: u32) -> Self {
        Self {
            name: name.into(),
            vars: Vec::new(),
            constants: Vec::new(),
            blocks: Vec::new(),
            descriptors: Vec::new(),
            order: Vec::new(),
            slot_size,
            slots: Vec::new(),
            slot_index: HashMap::new(),
        }
    }

    // --- Variables ---

    pub fn new_var(&mut self, kind: Kind) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(TargetVar {
            kind,
            fixed: None,
            location: None,
            callee_saved_parameter: false,
            defined_in_prologue: false,
        });
        id
    }

    /// Create a variable whose location is decided now.
    pub fn new_fixed_var(&mut self, kind: Kind, location: Location) -> VarId {
        let location = self.canonical_location(location);
        let id = self.new_var(kind);
        let var = &mut self.vars[id.0 as usize];
        var.fixed = Some(location);
        var.location = Some(location);
        id
    }

    pub fn var(&self, id: VarId) -> &TargetVar {
        &self.vars[id.0 as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut TargetVar {
        &mut self.vars[id.0 as usize]
    }

    pub fn var_ids(&self) -> impl Iterator<Item = VarId> + use<> {
        (0..self.vars.len() as u32).map(VarId)
    }

    /// Kind of an operand.
    pub fn value_kind(&self, value: TargetValue) -> Kind {
        match value {
            TargetValue::Variable(v) => self.var(v).kind,
            TargetValue::Constant(c) => self.constant(c).kind,
            TargetValue::Method(_) => Kind::Word,
            TargetValue::Undefined(kind) => kind,
        }
    }

    /// Move every reference to `var` outside the `Prologue` instruction onto
    /// a fresh unfixed copy, defined right after the prologue. Frame
    /// descriptors are redirected to the copy as well, so `var` itself only
    /// lives from frame entry to the copy.
    pub fn split_after_prologue(&mut self, var: VarId) -> VarId {
        let kind = self.var(var).kind;
        let copy = self.new_var(kind);
        for block in &mut self.blocks {
            for inst in &mut block.insts {
                if !matches!(inst, TargetInst::Prologue { .. }) {
                    inst.rename_var(var, copy);
                }
            }
        }
        for desc in &mut self.descriptors {
            for v in desc.locals.iter_mut().chain(desc.stack.iter_mut()) {
                if v.as_var() == Some(var) {
                    *v = TargetValue::Variable(copy);
                }
            }
        }
        if let Some(prologue) = self.blocks.first_mut() {
            let at = prologue
                .insts
                .iter()
                .position(|i| matches!(i, TargetInst::Prologue { .. }))
                .map_or(0, |p| p + 1);
            prologue.insts.insert(
                at,
                TargetInst::Assign {
                    kind,
                    dst: copy,
                    src: TargetValue::Variable(var),
                },
            );
        }
        copy
    }

    // --- Constants ---

    /// Append a constant. Deduplication is the caller's business.
    pub fn new_constant(&mut self, constant: TargetConstant) -> ConstId {
        let id = ConstId(self.constants.len() as u32);
        self.constants.push(constant);
        id
    }

    pub fn constant(&self, id: ConstId) -> &TargetConstant {
        &self.constants[id.0 as usize]
    }

    // --- Blocks ---

    pub fn new_block(&mut self, role: TargetBlockRole) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(TargetBlock::new(role));
        id
    }

    pub fn block(&self, id: BlockId) -> &TargetBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut TargetBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + use<> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// The prologue block. Lowering always creates it first.
    pub fn prologue(&self) -> BlockId {
        BlockId(0)
    }

    pub fn push_inst(&mut self, block: BlockId, inst: TargetInst) {
        self.blocks[block.0 as usize].insts.push(inst);
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to.0 as usize].add_pred(from);
    }

    /// Blocks in emission order, or declaration order before layout.
    pub fn blocks_in_order(&self) -> Vec<BlockId> {
        if self.order.is_empty() {
            self.block_ids().collect()
        } else {
            self.order.clone()
        }
    }

    // --- Frame descriptors ---

    pub fn new_descriptor(&mut self, descriptor: FrameDescriptor) -> DescId {
        let id = DescId(self.descriptors.len() as u32);
        self.descriptors.push(descriptor);
        id
    }

    pub fn descriptor(&self, id: DescId) -> &FrameDescriptor {
        &self.descriptors[id.0 as usize]
    }

    /// Variables recorded by a descriptor and all its parents.
    pub fn descriptor_vars(&self, id: DescId, out: &mut Vec<VarId>) {
        let mut cur = Some(id);
        while let Some(d) = cur {
            let desc = self.descriptor(d);
            out.extend(desc.values().filter_map(|v| v.as_var()));
            cur = desc.parent;
        }
    }

    // --- Stack slots ---

    /// Register a stack slot and return its canonical index. The same
    /// (purpose, offset) pair always yields the same index.
    pub fn stack_slot(&mut self, purpose: SlotPurpose, offset: i32) -> u32 {
        let slot = StackSlot::new(purpose, offset);
        if let Some(&idx) = self.slot_index.get(&slot) {
            return idx;
        }
        let idx = self.slots.len() as u32;
        self.slots.push(slot);
        self.slot_index.insert(slot, idx);
        idx
    }

    /// Register the slot behind a location, if it is a stack location.
    pub fn canonical_location(&mut self, location: Location) -> Location {
        if let Location::Stack(slot) = location {
            self.stack_slot(slot.purpose, slot.offset);
        }
        location
    }

    pub fn slot(&self, index: u32) -> StackSlot {
        self.slots[index as usize]
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slots in the caller-owned incoming argument area.
    pub fn parameter_slots(&self) -> Vec<StackSlot> {
        self.slots
            .iter()
            .filter(|s| s.purpose == SlotPurpose::Parameter)
            .copied()
            .collect()
    }

    /// Slots owned by this frame (locals and spills).
    pub fn local_slots(&self) -> Vec<StackSlot> {
        self.slots
            .iter()
            .filter(|s| s.purpose != SlotPurpose::Parameter)
            .copied()
            .collect()
    }

    /// Frame size in bytes: the extent of all frame-owned slots, rounded up
    /// to `alignment`.
    pub fn frame_size(&self, alignment: u32) -> u32 {
        let extent = self
            .local_slots()
            .iter()
            .map(|s| s.offset.max(0) as u32 + self.slot_size)
            .max()
            .unwrap_or(0);
        let align = alignment.max(1);
        extent.div_ceil(align) * align
    }
}
