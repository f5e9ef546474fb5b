//! Per-method translation state: setup, register role variables,
//! callee-save bookkeeping and epilogue synthesis.

use std::collections::BTreeMap;

use keel_ir::actor::ActorTable;
use keel_ir::method::{BlockRole, Method};
use keel_ir::types::Kind;
use keel_ir::value::{SourceValue, VarRef};
use keel_regalloc::PReg;
use keel_target::abi::{Abi, Platform};
use keel_target::block::TargetBlockRole;
use keel_target::inst::TargetInst;
use keel_target::location::{Location, SlotPurpose, StackSlot};
use keel_target::method::TargetMethod;
use keel_target::value::{BlockId, TargetValue, VarId};

use crate::compile::LoweringOptions;
use crate::error::LoweringError;
use crate::mapping::{ValueMap, needs_materialized_zero};

/// A callee-saved register's bookkeeping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CalleeSave {
    pub reg: PReg,
    /// Holds the register's incoming value; fixed to the register.
    pub shadow: VarId,
    /// Fixed spill slot in the callee-save area.
    pub repository: VarId,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SharedEpilogue {
    pub block: BlockId,
    pub result: Option<VarId>,
}

/// Owns everything needed to lower one method. Created by
/// [`MethodTranslationContext::new`], which runs the method setup, and
/// consumed by [`MethodTranslationContext::lower`].
pub struct MethodTranslationContext<'a> {
    pub(crate) source: &'a Method,
    pub(crate) actors: &'a ActorTable,
    pub(crate) platform: &'a Platform,
    /// Convention the method itself is entered with.
    pub(crate) abi: &'a dyn Abi,
    pub(crate) options: LoweringOptions,
    pub(crate) out: TargetMethod,
    pub(crate) map: ValueMap,
    register_vars: BTreeMap<PReg, VarId>,
    pub(crate) callee_saves: Vec<CalleeSave>,
    pub(crate) result_location: Option<Location>,
    pub(crate) current: BlockId,
    pub(crate) shared_epilogue: Option<SharedEpilogue>,
}

impl<'a> MethodTranslationContext<'a> {
    /// Run the method setup: parameter homing, callee-save slots, the
    /// prologue block and one target block per source block.
    pub fn new(
        source: &'a Method,
        actors: &'a ActorTable,
        platform: &'a Platform,
        options: LoweringOptions,
    ) -> Result<Self, LoweringError> {
        let actor = actors.resolve(source.actor);
        let abi: &dyn Abi = platform.abi(actor.convention);
        let mut out = TargetMethod::new(actor.name.clone(), abi.slot_size());
        let prologue = out.new_block(TargetBlockRole::Prologue);

        let mut ctx = Self {
            source,
            actors,
            platform,
            abi,
            options,
            out,
            map: ValueMap::new(source.variables.len(), source.blocks.len()),
            register_vars: BTreeMap::new(),
            callee_saves: Vec::new(),
            result_location: abi.result_location(source.result_kind),
            current: prologue,
            shared_epilogue: None,
        };

        let latch = ctx.register_variable(abi.safepoint_latch(), Kind::Word);
        let fp = ctx.register_variable(abi.frame_pointer(), Kind::Word);
        let pending = ctx.bind_parameters()?;
        ctx.reserve_callee_saves()?;
        ctx.build_prologue(prologue, &pending, &[fp, latch]);

        for b in source.block_refs() {
            let role = match source.block(b).role {
                BlockRole::Normal => TargetBlockRole::Normal,
                BlockRole::ExceptionHandler => TargetBlockRole::ExceptionDispatch,
            };
            let id = ctx.out.new_block(role);
            ctx.map.bind_block(b, id)?;
        }
        let entry = ctx.map.block(source.entry_block())?;
        ctx.add_jump(prologue, entry);

        tracing::debug!(
            method = %ctx.out.name,
            params = source.params.len(),
            callee_saved = ctx.callee_saves.len(),
            "method setup done"
        );
        Ok(ctx)
    }

    /// The shared variable of a physical register, fixed to it.
    pub fn register_variable(&mut self, reg: PReg, kind: Kind) -> VarId {
        if let Some(&v) = self.register_vars.get(&reg) {
            return v;
        }
        let v = self.out.new_fixed_var(kind, Location::Register(reg));
        self.register_vars.insert(reg, v);
        v
    }

    /// Bind formals to their incoming locations. Returns the pending
    /// (raw, local, kind) copies of stack-passed references.
    fn bind_parameters(&mut self) -> Result<Vec<(VarId, VarId, Kind)>, LoweringError> {
        let source = self.source;
        let kinds = source.param_kinds();
        let locations = self.abi.parameter_locations(&kinds);
        let mut pending = Vec::new();
        for ((&param, &kind), location) in source.params.iter().zip(&kinds).zip(locations) {
            let var = match location {
                Location::Register(reg) => self.register_variable(reg, kind),
                Location::Stack(_) if kind.is_reference() => {
                    // The caller's argument area is not covered by this
                    // frame's root map.
                    let raw = self.out.new_fixed_var(kind, location);
                    let local = self.out.new_var(kind);
                    pending.push((raw, local, kind));
                    local
                }
                Location::Stack(_) => self.out.new_fixed_var(kind, location),
            };
            self.map.bind_var(param, var)?;
        }
        Ok(pending)
    }

    fn reserve_callee_saves(&mut self) -> Result<(), LoweringError> {
        let abi = self.abi;
        let slot_size = abi.slot_size() as i32;
        for (i, &reg) in abi.callee_saved().iter().enumerate() {
            let shadow = match self.register_vars.get(&reg) {
                Some(&v) => {
                    self.out.var_mut(v).callee_saved_parameter = true;
                    v
                }
                None => self.register_variable(reg, Kind::Word),
            };
            let computed = i as i32 * slot_size;
            let table = abi
                .callee_save_slot_offset(reg)
                .ok_or(LoweringError::MissingCalleeSaveSlot(reg))?;
            if table != computed {
                return Err(LoweringError::CalleeSaveOffsetMismatch {
                    reg,
                    computed,
                    table,
                });
            }
            let slot = StackSlot::new(SlotPurpose::Spill, computed);
            let repository = self.out.new_fixed_var(Kind::Word, Location::Stack(slot));
            self.callee_saves.push(CalleeSave {
                reg,
                shadow,
                repository,
            });
        }
        Ok(())
    }

    fn build_prologue(&mut self, block: BlockId, pending: &[(VarId, VarId, Kind)], roles: &[VarId]) {
        let mut defs: Vec<VarId> = self.register_vars.values().copied().collect();
        defs.extend(pending.iter().map(|&(raw, _, _)| raw));
        defs.sort();
        self.out.push_inst(block, TargetInst::Prologue { defs });
        for cs in self.callee_saves.clone() {
            self.out.push_inst(
                block,
                TargetInst::Assign {
                    kind: Kind::Word,
                    dst: cs.repository,
                    src: TargetValue::Variable(cs.shadow),
                },
            );
        }
        for &(raw, local, kind) in pending {
            self.out.push_inst(
                block,
                TargetInst::Assign {
                    kind,
                    dst: local,
                    src: TargetValue::Variable(raw),
                },
            );
        }
        for &v in roles {
            self.out.var_mut(v).defined_in_prologue = true;
        }
    }

    /// Append to the current block.
    pub(crate) fn emit(&mut self, inst: TargetInst) {
        self.out.push_inst(self.current, inst);
    }

    pub(crate) fn add_jump(&mut self, from: BlockId, to: BlockId) {
        self.out.push_inst(from, TargetInst::Jump { target: to });
        self.out.add_edge(from, to);
    }

    /// End the current block with a jump to a fresh block and continue there.
    pub(crate) fn split_block(&mut self) -> BlockId {
        let next = self.out.new_block(TargetBlockRole::Normal);
        tracing::trace!(from = %self.current, to = %next, "split block after throwing call");
        self.add_jump(self.current, next);
        self.current = next;
        next
    }

    pub(crate) fn resolve_var(&mut self, var: VarRef) -> Result<VarId, LoweringError> {
        let kind = self
            .source
            .variables
            .get(var.index() as usize)
            .copied()
            .ok_or(LoweringError::UnmappedVariable(var.index()))?;
        self.map.var(var, kind, &mut self.out)
    }

    /// Translate an operand. Wide and floating point zero literals get a
    /// fresh variable defined in the current block.
    pub(crate) fn resolve_value(&mut self, value: &SourceValue) -> Result<TargetValue, LoweringError> {
        match value {
            SourceValue::Variable(v) => self.resolve_var(*v).map(TargetValue::Variable),
            SourceValue::Constant(c) if needs_materialized_zero(c) => {
                let dst = self.out.new_var(c.kind);
                let idiom = self.abi.zero_idiom(c.kind);
                self.emit(TargetInst::MaterializeZero {
                    kind: c.kind,
                    dst,
                    idiom,
                });
                Ok(TargetValue::Variable(dst))
            }
            SourceValue::Constant(c) => self
                .map
                .constant(c, &mut self.out)
                .map(TargetValue::Constant),
            SourceValue::Block(b) => Err(LoweringError::BlockInValuePosition(b.index())),
            SourceValue::Method(m) => Ok(TargetValue::Method(*m)),
            SourceValue::Undefined(kind) => Ok(TargetValue::Undefined(*kind)),
        }
    }

    /// Restore callee-saved registers, tear down the frame and return.
    pub(crate) fn emit_epilogue(&mut self, block: BlockId, result: Option<TargetValue>) {
        for cs in self.callee_saves.clone() {
            self.out.push_inst(
                block,
                TargetInst::Assign {
                    kind: Kind::Word,
                    dst: cs.shadow,
                    src: TargetValue::Variable(cs.repository),
                },
            );
        }
        let uses = self.callee_saves.iter().map(|cs| cs.shadow).collect();
        let result_location = result.and(self.result_location);
        self.out.push_inst(
            block,
            TargetInst::Epilogue {
                result,
                result_location,
                uses,
            },
        );
        if !self.options.stencil {
            self.out.push_inst(block, TargetInst::Return);
        }
        tracing::trace!(block = %block, "epilogue synthesized");
    }

    /// The shared epilogue block, created on first use.
    pub(crate) fn shared_epilogue(&mut self) -> SharedEpilogue {
        if let Some(ep) = self.shared_epilogue {
            return ep;
        }
        let block = self.out.new_block(TargetBlockRole::Epilogue);
        let kind = self.source.result_kind;
        let result = (!kind.is_void()).then(|| self.out.new_var(kind));
        self.emit_epilogue(block, result.map(TargetValue::Variable));
        let ep = SharedEpilogue { block, result };
        self.shared_epilogue = Some(ep);
        ep
    }

    /// Repository slots of the callee-saved registers, in ABI order.
    pub fn callee_save_slots(&self) -> Vec<(PReg, Location)> {
        self.callee_saves
            .iter()
            .filter_map(|cs| self.out.var(cs.repository).fixed.map(|loc| (cs.reg, loc)))
            .collect()
    }

    /// The method as built so far.
    pub fn method(&self) -> &TargetMethod {
        &self.out
    }
}
