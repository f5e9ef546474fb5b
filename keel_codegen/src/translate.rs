//! Per-instruction lowering.

use keel_ir::actor::CallConv;
use keel_ir::instruction::{CallSite, FrameState, InfopointOpcode, Inst};
use keel_ir::method::BlockRole;
use keel_ir::types::Kind;
use keel_ir::value::{BlockRef, SourceValue};
use keel_target::abi::Abi;
use keel_target::frame::FrameDescriptor;
use keel_target::inst::{CallKind, TargetCall, TargetInst};
use keel_target::location::Location;
use keel_target::method::TargetMethod;
use keel_target::value::{DescId, TargetValue};

use crate::context::MethodTranslationContext;
use crate::error::LoweringError;

impl<'a> MethodTranslationContext<'a> {
    /// Translate every source block into its pre-created target block.
    pub fn lower(mut self) -> Result<TargetMethod, LoweringError> {
        let source = self.source;
        for b in source.block_refs() {
            self.translate_block(b)?;
        }
        tracing::debug!(
            method = %self.out.name,
            blocks = self.out.blocks.len(),
            vars = self.out.vars.len(),
            "lowering done"
        );
        Ok(self.out)
    }

    fn translate_block(&mut self, b: BlockRef) -> Result<(), LoweringError> {
        let source = self.source;
        let block = source.block(b);
        self.current = self.map.block(b)?;
        if block.role == BlockRole::ExceptionHandler
            && let Some(param) = block.exception_param
        {
            let param = self.resolve_var(param)?;
            let location = self.abi.catch_parameter_location();
            self.emit(TargetInst::Catch { param, location });
        }
        for inst in &block.insts {
            self.translate_inst(inst)?;
        }
        Ok(())
    }

    fn translate_inst(&mut self, inst: &Inst) -> Result<(), LoweringError> {
        match inst {
            Inst::Assign { dst, src } => {
                let src = self.resolve_value(src)?;
                let dst = self.resolve_var(*dst)?;
                let kind = self.out.var(dst).kind;
                self.emit(TargetInst::Assign { kind, dst, src });
            }
            Inst::Goto(target) => {
                let target = self.map.block(*target)?;
                self.add_jump(self.current, target);
            }
            Inst::Call(site) => self.translate_call(site)?,
            Inst::BuiltinCall(site) => self.translate_builtin(site)?,
            Inst::Throw(value) => self.translate_throw(value)?,
            Inst::Return(value) => self.translate_return(value.as_ref())?,
            Inst::Infopoint { opcode, dst, frame } => {
                let descriptor = self.frame_descriptor(frame)?;
                let captured = (*opcode == InfopointOpcode::Here).then(|| self.out.new_var(Kind::Word));
                self.emit(TargetInst::Infopoint {
                    opcode: *opcode,
                    dst: captured,
                    descriptor,
                });
                if let (Some(captured), Some(dst)) = (captured, dst) {
                    let dst = self.resolve_var(*dst)?;
                    let kind = self.out.var(dst).kind;
                    self.emit(TargetInst::Assign {
                        kind,
                        dst,
                        src: TargetValue::Variable(captured),
                    });
                }
            }
        }
        Ok(())
    }

    /// The convention and call kind for a call site.
    fn classify(&self, site: &CallSite) -> (&'a dyn Abi, CallKind) {
        let convention = match &site.callee {
            _ if site.native => CallConv::Native,
            SourceValue::Method(m) => self.actors.resolve(*m).convention,
            _ => CallConv::Managed,
        };
        let platform = self.platform;
        let abi: &'a dyn Abi = platform.abi(convention);
        let kind = if self.options.stencil {
            CallKind::RuntimeStencil
        } else {
            match convention {
                CallConv::Managed => CallKind::Managed,
                CallConv::Native => CallKind::Native,
            }
        };
        (abi, kind)
    }

    fn translate_call(&mut self, site: &CallSite) -> Result<(), LoweringError> {
        let (abi, kind) = self.classify(site);
        let callee = self.resolve_value(&site.callee)?;
        let mut args = Vec::with_capacity(site.args.len());
        let mut kinds = Vec::with_capacity(site.args.len());
        for arg in &site.args {
            let arg = self.resolve_value(arg)?;
            kinds.push(self.out.value_kind(arg));
            args.push(arg);
        }
        let arg_locations = abi.parameter_locations(&kinds);
        self.emit_call(site, abi, kind, callee, args, arg_locations)
    }

    fn translate_builtin(&mut self, site: &CallSite) -> Result<(), LoweringError> {
        let (abi, kind) = self.classify(site);
        let (callee, args, arg_locations) = match site.args.as_slice() {
            [] => (TargetValue::Method(self.actors.unlinked()), vec![], vec![]),
            [address] => (self.resolve_value(address)?, vec![], vec![]),
            [address, receiver] => {
                let callee = self.resolve_value(address)?;
                let receiver = self.resolve_value(receiver)?;
                (callee, vec![receiver], vec![abi.reference_parameter_location()])
            }
            args => return Err(LoweringError::BuiltinArity(args.len())),
        };
        self.emit_call(site, abi, kind, callee, args, arg_locations)
    }

    /// Emit the call proper, preceded by its `Try` and followed by the
    /// block split when the call has a handler.
    fn emit_call(
        &mut self,
        site: &CallSite,
        abi: &dyn Abi,
        kind: CallKind,
        callee: TargetValue,
        args: Vec<TargetValue>,
        arg_locations: Vec<Location>,
    ) -> Result<(), LoweringError> {
        let (result, result_location) = match site.result {
            Some(r) => {
                let r = self.resolve_var(r)?;
                (Some(r), abi.result_location(self.out.var(r).kind))
            }
            None => (None, None),
        };
        let descriptor = match (&site.frame, kind) {
            (_, CallKind::RuntimeStencil) | (None, _) => None,
            (Some(frame), _) => Some(self.frame_descriptor(frame)?),
        };
        let handler = site.catch.map(|h| self.map.block(h)).transpose()?;
        if let Some(handler) = handler {
            self.emit(TargetInst::Try {
                catch: Some(handler),
            });
            self.out.add_edge(self.current, handler);
        }
        self.emit(TargetInst::Call(TargetCall {
            kind,
            callee,
            args,
            arg_locations,
            result,
            result_location,
            descriptor,
        }));
        if handler.is_some() && callee != TargetValue::Method(self.actors.raise()) {
            self.split_block();
        }
        Ok(())
    }

    fn translate_throw(&mut self, value: &SourceValue) -> Result<(), LoweringError> {
        let throwable = self.resolve_value(value)?;
        let platform = self.platform;
        let managed = platform.abi(CallConv::Managed);
        let kind = if self.options.stencil {
            CallKind::RuntimeStencil
        } else {
            CallKind::Managed
        };
        self.emit(TargetInst::Try { catch: None });
        // The raise routine suspends stack scanning until the exception
        // reaches a handler, so the call has no frame descriptor.
        self.emit(TargetInst::Call(TargetCall {
            kind,
            callee: TargetValue::Method(self.actors.raise()),
            args: vec![throwable],
            arg_locations: managed.parameter_locations(&[Kind::Reference]),
            result: None,
            result_location: None,
            descriptor: None,
        }));
        Ok(())
    }

    fn translate_return(&mut self, value: Option<&SourceValue>) -> Result<(), LoweringError> {
        let value = value.map(|v| self.resolve_value(v)).transpose()?;
        if !self.options.shared_epilogue {
            self.emit_epilogue(self.current, value);
            return Ok(());
        }
        let epilogue = self.shared_epilogue();
        if let (Some(result), Some(value)) = (epilogue.result, value) {
            self.emit(TargetInst::Assign {
                kind: self.source.result_kind,
                dst: result,
                src: value,
            });
        }
        self.add_jump(self.current, epilogue.block);
        Ok(())
    }

    /// Intern the descriptor chain for a frame state, outermost frame first.
    fn frame_descriptor(&mut self, frame: &FrameState) -> Result<DescId, LoweringError> {
        let parent = match &frame.parent {
            Some(p) => Some(self.frame_descriptor(p)?),
            None => None,
        };
        let locals = frame
            .locals
            .iter()
            .map(|v| self.resolve_value(v))
            .collect::<Result<Vec<_>, _>>()?;
        let stack = frame
            .stack
            .iter()
            .map(|v| self.resolve_value(v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.out.new_descriptor(FrameDescriptor {
            parent,
            method: frame.method,
            bci: frame.bci,
            locals,
            stack,
        }))
    }
}
