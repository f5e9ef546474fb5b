//! The compilation driver: lowering, allocation and layout of one method
//! at a time.

use keel_ir::actor::ActorTable;
use keel_ir::method::Method;
use keel_target::abi::{Abi, Platform};
use keel_target::location::Location;
use keel_target::method::TargetMethod;

use crate::context::MethodTranslationContext;
use crate::error::LoweringError;
use crate::layout::{BlockLayout, ChainLayout, verify_layout};
use crate::observer::{Observer, Phase, Stage};
use crate::regalloc::{LinearScanAllocator, RegisterAllocator, verify_allocation};

/// Per-compilation switches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoweringOptions {
    /// Produce a stencil: calls are patched per use site and carry no frame
    /// descriptor, and epilogues do not return.
    pub stencil: bool,
    /// Route every return through one epilogue block.
    pub shared_epilogue: bool,
}

/// Drives methods through lowering, register allocation and layout.
pub struct Compiler {
    platform: Platform,
    options: LoweringOptions,
    allocator: Box<dyn RegisterAllocator>,
    layout: Box<dyn BlockLayout>,
    observers: Vec<Box<dyn Observer>>,
}

impl Compiler {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            options: LoweringOptions::default(),
            allocator: Box::new(LinearScanAllocator),
            layout: Box::new(ChainLayout),
            observers: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: LoweringOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_allocator(mut self, allocator: impl RegisterAllocator + 'static) -> Self {
        self.allocator = Box::new(allocator);
        self
    }

    pub fn with_layout(mut self, layout: impl BlockLayout + 'static) -> Self {
        self.layout = Box::new(layout);
        self
    }

    pub fn add_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn options(&self) -> LoweringOptions {
        self.options
    }

    fn notify(&self, phase: Phase, stage: Stage, method: &TargetMethod) {
        for o in &self.observers {
            o.notify(phase, stage, method);
        }
    }

    /// Lower a method without allocating or laying it out.
    pub fn lower_method(
        &self,
        method: &Method,
        actors: &ActorTable,
    ) -> Result<TargetMethod, LoweringError> {
        let ctx = MethodTranslationContext::new(method, actors, &self.platform, self.options)?;
        self.notify(Phase::Lowering, Stage::Before, ctx.method());
        let lowered = ctx.lower()?;
        self.notify(Phase::Lowering, Stage::After, &lowered);
        Ok(lowered)
    }

    /// Lower, allocate and lay out one method.
    pub fn translate_method(
        &self,
        method: &Method,
        actors: &ActorTable,
    ) -> Result<TargetMethod, LoweringError> {
        let mut target = self.lower_method(method, actors)?;
        let abi: &dyn Abi = self.platform.abi(actors.resolve(method.actor).convention);

        self.notify(Phase::Allocation, Stage::Before, &target);
        let fixed: Vec<Option<Location>> = target.vars.iter().map(|v| v.fixed).collect();
        self.allocator.allocate(&mut target, &self.platform, abi)?;
        verify_allocation(&target, &fixed, &self.platform)?;
        self.notify(Phase::Allocation, Stage::After, &target);

        self.notify(Phase::Layout, Stage::Before, &target);
        let order = self.layout.layout(&target);
        verify_layout(&target, &order)?;
        target.order = order;
        self.notify(Phase::Layout, Stage::After, &target);

        tracing::debug!(method = %target.name, "method compiled");
        Ok(target)
    }

    /// Translate a batch of methods. A fault aborts only the method it
    /// occurs in.
    pub fn translate_all(
        &self,
        methods: &[Method],
        actors: &ActorTable,
    ) -> Vec<Result<TargetMethod, LoweringError>> {
        methods
            .iter()
            .map(|m| {
                let result = self.translate_method(m, actors);
                if let Err(e) = &result {
                    tracing::warn!(
                        method = %actors.resolve(m.actor).name,
                        abi_drift = e.is_abi_drift(),
                        "bailout: {e}"
                    );
                }
                result
            })
            .collect()
    }
}
