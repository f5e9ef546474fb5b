//! Diagnostic hooks around the compilation phases.

use std::fmt;

use keel_target::method::TargetMethod;

/// A compilation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Lowering,
    Allocation,
    Layout,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Lowering => "lowering",
            Phase::Allocation => "allocation",
            Phase::Layout => "layout",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Before,
    After,
}

/// Receives a snapshot of the method around every phase. Observers only
/// look; they cannot change the outcome of a compilation.
pub trait Observer {
    fn notify(&self, phase: Phase, stage: Stage, method: &TargetMethod);
}

/// Logs the target IR text at `trace` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notify(&self, phase: Phase, stage: Stage, method: &TargetMethod) {
        tracing::trace!(%phase, ?stage, method = %method.name, "\n{method}");
    }
}
