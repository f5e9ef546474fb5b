//! Text form of the target IR.
//!
//! The output is stable: it depends only on the method's contents, so two
//! lowerings of the same source method print identically.

use std::fmt;

use keel_ir::instruction::InfopointOpcode;

use crate::block::TargetBlockRole;
use crate::inst::{CallKind, TargetCall, TargetInst, ZeroIdiom};
use crate::method::TargetMethod;

fn list<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for TargetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method @{} {{", self.name)?;
        for id in self.var_ids() {
            let var = self.var(id);
            write!(f, "  {id}: {}", var.kind)?;
            if let Some(loc) = var.location {
                write!(f, " @ {loc}")?;
            }
            if var.fixed.is_some() {
                f.write_str(" fixed")?;
            }
            if var.callee_saved_parameter {
                f.write_str(" csp")?;
            }
            if var.defined_in_prologue {
                f.write_str(" entry")?;
            }
            writeln!(f)?;
        }
        for (i, c) in self.constants.iter().enumerate() {
            writeln!(f, "  c{i} = {c}")?;
        }
        for (i, d) in self.descriptors.iter().enumerate() {
            write!(
                f,
                "  d{i} = frame m{}@{} locals[{}] stack[{}]",
                d.method.index(),
                d.bci,
                list(&d.locals),
                list(&d.stack)
            )?;
            if let Some(p) = d.parent {
                write!(f, " parent {p}")?;
            }
            writeln!(f)?;
        }
        for id in self.blocks_in_order() {
            let block = self.block(id);
            let role = match block.role {
                TargetBlockRole::Normal => "",
                TargetBlockRole::Prologue => " prologue",
                TargetBlockRole::Epilogue => " epilogue",
                TargetBlockRole::ExceptionDispatch => " dispatch",
            };
            writeln!(f, "{id}{role}: preds [{}]", list(&block.preds))?;
            for inst in &block.insts {
                writeln!(f, "    {inst}")?;
            }
        }
        f.write_str("}\n")
    }
}

fn opt<T: fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(|| "-".to_string(), |x| x.to_string())
}

fn fmt_call(call: &TargetCall, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = match call.kind {
        CallKind::Managed => "managed",
        CallKind::Native => "native",
        CallKind::RuntimeStencil => "stencil",
    };
    if let Some(r) = call.result {
        write!(f, "{r} = ")?;
    }
    write!(f, "call.{kind} {}(", call.callee)?;
    for (i, (arg, loc)) in call.args.iter().zip(&call.arg_locations).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg} -> {loc}")?;
    }
    f.write_str(")")?;
    if let Some(loc) = call.result_location {
        write!(f, " ret {loc}")?;
    }
    if let Some(d) = call.descriptor {
        write!(f, " {d}")?;
    }
    Ok(())
}

impl fmt::Display for TargetInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetInst::Assign { kind, dst, src } => write!(f, "{dst} = assign.{kind} {src}"),
            TargetInst::MaterializeZero { kind, dst, idiom } => {
                let idiom = match idiom {
                    ZeroIdiom::XorSelf => "xor",
                    ZeroIdiom::LoadImmediate => "imm",
                };
                write!(f, "{dst} = zero.{kind} {idiom}")
            }
            TargetInst::Call(call) => fmt_call(call, f),
            TargetInst::Try { catch } => write!(f, "try {}", opt(catch)),
            TargetInst::Catch { param, location } => write!(f, "{param} = catch {location}"),
            TargetInst::Infopoint {
                opcode,
                dst,
                descriptor,
            } => {
                let op = match opcode {
                    InfopointOpcode::Safepoint => "safepoint",
                    InfopointOpcode::Here => "here",
                    InfopointOpcode::Info => "info",
                };
                if let Some(d) = dst {
                    write!(f, "{d} = ")?;
                }
                write!(f, "infopoint.{op} {descriptor}")
            }
            TargetInst::Jump { target } => write!(f, "jump {target}"),
            TargetInst::Prologue { defs } => write!(f, "prologue [{}]", list(defs)),
            TargetInst::Epilogue {
                result,
                result_location,
                uses,
            } => {
                write!(f, "epilogue [{}]", list(uses))?;
                if let Some(r) = result {
                    write!(f, " ret {r} -> {}", opt(result_location))?;
                }
                Ok(())
            }
            TargetInst::Return => f.write_str("return"),
        }
    }
}

