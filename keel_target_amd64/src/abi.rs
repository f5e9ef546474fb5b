//! AMD64 calling conventions.
//!
//! The managed convention passes arguments like the System V ABI but keeps
//! `r14` as the safepoint latch. Both conventions use `rbp` as the frame
//! pointer.

use keel_regalloc::PReg;
use keel_target::abi::{Platform, RegisterConfig, ZeroIdiom};

use crate::reg::{Gpr, Xmm};

fn gprs(regs: &[Gpr]) -> Vec<PReg> {
    regs.iter().map(|r| r.to_preg()).collect()
}

fn xmms(range: std::ops::Range<u8>) -> Vec<PReg> {
    range.map(|i| Xmm(i).to_preg()).collect()
}

const INT_ARGS: [Gpr; 6] = [Gpr::Rdi, Gpr::Rsi, Gpr::Rdx, Gpr::Rcx, Gpr::R8, Gpr::R9];
const CALLEE_SAVED: [Gpr; 5] = [Gpr::Rbx, Gpr::R12, Gpr::R13, Gpr::R14, Gpr::R15];
const CALLER_SAVED: [Gpr; 9] = [
    Gpr::Rax,
    Gpr::Rcx,
    Gpr::Rdx,
    Gpr::Rsi,
    Gpr::Rdi,
    Gpr::R8,
    Gpr::R9,
    Gpr::R10,
    Gpr::R11,
];

fn base(name: &str) -> RegisterConfig {
    let mut caller_saved = gprs(&CALLER_SAVED);
    caller_saved.extend(xmms(0..Xmm::COUNT));
    RegisterConfig {
        name: name.to_string(),
        integer_args: gprs(&INT_ARGS),
        float_args: xmms(0..8),
        integer_result: Gpr::Rax.to_preg(),
        float_result: Xmm(0).to_preg(),
        callee_saved: gprs(&CALLEE_SAVED),
        caller_saved,
        safepoint_latch: Gpr::R14.to_preg(),
        frame_pointer: Gpr::Rbp.to_preg(),
        catch_parameter: Gpr::Rax.to_preg(),
        callee_save_area: gprs(&CALLEE_SAVED),
        slot_size: 8,
        frame_alignment: 16,
        // return address and saved rbp
        stack_arg_offset: 16,
        zero_idiom: ZeroIdiom::XorSelf,
    }
}

/// Convention between compiled managed methods.
pub fn managed_abi() -> RegisterConfig {
    base("amd64-managed")
}

/// System V AMD64 convention for native calls.
pub fn native_abi() -> RegisterConfig {
    base("amd64-sysv")
}

pub fn platform() -> Platform {
    Platform {
        name: "amd64".to_string(),
        managed: managed_abi(),
        native: native_abi(),
    }
}
