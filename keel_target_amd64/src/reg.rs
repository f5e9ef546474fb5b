//! AMD64 register definitions.
//!
//! General-purpose registers map to `PReg` 0-15 by hardware number, SSE
//! registers to 16-31.

use keel_regalloc::PReg;

/// AMD64 general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Gpr {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

const GPRS: [Gpr; 16] = [
    Gpr::Rax,
    Gpr::Rcx,
    Gpr::Rdx,
    Gpr::Rbx,
    Gpr::Rsp,
    Gpr::Rbp,
    Gpr::Rsi,
    Gpr::Rdi,
    Gpr::R8,
    Gpr::R9,
    Gpr::R10,
    Gpr::R11,
    Gpr::R12,
    Gpr::R13,
    Gpr::R14,
    Gpr::R15,
];

impl Gpr {
    pub fn to_preg(self) -> PReg {
        PReg(self as u8)
    }

    pub fn from_preg(p: PReg) -> Option<Gpr> {
        GPRS.get(p.0 as usize).copied()
    }

    /// Display name for 64-bit register.
    pub fn name64(self) -> &'static str {
        match self {
            Gpr::Rax => "rax",
            Gpr::Rcx => "rcx",
            Gpr::Rdx => "rdx",
            Gpr::Rbx => "rbx",
            Gpr::Rsp => "rsp",
            Gpr::Rbp => "rbp",
            Gpr::Rsi => "rsi",
            Gpr::Rdi => "rdi",
            Gpr::R8 => "r8",
            Gpr::R9 => "r9",
            Gpr::R10 => "r10",
            Gpr::R11 => "r11",
            Gpr::R12 => "r12",
            Gpr::R13 => "r13",
            Gpr::R14 => "r14",
            Gpr::R15 => "r15",
        }
    }
}

/// SSE register `xmm0`-`xmm15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Xmm(pub u8);

impl Xmm {
    pub const COUNT: u8 = 16;
    const BASE: u8 = 16;

    pub fn to_preg(self) -> PReg {
        PReg(Self::BASE + self.0)
    }

    pub fn from_preg(p: PReg) -> Option<Xmm> {
        (Self::BASE..Self::BASE + Self::COUNT)
            .contains(&p.0)
            .then(|| Xmm(p.0 - Self::BASE))
    }
}

/// Assembler name of a platform register.
pub fn name(p: PReg) -> String {
    match (Gpr::from_preg(p), Xmm::from_preg(p)) {
        (Some(g), _) => g.name64().to_string(),
        (None, Some(x)) => format!("xmm{}", x.0),
        (None, None) => p.to_string(),
    }
}
