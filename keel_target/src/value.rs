//! Handles and operand values of the target IR.

use std::fmt;

use keel_ir::types::Kind;
use keel_ir::value::MethodRef;

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw index into the owning arena.
            pub fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

handle!(
    /// A pre-allocation variable (virtual register).
    VarId,
    "v"
);
handle!(
    /// A target block.
    BlockId,
    "b"
);
handle!(
    /// An interned target constant.
    ConstId,
    "c"
);
handle!(
    /// A frame descriptor.
    DescId,
    "d"
);

/// Bit payload of a target constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstPayload {
    /// Raw bits, zero-extended to 64.
    Bits(u64),
    Null,
    Object(u32),
}

/// A constant, always at least word-sized or floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetConstant {
    pub kind: Kind,
    pub payload: ConstPayload,
}

impl fmt::Display for TargetConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload {
            ConstPayload::Bits(bits) => write!(f, "{}:{:#x}", self.kind, bits),
            ConstPayload::Null => write!(f, "{}:null", self.kind),
            ConstPayload::Object(h) => write!(f, "{}:obj{}", self.kind, h),
        }
    }
}

/// An operand in the target IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetValue {
    Variable(VarId),
    Constant(ConstId),
    Method(MethodRef),
    Undefined(Kind),
}

impl TargetValue {
    pub fn as_var(self) -> Option<VarId> {
        match self {
            TargetValue::Variable(v) => Some(v),
            _ => None,
        }
    }
}

impl From<VarId> for TargetValue {
    fn from(var: VarId) -> Self {
        TargetValue::Variable(var)
    }
}

impl fmt::Display for TargetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetValue::Variable(v) => write!(f, "{v}"),
            TargetValue::Constant(c) => write!(f, "{c}"),
            TargetValue::Method(m) => write!(f, "m{}", m.index()),
            TargetValue::Undefined(kind) => write!(f, "undef.{kind}"),
        }
    }
}
