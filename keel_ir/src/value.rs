//! Opaque handles and operand values of the source IR.
//!
//! All references into the IR are u32 indices, not pointers.

use num_bigint::BigInt;

use crate::types::Kind;

/// Reference to a variable in the method's variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarRef(pub(crate) u32);

impl VarRef {
    /// Raw index into the variable arena.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Reference to a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(pub(crate) u32);

impl BlockRef {
    /// Raw index into the block arena.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Reference to a method actor in an [`ActorTable`](crate::actor::ActorTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef(pub(crate) u32);

impl MethodRef {
    /// Raw index into the actor table.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Payload of a literal.
///
/// Floating point literals are stored as raw IEEE bits so that literals can be
/// compared and hashed exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// Integer literal (any integral kind, `Word` included).
    Int(BigInt),
    /// IEEE bits: low 32 bits for `Float`, all 64 for `Double`.
    Float(u64),
    /// The null reference.
    Null,
    /// A boxed object known at compile time, by heap handle.
    Object(u32),
}

/// A literal tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    pub kind: Kind,
    pub value: ConstValue,
}

impl Constant {
    pub fn int(kind: Kind, value: i64) -> Self {
        Self {
            kind,
            value: ConstValue::Int(BigInt::from(value)),
        }
    }

    pub fn long(value: i64) -> Self {
        Self::int(Kind::Long, value)
    }

    pub fn word(value: u64) -> Self {
        Self {
            kind: Kind::Word,
            value: ConstValue::Int(BigInt::from(value)),
        }
    }

    pub fn float(value: f32) -> Self {
        Self {
            kind: Kind::Float,
            value: ConstValue::Float(value.to_bits() as u64),
        }
    }

    pub fn double(value: f64) -> Self {
        Self {
            kind: Kind::Double,
            value: ConstValue::Float(value.to_bits()),
        }
    }

    pub fn null() -> Self {
        Self {
            kind: Kind::Reference,
            value: ConstValue::Null,
        }
    }

    pub fn object(handle: u32) -> Self {
        Self {
            kind: Kind::Reference,
            value: ConstValue::Object(handle),
        }
    }

    /// Whether the literal is an all-zero bit pattern.
    ///
    /// `-0.0` is not zero: its sign bit is set.
    pub fn is_zero(&self) -> bool {
        match &self.value {
            ConstValue::Int(v) => v.sign() == num_bigint::Sign::NoSign,
            ConstValue::Float(bits) => *bits == 0,
            ConstValue::Null => true,
            ConstValue::Object(_) => false,
        }
    }
}

/// An operand in the source IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceValue {
    Variable(VarRef),
    Constant(Constant),
    /// A block used as a value. Only valid in control positions.
    Block(BlockRef),
    /// A statically resolved method (direct call target).
    Method(MethodRef),
    /// A value with no defined contents, e.g. a dead local in a frame state.
    Undefined(Kind),
}

impl From<VarRef> for SourceValue {
    fn from(var: VarRef) -> Self {
        SourceValue::Variable(var)
    }
}

impl From<Constant> for SourceValue {
    fn from(constant: Constant) -> Self {
        SourceValue::Constant(constant)
    }
}

impl From<MethodRef> for SourceValue {
    fn from(method: MethodRef) -> Self {
        SourceValue::Method(method)
    }
}
